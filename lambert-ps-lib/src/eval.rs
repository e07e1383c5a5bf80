// SPDX-License-Identifier: MPL-2.0

//! Comparison of an estimated normal map against a ground truth.

use nalgebra::{DMatrix, DVector};

use crate::error::Error;

/// Per-pixel angular error in degrees between two normal maps.
///
/// Both matrices must be npixels x 3. Rows where either map is the zero
/// vector (masked-out pixels) get error 0.
pub fn angular_error_deg(
    estimated: &DMatrix<f32>,
    gt_normals: &DMatrix<f32>,
) -> Result<DVector<f32>, Error> {
    if estimated.shape() != gt_normals.shape() || estimated.ncols() != 3 {
        return Err(Error::DimensionMismatch(
            estimated.nrows(),
            gt_normals.nrows(),
        ));
    }
    let mut errors = DVector::zeros(estimated.nrows());
    for i in 0..estimated.nrows() {
        let est = estimated.row(i);
        let gt = gt_normals.row(i);
        let est_norm = est.norm();
        let gt_norm = gt.norm();
        if est_norm > 0.0 && gt_norm > 0.0 {
            let cos = (est.dot(&gt) / (est_norm * gt_norm)).clamp(-1.0, 1.0);
            errors[i] = cos.acos().to_degrees();
        }
    }
    Ok(errors)
}

/// Mean angular error in degrees, over pixels where both maps are nonzero.
/// Returns 0 when no pixel qualifies.
pub fn mean_angular_error_deg(
    estimated: &DMatrix<f32>,
    gt_normals: &DMatrix<f32>,
) -> Result<f32, Error> {
    let errors = angular_error_deg(estimated, gt_normals)?;
    let mut sum = 0.0;
    let mut count = 0;
    for i in 0..estimated.nrows() {
        if estimated.row(i).norm() > 0.0 && gt_normals.row(i).norm() > 0.0 {
            sum += errors[i];
            count += 1;
        }
    }
    if count == 0 {
        Ok(0.0)
    } else {
        Ok(sum / count as f32)
    }
}

/// Reshape per-pixel errors into a height x width map scaled to [0, 1],
/// saturating at `max_deg`, ready for rendering as a gray image.
pub fn error_map(
    errors: &DVector<f32>,
    height: usize,
    width: usize,
    max_deg: f32,
) -> Result<DMatrix<f32>, Error> {
    if errors.len() != height * width {
        return Err(Error::DimensionMismatch(errors.len(), height * width));
    }
    let scaled: Vec<f32> = errors.iter().map(|e| (e / max_deg).min(1.0)).collect();
    Ok(DMatrix::from_row_slice(height, width, &scaled))
}
