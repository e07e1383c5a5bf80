// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Lambertian photometric stereo.
//!
//! Surface normals are recovered from F images of the same scene captured
//! under F known light directions. Under the Lambertian model the intensity
//! of pixel p in image j is `rho_p * (n_p . l_j)`, so stacking the images
//! gives one small linear system per pixel, solved jointly for all pixels
//! as a multi-right-hand-side least-squares problem.

use nalgebra::DMatrix;
use std::path::Path;

use crate::error::Error;
use crate::eval;
use crate::interop;
use crate::io;

/// Estimate a unit surface normal for every pixel.
///
/// `measurements` is the npixels x nimgs intensity matrix M (one row per
/// pixel), `lights` the nimgs x 3 light direction matrix L (one row per
/// image). Solves `L * X = Mᵗ` in the least-squares sense for the 3 x npixels
/// albedo-scaled normals X, then transposes and row-normalizes the result.
///
/// A pixel whose recovered vector is exactly zero (no signal in any image)
/// stays the zero vector instead of being divided by its norm. Rows listed in
/// `background_ind` are forced to zero after normalization; pass `None` to
/// keep every row. Background indices must be smaller than the number of
/// pixels (rows of M).
///
/// The solve uses the SVD pseudo-inverse with epsilon 1e-9, which yields the
/// minimum-norm solution when the light directions are near-coplanar and L is
/// rank deficient.
pub fn solve_normals(
    measurements: &DMatrix<f32>,
    lights: &DMatrix<f32>,
    background_ind: Option<&[usize]>,
) -> Result<DMatrix<f32>, Error> {
    if measurements.is_empty() {
        return Err(Error::MeasurementMissing);
    }
    if lights.is_empty() || lights.ncols() != 3 {
        return Err(Error::LightMissing);
    }
    if measurements.ncols() != lights.nrows() {
        return Err(Error::DimensionMismatch(
            measurements.ncols(),
            lights.nrows(),
        ));
    }

    log::debug!(
        "solving {} pixels under {} light conditions",
        measurements.nrows(),
        measurements.ncols()
    );

    // Batched solve of L * X = Mᵗ, one right-hand-side column per pixel.
    let scaled_normals =
        lights.clone().pseudo_inverse(1e-9).map_err(Error::Solve)? * measurements.transpose();

    // Back to one row per pixel, each scaled by the albedo. Normalizing the
    // rows drops the albedo and leaves unit normals.
    let mut normals = scaled_normals.transpose();
    for mut row in normals.row_iter_mut() {
        let norm = row.norm();
        if norm > 0.0 {
            row /= norm;
        }
    }

    if let Some(background_ind) = background_ind {
        for &i in background_ind {
            normals.row_mut(i).fill(0.0);
        }
    }

    Ok(normals)
}

/// Caller-owned photometric stereo data.
///
/// Holds the measurement matrix, the light matrix, the mask index sets and
/// the estimated normal matrix. Inputs are loaded step by step (in any
/// order), then [`solve`](PhotometricStereo::solve) derives the normals from
/// whatever is loaded at that point.
#[derive(Debug, Default)]
pub struct PhotometricStereo {
    measurements: Option<DMatrix<f32>>, // M : npixels x nimgs
    lights: Option<DMatrix<f32>>,       // L : nimgs x 3
    normals: Option<DMatrix<f32>>,      // N : npixels x 3
    height: usize,
    width: usize,
    foreground_ind: Option<Vec<usize>>,
    background_ind: Option<Vec<usize>>,
}

impl PhotometricStereo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated normals of the last successful solve, one row per pixel.
    pub fn normals(&self) -> Option<&DMatrix<f32>> {
        self.normals.as_ref()
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn foreground_ind(&self) -> Option<&[usize]> {
        self.foreground_ind.as_deref()
    }

    pub fn background_ind(&self) -> Option<&[usize]> {
        self.background_ind.as_deref()
    }

    pub fn set_lights(&mut self, lights: DMatrix<f32>) {
        self.lights = Some(lights);
    }

    /// Set the measurement matrix together with the image dimensions.
    /// Pixel p of an image is row p = y * width + x of the matrix.
    pub fn set_measurements(
        &mut self,
        measurements: DMatrix<f32>,
        height: usize,
        width: usize,
    ) -> Result<(), Error> {
        if measurements.nrows() != height * width {
            return Err(Error::DimensionMismatch(
                measurements.nrows(),
                height * width,
            ));
        }
        self.check_dimensions(width, height)?;
        self.height = height;
        self.width = width;
        self.measurements = Some(measurements);
        Ok(())
    }

    /// Set the foreground/background pixel index sets from a decoded mask.
    pub fn set_mask_indices(&mut self, mask: io::MaskIndices) -> Result<(), Error> {
        self.check_dimensions(mask.width, mask.height)?;
        self.height = mask.height;
        self.width = mask.width;
        self.foreground_ind = Some(mask.foreground);
        self.background_ind = Some(mask.background);
        Ok(())
    }

    /// Parse a text file of light directions into the light matrix.
    pub fn load_light_txt<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        self.lights = Some(io::load_light_txt(path)?);
        Ok(())
    }

    /// Decode a set of image files into the measurement matrix.
    pub fn load_images<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<(), Error> {
        let (measurements, height, width) = io::load_images(paths)?;
        self.set_measurements(measurements, height, width)
    }

    /// Decode a mask image into the foreground/background index sets.
    pub fn load_mask<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Error> {
        let mask = io::load_mask(path)?;
        self.set_mask_indices(mask)
    }

    /// Estimate the surface normals from the loaded measurements and lights.
    ///
    /// Fails with [`Error::MeasurementMissing`] or [`Error::LightMissing`] if
    /// an input was never loaded, and with [`Error::DimensionMismatch`] if
    /// the two disagree on the number of light conditions. On error the
    /// normals of a previous solve are left untouched.
    pub fn solve(&mut self) -> Result<(), Error> {
        let measurements = self
            .measurements
            .as_ref()
            .ok_or(Error::MeasurementMissing)?;
        let lights = self.lights.as_ref().ok_or(Error::LightMissing)?;
        let normals = solve_normals(measurements, lights, self.background_ind.as_deref())?;
        self.normals = Some(normals);
        Ok(())
    }

    /// Serialize the estimated normal map.
    pub fn save_normal_map<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let normals = self.normals.as_ref().ok_or(Error::NormalsMissing)?;
        io::save_normal_map(path, normals, self.height, self.width)
    }

    /// Render the estimated normal map as a color-coded image.
    pub fn normal_map_image(&self) -> Result<image::RgbImage, Error> {
        let normals = self.normals.as_ref().ok_or(Error::NormalsMissing)?;
        interop::normal_map_image(normals, self.height, self.width)
    }

    /// Mean angular error in degrees against a ground truth normal map.
    pub fn evaluate(&self, gt_normals: &DMatrix<f32>) -> Result<f32, Error> {
        let normals = self.normals.as_ref().ok_or(Error::NormalsMissing)?;
        eval::mean_angular_error_deg(normals, gt_normals)
    }

    // Mask and images must describe the same pixel grid.
    fn check_dimensions(&self, width: usize, height: usize) -> Result<(), Error> {
        if self.width != 0 && (self.width, self.height) != (width, height) {
            return Err(Error::ImageDimensions {
                expected: (self.width as u32, self.height as u32),
                found: (width as u32, height as u32),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DMatrix, RowVector3};

    /// Four light directions of rank 3, roughly overhead.
    fn test_lights() -> DMatrix<f32> {
        let mut lights = DMatrix::from_row_slice(
            4,
            3,
            &[
                0.0, 0.0, 1.0, //
                0.5, 0.0, 1.0, //
                0.0, 0.5, 1.0, //
                -0.3, -0.3, 1.0,
            ],
        );
        for mut row in lights.row_iter_mut() {
            let norm = row.norm();
            row /= norm;
        }
        lights
    }

    /// Ten unit normals tilted less than 20 degrees away from +z, so every
    /// dot product with the test lights stays positive (no attached shadow).
    fn test_normals() -> DMatrix<f32> {
        let rows: Vec<RowVector3<f32>> = (0..10)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::PI / 5.0;
                let tilt = 0.1 + 0.02 * i as f32;
                RowVector3::new(tilt * angle.cos(), tilt * angle.sin(), 1.0).normalize()
            })
            .collect();
        let mut normals = DMatrix::zeros(10, 3);
        for (i, row) in rows.iter().enumerate() {
            normals.set_row(i, row);
        }
        normals
    }

    /// M[i, j] = max(0, albedo_i * (n_i . l_j)).
    fn render_measurements(normals: &DMatrix<f32>, lights: &DMatrix<f32>) -> DMatrix<f32> {
        let mut m = normals * lights.transpose();
        for (i, mut row) in m.row_iter_mut().enumerate() {
            let albedo = 0.5 + 0.05 * i as f32;
            for x in row.iter_mut() {
                *x = (albedo * *x).max(0.0);
            }
        }
        m
    }

    /// Angle in degrees between row i of two unit-row matrices.
    fn row_angle_deg(a: &DMatrix<f32>, b: &DMatrix<f32>, i: usize) -> f32 {
        let dot: f32 = a.row(i).dot(&b.row(i));
        dot.clamp(-1.0, 1.0).acos().to_degrees()
    }

    #[test]
    fn solve_output_shape() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let normals = solve_normals(&m, &lights, None).unwrap();
        assert_eq!(normals.shape(), (10, 3));
    }

    #[test]
    fn foreground_rows_are_unit_vectors() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let normals = solve_normals(&m, &lights, None).unwrap();
        for row in normals.row_iter() {
            assert!((row.norm() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn recovers_synthetic_normals_within_one_degree() {
        let lights = test_lights();
        let truth = test_normals();
        let m = render_measurements(&truth, &lights);
        let normals = solve_normals(&m, &lights, None).unwrap();
        for i in 0..truth.nrows() {
            let err = row_angle_deg(&normals, &truth, i);
            assert!(err < 1.0, "pixel {}: angular error {} deg", i, err);
        }
    }

    #[test]
    fn zero_measurement_row_stays_zero() {
        let lights = test_lights();
        let mut m = render_measurements(&test_normals(), &lights);
        m.row_mut(3).fill(0.0);
        let normals = solve_normals(&m, &lights, None).unwrap();
        for x in normals.row(3).iter() {
            assert_eq!(*x, 0.0);
            assert!(!x.is_nan());
        }
    }

    #[test]
    fn background_rows_are_forced_to_zero() {
        let lights = test_lights();
        let truth = test_normals();
        let m = render_measurements(&truth, &lights);
        let background = [0, 1, 2];
        let normals = solve_normals(&m, &lights, Some(&background)).unwrap();
        for &i in background.iter() {
            assert_eq!(normals.row(i).norm(), 0.0);
        }
        for i in background.len()..truth.nrows() {
            let err = row_angle_deg(&normals, &truth, i);
            assert!(err < 1.0, "pixel {}: angular error {} deg", i, err);
        }
    }

    #[test]
    fn no_mask_keeps_every_row() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let normals = solve_normals(&m, &lights, None).unwrap();
        for row in normals.row_iter() {
            assert!(row.norm() > 0.0);
        }
    }

    #[test]
    fn rejects_mismatched_light_count() {
        let lights = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        let m = DMatrix::repeat(10, 4, 0.5);
        match solve_normals(&m, &lights, None) {
            Err(Error::DimensionMismatch(4, 3)) => {}
            other => panic!("expected dimension mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn solve_is_deterministic() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let first = solve_normals(&m, &lights, None).unwrap();
        let second = solve_normals(&m, &lights, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn session_requires_loaded_inputs() {
        let mut ps = PhotometricStereo::new();
        assert!(matches!(ps.solve(), Err(Error::MeasurementMissing)));

        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        ps.set_measurements(m, 2, 5).unwrap();
        assert!(matches!(ps.solve(), Err(Error::LightMissing)));

        ps.set_lights(lights);
        ps.solve().unwrap();
        assert_eq!(ps.normals().unwrap().shape(), (10, 3));
    }

    #[test]
    fn failed_solve_keeps_previous_normals() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let mut ps = PhotometricStereo::new();
        ps.set_measurements(m, 2, 5).unwrap();
        ps.set_lights(lights);
        ps.solve().unwrap();
        let before = ps.normals().unwrap().clone();

        // Swap in a light matrix with the wrong number of conditions.
        ps.set_lights(DMatrix::repeat(3, 3, 1.0));
        assert!(matches!(ps.solve(), Err(Error::DimensionMismatch(4, 3))));
        assert_eq!(ps.normals().unwrap(), &before);
    }

    #[test]
    fn output_operations_require_a_solve() {
        let ps = PhotometricStereo::new();
        assert!(matches!(
            ps.save_normal_map("unused.psnm"),
            Err(Error::NormalsMissing)
        ));
        assert!(matches!(ps.normal_map_image(), Err(Error::NormalsMissing)));
        assert!(matches!(
            ps.evaluate(&DMatrix::zeros(10, 3)),
            Err(Error::NormalsMissing)
        ));
    }

    #[test]
    fn mask_and_images_must_share_dimensions() {
        let lights = test_lights();
        let m = render_measurements(&test_normals(), &lights);
        let mut ps = PhotometricStereo::new();
        ps.set_measurements(m, 2, 5).unwrap();
        let mask = io::MaskIndices {
            foreground: vec![0],
            background: vec![1, 2],
            height: 1,
            width: 3,
        };
        assert!(matches!(
            ps.set_mask_indices(mask),
            Err(Error::ImageDimensions { .. })
        ));
    }
}
