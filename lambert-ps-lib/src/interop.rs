// SPDX-License-Identifier: MPL-2.0

//! Interoperability conversions between the matrix and image types.

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use nalgebra::DMatrix;

use crate::error::Error;

/// Convert a matrix of [0, 1] values into a gray level image.
///
/// This performs a transposition to accomodate for the
/// column major matrix into the row major image.
pub fn image_from_matrix(mat: &DMatrix<f32>) -> GrayImage {
    let (nb_rows, nb_cols) = mat.shape();
    let mut img_buf = ImageBuffer::new(nb_cols as u32, nb_rows as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        let v = mat[(y as usize, x as usize)].clamp(0.0, 1.0);
        *pixel = Luma([(v * 255.0) as u8]);
    }
    img_buf
}

/// Render a normal map as a color-coded image.
///
/// Row p = y * width + x of the npixels x 3 matrix colors pixel (x, y), with
/// each component mapped from [-1, 1] to [0, 255]. Zeroed background rows
/// render as the mid-gray (127, 127, 127).
pub fn normal_map_image(
    normals: &DMatrix<f32>,
    height: usize,
    width: usize,
) -> Result<RgbImage, Error> {
    if normals.nrows() != height * width || normals.ncols() != 3 {
        return Err(Error::DimensionMismatch(normals.nrows(), height * width));
    }
    let mut img_buf = ImageBuffer::new(width as u32, height as u32);
    for (x, y, pixel) in img_buf.enumerate_pixels_mut() {
        let p = y as usize * width + x as usize;
        let channel = |v: f32| ((v + 1.0) / 2.0 * 255.0).clamp(0.0, 255.0) as u8;
        *pixel = Rgb([
            channel(normals[(p, 0)]),
            channel(normals[(p, 1)]),
            channel(normals[(p, 2)]),
        ]);
    }
    Ok(img_buf)
}

pub trait ToImage {
    fn to_image(&self) -> DynamicImage;
}

impl ToImage for DMatrix<f32> {
    fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(image_from_matrix(self))
    }
}
