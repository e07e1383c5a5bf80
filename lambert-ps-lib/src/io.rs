// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Loading and saving of the photometric stereo inputs and outputs.
//!
//! Pixel ordering everywhere is row major: pixel p of a height x width image
//! sits at (y, x) = (p / width, p % width).

use image::GrayImage;
use nalgebra::{DMatrix, DVector};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::Error;

/// Magic bytes of the serialized normal map format.
const NORMAL_MAP_MAGIC: &[u8; 4] = b"PSNM";

/// Foreground/background pixel index sets decoded from a mask image.
#[derive(Debug, Clone)]
pub struct MaskIndices {
    pub foreground: Vec<usize>,
    pub background: Vec<usize>,
    pub height: usize,
    pub width: usize,
}

/// Parse light directions from text, one light per line:
///
/// ```text
/// light1_x light1_y light1_z
/// light2_x light2_y light2_z
/// ...
/// ```
///
/// Components may be separated by whitespace or commas. Blank lines are
/// skipped. Returns an nimgs x 3 matrix.
pub fn parse_light_txt(content: &str) -> Result<DMatrix<f32>, Error> {
    let mut coords: Vec<f32> = Vec::new();
    let mut nb_lights = 0;
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let components: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();
        if components.len() != 3 {
            return Err(Error::LightFormat(format!(
                "line {}: expected 3 components, found {}",
                index + 1,
                components.len()
            )));
        }
        for c in components {
            let value: f32 = c
                .parse()
                .map_err(|e| Error::LightFormat(format!("line {}: {}", index + 1, e)))?;
            coords.push(value);
        }
        nb_lights += 1;
    }
    if nb_lights == 0 {
        return Err(Error::LightFormat("no light directions found".into()));
    }
    Ok(DMatrix::from_row_slice(nb_lights, 3, &coords))
}

/// Load a light directions file. See [`parse_light_txt`] for the format.
pub fn load_light_txt<P: AsRef<Path>>(path: P) -> Result<DMatrix<f32>, Error> {
    let content = std::fs::read_to_string(path)?;
    let lights = parse_light_txt(&content)?;
    log::info!("loaded {} light directions", lights.nrows());
    Ok(lights)
}

/// Decode a set of image files into a measurement matrix.
///
/// Every image becomes one column of the npixels x nimgs matrix, with
/// intensities converted to gray and scaled to [0, 1]. All images must share
/// the same dimensions. Returns the matrix plus (height, width).
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> Result<(DMatrix<f32>, usize, usize), Error> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(image::open(path)?.into_luma8());
    }
    measurements_from_images(&images)
}

/// Stack decoded gray images into a measurement matrix, one column per image.
pub fn measurements_from_images(
    images: &[GrayImage],
) -> Result<(DMatrix<f32>, usize, usize), Error> {
    let mut columns: Vec<DVector<f32>> = Vec::with_capacity(images.len());
    let mut dimensions = None;
    for img in images {
        match dimensions {
            None => dimensions = Some(img.dimensions()),
            Some(expected) if expected != img.dimensions() => {
                return Err(Error::ImageDimensions {
                    expected,
                    found: img.dimensions(),
                })
            }
            _ => {}
        }
        // The raw luma buffer is already in row major pixel order.
        columns.push(DVector::from_iterator(
            img.as_raw().len(),
            img.as_raw().iter().map(|&v| v as f32 / 255.0),
        ));
    }
    let (width, height) = dimensions.ok_or(Error::MeasurementMissing)?;
    let measurements = DMatrix::from_columns(&columns);
    log::info!(
        "loaded {} images of {}x{} pixels",
        images.len(),
        width,
        height
    );
    Ok((measurements, height as usize, width as usize))
}

/// Decode a mask image into foreground/background index sets.
/// Pixels with zero intensity are background and get ignored by the solver.
pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<MaskIndices, Error> {
    let mask = image::open(path)?.into_luma8();
    let (width, height) = mask.dimensions();
    let mut foreground = Vec::new();
    let mut background = Vec::new();
    for (p, &v) in mask.as_raw().iter().enumerate() {
        if v != 0 {
            foreground.push(p);
        } else {
            background.push(p);
        }
    }
    log::info!(
        "loaded mask: {} foreground, {} background pixels",
        foreground.len(),
        background.len()
    );
    Ok(MaskIndices {
        foreground,
        background,
        height: height as usize,
        width: width as usize,
    })
}

/// Serialize a normal map to a little-endian binary file:
/// the `PSNM` magic, height and width as u32, then the npixels x 3
/// components row by row as f32.
pub fn save_normal_map<P: AsRef<Path>>(
    path: P,
    normals: &DMatrix<f32>,
    height: usize,
    width: usize,
) -> Result<(), Error> {
    if normals.nrows() != height * width || normals.ncols() != 3 {
        return Err(Error::NormalMapFormat(format!(
            "cannot reshape {} normals into a {}x{} map",
            normals.nrows(),
            height,
            width
        )));
    }
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(NORMAL_MAP_MAGIC)?;
    file.write_all(&(height as u32).to_le_bytes())?;
    file.write_all(&(width as u32).to_le_bytes())?;
    for row in normals.row_iter() {
        for v in row.iter() {
            file.write_all(&v.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Deserialize a normal map written by [`save_normal_map`].
/// Returns the npixels x 3 matrix plus (height, width).
pub fn load_normal_map<P: AsRef<Path>>(path: P) -> Result<(DMatrix<f32>, usize, usize), Error> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < 12 || &bytes[0..4] != NORMAL_MAP_MAGIC {
        return Err(Error::NormalMapFormat(
            "missing or truncated PSNM header".into(),
        ));
    }
    let height = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let width = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let nb_pixels = height * width;
    let payload = &bytes[12..];
    if payload.len() != nb_pixels * 3 * 4 {
        return Err(Error::NormalMapFormat(format!(
            "expected {} component bytes for a {}x{} map, found {}",
            nb_pixels * 3 * 4,
            height,
            width,
            payload.len()
        )));
    }
    let components: Vec<f32> = payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((
        DMatrix::from_row_slice(nb_pixels, 3, &components),
        height,
        width,
    ))
}
