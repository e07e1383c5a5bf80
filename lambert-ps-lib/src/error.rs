// SPDX-License-Identifier: MPL-2.0

//! Error type shared by the solver core and the I/O helpers.

use thiserror::Error;

/// All failure modes of the library.
#[derive(Debug, Error)]
pub enum Error {
    /// Solve was called before the measurement matrix was loaded.
    #[error("measurement data missing")]
    MeasurementMissing,
    /// Solve was called before the light matrix was loaded.
    #[error("light data missing")]
    LightMissing,
    /// An output operation was called before a successful solve.
    #[error("normal data missing")]
    NormalsMissing,
    /// Two matrices that must agree on a dimension do not.
    #[error("inconsistent dimensionality ({0} vs {1})")]
    DimensionMismatch(usize, usize),
    /// The SVD underlying the pseudo-inverse did not converge.
    #[error("least-squares solve failed: {0}")]
    Solve(&'static str),
    /// Malformed light directions file.
    #[error("invalid light file: {0}")]
    LightFormat(String),
    /// Malformed serialized normal map.
    #[error("invalid normal map file: {0}")]
    NormalMapFormat(String),
    /// Images or mask of one dataset disagree on size.
    #[error("inconsistent image dimensions: expected {expected:?}, found {found:?}")]
    ImageDimensions {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
