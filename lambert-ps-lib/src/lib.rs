// SPDX-License-Identifier: MPL-2.0

//! # Lambertian photometric stereo
//!
//! Per-pixel surface normal estimation from images of a scene captured under
//! different known light directions, via a batched linear least-squares
//! solve. The [`ps`] module holds the solver; [`io`], [`interop`] and
//! [`eval`] hold the thin loading, rendering and evaluation helpers around
//! it.

pub mod error;
pub mod eval;
pub mod interop;
pub mod io;
pub mod ps;

pub use crate::error::Error;
pub use crate::ps::{solve_normals, PhotometricStereo};
