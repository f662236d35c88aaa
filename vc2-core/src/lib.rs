//! # VC-2 Core
//!
//! Core types for the VC-2 codec workspace:
//! - Error handling types
//! - Bit-level stream reading/writing with VC-2's interleaved
//!   exp-Golomb code and bounded regions
//! - Integer sample planes and the three-plane picture model
//! - Rational arithmetic for frame rates and byte budgets

pub mod bitstream;
pub mod error;
pub mod picture;
pub mod rational;

pub use bitstream::{BitReader, BitWriter};
pub use error::{Error, Result, StreamError};
pub use picture::{ChromaFormat, Picture, PictureArray, PictureFormat, Plane};
pub use rational::Rational;
