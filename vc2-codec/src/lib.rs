// Codec implementations often use patterns that trigger clippy warnings
#![allow(clippy::too_many_arguments)]

//! SMPTE VC-2 codec
//!
//! A pure Rust implementation of the core of the SMPTE VC-2 video codec
//! at the High Quality (HQ) and Low Delay (LD) profile levels: an
//! intra-only wavelet codec with independently decodable slices and
//! constant-bit-rate behaviour.
//!
//! # Pipeline
//!
//! Encoding: forward wavelet transform, per-slice quantiser-index
//! search against a byte budget, dead-zone quantisation, slice
//! serialisation, and parse-info framing. Decoding reverses each stage.
//!
//! # Example
//!
//! ```no_run
//! use vc2_codec::{DecoderConfig, EncoderConfig, Vc2Decoder, Vc2Encoder};
//! use vc2_core::{ChromaFormat, Picture, PictureFormat};
//!
//! let format = PictureFormat::new(1080, 1920, ChromaFormat::C422);
//! let frame = Picture::new(format);
//!
//! let mut encoder = Vc2Encoder::new(EncoderConfig::new(1080, 1920, ChromaFormat::C422)).unwrap();
//! let stream = encoder.encode_sequence(&[frame]).unwrap();
//!
//! let decoder = Vc2Decoder::new(DecoderConfig {
//!     picture_bytes: Some(encoder.config().picture_bytes),
//!     ..Default::default()
//! });
//! let decoded = decoder.decode_sequence(&stream).unwrap();
//! println!("decoded {} pictures", decoded.pictures.len());
//! ```

pub mod dataunit;
pub mod decoder;
pub mod encoder;
pub mod quantize;
pub mod slice;
pub mod tables;
pub mod types;
pub mod wavelet;

pub use dataunit::{
    DataUnitType, PicturePreamble, SequenceHeader, SliceIo, StreamReader, StreamWriter,
    WrappedPicture,
};
pub use decoder::{DecodeOutput, DecoderConfig, Vc2Decoder};
pub use encoder::{EncoderConfig, Vc2Encoder};
pub use quantize::QuantMatrix;
pub use slice::Slices;
pub use types::{FrameRate, Profile, SliceIoMode, WaveletKernel};
