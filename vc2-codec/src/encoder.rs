//! Encoder orchestrator: colour-converted pictures in, a framed VC-2
//! sequence out.

use std::io::Write;

use tracing::{debug, warn};
use vc2_core::{ChromaFormat, Error, Picture, Rational, Result};

use crate::dataunit::{SequenceHeader, SliceIo, StreamWriter, WrappedPicture};
use crate::quantize::{quantise_transform_indexed, QuantMatrix};
use crate::slice::{
    choose_hq_quant_indices, choose_ld_quant_indices, hq_slice_byte_budgets, slice_byte_budgets,
    split_into_blocks, Slices, HQ_SLICE_HEADER_BYTES,
};
use crate::types::{FrameRate, Profile, WaveletKernel};
use crate::wavelet::{analysis, transform_format};

/// Full encoder configuration, fixed for the lifetime of a sequence.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub width: usize,
    pub height: usize,
    pub chroma_format: ChromaFormat,
    pub bit_depth: u32,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub frame_rate: FrameRate,
    pub profile: Profile,
    pub kernel: WaveletKernel,
    pub depth: u32,
    /// Vertical slice size in units of `2^depth` luma samples.
    pub y_size: usize,
    /// Horizontal slice size in units of `2^depth` luma samples.
    pub x_size: usize,
    /// Compressed byte budget per frame.
    pub picture_bytes: usize,
    pub slice_prefix: usize,
    pub slice_size_scalar: usize,
}

impl EncoderConfig {
    /// A configuration with the conventional defaults for the chroma
    /// format: LeGall depth 3 and 2:1 compression.
    pub fn new(height: usize, width: usize, chroma_format: ChromaFormat) -> Self {
        let (y_size, x_size) = match chroma_format {
            ChromaFormat::Rgb | ChromaFormat::C444 => (1, 1),
            ChromaFormat::C422 => (1, 2),
            ChromaFormat::C420 => (2, 2),
        };
        let mut config = Self {
            width,
            height,
            chroma_format,
            bit_depth: 8,
            interlaced: false,
            top_field_first: false,
            frame_rate: FrameRate::Fr25,
            profile: Profile::HighQuality,
            kernel: WaveletKernel::LeGall,
            depth: 3,
            y_size,
            x_size,
            picture_bytes: 0,
            slice_prefix: 0,
            slice_size_scalar: 1,
        };
        config.picture_bytes = config.bytes_for_ratio(2.0);
        config
    }

    /// Frame byte budget giving `ratio`:1 compression of the raw frame.
    pub fn bytes_for_ratio(&self, ratio: f64) -> usize {
        let bytes_per_sample = if self.bit_depth <= 8 { 1.0 } else { 2.0 };
        let samples_per_pixel = match self.chroma_format {
            ChromaFormat::Rgb | ChromaFormat::C444 => 3.0,
            ChromaFormat::C422 => 2.0,
            ChromaFormat::C420 => 1.5,
        };
        let raw = self.height as f64 * self.width as f64 * bytes_per_sample * samples_per_pixel;
        (raw / ratio).floor() as usize
    }

    /// Height of one coded picture: a field when interlaced, else the
    /// frame.
    fn coded_height(&self) -> usize {
        if self.interlaced {
            self.height / 2
        } else {
            self.height
        }
    }

    /// Byte budget of one coded picture.
    fn coded_picture_bytes(&self) -> usize {
        if self.interlaced {
            self.picture_bytes / 2
        } else {
            self.picture_bytes
        }
    }

    fn coded_format(&self) -> vc2_core::PictureFormat {
        vc2_core::PictureFormat::new(self.coded_height(), self.width, self.chroma_format)
    }

    /// The sequence header this configuration produces.
    pub fn sequence_header(&self) -> SequenceHeader {
        SequenceHeader::new(
            self.profile,
            self.height,
            self.width,
            self.chroma_format,
            self.interlaced,
            self.frame_rate,
            self.top_field_first,
            self.bit_depth,
        )
    }

    /// Slice grid of one coded picture, derived from padded dimensions.
    pub fn slice_grid(&self) -> Result<(usize, usize)> {
        let padded = transform_format(&self.coded_format(), self.depth)?;
        let tile_h = self.y_size << self.depth;
        let tile_w = self.x_size << self.depth;
        if padded.luma_height() % tile_h != 0 {
            return Err(Error::config(
                "padded picture height is not divisible by the slice height".to_string(),
            ));
        }
        if padded.luma_width() % tile_w != 0 {
            return Err(Error::config(
                "padded picture width is not divisible by the slice width".to_string(),
            ));
        }
        Ok((padded.luma_height() / tile_h, padded.luma_width() / tile_w))
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config("picture dimensions cannot be zero".to_string()));
        }
        if self.interlaced && self.height % 2 != 0 {
            return Err(Error::config(
                "interlaced sources need an even frame height".to_string(),
            ));
        }
        if self.slice_size_scalar == 0 {
            return Err(Error::config("slice size scalar cannot be zero".to_string()));
        }
        if self.x_size % self.chroma_format.x_scale() != 0
            || self.y_size % self.chroma_format.y_scale() != 0
        {
            return Err(Error::config(format!(
                "slice size {}x{} does not cover whole {} chroma transform units",
                self.y_size, self.x_size, self.chroma_format
            )));
        }
        if self.profile == Profile::Unknown {
            return Err(Error::config("encoder profile must be LD or HQ".to_string()));
        }
        QuantMatrix::default_for(self.kernel, self.depth)?;

        let (y_slices, x_slices) = self.slice_grid()?;
        let slice_count = y_slices * x_slices;
        let budget = self.coded_picture_bytes();

        // Even a maximally quantised slice codes one bit per sample.
        let tile_luma = (self.y_size << self.depth) * (self.x_size << self.depth);
        let tile_chroma = tile_luma
            / (self.chroma_format.x_scale() * self.chroma_format.y_scale());
        let scaled = |samples: usize| {
            samples
                .div_ceil(8)
                .div_ceil(self.slice_size_scalar)
                * self.slice_size_scalar
        };
        match self.profile {
            Profile::HighQuality => {
                let floor_budget = budget / slice_count;
                let min_needed =
                    HQ_SLICE_HEADER_BYTES + scaled(tile_luma) + 2 * scaled(tile_chroma);
                if floor_budget < min_needed {
                    return Err(Error::config(format!(
                        "byte budget {budget} gives {floor_budget} bytes per slice; \
                         the slice geometry needs at least {min_needed}"
                    )));
                }
                let ceil_budget = budget.div_ceil(slice_count);
                let max_addressable =
                    HQ_SLICE_HEADER_BYTES + 3 * 255 * self.slice_size_scalar + self.slice_prefix;
                if ceil_budget > max_addressable {
                    return Err(Error::config(format!(
                        "slice budget {ceil_budget} cannot be addressed with slice size \
                         scalar {}; increase the scalar",
                        self.slice_size_scalar
                    )));
                }
            }
            Profile::LowDelay => {
                if budget / slice_count < 2 {
                    return Err(Error::config(format!(
                        "byte budget {budget} is too small for {slice_count} LD slices"
                    )));
                }
            }
            Profile::Unknown => unreachable!(),
        }
        Ok(())
    }
}

/// VC-2 encoder. One instance codes one sequence at a fixed
/// configuration.
#[derive(Debug)]
pub struct Vc2Encoder {
    config: EncoderConfig,
    matrix: QuantMatrix,
    picture_number: u32,
}

impl Vc2Encoder {
    /// Create an encoder, validating the configuration.
    pub fn new(config: EncoderConfig) -> Result<Self> {
        config.validate()?;
        let matrix = QuantMatrix::default_for(config.kernel, config.depth)?;
        debug!(
            kernel = %config.kernel,
            depth = config.depth,
            picture_bytes = config.picture_bytes,
            "encoder configured"
        );
        Ok(Self {
            config,
            matrix,
            picture_number: 0,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn slice_io(&self) -> SliceIo {
        match self.config.profile {
            Profile::LowDelay => SliceIo::LowDelay,
            _ => SliceIo::HqConstantRate {
                picture_bytes: self.config.coded_picture_bytes(),
            },
        }
    }

    /// Encode a whole sequence: header, every frame, end-of-sequence.
    pub fn encode_sequence(&mut self, frames: &[Picture]) -> Result<Vec<u8>> {
        let mut writer = StreamWriter::new(Vec::new(), self.slice_io());
        writer.write_sequence_header(&self.config.sequence_header())?;
        for frame in frames {
            self.encode_frame(&mut writer, frame)?;
        }
        writer.end_sequence()?;
        Ok(writer.into_inner())
    }

    /// Encode one frame into an open stream, splitting interlaced
    /// frames into two independently coded fields.
    pub fn encode_frame<W: Write>(
        &mut self,
        writer: &mut StreamWriter<W>,
        frame: &Picture,
    ) -> Result<()> {
        let expected = vc2_core::PictureFormat::new(
            self.config.height,
            self.config.width,
            self.config.chroma_format,
        );
        if *frame.format() != expected {
            return Err(Error::config(format!(
                "frame is {}x{} {}, encoder expects {}x{} {}",
                frame.format().luma_height(),
                frame.format().luma_width(),
                frame.format().chroma_format(),
                expected.luma_height(),
                expected.luma_width(),
                expected.chroma_format(),
            )));
        }
        if self.config.interlaced {
            let (top, bottom) = frame.split_fields()?;
            self.encode_picture(writer, &top)?;
            self.encode_picture(writer, &bottom)?;
        } else {
            self.encode_picture(writer, frame)?;
        }
        Ok(())
    }

    fn encode_picture<W: Write>(
        &mut self,
        writer: &mut StreamWriter<W>,
        picture: &Picture,
    ) -> Result<()> {
        let config = &self.config;
        let (y_slices, x_slices) = config.slice_grid()?;
        let picture_bytes = config.coded_picture_bytes();

        debug!(
            picture_number = self.picture_number,
            y_slices, x_slices, "forward transform"
        );
        let transform = analysis(picture, config.kernel, config.depth)?;
        let blocks = split_into_blocks(&transform, y_slices, x_slices)?;

        let (search, slice_bytes) = match config.profile {
            Profile::LowDelay => {
                let per_slice =
                    Rational::reduced(picture_bytes as u64, (y_slices * x_slices) as u64);
                let budgets = slice_byte_budgets(y_slices, x_slices, &per_slice);
                let search = choose_ld_quant_indices(&blocks, &self.matrix, &budgets)?;
                (search, Some(per_slice))
            }
            _ => {
                let budgets = hq_slice_byte_budgets(y_slices, x_slices, picture_bytes);
                let search = choose_hq_quant_indices(
                    &blocks,
                    &self.matrix,
                    &budgets,
                    config.slice_prefix,
                    config.slice_size_scalar,
                )?;
                (search, None)
            }
        };
        if search.over_budget > 0 {
            warn!(
                picture_number = self.picture_number,
                slices = search.over_budget,
                "slices exceed their byte budget even at maximum quantisation"
            );
        }

        let quantised = quantise_transform_indexed(
            &transform,
            &search.indices,
            y_slices,
            x_slices,
            &self.matrix,
        )?;
        let slices = Slices::new(
            split_into_blocks(&quantised, y_slices, x_slices)?,
            search.indices,
        )?;

        let wrapped = WrappedPicture {
            picture_number: self.picture_number,
            kernel: config.kernel,
            depth: config.depth,
            slices_x: x_slices,
            slices_y: y_slices,
            slice_prefix: config.slice_prefix,
            slice_size_scalar: config.slice_size_scalar,
            slice_bytes,
            slices,
        };
        writer.write_picture(&wrapped)?;
        self.picture_number = self.picture_number.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_grid_for_reference_geometry() {
        // 256x256 4:2:2, depth 3, slice size (1,2): 32x16 slices.
        let mut config = EncoderConfig::new(256, 256, ChromaFormat::C422);
        config.picture_bytes = 65536;
        let (y_slices, x_slices) = config.slice_grid().unwrap();
        assert_eq!((y_slices, x_slices), (32, 16));
    }

    #[test]
    fn test_compression_ratio_budget() {
        let config = EncoderConfig::new(256, 256, ChromaFormat::C422);
        assert_eq!(config.bytes_for_ratio(2.0), 65536);
        let rgb = EncoderConfig::new(64, 64, ChromaFormat::C444);
        assert_eq!(rgb.bytes_for_ratio(2.0), 64 * 64 * 3 / 2);
    }

    #[test]
    fn test_validation_rejects_null_kernel() {
        let mut config = EncoderConfig::new(64, 64, ChromaFormat::C444);
        config.kernel = WaveletKernel::Null;
        assert!(Vc2Encoder::new(config).is_err());
    }

    #[test]
    fn test_validation_rejects_starved_budget() {
        let mut config = EncoderConfig::new(64, 64, ChromaFormat::C444);
        config.picture_bytes = 64;
        assert!(Vc2Encoder::new(config).is_err());
    }

    #[test]
    fn test_validation_rejects_odd_interlaced_height() {
        let mut config = EncoderConfig::new(65, 64, ChromaFormat::C444);
        config.interlaced = true;
        assert!(Vc2Encoder::new(config).is_err());
    }
}
