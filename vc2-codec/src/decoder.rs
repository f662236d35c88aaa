//! Decoder orchestrator: a framed VC-2 byte stream in, pictures out.

use tracing::{debug, warn};
use vc2_core::{
    BitReader, ChromaFormat, Error, Picture, PictureArray, PictureFormat, Result, StreamError,
};

use crate::dataunit::{
    read_picture_preamble, read_sequence_header, DataUnitType, PicturePreamble, SequenceHeader,
    StreamReader,
};
use crate::quantize::{dequantise_transform_indexed, QuantMatrix};
use crate::slice::{
    hq_slice_byte_budgets, merge_blocks, read_hq_slice, read_ld_slice, slice_byte_budgets, Slices,
};
use crate::types::SliceIoMode;
use crate::wavelet::{synthesis, transform_format};

/// Decoder configuration: everything agreed out of band at stream
/// start.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderConfig {
    /// Frame byte budget of a constant-rate HQ stream. When set, HQ
    /// slices are read as fixed-size records with padding; when absent
    /// they are read as variable-rate, self-describing records.
    pub picture_bytes: Option<usize>,
    /// Overrides the chroma format recovered from the sequence header;
    /// needed for sources the base video format table cannot express.
    pub chroma_format: Option<ChromaFormat>,
}

/// A decoded sequence: the recovered source description and the coded
/// pictures in stream order (fields, for interlaced sources).
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    pub header: SequenceHeader,
    pub pictures: Vec<Picture>,
}

/// VC-2 decoder.
#[derive(Debug, Clone, Default)]
pub struct Vc2Decoder {
    config: DecoderConfig,
}

impl Vc2Decoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Decode data units until end-of-sequence or clean end of input.
    ///
    /// Running out of bytes after at least one decoded picture is a
    /// clean end; running out before the first picture is a malformed
    /// stream.
    pub fn decode_sequence(&self, data: &[u8]) -> Result<DecodeOutput> {
        let mut reader = StreamReader::new(data);
        let mut header: Option<SequenceHeader> = None;
        let mut pictures = Vec::new();

        loop {
            if reader.synchronise().is_err() {
                if pictures.is_empty() {
                    return Err(StreamError::UnexpectedEnd.into());
                }
                debug!(pictures = pictures.len(), "input exhausted without end-of-sequence");
                break;
            }
            let unit = match reader.read_unit() {
                Ok(unit) => unit,
                Err(e) if e.is_eof() && !pictures.is_empty() => {
                    debug!("truncated final data unit treated as end of input");
                    break;
                }
                Err(e) => return Err(e),
            };
            match unit.unit_type {
                DataUnitType::SequenceHeader => {
                    let mut parsed = read_sequence_header(unit.payload)?;
                    if let Some(chroma) = self.config.chroma_format {
                        parsed.chroma_format = chroma;
                    }
                    debug!(
                        width = parsed.width,
                        height = parsed.height,
                        chroma = %parsed.chroma_format,
                        interlace = parsed.interlace,
                        "sequence header"
                    );
                    header = Some(parsed);
                }
                DataUnitType::HqPicture | DataUnitType::LdPicture => {
                    let header = header
                        .as_ref()
                        .ok_or(StreamError::MissingSequenceHeader)?;
                    pictures.push(self.decode_picture(header, unit.unit_type, unit.payload)?);
                }
                DataUnitType::EndOfSequence => break,
                DataUnitType::AuxiliaryData
                | DataUnitType::PaddingData
                | DataUnitType::Unknown => {
                    debug!(unit_type = ?unit.unit_type, "skipping data unit");
                }
            }
        }

        let header = header.ok_or(StreamError::UnexpectedEnd)?;
        Ok(DecodeOutput { header, pictures })
    }

    fn slice_io_mode(&self, unit_type: DataUnitType) -> SliceIoMode {
        match unit_type {
            DataUnitType::LdPicture => SliceIoMode::LowDelay,
            _ if self.config.picture_bytes.is_some() => SliceIoMode::HqConstantRate,
            _ => SliceIoMode::HqVariableRate,
        }
    }

    fn decode_picture(
        &self,
        header: &SequenceHeader,
        unit_type: DataUnitType,
        payload: &[u8],
    ) -> Result<Picture> {
        let mode = self.slice_io_mode(unit_type);
        let mut r = BitReader::new(payload);
        let preamble = read_picture_preamble(&mut r, mode)?;
        debug!(
            picture_number = preamble.picture_number,
            kernel = %preamble.kernel,
            depth = preamble.depth,
            "picture preamble"
        );

        let coded_height = if header.interlace {
            header.height / 2
        } else {
            header.height
        };
        let picture_format =
            PictureFormat::new(coded_height, header.width, header.chroma_format);
        let padded = transform_format(&picture_format, preamble.depth)?;

        let (y_slices, x_slices) = (preamble.slices_y, preamble.slices_x);
        if y_slices == 0
            || x_slices == 0
            || padded.luma_height() % y_slices != 0
            || padded.luma_width() % x_slices != 0
            || (padded.luma_height() / y_slices) % header.chroma_format.y_scale() != 0
            || (padded.luma_width() / x_slices) % header.chroma_format.x_scale() != 0
        {
            return Err(Error::config(format!(
                "{}x{} slice grid does not divide the {}x{} padded picture",
                y_slices,
                x_slices,
                padded.luma_height(),
                padded.luma_width()
            )));
        }
        let tile = PictureFormat::new(
            padded.luma_height() / y_slices,
            padded.luma_width() / x_slices,
            header.chroma_format,
        );

        let budgets = self.slice_budgets(&preamble, mode, header)?;
        let slices = self.read_slices(&mut r, &preamble, mode, tile, budgets.as_deref())?;

        let merged = merge_blocks(slices.blocks())?;
        let matrix = QuantMatrix::default_for(preamble.kernel, preamble.depth)?;
        let transform = dequantise_transform_indexed(
            &merged,
            slices.q_indices(),
            y_slices,
            x_slices,
            &matrix,
        )?;
        synthesis(&transform, preamble.kernel, preamble.depth, picture_format)
    }

    fn slice_budgets(
        &self,
        preamble: &PicturePreamble,
        mode: SliceIoMode,
        header: &SequenceHeader,
    ) -> Result<Option<Vec<usize>>> {
        match mode {
            SliceIoMode::LowDelay => {
                let per_slice = preamble
                    .slice_bytes
                    .ok_or(StreamError::UnexpectedEnd)?;
                Ok(Some(slice_byte_budgets(
                    preamble.slices_y,
                    preamble.slices_x,
                    &per_slice,
                )))
            }
            SliceIoMode::HqConstantRate => {
                let frame_bytes = self.config.picture_bytes.ok_or_else(|| {
                    Error::config("constant-rate decoding needs a configured byte budget".to_string())
                })?;
                let picture_bytes = if header.interlace {
                    frame_bytes / 2
                } else {
                    frame_bytes
                };
                Ok(Some(hq_slice_byte_budgets(
                    preamble.slices_y,
                    preamble.slices_x,
                    picture_bytes,
                )))
            }
            SliceIoMode::HqVariableRate => Ok(None),
        }
    }

    fn read_slices(
        &self,
        r: &mut BitReader,
        preamble: &PicturePreamble,
        mode: SliceIoMode,
        tile: PictureFormat,
        budgets: Option<&[usize]>,
    ) -> Result<Slices> {
        let count = preamble.slices_y * preamble.slices_x;
        let mut blocks = Vec::with_capacity(count);
        let mut q_indices = Vec::with_capacity(count);
        for i in 0..count {
            let (block, q_index) = match mode {
                SliceIoMode::LowDelay => {
                    let budget = budgets
                        .and_then(|b| b.get(i).copied())
                        .ok_or_else(|| {
                            Error::config("Low Delay slice without a byte budget".to_string())
                        })?;
                    read_ld_slice(r, tile, preamble.depth, budget)?
                }
                SliceIoMode::HqConstantRate | SliceIoMode::HqVariableRate => read_hq_slice(
                    r,
                    tile,
                    preamble.depth,
                    preamble.slice_prefix,
                    preamble.slice_size_scalar,
                    budgets.map(|b| b[i]),
                )?,
            };
            if q_index > 127 {
                warn!(slice = i, q_index, "quantiser index out of range, clamping");
            }
            blocks.push(block);
            q_indices.push(q_index.min(127));
        }
        Slices::new(
            PictureArray::from_blocks(preamble.slices_y, preamble.slices_x, blocks)?,
            q_indices,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_malformed() {
        let decoder = Vc2Decoder::default();
        assert!(decoder.decode_sequence(&[]).is_err());
    }

    #[test]
    fn test_garbage_input_is_malformed() {
        let decoder = Vc2Decoder::default();
        let junk: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
        assert!(decoder.decode_sequence(&junk).is_err());
    }
}
