//! Data unit framing: parse-info chaining, sequence headers, picture
//! preambles, and stream synchronisation.
//!
//! Every data unit starts with a 13-byte parse info: the prefix
//! `42 42 43 44`, a parse code, and two 4-byte big-endian offsets.
//! `next_parse_offset` spans from the first byte of this parse info to
//! the first byte of the next; `prev_parse_offset` repeats the previous
//! unit's `next_parse_offset`, zero for the first unit of a sequence.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

use vc2_core::bitstream::{BitReader, BitWriter};
use vc2_core::{ChromaFormat, Error, Rational, Result, StreamError};

use crate::slice::{
    hq_slice_byte_budgets, slice_byte_budgets, write_hq_slice, write_ld_slice, Slices,
};
use crate::tables::{
    bit_depth_from_signal_range, signal_range_code, BaseVideoFormat, BASE_VIDEO_FORMATS,
};
use crate::types::{FrameRate, Profile, SliceIoMode, WaveletKernel};

/// Prefix every parse info starts with.
pub const PARSE_INFO_PREFIX: [u8; 4] = [0x42, 0x42, 0x43, 0x44];

/// Size of a parse info in bytes.
pub const PARSE_INFO_SIZE: usize = 13;

/// The kinds of data unit a VC-2 sequence may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataUnitType {
    SequenceHeader,
    EndOfSequence,
    AuxiliaryData,
    PaddingData,
    LdPicture,
    HqPicture,
    Unknown,
}

impl DataUnitType {
    /// Parse code byte for this unit type.
    pub fn parse_code(self) -> u8 {
        match self {
            DataUnitType::SequenceHeader => 0x00,
            DataUnitType::EndOfSequence => 0x10,
            DataUnitType::PaddingData => 0x30,
            DataUnitType::LdPicture => 0xC8,
            DataUnitType::HqPicture => 0xE8,
            DataUnitType::AuxiliaryData | DataUnitType::Unknown => 0x20,
        }
    }

    /// Classify a parse code byte.
    pub fn from_parse_code(code: u8) -> Self {
        match code {
            0x00 => DataUnitType::SequenceHeader,
            0x10 => DataUnitType::EndOfSequence,
            0x20 => DataUnitType::AuxiliaryData,
            0x30 => DataUnitType::PaddingData,
            0xC8 => DataUnitType::LdPicture,
            0xE8 => DataUnitType::HqPicture,
            _ => DataUnitType::Unknown,
        }
    }
}

/// Source description carried by a sequence header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub profile: Profile,
    pub width: usize,
    pub height: usize,
    pub chroma_format: ChromaFormat,
    pub interlace: bool,
    pub frame_rate: FrameRate,
    pub top_field_first: bool,
    pub bit_depth: u32,
}

impl SequenceHeader {
    pub fn new(
        profile: Profile,
        height: usize,
        width: usize,
        chroma_format: ChromaFormat,
        interlace: bool,
        frame_rate: FrameRate,
        top_field_first: bool,
        bit_depth: u32,
    ) -> Self {
        let major_version = if profile == Profile::HighQuality { 2 } else { 1 };
        Self {
            major_version,
            minor_version: 0,
            profile,
            width,
            height,
            chroma_format,
            interlace,
            frame_rate,
            top_field_first,
            bit_depth,
        }
    }
}

/// The wire projection of a sequence header: a base video format index
/// plus flagged overrides for whatever the base does not express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct VideoFormat {
    pub major_version: u32,
    pub minor_version: u32,
    pub profile: u32,
    pub level: u32,
    pub base_video_format: u32,
    pub custom_dimensions_flag: bool,
    pub frame_width: u32,
    pub frame_height: u32,
    pub custom_scan_format_flag: bool,
    pub source_sampling: u32,
    pub custom_frame_rate_flag: bool,
    pub frame_rate: Option<FrameRate>,
    pub custom_signal_range_flag: bool,
    pub bit_depth_code: u32,
    pub picture_coding_mode: u32,
}

fn matches(
    header: &SequenceHeader,
    width: usize,
    height: usize,
    chroma: ChromaFormat,
    rate: FrameRate,
    bit_depth: u32,
) -> bool {
    header.width == width
        && header.height == height
        && header.chroma_format == chroma
        && header.frame_rate == rate
        && header.bit_depth == bit_depth
}

impl VideoFormat {
    /// Choose the base video format and level for a source description,
    /// falling back to format 0 with custom overrides when nothing in
    /// the preset table matches.
    pub(crate) fn from_header(header: &SequenceHeader) -> Result<Self> {
        use ChromaFormat::{C420, C422, C444};
        use FrameRate::*;

        let mut fmt = VideoFormat {
            major_version: header.major_version,
            minor_version: header.minor_version,
            profile: header.profile.wire_value(),
            level: 0,
            base_video_format: 0,
            custom_dimensions_flag: false,
            frame_width: 0,
            frame_height: 0,
            custom_scan_format_flag: false,
            source_sampling: 0,
            custom_frame_rate_flag: false,
            frame_rate: None,
            custom_signal_range_flag: false,
            bit_depth_code: 0,
            picture_coding_mode: u32::from(header.interlace),
        };

        let h = header;
        if header.interlace {
            if matches(h, 720, 480, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 7;
                fmt.level = 2;
            } else if matches(h, 720, 576, C422, Fr25, 10) {
                fmt.base_video_format = 8;
                fmt.level = 2;
            } else if matches(h, 720, 486, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 22;
                fmt.level = 2;
            } else if h.chroma_format == C422
                && h.width == 720
                && (480..=486).contains(&h.height)
                && h.frame_rate == Fr30000_1001
                && h.bit_depth == 10
            {
                fmt.base_video_format = 7;
                fmt.level = 2;
                fmt.custom_dimensions_flag = true;
                fmt.frame_width = h.width as u32;
                fmt.frame_height = h.height as u32;
            } else if matches(h, 1920, 1080, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 11;
                fmt.level = 3;
            } else if matches(h, 1920, 1080, C422, Fr25, 10) {
                fmt.base_video_format = 12;
                fmt.level = 3;
            }
        } else {
            if matches(h, 176, 120, C420, Fr15000_1001, 8) {
                fmt.base_video_format = 1;
                fmt.level = 1;
            } else if matches(h, 176, 144, C420, Fr25_2, 8) {
                fmt.base_video_format = 2;
                fmt.level = 1;
            } else if matches(h, 352, 240, C420, Fr15000_1001, 8) {
                fmt.base_video_format = 3;
                fmt.level = 1;
            } else if matches(h, 352, 288, C420, Fr25_2, 8) {
                fmt.base_video_format = 4;
                fmt.level = 1;
            } else if matches(h, 704, 480, C420, Fr15000_1001, 8) {
                fmt.base_video_format = 5;
                fmt.level = 1;
            } else if matches(h, 704, 576, C420, Fr25_2, 8) {
                fmt.base_video_format = 6;
                fmt.level = 1;
            } else if matches(h, 720, 480, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 7;
                fmt.level = 2;
                fmt.custom_scan_format_flag = true;
            } else if matches(h, 720, 576, C422, Fr25, 10) {
                fmt.base_video_format = 8;
                fmt.level = 2;
                fmt.custom_scan_format_flag = true;
            } else if matches(h, 720, 486, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 22;
                fmt.level = 2;
                fmt.custom_scan_format_flag = true;
            } else if matches(h, 1280, 720, C422, Fr60000_1001, 10) {
                fmt.base_video_format = 9;
                fmt.level = 3;
            } else if matches(h, 1280, 720, C422, Fr50, 10) {
                fmt.base_video_format = 10;
                fmt.level = 3;
            } else if matches(h, 1920, 1080, C422, Fr30000_1001, 10) {
                fmt.base_video_format = 11;
                fmt.level = 3;
                fmt.custom_scan_format_flag = true;
            } else if matches(h, 1920, 1080, C422, Fr25, 10) {
                fmt.base_video_format = 12;
                fmt.level = 3;
                fmt.custom_scan_format_flag = true;
            } else if matches(h, 1920, 1080, C422, Fr60000_1001, 10) {
                fmt.base_video_format = 13;
                fmt.level = 3;
            } else if matches(h, 1920, 1080, C422, Fr50, 10) {
                fmt.base_video_format = 14;
                fmt.level = 3;
            } else if matches(h, 1920, 1080, C422, Fr24000_1001, 10) {
                fmt.base_video_format = 21;
                fmt.level = 3;
            } else if matches(h, 2048, 1080, C444, Fr24, 12) {
                fmt.base_video_format = 15;
                fmt.level = 4;
            } else if matches(h, 2048, 1080, C444, Fr48, 12) {
                fmt.base_video_format = 15;
                fmt.level = 4;
                fmt.custom_frame_rate_flag = true;
                fmt.frame_rate = Some(Fr48);
            } else if matches(h, 4096, 2160, C444, Fr24, 12) {
                fmt.base_video_format = 16;
                fmt.level = 5;
            } else if matches(h, 3840, 2160, C422, Fr60000_1001, 10) {
                fmt.base_video_format = 17;
                fmt.level = 6;
            } else if matches(h, 3840, 2160, C422, Fr50, 10) {
                fmt.base_video_format = 18;
                fmt.level = 6;
            } else if matches(h, 7680, 4320, C422, Fr60000_1001, 10) {
                fmt.base_video_format = 19;
                fmt.level = 7;
            } else if matches(h, 7680, 4320, C422, Fr50, 10) {
                fmt.base_video_format = 20;
                fmt.level = 7;
            }
        }

        if fmt.base_video_format == 0 {
            if header.interlace {
                fmt.custom_scan_format_flag = true;
                fmt.source_sampling = 1;
            }
            if header.width != 640 || header.height != 480 {
                fmt.custom_dimensions_flag = true;
                fmt.frame_width = header.width as u32;
                fmt.frame_height = header.height as u32;
            }
            if header.frame_rate != Fr24000_1001 {
                fmt.custom_frame_rate_flag = true;
                fmt.frame_rate = Some(header.frame_rate);
            }
            if header.bit_depth != 8 {
                fmt.custom_signal_range_flag = true;
                fmt.bit_depth_code = signal_range_code(header.bit_depth)?;
            }
        }

        Ok(fmt)
    }

    pub(crate) fn write(&self, w: &mut BitWriter) -> Result<()> {
        w.write_uint(self.major_version);
        w.write_uint(self.minor_version);
        w.write_uint(self.profile);
        w.write_uint(self.level);
        w.write_uint(self.base_video_format);

        w.write_bool(self.custom_dimensions_flag);
        if self.custom_dimensions_flag {
            w.write_uint(self.frame_width);
            w.write_uint(self.frame_height);
        }

        w.write_bool(false); // custom_color_diff_sampling_format
        w.write_bool(self.custom_scan_format_flag);
        if self.custom_scan_format_flag {
            w.write_uint(self.source_sampling);
        }

        w.write_bool(self.custom_frame_rate_flag);
        if self.custom_frame_rate_flag {
            let rate = self
                .frame_rate
                .ok_or_else(|| Error::config("custom frame rate flag without a rate".to_string()))?;
            w.write_uint(rate.wire_index());
        }

        w.write_bool(false); // custom_pixel_aspect_ratio_flag
        w.write_bool(false); // custom_clean_area_flag
        w.write_bool(self.custom_signal_range_flag);
        if self.custom_signal_range_flag {
            w.write_uint(self.bit_depth_code);
        }
        w.write_bool(false); // custom_color_spec_flag

        w.write_uint(self.picture_coding_mode);
        w.align_to_byte();
        Ok(())
    }

    pub(crate) fn read(r: &mut BitReader) -> Result<Self> {
        let major_version = r.read_uint()?;
        let minor_version = r.read_uint()?;
        let profile = r.read_uint()?;
        let level = r.read_uint()?;
        let base_video_format = r.read_uint()?;

        let custom_dimensions_flag = r.read_bool()?;
        let (frame_width, frame_height) = if custom_dimensions_flag {
            (r.read_uint()?, r.read_uint()?)
        } else {
            (0, 0)
        };

        if r.read_bool()? {
            return Err(StreamError::UnsupportedFlag("custom_color_diff_sampling_format").into());
        }

        let custom_scan_format_flag = r.read_bool()?;
        let source_sampling = if custom_scan_format_flag {
            r.read_uint()?
        } else {
            0
        };

        let custom_frame_rate_flag = r.read_bool()?;
        let frame_rate = if custom_frame_rate_flag {
            Some(FrameRate::from_wire_index(r.read_uint()?)?)
        } else {
            None
        };

        if r.read_bool()? {
            return Err(StreamError::UnsupportedFlag("custom_pixel_aspect_ratio_flag").into());
        }
        if r.read_bool()? {
            return Err(StreamError::UnsupportedFlag("custom_clean_area_flag").into());
        }

        let custom_signal_range_flag = r.read_bool()?;
        let bit_depth_code = if custom_signal_range_flag {
            r.read_uint()?
        } else {
            0
        };

        if r.read_bool()? {
            return Err(StreamError::UnsupportedFlag("custom_color_spec_flag").into());
        }

        let picture_coding_mode = r.read_uint()?;
        r.align_to_byte();

        Ok(VideoFormat {
            major_version,
            minor_version,
            profile,
            level,
            base_video_format,
            custom_dimensions_flag,
            frame_width,
            frame_height,
            custom_scan_format_flag,
            source_sampling,
            custom_frame_rate_flag,
            frame_rate,
            custom_signal_range_flag,
            bit_depth_code,
            picture_coding_mode,
        })
    }

    /// Expand the wire projection back into a source description.
    pub(crate) fn into_header(self) -> Result<SequenceHeader> {
        let base: &BaseVideoFormat = BASE_VIDEO_FORMATS
            .get(self.base_video_format as usize)
            .ok_or(StreamError::UnknownBaseVideoFormat(self.base_video_format))?;

        let mut header = SequenceHeader::new(
            Profile::from_wire_value(self.profile),
            base.height as usize,
            base.width as usize,
            base.chroma_format,
            base.interlace,
            base.frame_rate,
            base.top_field_first,
            base.bit_depth,
        );
        header.major_version = self.major_version;
        header.minor_version = self.minor_version;

        if self.custom_dimensions_flag {
            header.width = self.frame_width as usize;
            header.height = self.frame_height as usize;
        }
        if self.custom_scan_format_flag {
            header.interlace = self.source_sampling != 0;
        }
        if self.custom_signal_range_flag {
            header.bit_depth = bit_depth_from_signal_range(self.bit_depth_code)
                .ok_or(StreamError::UnknownSignalRange(self.bit_depth_code))?;
        }
        if let Some(rate) = self.frame_rate {
            header.frame_rate = rate;
        }
        Ok(header)
    }
}

/// Parse a sequence header data unit payload.
pub fn read_sequence_header(payload: &[u8]) -> Result<SequenceHeader> {
    let mut r = BitReader::new(payload);
    VideoFormat::read(&mut r)?.into_header()
}

/// Transform parameters and slice layout read from a picture data unit,
/// ahead of the slice payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PicturePreamble {
    pub picture_number: u32,
    pub kernel: WaveletKernel,
    pub depth: u32,
    pub slices_x: usize,
    pub slices_y: usize,
    pub slice_prefix: usize,
    pub slice_size_scalar: usize,
    pub slice_bytes: Option<Rational>,
}

/// Read a picture preamble; the slice I/O mode decides which rate
/// parameters follow the slice grid.
pub fn read_picture_preamble(r: &mut BitReader, mode: SliceIoMode) -> Result<PicturePreamble> {
    let picture_number = r.read_bits(32)?;
    let kernel = WaveletKernel::from_wavelet_index(r.read_uint()?)?;
    let depth = r.read_uint()?;
    let slices_x = r.read_uint()? as usize;
    let slices_y = r.read_uint()? as usize;

    let mut preamble = PicturePreamble {
        picture_number,
        kernel,
        depth,
        slices_x,
        slices_y,
        slice_prefix: 0,
        slice_size_scalar: 0,
        slice_bytes: None,
    };
    match mode {
        SliceIoMode::HqConstantRate | SliceIoMode::HqVariableRate => {
            preamble.slice_prefix = r.read_uint()? as usize;
            preamble.slice_size_scalar = r.read_uint()? as usize;
        }
        SliceIoMode::LowDelay => {
            let num = u64::from(r.read_uint()?);
            let den = u64::from(r.read_uint()?);
            if den == 0 {
                return Err(StreamError::UnexpectedEnd.into());
            }
            preamble.slice_bytes = Some(Rational::new(num, den));
        }
    }
    if r.read_bool()? {
        return Err(StreamError::UnsupportedFlag("custom_quant_matrix").into());
    }
    r.align_to_byte();
    Ok(preamble)
}

/// A picture wrapped with its transform parameters, ready for framing.
#[derive(Debug, Clone)]
pub struct WrappedPicture {
    pub picture_number: u32,
    pub kernel: WaveletKernel,
    pub depth: u32,
    pub slices_x: usize,
    pub slices_y: usize,
    pub slice_prefix: usize,
    pub slice_size_scalar: usize,
    /// Fractional per-slice byte budget; Low Delay only.
    pub slice_bytes: Option<Rational>,
    pub slices: Slices,
}

/// Stream-wide slice I/O context: which profile's slice layout is in
/// use, and the constant-rate byte budget when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceIo {
    LowDelay,
    HqConstantRate { picture_bytes: usize },
    HqVariableRate,
}

impl SliceIo {
    pub fn mode(self) -> SliceIoMode {
        match self {
            SliceIo::LowDelay => SliceIoMode::LowDelay,
            SliceIo::HqConstantRate { .. } => SliceIoMode::HqConstantRate,
            SliceIo::HqVariableRate => SliceIoMode::HqVariableRate,
        }
    }
}

/// Writer for a VC-2 sequence: frames data units with parse-info
/// chaining and owns the slice I/O context for its lifetime.
#[derive(Debug)]
pub struct StreamWriter<W: Write> {
    out: W,
    slice_io: SliceIo,
    prev_parse_offset: u32,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(out: W, slice_io: SliceIo) -> Self {
        Self {
            out,
            slice_io,
            prev_parse_offset: 0,
        }
    }

    pub fn slice_io(&self) -> SliceIo {
        self.slice_io
    }

    fn write_parse_info(&mut self, unit_type: DataUnitType, payload_len: usize) -> Result<()> {
        let next = if unit_type == DataUnitType::EndOfSequence {
            0
        } else {
            (PARSE_INFO_SIZE + payload_len) as u32
        };
        self.out.write_all(&PARSE_INFO_PREFIX)?;
        self.out.write_u8(unit_type.parse_code())?;
        self.out.write_u32::<BigEndian>(next)?;
        self.out.write_u32::<BigEndian>(self.prev_parse_offset)?;
        self.prev_parse_offset = next;
        Ok(())
    }

    /// Emit a sequence header data unit.
    pub fn write_sequence_header(&mut self, header: &SequenceHeader) -> Result<()> {
        let mut bw = BitWriter::new();
        VideoFormat::from_header(header)?.write(&mut bw)?;
        let payload = bw.into_data();
        self.write_parse_info(DataUnitType::SequenceHeader, payload.len())?;
        self.out.write_all(&payload)?;
        Ok(())
    }

    /// Emit a picture data unit: preamble, then the slices row-major.
    pub fn write_picture(&mut self, picture: &WrappedPicture) -> Result<()> {
        if picture.slices.rows() != picture.slices_y || picture.slices.cols() != picture.slices_x {
            return Err(Error::config(format!(
                "slice grid {}x{} does not match preamble {}x{}",
                picture.slices.rows(),
                picture.slices.cols(),
                picture.slices_y,
                picture.slices_x
            )));
        }
        let payload = self.encode_picture_payload(picture)?;
        let unit_type = match self.slice_io {
            SliceIo::LowDelay => DataUnitType::LdPicture,
            SliceIo::HqConstantRate { .. } | SliceIo::HqVariableRate => DataUnitType::HqPicture,
        };
        self.write_parse_info(unit_type, payload.len())?;
        self.out.write_all(&payload)?;
        Ok(())
    }

    /// Emit the end-of-sequence parse info and reset the chain.
    pub fn end_sequence(&mut self) -> Result<()> {
        self.write_parse_info(DataUnitType::EndOfSequence, 0)?;
        self.prev_parse_offset = 0;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn encode_picture_payload(&self, picture: &WrappedPicture) -> Result<Vec<u8>> {
        let mut bw = BitWriter::new();
        bw.write_bits(picture.picture_number, 32);
        bw.write_uint(picture.kernel.wavelet_index());
        bw.write_uint(picture.depth);
        bw.write_uint(picture.slices_x as u32);
        bw.write_uint(picture.slices_y as u32);
        match self.slice_io {
            SliceIo::LowDelay => {
                let bytes = picture.slice_bytes.ok_or_else(|| {
                    Error::config("Low Delay picture without a slice byte budget".to_string())
                })?;
                bw.write_uint(bytes.num as u32);
                bw.write_uint(bytes.den as u32);
            }
            SliceIo::HqConstantRate { .. } | SliceIo::HqVariableRate => {
                bw.write_uint(picture.slice_prefix as u32);
                bw.write_uint(picture.slice_size_scalar as u32);
            }
        }
        bw.write_bool(false); // custom_quant_matrix
        bw.align_to_byte();

        let slices = &picture.slices;
        match self.slice_io {
            SliceIo::LowDelay => {
                let bytes = picture.slice_bytes.ok_or_else(|| {
                    Error::config("Low Delay picture without a slice byte budget".to_string())
                })?;
                let budgets = slice_byte_budgets(picture.slices_y, picture.slices_x, &bytes);
                for r in 0..slices.rows() {
                    for c in 0..slices.cols() {
                        let budget = budgets[r * slices.cols() + c];
                        write_ld_slice(
                            &mut bw,
                            slices.block(r, c),
                            slices.q_index(r, c),
                            picture.depth,
                            budget,
                        )?;
                    }
                }
            }
            SliceIo::HqConstantRate { picture_bytes } => {
                let budgets =
                    hq_slice_byte_budgets(picture.slices_y, picture.slices_x, picture_bytes);
                for r in 0..slices.rows() {
                    for c in 0..slices.cols() {
                        let budget = budgets[r * slices.cols() + c];
                        write_hq_slice(
                            &mut bw,
                            slices.block(r, c),
                            slices.q_index(r, c),
                            picture.depth,
                            picture.slice_prefix,
                            picture.slice_size_scalar,
                            Some(budget),
                        )?;
                    }
                }
            }
            SliceIo::HqVariableRate => {
                for r in 0..slices.rows() {
                    for c in 0..slices.cols() {
                        write_hq_slice(
                            &mut bw,
                            slices.block(r, c),
                            slices.q_index(r, c),
                            picture.depth,
                            picture.slice_prefix,
                            picture.slice_size_scalar,
                            None,
                        )?;
                    }
                }
            }
        }
        Ok(bw.into_data())
    }
}

/// One framed data unit as found in the stream.
#[derive(Debug, Clone, Copy)]
pub struct RawDataUnit<'a> {
    pub unit_type: DataUnitType,
    pub next_parse_offset: u32,
    pub prev_parse_offset: u32,
    pub payload: &'a [u8],
}

/// Reader that walks the data units of a byte stream.
#[derive(Debug, Clone)]
pub struct StreamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Consume bytes until a parse-info prefix has been matched.
    ///
    /// Idempotent in the sense that it may be re-invoked after an error
    /// to skip a corrupt data unit and find the next one.
    pub fn synchronise(&mut self) -> Result<()> {
        while self.pos + PARSE_INFO_PREFIX.len() <= self.data.len() {
            if self.data[self.pos..self.pos + 4] == PARSE_INFO_PREFIX {
                self.pos += 4;
                return Ok(());
            }
            self.pos += 1;
        }
        self.pos = self.data.len();
        Err(Error::EndOfStream)
    }

    /// Read the parse info following a matched prefix and hand back the
    /// unit's payload.
    pub fn read_unit(&mut self) -> Result<RawDataUnit<'a>> {
        if self.pos + 9 > self.data.len() {
            self.pos = self.data.len();
            return Err(StreamError::UnexpectedEnd.into());
        }
        let unit_type = DataUnitType::from_parse_code(self.data[self.pos]);
        let field = |at: usize| {
            u32::from_be_bytes([
                self.data[at],
                self.data[at + 1],
                self.data[at + 2],
                self.data[at + 3],
            ])
        };
        let next_parse_offset = field(self.pos + 1);
        let prev_parse_offset = field(self.pos + 5);
        self.pos += 9;

        let payload = if unit_type == DataUnitType::EndOfSequence || next_parse_offset == 0 {
            if unit_type == DataUnitType::EndOfSequence {
                &self.data[self.pos..self.pos]
            } else {
                &self.data[self.pos..]
            }
        } else {
            if (next_parse_offset as usize) < PARSE_INFO_SIZE {
                return Err(StreamError::InvalidParseOffset(next_parse_offset).into());
            }
            let len = next_parse_offset as usize - PARSE_INFO_SIZE;
            if self.pos + len > self.data.len() {
                self.pos = self.data.len();
                return Err(StreamError::UnexpectedEnd.into());
            }
            &self.data[self.pos..self.pos + len]
        };
        self.pos += payload.len();

        Ok(RawDataUnit {
            unit_type,
            next_parse_offset,
            prev_parse_offset,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hd_interlaced_header() -> SequenceHeader {
        SequenceHeader::new(
            Profile::HighQuality,
            1080,
            1920,
            ChromaFormat::C422,
            true,
            FrameRate::Fr30000_1001,
            true,
            10,
        )
    }

    #[test]
    fn test_hd_interlaced_maps_to_base_11() {
        let fmt = VideoFormat::from_header(&hd_interlaced_header()).unwrap();
        assert_eq!(fmt.base_video_format, 11);
        assert_eq!(fmt.level, 3);
        assert!(!fmt.custom_scan_format_flag);
        assert!(!fmt.custom_dimensions_flag);
        assert_eq!(fmt.picture_coding_mode, 1);
        assert_eq!(fmt.profile, 3);
        assert_eq!(fmt.major_version, 2);
    }

    #[test]
    fn test_progressive_hd_sets_custom_scan() {
        let header = SequenceHeader::new(
            Profile::HighQuality,
            1080,
            1920,
            ChromaFormat::C422,
            false,
            FrameRate::Fr25,
            true,
            10,
        );
        let fmt = VideoFormat::from_header(&header).unwrap();
        assert_eq!(fmt.base_video_format, 12);
        assert!(fmt.custom_scan_format_flag);
        assert_eq!(fmt.source_sampling, 0);
        assert_eq!(fmt.picture_coding_mode, 0);
    }

    #[test]
    fn test_unmatched_format_falls_back_to_custom() {
        let header = SequenceHeader::new(
            Profile::HighQuality,
            256,
            256,
            ChromaFormat::C444,
            false,
            FrameRate::Fr25,
            false,
            10,
        );
        let fmt = VideoFormat::from_header(&header).unwrap();
        assert_eq!(fmt.base_video_format, 0);
        assert_eq!(fmt.level, 0);
        assert!(fmt.custom_dimensions_flag);
        assert_eq!((fmt.frame_width, fmt.frame_height), (256, 256));
        assert!(fmt.custom_frame_rate_flag);
        assert!(fmt.custom_signal_range_flag);
        assert_eq!(fmt.bit_depth_code, 3);
    }

    #[test]
    fn test_video_format_bit_roundtrip() {
        for header in [
            hd_interlaced_header(),
            SequenceHeader::new(
                Profile::LowDelay,
                486,
                720,
                ChromaFormat::C422,
                true,
                FrameRate::Fr30000_1001,
                false,
                10,
            ),
            SequenceHeader::new(
                Profile::HighQuality,
                480,
                640,
                ChromaFormat::C420,
                false,
                FrameRate::Fr24000_1001,
                false,
                8,
            ),
        ] {
            let fmt = VideoFormat::from_header(&header).unwrap();
            let mut bw = BitWriter::new();
            fmt.write(&mut bw).unwrap();
            let mut r = BitReader::new(bw.data());
            let read = VideoFormat::read(&mut r).unwrap();
            assert_eq!(read, fmt);

            let decoded = read.into_header().unwrap();
            assert_eq!(decoded.width, header.width);
            assert_eq!(decoded.height, header.height);
            assert_eq!(decoded.interlace, header.interlace);
            assert_eq!(decoded.bit_depth, header.bit_depth);
            assert_eq!(decoded.frame_rate, header.frame_rate);
        }
    }

    #[test]
    fn test_parse_info_chain_and_eos_bytes() {
        let mut writer = StreamWriter::new(Vec::new(), SliceIo::HqVariableRate);
        writer.write_sequence_header(&hd_interlaced_header()).unwrap();
        writer.end_sequence().unwrap();
        let bytes = writer.into_inner();

        // First unit: prefix, code 0x00, some next offset, prev == 0.
        assert_eq!(&bytes[0..4], &PARSE_INFO_PREFIX);
        assert_eq!(bytes[4], 0x00);
        let next = u32::from_be_bytes(bytes[5..9].try_into().unwrap());
        assert_eq!(u32::from_be_bytes(bytes[9..13].try_into().unwrap()), 0);
        assert_eq!(next as usize, PARSE_INFO_SIZE + (bytes.len() - 2 * PARSE_INFO_SIZE));

        // End of sequence: code 0x10, next == 0, prev == previous next.
        let eos = &bytes[next as usize..];
        assert_eq!(eos.len(), PARSE_INFO_SIZE);
        assert_eq!(&eos[0..4], &PARSE_INFO_PREFIX);
        assert_eq!(eos[4], 0x10);
        assert_eq!(u32::from_be_bytes(eos[5..9].try_into().unwrap()), 0);
        assert_eq!(u32::from_be_bytes(eos[9..13].try_into().unwrap()), next);
    }

    #[test]
    fn test_reader_synchronises_past_junk() {
        let mut writer = StreamWriter::new(Vec::new(), SliceIo::HqVariableRate);
        writer.write_sequence_header(&hd_interlaced_header()).unwrap();
        let unit = writer.into_inner();

        let mut stream = vec![0x00, 0x11, 0x22];
        stream.extend_from_slice(&unit);

        let mut reader = StreamReader::new(&stream);
        reader.synchronise().unwrap();
        assert_eq!(reader.position(), 7);
        let raw = reader.read_unit().unwrap();
        assert_eq!(raw.unit_type, DataUnitType::SequenceHeader);
        let header = read_sequence_header(raw.payload).unwrap();
        assert_eq!(header.width, 1920);
    }

    #[test]
    fn test_reader_reports_end_of_stream() {
        let mut reader = StreamReader::new(&[0x42, 0x42, 0x00, 0x42]);
        assert!(matches!(reader.synchronise(), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_preamble_roundtrip_hq() {
        let mut bw = BitWriter::new();
        bw.write_bits(7, 32);
        bw.write_uint(WaveletKernel::LeGall.wavelet_index());
        bw.write_uint(3);
        bw.write_uint(16);
        bw.write_uint(32);
        bw.write_uint(0);
        bw.write_uint(1);
        bw.write_bool(false);
        bw.align_to_byte();

        let mut r = BitReader::new(bw.data());
        let preamble = read_picture_preamble(&mut r, SliceIoMode::HqConstantRate).unwrap();
        assert_eq!(preamble.picture_number, 7);
        assert_eq!(preamble.kernel, WaveletKernel::LeGall);
        assert_eq!(preamble.depth, 3);
        assert_eq!((preamble.slices_x, preamble.slices_y), (16, 32));
        assert_eq!(preamble.slice_size_scalar, 1);
        assert!(preamble.slice_bytes.is_none());
    }

    #[test]
    fn test_preamble_rejects_custom_quant_matrix() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 32);
        bw.write_uint(1);
        bw.write_uint(2);
        bw.write_uint(4);
        bw.write_uint(4);
        bw.write_uint(0);
        bw.write_uint(1);
        bw.write_bool(true); // custom_quant_matrix
        bw.align_to_byte();

        let mut r = BitReader::new(bw.data());
        let err = read_picture_preamble(&mut r, SliceIoMode::HqVariableRate).unwrap_err();
        assert!(err.to_string().contains("custom_quant_matrix"));
    }

    #[test]
    fn test_preamble_roundtrip_ld() {
        let mut bw = BitWriter::new();
        bw.write_bits(1, 32);
        bw.write_uint(WaveletKernel::Haar0.wavelet_index());
        bw.write_uint(2);
        bw.write_uint(8);
        bw.write_uint(8);
        bw.write_uint(2048);
        bw.write_uint(64);
        bw.write_bool(false);
        bw.align_to_byte();

        let mut r = BitReader::new(bw.data());
        let preamble = read_picture_preamble(&mut r, SliceIoMode::LowDelay).unwrap();
        assert_eq!(preamble.slice_bytes, Some(Rational::new(2048, 64)));
        assert_eq!(preamble.slice_prefix, 0);
    }
}
