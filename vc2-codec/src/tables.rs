//! Compile-time constant tables: default quantisation matrices and the
//! base video format presets used by sequence headers.

use vc2_core::{ChromaFormat, Error, Result};

use crate::types::{FrameRate, WaveletKernel};
use crate::wavelet::MAX_DEPTH;

/// Default quantisation matrix values, one table per kernel indexed by
/// depth. Each row is DC followed by (HL, LH, HH) triples per level,
/// coarsest level first.
const DD97_MATRICES: [&[u32]; 5] = [
    &[0],
    &[5, 3, 3, 0],
    &[5, 3, 3, 0, 4, 4, 1],
    &[5, 3, 3, 0, 4, 4, 1, 6, 6, 3],
    &[5, 3, 3, 0, 4, 4, 1, 6, 6, 3, 7, 7, 4],
];

const LEGALL_MATRICES: [&[u32]; 5] = [
    &[0],
    &[4, 2, 2, 0],
    &[4, 2, 2, 0, 4, 4, 2],
    &[4, 2, 2, 0, 4, 4, 2, 5, 5, 3],
    &[4, 2, 2, 0, 4, 4, 2, 5, 5, 3, 7, 7, 5],
];

const DD137_MATRICES: [&[u32]; 5] = [
    &[0],
    &[5, 3, 3, 0],
    &[5, 3, 3, 0, 5, 5, 2],
    &[5, 3, 3, 0, 5, 5, 2, 6, 6, 3],
    &[5, 3, 3, 0, 5, 5, 2, 6, 6, 3, 8, 8, 5],
];

const HAAR0_MATRICES: [&[u32]; 5] = [
    &[0],
    &[4, 2, 2, 0],
    &[8, 6, 6, 4, 2, 2, 0],
    &[12, 10, 10, 8, 6, 6, 4, 2, 2, 0],
    &[16, 14, 14, 12, 10, 10, 8, 6, 6, 4, 2, 2, 0],
];

const HAAR1_MATRICES: [&[u32]; 5] = [
    &[0],
    &[4, 2, 2, 0],
    &[4, 2, 2, 0, 2, 2, 0],
    &[4, 2, 2, 0, 2, 2, 0, 2, 2, 0],
    &[4, 2, 2, 0, 2, 2, 0, 2, 2, 0, 2, 2, 0],
];

const FIDELITY_MATRICES: [&[u32]; 5] = [
    &[0],
    &[0, 4, 4, 8],
    &[0, 4, 4, 8, 8, 8, 12],
    &[0, 4, 4, 8, 8, 8, 12, 12, 12, 16],
    &[0, 4, 4, 8, 8, 8, 12, 12, 12, 16, 16, 16, 20],
];

const DAUB97_MATRICES: [&[u32]; 5] = [
    &[0],
    &[5, 3, 3, 0],
    &[5, 3, 3, 0, 4, 4, 1],
    &[5, 3, 3, 0, 4, 4, 1, 5, 5, 2],
    &[5, 3, 3, 0, 4, 4, 1, 5, 5, 2, 6, 6, 3],
];

/// Look up the default matrix for a kernel/depth pair.
pub(crate) fn default_matrix_values(kernel: WaveletKernel, depth: u32) -> Result<&'static [u32]> {
    if depth > MAX_DEPTH {
        return Err(Error::config(format!(
            "no default quantisation matrix for depth {depth}"
        )));
    }
    let table = match kernel {
        WaveletKernel::Dd97 => &DD97_MATRICES,
        WaveletKernel::LeGall => &LEGALL_MATRICES,
        WaveletKernel::Dd137 => &DD137_MATRICES,
        WaveletKernel::Haar0 => &HAAR0_MATRICES,
        WaveletKernel::Haar1 => &HAAR1_MATRICES,
        WaveletKernel::Fidelity => &FIDELITY_MATRICES,
        WaveletKernel::Daub97 => &DAUB97_MATRICES,
        WaveletKernel::Null => {
            return Err(Error::config(
                "the null kernel has no quantisation matrix".to_string(),
            ))
        }
    };
    Ok(table[depth as usize])
}

/// One entry of the base video format preset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseVideoFormat {
    pub width: u32,
    pub height: u32,
    pub chroma_format: ChromaFormat,
    pub interlace: bool,
    pub frame_rate: FrameRate,
    pub top_field_first: bool,
    pub bit_depth: u32,
}

const fn bvf(
    width: u32,
    height: u32,
    chroma_format: ChromaFormat,
    interlace: bool,
    frame_rate: FrameRate,
    top_field_first: bool,
    bit_depth: u32,
) -> BaseVideoFormat {
    BaseVideoFormat {
        width,
        height,
        chroma_format,
        interlace,
        frame_rate,
        top_field_first,
        bit_depth,
    }
}

/// Base video format presets, indexed by the wire value.
pub const BASE_VIDEO_FORMATS: [BaseVideoFormat; 23] = [
    bvf(640, 480, ChromaFormat::C420, false, FrameRate::Fr24000_1001, false, 8),
    bvf(176, 120, ChromaFormat::C420, false, FrameRate::Fr15000_1001, false, 8),
    bvf(176, 144, ChromaFormat::C420, false, FrameRate::Fr25_2, true, 8),
    bvf(352, 240, ChromaFormat::C420, false, FrameRate::Fr15000_1001, false, 8),
    bvf(352, 288, ChromaFormat::C420, false, FrameRate::Fr25_2, true, 8),
    bvf(704, 480, ChromaFormat::C420, false, FrameRate::Fr15000_1001, false, 8),
    bvf(704, 576, ChromaFormat::C420, false, FrameRate::Fr25_2, true, 8),
    bvf(720, 480, ChromaFormat::C422, true, FrameRate::Fr30000_1001, false, 10),
    bvf(720, 576, ChromaFormat::C422, true, FrameRate::Fr25, true, 10),
    bvf(1280, 720, ChromaFormat::C422, false, FrameRate::Fr60000_1001, true, 10),
    bvf(1280, 720, ChromaFormat::C422, false, FrameRate::Fr50, true, 10),
    bvf(1920, 1080, ChromaFormat::C422, true, FrameRate::Fr30000_1001, true, 10),
    bvf(1920, 1080, ChromaFormat::C422, true, FrameRate::Fr25, true, 10),
    bvf(1920, 1080, ChromaFormat::C422, false, FrameRate::Fr60000_1001, true, 10),
    bvf(1920, 1080, ChromaFormat::C422, false, FrameRate::Fr50, true, 10),
    bvf(2048, 1080, ChromaFormat::C444, false, FrameRate::Fr24, true, 12),
    bvf(4096, 2160, ChromaFormat::C444, false, FrameRate::Fr24, true, 12),
    bvf(3840, 2160, ChromaFormat::C422, false, FrameRate::Fr60000_1001, true, 10),
    bvf(3840, 2160, ChromaFormat::C422, false, FrameRate::Fr50, true, 10),
    bvf(7680, 4320, ChromaFormat::C422, false, FrameRate::Fr60000_1001, true, 10),
    bvf(7680, 4320, ChromaFormat::C422, false, FrameRate::Fr50, true, 10),
    bvf(1920, 1080, ChromaFormat::C422, false, FrameRate::Fr24000_1001, true, 10),
    bvf(720, 486, ChromaFormat::C422, true, FrameRate::Fr30000_1001, false, 10),
];

/// Signal-range code for a bit depth, as carried by the
/// custom-signal-range override.
pub fn signal_range_code(bit_depth: u32) -> Result<u32> {
    match bit_depth {
        8 => Ok(1),
        10 => Ok(3),
        12 => Ok(4),
        other => Err(Error::config(format!("invalid bit depth {other}"))),
    }
}

/// Bit depth for a signal-range code.
pub fn bit_depth_from_signal_range(code: u32) -> Option<u32> {
    match code {
        1 | 2 => Some(8),
        3 => Some(10),
        4 => Some(12),
        _ => None,
    }
}
