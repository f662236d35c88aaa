//! Dead-zone scalar quantisation of wavelet coefficients.
//!
//! The quantiser strength is selected by an index in `[0, 127]`. The
//! quantisation factor doubles every four index steps, with the
//! intermediate steps approximating quarter powers of two by rational
//! constants. Each subband offsets the index by its entry in the
//! quantisation matrix before the factor is looked up.

use vc2_core::{Error, Picture, Plane, Result};

use crate::tables;
use crate::types::WaveletKernel;
use crate::wavelet::subbands;

/// Quantisation factor for an index, scaled by 4.
///
/// `quant_factor(0) == 4`, and the value doubles every four steps.
pub fn quant_factor(index: u32) -> i64 {
    let base = 1i64 << (index / 4);
    match index % 4 {
        0 => 4 * base,
        1 => (503829 * base + 52958) / 105917,
        2 => (665857 * base + 58854) / 117708,
        3 => (440253 * base + 32722) / 65444,
        _ => unreachable!(),
    }
}

/// Reconstruction offset paired with [`quant_factor`].
pub fn quant_offset(index: u32) -> i64 {
    if index == 0 {
        1
    } else {
        (quant_factor(index) + 1) / 2
    }
}

/// Quantise a single coefficient with a precomputed factor.
///
/// Dead-zone: magnitudes below `factor/4` map to zero, and the
/// effective index 0 (factor 4) is the identity.
pub fn quantise(value: i32, factor: i64) -> i32 {
    let magnitude = (i64::from(value).abs() << 2) / factor;
    if value < 0 {
        -(magnitude as i32)
    } else {
        magnitude as i32
    }
}

/// Invert [`quantise`] up to the dead-zone reconstruction bias.
pub fn dequantise(value: i32, factor: i64, offset: i64) -> i32 {
    match value.cmp(&0) {
        std::cmp::Ordering::Greater => ((i64::from(value) * factor + offset) >> 2) as i32,
        std::cmp::Ordering::Less => (-((i64::from(-value) * factor + offset) >> 2)) as i32,
        std::cmp::Ordering::Equal => 0,
    }
}

/// Per-subband quantiser index offsets: one entry for the DC band, then
/// a triple (HL, LH, HH) per level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantMatrix {
    depth: u32,
    values: Vec<u32>,
}

impl QuantMatrix {
    /// Create a matrix, validating the `1 + 3*depth` length rule.
    pub fn new(depth: u32, values: Vec<u32>) -> Result<Self> {
        if values.len() != 1 + 3 * depth as usize {
            return Err(Error::config(format!(
                "quantisation matrix for depth {} must have {} entries, got {}",
                depth,
                1 + 3 * depth,
                values.len()
            )));
        }
        Ok(Self { depth, values })
    }

    /// The VC-2 default matrix for a kernel and depth.
    pub fn default_for(kernel: WaveletKernel, depth: u32) -> Result<Self> {
        Self::new(depth, tables::default_matrix_values(kernel, depth)?.to_vec())
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Effective quantiser index for one subband.
    pub fn effective_index(&self, index: u8, matrix_index: usize) -> u32 {
        u32::from(index).saturating_sub(self.values[matrix_index])
    }
}

fn for_each_band_coefficient(
    plane: &mut Plane,
    depth: u32,
    mut f: impl FnMut(usize, usize, usize) -> i32,
) {
    for band in subbands(depth) {
        for y in (band.y_offset..plane.height()).step_by(band.stride) {
            for x in (band.x_offset..plane.width()).step_by(band.stride) {
                plane[(y, x)] = f(band.matrix_index, y, x);
            }
        }
    }
}

fn check_alignment(picture: &Picture, depth: u32) -> Result<()> {
    let unit = 1usize << depth;
    for plane in picture.planes() {
        if plane.height() % unit != 0 || plane.width() % unit != 0 {
            return Err(Error::config(format!(
                "{}x{} plane is not a multiple of 2^{}",
                plane.height(),
                plane.width(),
                depth
            )));
        }
    }
    Ok(())
}

/// Quantise a whole transform with a single index.
pub fn quantise_transform(
    transform: &Picture,
    index: u8,
    matrix: &QuantMatrix,
) -> Result<Picture> {
    check_alignment(transform, matrix.depth())?;
    let mut out = transform.clone();
    let factors: Vec<i64> = (0..matrix.values.len())
        .map(|b| quant_factor(matrix.effective_index(index, b)))
        .collect();
    for plane in out.planes_mut() {
        let src = plane.clone();
        for_each_band_coefficient(plane, matrix.depth(), |band, y, x| {
            quantise(src[(y, x)], factors[band])
        });
    }
    Ok(out)
}

/// Quantise a transform with one index per slice.
///
/// Coefficients are mapped to slices by spatial position; the indices
/// are row-major over the `y_slices` x `x_slices` grid.
pub fn quantise_transform_indexed(
    transform: &Picture,
    indices: &[u8],
    y_slices: usize,
    x_slices: usize,
    matrix: &QuantMatrix,
) -> Result<Picture> {
    apply_indexed(transform, indices, y_slices, x_slices, matrix, quantise_one)
}

/// Invert [`quantise_transform_indexed`].
pub fn dequantise_transform_indexed(
    transform: &Picture,
    indices: &[u8],
    y_slices: usize,
    x_slices: usize,
    matrix: &QuantMatrix,
) -> Result<Picture> {
    apply_indexed(transform, indices, y_slices, x_slices, matrix, dequantise_one)
}

fn quantise_one(value: i32, effective: u32) -> i32 {
    quantise(value, quant_factor(effective))
}

fn dequantise_one(value: i32, effective: u32) -> i32 {
    dequantise(value, quant_factor(effective), quant_offset(effective))
}

fn apply_indexed(
    transform: &Picture,
    indices: &[u8],
    y_slices: usize,
    x_slices: usize,
    matrix: &QuantMatrix,
    op: fn(i32, u32) -> i32,
) -> Result<Picture> {
    check_alignment(transform, matrix.depth())?;
    if indices.len() != y_slices * x_slices {
        return Err(Error::config(format!(
            "expected {} slice indices, got {}",
            y_slices * x_slices,
            indices.len()
        )));
    }
    let mut out = transform.clone();
    for plane in out.planes_mut() {
        let tile_h = plane.height() / y_slices;
        let tile_w = plane.width() / x_slices;
        let src = plane.clone();
        for_each_band_coefficient(plane, matrix.depth(), |band, y, x| {
            let slice = (y / tile_h) * x_slices + x / tile_w;
            let effective = matrix.effective_index(indices[slice], band);
            op(src[(y, x)], effective)
        });
    }
    Ok(out)
}
