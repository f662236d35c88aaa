//! Forward and inverse 2-D discrete wavelet transform.
//!
//! The transform keeps coefficients in-place in the interleaved (Mallat)
//! layout: after each level, low-pass samples stay on the even lattice
//! positions and high-pass samples on the odd positions of that level's
//! stride. A spatial tile whose sides are multiples of `2^depth` then
//! contains exactly its share of every subband, which is what makes
//! slice partitioning a plain tiling.
//!
//! All kernels are integer lifting filters with the coefficients given
//! by VC-2. Plane edges use whole-sample symmetric extension.

use vc2_core::{Error, Picture, PictureFormat, Plane, Result};

use crate::types::WaveletKernel;

/// Deepest decomposition supported; the default quantisation matrices
/// are tabled up to this depth.
pub const MAX_DEPTH: u32 = 4;

/// Smallest multiple of `2^depth` that is >= `size`.
pub fn padded_size(size: usize, depth: u32) -> usize {
    let unit = 1usize << depth;
    size.div_ceil(unit) * unit
}

/// Location of one subband within the interleaved transform layout.
///
/// Coefficients of the band sit at `(y_offset + j*stride, x_offset +
/// i*stride)`. `matrix_index` is the band's position in the
/// quantisation matrix: 0 for DC, then triples (HL, LH, HH) per level
/// from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subband {
    pub matrix_index: usize,
    pub y_offset: usize,
    pub x_offset: usize,
    pub stride: usize,
}

/// All subbands of a depth-`depth` transform in coding order.
pub fn subbands(depth: u32) -> Vec<Subband> {
    let mut bands = vec![Subband {
        matrix_index: 0,
        y_offset: 0,
        x_offset: 0,
        stride: 1 << depth,
    }];
    for level in 1..=depth {
        let stride = 1usize << (depth - level + 1);
        let offset = stride >> 1;
        let base = 3 * (level as usize - 1) + 1;
        bands.push(Subband {
            matrix_index: base,
            y_offset: 0,
            x_offset: offset,
            stride,
        });
        bands.push(Subband {
            matrix_index: base + 1,
            y_offset: offset,
            x_offset: 0,
            stride,
        });
        bands.push(Subband {
            matrix_index: base + 2,
            y_offset: offset,
            x_offset: offset,
            stride,
        });
    }
    bands
}

fn check_config(kernel: WaveletKernel, depth: u32) -> Result<()> {
    if kernel == WaveletKernel::Null {
        return Err(Error::config(
            "the null kernel is diagnostic only and cannot code pictures".to_string(),
        ));
    }
    if depth > MAX_DEPTH {
        return Err(Error::config(format!(
            "wavelet depth {depth} exceeds the supported maximum {MAX_DEPTH}"
        )));
    }
    Ok(())
}

/// Padded dimensions and chroma alignment for a transform of `depth`
/// levels over pictures of `format`.
pub fn transform_format(format: &PictureFormat, depth: u32) -> Result<PictureFormat> {
    let padded_h = padded_size(format.luma_height(), depth);
    let padded_w = padded_size(format.luma_width(), depth);
    let chroma = format.chroma_format();
    let unit = 1usize << depth;
    if (padded_h / chroma.y_scale()) % unit != 0 || (padded_w / chroma.x_scale()) % unit != 0 {
        return Err(Error::config(format!(
            "padded {}x{} {} picture leaves chroma planes unaligned to 2^{}",
            padded_h, padded_w, chroma, depth
        )));
    }
    Ok(PictureFormat::new(padded_h, padded_w, chroma))
}

/// Forward transform: pad each plane by edge replication, then apply
/// `depth` levels of the kernel's lifting steps along rows and columns.
pub fn analysis(picture: &Picture, kernel: WaveletKernel, depth: u32) -> Result<Picture> {
    check_config(kernel, depth)?;
    let format = transform_format(picture.format(), depth)?;

    let mut y = pad_plane(picture.y(), format.luma_height(), format.luma_width());
    let mut c1 = pad_plane(picture.c1(), format.chroma_height(), format.chroma_width());
    let mut c2 = pad_plane(picture.c2(), format.chroma_height(), format.chroma_width());
    forward_plane(&mut y, kernel, depth);
    forward_plane(&mut c1, kernel, depth);
    forward_plane(&mut c2, kernel, depth);
    Picture::from_planes(format, y, c1, c2)
}

/// Inverse transform: undo `depth` levels of lifting, then crop to
/// `out_format`.
pub fn synthesis(
    transform: &Picture,
    kernel: WaveletKernel,
    depth: u32,
    out_format: PictureFormat,
) -> Result<Picture> {
    check_config(kernel, depth)?;

    let mut y = transform.y().clone();
    let mut c1 = transform.c1().clone();
    let mut c2 = transform.c2().clone();
    inverse_plane(&mut y, kernel, depth);
    inverse_plane(&mut c1, kernel, depth);
    inverse_plane(&mut c2, kernel, depth);
    Picture::from_planes(
        out_format,
        crop_plane(&y, out_format.luma_height(), out_format.luma_width()),
        crop_plane(&c1, out_format.chroma_height(), out_format.chroma_width()),
        crop_plane(&c2, out_format.chroma_height(), out_format.chroma_width()),
    )
}

/// Extend a plane to `height`x`width` by replicating the last row and
/// column.
fn pad_plane(plane: &Plane, height: usize, width: usize) -> Plane {
    let mut out = Plane::new(height, width);
    for y in 0..height {
        let src_y = y.min(plane.height() - 1);
        let src = plane.row(src_y);
        let dst = out.row_mut(y);
        dst[..plane.width()].copy_from_slice(src);
        let last = src[plane.width() - 1];
        for v in dst[plane.width()..].iter_mut() {
            *v = last;
        }
    }
    out
}

fn crop_plane(plane: &Plane, height: usize, width: usize) -> Plane {
    let mut out = Plane::new(height, width);
    for y in 0..height {
        out.row_mut(y).copy_from_slice(&plane.row(y)[..width]);
    }
    out
}

fn forward_plane(plane: &mut Plane, kernel: WaveletKernel, depth: u32) {
    for level in 0..depth {
        transform_level(plane, kernel, 1 << level, true);
    }
}

fn inverse_plane(plane: &mut Plane, kernel: WaveletKernel, depth: u32) {
    for level in (0..depth).rev() {
        transform_level(plane, kernel, 1 << level, false);
    }
}

/// One decomposition level over the sub-lattice of the given stride.
fn transform_level(plane: &mut Plane, kernel: WaveletKernel, stride: usize, forward: bool) {
    let sub_h = plane.height() / stride;
    let sub_w = plane.width() / stride;
    let shift = kernel == WaveletKernel::Haar1;

    if forward {
        if shift {
            for y in (0..plane.height()).step_by(stride) {
                for x in (0..plane.width()).step_by(stride) {
                    plane[(y, x)] <<= 1;
                }
            }
        }
        let mut row_buf = vec![0i32; sub_w];
        for y in (0..plane.height()).step_by(stride) {
            gather_row(plane, y, stride, &mut row_buf);
            lift_1d(kernel, &mut row_buf, true);
            scatter_row(plane, y, stride, &row_buf);
        }
        let mut col_buf = vec![0i32; sub_h];
        for x in (0..plane.width()).step_by(stride) {
            gather_col(plane, x, stride, &mut col_buf);
            lift_1d(kernel, &mut col_buf, true);
            scatter_col(plane, x, stride, &col_buf);
        }
    } else {
        let mut col_buf = vec![0i32; sub_h];
        for x in (0..plane.width()).step_by(stride) {
            gather_col(plane, x, stride, &mut col_buf);
            lift_1d(kernel, &mut col_buf, false);
            scatter_col(plane, x, stride, &col_buf);
        }
        let mut row_buf = vec![0i32; sub_w];
        for y in (0..plane.height()).step_by(stride) {
            gather_row(plane, y, stride, &mut row_buf);
            lift_1d(kernel, &mut row_buf, false);
            scatter_row(plane, y, stride, &row_buf);
        }
        if shift {
            for y in (0..plane.height()).step_by(stride) {
                for x in (0..plane.width()).step_by(stride) {
                    let v = plane[(y, x)];
                    plane[(y, x)] = (v + 1) >> 1;
                }
            }
        }
    }
}

fn gather_row(plane: &Plane, y: usize, stride: usize, buf: &mut [i32]) {
    let row = plane.row(y);
    for (i, v) in buf.iter_mut().enumerate() {
        *v = row[i * stride];
    }
}

fn scatter_row(plane: &mut Plane, y: usize, stride: usize, buf: &[i32]) {
    let row = plane.row_mut(y);
    for (i, v) in buf.iter().enumerate() {
        row[i * stride] = *v;
    }
}

fn gather_col(plane: &Plane, x: usize, stride: usize, buf: &mut [i32]) {
    for (i, v) in buf.iter_mut().enumerate() {
        *v = plane[(i * stride, x)];
    }
}

fn scatter_col(plane: &mut Plane, x: usize, stride: usize, buf: &[i32]) {
    for (i, v) in buf.iter().enumerate() {
        plane[(i * stride, x)] = *v;
    }
}

/// Whole-sample symmetric extension; parity-preserving, so even indices
/// reflect onto even positions and odd onto odd.
fn reflect(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i >= n {
            i = 2 * (n - 1) - i;
        } else {
            return i as usize;
        }
    }
}

fn lift_1d(kernel: WaveletKernel, s: &mut [i32], forward: bool) {
    debug_assert!(s.len() >= 2 && s.len() % 2 == 0);
    match kernel {
        WaveletKernel::LeGall => legall_1d(s, forward),
        WaveletKernel::Dd97 => dd97_1d(s, forward),
        WaveletKernel::Dd137 => dd137_1d(s, forward),
        WaveletKernel::Haar0 | WaveletKernel::Haar1 => haar_1d(s, forward),
        WaveletKernel::Fidelity => fidelity_1d(s, forward),
        WaveletKernel::Daub97 => daub97_1d(s, forward),
        WaveletKernel::Null => {}
    }
}

/// Two-tap sum of the neighbours at `i-1` and `i+1`.
fn pair(s: &[i32], i: usize) -> i64 {
    let n = s.len();
    let a = s[reflect(i as isize - 1, n)] as i64;
    let b = s[reflect(i as isize + 1, n)] as i64;
    a + b
}

/// Four-tap combination `-1, 9, 9, -1` over the neighbours at
/// `i-3, i-1, i+1, i+3`.
fn quad(s: &[i32], i: usize) -> i64 {
    let n = s.len();
    let a = s[reflect(i as isize - 3, n)] as i64;
    let b = s[reflect(i as isize - 1, n)] as i64;
    let c = s[reflect(i as isize + 1, n)] as i64;
    let d = s[reflect(i as isize + 3, n)] as i64;
    -a + 9 * b + 9 * c - d
}

/// Eight-tap combination over neighbours at odd distances up to 7.
fn octet(s: &[i32], i: usize, taps: [i64; 4]) -> i64 {
    let n = s.len();
    let mut acc = 0i64;
    for (k, tap) in taps.iter().enumerate() {
        let d = (2 * k + 1) as isize;
        acc += tap * (s[reflect(i as isize - d, n)] as i64 + s[reflect(i as isize + d, n)] as i64);
    }
    acc
}

fn legall_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= ((pair(s, i) + 1) >> 1) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((pair(s, i) + 2) >> 2) as i32;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= ((pair(s, i) + 2) >> 2) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((pair(s, i) + 1) >> 1) as i32;
        }
    }
}

fn dd97_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= ((quad(s, i) + 8) >> 4) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((pair(s, i) + 2) >> 2) as i32;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= ((pair(s, i) + 2) >> 2) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((quad(s, i) + 8) >> 4) as i32;
        }
    }
}

fn dd137_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= ((quad(s, i) + 8) >> 4) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((quad(s, i) + 16) >> 5) as i32;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= ((quad(s, i) + 16) >> 5) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((quad(s, i) + 8) >> 4) as i32;
        }
    }
}

fn haar_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= s[i - 1];
        }
        for i in (0..n).step_by(2) {
            s[i] += (s[i + 1] + 1) >> 1;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= (s[i + 1] + 1) >> 1;
        }
        for i in (1..n).step_by(2) {
            s[i] += s[i - 1];
        }
    }
}

const FIDELITY_EVEN_TAPS: [i64; 4] = [161, -46, 21, -8];
const FIDELITY_ODD_TAPS: [i64; 4] = [81, -25, 10, -2];

fn fidelity_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= ((octet(s, i, FIDELITY_ODD_TAPS) + 128) >> 8) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((octet(s, i, FIDELITY_EVEN_TAPS) + 128) >> 8) as i32;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= ((octet(s, i, FIDELITY_EVEN_TAPS) + 128) >> 8) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((octet(s, i, FIDELITY_ODD_TAPS) + 128) >> 8) as i32;
        }
    }
}

fn daub97_1d(s: &mut [i32], forward: bool) {
    let n = s.len();
    if forward {
        for i in (1..n).step_by(2) {
            s[i] -= ((6497 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] -= ((217 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((3616 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((1817 * pair(s, i) + 2048) >> 12) as i32;
        }
    } else {
        for i in (0..n).step_by(2) {
            s[i] -= ((1817 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] -= ((3616 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (0..n).step_by(2) {
            s[i] += ((217 * pair(s, i) + 2048) >> 12) as i32;
        }
        for i in (1..n).step_by(2) {
            s[i] += ((6497 * pair(s, i) + 2048) >> 12) as i32;
        }
    }
}
