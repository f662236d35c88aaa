//! RGB to Y'CbCr conversion (BT.601 fixed point) and 1-2-1 chroma
//! resampling for 4:2:2 and 4:2:0 sources.
//!
//! Filter borders use padded buffers holding the neutral chroma value,
//! so every tap reads initialised storage.

use vc2_core::{ChromaFormat, Error, Picture, PictureFormat, Plane, Result};

use crate::ppm::PpmImage;

fn clip(value: i32, max: i32) -> i32 {
    value.clamp(0, max)
}

fn rgb_to_ycbcr(r: i32, g: i32, b: i32) -> (i32, i32, i32) {
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (y, u, v)
}

fn ycbcr_to_rgb(y: i32, u: i32, v: i32) -> (i32, i32, i32) {
    let r = (298 * y + 409 * v + 128) >> 8;
    let g = (298 * y - 100 * u - 208 * v + 128) >> 8;
    let b = (298 * y + 516 * u + 128) >> 8;
    (r, g, b)
}

fn check_geometry(width: usize, height: usize, chroma: ChromaFormat) -> Result<()> {
    if width % chroma.x_scale() != 0 || height % chroma.y_scale() != 0 {
        return Err(Error::config(format!(
            "{width}x{height} image cannot be subsampled to {chroma}"
        )));
    }
    Ok(())
}

/// Convert an interleaved RGB image into a coding picture of the given
/// chroma format.
pub fn picture_from_rgb(image: &PpmImage, chroma: ChromaFormat) -> Result<Picture> {
    let (w, h) = (image.width, image.height);
    check_geometry(w, h, chroma)?;
    let max = image.max_value as i32;
    let format = PictureFormat::new(h, w, chroma);
    let mut picture = Picture::new(format);

    let rgb = |line: usize, pixel: usize| {
        let base = (line * w + pixel) * 3;
        (
            i32::from(image.pixels[base]),
            i32::from(image.pixels[base + 1]),
            i32::from(image.pixels[base + 2]),
        )
    };

    match chroma {
        ChromaFormat::Rgb => {
            for line in 0..h {
                for pixel in 0..w {
                    let (r, g, b) = rgb(line, pixel);
                    picture.y_mut()[(line, pixel)] = r;
                    picture.c1_mut()[(line, pixel)] = g;
                    picture.c2_mut()[(line, pixel)] = b;
                }
            }
        }
        ChromaFormat::C444 => {
            for line in 0..h {
                for pixel in 0..w {
                    let (r, g, b) = rgb(line, pixel);
                    let (y, u, v) = rgb_to_ycbcr(r, g, b);
                    picture.y_mut()[(line, pixel)] = clip(y, max);
                    picture.c1_mut()[(line, pixel)] = clip(u, max);
                    picture.c2_mut()[(line, pixel)] = clip(v, max);
                }
            }
        }
        ChromaFormat::C422 => {
            // One-sample borders at the neutral value; interior offset 1.
            let mut u_line = vec![128i32; w + 2];
            let mut v_line = vec![128i32; w + 2];
            for line in 0..h {
                for pixel in 0..w {
                    let (r, g, b) = rgb(line, pixel);
                    let (y, u, v) = rgb_to_ycbcr(r, g, b);
                    picture.y_mut()[(line, pixel)] = clip(y, max);
                    u_line[pixel + 1] = u;
                    v_line[pixel + 1] = v;
                }
                for pixel in (0..w).step_by(2) {
                    let u = (u_line[pixel] + 2 * u_line[pixel + 1] + u_line[pixel + 2] + 2) >> 2;
                    let v = (v_line[pixel] + 2 * v_line[pixel + 1] + v_line[pixel + 2] + 2) >> 2;
                    picture.c1_mut()[(line, pixel / 2)] = clip(u, max);
                    picture.c2_mut()[(line, pixel / 2)] = clip(v, max);
                }
            }
        }
        ChromaFormat::C420 => {
            let uv_w = w + 2;
            let mut u_image = vec![128i32; (h + 2) * uv_w];
            let mut v_image = vec![128i32; (h + 2) * uv_w];
            let mut u_line = vec![128i32; w + 2];
            let mut v_line = vec![128i32; w + 2];
            for line in 0..h {
                for pixel in 0..w {
                    let (r, g, b) = rgb(line, pixel);
                    let (y, u, v) = rgb_to_ycbcr(r, g, b);
                    picture.y_mut()[(line, pixel)] = clip(y, max);
                    u_line[pixel + 1] = u;
                    v_line[pixel + 1] = v;
                }
                for pixel in (0..w).step_by(2) {
                    let idx = (line + 1) * uv_w + pixel + 1;
                    u_image[idx] =
                        (u_line[pixel] + 2 * u_line[pixel + 1] + u_line[pixel + 2] + 2) >> 2;
                    v_image[idx] =
                        (v_line[pixel] + 2 * v_line[pixel + 1] + v_line[pixel + 2] + 2) >> 2;
                }
            }
            for line in (0..h).step_by(2) {
                for pixel in (0..w).step_by(2) {
                    let idx = (line + 1) * uv_w + pixel + 1;
                    let u = (u_image[idx - uv_w] + 2 * u_image[idx] + u_image[idx + uv_w] + 2) >> 2;
                    let v = (v_image[idx - uv_w] + 2 * v_image[idx] + v_image[idx + uv_w] + 2) >> 2;
                    picture.c1_mut()[(line / 2, pixel / 2)] = clip(u, max);
                    picture.c2_mut()[(line / 2, pixel / 2)] = clip(v, max);
                }
            }
        }
    }
    Ok(picture)
}

fn clipped(plane: &Plane, max: i32) -> Plane {
    let mut out = plane.clone();
    for y in 0..out.height() {
        for v in out.row_mut(y) {
            *v = clip(*v, max);
        }
    }
    out
}

/// Convert a decoded picture back to interleaved RGB.
pub fn rgb_from_picture(picture: &Picture, max_value: u32) -> Result<PpmImage> {
    let format = *picture.format();
    let (w, h) = (format.luma_width(), format.luma_height());
    let chroma = format.chroma_format();
    let max = max_value as i32;
    let mut image = PpmImage::new(w, h, max_value);

    let y_plane = clipped(picture.y(), max);
    let u_plane = clipped(picture.c1(), max);
    let v_plane = clipped(picture.c2(), max);

    let mut store = |line: usize, pixel: usize, r: i32, g: i32, b: i32| {
        let base = (line * w + pixel) * 3;
        image.pixels[base] = clip(r, max) as u16;
        image.pixels[base + 1] = clip(g, max) as u16;
        image.pixels[base + 2] = clip(b, max) as u16;
    };

    match chroma {
        ChromaFormat::Rgb => {
            for line in 0..h {
                for pixel in 0..w {
                    store(
                        line,
                        pixel,
                        y_plane[(line, pixel)],
                        u_plane[(line, pixel)],
                        v_plane[(line, pixel)],
                    );
                }
            }
        }
        ChromaFormat::C444 => {
            for line in 0..h {
                for pixel in 0..w {
                    let y = y_plane[(line, pixel)] - 16;
                    let u = u_plane[(line, pixel)] - 128;
                    let v = v_plane[(line, pixel)] - 128;
                    let (r, g, b) = ycbcr_to_rgb(y, u, v);
                    store(line, pixel, r, g, b);
                }
            }
        }
        ChromaFormat::C422 => {
            let mut u_line = vec![0i32; w + 2];
            let mut v_line = vec![0i32; w + 2];
            for line in 0..h {
                for pixel in (0..w).step_by(2) {
                    u_line[pixel + 1] = u_plane[(line, pixel / 2)] - 128;
                    v_line[pixel + 1] = v_plane[(line, pixel / 2)] - 128;
                }
                for pixel in 0..w {
                    let y = y_plane[(line, pixel)] - 16;
                    let u = (u_line[pixel] + 2 * u_line[pixel + 1] + u_line[pixel + 2] + 1) >> 1;
                    let v = (v_line[pixel] + 2 * v_line[pixel + 1] + v_line[pixel + 2] + 1) >> 1;
                    let (r, g, b) = ycbcr_to_rgb(y, u, v);
                    store(line, pixel, r, g, b);
                }
            }
        }
        ChromaFormat::C420 => {
            let uv_w = w + 2;
            let mut u_image = vec![0i32; (h + 2) * uv_w];
            let mut v_image = vec![0i32; (h + 2) * uv_w];
            for line in (0..h).step_by(2) {
                for pixel in (0..w).step_by(2) {
                    let idx = (line + 1) * uv_w + pixel + 1;
                    u_image[idx] = u_plane[(line / 2, pixel / 2)] - 128;
                    v_image[idx] = v_plane[(line / 2, pixel / 2)] - 128;
                }
            }
            // Vertically interpolate the missing chroma lines.
            for line in (1..h).step_by(2) {
                for pixel in (0..w).step_by(2) {
                    let idx = (line + 1) * uv_w + pixel + 1;
                    u_image[idx] =
                        (u_image[idx - uv_w] + 2 * u_image[idx] + u_image[idx + uv_w] + 1) >> 1;
                    v_image[idx] =
                        (v_image[idx - uv_w] + 2 * v_image[idx] + v_image[idx + uv_w] + 1) >> 1;
                }
            }
            for line in 0..h {
                for pixel in 0..w {
                    let idx = (line + 1) * uv_w + pixel + 1;
                    let y = y_plane[(line, pixel)] - 16;
                    let u = (u_image[idx - 1] + 2 * u_image[idx] + u_image[idx + 1] + 1) >> 1;
                    let v = (v_image[idx - 1] + 2 * v_image[idx] + v_image[idx + 1] + 1) >> 1;
                    let (r, g, b) = ycbcr_to_rgb(y, u, v);
                    store(line, pixel, r, g, b);
                }
            }
        }
    }
    Ok(image)
}
