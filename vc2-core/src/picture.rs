//! Picture model: integer sample planes and three-plane pictures.
//!
//! Samples are `i32`: wide enough for the largest intermediate value of
//! any supported lifting stage at any supported bit depth.

use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};

/// Chroma sub-sampling structure of a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
    /// Three full-resolution planes carrying R, G, B directly.
    Rgb,
    /// 4:4:4, chroma at full resolution.
    C444,
    /// 4:2:2, chroma at half horizontal resolution.
    C422,
    /// 4:2:0, chroma at half resolution in both dimensions.
    C420,
}

impl ChromaFormat {
    /// Horizontal sub-sampling factor of the chroma planes.
    pub fn x_scale(self) -> usize {
        match self {
            ChromaFormat::Rgb | ChromaFormat::C444 => 1,
            ChromaFormat::C422 | ChromaFormat::C420 => 2,
        }
    }

    /// Vertical sub-sampling factor of the chroma planes.
    pub fn y_scale(self) -> usize {
        match self {
            ChromaFormat::Rgb | ChromaFormat::C444 | ChromaFormat::C422 => 1,
            ChromaFormat::C420 => 2,
        }
    }
}

impl std::fmt::Display for ChromaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChromaFormat::Rgb => "RGB",
            ChromaFormat::C444 => "4:4:4",
            ChromaFormat::C422 => "4:2:2",
            ChromaFormat::C420 => "4:2:0",
        };
        f.write_str(s)
    }
}

/// Immutable descriptor of a picture's dimensions and chroma structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureFormat {
    luma_height: usize,
    luma_width: usize,
    chroma_format: ChromaFormat,
}

impl PictureFormat {
    /// Create a new picture format.
    pub fn new(luma_height: usize, luma_width: usize, chroma_format: ChromaFormat) -> Self {
        Self {
            luma_height,
            luma_width,
            chroma_format,
        }
    }

    pub fn luma_height(&self) -> usize {
        self.luma_height
    }

    pub fn luma_width(&self) -> usize {
        self.luma_width
    }

    /// Chroma plane height, derived from luma and the chroma format.
    pub fn chroma_height(&self) -> usize {
        self.luma_height / self.chroma_format.y_scale()
    }

    /// Chroma plane width, derived from luma and the chroma format.
    pub fn chroma_width(&self) -> usize {
        self.luma_width / self.chroma_format.x_scale()
    }

    pub fn chroma_format(&self) -> ChromaFormat {
        self.chroma_format
    }
}

/// A rectangular array of integer samples, indexed `[row][col]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    height: usize,
    width: usize,
    data: Vec<i32>,
}

impl Plane {
    /// Create a zero-filled plane.
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            data: vec![0; height * width],
        }
    }

    /// Create a plane from row-major sample data.
    pub fn from_vec(height: usize, width: usize, data: Vec<i32>) -> Result<Self> {
        if data.len() != height * width {
            return Err(Error::config(format!(
                "plane data length {} does not match {}x{}",
                data.len(),
                height,
                width
            )));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// One row of samples.
    pub fn row(&self, y: usize) -> &[i32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// One row of samples, mutable.
    pub fn row_mut(&mut self, y: usize) -> &mut [i32] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    /// All samples in row-major order.
    pub fn data(&self) -> &[i32] {
        &self.data
    }
}

impl Index<(usize, usize)> for Plane {
    type Output = i32;

    fn index(&self, (y, x): (usize, usize)) -> &i32 {
        &self.data[y * self.width + x]
    }
}

impl IndexMut<(usize, usize)> for Plane {
    fn index_mut(&mut self, (y, x): (usize, usize)) -> &mut i32 {
        &mut self.data[y * self.width + x]
    }
}

/// A three-plane picture (Y, C1, C2) with a declared format.
///
/// For the RGB chroma format the three planes carry R, G and B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    format: PictureFormat,
    y: Plane,
    c1: Plane,
    c2: Plane,
}

impl Picture {
    /// Create a zero-filled picture of the given format.
    pub fn new(format: PictureFormat) -> Self {
        Self {
            format,
            y: Plane::new(format.luma_height(), format.luma_width()),
            c1: Plane::new(format.chroma_height(), format.chroma_width()),
            c2: Plane::new(format.chroma_height(), format.chroma_width()),
        }
    }

    /// Create a picture from three planes, validating their shapes
    /// against the declared format.
    pub fn from_planes(format: PictureFormat, y: Plane, c1: Plane, c2: Plane) -> Result<Self> {
        let check = |name, plane: &Plane, h, w| {
            if plane.height() != h || plane.width() != w {
                Err(Error::config(format!(
                    "{} plane is {}x{}, format requires {}x{}",
                    name,
                    plane.height(),
                    plane.width(),
                    h,
                    w
                )))
            } else {
                Ok(())
            }
        };
        check("luma", &y, format.luma_height(), format.luma_width())?;
        check("c1", &c1, format.chroma_height(), format.chroma_width())?;
        check("c2", &c2, format.chroma_height(), format.chroma_width())?;
        Ok(Self { format, y, c1, c2 })
    }

    pub fn format(&self) -> &PictureFormat {
        &self.format
    }

    pub fn y(&self) -> &Plane {
        &self.y
    }

    pub fn c1(&self) -> &Plane {
        &self.c1
    }

    pub fn c2(&self) -> &Plane {
        &self.c2
    }

    pub fn y_mut(&mut self) -> &mut Plane {
        &mut self.y
    }

    pub fn c1_mut(&mut self) -> &mut Plane {
        &mut self.c1
    }

    pub fn c2_mut(&mut self) -> &mut Plane {
        &mut self.c2
    }

    /// The three planes in coding order.
    pub fn planes(&self) -> [&Plane; 3] {
        [&self.y, &self.c1, &self.c2]
    }

    /// The three planes in coding order, mutable.
    pub fn planes_mut(&mut self) -> [&mut Plane; 3] {
        [&mut self.y, &mut self.c1, &mut self.c2]
    }

    /// Split an interlaced frame into (top, bottom) fields by taking
    /// alternate sample rows of every plane.
    pub fn split_fields(&self) -> Result<(Picture, Picture)> {
        let f = &self.format;
        if f.luma_height() % 2 != 0 || f.chroma_height() % 2 != 0 {
            return Err(Error::config(format!(
                "cannot split {}x{} {} frame into fields",
                f.luma_height(),
                f.luma_width(),
                f.chroma_format()
            )));
        }
        let field_format =
            PictureFormat::new(f.luma_height() / 2, f.luma_width(), f.chroma_format());
        let (ty, by) = split_plane(&self.y);
        let (tc1, bc1) = split_plane(&self.c1);
        let (tc2, bc2) = split_plane(&self.c2);
        Ok((
            Picture::from_planes(field_format, ty, tc1, tc2)?,
            Picture::from_planes(field_format, by, bc1, bc2)?,
        ))
    }

    /// Weave two fields back into a full frame. Inverse of
    /// [`split_fields`](Picture::split_fields).
    pub fn weave_fields(top: &Picture, bottom: &Picture) -> Result<Picture> {
        if top.format != bottom.format {
            return Err(Error::config("field formats do not match".to_string()));
        }
        let f = top.format;
        let frame_format =
            PictureFormat::new(f.luma_height() * 2, f.luma_width(), f.chroma_format());
        Picture::from_planes(
            frame_format,
            weave_plane(&top.y, &bottom.y),
            weave_plane(&top.c1, &bottom.c1),
            weave_plane(&top.c2, &bottom.c2),
        )
    }
}

fn split_plane(src: &Plane) -> (Plane, Plane) {
    let mut top = Plane::new(src.height() / 2, src.width());
    let mut bottom = Plane::new(src.height() / 2, src.width());
    for y in 0..src.height() {
        let dst = if y % 2 == 0 {
            top.row_mut(y / 2)
        } else {
            bottom.row_mut(y / 2)
        };
        dst.copy_from_slice(src.row(y));
    }
    (top, bottom)
}

fn weave_plane(top: &Plane, bottom: &Plane) -> Plane {
    let mut out = Plane::new(top.height() * 2, top.width());
    for y in 0..top.height() {
        out.row_mut(2 * y).copy_from_slice(top.row(y));
        out.row_mut(2 * y + 1).copy_from_slice(bottom.row(y));
    }
    out
}

/// A 2-D arrangement of pictures, one per coded slice.
#[derive(Debug, Clone)]
pub struct PictureArray {
    rows: usize,
    cols: usize,
    blocks: Vec<Picture>,
}

impl PictureArray {
    /// Build from a row-major block vector.
    pub fn from_blocks(rows: usize, cols: usize, blocks: Vec<Picture>) -> Result<Self> {
        if blocks.len() != rows * cols {
            return Err(Error::config(format!(
                "expected {}x{} blocks, got {}",
                rows,
                cols,
                blocks.len()
            )));
        }
        Ok(Self { rows, cols, blocks })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Block at slice coordinates `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> &Picture {
        &self.blocks[row * self.cols + col]
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut Picture {
        &mut self.blocks[row * self.cols + col]
    }

    /// Iterate blocks in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &Picture> {
        self.blocks.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chroma_dimensions() {
        let f = PictureFormat::new(1080, 1920, ChromaFormat::C422);
        assert_eq!(f.chroma_height(), 1080);
        assert_eq!(f.chroma_width(), 960);

        let f = PictureFormat::new(576, 704, ChromaFormat::C420);
        assert_eq!(f.chroma_height(), 288);
        assert_eq!(f.chroma_width(), 352);
    }

    #[test]
    fn test_from_planes_validates_shapes() {
        let format = PictureFormat::new(4, 8, ChromaFormat::C422);
        let y = Plane::new(4, 8);
        let good = Picture::from_planes(format, y.clone(), Plane::new(4, 4), Plane::new(4, 4));
        assert!(good.is_ok());

        let bad = Picture::from_planes(format, y, Plane::new(4, 8), Plane::new(4, 4));
        assert!(bad.is_err());
    }

    #[test]
    fn test_plane_indexing() {
        let mut plane = Plane::new(2, 3);
        plane[(1, 2)] = 42;
        assert_eq!(plane[(1, 2)], 42);
        assert_eq!(plane.row(1), &[0, 0, 42]);
    }

    #[test]
    fn test_field_split_weave_roundtrip() {
        let format = PictureFormat::new(4, 4, ChromaFormat::C420);
        let mut frame = Picture::new(format);
        for y in 0..4 {
            for x in 0..4 {
                frame.y_mut()[(y, x)] = (y * 10 + x) as i32;
            }
        }
        for y in 0..2 {
            for x in 0..2 {
                frame.c1_mut()[(y, x)] = (100 + y * 10 + x) as i32;
                frame.c2_mut()[(y, x)] = (200 + y * 10 + x) as i32;
            }
        }

        let (top, bottom) = frame.split_fields().unwrap();
        assert_eq!(top.y().row(0), frame.y().row(0));
        assert_eq!(bottom.y().row(0), frame.y().row(1));

        let rewoven = Picture::weave_fields(&top, &bottom).unwrap();
        assert_eq!(rewoven, frame);
    }

    #[test]
    fn test_picture_array_geometry() {
        let format = PictureFormat::new(2, 2, ChromaFormat::C444);
        let blocks = vec![Picture::new(format); 6];
        let arr = PictureArray::from_blocks(2, 3, blocks).unwrap();
        assert_eq!(arr.rows(), 2);
        assert_eq!(arr.cols(), 3);
        assert!(PictureArray::from_blocks(2, 2, vec![Picture::new(format); 6]).is_err());
    }
}
