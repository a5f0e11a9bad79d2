//! Float image rasters and integer mask grids.

use serde::{Deserialize, Serialize};

use super::box3d::PixelRect;

/// Dense float image, row-major `height × width × channels`.
///
/// Pixel values are normalized to `[0, 1]`. Index math follows
/// `(y * width + x) * channels + c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneImage {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    /// `height * width * channels` values
    pub data: Vec<f32>,
}

impl SceneImage {
    /// Create a zero-filled image.
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
            data: vec![0.0; height * width * channels],
        }
    }

    /// Image shape as `(height, width)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[inline]
    fn index(&self, y: usize, x: usize, c: usize) -> usize {
        (y * self.width + x) * self.channels + c
    }

    /// Value at `(y, x, c)`.
    #[inline]
    pub fn get(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[self.index(y, x, c)]
    }

    /// Set the value at `(y, x, c)`.
    #[inline]
    pub fn set(&mut self, y: usize, x: usize, c: usize, value: f32) {
        let i = self.index(y, x, c);
        self.data[i] = value;
    }

    /// Copy out the sub-image covered by `rect` (clipped to bounds).
    pub fn crop(&self, rect: PixelRect) -> SceneImage {
        let rect = rect.clip(self.width, self.height);
        let (w, h) = (rect.width() as usize, rect.height() as usize);
        let mut out = SceneImage::new(h, w, self.channels);
        for y in 0..h {
            let src_y = rect.y1 as usize + y;
            let src_base = (src_y * self.width + rect.x1 as usize) * self.channels;
            let dst_base = y * w * self.channels;
            out.data[dst_base..dst_base + w * self.channels]
                .copy_from_slice(&self.data[src_base..src_base + w * self.channels]);
        }
        out
    }

    /// Paste `src` over the pixels of `rect`.
    ///
    /// `rect` may hang over the image edge; out-of-bounds destination rows
    /// and columns are skipped and the source is offset to match, so the
    /// visible part lands where it would if the raster were unbounded.
    pub fn paste(&mut self, rect: PixelRect, src: &SceneImage) {
        debug_assert_eq!(self.channels, src.channels);
        let clipped = rect.clip(self.width, self.height);
        if clipped.is_empty() {
            return;
        }
        let off_y = (clipped.y1 - rect.y1) as usize;
        let off_x = (clipped.x1 - rect.x1) as usize;
        let w = (clipped.width() as usize).min(src.width.saturating_sub(off_x));
        let h = (clipped.height() as usize).min(src.height.saturating_sub(off_y));
        for y in 0..h {
            let src_base = ((off_y + y) * src.width + off_x) * src.channels;
            let dst_y = clipped.y1 as usize + y;
            let dst_base = (dst_y * self.width + clipped.x1 as usize) * self.channels;
            self.data[dst_base..dst_base + w * self.channels]
                .copy_from_slice(&src.data[src_base..src_base + w * src.channels]);
        }
    }

    /// Set channel `c` of every pixel in `rect` (clipped) to `value`.
    pub fn fill_rect_channel(&mut self, rect: PixelRect, c: usize, value: f32) {
        let rect = rect.clip(self.width, self.height);
        for y in rect.y1..rect.y2 {
            for x in rect.x1..rect.x2 {
                self.set(y as usize, x as usize, c, value);
            }
        }
    }
}

/// Integer raster used for ownership, foreground and overlap masks.
///
/// Row-major `height × width`, same index math as [`SceneImage`] with a
/// single channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelGrid {
    pub height: usize,
    pub width: usize,
    /// `height * width` values
    pub data: Vec<i32>,
}

impl PixelGrid {
    /// Create a grid with every cell set to `fill`.
    pub fn new(height: usize, width: usize, fill: i32) -> Self {
        Self {
            height,
            width,
            data: vec![fill; height * width],
        }
    }

    /// Value at `(y, x)`.
    #[inline]
    pub fn get(&self, y: usize, x: usize) -> i32 {
        self.data[y * self.width + x]
    }

    /// Set the value at `(y, x)`.
    #[inline]
    pub fn set(&mut self, y: usize, x: usize, value: i32) {
        self.data[y * self.width + x] = value;
    }

    /// Set every cell in `rect` (clipped) to `value`.
    pub fn fill_rect(&mut self, rect: PixelRect, value: i32) {
        let rect = rect.clip(self.width, self.height);
        for y in rect.y1..rect.y2 {
            let base = y as usize * self.width;
            self.data[base + rect.x1 as usize..base + rect.x2 as usize].fill(value);
        }
    }

    /// Number of cells equal to `value`.
    pub fn count(&self, value: i32) -> usize {
        self.data.iter().filter(|&&v| v == value).count()
    }

    /// Clamp every cell to at most `max`.
    pub fn saturate(&mut self, max: i32) {
        for v in &mut self.data {
            if *v > max {
                *v = max;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_gradient_image(h: usize, w: usize, c: usize) -> SceneImage {
        let mut img = SceneImage::new(h, w, c);
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    img.set(y, x, ch, (y * w + x) as f32 + ch as f32 * 0.1);
                }
            }
        }
        img
    }

    #[test]
    fn test_crop_extracts_region() {
        let img = create_gradient_image(4, 5, 2);
        let crop = img.crop(PixelRect::new(1, 2, 4, 4));
        assert_eq!(crop.shape(), (2, 3));
        assert_relative_eq!(crop.get(0, 0, 0), img.get(2, 1, 0));
        assert_relative_eq!(crop.get(1, 2, 1), img.get(3, 3, 1));
    }

    #[test]
    fn test_crop_clips_to_bounds() {
        let img = create_gradient_image(4, 5, 1);
        let crop = img.crop(PixelRect::new(3, 2, 10, 10));
        assert_eq!(crop.shape(), (2, 2));
    }

    #[test]
    fn test_paste_round_trips_crop() {
        let img = create_gradient_image(4, 5, 2);
        let rect = PixelRect::new(1, 1, 4, 3);
        let crop = img.crop(rect);
        let mut blank = SceneImage::new(4, 5, 2);
        blank.paste(rect, &crop);
        for y in 1..3 {
            for x in 1..4 {
                assert_relative_eq!(blank.get(y, x, 0), img.get(y, x, 0));
            }
        }
        assert_relative_eq!(blank.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_paste_clips_overhanging_rect() {
        let src = create_gradient_image(3, 3, 1);
        let mut dst = SceneImage::new(4, 4, 1);
        // rect starts off-image: only the lower-right part of src lands
        dst.paste(PixelRect::new(-1, -1, 2, 2), &src);
        assert_relative_eq!(dst.get(0, 0, 0), src.get(1, 1, 0));
        assert_relative_eq!(dst.get(1, 1, 0), src.get(2, 2, 0));
        assert_relative_eq!(dst.get(2, 2, 0), 0.0);
    }

    #[test]
    fn test_fill_rect_channel() {
        let mut img = SceneImage::new(3, 3, 2);
        img.fill_rect_channel(PixelRect::new(0, 0, 2, 2), 1, 7.0);
        assert_relative_eq!(img.get(0, 0, 1), 7.0);
        assert_relative_eq!(img.get(1, 1, 1), 7.0);
        assert_relative_eq!(img.get(0, 0, 0), 0.0);
        assert_relative_eq!(img.get(2, 2, 1), 0.0);
    }

    #[test]
    fn test_pixel_grid_fill_and_count() {
        let mut grid = PixelGrid::new(4, 4, -255);
        grid.fill_rect(PixelRect::new(1, 1, 3, 3), 2);
        assert_eq!(grid.count(2), 4);
        assert_eq!(grid.count(-255), 12);
        assert_eq!(grid.get(1, 1), 2);
        assert_eq!(grid.get(0, 0), -255);
    }

    #[test]
    fn test_pixel_grid_fill_clips() {
        let mut grid = PixelGrid::new(3, 3, 0);
        grid.fill_rect(PixelRect::new(-2, -2, 2, 2), 1);
        assert_eq!(grid.count(1), 4);
    }

    #[test]
    fn test_pixel_grid_saturate() {
        let mut grid = PixelGrid::new(2, 2, 0);
        grid.set(0, 0, 3);
        grid.set(1, 1, 1);
        grid.saturate(1);
        assert_eq!(grid.get(0, 0), 1);
        assert_eq!(grid.get(1, 1), 1);
        assert_eq!(grid.get(0, 1), 0);
    }
}
