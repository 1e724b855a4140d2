//! Image buffers handed to localization and capture.
//!
//! Pixels are 8-bit, row-major, channels interleaved, with no row padding.

use crate::error::{VpsError, VpsResult};

/// Borrowed image.
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: &'a [u8],
}

impl<'a> ImageView<'a> {
    /// Wrap `data`, checking that its length matches the dimensions.
    pub fn new(width: u32, height: u32, channels: u8, data: &'a [u8]) -> VpsResult<Self> {
        if width == 0 || height == 0 || channels == 0 {
            return Err(VpsError::InvalidInput(format!(
                "empty image {width}x{height}x{channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(VpsError::InvalidInput(format!(
                "image {width}x{height}x{channels} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn to_image(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: self.data.to_vec(),
        }
    }
}

/// Owned image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl Image {
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            channels: self.channels,
            data: &self.data,
        }
    }
}

/// Source pixels averaged per output pixel along each axis for `factor`.
///
/// An axis shorter than `factor` collapses to one output pixel covering the
/// whole axis, so its block is the axis length.
pub fn block_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    let f = factor.max(1);
    (f.min(width).max(1), f.min(height).max(1))
}

/// Output dimensions of [`downsample`] for `factor`.
pub fn downsampled_size(width: u32, height: u32, factor: u32) -> (u32, u32) {
    let (bx, by) = block_size(width, height, factor);
    (width / bx, height / by)
}

/// Smallest integer factor whose output fits within `max_pixels`.
///
/// Returns 1 when `max_pixels` is 0 (no limit) or the image already fits.
/// The search ends at `max(width, height)`, where the output is one pixel.
pub fn downsample_factor(width: u32, height: u32, max_pixels: u64) -> u32 {
    if max_pixels == 0 {
        return 1;
    }
    let limit = width.max(height).max(1);
    let mut factor = 1u32;
    while factor < limit {
        let (w, h) = downsampled_size(width, height, factor);
        if w as u64 * h as u64 <= max_pixels {
            break;
        }
        factor += 1;
    }
    factor
}

/// Box-filter downsample by an integer factor. Trailing rows and columns
/// that do not fill a whole block are dropped.
pub fn downsample(src: &ImageView<'_>, factor: u32) -> Image {
    if factor <= 1 {
        return src.to_image();
    }
    let ch = src.channels as usize;
    let (bx, by) = block_size(src.width, src.height, factor);
    let (out_w, out_h) = downsampled_size(src.width, src.height, factor);
    let (bx, by) = (bx as usize, by as usize);
    let (out_w, out_h) = (out_w as usize, out_h as usize);
    let src_w = src.width as usize;
    let area = (bx * by) as u32;

    let mut data = vec![0u8; out_w * out_h * ch];
    for oy in 0..out_h {
        for ox in 0..out_w {
            for c in 0..ch {
                let mut sum = 0u32;
                for dy in 0..by {
                    let row = (oy * by + dy) * src_w;
                    for dx in 0..bx {
                        sum += src.data[(row + ox * bx + dx) * ch + c] as u32;
                    }
                }
                data[(oy * out_w + ox) * ch + c] = ((sum + area / 2) / area) as u8;
            }
        }
    }

    Image {
        width: out_w as u32,
        height: out_h as u32,
        channels: src.channels,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_validates_length() {
        let data = vec![0u8; 12];
        assert!(ImageView::new(4, 3, 1, &data).is_ok());
        assert!(ImageView::new(2, 2, 3, &data).is_ok());
        assert!(ImageView::new(4, 4, 1, &data).is_err());
        assert!(ImageView::new(0, 3, 1, &[]).is_err());
    }

    #[test]
    fn test_downsample_factor() {
        assert_eq!(downsample_factor(640, 480, 960 * 720), 1);
        assert_eq!(downsample_factor(1920, 1440, 960 * 720), 2);
        assert_eq!(downsample_factor(1921, 1441, 960 * 720), 2);
        assert_eq!(downsample_factor(4000, 3000, 960 * 720), 5);
        assert_eq!(downsample_factor(4000, 3000, 0), 1);
    }

    #[test]
    fn test_thin_image_stays_within_budget() {
        let factor = downsample_factor(640, 2, 100);
        assert_eq!(factor, 7);
        assert_eq!(block_size(640, 2, factor), (7, 2));

        let mut data = vec![0u8; 640 * 2];
        data[640..].fill(100);
        let view = ImageView::new(640, 2, 1, &data).unwrap();
        let out = downsample(&view, factor);
        assert_eq!((out.width, out.height), (91, 1));
        assert!(out.view().pixel_count() <= 100);
        // Both rows fall into every block.
        assert!(out.data.iter().all(|&v| v == 50));
    }

    #[test]
    fn test_factor_search_ends_at_single_pixel() {
        assert_eq!(downsample_factor(7, 1, 1), 7);
        assert_eq!(downsampled_size(7, 1, 7), (1, 1));
        assert_eq!(downsample_factor(5, 3, 1), 3);
    }

    #[test]
    fn test_box_downsample_averages() {
        #[rustfmt::skip]
        let data = [
            0, 2, 10, 10,
            4, 6, 20, 20,
            9, 9, 9, 9,
        ];
        let view = ImageView::new(4, 3, 1, &data).unwrap();
        let out = downsample(&view, 2);
        assert_eq!((out.width, out.height), (2, 1));
        assert_eq!(out.data, vec![3, 15]);
    }

    #[test]
    fn test_downsample_rgb_channels_independent() {
        let data = [
            255, 0, 0, 255, 0, 0, //
            255, 0, 0, 255, 0, 100,
        ];
        let view = ImageView::new(2, 2, 3, &data).unwrap();
        let out = downsample(&view, 2);
        assert_eq!(out.data, vec![255, 0, 25]);
    }
}
