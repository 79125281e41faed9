use burn::prelude::*;
use image::{DynamicImage, ImageReader, Rgb, Rgb32FImage};
use std::path::Path;

use crate::error::{NeurolensError, Result};

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decode an image file. Any failure (missing, unreadable, corrupt) is an `ImageDecode` error.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| NeurolensError::image_decode(path, e))?
        .with_guessed_format()
        .map_err(|e| NeurolensError::image_decode(path, e))?
        .decode()
        .map_err(|e| NeurolensError::image_decode(path, e))
}

/// Decode an in-memory image (e.g. an uploaded file).
pub fn decode_image_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| NeurolensError::image_decode("<memory>", e))
}

/// Placement of the resized image on the square canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxGeometry {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
}

pub fn letterbox_geometry(width: u32, height: u32, size: u32) -> LetterboxGeometry {
    let scale = size as f64 / width.max(height) as f64;
    let new_w = ((width as f64 * scale).round() as u32).clamp(1, size);
    let new_h = ((height as f64 * scale).round() as u32).clamp(1, size);

    LetterboxGeometry {
        width: new_w,
        height: new_h,
        // Integer division: the extra pixel of odd padding goes right/bottom
        left: (size - new_w) / 2,
        top: (size - new_h) / 2,
    }
}

/// Source pixels covered by the output span `[start, end)` with their overlap weights.
fn span_weights(start: f64, end: f64, limit: u32) -> Vec<(u32, f64)> {
    let first = (start.floor() as u32).min(limit - 1);
    let last = (end.ceil() as u32).clamp(first + 1, limit);

    (first..last)
        .filter_map(|i| {
            let w = end.min(i as f64 + 1.0) - start.max(i as f64);
            (w > 1e-12).then_some((i, w))
        })
        .collect()
}

/// Area-averaging resize: every output pixel is the overlap-weighted mean of
/// the source pixels it covers.
pub fn resize_area(src: &Rgb32FImage, dst_w: u32, dst_h: u32) -> Rgb32FImage {
    let (src_w, src_h) = src.dimensions();
    if (src_w, src_h) == (dst_w, dst_h) {
        return src.clone();
    }

    let sx = src_w as f64 / dst_w as f64;
    let sy = src_h as f64 / dst_h as f64;

    let columns: Vec<Vec<(u32, f64)>> = (0..dst_w)
        .map(|ox| span_weights(ox as f64 * sx, (ox + 1) as f64 * sx, src_w))
        .collect();

    let mut out = Rgb32FImage::new(dst_w, dst_h);

    for oy in 0..dst_h {
        let rows = span_weights(oy as f64 * sy, (oy + 1) as f64 * sy, src_h);

        for (ox, cols) in columns.iter().enumerate() {
            let mut acc = [0.0f64; 3];
            let mut total = 0.0f64;

            for &(iy, wy) in &rows {
                for &(ix, wx) in cols {
                    let w = wy * wx;
                    let p = src.get_pixel(ix, iy);
                    for c in 0..3 {
                        acc[c] += p[c] as f64 * w;
                    }
                    total += w;
                }
            }

            let pixel = if total > 0.0 {
                Rgb([
                    (acc[0] / total) as f32,
                    (acc[1] / total) as f32,
                    (acc[2] / total) as f32,
                ])
            } else {
                let ix = ((ox as f64 * sx) as u32).min(src_w - 1);
                let iy = ((oy as f64 * sy) as u32).min(src_h - 1);
                *src.get_pixel(ix, iy)
            };
            out.put_pixel(ox as u32, oy, pixel);
        }
    }

    out
}

/// Resize the longest side to `size` and paste centered on a zero canvas.
pub fn letterbox(img: &Rgb32FImage, size: u32) -> Rgb32FImage {
    let (w, h) = img.dimensions();
    let g = letterbox_geometry(w, h, size);
    let resized = resize_area(img, g.width, g.height);

    let mut canvas = Rgb32FImage::new(size, size);
    image::imageops::replace(&mut canvas, &resized, g.left as i64, g.top as i64);
    canvas
}

/// Normalize with the ImageNet statistics and lay out channel-first (CHW).
pub fn normalize_chw(img: &Rgb32FImage) -> Vec<f32> {
    let (w, h) = img.dimensions();
    let plane = (w * h) as usize;
    let mut tensor = vec![0.0f32; plane * 3];

    for (idx, pixel) in img.pixels().enumerate() {
        for c in 0..3 {
            tensor[c * plane + idx] = (pixel[c] - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    tensor
}

/// Output of the preprocessing unit: one normalized CHW image of side `size`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    data: Vec<f32>,
    size: usize,
}

impl PreprocessedImage {
    pub fn from_chw(data: Vec<f32>, size: usize) -> Self {
        debug_assert_eq!(data.len(), 3 * size * size);
        Self { data, size }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size, self.size]
    }

    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::<B, 4>::from_data(TensorData::new(self.data.clone(), self.shape()), device)
    }
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    target_size: u32,
}

impl ImagePreprocessor {
    pub fn new(target_size: u32) -> Self {
        Self { target_size }
    }

    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    pub fn preprocess_image(&self, img: &DynamicImage) -> PreprocessedImage {
        let rgb = img.to_rgb32f();
        let canvas = letterbox(&rgb, self.target_size);
        PreprocessedImage::from_chw(normalize_chw(&canvas), self.target_size as usize)
    }

    pub fn preprocess_path(&self, path: &Path) -> Result<PreprocessedImage> {
        let img = load_image(path)?;
        Ok(self.preprocess_image(&img))
    }
}

/// Decode → letterbox → normalize → `[1, 3, size, size]` tensor.
pub fn preprocess<B: Backend>(
    img: &DynamicImage,
    target_size: u32,
    device: &B::Device,
) -> Tensor<B, 4> {
    ImagePreprocessor::new(target_size)
        .preprocess_image(img)
        .to_tensor(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::RgbImage;

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8]))
    }

    #[test]
    fn test_geometry_landscape() {
        let g = letterbox_geometry(640, 480, 512);
        assert_eq!(g, LetterboxGeometry { width: 512, height: 384, left: 0, top: 64 });
    }

    #[test]
    fn test_geometry_asymmetric_padding() {
        // 51 * 0.64 = 32.64 -> 33 rows, 31 rows of padding: 15 on top, 16 below
        let g = letterbox_geometry(100, 51, 64);
        assert_eq!(g.height, 33);
        assert_eq!(g.top, 15);
        assert_eq!(g.left, 0);
    }

    #[test]
    fn test_square_sized_input_is_identity() {
        let img = DynamicImage::ImageRgb8(gradient_image(8, 8));
        let rgb = img.to_rgb32f();

        let g = letterbox_geometry(8, 8, 8);
        assert_eq!((g.left, g.top), (0, 0));

        let canvas = letterbox(&rgb, 8);
        assert_eq!(canvas, rgb);

        let out = ImagePreprocessor::new(8).preprocess_image(&img);
        assert_eq!(out.data(), normalize_chw(&rgb).as_slice());
    }

    #[test]
    fn test_padding_is_normalized_zero() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([255, 255, 255])));
        let out = ImagePreprocessor::new(4).preprocess_image(&img);
        let plane = 16;
        // row 0 is padding (top = 1)
        for c in 0..3 {
            let expected = (0.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert_eq!(out.data()[c * plane], expected);
            let inside = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert_eq!(out.data()[c * plane + 4], inside);
        }
    }

    #[test]
    fn test_area_resize_averages_blocks() {
        let mut src = Rgb32FImage::new(2, 2);
        src.put_pixel(0, 0, Rgb([0.0, 0.0, 0.0]));
        src.put_pixel(1, 0, Rgb([1.0, 0.5, 0.0]));
        src.put_pixel(0, 1, Rgb([1.0, 0.5, 0.0]));
        src.put_pixel(1, 1, Rgb([0.0, 1.0, 1.0]));
        let out = resize_area(&src, 1, 1);
        let p = out.get_pixel(0, 0);
        assert!((p[0] - 0.5).abs() < 1e-6);
        assert!((p[1] - 0.5).abs() < 1e-6);
        assert!((p[2] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_deterministic_output() {
        let img = DynamicImage::ImageRgb8(gradient_image(37, 23));
        let pre = ImagePreprocessor::new(16);
        assert_eq!(pre.preprocess_image(&img), pre.preprocess_image(&img));
    }

    #[test]
    fn test_tensor_shape() {
        let img = DynamicImage::ImageRgb8(gradient_image(10, 20));
        let device = Default::default();
        let t = preprocess::<NdArray>(&img, 12, &device);
        assert_eq!(t.dims(), [1, 3, 12, 12]);
    }

    #[test]
    fn test_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(matches!(load_image(&path), Err(NeurolensError::ImageDecode { .. })));
        assert!(matches!(
            load_image(&dir.path().join("missing.png")),
            Err(NeurolensError::ImageDecode { .. })
        ));
    }
}
