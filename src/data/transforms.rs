use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, Rgb32FImage};
use rand::Rng;

use super::dataset::Split;
use crate::dataset::preprocessing::{letterbox, normalize_chw, PreprocessedImage};
use crate::modality::HeadKind;

/// One step of an augmentation pipeline. Every step works on `[0, 1]` RGB
/// floats; normalization happens once at the end of [`Transform::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    /// Longest side to `size`, zero padded to a centered square.
    Letterbox { size: u32 },
    /// With probability `p`, apply one of `choices` picked uniformly.
    OneOf { p: f64, choices: Vec<TransformOp> },
    RandomResizedCrop {
        size: u32,
        scale: (f64, f64),
        ratio: (f64, f64),
        p: f64,
    },
    CenterCrop { size: u32 },
    HorizontalFlip { p: f64 },
    /// Rotation by a uniform angle in `[-limit_deg, limit_deg]`, zero border.
    Rotate { limit_deg: f64, p: f64 },
    ColorJitter {
        brightness: f64,
        contrast: f64,
        saturation: f64,
        hue: f64,
        p: f64,
    },
}

impl TransformOp {
    fn is_deterministic(&self) -> bool {
        matches!(self, Self::Letterbox { .. } | Self::CenterCrop { .. })
    }
}

/// Composable, clonable augmentation policy ending in ImageNet normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    size: u32,
    ops: Vec<TransformOp>,
}

impl Transform {
    pub fn new(size: u32, ops: Vec<TransformOp>) -> Self {
        Self { size, ops }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// True when the output does not depend on the RNG.
    pub fn is_deterministic(&self) -> bool {
        self.ops.iter().all(TransformOp::is_deterministic)
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> PreprocessedImage {
        let mut current = img.to_rgb32f();
        for op in &self.ops {
            current = apply_op(op, current, rng);
        }

        if current.dimensions() != (self.size, self.size) {
            current = letterbox(&current, self.size);
        }

        PreprocessedImage::from_chw(normalize_chw(&current), self.size as usize)
    }
}

/// Augmentation policy for a split and head kind.
pub fn make_transform(size: u32, split: Split, kind: HeadKind) -> Transform {
    let mut ops = vec![TransformOp::Letterbox { size }];

    match (split, kind) {
        (Split::Train, HeadKind::Classification) => ops.extend([
            TransformOp::OneOf {
                p: 0.7,
                choices: vec![
                    TransformOp::RandomResizedCrop {
                        size,
                        scale: (0.9, 1.0),
                        ratio: (0.95, 1.05),
                        p: 1.0,
                    },
                    TransformOp::CenterCrop { size },
                ],
            },
            TransformOp::HorizontalFlip { p: 0.5 },
            TransformOp::Rotate { limit_deg: 15.0, p: 0.6 },
            TransformOp::ColorJitter {
                brightness: 0.1,
                contrast: 0.1,
                saturation: 0.1,
                hue: 0.02,
                p: 0.4,
            },
        ]),
        (Split::Train, HeadKind::Regression) => ops.extend([
            TransformOp::RandomResizedCrop {
                size,
                scale: (0.95, 1.0),
                ratio: (0.98, 1.02),
                p: 0.6,
            },
            TransformOp::HorizontalFlip { p: 0.5 },
            TransformOp::Rotate { limit_deg: 10.0, p: 0.4 },
        ]),
        (Split::Val, _) => ops.push(TransformOp::CenterCrop { size }),
    }

    Transform::new(size, ops)
}

fn apply_op<R: Rng + ?Sized>(op: &TransformOp, img: Rgb32FImage, rng: &mut R) -> Rgb32FImage {
    match op {
        TransformOp::Letterbox { size } => letterbox(&img, *size),
        TransformOp::OneOf { p, choices } => {
            if choices.is_empty() || !rng.gen_bool(*p) {
                return img;
            }
            let pick = rng.gen_range(0..choices.len());
            apply_op(&choices[pick], img, rng)
        }
        TransformOp::RandomResizedCrop { size, scale, ratio, p } => {
            if !rng.gen_bool(*p) {
                return img;
            }
            random_resized_crop(&img, *size, *scale, *ratio, rng)
        }
        TransformOp::CenterCrop { size } => center_crop(img, *size),
        TransformOp::HorizontalFlip { p } => {
            if rng.gen_bool(*p) {
                imageops::flip_horizontal(&img)
            } else {
                img
            }
        }
        TransformOp::Rotate { limit_deg, p } => {
            if !rng.gen_bool(*p) {
                return img;
            }
            let angle = rng.gen_range(-limit_deg..=*limit_deg);
            rotate(&img, angle)
        }
        TransformOp::ColorJitter {
            brightness,
            contrast,
            saturation,
            hue,
            p,
        } => {
            if !rng.gen_bool(*p) {
                return img;
            }
            let factors = JitterFactors {
                brightness: jitter_factor(*brightness, rng),
                contrast: jitter_factor(*contrast, rng),
                saturation: jitter_factor(*saturation, rng),
                hue_shift: if *hue > 0.0 { rng.gen_range(-hue..=*hue) } else { 0.0 },
            };
            color_jitter(&img, factors)
        }
    }
}

fn center_crop(img: Rgb32FImage, size: u32) -> Rgb32FImage {
    let (w, h) = img.dimensions();
    if w < size || h < size || (w, h) == (size, size) {
        return img;
    }
    imageops::crop_imm(&img, (w - size) / 2, (h - size) / 2, size, size).to_image()
}

/// Sample a crop with area fraction in `scale` and aspect ratio in `ratio`
/// (log-uniform), then resize it to `size`×`size`.
fn random_resized_crop<R: Rng + ?Sized>(
    img: &Rgb32FImage,
    size: u32,
    scale: (f64, f64),
    ratio: (f64, f64),
    rng: &mut R,
) -> Rgb32FImage {
    let (w, h) = img.dimensions();
    let area = (w * h) as f64;
    let (log_lo, log_hi) = (ratio.0.ln(), ratio.1.ln());

    let mut window = None;
    for _ in 0..10 {
        let target_area = area * rng.gen_range(scale.0..=scale.1);
        let aspect = rng.gen_range(log_lo..=log_hi).exp();
        let cw = (target_area * aspect).sqrt().round() as u32;
        let ch = (target_area / aspect).sqrt().round() as u32;

        if cw > 0 && ch > 0 && cw <= w && ch <= h {
            let x = rng.gen_range(0..=w - cw);
            let y = rng.gen_range(0..=h - ch);
            window = Some((x, y, cw, ch));
            break;
        }
    }

    // Fall back to the largest centered crop within the ratio bounds
    let (x, y, cw, ch) = window.unwrap_or_else(|| {
        let in_ratio = w as f64 / h as f64;
        let (cw, ch) = if in_ratio < ratio.0 {
            (w, ((w as f64 / ratio.0).round() as u32).clamp(1, h))
        } else if in_ratio > ratio.1 {
            (((h as f64 * ratio.1).round() as u32).clamp(1, w), h)
        } else {
            (w, h)
        };
        ((w - cw) / 2, (h - ch) / 2, cw, ch)
    });

    let crop = imageops::crop_imm(img, x, y, cw, ch).to_image();
    imageops::resize(&crop, size, size, FilterType::Triangle)
}

fn sample_bilinear(img: &Rgb32FImage, x: f64, y: f64) -> Rgb<f32> {
    let (w, h) = img.dimensions();
    if x < -1.0 || y < -1.0 || x > w as f64 || y > h as f64 {
        return Rgb([0.0; 3]);
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = (x - x0) as f32;
    let fy = (y - y0) as f32;

    // Out-of-bounds neighbours read as zero (constant border)
    let fetch = |ix: f64, iy: f64| -> [f32; 3] {
        if ix < 0.0 || iy < 0.0 || ix >= w as f64 || iy >= h as f64 {
            [0.0; 3]
        } else {
            img.get_pixel(ix as u32, iy as u32).0
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = top * (1.0 - fy) + bottom * fy;
    }
    Rgb(out)
}

/// Rotate about the image center, counter-clockwise for positive angles.
fn rotate(img: &Rgb32FImage, angle_deg: f64) -> Rgb32FImage {
    let (w, h) = img.dimensions();
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let cx = (w as f64 - 1.0) / 2.0;
    let cy = (h as f64 - 1.0) / 2.0;

    Rgb32FImage::from_fn(w, h, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        // inverse mapping: output pixel -> source position
        let sx = cos * dx - sin * dy + cx;
        let sy = sin * dx + cos * dy + cy;
        sample_bilinear(img, sx, sy)
    })
}

#[derive(Debug, Clone, Copy)]
struct JitterFactors {
    brightness: f64,
    contrast: f64,
    saturation: f64,
    hue_shift: f64,
}

fn jitter_factor<R: Rng + ?Sized>(amount: f64, rng: &mut R) -> f64 {
    if amount > 0.0 {
        rng.gen_range((1.0 - amount).max(0.0)..=1.0 + amount)
    } else {
        1.0
    }
}

fn luma(p: [f32; 3]) -> f32 {
    0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2]
}

fn rgb_to_hsv([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let sector = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    let hue = sector / 6.0;

    let sat = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue, sat, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h6 = h.rem_euclid(1.0) * 6.0;
    let i = h6.floor();
    let f = h6 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    match i as u32 % 6 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

fn color_jitter(img: &Rgb32FImage, f: JitterFactors) -> Rgb32FImage {
    let brightness = f.brightness as f32;
    let contrast = f.contrast as f32;
    let saturation = f.saturation as f32;
    let hue_shift = f.hue_shift as f32;

    let mean_luma = {
        let n = (img.width() * img.height()).max(1) as f32;
        img.pixels().map(|p| luma(p.0) * brightness).sum::<f32>() / n
    };

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let mut c = pixel.0.map(|v| (v * brightness).clamp(0.0, 1.0));

        c = c.map(|v| ((v - mean_luma) * contrast + mean_luma).clamp(0.0, 1.0));

        let gray = luma(c);
        c = c.map(|v| ((v - gray) * saturation + gray).clamp(0.0, 1.0));

        if hue_shift != 0.0 {
            let (h, s, v) = rgb_to_hsv(c);
            c = hsv_to_rgb(h + hue_shift, s, v);
        }

        pixel.0 = c;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::preprocessing::ImagePreprocessor;
    use image::RgbImage;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(30, 18, |x, y| {
            Rgb([(x * 8) as u8, (y * 12) as u8, ((x + y) * 4) as u8])
        }))
    }

    #[test]
    fn test_eval_transform_matches_preprocess() {
        let img = sample_image();
        let transform = make_transform(16, Split::Val, HeadKind::Classification);
        assert!(transform.is_deterministic());

        let mut rng = StdRng::seed_from_u64(0);
        let augmented = transform.apply(&img, &mut rng);
        let reference = ImagePreprocessor::new(16).preprocess_image(&img);
        assert_eq!(augmented, reference);
    }

    #[test]
    fn test_train_transforms_keep_shape() {
        let img = sample_image();
        for kind in [HeadKind::Classification, HeadKind::Regression] {
            let transform = make_transform(20, Split::Train, kind);
            assert!(!transform.is_deterministic());
            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..8 {
                let out = transform.apply(&img, &mut rng);
                assert_eq!(out.size(), 20);
                assert_eq!(out.data().len(), 3 * 20 * 20);
                assert!(out.data().iter().all(|v| v.is_finite()));
            }
        }
    }

    #[test]
    fn test_same_seed_same_output() {
        let img = sample_image();
        let transform = make_transform(12, Split::Train, HeadKind::Classification);
        let a = transform.apply(&img, &mut StdRng::seed_from_u64(99));
        let b = transform.apply(&img, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn test_flip_and_zero_angle_rotate() {
        let mut img = Rgb32FImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([1.0, 0.0, 0.0]));
        let flipped = imageops::flip_horizontal(&img);
        assert_eq!(flipped.get_pixel(2, 0), &Rgb([1.0, 0.0, 0.0]));

        let rotated = rotate(&img, 0.0);
        assert_eq!(rotated, img);
    }

    #[test]
    fn test_hsv_round_trip() {
        for c in [[0.2, 0.4, 0.6], [1.0, 0.0, 0.0], [0.5, 0.5, 0.5]] {
            let (h, s, v) = rgb_to_hsv(c);
            let back = hsv_to_rgb(h, s, v);
            for i in 0..3 {
                assert!((back[i] - c[i]).abs() < 1e-5);
            }
        }
    }
}
