// ============================================================
// Layer 4 — Affine Resampling
// ============================================================
// Geometric augmentation (rotation, shift, shear, zoom) is one
// 3x3 homogeneous matrix applied about the image centre.
//
// The matrix maps OUTPUT coordinates to INPUT coordinates
// (row, col). Every output pixel is sampled bilinearly from the
// input; neighbours that fall outside the image are resolved by
// the fill mode:
//
//   constant  k k k k | a b c d | k k k k
//   nearest   a a a a | a b c d | d d d d
//   reflect   d c b a | a b c d | d c b a
//   wrap      a b c d | a b c d | a b c d
//
// Flips are plain mirrors and are left to image::imageops.

use image::{imageops, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use serde::{Deserialize, Serialize};

use crate::domain::image::ImageArray;

/// How samples outside the input boundaries are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    Constant,
    #[default]
    Nearest,
    Reflect,
    Wrap,
}

impl FillMode {
    /// Map a possibly out-of-range index onto `0..n`.
    /// `None` means "use the constant fill value".
    pub fn resolve(self, i: i64, n: usize) -> Option<usize> {
        let n = n as i64;
        if n == 0 {
            return None;
        }
        if (0..n).contains(&i) {
            return Some(i as usize);
        }
        let idx = match self {
            FillMode::Constant => return None,
            FillMode::Nearest  => i.clamp(0, n - 1),
            FillMode::Wrap     => i.rem_euclid(n),
            FillMode::Reflect  => {
                let period = 2 * n;
                let j = i.rem_euclid(period);
                if j >= n { period - 1 - j } else { j }
            }
        };
        Some(idx as usize)
    }
}

/// Row-major 3x3 homogeneous transform over (row, col, 1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [[f32; 3]; 3]);

impl Affine {
    pub const IDENTITY: Affine = Affine([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Rotation by `theta` radians.
    pub fn rotation(theta: f32) -> Self {
        let (s, c) = theta.sin_cos();
        Affine([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    /// Translation by `tx` rows and `ty` columns.
    pub fn shift(tx: f32, ty: f32) -> Self {
        Affine([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    /// Shear by `shear` radians.
    pub fn shear(shear: f32) -> Self {
        let (s, c) = shear.sin_cos();
        Affine([[1.0, -s, 0.0], [0.0, c, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn zoom(zx: f32, zy: f32) -> Self {
        Affine([[zx, 0.0, 0.0], [0.0, zy, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn then(&self, rhs: &Affine) -> Affine {
        let mut out = [[0.0f32; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Affine(out)
    }

    pub fn is_identity(&self) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(Self::IDENTITY.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() < 1e-7)
    }

    /// Re-anchor the transform so it acts about the centre of an
    /// `height` x `width` image instead of the top-left corner.
    pub fn about_center(&self, height: usize, width: usize) -> Affine {
        let ox = height as f32 / 2.0 - 0.5;
        let oy = width as f32 / 2.0 - 0.5;
        Affine::shift(ox, oy).then(self).then(&Affine::shift(-ox, -oy))
    }

    #[inline]
    fn apply(&self, r: f32, c: f32) -> (f32, f32) {
        let m = &self.0;
        (m[0][0] * r + m[0][1] * c + m[0][2], m[1][0] * r + m[1][1] * c + m[1][2])
    }
}

/// Resample `image` through `transform` (output → input coordinates)
/// using bilinear interpolation.
pub fn warp(image: &ImageArray, transform: &Affine, fill: FillMode, cval: f32) -> ImageArray {
    let (h, w, ch) = image.shape();
    let mut out = ImageArray::zeros(h, w, ch);

    for r in 0..h {
        for c in 0..w {
            let (sr, sc) = transform.apply(r as f32, c as f32);
            let r0 = sr.floor();
            let c0 = sc.floor();
            let fr = sr - r0;
            let fc = sc - c0;
            let (r0, c0) = (r0 as i64, c0 as i64);

            let taps = [
                (r0,     c0,     (1.0 - fr) * (1.0 - fc)),
                (r0,     c0 + 1, (1.0 - fr) * fc),
                (r0 + 1, c0,     fr * (1.0 - fc)),
                (r0 + 1, c0 + 1, fr * fc),
            ];

            for k in 0..ch {
                let mut acc = 0.0f32;
                for &(tr, tc, weight) in &taps {
                    if weight == 0.0 {
                        continue;
                    }
                    let v = match (fill.resolve(tr, h), fill.resolve(tc, w)) {
                        (Some(y), Some(x)) => image.get(y, x, k),
                        _ => cval,
                    };
                    acc += weight * v;
                }
                out.set(r, c, k, acc);
            }
        }
    }
    out
}

// ─── Flips ────────────────────────────────────────────────────────────────────
// Mirroring needs no resampling, so it goes through image::imageops on
// an f32 buffer whose pixel type matches the channel count.

/// Mirror the image left/right. `None` for more than 4 channels.
pub fn flip_horizontal(image: &ImageArray) -> Option<ImageArray> {
    mirror(image, Axis::Horizontal)
}

/// Mirror the image top/bottom. `None` for more than 4 channels.
pub fn flip_vertical(image: &ImageArray) -> Option<ImageArray> {
    mirror(image, Axis::Vertical)
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

fn mirror(image: &ImageArray, axis: Axis) -> Option<ImageArray> {
    match image.channels {
        1 => mirror_as::<Luma<f32>>(image, axis),
        2 => mirror_as::<LumaA<f32>>(image, axis),
        3 => mirror_as::<Rgb<f32>>(image, axis),
        4 => mirror_as::<Rgba<f32>>(image, axis),
        _ => None,
    }
}

fn mirror_as<P>(image: &ImageArray, axis: Axis) -> Option<ImageArray>
where
    P: Pixel<Subpixel = f32> + 'static,
{
    let buf: ImageBuffer<P, &[f32]> =
        ImageBuffer::from_raw(image.width as u32, image.height as u32, image.data.as_slice())?;
    let out = match axis {
        Axis::Horizontal => imageops::flip_horizontal(&buf),
        Axis::Vertical   => imageops::flip_vertical(&buf),
    };
    Some(ImageArray::new(image.height, image.width, image.channels, out.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(h: usize, w: usize) -> ImageArray {
        let data = (0..h * w).map(|v| v as f32).collect();
        ImageArray::new(h, w, 1, data)
    }

    #[test]
    fn test_fill_mode_resolution() {
        assert_eq!(FillMode::Constant.resolve(-1, 4), None);
        assert_eq!(FillMode::Nearest.resolve(-3, 4), Some(0));
        assert_eq!(FillMode::Nearest.resolve(9, 4), Some(3));
        assert_eq!(FillMode::Wrap.resolve(-1, 4), Some(3));
        assert_eq!(FillMode::Wrap.resolve(5, 4), Some(1));
        assert_eq!(FillMode::Reflect.resolve(-1, 4), Some(0));
        assert_eq!(FillMode::Reflect.resolve(4, 4), Some(3));
        assert_eq!(FillMode::Reflect.resolve(5, 4), Some(2));
    }

    #[test]
    fn test_identity_warp_is_exact() {
        let img = ramp(3, 4);
        let out = warp(&img, &Affine::IDENTITY, FillMode::Constant, 0.0);
        assert_eq!(out, img);
    }

    #[test]
    fn test_integer_shift_with_constant_fill() {
        let img = ramp(2, 3);
        // output col c reads input col c + 1
        let out = warp(&img, &Affine::shift(0.0, 1.0), FillMode::Constant, -1.0);
        assert_eq!(out.data, vec![1.0, 2.0, -1.0, 4.0, 5.0, -1.0]);
    }

    #[test]
    fn test_integer_shift_with_nearest_fill() {
        let img = ramp(2, 3);
        let out = warp(&img, &Affine::shift(0.0, -1.0), FillMode::Nearest, 0.0);
        assert_eq!(out.data, vec![0.0, 0.0, 1.0, 3.0, 3.0, 4.0]);
    }

    #[test]
    fn test_half_turn_about_center_reverses_pixels() {
        let img = ramp(3, 3);
        let t   = Affine::rotation(std::f32::consts::PI).about_center(3, 3);
        let out = warp(&img, &t, FillMode::Constant, 0.0);
        let expected: Vec<f32> = img.data.iter().rev().copied().collect();
        for (a, b) in out.data.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-4, "{a} vs {b}");
        }
    }

    #[test]
    fn test_flips() {
        let img = ramp(2, 2);
        assert_eq!(flip_horizontal(&img).unwrap().data, vec![1.0, 0.0, 3.0, 2.0]);
        assert_eq!(flip_vertical(&img).unwrap().data, vec![2.0, 3.0, 0.0, 1.0]);
    }

    #[test]
    fn test_flip_keeps_channel_order() {
        // 1x2 RGB: red pixel, then blue pixel
        let img = ImageArray::new(1, 2, 3, vec![255.0, 0.0, 0.0, 0.0, 0.0, 255.0]);
        let out = flip_horizontal(&img).unwrap();
        assert_eq!(out.data, vec![0.0, 0.0, 255.0, 255.0, 0.0, 0.0]);
        assert_eq!(flip_vertical(&img).unwrap(), img);
    }

    #[test]
    fn test_flip_rejects_unknown_channel_layout() {
        assert!(flip_horizontal(&ImageArray::zeros(2, 2, 5)).is_none());
    }

    #[test]
    fn test_composition_with_identity() {
        let z = Affine::zoom(1.5, 0.5);
        assert_eq!(z.then(&Affine::IDENTITY), z);
        assert!(Affine::IDENTITY.about_center(5, 7).is_identity());
    }
}
