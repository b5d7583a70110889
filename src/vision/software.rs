//! 単体テスト用の `VisionOps`

use anyhow::{bail, Result};
use ndarray::Array3;

use super::{Affine2, Image, VisionOps};
use crate::triangulation::CameraParams;

/// OpenCV なしで前処理を検証するためのバイリニア実装
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareVision;

#[derive(Clone, Copy)]
enum Border {
    /// 端の画素を延長
    Replicate,
    /// 範囲外は0
    Constant,
}

fn pixel(image: &Image, x: i64, y: i64, c: usize, border: Border) -> f64 {
    let (h, w) = (image.shape()[0] as i64, image.shape()[1] as i64);
    match border {
        Border::Replicate => image[[y.clamp(0, h - 1) as usize, x.clamp(0, w - 1) as usize, c]] as f64,
        Border::Constant => {
            if (0..w).contains(&x) && (0..h).contains(&y) {
                image[[y as usize, x as usize, c]] as f64
            } else {
                0.0
            }
        }
    }
}

/// 出力画素 (x, y) ごとに `map` で入力座標を求めて補間する
fn remap(
    image: &Image,
    width: usize,
    height: usize,
    border: Border,
    map: impl Fn(f64, f64) -> (f64, f64),
) -> Image {
    let channels = image.shape()[2];
    let mut out = Array3::<u8>::zeros((height, width, channels));
    if image.is_empty() {
        return out;
    }
    for y in 0..height {
        for x in 0..width {
            let (sx, sy) = map(x as f64, y as f64);
            if !sx.is_finite() || !sy.is_finite() {
                continue;
            }
            let x0 = sx.floor();
            let y0 = sy.floor();
            let fx = sx - x0;
            let fy = sy - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);
            for c in 0..channels {
                let top = pixel(image, x0, y0, c, border) * (1.0 - fx)
                    + pixel(image, x0 + 1, y0, c, border) * fx;
                let bottom = pixel(image, x0, y0 + 1, c, border) * (1.0 - fx)
                    + pixel(image, x0 + 1, y0 + 1, c, border) * fx;
                out[[y, x, c]] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

impl VisionOps for SoftwareVision {
    fn undistort(&self, image: &Image, camera: &CameraParams) -> Result<Image> {
        let (h, w) = (image.shape()[0], image.shape()[1]);
        Ok(remap(image, w, h, Border::Constant, |x, y| camera.distort_point(x, y)))
    }

    fn resize(&self, image: &Image, width: usize, height: usize) -> Result<Image> {
        let (h, w) = (image.shape()[0], image.shape()[1]);
        if width == 0 || height == 0 {
            bail!("cannot resize to {}x{}", width, height);
        }
        let sx = w as f64 / width as f64;
        let sy = h as f64 / height as f64;
        Ok(remap(image, width, height, Border::Replicate, |x, y| {
            ((x + 0.5) * sx - 0.5, (y + 0.5) * sy - 0.5)
        }))
    }

    fn warp_affine(&self, image: &Image, transform: &Affine2, width: usize, height: usize) -> Result<Image> {
        let Some(inverse) = transform.inverse() else {
            bail!("affine transform is not invertible");
        };
        Ok(remap(image, width, height, Border::Constant, |x, y| inverse.apply(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix2x3, Matrix3, Vector3};

    fn gradient(h: usize, w: usize) -> Image {
        Array3::from_shape_fn((h, w, 3), |(y, x, c)| (x * 10 + y + c) as u8)
    }

    #[test]
    fn test_resize_identity() {
        let img = gradient(6, 8);
        let out = SoftwareVision.resize(&img, 8, 6).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_resize_constant_keeps_value() {
        let img = Image::from_elem((10, 20, 3), 200);
        let out = SoftwareVision.resize(&img, 7, 3).unwrap();
        assert_eq!(out.shape(), &[3, 7, 3]);
        assert!(out.iter().all(|&v| v == 200));
    }

    #[test]
    fn test_warp_translation() {
        let img = gradient(6, 8);
        // 入力 (x, y) → 出力 (x - 2, y - 1)
        let t = Affine2::from_matrix(Matrix2x3::new(1.0, 0.0, -2.0, 0.0, 1.0, -1.0));
        let out = SoftwareVision.warp_affine(&img, &t, 4, 4).unwrap();
        assert_eq!(out[[0, 0, 0]], img[[1, 2, 0]]);
        assert_eq!(out[[3, 3, 1]], img[[4, 5, 1]]);
    }

    #[test]
    fn test_warp_out_of_range_is_zero() {
        let img = Image::from_elem((4, 4, 3), 90);
        let t = Affine2::from_matrix(Matrix2x3::new(1.0, 0.0, 10.0, 0.0, 1.0, 10.0));
        let out = SoftwareVision.warp_affine(&img, &t, 4, 4).unwrap();
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_warp_singular_fails() {
        let img = Image::zeros((4, 4, 3));
        let t = Affine2::from_matrix(Matrix2x3::zeros());
        assert!(SoftwareVision.warp_affine(&img, &t, 4, 4).is_err());
    }

    #[test]
    fn test_undistort_without_distortion_is_identity() {
        let img = gradient(6, 8);
        let k = Matrix3::new(100.0, 0.0, 4.0, 0.0, 100.0, 3.0, 0.0, 0.0, 1.0);
        let cam = CameraParams::new(k, Matrix3::identity(), Vector3::zeros(), [0.0; 5]);
        assert_eq!(SoftwareVision.undistort(&img, &cam).unwrap(), img);
    }
}
