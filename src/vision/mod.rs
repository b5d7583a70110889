//! 画像プリミティブの境界
//!
//! 歪み補正・リサイズ・アフィンワープは `VisionOps` 実装（OpenCV）に委譲する。
//! 色変換やテンソル化のような単純な処理は ndarray 上で直接行う。

mod affine;
#[cfg(feature = "desktop")]
pub mod opencv_ops;
#[cfg(test)]
mod software;

use anyhow::{bail, Result};
use ndarray::{s, Array3};

pub use affine::{roi_transform, Affine2};
#[cfg(feature = "desktop")]
pub use opencv_ops::OpenCvVision;
#[cfg(test)]
pub(crate) use software::SoftwareVision;

use crate::triangulation::CameraParams;

/// HWC 8bit 画像
pub type Image = Array3<u8>;

/// 外部の画像処理プリミティブ
///
/// いずれもチャネル数と型を保つ。出力サイズは引数で指定したもの。
pub trait VisionOps: Send + Sync {
    /// キャリブレーション済みの歪みモデルで画像を補正
    fn undistort(&self, image: &Image, camera: &CameraParams) -> Result<Image>;

    /// `width`x`height` へリサイズ（バイリニア）
    fn resize(&self, image: &Image, width: usize, height: usize) -> Result<Image>;

    /// 画像 → 出力座標の変換 `transform` でワープ。範囲外は0埋め
    fn warp_affine(
        &self,
        image: &Image,
        transform: &Affine2,
        width: usize,
        height: usize,
    ) -> Result<Image>;
}

/// 1/3/4 チャネル画像を RGB 3 チャネルに揃える
pub fn to_rgb(image: Image) -> Result<Image> {
    match image.shape()[2] {
        3 => Ok(image),
        4 => Ok(image.slice(s![.., .., 0..3]).to_owned()),
        1 => {
            let (h, w) = (image.shape()[0], image.shape()[1]);
            Ok(Array3::from_shape_fn((h, w, 3), |(y, x, _)| image[[y, x, 0]]))
        }
        c => bail!("unsupported channel count: {}", c),
    }
}

/// [0, 255] → [0.0, 1.0] の f32 テンソル (HWC)
pub fn to_tensor(image: &Image) -> Array3<f32> {
    image.mapv(|v| v as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_rgb_drops_alpha() {
        let mut rgba = Array3::<u8>::zeros((2, 2, 4));
        rgba[[0, 1, 0]] = 10;
        rgba[[0, 1, 2]] = 30;
        rgba[[0, 1, 3]] = 255;
        let rgb = to_rgb(rgba).unwrap();
        assert_eq!(rgb.shape(), &[2, 2, 3]);
        assert_eq!(rgb[[0, 1, 0]], 10);
        assert_eq!(rgb[[0, 1, 2]], 30);
    }

    #[test]
    fn test_to_rgb_expands_mono() {
        let mut mono = Array3::<u8>::zeros((3, 2, 1));
        mono[[2, 1, 0]] = 77;
        let rgb = to_rgb(mono).unwrap();
        assert_eq!(rgb.shape(), &[3, 2, 3]);
        assert_eq!(rgb[[2, 1, 0]], 77);
        assert_eq!(rgb[[2, 1, 2]], 77);
    }

    #[test]
    fn test_to_rgb_rejects_two_channels() {
        assert!(to_rgb(Array3::<u8>::zeros((2, 2, 2))).is_err());
    }

    #[test]
    fn test_to_tensor_range() {
        let mut img = Array3::<u8>::zeros((1, 2, 3));
        img[[0, 1, 1]] = 255;
        let t = to_tensor(&img);
        assert_eq!(t[[0, 0, 0]], 0.0);
        assert_eq!(t[[0, 1, 1]], 1.0);
    }
}
