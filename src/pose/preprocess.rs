use anyhow::{bail, Result};
use ndarray::{s, Array3};

use crate::tracking::TrackedRegion;
use crate::vision::{roi_transform, to_tensor, Affine2, Image, VisionOps};

/// 姿勢検出モデルの入力サイズ
pub const DETECTOR_INPUT_SIZE: usize = 224;
/// ランドマークモデルの入力サイズ
pub const LANDMARK_INPUT_SIZE: usize = 256;

/// レターボックス変換の情報（検出結果を元画像座標へ戻すのに使う）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// 正方形キャンバスの一辺
    pub size: usize,
    /// 元画像ピクセル / リサイズ後ピクセル
    pub scale: f32,
    /// 元画像ピクセル単位のパディング
    pub pad_x: f32,
    pub pad_y: f32,
}

impl LetterboxInfo {
    /// キャンバス正規化座標 → 元画像ピクセル座標
    pub fn to_image(&self, x: f32, y: f32) -> (f32, f32) {
        let k = self.scale * self.size as f32;
        (x * k - self.pad_x, y * k - self.pad_y)
    }
}

/// アスペクト比を保って `size`x`size` にリサイズし、短辺側を上下（左右）均等に0埋め
///
/// 出力: [size, size, 3] の f32 テンソル (0.0-1.0)
pub fn letterbox(vision: &dyn VisionOps, image: &Image, size: usize) -> Result<(Array3<f32>, LetterboxInfo)> {
    let (h, w) = (image.shape()[0], image.shape()[1]);
    if image.shape()[2] != 3 {
        bail!("letterbox expects an RGB image, got {} channels", image.shape()[2]);
    }

    let (h1, w1) = if h >= w { (size, size * w / h.max(1)) } else { (size * h / w.max(1), size) };
    if h1 == 0 || w1 == 0 {
        bail!("image {}x{} is too thin to letterbox", w, h);
    }
    let scale = if h >= w { w as f32 / w1 as f32 } else { h as f32 / h1 as f32 };
    let top = (size - h1) / 2;
    let left = (size - w1) / 2;

    let resized = vision.resize(image, w1, h1)?;
    let mut canvas = Array3::<f32>::zeros((size, size, 3));
    canvas
        .slice_mut(s![top..top + h1, left..left + w1, ..])
        .assign(&to_tensor(&resized));

    let info = LetterboxInfo {
        size,
        scale,
        pad_x: left as f32 * scale,
        pad_y: top as f32 * scale,
    };
    Ok((canvas, info))
}

/// ROI に沿って回転・切り出しした正方形クロップ
#[derive(Debug, Clone)]
pub struct AlignedCrop {
    /// [size, size, 3] の f32 テンソル (0.0-1.0)
    pub tensor: Array3<f32>,
    /// クロップピクセル座標 → 元画像ピクセル座標
    pub to_image: Affine2,
}

/// ROI を `size`x`size` に切り出す。ROI が退化していれば None
pub fn extract_roi(
    vision: &dyn VisionOps,
    image: &Image,
    region: &TrackedRegion,
    size: usize,
) -> Result<Option<AlignedCrop>> {
    let Some(forward) = roi_transform(region, size) else {
        return Ok(None);
    };
    let Some(to_image) = forward.inverse() else {
        return Ok(None);
    };
    let crop = vision.warp_affine(image, &forward, size, size)?;
    Ok(Some(AlignedCrop { tensor: to_tensor(&crop), to_image }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::SoftwareVision;

    #[test]
    fn test_letterbox_landscape() {
        // 640x480 → 224x168、上下に28pxずつパディング
        let image = Image::from_elem((480, 640, 3), 255);
        let (tensor, info) = letterbox(&SoftwareVision, &image, 224).unwrap();

        assert_eq!(tensor.shape(), &[224, 224, 3]);
        assert!((info.scale - 640.0 / 224.0).abs() < 1e-6);
        assert_eq!(info.pad_x, 0.0);
        assert!((info.pad_y - 28.0 * info.scale).abs() < 1e-4);

        // パディング領域は0、画像領域は1
        assert_eq!(tensor[[0, 100, 0]], 0.0);
        assert_eq!(tensor[[27, 100, 0]], 0.0);
        assert!((tensor[[28, 100, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[195, 100, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[196, 100, 0]], 0.0);
    }

    #[test]
    fn test_letterbox_to_image_inverts() {
        let image = Image::zeros((480, 640, 3));
        let (_, info) = letterbox(&SoftwareVision, &image, 224).unwrap();

        // 元画像の中心はキャンバス中心に来る
        let (x, y) = info.to_image(0.5, 0.5);
        assert!((x - 320.0).abs() < 1e-3);
        assert!((y - 240.0).abs() < 1e-3);

        // キャンバス左上は画像外（上のパディング）
        let (x, y) = info.to_image(0.0, 0.0);
        assert!(x.abs() < 1e-3);
        assert!((y + 80.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_portrait() {
        let image = Image::zeros((400, 200, 3));
        let (_, info) = letterbox(&SoftwareVision, &image, 224).unwrap();
        assert_eq!(info.pad_y, 0.0);
        assert!((info.pad_x - 56.0 * info.scale).abs() < 1e-4);
    }

    #[test]
    fn test_letterbox_rejects_mono() {
        let image = Image::zeros((10, 10, 1));
        assert!(letterbox(&SoftwareVision, &image, 224).is_err());
    }

    #[test]
    fn test_extract_roi_crop_shape_and_transform() {
        let mut image = Image::zeros((480, 640, 3));
        image[[240, 320, 0]] = 200;
        let region = TrackedRegion::new(320.0, 240.0, 128.0, 0.0);
        let crop = extract_roi(&SoftwareVision, &image, &region, 256).unwrap().unwrap();

        assert_eq!(crop.tensor.shape(), &[256, 256, 3]);
        let (x, y) = crop.to_image.apply(127.5, 127.5);
        assert!((x - 320.0).abs() < 1e-6);
        assert!((y - 240.0).abs() < 1e-6);
    }

    #[test]
    fn test_extract_roi_degenerate() {
        let image = Image::zeros((48, 64, 3));
        let region = TrackedRegion::new(32.0, 24.0, 0.0, 0.0);
        assert!(extract_roi(&SoftwareVision, &image, &region, 256).unwrap().is_none());
    }
}
