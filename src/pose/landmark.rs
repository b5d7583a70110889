//! ランドマークモデル出力の後処理
//!
//! 生出力 195 値 = 39 点 x (x, y, z, visibility, presence)。
//! x, y, z はクロップピクセル単位、visibility と presence は logit。

use anyhow::{bail, Result};
use ndarray::{ArrayView1, ArrayView3};

use super::keypoint::{Landmark, LandmarkIndex, Landmarks};
use super::sigmoid;
use crate::tracking::TrackedRegion;
use crate::vision::Affine2;

/// 1点あたりの生出力の値数
pub const VALUES_PER_LANDMARK: usize = 5;
/// ランドマークから次ラウンドの ROI を作るときの拡大率
const ROI_ENLARGE: f32 = 1.25;

/// 生出力をクロップ正規化座標のランドマークに変換
pub fn decode_landmarks(raw: ArrayView1<f32>, input_size: usize) -> Result<Landmarks> {
    let expected = LandmarkIndex::COUNT * VALUES_PER_LANDMARK;
    if raw.len() != expected {
        bail!("landmark output has {} values, expected {}", raw.len(), expected);
    }
    let size = input_size as f32;
    let mut landmarks = [Landmark::default(); LandmarkIndex::COUNT];
    for (i, lm) in landmarks.iter_mut().enumerate() {
        let base = i * VALUES_PER_LANDMARK;
        *lm = Landmark {
            x: raw[base] / size,
            y: raw[base + 1] / size,
            z: raw[base + 2] / size,
            visibility: sigmoid(raw[base + 3]),
            presence: sigmoid(raw[base + 4]),
        };
    }
    Ok(landmarks)
}

/// ヒートマップで x, y を補正する
///
/// 各点について現在位置を中心とする `kernel_size` 四方の窓で
/// sigmoid 後の信頼度による重心を求め、窓内の最大信頼度が
/// `min_confidence` 以上なら置き換える。z と visibility は変えない。
///
/// `heatmap`: [H, W, 39]
pub fn refine_from_heatmap(
    landmarks: &mut Landmarks,
    heatmap: ArrayView3<f32>,
    kernel_size: usize,
    min_confidence: f32,
) -> Result<()> {
    let (hm_h, hm_w, channels) = heatmap.dim();
    if channels != LandmarkIndex::COUNT {
        bail!("heatmap has {} channels, expected {}", channels, LandmarkIndex::COUNT);
    }
    if hm_h == 0 || hm_w == 0 {
        bail!("heatmap is empty");
    }
    let offset = (kernel_size.saturating_sub(1) / 2) as i64;

    for (k, lm) in landmarks.iter_mut().enumerate() {
        let col = (lm.x * hm_w as f32) as i64;
        let row = (lm.y * hm_h as f32) as i64;
        if !(0..hm_w as i64).contains(&col) || !(0..hm_h as i64).contains(&row) {
            continue;
        }

        let row_range = (row - offset).max(0)..=(row + offset).min(hm_h as i64 - 1);
        let col_range = (col - offset).max(0)..=(col + offset).min(hm_w as i64 - 1);

        let mut sum = 0.0f32;
        let mut weighted_col = 0.0f32;
        let mut weighted_row = 0.0f32;
        let mut max_conf = 0.0f32;
        for r in row_range {
            for c in col_range.clone() {
                let conf = sigmoid(heatmap[[r as usize, c as usize, k]]);
                sum += conf;
                max_conf = max_conf.max(conf);
                weighted_col += c as f32 * conf;
                weighted_row += r as f32 * conf;
            }
        }

        if max_conf >= min_confidence && sum > 0.0 {
            lm.x = weighted_col / hm_w as f32 / sum;
            lm.y = weighted_row / hm_h as f32 / sum;
        }
    }
    Ok(())
}

/// クロップ正規化座標 → 元画像ピクセル座標（z はそのまま）
pub fn project_to_image(landmarks: &mut Landmarks, to_image: &Affine2, input_size: usize) {
    let size = input_size as f64;
    for lm in landmarks.iter_mut() {
        let (x, y) = to_image.apply(lm.x as f64 * size, lm.y as f64 * size);
        lm.x = x as f32;
        lm.y = y as f32;
    }
}

/// 画像座標のランドマークから次ラウンドの追跡領域を作る
///
/// 中心と大きさは身体 33 点の外接矩形（長辺を正方形に広げる）、
/// 回転は位置合わせ用の2点から求める。
pub fn landmarks_to_region(landmarks: &Landmarks) -> TrackedRegion {
    let body = &landmarks[..LandmarkIndex::BODY_COUNT];
    let (mut xmin, mut ymin) = (f32::INFINITY, f32::INFINITY);
    let (mut xmax, mut ymax) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for lm in body {
        xmin = xmin.min(lm.x);
        xmax = xmax.max(lm.x);
        ymin = ymin.min(lm.y);
        ymax = ymax.max(lm.y);
    }

    let center = &landmarks[LandmarkIndex::AlignCenter as usize];
    let scale_point = &landmarks[LandmarkIndex::AlignScale as usize];
    let rotation = crate::tracking::alignment_rotation([center.x, center.y], [scale_point.x, scale_point.y]);

    TrackedRegion::new(
        (xmin + xmax) / 2.0,
        (ymin + ymax) / 2.0,
        (xmax - xmin).max(ymax - ymin) * ROI_ENLARGE,
        rotation,
    )
}
