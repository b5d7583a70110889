//! 姿勢検出モデル（SSD）の出力デコード
//!
//! 224x224 入力に対する 2254 アンカー、1アンカーあたり 12 値
//! （中心 x, y, 幅, 高さ, キーポイント4点）と 1 スコアを受け取る。

use anyhow::{bail, Result};
use ndarray::{ArrayView1, ArrayView2};

use super::preprocess::{LetterboxInfo, DETECTOR_INPUT_SIZE};
use super::sigmoid;
use crate::tracking::TrackedRegion;

/// 検出1件あたりのキーポイント数
pub const DETECTION_KEYPOINTS: usize = 4;
/// 1アンカーあたりの回帰値の数
pub const RAW_BOX_LEN: usize = 4 + 2 * DETECTION_KEYPOINTS;

const STRIDES: [usize; 5] = [8, 16, 32, 32, 32];
const ANCHORS_PER_LAYER: usize = 2;
const SCORE_CLIP: f32 = 100.0;

/// 全身 ROI: キーポイント0（腰中心）→ 1（スケール点）
const ROI_CENTER_KEYPOINT: usize = 0;
const ROI_SCALE_KEYPOINT: usize = 1;
const ROI_ENLARGE: f32 = 1.25;

/// アンカー中心（正規化座標）。サイズは常に1なので持たない
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x_center: f32,
    pub y_center: f32,
}

/// SSD アンカーを生成（224 入力で 2254 個）
///
/// 同じストライドが連続する層は1つの特徴マップにまとめ、
/// セルごとに層数 x 2 個のアンカーを置く。
pub fn generate_anchors() -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < STRIDES.len() {
        let stride = STRIDES[layer];
        let mut last = layer;
        while last < STRIDES.len() && STRIDES[last] == stride {
            last += 1;
        }
        let per_cell = ANCHORS_PER_LAYER * (last - layer);
        let fm = DETECTOR_INPUT_SIZE.div_ceil(stride);

        for y in 0..fm {
            for x in 0..fm {
                let anchor = Anchor {
                    x_center: (x as f32 + 0.5) / fm as f32,
                    y_center: (y as f32 + 0.5) / fm as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
        layer = last;
    }
    anchors
}

/// 検出結果（レターボックス正規化座標、`unletterbox` 後は画像ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub ymin: f32,
    pub xmin: f32,
    pub ymax: f32,
    pub xmax: f32,
    /// (x, y)
    pub keypoints: [[f32; 2]; DETECTION_KEYPOINTS],
    pub score: f32,
}

impl Detection {
    fn area(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0) * (self.xmax - self.xmin).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ymin = self.ymin.max(other.ymin);
        let xmin = self.xmin.max(other.xmin);
        let ymax = self.ymax.min(other.ymax);
        let xmax = self.xmax.min(other.xmax);
        let inter = (ymax - ymin).max(0.0) * (xmax - xmin).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    fn coords(&self) -> [f32; RAW_BOX_LEN] {
        let mut c = [0.0; RAW_BOX_LEN];
        c[..4].copy_from_slice(&[self.ymin, self.xmin, self.ymax, self.xmax]);
        for (k, kp) in self.keypoints.iter().enumerate() {
            c[4 + 2 * k] = kp[0];
            c[5 + 2 * k] = kp[1];
        }
        c
    }

    fn from_coords(c: &[f32; RAW_BOX_LEN], score: f32) -> Self {
        let mut keypoints = [[0.0; 2]; DETECTION_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = [c[4 + 2 * k], c[5 + 2 * k]];
        }
        Self { ymin: c[0], xmin: c[1], ymax: c[2], xmax: c[3], keypoints, score }
    }

    /// レターボックス正規化座標 → 元画像ピクセル座標
    pub fn unletterbox(&self, info: &LetterboxInfo) -> Self {
        let (xmin, ymin) = info.to_image(self.xmin, self.ymin);
        let (xmax, ymax) = info.to_image(self.xmax, self.ymax);
        let mut keypoints = self.keypoints;
        for kp in keypoints.iter_mut() {
            let (x, y) = info.to_image(kp[0], kp[1]);
            *kp = [x, y];
        }
        Self { ymin, xmin, ymax, xmax, keypoints, score: self.score }
    }

    /// 全身アライメント用キーポイントから ROI を作る（ピクセル座標で呼ぶこと）
    pub fn to_region(&self) -> TrackedRegion {
        TrackedRegion::from_alignment(
            self.keypoints[ROI_CENTER_KEYPOINT],
            self.keypoints[ROI_SCALE_KEYPOINT],
            ROI_ENLARGE,
        )
    }
}

/// 生出力をデコードし、スコア `min_score` 以上の検出を返す
///
/// `boxes`: [anchors, >=12]、`scores`: [anchors]（sigmoid 前の logit）
pub fn decode_detections(
    boxes: ArrayView2<f32>,
    scores: ArrayView1<f32>,
    anchors: &[Anchor],
    min_score: f32,
) -> Result<Vec<Detection>> {
    if boxes.nrows() != anchors.len() || boxes.ncols() < RAW_BOX_LEN {
        bail!(
            "detector boxes have shape {:?}, expected [{}, {}]",
            boxes.shape(),
            anchors.len(),
            RAW_BOX_LEN
        );
    }
    if scores.len() != anchors.len() {
        bail!("detector scores have {} entries, expected {}", scores.len(), anchors.len());
    }

    let size = DETECTOR_INPUT_SIZE as f32;
    let mut detections = Vec::new();
    for (i, anchor) in anchors.iter().enumerate() {
        let score = sigmoid(scores[i].clamp(-SCORE_CLIP, SCORE_CLIP));
        if score.is_nan() || score < min_score {
            continue;
        }
        let raw = boxes.row(i);
        let xc = raw[0] / size + anchor.x_center;
        let yc = raw[1] / size + anchor.y_center;
        let w = raw[2] / size;
        let h = raw[3] / size;

        let mut keypoints = [[0.0; 2]; DETECTION_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = [
                raw[4 + 2 * k] / size + anchor.x_center,
                raw[5 + 2 * k] / size + anchor.y_center,
            ];
        }

        detections.push(Detection {
            ymin: yc - h / 2.0,
            xmin: xc - w / 2.0,
            ymax: yc + h / 2.0,
            xmax: xc + w / 2.0,
            keypoints,
            score,
        });
    }
    Ok(detections)
}

/// 重み付き NMS
///
/// スコア順に先頭と IoU が閾値を超える検出をまとめ、
/// 座標はスコアで重み付け平均、スコアはグループの平均にする。
pub fn weighted_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut output = Vec::new();
    let mut remaining = detections;
    while !remaining.is_empty() {
        let first = remaining.remove(0);
        let (overlapping, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|d| first.iou(d) > iou_threshold);
        remaining = rest;

        if overlapping.is_empty() {
            output.push(first);
            continue;
        }

        let mut sum = [0.0f32; RAW_BOX_LEN];
        let mut total = 0.0f32;
        for d in std::iter::once(&first).chain(overlapping.iter()) {
            for (acc, v) in sum.iter_mut().zip(d.coords()) {
                *acc += v * d.score;
            }
            total += d.score;
        }
        if total <= 0.0 {
            output.push(first);
            continue;
        }
        for v in sum.iter_mut() {
            *v /= total;
        }
        let count = overlapping.len() + 1;
        output.push(Detection::from_coords(&sum, total / count as f32));
    }
    output
}
