//! 推論エンジンとの境界
//!
//! パイプラインはモデルを直接知らず、このトレイト越しに生出力だけを受け取る。
//! 実装は ONNX Runtime（`desktop` feature）とテスト用のフェイク。

use anyhow::Result;
use ndarray::{Array1, Array2, Array3};

/// 姿勢検出モデルの生出力
#[derive(Debug, Clone)]
pub struct RawDetections {
    /// [anchors, 12]
    pub boxes: Array2<f32>,
    /// [anchors]（logit）
    pub scores: Array1<f32>,
}

/// 姿勢検出モデル（1枚ずつ）
pub trait DetectionModel: Send {
    /// 入力: [224, 224, 3] の f32 テンソル
    fn detect(&mut self, input: &Array3<f32>) -> Result<RawDetections>;
}

/// ランドマークモデルの1クロップ分の生出力
#[derive(Debug, Clone)]
pub struct LandmarkOutput {
    /// [195]
    pub landmarks: Array1<f32>,
    /// 人物存在スコア（sigmoid 済み）
    pub presence: f32,
    /// [64, 64, 39]（logit）
    pub heatmap: Array3<f32>,
}

/// ランドマークモデル（全カメラ分をまとめて1回で推論）
pub trait LandmarkModel: Send {
    /// 入力: [256, 256, 3] のクロップ N 枚。出力は入力と同じ順序で N 件
    fn infer(&mut self, crops: &[Array3<f32>]) -> Result<Vec<LandmarkOutput>>;
}
