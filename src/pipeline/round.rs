//! ステージ間で受け渡すラウンド単位のデータ
//!
//! どの型もカメラ ID 順に並んだ長さ N_cam のベクタを持つ。

use ndarray::Array3;

use crate::camera::Frame;
use crate::pose::{AlignedCrop, LandmarkOutput, Landmarks, LetterboxInfo, RawDetections};
use crate::vision::Affine2;

/// ラウンドの識別情報
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundInfo {
    /// 0 から単調増加
    pub index: u64,
    /// ラウンド内で最も新しいフレームの取得時刻 (ms)
    pub timestamp_ms: f64,
}

/// 検出経路: DetectionScheduler → DetectorStage
pub struct DetectionInput {
    pub round: RoundInfo,
    pub frames: Vec<Frame>,
    /// [224, 224, 3]
    pub tensors: Vec<Array3<f32>>,
    pub letterbox: Vec<LetterboxInfo>,
}

/// DetectorStage → DetectionGate
pub struct DetectorOutput {
    pub round: RoundInfo,
    pub frames: Vec<Frame>,
    pub raw: Vec<RawDetections>,
    pub letterbox: Vec<LetterboxInfo>,
}

/// 両経路の合流点: DetectionGate / DetectionScheduler(追跡経路) → LandmarkStage
pub struct CropBatch {
    pub round: RoundInfo,
    pub frames: Vec<Frame>,
    pub crops: Vec<AlignedCrop>,
}

/// LandmarkStage → LandmarkGate
pub struct LandmarkBatch {
    pub round: RoundInfo,
    pub frames: Vec<Frame>,
    /// クロップ → 元画像の変換
    pub transforms: Vec<Affine2>,
    pub outputs: Vec<LandmarkOutput>,
}

/// LandmarkGate → TriangulationStage
pub struct LandmarkRound {
    pub round: RoundInfo,
    /// デバッグ表示用。三角測量には使わない
    pub frames: Vec<Frame>,
    /// 画像ピクセル座標、平滑化済み
    pub landmarks: Vec<Landmarks>,
    pub presence: Vec<f32>,
}
