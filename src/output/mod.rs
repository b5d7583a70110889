//! 3D 点群の出力先

mod osc;

use anyhow::Result;

pub use osc::{build_pose_bundle, OscPoseSink, POINT_ADDR};

use crate::pose::LandmarkIndex;

/// 1ラウンド分の 3D 関節位置（出力座標系、平滑化済み）
#[derive(Debug, Clone, PartialEq)]
pub struct Pose3D {
    pub round: u64,
    pub timestamp_ms: f64,
    pub points: [[f32; 3]; LandmarkIndex::COUNT],
}

/// 点群の送り先
///
/// 送信失敗はパイプラインを止めない（呼び出し側がログに残して次へ進む）。
pub trait PoseSink: Send {
    fn emit(&mut self, pose: &Pose3D) -> Result<()>;
}
