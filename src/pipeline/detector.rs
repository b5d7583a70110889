//! DetectorStage: 検出モデルへの素通し

use super::round::{DetectionInput, DetectorOutput};
use crate::error::PipelineError;
use crate::pose::DetectionModel;

/// カメラごとに1回ずつ検出モデルを呼ぶ。出力には手を加えない
pub fn run_detector(model: &mut dyn DetectionModel, input: DetectionInput) -> Result<DetectorOutput, PipelineError> {
    let raw = input
        .tensors
        .iter()
        .map(|tensor| model.detect(tensor))
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(PipelineError::Inference)?;

    Ok(DetectorOutput {
        round: input.round,
        frames: input.frames,
        raw,
        letterbox: input.letterbox,
    })
}
