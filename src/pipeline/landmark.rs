//! LandmarkStage: 全カメラ分のクロップを1回のバッチ推論にかける

use super::round::{CropBatch, LandmarkBatch};
use crate::error::PipelineError;
use crate::pose::LandmarkModel;

pub fn run_landmarks(model: &mut dyn LandmarkModel, batch: CropBatch) -> Result<LandmarkBatch, PipelineError> {
    let (tensors, transforms): (Vec<_>, Vec<_>) = batch
        .crops
        .into_iter()
        .map(|crop| (crop.tensor, crop.to_image))
        .unzip();

    let outputs = model.infer(&tensors).map_err(PipelineError::Inference)?;
    if outputs.len() != tensors.len() {
        return Err(PipelineError::Inference(anyhow::anyhow!(
            "landmark model returned {} results for a batch of {}",
            outputs.len(),
            tensors.len()
        )));
    }

    Ok(LandmarkBatch {
        round: batch.round,
        frames: batch.frames,
        transforms,
        outputs,
    })
}
