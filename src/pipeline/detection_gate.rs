//! DetectionGate: 全カメラで被写体が見つかったラウンドだけを通す

use super::round::{CropBatch, DetectorOutput};
use crate::config::DetectionConfig;
use crate::error::{DropReason, PipelineError, RoundOutcome};
use crate::pose::{decode_detections, extract_roi, weighted_nms, Anchor, Detection, LANDMARK_INPUT_SIZE};
use crate::vision::VisionOps;

/// 1台でも候補がなければラウンドごと破棄し、クロップは作らない
pub fn gate_detections(
    vision: &dyn VisionOps,
    output: DetectorOutput,
    anchors: &[Anchor],
    config: &DetectionConfig,
) -> Result<RoundOutcome<CropBatch>, PipelineError> {
    let mut candidates: Vec<Detection> = Vec::with_capacity(output.raw.len());
    for (camera, raw) in output.raw.iter().enumerate() {
        let detections = decode_detections(raw.boxes.view(), raw.scores.view(), anchors, config.min_score)
            .map_err(PipelineError::Inference)?;
        let best = weighted_nms(detections, config.nms_threshold)
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score));
        match best {
            Some(best) => candidates.push(best.unletterbox(&output.letterbox[camera])),
            None => return Ok(RoundOutcome::Drop(DropReason::NoDetection { camera })),
        }
    }

    let mut crops = Vec::with_capacity(candidates.len());
    for (camera, (candidate, frame)) in candidates.iter().zip(&output.frames).enumerate() {
        let region = candidate.to_region();
        let crop = extract_roi(vision, &frame.image, &region, LANDMARK_INPUT_SIZE).map_err(PipelineError::Vision)?;
        match crop {
            Some(crop) => crops.push(crop),
            None => return Ok(RoundOutcome::Drop(DropReason::DegenerateRegion { camera })),
        }
    }

    Ok(RoundOutcome::Continue(CropBatch {
        round: output.round,
        frames: output.frames,
        crops,
    }))
}
