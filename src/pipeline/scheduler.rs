//! DetectionScheduler: ラウンドごとに追跡経路と検出経路を選ぶ

use super::round::{CropBatch, DetectionInput, RoundInfo};
use crate::camera::Frame;
use crate::error::PipelineError;
use crate::pose::{extract_roi, letterbox, DETECTOR_INPUT_SIZE, LANDMARK_INPUT_SIZE};
use crate::tracking::RegionSnapshot;
use crate::vision::{to_rgb, VisionOps};

/// ラウンドの行き先
pub enum Plan {
    /// 全カメラに追跡領域がある: 検出を飛ばして LandmarkStage へ
    Tracking(CropBatch),
    /// 1台でも領域がない: 全カメラで検出
    Detection(DetectionInput),
}

/// フレームを RGB に揃える
pub fn normalize_frames(frames: Vec<Frame>) -> Result<Vec<Frame>, PipelineError> {
    frames
        .into_iter()
        .map(|f| {
            let Frame { camera_id, timestamp_ms, image } = f;
            let image = to_rgb(image).map_err(PipelineError::Vision)?;
            Ok(Frame { camera_id, timestamp_ms, image })
        })
        .collect()
}

/// 経路の選択は全カメラ共通で、カメラごとに混ぜない
pub fn plan_round(
    vision: &dyn VisionOps,
    round: RoundInfo,
    frames: Vec<Frame>,
    snapshot: &RegionSnapshot,
) -> Result<Plan, PipelineError> {
    if let Some(regions) = snapshot.complete(frames.len()) {
        let mut crops = Vec::with_capacity(frames.len());
        for (frame, region) in frames.iter().zip(regions) {
            match extract_roi(vision, &frame.image, region, LANDMARK_INPUT_SIZE).map_err(PipelineError::Vision)? {
                Some(crop) => crops.push(crop),
                None => break,
            }
        }
        if crops.len() == frames.len() {
            return Ok(Plan::Tracking(CropBatch { round, frames, crops }));
        }
        log::debug!("round {}: tracked region unusable, falling back to detection", round.index);
    }

    let mut tensors = Vec::with_capacity(frames.len());
    let mut infos = Vec::with_capacity(frames.len());
    for frame in &frames {
        let (tensor, info) =
            letterbox(vision, &frame.image, DETECTOR_INPUT_SIZE).map_err(PipelineError::Vision)?;
        tensors.push(tensor);
        infos.push(info);
    }
    Ok(Plan::Detection(DetectionInput { round, frames, tensors, letterbox: infos }))
}

/// ラウンドの代表時刻（最も新しいフレーム）
pub fn round_timestamp(frames: &[Frame]) -> f64 {
    frames.iter().map(|f| f.timestamp_ms).fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{RegionStore, TrackedRegion};
    use crate::vision::{Image, SoftwareVision};

    fn frames() -> Vec<Frame> {
        (0..2)
            .map(|id| Frame {
                camera_id: id,
                timestamp_ms: 10.0 + id as f64,
                image: Image::from_elem((48, 64, 3), 128),
            })
            .collect()
    }

    fn round() -> RoundInfo {
        RoundInfo { index: 0, timestamp_ms: 11.0 }
    }

    #[test]
    fn test_no_regions_runs_detection() {
        let store = RegionStore::new();
        let plan = plan_round(&SoftwareVision, round(), frames(), &store.load()).unwrap();
        let Plan::Detection(input) = plan else {
            panic!("expected detection path");
        };
        assert_eq!(input.tensors.len(), 2);
        assert_eq!(input.tensors[0].shape(), &[224, 224, 3]);
        assert_eq!(input.letterbox.len(), 2);
    }

    #[test]
    fn test_complete_regions_short_circuit() {
        let store = RegionStore::new();
        let region = TrackedRegion::new(32.0, 24.0, 40.0, 0.0);
        store.publish(vec![region, region]);

        let plan = plan_round(&SoftwareVision, round(), frames(), &store.load()).unwrap();
        let Plan::Tracking(batch) = plan else {
            panic!("expected tracking path");
        };
        assert_eq!(batch.crops.len(), 2);
        assert_eq!(batch.crops[1].tensor.shape(), &[256, 256, 3]);
        assert_eq!(batch.frames[1].camera_id, 1);
    }

    #[test]
    fn test_partial_regions_run_detection_for_all() {
        let store = RegionStore::new();
        store.publish(vec![TrackedRegion::new(32.0, 24.0, 40.0, 0.0)]);
        let plan = plan_round(&SoftwareVision, round(), frames(), &store.load()).unwrap();
        assert!(matches!(plan, Plan::Detection(_)));
    }

    #[test]
    fn test_degenerate_region_falls_back() {
        let store = RegionStore::new();
        store.publish(vec![
            TrackedRegion::new(32.0, 24.0, 40.0, 0.0),
            TrackedRegion::new(32.0, 24.0, 0.0, 0.0),
        ]);
        let plan = plan_round(&SoftwareVision, round(), frames(), &store.load()).unwrap();
        assert!(matches!(plan, Plan::Detection(_)));
    }

    #[test]
    fn test_normalize_frames_to_rgb() {
        let mono = vec![Frame { camera_id: 0, timestamp_ms: 0.0, image: Image::zeros((4, 4, 1)) }];
        let out = normalize_frames(mono).unwrap();
        assert_eq!(out[0].image.shape(), &[4, 4, 3]);
    }

    #[test]
    fn test_round_timestamp_is_latest() {
        assert_eq!(round_timestamp(&frames()), 11.0);
    }
}
