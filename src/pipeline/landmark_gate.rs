//! LandmarkGate: 存在スコアで判定し、ランドマークを画像座標に戻して平滑化する
//!
//! 次ラウンドの追跡領域もここで更新する。

use std::sync::Arc;

use super::round::{LandmarkBatch, LandmarkRound};
use crate::config::{FilterConfig, FilterKind, LandmarkConfig};
use crate::error::{DropReason, PipelineError, RoundOutcome};
use crate::filter::FilterBank;
use crate::pose::{
    decode_landmarks, landmarks_to_region, project_to_image, refine_from_heatmap, LandmarkIndex, Landmarks,
    LANDMARK_INPUT_SIZE,
};
use crate::tracking::RegionStore;

/// 2D 平滑化の対象: x, y, z, visibility
const FILTER_DIMS: usize = 4;

pub struct LandmarkGate {
    config: LandmarkConfig,
    regions: Arc<RegionStore>,
    /// カメラごと、関節ごとのフィルタ
    filters: Vec<FilterBank>,
    last_round: Option<u64>,
}

impl LandmarkGate {
    pub fn new(
        config: LandmarkConfig,
        regions: Arc<RegionStore>,
        camera_count: usize,
        filter_kind: FilterKind,
        filter_config: &FilterConfig,
        fps: u32,
    ) -> Self {
        let filters = (0..camera_count)
            .map(|_| FilterBank::new(filter_kind, LandmarkIndex::COUNT, FILTER_DIMS, filter_config, fps))
            .collect();
        Self { config, regions, filters, last_round: None }
    }

    pub fn process(&mut self, batch: LandmarkBatch) -> Result<RoundOutcome<LandmarkRound>, PipelineError> {
        // 追跡経路のラウンドが検出経路のラウンドを追い越すことがある
        if let Some(latest) = self.last_round {
            if batch.round.index <= latest {
                return Ok(RoundOutcome::Drop(DropReason::OutOfOrder { round: batch.round.index, latest }));
            }
        }

        // 1台でも低ければ全カメラの追跡領域を捨てる
        for (camera, output) in batch.outputs.iter().enumerate() {
            // NaN も低スコア扱い
            if output.presence.is_nan() || output.presence < self.config.min_score {
                self.regions.invalidate();
                // 再検出後の位置に前の被写体の履歴を混ぜない
                for bank in &mut self.filters {
                    bank.reset();
                }
                return Ok(RoundOutcome::Drop(DropReason::LowPresence { camera, score: output.presence }));
            }
        }

        let mut landmarks: Vec<Landmarks> = Vec::with_capacity(batch.outputs.len());
        for (output, to_image) in batch.outputs.iter().zip(&batch.transforms) {
            let mut lms = decode_landmarks(output.landmarks.view(), LANDMARK_INPUT_SIZE)
                .map_err(PipelineError::Inference)?;
            refine_from_heatmap(
                &mut lms,
                output.heatmap.view(),
                self.config.refine_kernel_size,
                self.config.refine_min_score,
            )
            .map_err(PipelineError::Inference)?;
            project_to_image(&mut lms, to_image, LANDMARK_INPUT_SIZE);
            landmarks.push(lms);
        }

        // 追跡領域は平滑化前の位置から作る
        let regions: Vec<_> = landmarks.iter().map(landmarks_to_region).collect();
        if regions.iter().any(|r| r.is_degenerate()) {
            log::debug!("round {}: landmarks give a degenerate region, tracking reset", batch.round.index);
            self.regions.invalidate();
        } else {
            self.regions.publish(regions);
        }

        let t = batch.round.timestamp_ms;
        for (lms, bank) in landmarks.iter_mut().zip(self.filters.iter_mut()) {
            for (joint, lm) in lms.iter_mut().enumerate() {
                let mut v = [lm.x, lm.y, lm.z, lm.visibility];
                bank.filter(joint, &mut v, t);
                [lm.x, lm.y, lm.z, lm.visibility] = v;
            }
        }

        self.last_round = Some(batch.round.index);
        Ok(RoundOutcome::Continue(LandmarkRound {
            round: batch.round,
            frames: batch.frames,
            landmarks,
            presence: batch.outputs.iter().map(|o| o.presence).collect(),
        }))
    }
}
