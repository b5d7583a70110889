//! ラウンドをまたいで共有される追跡領域 (ROI)
//!
//! LandmarkGate が書き込み、DetectionScheduler が読む。
//! 全カメラ分の領域を1つの不変スナップショットとして差し替えるため、
//! 読み手がカメラ間で食い違った状態を観測することはない。

use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::sync::{Arc, Mutex, PoisonError};

/// 被写体の推定位置（フル解像度画像のピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedRegion {
    pub center_x: f32,
    pub center_y: f32,
    /// 正方形クロップの一辺（ピクセル）
    pub scale: f32,
    /// 回転（ラジアン）
    pub rotation: f32,
}

impl TrackedRegion {
    pub fn new(center_x: f32, center_y: f32, scale: f32, rotation: f32) -> Self {
        Self { center_x, center_y, scale, rotation }
    }

    /// 中心点とスケール点の2点から ROI を作る
    ///
    /// 一辺は2点間距離の2倍に `enlarge` を掛けたもの。
    pub fn from_alignment(center: [f32; 2], scale_point: [f32; 2], enlarge: f32) -> Self {
        let dx = scale_point[0] - center[0];
        let dy = scale_point[1] - center[1];
        let scale = 2.0 * (dx * dx + dy * dy).sqrt() * enlarge;
        Self::new(center[0], center[1], scale, alignment_rotation(center, scale_point))
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.scale.is_finite() && self.scale > 1.0)
            || !self.center_x.is_finite()
            || !self.center_y.is_finite()
            || !self.rotation.is_finite()
    }
}

/// [-π, π) に正規化
pub fn normalize_radians(angle: f32) -> f32 {
    angle - TAU * ((angle + PI) / TAU).floor()
}

/// 中心 → スケール点が画像上方向を向くとき 0 になる回転角
pub fn alignment_rotation(center: [f32; 2], scale_point: [f32; 2]) -> f32 {
    let angle = (center[1] - scale_point[1]).atan2(center[0] - scale_point[0]);
    normalize_radians(angle - FRAC_PI_2)
}

/// ある時点での全カメラ分の追跡領域
#[derive(Debug, Clone, Default)]
pub struct RegionSnapshot {
    /// 書き込みのたびに増える
    pub version: u64,
    pub regions: Option<Arc<[TrackedRegion]>>,
}

impl RegionSnapshot {
    /// 全カメラの領域が揃っていればそれを返す
    pub fn complete(&self, camera_count: usize) -> Option<&[TrackedRegion]> {
        self.regions
            .as_deref()
            .filter(|regions| regions.len() == camera_count)
    }
}

/// 追跡領域の共有ストア（copy-on-read）
#[derive(Debug, Default)]
pub struct RegionStore {
    inner: Mutex<RegionSnapshot>,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 現在のスナップショットを取得（Arcのクローンのみ）
    pub fn load(&self) -> RegionSnapshot {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 全カメラ分の領域をまとめて差し替える
    pub fn publish(&self, regions: Vec<TrackedRegion>) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.version += 1;
        guard.regions = Some(regions.into());
    }

    /// 全カメラの領域を無効化する
    pub fn invalidate(&self) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        guard.version += 1;
        guard.regions = None;
    }
}
