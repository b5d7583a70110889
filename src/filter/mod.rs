//! 時系列平滑化フィルタ
//!
//! フィルタは呼び出し側が与えるタイムスタンプだけに依存し、壁時計は読まない。
//! 同じ入力列からは常に同じ出力が得られる。

mod ema;
mod one_euro;

pub use ema::EmaFilter;
pub use one_euro::OneEuroFilter;

use crate::config::{FilterConfig, FilterKind};

/// 1信号（多次元）ぶんの状態付きフィルタ
pub trait SmoothingFilter: Send {
    /// `value` をその場で平滑化する
    fn filter(&mut self, value: &mut [f32], timestamp_ms: f64);

    fn reset(&mut self);
}

/// 何もしないフィルタ
#[derive(Debug, Default)]
pub struct Passthrough;

impl SmoothingFilter for Passthrough {
    fn filter(&mut self, _value: &mut [f32], _timestamp_ms: f64) {}

    fn reset(&mut self) {}
}

pub fn build_filter(kind: FilterKind, dims: usize, config: &FilterConfig, fps: u32) -> Box<dyn SmoothingFilter> {
    match kind {
        FilterKind::OneEuro => Box::new(OneEuroFilter::new(
            dims,
            config.min_cutoff,
            config.beta,
            config.d_cutoff,
            fps,
        )),
        FilterKind::Ema => Box::new(EmaFilter::new(config.ema_alpha)),
        FilterKind::None => Box::new(Passthrough),
    }
}

/// 関節ごとに独立したフィルタの集合
pub struct FilterBank {
    filters: Vec<Box<dyn SmoothingFilter>>,
}

impl FilterBank {
    pub fn new(kind: FilterKind, joints: usize, dims: usize, config: &FilterConfig, fps: u32) -> Self {
        Self {
            filters: (0..joints).map(|_| build_filter(kind, dims, config, fps)).collect(),
        }
    }

    /// `joint` 番目のフィルタで `value` を平滑化
    pub fn filter(&mut self, joint: usize, value: &mut [f32], timestamp_ms: f64) {
        if let Some(f) = self.filters.get_mut(joint) {
            f.filter(value, timestamp_ms);
        }
    }

    /// 全関節の履歴を捨てる
    pub fn reset(&mut self) {
        for f in self.filters.iter_mut() {
            f.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: FilterKind) -> Vec<f32> {
        let config = FilterConfig::default();
        let mut bank = FilterBank::new(kind, 2, 3, &config, 50);
        let mut out = Vec::new();
        for i in 0..20 {
            let t = i as f64 * 20.0;
            let mut v = [i as f32, (i * i) as f32 * 0.1, -(i as f32)];
            bank.filter(1, &mut v, t);
            out.extend_from_slice(&v);
        }
        out
    }

    #[test]
    fn test_deterministic_for_same_input() {
        for kind in [FilterKind::OneEuro, FilterKind::Ema, FilterKind::None] {
            assert_eq!(run(kind), run(kind));
        }
    }

    #[test]
    fn test_passthrough_leaves_values() {
        let out = run(FilterKind::None);
        assert_eq!(&out[3..6], &[1.0, 0.1, -1.0]);
    }

    #[test]
    fn test_joints_are_independent() {
        let config = FilterConfig::default();
        let mut bank = FilterBank::new(FilterKind::Ema, 2, 1, &config, 50);
        let mut a = [0.0];
        bank.filter(0, &mut a, 0.0);
        // joint 1 は初回なのでそのまま
        let mut b = [10.0];
        bank.filter(1, &mut b, 20.0);
        assert_eq!(b, [10.0]);
    }

    #[test]
    fn test_reset_restarts_every_joint() {
        let config = FilterConfig::default();
        let mut bank = FilterBank::new(FilterKind::OneEuro, 2, 1, &config, 50);
        for joint in 0..2 {
            let mut v = [0.0];
            bank.filter(joint, &mut v, 0.0);
        }
        bank.reset();
        for joint in 0..2 {
            let mut v = [100.0];
            bank.filter(joint, &mut v, 20.0);
            assert_eq!(v, [100.0]);
        }
    }
}
