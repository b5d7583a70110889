use std::time::{Duration, Instant};

/// 一定ラウンドごとにスループットを報告するカウンタ（診断用）
#[derive(Debug)]
pub struct FpsCounter {
    window: u32,
    frames: u32,
    start: Instant,
}

impl FpsCounter {
    pub fn new(window: u32) -> Self {
        Self { window: window.max(1), frames: 0, start: Instant::now() }
    }

    /// 1ラウンド分進める。窓が埋まったら FPS を返してリセット
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        if self.frames < self.window {
            return None;
        }
        let elapsed = now.saturating_duration_since(self.start).max(Duration::from_micros(1));
        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.start = now;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_once_per_window() {
        let mut counter = FpsCounter::new(4);
        let start = counter.start;
        for i in 1..4 {
            assert!(counter.tick_at(start + Duration::from_millis(10 * i)).is_none());
        }
        let fps = counter.tick_at(start + Duration::from_millis(200)).unwrap();
        assert!((fps - 20.0).abs() < 1e-9);

        // 次の窓は報告時点から数える
        for i in 1..4 {
            assert!(counter.tick_at(start + Duration::from_millis(200 + 10 * i)).is_none());
        }
        let fps = counter.tick_at(start + Duration::from_millis(300)).unwrap();
        assert!((fps - 40.0).abs() < 1e-9);
    }
}
