//! CaptureCoordinator: カメラごとの取得タスクと、全カメラ分を集めて解放する消費側

use std::sync::Arc;
use std::time::Instant;

use super::barrier::GenerationBarrier;
use super::channel::{HandoffReceiver, HandoffSender, RunFlag};
use crate::camera::{CameraSource, Frame};
use crate::error::PipelineError;
use crate::triangulation::CameraParams;
use crate::vision::VisionOps;

/// 1台のカメラの取得ループ
pub(crate) struct CaptureTask {
    pub camera_id: usize,
    pub camera: Box<dyn CameraSource>,
    /// 歪み補正を行う場合のみ
    pub undistort: Option<(Arc<dyn VisionOps>, CameraParams)>,
    pub frames: HandoffSender<Frame>,
    pub barrier: Arc<GenerationBarrier>,
    pub epoch: Instant,
    pub running: RunFlag,
}

impl CaptureTask {
    /// 終了後にカメラを返す（解放は呼び出し側が間隔を空けて行う）
    pub fn run(mut self) -> (Box<dyn CameraSource>, Result<(), PipelineError>) {
        let result = self.capture_loop();
        (self.camera, result)
    }

    fn capture_loop(&mut self) -> Result<(), PipelineError> {
        while self.running.is_running() {
            let seen = self.barrier.generation();

            let image = self.camera.get_frame().map_err(|source| PipelineError::Camera {
                camera: self.camera_id,
                source,
            })?;
            let timestamp_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;

            let image = match &self.undistort {
                Some((vision, params)) => vision.undistort(&image, params).map_err(PipelineError::Vision)?,
                None => image,
            };

            self.frames.send(Frame { camera_id: self.camera_id, timestamp_ms, image })?;
            self.barrier.wait_past(seen, &self.running)?;
        }
        Ok(())
    }
}

/// 全カメラのフレームを1ラウンド分集める
pub(crate) struct FrameCollector {
    pub frames: HandoffReceiver<Frame>,
    pub barrier: Arc<GenerationBarrier>,
    pub camera_count: usize,
}

impl FrameCollector {
    /// N_cam 枚を受け取り、カメラ ID 順に並べてからカメラタスクを解放する
    pub fn next_round(&self) -> Result<Vec<Frame>, PipelineError> {
        let mut frames = (0..self.camera_count)
            .map(|_| self.frames.recv())
            .collect::<Result<Vec<_>, _>>()?;
        frames.sort_by_key(|f| f.camera_id);
        self.barrier.release();
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::channel::handoff;
    use crate::vision::Image;
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    struct CountingCamera {
        delay: Duration,
        reads: Arc<AtomicUsize>,
        fail_after: Option<usize>,
    }

    impl CameraSource for CountingCamera {
        fn get_frame(&mut self) -> Result<Image> {
            thread::sleep(self.delay);
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|limit| n >= limit) {
                bail!("device lost");
            }
            Ok(Image::from_elem((2, 2, 3), n as u8))
        }

        fn release(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn spawn_tasks(
        delays: &[u64],
        fail_after: Option<usize>,
    ) -> (RunFlag, FrameCollector, Vec<Arc<AtomicUsize>>, Vec<thread::JoinHandle<Result<(), PipelineError>>>) {
        let running = RunFlag::new();
        let barrier = Arc::new(GenerationBarrier::new());
        let (tx, rx) = handoff(delays.len(), &running);
        let epoch = Instant::now();

        let mut counters = Vec::new();
        let mut handles = Vec::new();
        for (id, &ms) in delays.iter().enumerate() {
            let reads = Arc::new(AtomicUsize::new(0));
            counters.push(reads.clone());
            let task = CaptureTask {
                camera_id: id,
                camera: Box::new(CountingCamera { delay: Duration::from_millis(ms), reads, fail_after }),
                undistort: None,
                frames: tx.clone(),
                barrier: barrier.clone(),
                epoch,
                running: running.clone(),
            };
            handles.push(thread::spawn(move || task.run().1));
        }
        let collector = FrameCollector { frames: rx, barrier, camera_count: delays.len() };
        (running, collector, counters, handles)
    }

    #[test]
    fn test_rounds_are_sorted_and_lockstep() {
        // カメラ0は遅い。到着順は 1 → 0 になる
        let (running, collector, counters, handles) = spawn_tasks(&[30, 0], None);

        for round in 0..3 {
            let frames = collector.next_round().unwrap();
            let ids: Vec<_> = frames.iter().map(|f| f.camera_id).collect();
            assert_eq!(ids, vec![0, 1]);
            for f in &frames {
                assert_eq!(f.image[[0, 0, 0]], round as u8);
            }
        }

        // 速いカメラも遅いカメラを追い越さない
        thread::sleep(Duration::from_millis(100));
        let fast = counters[1].load(Ordering::SeqCst);
        let slow = counters[0].load(Ordering::SeqCst);
        assert!(fast <= slow + 1, "fast camera ran ahead: {} vs {}", fast, slow);

        running.stop();
        for h in handles {
            assert!(h.join().unwrap().unwrap_err().is_shutdown());
        }
    }

    #[test]
    fn test_camera_failure_is_fatal() {
        let (running, collector, _, handles) = spawn_tasks(&[0, 0], Some(1));
        collector.next_round().unwrap();

        let mut errors = Vec::new();
        for h in handles {
            if let Err(e) = h.join().unwrap() {
                errors.push(e);
            }
        }
        running.stop();
        assert!(errors.iter().any(|e| matches!(e, PipelineError::Camera { .. })));
    }
}
