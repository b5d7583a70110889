//! ステージごとに専用スレッドを持つ推定パイプライン
//!
//! ```text
//! capture x N ─▶ scheduler ─┬──────────────(追跡経路)──────────────┐
//!                           └▶ detector ─▶ detection-gate ─────────┴▶ landmark ─▶ landmark-gate ─▶ triangulation ─▶ sink
//!                 ▲                                                                  │
//!                 └──────────────────── RegionStore ◀────────────────────────────────┘
//! ```
//!
//! ステージ間はすべて容量1のチャネル。カメラの収集点だけ容量 N_cam。

mod barrier;
mod capture;
mod channel;
pub mod detection_gate;
pub mod detector;
pub mod fps;
pub mod landmark;
pub mod landmark_gate;
pub mod round;
pub mod scheduler;
pub mod triangulate;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub use barrier::GenerationBarrier;
pub use channel::{handoff, HandoffReceiver, HandoffSender, RunFlag};
pub use fps::FpsCounter;

use crate::camera::{release_cameras, CameraSource};
use crate::config::Config;
use crate::error::{DropReason, PipelineError, RoundOutcome};
use crate::output::PoseSink;
use crate::pose::{generate_anchors, DetectionModel, LandmarkModel};
use crate::tracking::RegionStore;
use crate::triangulation::{AxisTransform, CameraParams};
use crate::vision::VisionOps;
use capture::{CaptureTask, FrameCollector};
use detection_gate::gate_detections;
use detector::run_detector;
use landmark::run_landmarks;
use landmark_gate::LandmarkGate;
use scheduler::{normalize_frames, plan_round, round_timestamp, Plan};
use triangulate::Triangulator;

/// FPS を報告する間隔（ラウンド数）
const FPS_WINDOW: u32 = 100;

/// パイプラインの外部協力者一式
pub struct PipelineParts {
    pub config: Config,
    /// カメラ ID 順
    pub cameras: Vec<Box<dyn CameraSource>>,
    /// カメラ ID 順
    pub calibration: Vec<CameraParams>,
    pub vision: Arc<dyn VisionOps>,
    pub detector: Box<dyn DetectionModel>,
    pub landmarker: Box<dyn LandmarkModel>,
    pub sink: Box<dyn PoseSink>,
}

type StageResult = Result<(), PipelineError>;
type CameraHandle = JoinHandle<(Box<dyn CameraSource>, StageResult)>;

/// スレッド終了時（panic を含む）に全体を止める
struct StopOnExit(RunFlag);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.stop();
    }
}

fn report(name: &str, result: &StageResult) {
    match result {
        Err(e) if !e.is_shutdown() => log::error!("{} stopped: {}", name, e),
        _ => log::debug!("{} exited", name),
    }
}

fn spawn_worker<T, F>(name: String, running: &RunFlag, body: F) -> Result<JoinHandle<T>, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let guard = StopOnExit(running.clone());
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            let _guard = guard;
            body()
        })
        .map_err(|source| PipelineError::Spawn { name, source })
}

fn log_drop(debug: bool, round: u64, reason: &DropReason) {
    if debug {
        log::debug!("round {} dropped: {}", round, reason);
    }
}

pub struct Pipeline {
    running: RunFlag,
    regions: Arc<RegionStore>,
    camera_handles: Vec<(usize, CameraHandle)>,
    /// スレッドを起動できずに残ったカメラ
    idle_cameras: Vec<Box<dyn CameraSource>>,
    stage_handles: Vec<(String, JoinHandle<StageResult>)>,
}

impl Pipeline {
    /// 全ワーカーを起動する
    ///
    /// 起動に失敗した場合は起動済みのワーカーを止め、カメラを解放してから返す。
    pub fn spawn(parts: PipelineParts) -> Result<Self, PipelineError> {
        let release_delay = Duration::from_millis(parts.config.camera.release_delay_ms);

        let camera_count = parts.cameras.len();
        let setup_error = if camera_count < 2 {
            Some(format!("at least 2 cameras are required, got {}", camera_count))
        } else if parts.calibration.len() != camera_count {
            Some(format!("{} cameras but {} calibrations", camera_count, parts.calibration.len()))
        } else {
            None
        };
        if let Some(message) = setup_error {
            release_cameras(parts.cameras, release_delay);
            return Err(PipelineError::Setup(message));
        }

        let running = RunFlag::new();
        let mut pipeline = Self {
            running: running.clone(),
            regions: Arc::new(RegionStore::new()),
            camera_handles: Vec::with_capacity(camera_count),
            idle_cameras: Vec::new(),
            stage_handles: Vec::new(),
        };

        if let Err(e) = pipeline.launch(parts) {
            running.stop();
            // 起動できなかったスレッドに渡したカメラはここで閉じられる
            let (cameras, _) = pipeline.join();
            release_cameras(cameras, release_delay);
            return Err(e);
        }
        Ok(pipeline)
    }

    fn launch(&mut self, parts: PipelineParts) -> Result<(), PipelineError> {
        let PipelineParts {
            config,
            cameras,
            calibration,
            vision,
            mut detector,
            mut landmarker,
            mut sink,
        } = parts;

        let camera_count = cameras.len();
        let running = self.running.clone();
        let regions = self.regions.clone();
        let barrier = Arc::new(GenerationBarrier::new());
        let epoch = Instant::now();
        let debug = config.debug;

        let (frame_tx, frame_rx) = handoff(camera_count, &running);
        let (detect_tx, detect_rx) = handoff(1, &running);
        let (detected_tx, detected_rx) = handoff(1, &running);
        let (crops_tx, crops_rx) = handoff(1, &running);
        let (landmarks_tx, landmarks_rx) = handoff(1, &running);
        let (accepted_tx, accepted_rx) = handoff(1, &running);

        // CaptureCoordinator
        {
            let mut cameras = cameras.into_iter().zip(&calibration).enumerate();
            while let Some((camera_id, (camera, params))) = cameras.next() {
                let task = CaptureTask {
                    camera_id,
                    camera,
                    undistort: config.camera.undistort.then(|| (vision.clone(), params.clone())),
                    frames: frame_tx.clone(),
                    barrier: barrier.clone(),
                    epoch,
                    running: running.clone(),
                };
                let name = format!("capture-{}", camera_id);
                let handle = spawn_worker(name.clone(), &running, move || {
                    let (camera, result) = task.run();
                    report(&name, &result);
                    (camera, result)
                });
                if let Err(e) = self.push_camera(camera_id, handle) {
                    self.idle_cameras = cameras.map(|(_, (camera, _))| camera).collect();
                    return Err(e);
                }
            }
        }
        drop(frame_tx);

        // DetectionScheduler
        {
            let collector = FrameCollector { frames: frame_rx, barrier, camera_count };
            let vision = vision.clone();
            let regions = regions.clone();
            let crops_tx = crops_tx.clone();
            self.push_stage("scheduler", move || -> StageResult {
                let mut index = 0u64;
                loop {
                    let frames = normalize_frames(collector.next_round()?)?;
                    let round = round::RoundInfo { index, timestamp_ms: round_timestamp(&frames) };
                    index += 1;
                    match plan_round(vision.as_ref(), round, frames, &regions.load())? {
                        Plan::Tracking(batch) => crops_tx.send(batch)?,
                        Plan::Detection(input) => detect_tx.send(input)?,
                    }
                }
            })?;
        }

        // DetectorStage
        self.push_stage("detector", move || -> StageResult {
            loop {
                let input = detect_rx.recv()?;
                detected_tx.send(run_detector(detector.as_mut(), input)?)?;
            }
        })?;

        // DetectionGate
        {
            let vision = vision.clone();
            let detection = config.detection.clone();
            self.push_stage("detection-gate", move || -> StageResult {
                let anchors = generate_anchors();
                loop {
                    let output = detected_rx.recv()?;
                    let index = output.round.index;
                    match gate_detections(vision.as_ref(), output, &anchors, &detection)? {
                        RoundOutcome::Continue(batch) => crops_tx.send(batch)?,
                        RoundOutcome::Drop(reason) => log_drop(debug, index, &reason),
                    }
                }
            })?;
        }

        // LandmarkStage
        self.push_stage("landmark", move || -> StageResult {
            loop {
                let batch = crops_rx.recv()?;
                landmarks_tx.send(run_landmarks(landmarker.as_mut(), batch)?)?;
            }
        })?;

        // LandmarkGate
        {
            let mut gate = LandmarkGate::new(
                config.landmark.clone(),
                regions,
                camera_count,
                config.filter.filter_2d,
                &config.filter,
                config.camera.fps,
            );
            self.push_stage("landmark-gate", move || -> StageResult {
                loop {
                    let batch = landmarks_rx.recv()?;
                    let index = batch.round.index;
                    match gate.process(batch)? {
                        RoundOutcome::Continue(round) => accepted_tx.send(round)?,
                        RoundOutcome::Drop(reason) => log_drop(debug, index, &reason),
                    }
                }
            })?;
        }

        // TriangulationStage
        {
            let mut triangulator = Triangulator::new(
                calibration,
                !config.camera.undistort,
                AxisTransform::from_config(&config.transform),
                config.filter.filter_3d,
                &config.filter,
                config.camera.fps,
            );
            self.push_stage("triangulation", move || -> StageResult {
                let mut fps = FpsCounter::new(FPS_WINDOW);
                loop {
                    let round = accepted_rx.recv()?;
                    let pose = triangulator.process(&round);
                    if let Err(e) = sink.emit(&pose) {
                        log::warn!("failed to send pose for round {}: {:#}", pose.round, e);
                    }
                    if let Some(rate) = fps.tick() {
                        log::info!("{:.1} fps", rate);
                    }
                }
            })?;
        }

        Ok(())
    }

    fn push_camera(
        &mut self,
        camera_id: usize,
        handle: Result<CameraHandle, PipelineError>,
    ) -> Result<(), PipelineError> {
        match handle {
            Ok(handle) => {
                self.camera_handles.push((camera_id, handle));
                Ok(())
            }
            Err(e) => {
                self.running.stop();
                Err(e)
            }
        }
    }

    fn push_stage<F>(&mut self, name: &str, body: F) -> Result<(), PipelineError>
    where
        F: FnOnce() -> StageResult + Send + 'static,
    {
        let stage = name.to_string();
        let spawned = spawn_worker(name.to_string(), &self.running, move || {
            let result = body();
            report(&stage, &result);
            result
        });
        match spawned {
            Ok(handle) => {
                self.stage_handles.push((name.to_string(), handle));
                Ok(())
            }
            Err(e) => {
                self.running.stop();
                Err(e)
            }
        }
    }

    pub fn run_flag(&self) -> RunFlag {
        self.running.clone()
    }

    /// 追跡領域（観測用）
    pub fn regions(&self) -> Arc<RegionStore> {
        self.regions.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// 停止を要求する。処理中のラウンドは破棄される
    pub fn stop(&self) {
        self.running.stop();
    }

    /// 全ワーカーの終了を待つ
    ///
    /// カメラは ID 順に返すので、呼び出し側が間隔を空けて解放する。
    /// 戻り値の結果は最初に起きた致命的エラー（停止要求による終了は含まない）。
    pub fn join(self) -> (Vec<Box<dyn CameraSource>>, StageResult) {
        let mut first_error: Option<PipelineError> = None;
        let mut record = |result: StageResult| {
            if let Err(e) = result {
                if !e.is_shutdown() && first_error.is_none() {
                    first_error = Some(e);
                }
            }
        };

        let mut cameras = Vec::with_capacity(self.camera_handles.len());
        for (camera_id, handle) in self.camera_handles {
            match handle.join() {
                Ok((camera, result)) => {
                    cameras.push(camera);
                    record(result);
                }
                Err(_) => record(Err(PipelineError::Panicked(format!("capture-{}", camera_id)))),
            }
        }
        cameras.extend(self.idle_cameras);
        for (name, handle) in self.stage_handles {
            match handle.join() {
                Ok(result) => record(result),
                Err(_) => record(Err(PipelineError::Panicked(name))),
            }
        }

        (cameras, first_error.map_or(Ok(()), Err))
    }
}
