use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stereo_pose::calibration::load_calibration;
use stereo_pose::camera::{release_cameras, CameraSource, OpenCvCamera};
use stereo_pose::config::Config;
use stereo_pose::output::OscPoseSink;
use stereo_pose::pipeline::{Pipeline, PipelineParts};
use stereo_pose::pose::{OnnxDetector, OnnxLandmarker};
use stereo_pose::vision::OpenCvVision;

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| CONFIG_PATH.into());
    let (config, load_error) = Config::load_or_default(&config_path);

    let default_filter = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();
    if let Some(e) = load_error {
        log::warn!("{:#}; using defaults", e);
    }

    config.validate().context("invalid configuration")?;

    let (width, height) = config.camera.frame_size();
    log::info!("Stereo Pose ({})", env!("GIT_VERSION"));
    log::info!("Output: {}", config.output.addr());
    log::info!(
        "Cameras: {:?} {}x{} @ {} fps, undistort {}",
        config.camera.indices,
        width,
        height,
        config.camera.fps,
        if config.camera.undistort { "ON" } else { "OFF" }
    );
    log::info!("Detector: {}", config.model.detector_path);
    log::info!("Landmark: {}", config.model.landmark_path());

    let calibration = load_calibration(&config.camera.calibration_path)?
        .camera_params(&config.camera.indices, config.camera.frame_size())
        .context("calibration does not match the configured cameras")?;

    let detector = OnnxDetector::new(&config.model.detector_path)?;
    let landmarker = OnnxLandmarker::new(config.model.landmark_path())?;
    log::info!("Models loaded");

    let sink = OscPoseSink::new(&config.output.addr())?;

    let release_delay = Duration::from_millis(config.camera.release_delay_ms);
    let mut cameras: Vec<Box<dyn CameraSource>> = Vec::new();
    for &index in &config.camera.indices {
        match OpenCvCamera::open(index, &config.camera) {
            Ok(camera) => cameras.push(Box::new(camera)),
            Err(e) => {
                release_cameras(cameras, release_delay);
                return Err(e);
            }
        }
    }

    let pipeline = Pipeline::spawn(PipelineParts {
        config,
        cameras,
        calibration,
        vision: Arc::new(OpenCvVision),
        detector: Box::new(detector),
        landmarker: Box::new(landmarker),
        sink: Box::new(sink),
    })?;

    let handler = ctrlc::set_handler({
        let running = pipeline.run_flag();
        move || {
            log::info!("Received Ctrl-C, stopping");
            running.stop();
        }
    });
    if let Err(e) = handler {
        log::warn!("failed to install Ctrl-C handler: {}", e);
    }

    let (cameras, result) = pipeline.join();

    release_cameras(cameras, release_delay);
    log::info!("Cameras released");

    result.context("pipeline failed")
}
