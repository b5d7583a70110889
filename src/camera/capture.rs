use anyhow::{bail, Context, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};

use super::CameraSource;
use crate::config::CameraConfig;
use crate::vision::opencv_ops::mat_to_image;
use crate::vision::Image;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    index: i32,
    capture: VideoCapture,
    color: bool,
}

impl OpenCvCamera {
    /// 設定の解像度・FPS・カラーモードでカメラを開く
    pub fn open(index: i32, config: &CameraConfig) -> Result<Self> {
        let mut capture = VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32)
            .with_context(|| format!("Failed to open camera {}", index))?;

        if !capture.is_opened()? {
            bail!("Camera {} is not available", index);
        }

        let (width, height) = config.frame_size();
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_FPS, config.fps as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let actual_fps = capture.get(videoio::CAP_PROP_FPS)?;
        log::info!(
            "camera {}: {}x{} @ {} fps ({})",
            index,
            actual_width,
            actual_height,
            actual_fps,
            if config.color != 0 { "color" } else { "mono" }
        );
        if (actual_width, actual_height) != (width, height) {
            log::warn!(
                "camera {}: requested {}x{}, driver delivers {}x{}",
                index,
                width,
                height,
                actual_width,
                actual_height
            );
        }

        Ok(Self {
            index,
            capture,
            color: config.color != 0,
        })
    }
}

impl CameraSource for OpenCvCamera {
    /// RGB（カラー）または 1ch（モノクロ）で返す
    fn get_frame(&mut self) -> Result<Image> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .with_context(|| format!("Failed to read frame from camera {}", self.index))?;

        if frame.empty() {
            bail!("Empty frame received from camera {}", self.index);
        }

        let code = if self.color { imgproc::COLOR_BGR2RGB } else { imgproc::COLOR_BGR2GRAY };
        let mut converted = Mat::default();
        imgproc::cvt_color_def(&frame, &mut converted, code)?;
        mat_to_image(&converted)
    }

    fn release(&mut self) -> Result<()> {
        self.capture
            .release()
            .with_context(|| format!("Failed to release camera {}", self.index))
    }
}
