//! カメラの境界
//!
//! `CameraSource` はブロッキングでフレームを返すだけのドライバ抽象。
//! 同期・歪み補正はパイプラインのキャプチャタスクが行う。

#[cfg(feature = "desktop")]
mod capture;

use anyhow::Result;
use std::thread;
use std::time::Duration;

#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;

use crate::vision::Image;

/// 1台のカメラから取得した1フレーム。取得後は変更しない
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_id: usize,
    /// パイプライン起動時刻からの経過 (ms)
    pub timestamp_ms: f64,
    pub image: Image,
}

/// カメラドライバ
///
/// モード・解像度・FPS は生成時に決まる。
pub trait CameraSource: Send {
    /// 次のフレームを取得（ブロッキング）
    fn get_frame(&mut self) -> Result<Image>;

    /// ハンドルを解放する。以後 `get_frame` は失敗してよい
    fn release(&mut self) -> Result<()>;
}

/// カメラを ID 順に1台ずつ解放する
///
/// ドライバが同時解放を受け付けないので、台と台の間に `delay` を空ける。
/// 解放の失敗はログに残して次へ進む。
pub fn release_cameras(cameras: Vec<Box<dyn CameraSource>>, delay: Duration) {
    for (i, mut camera) in cameras.into_iter().enumerate() {
        if i > 0 {
            thread::sleep(delay);
        }
        match camera.release() {
            Ok(()) => log::debug!("camera {} released", i),
            Err(e) => log::warn!("failed to release camera {}: {:#}", i, e),
        }
    }
}
