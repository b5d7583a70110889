//! キャリブレーション結果の読み込み
//!
//! 内部・外部パラメータは別ツールで求めたものを JSON で受け取る。
//! 並進の単位は cm（出力時に m へ換算する）。

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::triangulation::CameraParams;

/// 単一カメラのキャリブレーション結果
#[derive(Debug, Clone, Deserialize)]
pub struct CameraCalibration {
    pub camera_index: i32,
    pub width: u32,
    pub height: u32,
    /// 内部パラメータ行列 K (row-major 3x3)
    pub intrinsic_matrix: [f64; 9],
    /// 歪み係数 [k1, k2, p1, p2, k3]。短ければ0で埋める
    pub dist_coeffs: Vec<f64>,
    /// 回転ベクトル (Rodrigues)
    pub rvec: [f64; 3],
    /// 並進ベクトル
    pub tvec: [f64; 3],
    /// 再投影誤差
    #[serde(default)]
    pub reprojection_error: f64,
}

impl CameraCalibration {
    pub fn to_params(&self) -> Result<CameraParams> {
        if self.dist_coeffs.len() > 5 && self.dist_coeffs[5..].iter().any(|&c| c != 0.0) {
            bail!(
                "camera {}: only 5 distortion coefficients are supported, got {}",
                self.camera_index,
                self.dist_coeffs.len()
            );
        }
        let mut dist = [0.0; 5];
        for (d, &c) in dist.iter_mut().zip(&self.dist_coeffs) {
            *d = c;
        }
        Ok(CameraParams::from_calibration(
            &self.intrinsic_matrix,
            &dist,
            &self.rvec,
            &self.tvec,
        ))
    }
}

/// マルチカメラキャリブレーション結果
///
/// キャリブレーションツールが書き出すボード情報などは読み飛ばす。
#[derive(Debug, Clone, Deserialize)]
pub struct MultiCameraCalibration {
    pub cameras: Vec<CameraCalibration>,
}

impl MultiCameraCalibration {
    /// 指定したデバイス番号の順にパラメータを並べる
    ///
    /// 内部パラメータは解像度に依存するので、`frame_size` と違えばエラー。
    pub fn camera_params(&self, indices: &[i32], frame_size: (u32, u32)) -> Result<Vec<CameraParams>> {
        indices
            .iter()
            .map(|&index| {
                let cal = self
                    .cameras
                    .iter()
                    .find(|c| c.camera_index == index)
                    .with_context(|| format!("No calibration for camera {}", index))?;
                if (cal.width, cal.height) != frame_size {
                    bail!(
                        "camera {} was calibrated at {}x{}, but frames are {}x{}",
                        index,
                        cal.width,
                        cal.height,
                        frame_size.0,
                        frame_size.1
                    );
                }
                cal.to_params()
            })
            .collect()
    }
}

pub fn load_calibration<P: AsRef<Path>>(path: P) -> Result<MultiCameraCalibration> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration file {}", path.display()))?;
    let cal: MultiCameraCalibration = serde_json::from_str(&content)?;
    Ok(cal)
}
