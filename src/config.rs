use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub landmark: LandmarkConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    /// ラウンド破棄の理由などをdebugレベルで出力
    #[serde(default)]
    pub debug: bool,
}

/// 3D点群の送信先 (OSC over UDP)
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 9000 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl OutputConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// 1 → 640x480, それ以外 → 320x240
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    /// 0 = モノクロ, 1 = カラー
    #[serde(default = "default_color")]
    pub color: u32,
    #[serde(default = "default_true")]
    pub undistort: bool,
    /// デバイスインデックス。並び順がパイプライン上のカメラIDになる
    #[serde(default = "default_indices")]
    pub indices: Vec<i32>,
    /// カメラ解放の間隔（ドライバ制約）
    #[serde(default = "default_release_delay_ms")]
    pub release_delay_ms: u64,
    #[serde(default = "default_calibration_path")]
    pub calibration_path: String,
}

fn default_fps() -> u32 { 50 }
fn default_resolution() -> u32 { 1 }
fn default_color() -> u32 { 1 }
fn default_true() -> bool { true }
fn default_indices() -> Vec<i32> { vec![0, 1] }
fn default_release_delay_ms() -> u64 { 200 }
fn default_calibration_path() -> String { "calibration.json".to_string() }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            resolution: default_resolution(),
            color: default_color(),
            undistort: default_true(),
            indices: default_indices(),
            release_delay_ms: default_release_delay_ms(),
            calibration_path: default_calibration_path(),
        }
    }
}

impl CameraConfig {
    pub fn frame_size(&self) -> (u32, u32) {
        if self.resolution == 1 { (640, 480) } else { (320, 240) }
    }

    pub fn camera_count(&self) -> usize {
        self.indices.len()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// lite / full / heavy
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default = "default_detector_path")]
    pub detector_path: String,
    #[serde(default = "default_landmark_dir")]
    pub landmark_dir: String,
}

fn default_variant() -> String { "full".to_string() }
fn default_detector_path() -> String { "models/pose_detection.onnx".to_string() }
fn default_landmark_dir() -> String { "models".to_string() }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            detector_path: default_detector_path(),
            landmark_dir: default_landmark_dir(),
        }
    }
}

impl ModelConfig {
    pub fn landmark_path(&self) -> String {
        format!("{}/pose_landmark_{}_batched.onnx", self.landmark_dir, self.variant)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// スコアがこの値以上の候補を採用
    #[serde(default = "default_det_min_score")]
    pub min_score: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
}

fn default_det_min_score() -> f32 { 0.75 }
fn default_nms_threshold() -> f32 { 0.3 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self { min_score: default_det_min_score(), nms_threshold: default_nms_threshold() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LandmarkConfig {
    /// presenceスコアがこの値未満のカメラがあればラウンド破棄
    #[serde(default = "default_lm_min_score")]
    pub min_score: f32,
    #[serde(default = "default_refine_kernel_size")]
    pub refine_kernel_size: usize,
    #[serde(default = "default_refine_min_score")]
    pub refine_min_score: f32,
}

fn default_lm_min_score() -> f32 { 0.3 }
fn default_refine_kernel_size() -> usize { 7 }
fn default_refine_min_score() -> f32 { 0.5 }

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            min_score: default_lm_min_score(),
            refine_kernel_size: default_refine_kernel_size(),
            refine_min_score: default_refine_min_score(),
        }
    }
}

/// 平滑化フィルタの種類
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    OneEuro,
    Ema,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_filter_kind")]
    pub filter_2d: FilterKind,
    #[serde(default = "default_filter_kind")]
    pub filter_3d: FilterKind,
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    #[serde(default = "default_beta")]
    pub beta: f32,
    #[serde(default = "default_d_cutoff")]
    pub d_cutoff: f32,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,
}

fn default_filter_kind() -> FilterKind { FilterKind::OneEuro }
fn default_min_cutoff() -> f32 { 1.0 }
fn default_beta() -> f32 { 0.01 }
fn default_d_cutoff() -> f32 { 1.0 }
fn default_ema_alpha() -> f32 { 0.5 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filter_2d: default_filter_kind(),
            filter_3d: default_filter_kind(),
            min_cutoff: default_min_cutoff(),
            beta: default_beta(),
            d_cutoff: default_d_cutoff(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

/// 三角測量後の座標変換
#[derive(Debug, Deserialize, Clone)]
pub struct TransformConfig {
    #[serde(default = "default_scale_multiplier")]
    pub scale_multiplier: f32,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default)]
    pub flip_z: bool,
    #[serde(default)]
    pub swap_xz: bool,
}

fn default_scale_multiplier() -> f32 { 1.0 }

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            scale_multiplier: default_scale_multiplier(),
            flip_x: false,
            flip_y: false,
            flip_z: false,
            swap_xz: false,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// 読み込みに失敗したらデフォルト値を使う
    ///
    /// ログレベルが設定に依存するので、失敗理由はここでは出さずに返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e.context(format!("failed to load {}", path.display())))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.model.variant.as_str(), "lite" | "full" | "heavy") {
            bail!("Unknown model variant: {}", self.model.variant);
        }
        if self.camera.camera_count() < 2 {
            bail!("At least 2 cameras are required, got {}", self.camera.camera_count());
        }
        if self.camera.fps == 0 {
            bail!("fps must be positive");
        }
        let k = self.landmark.refine_kernel_size;
        if k == 0 || k % 2 == 0 {
            bail!("refine_kernel_size must be a positive odd number, got {}", k);
        }
        for (name, v) in [
            ("detection.min_score", self.detection.min_score),
            ("detection.nms_threshold", self.detection.nms_threshold),
            ("landmark.min_score", self.landmark.min_score),
            ("landmark.refine_min_score", self.landmark.refine_min_score),
            ("filter.ema_alpha", self.filter.ema_alpha),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("{} must be within [0, 1], got {}", name, v);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.output.addr(), "127.0.0.1:9000");
        assert_eq!(config.camera.fps, 50);
        assert_eq!(config.camera.frame_size(), (640, 480));
        assert_eq!(config.camera.camera_count(), 2);
        assert_eq!(config.detection.min_score, 0.75);
        assert_eq!(config.landmark.min_score, 0.3);
        assert_eq!(config.landmark.refine_kernel_size, 7);
        assert_eq!(config.filter.filter_2d, FilterKind::OneEuro);
        assert!(!config.transform.swap_xz);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sections() {
        let src = r#"
            debug = true

            [output]
            host = "192.168.1.20"

            [camera]
            resolution = 0
            undistort = false

            [model]
            variant = "heavy"

            [filter]
            filter_2d = "none"
            filter_3d = "ema"

            [transform]
            flip_x = true
            swap_xz = true
        "#;
        let config: Config = toml::from_str(src).unwrap();
        assert!(config.debug);
        assert_eq!(config.output.addr(), "192.168.1.20:9000");
        assert_eq!(config.camera.frame_size(), (320, 240));
        assert!(!config.camera.undistort);
        assert_eq!(config.model.landmark_path(), "models/pose_landmark_heavy_batched.onnx");
        assert_eq!(config.filter.filter_2d, FilterKind::None);
        assert_eq!(config.filter.filter_3d, FilterKind::Ema);
        assert!(config.transform.flip_x);
        assert!(config.transform.swap_xz);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.model.variant = "huge".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.landmark.refine_kernel_size = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.camera.indices = vec![0];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let (config, error) = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.camera.fps, 50);
        assert!(error.unwrap().to_string().contains("does/not/exist.toml"));
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let path = std::env::temp_dir().join(format!("stereo_pose_config_{}.toml", std::process::id()));
        fs::write(&path, "debug = true\n[camera]\nfps = 30\n").unwrap();
        let (config, error) = Config::load_or_default(&path);
        fs::remove_file(&path).ok();
        assert!(error.is_none());
        assert!(config.debug);
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.camera.indices, vec![0, 1]);
    }
}
