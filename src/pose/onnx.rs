use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, Array3, ArrayViewD, Axis, Ix1, Ix3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::detection::RAW_BOX_LEN;
use super::model::{DetectionModel, LandmarkModel, LandmarkOutput, RawDetections};

const INPUT_NAME: &str = "input_1";
const DETECTOR_BOXES: &str = "Identity";
const DETECTOR_SCORES: &str = "Identity_1";
const LANDMARKS: &str = "Identity";
const PRESENCE: &str = "Identity_1";
const HEATMAP: &str = "Identity_3";

fn load_session(model_path: &Path) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model: {}", model_path.display()))
}

/// BlazePose 姿勢検出モデル
pub struct OnnxDetector {
    session: Session,
}

impl OnnxDetector {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self { session: load_session(model_path.as_ref())? })
    }
}

impl DetectionModel for OnnxDetector {
    fn detect(&mut self, input: &Array3<f32>) -> Result<RawDetections> {
        let input_tensor = Tensor::from_array(input.clone().insert_axis(Axis(0)))?;
        let outputs = self
            .session
            .run(ort::inputs![INPUT_NAME => input_tensor])
            .context("Detector inference failed")?;

        // [1, anchors, 12] と [1, anchors, 1]
        let boxes: ArrayViewD<f32> = outputs[DETECTOR_BOXES]
            .try_extract_array()
            .context("Failed to extract detector boxes")?;
        let scores: ArrayViewD<f32> = outputs[DETECTOR_SCORES]
            .try_extract_array()
            .context("Failed to extract detector scores")?;

        let anchors = boxes.len() / RAW_BOX_LEN;
        let boxes = Array2::from_shape_vec((anchors, RAW_BOX_LEN), boxes.iter().copied().collect())
            .context("Unexpected detector box shape")?;
        let scores: Array1<f32> = scores.iter().copied().collect();

        Ok(RawDetections { boxes, scores })
    }
}

/// BlazePose ランドマークモデル（バッチ入力版）
pub struct OnnxLandmarker {
    session: Session,
}

impl OnnxLandmarker {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self { session: load_session(model_path.as_ref())? })
    }
}

impl LandmarkModel for OnnxLandmarker {
    fn infer(&mut self, crops: &[Array3<f32>]) -> Result<Vec<LandmarkOutput>> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }
        let views: Vec<_> = crops.iter().map(|c| c.view()).collect();
        let batch = ndarray::stack(Axis(0), &views).context("Crops differ in shape")?;

        let input_tensor = Tensor::from_array(batch)?;
        let outputs = self
            .session
            .run(ort::inputs![INPUT_NAME => input_tensor])
            .context("Landmark inference failed")?;

        let landmarks: ArrayViewD<f32> = outputs[LANDMARKS]
            .try_extract_array()
            .context("Failed to extract landmarks")?;
        let presence: ArrayViewD<f32> = outputs[PRESENCE]
            .try_extract_array()
            .context("Failed to extract presence")?;
        let heatmap: ArrayViewD<f32> = outputs[HEATMAP]
            .try_extract_array()
            .context("Failed to extract heatmap")?;

        let n = crops.len();
        if landmarks.shape().first() != Some(&n)
            || heatmap.shape().first() != Some(&n)
            || presence.len() != n
        {
            bail!(
                "landmark outputs do not match batch size {}: {:?} {:?} {:?}",
                n,
                landmarks.shape(),
                presence.shape(),
                heatmap.shape()
            );
        }

        let mut results = Vec::with_capacity(n);
        for (i, &presence) in presence.iter().enumerate() {
            let landmarks = landmarks
                .index_axis(Axis(0), i)
                .to_owned()
                .into_dimensionality::<Ix1>()
                .context("Unexpected landmark shape")?;
            let heatmap = heatmap
                .index_axis(Axis(0), i)
                .to_owned()
                .into_dimensionality::<Ix3>()
                .context("Unexpected heatmap shape")?;
            results.push(LandmarkOutput { landmarks, presence, heatmap });
        }
        Ok(results)
    }
}
