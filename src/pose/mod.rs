pub mod detection;
pub mod keypoint;
pub mod landmark;
pub mod model;
#[cfg(feature = "desktop")]
pub mod onnx;
pub mod preprocess;

pub use detection::{decode_detections, generate_anchors, weighted_nms, Anchor, Detection};
pub use keypoint::{Landmark, LandmarkIndex, Landmarks};
pub use landmark::{decode_landmarks, landmarks_to_region, project_to_image, refine_from_heatmap};
pub use model::{DetectionModel, LandmarkModel, LandmarkOutput, RawDetections};
#[cfg(feature = "desktop")]
pub use onnx::{OnnxDetector, OnnxLandmarker};
pub use preprocess::{
    extract_roi, letterbox, AlignedCrop, LetterboxInfo, DETECTOR_INPUT_SIZE, LANDMARK_INPUT_SIZE,
};

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
