//! TriangulationStage: 2D ランドマーク → 3D 点群

use super::round::LandmarkRound;
use crate::config::{FilterConfig, FilterKind};
use crate::filter::FilterBank;
use crate::output::Pose3D;
use crate::pose::LandmarkIndex;
use crate::triangulation::{triangulate_point, AxisTransform, CameraParams};

pub struct Triangulator {
    cameras: Vec<CameraParams>,
    /// フレームを歪み補正していない場合、2D 点側で補正する
    undistort_points: bool,
    transform: AxisTransform,
    filters: FilterBank,
    /// 三角測量できなかった関節は前回値を出す
    last: [[f32; 3]; LandmarkIndex::COUNT],
}

impl Triangulator {
    pub fn new(
        cameras: Vec<CameraParams>,
        undistort_points: bool,
        transform: AxisTransform,
        filter_kind: FilterKind,
        filter_config: &FilterConfig,
        fps: u32,
    ) -> Self {
        Self {
            cameras,
            undistort_points,
            transform,
            filters: FilterBank::new(filter_kind, LandmarkIndex::COUNT, 3, filter_config, fps),
            last: [[0.0; 3]; LandmarkIndex::COUNT],
        }
    }

    pub fn process(&mut self, round: &LandmarkRound) -> Pose3D {
        let cameras: Vec<&CameraParams> = self.cameras.iter().collect();
        let t = round.round.timestamp_ms;
        let mut points = self.last;

        for (joint, out) in points.iter_mut().enumerate() {
            let observations: Vec<(f64, f64)> = round
                .landmarks
                .iter()
                .zip(&self.cameras)
                .map(|(lms, cam)| {
                    let (u, v) = (lms[joint].x as f64, lms[joint].y as f64);
                    if self.undistort_points {
                        cam.undistort_point(u, v)
                    } else {
                        (u, v)
                    }
                })
                .collect();

            let Some(point) = triangulate_point(&cameras, &observations) else {
                continue;
            };
            if !point.iter().all(|c| c.is_finite()) {
                continue;
            }

            let mut p = self.transform.apply(&point);
            self.filters.filter(joint, &mut p, t);
            *out = p;
        }

        self.last = points;
        Pose3D {
            round: round.round.index,
            timestamp_ms: t,
            points,
        }
    }
}
