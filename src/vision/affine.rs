use nalgebra::{Matrix2, Matrix2x3, Matrix3, Vector2};

use crate::tracking::TrackedRegion;

/// 2D アフィン変換 `[A | t]`（2x3）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2 {
    m: Matrix2x3<f64>,
}

impl Affine2 {
    pub fn identity() -> Self {
        Self { m: Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0) }
    }

    pub fn from_matrix(m: Matrix2x3<f64>) -> Self {
        Self { m }
    }

    pub fn matrix(&self) -> &Matrix2x3<f64> {
        &self.m
    }

    /// 3組の対応点から変換を求める（getAffineTransform 相当）
    ///
    /// src の3点が同一直線上にある場合は None
    pub fn from_point_pairs(src: [[f64; 2]; 3], dst: [[f64; 2]; 3]) -> Option<Self> {
        let s = Matrix3::new(
            src[0][0], src[1][0], src[2][0],
            src[0][1], src[1][1], src[2][1],
            1.0, 1.0, 1.0,
        );
        let d = Matrix2x3::new(
            dst[0][0], dst[1][0], dst[2][0],
            dst[0][1], dst[1][1], dst[2][1],
        );
        let s_inv = s.try_inverse()?;
        Some(Self { m: d * s_inv })
    }

    pub fn inverse(&self) -> Option<Self> {
        let a = Matrix2::new(self.m[(0, 0)], self.m[(0, 1)], self.m[(1, 0)], self.m[(1, 1)]);
        let t = Vector2::new(self.m[(0, 2)], self.m[(1, 2)]);
        let a_inv = a.try_inverse()?;
        let t_inv = -(a_inv * t);
        Some(Self {
            m: Matrix2x3::new(
                a_inv[(0, 0)], a_inv[(0, 1)], t_inv[0],
                a_inv[(1, 0)], a_inv[(1, 1)], t_inv[1],
            ),
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[(0, 0)] * x + self.m[(0, 1)] * y + self.m[(0, 2)],
            self.m[(1, 0)] * x + self.m[(1, 1)] * y + self.m[(1, 2)],
        )
    }
}

/// ROI の3隅（左上・左下・右上）を `size`x`size` のクロップ画像の隅に写す変換
///
/// 戻り値は画像 → クロップ方向。退化したROIなら None
pub fn roi_transform(region: &TrackedRegion, size: usize) -> Option<Affine2> {
    if region.is_degenerate() || size < 2 {
        return None;
    }
    let half = region.scale as f64 / 2.0;
    let (sin, cos) = (region.rotation as f64).sin_cos();
    let cx = region.center_x as f64;
    let cy = region.center_y as f64;

    let corner = |lx: f64, ly: f64| {
        let x = lx * half;
        let y = ly * half;
        [cos * x - sin * y + cx, sin * x + cos * y + cy]
    };
    let src = [corner(-1.0, -1.0), corner(-1.0, 1.0), corner(1.0, -1.0)];

    let r = (size - 1) as f64;
    let dst = [[0.0, 0.0], [0.0, r], [r, 0.0]];
    Affine2::from_point_pairs(src, dst)
}
