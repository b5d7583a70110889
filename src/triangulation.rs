use nalgebra::{DMatrix, Matrix3, Matrix3x4, Vector3, Vector4};

use crate::config::TransformConfig;

/// キャリブレーション単位（cm）→ 出力単位（m）
pub const UNIT_SCALE: f64 = 0.01;

/// カメラパラメータ（射影行列 P = K[R|t]）
///
/// 起動時に一度だけ構築し、以後は読み取り専用
#[derive(Debug, Clone)]
pub struct CameraParams {
    pub projection: Matrix3x4<f64>,
    /// 内部パラメータ行列
    intrinsic: Matrix3<f64>,
    /// 歪み係数 [k1, k2, p1, p2, k3]
    dist_coeffs: [f64; 5],
}

impl CameraParams {
    /// K, R, t から射影行列を構築
    pub fn new(
        intrinsic: Matrix3<f64>,
        rotation: Matrix3<f64>,
        translation: Vector3<f64>,
        dist_coeffs: [f64; 5],
    ) -> Self {
        // P = K * [R | t]
        let mut rt = Matrix3x4::zeros();
        rt.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        rt.set_column(3, &translation);

        Self {
            projection: intrinsic * rt,
            intrinsic,
            dist_coeffs,
        }
    }

    /// キャリブレーション結果から射影行列を構築
    ///
    /// - intrinsic: 内部パラメータ行列 K (row-major 3x3)
    /// - rvec: 回転ベクトル (Rodrigues)
    /// - tvec: 並進ベクトル
    pub fn from_calibration(
        intrinsic: &[f64; 9],
        dist_coeffs: &[f64; 5],
        rvec: &[f64; 3],
        tvec: &[f64; 3],
    ) -> Self {
        // K行列 (row-major → nalgebra column-major)
        let k = Matrix3::from_row_slice(intrinsic);
        let r = rodrigues(rvec);
        let t = Vector3::new(tvec[0], tvec[1], tvec[2]);
        Self::new(k, r, t, *dist_coeffs)
    }

    pub fn intrinsic(&self) -> &Matrix3<f64> {
        &self.intrinsic
    }

    pub fn dist_coeffs(&self) -> &[f64; 5] {
        &self.dist_coeffs
    }

    /// 歪んだピクセル座標を歪み補正して理想ピクセル座標に変換
    /// Newton-Raphson法による歪み補正（大きな歪み係数でも収束）
    /// 理想ピクセル座標 → 歪みありピクセル座標（順方向モデル）
    pub fn distort_point(&self, u: f64, v: f64) -> (f64, f64) {
        let fx = self.intrinsic[(0, 0)];
        let fy = self.intrinsic[(1, 1)];
        let cx = self.intrinsic[(0, 2)];
        let cy = self.intrinsic[(1, 2)];
        let [k1, k2, p1, p2, k3] = self.dist_coeffs;

        let x = (u - cx) / fx;
        let y = (v - cy) / fy;
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd * fx + cx, yd * fy + cy)
    }

    pub fn undistort_point(&self, u_dist: f64, v_dist: f64) -> (f64, f64) {
        let fx = self.intrinsic[(0, 0)];
        let fy = self.intrinsic[(1, 1)];
        let cx = self.intrinsic[(0, 2)];
        let cy = self.intrinsic[(1, 2)];
        let [k1, k2, p1, p2, k3] = self.dist_coeffs;

        if self.dist_coeffs.iter().all(|&c| c == 0.0) {
            return (u_dist, v_dist);
        }

        // ピクセル→正規化カメラ座標（歪みあり = ターゲット）
        let xd = (u_dist - cx) / fx;
        let yd = (v_dist - cy) / fy;

        // f_x(x,y) = x*R + 2*p1*x*y + p2*(r2 + 2*x^2)
        // f_y(x,y) = y*R + p1*(r2 + 2*y^2) + 2*p2*x*y
        // R = 1 + k1*r2 + k2*r4 + k3*r6
        let mut x = xd;
        let mut y = yd;
        let mut best = (x, y);
        let mut best_residual = f64::MAX;

        for _ in 0..30 {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let r6 = r4 * r2;
            let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6;
            let dr_dr2 = k1 + 2.0 * k2 * r2 + 3.0 * k3 * r4;

            let fx_val = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x) - xd;
            let fy_val = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y - yd;

            let residual = fx_val * fx_val + fy_val * fy_val;
            if residual < best_residual {
                best_residual = residual;
                best = (x, y);
            }
            if residual < 1e-20 {
                break;
            }

            // ヤコビアン（対称）
            let j00 = radial + 2.0 * x * x * dr_dr2 + 2.0 * p1 * y + 6.0 * p2 * x;
            let j01 = 2.0 * x * y * dr_dr2 + 2.0 * p1 * x + 2.0 * p2 * y;
            let j11 = radial + 2.0 * y * y * dr_dr2 + 6.0 * p1 * y + 2.0 * p2 * x;

            let det = j00 * j11 - j01 * j01;
            if det.abs() < 1e-12 {
                break;
            }

            x -= (j11 * fx_val - j01 * fy_val) / det;
            y -= (-j01 * fx_val + j00 * fy_val) / det;
        }

        (best.0 * fx + cx, best.1 * fy + cy)
    }

    /// 3D点をこのカメラの画像平面に投影
    pub fn project(&self, point: &Vector3<f64>) -> Option<(f64, f64)> {
        let p = self.projection * Vector4::new(point.x, point.y, point.z, 1.0);
        if p[2].abs() < 1e-12 {
            return None;
        }
        Some((p[0] / p[2], p[1] / p[2]))
    }
}

/// Rodrigues → 回転行列
fn rodrigues(rvec: &[f64; 3]) -> Matrix3<f64> {
    let theta = (rvec[0] * rvec[0] + rvec[1] * rvec[1] + rvec[2] * rvec[2]).sqrt();
    if theta < 1e-10 {
        return Matrix3::identity();
    }
    let (kx, ky, kz) = (rvec[0] / theta, rvec[1] / theta, rvec[2] / theta);
    let ct = theta.cos();
    let st = theta.sin();
    let vt = 1.0 - ct;

    Matrix3::new(
        ct + kx * kx * vt,      kx * ky * vt - kz * st, kx * kz * vt + ky * st,
        ky * kx * vt + kz * st, ct + ky * ky * vt,      ky * kz * vt - kx * st,
        kz * kx * vt - ky * st, kz * ky * vt + kx * st, ct + kz * kz * vt,
    )
}

/// 単一3D点の線形三角測量 (DLT)
///
/// 各カメラについて x × (P · X) = 0 の形で2行追加し、SVDの最小特異値に
/// 対応する右特異ベクトルを解とする。同次座標 w ≈ 0（無限遠）なら None
pub fn triangulate_point(cameras: &[&CameraParams], points_2d: &[(f64, f64)]) -> Option<Vector3<f64>> {
    let n = cameras.len();
    if n < 2 || points_2d.len() != n {
        return None;
    }

    // A行列: 2N × 4
    let mut a = DMatrix::<f64>::zeros(2 * n, 4);
    for (i, (cam, &(u, v))) in cameras.iter().zip(points_2d).enumerate() {
        let p = &cam.projection;
        for j in 0..4 {
            // row1: u * P[2] - P[0]
            // row2: v * P[2] - P[1]
            a[(2 * i, j)] = u * p[(2, j)] - p[(0, j)];
            a[(2 * i + 1, j)] = v * p[(2, j)] - p[(1, j)];
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;

    let x = v_t.row(min_idx);
    let w = x[3];
    if w.abs() < 1e-15 {
        return None;
    }
    Some(Vector3::new(x[0] / w, x[1] / w, x[2] / w))
}

/// 三角測量結果を出力座標系に変換
///
/// 適用順は固定: スケール → flip_x → flip_y → flip_z → swap_xz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisTransform {
    pub scale: f64,
    pub flip_x: bool,
    pub flip_y: bool,
    pub flip_z: bool,
    pub swap_xz: bool,
}

impl AxisTransform {
    pub fn identity() -> Self {
        Self { scale: 1.0, flip_x: false, flip_y: false, flip_z: false, swap_xz: false }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self {
            scale: UNIT_SCALE * config.scale_multiplier as f64,
            flip_x: config.flip_x,
            flip_y: config.flip_y,
            flip_z: config.flip_z,
            swap_xz: config.swap_xz,
        }
    }

    pub fn apply(&self, point: &Vector3<f64>) -> [f32; 3] {
        let mut p = point * self.scale;
        if self.flip_x {
            p.x = -p.x;
        }
        if self.flip_y {
            p.y = -p.y;
        }
        if self.flip_z {
            p.z = -p.z;
        }
        if self.swap_xz {
            p.swap_rows(0, 2);
        }
        [p.x as f32, p.y as f32, p.z as f32]
    }
}
