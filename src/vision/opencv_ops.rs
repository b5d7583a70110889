use anyhow::{bail, Context, Result};
use ndarray::Array3;
use opencv::{
    calib3d,
    core::{self, Mat, Scalar, Size, CV_8U, CV_8UC1, CV_8UC3, CV_8UC4},
    imgproc,
    prelude::*,
};

use super::{Affine2, Image, VisionOps};
use crate::triangulation::CameraParams;

/// OpenCV による `VisionOps` 実装
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvVision;

/// HWC 配列 → Mat（コピー）
pub fn image_to_mat(image: &Image) -> Result<Mat> {
    let (h, w, c) = image.dim();
    let typ = match c {
        1 => CV_8UC1,
        3 => CV_8UC3,
        4 => CV_8UC4,
        _ => bail!("unsupported channel count: {}", c),
    };
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, typ, Scalar::all(0.0))?;
    let standard = image.as_standard_layout();
    let src = standard.as_slice().context("image is not contiguous")?;
    mat.data_bytes_mut()?.copy_from_slice(src);
    Ok(mat)
}

/// 8bit Mat → HWC 配列（コピー）
pub fn mat_to_image(mat: &Mat) -> Result<Image> {
    if mat.depth() != CV_8U {
        bail!("expected an 8-bit image, got depth {}", mat.depth());
    }
    let continuous;
    let mat = if mat.is_continuous() {
        mat
    } else {
        continuous = mat.try_clone()?;
        &continuous
    };
    let (h, w, c) = (mat.rows() as usize, mat.cols() as usize, mat.channels() as usize);
    Array3::from_shape_vec((h, w, c), mat.data_bytes()?.to_vec()).context("Mat has unexpected layout")
}

impl VisionOps for OpenCvVision {
    fn undistort(&self, image: &Image, camera: &CameraParams) -> Result<Image> {
        let k = camera.intrinsic();
        let k = Mat::from_slice_2d(&[
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ])?;
        let dist = Mat::from_slice_2d(&[*camera.dist_coeffs()])?;

        let src = image_to_mat(image)?;
        let mut dst = Mat::default();
        calib3d::undistort_def(&src, &mut dst, &k, &dist).context("undistort failed")?;
        mat_to_image(&dst)
    }

    fn resize(&self, image: &Image, width: usize, height: usize) -> Result<Image> {
        let src = image_to_mat(image)?;
        let mut dst = Mat::default();
        imgproc::resize(
            &src,
            &mut dst,
            Size::new(width as i32, height as i32),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;
        mat_to_image(&dst)
    }

    fn warp_affine(&self, image: &Image, transform: &Affine2, width: usize, height: usize) -> Result<Image> {
        let m = transform.matrix();
        let m = Mat::from_slice_2d(&[
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
        ])?;

        let src = image_to_mat(image)?;
        let mut dst = Mat::default();
        imgproc::warp_affine(
            &src,
            &mut dst,
            &m,
            Size::new(width as i32, height as i32),
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            Scalar::default(),
        )?;
        mat_to_image(&dst)
    }
}
