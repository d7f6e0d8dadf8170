//! 可分离一维卷积引擎.
//!
//! 沿单轴对每条 lane 做一维相关 (correlation), 锚点取 `(len - 1) / 2`,
//! 边界按 clamp (最近值延拓) 处理, 累加以 `f64` 进行.
//! 对称核下相关与卷积一致; 小波等非对称核统一按相关语义对齐.

use ndarray::{Array3, ArrayView, ArrayView1, ArrayViewMut1, Axis, Ix3, Zip};

/// 沿 `axis` 对全部 lane 实施一维核 `kernel`, 返回新数组.
pub(crate) fn convolve_axis(data: &ArrayView<f32, Ix3>, kernel: &[f64], axis: Axis) -> Array3<f32> {
    debug_assert!(!kernel.is_empty());
    let mut out = Array3::zeros(data.dim());

    let zip = Zip::from(out.lanes_mut(axis)).and(data.lanes(axis));
    #[cfg(feature = "rayon")]
    zip.par_for_each(|dst, src| convolve_lane(src, dst, kernel));
    #[cfg(not(feature = "rayon"))]
    zip.for_each(|dst, src| convolve_lane(src, dst, kernel));
    out
}

/// 依次沿 z, h, w 三轴实施对应核.
pub(crate) fn convolve_sep3(data: &ArrayView<f32, Ix3>, kernels: [&[f64]; 3]) -> Array3<f32> {
    let mut cur = convolve_axis(data, kernels[0], Axis(0));
    cur = convolve_axis(&cur.view(), kernels[1], Axis(1));
    convolve_axis(&cur.view(), kernels[2], Axis(2))
}

fn convolve_lane(src: ArrayView1<f32>, mut dst: ArrayViewMut1<f32>, kernel: &[f64]) {
    let n = src.len() as i64;
    debug_assert!(n >= 1);
    let anchor = (kernel.len() as i64 - 1) / 2;
    for i in 0..n {
        let mut acc = 0.0f64;
        for (j, k) in kernel.iter().enumerate() {
            let p = (i + j as i64 - anchor).clamp(0, n - 1);
            acc += k * src[p as usize] as f64;
        }
        dst[i as usize] = acc as f32;
    }
}
