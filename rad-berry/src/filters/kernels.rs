//! 一维/二维滤波核的构造.
//!
//! 所有核均以 `f64` 给出. 尺度类参数在调用方先换算成体素单位.

use ndarray::Array2;

use crate::params::WaveletKind;

/// 给定尺度与截断倍数, 求高斯核半径 (体素数), 至少为 1.
#[inline]
pub(crate) fn gaussian_radius(sigma: f64, cutoff: f64) -> usize {
    debug_assert!(sigma > 0.0 && cutoff > 0.0);
    (sigma * cutoff).ceil().max(1.0) as usize
}

/// 归一化高斯核, 半径取 `ceil(4 * sigma)`.
pub(crate) fn gaussian_1d(sigma: f64) -> Vec<f64> {
    gaussian_with_radius(sigma, gaussian_radius(sigma, 4.0))
}

/// 给定半径的归一化高斯核, 长度 `2r + 1`, 权重和为 1.
pub(crate) fn gaussian_with_radius(sigma: f64, radius: usize) -> Vec<f64> {
    debug_assert!(sigma > 0.0);
    let mut k: Vec<f64> = (-(radius as i64)..=radius as i64)
        .map(|x| {
            let t = x as f64 / sigma;
            (-0.5 * t * t).exp()
        })
        .collect();
    let sum: f64 = k.iter().sum();
    k.iter_mut().for_each(|v| *v /= sum);
    k
}

/// 给定半径的高斯二阶导核 (LoG 的单轴分量), 长度 `2r + 1`.
///
/// 离散采样后强制零和 (逐点减去均值), 保证常数场的响应严格为 0.
pub(crate) fn gaussian_d2_with_radius(sigma: f64, radius: usize) -> Vec<f64> {
    debug_assert!(sigma > 0.0);
    let s2 = sigma * sigma;
    let norm = 1.0 / (sigma * (2.0 * std::f64::consts::PI).sqrt());
    let mut k: Vec<f64> = (-(radius as i64)..=radius as i64)
        .map(|x| {
            let x = x as f64;
            let g = norm * (-0.5 * x * x / s2).exp();
            g * (x * x - s2) / (s2 * s2)
        })
        .collect();
    let mean: f64 = k.iter().sum::<f64>() / k.len() as f64;
    k.iter_mut().for_each(|v| *v -= mean);
    k
}

/// 均值盒核, 长度 `support`, 权重和为 1.
pub(crate) fn box_1d(support: usize) -> Vec<f64> {
    debug_assert!(support >= 1 && support % 2 == 1);
    vec![1.0 / support as f64; support]
}

/// 小波分解低通核.
pub(crate) fn wavelet_lo(kind: WaveletKind) -> Vec<f64> {
    match kind {
        WaveletKind::Haar => {
            let s = std::f64::consts::FRAC_1_SQRT_2;
            vec![s, s]
        }
        WaveletKind::Db2 => {
            // h = [1+sqrt3, 3+sqrt3, 3-sqrt3, 1-sqrt3] / (4*sqrt2); 分解核取其反序.
            let r3 = 3f64.sqrt();
            let d = 4.0 * 2f64.sqrt();
            vec![(1.0 - r3) / d, (3.0 - r3) / d, (3.0 + r3) / d, (1.0 + r3) / d]
        }
    }
}

/// 小波分解高通核, 由低通核经 QMF 关系导出:
/// `hi[k] = (-1)^(k+1) * lo[L-1-k]`.
pub(crate) fn wavelet_hi(kind: WaveletKind) -> Vec<f64> {
    let lo = wavelet_lo(kind);
    let n = lo.len();
    (0..n)
        .map(|k| {
            let sign = if k % 2 == 0 { -1.0 } else { 1.0 };
            sign * lo[n - 1 - k]
        })
        .collect()
}

/// a trous 零插值: 第 `level` 级在相邻脚位之间插入 `2^(level-1) - 1` 个零.
pub(crate) fn a_trous(kernel: &[f64], level: u8) -> Vec<f64> {
    assert!(level >= 1);
    let gap = (1usize << (level - 1)) - 1;
    if gap == 0 {
        return kernel.to_vec();
    }
    let mut out = Vec::with_capacity(kernel.len() + (kernel.len() - 1) * gap);
    for (i, k) in kernel.iter().enumerate() {
        if i > 0 {
            out.extend(std::iter::repeat(0.0).take(gap));
        }
        out.push(*k);
    }
    out
}

/// 实值 2D Gabor 核, 作用于 `(h, w)` 平面.
///
/// `spacing_hw` 为切片内像素间距 (毫米); `sigma` / `lambda` 以毫米计,
/// `theta` 以弧度计 (相对 w 轴). 核半径取 `4 * sigma * max(1, 1/gamma)` 毫米.
pub(crate) fn gabor_2d(
    spacing_hw: (f64, f64),
    sigma: f64,
    lambda: f64,
    gamma: f64,
    theta: f64,
) -> Array2<f64> {
    debug_assert!(sigma > 0.0 && lambda > 0.0 && gamma > 0.0);
    let (sh, sw) = spacing_hw;
    let r_mm = 4.0 * sigma * gamma.recip().max(1.0);
    let rh = (r_mm / sh).ceil().max(1.0) as i64;
    let rw = (r_mm / sw).ceil().max(1.0) as i64;

    let (sin_t, cos_t) = theta.sin_cos();
    let two_pi = 2.0 * std::f64::consts::PI;

    Array2::from_shape_fn(
        ((2 * rh + 1) as usize, (2 * rw + 1) as usize),
        |(i, j)| {
            let y = (i as i64 - rh) as f64 * sh;
            let x = (j as i64 - rw) as f64 * sw;
            let xr = x * cos_t + y * sin_t;
            let yr = -x * sin_t + y * cos_t;
            let env = -(xr * xr + gamma * gamma * yr * yr) / (2.0 * sigma * sigma);
            env.exp() * (two_pi * xr / lambda).cos()
        },
    )
}
