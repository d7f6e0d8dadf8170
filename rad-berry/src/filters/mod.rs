//! 空间滤波器组.
//!
//! 滤波器作用于整幅 (重采样后的) 强度体, 输出同网格的派生体;
//! 派生体随后按与原始体相同的路径做再分割/离散化与特征计算,
//! 特征键统一附加滤波器 tag 以避免同名.
//!
//! 所有滤波均为相关 (correlation) 语义, 边界 clamp, `f64` 累加:
//!
//! - 均值盒: 三轴可分离的 `1/k` 核;
//! - LoG: 三个可分离通道之和, 每个通道在一个轴上取高斯二阶导 (体素索引
//!   单位), 其余两轴取高斯; 各轴 sigma 先由毫米换算为体素;
//! - 平稳小波: 先级联 `1..level-1` 级低通, 再按子带串在目标级取各轴
//!   低/高通 (a trous 零插值), 不做下采样;
//! - Gabor: 逐水平切片的 2D 实值核.

pub(crate) mod kernels;
pub(crate) mod separable;

use ndarray::{Array2, Array3, ArrayView, ArrayViewMut, Axis, Ix2};

use crate::data::{GridAttr, Volume};
use crate::params::{Band, FilterSpec, WaveletKind};

use kernels::{box_1d, gabor_2d, gaussian_d2_with_radius, gaussian_radius, gaussian_with_radius};
use kernels::{a_trous, wavelet_hi, wavelet_lo};
use separable::convolve_sep3;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::parallel::prelude::*;
    }
}

/// 对强度体实施单个滤波器, 返回同网格的派生体.
///
/// `spec` 参数非法时程序 panic (契约见 [`FilterSpec::is_valid`]).
pub fn apply(volume: &Volume, spec: &FilterSpec) -> Volume {
    assert!(spec.is_valid(), "滤波器参数非法: {spec:?}");
    let data = match spec {
        FilterSpec::Mean { support } => {
            let k = box_1d(*support);
            convolve_sep3(&volume.data(), [&k, &k, &k])
        }
        FilterSpec::Log { sigma_mm, cutoff } => log_of(volume, *sigma_mm, *cutoff),
        FilterSpec::Wavelet {
            kind,
            level,
            subband,
        } => swt_subband_of(volume, *kind, *level, subband),
        FilterSpec::Gabor {
            sigma_mm,
            lambda_mm,
            gamma,
            theta_deg,
        } => gabor_of(volume, *sigma_mm, *lambda_mm, *gamma, *theta_deg),
    };
    Volume::new(*volume.grid(), data)
}

/// LoG: 沿三个轴分别取二阶导通道后求和.
fn log_of(volume: &Volume, sigma_mm: f64, cutoff: f64) -> Array3<f32> {
    let spacing = GridAttr::spacing(volume);
    let src = volume.data();

    let mut acc: Option<Array3<f32>> = None;
    for d2_axis in 0..3 {
        let mut ks: [Vec<f64>; 3] = Default::default();
        for (a, k) in ks.iter_mut().enumerate() {
            let sigma = sigma_mm / spacing[a];
            let radius = gaussian_radius(sigma, cutoff);
            *k = if a == d2_axis {
                gaussian_d2_with_radius(sigma, radius)
            } else {
                gaussian_with_radius(sigma, radius)
            };
        }
        let part = convolve_sep3(&src, [&ks[0], &ks[1], &ks[2]]);
        acc = Some(match acc {
            None => part,
            Some(prev) => prev + &part,
        });
    }
    acc.expect("三个轴向通道必然存在")
}

/// 平稳小波变换的单个子带 (非抽取, a trous).
fn swt_subband_of(
    volume: &Volume,
    kind: WaveletKind,
    level: u8,
    subband: &[Band; 3],
) -> Array3<f32> {
    let lo = wavelet_lo(kind);
    let hi = wavelet_hi(kind);

    // 级联 1..level-1 级的三轴低通, 得到上一级逼近系数.
    let mut cur = volume.data().to_owned();
    for lvl in 1..level {
        let k = a_trous(&lo, lvl);
        cur = convolve_sep3(&cur.view(), [&k, &k, &k]);
    }

    let pick = |b: Band| -> Vec<f64> {
        let base = match b {
            Band::Low => &lo,
            Band::High => &hi,
        };
        a_trous(base, level)
    };
    let (kz, kh, kw) = (pick(subband[0]), pick(subband[1]), pick(subband[2]));
    convolve_sep3(&cur.view(), [&kz, &kh, &kw])
}

/// 逐切片 2D Gabor.
fn gabor_of(volume: &Volume, sigma_mm: f64, lambda_mm: f64, gamma: f64, theta_deg: f64) -> Array3<f32> {
    let [_, sh, sw] = GridAttr::spacing(volume);
    let kernel = gabor_2d((sh, sw), sigma_mm, lambda_mm, gamma, theta_deg.to_radians());

    let src = volume.data();
    let mut out = Array3::zeros(volume.shape());

    #[cfg(feature = "rayon")]
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(z, slab)| gabor_slice(&src.index_axis(Axis(0), z), slab, &kernel));

    #[cfg(not(feature = "rayon"))]
    for (z, slab) in out.axis_iter_mut(Axis(0)).enumerate() {
        gabor_slice(&src.index_axis(Axis(0), z), slab, &kernel);
    }

    out
}

fn gabor_slice(
    src: &ArrayView<f32, Ix2>,
    mut dst: ArrayViewMut<f32, Ix2>,
    kernel: &Array2<f64>,
) {
    let (nh, nw) = src.dim();
    let (kh, kw) = kernel.dim();
    let (rh, rw) = ((kh as i64 - 1) / 2, (kw as i64 - 1) / 2);
    for i in 0..nh as i64 {
        for j in 0..nw as i64 {
            let mut acc = 0.0f64;
            for a in 0..kh as i64 {
                let y = (i + a - rh).clamp(0, nh as i64 - 1) as usize;
                for b in 0..kw as i64 {
                    let x = (j + b - rw).clamp(0, nw as i64 - 1) as usize;
                    acc += kernel[(a as usize, b as usize)] * src[(y, x)] as f64;
                }
            }
            dst[(i as usize, j as usize)] = acc as f32;
        }
    }
}
