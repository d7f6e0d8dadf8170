//! 网格中心对齐的体数据重采样.
//!
//! 输出网格与输入网格共享同一个几何中心, 输出维度取
//! `ceil(n_in * s_in / s_out)`. 对每个输出体素, 先求其在输入索引系中的
//! 连续坐标, 再按插值核做加权聚合; 核权重逐点归一化, 常数场在任何
//! 插值方式下都严格保持常数.
//!
//! 下采样 (目标间距更粗) 时, 强度体先经过一次高斯抗混叠预滤波,
//! 每轴 `sigma = (s_out / s_in - 1) / 2` (输入体素单位); 上采样与 mask
//! 均不做预滤波. mask 的重采样始终保持二值: 最近邻直接取值,
//! 其余插值方式按线性插值后以 0.5 为阈值.

use ndarray::{Array3, ArrayView, Axis, Ix3};

use crate::consts::mask::{BACKGROUND, IN_REGION};
use crate::data::{check_pair, GeometryError, GridAttr, RoiMask, VoxelGrid, Volume};
use crate::filters::kernels::gaussian_1d;
use crate::filters::separable::convolve_axis;
use crate::params::{Interpolation, ParameterSet};
use crate::Idx3d;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use ndarray::parallel::prelude::*;
    }
}

/// 按 `params` 对 (强度体, mask) 数据对做一致的重采样.
///
/// `params.resample_spacing` 为 `None` 时原样返回数据副本.
/// 输入对的形状或间距不一致, 或目标间距非法时返回 `Err`.
pub fn resample_pair(
    volume: &Volume,
    mask: &RoiMask,
    params: &ParameterSet,
) -> Result<(Volume, RoiMask), GeometryError> {
    check_pair(volume, mask)?;
    match params.resample_spacing {
        None => Ok((volume.clone(), mask.clone())),
        Some(target) => {
            let v = resample_volume(volume, target, params.interpolation)?;
            let m = resample_mask(mask, target, params.interpolation)?;
            debug_assert_eq!(check_pair(&v, &m), Ok(()));
            Ok((v, m))
        }
    }
}

/// 将强度体重采样到 `target` 间距 (毫米, `(z, h, w)` 轴序).
///
/// 目标间距与当前间距完全一致时直接返回副本, 不引入浮点扰动.
pub fn resample_volume(
    volume: &Volume,
    target: [f64; 3],
    interp: Interpolation,
) -> Result<Volume, GeometryError> {
    let grid = out_grid(volume.grid(), volume.shape(), target)?;
    if target == GridAttr::spacing(volume) {
        return Ok(volume.clone());
    }

    let ratio = axis_ratios(GridAttr::spacing(volume), target);

    // 下采样轴先做抗混叠预滤波.
    let mut src = volume.data().to_owned();
    for (axis, r) in ratio.iter().enumerate() {
        let sigma = aa_sigma(*r);
        if sigma > 0.0 {
            src = convolve_axis(&src.view(), &gaussian_1d(sigma), Axis(axis));
        }
    }

    let data = ResampleImp::new(src.view(), ratio, interp).gather();
    Ok(Volume::new(grid, data))
}

/// 将 mask 重采样到 `target` 间距, 输出保持二值.
///
/// `interp` 为 `Nearest` 时按最近邻取值, 否则按线性插值后以 0.5 为阈值
/// (高阶插值对二值数据没有额外意义).
pub fn resample_mask(
    mask: &RoiMask,
    target: [f64; 3],
    interp: Interpolation,
) -> Result<RoiMask, GeometryError> {
    let grid = out_grid(mask.grid(), mask.shape(), target)?;
    if target == GridAttr::spacing(mask) {
        return Ok(mask.clone());
    }

    let ratio = axis_ratios(GridAttr::spacing(mask), target);
    let src = mask.data().mapv(|p| p as f32);
    let interp = match interp {
        Interpolation::Nearest => Interpolation::Nearest,
        _ => Interpolation::Linear,
    };
    let frac = ResampleImp::new(src.view(), ratio, interp).gather();
    let data = frac.mapv(|v| if v >= 0.5 { IN_REGION } else { BACKGROUND });
    Ok(RoiMask::new(grid, data))
}

/// 下采样抗混叠高斯的尺度 (输入体素单位). 上采样时为 0, 即不滤波.
#[inline]
fn aa_sigma(ratio: f64) -> f64 {
    ((ratio - 1.0) / 2.0).max(0.0)
}

#[inline]
fn axis_ratios(spacing: [f64; 3], target: [f64; 3]) -> [f64; 3] {
    [
        target[0] / spacing[0],
        target[1] / spacing[1],
        target[2] / spacing[2],
    ]
}

/// 求输出网格. 输出原点使输入/输出网格的几何中心重合.
fn out_grid(grid: &VoxelGrid, shape: Idx3d, target: [f64; 3]) -> Result<VoxelGrid, GeometryError> {
    // 先让 VoxelGrid 的构造检查 target 的合法性.
    VoxelGrid::new(target, [0.0; 3])?;

    let n_in = [shape.0, shape.1, shape.2];
    let spacing = grid.spacing();
    let origin = grid.origin();
    let mut out_origin = [0.0; 3];
    for a in 0..3 {
        let n_out = out_len(n_in[a], target[a] / spacing[a]);
        let c_in = (n_in[a] as f64 - 1.0) / 2.0;
        let c_out = (n_out as f64 - 1.0) / 2.0;
        out_origin[a] = origin[a] + c_in * spacing[a] - c_out * target[a];
    }
    VoxelGrid::new(target, out_origin)
}

/// 单轴输出长度: `ceil(n_in * s_in / s_out)`, 至少为 1.
#[inline]
fn out_len(n_in: usize, ratio: f64) -> usize {
    debug_assert!(n_in >= 1);
    (n_in as f64 / ratio).ceil().max(1.0) as usize
}

/// 单个输出下标在输入索引系中的连续坐标. 两网格几何中心对齐.
#[inline]
fn source_pos(i: usize, n_in: usize, n_out: usize, ratio: f64) -> f64 {
    (i as f64 - (n_out as f64 - 1.0) / 2.0) * ratio + (n_in as f64 - 1.0) / 2.0
}

/// Keys 三次卷积核, `a = -1/2`.
fn keys_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t < 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        A * (((t - 5.0) * t + 8.0) * t - 4.0)
    } else {
        0.0
    }
}

#[inline]
fn clamp_idx(i: i64, n: usize) -> usize {
    i.clamp(0, n as i64 - 1) as usize
}

/// 单个输出下标的插值脚位: `(输入下标, 权重)` 列表. 越界脚位 clamp 到边界.
type Taps = Vec<(usize, f64)>;

/// 重采样聚合器. 逐输出体素做可分离的核加权求和.
struct ResampleImp<'a> {
    src: ArrayView<'a, f32, Ix3>,
    taps: [Vec<Taps>; 3],
    dim: Idx3d,
}

impl<'a> ResampleImp<'a> {
    fn new(src: ArrayView<'a, f32, Ix3>, ratio: [f64; 3], interp: Interpolation) -> Self {
        let (nz, nh, nw) = src.dim();
        let n_in = [nz, nh, nw];
        let taps = [
            axis_taps(n_in[0], ratio[0], interp),
            axis_taps(n_in[1], ratio[1], interp),
            axis_taps(n_in[2], ratio[2], interp),
        ];
        let dim = (taps[0].len(), taps[1].len(), taps[2].len());
        Self { src, taps, dim }
    }

    /// 执行聚合, 返回输出数组.
    fn gather(&self) -> Array3<f32> {
        let mut out = Array3::zeros(self.dim);

        #[cfg(feature = "rayon")]
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(k, mut slab)| {
                let wz = &self.taps[0][k];
                for (j, wh) in self.taps[1].iter().enumerate() {
                    for (i, ww) in self.taps[2].iter().enumerate() {
                        slab[(j, i)] = self.gather_one(wz, wh, ww);
                    }
                }
            });

        #[cfg(not(feature = "rayon"))]
        for (k, wz) in self.taps[0].iter().enumerate() {
            for (j, wh) in self.taps[1].iter().enumerate() {
                for (i, ww) in self.taps[2].iter().enumerate() {
                    out[(k, j, i)] = self.gather_one(wz, wh, ww);
                }
            }
        }

        out
    }

    #[inline]
    fn gather_one(&self, wz: &Taps, wh: &Taps, ww: &Taps) -> f32 {
        let mut acc = 0.0f64;
        for &(z, az) in wz {
            for &(h, ah) in wh {
                let base = az * ah;
                for &(w, aw) in ww {
                    acc += base * aw * self.src[(z, h, w)] as f64;
                }
            }
        }
        acc as f32
    }
}

/// 构建单轴全部输出下标的插值脚位表.
///
/// 每组脚位的权重和归一化为 1, 保证常数场精确不变.
fn axis_taps(n_in: usize, ratio: f64, interp: Interpolation) -> Vec<Taps> {
    let n_out = out_len(n_in, ratio);
    (0..n_out)
        .map(|i| {
            let x = source_pos(i, n_in, n_out, ratio);
            let taps = match interp {
                Interpolation::Nearest => {
                    vec![(clamp_idx((x + 0.5).floor() as i64, n_in), 1.0)]
                }
                Interpolation::Linear => {
                    let f = x.floor();
                    let t = x - f;
                    let i0 = f as i64;
                    vec![
                        (clamp_idx(i0, n_in), 1.0 - t),
                        (clamp_idx(i0 + 1, n_in), t),
                    ]
                }
                Interpolation::Cubic => {
                    let f = x.floor() as i64;
                    (-1..=2)
                        .map(|k| (clamp_idx(f + k, n_in), keys_weight(x - (f + k) as f64)))
                        .collect()
                }
            };
            normalized(taps)
        })
        .collect()
}

fn normalized(mut taps: Taps) -> Taps {
    let sum: f64 = taps.iter().map(|(_, w)| w).sum();
    debug_assert!(sum > 0.5, "插值核权重和异常: {sum}");
    for (_, w) in taps.iter_mut() {
        *w /= sum;
    }
    taps
}
