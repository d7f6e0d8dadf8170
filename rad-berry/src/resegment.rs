//! 强度再分割与 ROI 紧凑裁剪.
//!
//! 再分割在原始 mask (形态学 mask) 上做两条独立规则的交集:
//!
//! 1. 范围规则: 强度落在闭区间 `[lo, hi]` 内;
//! 2. 离群规则: 强度落在 `[mu - k*sigma, mu + k*sigma]` 内, 其中 mu 与
//!    sigma 在形态学 mask 的全部体素上计算 (总体标准差).
//!
//! 通过两条规则的体素构成强度 mask (keep mask). 随后以形态学 mask
//! 的最小包围盒 (外加 `pad` 体素的边距, 在数据边界处收缩)
//! 裁剪出紧凑的 [`Region`], 供后续离散化与特征计算使用.

use ndarray::s;

use crate::consts::mask::{is_in_region, IN_REGION};
use crate::data::{GridAttr, RoiMask, VoxelGrid, Volume};
use crate::params::ParameterSet;
use crate::Idx3d;

/// 再分割之后区域为空时的错误集合.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRegionError {
    /// 输入 mask 不含任何 ROI 体素.
    EmptyMask,

    /// 再分割规则剔除了全部体素. 参数为再分割前的 ROI 体素数.
    AllRemoved(usize),
}

/// 裁剪后的紧凑特征计算区域.
///
/// 三个成员共享同一个 (平移后的) 网格几何: `volume` 为强度体,
/// `morph` 为形态学 mask (再分割前), `keep` 为强度 mask (再分割后).
/// 恒有 keep 是 morph 的子集.
#[derive(Debug, Clone)]
pub struct Region {
    volume: Volume,
    morph: RoiMask,
    keep: RoiMask,
}

impl Region {
    /// 获取裁剪后的强度体.
    #[inline]
    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    /// 获取形态学 mask (再分割前的原始 ROI).
    #[inline]
    pub fn morph_mask(&self) -> &RoiMask {
        &self.morph
    }

    /// 获取强度 mask (通过再分割的体素).
    #[inline]
    pub fn keep_mask(&self) -> &RoiMask {
        &self.keep
    }

    /// 获取强度 mask 内的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.keep.count()
    }

    /// 收集强度 mask 内全部体素的下标, 按行优先存储.
    #[inline]
    pub fn keep_positions(&self) -> Vec<Idx3d> {
        self.keep.positions()
    }

    /// 收集强度 mask 内全部体素的强度值, 按行优先存储.
    pub fn intensities(&self) -> Vec<f32> {
        self.volume
            .data()
            .iter()
            .zip(self.keep.data().iter())
            .filter_map(|(v, p)| is_in_region(*p).then_some(*v))
            .collect()
    }
}

/// 对 (强度体, mask) 数据对执行再分割与裁剪, 产出紧凑区域.
///
/// `pad` 为包围盒每侧额外保留的体素边距, 在数据边界处收缩.
///
/// # 注意
///
/// 两个输入的形状必须一致, 否则程序 panic. 形状/间距级别的校验
/// 应在调用前通过 [`crate::check_pair`] 完成.
pub fn extract_region(
    volume: &Volume,
    mask: &RoiMask,
    params: &ParameterSet,
    pad: usize,
) -> Result<Region, EmptyRegionError> {
    assert_eq!(volume.shape(), mask.shape(), "强度体和 mask 形状不一致");

    let positions = mask.positions();
    if positions.is_empty() {
        return Err(EmptyRegionError::EmptyMask);
    }

    // 离群规则的统计量在全部 ROI 体素上计算.
    let sigma_band = params.outlier_sigma.map(|k| {
        let mean = volume.mean_of(positions.iter().copied());
        let mut acc = 0.0f64;
        for pos in &positions {
            let d = volume[*pos] as f64 - mean;
            acc += d * d;
        }
        let sd = (acc / positions.len() as f64).sqrt();
        (mean - k * sd, mean + k * sd)
    });

    let keep_rule = |v: f64| -> bool {
        if let Some((lo, hi)) = params.resegment_range {
            if !(lo..=hi).contains(&v) {
                return false;
            }
        }
        if let Some((lo, hi)) = sigma_band {
            if !(lo..=hi).contains(&v) {
                return false;
            }
        }
        v.is_finite()
    };

    let kept: Vec<Idx3d> = positions
        .iter()
        .copied()
        .filter(|pos| keep_rule(volume[*pos] as f64))
        .collect();
    if kept.is_empty() {
        return Err(EmptyRegionError::AllRemoved(positions.len()));
    }

    // 包围盒按形态学 mask 计算, keep 是 morph 的子集, 必然同时覆盖两者.
    let (lo, hi) = mask.bounding_box().expect("mask 已验非空");
    let (lo, hi) = padded_box(lo, hi, pad, volume.shape());

    let sub_grid = VoxelGrid::new(volume.grid().spacing(), volume.grid().world_at(lo))
        .expect("裁剪不改变间距合法性");

    let span = s![lo.0..=hi.0, lo.1..=hi.1, lo.2..=hi.2];
    let sub_volume = Volume::new(sub_grid, volume.data().slice(span).to_owned());
    let sub_morph = RoiMask::new(sub_grid, mask.data().slice(span).to_owned());

    let shift = |pos: &Idx3d| (pos.0 - lo.0, pos.1 - lo.1, pos.2 - lo.2);
    let mut keep = RoiMask::from_shape_fn(sub_grid, sub_volume.shape(), |_| false);
    for pos in &kept {
        keep[shift(pos)] = IN_REGION;
    }

    Ok(Region {
        volume: sub_volume,
        morph: sub_morph,
        keep,
    })
}

/// 包围盒每侧外扩 `pad` 体素, 在数据边界处收缩.
fn padded_box(lo: Idx3d, hi: Idx3d, pad: usize, shape: Idx3d) -> (Idx3d, Idx3d) {
    let lo = (
        lo.0.saturating_sub(pad),
        lo.1.saturating_sub(pad),
        lo.2.saturating_sub(pad),
    );
    let hi = (
        (hi.0 + pad).min(shape.0 - 1),
        (hi.1 + pad).min(shape.1 - 1),
        (hi.2 + pad).min(shape.2 - 1),
    );
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelGrid;

    fn grid1() -> VoxelGrid {
        VoxelGrid::isotropic(1.0).unwrap()
    }

    /// 5 个体素排成一行, 值 [10, 10, 10, 10, 50].
    fn line5() -> (Volume, RoiMask) {
        let v = Volume::from_shape_fn(grid1(), (1, 1, 5), |(_, _, w)| {
            if w == 4 {
                50.0
            } else {
                10.0
            }
        });
        let m = RoiMask::from_shape_fn(grid1(), (1, 1, 5), |_| true);
        (v, m)
    }

    #[test]
    fn test_empty_mask() {
        let v = Volume::from_shape_fn(grid1(), (2, 2, 2), |_| 0.0);
        let m = RoiMask::from_shape_fn(grid1(), (2, 2, 2), |_| false);
        assert_eq!(
            extract_region(&v, &m, &ParameterSet::default(), 0).unwrap_err(),
            EmptyRegionError::EmptyMask
        );
    }

    #[test]
    fn test_range_rule() {
        let (v, m) = line5();
        let params = ParameterSet {
            resegment_range: Some((0.0, 20.0)),
            ..Default::default()
        };
        let r = extract_region(&v, &m, &params, 0).unwrap();
        assert_eq!(r.count(), 4);
        assert_eq!(r.morph_mask().count(), 5);
        assert_eq!(r.intensities(), vec![10.0; 4]);

        let all_out = ParameterSet {
            resegment_range: Some((1000.0, 2000.0)),
            ..Default::default()
        };
        assert_eq!(
            extract_region(&v, &m, &all_out, 0).unwrap_err(),
            EmptyRegionError::AllRemoved(5)
        );
    }

    #[test]
    fn test_outlier_rule() {
        // mu = 18, sigma = 16: k = 1 时保留 [2, 34], 剔除 50.
        let (v, m) = line5();
        let params = ParameterSet {
            outlier_sigma: Some(1.0),
            ..Default::default()
        };
        let r = extract_region(&v, &m, &params, 0).unwrap();
        assert_eq!(r.count(), 4);

        // k = 2: [-14, 50] 全保留.
        let loose = ParameterSet {
            outlier_sigma: Some(2.0),
            ..Default::default()
        };
        assert_eq!(extract_region(&v, &m, &loose, 0).unwrap().count(), 5);
    }

    #[test]
    fn test_crop_and_grid_shift() {
        let v = Volume::from_shape_fn(grid1(), (6, 6, 6), |(z, _, _)| z as f32);
        let m = RoiMask::from_shape_fn(grid1(), (6, 6, 6), |(z, h, w)| {
            (2..4).contains(&z) && (2..4).contains(&h) && (2..4).contains(&w)
        });
        let r = extract_region(&v, &m, &ParameterSet::default(), 0).unwrap();
        assert_eq!(r.volume().shape(), (2, 2, 2));
        assert_eq!(r.volume().grid().origin(), [2.0; 3]);
        assert_eq!(r.count(), 8);

        // pad = 3 在低端收缩到 0, 高端收缩到 5.
        let padded = extract_region(&v, &m, &ParameterSet::default(), 3).unwrap();
        assert_eq!(padded.volume().shape(), (6, 6, 6));
        assert_eq!(padded.morph_mask().count(), 8);
    }

    #[test]
    fn test_both_rules_intersect() {
        let (v, m) = line5();
        // 范围规则保留 [10, 50] 全部, 离群规则剔除 50: 交集 4 个.
        let params = ParameterSet {
            resegment_range: Some((10.0, 50.0)),
            outlier_sigma: Some(1.0),
            ..Default::default()
        };
        assert_eq!(extract_region(&v, &m, &params, 0).unwrap().count(), 4);
    }
}
