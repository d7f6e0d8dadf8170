//! 纹理矩阵五族: GLCM / GLRLM / GLSZM / GLDZM / NGTDM.
//!
//! 共用机制集中在本模块: 13 方向表, 邻域偏移表, 同灰度级连通区 (zone)
//! 划分与 ROI 边界距离图. 各族矩阵的构建与特征公式见对应子模块.
//!
//! 约定:
//!
//! - 矩阵只统计区域内体素 (灰度级非 0), 区域外体素既不计数也不作配对;
//! - 计数以 `f64` 保存, 特征全部以 `f64` 输出, 未定义的特征值取 NaN;
//! - 全部遍历按行优先序进行, 结果与线程数/调用次数无关.

pub mod cooccurrence;
pub mod distancezone;
pub mod ngtdm;
pub mod runlength;
pub mod sizezone;

use std::collections::VecDeque;

use ndarray::Array3;
use once_cell::sync::Lazy;

use crate::consts::mask::is_in_region;
use crate::consts::OUTSIDE_LEVEL;
use crate::data::{GreyVolume, GridAttr, RoiMask};
use crate::params::Connectivity;
use crate::{Idx3d, Off3d};

/// 三维的 13 个唯一方向 (互为相反的方向视为同一个方向).
///
/// 生成规则: 遍历 `(dz, dh, dw)` 取值 `{-1, 0, 1}^3` 中的非零偏移,
/// 保留字典序上首个非零分量为正的那一半.
pub static DIRECTIONS_13: Lazy<Vec<Off3d>> = Lazy::new(|| {
    let mut dirs = Vec::with_capacity(13);
    for dz in -1i64..=1 {
        for dh in -1i64..=1 {
            for dw in -1i64..=1 {
                let off = (dz, dh, dw);
                if off == (0, 0, 0) {
                    continue;
                }
                let head = [dz, dh, dw].into_iter().find(|v| *v != 0).unwrap();
                if head > 0 {
                    dirs.push(off);
                }
            }
        }
    }
    debug_assert_eq!(dirs.len(), 13);
    dirs
});

static OFFSETS_26: Lazy<Vec<Off3d>> = Lazy::new(|| {
    let mut offs = Vec::with_capacity(26);
    for dz in -1i64..=1 {
        for dh in -1i64..=1 {
            for dw in -1i64..=1 {
                if (dz, dh, dw) != (0, 0, 0) {
                    offs.push((dz, dh, dw));
                }
            }
        }
    }
    offs
});

static OFFSETS_18: Lazy<Vec<Off3d>> = Lazy::new(|| {
    OFFSETS_26
        .iter()
        .copied()
        .filter(|(dz, dh, dw)| dz.abs() + dh.abs() + dw.abs() <= 2)
        .collect()
});

static OFFSETS_6: Lazy<Vec<Off3d>> = Lazy::new(|| {
    OFFSETS_26
        .iter()
        .copied()
        .filter(|(dz, dh, dw)| dz.abs() + dh.abs() + dw.abs() == 1)
        .collect()
});

/// 给定连通性对应的邻域偏移表.
pub(crate) fn connectivity_offsets(conn: Connectivity) -> &'static [Off3d] {
    match conn {
        Connectivity::C6 => &OFFSETS_6,
        Connectivity::C18 => &OFFSETS_18,
        Connectivity::C26 => &OFFSETS_26,
    }
}

/// 索引平移. 越界时返回 `None`.
#[inline]
pub(crate) fn shift(pos: Idx3d, off: Off3d, shape: Idx3d) -> Option<Idx3d> {
    let z = pos.0 as i64 + off.0;
    let h = pos.1 as i64 + off.1;
    let w = pos.2 as i64 + off.2;
    (z >= 0 && h >= 0 && w >= 0 && z < shape.0 as i64 && h < shape.1 as i64 && w < shape.2 as i64)
        .then(|| (z as usize, h as usize, w as usize))
}

/// 按给定倍数拉伸方向偏移 (GLCM 的 Chebyshev 距离).
#[inline]
pub(crate) fn scaled(off: Off3d, k: usize) -> Off3d {
    let k = k as i64;
    (off.0 * k, off.1 * k, off.2 * k)
}

/// 一个同灰度级连通区.
#[derive(Debug, Clone)]
pub(crate) struct Zone {
    /// 区内灰度级.
    pub level: u16,

    /// 区内全部体素下标, 按发现顺序存储.
    pub voxels: Vec<Idx3d>,
}

/// 把区域内体素划分为同灰度级连通区 (flood fill).
///
/// 种子按行优先序扫描, zone 顺序与内容完全确定.
pub(crate) fn label_zones(grey: &GreyVolume, conn: Connectivity) -> Vec<Zone> {
    let shape = grey.shape();
    let offsets = connectivity_offsets(conn);
    let levels = grey.levels();
    let mut visited = Array3::<bool>::from_elem(shape, false);
    let mut zones = Vec::new();
    let mut stack: Vec<Idx3d> = Vec::new();

    for (pos, lvl) in levels.indexed_iter() {
        if *lvl == OUTSIDE_LEVEL || visited[pos] {
            continue;
        }
        let level = *lvl;
        visited[pos] = true;
        stack.push(pos);
        let mut voxels = Vec::new();
        while let Some(cur) = stack.pop() {
            voxels.push(cur);
            for off in offsets {
                if let Some(next) = shift(cur, *off, shape) {
                    if !visited[next] && levels[next] == level {
                        visited[next] = true;
                        stack.push(next);
                    }
                }
            }
        }
        zones.push(Zone { level, voxels });
    }
    zones
}

/// ROI 边界距离图: 每个 ROI 内体素到 ROI 外的最小 city-block 步数
/// (6-连通), 紧贴 ROI 边缘或数据边界的体素距离为 1.
///
/// ROI 外体素的距离为 0, 不参与后续统计. 算法为多源 BFS,
/// 逐层向内推进.
pub(crate) fn border_distance_map(morph: &RoiMask) -> Array3<u32> {
    let shape = morph.shape();
    let mut dist = Array3::<u32>::zeros(shape);
    let mut queue: VecDeque<Idx3d> = VecDeque::new();

    // 第一层: 与 ROI 外 (或数据边界) 面相邻的 ROI 体素.
    for (pos, p) in morph.data().indexed_iter() {
        if !is_in_region(*p) {
            continue;
        }
        let on_border = OFFSETS_6.iter().any(|off| match shift(pos, *off, shape) {
            None => true,
            Some(next) => !is_in_region(morph[next]),
        });
        if on_border {
            dist[pos] = 1;
            queue.push_back(pos);
        }
    }

    while let Some(cur) = queue.pop_front() {
        let d = dist[cur];
        for off in OFFSETS_6.iter() {
            if let Some(next) = shift(cur, *off, shape) {
                if is_in_region(morph[next]) && dist[next] == 0 {
                    dist[next] = d + 1;
                    queue.push_back(next);
                }
            }
        }
    }
    dist
}

/// `x log2 x`, 约定 `0 log 0 = 0`. 熵类特征的公共片段.
#[inline]
pub(crate) fn xlog2(p: f64) -> f64 {
    if p > 0.0 {
        p * p.log2()
    } else {
        0.0
    }
}

/// 逐特征名对多个方向的特征值取算术平均. 所有方向的名字序列必须一致.
pub(crate) fn average_named(per_dir: &[Vec<(&'static str, f64)>]) -> Vec<(&'static str, f64)> {
    assert!(!per_dir.is_empty());
    let n = per_dir.len() as f64;
    let mut out: Vec<(&'static str, f64)> = per_dir[0].iter().map(|(k, v)| (*k, *v)).collect();
    for dir in &per_dir[1..] {
        debug_assert_eq!(dir.len(), out.len());
        for (acc, (k, v)) in out.iter_mut().zip(dir.iter()) {
            debug_assert_eq!(acc.0, *k);
            acc.1 += *v;
        }
    }
    for (_, v) in out.iter_mut() {
        *v /= n;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelGrid;
    use ndarray::Array3;

    #[test]
    fn test_direction_and_offset_tables() {
        assert_eq!(DIRECTIONS_13.len(), 13);
        assert_eq!(OFFSETS_26.len(), 26);
        assert_eq!(OFFSETS_18.len(), 18);
        assert_eq!(OFFSETS_6.len(), 6);

        // 13 方向两两不共线 (不存在互为相反的一对).
        for (i, a) in DIRECTIONS_13.iter().enumerate() {
            for b in DIRECTIONS_13.iter().skip(i + 1) {
                assert_ne!((a.0, a.1, a.2), (-b.0, -b.1, -b.2));
            }
        }
        assert_eq!(connectivity_offsets(Connectivity::C6).len(), 6);
    }

    #[test]
    fn test_shift_bounds() {
        let shape = (2, 2, 2);
        assert_eq!(shift((0, 0, 0), (1, 1, 1), shape), Some((1, 1, 1)));
        assert_eq!(shift((0, 0, 0), (-1, 0, 0), shape), None);
        assert_eq!(shift((1, 1, 1), (1, 0, 0), shape), None);
        assert_eq!(scaled((1, 0, -1), 3), (3, 0, -3));
    }

    fn grey_of(shape: Idx3d, flat: Vec<u16>, n: u16) -> GreyVolume {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        GreyVolume::new(grid, Array3::from_shape_vec(shape, flat).unwrap(), n)
    }

    #[test]
    fn test_label_zones() {
        // 平面 [1 1 2]
        //      [2 2 2], 6-连通: 灰度 1 一个 zone (2 体素), 灰度 2 一个 zone (4 体素).
        let g = grey_of((1, 2, 3), vec![1, 1, 2, 2, 2, 2], 2);
        let zones = label_zones(&g, Connectivity::C6);
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0].level, 1);
        assert_eq!(zones[0].voxels.len(), 2);
        assert_eq!(zones[1].level, 2);
        assert_eq!(zones[1].voxels.len(), 4);

        // 对角相触的同灰度区: 6-连通分开, 26-连通合并.
        let g = grey_of((1, 2, 2), vec![1, 0, 0, 1], 1);
        assert_eq!(label_zones(&g, Connectivity::C6).len(), 2);
        assert_eq!(label_zones(&g, Connectivity::C26).len(), 1);
    }

    #[test]
    fn test_zone_total_is_region_count() {
        let g = grey_of((2, 2, 3), vec![1, 2, 2, 0, 3, 1, 2, 2, 1, 1, 0, 3], 3);
        let total: usize = label_zones(&g, Connectivity::C26)
            .iter()
            .map(|z| z.voxels.len())
            .sum();
        assert_eq!(total, g.in_region_count());
    }

    #[test]
    fn test_border_distance_map() {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        // 3x3x3 实心块贴满数据: 全部体素贴边界, 中心除外.
        let full = RoiMask::from_shape_fn(grid, (3, 3, 3), |_| true);
        let d = border_distance_map(&full);
        assert_eq!(d[(1, 1, 1)], 2);
        assert_eq!(d[(0, 0, 0)], 1);
        assert_eq!(d[(1, 1, 0)], 1);

        // 5x5x5 数据中央 3x3x3 块: 中心距 ROI 外 2 步, 其余 1 步.
        let m = RoiMask::from_shape_fn(grid, (5, 5, 5), |(z, h, w)| {
            (1..4).contains(&z) && (1..4).contains(&h) && (1..4).contains(&w)
        });
        let d = border_distance_map(&m);
        assert_eq!(d[(2, 2, 2)], 2);
        assert_eq!(d[(1, 2, 2)], 1);
        assert_eq!(d[(0, 0, 0)], 0);
    }

    #[test]
    fn test_average_named() {
        let a = vec![("x", 1.0), ("y", 4.0)];
        let b = vec![("x", 3.0), ("y", 0.0)];
        let avg = average_named(&[a, b]);
        assert_eq!(avg, vec![("x", 2.0), ("y", 2.0)]);
    }
}
