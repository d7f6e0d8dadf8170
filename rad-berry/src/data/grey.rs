//! 离散化灰度级体.

use std::ops::Index;

use ndarray::{Array3, ArrayView, Ix3};

use crate::consts::OUTSIDE_LEVEL;
use crate::Idx3d;

use super::{GridAttr, VoxelGrid};

/// 灰度离散化之后的体数据. 体素值为灰度级, 以 `u16` 保存.
///
/// 区域内灰度级取值 `1..=n_levels`, 区域外体素固定为
/// [`OUTSIDE_LEVEL`] (即 0). 纹理矩阵只统计区域内体素.
#[derive(Debug, Clone)]
pub struct GreyVolume {
    grid: VoxelGrid,
    levels: Array3<u16>,
    n_levels: u16,
}

impl GridAttr for GreyVolume {
    #[inline]
    fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.levels.dim()
    }
}

impl Index<Idx3d> for GreyVolume {
    type Output = u16;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.levels[index]
    }
}

impl GreyVolume {
    /// 根据网格几何与裸灰度级数据直接创建 `GreyVolume` 实体.
    ///
    /// # 参数
    ///
    /// 1. `levels` 中区域内体素取值必须在 `1..=n_levels` 内,
    ///    区域外体素必须为 0. 否则程序行为未定义.
    /// 2. `n_levels` 必须不小于 1.
    pub fn new(grid: VoxelGrid, levels: Array3<u16>, n_levels: u16) -> Self {
        assert!(n_levels >= 1);
        debug_assert!(levels.iter().all(|v| *v <= n_levels));
        Self {
            grid,
            levels,
            n_levels,
        }
    }

    /// 获取灰度级总数.
    #[inline]
    pub fn n_levels(&self) -> u16 {
        self.n_levels
    }

    /// 获取区域内体素个数.
    #[inline]
    pub fn in_region_count(&self) -> usize {
        self.levels.iter().filter(|v| **v != OUTSIDE_LEVEL).count()
    }

    /// 收集区域内所有体素对应的下标. 结果按行优先存储.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.levels
            .indexed_iter()
            .filter_map(|(ref pos, v)| (*v != OUTSIDE_LEVEL).then_some(*pos))
            .collect()
    }

    /// 统计各灰度级的区域内体素个数.
    ///
    /// 返回长度为 `n_levels` 的数组, 下标 `k` 对应灰度级 `k + 1`.
    pub fn histogram(&self) -> Vec<u64> {
        let mut hist = vec![0u64; self.n_levels as usize];
        for v in self.levels.iter().filter(|v| **v != OUTSIDE_LEVEL) {
            hist[(*v - 1) as usize] += 1;
        }
        hist
    }

    /// 获得灰度级数据的一份不可变 shallow copy.
    #[inline]
    pub fn levels(&self) -> ArrayView<'_, u16, Ix3> {
        self.levels.view()
    }
}
