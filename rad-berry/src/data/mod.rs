use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};

use crate::consts::mask::*;
use crate::Idx3d;

mod grey;
mod grid;

pub use grey::GreyVolume;
pub use grid::{GeometryError, GridAttr, VoxelGrid};

/// 三维强度体数据. 强度值 (CT HU 或其他模态的标量强度) 以 `f32` 保存,
/// 所有统计量以 `f64` 累加.
#[derive(Debug, Clone)]
pub struct Volume {
    grid: VoxelGrid,
    data: Array3<f32>,
}

impl GridAttr for Volume {
    #[inline]
    fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for Volume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for Volume {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl Volume {
    /// 根据网格几何与裸数据直接创建 `Volume` 实体.
    ///
    /// 数据按 `(z, h, w)` 轴序组织, 上游若为 `(x, y, z)`
    /// 排布应先自行转置.
    #[inline]
    pub fn new(grid: VoxelGrid, data: Array3<f32>) -> Self {
        Self { grid, data }
    }

    /// 按 `f(pos)` 逐体素生成一个形状为 `shape` 的 `Volume`.
    pub fn from_shape_fn<F: Fn(Idx3d) -> f32>(grid: VoxelGrid, shape: Idx3d, f: F) -> Self {
        Self {
            grid,
            data: Array3::from_shape_fn(shape, f),
        }
    }

    /// 计算由 `it` 给出的所有索引对应的强度值的平均值.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn mean_of<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> f64 {
        let mut count = 0u64;
        let mut acc = 0.0;
        for pos in it.into_iter() {
            count += 1;
            acc += self[pos] as f64;
        }
        acc / (count as f64)
    }

    /// 计算由 `it` 给出的所有索引对应的强度值的最小值与最大值.
    ///
    /// 迭代器为空时返回 `None`. 如果存在越界索引, 则程序 panic.
    pub fn min_max_of<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> Option<(f32, f32)> {
        let mut ans: Option<(f32, f32)> = None;
        for pos in it.into_iter() {
            let v = self[pos];
            ans = Some(match ans {
                None => (v, v),
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
            });
        }
        ans
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 拆出内部数据, 消耗自身.
    #[inline]
    pub fn into_data(self) -> Array3<f32> {
        self.data
    }
}

/// 三维 ROI mask. 体素值以 `u8` 保存, 0 为背景, 非 0 一律视为 ROI 内.
#[derive(Debug, Clone)]
pub struct RoiMask {
    grid: VoxelGrid,
    data: Array3<u8>,
}

impl GridAttr for RoiMask {
    #[inline]
    fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for RoiMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for RoiMask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl RoiMask {
    /// 根据网格几何与裸标签数据直接创建 `RoiMask` 实体.
    #[inline]
    pub fn new(grid: VoxelGrid, data: Array3<u8>) -> Self {
        Self { grid, data }
    }

    /// 按谓词 `pred(pos)` 逐体素生成一个形状为 `shape` 的二值 mask.
    pub fn from_shape_fn<F: Fn(Idx3d) -> bool>(grid: VoxelGrid, shape: Idx3d, pred: F) -> Self {
        Self {
            grid,
            data: Array3::from_shape_fn(shape, |pos| if pred(pos) { IN_REGION } else { BACKGROUND }),
        }
    }

    /// 获取 ROI 内体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| is_in_region(**p)).count()
    }

    /// ROI 是否为空 (不含任何体素)?
    #[inline]
    pub fn is_empty_region(&self) -> bool {
        self.data.iter().all(|p| is_background(*p))
    }

    /// 收集 ROI 内所有体素对应的下标. 结果按行优先存储.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, p)| is_in_region(*p).then_some(*pos))
            .collect()
    }

    /// 求 ROI 的最小包围盒, 返回闭区间端点 `(lo, hi)`.
    ///
    /// ROI 为空时返回 `None`.
    pub fn bounding_box(&self) -> Option<(Idx3d, Idx3d)> {
        let mut lo = (usize::MAX, usize::MAX, usize::MAX);
        let mut hi = (0usize, 0usize, 0usize);
        let mut any = false;
        for ((z, h, w), p) in self.data.indexed_iter() {
            if is_in_region(*p) {
                any = true;
                lo = (lo.0.min(z), lo.1.min(h), lo.2.min(w));
                hi = (hi.0.max(z), hi.1.max(h), hi.2.max(w));
            }
        }
        any.then_some((lo, hi))
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }
}

/// 检查强度体与 mask 是否构成一致的数据对: 形状一致且体素间距一致.
///
/// 不一致时返回对应的 [`GeometryError`]. 原点不参与此检查,
/// 配准问题由上游负责.
pub fn check_pair(volume: &Volume, mask: &RoiMask) -> Result<(), GeometryError> {
    if volume.shape() != mask.shape() {
        return Err(GeometryError::ShapeMismatch(volume.shape(), mask.shape()));
    }
    let (vs, ms) = (volume.grid().spacing(), mask.grid().spacing());
    if vs != ms {
        return Err(GeometryError::SpacingMismatch(vs, ms));
    }
    Ok(())
}
