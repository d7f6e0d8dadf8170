//! 均匀体素网格的几何描述.

use crate::{Idx2d, Idx3d};

/// 体素几何不满足要求时的错误集合.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    /// 网格间距存在非正分量. 参数为完整间距数组.
    NonPositiveSpacing([f64; 3]),

    /// 网格间距或原点存在非有限分量 (NaN / inf).
    NonFinite,

    /// 体数据与 mask 的形状不一致. 两个参数依次为体数据形状与 mask 形状.
    ShapeMismatch(Idx3d, Idx3d),

    /// 体数据与 mask 的网格间距不一致. 两个参数依次为体数据间距与 mask 间距.
    SpacingMismatch([f64; 3], [f64; 3]),
}

/// 均匀体素网格, 包含体素间距与网格原点.
///
/// 间距与原点均以毫米为单位, 按 `(z, h, w)` 轴序排布; 原点指索引
/// `(0, 0, 0)` 处体素 **中心** 的世界坐标.
///
/// 该结构是只读的. 若要修改几何参数, 你应该创建新的实例.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoxelGrid {
    spacing: [f64; 3],
    origin: [f64; 3],
}

impl VoxelGrid {
    /// 构建体素网格.
    ///
    /// `spacing` 的每个分量必须为有限正数, `origin` 的每个分量必须有限,
    /// 否则返回 `Err`.
    pub fn new(spacing: [f64; 3], origin: [f64; 3]) -> Result<VoxelGrid, GeometryError> {
        if spacing.iter().chain(origin.iter()).any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFinite);
        }
        if spacing.iter().any(|s| *s <= 0.0) {
            return Err(GeometryError::NonPositiveSpacing(spacing));
        }
        Ok(Self { spacing, origin })
    }

    /// 构建一个原点在零点的各向同性网格. `mm` 必须为有限正数, 否则返回 `Err`.
    #[inline]
    pub fn isotropic(mm: f64) -> Result<VoxelGrid, GeometryError> {
        Self::new([mm; 3], [0.0; 3])
    }

    /// 获取体素间距, 以毫米为单位, 按 `(z, h, w)` 排布.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 获取网格原点, 以毫米为单位, 按 `(z, h, w)` 排布.
    #[inline]
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// 求体素 `pos` 中心的世界坐标, 以毫米为单位, 按 `(z, h, w)` 排布.
    #[inline]
    pub fn world_at(&self, (z, h, w): Idx3d) -> [f64; 3] {
        let [sz, sh, sw] = self.spacing;
        let [oz, oh, ow] = self.origin;
        [
            oz + z as f64 * sz,
            oh + h as f64 * sh,
            ow + w as f64 * sw,
        ]
    }
}

/// 携带 [`VoxelGrid`] 的三维体数据的共用属性和部分通用操作.
pub trait GridAttr {
    /// 获取网格几何描述.
    fn grid(&self) -> &VoxelGrid;

    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    ///
    /// 该值也可以通过 `self.{z_mm, height_mm, width_mm}` 分别获取.
    #[inline]
    fn spacing(&self) -> [f64; 3] {
        self.grid().spacing()
    }

    /// 获取 width 方向 (自然 2D 图像的水平方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.grid().spacing()[2]
    }

    /// 获取 height 方向 (自然 2D 图像的垂直方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.grid().spacing()[1]
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.grid().spacing()[0]
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = GridAttr::spacing(self);
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        GridAttr::spacing(self).iter().product()
    }

    /// 获取水平切片方向的像素实际面积值, 以平方毫米为单位.
    #[inline]
    fn slice_pixel(&self) -> f64 {
        GridAttr::spacing(self).iter().skip(1).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_invalid_input() {
        assert_eq!(
            VoxelGrid::new([1.0, 0.0, 1.0], [0.0; 3]),
            Err(GeometryError::NonPositiveSpacing([1.0, 0.0, 1.0]))
        );
        assert_eq!(
            VoxelGrid::new([1.0, -2.5, 1.0], [0.0; 3]),
            Err(GeometryError::NonPositiveSpacing([1.0, -2.5, 1.0]))
        );
        assert_eq!(
            VoxelGrid::new([1.0, f64::NAN, 1.0], [0.0; 3]),
            Err(GeometryError::NonFinite)
        );
        assert_eq!(
            VoxelGrid::new([1.0; 3], [0.0, f64::INFINITY, 0.0]),
            Err(GeometryError::NonFinite)
        );
        assert!(VoxelGrid::isotropic(0.0).is_err());
        assert!(VoxelGrid::isotropic(1.0).is_ok());
    }

    #[test]
    fn test_world_at() {
        let g = VoxelGrid::new([2.0, 0.5, 0.5], [10.0, -1.0, 0.0]).unwrap();
        assert_eq!(g.world_at((0, 0, 0)), [10.0, -1.0, 0.0]);
        assert_eq!(g.world_at((3, 2, 1)), [16.0, 0.0, 0.5]);
    }
}
