//! 确定性合成体模.
//!
//! 光滑的抛物强度碗叠加模算术纹理, ROI 为居中椭球. 全部数值由整数
//! 算术与精确 IEEE 运算生成, 同一平台上逐位可复现, 无需外部数据.

use rad_berry::prelude::*;

/// 体模形状, `(z, h, w)` 轴序.
pub const SHAPE: Idx3d = (16, 24, 24);

/// 体素间距, 毫米, `(z, h, w)` 轴序. 故意各向异性, 让重采样有事可做.
pub const SPACING: [f64; 3] = [2.0, 1.0, 1.0];

/// 生成一对配准好的强度体与椭球 mask.
///
/// # 参数
///
/// `seed` 平移纹理相位: 不同 seed 产生不同但同样确定的体模.
pub fn pair(seed: usize) -> (Volume, RoiMask) {
    let grid = VoxelGrid::new(SPACING, [0.0; 3]).expect("constant spacing is valid");
    let (dz, dh, dw) = SHAPE;

    let volume = Volume::from_shape_fn(grid, SHAPE, move |(z, h, w)| {
        // 归一化坐标落在 [-0.5, 0.5), 碗顶在体中心.
        let fz = (z as f64 + 0.5) / dz as f64 - 0.5;
        let fh = (h as f64 + 0.5) / dh as f64 - 0.5;
        let fw = (w as f64 + 0.5) / dw as f64 - 0.5;
        let bowl = 80.0 * (1.0 - 4.0 * (fz * fz + fh * fh + fw * fw));
        let texture = ((z * 7 + h * 3 + w * 5 + seed) % 11) as f64 * 6.0;
        (bowl + texture) as f32
    });

    let mask = RoiMask::from_shape_fn(grid, SHAPE, |(z, h, w)| {
        let ez = (z as f64 - 7.5) / 6.0;
        let eh = (h as f64 - 11.5) / 9.0;
        let ew = (w as f64 - 11.5) / 9.0;
        ez * ez + eh * eh + ew * ew <= 1.0
    });

    (volume, mask)
}
