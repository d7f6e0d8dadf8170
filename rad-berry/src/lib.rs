#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 面向 3D 医学体数据 (CT/MR 等) 的 radiomics 特征提取:
//! 从配准好的体素网格出发, 经过重采样, 再分割, 灰度离散化与空间滤波,
//! 计算 IBSI 风格的纹理矩阵特征与一阶/形态学特征, 并支持批量并行调度.
//!
//! 该 crate 目前仅提供 `safe` 接口. 将来可能为部分高性能场景关键路径提供 `unsafe` 接口.
//!
//! # 注意
//!
//! 1. 全库统一采用 `(z, h, w)` 轴序; 体素间距与原点同样按 `(z, h, w)` 排布.
//!    上游若以 `(x, y, z)` 组织数据, 应在构造 [`Volume`] 前完成转置.
//! 2. 同一特征提取单元内, 所有阶段都是确定性的: 相同输入与参数必然产生
//!    逐位相同的输出, 与线程数无关.
//! 3. 在非期望情况下 (轴序错误, 参数越界等契约违背), 程序会直接 panic,
//!    而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### 体素网格与数据模型 ✅
//!
//! [`VoxelGrid`] 承载间距/原点, [`Volume`] / [`RoiMask`] / [`GreyVolume`]
//! 共享同一几何描述.
//!
//! 实现位于 `rad-berry/src/data`.
//!
//! ### 网格中心对齐重采样 ✅
//!
//! nearest / trilinear / tricubic 三种插值, 下采样时附加高斯抗混叠预滤波;
//! mask 经线性插值后以 0.5 阈值保持二值.
//!
//! 实现位于 `rad-berry/src/resample.rs`.
//!
//! ### 强度再分割与 ROI 裁剪 ✅
//!
//! 范围裁剪与均值加减 k 倍标准差的离群剔除取交集, 随后按包围盒裁剪出紧凑区域.
//!
//! 实现位于 `rad-berry/src/resegment.rs`.
//!
//! ### 灰度离散化 ✅
//!
//! FBN (固定 bin 数) 与 FBS (固定 bin 宽) 两种方案, 输出 `u16` 灰度级体,
//! 0 保留为区域外标记.
//!
//! 实现位于 `rad-berry/src/discretize.rs`.
//!
//! ### 空间滤波器组 ✅
//!
//! 均值盒滤波, LoG, 平稳小波 (Haar/Db2) 子带与切片级 2D Gabor.
//! 边界一律 clamp 处理, 滤波结果以 tag 区分特征名.
//!
//! 实现位于 `rad-berry/src/filters`.
//!
//! ### 纹理矩阵五族 ✅
//!
//! GLCM / GLRLM / GLSZM / GLDZM / NGTDM, 连同 per-direction 与 merged
//! 两种聚合口径.
//!
//! 实现位于 `rad-berry/src/texture`.
//!
//! ### 一阶统计 / 直方图 / IVH ✅
//!
//! 对再分割后的强度与离散化灰度级分别计算.
//!
//! 实现位于 `rad-berry/src/intensity.rs`.
//!
//! ### 形态学特征 ✅
//!
//! 体素化表示: 暴露面表面积, 球形度族, PCA 主轴与最大径.
//!
//! 实现位于 `rad-berry/src/morph.rs`.
//!
//! ### 特征记录与汇总表 ✅
//!
//! `family_feature_tag` 命名, 重名即错; 批量结果汇成行列对齐的 CSV 表.
//!
//! 实现位于 `rad-berry/src/record.rs`.
//!
//! ### 批量并行调度 ✅
//!
//! 线程池 + mpsc 收集, 单元间完全隔离, panic 被捕获降级为单元失败,
//! 支持协作式取消.
//!
//! 实现位于 `rad-berry/src/batch.rs`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 约定为 `(z, h, w)` 轴序, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 三维带符号偏移 `(dz, dh, dw)`, 用于方向与邻域表.
pub type Off3d = (i64, i64, i64);

/// 体素网格与三维体数据结构.
mod data;

pub use data::{
    GeometryError, GreyVolume, GridAttr, RoiMask, VoxelGrid, Volume, check_pair,
};

pub mod consts;

pub mod params;

pub use params::{
    Aggregation, Band, BinScheme, Connectivity, FilterSpec, Interpolation, ParameterSet,
    WaveletKind,
};

pub mod resample;
pub mod resegment;

pub use resegment::{EmptyRegionError, Region};

pub mod discretize;
pub mod filters;
pub mod texture;

pub mod intensity;
pub mod morph;

pub mod record;

pub use record::{FeatureRecord, FeatureRow, FeatureTable, NamingCollisionError};

pub mod pipeline;

pub use pipeline::ExtractError;

pub mod batch;

pub use batch::{
    BatchOutcome, BatchRunner, CancelToken, ErrorKind, ExtractionResult, ExtractionUnit, UnitError,
    UnitFailure, UnitKey, UnitState,
};

pub mod prelude;
