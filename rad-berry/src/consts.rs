//! 通用常量.

/// mask 体素标签.
pub mod mask {
    /// ROI 之外的体素值.
    pub const BACKGROUND: u8 = 0;

    /// ROI 之内的体素值.
    pub const IN_REGION: u8 = 1;

    /// 体素是否在 ROI 内?
    #[inline]
    pub const fn is_in_region(p: u8) -> bool {
        p != BACKGROUND
    }

    /// 体素是否在 ROI 外?
    #[inline]
    pub const fn is_background(p: u8) -> bool {
        p == BACKGROUND
    }
}

/// 离散化灰度级体中, 区域外体素的保留值. 区域内灰度级从 1 起计.
pub const OUTSIDE_LEVEL: u16 = 0;

/// 特征族名. 作为特征键 `family_feature[_tag]` 的首段, 全库只在此处定义.
pub mod family {
    /// 一阶统计特征 (基于连续强度).
    pub const STAT: &str = "stat";

    /// 强度直方图特征 (基于离散化灰度级).
    pub const INT_HIST: &str = "ih";

    /// 强度-体积直方图特征.
    pub const INT_VOL_HIST: &str = "ivh";

    /// 形态学特征.
    pub const MORPH: &str = "morph";

    /// 灰度共生矩阵特征.
    pub const GLCM: &str = "glcm";

    /// 灰度游程矩阵特征.
    pub const GLRLM: &str = "glrlm";

    /// 灰度尺寸区矩阵特征.
    pub const GLSZM: &str = "glszm";

    /// 灰度距离区矩阵特征.
    pub const GLDZM: &str = "gldzm";

    /// 邻域灰度差矩阵特征.
    pub const NGTDM: &str = "ngtdm";
}
