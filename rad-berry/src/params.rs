//! 特征提取参数集.
//!
//! [`ParameterSet`] 描述一个提取单元的全部可配置行为: 重采样目标与插值方式,
//! 再分割规则, 离散化方案, 滤波器列表与纹理矩阵口径.
//! 同一参数集 + 同一输入必然产生逐位相同的特征输出.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 将参数值嵌入 tag 时的确定性格式化: `2.0 -> "2"`, `0.5 -> "0p5"`,
/// `-1.5 -> "m1p5"`. 输出只含 `[0-9a-z]`, 可安全用于特征键与文件名.
fn fmt_num(v: f64) -> String {
    format!("{v}").replace('.', "p").replace('-', "m")
}

/// 重采样插值方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Interpolation {
    /// 最近邻.
    Nearest,

    /// 三线性.
    Linear,

    /// 三三次 (Keys 卷积核, `a = -1/2`).
    Cubic,
}

impl Interpolation {
    /// 短标签, 用于参数集 id.
    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            Interpolation::Nearest => "nea",
            Interpolation::Linear => "lin",
            Interpolation::Cubic => "cub",
        }
    }
}

/// 灰度离散化方案.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BinScheme {
    /// 固定 bin 数 (FBN): 参数为区域内灰度级总数, 必须不小于 1.
    FixedNumber(u16),

    /// 固定 bin 宽 (FBS): 参数为单个 bin 的强度宽度, 必须为有限正数.
    FixedSize(f64),
}

impl BinScheme {
    /// 短标签, 如 `fbn32` / `fbs0p5`.
    pub fn tag(&self) -> String {
        match self {
            BinScheme::FixedNumber(n) => format!("fbn{n}"),
            BinScheme::FixedSize(w) => format!("fbs{}", fmt_num(*w)),
        }
    }
}

/// 纹理矩阵的方向聚合口径.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Aggregation {
    /// 每个方向独立建矩阵并算特征, 最后对特征值取算术平均.
    PerDirection,

    /// 所有方向的计数合入同一矩阵后算一次特征.
    Merged,
}

impl Aggregation {
    /// 短标签, 用于参数集 id.
    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            Aggregation::PerDirection => "dir",
            Aggregation::Merged => "mrg",
        }
    }
}

/// 三维邻域连通性. 区域增长 (GLSZM/GLDZM 的 zone 划分) 使用.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Connectivity {
    /// 面相邻.
    C6,

    /// 面 + 棱相邻.
    C18,

    /// 面 + 棱 + 角相邻.
    C26,
}

impl Connectivity {
    /// 邻域内的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        match self {
            Connectivity::C6 => 6,
            Connectivity::C18 => 18,
            Connectivity::C26 => 26,
        }
    }

    /// 短标签, 用于参数集 id.
    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            Connectivity::C6 => "c6",
            Connectivity::C18 => "c18",
            Connectivity::C26 => "c26",
        }
    }
}

/// 平稳小波变换的小波基.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WaveletKind {
    /// Haar (db1).
    Haar,

    /// Daubechies-2.
    Db2,
}

impl WaveletKind {
    /// 短标签, 用于滤波 tag.
    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            WaveletKind::Haar => "haar",
            WaveletKind::Db2 => "db2",
        }
    }
}

/// 小波子带中单个轴向的通带选择.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Band {
    /// 低通.
    Low,

    /// 高通.
    High,
}

impl Band {
    /// 子带字符, `'l'` 或 `'h'`.
    #[inline]
    pub fn as_char(&self) -> char {
        match self {
            Band::Low => 'l',
            Band::High => 'h',
        }
    }
}

/// 空间滤波器及其参数. 所有尺寸类参数以毫米为单位,
/// 转换到体素域时除以对应轴的体素间距.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FilterSpec {
    /// 均值盒滤波. `support` 为每个轴上的核宽 (体素数), 必须为正奇数.
    Mean {
        /// 每个轴上的核宽, 体素数.
        support: usize,
    },

    /// 高斯-拉普拉斯 (LoG). `sigma_mm` 为高斯尺度, `cutoff`
    /// 为核截断半径 (单位 sigma), 常用值 4.0.
    Log {
        /// 高斯尺度, 毫米.
        sigma_mm: f64,

        /// 核截断半径, 单位 sigma.
        cutoff: f64,
    },

    /// 平稳 (非抽取) 小波变换的单个子带.
    /// `subband` 按 `(z, h, w)` 轴序给出各轴通带.
    Wavelet {
        /// 小波基.
        kind: WaveletKind,

        /// 分解级数, 从 1 起计. 第 `n` 级使用 `2^(n-1) - 1` 零插值 (a trous).
        level: u8,

        /// 各轴通带, `(z, h, w)` 轴序.
        subband: [Band; 3],
    },

    /// 逐水平切片的 2D 实值 Gabor 滤波.
    Gabor {
        /// 高斯包络尺度, 毫米.
        sigma_mm: f64,

        /// 载波波长, 毫米.
        lambda_mm: f64,

        /// 包络纵横比 (gamma).
        gamma: f64,

        /// 载波方向相对 w 轴的夹角, 度.
        theta_deg: f64,
    },
}

impl FilterSpec {
    /// 滤波器 tag. 附加在该滤波结果所产生的全部特征键之后,
    /// 保证不同滤波器的特征互不同名.
    pub fn tag(&self) -> String {
        match self {
            FilterSpec::Mean { support } => format!("mean{support}"),
            FilterSpec::Log { sigma_mm, .. } => format!("log{}", fmt_num(*sigma_mm)),
            FilterSpec::Wavelet {
                kind,
                level,
                subband,
            } => {
                let code: String = subband.iter().map(Band::as_char).collect();
                format!("wav{}l{level}{code}", kind.tag())
            }
            FilterSpec::Gabor {
                sigma_mm,
                lambda_mm,
                theta_deg,
                ..
            } => format!(
                "gab{}w{}t{}",
                fmt_num(*sigma_mm),
                fmt_num(*lambda_mm),
                fmt_num(*theta_deg)
            ),
        }
    }

    /// 滤波器参数是否合法?
    pub fn is_valid(&self) -> bool {
        match self {
            FilterSpec::Mean { support } => *support >= 1 && support % 2 == 1,
            FilterSpec::Log { sigma_mm, cutoff } => {
                sigma_mm.is_finite() && *sigma_mm > 0.0 && cutoff.is_finite() && *cutoff > 0.0
            }
            FilterSpec::Wavelet { level, .. } => *level >= 1,
            FilterSpec::Gabor {
                sigma_mm,
                lambda_mm,
                gamma,
                theta_deg,
            } => {
                sigma_mm.is_finite()
                    && *sigma_mm > 0.0
                    && lambda_mm.is_finite()
                    && *lambda_mm > 0.0
                    && gamma.is_finite()
                    && *gamma > 0.0
                    && theta_deg.is_finite()
            }
        }
    }
}

/// 单个提取单元的完整参数集.
///
/// 所有字段公开, 可以直接构造; [`ParameterSet::checked`]
/// 提供一致性检查. 字段含义见各自文档.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterSet {
    /// 重采样目标间距, 毫米, `(z, h, w)` 轴序. `None` 表示不重采样.
    pub resample_spacing: Option<[f64; 3]>,

    /// 强度体的重采样插值方式. mask 始终走
    /// 最近邻 (当该值为 `Nearest` 时) 或线性 + 0.5 阈值.
    pub interpolation: Interpolation,

    /// 强度再分割闭区间 `[lo, hi]`. `None` 表示不做范围裁剪.
    pub resegment_range: Option<(f64, f64)>,

    /// 离群剔除的标准差倍数 (保留 `[mu - k*sigma, mu + k*sigma]`).
    /// `None` 表示不剔除.
    pub outlier_sigma: Option<f64>,

    /// 灰度离散化方案.
    pub bin_scheme: BinScheme,

    /// 空间滤波器列表. 每个滤波器都会产生一组带 tag 的派生特征.
    pub filters: Vec<FilterSpec>,

    /// 纹理矩阵的方向聚合口径 (GLCM / GLRLM).
    pub aggregation: Aggregation,

    /// zone 划分 (GLSZM / GLDZM) 的邻域连通性.
    pub connectivity: Connectivity,

    /// GLCM 的体素对距离 (Chebyshev), 体素数, 必须不小于 1.
    pub glcm_distance: usize,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            resample_spacing: None,
            interpolation: Interpolation::Linear,
            resegment_range: None,
            outlier_sigma: None,
            bin_scheme: BinScheme::FixedNumber(32),
            filters: Vec::new(),
            aggregation: Aggregation::Merged,
            connectivity: Connectivity::C26,
            glcm_distance: 1,
        }
    }
}

impl ParameterSet {
    /// 参数集是否自洽?
    pub fn is_valid(&self) -> bool {
        if let Some(sp) = &self.resample_spacing {
            if sp.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return false;
            }
        }
        if let Some((lo, hi)) = &self.resegment_range {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return false;
            }
        }
        if let Some(k) = &self.outlier_sigma {
            if !k.is_finite() || *k <= 0.0 {
                return false;
            }
        }
        let bin_ok = match self.bin_scheme {
            BinScheme::FixedNumber(n) => n >= 1,
            BinScheme::FixedSize(w) => w.is_finite() && w > 0.0,
        };
        bin_ok && self.glcm_distance >= 1 && self.filters.iter().all(FilterSpec::is_valid)
    }

    /// 一致性检查. 合法时返回 `Some(self)`, 否则返回 `None`.
    #[inline]
    pub fn checked(self) -> Option<ParameterSet> {
        self.is_valid().then_some(self)
    }

    /// 参数集的确定性短 id. 只覆盖影响主路径的字段
    /// (滤波器由各自的特征 tag 区分, 不计入 id).
    pub fn id(&self) -> String {
        let sp = match &self.resample_spacing {
            Some([z, h, w]) => format!("{}x{}x{}", fmt_num(*z), fmt_num(*h), fmt_num(*w)),
            None => "native".to_owned(),
        };
        format!(
            "{sp}-{}-{}-{}-{}-d{}",
            self.interpolation.tag(),
            self.bin_scheme.tag(),
            self.aggregation.tag(),
            self.connectivity.tag(),
            self.glcm_distance
        )
    }
}
