//! 灰度离散化.
//!
//! 把再分割后的连续强度映射为从 1 起计的整数灰度级, 0 保留为区域外标记:
//!
//! - FBN (固定 bin 数 `n`): `level = 1 + floor(n * (x - min) / (max - min))`,
//!   上界 clamp 到 `n`; 区域内强度全部相同时一律取 1. 灰度级总数恒为 `n`.
//! - FBS (固定 bin 宽 `w`): `level = 1 + floor((x - lo) / w)`, 下沿 `lo`
//!   取再分割范围下界, 未配置范围时取区域内强度最小值.
//!   灰度级总数为实际出现的最大 level.
//!
//! 两种方案均为纯函数: 相同区域与参数产生逐位相同的结果.

use ndarray::Array3;
use num::ToPrimitive;

use crate::data::{GreyVolume, GridAttr};
use crate::params::{BinScheme, ParameterSet};
use crate::resegment::Region;

/// 对区域执行灰度离散化.
///
/// # 注意
///
/// FBS 在极小 bin 宽下, 灰度级数可能超出 `u16` 表示范围, 此时程序 panic.
pub fn discretize(region: &Region, params: &ParameterSet) -> GreyVolume {
    let positions = region.keep_positions();
    debug_assert!(!positions.is_empty());

    let volume = region.volume();
    let (min, max) = volume
        .min_max_of(positions.iter().copied())
        .expect("Region 不变式保证区域非空");

    let mut levels = Array3::zeros(volume.shape());
    let n_levels = match params.bin_scheme {
        BinScheme::FixedNumber(n) => {
            debug_assert!(n >= 1);
            let span = (max - min) as f64;
            for pos in &positions {
                let lvl = if span == 0.0 {
                    1
                } else {
                    let t = (volume[*pos] - min) as f64 / span;
                    ((n as f64 * t).floor() as u32 + 1).min(n as u32) as u16
                };
                levels[*pos] = lvl;
            }
            n
        }
        BinScheme::FixedSize(w) => {
            debug_assert!(w > 0.0);
            let lo = match params.resegment_range {
                Some((lo, _)) => lo,
                None => min as f64,
            };
            let mut top = 1u16;
            for pos in &positions {
                let raw = ((volume[*pos] as f64 - lo) / w).floor();
                // 浮点下沿抖动时守住最低灰度级 1.
                let lvl = (raw as i64 + 1)
                    .max(1)
                    .to_u16()
                    .expect("FBS 灰度级数超出 u16 范围");
                top = top.max(lvl);
                levels[*pos] = lvl;
            }
            top
        }
    };

    GreyVolume::new(*volume.grid(), levels, n_levels)
}
