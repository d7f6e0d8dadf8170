//! 邻域灰度差矩阵 (neighbourhood grey tone difference matrix, NGTDM).
//!
//! 对每个区域内体素取其 26 邻域中区域内体素的灰度级均值, 按体素
//! 灰度级累计 "与邻域均值的绝对差". 没有任何区域内邻居的体素不参与
//! 统计; 全部体素都无邻居时五个特征均为 NaN.
//!
//! NGTDM 的邻域固定为 26-连通, 不随参数集的连通性变化.

use super::{connectivity_offsets, shift};
use crate::consts::OUTSIDE_LEVEL;
use crate::data::{GreyVolume, GridAttr};
use crate::params::Connectivity;

const NAMES: [&str; 5] = ["coarseness", "contrast", "busyness", "complexity", "strength"];

/// 邻域灰度差表: 各灰度级的参与体素数 `n_i` 与绝对差和 `s_i`.
#[derive(Debug, Clone)]
pub struct GreyToneDifference {
    n: Vec<f64>,
    s: Vec<f64>,
}

impl GreyToneDifference {
    /// 扫描区域内体素并累计差值表.
    pub fn from_grey(grey: &GreyVolume) -> Self {
        let shape = grey.shape();
        let ng = usize::from(grey.n_levels());
        let neighbourhood = connectivity_offsets(Connectivity::C26);
        let mut n = vec![0.0f64; ng];
        let mut s = vec![0.0f64; ng];
        for (pos, lvl) in grey.levels().indexed_iter() {
            if *lvl == OUTSIDE_LEVEL {
                continue;
            }
            let mut sum = 0.0f64;
            let mut cnt = 0usize;
            for off in neighbourhood.iter() {
                if let Some(next) = shift(pos, *off, shape) {
                    let other = grey[next];
                    if other != OUTSIDE_LEVEL {
                        sum += f64::from(other);
                        cnt += 1;
                    }
                }
            }
            if cnt == 0 {
                continue;
            }
            let i = usize::from(*lvl) - 1;
            n[i] += 1.0;
            s[i] += (f64::from(*lvl) - sum / cnt as f64).abs();
        }
        Self { n, s }
    }

    /// 参与统计的体素总数 `N_vc`.
    pub fn valid_count(&self) -> f64 {
        self.n.iter().sum()
    }

    /// 5 个邻域灰度差特征.
    pub fn features(&self) -> Vec<(&'static str, f64)> {
        let nvc = self.valid_count();
        if nvc <= 0.0 {
            return NAMES.iter().map(|k| (*k, f64::NAN)).collect();
        }

        let p: Vec<f64> = self.n.iter().map(|v| *v / nvc).collect();
        let s_total: f64 = self.s.iter().sum();
        let np = p.iter().filter(|v| **v > 0.0).count();

        let ps: f64 = p.iter().zip(self.s.iter()).map(|(a, b)| a * b).sum();
        let coarseness = if ps > 0.0 { 1.0 / ps } else { f64::NAN };

        let mut pair_sq = 0.0f64; // sum p_i p_j (i-j)^2
        let mut busy_denom = 0.0; // sum |i p_i - j p_j|
        let mut complexity = 0.0;
        let mut strength = 0.0;
        for (i, pi) in p.iter().enumerate() {
            if *pi <= 0.0 {
                continue;
            }
            for (j, pj) in p.iter().enumerate() {
                if *pj <= 0.0 {
                    continue;
                }
                let gi = (i + 1) as f64;
                let gj = (j + 1) as f64;
                let d2 = (gi - gj) * (gi - gj);
                pair_sq += *pi * *pj * d2;
                busy_denom += (gi * *pi - gj * *pj).abs();
                complexity += (gi - gj).abs() * (*pi * self.s[i] + *pj * self.s[j]) / (*pi + *pj);
                strength += (*pi + *pj) * d2;
            }
        }

        let contrast = if np > 1 {
            pair_sq / (np * (np - 1)) as f64 * (s_total / nvc)
        } else {
            f64::NAN
        };
        let busyness = if busy_denom > 0.0 {
            ps / busy_denom
        } else {
            f64::NAN
        };
        let strength = if s_total > 0.0 {
            strength / s_total
        } else {
            f64::NAN
        };

        vec![
            ("coarseness", coarseness),
            ("contrast", contrast),
            ("busyness", busyness),
            ("complexity", complexity / nvc),
            ("strength", strength),
        ]
    }
}

/// 计算邻域灰度差特征.
pub fn features(grey: &GreyVolume) -> Vec<(&'static str, f64)> {
    GreyToneDifference::from_grey(grey).features()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelGrid;
    use ndarray::Array3;

    fn float_eq(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    fn get(fs: &[(&'static str, f64)], key: &str) -> f64 {
        fs.iter().find(|(k, _)| *k == key).unwrap().1
    }

    #[test]
    fn test_hand_values() {
        // [1 1]
        // [1 2]: n_1 = 3 (每个差 1/3), n_2 = 1 (差 1).
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 2, 2), vec![1, 1, 1, 2]).unwrap();
        let g = GreyVolume::new(grid, data, 2);
        let t = GreyToneDifference::from_grey(&g);
        float_eq(t.valid_count(), 4.0, 1e-12);
        float_eq(t.s[0], 1.0, 1e-12);
        float_eq(t.s[1], 1.0, 1e-12);

        let fs = t.features();
        float_eq(get(&fs, "coarseness"), 1.0, 1e-12);
        float_eq(get(&fs, "contrast"), 0.09375, 1e-12);
        float_eq(get(&fs, "busyness"), 2.0, 1e-12);
        float_eq(get(&fs, "complexity"), 0.5, 1e-12);
        float_eq(get(&fs, "strength"), 1.0, 1e-12);
    }

    #[test]
    fn test_constant_region() {
        // 均匀区域: 差值全 0, coarseness/contrast/busyness/strength
        // 无定义, complexity 为 0.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let g = GreyVolume::new(grid, Array3::from_elem((2, 2, 2), 1u16), 1);
        let fs = features(&g);
        assert!(get(&fs, "coarseness").is_nan());
        assert!(get(&fs, "contrast").is_nan());
        assert!(get(&fs, "busyness").is_nan());
        assert!(get(&fs, "strength").is_nan());
        float_eq(get(&fs, "complexity"), 0.0, 1e-12);
    }

    #[test]
    fn test_isolated_voxels_excluded() {
        // 单体素区域: 无邻居, 全部特征 NaN.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let mut data = Array3::from_elem((1, 1, 1), 0u16);
        data[(0, 0, 0)] = 1;
        let g = GreyVolume::new(grid, data, 1);
        let fs = features(&g);
        assert_eq!(fs.len(), 5);
        assert!(fs.iter().all(|(_, v)| v.is_nan()));

        // 两个互不相邻的体素: 同样各自无邻居.
        let mut data = Array3::from_elem((1, 1, 5), 0u16);
        data[(0, 0, 0)] = 1;
        data[(0, 0, 4)] = 1;
        let g = GreyVolume::new(grid, data, 1);
        assert!(features(&g).iter().all(|(_, v)| v.is_nan()));
    }
}
