//! 灰度共生矩阵 (grey level co-occurrence matrix, GLCM).
//!
//! 矩阵统计相距给定偏移的体素对的灰度级组合. 先按单方向构建有向
//! 计数矩阵 (行 = 起点灰度级, 列 = 终点灰度级), 其总和等于该方向上
//! 两端都落在区域内的有序体素对数; 特征在对称化 (或按方向合并) 后
//! 的归一化矩阵上计算.
//!
//! 特征集与记号沿用 IBSI (Zwanenburg et al., Radiology 2020) 的
//! 共生矩阵一节, 灰度级取值 `1..=Ng`, `Ng` 为离散化的名义级数.

use ndarray::Array2;

use super::{average_named, scaled, shift, xlog2, DIRECTIONS_13};
use crate::consts::OUTSIDE_LEVEL;
use crate::data::{GreyVolume, GridAttr};
use crate::params::{Aggregation, ParameterSet};
use crate::Off3d;

/// 特征名, 与输出顺序一致.
const NAMES: [&str; 25] = [
    "joint_max",
    "joint_avg",
    "joint_var",
    "joint_entr",
    "diff_avg",
    "diff_var",
    "diff_entr",
    "sum_avg",
    "sum_var",
    "sum_entr",
    "energy",
    "contrast",
    "dissimilarity",
    "inv_diff",
    "inv_diff_norm",
    "inv_diff_mom",
    "inv_diff_mom_norm",
    "inv_var",
    "corr",
    "auto_corr",
    "clust_tend",
    "clust_shade",
    "clust_prom",
    "info_corr1",
    "info_corr2",
];

/// 单个 (对称化或合并后的) 共生矩阵.
#[derive(Debug, Clone)]
pub struct CooccurrenceMatrix {
    counts: Array2<f64>,
    n_levels: usize,
}

impl CooccurrenceMatrix {
    /// 单方向有向计数矩阵. 只统计两端都在区域内的有序对.
    pub fn directed(grey: &GreyVolume, off: Off3d) -> Self {
        let shape = grey.shape();
        let n = usize::from(grey.n_levels());
        let mut counts = Array2::<f64>::zeros((n, n));
        for (pos, lvl) in grey.levels().indexed_iter() {
            if *lvl == OUTSIDE_LEVEL {
                continue;
            }
            if let Some(next) = shift(pos, off, shape) {
                let other = grey[next];
                if other != OUTSIDE_LEVEL {
                    counts[(usize::from(*lvl) - 1, usize::from(other) - 1)] += 1.0;
                }
            }
        }
        Self { counts, n_levels: n }
    }

    /// 单方向对称矩阵: 有向矩阵与其转置之和.
    pub fn symmetric(grey: &GreyVolume, off: Off3d) -> Self {
        let directed = Self::directed(grey, off);
        let counts = &directed.counts + &directed.counts.t();
        Self {
            counts,
            n_levels: directed.n_levels,
        }
    }

    /// 13 个方向的对称矩阵逐元素相加 (merged 聚合).
    pub fn merged(grey: &GreyVolume, distance: usize) -> Self {
        let n = usize::from(grey.n_levels());
        let mut counts = Array2::<f64>::zeros((n, n));
        for dir in DIRECTIONS_13.iter() {
            counts += &Self::symmetric(grey, scaled(*dir, distance)).counts;
        }
        Self { counts, n_levels: n }
    }

    /// 计数总和.
    #[inline]
    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    /// 25 个共生特征.
    ///
    /// 空矩阵 (区域内不存在有效体素对) 时全部特征为 NaN.
    pub fn features(&self) -> Vec<(&'static str, f64)> {
        let total = self.total();
        if total <= 0.0 {
            return NAMES.iter().map(|k| (*k, f64::NAN)).collect();
        }

        let ng = self.n_levels;
        let p = self.counts.mapv(|c| c / total);

        // 边缘分布与差/和分布.
        let mut px = vec![0.0f64; ng];
        let mut p_diff = vec![0.0f64; ng];
        let mut p_sum = vec![0.0f64; 2 * ng - 1]; // k = i + j - 2
        for ((i, j), v) in p.indexed_iter() {
            px[i] += *v;
            p_diff[i.abs_diff(j)] += *v;
            p_sum[i + j] += *v;
        }

        let mu: f64 = p
            .indexed_iter()
            .map(|((i, _), v)| (i + 1) as f64 * *v)
            .sum();
        let sigma2: f64 = px
            .iter()
            .enumerate()
            .map(|(i, v)| ((i + 1) as f64 - mu).powi(2) * *v)
            .sum();

        let mut joint_max = 0.0f64;
        let mut joint_var = 0.0;
        let mut joint_entr = 0.0;
        let mut energy = 0.0;
        let mut contrast = 0.0;
        let mut dissimilarity = 0.0;
        let mut inv_diff = 0.0;
        let mut inv_diff_norm = 0.0;
        let mut inv_diff_mom = 0.0;
        let mut inv_diff_mom_norm = 0.0;
        let mut inv_var = 0.0;
        let mut cov = 0.0;
        let mut auto_corr = 0.0;
        let mut clust_tend = 0.0;
        let mut clust_shade = 0.0;
        let mut clust_prom = 0.0;
        let mut hxy1 = 0.0;
        for ((i, j), v) in p.indexed_iter() {
            let v = *v;
            let gi = (i + 1) as f64;
            let gj = (j + 1) as f64;
            let d = gi - gj;
            joint_max = joint_max.max(v);
            joint_var += (gi - mu).powi(2) * v;
            joint_entr -= xlog2(v);
            energy += v * v;
            contrast += d * d * v;
            dissimilarity += d.abs() * v;
            inv_diff += v / (1.0 + d.abs());
            inv_diff_norm += v / (1.0 + d.abs() / ng as f64);
            inv_diff_mom += v / (1.0 + d * d);
            inv_diff_mom_norm += v / (1.0 + d * d / (ng * ng) as f64);
            if i != j {
                inv_var += v / (d * d);
            }
            cov += (gi - mu) * (gj - mu) * v;
            auto_corr += gi * gj * v;
            let s = gi + gj - 2.0 * mu;
            clust_tend += s.powi(2) * v;
            clust_shade += s.powi(3) * v;
            clust_prom += s.powi(4) * v;
            if v > 0.0 {
                hxy1 -= v * (px[i] * px[j]).log2();
            }
        }

        let diff_avg: f64 = p_diff
            .iter()
            .enumerate()
            .map(|(k, v)| k as f64 * *v)
            .sum();
        let diff_var: f64 = p_diff
            .iter()
            .enumerate()
            .map(|(k, v)| (k as f64 - diff_avg).powi(2) * *v)
            .sum();
        let diff_entr: f64 = -p_diff.iter().map(|v| xlog2(*v)).sum::<f64>();
        let sum_avg: f64 = p_sum
            .iter()
            .enumerate()
            .map(|(k, v)| (k + 2) as f64 * *v)
            .sum();
        let sum_var: f64 = p_sum
            .iter()
            .enumerate()
            .map(|(k, v)| ((k + 2) as f64 - sum_avg).powi(2) * *v)
            .sum();
        let sum_entr: f64 = -p_sum.iter().map(|v| xlog2(*v)).sum::<f64>();

        let corr = if sigma2 > 0.0 { cov / sigma2 } else { f64::NAN };

        // 信息相关度. 对称矩阵下两个边缘分布相同.
        let hx: f64 = -px.iter().map(|v| xlog2(*v)).sum::<f64>();
        let hxy2: f64 = -px
            .iter()
            .flat_map(|a| px.iter().map(move |b| a * b))
            .map(xlog2)
            .sum::<f64>();
        let info_corr1 = if hx > 0.0 {
            (joint_entr - hxy1) / hx
        } else {
            f64::NAN
        };
        let info_corr2 = (1.0 - (-2.0 * (hxy2 - joint_entr)).exp()).max(0.0).sqrt();

        vec![
            ("joint_max", joint_max),
            ("joint_avg", mu),
            ("joint_var", joint_var),
            ("joint_entr", joint_entr),
            ("diff_avg", diff_avg),
            ("diff_var", diff_var),
            ("diff_entr", diff_entr),
            ("sum_avg", sum_avg),
            ("sum_var", sum_var),
            ("sum_entr", sum_entr),
            ("energy", energy),
            ("contrast", contrast),
            ("dissimilarity", dissimilarity),
            ("inv_diff", inv_diff),
            ("inv_diff_norm", inv_diff_norm),
            ("inv_diff_mom", inv_diff_mom),
            ("inv_diff_mom_norm", inv_diff_mom_norm),
            ("inv_var", inv_var),
            ("corr", corr),
            ("auto_corr", auto_corr),
            ("clust_tend", clust_tend),
            ("clust_shade", clust_shade),
            ("clust_prom", clust_prom),
            ("info_corr1", info_corr1),
            ("info_corr2", info_corr2),
        ]
    }
}

/// 按参数集的聚合方式计算共生特征.
pub fn features(grey: &GreyVolume, params: &ParameterSet) -> Vec<(&'static str, f64)> {
    match params.aggregation {
        Aggregation::PerDirection => {
            let per_dir: Vec<_> = DIRECTIONS_13
                .iter()
                .map(|d| {
                    CooccurrenceMatrix::symmetric(grey, scaled(*d, params.glcm_distance)).features()
                })
                .collect();
            average_named(&per_dir)
        }
        Aggregation::Merged => CooccurrenceMatrix::merged(grey, params.glcm_distance).features(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelGrid;
    use ndarray::Array3;

    fn float_eq(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    fn grey_fixture() -> GreyVolume {
        // [1 1 2]
        // [2 2 3]
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 2, 3), vec![1, 1, 2, 2, 2, 3]).unwrap();
        GreyVolume::new(grid, data, 3)
    }

    fn get(fs: &[(&'static str, f64)], key: &str) -> f64 {
        fs.iter().find(|(k, _)| *k == key).unwrap().1
    }

    #[test]
    fn test_directed_pair_conservation() {
        let g = grey_fixture();
        // 沿 +w: 最右一列 2 个体素无配对, 有向对数 = 6 - 2.
        let m = CooccurrenceMatrix::directed(&g, (0, 0, 1));
        float_eq(m.total(), 4.0, 1e-12);
        // 对称化翻倍.
        let s = CooccurrenceMatrix::symmetric(&g, (0, 0, 1));
        float_eq(s.total(), 8.0, 1e-12);
    }

    #[test]
    fn test_symmetric_features_hand_values() {
        let g = grey_fixture();
        let fs = CooccurrenceMatrix::symmetric(&g, (0, 0, 1)).features();
        float_eq(get(&fs, "joint_max"), 0.25, 1e-12);
        float_eq(get(&fs, "joint_avg"), 1.75, 1e-12);
        float_eq(get(&fs, "contrast"), 0.5, 1e-12);
        float_eq(get(&fs, "energy"), 0.1875, 1e-12);
        float_eq(get(&fs, "joint_entr"), 2.5, 1e-12);
        float_eq(get(&fs, "diff_avg"), 0.5, 1e-12);
        float_eq(get(&fs, "sum_avg"), 3.5, 1e-12);
        float_eq(get(&fs, "auto_corr"), 3.25, 1e-12);
        // cov = 3.25 - 1.75^2, sigma^2 = 0.4375.
        float_eq(get(&fs, "corr"), 0.1875 / 0.4375, 1e-12);
        // sum_avg = 2 * joint_avg 是对称矩阵的恒等式.
        float_eq(get(&fs, "sum_avg"), 2.0 * get(&fs, "joint_avg"), 1e-12);
    }

    #[test]
    fn test_single_level_degenerates() {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 1, 4), vec![1, 1, 1, 1]).unwrap();
        let g = GreyVolume::new(grid, data, 1);
        let fs = CooccurrenceMatrix::symmetric(&g, (0, 0, 1)).features();
        float_eq(get(&fs, "joint_max"), 1.0, 1e-12);
        float_eq(get(&fs, "contrast"), 0.0, 1e-12);
        assert!(get(&fs, "corr").is_nan());
        assert!(get(&fs, "info_corr1").is_nan());
    }

    #[test]
    fn test_empty_matrix_is_nan() {
        // 单体素: 任何方向都无配对.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 1, 1), vec![1]).unwrap();
        let g = GreyVolume::new(grid, data, 1);
        let fs = CooccurrenceMatrix::symmetric(&g, (0, 0, 1)).features();
        assert_eq!(fs.len(), 25);
        assert!(fs.iter().all(|(_, v)| v.is_nan()));
    }

    #[test]
    fn test_aggregation_modes() {
        let g = grey_fixture();
        let dir = features(
            &g,
            &ParameterSet {
                aggregation: Aggregation::PerDirection,
                ..ParameterSet::default()
            },
        );
        let mrg = features(
            &g,
            &ParameterSet {
                aggregation: Aggregation::Merged,
                ..ParameterSet::default()
            },
        );
        assert_eq!(dir.len(), 25);
        assert_eq!(mrg.len(), 25);
        // 两种聚合的名字集合一致.
        for ((ka, _), (kb, _)) in dir.iter().zip(mrg.iter()) {
            assert_eq!(ka, kb);
        }
        // 平面 fixture 下部分方向无配对 (NaN 参与平均), 合并矩阵仍有限.
        assert!(get(&mrg, "joint_entr").is_finite());
    }

    #[test]
    fn test_distance_scaling() {
        // [1 1 1 2 2 2]: 距离 3 时, (1,2) 组合占多数.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 1, 6), vec![1, 1, 1, 2, 2, 2]).unwrap();
        let g = GreyVolume::new(grid, data, 2);
        let m = CooccurrenceMatrix::directed(&g, (0, 0, 3));
        // (1,2) 对 3 个: 下标 0->3, 1->4, 2->5.
        float_eq(m.total(), 3.0, 1e-12);
        // 对称化后 (1,2) 与 (2,1) 各占一半.
        let fs = CooccurrenceMatrix::symmetric(&g, (0, 0, 3)).features();
        float_eq(get(&fs, "joint_max"), 0.5, 1e-12);
        float_eq(get(&fs, "contrast"), 1.0, 1e-12);
    }
}
