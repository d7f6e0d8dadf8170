//! 灰度区大小矩阵 (grey level size zone matrix, GLSZM).
//!
//! zone 是同灰度级连通区, 由 [`label_zones`] 按参数集的连通性划分.
//! zone 大小可达区域体素数, 矩阵用稀疏映射 `(灰度级, 大小) -> 计数`
//! 保存, 迭代顺序确定. GLSZM 与方向无关, 不参与聚合方式切换.

use std::collections::BTreeMap;

use super::{label_zones, xlog2};
use crate::data::GreyVolume;
use crate::params::ParameterSet;

const NAMES: [&str; 16] = [
    "sze",
    "lze",
    "lgze",
    "hgze",
    "szlge",
    "szhge",
    "lzlge",
    "lzhge",
    "glnu",
    "glnu_norm",
    "zsnu",
    "zsnu_norm",
    "z_perc",
    "gl_var",
    "zs_var",
    "zs_entr",
];

/// 稀疏区大小矩阵.
#[derive(Debug, Clone)]
pub struct SizeZoneMatrix {
    counts: BTreeMap<(u16, usize), f64>,
    n_levels: usize,
}

impl SizeZoneMatrix {
    /// 按给定连通性划分 zone 并计数.
    pub fn from_grey(grey: &GreyVolume, params: &ParameterSet) -> Self {
        let mut counts = BTreeMap::new();
        for zone in label_zones(grey, params.connectivity) {
            *counts.entry((zone.level, zone.voxels.len())).or_insert(0.0) += 1.0;
        }
        Self {
            counts,
            n_levels: usize::from(grey.n_levels()),
        }
    }

    /// zone 总数.
    pub fn total(&self) -> f64 {
        self.counts.values().sum()
    }

    /// 16 个区大小特征. `n_region` 为区域体素数. 不足两个 zone 时
    /// 方差类特征为 NaN.
    pub fn features(&self, n_region: usize) -> Vec<(&'static str, f64)> {
        let total = self.total();
        if total <= 0.0 {
            return NAMES.iter().map(|k| (*k, f64::NAN)).collect();
        }

        let mut g_marginal = vec![0.0f64; self.n_levels];
        let mut s_marginal: BTreeMap<usize, f64> = BTreeMap::new();
        for ((lvl, size), v) in self.counts.iter() {
            g_marginal[usize::from(*lvl) - 1] += *v;
            *s_marginal.entry(*size).or_insert(0.0) += *v;
        }

        let mut sze = 0.0f64;
        let mut lze = 0.0;
        let mut zsnu = 0.0;
        for (s, v) in s_marginal.iter() {
            let ss = (s * s) as f64;
            sze += *v / ss;
            lze += *v * ss;
            zsnu += *v * *v;
        }
        let mut lgze = 0.0f64;
        let mut hgze = 0.0;
        let mut glnu = 0.0;
        for (i, v) in g_marginal.iter().enumerate() {
            let gg = ((i + 1) * (i + 1)) as f64;
            lgze += *v / gg;
            hgze += *v * gg;
            glnu += *v * *v;
        }

        let mut szlge = 0.0f64;
        let mut szhge = 0.0;
        let mut lzlge = 0.0;
        let mut lzhge = 0.0;
        let mut mu_g = 0.0;
        let mut mu_s = 0.0;
        let mut zs_entr = 0.0;
        for ((lvl, size), v) in self.counts.iter() {
            let gg = f64::from(*lvl) * f64::from(*lvl);
            let ss = (size * size) as f64;
            szlge += *v / (gg * ss);
            szhge += *v * gg / ss;
            lzlge += *v * ss / gg;
            lzhge += *v * gg * ss;
            let p = *v / total;
            mu_g += f64::from(*lvl) * p;
            mu_s += *size as f64 * p;
            zs_entr -= xlog2(p);
        }
        let mut gl_var = 0.0f64;
        let mut zs_var = 0.0;
        for ((lvl, size), v) in self.counts.iter() {
            let p = *v / total;
            gl_var += (f64::from(*lvl) - mu_g).powi(2) * p;
            zs_var += (*size as f64 - mu_s).powi(2) * p;
        }
        // 单个 zone 不构成离散度样本, 方差类记 NaN.
        if total < 2.0 {
            gl_var = f64::NAN;
            zs_var = f64::NAN;
        }

        vec![
            ("sze", sze / total),
            ("lze", lze / total),
            ("lgze", lgze / total),
            ("hgze", hgze / total),
            ("szlge", szlge / total),
            ("szhge", szhge / total),
            ("lzlge", lzlge / total),
            ("lzhge", lzhge / total),
            ("glnu", glnu / total),
            ("glnu_norm", glnu / (total * total)),
            ("zsnu", zsnu / total),
            ("zsnu_norm", zsnu / (total * total)),
            ("z_perc", total / n_region as f64),
            ("gl_var", gl_var),
            ("zs_var", zs_var),
            ("zs_entr", zs_entr),
        ]
    }
}

/// 计算区大小特征.
pub fn features(grey: &GreyVolume, params: &ParameterSet) -> Vec<(&'static str, f64)> {
    SizeZoneMatrix::from_grey(grey, params).features(grey.in_region_count())
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
    fn test_zone_matrix_hand_values() {
        // [1 1 2]
        // [2 2 3]: 26-连通下三个 zone: (1,2), (2,3), (3,1).
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 2, 3), vec![1, 1, 2, 2, 2, 3]).unwrap();
        let g = GreyVolume::new(grid, data, 3);
        let m = SizeZoneMatrix::from_grey(&g, &ParameterSet::default());
        float_eq(m.total(), 3.0, 1e-12);

        let fs = m.features(6);
        float_eq(get(&fs, "sze"), 49.0 / 108.0, 1e-12);
        float_eq(get(&fs, "lze"), 14.0 / 3.0, 1e-12);
        float_eq(get(&fs, "glnu"), 1.0, 1e-12);
        float_eq(get(&fs, "glnu_norm"), 1.0 / 3.0, 1e-12);
        float_eq(get(&fs, "zsnu"), 1.0, 1e-12);
        float_eq(get(&fs, "z_perc"), 0.5, 1e-12);
        float_eq(get(&fs, "gl_var"), 2.0 / 3.0, 1e-12);
        float_eq(get(&fs, "zs_var"), 2.0 / 3.0, 1e-12);
        float_eq(get(&fs, "zs_entr"), 3.0f64.log2(), 1e-12);
        float_eq(get(&fs, "hgze"), 14.0 / 3.0, 1e-12);
    }

    #[test]
    fn test_constant_region_single_zone() {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let g = GreyVolume::new(grid, Array3::from_elem((2, 2, 2), 1u16), 1);
        let fs = features(&g, &ParameterSet::default());
        float_eq(get(&fs, "z_perc"), 1.0 / 8.0, 1e-12);
        float_eq(get(&fs, "glnu"), 1.0, 1e-12);
        float_eq(get(&fs, "zs_entr"), 0.0, 1e-12);
        float_eq(get(&fs, "lze"), 64.0, 1e-12);
        // 单个 zone 没有离散度样本.
        assert!(get(&fs, "zs_var").is_nan());
        assert!(get(&fs, "gl_var").is_nan());
    }

    #[test]
    fn test_connectivity_changes_zones() {
        // 对角相触: 6-连通两个 zone, 26-连通一个.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 2, 2), vec![1, 0, 0, 1]).unwrap();
        let g = GreyVolume::new(grid, data, 1);
        let p6 = ParameterSet {
            connectivity: crate::params::Connectivity::C6,
            ..ParameterSet::default()
        };
        float_eq(SizeZoneMatrix::from_grey(&g, &p6).total(), 2.0, 1e-12);
        float_eq(
            SizeZoneMatrix::from_grey(&g, &ParameterSet::default()).total(),
            1.0,
            1e-12,
        );
    }
}
