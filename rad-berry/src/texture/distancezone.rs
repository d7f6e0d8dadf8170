//! 灰度区距离矩阵 (grey level distance zone matrix, GLDZM).
//!
//! zone 的划分与 GLSZM 完全一致, 但按 "zone 到 ROI 边界的最小距离"
//! 而非 zone 大小计数. 距离在形态学 mask 上用 city-block 度量,
//! 紧贴 ROI 边缘的体素距离为 1 (见 [`border_distance_map`]).
//!
//! 注意: 距离图以形态学 mask 为准, zone 以强度 (keep) mask 为准.
//! keep 是 morph 的子集, 保证每个 zone 体素都有距离值.

use std::collections::BTreeMap;

use super::{border_distance_map, label_zones, xlog2};
use crate::data::{GreyVolume, GridAttr, RoiMask};
use crate::params::ParameterSet;

const NAMES: [&str; 16] = [
    "sde",
    "lde",
    "lgze",
    "hgze",
    "sdlge",
    "sdhge",
    "ldlge",
    "ldhge",
    "glnu",
    "glnu_norm",
    "zdnu",
    "zdnu_norm",
    "z_perc",
    "gl_var",
    "zd_var",
    "zd_entr",
];

/// 稀疏区距离矩阵.
#[derive(Debug, Clone)]
pub struct DistanceZoneMatrix {
    counts: BTreeMap<(u16, u32), f64>,
    n_levels: usize,
}

impl DistanceZoneMatrix {
    /// 划分 zone, 对每个 zone 取其体素距离的最小值并计数.
    ///
    /// # 参数
    ///
    /// `morph` 与 `grey` 形状必须一致.
    pub fn from_grey(grey: &GreyVolume, morph: &RoiMask, params: &ParameterSet) -> Self {
        assert_eq!(
            grey.shape(),
            morph.shape(),
            "灰度体和形态学 mask 形状不一致"
        );
        let dist = border_distance_map(morph);
        let mut counts = BTreeMap::new();
        for zone in label_zones(grey, params.connectivity) {
            let d = zone
                .voxels
                .iter()
                .map(|pos| dist[*pos])
                .min()
                .expect("zone 至少含一个体素");
            debug_assert!(d >= 1, "keep mask 体素必须落在形态学 mask 内");
            *counts.entry((zone.level, d)).or_insert(0.0) += 1.0;
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

    /// 16 个区距离特征. `n_region` 为区域体素数. 不足两个 zone 时
    /// 方差类特征为 NaN.
    pub fn features(&self, n_region: usize) -> Vec<(&'static str, f64)> {
        let total = self.total();
        if total <= 0.0 {
            return NAMES.iter().map(|k| (*k, f64::NAN)).collect();
        }

        let mut g_marginal = vec![0.0f64; self.n_levels];
        let mut d_marginal: BTreeMap<u32, f64> = BTreeMap::new();
        for ((lvl, d), v) in self.counts.iter() {
            g_marginal[usize::from(*lvl) - 1] += *v;
            *d_marginal.entry(*d).or_insert(0.0) += *v;
        }

        let mut sde = 0.0f64;
        let mut lde = 0.0;
        let mut zdnu = 0.0;
        for (d, v) in d_marginal.iter() {
            let dd = f64::from(d * d);
            sde += *v / dd;
            lde += *v * dd;
            zdnu += *v * *v;
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

        let mut sdlge = 0.0f64;
        let mut sdhge = 0.0;
        let mut ldlge = 0.0;
        let mut ldhge = 0.0;
        let mut mu_g = 0.0;
        let mut mu_d = 0.0;
        let mut zd_entr = 0.0;
        for ((lvl, d), v) in self.counts.iter() {
            let gg = f64::from(*lvl) * f64::from(*lvl);
            let dd = f64::from(d * d);
            sdlge += *v / (gg * dd);
            sdhge += *v * gg / dd;
            ldlge += *v * dd / gg;
            ldhge += *v * gg * dd;
            let p = *v / total;
            mu_g += f64::from(*lvl) * p;
            mu_d += f64::from(*d) * p;
            zd_entr -= xlog2(p);
        }
        let mut gl_var = 0.0f64;
        let mut zd_var = 0.0;
        for ((lvl, d), v) in self.counts.iter() {
            let p = *v / total;
            gl_var += (f64::from(*lvl) - mu_g).powi(2) * p;
            zd_var += (f64::from(*d) - mu_d).powi(2) * p;
        }
        // 与 GLSZM 同规则: 单个 zone 的方差类记 NaN.
        if total < 2.0 {
            gl_var = f64::NAN;
            zd_var = f64::NAN;
        }

        vec![
            ("sde", sde / total),
            ("lde", lde / total),
            ("lgze", lgze / total),
            ("hgze", hgze / total),
            ("sdlge", sdlge / total),
            ("sdhge", sdhge / total),
            ("ldlge", ldlge / total),
            ("ldhge", ldhge / total),
            ("glnu", glnu / total),
            ("glnu_norm", glnu / (total * total)),
            ("zdnu", zdnu / total),
            ("zdnu_norm", zdnu / (total * total)),
            ("z_perc", total / n_region as f64),
            ("gl_var", gl_var),
            ("zd_var", zd_var),
            ("zd_entr", zd_entr),
        ]
    }
}

/// 计算区距离特征.
pub fn features(
    grey: &GreyVolume,
    morph: &RoiMask,
    params: &ParameterSet,
) -> Vec<(&'static str, f64)> {
    DistanceZoneMatrix::from_grey(grey, morph, params).features(grey.in_region_count())
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
    fn test_distance_zone_hand_values() {
        // 3x3x3 实心 ROI, 中心体素灰度级 2, 其余 1:
        // zone (1, 26 体素, d=1) 和 zone (2, 1 体素, d=2).
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let mut levels = Array3::from_elem((3, 3, 3), 1u16);
        levels[(1, 1, 1)] = 2;
        let g = GreyVolume::new(grid, levels, 2);
        let morph = RoiMask::from_shape_fn(grid, (3, 3, 3), |_| true);

        let m = DistanceZoneMatrix::from_grey(&g, &morph, &ParameterSet::default());
        float_eq(m.total(), 2.0, 1e-12);
        let fs = m.features(27);
        float_eq(get(&fs, "sde"), 0.625, 1e-12);
        float_eq(get(&fs, "lde"), 2.5, 1e-12);
        float_eq(get(&fs, "lgze"), 0.625, 1e-12);
        float_eq(get(&fs, "hgze"), 2.5, 1e-12);
        float_eq(get(&fs, "sdlge"), 17.0 / 32.0, 1e-12);
        float_eq(get(&fs, "sdhge"), 1.0, 1e-12);
        float_eq(get(&fs, "ldlge"), 1.0, 1e-12);
        float_eq(get(&fs, "ldhge"), 8.5, 1e-12);
        float_eq(get(&fs, "glnu"), 1.0, 1e-12);
        float_eq(get(&fs, "z_perc"), 2.0 / 27.0, 1e-12);
        float_eq(get(&fs, "gl_var"), 0.25, 1e-12);
        float_eq(get(&fs, "zd_var"), 0.25, 1e-12);
        float_eq(get(&fs, "zd_entr"), 1.0, 1e-12);
    }

    #[test]
    fn test_zone_count_matches_sizezone() {
        use crate::texture::sizezone::SizeZoneMatrix;

        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((2, 2, 3), vec![1, 2, 2, 0, 3, 1, 2, 2, 1, 1, 0, 3])
            .unwrap();
        let g = GreyVolume::new(grid, data.clone(), 3);
        let morph = RoiMask::from_shape_fn(grid, (2, 2, 3), |p| data[p] != 0);
        let params = ParameterSet::default();
        // 两族的 zone 划分一致, 总数必然相同.
        float_eq(
            DistanceZoneMatrix::from_grey(&g, &morph, &params).total(),
            SizeZoneMatrix::from_grey(&g, &params).total(),
            1e-12,
        );
    }

    #[test]
    fn test_single_voxel_variance_undefined() {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let g = GreyVolume::new(grid, Array3::from_elem((1, 1, 1), 1u16), 1);
        let morph = RoiMask::from_shape_fn(grid, (1, 1, 1), |_| true);
        let fs = features(&g, &morph, &ParameterSet::default());
        assert!(get(&fs, "zd_var").is_nan());
        assert!(get(&fs, "gl_var").is_nan());
        float_eq(get(&fs, "sde"), 1.0, 1e-12);
        float_eq(get(&fs, "z_perc"), 1.0, 1e-12);
    }

    #[test]
    fn test_thin_slab_distance_all_one() {
        // 单层 slab: 全部体素贴数据边界, 距离全为 1.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 2, 3), vec![1, 1, 2, 2, 2, 3]).unwrap();
        let g = GreyVolume::new(grid, data, 3);
        let morph = RoiMask::from_shape_fn(grid, (1, 2, 3), |_| true);
        let fs = features(&g, &morph, &ParameterSet::default());
        float_eq(get(&fs, "sde"), 1.0, 1e-12);
        float_eq(get(&fs, "lde"), 1.0, 1e-12);
        float_eq(get(&fs, "zd_var"), 0.0, 1e-12);
    }
}
