//! 灰度游程矩阵 (grey level run length matrix, GLRLM).
//!
//! 游程是某方向上连续同灰度级的极大体素段. 对每个方向, 区域内每个
//! 体素恰好属于一个游程, 因此单方向矩阵满足 `sum_r r*R[g][r] = Nv`.
//! 构建时先找游程起点 (反方向邻居不是同灰度级的体素), 再沿方向
//! 前进统计长度.

use ndarray::Array2;

use super::{average_named, shift, xlog2, DIRECTIONS_13};
use crate::consts::OUTSIDE_LEVEL;
use crate::data::{GreyVolume, GridAttr};
use crate::params::{Aggregation, ParameterSet};
use crate::Off3d;

const NAMES: [&str; 16] = [
    "sre",
    "lre",
    "lgre",
    "hgre",
    "srlge",
    "srhge",
    "lrlge",
    "lrhge",
    "glnu",
    "glnu_norm",
    "rlnu",
    "rlnu_norm",
    "r_perc",
    "gl_var",
    "rl_var",
    "rl_entr",
];

/// 单方向或合并后的游程矩阵. 行 = 灰度级 - 1, 列 = 游程长度 - 1.
#[derive(Debug, Clone)]
pub struct RunLengthMatrix {
    counts: Array2<f64>,
    n_levels: usize,
}

impl RunLengthMatrix {
    /// 单方向游程矩阵.
    pub fn directed(grey: &GreyVolume, dir: Off3d) -> Self {
        let shape = grey.shape();
        let n = usize::from(grey.n_levels());
        // 游程长度不超过最长轴.
        let max_run = shape.0.max(shape.1).max(shape.2);
        let mut counts = Array2::<f64>::zeros((n, max_run));
        let back = (-dir.0, -dir.1, -dir.2);
        for (pos, lvl) in grey.levels().indexed_iter() {
            if *lvl == OUTSIDE_LEVEL {
                continue;
            }
            // 只在游程起点计数.
            let is_start = match shift(pos, back, shape) {
                Some(prev) => grey[prev] != *lvl,
                None => true,
            };
            if !is_start {
                continue;
            }
            let mut len = 1usize;
            let mut cur = pos;
            while let Some(next) = shift(cur, dir, shape) {
                if grey[next] != *lvl {
                    break;
                }
                len += 1;
                cur = next;
            }
            counts[(usize::from(*lvl) - 1, len - 1)] += 1.0;
        }
        Self { counts, n_levels: n }
    }

    /// 13 个方向的矩阵逐元素相加 (merged 聚合).
    pub fn merged(grey: &GreyVolume) -> Self {
        let n = usize::from(grey.n_levels());
        let shape = grey.shape();
        let max_run = shape.0.max(shape.1).max(shape.2);
        let mut counts = Array2::<f64>::zeros((n, max_run));
        for dir in DIRECTIONS_13.iter() {
            counts += &Self::directed(grey, *dir).counts;
        }
        Self { counts, n_levels: n }
    }

    /// 游程总数.
    #[inline]
    pub fn total(&self) -> f64 {
        self.counts.sum()
    }

    /// `sum_r r*R[g][r]`, 单方向矩阵下等于区域体素数.
    pub fn weighted_voxel_total(&self) -> f64 {
        self.counts
            .indexed_iter()
            .map(|((_, r), v)| (r + 1) as f64 * *v)
            .sum()
    }

    /// 16 个游程特征.
    ///
    /// `n_region` 为区域体素数, `n_dirs` 为矩阵累加的方向个数
    /// (单方向 1, merged 13), 两者只影响 run percentage 的分母.
    pub fn features(&self, n_region: usize, n_dirs: usize) -> Vec<(&'static str, f64)> {
        let total = self.total();
        if total <= 0.0 {
            return NAMES.iter().map(|k| (*k, f64::NAN)).collect();
        }

        let ng = self.n_levels;
        let max_run = self.counts.ncols();
        let mut g_marginal = vec![0.0f64; ng];
        let mut r_marginal = vec![0.0f64; max_run];
        for ((i, r), v) in self.counts.indexed_iter() {
            g_marginal[i] += *v;
            r_marginal[r] += *v;
        }

        let mut sre = 0.0f64;
        let mut lre = 0.0;
        let mut rlnu = 0.0;
        for (r, v) in r_marginal.iter().enumerate() {
            let rr = ((r + 1) * (r + 1)) as f64;
            sre += *v / rr;
            lre += *v * rr;
            rlnu += *v * *v;
        }
        let mut lgre = 0.0f64;
        let mut hgre = 0.0;
        let mut glnu = 0.0;
        for (i, v) in g_marginal.iter().enumerate() {
            let gg = ((i + 1) * (i + 1)) as f64;
            lgre += *v / gg;
            hgre += *v * gg;
            glnu += *v * *v;
        }

        let mut srlge = 0.0f64;
        let mut srhge = 0.0;
        let mut lrlge = 0.0;
        let mut lrhge = 0.0;
        let mut mu_g = 0.0;
        let mut mu_r = 0.0;
        let mut rl_entr = 0.0;
        for ((i, r), v) in self.counts.indexed_iter() {
            let gg = ((i + 1) * (i + 1)) as f64;
            let rr = ((r + 1) * (r + 1)) as f64;
            srlge += *v / (gg * rr);
            srhge += *v * gg / rr;
            lrlge += *v * rr / gg;
            lrhge += *v * gg * rr;
            let p = *v / total;
            mu_g += (i + 1) as f64 * p;
            mu_r += (r + 1) as f64 * p;
            rl_entr -= xlog2(p);
        }
        let mut gl_var = 0.0f64;
        let mut rl_var = 0.0;
        for ((i, r), v) in self.counts.indexed_iter() {
            let p = *v / total;
            gl_var += ((i + 1) as f64 - mu_g).powi(2) * p;
            rl_var += ((r + 1) as f64 - mu_r).powi(2) * p;
        }

        vec![
            ("sre", sre / total),
            ("lre", lre / total),
            ("lgre", lgre / total),
            ("hgre", hgre / total),
            ("srlge", srlge / total),
            ("srhge", srhge / total),
            ("lrlge", lrlge / total),
            ("lrhge", lrhge / total),
            ("glnu", glnu / total),
            ("glnu_norm", glnu / (total * total)),
            ("rlnu", rlnu / total),
            ("rlnu_norm", rlnu / (total * total)),
            ("r_perc", total / (n_region * n_dirs) as f64),
            ("gl_var", gl_var),
            ("rl_var", rl_var),
            ("rl_entr", rl_entr),
        ]
    }
}

/// 按参数集的聚合方式计算游程特征.
pub fn features(grey: &GreyVolume, params: &ParameterSet) -> Vec<(&'static str, f64)> {
    let n_region = grey.in_region_count();
    match params.aggregation {
        Aggregation::PerDirection => {
            let per_dir: Vec<_> = DIRECTIONS_13
                .iter()
                .map(|d| RunLengthMatrix::directed(grey, *d).features(n_region, 1))
                .collect();
            average_named(&per_dir)
        }
        Aggregation::Merged => {
            RunLengthMatrix::merged(grey).features(n_region, DIRECTIONS_13.len())
        }
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
    fn test_runs_cover_region_once() {
        let g = grey_fixture();
        for dir in DIRECTIONS_13.iter() {
            let m = RunLengthMatrix::directed(&g, *dir);
            float_eq(m.weighted_voxel_total(), 6.0, 1e-12);
        }
        // merged: 每个体素被 13 个方向各覆盖一次.
        float_eq(
            RunLengthMatrix::merged(&g).weighted_voxel_total(),
            6.0 * 13.0,
            1e-12,
        );
    }

    #[test]
    fn test_directed_hand_values() {
        let g = grey_fixture();
        // +w 方向: 游程 (1,len2), (2,len1), (2,len2), (3,len1).
        let m = RunLengthMatrix::directed(&g, (0, 0, 1));
        float_eq(m.total(), 4.0, 1e-12);
        let fs = m.features(6, 1);
        float_eq(get(&fs, "sre"), 0.625, 1e-12);
        float_eq(get(&fs, "lre"), 2.5, 1e-12);
        float_eq(get(&fs, "glnu"), 1.5, 1e-12);
        float_eq(get(&fs, "glnu_norm"), 0.375, 1e-12);
        float_eq(get(&fs, "rlnu"), 2.0, 1e-12);
        float_eq(get(&fs, "rlnu_norm"), 0.5, 1e-12);
        float_eq(get(&fs, "r_perc"), 4.0 / 6.0, 1e-12);
        float_eq(get(&fs, "hgre"), 4.5, 1e-12);
        float_eq(get(&fs, "lrhge"), 8.25, 1e-12);
        float_eq(get(&fs, "gl_var"), 0.5, 1e-12);
        float_eq(get(&fs, "rl_var"), 0.25, 1e-12);
        float_eq(get(&fs, "rl_entr"), 2.0, 1e-12);
    }

    #[test]
    fn test_run_interrupted_by_region_gap() {
        // [1 0 1]: 区域空洞切断游程, 得到两个长度 1 的游程.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let data = Array3::from_shape_vec((1, 1, 3), vec![1, 0, 1]).unwrap();
        let g = GreyVolume::new(grid, data, 1);
        let m = RunLengthMatrix::directed(&g, (0, 0, 1));
        float_eq(m.total(), 2.0, 1e-12);
        float_eq(m.weighted_voxel_total(), 2.0, 1e-12);
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
        let mrg = features(&g, &ParameterSet::default());
        assert_eq!(dir.len(), 16);
        assert_eq!(mrg.len(), 16);
        assert!(dir.iter().all(|(_, v)| v.is_finite()));
        assert!(mrg.iter().all(|(_, v)| v.is_finite()));
        // merged 的 run percentage 分母含方向数.
        assert!(get(&mrg, "r_perc") <= 1.0 + 1e-12);
    }
}
