//! 形态学特征.
//!
//! 全族采用体素近似 (不做网格重建): 体积为体素计数乘体素体积,
//! 表面积按暴露面计数 (面积取该面两个跨度方向的间距之积), 最大
//! 直径与 PCA 轴长在体素中心的世界坐标上计算. 网格重建版本是
//! 后续工作, 不与体素近似混用.
//!
//! 形态学 mask 与强度 mask 的分工: 计数/表面/直径/PCA 用形态学
//! mask, 强度加权质心用强度 mask. 单体素区域下体积/表面积有定义,
//! 方差类与轴比特征为 NaN.

use std::f64::consts::PI;

use num::Float;

use crate::consts::mask::is_in_region;
use crate::data::{GridAttr, RoiMask};
use crate::params::Connectivity;
use crate::resegment::Region;
use crate::texture::{connectivity_offsets, shift};
use crate::{Idx3d, Off3d};

/// 对称 3x3 矩阵的特征值, 升序返回. 三角法闭式求解.
///
/// ref: Smith, "Eigenvalues of a symmetric 3x3 matrix", CACM 1961.
fn sym_eigen3<T: Float>(a: [[T; 3]; 3]) -> [T; 3] {
    // f64 字面量到 T 的转换不会失败.
    let c = |v: f64| T::from(v).expect("浮点常量可表示");
    let two = c(2.0);

    let p1 = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
    if p1 == T::zero() {
        // 已是对角阵.
        let mut d = [a[0][0], a[1][1], a[2][2]];
        d.sort_by(|x, y| x.partial_cmp(y).expect("对角元素有限"));
        return d;
    }

    let q = (a[0][0] + a[1][1] + a[2][2]) / c(3.0);
    let p2 = (a[0][0] - q) * (a[0][0] - q)
        + (a[1][1] - q) * (a[1][1] - q)
        + (a[2][2] - q) * (a[2][2] - q)
        + two * p1;
    let p = (p2 / c(6.0)).sqrt();

    // b = (a - q I) / p, r = det(b) / 2 落在 [-1, 1] (浮点误差下需夹取).
    let mut b = a;
    for i in 0..3 {
        b[i][i] = b[i][i] - q;
    }
    let det = b[0][0] * (b[1][1] * b[2][2] - b[1][2] * b[2][1])
        - b[0][1] * (b[1][0] * b[2][2] - b[1][2] * b[2][0])
        + b[0][2] * (b[1][0] * b[2][1] - b[1][1] * b[2][0]);
    let det = det / (p * p * p);
    let r = (det / two).max(-T::one()).min(T::one());

    let phi = r.acos() / c(3.0);
    let e1 = q + two * p * phi.cos();
    let e3 = q + two * p * (phi + c(2.0 * PI / 3.0)).cos();
    let e2 = c(3.0) * q - e1 - e3;
    [e3, e2, e1]
}

/// 体素面朝向: 轴序号与对应暴露面的面积.
fn face_areas(spacing: [f64; 3]) -> [f64; 3] {
    let [sz, sh, sw] = spacing;
    [sh * sw, sz * sw, sz * sh]
}

/// 形态学 mask 的边界体素 (至少一个 6-邻域面暴露).
fn border_positions(morph: &RoiMask) -> Vec<Idx3d> {
    let shape = morph.shape();
    morph
        .positions()
        .into_iter()
        .filter(|pos| {
            connectivity_offsets(Connectivity::C6)
                .iter()
                .any(|off| match shift(*pos, *off, shape) {
                    None => true,
                    Some(next) => !is_in_region(morph[next]),
                })
        })
        .collect()
}

/// 16 个形态学特征.
pub fn morph_features(region: &Region) -> Vec<(&'static str, f64)> {
    let morph = region.morph_mask();
    let grid = *morph.grid();
    let spacing = grid.spacing();
    let shape = morph.shape();

    let positions = morph.positions();
    let n = positions.len() as f64;
    debug_assert!(n >= 1.0, "Region 不变式保证形态学 mask 非空");

    let vox_vol = spacing[0] * spacing[1] * spacing[2];
    let vol = n * vox_vol;

    // 暴露面表面积.
    let faces = face_areas(spacing);
    let axis_offsets: [(Off3d, Off3d); 3] = [
        ((1, 0, 0), (-1, 0, 0)),
        ((0, 1, 0), (0, -1, 0)),
        ((0, 0, 1), (0, 0, -1)),
    ];
    let mut area = 0.0f64;
    for pos in positions.iter() {
        for (axis, (fwd, bwd)) in axis_offsets.iter().enumerate() {
            for off in [fwd, bwd] {
                let exposed = match shift(*pos, *off, shape) {
                    None => true,
                    Some(next) => !is_in_region(morph[next]),
                };
                if exposed {
                    area += faces[axis];
                }
            }
        }
    }

    let area_to_vol = area / vol;
    let comp1 = vol / (PI.sqrt() * area.powf(1.5));
    let comp2 = 36.0 * PI * vol * vol / (area * area * area);
    let radius = (3.0 * vol / (4.0 * PI)).cbrt();
    let sph_dispr = area / (4.0 * PI * radius * radius);
    let sphericity = (36.0 * PI * vol * vol).cbrt() / area;
    let asphericity = (area * area * area / (36.0 * PI * vol * vol)).cbrt() - 1.0;

    // 质心偏移: 形态学 mask 的几何质心对强度 mask 的加权质心.
    let mut com_geom = [0.0f64; 3];
    for pos in positions.iter() {
        let w = grid.world_at(*pos);
        for (acc, v) in com_geom.iter_mut().zip(w) {
            *acc += v;
        }
    }
    for acc in com_geom.iter_mut() {
        *acc /= n;
    }
    let mut com_weighted = [0.0f64; 3];
    let mut weight_sum = 0.0f64;
    for pos in region.keep_positions() {
        let v = f64::from(region.volume()[pos]);
        let w = grid.world_at(pos);
        for (acc, c) in com_weighted.iter_mut().zip(w) {
            *acc += v * c;
        }
        weight_sum += v;
    }
    let com_shift = if weight_sum != 0.0 {
        let mut d2 = 0.0;
        for (g, w) in com_geom.iter().zip(com_weighted.iter()) {
            let d = g - w / weight_sum;
            d2 += d * d;
        }
        d2.sqrt()
    } else {
        f64::NAN
    };

    // 最大三维直径: 边界体素中心两两距离的最大值.
    let border: Vec<[f64; 3]> = border_positions(morph)
        .into_iter()
        .map(|pos| grid.world_at(pos))
        .collect();
    let mut diam2 = 0.0f64;
    for (i, a) in border.iter().enumerate() {
        for b in border.iter().skip(i + 1) {
            let d2 = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>();
            if d2 > diam2 {
                diam2 = d2;
            }
        }
    }
    let diam = diam2.sqrt();

    // PCA 轴长: 体素中心坐标的总体协方差特征值.
    let mut cov = [[0.0f64; 3]; 3];
    for pos in positions.iter() {
        let w = grid.world_at(*pos);
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] += (w[i] - com_geom[i]) * (w[j] - com_geom[j]);
            }
        }
    }
    for row in cov.iter_mut() {
        for v in row.iter_mut() {
            *v /= n;
        }
    }
    let [l_least, l_minor, l_major] = sym_eigen3(cov).map(|l| l.max(0.0));
    let (pca_major, pca_minor, pca_least, elongation, flatness) = if l_major > 0.0 {
        (
            4.0 * l_major.sqrt(),
            4.0 * l_minor.sqrt(),
            4.0 * l_least.sqrt(),
            (l_minor / l_major).sqrt(),
            (l_least / l_major).sqrt(),
        )
    } else {
        (f64::NAN, f64::NAN, f64::NAN, f64::NAN, f64::NAN)
    };

    vec![
        ("vox_count", n),
        ("vol", vol),
        ("area", area),
        ("area_to_vol", area_to_vol),
        ("comp1", comp1),
        ("comp2", comp2),
        ("sph_dispr", sph_dispr),
        ("sphericity", sphericity),
        ("asphericity", asphericity),
        ("com_shift", com_shift),
        ("diam", diam),
        ("pca_major", pca_major),
        ("pca_minor", pca_minor),
        ("pca_least", pca_least),
        ("elongation", elongation),
        ("flatness", flatness),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Volume, VoxelGrid};
    use crate::params::ParameterSet;
    use crate::resegment::extract_region;
    use ndarray::Array3;

    fn float_eq(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    fn get(fs: &[(&'static str, f64)], key: &str) -> f64 {
        fs.iter().find(|(k, _)| *k == key).unwrap().1
    }

    fn region_cube(shape: (usize, usize, usize), spacing: [f64; 3], values: f32) -> Region {
        let grid = VoxelGrid::new(spacing, [0.0; 3]).unwrap();
        let v = Volume::new(grid, Array3::from_elem(shape, values));
        let m = crate::data::RoiMask::from_shape_fn(grid, shape, |_| true);
        extract_region(&v, &m, &ParameterSet::default(), 0).unwrap()
    }

    #[test]
    fn test_sym_eigen3() {
        let e = sym_eigen3([[2.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]]);
        float_eq(e[0], 2.0, 1e-12);
        float_eq(e[1], 3.0, 1e-12);
        float_eq(e[2], 5.0, 1e-12);

        // [[2 1 0][1 2 0][0 0 3]]: 特征值 1, 3, 3.
        let e = sym_eigen3([[2.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 3.0]]);
        float_eq(e[0], 1.0, 1e-10);
        float_eq(e[1], 3.0, 1e-10);
        float_eq(e[2], 3.0, 1e-10);
    }

    #[test]
    fn test_single_voxel() {
        let fs = morph_features(&region_cube((1, 1, 1), [1.0; 3], 7.0));
        float_eq(get(&fs, "vox_count"), 1.0, 1e-12);
        float_eq(get(&fs, "vol"), 1.0, 1e-12);
        float_eq(get(&fs, "area"), 6.0, 1e-12);
        float_eq(get(&fs, "area_to_vol"), 6.0, 1e-12);
        float_eq(get(&fs, "comp2"), PI / 6.0, 1e-12);
        float_eq(get(&fs, "sphericity"), 0.80600, 1e-5);
        // 球形失调是球形度的倒数.
        float_eq(
            get(&fs, "sph_dispr"),
            1.0 / get(&fs, "sphericity"),
            1e-12,
        );
        float_eq(get(&fs, "diam"), 0.0, 1e-12);
        float_eq(get(&fs, "com_shift"), 0.0, 1e-12);
        assert!(get(&fs, "pca_major").is_nan());
        assert!(get(&fs, "elongation").is_nan());
    }

    #[test]
    fn test_cube_2x2x2() {
        let fs = morph_features(&region_cube((2, 2, 2), [1.0; 3], 1.0));
        float_eq(get(&fs, "vox_count"), 8.0, 1e-12);
        float_eq(get(&fs, "vol"), 8.0, 1e-12);
        float_eq(get(&fs, "area"), 24.0, 1e-12);
        float_eq(get(&fs, "diam"), 3.0f64.sqrt(), 1e-12);
        float_eq(get(&fs, "com_shift"), 0.0, 1e-12);
        // 各向同性协方差: 轴比均为 1.
        float_eq(get(&fs, "elongation"), 1.0, 1e-12);
        float_eq(get(&fs, "flatness"), 1.0, 1e-12);
        float_eq(get(&fs, "pca_major"), 2.0, 1e-12);
    }

    #[test]
    fn test_anisotropic_rod() {
        // 两个体素沿 w, 间距 [1, 1, 2]: 等效 1x1x4 mm 长方体.
        let fs = morph_features(&region_cube((1, 1, 2), [1.0, 1.0, 2.0], 1.0));
        float_eq(get(&fs, "vol"), 4.0, 1e-12);
        float_eq(get(&fs, "area"), 18.0, 1e-12);
        float_eq(get(&fs, "diam"), 2.0, 1e-12);
        float_eq(get(&fs, "pca_major"), 4.0, 1e-12);
        float_eq(get(&fs, "elongation"), 0.0, 1e-12);
        float_eq(get(&fs, "flatness"), 0.0, 1e-12);
    }

    #[test]
    fn test_weighted_com_shift() {
        // 值 [1, 3] 沿 w: 加权质心向高强度端偏移 0.25 mm.
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let v = Volume::new(
            grid,
            Array3::from_shape_vec((1, 1, 2), vec![1.0, 3.0]).unwrap(),
        );
        let m = crate::data::RoiMask::from_shape_fn(grid, (1, 1, 2), |_| true);
        let region = extract_region(&v, &m, &ParameterSet::default(), 0).unwrap();
        let fs = morph_features(&region);
        float_eq(get(&fs, "com_shift"), 0.25, 1e-12);
    }
}
