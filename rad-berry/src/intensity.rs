//! 一阶强度特征: 统计量族, 强度直方图族与强度-体积直方图族.
//!
//! 统计量族直接在再分割后的强度值上计算, 直方图两族在离散化灰度级上
//! 计算. 公式与记号沿用 IBSI 的对应章节: 方差/偏度/峰度取总体矩
//! (峰度为 excess 形式), 分位数用线性插值 (NumPy 默认), 无定义的
//! 统计量 (样本过少或分母为零) 输出 NaN 而不是中止.

use ordered_float::NotNan;

use crate::data::GreyVolume;
use crate::resegment::Region;

/// NumPy 线性插值分位数. `sorted` 必须升序且非空.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    debug_assert!((0.0..=100.0).contains(&q));
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    if frac == 0.0 {
        sorted[lo]
    } else {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    }
}

/// 升序样本上的基础统计量. 两个特征族共用.
struct BasicStats {
    mean: f64,
    var: f64,
    skew: f64,
    kurt: f64,
    median: f64,
    min: f64,
    p10: f64,
    p90: f64,
    max: f64,
    iqr: f64,
    range: f64,
    mad: f64,
    rmad: f64,
    medad: f64,
    cov: f64,
    qcod: f64,
    energy: f64,
    rms: f64,
}

fn basic_stats(sorted: &[f64]) -> BasicStats {
    assert!(!sorted.is_empty());
    let n = sorted.len();
    let nf = n as f64;

    let mean = sorted.iter().sum::<f64>() / nf;
    let mut m2 = 0.0f64;
    let mut m3 = 0.0;
    let mut m4 = 0.0;
    let mut energy = 0.0;
    for x in sorted {
        let d = x - mean;
        m2 += d * d;
        m3 += d * d * d;
        m4 += d * d * d * d;
        energy += x * x;
    }
    m2 /= nf;
    m3 /= nf;
    m4 /= nf;

    // 偏度至少 3 个样本, 峰度至少 4 个; 零方差时两者皆无定义.
    let skew = if n >= 3 && m2 > 0.0 {
        m3 / m2.powf(1.5)
    } else {
        f64::NAN
    };
    let kurt = if n >= 4 && m2 > 0.0 {
        m4 / (m2 * m2) - 3.0
    } else {
        f64::NAN
    };

    let median = percentile(sorted, 50.0);
    let p10 = percentile(sorted, 10.0);
    let p25 = percentile(sorted, 25.0);
    let p75 = percentile(sorted, 75.0);
    let p90 = percentile(sorted, 90.0);
    let min = sorted[0];
    let max = sorted[n - 1];

    let mad = sorted.iter().map(|x| (x - mean).abs()).sum::<f64>() / nf;
    let medad = sorted.iter().map(|x| (x - median).abs()).sum::<f64>() / nf;

    // robust MAD: 限制在 [P10, P90] 窗口内重新取均值.
    let window: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|x| (p10..=p90).contains(x))
        .collect();
    let rmad = if window.is_empty() {
        f64::NAN
    } else {
        let wn = window.len() as f64;
        let wmean = window.iter().sum::<f64>() / wn;
        window.iter().map(|x| (x - wmean).abs()).sum::<f64>() / wn
    };

    let cov = if mean != 0.0 {
        m2.sqrt() / mean
    } else {
        f64::NAN
    };
    let qcod = if p75 + p25 != 0.0 {
        (p75 - p25) / (p75 + p25)
    } else {
        f64::NAN
    };

    BasicStats {
        mean,
        var: m2,
        skew,
        kurt,
        median,
        min,
        p10,
        p90,
        max,
        iqr: p75 - p25,
        range: max - min,
        mad,
        rmad,
        medad,
        cov,
        qcod,
        energy,
        rms: (energy / nf).sqrt(),
    }
}

/// 18 个一阶统计量特征, 在再分割后的强度值上计算.
pub fn stat_features(region: &Region) -> Vec<(&'static str, f64)> {
    let mut xs: Vec<NotNan<f64>> = region
        .intensities()
        .into_iter()
        .map(|v| NotNan::new(f64::from(v)).expect("Region 不变式保证强度值有限"))
        .collect();
    xs.sort_unstable();
    let sorted: Vec<f64> = xs.into_iter().map(NotNan::into_inner).collect();
    let s = basic_stats(&sorted);
    vec![
        ("mean", s.mean),
        ("var", s.var),
        ("skew", s.skew),
        ("kurt", s.kurt),
        ("median", s.median),
        ("min", s.min),
        ("p10", s.p10),
        ("p90", s.p90),
        ("max", s.max),
        ("iqr", s.iqr),
        ("range", s.range),
        ("mad", s.mad),
        ("rmad", s.rmad),
        ("medad", s.medad),
        ("cov", s.cov),
        ("qcod", s.qcod),
        ("energy", s.energy),
        ("rms", s.rms),
    ]
}

/// 23 个强度直方图特征, 在离散化灰度级上计算.
pub fn histogram_features(grey: &GreyVolume) -> Vec<(&'static str, f64)> {
    let hist = grey.histogram();
    let n: u64 = hist.iter().sum();
    debug_assert!(n >= 1);

    // 灰度级升序展开, 天然有序.
    let mut sorted = Vec::with_capacity(n as usize);
    for (k, c) in hist.iter().enumerate() {
        sorted.extend(std::iter::repeat((k + 1) as f64).take(*c as usize));
    }
    let s = basic_stats(&sorted);

    let nf = n as f64;
    let mut entropy = 0.0f64;
    let mut uniformity = 0.0;
    for c in hist.iter().filter(|c| **c > 0) {
        let p = *c as f64 / nf;
        entropy -= p * p.log2();
        uniformity += p * p;
    }

    // 众数: 并列时取最低灰度级.
    let mode = hist
        .iter()
        .enumerate()
        .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.cmp(ka)))
        .map(|(k, _)| (k + 1) as f64)
        .expect("直方图长度至少为 1");

    // 直方图梯度: 内部取中心差分, 两端取单侧差分. 单一灰度级时无定义.
    let ng = hist.len();
    let (max_grad, max_grad_g, min_grad, min_grad_g) = if ng < 2 {
        (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
    } else {
        let h = |k: usize| hist[k] as f64;
        let grad: Vec<f64> = (0..ng)
            .map(|k| {
                if k == 0 {
                    h(1) - h(0)
                } else if k == ng - 1 {
                    h(ng - 1) - h(ng - 2)
                } else {
                    (h(k + 1) - h(k - 1)) / 2.0
                }
            })
            .collect();
        // 并列时取最低灰度级.
        let mut max_k = 0usize;
        let mut min_k = 0usize;
        for (k, g) in grad.iter().enumerate() {
            if *g > grad[max_k] {
                max_k = k;
            }
            if *g < grad[min_k] {
                min_k = k;
            }
        }
        (
            grad[max_k],
            (max_k + 1) as f64,
            grad[min_k],
            (min_k + 1) as f64,
        )
    };

    vec![
        ("mean", s.mean),
        ("var", s.var),
        ("skew", s.skew),
        ("kurt", s.kurt),
        ("median", s.median),
        ("min", s.min),
        ("p10", s.p10),
        ("p90", s.p90),
        ("max", s.max),
        ("mode", mode),
        ("iqr", s.iqr),
        ("range", s.range),
        ("mad", s.mad),
        ("rmad", s.rmad),
        ("medad", s.medad),
        ("cov", s.cov),
        ("qcod", s.qcod),
        ("entropy", entropy),
        ("uniformity", uniformity),
        ("max_grad", max_grad),
        ("max_grad_g", max_grad_g),
        ("min_grad", min_grad),
        ("min_grad_g", min_grad_g),
    ]
}

/// 6 个强度-体积直方图特征, 在离散化灰度级上计算.
///
/// `nu(g)` 为灰度级不低于 `g` 的体素体积分数, 强度分数阈值取观测
/// 灰度级范围的线性比例. `I_x` 为满足 `nu(g) <= x` 的最小灰度级,
/// 不存在时为 NaN; 区域只有单一灰度级时六个特征均为 NaN.
pub fn ivh_features(grey: &GreyVolume) -> Vec<(&'static str, f64)> {
    const NAMES: [&str; 6] = ["v10", "v90", "v10_minus_v90", "i10", "i90", "i10_minus_i90"];

    let hist = grey.histogram();
    let n: u64 = hist.iter().sum();
    let observed: Vec<usize> = hist
        .iter()
        .enumerate()
        .filter_map(|(k, c)| (*c > 0).then_some(k + 1))
        .collect();
    let (g_min, g_max) = match (observed.first(), observed.last()) {
        (Some(lo), Some(hi)) if lo != hi => (*lo as f64, *hi as f64),
        _ => return NAMES.iter().map(|k| (*k, f64::NAN)).collect(),
    };

    // 体积分数 nu(g): 灰度级不低于 g 的体素占比.
    let nu = |g: f64| -> f64 {
        let above: u64 = hist
            .iter()
            .enumerate()
            .filter_map(|(k, c)| ((k + 1) as f64 >= g).then_some(*c))
            .sum();
        above as f64 / n as f64
    };

    let v10 = nu(0.10 * (g_max - g_min) + g_min);
    let v90 = nu(0.90 * (g_max - g_min) + g_min);
    let intensity_at = |x: f64| -> f64 {
        observed
            .iter()
            .find(|g| nu(**g as f64) <= x)
            .map_or(f64::NAN, |g| *g as f64)
    };
    let i10 = intensity_at(0.10);
    let i90 = intensity_at(0.90);

    vec![
        ("v10", v10),
        ("v90", v90),
        ("v10_minus_v90", v10 - v90),
        ("i10", i10),
        ("i90", i90),
        ("i10_minus_i90", i10 - i90),
    ]
}
