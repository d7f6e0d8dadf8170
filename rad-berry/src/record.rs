//! 特征记录与特征表.
//!
//! [`FeatureRecord`] 是单个提取单元的全部特征, 键形如
//! `<族>_<统计量>[_<filter tag>]`; 键冲突意味着命名缺陷而非数据问题,
//! 以 [`NamingCollisionError`] 上报并由上层中止整批提取.
//! [`FeatureTable`] 把多条记录拼成行列表格, 列为全部记录键的并集,
//! 缺失值写 NaN.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

/// 两个特征族产出了同一个键. 属于命名缺陷, 整批提取应当中止.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingCollisionError {
    /// 冲突的完整特征键.
    pub key: String,
}

/// 单个提取单元的特征集合. 键有序存储, 迭代顺序确定.
#[derive(Debug, Clone, Default)]
pub struct FeatureRecord {
    values: BTreeMap<String, f64>,
}

impl FeatureRecord {
    /// 创建空记录.
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个特征值. 键已存在时返回 [`NamingCollisionError`].
    pub fn insert(&mut self, key: String, value: f64) -> Result<(), NamingCollisionError> {
        if self.values.contains_key(&key) {
            return Err(NamingCollisionError { key });
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// 吸收一个特征族: 每个特征名冠以族前缀, 可选再接 filter tag.
    ///
    /// 键格式 `<family>_<name>` 或 `<family>_<name>_<tag>`.
    pub fn absorb(
        &mut self,
        family: &str,
        tag: Option<&str>,
        features: Vec<(&'static str, f64)>,
    ) -> Result<(), NamingCollisionError> {
        for (name, value) in features {
            let key = match tag {
                Some(t) => format!("{family}_{name}_{t}"),
                None => format!("{family}_{name}"),
            };
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// 特征个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 记录是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 按键取值.
    #[inline]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// 按键升序迭代全部 (键, 值) 对.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// 两条记录是否逐位相等 (NaN 与 NaN 视为相等).
    ///
    /// 浮点 `==` 下 NaN 不等于自身, 复现性判定需要按位比较.
    pub fn same_bits(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.to_bits() == vb.to_bits())
    }
}

/// 特征表的一行: 身份三元组加一条记录.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    /// 患者标识.
    pub patient: String,

    /// 扫描标识.
    pub scan: String,

    /// 参数集标识 (见 `ParameterSet::id`).
    pub params_id: String,

    /// 该单元的特征记录.
    pub record: FeatureRecord,
}

/// 多个提取单元的特征表. 行按身份排序, 列为键并集.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// 由若干行构建表格, 行按 (patient, scan, params) 排序.
    pub fn from_rows(mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by(|a, b| {
            (&a.patient, &a.scan, &a.params_id).cmp(&(&b.patient, &b.scan, &b.params_id))
        });
        Self { rows }
    }

    /// 行数.
    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// 行视图.
    #[inline]
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    /// 全部记录键的有序并集.
    pub fn columns(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|r| r.record.iter().map(|(k, _)| k))
            .collect();
        set.into_iter().collect()
    }

    /// 以 CSV 形式写出整张表. 记录缺失的列写 NaN.
    pub fn write_csv<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let columns = self.columns();
        write!(w, "patient,scan,params")?;
        for c in columns.iter() {
            write!(w, ",{c}")?;
        }
        writeln!(w)?;
        for row in self.rows.iter() {
            write!(w, "{},{},{}", row.patient, row.scan, row.params_id)?;
            for c in columns.iter() {
                match row.record.get(c) {
                    Some(v) => write!(w, ",{v}")?,
                    None => write!(w, ",NaN")?,
                }
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_collision() {
        let mut r = FeatureRecord::new();
        r.insert("stat_mean".into(), 1.0).unwrap();
        assert_eq!(
            r.insert("stat_mean".into(), 2.0).unwrap_err(),
            NamingCollisionError {
                key: "stat_mean".into()
            }
        );
        // 第一次写入的值保持不变.
        assert_eq!(r.get("stat_mean"), Some(1.0));
    }

    #[test]
    fn test_absorb_key_format() {
        let mut r = FeatureRecord::new();
        r.absorb("glcm", None, vec![("contrast", 0.5)]).unwrap();
        r.absorb("glcm", Some("log1p5"), vec![("contrast", 0.7)])
            .unwrap();
        assert_eq!(r.get("glcm_contrast"), Some(0.5));
        assert_eq!(r.get("glcm_contrast_log1p5"), Some(0.7));
        assert_eq!(r.len(), 2);

        // 同族同名再次吸收冲突.
        assert!(r.absorb("glcm", None, vec![("contrast", 0.9)]).is_err());
    }

    #[test]
    fn test_same_bits_with_nan() {
        let mut a = FeatureRecord::new();
        let mut b = FeatureRecord::new();
        a.insert("x".into(), f64::NAN).unwrap();
        b.insert("x".into(), f64::NAN).unwrap();
        assert!(a.same_bits(&b));

        let mut c = FeatureRecord::new();
        c.insert("x".into(), 0.0).unwrap();
        assert!(!a.same_bits(&c));
    }

    #[test]
    fn test_csv_union_columns() {
        let mut ra = FeatureRecord::new();
        ra.insert("stat_mean".into(), 2.5).unwrap();
        ra.insert("glcm_contrast".into(), 1.0).unwrap();
        let mut rb = FeatureRecord::new();
        rb.insert("stat_mean".into(), 3.0).unwrap();

        let table = FeatureTable::from_rows(vec![
            FeatureRow {
                patient: "p2".into(),
                scan: "s1".into(),
                params_id: "native".into(),
                record: rb,
            },
            FeatureRow {
                patient: "p1".into(),
                scan: "s1".into(),
                params_id: "native".into(),
                record: ra,
            },
        ]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.columns(), vec!["glcm_contrast", "stat_mean"]);

        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "patient,scan,params,glcm_contrast,stat_mean");
        // 行按身份排序; p2 缺失 glcm_contrast 列写 NaN.
        assert_eq!(lines[1], "p1,s1,native,1,2.5");
        assert_eq!(lines[2], "p2,s1,native,NaN,3");
    }
}
