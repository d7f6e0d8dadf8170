//! 单元提取流水线.
//!
//! 把一个 (强度体, mask, 参数集) 三元组变换为一条 [`FeatureRecord`]:
//! 几何校验 -> 可选重采样 -> 再分割 -> {形态学, 一阶统计} -> 离散化 ->
//! {直方图, IVH, 五族纹理}; 之后对参数集中每个滤波器, 在完整体数据上
//! 滤波并让结果按原始图像同样的再分割/离散化规则重新走一遍特征路径,
//! 特征键附加 filter tag. 形态学族只依赖 mask, 只算一次.
//!
//! 纯函数: 相同输入两次调用产出逐位相同的记录.

use log::debug;

use crate::consts::family;
use crate::data::{check_pair, GeometryError, RoiMask, Volume};
use crate::discretize::discretize;
use crate::filters;
use crate::params::ParameterSet;
use crate::record::{FeatureRecord, NamingCollisionError};
use crate::resample::resample_pair;
use crate::resegment::{extract_region, EmptyRegionError};
use crate::{intensity, morph, texture};

/// 单元提取的失败原因.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    /// 体数据与 mask 几何不匹配, 或目标网格非法.
    Geometry(GeometryError),

    /// 再分割后区域为空.
    EmptyRegion(EmptyRegionError),

    /// 特征键冲突 (命名缺陷, 上层应中止整批提取).
    Naming(NamingCollisionError),
}

impl From<GeometryError> for ExtractError {
    fn from(e: GeometryError) -> Self {
        Self::Geometry(e)
    }
}

impl From<EmptyRegionError> for ExtractError {
    fn from(e: EmptyRegionError) -> Self {
        Self::EmptyRegion(e)
    }
}

impl From<NamingCollisionError> for ExtractError {
    fn from(e: NamingCollisionError) -> Self {
        Self::Naming(e)
    }
}

/// 对一个提取单元运行完整流水线.
///
/// # 参数
///
/// 1. `volume` 与 `mask` 必须形状与间距一致, 否则以
///    [`ExtractError::Geometry`] 失败;
/// 2. `params` 必须通过 `ParameterSet::is_valid`, 否则 panic
///    (参数集合法性属于调用方契约).
pub fn extract_features(
    volume: &Volume,
    mask: &RoiMask,
    params: &ParameterSet,
) -> Result<FeatureRecord, ExtractError> {
    assert!(params.is_valid(), "参数集不合法: {params:?}");
    check_pair(volume, mask)?;
    let (volume, mask) = resample_pair(volume, mask, params)?;

    let mut record = FeatureRecord::new();

    let region = extract_region(&volume, &mask, params, 0)?;
    debug!(
        "基础图像: 区域 {} 体素, 形态学 mask {} 体素",
        region.count(),
        region.morph_mask().count()
    );
    record.absorb(family::MORPH, None, morph::morph_features(&region))?;
    record.absorb(family::STAT, None, intensity::stat_features(&region))?;
    let grey = discretize(&region, params);
    record.absorb(family::INT_HIST, None, intensity::histogram_features(&grey))?;
    record.absorb(family::INT_VOL_HIST, None, intensity::ivh_features(&grey))?;
    absorb_textures(&mut record, None, &grey, region.morph_mask(), params)?;

    for spec in params.filters.iter() {
        let tag = spec.tag();
        let filtered = filters::apply(&volume, spec);
        let region = extract_region(&filtered, &mask, params, 0)?;
        debug!("滤波 {tag}: 区域 {} 体素", region.count());
        record.absorb(family::STAT, Some(&tag), intensity::stat_features(&region))?;
        let grey = discretize(&region, params);
        record.absorb(
            family::INT_HIST,
            Some(&tag),
            intensity::histogram_features(&grey),
        )?;
        record.absorb(
            family::INT_VOL_HIST,
            Some(&tag),
            intensity::ivh_features(&grey),
        )?;
        absorb_textures(&mut record, Some(&tag), &grey, region.morph_mask(), params)?;
    }

    Ok(record)
}

/// 五族纹理特征一次性并入记录.
fn absorb_textures(
    record: &mut FeatureRecord,
    tag: Option<&str>,
    grey: &crate::data::GreyVolume,
    morph_mask: &RoiMask,
    params: &ParameterSet,
) -> Result<(), NamingCollisionError> {
    record.absorb(family::GLCM, tag, texture::cooccurrence::features(grey, params))?;
    record.absorb(family::GLRLM, tag, texture::runlength::features(grey, params))?;
    record.absorb(family::GLSZM, tag, texture::sizezone::features(grey, params))?;
    record.absorb(
        family::GLDZM,
        tag,
        texture::distancezone::features(grey, morph_mask, params),
    )?;
    record.absorb(family::NGTDM, tag, texture::ngtdm::features(grey))?;
    Ok(())
}
