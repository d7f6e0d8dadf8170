//! 批量提取调度器.
//!
//! 把一组提取单元分派到固定大小的线程池, 每个单元独立完整地跑一遍
//! 流水线, 互不影响: 单元内 panic 被捕获为 [`UnitError::WorkerCrash`],
//! 几何/空区域错误记入失败日志, 都不波及其余单元. 唯一的例外是
//! [`NamingCollisionError`]: 它意味着命名缺陷, 触发整批中止.
//!
//! 结果一律按 [`UnitKey`] 排序, 与完成顺序无关. 取消是协作式的:
//! 令牌置位后未启动的单元以 Cancelled 报告失败, 进行中的单元照常
//! 跑完, 最多再完成线程池大小个单元.

use std::io::{self, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use log::{debug, info, warn};
use threadpool::ThreadPool;

use crate::data::{GeometryError, RoiMask, Volume};
use crate::params::ParameterSet;
use crate::pipeline::{self, ExtractError};
use crate::record::{FeatureRecord, FeatureRow, FeatureTable, NamingCollisionError};
use crate::resegment::EmptyRegionError;

/// 提取单元身份: (患者, 扫描, 参数集) 三元组的稳定键.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    /// 患者标识.
    pub patient: String,

    /// 扫描标识.
    pub scan: String,

    /// 参数集标识 (见 `ParameterSet::id`).
    pub params_id: String,
}

impl UnitKey {
    /// 由身份字符串与参数集构建键.
    pub fn new(patient: &str, scan: &str, params: &ParameterSet) -> Self {
        Self {
            patient: patient.to_string(),
            scan: scan.to_string(),
            params_id: params.id(),
        }
    }
}

/// 一个提取单元: 调度器的原子工作量.
#[derive(Debug, Clone)]
pub struct ExtractionUnit {
    /// 单元身份.
    pub key: UnitKey,

    /// 强度体.
    pub volume: Volume,

    /// 配对 mask.
    pub mask: RoiMask,

    /// 提取参数.
    pub params: ParameterSet,
}

impl ExtractionUnit {
    /// 创建提取单元, 键由身份字符串与参数集标识组成.
    pub fn new(
        patient: &str,
        scan: &str,
        volume: Volume,
        mask: RoiMask,
        params: ParameterSet,
    ) -> Self {
        Self {
            key: UnitKey::new(patient, scan, &params),
            volume,
            mask,
            params,
        }
    }
}

/// 单元状态机: `Pending -> Running -> {Succeeded, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    /// 已提交, 未开始.
    Pending,

    /// 流水线进行中.
    Running,

    /// 成功, 产出完整记录.
    Succeeded,

    /// 失败, 原因见 [`UnitError`].
    Failed,
}

/// 单元失败原因.
#[derive(Debug, Clone, PartialEq)]
pub enum UnitError {
    /// 输入几何不合法.
    Geometry(GeometryError),

    /// 再分割后区域为空.
    EmptyRegion(EmptyRegionError),

    /// 工作线程 panic, 附 panic 文本.
    WorkerCrash(String),

    /// 单元在启动前被取消.
    Cancelled,
}

/// 失败日志用的错误类别.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 几何错误.
    Geometry,

    /// 空区域.
    EmptyRegion,

    /// 工作线程崩溃.
    WorkerCrash,

    /// 已取消.
    Cancelled,
}

impl UnitError {
    /// 错误类别.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Geometry(_) => ErrorKind::Geometry,
            Self::EmptyRegion(_) => ErrorKind::EmptyRegion,
            Self::WorkerCrash(_) => ErrorKind::WorkerCrash,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// 失败日志的一行.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    /// 失败单元的身份.
    pub key: UnitKey,

    /// 失败原因.
    pub error: UnitError,
}

/// 单元的最终结果: 完整记录或失败描述, 产出后不再变更.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// 单元身份.
    pub key: UnitKey,

    /// 成功记录或失败原因.
    pub outcome: Result<FeatureRecord, UnitError>,
}

impl ExtractionResult {
    /// 单元的终态.
    pub fn state(&self) -> UnitState {
        match self.outcome {
            Ok(_) => UnitState::Succeeded,
            Err(_) => UnitState::Failed,
        }
    }
}

/// 协作式取消令牌. clone 共享同一标志位.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// 创建未置位的令牌.
    pub fn new() -> Self {
        Self::default()
    }

    /// 请求取消. 只拦截未启动的单元.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// 是否已请求取消.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 获得可并行核心数.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 工作线程发回的单元结局.
enum UnitOutcome {
    Record(Box<FeatureRecord>),
    Error(UnitError),
    Collision(NamingCollisionError),
}

/// 批量提取的汇总: 成功记录与失败日志, 均按键排序.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    succeeded: Vec<(UnitKey, FeatureRecord)>,
    failures: Vec<UnitFailure>,
}

impl BatchOutcome {
    /// 成功单元, 按键升序.
    #[inline]
    pub fn succeeded(&self) -> &[(UnitKey, FeatureRecord)] {
        &self.succeeded
    }

    /// 失败日志, 按键升序.
    #[inline]
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    /// 成功记录合成特征表.
    pub fn table(&self) -> FeatureTable {
        FeatureTable::from_rows(
            self.succeeded
                .iter()
                .map(|(key, record)| FeatureRow {
                    patient: key.patient.clone(),
                    scan: key.scan.clone(),
                    params_id: key.params_id.clone(),
                    record: record.clone(),
                })
                .collect(),
        )
    }

    /// 把失败日志写进 `w` 中.
    pub fn describe_failures_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        for f in self.failures.iter() {
            writeln!(
                w,
                "{},{},{},{:?},{:?}",
                f.key.patient,
                f.key.scan,
                f.key.params_id,
                f.error.kind(),
                f.error
            )?;
        }
        Ok(())
    }
}

/// 批量提取调度器.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    workers: usize,
    cancel: CancelToken,
}

impl BatchRunner {
    /// 创建给定线程数的调度器.
    ///
    /// # 参数
    ///
    /// `workers` 必须不小于 1.
    pub fn new(workers: usize) -> Self {
        assert!(workers >= 1);
        Self {
            workers,
            cancel: CancelToken::new(),
        }
    }

    /// 创建线程数等于可并行核心数的调度器.
    pub fn with_default_workers() -> Self {
        Self::new(default_workers())
    }

    /// 共享本调度器的取消令牌.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 运行一批提取单元.
    ///
    /// 返回 `Err` 仅当出现特征键冲突 (命名缺陷); 其余失败都记录在
    /// [`BatchOutcome::failures`] 中. 结果与单元完成顺序无关.
    pub fn run(&self, units: Vec<ExtractionUnit>) -> Result<BatchOutcome, NamingCollisionError> {
        let total = units.len();
        info!("批量提取: {total} 个单元, {} 个工作线程", self.workers);

        let pool = ThreadPool::new(self.workers);
        let (tx, rx) = mpsc::channel::<(UnitKey, UnitOutcome)>();
        for unit in units {
            let tx = tx.clone();
            let cancel = self.cancel.clone();
            pool.execute(move || {
                let key = unit.key.clone();
                let outcome = run_unit(unit, &cancel);
                // 接收端只在整批中止后才可能先行关闭, 此时结果可丢弃.
                let _ = tx.send((key, outcome));
            });
        }
        drop(tx);

        let mut outcome = BatchOutcome::default();
        let mut collision: Option<NamingCollisionError> = None;
        for (key, unit_outcome) in rx.iter() {
            match unit_outcome {
                UnitOutcome::Record(record) => {
                    debug!("{key:?}: Succeeded");
                    outcome.succeeded.push((key, *record));
                }
                UnitOutcome::Error(error) => {
                    warn!("{key:?}: Failed ({:?})", error.kind());
                    outcome.failures.push(UnitFailure { key, error });
                }
                UnitOutcome::Collision(e) => {
                    // 命名缺陷: 拦截尚未启动的单元, 继续排空通道.
                    warn!("{key:?}: 特征键冲突 {e:?}, 中止整批");
                    self.cancel.cancel();
                    collision.get_or_insert(e);
                }
            }
        }

        if let Some(e) = collision {
            return Err(e);
        }
        outcome.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
        outcome.failures.sort_by(|a, b| a.key.cmp(&b.key));
        info!(
            "批量提取完成: {} 成功, {} 失败",
            outcome.succeeded.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }
}

/// 单元状态机的执行体. 取消检查只在启动边界进行.
fn run_unit(unit: ExtractionUnit, cancel: &CancelToken) -> UnitOutcome {
    if cancel.is_cancelled() {
        debug!("{:?}: Pending -> Failed (取消)", unit.key);
        return UnitOutcome::Error(UnitError::Cancelled);
    }
    debug!("{:?}: Pending -> Running", unit.key);

    let result = catch_unwind(AssertUnwindSafe(|| {
        pipeline::extract_features(&unit.volume, &unit.mask, &unit.params)
    }));
    match result {
        Ok(Ok(record)) => UnitOutcome::Record(Box::new(record)),
        Ok(Err(ExtractError::Geometry(e))) => UnitOutcome::Error(UnitError::Geometry(e)),
        Ok(Err(ExtractError::EmptyRegion(e))) => UnitOutcome::Error(UnitError::EmptyRegion(e)),
        Ok(Err(ExtractError::Naming(e))) => UnitOutcome::Collision(e),
        Err(payload) => UnitOutcome::Error(UnitError::WorkerCrash(panic_text(payload.as_ref()))),
    }
}

/// 尽力从 panic payload 中提取文本.
fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "非文本 panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::VoxelGrid;
    use crate::params::BinScheme;
    use ndarray::Array3;

    fn phantom_unit(patient: &str, shape: (usize, usize, usize)) -> ExtractionUnit {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let v = Volume::from_shape_fn(grid, shape, |(z, h, w)| {
            ((z * 5 + h * 7 + w * 3) % 13) as f32
        });
        let m = RoiMask::from_shape_fn(grid, shape, |_| true);
        let params = ParameterSet {
            bin_scheme: BinScheme::FixedNumber(8),
            ..ParameterSet::default()
        };
        ExtractionUnit::new(patient, "s1", v, m, params)
    }

    /// mask 形状不匹配的坏单元.
    fn bad_unit(patient: &str) -> ExtractionUnit {
        let grid = VoxelGrid::isotropic(1.0).unwrap();
        let v = Volume::new(grid, Array3::zeros((3, 3, 3)));
        let m = RoiMask::from_shape_fn(grid, (3, 3, 4), |_| true);
        ExtractionUnit::new(patient, "s1", v, m, ParameterSet::default())
    }

    #[test]
    fn test_batch_isolation() {
        // 三个单元, 中间一个坏: 其余两个不受影响.
        let runner = BatchRunner::new(2);
        let outcome = runner
            .run(vec![
                phantom_unit("p1", (4, 4, 4)),
                bad_unit("p2"),
                phantom_unit("p3", (4, 4, 4)),
            ])
            .unwrap();
        assert_eq!(outcome.succeeded().len(), 2);
        assert_eq!(outcome.failures().len(), 1);
        assert_eq!(outcome.failures()[0].key.patient, "p2");
        assert_eq!(outcome.failures()[0].error.kind(), ErrorKind::Geometry);

        // 成功结果与单独运行逐位一致.
        let u = phantom_unit("p1", (4, 4, 4));
        let solo = pipeline::extract_features(&u.volume, &u.mask, &u.params).unwrap();
        assert!(outcome.succeeded()[0].1.same_bits(&solo));
    }

    #[test]
    fn test_results_sorted_by_key() {
        let runner = BatchRunner::new(4);
        let outcome = runner
            .run(vec![
                phantom_unit("p3", (3, 3, 3)),
                phantom_unit("p1", (3, 3, 3)),
                phantom_unit("p2", (3, 3, 3)),
            ])
            .unwrap();
        let patients: Vec<&str> = outcome
            .succeeded()
            .iter()
            .map(|(k, _)| k.patient.as_str())
            .collect();
        assert_eq!(patients, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_cancel_before_run() {
        let runner = BatchRunner::new(2);
        runner.cancel_token().cancel();
        let outcome = runner
            .run(vec![phantom_unit("p1", (3, 3, 3)), phantom_unit("p2", (3, 3, 3))])
            .unwrap();
        assert!(outcome.succeeded().is_empty());
        assert_eq!(outcome.failures().len(), 2);
        assert!(outcome
            .failures()
            .iter()
            .all(|f| f.error == UnitError::Cancelled));
    }

    #[test]
    fn test_determinism_across_pool_sizes() {
        let run = |workers| {
            BatchRunner::new(workers)
                .run(vec![
                    phantom_unit("p1", (4, 3, 3)),
                    phantom_unit("p2", (3, 4, 3)),
                ])
                .unwrap()
        };
        let a = run(1);
        let b = run(3);
        assert_eq!(a.succeeded().len(), b.succeeded().len());
        for ((ka, ra), (kb, rb)) in a.succeeded().iter().zip(b.succeeded().iter()) {
            assert_eq!(ka, kb);
            assert!(ra.same_bits(rb));
        }
    }

    #[test]
    fn test_failure_log_format() {
        let runner = BatchRunner::new(1);
        let outcome = runner.run(vec![bad_unit("p9")]).unwrap();
        let mut buf = Vec::new();
        outcome.describe_failures_into(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("p9,s1,"));
        assert!(text.contains("Geometry"));
    }
}
