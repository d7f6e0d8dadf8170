//! 合成体模上的端到端一致性运行器.
//!
//! 不读外部数据: 在进程内生成确定性体模, 跑一整批提取单元,
//! 把特征表与失败日志打到 stdout.

mod phantom;
mod runner;

fn main() {
    simple_logger::init_with_level(log::Level::Info).expect("Logger init error");
    runner::run();
}
