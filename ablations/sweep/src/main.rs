//! 统计量 sweep 消融实验: 同一 phantom 流线束, 逐个统计量聚合并对比.

mod result;
mod runner;

fn main() {
    let res = runner::run();
    res.analyze();
}
