//! 程序运行函数.

use std::thread;
use std::time::Instant;

use twi_berry::prelude::*;
use utils::phantom;

use crate::result::{StatSummary, SweepResult};

/// phantom 流线条数.
const TRACK_COUNT: usize = 200;

/// 实际运行.
pub fn run() -> SweepResult {
    println!(
        "Sweeping {} statistics over {} phantom tracks ({} cores)...",
        StatisticKind::ALL.len(),
        TRACK_COUNT,
        utils::cpus(),
    );

    // 体素化只做一次, 所有统计量共享同一相交序列.
    let geom = phantom::grid().geom();
    let mapped: Vec<MappedTrack> = phantom::bundle(TRACK_COUNT)
        .iter()
        .map(|t| voxelise(t, &geom))
        .collect();

    thread::scope(|s| {
        let handles = StatisticKind::ALL.map(|statistic| {
            let mapped = &mapped;
            s.spawn(move || {
                println!("Statistic `{}`...", statistic.token());
                sweep_one(statistic, mapped)
            })
        });

        SweepResult::from_iter(
            StatisticKind::ALL
                .map(StatisticKind::token)
                .into_iter()
                .zip(
                    handles
                        .into_iter()
                        .map(|th| th.join().expect("Thread joining error")),
                ),
        )
    })
}

/// 用一个统计量聚合整个 phantom 束.
fn sweep_one(statistic: StatisticKind, mapped: &[MappedTrack]) -> StatSummary {
    let spec = MapSpec::new(ContrastKind::ScalarMap, statistic).expect("组合在 sweep 中恒合法");
    let mapper = TrackMapper::new(spec);

    let mut grid = phantom::grid();
    // 以哨兵预填充, 使 "被聚合" 与 "未经过" 在结果中可区分.
    grid.fill(NO_DATA);

    let clock = Instant::now();
    let report = mapper
        .run(mapped.iter().cloned(), &mut grid)
        .expect("phantom 束不含退化输入");
    let elapsed = clock.elapsed();

    StatSummary::from_run(&grid, &report, elapsed)
}
