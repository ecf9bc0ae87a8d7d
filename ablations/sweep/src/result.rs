//! 实验结果.

use std::io::{self, Write};
use std::time::Duration;

use twi_berry::prelude::*;

/// 单个统计量在 phantom 束上的运行摘要.
pub struct StatSummary {
    touched: usize,
    defined: usize,
    vmin: Option<f64>,
    vmax: Option<f64>,
    vmean: Option<f64>,
    elapsed: Duration,
}

impl StatSummary {
    /// 从聚合结果网格与运行报告收集摘要.
    ///
    /// 网格在聚合前以哨兵预填充, 因此 `defined` 即被聚合写入的体素数.
    pub fn from_run(grid: &TwiGrid, report: &MapReport, elapsed: Duration) -> Self {
        let mut defined = 0usize;
        let mut vmin = f64::INFINITY;
        let mut vmax = f64::NEG_INFINITY;
        let mut sum = 0.0;

        for v in grid.data().iter().copied().filter(|v| is_defined(*v)) {
            defined += 1;
            let v = v as f64;
            vmin = vmin.min(v);
            vmax = vmax.max(v);
            sum += v;
        }

        let has = defined > 0;
        Self {
            touched: report.touched,
            defined,
            vmin: has.then_some(vmin),
            vmax: has.then_some(vmax),
            vmean: has.then_some(sum / defined as f64),
            elapsed,
        }
    }
}

/// 将 `summary` 的结果写进 `w` 中.
fn describe_into<W: Write>(name: &str, s: &StatSummary, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    #[inline]
    fn f64_to_display(f: Option<f64>) -> String {
        match f {
            Some(f) => format!("{f:.6}"),
            None => "/".to_string(),
        }
    }

    writeln!(w, "Statistic `{name}`:")?;
    writeln!(w, "{S4}Touched voxels: {}", s.touched)?;
    writeln!(w, "{S4}Defined output voxels: {}", s.defined)?;
    writeln!(w, "{S4}Output min: {}", f64_to_display(s.vmin))?;
    writeln!(w, "{S4}Output max: {}", f64_to_display(s.vmax))?;
    writeln!(w, "{S4}Output mean: {}", f64_to_display(s.vmean))?;
    write!(w, "{S4}Aggregation time: {} us", s.elapsed.as_micros())?;
    Ok(())
}

/// 消融实验最终结果.
pub struct SweepResult {
    data: Vec<(&'static str, StatSummary)>,
}

impl SweepResult {
    pub fn from_iter<I: IntoIterator<Item = (&'static str, StatSummary)>>(it: I) -> Self {
        Self {
            data: it.into_iter().collect(),
        }
    }

    /// 分析运行结果.
    pub fn analyze(&self) {
        utils::sep();
        let mut buf = Vec::with_capacity(512);

        for (key, summary) in self.data.iter() {
            describe_into(key, summary, &mut buf).unwrap();
            println!("{}", std::str::from_utf8(&buf).unwrap());
            buf.clear();

            utils::sep();
        }
    }
}
