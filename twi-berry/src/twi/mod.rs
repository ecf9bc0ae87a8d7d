//! Track-weighted imaging 聚合引擎.
//!
//! 驱动层把每条流线的体素相交序列路由到对应体素的累加器
//! (惰性分配, 绝大多数体素从不被流线经过, 不为它们分配状态),
//! 全部流线处理完后统一 finalize 并写入输出网格.
//!
//! 整个过程是一次纯批量计算: 要么完整成功并写出全部结果,
//! 要么在第一个错误处终止且不触碰输出网格.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::consts::DEFAULT_GAUSSIAN_FWHM;
use crate::data::{HeaderAttr, TwiGrid};
use crate::track::{voxelise, MappedTrack, Track};
use crate::Idx3d;

mod accum;
mod contrast;
mod error;
mod stat;

pub use accum::VoxelAccumulator;
pub use contrast::{ContrastEval, ContrastKind, CONTRAST_TOKENS};
pub use error::{TwiError, TwiResult};
pub use stat::{StatisticKind, STATISTIC_TOKENS};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::collections::hash_map::Entry;
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 一次聚合运行的完整配置.
///
/// contrast 与统计量在构造时一次性校验, 运行期间不可变.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MapSpec {
    contrast: ContrastKind,
    statistic: StatisticKind,
    component: usize,
    fwhm: f64,
}

impl MapSpec {
    /// 初始化并校验 contrast 与统计量的组合.
    ///
    /// 两类组合没有意义, 返回 [`TwiError::UnsupportedCombination`]:
    ///
    /// 1. `fmri_*` 统计量搭配标量图以外的 contrast
    ///   (带符号功能信号只经由标量采样进入聚合);
    /// 2. 计数型 contrast (取值恒为 1) 搭配中位数或 Gaussian
    ///   (常数多重集没有有意义的顺序统计量, 计数也不该被核权重稀释).
    pub fn new(contrast: ContrastKind, statistic: StatisticKind) -> TwiResult<Self> {
        if statistic.is_fmri() && contrast != ContrastKind::ScalarMap {
            return Err(TwiError::UnsupportedCombination(contrast, statistic));
        }
        if contrast.is_count_like()
            && matches!(statistic, StatisticKind::Median | StatisticKind::Gaussian)
        {
            return Err(TwiError::UnsupportedCombination(contrast, statistic));
        }
        Ok(Self {
            contrast,
            statistic,
            component: 0,
            fwhm: DEFAULT_GAUSSIAN_FWHM,
        })
    }

    /// 指定方向分量通道 (0, 1 或 2). 越界时 panic.
    pub fn with_component(mut self, component: usize) -> Self {
        assert!(component < 3, "方向分量通道只能是 0, 1 或 2");
        self.component = component;
        self
    }

    /// 指定 Gaussian 核宽度 (FWHM, 毫米). 非正值 panic.
    pub fn with_fwhm(mut self, fwhm: f64) -> Self {
        assert!(fwhm > 0.0, "Gaussian 核宽度必须为正");
        self.fwhm = fwhm;
        self
    }

    /// 所选 contrast.
    #[inline]
    pub fn contrast(&self) -> ContrastKind {
        self.contrast
    }

    /// 所选统计量.
    #[inline]
    pub fn statistic(&self) -> StatisticKind {
        self.statistic
    }

    /// 所选方向分量通道.
    #[inline]
    pub fn component(&self) -> usize {
        self.component
    }

    /// Gaussian 核宽度 (FWHM, 毫米).
    #[inline]
    pub fn fwhm(&self) -> f64 {
        self.fwhm
    }

    /// 构建对应的 contrast 求值器.
    #[inline]
    fn evaluator(&self) -> ContrastEval {
        ContrastEval::with_component(self.contrast, self.component)
    }
}

/// 一次聚合运行的统计报告.
#[derive(Copy, Clone, Debug, Default)]
pub struct MapReport {
    /// 处理的流线条数.
    pub tracks: u64,

    /// 实际进入累加器的贡献个数.
    pub hits: u64,

    /// 被 contrast 排除 (或落在网格外) 的相交个数.
    pub excluded: u64,

    /// 至少收到一个贡献的体素个数.
    pub touched: usize,
}

impl MapReport {
    /// 吸收另一分片的计数.
    fn absorb(&mut self, other: MapReport) {
        self.tracks += other.tracks;
        self.hits += other.hits;
        self.excluded += other.excluded;
        self.touched += other.touched;
    }
}

/// 聚合运行的终态: 正常完成或被协作式取消.
#[derive(Copy, Clone, Debug)]
pub enum MapStatus {
    /// 正常完成, 输出网格已写入.
    Done(MapReport),

    /// 在流线间检查点被取消. 输出网格未被触碰.
    Cancelled,
}

impl MapStatus {
    /// 是否被取消?
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// 网格聚合驱动.
///
/// 持有一份校验过的 [`MapSpec`], 将流线集合归约到输出网格.
/// 同一驱动可以复用于多次运行; 每次运行的全部状态都在运行内部,
/// 没有全局可变状态.
#[derive(Copy, Clone, Debug)]
pub struct TrackMapper {
    spec: MapSpec,
}

impl TrackMapper {
    /// 初始化.
    #[inline]
    pub fn new(spec: MapSpec) -> Self {
        Self { spec }
    }

    /// 运行配置.
    #[inline]
    pub fn spec(&self) -> &MapSpec {
        &self.spec
    }

    /// 顺序聚合已体素化的流线序列, 将结果写入 `grid`.
    ///
    /// 未被任何流线经过的体素保留 `grid` 中调用者预填充的值.
    /// 任何求值或累加错误使整次运行失败, 此时 `grid` 不被修改.
    pub fn run<I>(&self, tracks: I, grid: &mut TwiGrid) -> TwiResult<MapReport>
    where
        I: IntoIterator<Item = MappedTrack>,
    {
        match self.run_with_cancel(tracks, grid, &AtomicBool::new(false))? {
            MapStatus::Done(rep) => Ok(rep),
            MapStatus::Cancelled => unreachable!(),
        }
    }

    /// 与 [`TrackMapper::run`] 相同, 但在每条流线之间检查取消标志.
    ///
    /// 取消只发生在流线边界上: 被取消的运行不会写出任何部分结果.
    pub fn run_with_cancel<I>(
        &self,
        tracks: I,
        grid: &mut TwiGrid,
        cancel: &AtomicBool,
    ) -> TwiResult<MapStatus>
    where
        I: IntoIterator<Item = MappedTrack>,
    {
        let shape = grid.shape();
        let eval = self.spec.evaluator();
        let mut map: HashMap<Idx3d, VoxelAccumulator> = HashMap::new();
        let mut rep = MapReport::default();

        for mt in tracks {
            if cancel.load(Ordering::Relaxed) {
                return Ok(MapStatus::Cancelled);
            }
            self.feed(&mut map, &eval, shape, &mt, &mut rep)?;
        }

        write_out(map, grid, &mut rep)?;
        Ok(MapStatus::Done(rep))
    }

    /// 便捷入口: 先按 `grid` 的几何信息体素化, 再顺序聚合.
    pub fn run_tracks<'a, I>(&self, tracks: I, grid: &mut TwiGrid) -> TwiResult<MapReport>
    where
        I: IntoIterator<Item = &'a Track>,
    {
        let geom = grid.geom();
        self.run(tracks.into_iter().map(|t| voxelise(t, &geom)), grid)
    }

    /// 将一条流线的全部相交喂给体素累加器映射.
    fn feed(
        &self,
        map: &mut HashMap<Idx3d, VoxelAccumulator>,
        eval: &ContrastEval,
        shape: Idx3d,
        mt: &MappedTrack,
        rep: &mut MapReport,
    ) -> TwiResult<()> {
        let (sz, sh, sw) = shape;
        for hit in &mt.hits {
            let (z, h, w) = hit.voxel;
            if z >= sz || h >= sh || w >= sw {
                rep.excluded += 1;
                continue;
            }
            let value = match eval.evaluate(hit, &mt.info)? {
                Some(v) => v,
                None => {
                    rep.excluded += 1;
                    continue;
                }
            };
            let weight = if self.spec.statistic.is_weighted() {
                gaussian_kernel_f64(hit.center_dist, self.spec.fwhm)
            } else {
                1.0
            };
            map.entry(hit.voxel)
                .or_insert_with(|| VoxelAccumulator::new(self.spec.statistic))
                .insert(value, weight)?;
            rep.hits += 1;
        }
        rep.tracks += 1;
        Ok(())
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl TrackMapper {
    /// 借助 `rayon`, 并行聚合已体素化的流线集合.
    ///
    /// 流线被划分到各个 worker, 每个 worker 维护自己的部分累加器映射,
    /// 最后逐体素合并. 结果与顺序运行 [`TrackMapper::run`] 完全一致.
    pub fn par_run(&self, tracks: &[MappedTrack], grid: &mut TwiGrid) -> TwiResult<MapReport> {
        let shape = grid.shape();
        let eval = self.spec.evaluator();

        let (map, mut rep) = tracks
            .par_iter()
            .try_fold(
                || (HashMap::new(), MapReport::default()),
                |(mut map, mut rep), mt| {
                    self.feed(&mut map, &eval, shape, mt, &mut rep)?;
                    Ok((map, rep))
                },
            )
            .try_reduce(
                || (HashMap::new(), MapReport::default()),
                |(mut a, mut ra), (b, rb)| {
                    for (idx, acc) in b {
                        match a.entry(idx) {
                            Entry::Occupied(mut e) => e.get_mut().merge(acc)?,
                            Entry::Vacant(v) => {
                                v.insert(acc);
                            }
                        }
                    }
                    ra.absorb(rb);
                    Ok((a, ra))
                },
            )?;

        write_out(map, grid, &mut rep)?;
        Ok(rep)
    }
}

/// finalize 全部累加器并写入网格.
///
/// 先整体 finalize 到暂存区再写入, 保证任何 finalize
/// 错误都不会留下写了一半的网格.
fn write_out(
    map: HashMap<Idx3d, VoxelAccumulator>,
    grid: &mut TwiGrid,
    rep: &mut MapReport,
) -> TwiResult<()> {
    rep.touched = map.len();
    let mut staged = Vec::with_capacity(map.len());
    for (idx, mut acc) in map {
        staged.push((idx, acc.finalize()?));
    }
    for (idx, v) in staged {
        grid[idx] = v;
    }
    Ok(())
}

/// Gaussian 核在距离 `dist` 处的权重. `fwhm` 为核的半高全宽.
fn kernel_imp<T: num::Float>(dist: T, fwhm: T) -> T {
    // sigma = FWHM / (2 * sqrt(2 * ln 2))
    let eight = T::from(8.0).unwrap();
    let two = T::from(2.0).unwrap();
    let sigma2 = fwhm * fwhm / (eight * two.ln());
    (-(dist * dist) / (two * sigma2)).exp()
}

/// Gaussian 核权重, `f32` 版本. `fwhm` 为核的半高全宽, 必须为正.
#[inline]
pub fn gaussian_kernel_f32(dist: f32, fwhm: f32) -> f32 {
    kernel_imp(dist, fwhm)
}

/// Gaussian 核权重, `f64` 版本. `fwhm` 为核的半高全宽, 必须为正.
#[inline]
pub fn gaussian_kernel_f64(dist: f64, fwhm: f64) -> f64 {
    kernel_imp(dist, fwhm)
}
