//! 单体素流式累加器.
//!
//! 每个被流线经过的体素持有一个 [`VoxelAccumulator`], 以任意顺序接收
//! 标量贡献, 在 finalize 时按所选统计量归约为单个输出值.
//! 除中位数需要保留全部样本、Gaussian 需要维护加权和之外,
//! 其余统计量的状态都是 O(1) 的.

use ordered_float::NotNan;

use super::error::{TwiError, TwiResult};
use super::stat::StatisticKind;
use crate::consts::NO_DATA;

/// 累加器状态机: `Empty -> Accumulating -> Finalized`.
///
/// finalize 之后任何 insert / merge / 再次 finalize 都是驱动层的编程错误.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum AccumState {
    Empty,
    Accumulating,
    Finalized,
}

/// 每种统计量的内部归约状态.
#[derive(Debug, Clone)]
enum Reducer {
    Sum { total: f64 },
    Extremum { take_max: bool, best: Option<f64> },
    Mean { mean: f64 },
    Median { samples: Vec<f64> },
    Gaussian { weighted: f64, weight: f64 },
}

impl Reducer {
    fn new(kind: StatisticKind) -> Self {
        match kind {
            StatisticKind::Sum => Self::Sum { total: 0.0 },
            StatisticKind::Min | StatisticKind::FmriMin => Self::Extremum {
                take_max: false,
                best: None,
            },
            StatisticKind::Max | StatisticKind::FmriMax => Self::Extremum {
                take_max: true,
                best: None,
            },
            StatisticKind::Mean | StatisticKind::FmriMean => Self::Mean { mean: 0.0 },
            StatisticKind::Median => Self::Median {
                samples: Vec::new(),
            },
            StatisticKind::Gaussian => Self::Gaussian {
                weighted: 0.0,
                weight: 0.0,
            },
        }
    }
}

/// 单体素累加器.
///
/// 由网格聚合驱动独占持有, 生命周期限于一次聚合运行.
/// 贡献的插入顺序不影响 finalize 结果 (中位数在 finalize 时整体排序).
#[derive(Debug, Clone)]
pub struct VoxelAccumulator {
    kind: StatisticKind,
    state: AccumState,
    count: u64,
    red: Reducer,
}

impl VoxelAccumulator {
    /// 按统计量初始化一个空累加器.
    pub fn new(kind: StatisticKind) -> Self {
        Self {
            kind,
            state: AccumState::Empty,
            count: 0,
            red: Reducer::new(kind),
        }
    }

    /// 所选统计量.
    #[inline]
    pub fn kind(&self) -> StatisticKind {
        self.kind
    }

    /// 已接收的贡献个数.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 插入一个贡献值.
    ///
    /// `weight` 仅被 Gaussian 统计量使用 (核权重), 其余统计量忽略它.
    /// finalize 之后调用返回 [`TwiError::InvalidState`].
    pub fn insert(&mut self, value: f64, weight: f64) -> TwiResult<()> {
        if self.state == AccumState::Finalized {
            return Err(TwiError::InvalidState("finalize 之后不接受 insert"));
        }
        self.state = AccumState::Accumulating;
        self.count += 1;

        match &mut self.red {
            Reducer::Sum { total } => *total += value,
            Reducer::Extremum { take_max, best } => {
                *best = Some(match *best {
                    None => value,
                    Some(b) if *take_max => b.max(value),
                    Some(b) => b.min(value),
                });
            }
            Reducer::Mean { mean } => {
                // 增量式均值更新, 避免先求大和再除的溢出隐患.
                *mean += (value - *mean) / self.count as f64;
            }
            Reducer::Median { samples } => samples.push(value),
            Reducer::Gaussian { weighted, weight: w } => {
                *weighted += value * weight;
                *w += weight;
            }
        }
        Ok(())
    }

    /// 合并另一分片的部分累加结果 (并行归约的重组步骤).
    ///
    /// 两个累加器的统计量必须一致, 且都未 finalize,
    /// 否则返回 [`TwiError::InvalidState`].
    pub fn merge(&mut self, other: VoxelAccumulator) -> TwiResult<()> {
        if self.state == AccumState::Finalized || other.state == AccumState::Finalized {
            return Err(TwiError::InvalidState("finalize 之后不接受 merge"));
        }
        if self.kind != other.kind {
            return Err(TwiError::InvalidState("不能合并不同统计量的累加器"));
        }
        if other.count == 0 {
            return Ok(());
        }

        let total_count = self.count + other.count;
        match (&mut self.red, other.red) {
            (Reducer::Sum { total }, Reducer::Sum { total: t2 }) => *total += t2,
            (Reducer::Extremum { take_max, best }, Reducer::Extremum { best: b2, .. }) => {
                *best = match (*best, b2) {
                    (Some(a), Some(b)) if *take_max => Some(a.max(b)),
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
            (Reducer::Mean { mean }, Reducer::Mean { mean: m2 }) => {
                // 按计数加权重组两个部分均值.
                *mean += (m2 - *mean) * other.count as f64 / total_count as f64;
            }
            (Reducer::Median { samples }, Reducer::Median { samples: s2 }) => {
                samples.extend(s2);
            }
            (
                Reducer::Gaussian { weighted, weight },
                Reducer::Gaussian {
                    weighted: v2,
                    weight: w2,
                },
            ) => {
                *weighted += v2;
                *weight += w2;
            }
            // kind 一致时归约状态的构造必然同型.
            _ => unreachable!(),
        }

        self.count = total_count;
        self.state = AccumState::Accumulating;
        Ok(())
    }

    /// 归约为最终输出值并进入终止态.
    ///
    /// 未收到任何贡献的累加器返回 [`NO_DATA`] 哨兵;
    /// Gaussian 统计量在权重和为 0 时同样返回哨兵.
    /// 重复 finalize 返回 [`TwiError::InvalidState`].
    pub fn finalize(&mut self) -> TwiResult<f32> {
        if self.state == AccumState::Finalized {
            return Err(TwiError::InvalidState("不能重复 finalize"));
        }
        self.state = AccumState::Finalized;

        if self.count == 0 {
            return Ok(NO_DATA);
        }

        let out = match &mut self.red {
            Reducer::Sum { total } => *total,
            Reducer::Extremum { best, .. } => match best {
                Some(b) => *b,
                None => return Ok(NO_DATA),
            },
            Reducer::Mean { mean } => *mean,
            Reducer::Median { samples } => {
                // 该操作不会遇到 NaN (贡献值由上游保证有限), 可直接 unwrap.
                samples.sort_unstable_by_key(|v| NotNan::<f64>::new(*v).unwrap());
                let mid = samples.len() / 2;
                if samples.len() % 2 == 0 {
                    (samples[mid - 1] + samples[mid]) / 2.0
                } else {
                    samples[mid]
                }
            }
            Reducer::Gaussian { weighted, weight } => {
                if *weight > 0.0 {
                    *weighted / *weight
                } else {
                    return Ok(NO_DATA);
                }
            }
        };
        Ok(out as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::is_no_data;
    use StatisticKind::*;

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    /// 依次插入 (等权重) 后 finalize.
    fn reduce(kind: StatisticKind, values: &[f64]) -> f32 {
        let mut acc = VoxelAccumulator::new(kind);
        for v in values {
            acc.insert(*v, 1.0).unwrap();
        }
        acc.finalize().unwrap()
    }

    #[test]
    fn test_basic_reductions() {
        let vals = [2.0, 4.0, 6.0];
        assert!(f32_eq(reduce(Sum, &vals), 12.0));
        assert!(f32_eq(reduce(Min, &vals), 2.0));
        assert!(f32_eq(reduce(Max, &vals), 6.0));
        assert!(f32_eq(reduce(Mean, &vals), 4.0));
        assert!(f32_eq(reduce(Median, &vals), 4.0));

        // fmri 族与普通归约逻辑一致, 只是输入类别不同.
        let signed = [-0.5, 0.25, 0.75];
        assert!(f32_eq(reduce(FmriMin, &signed), -0.5));
        assert!(f32_eq(reduce(FmriMax, &signed), 0.75));
        assert!(f32_eq(reduce(FmriMean, &signed), 1.0 / 6.0));
    }

    /// 中位数: 奇数个取中间, 偶数个取中间两个的平均.
    #[test]
    fn test_median_parity() {
        assert!(f32_eq(reduce(Median, &[1.0, 2.0, 3.0]), 2.0));
        assert!(f32_eq(reduce(Median, &[1.0, 2.0, 3.0, 4.0]), 2.5));
        assert!(f32_eq(reduce(Median, &[5.0]), 5.0));
    }

    /// 任意非空贡献集合, 归约结果与插入顺序无关.
    #[test]
    fn test_order_invariance() {
        let forward = [3.0, -1.0, 7.5, 0.0, 2.25, -6.0];
        let mut backward = forward;
        backward.reverse();

        for kind in [Sum, Min, Mean, Median, Max] {
            assert!(
                f32_eq(reduce(kind, &forward), reduce(kind, &backward)),
                "{kind:?} 的归约不满足顺序无关性",
            );
        }
    }

    /// 未收到任何贡献的累加器, 对每种统计量都 finalize 到哨兵.
    #[test]
    fn test_empty_finalizes_to_sentinel() {
        for kind in StatisticKind::ALL {
            let mut acc = VoxelAccumulator::new(kind);
            assert_eq!(acc.count(), 0);
            let out = acc.finalize().unwrap();
            assert!(is_no_data(out), "{kind:?} 的空归约不是哨兵");
        }
    }

    /// 等权重非零时 Gaussian 退化为 Mean.
    #[test]
    fn test_gaussian_equal_weights_is_mean() {
        let vals = [2.0, 4.0, 6.0, 9.0];

        let mut g = VoxelAccumulator::new(Gaussian);
        for v in vals {
            g.insert(v, 0.37).unwrap();
        }
        assert!(f32_eq(g.finalize().unwrap(), reduce(Mean, &vals)));
    }

    /// 权重和为 0 时 Gaussian 归约到哨兵.
    #[test]
    fn test_gaussian_zero_weight() {
        let mut g = VoxelAccumulator::new(Gaussian);
        g.insert(5.0, 0.0).unwrap();
        g.insert(7.0, 0.0).unwrap();
        assert!(is_no_data(g.finalize().unwrap()));
    }

    /// Gaussian 的加权平均.
    #[test]
    fn test_gaussian_weighted_mean() {
        let mut g = VoxelAccumulator::new(Gaussian);
        g.insert(10.0, 3.0).unwrap();
        g.insert(20.0, 1.0).unwrap();
        assert!(f32_eq(g.finalize().unwrap(), 12.5));
    }

    /// finalize 之后 insert, 对每种统计量都报状态错误.
    #[test]
    fn test_insert_after_finalize() {
        for kind in StatisticKind::ALL {
            let mut acc = VoxelAccumulator::new(kind);
            acc.insert(1.0, 1.0).unwrap();
            acc.finalize().unwrap();
            assert!(
                matches!(acc.insert(1.0, 1.0), Err(TwiError::InvalidState(_))),
                "{kind:?} 允许了 finalize 之后的 insert",
            );
        }
    }

    #[test]
    fn test_double_finalize() {
        let mut acc = VoxelAccumulator::new(Sum);
        acc.insert(1.0, 1.0).unwrap();
        acc.finalize().unwrap();
        assert!(matches!(acc.finalize(), Err(TwiError::InvalidState(_))));
    }

    #[test]
    fn test_merge_kind_mismatch() {
        let mut a = VoxelAccumulator::new(Sum);
        let b = VoxelAccumulator::new(Mean);
        assert!(matches!(a.merge(b), Err(TwiError::InvalidState(_))));
    }

    #[test]
    fn test_merge_after_finalize() {
        let mut a = VoxelAccumulator::new(Sum);
        a.insert(1.0, 1.0).unwrap();
        a.finalize().unwrap();
        assert!(matches!(
            a.merge(VoxelAccumulator::new(Sum)),
            Err(TwiError::InvalidState(_)),
        ));
    }

    /// 同一贡献集合切成两个分片, 合并后 finalize 与单遍插入结果一致.
    #[test]
    fn test_split_merge_equivalence() {
        let vals = [4.0, -2.0, 8.5, 1.0, 0.25, 16.0, -3.5];
        let (left, right) = vals.split_at(3);

        for kind in [Sum, Min, Max, Mean, Gaussian, Median] {
            let mut a = VoxelAccumulator::new(kind);
            let mut b = VoxelAccumulator::new(kind);
            for v in left {
                a.insert(*v, 0.5).unwrap();
            }
            for v in right {
                b.insert(*v, 0.5).unwrap();
            }
            a.merge(b).unwrap();

            let mut whole = VoxelAccumulator::new(kind);
            for v in vals {
                whole.insert(v, 0.5).unwrap();
            }

            assert!(
                f32_eq(a.finalize().unwrap(), whole.finalize().unwrap()),
                "{kind:?} 的分片合并与单遍结果不一致",
            );
        }
    }

    /// 与空分片合并是恒等操作.
    #[test]
    fn test_merge_with_empty() {
        let mut a = VoxelAccumulator::new(Mean);
        a.insert(3.0, 1.0).unwrap();
        a.merge(VoxelAccumulator::new(Mean)).unwrap();
        assert!(f32_eq(a.finalize().unwrap(), 3.0));

        // 空分片吸收非空分片后不再为空.
        let mut empty = VoxelAccumulator::new(Max);
        let mut other = VoxelAccumulator::new(Max);
        other.insert(9.0, 1.0).unwrap();
        empty.merge(other).unwrap();
        assert_eq!(empty.count(), 1);
        assert!(f32_eq(empty.finalize().unwrap(), 9.0));
    }
}
