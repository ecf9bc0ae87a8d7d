//! 统计量 (statistic): 将一个体素收到的全部贡献归约为单个输出值.

/// 统计量类型: 同一体素的多次贡献如何归约.
///
/// 该集合是封闭的. token 映射见 [`StatisticKind::token`], 与命令行约定保持一致.
///
/// `Fmri*` 三种统计量的归约逻辑与对应的普通统计量完全相同,
/// 区别只在上游供给的贡献值是逐流线的带符号标量 (如功能信号相关系数),
/// 因此它们只接受标量图 contrast.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StatisticKind {
    /// 贡献值求和.
    Sum,

    /// 贡献值最小值.
    Min,

    /// 贡献值算术平均. 采用增量式均值更新以避免稠密体素上的求和溢出.
    Mean,

    /// 贡献值中位数. 需要保留全部样本, 在 finalize 时排序;
    /// 偶数个样本取中间两个的平均. 这是唯一内存开销与体素密度成正比的统计量.
    Median,

    /// 贡献值最大值.
    Max,

    /// 核加权平均: `Σ(value·weight) / Σ(weight)`,
    /// 权重为流线线段到体素中心距离上的 Gaussian 核值.
    Gaussian,

    /// 带符号标量的最小值.
    FmriMin,

    /// 带符号标量的算术平均.
    FmriMean,

    /// 带符号标量的最大值.
    FmriMax,
}

/// 与 [`StatisticKind`] 平行的 token 表, 顺序一致.
pub const STATISTIC_TOKENS: [&str; 9] = [
    "sum",
    "min",
    "mean",
    "median",
    "max",
    "gaussian",
    "fmri_min",
    "fmri_mean",
    "fmri_max",
];

impl StatisticKind {
    /// 全部统计量, 与 [`STATISTIC_TOKENS`] 顺序一致.
    pub const ALL: [StatisticKind; 9] = [
        Self::Sum,
        Self::Min,
        Self::Mean,
        Self::Median,
        Self::Max,
        Self::Gaussian,
        Self::FmriMin,
        Self::FmriMean,
        Self::FmriMax,
    ];

    /// 该统计量的命令行 token.
    pub fn token(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Max => "max",
            Self::Gaussian => "gaussian",
            Self::FmriMin => "fmri_min",
            Self::FmriMean => "fmri_mean",
            Self::FmriMax => "fmri_max",
        }
    }

    /// 从命令行 token 解析. 未知 token 返回 `None`.
    pub fn from_token(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == s)
    }

    /// 是否为带符号标量 (功能信号) 族统计量?
    #[inline]
    pub fn is_fmri(self) -> bool {
        matches!(self, Self::FmriMin | Self::FmriMean | Self::FmriMax)
    }

    /// 归约是否使用贡献权重?
    #[inline]
    pub fn is_weighted(self) -> bool {
        matches!(self, Self::Gaussian)
    }

    /// 归约是否需要保留全部样本?
    #[inline]
    pub fn retains_samples(self) -> bool {
        matches!(self, Self::Median)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// token 表与枚举必须一一对应且可往返.
    #[test]
    fn test_token_round_trip() {
        assert_eq!(StatisticKind::ALL.len(), STATISTIC_TOKENS.len());
        for (kind, token) in StatisticKind::ALL.into_iter().zip(STATISTIC_TOKENS) {
            assert_eq!(kind.token(), token);
            assert_eq!(StatisticKind::from_token(token), Some(kind));
        }
        assert_eq!(StatisticKind::from_token("p50"), None);
    }

    #[test]
    fn test_classification() {
        assert!(StatisticKind::FmriMean.is_fmri());
        assert!(!StatisticKind::Mean.is_fmri());
        assert!(StatisticKind::Gaussian.is_weighted());
        assert!(StatisticKind::Median.retains_samples());
        assert!(!StatisticKind::Sum.retains_samples());
    }
}
