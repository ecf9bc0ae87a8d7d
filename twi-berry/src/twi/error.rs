//! 聚合运行时错误.

use super::{ContrastKind, StatisticKind};
use crate::Idx3d;

/// 聚合引擎的运行时错误.
#[derive(Debug, Clone, PartialEq)]
pub enum TwiError {
    /// 退化输入. 如 `InvLength` contrast 遇到零长度流线.
    DegenerateInput(&'static str),

    /// 累加器状态机被误用 (finalize 之后 insert, 重复 finalize,
    /// 或合并不同统计量的分片). 属于驱动层的编程错误, 整次运行直接终止.
    InvalidState(&'static str),

    /// contrast 与统计量的组合没有意义.
    UnsupportedCombination(ContrastKind, StatisticKind),

    /// filter 的输出网格形状与参考数据派生的形状不一致.
    ShapeMismatch {
        /// 参考数据派生的形状.
        expected: Idx3d,
        /// 实际输出网格的形状.
        got: Idx3d,
    },
}

/// 聚合引擎的运行时结果.
pub type TwiResult<T> = Result<T, TwiError>;
