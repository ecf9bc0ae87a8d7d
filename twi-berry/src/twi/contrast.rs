//! Contrast: 将单次流线-体素相交转换为标量贡献值.

use super::error::{TwiError, TwiResult};
use crate::track::{TrackHit, TrackInfo};
use crate::Point3;

/// Contrast 类型: 单次流线-体素相交产生何种标量贡献.
///
/// 该集合是封闭的. token 映射见 [`ContrastKind::token`], 与命令行约定保持一致.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContrastKind {
    /// 相交计数 (track density). 每次相交贡献常数 1.
    Tdi,

    /// 方向编码的相交计数. 每次运行产生一个颜色通道:
    /// 贡献值为切向量所选分量的绝对值.
    DecTdi,

    /// 端点图. 仅当相交包含流线端点时贡献 1, 否则该相交被整体排除.
    Endpoint,

    /// 平均方向. 贡献切向量所选分量, 求值前对整个向量做半球符号归一化,
    /// 以免方向相反但等价的切向量相互抵消.
    MeanDir,

    /// 流线总长度. 同一条流线的每次相交贡献同一个值.
    Length,

    /// 流线总长度的倒数. 零长度流线属于退化输入.
    InvLength,

    /// 外部标量图在相交处的采样值.
    ScalarMap,

    /// 标量采样计数. 采样存在时贡献 1, 否则该相交被排除.
    /// 用于对 [`ContrastKind::ScalarMap`] 做计数归一化.
    ScalarMapCount,

    /// 沿切向量的 FOD 幅值 (由上游计算, 经标量采样透传).
    FodAmp,

    /// 局部曲率幅值 (由上游计算, 经标量采样透传).
    Curvature,
}

/// 与 [`ContrastKind`] 平行的 token 表, 顺序一致.
pub const CONTRAST_TOKENS: [&str; 10] = [
    "tdi",
    "dectdi",
    "endpoint",
    "mean_dir",
    "length",
    "invlength",
    "scalar_map",
    "scalar_map_count",
    "fod_amp",
    "curvature",
];

impl ContrastKind {
    /// 全部 contrast, 与 [`CONTRAST_TOKENS`] 顺序一致.
    pub const ALL: [ContrastKind; 10] = [
        Self::Tdi,
        Self::DecTdi,
        Self::Endpoint,
        Self::MeanDir,
        Self::Length,
        Self::InvLength,
        Self::ScalarMap,
        Self::ScalarMapCount,
        Self::FodAmp,
        Self::Curvature,
    ];

    /// 该 contrast 的命令行 token.
    pub fn token(self) -> &'static str {
        match self {
            Self::Tdi => "tdi",
            Self::DecTdi => "dectdi",
            Self::Endpoint => "endpoint",
            Self::MeanDir => "mean_dir",
            Self::Length => "length",
            Self::InvLength => "invlength",
            Self::ScalarMap => "scalar_map",
            Self::ScalarMapCount => "scalar_map_count",
            Self::FodAmp => "fod_amp",
            Self::Curvature => "curvature",
        }
    }

    /// 从命令行 token 解析. 未知 token 返回 `None`.
    pub fn from_token(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.token() == s)
    }

    /// 该 contrast 的贡献是否只是计数 (取值恒为 1)?
    ///
    /// 计数型 contrast 不携带每条流线的量级信息,
    /// 因此顺序统计量和核加权对它们没有意义.
    #[inline]
    pub fn is_count_like(self) -> bool {
        matches!(self, Self::Tdi | Self::Endpoint | Self::ScalarMapCount)
    }
}

/// Contrast 求值器. 持有所选 contrast 与方向分量通道.
///
/// 求值是其输入的纯函数, 没有副作用.
#[derive(Copy, Clone, Debug)]
pub struct ContrastEval {
    kind: ContrastKind,
    component: usize,
}

impl ContrastEval {
    /// 初始化, 方向分量通道为 0.
    #[inline]
    pub fn new(kind: ContrastKind) -> Self {
        Self { kind, component: 0 }
    }

    /// 初始化并指定方向分量通道 (0, 1 或 2, 对应 z, h, w).
    /// 通道仅对 [`ContrastKind::DecTdi`] 和 [`ContrastKind::MeanDir`] 有意义.
    pub fn with_component(kind: ContrastKind, component: usize) -> Self {
        assert!(component < 3, "方向分量通道只能是 0, 1 或 2");
        Self { kind, component }
    }

    /// 所选 contrast.
    #[inline]
    pub fn kind(&self) -> ContrastKind {
        self.kind
    }

    /// 所选方向分量通道.
    #[inline]
    pub fn component(&self) -> usize {
        self.component
    }

    /// 对一次相交求贡献值.
    ///
    /// 返回 `Ok(None)` 表示该相交被排除出聚合 (不是错误);
    /// 缺失的可选标量一律按排除处理.
    pub fn evaluate(&self, hit: &TrackHit, info: &TrackInfo) -> TwiResult<Option<f64>> {
        let v = match self.kind {
            ContrastKind::Tdi => Some(1.0),
            ContrastKind::DecTdi => Some(hit.dir[self.component].abs()),
            ContrastKind::Endpoint => hit.endpoint.then_some(1.0),
            ContrastKind::MeanDir => {
                let d = hemisphere_normalise(hit.dir);
                Some(d[self.component])
            }
            ContrastKind::Length => Some(info.total_length),
            ContrastKind::InvLength => {
                if info.total_length <= f64::EPSILON {
                    return Err(TwiError::DegenerateInput(
                        "invlength contrast 遇到零长度流线",
                    ));
                }
                Some(1.0 / info.total_length)
            }
            ContrastKind::ScalarMap | ContrastKind::FodAmp | ContrastKind::Curvature => hit.scalar,
            ContrastKind::ScalarMapCount => hit.scalar.map(|_| 1.0),
        };
        Ok(v)
    }
}

/// 半球符号归一化: 翻转向量使模最大的分量非负.
///
/// 流线的切向量只定义到符号: `d` 与 `-d` 表示同一根纤维的走向.
/// 对方向求平均前必须统一到同一半球, 否则相反符号的贡献会相互抵消.
fn hemisphere_normalise(d: Point3) -> Point3 {
    let lead = (0..3)
        .max_by(|&i, &j| d[i].abs().partial_cmp(&d[j].abs()).unwrap())
        .unwrap();
    if d[lead] < 0.0 {
        [-d[0], -d[1], -d[2]]
    } else {
        d
    }
}
