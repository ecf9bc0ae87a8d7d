//! 通用常量.

/// "无数据" 哨兵值.
///
/// 聚合过程中从未收到任何贡献的累加器会 finalize 到该值,
/// 以便下游 mask 操作区分 "被流线经过且值恰为 0" 和 "从未被经过".
/// 注意 NaN 不能用 `==` 比较, 判断时请使用 [`is_no_data`].
pub const NO_DATA: f32 = f32::NAN;

/// Gaussian 统计量的默认核宽度 (FWHM), 以毫米为单位.
pub const DEFAULT_GAUSSIAN_FWHM: f64 = 4.0;

/// 体素值是否为 "无数据" 哨兵?
#[inline]
pub fn is_no_data(v: f32) -> bool {
    v.is_nan()
}

/// 体素值是否为有效数据 (非哨兵)?
#[inline]
pub fn is_defined(v: f32) -> bool {
    !is_no_data(v)
}
