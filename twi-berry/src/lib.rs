#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 将白质纤维束追踪 (tractography) 产生的流线 (streamline) 投影到体素网格,
//! 生成 track-weighted image (TWI).
//!
//! 该 crate 目前仅提供 `safe` 接口. 将来可能为部分高性能场景关键路径提供 `unsafe` 接口.
//!
//! # 注意
//!
//! 1. 流线文件 (tck/trk) 的解析不在本 crate 范围内. 上游需要将流线以点序列
//!   (毫米空间) 的形式交给本库.
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 开发计划
//!
//! ### Contrast 求值 ✅
//!
//! 将单次流线-体素相交转换为标量贡献值, 共 10 种 contrast.
//!
//! 实现位于 `twi-berry/src/twi/contrast.rs`.
//!
//! ### 单体素流式累加器 ✅
//!
//! 9 种统计量的 streaming reduce, 显式状态机, 以及并行分片的合并规则.
//!
//! 实现位于 `twi-berry/src/twi/accum.rs`.
//!
//! ### 网格聚合驱动 ✅
//!
//! 稀疏 (惰性分配) 的 voxel -> accumulator 映射, 原子化写出,
//! 流线间协作式取消, 以及 `rayon` 特性下的并行分片 + 合并.
//!
//! 实现位于 `twi-berry/src/twi`.
//!
//! ### 流线体素化 ✅
//!
//! 将毫米空间折线切分为逐体素的相交序列 (体素索引, 单位切向量,
//! 体素内线段长度, 到体素中心的距离, 端点标记, 标量采样).
//!
//! 实现位于 `twi-berry/src/track/voxelise.rs`.
//!
//! ### nii 模板网格 ✅
//!
//! 从 nii 模板文件派生输出网格的空间元信息, 聚合结束后写回 nii 文件.
//!
//! 实现位于 `twi-berry/src/data`.
//!
//! ### 统一 filter 契约 ✅
//!
//! 图像到图像 filter 的统一接口: 先报告输出空间参数, 再执行.
//!
//! 实现位于 `twi-berry/src/filter`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 三维体素索引, 同时也可一定程度上用作非负整数向量.
///
/// 轴序固定为 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

/// 毫米空间中的三维点或向量. 轴序与 [`Idx3d`] 一致, 为 `[z, h, w]`.
pub type Point3 = [f64; 3];

pub mod consts;

/// 体素网格基础数据结构.
mod data;

pub use data::{GridGeom, HeaderAttr, TwiGrid};

pub mod track;

pub mod twi;

pub mod filter;

pub mod prelude;
