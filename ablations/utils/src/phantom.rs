//! 确定性 phantom 流线束.
//!
//! 消融实验不依赖真实 tractography 数据: 这里用三角函数拼出
//! 一束螺旋线加一束直线扇形, 参数固定, 任意两次运行完全一致.

use std::f64::consts::PI;

use twi_berry::prelude::*;

/// phantom 网格的边长 (体素数).
pub const GRID_LEN: usize = 32;

/// 构建 phantom 输出网格: 各向同性 1mm, `GRID_LEN`^3.
pub fn grid() -> TwiGrid {
    TwiGrid::fake((GRID_LEN, GRID_LEN, GRID_LEN), [1.0; 3])
}

/// 构建 `n` 条确定性流线, 每条携带与点对齐的标量
/// (模拟沿纤维采样的外部标量图).
///
/// 前一半是绕网格中轴的螺旋线, 后一半是穿过网格中心的直线扇形.
pub fn bundle(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| {
            if i % 2 == 0 {
                helix_track(i)
            } else {
                fan_track(i)
            }
        })
        .collect()
}

/// 绕 z 中轴的螺旋线. 半径与初相位由 `seed` 决定.
fn helix_track(seed: usize) -> Track {
    let c = GRID_LEN as f64 / 2.0;
    let radius = 4.0 + (seed % 7) as f64;
    let phase = seed as f64 * PI / 8.0;

    let mut points = Vec::new();
    let mut scalars = Vec::new();
    let mut z = 2.0;
    while z <= GRID_LEN as f64 - 2.0 {
        let theta = phase + z * 0.35;
        points.push([z, c + radius * theta.cos(), c + radius * theta.sin()]);
        scalars.push(1.0 + (theta * 0.5).sin().abs());
        z += 0.5;
    }
    Track::with_scalars(points, scalars)
}

/// 穿过网格中心的直线. 方向由 `seed` 决定.
fn fan_track(seed: usize) -> Track {
    let c = GRID_LEN as f64 / 2.0;
    let theta = seed as f64 * PI / 11.0;
    let (dh, dw) = (theta.cos(), theta.sin());
    let half = GRID_LEN as f64 / 2.0 - 2.0;

    let mut points = Vec::new();
    let mut scalars = Vec::new();
    let mut t = -half;
    while t <= half {
        points.push([c, c + dh * t, c + dw * t]);
        scalars.push(0.5 + 0.01 * t);
        t += 0.5;
    }
    Track::with_scalars(points, scalars)
}
