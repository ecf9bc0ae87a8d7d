//! 流线体素化: 将毫米空间折线切分为逐体素的相交序列.

use itertools::Itertools;

use super::{dist3, norm3, sub3, walk3, Track, TrackInfo};
use crate::data::GridGeom;
use crate::{Idx3d, Point3};

/// 短于该值的线段 (毫米) 视为退化, 直接跳过.
const SEG_EPS: f64 = 1e-12;

/// 一条流线对一个体素的单次穿越.
///
/// 由体素化步骤瞬态产生, 立即被 contrast 求值消费, 不做持久化.
#[derive(Copy, Clone, Debug)]
pub struct TrackHit {
    /// 目标体素索引.
    pub voxel: Idx3d,

    /// 流线在相交处的单位切向量.
    pub dir: Point3,

    /// 体素内包含的流线长度, 毫米. 恒为正.
    pub seg_length: f64,

    /// 流线线段到体素几何中心的最短距离, 毫米.
    /// Gaussian 统计量以此计算核权重.
    pub center_dist: f64,

    /// 在相交处采样的外部标量 (若流线携带标量序列).
    pub scalar: Option<f64>,

    /// 该相交是否包含流线的端点.
    pub endpoint: bool,
}

/// 体素化结果: 流线级上下文 + 逐体素相交序列.
#[derive(Debug, Clone)]
pub struct MappedTrack {
    /// 流线级上下文.
    pub info: TrackInfo,

    /// 逐体素相交序列, 按沿流线的行进顺序排列.
    pub hits: Vec<TrackHit>,
}

/// 将一条流线体素化.
///
/// 逐线段行进, 在网格边界处切分; 每个被穿过的体素产生一个 [`TrackHit`],
/// 其中记录体素内线段长度、单位切向量、到体素中心的最短距离,
/// 以及在较近折线点上采样的标量. 连续落在同一体素内的相邻子段会被合并.
/// 网格之外的子段被丢弃.
pub fn voxelise(track: &Track, geom: &GridGeom) -> MappedTrack {
    let mut hits: Vec<TrackHit> = Vec::with_capacity(track.len());

    for (seg_idx, (&a, &b)) in track.points().iter().tuple_windows().enumerate() {
        let seg_len = dist3(a, b);
        if seg_len <= SEG_EPS {
            continue;
        }
        let dir = {
            let d = sub3(b, a);
            [d[0] / seg_len, d[1] / seg_len, d[2] / seg_len]
        };

        let mut t0 = 0.0;
        while t0 + SEG_EPS < seg_len {
            let p0 = walk3(a, dir, t0);
            let step = (0..3)
                .map(|axis| axis_crossing(p0[axis], dir[axis], geom.pix_dim()[axis]))
                .fold(f64::INFINITY, f64::min);
            let t1 = (t0 + step).min(seg_len);
            if t1 <= t0 {
                break;
            }

            let mid = walk3(a, dir, (t0 + t1) / 2.0);
            if let Some(voxel) = geom.locate(mid) {
                let p1 = walk3(a, dir, t1);
                let center_dist = point_segment_dist(geom.center(voxel), p0, p1);
                let scalar = track.scalars().map(|s| {
                    // 在较近的折线端点上采样.
                    if (t0 + t1) / 2.0 < seg_len / 2.0 {
                        s[seg_idx]
                    } else {
                        s[seg_idx + 1]
                    }
                });
                push_hit(
                    &mut hits,
                    TrackHit {
                        voxel,
                        dir,
                        seg_length: t1 - t0,
                        center_dist,
                        scalar,
                        endpoint: false,
                    },
                );
            }
            t0 = t1;
        }
    }

    mark_endpoints(&mut hits, track, geom);

    MappedTrack {
        info: track.info(),
        hits,
    }
}

/// 追加一次穿越; 与上一条同体素的穿越合并.
fn push_hit(hits: &mut Vec<TrackHit>, hit: TrackHit) {
    match hits.last_mut() {
        Some(last) if last.voxel == hit.voxel => {
            last.seg_length += hit.seg_length;
            last.center_dist = last.center_dist.min(hit.center_dist);
        }
        _ => hits.push(hit),
    }
}

/// 标记包含流线两个端点的相交.
fn mark_endpoints(hits: &mut [TrackHit], track: &Track, geom: &GridGeom) {
    let points = track.points();
    if points.is_empty() || hits.is_empty() {
        return;
    }

    if let Some(idx) = geom.locate(points[0]) {
        if let Some(first) = hits.first_mut() {
            if first.voxel == idx {
                first.endpoint = true;
            }
        }
    }
    if let Some(idx) = geom.locate(points[points.len() - 1]) {
        if let Some(last) = hits.last_mut() {
            if last.voxel == idx {
                last.endpoint = true;
            }
        }
    }
}

/// 沿某一轴从坐标 `p` 以方向分量 `d` 行进, 到达下一体素边界的路程.
/// 该轴方向分量为 0 时返回无穷大.
fn axis_crossing(p: f64, d: f64, step: f64) -> f64 {
    if d.abs() < SEG_EPS {
        return f64::INFINITY;
    }
    let cell = (p / step).floor();
    let target = if d > 0.0 {
        (cell + 1.0) * step
    } else if (p - cell * step).abs() < step * 1e-9 {
        // 恰好落在边界上, 向负方向要跨过一整格.
        (cell - 1.0) * step
    } else {
        cell * step
    };
    (target - p) / d
}

/// 点 `c` 到线段 `[p0, p1]` 的最短距离.
fn point_segment_dist(c: Point3, p0: Point3, p1: Point3) -> f64 {
    let v = sub3(p1, p0);
    let len2 = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    if len2 < SEG_EPS {
        return dist3(c, p0);
    }
    let u = sub3(c, p0);
    let t = ((u[0] * v[0] + u[1] * v[1] + u[2] * v[2]) / len2).clamp(0.0, 1.0);
    norm3(sub3(u, [v[0] * t, v[1] * t, v[2] * t]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GridGeom;
    use crate::track::Track;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-8
    }

    fn unit_grid(n: usize) -> GridGeom {
        GridGeom::new((n, n, n), [1.0; 3])
    }

    /// 沿 w 轴的直线应依次穿过四个体素, 且体素内长度之和等于折线长度.
    #[test]
    fn test_axis_aligned_walk() {
        let t = Track::new(vec![[0.5, 0.5, 0.5], [0.5, 0.5, 3.5]]);
        let m = voxelise(&t, &unit_grid(4));

        let voxels: Vec<_> = m.hits.iter().map(|h| h.voxel).collect();
        assert_eq!(voxels, [(0, 0, 0), (0, 0, 1), (0, 0, 2), (0, 0, 3)]);

        let lens: Vec<_> = m.hits.iter().map(|h| h.seg_length).collect();
        assert!(f64_eq(lens[0], 0.5));
        assert!(f64_eq(lens[1], 1.0));
        assert!(f64_eq(lens[2], 1.0));
        assert!(f64_eq(lens[3], 0.5));
        assert!(f64_eq(lens.iter().sum::<f64>(), t.total_length()));

        for h in &m.hits {
            assert!(f64_eq(h.dir[0], 0.0));
            assert!(f64_eq(h.dir[1], 0.0));
            assert!(f64_eq(h.dir[2], 1.0));
        }

        // 穿过体素中心的直线, 中间体素的 center_dist 为 0.
        assert!(f64_eq(m.hits[1].center_dist, 0.0));
        assert!(f64_eq(m.hits[2].center_dist, 0.0));
    }

    /// 首尾相交携带端点标记, 中间相交不携带.
    #[test]
    fn test_endpoint_flags() {
        let t = Track::new(vec![[0.5, 0.5, 0.5], [0.5, 0.5, 3.5]]);
        let m = voxelise(&t, &unit_grid(4));

        assert!(m.hits.first().unwrap().endpoint);
        assert!(m.hits.last().unwrap().endpoint);
        for h in &m.hits[1..m.hits.len() - 1] {
            assert!(!h.endpoint);
        }
    }

    /// 同一体素内的多个相邻折线段合并为一次相交.
    #[test]
    fn test_merge_within_voxel() {
        let t = Track::new(vec![
            [0.1, 0.5, 0.5],
            [0.4, 0.5, 0.5],
            [0.9, 0.5, 0.5],
        ]);
        let m = voxelise(&t, &unit_grid(2));

        assert_eq!(m.hits.len(), 1);
        assert_eq!(m.hits[0].voxel, (0, 0, 0));
        assert!(f64_eq(m.hits[0].seg_length, 0.8));
        assert!(m.hits[0].endpoint);
    }

    /// 网格之外的子段被丢弃.
    #[test]
    fn test_outside_dropped() {
        let t = Track::new(vec![[0.5, 0.5, -2.5], [0.5, 0.5, 1.5]]);
        let m = voxelise(&t, &unit_grid(2));

        let voxels: Vec<_> = m.hits.iter().map(|h| h.voxel).collect();
        assert_eq!(voxels, [(0, 0, 0), (0, 0, 1)]);
        // 网格内的部分是 w 从 0.0 到 1.5.
        assert!(f64_eq(m.hits.iter().map(|h| h.seg_length).sum::<f64>(), 1.5));

        // 起点在网格外, 故首个相交没有端点标记; 终点在网格内.
        assert!(!m.hits[0].endpoint);
        assert!(m.hits[1].endpoint);
    }

    /// 标量在较近的折线点上采样.
    #[test]
    fn test_scalar_sampling() {
        let t = Track::with_scalars(
            vec![[0.5, 0.5, 0.2], [0.5, 0.5, 1.8]],
            vec![10.0, 20.0],
        );
        let m = voxelise(&t, &unit_grid(2));

        assert_eq!(m.hits.len(), 2);
        assert_eq!(m.hits[0].scalar, Some(10.0));
        assert_eq!(m.hits[1].scalar, Some(20.0));
    }

    /// 体素分辨率各向异性时, 行进仍然守恒.
    #[test]
    fn test_anisotropic_grid() {
        let geom = GridGeom::new((2, 4, 4), [2.0, 1.0, 1.0]);
        let t = Track::new(vec![[0.5, 2.0, 0.5], [3.5, 2.0, 0.5]]);
        let m = voxelise(&t, &geom);

        let voxels: Vec<_> = m.hits.iter().map(|h| h.voxel).collect();
        assert_eq!(voxels, [(0, 2, 0), (1, 2, 0)]);
        assert!(f64_eq(m.hits.iter().map(|h| h.seg_length).sum::<f64>(), 3.0));
    }
}
