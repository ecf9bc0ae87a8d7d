//! 图像到图像 filter 的统一契约.
//!
//! 所有 filter 遵循同一使用模式: 从参考数据集构造 (复制其空间元信息),
//! 在分配输出之前报告派生的输出空间参数, 最后对校验过的输入/输出执行.
//!
//! 典型用法:
//!
//! ```no_run
//! use twi_berry::filter::{GridFilter, TwiFilter};
//! use twi_berry::twi::{ContrastKind, MapSpec, StatisticKind};
//! use twi_berry::TwiGrid;
//!
//! let template = TwiGrid::from_template("template.nii.gz").unwrap();
//! let spec = MapSpec::new(ContrastKind::Tdi, StatisticKind::Sum).unwrap();
//! let filter = TwiFilter::new(&template, spec);
//!
//! // 输出网格沿用 filter 报告的空间参数, 聚合前由调用者预填充.
//! let mut output = template.clone();
//! output.fill(0.0);
//! let tracks = vec![];
//! filter.execute(&tracks, &mut output).unwrap();
//! ```

use crate::data::{GridGeom, HeaderAttr, TwiGrid};
use crate::track::Track;
use crate::twi::{MapReport, MapSpec, TrackMapper, TwiError, TwiResult};
use crate::Idx3d;

/// 图像到图像 filter 的统一契约.
///
/// 实现者在执行前即可报告输出图像的派生空间参数,
/// 以便调用者先分配输出再执行.
pub trait GridFilter {
    /// 输出图像的形状, 轴序 `(z, h, w)`.
    fn output_shape(&self) -> Idx3d;

    /// 输出图像的体素分辨率, 轴序 `[z, h, w]`, 毫米.
    fn output_pix_dim(&self) -> [f64; 3];

    /// 对输入流线集合执行, 将结果写入 `output`.
    ///
    /// `output` 的形状必须与 [`GridFilter::output_shape`] 一致.
    fn execute(&self, tracks: &[Track], output: &mut TwiGrid) -> TwiResult<MapReport>;
}

/// Track-weighted imaging filter: 聚合引擎的 filter 形态.
///
/// 从参考数据集构造, 输出网格沿用参考的形状与体素分辨率.
#[derive(Copy, Clone, Debug)]
pub struct TwiFilter {
    geom: GridGeom,
    mapper: TrackMapper,
}

impl TwiFilter {
    /// 从参考数据集构造, 复制其空间元信息.
    #[inline]
    pub fn new<D: HeaderAttr>(reference: &D, spec: MapSpec) -> Self {
        Self::from_geom(reference.geom(), spec)
    }

    /// 直接从网格几何信息构造.
    #[inline]
    pub fn from_geom(geom: GridGeom, spec: MapSpec) -> Self {
        Self {
            geom,
            mapper: TrackMapper::new(spec),
        }
    }

    /// 运行配置.
    #[inline]
    pub fn spec(&self) -> &MapSpec {
        self.mapper.spec()
    }
}

impl GridFilter for TwiFilter {
    #[inline]
    fn output_shape(&self) -> Idx3d {
        self.geom.shape()
    }

    #[inline]
    fn output_pix_dim(&self) -> [f64; 3] {
        self.geom.pix_dim()
    }

    fn execute(&self, tracks: &[Track], output: &mut TwiGrid) -> TwiResult<MapReport> {
        if output.shape() != self.geom.shape() {
            return Err(TwiError::ShapeMismatch {
                expected: self.geom.shape(),
                got: output.shape(),
            });
        }
        self.mapper.run_tracks(tracks.iter(), output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::twi::{ContrastKind, StatisticKind};

    fn tdi_spec() -> MapSpec {
        MapSpec::new(ContrastKind::Tdi, StatisticKind::Sum).unwrap()
    }

    /// filter 报告的输出参数来自参考数据集.
    #[test]
    fn test_output_params_from_reference() {
        let reference = TwiGrid::fake((4, 8, 8), [2.0, 1.0, 1.0]);
        let filter = TwiFilter::new(&reference, tdi_spec());

        assert_eq!(filter.output_shape(), (4, 8, 8));
        let [pz, ph, pw] = filter.output_pix_dim();
        assert!((pz - 2.0).abs() < 1e-8);
        assert!((ph - 1.0).abs() < 1e-8);
        assert!((pw - 1.0).abs() < 1e-8);
    }

    /// 输出网格形状不一致时拒绝执行.
    #[test]
    fn test_shape_mismatch() {
        let reference = TwiGrid::fake((4, 4, 4), [1.0; 3]);
        let filter = TwiFilter::new(&reference, tdi_spec());

        let mut wrong = TwiGrid::fake((2, 4, 4), [1.0; 3]);
        let err = filter.execute(&[], &mut wrong).unwrap_err();
        assert_eq!(
            err,
            TwiError::ShapeMismatch {
                expected: (4, 4, 4),
                got: (2, 4, 4),
            },
        );
    }

    /// 端到端: filter 形态与直接驱动结果一致.
    #[test]
    fn test_execute_matches_mapper() {
        let reference = TwiGrid::fake((1, 1, 4), [1.0; 3]);
        let filter = TwiFilter::new(&reference, tdi_spec());

        let tracks = vec![Track::new(vec![[0.5, 0.5, 0.1], [0.5, 0.5, 3.9]])];
        let mut out = TwiGrid::fake(filter.output_shape(), [1.0; 3]);
        let rep = filter.execute(&tracks, &mut out).unwrap();

        assert_eq!(rep.touched, 4);
        for w in 0..4 {
            assert!((out[(0, 0, w)] - 1.0).abs() < 1e-6);
        }
    }
}
