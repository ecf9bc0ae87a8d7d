//! 🫐欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point3};

pub use crate::data::{GridGeom, HeaderAttr, TwiGrid};

pub use crate::track::{voxelise, MappedTrack, Track, TrackHit};

pub use crate::twi::{
    ContrastKind, MapReport, MapSpec, MapStatus, StatisticKind, TrackMapper, TwiError, TwiResult,
    VoxelAccumulator, CONTRAST_TOKENS, STATISTIC_TOKENS,
};

pub use crate::filter::{GridFilter, TwiFilter};

pub use crate::consts::{is_defined, is_no_data, DEFAULT_GAUSSIAN_FWHM, NO_DATA};
