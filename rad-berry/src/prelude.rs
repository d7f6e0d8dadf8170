//! 🫐欢迎光临🫐
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d, Off3d};

pub use crate::data::{check_pair, GeometryError, GreyVolume, GridAttr, RoiMask, VoxelGrid, Volume};

pub use crate::consts::mask::{is_background, is_in_region, BACKGROUND, IN_REGION};
pub use crate::consts::OUTSIDE_LEVEL;

pub use crate::params::{
    Aggregation, Band, BinScheme, Connectivity, FilterSpec, Interpolation, ParameterSet,
    WaveletKind,
};

pub use crate::resegment::{extract_region, EmptyRegionError, Region};

pub use crate::discretize::discretize;
pub use crate::filters;

pub use crate::record::{FeatureRecord, FeatureRow, FeatureTable, NamingCollisionError};

pub use crate::pipeline::{extract_features, ExtractError};

pub use crate::batch::{
    default_workers, BatchOutcome, BatchRunner, CancelToken, ErrorKind, ExtractionResult,
    ExtractionUnit, UnitError, UnitFailure, UnitKey, UnitState,
};
