//! 🧠欢迎光临🧠
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{AlgResult, Idx3d};

pub use crate::error::AlgorithmError;
pub use crate::label::{key_from_value, LabelTable};
pub use crate::locator::PointLocator;

pub use crate::volume::{Volume, VolumeMap, VolumeSpace};

pub use crate::surface::{
    MetricData, SurfaceLabelData, SurfaceMesh, SurfaceStructure,
};

pub use crate::cifti::{
    separate_surface, separate_surface_label, separate_volume, separate_volume_all, BrainModel,
    BrainModelKind, CiftiDirection, CiftiFile, CiftiMapping, CiftiXml, DenseMap, SeparatedVolume,
};

pub use crate::erode::{
    erode_cifti, erode_metric, erode_surface_label, erode_volume, EmptyKind, SurfParam,
    SurfaceParams,
};

pub use crate::resample::{resample_parcels, KernelSize};
