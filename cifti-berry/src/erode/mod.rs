//! 空间腐蚀: 体网格, 表面网格, 以及组合 CIFTI 三种域的统一语义.
//!
//! "空值" 即腐蚀的种子: label 数据以 unassigned 键为空, 其余数据以
//! 精确 0.0 为空. 与空值距离不超过给定半径的数据被置空, 其余保持原值.

use crate::label::key_from_value;

mod cifti;
mod surface;
mod volume;

pub use cifti::{erode_cifti, SurfParam, SurfaceParams};
pub use surface::{erode_metric, erode_surface_label};
pub use volume::erode_volume;

/// 数据 "空值" 判定策略, 每个 map 决定一次后贯穿整次腐蚀.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EmptyKind {
    /// 标量数据: 精确 0.0 为空.
    Metric,

    /// label 数据: 取整后等于 unassigned 键为空.
    Label(i32),
}

impl EmptyKind {
    /// `v` 是否视为空.
    #[inline]
    pub fn is_empty(&self, v: f32) -> bool {
        match self {
            EmptyKind::Metric => v == 0.0,
            EmptyKind::Label(unassigned) => key_from_value(v) == *unassigned,
        }
    }

    /// 置空时写入的值.
    #[inline]
    pub fn empty_value(&self) -> f32 {
        match self {
            EmptyKind::Metric => 0.0,
            EmptyKind::Label(unassigned) => *unassigned as f32,
        }
    }
}
