//! 运行时错误.

use std::fmt;

use crate::surface::SurfaceStructure;

/// 算法前置条件校验错误.
///
/// 所有变体均在任何输出写入之前同步返回, 不存在部分输出.
/// `Display` 给出面向用户的英文消息, 由上层分发器转写到 stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmError {
    /// 腐蚀距离为负.
    NegativeDistance,

    /// 高斯核尺寸非正或非有限.
    InvalidKernel,

    /// 指定的 subvolume 编号或名字不存在.
    InvalidSubvolume(String),

    /// ROI 体数据与输入体数据的网格空间不一致.
    RoiSpaceMismatch,

    /// 体数据仿射变换不可逆 (spacing 向量退化).
    DegenerateVolumeSpace,

    /// 需要 label 类型的体数据, 但输入不是. 参数指明是哪个输入.
    NotLabelVolume(String),

    /// 两个体数据的网格空间不一致. 参数描述涉及的输入.
    SpaceMismatch(String),

    /// 两个 label 表之间不存在任何名字匹配的 label.
    NoMatchingLabels,

    /// CIFTI 所选方向不是 brain models (稠密 brainordinate) 映射.
    NotBrainModels,

    /// 稠密映射声明了该表面结构, 但调用方没有提供对应表面文件.
    MissingSurface(SurfaceStructure),

    /// 调用方提供的表面顶点数与稠密映射声明的顶点数不一致.
    SurfaceVertexCountMismatch(SurfaceStructure),

    /// corrected-areas metric 的顶点数与表面不一致.
    CorrectedAreasMismatch(SurfaceStructure),

    /// 指定的列编号超出数据列数.
    ColumnOutOfRange(usize),

    /// 数据与映射 / 网格之间的一般性不一致. 参数为具体描述.
    MappingMismatch(String),

    /// 底层容器读取失败. 参数为底层错误描述.
    Container(String),
}

impl fmt::Display for AlgorithmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AlgorithmError::*;
        match self {
            NegativeDistance => write!(f, "distance cannot be negative"),
            InvalidKernel => write!(f, "kernel size must be positive and finite"),
            InvalidSubvolume(sel) => write!(f, "invalid subvolume specified: '{sel}'"),
            RoiSpaceMismatch => {
                write!(f, "roi volume is not in the same volume space as the input")
            }
            DegenerateVolumeSpace => write!(f, "volume has a degenerate affine transform"),
            NotLabelVolume(which) => write!(f, "{which} volume is not of type label"),
            SpaceMismatch(which) => write!(f, "{which} must be in the same volume space"),
            NoMatchingLabels => write!(f, "no matching labels"),
            NotBrainModels => {
                write!(f, "specified direction does not contain brainordinates")
            }
            MissingSurface(s) => write!(f, "{s} surface required but not provided"),
            SurfaceVertexCountMismatch(s) => {
                write!(f, "{s} surface has the wrong number of vertices")
            }
            CorrectedAreasMismatch(s) => write!(
                f,
                "{s} surface and vertex area metric have different number of vertices"
            ),
            ColumnOutOfRange(col) => write!(f, "column index {col} out of range"),
            MappingMismatch(what) => write!(f, "{what}"),
            Container(what) => write!(f, "failed to read container: {what}"),
        }
    }
}

impl std::error::Error for AlgorithmError {}
