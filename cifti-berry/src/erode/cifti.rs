//! CIFTI 腐蚀编排: 拆分 -> 逐结构腐蚀 -> 写回.

use crate::cifti::{
    replace_surface, replace_surface_label, replace_volume, replace_volume_all, separate_surface,
    separate_surface_label, separate_volume, separate_volume_all, BrainModelKind, CiftiDirection,
    CiftiFile, CiftiMapping,
};
use crate::error::AlgorithmError;
use crate::surface::{SurfaceMesh, SurfaceStructure};
use crate::AlgResult;

use super::surface::{erode_metric, erode_surface_label};
use super::volume::erode_volume;

/// 单个表面结构的调用方输入: 网格, 可选的校正顶点面积.
#[derive(Debug, Clone)]
pub struct SurfParam {
    /// 表面网格, 顶点数必须与稠密映射声明一致.
    pub mesh: SurfaceMesh,

    /// 校正顶点面积 (组平均表面用), 长度必须等于顶点数.
    pub corrected_areas: Option<Vec<f32>>,
}

impl SurfParam {
    /// 无校正面积的表面输入.
    pub fn new(mesh: SurfaceMesh) -> Self {
        Self {
            mesh,
            corrected_areas: None,
        }
    }
}

/// 各解剖结构的表面输入. 映射里声明了哪些表面结构, 调用方就必须
/// 提供哪些; 多余的输入被忽略.
#[derive(Debug, Clone, Default)]
pub struct SurfaceParams {
    /// 左侧皮层.
    pub left: Option<SurfParam>,

    /// 右侧皮层.
    pub right: Option<SurfParam>,

    /// 小脑.
    pub cerebellum: Option<SurfParam>,
}

impl SurfaceParams {
    fn get(&self, structure: SurfaceStructure) -> Option<&SurfParam> {
        match structure {
            SurfaceStructure::CortexLeft => self.left.as_ref(),
            SurfaceStructure::CortexRight => self.right.as_ref(),
            SurfaceStructure::Cerebellum => self.cerebellum.as_ref(),
        }
    }
}

/// 腐蚀 CIFTI 稠密矩阵的 `direction` 轴: 表面结构以测地距离
/// `surface_distance` (mm) 腐蚀, 体结构以物理距离 `volume_distance`
/// (mm) 腐蚀. 正交轴是 label 映射时按 label 语义处理, 否则按 metric.
///
/// `merged_volume` 为真时全部体结构合并为一个腐蚀域 (结构之间的空值
/// 可以互相侵蚀), 否则逐结构独立腐蚀, 各用自己的 ROI.
///
/// 全部校验先于任何输出写入完成: 轴映射类型, 每个声明的表面结构都
/// 有网格且顶点数吻合, 校正面积逐顶点吻合. 输出的映射声明与输入
/// 完全一致.
pub fn erode_cifti(
    cifti_in: &CiftiFile,
    direction: CiftiDirection,
    surface_distance: f32,
    volume_distance: f32,
    surfaces: &SurfaceParams,
    merged_volume: bool,
) -> AlgResult<CiftiFile> {
    if !(surface_distance >= 0.0) || !(volume_distance >= 0.0) {
        return Err(AlgorithmError::NegativeDistance);
    }
    let CiftiMapping::BrainModels(map) = cifti_in.xml().mapping(direction) else {
        return Err(AlgorithmError::NotBrainModels);
    };

    // 校验全部表面输入, 之后才动输出.
    let surface_structures: Vec<SurfaceStructure> = map.surface_structures().collect();
    for &structure in &surface_structures {
        let declared = match map.surface_model(structure).map(|m| m.kind()) {
            Some(BrainModelKind::Surface { num_vertices, .. }) => *num_vertices,
            _ => unreachable!("structure came from this mapping"),
        };
        let param = surfaces
            .get(structure)
            .ok_or(AlgorithmError::MissingSurface(structure))?;
        if param.mesh.num_vertices() != declared {
            return Err(AlgorithmError::SurfaceVertexCountMismatch(structure));
        }
        if let Some(corr) = &param.corrected_areas {
            if corr.len() != declared {
                return Err(AlgorithmError::CorrectedAreasMismatch(structure));
            }
        }
    }
    let volume_names: Vec<String> = map.volume_names().map(str::to_owned).collect();
    let has_volume = !volume_names.is_empty();
    let label_data = matches!(
        cifti_in.xml().mapping(direction.orthogonal()),
        CiftiMapping::Labels { .. }
    );

    // 映射声明照抄, 矩阵逐结构重写.
    let mut out = cifti_in.clone();
    for &structure in &surface_structures {
        let param = surfaces.get(structure).unwrap();
        let corr = param.corrected_areas.as_deref();
        if label_data {
            let (data, roi) = separate_surface_label(cifti_in, direction, structure)?;
            let eroded = erode_surface_label(
                &param.mesh,
                &data,
                surface_distance,
                None,
                Some(&roi),
                corr,
            )?;
            replace_surface_label(&mut out, direction, structure, &eroded)?;
        } else {
            let (data, roi) = separate_surface(cifti_in, direction, structure)?;
            let eroded =
                erode_metric(&param.mesh, &data, surface_distance, None, Some(&roi), corr)?;
            replace_surface(&mut out, direction, structure, &eroded)?;
        }
    }
    if has_volume {
        if merged_volume {
            let sep = separate_volume_all(cifti_in, direction)?;
            let eroded = erode_volume(&sep.volume, volume_distance, None, Some(&sep.roi))?;
            replace_volume_all(&mut out, direction, &eroded, sep.offset)?;
        } else {
            for name in &volume_names {
                let sep = separate_volume(cifti_in, direction, name)?;
                let eroded = erode_volume(&sep.volume, volume_distance, None, Some(&sep.roi))?;
                replace_volume(&mut out, direction, name, &eroded, sep.offset)?;
            }
        }
    }
    Ok(out)
}
