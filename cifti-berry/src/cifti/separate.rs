//! 按结构把 CIFTI 矩阵拆到原生格式 (metric / label / 体数据).

use ndarray::Array3;

use crate::error::AlgorithmError;
use crate::surface::{MetricData, SurfaceLabelData, SurfaceStructure};
use crate::volume::{Volume, VolumeMap};
use crate::{AlgResult, Idx3d};

use super::{BrainModel, BrainModelKind, CiftiDirection, CiftiFile, CiftiMapping, DenseMap};

fn dense_map(cifti: &CiftiFile, dir: CiftiDirection) -> AlgResult<&DenseMap> {
    match cifti.xml().mapping(dir) {
        CiftiMapping::BrainModels(map) => Ok(map),
        _ => Err(AlgorithmError::NotBrainModels),
    }
}

fn surface_model(map: &DenseMap, structure: SurfaceStructure) -> AlgResult<&BrainModel> {
    map.surface_model(structure).ok_or_else(|| {
        AlgorithmError::MappingMismatch(format!("no {structure} surface model in mapping"))
    })
}

/// 提取表面结构的 metric 数据, 以及标记该结构有数据顶点的 ROI 列.
///
/// 输出按表面总顶点数展开, 无数据顶点填 0.0; 列对应正交轴的各索引,
/// 列名取自正交轴映射.
pub fn separate_surface(
    cifti: &CiftiFile,
    dir: CiftiDirection,
    structure: SurfaceStructure,
) -> AlgResult<(MetricData, Vec<f32>)> {
    let map = dense_map(cifti, dir)?;
    let model = surface_model(map, structure)?;
    let BrainModelKind::Surface {
        num_vertices,
        vertex_indices,
        ..
    } = model.kind()
    else {
        unreachable!()
    };
    let orth = cifti.xml().mapping(dir.orthogonal());
    let mut names = Vec::with_capacity(orth.len());
    let mut columns = Vec::with_capacity(orth.len());
    for c in 0..orth.len() {
        let mut col = vec![0.0f32; *num_vertices];
        for (local, &vertex) in vertex_indices.iter().enumerate() {
            col[vertex] = cifti.value(dir, model.start() + local, c);
        }
        names.push(orth.index_name(c));
        columns.push(col);
    }
    let mut roi = vec![0.0f32; *num_vertices];
    for &vertex in vertex_indices {
        roi[vertex] = 1.0;
    }
    Ok((MetricData::from_columns(names, columns), roi))
}

/// 提取表面结构的 label 数据. 正交轴必须是 label 映射, 各列的
/// label 表随列一并带出; 无数据顶点填该列的 unassigned 键.
pub fn separate_surface_label(
    cifti: &CiftiFile,
    dir: CiftiDirection,
    structure: SurfaceStructure,
) -> AlgResult<(SurfaceLabelData, Vec<f32>)> {
    let map = dense_map(cifti, dir)?;
    let model = surface_model(map, structure)?;
    let BrainModelKind::Surface {
        num_vertices,
        vertex_indices,
        ..
    } = model.kind()
    else {
        unreachable!()
    };
    let CiftiMapping::Labels {
        names: map_names,
        tables,
    } = cifti.xml().mapping(dir.orthogonal())
    else {
        return Err(AlgorithmError::MappingMismatch(
            "orthogonal mapping is not a label mapping".into(),
        ));
    };
    let mut names = Vec::with_capacity(map_names.len());
    let mut columns = Vec::with_capacity(map_names.len());
    for (c, table) in tables.iter().enumerate() {
        let mut col = vec![table.unassigned_key() as f32; *num_vertices];
        for (local, &vertex) in vertex_indices.iter().enumerate() {
            col[vertex] = cifti.value(dir, model.start() + local, c);
        }
        names.push(map_names[c].clone());
        columns.push(col);
    }
    let mut roi = vec![0.0f32; *num_vertices];
    for &vertex in vertex_indices {
        roi[vertex] = 1.0;
    }
    Ok((
        SurfaceLabelData::from_columns(names, columns, tables.clone()),
        roi,
    ))
}

/// 体结构分离的结果: 裁剪后的数据体, 同空间的 ROI 体, 以及裁剪
/// 窗口在完整网格中的偏移.
#[derive(Debug, Clone)]
pub struct SeparatedVolume {
    /// 数据体, 每个正交索引一个 subvolume. 正交轴是 label 映射时
    /// 各 map 带相应 label 表.
    pub volume: Volume,

    /// ROI 体: 属于所选结构的体素为 1.0, 其余 0.0.
    pub roi: Volume,

    /// 裁剪窗口原点在完整网格中的体素偏移.
    pub offset: Idx3d,
}

/// 提取名为 `name` 的单个体结构, 裁剪到其包围盒.
pub fn separate_volume(
    cifti: &CiftiFile,
    dir: CiftiDirection,
    name: &str,
) -> AlgResult<SeparatedVolume> {
    let map = dense_map(cifti, dir)?;
    let model = map.volume_model(name).ok_or_else(|| {
        AlgorithmError::MappingMismatch(format!("no volume model '{name}' in mapping"))
    })?;
    separate_models(cifti, dir, map, &[model])
}

/// 提取全部体结构到同一个裁剪体 (合并包围盒).
pub fn separate_volume_all(cifti: &CiftiFile, dir: CiftiDirection) -> AlgResult<SeparatedVolume> {
    let map = dense_map(cifti, dir)?;
    let models: Vec<&BrainModel> = map
        .models()
        .iter()
        .filter(|m| matches!(m.kind(), BrainModelKind::Volume { .. }))
        .collect();
    if models.is_empty() {
        return Err(AlgorithmError::MappingMismatch(
            "mapping has no volume models".into(),
        ));
    }
    separate_models(cifti, dir, map, &models)
}

fn separate_models(
    cifti: &CiftiFile,
    dir: CiftiDirection,
    map: &DenseMap,
    models: &[&BrainModel],
) -> AlgResult<SeparatedVolume> {
    let space = map.volume_space().ok_or_else(|| {
        AlgorithmError::MappingMismatch("volume models declared without a volume space".into())
    })?;

    // 所选结构体素的联合包围盒.
    let mut lo = space.dims();
    let mut hi = [0usize; 3];
    for model in models {
        let BrainModelKind::Volume { voxels, .. } = model.kind() else {
            unreachable!()
        };
        for &(i, j, k) in voxels {
            let v = [i, j, k];
            for d in 0..3 {
                lo[d] = lo[d].min(v[d]);
                hi[d] = hi[d].max(v[d]);
            }
        }
    }
    let offset = (lo[0], lo[1], lo[2]);
    let dims = [hi[0] - lo[0] + 1, hi[1] - lo[1] + 1, hi[2] - lo[2] + 1];
    let cropped = space.crop(offset, dims);

    let orth = cifti.xml().mapping(dir.orthogonal());
    let tables = match orth {
        CiftiMapping::Labels { tables, .. } => Some(tables),
        _ => None,
    };
    let mut maps: Vec<VolumeMap> = (0..orth.len())
        .map(|c| VolumeMap {
            name: orth.index_name(c),
            data: match tables {
                Some(t) => Array3::from_elem(
                    (dims[0], dims[1], dims[2]),
                    t[c].unassigned_key() as f32,
                ),
                None => Array3::zeros((dims[0], dims[1], dims[2])),
            },
            labels: tables.map(|t| t[c].clone()),
        })
        .collect();
    let mut roi_data = Array3::zeros((dims[0], dims[1], dims[2]));

    for model in models {
        let BrainModelKind::Volume { voxels, .. } = model.kind() else {
            unreachable!()
        };
        for (local, &(i, j, k)) in voxels.iter().enumerate() {
            let at = [i - lo[0], j - lo[1], k - lo[2]];
            for (c, m) in maps.iter_mut().enumerate() {
                m.data[at] = cifti.value(dir, model.start() + local, c);
            }
            roi_data[at] = 1.0;
        }
    }

    let roi = Volume::new(
        cropped.clone(),
        vec![VolumeMap {
            name: "roi".into(),
            data: roi_data,
            labels: None,
        }],
    );
    Ok(SeparatedVolume {
        volume: Volume::new(cropped, maps),
        roi,
        offset,
    })
}
