//! 把原生格式数据写回 CIFTI 矩阵的对应区段.

use crate::error::AlgorithmError;
use crate::surface::{MetricData, SurfaceLabelData, SurfaceStructure};
use crate::volume::Volume;
use crate::{AlgResult, Idx3d};

use super::{BrainModel, BrainModelKind, CiftiDirection, CiftiFile, CiftiMapping, DenseMap};

fn dense_map(cifti: &CiftiFile, dir: CiftiDirection) -> AlgResult<DenseMap> {
    // 克隆映射, 避免写矩阵时持有对 xml 的借用.
    match cifti.xml().mapping(dir) {
        CiftiMapping::BrainModels(map) => Ok(map.clone()),
        _ => Err(AlgorithmError::NotBrainModels),
    }
}

fn check_columns(
    cifti: &CiftiFile,
    dir: CiftiDirection,
    num_columns: usize,
    what: &str,
) -> AlgResult<()> {
    let orth = cifti.xml().mapping(dir.orthogonal()).len();
    if num_columns != orth {
        return Err(AlgorithmError::MappingMismatch(format!(
            "{what} has {num_columns} columns but orthogonal mapping declares {orth}"
        )));
    }
    Ok(())
}

/// 把 metric 数据写回表面结构的区段. 只读取 model 声明的顶点,
/// 其余顶点的值被忽略.
pub fn replace_surface(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    structure: SurfaceStructure,
    data: &MetricData,
) -> AlgResult<()> {
    replace_surface_columns(
        cifti,
        dir,
        structure,
        data.num_vertices(),
        (0..data.num_columns()).map(|c| data.column(c)),
        "metric data",
    )
}

/// 把 label 数据写回表面结构的区段.
pub fn replace_surface_label(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    structure: SurfaceStructure,
    data: &SurfaceLabelData,
) -> AlgResult<()> {
    replace_surface_columns(
        cifti,
        dir,
        structure,
        data.num_vertices(),
        (0..data.num_columns()).map(|c| data.column(c)),
        "label data",
    )
}

fn replace_surface_columns<'a>(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    structure: SurfaceStructure,
    num_vertices: usize,
    columns: impl ExactSizeIterator<Item = &'a [f32]>,
    what: &str,
) -> AlgResult<()> {
    let columns: Vec<&[f32]> = columns.collect();
    check_columns(cifti, dir, columns.len(), what)?;
    let map = dense_map(cifti, dir)?;
    let model = map.surface_model(structure).ok_or_else(|| {
        AlgorithmError::MappingMismatch(format!("no {structure} surface model in mapping"))
    })?;
    let BrainModelKind::Surface {
        num_vertices: declared,
        vertex_indices,
        ..
    } = model.kind()
    else {
        unreachable!()
    };
    if num_vertices != *declared {
        return Err(AlgorithmError::MappingMismatch(format!(
            "{what} has {num_vertices} vertices but {structure} model declares {declared}"
        )));
    }
    for (c, col) in columns.iter().enumerate() {
        for (local, &vertex) in vertex_indices.iter().enumerate() {
            cifti.set_value(dir, model.start() + local, c, col[vertex]);
        }
    }
    Ok(())
}

/// 把裁剪体数据写回名为 `name` 的体结构区段. `offset` 为裁剪窗口
/// 在完整网格中的偏移 (与分离时返回的一致).
pub fn replace_volume(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    name: &str,
    volume: &Volume,
    offset: Idx3d,
) -> AlgResult<()> {
    let map = dense_map(cifti, dir)?;
    let model = map.volume_model(name).cloned().ok_or_else(|| {
        AlgorithmError::MappingMismatch(format!("no volume model '{name}' in mapping"))
    })?;
    replace_models(cifti, dir, &[model], volume, offset)
}

/// 把合并裁剪体写回全部体结构区段.
pub fn replace_volume_all(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    volume: &Volume,
    offset: Idx3d,
) -> AlgResult<()> {
    let map = dense_map(cifti, dir)?;
    let models: Vec<BrainModel> = map
        .models()
        .iter()
        .filter(|m| matches!(m.kind(), BrainModelKind::Volume { .. }))
        .cloned()
        .collect();
    if models.is_empty() {
        return Err(AlgorithmError::MappingMismatch(
            "mapping has no volume models".into(),
        ));
    }
    replace_models(cifti, dir, &models, volume, offset)
}

fn replace_models(
    cifti: &mut CiftiFile,
    dir: CiftiDirection,
    models: &[BrainModel],
    volume: &Volume,
    offset: Idx3d,
) -> AlgResult<()> {
    check_columns(cifti, dir, volume.num_maps(), "volume data")?;
    let dims = volume.space().dims();
    for model in models {
        let BrainModelKind::Volume { name, voxels } = model.kind() else {
            unreachable!()
        };
        for (local, &(i, j, k)) in voxels.iter().enumerate() {
            let at = [
                i.wrapping_sub(offset.0),
                j.wrapping_sub(offset.1),
                k.wrapping_sub(offset.2),
            ];
            if (0..3).any(|d| at[d] >= dims[d]) {
                return Err(AlgorithmError::MappingMismatch(format!(
                    "voxel of volume model '{name}' falls outside the cropped volume"
                )));
            }
            for c in 0..volume.num_maps() {
                let v = volume.value((at[0], at[1], at[2]), c);
                cifti.set_value(dir, model.start() + local, c, v);
            }
        }
    }
    Ok(())
}
