//! 表面网格腐蚀引擎.
//!
//! 网格自带邻接, 空值沿边以 Dijkstra 传播, 无需体引擎那样的面邻
//! 回退. 边权为顶点间欧氏距离, 可选地乘以校正面积因子, 用于组平均
//! 表面等边长不反映真实皮层距离的场合 (近似).

use binary_heap_plus::BinaryHeap;

use crate::error::AlgorithmError;
use crate::surface::{MetricData, SurfaceLabelData, SurfaceMesh};
use crate::AlgResult;

use super::EmptyKind;

/// 多源 Dijkstra: 各顶点到最近种子的测地距离, 超过 `max_dist` 的
/// 顶点不再展开, 返回值为 `f32::INFINITY`.
fn distances_from_seeds(
    mesh: &SurfaceMesh,
    seeds: &[usize],
    corrected_areas: Option<&[f32]>,
    max_dist: f32,
) -> Vec<f32> {
    let edge_factor = |a: usize, b: usize| match corrected_areas {
        Some(corr) => {
            (corr[a].sqrt() + corr[b].sqrt())
                / (mesh.vertex_area(a).sqrt() + mesh.vertex_area(b).sqrt())
        }
        None => 1.0,
    };
    let mut dist = vec![f32::INFINITY; mesh.num_vertices()];
    let mut heap = BinaryHeap::new_by(|a: &(f32, usize), b: &(f32, usize)| b.0.total_cmp(&a.0));
    for &s in seeds {
        dist[s] = 0.0;
        heap.push((0.0, s));
    }
    while let Some((d, v)) = heap.pop() {
        if d > dist[v] {
            continue;
        }
        for &n in mesh.neighbors(v) {
            let nd = d + mesh.edge_length(v, n) * edge_factor(v, n);
            if nd <= max_dist && nd < dist[n] {
                dist[n] = nd;
                heap.push((nd, n));
            }
        }
    }
    dist
}

struct Checked<'a> {
    columns: Vec<usize>,
    roi: Option<&'a [f32]>,
    corrected_areas: Option<&'a [f32]>,
}

fn check_common<'a>(
    mesh: &SurfaceMesh,
    num_vertices: usize,
    num_columns: usize,
    distance: f32,
    column: Option<usize>,
    roi: Option<&'a [f32]>,
    corrected_areas: Option<&'a [f32]>,
) -> AlgResult<Checked<'a>> {
    if !(distance >= 0.0) || !distance.is_finite() {
        return Err(AlgorithmError::NegativeDistance);
    }
    if num_vertices != mesh.num_vertices() {
        return Err(AlgorithmError::MappingMismatch(format!(
            "data has {num_vertices} vertices but surface has {}",
            mesh.num_vertices()
        )));
    }
    if let Some(c) = column {
        if c >= num_columns {
            return Err(AlgorithmError::ColumnOutOfRange(c));
        }
    }
    if let Some(r) = roi {
        if r.len() != mesh.num_vertices() {
            return Err(AlgorithmError::MappingMismatch(format!(
                "roi has {} values but surface has {} vertices",
                r.len(),
                mesh.num_vertices()
            )));
        }
    }
    if let Some(corr) = corrected_areas {
        if corr.len() != mesh.num_vertices() {
            return Err(AlgorithmError::MappingMismatch(format!(
                "corrected areas have {} values but surface has {} vertices",
                corr.len(),
                mesh.num_vertices()
            )));
        }
    }
    let columns = match column {
        Some(c) => vec![c],
        None => (0..num_columns).collect(),
    };
    Ok(Checked {
        columns,
        roi,
        corrected_areas,
    })
}

/// 单列腐蚀: 种子为 ROI 内的空值顶点, 测地距离不超过 `distance` 的
/// ROI 内顶点置空, 其余照抄. 传播路径不受 ROI 限制.
fn erode_column(
    mesh: &SurfaceMesh,
    values: &[f32],
    kind: EmptyKind,
    distance: f32,
    roi: Option<&[f32]>,
    corrected_areas: Option<&[f32]>,
) -> Vec<f32> {
    let in_roi = |v: usize| roi.map_or(true, |r| r[v] > 0.0);
    let seeds: Vec<usize> = (0..mesh.num_vertices())
        .filter(|&v| in_roi(v) && kind.is_empty(values[v]))
        .collect();
    let dist = distances_from_seeds(mesh, &seeds, corrected_areas, distance);
    (0..mesh.num_vertices())
        .map(|v| {
            if in_roi(v) && dist[v] <= distance {
                kind.empty_value()
            } else {
                values[v]
            }
        })
        .collect()
}

/// 腐蚀表面 metric 数据 (空值为精确 0.0).
///
/// `column` 给定时只处理并输出该列. `roi` 与 `corrected_areas` 的
/// 长度必须等于表面顶点数.
pub fn erode_metric(
    mesh: &SurfaceMesh,
    data: &MetricData,
    distance: f32,
    column: Option<usize>,
    roi: Option<&[f32]>,
    corrected_areas: Option<&[f32]>,
) -> AlgResult<MetricData> {
    let checked = check_common(
        mesh,
        data.num_vertices(),
        data.num_columns(),
        distance,
        column,
        roi,
        corrected_areas,
    )?;
    let mut names = Vec::with_capacity(checked.columns.len());
    let mut columns = Vec::with_capacity(checked.columns.len());
    for &c in &checked.columns {
        names.push(data.column_name(c).to_owned());
        columns.push(erode_column(
            mesh,
            data.column(c),
            EmptyKind::Metric,
            distance,
            checked.roi,
            checked.corrected_areas,
        ));
    }
    Ok(MetricData::from_columns(names, columns))
}

/// 腐蚀表面 label 数据 (每列以其 label 表的 unassigned 键为空).
pub fn erode_surface_label(
    mesh: &SurfaceMesh,
    data: &SurfaceLabelData,
    distance: f32,
    column: Option<usize>,
    roi: Option<&[f32]>,
    corrected_areas: Option<&[f32]>,
) -> AlgResult<SurfaceLabelData> {
    let checked = check_common(
        mesh,
        data.num_vertices(),
        data.num_columns(),
        distance,
        column,
        roi,
        corrected_areas,
    )?;
    let mut names = Vec::with_capacity(checked.columns.len());
    let mut columns = Vec::with_capacity(checked.columns.len());
    let mut tables = Vec::with_capacity(checked.columns.len());
    for &c in &checked.columns {
        let kind = EmptyKind::Label(data.table(c).unassigned_key());
        names.push(data.column_name(c).to_owned());
        columns.push(erode_column(
            mesh,
            data.column(c),
            kind,
            distance,
            checked.roi,
            checked.corrected_areas,
        ));
        tables.push(data.table(c).clone());
    }
    Ok(SurfaceLabelData::from_columns(names, columns, tables))
}
