//! 皮层表面网格与逐顶点数据 (metric / label).

use std::fmt;

use crate::label::LabelTable;

/// CIFTI 稠密映射中允许作为表面出现的解剖结构.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SurfaceStructure {
    /// 左侧皮层.
    CortexLeft,

    /// 右侧皮层.
    CortexRight,

    /// 小脑.
    Cerebellum,
}

impl SurfaceStructure {
    /// 三种表面结构, 按稠密映射的惯用顺序.
    pub const ALL: [SurfaceStructure; 3] = [
        SurfaceStructure::CortexLeft,
        SurfaceStructure::CortexRight,
        SurfaceStructure::Cerebellum,
    ];

    /// 结构的规范名 (与 CIFTI XML 中的写法一致).
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceStructure::CortexLeft => "CORTEX_LEFT",
            SurfaceStructure::CortexRight => "CORTEX_RIGHT",
            SurfaceStructure::Cerebellum => "CEREBELLUM",
        }
    }
}

impl fmt::Display for SurfaceStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 三角网格表面.
///
/// 顶点坐标以 mm 为单位. 拓扑在构建后不可变; 邻接表和逐顶点面积
/// (各关联三角形面积的三分之一) 在构建时一次算出.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    vertices: Vec<[f32; 3]>,
    neighbors: Vec<Vec<usize>>,
    vertex_areas: Vec<f32>,
}

impl SurfaceMesh {
    /// 由顶点与三角面构建网格. 面索引越界时 panic.
    pub fn new(vertices: Vec<[f32; 3]>, faces: &[[usize; 3]]) -> Self {
        let n = vertices.len();
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut vertex_areas = vec![0.0f32; n];
        for &[a, b, c] in faces {
            assert!(a < n && b < n && c < n, "面索引越界");
            for &(u, v) in &[(a, b), (b, c), (c, a)] {
                if !neighbors[u].contains(&v) {
                    neighbors[u].push(v);
                }
                if !neighbors[v].contains(&u) {
                    neighbors[v].push(u);
                }
            }
            let third = triangle_area(vertices[a], vertices[b], vertices[c]) / 3.0;
            vertex_areas[a] += third;
            vertex_areas[b] += third;
            vertex_areas[c] += third;
        }
        Self {
            vertices,
            neighbors,
            vertex_areas,
        }
    }

    /// 顶点个数.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// 顶点坐标.
    #[inline]
    pub fn vertex(&self, v: usize) -> [f32; 3] {
        self.vertices[v]
    }

    /// 与 `v` 相邻 (共边) 的顶点.
    #[inline]
    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.neighbors[v]
    }

    /// 顶点的关联面积 (mm^2).
    #[inline]
    pub fn vertex_area(&self, v: usize) -> f32 {
        self.vertex_areas[v]
    }

    /// 两顶点间的欧氏距离 (mm).
    #[inline]
    pub fn edge_length(&self, a: usize, b: usize) -> f32 {
        let pa = self.vertices[a];
        let pb = self.vertices[b];
        let dx = pa[0] - pb[0];
        let dy = pa[1] - pb[1];
        let dz = pa[2] - pb[2];
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

fn triangle_area(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> f32 {
    let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cx = e1[1] * e2[2] - e1[2] * e2[1];
    let cy = e1[2] * e2[0] - e1[0] * e2[2];
    let cz = e1[0] * e2[1] - e1[1] * e2[0];
    0.5 * (cx * cx + cy * cy + cz * cz).sqrt()
}

/// 逐顶点标量数据 (metric), 每列一个 map.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricData {
    names: Vec<String>,
    columns: Vec<Vec<f32>>,
}

impl MetricData {
    /// 由列名与列数据构建. 各列长度必须一致且非零, 否则 panic.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f32>>) -> Self {
        assert_eq!(names.len(), columns.len());
        assert!(!columns.is_empty(), "metric 至少要有一列");
        let n = columns[0].len();
        assert!(columns.iter().all(|c| c.len() == n), "metric 各列长度不一致");
        Self { names, columns }
    }

    /// 顶点个数.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.columns[0].len()
    }

    /// 列个数.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// 第 `col` 列. 越界时 panic.
    #[inline]
    pub fn column(&self, col: usize) -> &[f32] {
        &self.columns[col]
    }

    /// 第 `col` 列的名字.
    #[inline]
    pub fn column_name(&self, col: usize) -> &str {
        &self.names[col]
    }
}

/// 逐顶点 label 数据, 每列一个 map, 各列自带 label 表.
///
/// label 键以 `f32` 保存 (与 CIFTI 矩阵一致), 比较前按
/// [`crate::label::key_from_value`] 取整.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceLabelData {
    names: Vec<String>,
    columns: Vec<Vec<f32>>,
    tables: Vec<LabelTable>,
}

impl SurfaceLabelData {
    /// 由列名, 列数据与各列 label 表构建. 长度不一致时 panic.
    pub fn from_columns(
        names: Vec<String>,
        columns: Vec<Vec<f32>>,
        tables: Vec<LabelTable>,
    ) -> Self {
        assert_eq!(names.len(), columns.len());
        assert_eq!(tables.len(), columns.len());
        assert!(!columns.is_empty(), "label 数据至少要有一列");
        let n = columns[0].len();
        assert!(columns.iter().all(|c| c.len() == n), "label 各列长度不一致");
        Self {
            names,
            columns,
            tables,
        }
    }

    /// 顶点个数.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.columns[0].len()
    }

    /// 列个数.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// 第 `col` 列. 越界时 panic.
    #[inline]
    pub fn column(&self, col: usize) -> &[f32] {
        &self.columns[col]
    }

    /// 第 `col` 列的名字.
    #[inline]
    pub fn column_name(&self, col: usize) -> &str {
        &self.names[col]
    }

    /// 第 `col` 列的 label 表.
    #[inline]
    pub fn table(&self, col: usize) -> &LabelTable {
        &self.tables[col]
    }
}
