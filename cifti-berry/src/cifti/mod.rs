//! CIFTI 稠密矩阵: 2D 矩阵加两条轴的映射声明.
//!
//! 容器的 XML 解析由外部协作方完成, 本模块只建模其逻辑结构:
//! 稠密 brain models 映射把一条轴划分成若干表面结构与体结构,
//! 各结构占据互不相交的连续索引区段.

use ndarray::Array2;

use crate::error::AlgorithmError;
use crate::label::LabelTable;
use crate::surface::SurfaceStructure;
use crate::volume::VolumeSpace;
use crate::{AlgResult, Idx3d};

mod replace;
mod separate;

pub use replace::{replace_surface, replace_surface_label, replace_volume, replace_volume_all};
pub use separate::{
    separate_surface, separate_surface_label, separate_volume, separate_volume_all,
    SeparatedVolume,
};

/// 矩阵的一条轴.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CiftiDirection {
    /// 行轴 (矩阵第 0 维的索引含义).
    Row,

    /// 列轴 (矩阵第 1 维的索引含义).
    Column,
}

impl CiftiDirection {
    /// 与之正交的另一条轴.
    #[inline]
    pub fn orthogonal(&self) -> CiftiDirection {
        match self {
            CiftiDirection::Row => CiftiDirection::Column,
            CiftiDirection::Column => CiftiDirection::Row,
        }
    }
}

/// 稠密映射中的单个 brain model 的内容.
#[derive(Debug, Clone, PartialEq)]
pub enum BrainModelKind {
    /// 表面结构: 声明总顶点数, 以及实际携带数据的顶点子集 (升序).
    Surface {
        /// 解剖结构.
        structure: SurfaceStructure,
        /// 该表面的总顶点数. 调用方提供的表面文件必须与之一致.
        num_vertices: usize,
        /// 携带数据的顶点编号, 严格升序.
        vertex_indices: Vec<usize>,
    },

    /// 体结构: 在共享体网格上占据的体素集合.
    Volume {
        /// 结构名 (如 "THALAMUS_LEFT").
        name: String,
        /// 该结构的体素索引, 顺序即数据顺序.
        voxels: Vec<Idx3d>,
    },
}

/// 稠密映射中的单个 brain model: 内容加上它在轴上的起始偏移.
#[derive(Debug, Clone, PartialEq)]
pub struct BrainModel {
    start: usize,
    kind: BrainModelKind,
}

impl BrainModel {
    /// 该 model 在轴上的起始索引.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// 该 model 占据的索引个数.
    pub fn len(&self) -> usize {
        match &self.kind {
            BrainModelKind::Surface { vertex_indices, .. } => vertex_indices.len(),
            BrainModelKind::Volume { voxels, .. } => voxels.len(),
        }
    }

    /// 该 model 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// model 内容.
    #[inline]
    pub fn kind(&self) -> &BrainModelKind {
        &self.kind
    }
}

/// 一条轴的稠密 brain models 映射.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMap {
    models: Vec<BrainModel>,
    volume_space: Option<VolumeSpace>,
}

impl DenseMap {
    /// 由有序的 model 内容构建稠密映射, 起始偏移按声明顺序累加.
    ///
    /// 校验: 含体结构时必须提供 `volume_space` 且体素落在网格内;
    /// 表面顶点子集须严格升序且小于声明的顶点数; 同一结构不得重复.
    pub fn new(kinds: Vec<BrainModelKind>, volume_space: Option<VolumeSpace>) -> AlgResult<Self> {
        let mut models = Vec::with_capacity(kinds.len());
        let mut start = 0usize;
        for kind in kinds {
            match &kind {
                BrainModelKind::Surface {
                    structure,
                    num_vertices,
                    vertex_indices,
                } => {
                    let ascending = vertex_indices.windows(2).all(|w| w[0] < w[1]);
                    if !ascending || vertex_indices.last().is_some_and(|&v| v >= *num_vertices) {
                        return Err(AlgorithmError::MappingMismatch(format!(
                            "invalid vertex list for {structure} surface model"
                        )));
                    }
                    if models.iter().any(|m: &BrainModel| {
                        matches!(m.kind(), BrainModelKind::Surface { structure: s, .. } if s == structure)
                    }) {
                        return Err(AlgorithmError::MappingMismatch(format!(
                            "duplicate {structure} surface model"
                        )));
                    }
                }
                BrainModelKind::Volume { name, voxels } => {
                    let Some(space) = volume_space.as_ref() else {
                        return Err(AlgorithmError::MappingMismatch(
                            "volume models declared without a volume space".into(),
                        ));
                    };
                    let [di, dj, dk] = space.dims();
                    if voxels.iter().any(|&(i, j, k)| i >= di || j >= dj || k >= dk) {
                        return Err(AlgorithmError::MappingMismatch(format!(
                            "voxel out of grid bounds in volume model '{name}'"
                        )));
                    }
                    if models.iter().any(|m: &BrainModel| {
                        matches!(m.kind(), BrainModelKind::Volume { name: n, .. } if n == name)
                    }) {
                        return Err(AlgorithmError::MappingMismatch(format!(
                            "duplicate volume model '{name}'"
                        )));
                    }
                }
            }
            let model = BrainModel { start, kind };
            start += model.len();
            models.push(model);
        }
        Ok(Self {
            models,
            volume_space,
        })
    }

    /// 轴上的 brainordinate 总数.
    pub fn len(&self) -> usize {
        self.models.iter().map(BrainModel::len).sum()
    }

    /// 映射是否不含任何 brainordinate.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// 全部 model, 按轴上顺序.
    #[inline]
    pub fn models(&self) -> &[BrainModel] {
        &self.models
    }

    /// 体结构共享的网格空间.
    #[inline]
    pub fn volume_space(&self) -> Option<&VolumeSpace> {
        self.volume_space.as_ref()
    }

    /// 按声明顺序迭代表面 model 的结构名.
    pub fn surface_structures(&self) -> impl Iterator<Item = SurfaceStructure> + '_ {
        self.models.iter().filter_map(|m| match m.kind() {
            BrainModelKind::Surface { structure, .. } => Some(*structure),
            _ => None,
        })
    }

    /// 按声明顺序迭代体 model 的结构名.
    pub fn volume_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().filter_map(|m| match m.kind() {
            BrainModelKind::Volume { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    pub(crate) fn surface_model(&self, structure: SurfaceStructure) -> Option<&BrainModel> {
        self.models.iter().find(
            |m| matches!(m.kind(), BrainModelKind::Surface { structure: s, .. } if *s == structure),
        )
    }

    pub(crate) fn volume_model(&self, name: &str) -> Option<&BrainModel> {
        self.models
            .iter()
            .find(|m| matches!(m.kind(), BrainModelKind::Volume { name: n, .. } if n == name))
    }
}

/// 一条轴的映射声明.
#[derive(Debug, Clone, PartialEq)]
pub enum CiftiMapping {
    /// 稠密 brainordinate 映射.
    BrainModels(DenseMap),

    /// label 映射: 每个索引对应一个带独立 label 表的 map.
    Labels {
        /// 各 map 名字.
        names: Vec<String>,
        /// 各 map 的 label 表, 个数与 `names` 一致.
        tables: Vec<LabelTable>,
    },

    /// scalar 映射: 每个索引对应一个命名 map.
    Scalars {
        /// 各 map 名字.
        names: Vec<String>,
    },
}

impl CiftiMapping {
    /// 该轴的索引个数.
    pub fn len(&self) -> usize {
        match self {
            CiftiMapping::BrainModels(map) => map.len(),
            CiftiMapping::Labels { names, .. } => names.len(),
            CiftiMapping::Scalars { names } => names.len(),
        }
    }

    /// 该轴是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 第 `index` 个 map 的名字 (稠密映射没有名字, 以编号代替).
    pub fn index_name(&self, index: usize) -> String {
        match self {
            CiftiMapping::BrainModels(_) => format!("#{}", index + 1),
            CiftiMapping::Labels { names, .. } | CiftiMapping::Scalars { names } => {
                names[index].clone()
            }
        }
    }
}

/// 两条轴的映射声明 (容器 XML 的逻辑内容).
#[derive(Debug, Clone, PartialEq)]
pub struct CiftiXml {
    /// 行轴映射.
    pub row: CiftiMapping,

    /// 列轴映射.
    pub column: CiftiMapping,
}

impl CiftiXml {
    /// 取指定轴的映射.
    #[inline]
    pub fn mapping(&self, dir: CiftiDirection) -> &CiftiMapping {
        match dir {
            CiftiDirection::Row => &self.row,
            CiftiDirection::Column => &self.column,
        }
    }
}

/// CIFTI 稠密矩阵文件 (逻辑视图).
#[derive(Debug, Clone, PartialEq)]
pub struct CiftiFile {
    xml: CiftiXml,
    matrix: Array2<f32>,
}

impl CiftiFile {
    /// 由映射声明与矩阵构建. 矩阵形状必须与两轴的映射长度一致.
    pub fn new(xml: CiftiXml, matrix: Array2<f32>) -> AlgResult<Self> {
        if matrix.nrows() != xml.row.len() || matrix.ncols() != xml.column.len() {
            return Err(AlgorithmError::MappingMismatch(format!(
                "matrix is {}x{} but mappings declare {}x{}",
                matrix.nrows(),
                matrix.ncols(),
                xml.row.len(),
                xml.column.len()
            )));
        }
        Ok(Self { xml, matrix })
    }

    /// 与输入布局相同, 矩阵全 0 的输出文件.
    pub fn zeros_like(other: &CiftiFile) -> CiftiFile {
        CiftiFile {
            xml: other.xml.clone(),
            matrix: Array2::zeros(other.matrix.dim()),
        }
    }

    /// 映射声明.
    #[inline]
    pub fn xml(&self) -> &CiftiXml {
        &self.xml
    }

    /// 矩阵.
    #[inline]
    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// 沿 `dir` 轴第 `index` 个 brainordinate 的第 `orth` 个值.
    #[inline]
    pub fn value(&self, dir: CiftiDirection, index: usize, orth: usize) -> f32 {
        match dir {
            CiftiDirection::Row => self.matrix[[index, orth]],
            CiftiDirection::Column => self.matrix[[orth, index]],
        }
    }

    pub(crate) fn set_value(&mut self, dir: CiftiDirection, index: usize, orth: usize, v: f32) {
        match dir {
            CiftiDirection::Row => self.matrix[[index, orth]] = v,
            CiftiDirection::Column => self.matrix[[orth, index]] = v,
        }
    }
}
