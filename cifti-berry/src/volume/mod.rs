//! 体数据: 带仿射空间与可选 label 表的三维标量网格.

use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use ndarray::{Array3, Axis, Ix3, Ix4};
use nifti::{InMemNiftiObject, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::error::AlgorithmError;
use crate::label::LabelTable;
use crate::{AlgResult, Idx3d};

mod space;

pub use space::VolumeSpace;

/// 体数据的一个 subvolume (frame): 名字, 体素值, 可选 label 表.
#[derive(Debug, Clone)]
pub struct VolumeMap {
    /// map 名字, 供 `-subvolume` 按名选择和日志输出使用.
    pub name: String,

    /// 体素值, 形状与所属 [`Volume`] 的网格维度一致. label 数据也以
    /// `f32` 保存键值, 与 CIFTI 矩阵一致, 比较前按 `floor(v + 0.5)` 取整.
    pub data: Array3<f32>,

    /// label 表. 所有 map 都带表时整个体数据视为 label 类型.
    pub labels: Option<LabelTable>,
}

/// 三维体数据: 一个网格空间加若干 subvolume.
#[derive(Debug, Clone)]
pub struct Volume {
    space: VolumeSpace,
    maps: Vec<VolumeMap>,
}

impl Volume {
    /// 由网格空间与 subvolume 列表构建体数据.
    ///
    /// `maps` 必须非空且每个 map 的数据形状与 `space` 的维度一致, 否则 panic.
    pub fn new(space: VolumeSpace, maps: Vec<VolumeMap>) -> Self {
        assert!(!maps.is_empty(), "体数据至少要有一个 subvolume");
        let [di, dj, dk] = space.dims();
        for m in &maps {
            assert_eq!(m.data.dim(), (di, dj, dk), "map 形状与网格维度不一致");
        }
        Self { space, maps }
    }

    /// 以 0.0 填充的单 map 体数据. 多用于输出缓冲与测试.
    pub fn filled(space: VolumeSpace, name: impl Into<String>) -> Self {
        let [di, dj, dk] = space.dims();
        let map = VolumeMap {
            name: name.into(),
            data: Array3::zeros((di, dj, dk)),
            labels: None,
        };
        Self::new(space, vec![map])
    }

    /// 打开 nii / nii.gz 文件格式的体数据.
    ///
    /// NIfTI 容器本身视为不透明数据源, 只取网格几何与体素值;
    /// 4D 文件按末维拆成多个 subvolume. NIfTI 不携带 label 表,
    /// 如需 label 语义请在打开后为各 map 填入表.
    pub fn open<P: AsRef<Path>>(path: P) -> AlgResult<Self> {
        let obj = ReaderOptions::new()
            .read_file(path.as_ref())
            .map_err(|e| AlgorithmError::Container(e.to_string()))?;
        Self::from_nifti(obj)
    }

    /// 从内存字节打开 nii 体数据, gzip 压缩按魔数自动识别.
    pub fn from_nifti_bytes(bytes: &[u8]) -> AlgResult<Self> {
        let is_gzip = bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
        let obj = if is_gzip {
            let mut decoder = GzDecoder::new(Cursor::new(bytes));
            let mut raw = Vec::new();
            decoder
                .read_to_end(&mut raw)
                .map_err(|e| AlgorithmError::Container(e.to_string()))?;
            InMemNiftiObject::from_reader(Cursor::new(raw))
        } else {
            InMemNiftiObject::from_reader(Cursor::new(bytes))
        }
        .map_err(|e| AlgorithmError::Container(e.to_string()))?;
        Self::from_nifti(obj)
    }

    fn from_nifti(obj: InMemNiftiObject) -> AlgResult<Self> {
        let header = obj.header().clone();
        let array = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|e| AlgorithmError::Container(e.to_string()))?;
        let space = space_from_header(&header, array.shape())?;
        let maps = match array.ndim() {
            3 => {
                let data = array.into_dimensionality::<Ix3>().unwrap();
                vec![VolumeMap {
                    name: "#1".into(),
                    data,
                    labels: None,
                }]
            }
            4 => {
                let stack = array.into_dimensionality::<Ix4>().unwrap();
                stack
                    .axis_iter(Axis(3))
                    .enumerate()
                    .map(|(t, frame)| VolumeMap {
                        name: format!("#{}", t + 1),
                        data: frame.to_owned(),
                        labels: None,
                    })
                    .collect()
            }
            n => {
                return Err(AlgorithmError::Container(format!(
                    "expected 3D or 4D volume, got {n}D"
                )))
            }
        };
        Ok(Self::new(space, maps))
    }

    /// 网格空间.
    #[inline]
    pub fn space(&self) -> &VolumeSpace {
        &self.space
    }

    /// 全部 subvolume.
    #[inline]
    pub fn maps(&self) -> &[VolumeMap] {
        &self.maps
    }

    /// 第 `index` 个 subvolume. 越界时 panic.
    #[inline]
    pub fn map(&self, index: usize) -> &VolumeMap {
        &self.maps[index]
    }

    /// subvolume 个数.
    #[inline]
    pub fn num_maps(&self) -> usize {
        self.maps.len()
    }

    /// 是否为 label 类型 (每个 map 都携带 label 表).
    pub fn is_label(&self) -> bool {
        self.maps.iter().all(|m| m.labels.is_some())
    }

    /// 第 `map` 个 subvolume 在 `idx` 处的体素值. 越界时 panic.
    #[inline]
    pub fn value(&self, idx: Idx3d, map: usize) -> f32 {
        self.maps[map].data[[idx.0, idx.1, idx.2]]
    }

    /// 按编号 (十进制, 1 起始) 或名字选择 subvolume.
    ///
    /// 与 `-subvolume` 参数的约定一致: 先按数字解释, 失败后按
    /// 名字精确匹配; 两者都不中则返回 `None`.
    pub fn map_index_from_name_or_number(&self, selector: &str) -> Option<usize> {
        if let Ok(number) = selector.trim().parse::<i64>() {
            if number >= 1 && (number as usize) <= self.maps.len() {
                return Some(number as usize - 1);
            }
            return None;
        }
        self.maps.iter().position(|m| m.name == selector)
    }
}

/// 从 NIfTI header 提取网格空间: 有 sform 用 sform, 否则取对角 pixdim.
fn space_from_header(header: &NiftiHeader, shape: &[usize]) -> AlgResult<VolumeSpace> {
    assert!(shape.len() >= 3);
    let dims = [shape[0], shape[1], shape[2]];
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let col = |c: usize| [rows[0][c], rows[1][c], rows[2][c]];
        VolumeSpace::new(dims, [col(0), col(1), col(2)], col(3))
    } else {
        let [_, pi, pj, pk, ..] = header.pixdim;
        VolumeSpace::new(
            dims,
            [[pi, 0.0, 0.0], [0.0, pj, 0.0], [0.0, 0.0, pk]],
            [0.0; 3],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn label_volume() -> Volume {
        let space = VolumeSpace::isotropic([2, 2, 2], 1.0).unwrap();
        let table = LabelTable::new(0, "???");
        let maps = vec![
            VolumeMap {
                name: "first".into(),
                data: Array3::zeros((2, 2, 2)),
                labels: Some(table.clone()),
            },
            VolumeMap {
                name: "second".into(),
                data: Array3::zeros((2, 2, 2)),
                labels: Some(table),
            },
        ];
        Volume::new(space, maps)
    }

    #[test]
    fn test_subvolume_selection() {
        let vol = label_volume();
        assert_eq!(vol.map_index_from_name_or_number("1"), Some(0));
        assert_eq!(vol.map_index_from_name_or_number("2"), Some(1));
        assert_eq!(vol.map_index_from_name_or_number("0"), None);
        assert_eq!(vol.map_index_from_name_or_number("3"), None);
        assert_eq!(vol.map_index_from_name_or_number("second"), Some(1));
        assert_eq!(vol.map_index_from_name_or_number("missing"), None);
    }

    #[test]
    fn test_label_type_detection() {
        let mut vol = label_volume();
        assert!(vol.is_label());
        vol.maps[1].labels = None;
        assert!(!vol.is_label());
    }

    #[test]
    #[should_panic]
    fn test_shape_mismatch_panics() {
        let space = VolumeSpace::isotropic([2, 2, 2], 1.0).unwrap();
        Volume::new(
            space,
            vec![VolumeMap {
                name: "bad".into(),
                data: Array3::zeros((3, 2, 2)),
                labels: None,
            }],
        );
    }
}
