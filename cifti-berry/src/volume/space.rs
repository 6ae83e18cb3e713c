//! 体数据网格空间: 索引到物理坐标的仿射变换.

use crate::error::AlgorithmError;
use crate::{AlgResult, Idx3d};

#[inline]
pub(crate) fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub(crate) fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn norm(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

/// 规则三维网格的仿射空间.
///
/// 由三个 spacing 向量 (i/j/k 方向各一) 和原点组成, 提供索引空间与
/// 物理空间 (mm) 之间的双向映射. 不变量: spacing 矩阵可逆, 逆矩阵在
/// 构建时一次算出.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpace {
    dims: [usize; 3],
    vectors: [[f32; 3]; 3],
    origin: [f32; 3],
    /// 行向量形式的 spacing 矩阵之逆.
    inverse: [[f32; 3]; 3],
}

impl VolumeSpace {
    /// 构建网格空间. `vectors` 为 i/j/k 方向的 spacing 列向量.
    ///
    /// spacing 矩阵退化 (不可逆) 时返回
    /// [`AlgorithmError::DegenerateVolumeSpace`].
    pub fn new(dims: [usize; 3], vectors: [[f32; 3]; 3], origin: [f32; 3]) -> AlgResult<Self> {
        assert!(dims.iter().all(|&d| d > 0), "网格每一维必须非空");
        let [a, b, c] = vectors;
        let det = dot(a, cross(b, c));
        let scale = norm(a) * norm(b) * norm(c);
        if !(scale > 0.0) || det.abs() < 1e-6 * scale {
            return Err(AlgorithmError::DegenerateVolumeSpace);
        }
        // 列向量矩阵之逆的三个行向量.
        let scaled = |v: [f32; 3]| [v[0] / det, v[1] / det, v[2] / det];
        let inverse = [
            scaled(cross(b, c)),
            scaled(cross(c, a)),
            scaled(cross(a, b)),
        ];
        Ok(Self {
            dims,
            vectors,
            origin,
            inverse,
        })
    }

    /// 以各向同性 `spacing` 和原点 0 构建网格空间. 多用于测试.
    pub fn isotropic(dims: [usize; 3], spacing: f32) -> AlgResult<Self> {
        Self::new(
            dims,
            [
                [spacing, 0.0, 0.0],
                [0.0, spacing, 0.0],
                [0.0, 0.0, spacing],
            ],
            [0.0, 0.0, 0.0],
        )
    }

    /// 网格维度.
    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// 网格体素总数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// 索引是否落在网格内.
    #[inline]
    pub fn index_valid(&self, ijk: [i64; 3]) -> bool {
        (0..3).all(|d| ijk[d] >= 0 && (ijk[d] as usize) < self.dims[d])
    }

    /// 浮点索引 -> 物理坐标 (mm).
    pub fn index_to_space(&self, ijk: [f32; 3]) -> [f32; 3] {
        let mut out = self.origin;
        for d in 0..3 {
            for x in 0..3 {
                out[x] += ijk[d] * self.vectors[d][x];
            }
        }
        out
    }

    /// 整数体素索引 -> 物理坐标 (mm).
    #[inline]
    pub fn voxel_to_space(&self, (i, j, k): Idx3d) -> [f32; 3] {
        self.index_to_space([i as f32, j as f32, k as f32])
    }

    /// 物理坐标 (mm) -> 浮点索引.
    pub fn space_to_index(&self, xyz: [f32; 3]) -> [f32; 3] {
        let rel = [
            xyz[0] - self.origin[0],
            xyz[1] - self.origin[1],
            xyz[2] - self.origin[2],
        ];
        [
            dot(self.inverse[0], rel),
            dot(self.inverse[1], rel),
            dot(self.inverse[2], rel),
        ]
    }

    /// 三个方向的 spacing 向量长度 (mm).
    pub fn spacing_lengths(&self) -> [f32; 3] {
        [
            norm(self.vectors[0]),
            norm(self.vectors[1]),
            norm(self.vectors[2]),
        ]
    }

    /// 最小网格步长 (mm).
    pub fn min_spacing(&self) -> f32 {
        let [a, b, c] = self.spacing_lengths();
        a.min(b).min(c)
    }

    /// 求包住半径 `radius` (mm) 物理球所需的各轴索引半宽.
    ///
    /// 倒易格技术: 每轴半宽等于半径除以该轴 spacing 向量在另两轴
    /// 法向上的投影, 各向异性网格下逐轴独立. 结果不小于 1.0,
    /// 保证采样盒至少为 3x3x3.
    pub fn kernel_half_widths(&self, radius: f32) -> [f32; 3] {
        let [a, b, c] = self.vectors;
        let unit = |v: [f32; 3]| {
            let n = norm(v);
            [v[0] / n, v[1] / n, v[2] / n]
        };
        let bc = unit(cross(b, c));
        let ca = unit(cross(c, a));
        let ab = unit(cross(a, b));
        [
            (radius / dot(a, bc)).abs().max(1.0),
            (radius / dot(b, ca)).abs().max(1.0),
            (radius / dot(c, ab)).abs().max(1.0),
        ]
    }

    /// 两个网格空间是否一致 (维度相同, 仿射分量差不超过 1e-4 mm).
    pub fn matches(&self, other: &VolumeSpace) -> bool {
        if self.dims != other.dims {
            return false;
        }
        let close = |a: [f32; 3], b: [f32; 3]| (0..3).all(|x| (a[x] - b[x]).abs() <= 1e-4);
        (0..3).all(|d| close(self.vectors[d], other.vectors[d]))
            && close(self.origin, other.origin)
    }

    /// 以 `offset` 为新原点, `dims` 为新维度的裁剪子空间.
    ///
    /// spacing 向量与逆矩阵不变, 仅平移原点. 用于 CIFTI 体结构分离.
    pub fn crop(&self, offset: Idx3d, dims: [usize; 3]) -> VolumeSpace {
        assert!(dims.iter().all(|&d| d > 0));
        let origin = self.voxel_to_space(offset);
        VolumeSpace {
            dims,
            vectors: self.vectors,
            origin,
            inverse: self.inverse,
        }
    }
}
