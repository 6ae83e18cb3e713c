#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供脑数据三种拓扑域 (皮层表面网格, 皮层下体素网格,
//! 以及二者复合的 CIFTI 稠密 brainordinate 空间) 上的空间腐蚀算法,
//! 和跨网格的体数据 parcel 重采样算法.
//!
//! 该 crate 仅实现算法层: CIFTI/GIFTI/NIFTI 容器的解析与写出由外部
//! 协作方完成, 本库只消费其逻辑结构 (网格几何, label 表, 稠密映射).
//! 上层命令分发器负责把 [`error::AlgorithmError`] 转换为非零退出码,
//! 本库自身从不直接退出进程.
//!
//! # 注意
//!
//! 1. 所有算法调用均为一次性: 输入只读, 输出为新对象, 调用之间不保留
//!   任何进程级状态 (没有隐藏的全局查找表).
//! 2. 校验错误以 `Err` 形式在任何输出写入之前返回 (all-or-nothing);
//!   fix-zeros 收敛不足只产生 warning 日志, 不视为错误.
//! 3. 内部辅助函数的索引越界等契约违背会直接 panic, 而不会导致内存错误.
//!   As what Rust promises.
//!
//! # 功能总览
//!
//! ### 静态空间点索引 ✅
//!
//! 半径查询 ("查询点 `radius` 范围内是否存在已索引点"), 构建后不可变.
//!
//! 实现位于 `cifti-berry/src/locator.rs`.
//!
//! ### 体数据腐蚀 ✅
//!
//! 以物理距离为单位, 将 "空" 体素 (scalar 0 或 label unassigned)
//! 的邻域清空. 支持 ROI 限定与单 subvolume 选择.
//!
//! 实现位于 `cifti-berry/src/erode/volume.rs`.
//!
//! ### 表面 metric/label 腐蚀 ✅
//!
//! 同一几何算法按 "空值判定策略" 参数化, 沿网格边以类测地距离传播,
//! 可选 corrected-areas 近似修正 (用于 group-average 表面).
//!
//! 实现位于 `cifti-berry/src/erode/surface.rs`.
//!
//! ### CIFTI 稠密腐蚀编排 ✅
//!
//! separate -> 逐结构腐蚀 -> replace 的单趟流水线, 输出保持与输入
//! 完全相同的稠密映射.
//!
//! 实现位于 `cifti-berry/src/erode/cifti.rs`.
//!
//! ### 体数据 parcel 重采样 ✅
//!
//! 按名字匹配两套 label 体数据的 parcel, 以高斯核加权平均把数据从旧
//! parcel 网格搬运到新 parcel 网格, 支持 fix-zeros 有界迭代外推.
//!
//! 实现位于 `cifti-berry/src/resample.rs`.

/// 三维体素索引, 按 (i, j, k) 组织, 与 spacing 向量一一对应.
pub type Idx3d = (usize, usize, usize);

/// 算法统一返回类型.
pub type AlgResult<T> = Result<T, error::AlgorithmError>;

pub mod error;

pub mod label;

pub mod locator;

pub mod volume;

pub mod surface;

pub mod cifti;

pub mod erode;

pub mod resample;

pub mod prelude;
