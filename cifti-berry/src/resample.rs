//! 体数据跨分区重采样 (generic).
//!
//! 把旧分区 (current parcels) 里某个 parcel 内的数据, 经高斯核加权
//! 平均搬到新分区 (new parcels) 同名 parcel 的空间范围上. 两个分区
//! 体可以使用不同的网格. 可选的 fix-zeros 模式把精确 0.0 视为
//! "无数据", 并在主循环后对未解析体素做有界次数的迭代外推.

use std::f32::consts::LN_2;

use cfg_if::cfg_if;
use itertools::iproduct;
use ndarray::Array3;

use crate::error::AlgorithmError;
use crate::label::{key_from_value, LabelTable};
use crate::volume::{Volume, VolumeMap, VolumeSpace};
use crate::{AlgResult, Idx3d};

/// fix-zeros 外推的迭代上限, 超出后告警并保留 0 值.
const FIX_ZEROS_POST_ITERATIONS: usize = 10;

/// 高斯核尺寸, 直接给 sigma 或给 FWHM 换算.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum KernelSize {
    /// 标准差 (mm).
    Sigma(f32),

    /// 半高全宽 (mm), `sigma = fwhm / (2 * sqrt(2 * ln 2))`.
    Fwhm(f32),
}

impl KernelSize {
    /// 换算成 sigma (mm).
    pub fn sigma(&self) -> f32 {
        match *self {
            KernelSize::Sigma(s) => s,
            KernelSize::Fwhm(f) => f / (2.0 * (2.0 * LN_2).sqrt()),
        }
    }
}

/// 按名字匹配两张 label 表, 返回 (旧键, 新键) 对.
///
/// 两边的 unassigned 键都不参与匹配; 同键同名直接配对, 否则按名字
/// 在新表里查找; 找不到的键静默丢弃.
fn match_labels(cur: &LabelTable, new: &LabelTable) -> Vec<(i32, i32)> {
    let mut pairs = Vec::new();
    for key in cur.keys() {
        if key == cur.unassigned_key() {
            continue;
        }
        let Some(name) = cur.name(key) else { continue };
        if new.name(key) == Some(name) && key != new.unassigned_key() {
            pairs.push((key, key));
            continue;
        }
        if let Some(new_key) = new.key_from_name(name) {
            if new_key != new.unassigned_key() {
                pairs.push((key, new_key));
            }
        }
    }
    pairs
}

/// 目标体素对源数据的高斯加权平均. `exclude_zero` 为真时精确 0.0 的
/// 源值视为无数据. 权重和为 0 时返回 `None`.
#[allow(clippy::too_many_arguments)]
fn kernel_average(
    xyz: [f32; 3],
    src_space: &VolumeSpace,
    src_data: &Array3<f32>,
    src_labels: &Array3<f32>,
    src_key: i32,
    half_widths: [f32; 3],
    kernel_mult: f32,
    exclude_zero: bool,
) -> Option<f32> {
    let ijk = src_space.space_to_index(xyz);
    let dims = src_space.dims();
    let mut lo = [0usize; 3];
    let mut hi = [0usize; 3];
    for d in 0..3 {
        let l = (ijk[d] - half_widths[d]).ceil() as i64;
        let h = (ijk[d] + half_widths[d]).floor() as i64;
        if h < 0 || l >= dims[d] as i64 || h < l {
            return None;
        }
        lo[d] = l.max(0) as usize;
        hi[d] = h.min(dims[d] as i64 - 1) as usize;
    }
    let mut sum = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (i, j, k) in iproduct!(lo[0]..=hi[0], lo[1]..=hi[1], lo[2]..=hi[2]) {
        if key_from_value(src_labels[[i, j, k]]) != src_key {
            continue;
        }
        let value = src_data[[i, j, k]];
        if exclude_zero && value == 0.0 {
            continue;
        }
        let p = src_space.voxel_to_space((i, j, k));
        let dx = p[0] - xyz[0];
        let dy = p[1] - xyz[1];
        let dz = p[2] - xyz[2];
        let weight = (kernel_mult * (dx * dx + dy * dy + dz * dz)).exp();
        sum += weight * value;
        weight_sum += weight;
    }
    (weight_sum > 0.0).then(|| sum / weight_sum)
}

/// 跨分区重采样.
///
/// `vol_in` 与 `cur_parcels` 必须同网格; 两个分区体必须是 label 类型
/// (每个 map 都带表), 匹配用各自第 1 个 map 的表与键值. 输出落在
/// `new_parcels` 的网格上, 未落进任何匹配 parcel 的体素为 0.0.
///
/// 核半径取 `3 * sigma`, 采样盒按倒易格技术逐轴换算, 每轴半宽不小于
/// 1.0 (至少 3x3x3). `fix_zeros` 打开时, 主循环排除 0 值源, 随后对
/// 权重和为 0 的输出体素做至多 10 轮双缓冲外推: 每轮从上一轮输出里
/// 取携带 **新** parcel 键且非 0 的邻居重新加权; 一轮无新进展即停.
/// 迭代耗尽仍有未解析体素时按 parcel 名告警, 不视为错误.
pub fn resample_parcels(
    vol_in: &Volume,
    cur_parcels: &Volume,
    new_parcels: &Volume,
    kernel: KernelSize,
    fix_zeros: bool,
    subvolume: Option<usize>,
) -> AlgResult<Volume> {
    let sigma = kernel.sigma();
    if !(sigma > 0.0) || !sigma.is_finite() {
        return Err(AlgorithmError::InvalidKernel);
    }
    if !vol_in.space().matches(cur_parcels.space()) {
        return Err(AlgorithmError::SpaceMismatch(
            "input volume and current parcels must share a grid".into(),
        ));
    }
    if !cur_parcels.is_label() {
        return Err(AlgorithmError::NotLabelVolume("current parcels".into()));
    }
    if !new_parcels.is_label() {
        return Err(AlgorithmError::NotLabelVolume("new parcels".into()));
    }
    if let Some(s) = subvolume {
        if s >= vol_in.num_maps() {
            return Err(AlgorithmError::InvalidSubvolume(format!(
                "index {s} out of range for {} subvolumes",
                vol_in.num_maps()
            )));
        }
    }
    let cur_table = cur_parcels.map(0).labels.as_ref().unwrap();
    let new_table = new_parcels.map(0).labels.as_ref().unwrap();
    let pairs = match_labels(cur_table, new_table);
    if pairs.is_empty() {
        return Err(AlgorithmError::NoMatchingLabels);
    }

    // 每对 parcel 在新网格里的体素列表, 扫一遍网格, 各 map 共用.
    let new_space = new_parcels.space();
    let new_labels = &new_parcels.map(0).data;
    let [ni, nj, nk] = new_space.dims();
    let mut voxel_lists: Vec<Vec<Idx3d>> = vec![Vec::new(); pairs.len()];
    for (i, j, k) in iproduct!(0..ni, 0..nj, 0..nk) {
        let key = key_from_value(new_labels[[i, j, k]]);
        if let Some(p) = pairs.iter().position(|&(_, new_key)| new_key == key) {
            voxel_lists[p].push((i, j, k));
        }
    }

    let kernel_mult = -1.0 / (2.0 * sigma * sigma);
    let src_space = vol_in.space();
    let src_labels = &cur_parcels.map(0).data;
    let src_half = src_space.kernel_half_widths(3.0 * sigma);
    let new_half = new_space.kernel_half_widths(3.0 * sigma);

    let selected: Vec<usize> = match subvolume {
        Some(s) => vec![s],
        None => (0..vol_in.num_maps()).collect(),
    };
    let mut out_maps = Vec::with_capacity(selected.len());
    for m in selected {
        let src_data = &vol_in.map(m).data;
        let mut frame = Array3::zeros((ni, nj, nk));
        for (&(cur_key, new_key), voxels) in pairs.iter().zip(&voxel_lists) {
            let compute = |&idx: &Idx3d| {
                kernel_average(
                    new_space.voxel_to_space(idx),
                    src_space,
                    src_data,
                    src_labels,
                    cur_key,
                    src_half,
                    kernel_mult,
                    fix_zeros,
                )
                .unwrap_or(0.0)
            };
            cfg_if! {
                if #[cfg(feature = "rayon")] {
                    use rayon::prelude::*;
                    let values: Vec<f32> = voxels.par_iter().map(compute).collect();
                } else {
                    let values: Vec<f32> = voxels.iter().map(compute).collect();
                }
            }
            for (&(i, j, k), v) in voxels.iter().zip(values) {
                frame[[i, j, k]] = v;
            }
            if fix_zeros {
                fix_zeros_pass(
                    &mut frame,
                    voxels,
                    new_space,
                    new_labels,
                    new_key,
                    new_table,
                    new_half,
                    kernel_mult,
                );
            }
        }
        out_maps.push(VolumeMap {
            name: vol_in.map(m).name.clone(),
            data: frame,
            labels: None,
        });
    }
    Ok(Volume::new(new_space.clone(), out_maps))
}

/// 对一个 parcel 的 0 值体素做双缓冲外推: 读上一轮快照, 写下一轮
/// 缓冲, 每轮结束 `mem::swap`. 同一轮内永远不读本轮的新写入.
#[allow(clippy::too_many_arguments)]
fn fix_zeros_pass(
    frame: &mut Array3<f32>,
    voxels: &[Idx3d],
    new_space: &VolumeSpace,
    new_labels: &Array3<f32>,
    new_key: i32,
    new_table: &LabelTable,
    half_widths: [f32; 3],
    kernel_mult: f32,
) {
    let mut unresolved: Vec<Idx3d> = voxels
        .iter()
        .copied()
        .filter(|&(i, j, k)| frame[[i, j, k]] == 0.0)
        .collect();
    if unresolved.is_empty() {
        return;
    }
    let mut read = frame.clone();
    let mut write = frame.clone();
    for _ in 0..FIX_ZEROS_POST_ITERATIONS {
        let resolve = |&idx: &Idx3d| {
            kernel_average(
                new_space.voxel_to_space(idx),
                new_space,
                &read,
                new_labels,
                new_key,
                half_widths,
                kernel_mult,
                true,
            )
        };
        cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                let resolved: Vec<Option<f32>> = unresolved.par_iter().map(resolve).collect();
            } else {
                let resolved: Vec<Option<f32>> = unresolved.iter().map(resolve).collect();
            }
        }
        let mut still = Vec::with_capacity(unresolved.len());
        for (&(i, j, k), r) in unresolved.iter().zip(resolved) {
            match r {
                Some(v) => write[[i, j, k]] = v,
                None => still.push((i, j, k)),
            }
        }
        let progressed = still.len() < unresolved.len();
        unresolved = still;
        std::mem::swap(&mut read, &mut write);
        write.assign(&read);
        if unresolved.is_empty() || !progressed {
            break;
        }
    }
    if !unresolved.is_empty() {
        let name = new_table.name(new_key).unwrap_or("<unnamed>");
        log::warn!("unable to fix all zeros in parcel {name}");
    }
    frame.assign(&read);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeSpace;

    fn float_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn table_with(unassigned: i32, entries: &[(i32, &str)]) -> LabelTable {
        let mut t = LabelTable::new(unassigned, "???");
        for &(k, n) in entries {
            t.insert(k, n);
        }
        t
    }

    /// (9,1,1) 1mm 网格上的 label 体: `keyed` 给出各体素键, 其余为
    /// unassigned 0.
    fn line_labels(keyed: &[(usize, i32)], table: LabelTable) -> Volume {
        let space = VolumeSpace::isotropic([9, 1, 1], 1.0).unwrap();
        let mut data = Array3::zeros((9, 1, 1));
        for &(i, key) in keyed {
            data[[i, 0, 0]] = key as f32;
        }
        Volume::new(
            space,
            vec![VolumeMap {
                name: "parcels".into(),
                data,
                labels: Some(table),
            }],
        )
    }

    fn line_data(values: &[(usize, f32)]) -> Volume {
        let space = VolumeSpace::isotropic([9, 1, 1], 1.0).unwrap();
        let mut data = Array3::zeros((9, 1, 1));
        for &(i, v) in values {
            data[[i, 0, 0]] = v;
        }
        Volume::new(
            space,
            vec![VolumeMap {
                name: "data".into(),
                data,
                labels: None,
            }],
        )
    }

    #[test]
    fn test_fwhm_conversion() {
        // 2 * sqrt(2 ln 2) ~= 2.3548.
        assert!((KernelSize::Fwhm(2.3548).sigma() - 1.0).abs() < 1e-3);
        assert_eq!(KernelSize::Sigma(0.5).sigma(), 0.5);
    }

    #[test]
    fn test_label_matching_by_name() {
        let cur = table_with(0, &[(2, "Thalamus"), (3, "Putamen")]);
        let new = table_with(0, &[(7, "Thalamus"), (5, "Caudate")]);
        // 键不同但名字相同: 配对 (2, 7); Putamen 无对应, 丢弃.
        assert_eq!(match_labels(&cur, &new), vec![(2, 7)]);
        // 同键同名走快速路径.
        let same = table_with(0, &[(2, "Thalamus")]);
        assert_eq!(match_labels(&cur, &same), vec![(2, 2)]);
        // unassigned 不参与, 即使名字相同.
        let empty = table_with(0, &[]);
        assert_eq!(match_labels(&empty, &empty), vec![]);
    }

    #[test]
    fn test_validation_errors() {
        let cur = line_labels(&[(0, 1)], table_with(0, &[(1, "A")]));
        let new = line_labels(&[(0, 1)], table_with(0, &[(1, "A")]));
        let data = line_data(&[(0, 1.0)]);
        // 网格不匹配.
        let other = Volume::filled(VolumeSpace::isotropic([4, 1, 1], 1.0).unwrap(), "x");
        assert!(matches!(
            resample_parcels(&other, &cur, &new, KernelSize::Sigma(1.0), false, None).unwrap_err(),
            AlgorithmError::SpaceMismatch(_)
        ));
        // 分区体不是 label 类型.
        assert!(matches!(
            resample_parcels(&data, &data, &new, KernelSize::Sigma(1.0), false, None).unwrap_err(),
            AlgorithmError::NotLabelVolume(_)
        ));
        // 核尺寸非法.
        assert_eq!(
            resample_parcels(&data, &cur, &new, KernelSize::Sigma(0.0), false, None).unwrap_err(),
            AlgorithmError::InvalidKernel
        );
        // subvolume 越界.
        assert!(matches!(
            resample_parcels(&data, &cur, &new, KernelSize::Sigma(1.0), false, Some(1))
                .unwrap_err(),
            AlgorithmError::InvalidSubvolume(_)
        ));
        // 名字完全不重合.
        let stranger = line_labels(&[(0, 1)], table_with(0, &[(1, "B")]));
        assert_eq!(
            resample_parcels(&data, &cur, &stranger, KernelSize::Sigma(1.0), false, None)
                .unwrap_err(),
            AlgorithmError::NoMatchingLabels
        );
    }

    #[test]
    fn test_kernel_weights_favor_nearer_source() {
        // 目标体素 3 两侧各一个源: 体素 2 (1mm, 值 10) 与体素 5
        // (2mm, 值 20). sigma 1 时权重为 exp(-d^2/2), 距离越近权重
        // 越大, 输出被拉向近源, 且等于解析加权平均.
        let cur = line_labels(&[(2, 1), (5, 1)], table_with(0, &[(1, "A")]));
        let new = line_labels(&[(3, 1)], table_with(0, &[(1, "A")]));
        let data = line_data(&[(2, 10.0), (5, 20.0)]);
        let out =
            resample_parcels(&data, &cur, &new, KernelSize::Sigma(1.0), false, None).unwrap();
        let got = out.value((3, 0, 0), 0);
        let w1 = (-0.5f32).exp();
        let w2 = (-2.0f32).exp();
        assert!(float_eq(got, (w1 * 10.0 + w2 * 20.0) / (w1 + w2)));
        assert!(got > 10.0 && got < 15.0);
        // 目标与源重合 (d = 0, 权重 1.0) 且无其他源: 输出即源值.
        let lone = line_labels(&[(2, 1)], table_with(0, &[(1, "A")]));
        let out =
            resample_parcels(&data, &lone, &lone, KernelSize::Sigma(1.0), false, None).unwrap();
        assert!(float_eq(out.value((2, 0, 0), 0), 10.0));
    }

    #[test]
    fn test_uniform_data_resamples_to_itself() {
        // 同一网格, 同一分区, parcel 内数据恒为 2.0: 高斯平均仍是 2.0,
        // parcel 外输出 0.0.
        let table = table_with(0, &[(1, "A")]);
        let parcels = line_labels(&[(2, 1), (3, 1), (4, 1)], table);
        let data = line_data(&[(2, 2.0), (3, 2.0), (4, 2.0)]);
        let out =
            resample_parcels(&data, &parcels, &parcels, KernelSize::Sigma(1.0), false, None)
                .unwrap();
        for i in 0..9 {
            let expect = if (2..=4).contains(&i) { 2.0 } else { 0.0 };
            assert!(float_eq(out.value((i, 0, 0), 0), expect), "at {i}");
        }
        assert_eq!(out.map(0).name, "data");
        assert!(out.map(0).labels.is_none());
    }

    #[test]
    fn test_cross_key_resample_moves_footprint() {
        // 旧 parcel 键 2 (体素 0..=2, 数据 3.0), 新 parcel 键 7
        // (体素 1..=3): 输出只覆盖新 footprint.
        let cur = line_labels(&[(0, 2), (1, 2), (2, 2)], table_with(0, &[(2, "Thalamus")]));
        let new = line_labels(&[(1, 7), (2, 7), (3, 7)], table_with(0, &[(7, "Thalamus")]));
        let data = line_data(&[(0, 3.0), (1, 3.0), (2, 3.0)]);
        let out = resample_parcels(&data, &cur, &new, KernelSize::Sigma(1.0), false, None).unwrap();
        assert!(float_eq(out.value((0, 0, 0), 0), 0.0));
        for i in 1..=3 {
            assert!(float_eq(out.value((i, 0, 0), 0), 3.0), "at {i}");
        }
        assert!(float_eq(out.value((4, 0, 0), 0), 0.0));
    }

    #[test]
    fn test_fix_zeros_grows_from_resolved_neighbors() {
        // 新 parcel 比旧 parcel 长 (0..=4 对 0..=2), sigma 0.5 的采样盒
        // 半宽 1.5: 体素 4 主循环够不到任何源, 由外推从体素 3 补齐.
        let cur = line_labels(&[(0, 1), (1, 1), (2, 1)], table_with(0, &[(1, "A")]));
        let new = line_labels(
            &[(0, 1), (1, 1), (2, 1), (3, 1), (4, 1)],
            table_with(0, &[(1, "A")]),
        );
        let data = line_data(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let out = resample_parcels(&data, &cur, &new, KernelSize::Sigma(0.5), true, None).unwrap();
        for i in 0..=4 {
            assert!(float_eq(out.value((i, 0, 0), 0), 1.0), "at {i}");
        }
    }

    #[test]
    fn test_fix_zeros_island_stays_unresolved() {
        // 新 parcel 在体素 8 有一块孤岛, 距任何同名源和任何已解析
        // 邻居都超出核半径: 迭代耗尽后保持 0.0 (并触发告警).
        let _ = simple_logger::SimpleLogger::new().init();
        let cur = line_labels(&[(0, 1), (1, 1), (2, 1)], table_with(0, &[(1, "A")]));
        let new = line_labels(
            &[(0, 1), (1, 1), (2, 1), (8, 1)],
            table_with(0, &[(1, "A")]),
        );
        let data = line_data(&[(0, 1.0), (1, 1.0), (2, 1.0)]);
        let out = resample_parcels(&data, &cur, &new, KernelSize::Sigma(0.5), true, None).unwrap();
        for i in 0..=2 {
            assert!(float_eq(out.value((i, 0, 0), 0), 1.0), "at {i}");
        }
        assert_eq!(out.value((8, 0, 0), 0), 0.0);
    }

    #[test]
    fn test_fix_zeros_excludes_zero_sources() {
        // 体素 1 的源值为 0: fix-zeros 下不参与加权, 其位置由非 0
        // 邻居外推, 结果仍为 1.0 而不是被 0 拉低.
        let cur = line_labels(&[(0, 1), (1, 1), (2, 1)], table_with(0, &[(1, "A")]));
        let data = line_data(&[(0, 1.0), (2, 1.0)]);
        let out = resample_parcels(&data, &cur, &cur, KernelSize::Sigma(0.5), true, None).unwrap();
        for i in 0..=2 {
            assert!(float_eq(out.value((i, 0, 0), 0), 1.0), "at {i}");
        }
    }

    #[test]
    fn test_subvolume_selection() {
        let table = table_with(0, &[(1, "A")]);
        let parcels = line_labels(&[(1, 1)], table);
        let space = VolumeSpace::isotropic([9, 1, 1], 1.0).unwrap();
        let mut second = Array3::zeros((9, 1, 1));
        second[[1, 0, 0]] = 4.0;
        let data = Volume::new(
            space,
            vec![
                VolumeMap {
                    name: "first".into(),
                    data: Array3::zeros((9, 1, 1)),
                    labels: None,
                },
                VolumeMap {
                    name: "second".into(),
                    data: second,
                    labels: None,
                },
            ],
        );
        let out = resample_parcels(
            &data,
            &parcels,
            &parcels,
            KernelSize::Sigma(1.0),
            false,
            Some(1),
        )
        .unwrap();
        assert_eq!(out.num_maps(), 1);
        assert_eq!(out.map(0).name, "second");
        assert!(float_eq(out.value((1, 0, 0), 0), 4.0));
    }
}
