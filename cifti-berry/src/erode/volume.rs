//! 体网格腐蚀引擎.

use cfg_if::cfg_if;
use itertools::iproduct;

use crate::error::AlgorithmError;
use crate::locator::PointLocator;
use crate::volume::{Volume, VolumeMap};
use crate::{AlgResult, Idx3d};

use super::EmptyKind;

/// 腐蚀体数据: 与空值体素物理距离不超过 `distance` (mm) 的体素置空.
///
/// 每个 map 独立判定空值策略: 带 label 表的 map 以 unassigned 键为空,
/// 其余以精确 0.0 为空. `subvolume` 给定时只处理并输出该 map.
/// `roi` 给定时 (须与输入同网格), 值 <= 0.0 的体素既不作种子也不被
/// 置空, 原值照抄.
///
/// `0 < distance < 最小网格步长` 时半径查询可能漏掉真实的面邻接,
/// 额外检查 6 个面邻居并在其中存在空值时置空; `distance == 0` 不做
/// 该回退, 输出与输入一致.
pub fn erode_volume(
    vol_in: &Volume,
    distance: f32,
    subvolume: Option<usize>,
    roi: Option<&Volume>,
) -> AlgResult<Volume> {
    if !(distance >= 0.0) || !distance.is_finite() {
        return Err(AlgorithmError::NegativeDistance);
    }
    if let Some(s) = subvolume {
        if s >= vol_in.num_maps() {
            return Err(AlgorithmError::InvalidSubvolume(format!(
                "index {s} out of range for {} subvolumes",
                vol_in.num_maps()
            )));
        }
    }
    if let Some(r) = roi {
        if !r.space().matches(vol_in.space()) {
            return Err(AlgorithmError::RoiSpaceMismatch);
        }
    }

    let space = vol_in.space();
    let [di, dj, dk] = space.dims();
    let in_roi = |idx: Idx3d| roi.map_or(true, |r| r.value(idx, 0) > 0.0);

    let selected: Vec<usize> = match subvolume {
        Some(s) => vec![s],
        None => (0..vol_in.num_maps()).collect(),
    };
    let mut out_maps = Vec::with_capacity(selected.len());
    for m in selected {
        let map = vol_in.map(m);
        let kind = match &map.labels {
            Some(table) => EmptyKind::Label(table.unassigned_key()),
            None => EmptyKind::Metric,
        };

        // 种子: ROI 内的空值体素, 取物理坐标.
        let mut seeds = Vec::new();
        for (i, j, k) in iproduct!(0..di, 0..dj, 0..dk) {
            if in_roi((i, j, k)) && kind.is_empty(map.data[[i, j, k]]) {
                seeds.push(space.voxel_to_space((i, j, k)));
            }
        }
        let locator = PointLocator::new(&seeds);
        let face_fallback = distance > 0.0 && distance < space.min_spacing();

        let erase_here = |idx: Idx3d| {
            if !in_roi(idx) {
                return false;
            }
            if locator.any_in_range(space.voxel_to_space(idx), distance) {
                return true;
            }
            if face_fallback {
                let (i, j, k) = (idx.0 as i64, idx.1 as i64, idx.2 as i64);
                for (ni, nj, nk) in [
                    (i - 1, j, k),
                    (i + 1, j, k),
                    (i, j - 1, k),
                    (i, j + 1, k),
                    (i, j, k - 1),
                    (i, j, k + 1),
                ] {
                    if !space.index_valid([ni, nj, nk]) {
                        continue;
                    }
                    let n = (ni as usize, nj as usize, nk as usize);
                    if in_roi(n) && kind.is_empty(map.data[[n.0, n.1, n.2]]) {
                        return true;
                    }
                }
            }
            false
        };

        let targets: Vec<Idx3d> = iproduct!(0..di, 0..dj, 0..dk).collect();
        cfg_if! {
            if #[cfg(feature = "rayon")] {
                use rayon::prelude::*;
                let erase: Vec<Idx3d> = targets
                    .par_iter()
                    .copied()
                    .filter(|&idx| erase_here(idx))
                    .collect();
            } else {
                let erase: Vec<Idx3d> = targets
                    .iter()
                    .copied()
                    .filter(|&idx| erase_here(idx))
                    .collect();
            }
        }

        let mut data = map.data.clone();
        for (i, j, k) in erase {
            data[[i, j, k]] = kind.empty_value();
        }
        out_maps.push(VolumeMap {
            name: format!("{} erode {distance}mm", map.name),
            data,
            labels: map.labels.clone(),
        });
    }
    Ok(Volume::new(space.clone(), out_maps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::LabelTable;
    use crate::volume::VolumeSpace;
    use ndarray::Array3;

    fn table() -> LabelTable {
        let mut t = LabelTable::new(0, "???");
        t.insert(1, "region");
        t
    }

    /// 5x5x5 全 1 label 体, 中心 3x3x3 置为 unassigned 0.
    fn hollow_cube() -> Volume {
        let space = VolumeSpace::isotropic([5, 5, 5], 1.0).unwrap();
        let mut data = Array3::from_elem((5, 5, 5), 1.0f32);
        for i in 1..4 {
            for j in 1..4 {
                for k in 1..4 {
                    data[[i, j, k]] = 0.0;
                }
            }
        }
        Volume::new(
            space,
            vec![VolumeMap {
                name: "parcels".into(),
                data,
                labels: Some(table()),
            }],
        )
    }

    fn erased_set(vol: &Volume, distance: f32) -> Vec<Idx3d> {
        let out = erode_volume(vol, distance, None, None).unwrap();
        let mut erased = vec![];
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    if vol.value((i, j, k), 0) != 0.0 && out.value((i, j, k), 0) == 0.0 {
                        erased.push((i, j, k));
                    }
                }
            }
        }
        erased
    }

    #[test]
    fn test_validation_errors() {
        let vol = hollow_cube();
        assert_eq!(
            erode_volume(&vol, -1.0, None, None).unwrap_err(),
            AlgorithmError::NegativeDistance
        );
        assert!(matches!(
            erode_volume(&vol, 1.0, Some(1), None).unwrap_err(),
            AlgorithmError::InvalidSubvolume(_)
        ));
        let bad_roi = Volume::filled(VolumeSpace::isotropic([4, 4, 4], 1.0).unwrap(), "roi");
        assert_eq!(
            erode_volume(&vol, 1.0, None, Some(&bad_roi)).unwrap_err(),
            AlgorithmError::RoiSpaceMismatch
        );
    }

    #[test]
    fn test_distance_zero_changes_nothing() {
        let vol = hollow_cube();
        let out = erode_volume(&vol, 0.0, None, None).unwrap();
        assert_eq!(out.map(0).data, vol.map(0).data);
        assert_eq!(out.map(0).name, "parcels erode 0mm");
        assert!(out.map(0).labels.is_some());
    }

    #[test]
    fn test_hollow_cube_leaves_corners() {
        // 距离 1.5: 面邻 (1.0) 与棱邻 (sqrt 2) 的外壳体素都被擦掉,
        // 只剩 8 个角体素 (与最近种子距离 sqrt 3 ~= 1.732).
        let vol = hollow_cube();
        let out = erode_volume(&vol, 1.5, None, None).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    let corner = [i, j, k].iter().all(|&x| x == 0 || x == 4);
                    let expect = if corner { 1.0 } else { 0.0 };
                    assert_eq!(out.value((i, j, k), 0), expect, "at ({i},{j},{k})");
                }
            }
        }
    }

    #[test]
    fn test_exact_radius_is_inclusive() {
        // 距离恰为 1.0: 只擦与空腔面邻接的体素 (6 面 x 9 = 54 个).
        let vol = hollow_cube();
        let erased = erased_set(&vol, 1.0);
        assert_eq!(erased.len(), 54);
        assert!(erased.contains(&(0, 1, 1)));
        assert!(erased.contains(&(4, 2, 3)));
        // 棱邻 (sqrt 2 > 1) 不受影响.
        assert!(!erased.contains(&(0, 0, 1)));
    }

    #[test]
    fn test_monotonic_in_distance() {
        let vol = hollow_cube();
        let small = erased_set(&vol, 1.0);
        let large = erased_set(&vol, 1.5);
        assert!(small.iter().all(|idx| large.contains(idx)));
        assert!(small.len() < large.len());
    }

    #[test]
    fn test_roi_excludes_seeds_and_targets() {
        let vol = hollow_cube();
        // ROI 排除空腔和 i == 0 平面: 空腔不再提供种子,
        // i == 0 平面不会被置空.
        let mut roi_data = Array3::from_elem((5, 5, 5), 1.0f32);
        for i in 1..4 {
            for j in 1..4 {
                for k in 1..4 {
                    roi_data[[i, j, k]] = 0.0;
                }
            }
        }
        for j in 0..5 {
            for k in 0..5 {
                roi_data[[0, j, k]] = 0.0;
            }
        }
        let roi = Volume::new(
            vol.space().clone(),
            vec![VolumeMap {
                name: "roi".into(),
                data: roi_data,
                labels: None,
            }],
        );
        let out = erode_volume(&vol, 1.5, None, Some(&roi)).unwrap();
        // 种子集为空且 ROI 外体素照抄原值: 输出应与输入一致.
        assert_eq!(out.map(0).data, vol.map(0).data);
    }

    #[test]
    fn test_sub_spacing_face_fallback() {
        // 2mm 网格, 距离 0.5mm: 半径查询够不到任何邻居,
        // 回退规则仍须擦掉空值体素的面邻居.
        let space = VolumeSpace::isotropic([3, 1, 1], 2.0).unwrap();
        let mut data = Array3::from_elem((3, 1, 1), 5.0f32);
        data[[1, 0, 0]] = 0.0;
        let vol = Volume::new(
            space,
            vec![VolumeMap {
                name: "m".into(),
                data,
                labels: None,
            }],
        );
        let out = erode_volume(&vol, 0.5, None, None).unwrap();
        assert_eq!(out.value((0, 0, 0), 0), 0.0);
        assert_eq!(out.value((1, 0, 0), 0), 0.0);
        assert_eq!(out.value((2, 0, 0), 0), 0.0);
    }

    #[test]
    fn test_metric_map_uses_zero_as_empty() {
        // 无 label 表: 0.0 为空, 其余值非空.
        let space = VolumeSpace::isotropic([4, 1, 1], 1.0).unwrap();
        let mut data = Array3::from_elem((4, 1, 1), 2.5f32);
        data[[0, 0, 0]] = 0.0;
        let vol = Volume::new(
            space,
            vec![VolumeMap {
                name: "m".into(),
                data,
                labels: None,
            }],
        );
        let out = erode_volume(&vol, 1.0, None, None).unwrap();
        assert_eq!(out.value((1, 0, 0), 0), 0.0);
        assert_eq!(out.value((2, 0, 0), 0), 2.5);
        assert_eq!(out.value((3, 0, 0), 0), 2.5);
    }

    #[test]
    fn test_subvolume_selection_outputs_one_map() {
        let space = VolumeSpace::isotropic([2, 1, 1], 1.0).unwrap();
        let zeros = Array3::zeros((2, 1, 1));
        let vol = Volume::new(
            space,
            vec![
                VolumeMap {
                    name: "a".into(),
                    data: zeros.clone(),
                    labels: None,
                },
                VolumeMap {
                    name: "b".into(),
                    data: zeros,
                    labels: None,
                },
            ],
        );
        let out = erode_volume(&vol, 1.0, Some(1), None).unwrap();
        assert_eq!(out.num_maps(), 1);
        assert_eq!(out.map(0).name, "b erode 1mm");
    }
}
