//! Label 表: 整数键到 parcel 名字的映射.

use std::collections::BTreeMap;

/// 把以 `f32` 编码的 label 值还原成整数键.
///
/// CIFTI/NIFTI 矩阵以浮点保存 label 键, 可能带有极小的编码误差,
/// 因此按 `floor(v + 0.5)` 取整后再比较.
#[inline]
pub fn key_from_value(v: f32) -> i32 {
    (v + 0.5).floor() as i32
}

/// label 键到名字的映射表, 含一个保留的 "unassigned" 键.
///
/// 每次算法调用都由调用方显式构建并向下传递, 本库不缓存任何表.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    names: BTreeMap<i32, String>,
    unassigned: i32,
}

impl LabelTable {
    /// 构建只含 unassigned 键的空表.
    pub fn new(unassigned: i32, unassigned_name: impl Into<String>) -> Self {
        let mut names = BTreeMap::new();
        names.insert(unassigned, unassigned_name.into());
        Self { names, unassigned }
    }

    /// 插入或覆盖一个 label 项. `key` 不得等于 unassigned 键, 否则 panic.
    pub fn insert(&mut self, key: i32, name: impl Into<String>) {
        assert_ne!(key, self.unassigned, "不能覆盖 unassigned 键");
        self.names.insert(key, name.into());
    }

    /// 保留的 unassigned 键.
    #[inline]
    pub fn unassigned_key(&self) -> i32 {
        self.unassigned
    }

    /// 查询键对应的名字.
    #[inline]
    pub fn name(&self, key: i32) -> Option<&str> {
        self.names.get(&key).map(String::as_str)
    }

    /// 按名字反查键. 存在多个同名项时返回键最小的那个.
    pub fn key_from_name(&self, name: &str) -> Option<i32> {
        self.names
            .iter()
            .find_map(|(k, n)| (n == name).then_some(*k))
    }

    /// 按升序迭代全部键 (含 unassigned).
    pub fn keys(&self) -> impl Iterator<Item = i32> + '_ {
        self.names.keys().copied()
    }

    /// 表内 label 项个数 (含 unassigned).
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 表是否只含 unassigned 键.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rounding_boundaries() {
        // K = 7 的编码容差: 偏移不足 0.5 仍还原为 7.
        assert_eq!(key_from_value(7.0), 7);
        assert_eq!(key_from_value(7.4999), 7);
        assert_eq!(key_from_value(6.5001), 7);
        assert_eq!(key_from_value(7.5), 8);
        assert_eq!(key_from_value(6.4999), 6);
        assert_eq!(key_from_value(-0.4999), 0);
        assert_eq!(key_from_value(0.0), 0);
    }

    #[test]
    fn test_name_lookup() {
        let mut table = LabelTable::new(0, "???");
        table.insert(3, "Thalamus");
        table.insert(5, "Putamen");
        assert_eq!(table.name(3), Some("Thalamus"));
        assert_eq!(table.key_from_name("Putamen"), Some(5));
        assert_eq!(table.key_from_name("Caudate"), None);
        assert_eq!(table.unassigned_key(), 0);
        assert_eq!(table.len(), 3);
        assert!(!table.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_insert_unassigned_panics() {
        let mut table = LabelTable::new(0, "???");
        table.insert(0, "bad");
    }
}
