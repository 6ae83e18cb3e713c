//! 静态空间点索引.

/// 三维点集的不可变半径查询索引.
///
/// 构建后点集不再变化, 查询结果精确反映构建时刻的坐标快照.
/// 内部为中位数切分的 kd-tree, 平均查询代价为次线性.
///
/// # 距离约定
///
/// 半径比较采用 **闭区间** (`<=`): 与查询点距离恰好等于半径的点
/// 视为命中. 该约定决定了腐蚀边界的含/不含语义, 上层测试依赖它.
#[derive(Debug, Clone)]
pub struct PointLocator {
    points: Vec<[f32; 3]>,
    /// kd 布局下的点下标排列: 每个子区间的中位位置即该子树的切分点.
    order: Vec<u32>,
}

#[inline]
fn dist2(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

impl PointLocator {
    /// 对 `points` 建立索引. 允许空点集 (任何查询都返回 `false`).
    pub fn new(points: &[[f32; 3]]) -> Self {
        let points = points.to_vec();
        let mut order: Vec<u32> = (0..points.len() as u32).collect();
        build(&points, &mut order, 0);
        Self { points, order }
    }

    /// 索引的点数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 点集是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `query` 的 `radius` 闭球内是否存在已索引点.
    ///
    /// `radius` 必须非负且有限, 否则 panic.
    pub fn any_in_range(&self, query: [f32; 3], radius: f32) -> bool {
        assert!(radius >= 0.0 && radius.is_finite());
        if self.points.is_empty() {
            return false;
        }
        self.search(0, self.order.len(), 0, &query, radius, radius * radius)
    }

    fn search(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        query: &[f32; 3],
        radius: f32,
        radius2: f32,
    ) -> bool {
        if lo >= hi {
            return false;
        }
        let mid = lo + (hi - lo) / 2;
        let point = &self.points[self.order[mid] as usize];
        if dist2(point, query) <= radius2 {
            return true;
        }
        let axis = depth % 3;
        let diff = query[axis] - point[axis];
        let (near, far) = if diff < 0.0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        if self.search(near.0, near.1, depth + 1, query, radius, radius2) {
            return true;
        }
        // 切分面距查询点不超过半径时, 远侧子树仍可能命中.
        if diff.abs() <= radius {
            return self.search(far.0, far.1, depth + 1, query, radius, radius2);
        }
        false
    }
}

/// 递归就地构建 kd 排列: 区间中位作为切分点, 两侧按切分轴分治.
fn build(points: &[[f32; 3]], order: &mut [u32], depth: usize) {
    if order.len() <= 1 {
        return;
    }
    let axis = depth % 3;
    let mid = order.len() / 2;
    order.select_nth_unstable_by(mid, |&a, &b| {
        points[a as usize][axis].total_cmp(&points[b as usize][axis])
    });
    let (left, rest) = order.split_at_mut(mid);
    build(points, left, depth + 1);
    build(points, &mut rest[1..], depth + 1);
}
