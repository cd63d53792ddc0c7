//! 游标分页引擎
//!
//! 把按单调 id 排序的无界集合切成稳定的页：游标之后（按请求方向
//! 严格超过 `after_id`）的前 `page_size` 条。`total` 统计的是应用
//! 搜索过滤之后、应用游标窗口之前的整个集合。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};

/// 默认页大小，对齐对外接口的 `per_page=15`。
pub const DEFAULT_PAGE_SIZE: i64 = 15;

/// 排序方向，默认从最新到最旧。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// 一次分页请求。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorQuery {
    pub after_id: Option<i64>,
    pub page_size: i64,
    pub direction: SortDirection,
}

impl CursorQuery {
    /// 构造分页请求。`page_size` 小于 1 直接拒绝，不做静默钳制。
    pub fn new(
        after_id: Option<i64>,
        page_size: i64,
        direction: SortDirection,
    ) -> DomainResult<Self> {
        if page_size < 1 {
            return Err(DomainError::invalid_argument(
                "page_size",
                "must be at least 1",
            ));
        }
        Ok(Self {
            after_id,
            page_size,
            direction,
        })
    }

    /// 无游标的第一页。
    pub fn first_page(page_size: i64, direction: SortDirection) -> DomainResult<Self> {
        Self::new(None, page_size, direction)
    }

    /// id 是否严格位于游标之后：asc 用 `>`，desc 用 `<`。
    pub fn beyond_cursor(&self, id: i64) -> bool {
        match (self.after_id, self.direction) {
            (None, _) => true,
            (Some(after), SortDirection::Asc) => id > after,
            (Some(after), SortDirection::Desc) => id < after,
        }
    }
}

/// 一页结果。返回条数少于 `page_size` 并不代表最后一页，
/// 调用方应以 `total` 为准。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> CursorPage<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> CursorPage<U> {
        CursorPage {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

/// 对已经过搜索过滤的集合套用游标窗口。
///
/// 输入顺序不限；输出按请求方向排序。内存仓储和测试共用此实现，
/// 数据库仓储在 SQL 里表达同样的语义。
pub fn paginate_by_id<T: Clone>(
    items: &[T],
    id_of: impl Fn(&T) -> i64,
    query: &CursorQuery,
) -> CursorPage<T> {
    let total = items.len() as u64;

    let mut window: Vec<&T> = items
        .iter()
        .filter(|item| query.beyond_cursor(id_of(item)))
        .collect();
    match query.direction {
        SortDirection::Asc => window.sort_by_key(|item| id_of(item)),
        SortDirection::Desc => window.sort_by_key(|item| std::cmp::Reverse(id_of(item))),
    }
    window.truncate(query.page_size as usize);

    CursorPage {
        items: window.into_iter().cloned().collect(),
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(page: &CursorPage<i64>) -> Vec<i64> {
        page.items.clone()
    }

    #[test]
    fn rejects_non_positive_page_size() {
        assert!(CursorQuery::new(None, 0, SortDirection::Desc).is_err());
        assert!(CursorQuery::new(None, -3, SortDirection::Asc).is_err());
        assert!(CursorQuery::new(None, 1, SortDirection::Desc).is_ok());
    }

    #[test]
    fn desc_page_after_cursor() {
        let all: Vec<i64> = (1..=20).collect();
        let query = CursorQuery::new(Some(11), 10, SortDirection::Desc).unwrap();
        let page = paginate_by_id(&all, |id| *id, &query);
        assert_eq!(ids(&page), (1..=10).rev().collect::<Vec<_>>());
        assert_eq!(page.total, 20);
    }

    #[test]
    fn asc_page_after_cursor_may_be_short() {
        let all: Vec<i64> = (1..=20).collect();
        let query = CursorQuery::new(Some(15), 10, SortDirection::Asc).unwrap();
        let page = paginate_by_id(&all, |id| *id, &query);
        assert_eq!(ids(&page), vec![16, 17, 18, 19, 20]);
        assert_eq!(page.total, 20);
    }

    #[test]
    fn missing_cursor_starts_from_the_requested_end() {
        let all: Vec<i64> = (1..=5).collect();

        let desc = CursorQuery::new(None, 2, SortDirection::Desc).unwrap();
        assert_eq!(ids(&paginate_by_id(&all, |id| *id, &desc)), vec![5, 4]);

        let asc = CursorQuery::new(None, 2, SortDirection::Asc).unwrap();
        assert_eq!(ids(&paginate_by_id(&all, |id| *id, &asc)), vec![1, 2]);
    }

    #[test]
    fn total_counts_the_whole_filtered_set() {
        let all: Vec<i64> = (1..=50).collect();
        let query = CursorQuery::new(Some(3), 15, SortDirection::Desc).unwrap();
        let page = paginate_by_id(&all, |id| *id, &query);
        assert_eq!(ids(&page), vec![2, 1]);
        assert_eq!(page.total, 50);
    }
}
