//! Small utilities shared by the store implementations

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use std::rc::Rc;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Number of pages needed to show `total` rows, `page_size` at a time,
/// together with the effective page size.
///
/// A zero page size means "everything on one page".
pub fn calc_num_pages(page_size: u64, total: u64) -> (u64, u64) {
    let page_size = if page_size == 0 { total } else { page_size };
    if page_size == 0 {
        return (1, 0);
    }
    (total.div_ceil(page_size), page_size)
}

/// Clamp a requested page/page size pair into the `(limit, offset)` used in SQL.
///
/// Values past `i64::MAX` saturate, so an absurd page yields an empty result
/// rather than wrapping into SQLite's "no limit".
pub fn limit_offset(page: u64, page_size: u64) -> (i64, i64) {
    let page = page.max(1);
    let limit = i64::try_from(page_size).unwrap_or(i64::MAX);
    let offset = i64::try_from((page - 1).saturating_mul(page_size)).unwrap_or(i64::MAX);
    (limit, offset)
}

/// Bind a list of values as a single parameter usable with `IN rarray(?)`.
pub fn rarray<T, I>(values: I) -> Rc<Vec<Value>>
where
    I: IntoIterator<Item = T>,
    T: Into<Value>,
{
    Rc::new(values.into_iter().map(Into::into).collect())
}
