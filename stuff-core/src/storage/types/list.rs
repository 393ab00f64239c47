//! Paged list results

use serde::Serialize;

use crate::storage::helper::calc_num_pages;

#[derive(Clone, Debug, Serialize)]
pub struct ListPage<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub num_pages: u64,
}

impl<T> ListPage<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, page_size: u64) -> Self {
        let (num_pages, page_size) = calc_num_pages(page_size, total);
        Self {
            items,
            total,
            page: page.max(1),
            page_size,
            num_pages,
        }
    }
}
