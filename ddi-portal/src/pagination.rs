//! Paged listings (100 results per page)

use serde::{Deserialize, Serialize};

/// Page size for all listings
pub const PAGE_SIZE: u64 = 100;

/// `?page=` query parameter
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self { page: default_page() }
    }
}

fn default_page() -> i64 {
    1
}

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u64,
    pub total_pages: u64,
    pub offset: u64,
}

/// Clamp `requested_page` into `[1, total_pages]` and derive the offset
///
/// # Examples
/// ```
/// use ddi_portal::pagination::calculate_pagination;
///
/// let p = calculate_pagination(250, 2);
/// assert_eq!((p.page, p.total_pages, p.offset), (2, 3, 100));
///
/// // Out-of-range pages are clamped
/// let p = calculate_pagination(250, 99);
/// assert_eq!((p.page, p.offset), (3, 200));
/// ```
pub fn calculate_pagination(total_results: u64, requested_page: i64) -> Pagination {
    let total_pages = total_results.div_ceil(PAGE_SIZE);
    let page = (requested_page.max(1) as u64).min(total_pages.max(1));

    Pagination {
        page,
        total_pages,
        offset: (page - 1) * PAGE_SIZE,
    }
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub total_results: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(pagination: Pagination, total_results: u64, results: Vec<T>) -> Self {
        Self {
            total_results,
            page: pagination.page,
            page_size: PAGE_SIZE,
            total_pages: pagination.total_pages,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_normal() {
        let p = calculate_pagination(250, 2);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_high() {
        let p = calculate_pagination(150, 99);
        assert_eq!(p.page, 2);
        assert_eq!(p.offset, 100);
    }

    #[test]
    fn test_pagination_out_of_bounds_low() {
        let p = calculate_pagination(150, -3);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_empty() {
        let p = calculate_pagination(0, 1);
        assert_eq!(p.page, 1);
        assert_eq!(p.total_pages, 0);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_pagination_exact_page_boundary() {
        let p = calculate_pagination(200, 3);
        assert_eq!(p.page, 2);
        assert_eq!(p.total_pages, 2);
    }
}
