//! HTTP handlers

pub mod auth;
pub mod catalog;
pub mod finance;
pub mod health;
pub mod notification;
pub mod pos;
pub mod product;
pub mod purchase_order;
pub mod reconciliation;
pub mod reporting;
pub mod sale;
pub mod user;

pub use health::health_check;

use serde::Deserialize;
use shared::Pagination;

/// `?page=&per_page=` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_query(self.page, self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_is_clamped() {
        let query = PageQuery {
            page: Some(0),
            per_page: Some(1000),
        };
        let pagination = query.pagination();
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.per_page, Pagination::MAX_PER_PAGE);
        assert_eq!(PageQuery::default().pagination(), Pagination::default());
    }
}
