pub mod actors;
pub mod genres;
pub mod performances;
pub mod plays;
pub mod reservations;
pub mod theatre_halls;

use axum::Router;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(actors::routes())
        .merge(genres::routes())
        .merge(theatre_halls::routes())
        .merge(plays::routes())
        .merge(performances::routes())
        .merge(reservations::routes())
}

/// `page`/`pageSize` query parameters shared by every list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u32>,
}

impl PageParams {
    pub fn limit_offset(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self.page_size.unwrap_or(20).clamp(1, 50);
        // Widen before multiplying; an arbitrary client-supplied page number
        // must not overflow u32 arithmetic.
        (page_size as i64, (page as i64 - 1) * page_size as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(PageParams::default().limit_offset(), (20, 0));

        let p = PageParams {
            page: Some(3),
            page_size: Some(10),
        };
        assert_eq!(p.limit_offset(), (10, 20));

        // Oversized page size is clamped, page 0 treated as the first page.
        let p = PageParams {
            page: Some(0),
            page_size: Some(10_000),
        };
        assert_eq!(p.limit_offset(), (50, 0));
    }

    #[test]
    fn huge_page_number_does_not_overflow() {
        let p = PageParams {
            page: Some(u32::MAX),
            page_size: Some(50),
        };
        assert_eq!(p.limit_offset(), (50, (u32::MAX as i64 - 1) * 50));
    }
}
