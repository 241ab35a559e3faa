//! List-query pagination
//!
//! Limits are clamped server-side; negative values are a validation error.
//! Ordering is the entity's natural timestamp descending unless a query says
//! otherwise.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};
use crate::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Validated pagination window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u64,
}

impl Pagination {
    /// Build from raw query values with the standard cap of 100.
    ///
    /// `limit` below 1 or negative values reject; values above the cap clamp.
    pub fn from_query(limit: Option<i64>, offset: Option<i64>) -> GatewayResult<Self> {
        Self::from_query_capped(limit, offset, MAX_PAGE_LIMIT)
    }

    /// Build with an explicit cap (platform logs allow up to 1000)
    pub fn from_query_capped(
        limit: Option<i64>,
        offset: Option<i64>,
        cap: u32,
    ) -> GatewayResult<Self> {
        let limit = match limit {
            None => DEFAULT_PAGE_LIMIT.min(cap),
            Some(l) if l < 1 => {
                return Err(GatewayError::validation("limit", "must be at least 1"));
            }
            Some(l) => (l as u64).min(cap as u64) as u32,
        };
        let offset = match offset {
            None => 0,
            Some(o) if o < 0 => {
                return Err(GatewayError::validation("offset", "must not be negative"));
            }
            Some(o) => o as u64,
        };
        Ok(Self { limit, offset })
    }

    /// Apply this window to an already-ordered slice
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.offset as usize).min(items.len());
        let end = (start + self.limit as usize).min(items.len());
        &items[start..end]
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let page = Pagination::from_query(None, None).unwrap();
        assert_eq!(page.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn test_limit_clamped_to_cap() {
        let page = Pagination::from_query(Some(5000), None).unwrap();
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn test_negative_limit_rejected() {
        assert!(Pagination::from_query(Some(-1), None).is_err());
        assert!(Pagination::from_query(Some(0), None).is_err());
    }

    #[test]
    fn test_negative_offset_rejected() {
        assert!(Pagination::from_query(None, Some(-5)).is_err());
    }

    #[test]
    fn test_log_cap() {
        let page = Pagination::from_query_capped(Some(5000), None, 1000).unwrap();
        assert_eq!(page.limit, 1000);
    }

    #[test]
    fn test_slice_window() {
        let items: Vec<u32> = (0..10).collect();
        let page = Pagination { limit: 3, offset: 4 };
        assert_eq!(page.slice(&items), &[4, 5, 6]);

        let page = Pagination { limit: 3, offset: 9 };
        assert_eq!(page.slice(&items), &[9]);

        let page = Pagination { limit: 3, offset: 20 };
        assert!(page.slice(&items).is_empty());
    }
}
