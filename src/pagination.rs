//! Limit/offset pagination shared by every list endpoint.

use crate::config::PaginationConfig;
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

/// Resolved pagination, echoed back as the `meta` of list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Maximum number of rows to return.
    pub limit: u32,
    /// Number of rows to skip.
    pub offset: u32,
}

/// Raw query parameters before validation. Other parameters (`title`,
/// `name`) are ignored here.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationQuery {
    /// Requested limit.
    pub limit: Option<i64>,
    /// Requested offset.
    pub offset: Option<i64>,
}

impl Pagination {
    /// Apply defaults and bounds to raw query values.
    pub fn resolve(query: &PaginationQuery, config: &PaginationConfig) -> Result<Self> {
        let limit = query.limit.unwrap_or(i64::from(config.default_limit));
        if limit < 1 || limit > i64::from(config.max_limit) {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                config.max_limit
            )));
        }

        let offset = query.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation(
                "offset must not be negative".to_string(),
            ));
        }
        let offset = u32::try_from(offset)
            .map_err(|_| AppError::Validation("offset is too large".to_string()))?;

        Ok(Self {
            // Bounded by max_limit above.
            limit: limit as u32,
            offset,
        })
    }
}

impl FromRequestParts<AppState> for Pagination {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Query(query) = Query::<PaginationQuery>::try_from_uri(&parts.uri)
            .map_err(|e| AppError::Validation(format!("invalid pagination: {}", e.body_text())))?;

        Pagination::resolve(&query, &state.config.pagination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<i64>, offset: Option<i64>) -> PaginationQuery {
        PaginationQuery { limit, offset }
    }

    #[test]
    fn test_defaults_applied() {
        let config = PaginationConfig::default();
        let p = Pagination::resolve(&query(None, None), &config).unwrap();
        assert_eq!(p.limit, config.default_limit);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn test_bounds_rejected() {
        let config = PaginationConfig::default();
        assert!(Pagination::resolve(&query(Some(0), None), &config).is_err());
        assert!(Pagination::resolve(&query(Some(101), None), &config).is_err());
        assert!(Pagination::resolve(&query(None, Some(-1)), &config).is_err());
        assert!(Pagination::resolve(&query(Some(100), Some(0)), &config).is_ok());
    }

    #[test]
    fn test_meta_serializes_resolved_values() {
        let config = PaginationConfig::default();
        let p = Pagination::resolve(&query(Some(5), Some(10)), &config).unwrap();
        let meta = serde_json::to_value(p).unwrap();
        assert_eq!(meta, serde_json::json!({ "limit": 5, "offset": 10 }));
    }
}
