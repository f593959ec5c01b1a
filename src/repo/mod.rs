//! Repository layer: one module per table, each exposing async
//! `list / get / create / update / delete` functions over a `PgPool`.
//!
//! Filters use the `($n::type IS NULL OR col = $n)` idiom so every query is a
//! static SQL string with optional binds.

pub mod applications;
pub mod audit_log;
pub mod comms;
pub mod companies;
pub mod contacts;
pub mod deals;
pub mod documents;
pub mod lenders;
pub mod messages;
pub mod notifications;
pub mod pipeline;
pub mod products;
pub mod stages;
pub mod tags;
pub mod users;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// `%term%` for ILIKE with the LIKE wildcards in `term` escaped.
pub fn like_pattern(term: Option<&str>) -> Option<String> {
    let term = term?.trim();
    if term.is_empty() {
        return None;
    }
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    Some(format!("%{escaped}%"))
}
