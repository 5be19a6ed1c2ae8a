//! Page query parameters shared by collection endpoints.

use std::collections::HashMap;
use std::fmt;

use actions::Problem;

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 200;

/// Cursor value meaning "the newest ledger at request time".
pub const CURSOR_NOW: &str = "now";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn reverse(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => f.write_str("asc"),
            Self::Desc => f.write_str("desc"),
        }
    }
}

/// Position, direction, and size of a page of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    /// Paging token of the record preceding the page (exclusive).
    pub cursor: Option<u32>,
    pub order: Order,
    pub limit: u32,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            cursor: None,
            order: Order::Asc,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageQuery {
    /// Parse `cursor`, `order`, and `limit` from query parameters.
    ///
    /// The `now` cursor resolves to `latest` (the newest known paging token).
    pub fn from_params(
        params: &HashMap<String, String>,
        latest: Option<u32>,
    ) -> Result<Self, Problem> {
        Ok(Self {
            cursor: parse_cursor(params.get("cursor"), latest)?,
            order: parse_order(params.get("order"))?,
            limit: parse_limit(params.get("limit"))?,
        })
    }
}

fn parse_cursor(raw: Option<&String>, latest: Option<u32>) -> Result<Option<u32>, Problem> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if raw == CURSOR_NOW {
        return Ok(Some(latest.unwrap_or(0)));
    }
    raw.parse::<u32>().map(Some).map_err(|_| {
        Problem::bad_request(
            "cursor",
            "cursor must be a paging token or the string \"now\"",
        )
    })
}

fn parse_order(raw: Option<&String>) -> Result<Order, Problem> {
    match raw.map(|s| s.trim()) {
        None | Some("") | Some("asc") => Ok(Order::Asc),
        Some("desc") => Ok(Order::Desc),
        Some(_) => Err(Problem::bad_request(
            "order",
            "order must be \"asc\" or \"desc\"",
        )),
    }
}

fn parse_limit(raw: Option<&String>) -> Result<u32, Problem> {
    let Some(raw) = raw.map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_LIMIT);
    };
    match raw.parse::<u32>() {
        Ok(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
        _ => Err(Problem::bad_request(
            "limit",
            format!("limit must be an integer between 1 and {MAX_LIMIT}"),
        )),
    }
}
