//! Query engine over log snapshots.
//!
//! Every function here is pure: callers pass in a snapshot obtained from the
//! store and get back owned rows, so concurrent appends never leak into a page.

mod stats;

pub use stats::*;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::CheckResult;

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown filter: {0}")]
pub struct FilterParseError(String);

/// Which outcomes a query keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterState {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "success")]
    SuccessOnly,
    #[serde(rename = "error")]
    ErrorOnly,
}

impl FilterState {
    pub fn matches(self, result: &CheckResult) -> bool {
        match self {
            FilterState::All => true,
            FilterState::SuccessOnly => result.success,
            FilterState::ErrorOnly => !result.success,
        }
    }
}

impl FromStr for FilterState {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(FilterState::All),
            "success" => Ok(FilterState::SuccessOnly),
            "error" => Ok(FilterState::ErrorOnly),
            other => Err(FilterParseError(other.to_string())),
        }
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterState::All => "all",
            FilterState::SuccessOnly => "success",
            FilterState::ErrorOnly => "error",
        };
        f.write_str(name)
    }
}

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Zero values are raised to 1.
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of query results, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub rows: Vec<CheckResult>,
    pub page: usize,
    pub page_size: usize,
    pub total_matching: usize,
    /// 0 when nothing matches.
    pub total_pages: usize,
}

impl LogPage {
    /// True when no entry matched the filter.
    pub fn is_empty(&self) -> bool {
        self.total_matching == 0
    }
}

/// Number of pages needed for `matching` rows.
pub fn total_pages(matching: usize, page_size: usize) -> usize {
    matching.div_ceil(page_size.max(1))
}

/// Filter and paginate a snapshot, most recent entries first.
///
/// Pages past the end come back with no rows.
pub fn query(log: &[CheckResult], filter: FilterState, page: PageRequest) -> LogPage {
    let page = PageRequest::new(page.page, page.page_size);
    let matching: Vec<&CheckResult> = log.iter().rev().filter(|r| filter.matches(r)).collect();

    let rows = matching
        .iter()
        .skip((page.page - 1).saturating_mul(page.page_size))
        .take(page.page_size)
        .map(|r| (*r).clone())
        .collect();

    LogPage {
        rows,
        page: page.page,
        page_size: page.page_size,
        total_matching: matching.len(),
        total_pages: total_pages(matching.len(), page.page_size),
    }
}

/// Consumer-side navigation state: the active filter and current page.
///
/// Navigation methods return whether the page changed; requests that fall
/// outside the available pages leave the view untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogView {
    filter: FilterState,
    current_page: usize,
    page_size: usize,
}

impl Default for LogView {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl LogView {
    pub fn new(page_size: usize) -> Self {
        Self {
            filter: FilterState::All,
            current_page: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn filter(&self) -> FilterState {
        self.filter
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Switch filters and go back to the first page.
    pub fn set_filter(&mut self, filter: FilterState) {
        self.filter = filter;
        self.current_page = 1;
    }

    pub fn render(&self, log: &[CheckResult]) -> LogPage {
        query(log, self.filter, PageRequest::new(self.current_page, self.page_size))
    }

    pub fn total_pages(&self, log: &[CheckResult]) -> usize {
        let matching = log.iter().filter(|r| self.filter.matches(r)).count();
        total_pages(matching, self.page_size)
    }

    pub fn next_page(&mut self, log: &[CheckResult]) -> bool {
        if self.current_page < self.total_pages(log) {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.current_page > 1 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }

    pub fn first_page(&mut self) -> bool {
        self.go_to(1)
    }

    pub fn last_page(&mut self, log: &[CheckResult]) -> bool {
        match self.total_pages(log) {
            0 => false,
            last => self.go_to(last),
        }
    }

    /// Jump to `page` if it exists; otherwise do nothing.
    pub fn go_to_page(&mut self, page: usize, log: &[CheckResult]) -> bool {
        if page >= 1 && page <= self.total_pages(log) {
            self.go_to(page)
        } else {
            false
        }
    }

    fn go_to(&mut self, page: usize) -> bool {
        let changed = self.current_page != page;
        self.current_page = page;
        changed
    }
}
