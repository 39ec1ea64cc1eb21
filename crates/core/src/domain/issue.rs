use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::short_code::{normalize, ShortCode};

pub const LIST_CODE: &str = "list";
pub const LIST_HEADER: &str = "`list` = This list";

/// One backend row: the code as typed in the sheet or table, a
/// human-readable description, and the canned response text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRow {
    pub code: String,
    pub description: String,
    pub response: String,
}

impl IssueRow {
    pub fn new(
        code: impl Into<String>,
        description: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self { code: code.into(), description: description.into(), response: response.into() }
    }

    /// Reads the first three cells of a row-major record. Rows with a missing
    /// or empty cell in any of the three positions yield `None`.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> Option<Self> {
        let code = cells.first()?.as_ref();
        let description = cells.get(1)?.as_ref();
        let response = cells.get(2)?.as_ref();
        if code.is_empty() || description.is_empty() || response.is_empty() {
            return None;
        }
        Some(Self::new(code, description, response))
    }

    fn listing_line(&self) -> String {
        format!("`{}` = {}", self.code, self.description)
    }
}

/// Outcome of resolving one short code. `NotFound` is distinct from a
/// mapping to empty text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Found(String),
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(text) => Some(text),
            Self::NotFound => None,
        }
    }
}

impl From<Option<String>> for Resolution {
    fn from(value: Option<String>) -> Self {
        value.map(Self::Found).unwrap_or(Self::NotFound)
    }
}

/// Why a backend row did not make it into the index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectedRow {
    ReservedCode { code: String },
    EmptyCode { code: String },
}

/// Snapshot of normalized code to response text, plus the synthesized
/// `list` entry enumerating every accepted row in backend order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueIndex {
    entries: HashMap<String, String>,
    listing: String,
    rejected: Vec<RejectedRow>,
}

impl IssueIndex {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = IssueRow>,
    {
        let mut entries = HashMap::new();
        let mut lines = vec![LIST_HEADER.to_owned()];
        let mut rejected = Vec::new();

        for row in rows {
            let key = normalize(&row.code);
            if key.is_empty() {
                rejected.push(RejectedRow::EmptyCode { code: row.code });
                continue;
            }
            if key == LIST_CODE {
                rejected.push(RejectedRow::ReservedCode { code: row.code });
                continue;
            }

            lines.push(row.listing_line());
            // later rows win on a normalized-key collision
            entries.insert(key, row.response);
        }

        let listing = lines.join("\n");
        entries.insert(LIST_CODE.to_owned(), listing.clone());

        Self { entries, listing, rejected }
    }

    pub fn lookup(&self, code: &ShortCode) -> Resolution {
        self.get(code.normalized()).map(str::to_owned).into()
    }

    pub fn get(&self, normalized: &str) -> Option<&str> {
        self.entries.get(normalized).map(String::as_str)
    }

    pub fn listing(&self) -> &str {
        &self.listing
    }

    /// Number of keys, including the synthesized `list` entry.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }
}
