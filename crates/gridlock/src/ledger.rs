//! Dirty-range records: merging, parsing and formatting.
//!
//! A dirty range names a region of a scope (worksheet) that a snippet modified. Regions are A1
//! addresses without a sheet prefix, or the wildcard `*` meaning "assume the whole scope
//! changed".

use std::fmt::Write as _;

use ahash::AHashSet;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Region value meaning the entire scope.
pub const WILDCARD: &str = "*";

/// Scope id of a mutation whose scope could not be resolved.
pub const UNRESOLVED_SCOPE: i64 = -1;

/// One mutated region of one scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirtyRange {
    /// Stable scope id, or `-1` when unresolved.
    pub scope_id: i64,
    /// A1 address such as `B2:D10`, or `*`.
    pub region: String,
}

impl DirtyRange {
    #[must_use]
    pub fn new(scope_id: i64, region: impl Into<String>) -> Self {
        Self {
            scope_id,
            region: region.into(),
        }
    }

    #[must_use]
    pub fn wildcard(scope_id: i64) -> Self {
        Self::new(scope_id, WILDCARD)
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.region == WILDCARD
    }
}

/// Zero-based, inclusive bounding box of an A1 region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionBounds {
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    pub end_row: u32,
}

impl RegionBounds {
    /// A single cell.
    #[must_use]
    pub fn cell(row: u32, col: u32) -> Self {
        Self {
            start_col: col,
            start_row: row,
            end_col: col,
            end_row: row,
        }
    }

    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.end_row - self.start_row + 1
    }

    #[must_use]
    pub fn col_count(&self) -> u32 {
        self.end_col - self.start_col + 1
    }

    #[must_use]
    pub fn contains(&self, row: u32, col: u32) -> bool {
        (self.start_row..=self.end_row).contains(&row) && (self.start_col..=self.end_col).contains(&col)
    }

    /// Renders as `A1` for a single cell, `A1:B5` otherwise.
    #[must_use]
    pub fn to_a1(&self) -> String {
        let start = cell_address(self.start_row, self.start_col);
        if self.start_row == self.end_row && self.start_col == self.end_col {
            return start;
        }
        format!("{start}:{}", cell_address(self.end_row, self.end_col))
    }
}

/// Collapses records per scope.
///
/// A scope with any wildcard record keeps only one wildcard, at the position its first wildcard
/// was seen; other scopes keep each distinct region once. Overlapping regions are not unioned.
#[must_use]
pub fn merge(ranges: &[DirtyRange]) -> Vec<DirtyRange> {
    let wildcard_scopes: AHashSet<i64> = ranges.iter().filter(|r| r.is_wildcard()).map(|r| r.scope_id).collect();
    let mut seen: IndexMap<(i64, &str), &DirtyRange> = IndexMap::new();
    for range in ranges {
        if wildcard_scopes.contains(&range.scope_id) && !range.is_wildcard() {
            continue;
        }
        seen.entry((range.scope_id, range.region.as_str())).or_insert(range);
    }
    seen.into_values().cloned().collect()
}

/// Parses `A1` or `A1:B5` (case-insensitive) into zero-based bounds.
///
/// Returns `None` for the wildcard and for anything that is not a cell or a cell pair.
#[must_use]
pub fn parse_region(region: &str) -> Option<RegionBounds> {
    if region == WILDCARD {
        return None;
    }
    let (start, end) = match region.split_once(':') {
        Some((start, end)) => (parse_cell(start)?, parse_cell(end)?),
        None => {
            let cell = parse_cell(region)?;
            (cell, cell)
        }
    };
    Some(RegionBounds {
        start_col: start.1.min(end.1),
        start_row: start.0.min(end.0),
        end_col: start.1.max(end.1),
        end_row: start.0.max(end.0),
    })
}

/// Parses one cell reference into zero-based `(row, col)`.
fn parse_cell(cell: &str) -> Option<(u32, u32)> {
    let digits_at = cell.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cell.split_at(digits_at);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let row = digits.parse::<u32>().ok()?.checked_sub(1)?;
    let mut col: u32 = 0;
    for c in letters.chars() {
        let digit = u32::from(c.to_ascii_uppercase()) - u32::from('A') + 1;
        col = col.checked_mul(26)?.checked_add(digit)?;
    }
    Some((row, col - 1))
}

/// Letters of a zero-based column index: `0` → `A`, `26` → `AA`.
#[must_use]
pub fn column_letters(index: u32) -> String {
    let mut n = u64::from(index) + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push(char::from(b'A' + rem));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// A1 reference of a zero-based cell.
#[must_use]
pub fn cell_address(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), u64::from(row) + 1)
}

/// Renders merged ranges for display, e.g. `Sales!A1:B2, Sheet 4 (all)`.
///
/// `scope_name` maps a scope id to a display name; unknown ids render as `Sheet <id>`.
pub fn format(ranges: &[DirtyRange], scope_name: impl Fn(i64) -> Option<String>) -> String {
    let mut out = String::new();
    for (i, range) in merge(ranges).iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let name = scope_name(range.scope_id)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Sheet {}", range.scope_id));
        if range.is_wildcard() {
            let _ = write!(out, "{name} (all)");
        } else {
            let _ = write!(out, "{name}!{}", range.region);
        }
    }
    out
}
