//! Worksheet storage: sparse cells plus attached collections.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use strum::{Display, EnumString, IntoStaticStr};

use crate::{ledger::RegionBounds, object::Object};

/// Rows per worksheet.
pub(crate) const MAX_ROWS: u32 = 1_048_576;
/// Columns per worksheet (`XFD`).
pub(crate) const MAX_COLS: u32 = 16_384;
/// Largest range whose cells may be materialized in one read or broadcast write.
pub(crate) const MAX_RANGE_CELLS: u64 = 1 << 20;

pub(crate) const GENERAL_FORMAT: &str = "General";

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Cell {
    pub value: Option<Object>,
    pub formula: Option<String>,
    pub number_format: Option<String>,
    /// Format properties keyed by path, e.g. `font.bold` or `borders.EdgeTop.style`.
    pub style: IndexMap<String, Object>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.formula.is_none() && self.number_format.is_none() && self.style.is_empty()
    }

    /// The value reported by `values`; blank cells read as the empty string.
    pub fn value(&self) -> Object {
        match (&self.value, &self.formula) {
            (Some(value), _) => value.clone(),
            (None, Some(formula)) => Object::String(formula.clone()),
            (None, None) => Object::String(String::new()),
        }
    }

    /// The value reported by `formulas`: the formula if there is one, else the value.
    pub fn formula(&self) -> Object {
        match &self.formula {
            Some(formula) => Object::String(formula.clone()),
            None => self.value(),
        }
    }

    pub fn number_format(&self) -> &str {
        self.number_format.as_deref().unwrap_or(GENERAL_FORMAT)
    }

    /// Displayed text of the value.
    pub fn text(&self) -> String {
        match self.value() {
            Object::Number(n) => format_number(n),
            Object::Bool(b) => String::from(if b { "TRUE" } else { "FALSE" }),
            Object::String(s) => s,
            other => other.to_string(),
        }
    }

    fn clear_contents(&mut self) {
        self.value = None;
        self.formula = None;
    }

    fn clear_formats(&mut self) {
        self.number_format = None;
        self.style.clear();
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Named collections attached to a worksheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum AttachedKind {
    Notes,
    Comments,
    Charts,
    PivotTables,
    Tables,
}

impl AttachedKind {
    /// Host type names of the collection and of one item.
    pub fn type_names(self) -> (&'static str, &'static str) {
        match self {
            Self::Notes => ("NoteCollection", "Note"),
            Self::Comments => ("CommentCollection", "Comment"),
            Self::Charts => ("ChartCollection", "Chart"),
            Self::PivotTables => ("PivotTableCollection", "PivotTable"),
            Self::Tables => ("TableCollection", "Table"),
        }
    }

    /// Whether items are keyed by the cell they annotate.
    pub fn is_cell_annotation(self) -> bool {
        matches!(self, Self::Notes | Self::Comments)
    }
}

/// One chart, table, pivot table, note or comment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attachment {
    pub name: String,
    pub props: IndexMap<String, Object>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub(crate) enum ClearApplyTo {
    #[default]
    All,
    Contents,
    Formats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub(crate) enum CopyType {
    #[default]
    All,
    Formulas,
    Values,
    Formats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub(crate) enum Shift {
    Up,
    Left,
    Down,
    Right,
}

#[derive(Debug, Clone)]
pub(crate) struct Sheet {
    /// Volatile host id.
    pub id: String,
    pub name: String,
    pub visibility: String,
    /// Keyed by zero-based `(row, col)`.
    pub cells: BTreeMap<(u32, u32), Cell>,
    pub attached: IndexMap<AttachedKind, Vec<Attachment>>,
}

impl Sheet {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            visibility: "Visible".to_owned(),
            cells: BTreeMap::new(),
            attached: IndexMap::new(),
        }
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn cell_mut(&mut self, row: u32, col: u32) -> &mut Cell {
        self.cells.entry((row, col)).or_default()
    }

    /// Drops cells that no longer hold anything.
    pub fn prune(&mut self) {
        self.cells.retain(|_, cell| !cell.is_empty());
    }

    /// Bounding box of cells with content; `values_only` ignores format-only cells.
    pub fn used_bounds(&self, values_only: bool) -> Option<RegionBounds> {
        let mut bounds: Option<RegionBounds> = None;
        for (&(row, col), cell) in &self.cells {
            if values_only && cell.value.is_none() && cell.formula.is_none() {
                continue;
            }
            bounds = Some(match bounds {
                None => RegionBounds::cell(row, col),
                Some(b) => RegionBounds {
                    start_col: b.start_col.min(col),
                    start_row: b.start_row.min(row),
                    end_col: b.end_col.max(col),
                    end_row: b.end_row.max(row),
                },
            });
        }
        bounds
    }

    pub fn clear(&mut self, bounds: &RegionBounds, apply_to: ClearApplyTo) {
        for (_, cell) in self.cells_in_mut(bounds) {
            match apply_to {
                ClearApplyTo::All => *cell = Cell::default(),
                ClearApplyTo::Contents => cell.clear_contents(),
                ClearApplyTo::Formats => cell.clear_formats(),
            }
        }
        self.prune();
    }

    /// Removes `bounds`, shifting the following cells up or left.
    pub fn delete(&mut self, bounds: &RegionBounds, shift: Shift) {
        let (height, width) = (bounds.row_count(), bounds.col_count());
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|((row, col), cell)| {
                if bounds.contains(row, col) {
                    return None;
                }
                let in_cols = (bounds.start_col..=bounds.end_col).contains(&col);
                let in_rows = (bounds.start_row..=bounds.end_row).contains(&row);
                let key = match shift {
                    Shift::Up | Shift::Down if in_cols && row > bounds.end_row => (row - height, col),
                    Shift::Left | Shift::Right if in_rows && col > bounds.end_col => (row, col - width),
                    _ => (row, col),
                };
                Some((key, cell))
            })
            .collect();
    }

    /// Opens empty cells at `bounds`, shifting existing cells down or right. Cells pushed past
    /// the sheet edge are dropped.
    pub fn insert(&mut self, bounds: &RegionBounds, shift: Shift) {
        let (height, width) = (bounds.row_count(), bounds.col_count());
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|((row, col), cell)| {
                let in_cols = (bounds.start_col..=bounds.end_col).contains(&col);
                let in_rows = (bounds.start_row..=bounds.end_row).contains(&row);
                let key = match shift {
                    Shift::Down | Shift::Up if in_cols && row >= bounds.start_row => (row + height, col),
                    Shift::Right | Shift::Left if in_rows && col >= bounds.start_col => (row, col + width),
                    _ => (row, col),
                };
                (key.0 < MAX_ROWS && key.1 < MAX_COLS).then_some((key, cell))
            })
            .collect();
    }

    /// Copies the cells of `source` (in `from`'s coordinates) to the block starting at
    /// `(row, col)`.
    pub fn paste(&mut self, source: Vec<((u32, u32), Cell)>, from: &RegionBounds, row: u32, col: u32, copy: CopyType) {
        let dest = RegionBounds {
            start_col: col,
            start_row: row,
            end_col: col + (from.end_col - from.start_col),
            end_row: row + (from.end_row - from.start_row),
        };
        if copy != CopyType::Formats {
            for (_, cell) in self.cells_in_mut(&dest) {
                cell.clear_contents();
            }
        }
        if matches!(copy, CopyType::All | CopyType::Formats) {
            for (_, cell) in self.cells_in_mut(&dest) {
                cell.clear_formats();
            }
        }
        for ((src_row, src_col), src) in source {
            let (r, c) = (row + (src_row - from.start_row), col + (src_col - from.start_col));
            if r >= MAX_ROWS || c >= MAX_COLS {
                continue;
            }
            let cell = self.cell_mut(r, c);
            match copy {
                CopyType::All => *cell = src,
                CopyType::Formulas => {
                    cell.value = src.value;
                    cell.formula = src.formula;
                }
                CopyType::Values => {
                    cell.value = (src.value.is_some() || src.formula.is_some()).then(|| src.value());
                    cell.formula = None;
                }
                CopyType::Formats => {
                    cell.number_format = src.number_format;
                    cell.style = src.style;
                }
            }
        }
        self.prune();
    }

    /// Clones the non-empty cells inside `bounds`.
    pub fn cells_in(&self, bounds: &RegionBounds) -> Vec<((u32, u32), Cell)> {
        self.cells
            .range((bounds.start_row, 0)..=(bounds.end_row, u32::MAX))
            .filter(|((_, col), _)| (bounds.start_col..=bounds.end_col).contains(col))
            .map(|(key, cell)| (*key, cell.clone()))
            .collect()
    }

    fn cells_in_mut<'s>(&'s mut self, bounds: &RegionBounds) -> impl Iterator<Item = (&'s (u32, u32), &'s mut Cell)> {
        let cols = bounds.start_col..=bounds.end_col;
        self.cells
            .range_mut((bounds.start_row, 0)..=(bounds.end_row, u32::MAX))
            .filter(move |((_, col), _)| cols.contains(col))
    }

    pub fn attached(&self, kind: AttachedKind) -> &[Attachment] {
        self.attached.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn attached_mut(&mut self, kind: AttachedKind) -> &mut Vec<Attachment> {
        self.attached.entry(kind).or_default()
    }
}
