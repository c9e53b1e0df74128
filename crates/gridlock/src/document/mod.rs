//! An in-memory spreadsheet host.
//!
//! `MemoryWorkbook` implements `HostDocument` with the object shapes snippets expect from a
//! live spreadsheet: request context, workbook, worksheet collection, worksheets, ranges, range
//! formats and the notes/comments/charts/pivotTables/tables collections. It backs the CLI, the
//! MCP server and the integration tests.

mod fixture;
mod memory;
mod sheet;

use std::io;

pub use fixture::{AttachmentFixture, CellFixture, CellRecord, SheetFixture, WorkbookFixture};
pub use memory::MemoryWorkbook;

use crate::object::Object;

/// Failure loading or saving a workbook.
#[derive(Debug, thiserror::Error)]
pub enum WorkbookError {
    #[error("workbook I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("workbook JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a workbook needs at least one sheet")]
    NoSheets,
    #[error("duplicate sheet name '{0}'")]
    DuplicateSheet(String),
    #[error("no sheet named '{0}'")]
    UnknownSheet(String),
    #[error("invalid cell address '{address}' on sheet '{sheet}'")]
    InvalidAddress { sheet: String, address: String },
}

/// Enumeration constants snippets reach through the `Excel` binding, e.g.
/// `Excel.InsertShiftDirection.down`.
#[must_use]
pub fn excel_constants() -> Object {
    const ENUMS: &[(&str, &[(&str, &str)])] = &[
        ("ClearApplyTo", &[("all", "All"), ("contents", "Contents"), ("formats", "Formats")]),
        ("DeleteShiftDirection", &[("up", "Up"), ("left", "Left")]),
        ("InsertShiftDirection", &[("down", "Down"), ("right", "Right")]),
        (
            "RangeCopyType",
            &[("all", "All"), ("formulas", "Formulas"), ("values", "Values"), ("formats", "Formats")],
        ),
        (
            "HorizontalAlignment",
            &[
                ("general", "General"),
                ("left", "Left"),
                ("center", "Center"),
                ("right", "Right"),
                ("fill", "Fill"),
                ("justify", "Justify"),
            ],
        ),
        ("VerticalAlignment", &[("top", "Top"), ("center", "Center"), ("bottom", "Bottom")]),
        (
            "BorderIndex",
            &[
                ("edgeTop", "EdgeTop"),
                ("edgeBottom", "EdgeBottom"),
                ("edgeLeft", "EdgeLeft"),
                ("edgeRight", "EdgeRight"),
                ("insideHorizontal", "InsideHorizontal"),
                ("insideVertical", "InsideVertical"),
            ],
        ),
        (
            "BorderLineStyle",
            &[("none", "None"), ("continuous", "Continuous"), ("dash", "Dash"), ("dot", "Dot"), ("double", "Double")],
        ),
        (
            "BorderWeight",
            &[("hairline", "Hairline"), ("thin", "Thin"), ("medium", "Medium"), ("thick", "Thick")],
        ),
        (
            "ChartType",
            &[
                ("columnClustered", "ColumnClustered"),
                ("barClustered", "BarClustered"),
                ("line", "Line"),
                ("pie", "Pie"),
                ("area", "Area"),
                ("xyscatter", "XYScatter"),
            ],
        ),
        ("ChartSeriesBy", &[("auto", "Auto"), ("columns", "Columns"), ("rows", "Rows")]),
        (
            "SheetVisibility",
            &[("visible", "Visible"), ("hidden", "Hidden"), ("veryHidden", "VeryHidden")],
        ),
    ];
    Object::map(ENUMS.iter().map(|(name, members)| {
        let members = Object::map(members.iter().map(|(key, value)| (*key, Object::from(*value))));
        (*name, members)
    }))
}
