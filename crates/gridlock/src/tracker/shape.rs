//! Structural rules: which wrapper shape a member produces, and which writes and calls count as
//! mutations.

use strum::Display;

/// Role of a wrapped host handle in the document graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Shape {
    /// The request context; owns `sync`.
    Context,
    Workbook,
    /// The worksheet collection.
    Scopes,
    /// A worksheet. Owns an identity cell.
    Scope,
    /// A range of cells.
    Region,
    /// A range's `format`.
    Format,
    /// `font`, `fill`, `borders` and anything reached from them.
    FormatPart,
    /// Notes, comments, charts, pivot tables or tables of a worksheet.
    Attached,
    /// One item of an attached collection.
    AttachedItem,
    /// Anything else. Forwarded untouched; handles it returns stay passthrough.
    Passthrough,
}

/// What a mutation affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Effect {
    /// The wrapped region's own address.
    Region,
    /// The whole enclosing scope.
    Wildcard,
}

const ATTACHED_COLLECTIONS: &[&str] = &["notes", "comments", "charts", "pivotTables", "tables"];

impl Shape {
    /// Shape of handles found in the value of `self.property`.
    pub(crate) fn property_child(self, property: &str) -> Self {
        match (self, property) {
            (Self::Context, "workbook") => Self::Workbook,
            (Self::Workbook, "worksheets") => Self::Scopes,
            (Self::Scopes, "items") => Self::Scope,
            (Self::Scope, p) if ATTACHED_COLLECTIONS.contains(&p) => Self::Attached,
            (Self::Region, "format") => Self::Format,
            (Self::Region, "worksheet") => Self::Scope,
            (Self::Format, "font" | "fill" | "borders") | (Self::FormatPart, _) => Self::FormatPart,
            (Self::Attached, "items") => Self::AttachedItem,
            _ => Self::Passthrough,
        }
    }

    /// Shape of handles returned by `self.method(...)`.
    pub(crate) fn call_child(self, method: &str) -> Self {
        match (self, method) {
            (
                Self::Scopes,
                "getItem" | "getItemOrNullObject" | "getActiveWorksheet" | "getFirst" | "getLast" | "add",
            ) => Self::Scope,
            (
                Self::Scope,
                "getRange" | "getUsedRange" | "getUsedRangeOrNullObject" | "getRangeByIndexes" | "getCell",
            )
            | (
                Self::Region,
                "getCell" | "getRow" | "getColumn" | "getResizedRange" | "getOffsetRange" | "insert",
            ) => Self::Region,
            (Self::FormatPart, _) => Self::FormatPart,
            (Self::Attached, "add" | "getItem" | "getItemOrNullObject" | "getItemAt") => Self::AttachedItem,
            _ => Self::Passthrough,
        }
    }

    /// Mutation recorded when `self.property = ...` is assigned.
    pub(crate) fn set_effect(self, property: &str) -> Option<Effect> {
        match (self, property) {
            (Self::Region, "values" | "formulas" | "numberFormat") | (Self::Format | Self::FormatPart, _) => {
                Some(Effect::Region)
            }
            _ => None,
        }
    }

    /// Mutation recorded when `self.method(...)` is called.
    pub(crate) fn call_effect(self, method: &str) -> Option<Effect> {
        match (self, method) {
            (Self::Region, "clear" | "copyFrom") | (Self::FormatPart, "clear") => Some(Effect::Region),
            (Self::Region, "insert" | "delete")
            | (Self::Scope, "delete")
            | (Self::Attached, "add" | "remove" | "delete")
            | (Self::AttachedItem, "delete" | "remove") => Some(Effect::Wildcard),
            _ => None,
        }
    }
}
