//! `MemoryWorkbook`: an in-memory workbook served through `HostBridge`.
//!
//! The object model follows the Office spreadsheet API closely enough for agent-written snippets
//! to run unchanged: a request context exposes `workbook.worksheets`, sheets hand out ranges,
//! ranges expose `values`/`formulas`/`numberFormat`/`format`. Data properties are deferred:
//! they must be queued with `load(...)` and flushed with `context.sync()` before they can be
//! read. Writes apply immediately. There is no calculation engine; a formula cell reports its
//! formula text as its value.

use std::{fs, path::Path, str::FromStr};

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use uuid::Uuid;

use super::{
    WorkbookError,
    fixture::{AttachmentFixture, CellFixture, CellRecord, SheetFixture, WorkbookFixture},
    sheet::{
        AttachedKind, Attachment, Cell, ClearApplyTo, CopyType, MAX_COLS, MAX_RANGE_CELLS, MAX_ROWS, Sheet, Shift,
    },
};
use crate::{
    host::{HostBridge, HostDocument, HostError, ProxyId},
    ledger::{self, RegionBounds},
    object::Object,
};

/// Load marker meaning every property of a handle.
const ALL_PROPERTIES: &str = "*";

const RANGE_DATA: &[&str] = &[
    "address",
    "addressLocal",
    "rowCount",
    "columnCount",
    "rowIndex",
    "columnIndex",
    "cellCount",
    "values",
    "formulas",
    "numberFormat",
    "text",
];
const SHEET_DATA: &[&str] = &["id", "name", "position", "visibility"];
const FORMAT_DATA: &[&str] = &["horizontalAlignment", "verticalAlignment", "wrapText", "columnWidth", "rowHeight"];
const FONT_DATA: &[&str] = &["name", "size", "color", "bold", "italic", "underline", "strikethrough"];
const FILL_DATA: &[&str] = &["color", "pattern"];
const BORDER_DATA: &[&str] = &["style", "color", "weight"];

/// Sub-objects of a range format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Part {
    Font,
    Fill,
    Borders,
    Border(String),
}

impl Part {
    fn properties(&self) -> &'static [&'static str] {
        match self {
            Self::Font => FONT_DATA,
            Self::Fill => FILL_DATA,
            Self::Borders => &[],
            Self::Border(_) => BORDER_DATA,
        }
    }

    fn style_key(&self, property: &str) -> String {
        match self {
            Self::Font => format!("font.{property}"),
            Self::Fill => format!("fill.{property}"),
            Self::Borders => format!("borders.{property}"),
            Self::Border(index) => format!("borders.{index}.{property}"),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Font => "RangeFont",
            Self::Fill => "RangeFill",
            Self::Borders => "RangeBorderCollection",
            Self::Border(_) => "RangeBorder",
        }
    }
}

/// What a handle points at. Sheets are referenced by volatile id so renames and reorders keep
/// handles valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Context,
    Workbook,
    Worksheets,
    Worksheet(String),
    Range(String, RegionBounds),
    Format(String, RegionBounds),
    Part(String, RegionBounds, Part),
    Attached(String, AttachedKind),
    Item(String, AttachedKind, String),
    /// Result of an `...OrNullObject` lookup that found nothing.
    Null(&'static str),
}

/// An in-memory workbook.
#[derive(Debug)]
pub struct MemoryWorkbook {
    name: String,
    sheets: Vec<Sheet>,
    /// Volatile id of the active sheet.
    active: String,
    handles: AHashMap<u32, Node>,
    interned: AHashMap<Node, u32>,
    next_handle: u32,
    root: Option<ProxyId>,
    pending_loads: Vec<(u32, String)>,
    loaded: AHashSet<(u32, String)>,
    syncs: usize,
}

impl Default for MemoryWorkbook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorkbook {
    /// A workbook with one empty sheet named `Sheet1`.
    #[must_use]
    pub fn new() -> Self {
        let sheet = Sheet::new(new_sheet_id(), "Sheet1".to_owned());
        Self::with_sheets("Book1".to_owned(), vec![sheet], None)
    }

    fn with_sheets(name: String, sheets: Vec<Sheet>, active: Option<String>) -> Self {
        let active = active.unwrap_or_else(|| sheets.first().map(|s| s.id.clone()).unwrap_or_default());
        Self {
            name,
            sheets,
            active,
            handles: AHashMap::new(),
            interned: AHashMap::new(),
            next_handle: 1,
            root: None,
            pending_loads: Vec::new(),
            loaded: AHashSet::new(),
            syncs: 0,
        }
    }

    /// Builds a workbook from its JSON form. Sheets without an id get a fresh one.
    pub fn from_fixture(fixture: WorkbookFixture) -> Result<Self, WorkbookError> {
        if fixture.sheets.is_empty() {
            return Err(WorkbookError::NoSheets);
        }
        let mut sheets: Vec<Sheet> = Vec::with_capacity(fixture.sheets.len());
        for sheet_fixture in fixture.sheets {
            if sheets.iter().any(|s| s.name.eq_ignore_ascii_case(&sheet_fixture.name)) {
                return Err(WorkbookError::DuplicateSheet(sheet_fixture.name));
            }
            sheets.push(sheet_from_fixture(sheet_fixture)?);
        }
        let active = match fixture.active_sheet {
            Some(name) => Some(
                sheets
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(&name))
                    .map(|s| s.id.clone())
                    .ok_or(WorkbookError::UnknownSheet(name))?,
            ),
            None => None,
        };
        let name = fixture.name.unwrap_or_else(|| "Book1".to_owned());
        Ok(Self::with_sheets(name, sheets, active))
    }

    pub fn from_json(json: &str) -> Result<Self, WorkbookError> {
        Self::from_fixture(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, WorkbookError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Writes the current contents as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), WorkbookError> {
        fs::write(path, serde_json::to_vec_pretty(&self.snapshot())?)?;
        Ok(())
    }

    /// The current contents in JSON form.
    #[must_use]
    pub fn snapshot(&self) -> WorkbookFixture {
        let active_sheet = self.sheets.iter().find(|s| s.id == self.active).map(|s| s.name.clone());
        WorkbookFixture {
            name: Some(self.name.clone()),
            sheets: self.sheets.iter().map(sheet_to_fixture).collect(),
            active_sheet,
        }
    }

    /// Sheet names in tab order.
    #[must_use]
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Volatile id of the sheet named `name`.
    #[must_use]
    pub fn sheet_id(&self, name: &str) -> Option<&str> {
        self.sheet_by_name(name).map(|s| s.id.as_str())
    }

    /// Name of the sheet whose volatile id is `id`.
    #[must_use]
    pub fn sheet_name(&self, id: &str) -> Option<&str> {
        self.sheets.iter().find(|s| s.id == id).map(|s| s.name.as_str())
    }

    /// Appends an empty sheet and returns its volatile id.
    pub fn add_sheet(&mut self, name: &str) -> Result<String, WorkbookError> {
        if self.sheet_by_name(name).is_some() {
            return Err(WorkbookError::DuplicateSheet(name.to_owned()));
        }
        let sheet = Sheet::new(new_sheet_id(), name.to_owned());
        let id = sheet.id.clone();
        self.sheets.push(sheet);
        Ok(id)
    }

    /// Value of one cell as `values` would report it; `None` if the sheet or address is unknown.
    #[must_use]
    pub fn cell_value(&self, sheet: &str, address: &str) -> Option<Object> {
        let (sheet, row, col) = self.locate(sheet, address)?;
        Some(sheet.cell(row, col).map_or_else(|| Cell::default().value(), Cell::value))
    }

    /// Formula of one cell, if it has one.
    #[must_use]
    pub fn cell_formula(&self, sheet: &str, address: &str) -> Option<String> {
        let (sheet, row, col) = self.locate(sheet, address)?;
        sheet.cell(row, col)?.formula.clone()
    }

    /// A format property of one cell, by style path such as `font.bold`.
    #[must_use]
    pub fn cell_style(&self, sheet: &str, address: &str, key: &str) -> Option<Object> {
        let (sheet, row, col) = self.locate(sheet, address)?;
        sheet.cell(row, col)?.style.get(key).cloned()
    }

    /// Names of the items in one of a sheet's attached collections (`notes`, `charts`, ...).
    #[must_use]
    pub fn attachment_names(&self, sheet: &str, collection: &str) -> Vec<String> {
        let (Some(sheet), Ok(kind)) = (self.sheet_by_name(sheet), AttachedKind::from_str(collection)) else {
            return Vec::new();
        };
        sheet.attached(kind).iter().map(|a| a.name.clone()).collect()
    }

    /// Number of completed `context.sync()` calls.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.syncs
    }

    fn locate(&self, sheet: &str, address: &str) -> Option<(&Sheet, u32, u32)> {
        let sheet = self.sheet_by_name(sheet)?;
        let bounds = ledger::parse_region(address)?;
        Some((sheet, bounds.start_row, bounds.start_col))
    }

    fn sheet_by_name(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    fn sheet(&self, id: &str) -> Result<&Sheet, HostError> {
        self.sheets
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| HostError::ItemNotFound(format!("worksheet {id}")))
    }

    fn sheet_mut(&mut self, id: &str) -> Result<&mut Sheet, HostError> {
        self.sheets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| HostError::ItemNotFound(format!("worksheet {id}")))
    }

    // ---- handles ----

    fn node(&self, proxy: ProxyId) -> Result<Node, HostError> {
        self.handles
            .get(&proxy.raw())
            .cloned()
            .ok_or(HostError::InvalidHandle(proxy.raw()))
    }

    /// Returns the handle of `node`, issuing one on first use.
    fn handle(&mut self, node: Node) -> Object {
        if let Some(raw) = self.interned.get(&node) {
            return Object::Proxy(ProxyId::new(*raw));
        }
        let raw = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(raw, node.clone());
        self.interned.insert(node, raw);
        Object::Proxy(ProxyId::new(raw))
    }

    fn is_loaded(&self, proxy: ProxyId, property: &str) -> bool {
        self.loaded.contains(&(proxy.raw(), property.to_owned()))
            || self.loaded.contains(&(proxy.raw(), ALL_PROPERTIES.to_owned()))
    }

    fn require_loaded(&self, proxy: ProxyId, property: &str) -> Result<(), HostError> {
        if self.is_loaded(proxy, property) {
            Ok(())
        } else {
            Err(HostError::PropertyNotLoaded(property.to_owned()))
        }
    }

    fn queue_load(&mut self, proxy: ProxyId, node: &Node, args: &[Object]) {
        let collection = matches!(node, Node::Worksheets | Node::Attached(..));
        let properties = if collection { vec![ALL_PROPERTIES.to_owned()] } else { load_properties(args) };
        for property in properties {
            self.pending_loads.push((proxy.raw(), property));
        }
    }

    fn sync(&mut self) {
        let pending = std::mem::take(&mut self.pending_loads);
        self.loaded.extend(pending);
        self.syncs += 1;
    }

    // ---- reads ----

    fn range_data(&self, sheet_id: &str, bounds: &RegionBounds, property: &str) -> Result<Object, HostError> {
        let sheet = self.sheet(sheet_id)?;
        let n = |v: u32| Object::Number(f64::from(v));
        Ok(match property {
            "address" | "addressLocal" => Object::String(qualified_address(&sheet.name, bounds)),
            "rowCount" => n(bounds.row_count()),
            "columnCount" => n(bounds.col_count()),
            "rowIndex" => n(bounds.start_row),
            "columnIndex" => n(bounds.start_col),
            "cellCount" => Object::Number(cell_count(bounds) as f64),
            "values" => cell_grid(sheet, bounds, Cell::value)?,
            "formulas" => cell_grid(sheet, bounds, Cell::formula)?,
            "numberFormat" => cell_grid(sheet, bounds, |c| Object::String(c.number_format().to_owned()))?,
            "text" => cell_grid(sheet, bounds, |c| Object::String(c.text()))?,
            _ => Object::Undefined,
        })
    }

    /// Style of the range's top-left cell.
    fn style_data(&self, sheet_id: &str, bounds: &RegionBounds, key: &str, property: &str) -> Result<Object, HostError> {
        let sheet = self.sheet(sheet_id)?;
        Ok(sheet
            .cell(bounds.start_row, bounds.start_col)
            .and_then(|cell| cell.style.get(key).cloned())
            .unwrap_or_else(|| style_default(property)))
    }

    fn sheet_data(&self, sheet_id: &str, property: &str) -> Result<Object, HostError> {
        let position = self
            .sheets
            .iter()
            .position(|s| s.id == sheet_id)
            .ok_or_else(|| HostError::ItemNotFound(format!("worksheet {sheet_id}")))?;
        let sheet = &self.sheets[position];
        Ok(match property {
            "id" => Object::String(sheet.id.clone()),
            "name" => Object::String(sheet.name.clone()),
            "position" => Object::Number(position as f64),
            "visibility" => Object::String(sheet.visibility.clone()),
            _ => Object::Undefined,
        })
    }

    fn item_data(&self, sheet_id: &str, kind: AttachedKind, name: &str, property: &str) -> Result<Object, HostError> {
        let item = self.item(sheet_id, kind, name)?;
        Ok(match property {
            "name" | "id" => Object::String(item.name.clone()),
            _ => item.props.get(property).cloned().unwrap_or(Object::Undefined),
        })
    }

    fn item(&self, sheet_id: &str, kind: AttachedKind, name: &str) -> Result<&Attachment, HostError> {
        self.sheet(sheet_id)?
            .attached(kind)
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| HostError::ItemNotFound(format!("{} '{name}'", kind.type_names().1)))
    }

    // ---- writes ----

    fn set_range(&mut self, sheet_id: &str, bounds: &RegionBounds, property: &str, value: Object) -> Result<(), HostError> {
        let grid = Grid::new(value, bounds)?;
        let write: fn(&mut Cell, Object) -> Result<(), HostError> = match property {
            "values" | "formulas" => write_value,
            "numberFormat" => write_number_format,
            "address" | "addressLocal" | "rowCount" | "columnCount" | "rowIndex" | "columnIndex" | "cellCount"
            | "text" => return Err(HostError::ReadOnly(property.to_owned())),
            _ => {
                return Err(HostError::UnknownMember {
                    type_name: "Range".to_owned(),
                    member: property.to_owned(),
                });
            }
        };
        // validate every value before touching the sheet
        let mut scratch = Cell::default();
        for item in grid.items() {
            write(&mut scratch, item.clone())?;
        }
        let sheet = self.sheet_mut(sheet_id)?;
        for row in bounds.start_row..=bounds.end_row {
            for col in bounds.start_col..=bounds.end_col {
                let item = grid.at(row - bounds.start_row, col - bounds.start_col);
                write(sheet.cell_mut(row, col), item.clone())?;
            }
        }
        sheet.prune();
        Ok(())
    }

    fn set_style(&mut self, sheet_id: &str, bounds: &RegionBounds, key: &str, value: Object) -> Result<(), HostError> {
        if matches!(value, Object::Array(_) | Object::Map(_) | Object::Proxy(_)) {
            return Err(HostError::InvalidArgument(format!("{key} must be a scalar")));
        }
        check_size(bounds)?;
        let sheet = self.sheet_mut(sheet_id)?;
        for row in bounds.start_row..=bounds.end_row {
            for col in bounds.start_col..=bounds.end_col {
                let cell = sheet.cell_mut(row, col);
                if matches!(value, Object::Null | Object::Undefined) {
                    cell.style.shift_remove(key);
                } else {
                    cell.style.insert(key.to_owned(), value.clone());
                }
            }
        }
        sheet.prune();
        Ok(())
    }

    fn set_sheet(&mut self, sheet_id: &str, property: &str, value: Object) -> Result<(), HostError> {
        match property {
            "name" => {
                let name = value
                    .as_str()
                    .filter(|n| !n.is_empty() && n.chars().count() <= 31)
                    .ok_or_else(|| HostError::InvalidArgument("worksheet name".to_owned()))?
                    .to_owned();
                if self.sheets.iter().any(|s| s.id != sheet_id && s.name.eq_ignore_ascii_case(&name)) {
                    return Err(HostError::InvalidArgument(format!(
                        "A worksheet named '{name}' already exists"
                    )));
                }
                self.sheet_mut(sheet_id)?.name = name;
            }
            "visibility" => {
                let visibility = value
                    .as_str()
                    .filter(|v| ["Visible", "Hidden", "VeryHidden"].contains(v))
                    .ok_or_else(|| HostError::InvalidArgument("visibility".to_owned()))?
                    .to_owned();
                self.sheet_mut(sheet_id)?.visibility = visibility;
            }
            "position" => {
                let target = value
                    .as_f64()
                    .filter(|p| p.fract() == 0.0 && *p >= 0.0)
                    .ok_or_else(|| HostError::InvalidArgument("position".to_owned()))?
                    as usize;
                let from = self
                    .sheets
                    .iter()
                    .position(|s| s.id == sheet_id)
                    .ok_or_else(|| HostError::ItemNotFound(format!("worksheet {sheet_id}")))?;
                let sheet = self.sheets.remove(from);
                let target = target.min(self.sheets.len());
                self.sheets.insert(target, sheet);
            }
            "id" => return Err(HostError::ReadOnly(property.to_owned())),
            _ => {
                return Err(HostError::UnknownMember {
                    type_name: "Worksheet".to_owned(),
                    member: property.to_owned(),
                });
            }
        }
        Ok(())
    }

    // ---- calls ----

    fn call_worksheets(&mut self, method: &str, args: &[Object]) -> Result<Object, HostError> {
        match method {
            "getItem" | "getItemOrNullObject" => {
                let key = arg_str(args, 0, "key")?;
                let found = self
                    .sheets
                    .iter()
                    .find(|s| s.name.eq_ignore_ascii_case(key) || s.id == key)
                    .map(|s| s.id.clone());
                match found {
                    Some(id) => Ok(self.handle(Node::Worksheet(id))),
                    None if method == "getItemOrNullObject" => Ok(self.handle(Node::Null("Worksheet"))),
                    None => Err(HostError::ItemNotFound(format!("worksheet '{key}'"))),
                }
            }
            "getActiveWorksheet" => {
                let id = self.sheet(&self.active)?.id.clone();
                Ok(self.handle(Node::Worksheet(id)))
            }
            "getFirst" | "getLast" => {
                let sheet = if method == "getFirst" { self.sheets.first() } else { self.sheets.last() };
                let id = sheet
                    .map(|s| s.id.clone())
                    .ok_or_else(|| HostError::ItemNotFound("worksheet".to_owned()))?;
                Ok(self.handle(Node::Worksheet(id)))
            }
            "add" => {
                let name = match args.first() {
                    None | Some(Object::Undefined | Object::Null) => self.next_sheet_name(),
                    Some(Object::String(name)) => name.clone(),
                    Some(_) => return Err(HostError::InvalidArgument("name".to_owned())),
                };
                let id = self
                    .add_sheet(&name)
                    .map_err(|_| HostError::InvalidArgument(format!("A worksheet named '{name}' already exists")))?;
                Ok(self.handle(Node::Worksheet(id)))
            }
            _ => Err(unknown("WorksheetCollection", method)),
        }
    }

    fn next_sheet_name(&self) -> String {
        (self.sheets.len() + 1..)
            .map(|n| format!("Sheet{n}"))
            .find(|name| self.sheet_by_name(name).is_none())
            .unwrap_or_default()
    }

    fn call_worksheet(&mut self, sheet_id: &str, method: &str, args: &[Object]) -> Result<Object, HostError> {
        match method {
            "getRange" => {
                let bounds = match args.first() {
                    None | Some(Object::Undefined) => RegionBounds {
                        start_col: 0,
                        start_row: 0,
                        end_col: MAX_COLS - 1,
                        end_row: MAX_ROWS - 1,
                    },
                    Some(Object::String(address)) => parse_address(address)?,
                    Some(_) => return Err(HostError::InvalidArgument("address".to_owned())),
                };
                self.sheet(sheet_id)?;
                Ok(self.handle(Node::Range(sheet_id.to_owned(), bounds)))
            }
            "getRangeByIndexes" => {
                let row = arg_index(args, 0, "startRow")?;
                let col = arg_index(args, 1, "startColumn")?;
                let rows = arg_index(args, 2, "rowCount")?;
                let cols = arg_index(args, 3, "columnCount")?;
                if rows == 0 || cols == 0 {
                    return Err(HostError::InvalidArgument("rowCount and columnCount must be positive".to_owned()));
                }
                let bounds = checked_bounds(
                    i64::from(row),
                    i64::from(col),
                    i64::from(row) + i64::from(rows) - 1,
                    i64::from(col) + i64::from(cols) - 1,
                )?;
                self.sheet(sheet_id)?;
                Ok(self.handle(Node::Range(sheet_id.to_owned(), bounds)))
            }
            "getCell" => {
                let row = arg_index(args, 0, "row")?;
                let col = arg_index(args, 1, "column")?;
                let bounds = checked_bounds(row.into(), col.into(), row.into(), col.into())?;
                self.sheet(sheet_id)?;
                Ok(self.handle(Node::Range(sheet_id.to_owned(), bounds)))
            }
            "getUsedRange" | "getUsedRangeOrNullObject" => {
                let values_only = args.first().is_some_and(Object::is_truthy);
                match self.sheet(sheet_id)?.used_bounds(values_only) {
                    Some(bounds) => Ok(self.handle(Node::Range(sheet_id.to_owned(), bounds))),
                    None if method == "getUsedRangeOrNullObject" => Ok(self.handle(Node::Null("Range"))),
                    None => Ok(self.handle(Node::Range(sheet_id.to_owned(), RegionBounds::cell(0, 0)))),
                }
            }
            "delete" => {
                let position = self
                    .sheets
                    .iter()
                    .position(|s| s.id == sheet_id)
                    .ok_or_else(|| HostError::ItemNotFound(format!("worksheet {sheet_id}")))?;
                if self.sheets.len() == 1 {
                    return Err(HostError::Other(
                        "A workbook must contain at least one visible worksheet".to_owned(),
                    ));
                }
                self.sheets.remove(position);
                if self.active == sheet_id {
                    self.active = self.sheets[position.min(self.sheets.len() - 1)].id.clone();
                }
                Ok(Object::Undefined)
            }
            "activate" => {
                self.sheet(sheet_id)?;
                self.active = sheet_id.to_owned();
                Ok(Object::Undefined)
            }
            _ => Err(unknown("Worksheet", method)),
        }
    }

    fn call_range(
        &mut self,
        sheet_id: &str,
        bounds: &RegionBounds,
        method: &str,
        args: &[Object],
    ) -> Result<Object, HostError> {
        let derived = |start_row: i64, start_col: i64, end_row: i64, end_col: i64| {
            checked_bounds(start_row, start_col, end_row, end_col)
        };
        let (sr, sc, er, ec) = (
            i64::from(bounds.start_row),
            i64::from(bounds.start_col),
            i64::from(bounds.end_row),
            i64::from(bounds.end_col),
        );
        let sub = match method {
            "getCell" => {
                let (row, col) = (arg_int(args, 0, "row")?, arg_int(args, 1, "column")?);
                Some(derived(sr + row, sc + col, sr + row, sc + col)?)
            }
            "getRow" => {
                let row = arg_int(args, 0, "row")?;
                Some(derived(sr + row, sc, sr + row, ec)?)
            }
            "getColumn" => {
                let col = arg_int(args, 0, "column")?;
                Some(derived(sr, sc + col, er, sc + col)?)
            }
            "getResizedRange" => {
                let (rows, cols) = (arg_int(args, 0, "deltaRows")?, arg_int(args, 1, "deltaColumns")?);
                Some(derived(sr, sc, er + rows, ec + cols)?)
            }
            "getOffsetRange" => {
                let (rows, cols) = (arg_int(args, 0, "rowOffset")?, arg_int(args, 1, "columnOffset")?);
                Some(derived(sr + rows, sc + cols, er + rows, ec + cols)?)
            }
            _ => None,
        };
        if let Some(sub) = sub {
            self.sheet(sheet_id)?;
            return Ok(self.handle(Node::Range(sheet_id.to_owned(), sub)));
        }
        match method {
            "clear" => {
                let apply_to: ClearApplyTo = arg_enum(args, 0, "applyTo")?.unwrap_or_default();
                self.sheet_mut(sheet_id)?.clear(bounds, apply_to);
                Ok(Object::Undefined)
            }
            "delete" => {
                let shift = arg_enum(args, 0, "shift")?.unwrap_or(Shift::Up);
                self.sheet_mut(sheet_id)?.delete(bounds, shift);
                Ok(Object::Undefined)
            }
            "insert" => {
                let shift = arg_enum(args, 0, "shift")?.unwrap_or(Shift::Down);
                self.sheet_mut(sheet_id)?.insert(bounds, shift);
                Ok(self.handle(Node::Range(sheet_id.to_owned(), *bounds)))
            }
            "copyFrom" => {
                let (source_sheet, source_bounds) = self.range_arg(sheet_id, args.first())?;
                let copy: CopyType = arg_enum(args, 1, "copyType")?.unwrap_or_default();
                let cells = self.sheet(&source_sheet)?.cells_in(&source_bounds);
                self.sheet_mut(sheet_id)?
                    .paste(cells, &source_bounds, bounds.start_row, bounds.start_col, copy);
                Ok(Object::Undefined)
            }
            "select" => {
                self.sheet(sheet_id)?;
                Ok(Object::Undefined)
            }
            _ => Err(unknown("Range", method)),
        }
    }

    /// Resolves a range given as a handle or an address on `default_sheet`.
    fn range_arg(&self, default_sheet: &str, arg: Option<&Object>) -> Result<(String, RegionBounds), HostError> {
        match arg {
            Some(Object::Proxy(proxy)) => match self.node(*proxy)? {
                Node::Range(sheet, bounds) => Ok((sheet, bounds)),
                _ => Err(HostError::InvalidArgument("expected a range".to_owned())),
            },
            Some(Object::String(address)) => {
                let sheet = match address.rsplit_once('!') {
                    Some((name, _)) => {
                        let name = name.trim_matches('\'');
                        self.sheet_by_name(name)
                            .map(|s| s.id.clone())
                            .ok_or_else(|| HostError::ItemNotFound(format!("worksheet '{name}'")))?
                    }
                    None => default_sheet.to_owned(),
                };
                Ok((sheet, parse_address(address)?))
            }
            _ => Err(HostError::InvalidArgument("expected a range or address".to_owned())),
        }
    }

    /// A1 address (no sheet prefix) of a range given as a handle or address.
    fn address_arg(&self, sheet_id: &str, arg: Option<&Object>) -> Result<String, HostError> {
        let (_, bounds) = self.range_arg(sheet_id, arg)?;
        Ok(bounds.to_a1())
    }

    fn call_attached(
        &mut self,
        sheet_id: &str,
        kind: AttachedKind,
        method: &str,
        args: &[Object],
    ) -> Result<Object, HostError> {
        match method {
            "add" => {
                let attachment = self.new_attachment(sheet_id, kind, args)?;
                let name = attachment.name.clone();
                let items = self.sheet_mut(sheet_id)?.attached_mut(kind);
                items.retain(|a| !a.name.eq_ignore_ascii_case(&name));
                items.push(attachment);
                Ok(self.handle(Node::Item(sheet_id.to_owned(), kind, name)))
            }
            "getItem" | "getItemOrNullObject" => {
                let key = match args.first() {
                    Some(Object::String(key)) if kind.is_cell_annotation() => {
                        key.rsplit('!').next().unwrap_or(key).to_ascii_uppercase()
                    }
                    Some(Object::String(key)) => key.clone(),
                    _ => return Err(HostError::InvalidArgument("key".to_owned())),
                };
                match self.item(sheet_id, kind, &key) {
                    Ok(item) => {
                        let name = item.name.clone();
                        Ok(self.handle(Node::Item(sheet_id.to_owned(), kind, name)))
                    }
                    Err(_) if method == "getItemOrNullObject" => Ok(self.handle(Node::Null(kind.type_names().1))),
                    Err(err) => Err(err),
                }
            }
            "getItemAt" => {
                let index = arg_index(args, 0, "index")? as usize;
                let name = self
                    .sheet(sheet_id)?
                    .attached(kind)
                    .get(index)
                    .map(|a| a.name.clone())
                    .ok_or_else(|| HostError::ItemNotFound(format!("{} at {index}", kind.type_names().1)))?;
                Ok(self.handle(Node::Item(sheet_id.to_owned(), kind, name)))
            }
            _ => Err(unknown(kind.type_names().0, method)),
        }
    }

    fn new_attachment(&self, sheet_id: &str, kind: AttachedKind, args: &[Object]) -> Result<Attachment, HostError> {
        let sheet = self.sheet(sheet_id)?;
        let next_name = |prefix: &str, sep: &str| {
            (sheet.attached(kind).len() + 1..)
                .map(|n| format!("{prefix}{sep}{n}"))
                .find(|name| !sheet.attached(kind).iter().any(|a| a.name.eq_ignore_ascii_case(name)))
                .unwrap_or_default()
        };
        let optional = |i: usize| args.get(i).cloned().unwrap_or(Object::Undefined);
        Ok(match kind {
            AttachedKind::Notes | AttachedKind::Comments => {
                let address = self.address_arg(sheet_id, args.first())?;
                let content = arg_str(args, 1, "content")?.to_owned();
                Attachment {
                    name: address,
                    props: IndexMap::from([("content".to_owned(), Object::String(content))]),
                }
            }
            AttachedKind::Charts => {
                let chart_type = arg_str(args, 0, "type")?.to_owned();
                let source = self.address_arg(sheet_id, args.get(1))?;
                Attachment {
                    name: next_name("Chart", " "),
                    props: IndexMap::from([
                        ("chartType".to_owned(), Object::String(chart_type)),
                        ("source".to_owned(), Object::String(source)),
                        ("seriesBy".to_owned(), optional(2)),
                    ]),
                }
            }
            AttachedKind::PivotTables => {
                let name = arg_str(args, 0, "name")?.to_owned();
                let source = self.address_arg(sheet_id, args.get(1))?;
                let destination = self.address_arg(sheet_id, args.get(2))?;
                Attachment {
                    name,
                    props: IndexMap::from([
                        ("source".to_owned(), Object::String(source)),
                        ("destination".to_owned(), Object::String(destination)),
                    ]),
                }
            }
            AttachedKind::Tables => {
                let address = self.address_arg(sheet_id, args.first())?;
                Attachment {
                    name: next_name("Table", ""),
                    props: IndexMap::from([
                        ("address".to_owned(), Object::String(address)),
                        ("showHeaders".to_owned(), Object::Bool(optional(1).is_truthy())),
                    ]),
                }
            }
        })
    }
}

impl HostBridge for MemoryWorkbook {
    fn get(&mut self, proxy: ProxyId, property: &str) -> Result<Object, HostError> {
        let node = self.node(proxy)?;
        if property == "isNullObject" {
            return Ok(Object::Bool(matches!(node, Node::Null(_))));
        }
        match node {
            Node::Context => Ok(match property {
                "workbook" => self.handle(Node::Workbook),
                _ => Object::Undefined,
            }),
            Node::Workbook => match property {
                "worksheets" => Ok(self.handle(Node::Worksheets)),
                "name" => {
                    self.require_loaded(proxy, property)?;
                    Ok(Object::String(self.name.clone()))
                }
                _ => Ok(Object::Undefined),
            },
            Node::Worksheets => match property {
                "items" => {
                    self.require_loaded(proxy, property)?;
                    let ids: Vec<String> = self.sheets.iter().map(|s| s.id.clone()).collect();
                    Ok(Object::Array(ids.into_iter().map(|id| self.handle(Node::Worksheet(id))).collect()))
                }
                "count" => {
                    self.require_loaded(proxy, property)?;
                    Ok(Object::Number(self.sheets.len() as f64))
                }
                _ => Ok(Object::Undefined),
            },
            Node::Worksheet(sheet_id) => {
                if SHEET_DATA.contains(&property) {
                    self.require_loaded(proxy, property)?;
                    return self.sheet_data(&sheet_id, property);
                }
                if let Ok(kind) = AttachedKind::from_str(property) {
                    self.sheet(&sheet_id)?;
                    return Ok(self.handle(Node::Attached(sheet_id, kind)));
                }
                Ok(Object::Undefined)
            }
            Node::Range(sheet_id, bounds) => match property {
                "format" => Ok(self.handle(Node::Format(sheet_id, bounds))),
                "worksheet" => {
                    self.sheet(&sheet_id)?;
                    Ok(self.handle(Node::Worksheet(sheet_id)))
                }
                _ if RANGE_DATA.contains(&property) => {
                    self.require_loaded(proxy, property)?;
                    self.range_data(&sheet_id, &bounds, property)
                }
                _ => Ok(Object::Undefined),
            },
            Node::Format(sheet_id, bounds) => match property {
                "font" => Ok(self.handle(Node::Part(sheet_id, bounds, Part::Font))),
                "fill" => Ok(self.handle(Node::Part(sheet_id, bounds, Part::Fill))),
                "borders" => Ok(self.handle(Node::Part(sheet_id, bounds, Part::Borders))),
                _ if FORMAT_DATA.contains(&property) => {
                    self.require_loaded(proxy, property)?;
                    self.style_data(&sheet_id, &bounds, property, property)
                }
                _ => Ok(Object::Undefined),
            },
            Node::Part(sheet_id, bounds, part) => {
                if part.properties().contains(&property) {
                    self.require_loaded(proxy, property)?;
                    return self.style_data(&sheet_id, &bounds, &part.style_key(property), property);
                }
                Ok(Object::Undefined)
            }
            Node::Attached(sheet_id, kind) => match property {
                "items" => {
                    self.require_loaded(proxy, property)?;
                    let names: Vec<String> = self.sheet(&sheet_id)?.attached(kind).iter().map(|a| a.name.clone()).collect();
                    Ok(Object::Array(
                        names
                            .into_iter()
                            .map(|name| self.handle(Node::Item(sheet_id.clone(), kind, name)))
                            .collect(),
                    ))
                }
                "count" => {
                    self.require_loaded(proxy, property)?;
                    Ok(Object::Number(self.sheet(&sheet_id)?.attached(kind).len() as f64))
                }
                _ => Ok(Object::Undefined),
            },
            Node::Item(sheet_id, kind, name) => {
                self.require_loaded(proxy, property)?;
                self.item_data(&sheet_id, kind, &name, property)
            }
            Node::Null(_) => Ok(Object::Undefined),
        }
    }

    fn set(&mut self, proxy: ProxyId, property: &str, value: Object) -> Result<(), HostError> {
        match self.node(proxy)? {
            Node::Worksheet(sheet_id) => self.set_sheet(&sheet_id, property, value),
            Node::Range(sheet_id, bounds) => self.set_range(&sheet_id, &bounds, property, value),
            Node::Format(sheet_id, bounds) if FORMAT_DATA.contains(&property) => {
                self.set_style(&sheet_id, &bounds, property, value)
            }
            Node::Part(sheet_id, bounds, part) if part.properties().contains(&property) => {
                self.set_style(&sheet_id, &bounds, &part.style_key(property), value)
            }
            Node::Item(sheet_id, kind, name) => {
                let sheet = self.sheet_mut(&sheet_id)?;
                let item = sheet
                    .attached_mut(kind)
                    .iter_mut()
                    .find(|a| a.name == name)
                    .ok_or_else(|| HostError::ItemNotFound(format!("{} '{name}'", kind.type_names().1)))?;
                match property {
                    "id" => return Err(HostError::ReadOnly(property.to_owned())),
                    "name" if !kind.is_cell_annotation() => {
                        let new_name = value
                            .as_str()
                            .ok_or_else(|| HostError::InvalidArgument("name".to_owned()))?
                            .to_owned();
                        item.name.clone_from(&new_name);
                        let raw = proxy.raw();
                        let old = Node::Item(sheet_id.clone(), kind, name);
                        let renamed = Node::Item(sheet_id, kind, new_name);
                        self.interned.remove(&old);
                        self.interned.insert(renamed.clone(), raw);
                        self.handles.insert(raw, renamed);
                    }
                    _ => {
                        item.props.insert(property.to_owned(), value);
                    }
                }
                Ok(())
            }
            Node::Null(type_name) => Err(HostError::ItemNotFound(type_name.to_owned())),
            other => Err(HostError::UnknownMember {
                type_name: node_type_name(&other).to_owned(),
                member: property.to_owned(),
            }),
        }
    }

    fn call(&mut self, proxy: ProxyId, method: &str, args: Vec<Object>) -> Result<Object, HostError> {
        let node = self.node(proxy)?;
        if method == "load" && !matches!(node, Node::Context) {
            self.queue_load(proxy, &node, &args);
            return Ok(Object::Proxy(proxy));
        }
        match node {
            Node::Context if method == "sync" => {
                self.sync();
                Ok(Object::Undefined)
            }
            Node::Worksheets => self.call_worksheets(method, &args),
            Node::Worksheet(sheet_id) => self.call_worksheet(&sheet_id, method, &args),
            Node::Range(sheet_id, bounds) => self.call_range(&sheet_id, &bounds, method, &args),
            Node::Format(sheet_id, _) if matches!(method, "autofitColumns" | "autofitRows") => {
                self.sheet(&sheet_id)?;
                Ok(Object::Undefined)
            }
            Node::Part(sheet_id, bounds, Part::Borders) if method == "getItem" => {
                let index = arg_str(&args, 0, "index")?.to_owned();
                Ok(self.handle(Node::Part(sheet_id, bounds, Part::Border(index))))
            }
            Node::Part(sheet_id, bounds, Part::Fill) if method == "clear" => {
                let sheet = self.sheet_mut(&sheet_id)?;
                for (_, cell) in sheet.cells.iter_mut().filter(|((r, c), _)| bounds.contains(*r, *c)) {
                    cell.style.retain(|key, _| !key.starts_with("fill."));
                }
                sheet.prune();
                Ok(Object::Undefined)
            }
            Node::Attached(sheet_id, kind) => self.call_attached(&sheet_id, kind, method, &args),
            Node::Item(sheet_id, kind, name) if method == "delete" => {
                self.item(&sheet_id, kind, &name)?;
                self.sheet_mut(&sheet_id)?.attached_mut(kind).retain(|a| a.name != name);
                Ok(Object::Undefined)
            }
            Node::Null(type_name) => Err(HostError::ItemNotFound(type_name.to_owned())),
            other => Err(unknown(node_type_name(&other), method)),
        }
    }

    fn has_method(&self, proxy: ProxyId, name: &str) -> bool {
        let Ok(node) = self.node(proxy) else {
            return false;
        };
        let methods: &[&str] = match node {
            Node::Context => &["sync"],
            Node::Workbook | Node::Null(_) => &["load"],
            Node::Worksheets => &["load", "getItem", "getItemOrNullObject", "getActiveWorksheet", "getFirst", "getLast", "add"],
            Node::Worksheet(_) => &[
                "load",
                "getRange",
                "getRangeByIndexes",
                "getCell",
                "getUsedRange",
                "getUsedRangeOrNullObject",
                "delete",
                "activate",
            ],
            Node::Range(..) => &[
                "load",
                "clear",
                "delete",
                "insert",
                "copyFrom",
                "getCell",
                "getRow",
                "getColumn",
                "getResizedRange",
                "getOffsetRange",
                "select",
            ],
            Node::Format(..) => &["load", "autofitColumns", "autofitRows"],
            Node::Part(_, _, Part::Borders) => &["load", "getItem"],
            Node::Part(_, _, Part::Fill) => &["load", "clear"],
            Node::Part(..) => &["load"],
            Node::Attached(..) => &["load", "add", "getItem", "getItemOrNullObject", "getItemAt"],
            Node::Item(..) => &["load", "delete"],
        };
        methods.contains(&name)
    }

    fn peek(&self, proxy: ProxyId, property: &str) -> Option<Object> {
        match (self.node(proxy).ok()?, property) {
            (Node::Range(sheet_id, bounds), "address") => {
                let sheet = self.sheet(&sheet_id).ok()?;
                Some(Object::String(qualified_address(&sheet.name, &bounds)))
            }
            (Node::Worksheet(sheet_id), "id") => Some(Object::String(sheet_id)),
            _ => None,
        }
    }

    fn type_name(&self, proxy: ProxyId) -> String {
        self.node(proxy).map_or("Object", |node| node_type_name(&node)).to_owned()
    }
}

impl HostDocument for MemoryWorkbook {
    fn open_context(&mut self) -> Result<ProxyId, HostError> {
        if let Some(root) = self.root {
            self.close_context(root);
        }
        let Object::Proxy(root) = self.handle(Node::Context) else {
            return Err(HostError::Other("failed to open a request context".to_owned()));
        };
        self.root = Some(root);
        Ok(root)
    }

    fn close_context(&mut self, root: ProxyId) {
        if self.root != Some(root) {
            return;
        }
        self.root = None;
        self.handles.clear();
        self.interned.clear();
        self.pending_loads.clear();
        self.loaded.clear();
    }
}

fn node_type_name(node: &Node) -> &'static str {
    match node {
        Node::Context => "RequestContext",
        Node::Workbook => "Workbook",
        Node::Worksheets => "WorksheetCollection",
        Node::Worksheet(_) => "Worksheet",
        Node::Range(..) => "Range",
        Node::Format(..) => "RangeFormat",
        Node::Part(_, _, part) => part.type_name(),
        Node::Attached(_, kind) => kind.type_names().0,
        Node::Item(_, kind, _) => kind.type_names().1,
        Node::Null(type_name) => *type_name,
    }
}

fn unknown(type_name: &str, member: &str) -> HostError {
    HostError::UnknownMember {
        type_name: type_name.to_owned(),
        member: member.to_owned(),
    }
}

fn new_sheet_id() -> String {
    format!("{{{}}}", Uuid::new_v4().as_hyphenated().to_string().to_uppercase())
}

/// `Sheet1!A1:B2`, quoting sheet names that are not plain words.
fn qualified_address(sheet: &str, bounds: &RegionBounds) -> String {
    if sheet.chars().all(|c| c.is_alphanumeric() || c == '_') {
        format!("{sheet}!{}", bounds.to_a1())
    } else {
        format!("'{}'!{}", sheet.replace('\'', "''"), bounds.to_a1())
    }
}

/// Parses `A1`, `A1:B5`, whole columns `A:C` or whole rows `1:3`, with an optional sheet
/// prefix and `$` anchors.
fn parse_address(address: &str) -> Result<RegionBounds, HostError> {
    let invalid = || HostError::InvalidArgument(format!("invalid address '{address}'"));
    let local = address.rsplit('!').next().unwrap_or(address).trim().replace('$', "");
    let bounds = if let Some(bounds) = ledger::parse_region(&local) {
        bounds
    } else {
        let (start, end) = local.split_once(':').unwrap_or((&local, &local));
        if start.chars().all(|c| c.is_ascii_alphabetic()) && end.chars().all(|c| c.is_ascii_alphabetic()) {
            let cols = ledger::parse_region(&format!("{start}1:{end}1")).ok_or_else(invalid)?;
            RegionBounds {
                start_row: 0,
                end_row: MAX_ROWS - 1,
                ..cols
            }
        } else if start.chars().all(|c| c.is_ascii_digit()) && end.chars().all(|c| c.is_ascii_digit()) {
            let rows = ledger::parse_region(&format!("A{start}:A{end}")).ok_or_else(invalid)?;
            RegionBounds {
                start_col: 0,
                end_col: MAX_COLS - 1,
                ..rows
            }
        } else {
            return Err(invalid());
        }
    };
    if bounds.end_row >= MAX_ROWS || bounds.end_col >= MAX_COLS {
        return Err(invalid());
    }
    Ok(bounds)
}

fn checked_bounds(start_row: i64, start_col: i64, end_row: i64, end_col: i64) -> Result<RegionBounds, HostError> {
    let in_sheet = |v: i64, max: u32| (0..i64::from(max)).contains(&v);
    if !(in_sheet(start_row, MAX_ROWS) && in_sheet(end_row, MAX_ROWS))
        || !(in_sheet(start_col, MAX_COLS) && in_sheet(end_col, MAX_COLS))
        || end_row < start_row
        || end_col < start_col
    {
        return Err(HostError::InvalidArgument("the range lies outside the worksheet".to_owned()));
    }
    Ok(RegionBounds {
        start_col: start_col as u32,
        start_row: start_row as u32,
        end_col: end_col as u32,
        end_row: end_row as u32,
    })
}

fn cell_count(bounds: &RegionBounds) -> u64 {
    u64::from(bounds.row_count()) * u64::from(bounds.col_count())
}

fn check_size(bounds: &RegionBounds) -> Result<(), HostError> {
    if cell_count(bounds) > MAX_RANGE_CELLS {
        return Err(HostError::Other(format!(
            "The range {} is too large for this operation",
            bounds.to_a1()
        )));
    }
    Ok(())
}

fn cell_grid(sheet: &Sheet, bounds: &RegionBounds, read: impl Fn(&Cell) -> Object) -> Result<Object, HostError> {
    check_size(bounds)?;
    let blank = Cell::default();
    Ok(Object::Array(
        (bounds.start_row..=bounds.end_row)
            .map(|row| {
                Object::Array(
                    (bounds.start_col..=bounds.end_col)
                        .map(|col| read(sheet.cell(row, col).unwrap_or(&blank)))
                        .collect(),
                )
            })
            .collect(),
    ))
}

/// Values assigned to a range: one value for every cell, or a row-major grid of exactly the
/// range's shape.
enum Grid {
    Broadcast(Object),
    Rows(Vec<Vec<Object>>),
}

impl Grid {
    fn new(value: Object, bounds: &RegionBounds) -> Result<Self, HostError> {
        let mismatch = || {
            HostError::InvalidArgument(
                "The number of rows or columns in the input array doesn't match the size or dimensions of the range."
                    .to_owned(),
            )
        };
        let Object::Array(rows) = value else {
            check_size(bounds)?;
            return Ok(Self::Broadcast(value));
        };
        if rows.len() != bounds.row_count() as usize {
            return Err(mismatch());
        }
        let rows = rows
            .into_iter()
            .map(|row| match row {
                Object::Array(cells) if cells.len() == bounds.col_count() as usize => Ok(cells),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Rows(rows))
    }

    fn items(&self) -> Box<dyn Iterator<Item = &Object> + '_> {
        match self {
            Self::Broadcast(value) => Box::new(std::iter::once(value)),
            Self::Rows(rows) => Box::new(rows.iter().flatten()),
        }
    }

    fn at(&self, row: u32, col: u32) -> &Object {
        match self {
            Self::Broadcast(value) => value,
            Self::Rows(rows) => &rows[row as usize][col as usize],
        }
    }
}

/// Writes one entry of `values` or `formulas`. `null` leaves the cell unchanged.
fn write_value(cell: &mut Cell, value: Object) -> Result<(), HostError> {
    match value {
        Object::Null | Object::Undefined => {}
        Object::String(s) if s.starts_with('=') => {
            cell.formula = Some(s);
            cell.value = None;
        }
        Object::String(s) if s.is_empty() => {
            cell.value = None;
            cell.formula = None;
        }
        Object::String(_) | Object::Number(_) | Object::Bool(_) => {
            cell.value = Some(value);
            cell.formula = None;
        }
        other => {
            return Err(HostError::InvalidArgument(format!(
                "cannot store a {} in a cell",
                other.type_name()
            )));
        }
    }
    Ok(())
}

fn write_number_format(cell: &mut Cell, value: Object) -> Result<(), HostError> {
    match value {
        Object::Null | Object::Undefined => {}
        Object::String(format) => cell.number_format = Some(format).filter(|f| f != "General"),
        other => {
            return Err(HostError::InvalidArgument(format!(
                "numberFormat expects strings, got {}",
                other.type_name()
            )));
        }
    }
    Ok(())
}

fn style_default(property: &str) -> Object {
    let s = |v: &str| Object::String(v.to_owned());
    match property {
        "horizontalAlignment" => s("General"),
        "verticalAlignment" => s("Bottom"),
        "wrapText" | "bold" | "italic" | "strikethrough" => Object::Bool(false),
        "columnWidth" => Object::Number(64.0),
        "rowHeight" => Object::Number(15.0),
        "name" => s("Calibri"),
        "size" => Object::Number(11.0),
        "color" => s("#000000"),
        "underline" | "style" => s("None"),
        "pattern" => s("Solid"),
        "weight" => s("Thin"),
        _ => Object::Null,
    }
}

/// Property names from `load("values, format/font")`, an array of names, or
/// `{ select: "..." }`. No argument loads everything.
fn load_properties(args: &[Object]) -> Vec<String> {
    fn split(spec: &str) -> impl Iterator<Item = String> + '_ {
        spec.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.split('/').next().unwrap_or(p).to_owned())
    }
    match args.first() {
        Some(Object::String(spec)) => split(spec).collect(),
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_str).flat_map(split).collect(),
        Some(Object::Map(options)) => match options.get("select").and_then(Object::as_str) {
            Some(spec) => split(spec).collect(),
            None => vec![ALL_PROPERTIES.to_owned()],
        },
        _ => vec![ALL_PROPERTIES.to_owned()],
    }
}

fn arg_str<'a>(args: &'a [Object], index: usize, name: &str) -> Result<&'a str, HostError> {
    args.get(index)
        .and_then(Object::as_str)
        .ok_or_else(|| HostError::InvalidArgument(format!("{name} must be a string")))
}

fn arg_int(args: &[Object], index: usize, name: &str) -> Result<i64, HostError> {
    args.get(index)
        .and_then(Object::as_f64)
        .filter(|n| n.is_finite() && n.fract() == 0.0)
        .map(|n| n as i64)
        .ok_or_else(|| HostError::InvalidArgument(format!("{name} must be an integer")))
}

fn arg_index(args: &[Object], index: usize, name: &str) -> Result<u32, HostError> {
    let value = arg_int(args, index, name)?;
    u32::try_from(value).map_err(|_| HostError::InvalidArgument(format!("{name} must not be negative")))
}

fn arg_enum<T: FromStr>(args: &[Object], index: usize, name: &str) -> Result<Option<T>, HostError> {
    match args.get(index) {
        None | Some(Object::Undefined | Object::Null) => Ok(None),
        Some(Object::String(s)) => T::from_str(s)
            .map(Some)
            .map_err(|_| HostError::InvalidArgument(format!("invalid {name} '{s}'"))),
        Some(_) => Err(HostError::InvalidArgument(format!("{name} must be a string"))),
    }
}

fn sheet_from_fixture(fixture: SheetFixture) -> Result<Sheet, WorkbookError> {
    let mut sheet = Sheet::new(fixture.id.unwrap_or_else(new_sheet_id), fixture.name);
    if let Some(visibility) = fixture.visibility {
        sheet.visibility = visibility;
    }
    for (address, cell_fixture) in fixture.cells {
        let bounds = ledger::parse_region(&address)
            .filter(|b| b.row_count() == 1 && b.col_count() == 1 && b.end_row < MAX_ROWS && b.end_col < MAX_COLS)
            .ok_or_else(|| WorkbookError::InvalidAddress {
                sheet: sheet.name.clone(),
                address: address.clone(),
            })?;
        let cell = sheet.cell_mut(bounds.start_row, bounds.start_col);
        match cell_fixture {
            CellFixture::Value(value) => {
                // fixtures only hold scalars; anything else is stored as its JSON text
                let value = match Object::from_json_value(value) {
                    scalar @ (Object::String(_) | Object::Number(_) | Object::Bool(_) | Object::Null) => scalar,
                    other => Object::String(other.to_string()),
                };
                let _ = write_value(cell, value);
            }
            CellFixture::Full(record) => {
                cell.value = record.value.map(Object::from_json_value).filter(|v| !matches!(v, Object::Null));
                cell.formula = record.formula;
                cell.number_format = record.number_format;
                cell.style = record
                    .style
                    .into_iter()
                    .map(|(key, value)| (key, Object::from_json_value(value)))
                    .collect();
            }
        }
    }
    sheet.prune();
    for (kind, entries) in [(AttachedKind::Notes, fixture.notes), (AttachedKind::Comments, fixture.comments)] {
        for (address, content) in entries {
            sheet.attached_mut(kind).push(Attachment {
                name: address.to_ascii_uppercase(),
                props: IndexMap::from([("content".to_owned(), Object::String(content))]),
            });
        }
    }
    for (kind, entries) in [
        (AttachedKind::Charts, fixture.charts),
        (AttachedKind::PivotTables, fixture.pivot_tables),
        (AttachedKind::Tables, fixture.tables),
    ] {
        for entry in entries {
            sheet.attached_mut(kind).push(Attachment {
                name: entry.name,
                props: entry.props.into_iter().map(|(k, v)| (k, Object::from_json_value(v))).collect(),
            });
        }
    }
    Ok(sheet)
}

fn sheet_to_fixture(sheet: &Sheet) -> SheetFixture {
    let cells = sheet
        .cells
        .iter()
        .map(|(&(row, col), cell)| {
            let address = ledger::cell_address(row, col);
            let plain = cell.formula.is_none() && cell.number_format.is_none() && cell.style.is_empty();
            let fixture = match &cell.value {
                Some(value) if plain && !value.as_str().is_some_and(|s| s.starts_with('=')) => {
                    CellFixture::Value(value.to_json_value())
                }
                _ => CellFixture::Full(CellRecord {
                    value: cell.value.as_ref().map(Object::to_json_value),
                    formula: cell.formula.clone(),
                    number_format: cell.number_format.clone(),
                    style: cell.style.iter().map(|(k, v)| (k.clone(), v.to_json_value())).collect(),
                }),
            };
            (address, fixture)
        })
        .collect();
    let annotations = |kind: AttachedKind| -> IndexMap<String, String> {
        sheet
            .attached(kind)
            .iter()
            .map(|a| {
                let content = a.props.get("content").and_then(Object::as_str).unwrap_or_default();
                (a.name.clone(), content.to_owned())
            })
            .collect()
    };
    let attachments = |kind: AttachedKind| -> Vec<AttachmentFixture> {
        sheet
            .attached(kind)
            .iter()
            .map(|a| AttachmentFixture {
                name: a.name.clone(),
                props: a.props.iter().map(|(k, v)| (k.clone(), v.to_json_value())).collect(),
            })
            .collect()
    };
    SheetFixture {
        id: Some(sheet.id.clone()),
        name: sheet.name.clone(),
        visibility: (sheet.visibility != "Visible").then(|| sheet.visibility.clone()),
        cells,
        notes: annotations(AttachedKind::Notes),
        comments: annotations(AttachedKind::Comments),
        charts: attachments(AttachedKind::Charts),
        pivot_tables: attachments(AttachedKind::PivotTables),
        tables: attachments(AttachedKind::Tables),
    }
}
