//! Tests for the in-memory workbook host, driven through snippets without mutation tracking.

use gridlock::{
    ExcType, Exception, HostBridge, HostDocument, MemoryWorkbook, NoConsole, NoLimitTracker, Object, Runner,
    WorkbookError, excel_constants,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// Runs `code` against `workbook` with `context` and `Excel` bound.
fn run(workbook: &mut MemoryWorkbook, code: &str) -> Result<Value, Exception> {
    let runner = Runner::new(code.to_owned(), vec!["context".to_owned(), "Excel".to_owned()])?;
    let root = workbook.open_context().unwrap();
    let result = runner.run(
        vec![Object::Proxy(root), excel_constants()],
        workbook,
        &mut NoLimitTracker,
        &mut NoConsole,
    );
    workbook.close_context(root);
    result.map(|value| value.to_json_value())
}

fn fixture() -> MemoryWorkbook {
    MemoryWorkbook::from_json(
        r#"{
            "name": "Budget",
            "sheets": [
                {
                    "name": "Data",
                    "cells": {
                        "A1": "Item",
                        "B1": "Cost",
                        "A2": "Rent",
                        "B2": 1200,
                        "B3": {"formula": "=SUM(B2:B2)", "numberFormat": "0.00"}
                    },
                    "notes": {"A1": "header row"}
                },
                {"name": "Summary"}
            ],
            "activeSheet": "Summary"
        }"#,
    )
    .unwrap()
}

// === values and formulas ===

#[test]
fn written_values_read_back_after_sync() {
    let mut workbook = MemoryWorkbook::new();
    let result = run(
        &mut workbook,
        r#"
        const range = context.workbook.worksheets.getItem("Sheet1").getRange("A1:B2");
        range.values = [[1, 2], [3, "=A1+B1"]];
        range.load("values, formulas");
        await context.sync();
        return { values: range.values, formulas: range.formulas };
        "#,
    )
    .unwrap();
    assert_eq!(
        result,
        json!({
            "values": [[1, 2], [3, "=A1+B1"]],
            "formulas": [[1, 2], [3, "=A1+B1"]],
        })
    );
    assert_eq!(workbook.cell_formula("Sheet1", "B2").as_deref(), Some("=A1+B1"));
    assert_eq!(workbook.cell_value("Sheet1", "A2"), Some(Object::Number(3.0)));
}

#[test]
fn reading_before_load_raises_property_not_loaded() {
    let mut workbook = fixture();
    let err = run(
        &mut workbook,
        r#"
        const range = context.workbook.worksheets.getItem("Data").getRange("A1");
        return range.values;
        "#,
    )
    .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::HostError);
    assert!(err.message().contains("values"), "unexpected message: {}", err.message());
}

#[test]
fn host_errors_are_catchable_with_code() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        try {
            context.workbook.worksheets.getItem("Missing");
            return "no error";
        } catch (e) {
            return [e.name, e.code];
        }
        "#,
    )
    .unwrap();
    assert_eq!(result, json!(["HostError", "ItemNotFound"]));
}

#[test]
fn scalar_assignment_broadcasts_and_null_keeps_cells() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"
        const sheet = context.workbook.worksheets.getItem("Data");
        sheet.getRange("C1:C3").values = 0;
        sheet.getRange("A1:B1").values = [[null, "Amount"]];
        "#,
    )
    .unwrap();
    assert_eq!(workbook.cell_value("Data", "C2"), Some(Object::Number(0.0)));
    assert_eq!(workbook.cell_value("Data", "A1"), Some(Object::from("Item")));
    assert_eq!(workbook.cell_value("Data", "B1"), Some(Object::from("Amount")));
}

#[test]
fn mismatched_grid_is_rejected_without_partial_write() {
    let mut workbook = fixture();
    let err = run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Data").getRange("A1:B2").values = [[1, 2]];"#,
    )
    .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::HostError);
    assert_eq!(workbook.cell_value("Data", "A1"), Some(Object::from("Item")));
}

#[test]
fn number_format_and_text() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        const range = context.workbook.worksheets.getItem("Data").getRange("B2:B3");
        range.load(["numberFormat", "text"]);
        await context.sync();
        return [range.numberFormat, range.text];
        "#,
    )
    .unwrap();
    assert_eq!(result, json!([[["General"], ["0.00"]], [["1200"], ["=SUM(B2:B2)"]]]));
}

#[test]
fn range_geometry_helpers() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        const sheet = context.workbook.worksheets.getItem("Data");
        const base = sheet.getRange("B2:C4");
        const parts = [
            base.getCell(1, 1),
            base.getRow(0),
            base.getColumn(1),
            base.getResizedRange(1, -1),
            base.getOffsetRange(-1, 2),
            sheet.getRangeByIndexes(0, 0, 2, 3),
            sheet.getUsedRange(),
        ];
        parts.forEach(p => p.load("address"));
        await context.sync();
        return parts.map(p => p.address);
        "#,
    )
    .unwrap();
    assert_eq!(
        result,
        json!(["Data!C3", "Data!B2:C2", "Data!C2:C4", "Data!B2:B5", "Data!D1:E3", "Data!A1:C2", "Data!A1:B3"])
    );
}

#[test]
fn out_of_sheet_range_is_invalid_argument() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        try {
            context.workbook.worksheets.getItem("Data").getRange("A1").getOffsetRange(-1, 0);
        } catch (e) {
            return e.code;
        }
        "#,
    )
    .unwrap();
    assert_eq!(result, json!("InvalidArgument"));
}

// === structural edits ===

#[test]
fn delete_shifts_cells_up() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Data").getRange("A1:B1").delete(Excel.DeleteShiftDirection.up);"#,
    )
    .unwrap();
    assert_eq!(workbook.cell_value("Data", "A1"), Some(Object::from("Rent")));
    assert_eq!(workbook.cell_formula("Data", "B2").as_deref(), Some("=SUM(B2:B2)"));
}

#[test]
fn insert_shifts_cells_down() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Data").getRange("A1:B1").insert("Down");"#,
    )
    .unwrap();
    assert_eq!(workbook.cell_value("Data", "A1"), Some(Object::from("")));
    assert_eq!(workbook.cell_value("Data", "A2"), Some(Object::from("Item")));
}

#[test]
fn clear_contents_keeps_formats() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Data").getRange("B3").clear(Excel.ClearApplyTo.contents);"#,
    )
    .unwrap();
    assert_eq!(workbook.cell_formula("Data", "B3"), None);
    let snapshot = serde_json::to_value(workbook.snapshot()).unwrap();
    assert_eq!(snapshot["sheets"][0]["cells"]["B3"], json!({"numberFormat": "0.00"}));
}

#[test]
fn copy_from_values_drops_formulas() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"
        const sheet = context.workbook.worksheets.getItem("Data");
        sheet.getRange("D1").copyFrom("B2:B3", Excel.RangeCopyType.values);
        "#,
    )
    .unwrap();
    assert_eq!(workbook.cell_value("Data", "D1"), Some(Object::Number(1200.0)));
    assert_eq!(workbook.cell_value("Data", "D2"), Some(Object::from("=SUM(B2:B2)")));
    assert_eq!(workbook.cell_formula("Data", "D2"), None);
}

// === formats ===

#[test]
fn format_writes_apply_to_every_cell_and_read_from_top_left() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r##"
        const range = context.workbook.worksheets.getItem("Data").getRange("A1:B1");
        range.format.font.bold = true;
        range.format.fill.color = "#FFFF00";
        range.format.borders.getItem("EdgeTop").style = "Continuous";
        const font = range.format.font;
        font.load("bold, italic");
        await context.sync();
        return [font.bold, font.italic];
        "##,
    )
    .unwrap();
    assert_eq!(result, json!([true, false]));
    assert_eq!(workbook.cell_style("Data", "B1", "font.bold"), Some(Object::Bool(true)));
    assert_eq!(workbook.cell_style("Data", "A1", "fill.color"), Some(Object::from("#FFFF00")));
    assert_eq!(
        workbook.cell_style("Data", "A1", "borders.EdgeTop.style"),
        Some(Object::from("Continuous"))
    );
}

// === worksheets and attachments ===

#[test]
fn worksheet_collection_items_and_active_sheet() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        const sheets = context.workbook.worksheets;
        sheets.load("items");
        await context.sync();
        sheets.items.forEach(s => s.load("name"));
        const active = sheets.getActiveWorksheet();
        active.load("name");
        await context.sync();
        return { names: sheets.items.map(s => s.name), active: active.name };
        "#,
    )
    .unwrap();
    assert_eq!(result, json!({"names": ["Data", "Summary"], "active": "Summary"}));
}

#[test]
fn add_rename_and_delete_worksheets() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"
        const sheets = context.workbook.worksheets;
        const added = sheets.add("Scratch");
        added.name = "Notes";
        sheets.getItem("Summary").delete();
        "#,
    )
    .unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Data", "Notes"]);
}

#[test]
fn duplicate_sheet_name_is_rejected() {
    let mut workbook = fixture();
    let err = run(&mut workbook, r#"context.workbook.worksheets.add("data");"#).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::HostError);
}

#[test]
fn get_item_or_null_object_reports_null() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        const missing = context.workbook.worksheets.getItemOrNullObject("Nope");
        const present = context.workbook.worksheets.getItemOrNullObject("data");
        return [missing.isNullObject, present.isNullObject];
        "#,
    )
    .unwrap();
    assert_eq!(result, json!([true, false]));
}

#[test]
fn notes_charts_and_tables() {
    let mut workbook = fixture();
    run(
        &mut workbook,
        r#"
        const sheet = context.workbook.worksheets.getItem("Data");
        sheet.notes.add("B2", "monthly");
        sheet.notes.getItem("A1").delete();
        sheet.charts.add(Excel.ChartType.line, sheet.getRange("A1:B3"), Excel.ChartSeriesBy.columns);
        sheet.tables.add("A1:B3", true);
        "#,
    )
    .unwrap();
    assert_eq!(workbook.attachment_names("Data", "notes"), vec!["B2"]);
    assert_eq!(workbook.attachment_names("Data", "charts"), vec!["Chart 1"]);
    assert_eq!(workbook.attachment_names("Data", "tables"), vec!["Table1"]);
}

// === host bridge surface ===

#[test]
fn peek_reports_qualified_address_without_load() {
    let mut workbook = MemoryWorkbook::from_json(r#"{"sheets": [{"name": "My Sheet"}]}"#).unwrap();
    let root = workbook.open_context().unwrap();
    let Object::Proxy(book) = workbook.get(root, "workbook").unwrap() else { panic!("expected a handle") };
    let Object::Proxy(sheets) = workbook.get(book, "worksheets").unwrap() else { panic!("expected a handle") };
    let Object::Proxy(sheet) = workbook.call(sheets, "getFirst", vec![]).unwrap() else { panic!("expected a handle") };
    let Object::Proxy(range) = workbook.call(sheet, "getRange", vec![Object::from("$b$2:c3")]).unwrap() else {
        panic!("expected a handle")
    };
    assert_eq!(workbook.peek(range, "address"), Some(Object::from("'My Sheet'!B2:C3")));
    assert_eq!(workbook.type_name(range), "Range");
    assert!(workbook.has_method(range, "clear"));
    assert!(!workbook.has_method(range, "values"));
    workbook.close_context(root);
    assert!(workbook.get(range, "format").is_err());
}

#[test]
fn same_node_gets_same_handle_within_a_context() {
    let mut workbook = fixture();
    let result = run(
        &mut workbook,
        r#"
        const sheets = context.workbook.worksheets;
        return sheets.getItem("Data") === sheets.getFirst();
        "#,
    )
    .unwrap();
    assert_eq!(result, json!(true));
}

// === fixtures ===

#[test]
fn snapshot_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("book.json");
    let workbook = fixture();
    workbook.save(&path).unwrap();

    let reloaded = MemoryWorkbook::load(&path).unwrap();
    assert_eq!(reloaded.sheet_names(), vec!["Data", "Summary"]);
    assert_eq!(reloaded.sheet_id("Data"), workbook.sheet_id("Data"));
    assert_eq!(reloaded.cell_value("Data", "B2"), Some(Object::Number(1200.0)));
    assert_eq!(reloaded.cell_formula("Data", "B3").as_deref(), Some("=SUM(B2:B2)"));
    assert_eq!(reloaded.attachment_names("Data", "notes"), vec!["A1"]);
}

#[test]
fn invalid_fixtures_are_rejected() {
    assert!(matches!(MemoryWorkbook::from_json(r#"{"sheets": []}"#), Err(WorkbookError::NoSheets)));
    assert!(matches!(
        MemoryWorkbook::from_json(r#"{"sheets": [{"name": "A"}, {"name": "a"}]}"#),
        Err(WorkbookError::DuplicateSheet(_))
    ));
    assert!(matches!(
        MemoryWorkbook::from_json(r#"{"sheets": [{"name": "A", "cells": {"A1:B2": 1}}]}"#),
        Err(WorkbookError::InvalidAddress { .. })
    ));
    assert!(matches!(
        MemoryWorkbook::from_json(r#"{"sheets": [{"name": "A"}], "activeSheet": "B"}"#),
        Err(WorkbookError::UnknownSheet(_))
    ));
}

#[test]
fn sheet_ids_are_braced_uppercase_uuids() {
    let workbook = MemoryWorkbook::new();
    let id = workbook.sheet_id("Sheet1").unwrap();
    assert_eq!(id.len(), 38);
    assert!(id.starts_with('{') && id.ends_with('}'));
    assert_eq!(id, id.to_uppercase());
    assert_eq!(workbook.sheet_name(id), Some("Sheet1"));
}
