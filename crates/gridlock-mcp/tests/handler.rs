use gridlock::{FileSettings, MemoryWorkbook, Object};
use gridlock_mcp::handler::McpHandler;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn execute(handler: &mut McpHandler, code: &str) -> Value {
    handler.call_tool("execute", json!({ "code": code })).unwrap()
}

#[test]
fn lists_all_tools() {
    let handler = McpHandler::in_memory().unwrap();
    let names: Vec<String> = handler.list_tools().into_iter().map(|tool| tool.name).collect();
    assert_eq!(names, vec!["execute", "sheet_ids", "clear_sheet_ids", "snapshot"]);
}

#[test]
fn execute_reports_result_ranges_and_summary() {
    let mut handler = McpHandler::in_memory().unwrap();
    let result = execute(
        &mut handler,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("A1").values = [[42]];
        await context.sync();
        return "done";
        "#,
    );
    assert_eq!(
        result,
        json!({
            "success": true,
            "result": "done",
            "dirtyRanges": [{"scopeId": 1, "region": "A1"}],
            "summary": "Sheet1!A1",
        })
    );
    assert_eq!(handler.workbook().cell_value("Sheet1", "A1"), Some(Object::from(42_i64)));
}

#[test]
fn failed_snippet_is_still_a_tool_result() {
    let mut handler = McpHandler::in_memory().unwrap();
    let result = execute(&mut handler, "return undefinedName;");
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["errorType"], json!("ReferenceError"));
    assert!(result.get("summary").is_none());
}

#[test]
fn heuristic_argument_overrides_config() {
    let mut handler = McpHandler::in_memory().unwrap();
    let code = r#"return "x.values = 1";"#;
    let with = execute(&mut handler, code);
    assert_eq!(with["dirtyRanges"], json!([{"scopeId": -1, "region": "*"}]));
    assert_eq!(with["summary"], json!("Sheet -1 (all)"));

    let without = handler
        .call_tool("execute", json!({ "code": code, "heuristic": false }))
        .unwrap();
    assert!(without.get("dirtyRanges").is_none());
}

#[test]
fn sheet_ids_follow_execute_and_can_be_cleared() {
    let mut handler = McpHandler::in_memory().unwrap();
    execute(
        &mut handler,
        r#"
        const sheets = context.workbook.worksheets;
        sheets.getItem("Sheet1").getRange("A1").values = 1;
        sheets.add("Notes").getRange("A1").values = 2;
        await context.sync();
        "#,
    );

    let ids = handler.call_tool("sheet_ids", json!({})).unwrap();
    let sheets = ids["sheets"].as_array().unwrap();
    assert_eq!(sheets.len(), 2);
    assert_eq!(sheets[0]["id"], json!(1));
    assert_eq!(sheets[0]["name"], json!("Sheet1"));
    assert_eq!(sheets[1]["id"], json!(2));
    assert_eq!(sheets[1]["name"], json!("Notes"));
    assert_eq!(
        sheets[0]["guid"].as_str(),
        handler.workbook().sheet_id("Sheet1")
    );

    assert_eq!(handler.call_tool("clear_sheet_ids", json!({})).unwrap(), json!({"cleared": 2}));
    assert_eq!(handler.call_tool("sheet_ids", json!({})).unwrap(), json!({"sheets": []}));
}

#[test]
fn snapshot_returns_fixture() {
    let mut handler = McpHandler::in_memory().unwrap();
    execute(&mut handler, r#"context.workbook.worksheets.getItem("Sheet1").getRange("B2").values = "hi";"#);
    let snapshot = handler.call_tool("snapshot", json!({})).unwrap();
    assert_eq!(snapshot["sheets"][0]["name"], json!("Sheet1"));
    assert_eq!(snapshot["sheets"][0]["cells"]["B2"], json!("hi"));
}

#[test]
fn bad_calls_are_errors() {
    let mut handler = McpHandler::in_memory().unwrap();
    let err = handler.call_tool("format_disk", json!({})).unwrap_err();
    assert_eq!(err, "unknown tool 'format_disk'");

    let err = handler.call_tool("execute", json!({ "source": "return 1;" })).unwrap_err();
    assert!(err.starts_with("invalid execute args"), "unexpected error: {err}");
}

#[test]
fn workbook_and_ids_persist_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let workbook_path = dir.path().join("book.json");
    let settings_path = dir.path().join("settings.json");

    let store = FileSettings::open(&settings_path).unwrap();
    let mut handler = McpHandler::new(MemoryWorkbook::new(), Box::new(store)).unwrap();
    handler.set_workbook_path(workbook_path.clone());
    assert_eq!(handler.workbook_path(), Some(workbook_path.as_path()));
    execute(
        &mut handler,
        r#"
        context.workbook.worksheets.getItem("Sheet1").getRange("C3").values = 3;
        await context.sync();
        "#,
    );
    drop(handler);

    let workbook = MemoryWorkbook::load(&workbook_path).unwrap();
    assert_eq!(workbook.cell_value("Sheet1", "C3"), Some(Object::from(3_i64)));

    let store = FileSettings::open(&settings_path).unwrap();
    let mut handler = McpHandler::new(workbook, Box::new(store)).unwrap();
    let result = execute(
        &mut handler,
        r#"
        context.workbook.worksheets.getItem("Sheet1").getRange("D4").values = 4;
        await context.sync();
        "#,
    );
    assert_eq!(result["dirtyRanges"], json!([{"scopeId": 1, "region": "D4"}]));
}
