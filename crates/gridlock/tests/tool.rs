//! End-to-end runs of `execute` against the in-memory workbook.

use gridlock::{
    DirtyRange, ExcType, HostBridge, HostDocument, MemorySettings, MemoryWorkbook, Object, ResourceLimits,
    SettingsStore, StableIdMapper, StoreError, ToolConfig, TrackedContext, execute, ledger::WILDCARD,
    tool::looks_like_mutation, tracker::Shape,
};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

/// A mapper that has already handed out ids 1 and 2, so the first sheet seen gets 3.
fn seeded_mapper() -> StableIdMapper<MemorySettings> {
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    mapper.get_or_assign("{X}").unwrap();
    mapper.get_or_assign("{Y}").unwrap();
    mapper
}

fn run(workbook: &mut MemoryWorkbook, code: &str) -> gridlock::ToolOutcome {
    execute(workbook, &mut seeded_mapper(), code, &ToolConfig::default())
}

fn dirty(scope_id: i64, region: &str) -> DirtyRange {
    DirtyRange::new(scope_id, region)
}

/// Settings that load fine but refuse every save.
#[derive(Default)]
struct ReadOnlySettings(MemorySettings);

impl SettingsStore for ReadOnlySettings {
    fn refresh(&mut self) -> Result<(), StoreError> {
        self.0.refresh()
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.0.set(key, value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        Err(StoreError::Rejected("document is read-only".to_owned()))
    }
}

// === recorded mutations ===

#[test]
fn value_write_is_reported_with_stable_sheet_id() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = seeded_mapper();
    let outcome = execute(
        &mut workbook,
        &mut mapper,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("A1").values = [[1]];
        await context.sync();
        "#,
        &ToolConfig::default(),
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, "A1")]);
    assert_eq!(workbook.cell_value("Sheet1", "A1"), Some(Object::from(1_i64)));

    let guid = workbook.sheet_id("Sheet1").unwrap();
    assert_eq!(mapper.get_existing(guid), Some(3));
}

#[test]
fn sheet_keeps_its_id_across_calls() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = seeded_mapper();
    let code = r#"
        const s = context.workbook.worksheets.getActiveWorksheet();
        s.getRange("$B$2:c3").values = 0;
        await context.sync();
    "#;
    let first = execute(&mut workbook, &mut mapper, code, &ToolConfig::default());
    let second = execute(&mut workbook, &mut mapper, code, &ToolConfig::default());
    assert_eq!(first.dirty_ranges, vec![dirty(3, "B2:C3")]);
    assert_eq!(second.dirty_ranges, first.dirty_ranges);
    assert_eq!(mapper.all().len(), 3);
}

#[test]
fn structural_edit_marks_whole_sheet() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("A1").values = [[1]];
        s.getRange("A1:B2").delete(Excel.DeleteShiftDirection.up);
        s.getRange("C3").values = [[2]];
        await context.sync();
        "#,
    );
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, WILDCARD)]);
}

#[test]
fn each_sheet_gets_its_own_id() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const sheets = context.workbook.worksheets;
        const first = sheets.getItem("Sheet1");
        const second = sheets.add("Totals");
        first.getRange("A1").values = 1;
        second.getRange("B2").formulas = [["=Sheet1!A1*2"]];
        first.getRange("A1").values = 1;
        await context.sync();
        "#,
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, "A1"), dirty(4, "B2")]);
    assert_eq!(workbook.cell_formula("Totals", "B2").as_deref(), Some("=Sheet1!A1*2"));
}

#[test]
fn format_writes_report_the_formatted_range() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r##"
        const range = context.workbook.worksheets.getItem("Sheet1").getRange("B2:C3");
        range.format.font.bold = true;
        range.format.fill.color = "#FFFF00";
        await context.sync();
        "##,
    );
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, "B2:C3")]);
    assert_eq!(workbook.cell_style("Sheet1", "C3", "font.bold"), Some(Object::Bool(true)));
}

#[test]
fn derived_range_address_comes_from_the_host() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("A1").getOffsetRange(1, 1).values = [[2]];
        s.getRangeByIndexes(4, 0, 1, 2).values = [[1, 2]];
        await context.sync();
        "#,
    );
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, "B2"), dirty(3, "A5:B5")]);
}

#[test]
fn attachments_mark_whole_sheet() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.notes.add("A1", "check this");
        await context.sync();
        "#,
    );
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, WILDCARD)]);
    assert_eq!(workbook.attachment_names("Sheet1", "notes"), vec!["A1".to_owned()]);
}

#[test]
fn mutation_before_any_sync_has_unresolved_scope() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Sheet1").getRange("A1").values = [[1]];"#,
    );
    assert_eq!(outcome.dirty_ranges, vec![dirty(-1, "A1")]);
}

#[test]
fn sheet_deleted_before_sync_stays_unresolved() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    let outcome = execute(
        &mut workbook,
        &mut mapper,
        r#"
        const sheets = context.workbook.worksheets;
        const extra = sheets.add("Extra");
        extra.delete();
        sheets.getItem("Sheet1").getRange("A1").values = 1;
        sheets.getActiveWorksheet().getRange("B1").values = 2;
        await context.sync();
        await context.sync();
        "#,
        &ToolConfig::default(),
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.dirty_ranges, vec![dirty(-1, WILDCARD), dirty(1, "A1"), dirty(1, "B1")]);
    assert_eq!(mapper.all().len(), 1);
}

#[test]
fn every_lookup_path_reaches_the_same_sheet() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    let outcome = execute(
        &mut workbook,
        &mut mapper,
        r#"
        const sheets = context.workbook.worksheets;
        sheets.load("items");
        await context.sync();
        const byName = sheets.getItem("Sheet1");
        const active = sheets.getActiveWorksheet();
        const listed = sheets.items[0];
        byName.getRange("A1").values = 1;
        active.getRange("B1").values = 2;
        listed.getRange("C1").values = 3;
        await context.sync();
        return [byName === active, active === listed];
        "#,
        &ToolConfig::default(),
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.result, Some(json!([true, true])));
    assert_eq!(outcome.dirty_ranges, vec![dirty(1, "A1"), dirty(1, "B1"), dirty(1, "C1")]);
}

#[test]
fn failed_id_persistence_leaves_scopes_unresolved() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = StableIdMapper::open(ReadOnlySettings::default()).unwrap();
    let outcome = execute(
        &mut workbook,
        &mut mapper,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("A1").values = 1;
        await context.sync();
        s.getRange("B1").values = 2;
        await context.sync();
        return "done";
        "#,
        &ToolConfig::default(),
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.result, Some(json!("done")));
    assert_eq!(outcome.dirty_ranges, vec![dirty(-1, "A1"), dirty(-1, "B1")]);
    assert!(mapper.all().is_empty());
    assert_eq!(workbook.cell_value("Sheet1", "B1"), Some(Object::from(2_i64)));
}

#[test]
fn range_address_is_reported_in_canonical_order() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const s = context.workbook.worksheets.getItem("Sheet1");
        s.getRange("B2:A1").values = 0;
        s.getRange("c3:c3").format.font.bold = true;
        await context.sync();
        "#,
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.dirty_ranges, vec![dirty(3, "A1:B2"), dirty(3, "C3")]);
}

#[test]
fn reads_are_not_mutations() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        const range = context.workbook.worksheets.getItem("Sheet1").getRange("A1:B2");
        range.load("values");
        await context.sync();
        return range.values;
        "#,
    );
    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.result, Some(json!([["", ""], ["", ""]])));
    assert!(outcome.dirty_ranges.is_empty());
}

// === source heuristic ===

#[test]
fn mutating_source_without_records_reports_wildcard() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(&mut workbook, r#"const hint = "range.values = [[1]]"; return hint.length;"#);
    assert_eq!(outcome.dirty_ranges, vec![dirty(-1, WILDCARD)]);
}

#[test]
fn heuristic_can_be_disabled() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = execute(
        &mut workbook,
        &mut seeded_mapper(),
        r#"const hint = "range.values = [[1]]"; return hint.length;"#,
        &ToolConfig::default().heuristic(false),
    );
    assert!(outcome.dirty_ranges.is_empty());
}

#[test]
fn mutation_patterns() {
    for code in [
        "range.values = [[1]]",
        "r.formulas=x",
        "r.numberFormat =",
        "range.clear()",
        "sheet.delete ()",
        "r.insert(\"Down\")",
        "r.copyFrom(\"A1\")",
        "notes.add(\"A1\", \"x\")",
    ] {
        assert!(looks_like_mutation(code), "{code:?}");
    }
    for code in ["if (r.values == 1) {}", "r.values === x", "r.values", "const values = 1;", "r.load('values')"] {
        assert!(!looks_like_mutation(code), "{code:?}");
    }
}

// === failures ===

#[test]
fn syntax_error_fails_before_touching_document() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"context.workbook.worksheets.getItem("Sheet1").getRange("A1").values = [[1]]; class X {}"#,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error_type, Some(ExcType::SyntaxError));
    assert!(outcome.dirty_ranges.is_empty());
    assert_eq!(workbook.cell_value("Sheet1", "A1"), Some(Object::from("")));
    assert_eq!(workbook.sync_count(), 0);
}

#[test]
fn runtime_error_reports_message_and_no_ranges() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        context.workbook.worksheets.getItem("Sheet1").getRange("A1").values = [[5]];
        await context.sync();
        throw new Error("late failure");
        "#,
    );
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("late failure"));
    assert_eq!(outcome.error_type, Some(ExcType::Error));
    assert!(outcome.dirty_ranges.is_empty());
    assert_eq!(workbook.cell_value("Sheet1", "A1"), Some(Object::from(5_i64)));
}

#[test]
fn host_error_surfaces_with_its_type() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(&mut workbook, r#"context.workbook.worksheets.getItem("Nope");"#);
    assert!(!outcome.success);
    assert_eq!(outcome.error_type, Some(ExcType::HostError));
}

#[test]
fn operation_budget_is_enforced() {
    let mut workbook = MemoryWorkbook::new();
    let config = ToolConfig::default().limits(ResourceLimits::new().max_operations(500));
    let outcome = execute(&mut workbook, &mut seeded_mapper(), "while (true) {}", &config);
    assert!(!outcome.success);
    assert_eq!(outcome.error_type, Some(ExcType::TimeoutError));
}

#[test]
fn context_is_closed_after_each_call() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(&mut workbook, "return 1;");
    assert!(outcome.success);
    // a fresh context opens cleanly after a failed run too
    let failed = run(&mut workbook, "throw new Error('x');");
    assert!(!failed.success);
    assert!(run(&mut workbook, "return 2;").success);
}

// === outcome ===

#[test]
fn outcome_serializes_without_empty_fields() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(&mut workbook, "return { n: 7 };");
    assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({"success": true, "result": {"n": 7}}));

    let outcome = run(&mut workbook, "return missing;");
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"success": false, "error": "missing is not defined", "errorType": "ReferenceError"})
    );
}

#[test]
fn outcome_summary_names_sheets() {
    let mut workbook = MemoryWorkbook::new();
    let outcome = run(
        &mut workbook,
        r#"
        context.workbook.worksheets.getItem("Sheet1").getRange("A1:B2").values = 1;
        await context.sync();
        "#,
    );
    let summary = outcome.summary(|id| (id == 3).then(|| "Sheet1".to_owned()));
    assert_eq!(summary, "Sheet1!A1:B2");
}

// === tracked context ===

#[test]
fn tracked_context_wraps_handles_by_shape() {
    let mut workbook = MemoryWorkbook::new();
    let mut mapper = StableIdMapper::open(MemorySettings::new()).unwrap();
    let root = workbook.open_context().unwrap();
    {
        let mut tracked = TrackedContext::new(&mut workbook, &mut mapper, root);
        let context = tracked.root();
        assert_eq!(tracked.shape(context), Some(Shape::Context));

        let Object::Proxy(book) = tracked.get(context, "workbook").unwrap() else {
            panic!("workbook should be a handle");
        };
        assert_eq!(tracked.shape(book), Some(Shape::Workbook));
        let Object::Proxy(sheets) = tracked.get(book, "worksheets").unwrap() else {
            panic!("worksheets should be a handle");
        };
        assert_eq!(tracked.shape(sheets), Some(Shape::Scopes));
        let Object::Proxy(sheet) = tracked.call(sheets, "getItem", vec![Object::from("Sheet1")]).unwrap() else {
            panic!("getItem should return a handle");
        };
        assert_eq!(tracked.shape(sheet), Some(Shape::Scope));

        let again = tracked.call(sheets, "getItem", vec![Object::from("Sheet1")]).unwrap();
        assert_eq!(again, Object::Proxy(sheet));

        let Object::Proxy(range) = tracked.call(sheet, "getRange", vec![Object::from("A1:B2")]).unwrap() else {
            panic!("getRange should return a handle");
        };
        assert_eq!(tracked.shape(range), Some(Shape::Region));
        assert!(tracked.dirty_ranges().is_empty());

        tracked.set(range, "values", Object::from(0_i64)).unwrap();
        assert_eq!(tracked.dirty_ranges(), vec![dirty(-1, "A1:B2")]);

        tracked.call(context, "sync", vec![]).unwrap();
        assert_eq!(tracked.dirty_ranges(), vec![dirty(1, "A1:B2")]);
        assert_eq!(tracked.shape(gridlock::ProxyId::new(999)), None);
    }
    workbook.close_context(root);
}
