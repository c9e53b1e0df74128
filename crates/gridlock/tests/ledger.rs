use gridlock::ledger::{self, DirtyRange, RegionBounds, UNRESOLVED_SCOPE, WILDCARD};
use pretty_assertions::assert_eq;

fn range(scope_id: i64, region: &str) -> DirtyRange {
    DirtyRange::new(scope_id, region)
}

// === merge ===

#[test]
fn merge_dedupes_exact_repeats_in_first_seen_order() {
    let merged = ledger::merge(&[range(1, "A1"), range(2, "B2"), range(1, "A1"), range(1, "C3")]);
    assert_eq!(merged, vec![range(1, "A1"), range(2, "B2"), range(1, "C3")]);
}

#[test]
fn merge_collapses_scope_with_wildcard() {
    let merged = ledger::merge(&[range(1, "A1"), range(1, WILDCARD), range(1, "B2"), range(2, "A1")]);
    assert_eq!(merged, vec![range(1, WILDCARD), range(2, "A1")]);
}

#[test]
fn merge_keeps_one_wildcard_per_scope() {
    let merged = ledger::merge(&[range(3, WILDCARD), range(3, WILDCARD), range(4, WILDCARD)]);
    assert_eq!(merged, vec![range(3, WILDCARD), range(4, WILDCARD)]);
}

#[test]
fn merge_does_not_union_overlapping_regions() {
    let merged = ledger::merge(&[range(1, "A1:B2"), range(1, "B2:C3"), range(1, "A1")]);
    assert_eq!(merged.len(), 3);
}

#[test]
fn merge_treats_unresolved_scope_as_its_own_scope() {
    let merged = ledger::merge(&[range(UNRESOLVED_SCOPE, WILDCARD), range(1, "A1")]);
    assert_eq!(merged, vec![range(-1, WILDCARD), range(1, "A1")]);
}

#[test]
fn merge_of_nothing_is_empty() {
    assert!(ledger::merge(&[]).is_empty());
}

// === parse_region ===

#[test]
fn parse_region_single_cell() {
    assert_eq!(ledger::parse_region("A1"), Some(RegionBounds::cell(0, 0)));
}

#[test]
fn parse_region_rectangle() {
    assert_eq!(
        ledger::parse_region("B2:D10"),
        Some(RegionBounds {
            start_col: 1,
            start_row: 1,
            end_col: 3,
            end_row: 9,
        })
    );
}

#[test]
fn parse_region_multi_letter_column() {
    let bounds = ledger::parse_region("AA1").unwrap();
    assert_eq!(bounds.start_col, 26);
    assert_eq!(bounds.start_row, 0);
    assert_eq!(ledger::parse_region("AZ3").unwrap().start_col, 51);
}

#[test]
fn parse_region_is_case_insensitive_and_normalizes_corners() {
    assert_eq!(ledger::parse_region("d10:b2"), ledger::parse_region("B2:D10"));
}

#[test]
fn parse_region_rejects_wildcard_and_garbage() {
    for bad in [WILDCARD, "", "A", "1", "A0", "1A", "A1:", "A1:B", "Sheet1!A1", "A1B2"] {
        assert_eq!(ledger::parse_region(bad), None, "{bad:?} should not parse");
    }
}

#[test]
fn bounds_render_back_to_a1() {
    assert_eq!(ledger::parse_region("B2:D10").unwrap().to_a1(), "B2:D10");
    assert_eq!(RegionBounds::cell(4, 27).to_a1(), "AB5");
}

#[test]
fn column_letters_roll_over() {
    assert_eq!(ledger::column_letters(0), "A");
    assert_eq!(ledger::column_letters(25), "Z");
    assert_eq!(ledger::column_letters(26), "AA");
    assert_eq!(ledger::column_letters(701), "ZZ");
    assert_eq!(ledger::column_letters(702), "AAA");
    assert_eq!(ledger::cell_address(9, 2), "C10");
}

// === format ===

#[test]
fn format_names_scopes_and_wildcards() {
    let ranges = [range(1, "A1:B2"), range(2, WILDCARD), range(1, "A1:B2")];
    let text = ledger::format(&ranges, |id| (id == 1).then(|| "Sales".to_owned()));
    assert_eq!(text, "Sales!A1:B2, Sheet 2 (all)");
}

#[test]
fn format_falls_back_for_unresolved_scope() {
    let text = ledger::format(&[range(UNRESOLVED_SCOPE, WILDCARD)], |_| None);
    assert_eq!(text, "Sheet -1 (all)");
}

#[test]
fn format_of_nothing_is_empty() {
    assert_eq!(ledger::format(&[], |_| None), "");
}

// === serialization ===

#[test]
fn dirty_range_serializes_camel_case() {
    let json = serde_json::to_value(range(3, "A1")).unwrap();
    assert_eq!(json, serde_json::json!({"scopeId": 3, "region": "A1"}));
}
