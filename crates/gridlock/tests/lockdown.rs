use gridlock::{DENIED_GLOBALS, Object, evaluate, is_locked_down, lockdown};
use pretty_assertions::assert_eq;

#[test]
fn lockdown_builds_intrinsics_once() {
    assert!(std::ptr::eq(lockdown(), lockdown()));
    assert!(is_locked_down());
}

#[test]
fn running_a_snippet_locks_down() {
    assert_eq!(evaluate("return 1;", vec![]).unwrap(), Object::from(1_i64));
    assert!(is_locked_down());
}

#[test]
fn global_table_lists_safe_intrinsics_and_denied_names() {
    let intrinsics = lockdown();
    let names: Vec<&str> = intrinsics.global_names().collect();
    for expected in ["Math", "JSON", "Object", "Array", "Promise", "console", "parseInt"] {
        assert!(names.contains(&expected), "missing global {expected}");
    }
    for name in DENIED_GLOBALS {
        assert!(intrinsics.is_denied(name), "{name} should be denied");
    }
    assert!(!intrinsics.is_denied("Math"));
}

#[test]
fn namespace_members_are_fixed() {
    let intrinsics = lockdown();
    let math = intrinsics.namespace_members("Math").unwrap();
    assert!(math.contains(&"max"));
    assert!(math.contains(&"PI"));
    assert!(intrinsics.namespace_members("eval").is_none());
}
