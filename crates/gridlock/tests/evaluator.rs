use std::time::Duration;

use gridlock::{
    BLOCKED_PROPERTIES, CollectConsole, ConsoleLevel, DENIED_GLOBALS, ExcType, LimitedTracker, NoHost, Object,
    ResourceLimits, Runner, evaluate,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn eval_json(code: &str) -> serde_json::Value {
    evaluate(code, vec![]).unwrap().to_json_value()
}

fn eval_err(code: &str) -> (ExcType, String) {
    let err = evaluate(code, vec![]).unwrap_err();
    (err.exc_type(), err.message().to_owned())
}

// === results ===

#[test]
fn body_without_return_is_undefined() {
    assert_eq!(evaluate("const x = 1 + 2;", vec![]).unwrap(), Object::Undefined);
}

#[test]
fn returned_object_keeps_key_order() {
    let result = eval_json(
        r"
        const rows = [3, 1, 2].map((n, i) => ({ n, i }));
        rows.sort((a, b) => a.n - b.n);
        return { total: rows.reduce((acc, r) => acc + r.n, 0), first: rows[0], label: `n=${rows.length}` };
        ",
    );
    assert_eq!(result, json!({"total": 6, "first": {"n": 1, "i": 1}, "label": "n=3"}));
}

#[test]
fn awaited_promise_resolves_to_its_value() {
    let result = eval_json(
        r"
        async function double(x) { return x * 2; }
        const value = await double(21);
        return await Promise.resolve(value);
        ",
    );
    assert_eq!(result, json!(42));
}

#[test]
fn bindings_are_visible_by_name() {
    let result = evaluate(
        "return `${greeting}, ${names.join(' & ')}`;",
        vec![
            ("greeting".to_owned(), Object::from("hello")),
            ("names".to_owned(), Object::from(vec![Object::from("a"), Object::from("b")])),
        ],
    )
    .unwrap();
    assert_eq!(result, Object::from("hello, a & b"));
}

#[test]
fn for_loops_can_assign_existing_bindings() {
    let result = eval_json(
        r"
        let x;
        let k;
        const seen = [];
        for (x of [1, 2]) seen.push(x);
        for (k in { a: 1, b: 2 }) seen.push(k);
        return [seen, x, k];
        ",
    );
    assert_eq!(result, json!([[1, 2, "a", "b"], 2, "b"]));
}

// === hardening ===

#[test]
fn denied_globals_read_as_undefined() {
    for name in DENIED_GLOBALS {
        let result = eval_json(&format!("return typeof {name};"));
        assert_eq!(result, json!("undefined"), "typeof {name}");
    }
}

#[test]
fn calling_denied_global_raises_type_error() {
    for name in DENIED_GLOBALS {
        let (exc_type, _) = eval_err(&format!("{name}('return 1');"));
        assert_eq!(exc_type, ExcType::TypeError, "calling {name}");
    }
}

#[test]
fn blocked_properties_are_undefined_everywhere() {
    for key in BLOCKED_PROPERTIES {
        let result = eval_json(&format!(
            "return [({{}})['{key}'], [1, 2]['{key}'], 'text'['{key}'], Math['{key}'], (() => 1)['{key}']];"
        ));
        assert_eq!(result, json!([null, null, null, null, null]), "reading {key}");
    }
}

#[test]
fn intrinsics_cannot_be_modified() {
    let (exc_type, message) = eval_err("Math.max = () => 0;");
    assert_eq!(exc_type, ExcType::TypeError);
    assert!(message.contains("max"), "unexpected message: {message}");

    let (exc_type, _) = eval_err("JSON.leak = 1;");
    assert_eq!(exc_type, ExcType::TypeError);

    let (exc_type, _) = eval_err("Math = {};");
    assert_eq!(exc_type, ExcType::TypeError);
}

#[test]
fn injected_bindings_are_deep_frozen() {
    let input = Object::map([("rows".to_owned(), Object::from(vec![Object::from(1_i64)]))]);

    let err = evaluate("config.extra = true;", vec![("config".to_owned(), input.clone())]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
    assert!(err.message().contains("read only"), "unexpected message: {}", err.message());

    let err = evaluate("config.rows[0] = 2;", vec![("config".to_owned(), input.clone())]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);

    let err = evaluate("config.rows.push(2);", vec![("config".to_owned(), input)]).unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TypeError);
}

#[test]
fn snippet_values_stay_mutable() {
    assert_eq!(eval_json("const o = { a: 1 }; o.b = 2; delete o.a; return o;"), json!({"b": 2}));
}

// === errors ===

#[test]
fn unsupported_syntax_is_a_syntax_error() {
    for code in [
        "class A {}",
        "const A = class {};",
        "import fs from 'fs';",
        "export const x = 1;",
        "with (Math) { max(1, 2); }",
        "return 1 +;",
    ] {
        let err = Runner::new(code.to_owned(), vec![]).unwrap_err();
        assert_eq!(err.exc_type(), ExcType::SyntaxError, "{code:?}");
        assert!(err.loc().is_some(), "{code:?} should carry a location");
    }
}

#[test]
fn unknown_name_is_a_reference_error() {
    let (exc_type, message) = eval_err("return missing + 1;");
    assert_eq!(exc_type, ExcType::ReferenceError);
    assert_eq!(message, "missing is not defined");
}

#[test]
fn uncaught_throw_keeps_error_type() {
    assert_eq!(eval_err("throw new TypeError('bad');"), (ExcType::TypeError, "bad".to_owned()));
    assert_eq!(eval_err("throw 'plain';"), (ExcType::Error, "plain".to_owned()));
}

#[test]
fn thrown_errors_are_catchable() {
    let result = eval_json(
        r"
        try {
            null.x;
        } catch (e) {
            return [e.name, e instanceof TypeError];
        }
        ",
    );
    assert_eq!(result, json!(["TypeError", true]));
}

#[test]
fn rejected_promise_surfaces_as_exception() {
    let (exc_type, message) = eval_err("return Promise.reject(new RangeError('too far'));");
    assert_eq!(exc_type, ExcType::RangeError);
    assert_eq!(message, "too far");
}

// === resource limits ===

#[test]
fn operation_budget_cannot_be_caught() {
    let runner = Runner::new(
        r"
        let caught = 0;
        while (true) {
            try {
                while (true) {}
            } catch (e) {
                caught += 1;
            } finally {
                caught += 1;
            }
        }
        "
        .to_owned(),
        vec![],
    )
    .unwrap();
    let mut tracker = LimitedTracker::new(ResourceLimits::new().max_operations(1_000));
    let err = runner
        .run(vec![], &mut NoHost, &mut tracker, &mut CollectConsole::new())
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TimeoutError);
    assert!(tracker.operation_count() > 1_000);
}

#[test]
fn time_budget_stops_long_loops() {
    let runner = Runner::new("for (;;) {}".to_owned(), vec![]).unwrap();
    let mut tracker = LimitedTracker::new(ResourceLimits::new().max_duration(Duration::from_millis(20)));
    let err = runner
        .run(vec![], &mut NoHost, &mut tracker, &mut CollectConsole::new())
        .unwrap_err();
    assert_eq!(err.exc_type(), ExcType::TimeoutError);
    assert!(tracker.elapsed() >= Duration::from_millis(20));
}

#[test]
fn runaway_recursion_is_a_range_error() {
    let (exc_type, message) = eval_err("function f(n) { return f(n + 1); } return f(0);");
    assert_eq!(exc_type, ExcType::RangeError);
    assert_eq!(message, "Maximum call stack size exceeded");
}

#[test]
fn recursion_limit_is_configurable_and_catchable() {
    let runner = Runner::new(
        r"
        function depth(n) { return depth(n + 1); }
        try { depth(0); } catch (e) { return e.name; }
        "
        .to_owned(),
        vec![],
    )
    .unwrap();
    let mut tracker = LimitedTracker::new(ResourceLimits::new().max_recursion_depth(Some(10)));
    let result = runner
        .run(vec![], &mut NoHost, &mut tracker, &mut CollectConsole::new())
        .unwrap();
    assert_eq!(result, Object::from("RangeError"));
}

#[test]
fn growing_array_past_limit_is_a_range_error() {
    let (exc_type, message) = eval_err("const a = []; a.length = 4294967295;");
    assert_eq!(exc_type, ExcType::RangeError);
    assert_eq!(message, "Invalid array length");

    let (exc_type, _) = eval_err("const a = []; a[4000000000] = 1;");
    assert_eq!(exc_type, ExcType::RangeError);

    assert_eq!(eval_json("const a = [1]; a[3] = 4; a.length = 2; return [a, a.length];"), json!([[1, null], 2]));
}

#[test]
fn huge_padding_is_a_range_error() {
    let (exc_type, message) = eval_err("return 'x'.padStart(1e12);");
    assert_eq!(exc_type, ExcType::RangeError);
    assert!(message.starts_with("memory limit exceeded"), "unexpected message: {message}");

    let (exc_type, _) = eval_err("return 'x'.padEnd(1e12, 'ab');");
    assert_eq!(exc_type, ExcType::RangeError);
}

#[test]
fn memory_limit_is_configurable_and_catchable() {
    let runner = Runner::new(
        r"
        const small = 'x'.padEnd(64, '-');
        try { 'x'.padEnd(4096); } catch (e) { return [small.length, e.name]; }
        "
        .to_owned(),
        vec![],
    )
    .unwrap();
    let mut tracker = LimitedTracker::new(ResourceLimits::new().max_memory(1024));
    let result = runner
        .run(vec![], &mut NoHost, &mut tracker, &mut CollectConsole::new())
        .unwrap();
    assert_eq!(result.to_json_value(), json!([64, "RangeError"]));
}

// === console ===

#[test]
fn console_lines_are_collected_with_levels() {
    let runner = Runner::new(
        r"
        console.log('total', 3);
        console.warn('careful');
        console.error('failed:', 'x');
        "
        .to_owned(),
        vec![],
    )
    .unwrap();
    let mut console = CollectConsole::new();
    runner
        .run(vec![], &mut NoHost, &mut LimitedTracker::new(ResourceLimits::default()), &mut console)
        .unwrap();
    assert_eq!(
        console.lines(),
        &[
            (ConsoleLevel::Log, "total 3".to_owned()),
            (ConsoleLevel::Warn, "careful".to_owned()),
            (ConsoleLevel::Error, "failed: x".to_owned()),
        ]
    );
    assert_eq!(console.output(), "total 3\ncareful\nfailed: x\n");
}

#[test]
fn runner_can_be_reused() {
    let runner = Runner::new("return n * n;".to_owned(), vec!["n".to_owned()]).unwrap();
    assert_eq!(runner.code(), "return n * n;");
    assert_eq!(runner.run_no_limits(vec![Object::from(3_i64)]).unwrap(), Object::from(9_i64));
    assert_eq!(runner.run_no_limits(vec![Object::from(4_i64)]).unwrap(), Object::from(16_i64));
}
