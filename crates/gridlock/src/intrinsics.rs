//! The frozen intrinsic environment and its one-time hardening.
//!
//! `lockdown()` builds the global-name table, the namespace member tables and the receiver
//! method tables exactly once per process. The result is immutable: snippets can read
//! intrinsics but every write to them fails, and no table hands out anything that reaches the
//! filesystem, the network or the host beyond injected bindings.

use std::sync::OnceLock;

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use strum::IntoStaticStr;

use crate::builtins::{
    ArrayFn, Builtin, ConsoleFn, DateFn, GlobalFn, JsonFn, MathFn, NumberFn, ObjectFn, PromiseFn, StringFn,
};

/// Names that evaluate to `undefined` inside a snippet.
///
/// They are bound rather than absent, so `typeof eval === "undefined"` and reading them never
/// raises. Calling or constructing one raises a `TypeError`.
pub const DENIED_GLOBALS: [&str; 8] = [
    "Function",
    "Reflect",
    "Proxy",
    "Compartment",
    "harden",
    "lockdown",
    "eval",
    "globalThis",
];

/// Property names that read as `undefined` on every value, so no capability is reachable by
/// walking constructor or prototype chains.
pub const BLOCKED_PROPERTIES: [&str; 3] = ["constructor", "prototype", "__proto__"];

/// Frozen namespaces and constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub(crate) enum Intrinsic {
    #[strum(serialize = "console")]
    Console,
    Math,
    #[strum(serialize = "JSON")]
    Json,
    Object,
    Array,
    Number,
    String,
    Boolean,
    Promise,
    Date,
    Error,
    TypeError,
    RangeError,
}

impl Intrinsic {
    pub(crate) fn name(self) -> &'static str {
        self.into()
    }

    /// Constructors are callable; `console`, `Math` and `JSON` are plain namespaces.
    pub(crate) fn is_callable(self) -> bool {
        !matches!(self, Self::Console | Self::Math | Self::Json)
    }
}

/// What a global name resolves to when no snippet binding shadows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Global {
    /// Deny-listed capability; reads as `undefined`.
    Denied,
    Undefined,
    Number(f64),
    Intrinsic(Intrinsic),
    Builtin(Builtin),
}

/// A namespace member such as `Math.max` or `Math.PI`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Member {
    Number(f64),
    Builtin(Builtin),
}

/// Value categories that carry built-in methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ReceiverKind {
    Array,
    String,
    Number,
    Boolean,
    Object,
    Function,
    Promise,
    Date,
}

const ARRAY_METHODS: &[&str] = &[
    "at", "concat", "entries", "every", "fill", "filter", "find", "findIndex", "findLast", "findLastIndex", "flat",
    "flatMap", "forEach", "includes", "indexOf", "join", "keys", "lastIndexOf", "map", "pop", "push", "reduce",
    "reduceRight", "reverse", "shift", "slice", "some", "sort", "splice", "toString", "unshift", "values",
];

const STRING_METHODS: &[&str] = &[
    "at",
    "charAt",
    "charCodeAt",
    "codePointAt",
    "concat",
    "endsWith",
    "includes",
    "indexOf",
    "lastIndexOf",
    "localeCompare",
    "padEnd",
    "padStart",
    "repeat",
    "replace",
    "replaceAll",
    "slice",
    "split",
    "startsWith",
    "substr",
    "substring",
    "toLowerCase",
    "toString",
    "toUpperCase",
    "trim",
    "trimEnd",
    "trimStart",
    "valueOf",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toLocaleString", "toPrecision", "toString", "valueOf"];

const BOOLEAN_METHODS: &[&str] = &["toString", "valueOf"];

const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];

const FUNCTION_METHODS: &[&str] = &["apply", "call", "toString"];

const PROMISE_METHODS: &[&str] = &["catch", "finally", "then"];

const DATE_METHODS: &[&str] = &[
    "getDate",
    "getDay",
    "getFullYear",
    "getHours",
    "getMilliseconds",
    "getMinutes",
    "getMonth",
    "getSeconds",
    "getTime",
    "getTimezoneOffset",
    "getUTCDate",
    "getUTCDay",
    "getUTCFullYear",
    "getUTCHours",
    "getUTCMilliseconds",
    "getUTCMinutes",
    "getUTCMonth",
    "getUTCSeconds",
    "toDateString",
    "toISOString",
    "toJSON",
    "toLocaleDateString",
    "toString",
    "valueOf",
];

/// The frozen intrinsic tables. Obtain the process-wide instance with [`lockdown`].
#[derive(Debug)]
pub struct Intrinsics {
    globals: IndexMap<&'static str, Global>,
    members: AHashMap<Intrinsic, IndexMap<&'static str, Member>>,
    methods: AHashMap<ReceiverKind, AHashSet<&'static str>>,
}

static INTRINSICS: OnceLock<Intrinsics> = OnceLock::new();

/// Hardens the intrinsic environment. Process-wide and idempotent.
///
/// The first call builds and freezes the tables; every later call returns the same instance.
pub fn lockdown() -> &'static Intrinsics {
    INTRINSICS.get_or_init(|| {
        let intrinsics = Intrinsics::build();
        tracing::debug!(globals = intrinsics.globals.len(), "intrinsics locked down");
        intrinsics
    })
}

/// Whether [`lockdown`] has run in this process.
pub fn is_locked_down() -> bool {
    INTRINSICS.get().is_some()
}

impl Intrinsics {
    fn build() -> Self {
        let mut globals = IndexMap::new();
        for name in DENIED_GLOBALS {
            globals.insert(name, Global::Denied);
        }
        globals.insert("undefined", Global::Undefined);
        globals.insert("NaN", Global::Number(f64::NAN));
        globals.insert("Infinity", Global::Number(f64::INFINITY));
        for f in [GlobalFn::ParseInt, GlobalFn::ParseFloat, GlobalFn::IsNaN, GlobalFn::IsFinite] {
            globals.insert(f.into(), Global::Builtin(Builtin::Global(f)));
        }
        for intrinsic in [
            Intrinsic::Console,
            Intrinsic::Math,
            Intrinsic::Json,
            Intrinsic::Object,
            Intrinsic::Array,
            Intrinsic::Number,
            Intrinsic::String,
            Intrinsic::Boolean,
            Intrinsic::Promise,
            Intrinsic::Date,
            Intrinsic::Error,
            Intrinsic::TypeError,
            Intrinsic::RangeError,
        ] {
            globals.insert(intrinsic.name(), Global::Intrinsic(intrinsic));
        }

        let mut members = AHashMap::new();
        members.insert(
            Intrinsic::Console,
            namespace(
                [ConsoleFn::Log, ConsoleFn::Info, ConsoleFn::Warn, ConsoleFn::Error, ConsoleFn::Debug]
                    .map(Builtin::Console),
            ),
        );

        let mut math = namespace(
            [
                MathFn::Abs,
                MathFn::Floor,
                MathFn::Ceil,
                MathFn::Round,
                MathFn::Trunc,
                MathFn::Sign,
                MathFn::Sqrt,
                MathFn::Cbrt,
                MathFn::Pow,
                MathFn::Exp,
                MathFn::Log,
                MathFn::Log2,
                MathFn::Log10,
                MathFn::Sin,
                MathFn::Cos,
                MathFn::Tan,
                MathFn::Asin,
                MathFn::Acos,
                MathFn::Atan,
                MathFn::Atan2,
                MathFn::Min,
                MathFn::Max,
                MathFn::Hypot,
                MathFn::Random,
            ]
            .map(Builtin::Math),
        );
        for (name, value) in [
            ("PI", std::f64::consts::PI),
            ("E", std::f64::consts::E),
            ("LN2", std::f64::consts::LN_2),
            ("LN10", std::f64::consts::LN_10),
            ("LOG2E", std::f64::consts::LOG2_E),
            ("LOG10E", std::f64::consts::LOG10_E),
            ("SQRT2", std::f64::consts::SQRT_2),
            ("SQRT1_2", std::f64::consts::FRAC_1_SQRT_2),
        ] {
            math.insert(name, Member::Number(value));
        }
        members.insert(Intrinsic::Math, math);

        members.insert(Intrinsic::Json, namespace([JsonFn::Stringify, JsonFn::Parse].map(Builtin::Json)));
        members.insert(
            Intrinsic::Object,
            namespace(
                [
                    ObjectFn::Keys,
                    ObjectFn::Values,
                    ObjectFn::Entries,
                    ObjectFn::Assign,
                    ObjectFn::Freeze,
                    ObjectFn::IsFrozen,
                    ObjectFn::FromEntries,
                ]
                .map(Builtin::Object),
            ),
        );
        members.insert(
            Intrinsic::Array,
            namespace([ArrayFn::IsArray, ArrayFn::From, ArrayFn::Of].map(Builtin::Array)),
        );

        let mut number = namespace(
            [NumberFn::IsInteger, NumberFn::IsSafeInteger, NumberFn::IsFinite, NumberFn::IsNaN].map(Builtin::Number),
        );
        number.insert("parseInt", Member::Builtin(Builtin::Global(GlobalFn::ParseInt)));
        number.insert("parseFloat", Member::Builtin(Builtin::Global(GlobalFn::ParseFloat)));
        for (name, value) in [
            ("MAX_SAFE_INTEGER", 9_007_199_254_740_991.0),
            ("MIN_SAFE_INTEGER", -9_007_199_254_740_991.0),
            ("MAX_VALUE", f64::MAX),
            ("MIN_VALUE", 5e-324),
            ("EPSILON", f64::EPSILON),
            ("POSITIVE_INFINITY", f64::INFINITY),
            ("NEGATIVE_INFINITY", f64::NEG_INFINITY),
            ("NaN", f64::NAN),
        ] {
            number.insert(name, Member::Number(value));
        }
        members.insert(Intrinsic::Number, number);

        members.insert(Intrinsic::String, namespace([StringFn::FromCharCode].map(Builtin::String)));
        members.insert(
            Intrinsic::Promise,
            namespace(
                [PromiseFn::Resolve, PromiseFn::Reject, PromiseFn::All, PromiseFn::AllSettled].map(Builtin::Promise),
            ),
        );
        members.insert(Intrinsic::Date, namespace([DateFn::Now, DateFn::Parse].map(Builtin::Date)));
        for intrinsic in [Intrinsic::Boolean, Intrinsic::Error, Intrinsic::TypeError, Intrinsic::RangeError] {
            members.insert(intrinsic, IndexMap::new());
        }

        let methods = [
            (ReceiverKind::Array, ARRAY_METHODS),
            (ReceiverKind::String, STRING_METHODS),
            (ReceiverKind::Number, NUMBER_METHODS),
            (ReceiverKind::Boolean, BOOLEAN_METHODS),
            (ReceiverKind::Object, OBJECT_METHODS),
            (ReceiverKind::Function, FUNCTION_METHODS),
            (ReceiverKind::Promise, PROMISE_METHODS),
            (ReceiverKind::Date, DATE_METHODS),
        ]
        .into_iter()
        .map(|(kind, names)| (kind, names.iter().copied().collect()))
        .collect();

        Self {
            globals,
            members,
            methods,
        }
    }

    pub(crate) fn global(&self, name: &str) -> Option<Global> {
        self.globals.get(name).copied()
    }

    pub(crate) fn member(&self, intrinsic: Intrinsic, name: &str) -> Option<Member> {
        self.members.get(&intrinsic).and_then(|m| m.get(name)).copied()
    }

    pub(crate) fn has_method(&self, kind: ReceiverKind, name: &str) -> bool {
        self.methods.get(&kind).is_some_and(|m| m.contains(name))
    }

    /// Every global name visible to snippets, in declaration order.
    pub fn global_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.globals.keys().copied()
    }

    /// Whether `name` is a deny-listed capability.
    #[must_use]
    pub fn is_denied(&self, name: &str) -> bool {
        matches!(self.globals.get(name), Some(Global::Denied))
    }

    /// Member names of a global namespace such as `"Math"`, or `None` if `name` is not one.
    #[must_use]
    pub fn namespace_members(&self, name: &str) -> Option<Vec<&'static str>> {
        match self.global(name)? {
            Global::Intrinsic(intrinsic) => Some(self.members.get(&intrinsic)?.keys().copied().collect()),
            _ => None,
        }
    }
}

fn namespace<const N: usize>(functions: [Builtin; N]) -> IndexMap<&'static str, Member> {
    functions.into_iter().map(|f| (f.name(), Member::Builtin(f))).collect()
}
