//! Tree-walking evaluator.
//!
//! Scopes live in an arena indexed by `ScopeId`. A scope is popped when its block ends unless a
//! closure captured it, in which case it stays alive until the evaluation finishes. Captured
//! scopes always sit above their ancestors, so an ancestor is never popped from under them.

use std::rc::Rc;

use ahash::AHashMap;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    builtins::{self, array::MAX_ARRAY_LENGTH, receiver_kind},
    exception::{ExcType, RunError, RunResult},
    expressions::{
        Argument, ArrayItem, CmpOperator, DeclKind, Declarator, Expr, ExprLoc, ForBinding, ForInit, FunctionBody,
        FunctionDef, Literal, LogicalOp, MemberKey, Node, NodeLoc, ObjectItem, Operator, Pattern, PropKey, SwitchCase,
        TemplatePart, UnaryOp, UpdateOp,
    },
    host::{HostBridge, HostError, ProxyId},
    intrinsics::{BLOCKED_PROPERTIES, Global, Intrinsic, Intrinsics, Member},
    io::ConsoleWriter,
    object::Object,
    resource::ResourceTracker,
    value::{BoundMethod, Closure, ObjectClass, Settled, Value, array_index},
};

pub(crate) type ArgVec = SmallVec<[Value; 4]>;

/// Index of a scope in the interpreter's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Binding {
    value: Value,
    mutable: bool,
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    bindings: AHashMap<Rc<str>, Binding>,
    captured: bool,
    /// Set on non-arrow function scopes; arrows and blocks inherit from their parent.
    this: Option<Value>,
}

/// How a destructuring pattern writes its leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindMode {
    /// `let`/`const`/parameters: create a binding in the current scope.
    Declare { mutable: bool },
    /// `var` and plain assignment: write to the nearest existing binding.
    Assign,
}

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub(crate) struct Interpreter<'a> {
    scopes: Vec<Scope>,
    current: ScopeId,
    intrinsics: &'static Intrinsics,
    host: &'a mut dyn HostBridge,
    tracker: &'a mut dyn ResourceTracker,
    pub(crate) console: &'a mut dyn ConsoleWriter,
    call_depth: usize,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(
        intrinsics: &'static Intrinsics,
        host: &'a mut dyn HostBridge,
        tracker: &'a mut dyn ResourceTracker,
        console: &'a mut dyn ConsoleWriter,
    ) -> Self {
        let root = Scope {
            parent: None,
            bindings: AHashMap::new(),
            captured: true,
            this: Some(Value::Undefined),
        };
        Self {
            scopes: vec![root],
            current: ScopeId(0),
            intrinsics,
            host,
            tracker,
            console,
            call_depth: 0,
        }
    }

    /// Runs the top-level snippet body with `inputs` bound as frozen constants.
    pub(crate) fn run_main(&mut self, main: &Rc<FunctionDef>, inputs: Vec<(Rc<str>, Value)>) -> RunResult<Value> {
        for (name, value) in inputs {
            deep_freeze(&value, 0);
            self.scopes[0].bindings.insert(name, Binding { value, mutable: false });
        }
        let closure = Rc::new(Closure {
            def: main.clone(),
            scope: ScopeId(0),
        });
        self.invoke(&closure, Value::Undefined, &[])
    }

    // ---- scopes ----

    fn push_scope(&mut self, parent: ScopeId, this: Option<Value>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            bindings: AHashMap::new(),
            captured: false,
            this,
        });
        id
    }

    fn pop_scope(&mut self, id: ScopeId) {
        if id.index() + 1 == self.scopes.len() && !self.scopes[id.index()].captured {
            self.scopes.pop();
        }
    }

    /// Runs `f` inside a fresh child scope of the current one.
    fn with_scope<T>(&mut self, this: Option<Value>, f: impl FnOnce(&mut Self) -> RunResult<T>) -> RunResult<T> {
        let parent = self.current;
        let scope = self.push_scope(parent, this);
        self.current = scope;
        let result = f(self);
        self.current = parent;
        self.pop_scope(scope);
        result
    }

    fn declare(&mut self, name: &Rc<str>, value: Value, mutable: bool) -> RunResult<()> {
        let scope = &mut self.scopes[self.current.index()];
        if scope.bindings.contains_key(name) {
            return Err(RunError::exc(
                ExcType::SyntaxError,
                format!("Identifier '{name}' has already been declared"),
            ));
        }
        scope.bindings.insert(name.clone(), Binding { value, mutable });
        Ok(())
    }

    /// Declares or overwrites, for `var` hoisting and function declarations.
    fn declare_var(&mut self, name: &Rc<str>, value: Option<Value>) {
        let scope = &mut self.scopes[self.current.index()];
        match scope.bindings.get_mut(name) {
            Some(binding) => {
                if let Some(value) = value {
                    binding.value = value;
                }
            }
            None => {
                let binding = Binding {
                    value: value.unwrap_or(Value::Undefined),
                    mutable: true,
                };
                scope.bindings.insert(name.clone(), binding);
            }
        }
    }

    fn find_binding(&self, name: &str) -> Option<(ScopeId, &Binding)> {
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id.index()];
            if let Some(binding) = scope.bindings.get(name) {
                return Some((scope_id, binding));
            }
            id = scope.parent;
        }
        None
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some((_, binding)) = self.find_binding(name) {
            return Some(binding.value.clone());
        }
        Some(match self.intrinsics.global(name)? {
            Global::Denied | Global::Undefined => Value::Undefined,
            Global::Number(n) => Value::Number(n),
            Global::Intrinsic(i) => Value::Intrinsic(i),
            Global::Builtin(b) => Value::Builtin(b),
        })
    }

    fn assign_name(&mut self, name: &Rc<str>, value: Value) -> RunResult<()> {
        let Some((scope_id, binding)) = self.find_binding(name) else {
            if self.intrinsics.global(name).is_some() {
                return Err(RunError::type_error(format!("Cannot assign to read only global '{name}'")));
            }
            return Err(RunError::reference_error(name));
        };
        if !binding.mutable {
            return Err(RunError::type_error("Assignment to constant variable."));
        }
        if let Some(binding) = self.scopes[scope_id.index()].bindings.get_mut(name) {
            binding.value = value;
        }
        Ok(())
    }

    fn this_value(&self) -> Value {
        let mut id = Some(self.current);
        while let Some(scope_id) = id {
            let scope = &self.scopes[scope_id.index()];
            if let Some(this) = &scope.this {
                return this.clone();
            }
            id = scope.parent;
        }
        Value::Undefined
    }

    // ---- calls ----

    /// Calls any callable value.
    pub(crate) fn call_value(&mut self, function: &Value, this: Value, args: &[Value]) -> RunResult<Value> {
        match function {
            Value::Function(closure) => self.call_closure(closure, this, args),
            Value::Builtin(builtin) => builtins::call_builtin(self, *builtin, args),
            Value::Intrinsic(intrinsic) if intrinsic.is_callable() => {
                builtins::call_intrinsic(self, *intrinsic, args, false)
            }
            Value::Method(method) => builtins::call_method(self, &method.receiver, &method.name, args),
            Value::HostMethod(proxy, name) => self.host_call(*proxy, name, args),
            Value::Resolver { slot, reject } => {
                let mut state = slot.0.borrow_mut();
                if state.is_none() {
                    let value = builtins::arg(args, 0);
                    *state = Some(if *reject {
                        Settled::Rejected(value)
                    } else {
                        builtins::promise::adopt(value)
                    });
                }
                Ok(Value::Undefined)
            }
            other => Err(RunError::type_error(format!("{} is not a function", other.inspect()))),
        }
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, this: Value, args: &[Value]) -> RunResult<Value> {
        self.tracker.check_recursion_depth(self.call_depth)?;
        self.call_depth += 1;
        let result = self.invoke(closure, this, args);
        self.call_depth -= 1;
        if closure.def.is_async {
            return builtins::promise::settle(result);
        }
        result
    }

    fn invoke(&mut self, closure: &Rc<Closure>, this: Value, args: &[Value]) -> RunResult<Value> {
        let def = closure.def.clone();
        let saved = self.current;
        let this = (!def.is_arrow).then_some(this);
        let scope = self.push_scope(closure.scope, this);
        self.current = scope;
        let result = self.invoke_body(closure, &def, args);
        self.current = saved;
        self.pop_scope(scope);
        result
    }

    fn invoke_body(&mut self, closure: &Rc<Closure>, def: &FunctionDef, args: &[Value]) -> RunResult<Value> {
        if !def.is_arrow
            && let Some(name) = &def.name
        {
            self.declare_var(name, Some(Value::Function(closure.clone())));
        }
        for name in &def.var_names {
            self.declare_var(name, None);
        }
        for (i, param) in def.params.iter().enumerate() {
            let mut value = args.get(i).cloned().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined)
                && let Some(default) = &param.default
            {
                value = self.eval(default)?;
            }
            self.bind_param(&param.target, value)?;
        }
        if let Some(rest) = &def.rest {
            let rest_values = args.get(def.params.len()..).unwrap_or_default().to_vec();
            self.bind_param(rest, Value::array(rest_values))?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval(expr),
            FunctionBody::Block(body) => {
                self.hoist_functions(body);
                match self.exec_statements(body)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// Parameters may repeat a name bound by the function itself, so they overwrite.
    fn bind_param(&mut self, target: &Pattern, value: Value) -> RunResult<()> {
        match target {
            Pattern::Name(name) => {
                self.declare_var(name, Some(value));
                Ok(())
            }
            other => self.bind_pattern(other, value, BindMode::Declare { mutable: true }),
        }
    }

    fn make_closure(&mut self, def: &Rc<FunctionDef>) -> Value {
        self.scopes[self.current.index()].captured = true;
        Value::Function(Rc::new(Closure {
            def: def.clone(),
            scope: self.current,
        }))
    }

    fn construct(&mut self, callee: &ExprLoc, function: &Value, args: &[Value]) -> RunResult<Value> {
        match function {
            Value::Intrinsic(intrinsic) if intrinsic.is_callable() => {
                builtins::call_intrinsic(self, *intrinsic, args, true)
            }
            Value::Function(closure) if !closure.def.is_arrow && !closure.def.is_async => {
                let instance = Value::object(IndexMap::new());
                let result = self.call_closure(closure, instance.clone(), args)?;
                Ok(match result {
                    Value::Object(_) | Value::Array(_) => result,
                    _ => instance,
                })
            }
            _ => Err(RunError::type_error(format!("{} is not a constructor", describe(callee)))),
        }
    }

    fn host_call(&mut self, proxy: ProxyId, method: &str, args: &[Value]) -> RunResult<Value> {
        let args = args.iter().map(Object::from_value).collect();
        match self.host.call(proxy, method, args) {
            Ok(result) => Ok(result.into_value()),
            Err(err) => Err(host_error(&err)),
        }
    }

    // ---- members ----

    /// Reads `object[key]`.
    pub(crate) fn get_member(&mut self, object: &Value, key: &Rc<str>) -> RunResult<Value> {
        if BLOCKED_PROPERTIES.contains(&&**key) {
            if object.is_nullish() {
                return Err(read_of_nullish(object, key));
            }
            return Ok(Value::Undefined);
        }
        let value = match object {
            Value::Undefined | Value::Null => return Err(read_of_nullish(object, key)),
            Value::Array(arr) => {
                if &**key == "length" {
                    return Ok(Value::Number(arr.borrow().items.len() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(arr.borrow().items.get(i).cloned().unwrap_or(Value::Undefined));
                }
                None
            }
            Value::String(s) => {
                if &**key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(s.chars().nth(i).map_or(Value::Undefined, |c| Value::from(c.to_string())));
                }
                None
            }
            Value::Object(obj) => obj.borrow().props.get(key).cloned(),
            Value::Intrinsic(intrinsic) => {
                if &**key == "name" && intrinsic.is_callable() {
                    return Ok(Value::from(intrinsic.name()));
                }
                match self.intrinsics.member(*intrinsic, key) {
                    Some(Member::Number(n)) => Some(Value::Number(n)),
                    Some(Member::Builtin(b)) => Some(Value::Builtin(b)),
                    None => None,
                }
            }
            Value::Function(closure) => match &**key {
                "name" => Some(Value::from(closure.def.name.as_deref().unwrap_or(""))),
                "length" => Some(Value::Number(closure.def.params.len() as f64)),
                _ => None,
            },
            Value::Builtin(b) if &**key == "name" => Some(Value::from(b.name())),
            Value::Method(m) if &**key == "name" => Some(Value::String(m.name.clone())),
            Value::Proxy(proxy) => {
                if self.host.has_method(*proxy, key) {
                    return Ok(Value::HostMethod(*proxy, key.clone()));
                }
                return match self.host.get(*proxy, key) {
                    Ok(value) => Ok(value.into_value()),
                    Err(err) => Err(host_error(&err)),
                };
            }
            _ => None,
        };
        if let Some(value) = value {
            return Ok(value);
        }
        match receiver_kind(object) {
            Some(kind) if self.intrinsics.has_method(kind, key) => Ok(Value::Method(Rc::new(BoundMethod {
                receiver: object.clone(),
                name: key.clone(),
            }))),
            _ => Ok(Value::Undefined),
        }
    }

    /// Writes `object[key] = value`.
    pub(crate) fn set_member(&mut self, object: &Value, key: &Rc<str>, value: Value) -> RunResult<()> {
        match object {
            Value::Undefined | Value::Null => Err(RunError::type_error(format!(
                "Cannot set properties of {} (setting '{key}')",
                object.to_js_string()
            ))),
            Value::Array(arr) => {
                let mut arr = arr.borrow_mut();
                if arr.frozen {
                    return Err(read_only(key));
                }
                if &**key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 || !len.is_finite() {
                        return Err(RunError::range_error("Invalid array length"));
                    }
                    self.check_array_growth(arr.items.len(), len as usize)?;
                    arr.items.resize(len as usize, Value::Undefined);
                    return Ok(());
                }
                let Some(i) = array_index(key) else {
                    return Err(RunError::type_error(format!("Cannot create property '{key}' on array")));
                };
                if i >= arr.items.len() {
                    self.check_array_growth(arr.items.len(), i.saturating_add(1))?;
                    arr.items.resize(i + 1, Value::Undefined);
                }
                arr.items[i] = value;
                Ok(())
            }
            Value::Object(obj) => {
                let mut obj = obj.borrow_mut();
                if obj.frozen {
                    return Err(read_only(key));
                }
                obj.props.insert(key.clone(), value);
                Ok(())
            }
            Value::Proxy(proxy) => self
                .host
                .set(*proxy, key, Object::from_value(&value))
                .map_err(|err| host_error(&err)),
            Value::Intrinsic(intrinsic) => Err(RunError::type_error(format!(
                "Cannot assign to read only property '{key}' of object '{}'",
                intrinsic.name()
            ))),
            other => Err(RunError::type_error(format!(
                "Cannot create property '{key}' on {} '{}'",
                other.type_of(),
                other.to_js_string()
            ))),
        }
    }

    /// Rejects growing an array from `current` to `new_len` items before the buffer is allocated.
    fn check_array_growth(&self, current: usize, new_len: usize) -> RunResult<()> {
        if new_len > MAX_ARRAY_LENGTH {
            return Err(RunError::range_error("Invalid array length"));
        }
        let extra = new_len.saturating_sub(current).saturating_mul(size_of::<Value>());
        self.check_large_result(extra)
    }

    /// Asks the resource tracker whether an allocation of `estimated_bytes` may proceed.
    pub(crate) fn check_large_result(&self, estimated_bytes: usize) -> RunResult<()> {
        self.tracker.check_large_result(estimated_bytes).map_err(RunError::from)
    }

    fn delete_member(&mut self, object: &Value, key: &Rc<str>) -> RunResult<bool> {
        match object {
            Value::Undefined | Value::Null => Err(read_of_nullish(object, key)),
            Value::Object(obj) => {
                let mut obj = obj.borrow_mut();
                if obj.frozen {
                    return Err(RunError::type_error(format!("Cannot delete property '{key}' of frozen object")));
                }
                obj.props.shift_remove(key);
                Ok(true)
            }
            Value::Array(arr) => {
                let mut arr = arr.borrow_mut();
                if arr.frozen {
                    return Err(RunError::type_error(format!("Cannot delete property '{key}' of frozen array")));
                }
                if let Some(i) = array_index(key)
                    && let Some(slot) = arr.items.get_mut(i)
                {
                    *slot = Value::Undefined;
                }
                Ok(true)
            }
            Value::Intrinsic(intrinsic) => Err(RunError::type_error(format!(
                "Cannot delete property '{key}' of {}",
                intrinsic.name()
            ))),
            _ => Ok(true),
        }
    }

    fn has_property(&mut self, object: &Value, key: &Rc<str>) -> RunResult<bool> {
        match object {
            Value::Object(obj) => Ok(obj.borrow().props.contains_key(key)),
            Value::Array(arr) => {
                Ok(&**key == "length" || array_index(key).is_some_and(|i| i < arr.borrow().items.len()))
            }
            Value::Intrinsic(intrinsic) => Ok(self.intrinsics.member(*intrinsic, key).is_some()),
            Value::Proxy(proxy) => {
                if self.host.has_method(*proxy, key) {
                    return Ok(true);
                }
                match self.host.get(*proxy, key) {
                    Ok(value) => Ok(!matches!(value, Object::Undefined)),
                    Err(HostError::PropertyNotLoaded(_)) => Ok(true),
                    Err(err) => Err(host_error(&err)),
                }
            }
            other => Err(RunError::type_error(format!(
                "Cannot use 'in' operator to search for '{key}' in {}",
                other.to_js_string()
            ))),
        }
    }

    /// Materializes an iterable for spread, destructuring, `for...of` and `Array.from`.
    pub(crate) fn iterate(&mut self, value: &Value) -> RunResult<Vec<Value>> {
        match value {
            Value::Array(arr) => Ok(arr.borrow().items.clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
            other => Err(RunError::type_error(format!("{} is not iterable", other.inspect()))),
        }
    }

    fn member_key(&mut self, key: &MemberKey) -> RunResult<Rc<str>> {
        match key {
            MemberKey::Name(name) => Ok(name.clone()),
            MemberKey::Computed(expr) => Ok(self.eval(expr)?.to_property_key()),
        }
    }

    fn prop_key(&mut self, key: &PropKey) -> RunResult<Rc<str>> {
        match key {
            PropKey::Static(name) => Ok(name.clone()),
            PropKey::Computed(expr) => Ok(self.eval(expr)?.to_property_key()),
        }
    }

    // ---- statements ----

    fn hoist_functions(&mut self, body: &[NodeLoc]) {
        for stmt in body {
            if let Node::Function(def) = &stmt.node
                && let Some(name) = &def.name
            {
                let closure = self.make_closure(def);
                self.declare_var(name, Some(closure));
            }
        }
    }

    fn exec_statements(&mut self, body: &[NodeLoc]) -> RunResult<Completion> {
        for stmt in body {
            self.tracker.check_time().map_err(|e| RunError::from(e).at(stmt.loc))?;
            let completion = self.exec(stmt).map_err(|e| e.at(stmt.loc))?;
            if !matches!(completion, Completion::Normal) {
                return Ok(completion);
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, body: &[NodeLoc]) -> RunResult<Completion> {
        self.with_scope(None, |this| {
            this.hoist_functions(body);
            this.exec_statements(body)
        })
    }

    fn exec(&mut self, stmt: &NodeLoc) -> RunResult<Completion> {
        match &stmt.node {
            Node::Empty | Node::Function(_) => {}
            Node::Expr(expr) => {
                self.eval(expr)?;
            }
            Node::Declare { kind, decls } => self.exec_declare(*kind, decls)?,
            Node::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                return Ok(Completion::Return(value));
            }
            Node::If { test, then, otherwise } => {
                if self.eval(test)?.truthy() {
                    return self.exec_nested(then);
                } else if let Some(otherwise) = otherwise {
                    return self.exec_nested(otherwise);
                }
            }
            Node::Block(body) => return self.exec_block(body),
            Node::For {
                init,
                test,
                update,
                body,
            } => return self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body),
            Node::ForOf {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                return match &iterable {
                    Value::Array(arr) => {
                        let arr = arr.clone();
                        let mut i = 0;
                        let mut next = move || {
                            let item = arr.borrow().items.get(i).cloned();
                            i += 1;
                            item
                        };
                        self.exec_for_each(binding, &mut next, body)
                    }
                    other => {
                        let mut items = self.iterate(other)?.into_iter();
                        self.exec_for_each(binding, &mut || items.next(), body)
                    }
                };
            }
            Node::ForIn { binding, object, body } => {
                let object = self.eval(object)?;
                let keys: Vec<Value> = match &object {
                    Value::Object(obj) => obj.borrow().props.keys().map(|k| Value::String(k.clone())).collect(),
                    Value::Array(arr) => (0..arr.borrow().items.len()).map(|i| Value::from(i.to_string())).collect(),
                    Value::String(s) => (0..s.chars().count()).map(|i| Value::from(i.to_string())).collect(),
                    _ => Vec::new(),
                };
                let mut keys = keys.into_iter();
                return self.exec_for_each(binding, &mut || keys.next(), body);
            }
            Node::While { test, body } => loop {
                self.tracker.check_time()?;
                if !self.eval(test)?.truthy() {
                    break;
                }
                match self.exec_nested(body)? {
                    Completion::Break => break,
                    Completion::Normal | Completion::Continue => {}
                    ret @ Completion::Return(_) => return Ok(ret),
                }
            },
            Node::DoWhile { body, test } => loop {
                self.tracker.check_time()?;
                match self.exec_nested(body)? {
                    Completion::Break => break,
                    Completion::Normal | Completion::Continue => {}
                    ret @ Completion::Return(_) => return Ok(ret),
                }
                if !self.eval(test)?.truthy() {
                    break;
                }
            },
            Node::Break => return Ok(Completion::Break),
            Node::Continue => return Ok(Completion::Continue),
            Node::Throw(expr) => {
                let value = self.eval(expr)?;
                return Err(RunError::throw(value));
            }
            Node::Try { block, catch, finally } => {
                let mut result = self.exec_block(block);
                if let (Err(RunError::Throw { value, .. }), Some(catch)) = (&result, catch) {
                    let value = value.clone();
                    result = self.with_scope(None, |this| {
                        if let Some(param) = &catch.param {
                            this.bind_pattern(param, value, BindMode::Declare { mutable: true })?;
                        }
                        this.hoist_functions(&catch.body);
                        this.exec_statements(&catch.body)
                    });
                }
                if matches!(result, Err(RunError::Uncatchable(_))) {
                    return result;
                }
                if let Some(finally) = finally {
                    let completion = self.exec_block(finally)?;
                    if !matches!(completion, Completion::Normal) {
                        return Ok(completion);
                    }
                }
                return result;
            }
            Node::Switch { discriminant, cases } => return self.exec_switch(discriminant, cases),
        }
        Ok(Completion::Normal)
    }

    /// A statement in a nested position such as a loop body; blocks get their own scope.
    fn exec_nested(&mut self, stmt: &NodeLoc) -> RunResult<Completion> {
        self.exec(stmt).map_err(|e| e.at(stmt.loc))
    }

    fn exec_declare(&mut self, kind: DeclKind, decls: &[Declarator]) -> RunResult<()> {
        for decl in decls {
            let value = match &decl.init {
                Some(init) => self.eval(init)?,
                None if kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            let mode = match kind {
                DeclKind::Var => BindMode::Assign,
                DeclKind::Let => BindMode::Declare { mutable: true },
                DeclKind::Const => BindMode::Declare { mutable: false },
            };
            self.bind_pattern(&decl.target, value, mode)?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&ExprLoc>,
        update: Option<&ExprLoc>,
        body: &NodeLoc,
    ) -> RunResult<Completion> {
        let parent = self.current;
        let scope = self.push_scope(parent, None);
        self.current = scope;
        let result = self.run_for(parent, init, test, update, body);
        let last = self.current;
        self.current = parent;
        self.pop_scope(last);
        result
    }

    fn run_for(
        &mut self,
        parent: ScopeId,
        init: Option<&ForInit>,
        test: Option<&ExprLoc>,
        update: Option<&ExprLoc>,
        body: &NodeLoc,
    ) -> RunResult<Completion> {
        let mut per_iteration = Vec::new();
        match init {
            Some(ForInit::Declare { kind, decls }) => {
                self.exec_declare(*kind, decls)?;
                if *kind != DeclKind::Var {
                    for decl in decls {
                        decl.target.bound_names(&mut per_iteration);
                    }
                }
            }
            Some(ForInit::Expr(expr)) => {
                self.eval(expr)?;
            }
            None => {}
        }
        loop {
            self.tracker.check_time()?;
            if let Some(test) = test
                && !self.eval(test)?.truthy()
            {
                break;
            }
            match self.exec_nested(body)? {
                Completion::Break => break,
                Completion::Normal | Completion::Continue => {}
                ret @ Completion::Return(_) => return Ok(ret),
            }
            if !per_iteration.is_empty() {
                self.next_iteration_scope(parent, &per_iteration);
            }
            if let Some(update) = update {
                self.eval(update)?;
            }
        }
        Ok(Completion::Normal)
    }

    /// Gives the next loop iteration its own copy of the loop's `let` bindings when a closure may
    /// still reference the current iteration's scope.
    fn next_iteration_scope(&mut self, parent: ScopeId, names: &[Rc<str>]) {
        let previous = self.current;
        if previous.index() + 1 == self.scopes.len() && !self.scopes[previous.index()].captured {
            return;
        }
        let next = self.push_scope(parent, None);
        for name in names {
            if let Some(binding) = self.scopes[previous.index()].bindings.get(name) {
                let copy = Binding {
                    value: binding.value.clone(),
                    mutable: binding.mutable,
                };
                self.scopes[next.index()].bindings.insert(name.clone(), copy);
            }
        }
        self.current = next;
    }

    fn exec_for_each(
        &mut self,
        binding: &ForBinding,
        next: &mut dyn FnMut() -> Option<Value>,
        body: &NodeLoc,
    ) -> RunResult<Completion> {
        loop {
            self.tracker.check_time()?;
            let Some(item) = next() else { break };
            let completion = match binding.kind {
                Some(DeclKind::Let | DeclKind::Const) => {
                    let mutable = binding.kind == Some(DeclKind::Let);
                    self.with_scope(None, |this| {
                        this.bind_pattern(&binding.target, item, BindMode::Declare { mutable })?;
                        this.exec_nested(body)
                    })?
                }
                Some(DeclKind::Var) | None => {
                    self.bind_pattern(&binding.target, item, BindMode::Assign)?;
                    self.exec_nested(body)?
                }
            };
            match completion {
                Completion::Break => break,
                Completion::Normal | Completion::Continue => {}
                ret @ Completion::Return(_) => return Ok(ret),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_switch(&mut self, discriminant: &ExprLoc, cases: &[SwitchCase]) -> RunResult<Completion> {
        let value = self.eval(discriminant)?;
        self.with_scope(None, |this| {
            let mut start = None;
            for (i, case) in cases.iter().enumerate() {
                if let Some(test) = &case.test
                    && this.eval(test)?.strict_equals(&value)
                {
                    start = Some(i);
                    break;
                }
            }
            let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));
            let Some(start) = start else {
                return Ok(Completion::Normal);
            };
            for case in &cases[start..] {
                this.hoist_functions(&case.body);
                match this.exec_statements(&case.body)? {
                    Completion::Normal => {}
                    Completion::Break => return Ok(Completion::Normal),
                    other => return Ok(other),
                }
            }
            Ok(Completion::Normal)
        })
    }

    // ---- patterns ----

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value, mode: BindMode) -> RunResult<()> {
        match pattern {
            Pattern::Name(name) => match mode {
                BindMode::Declare { mutable } => self.declare(name, value, mutable),
                BindMode::Assign => self.assign_name(name, value),
            },
            Pattern::Member(target) => {
                let Expr::Member { object, property, .. } = &target.expr else {
                    return Err(RunError::exc(ExcType::SyntaxError, "Invalid destructuring assignment target"));
                };
                let object = self.eval(object)?;
                let key = self.member_key(property)?;
                self.set_member(&object, &key, value)
            }
            Pattern::Array { items, rest } => {
                if value.is_nullish() {
                    return Err(RunError::type_error(format!("{} is not iterable", value.to_js_string())));
                }
                let values = self.iterate(&value)?;
                let mut values = values.into_iter();
                for item in items {
                    let next = values.next().unwrap_or(Value::Undefined);
                    let Some(item) = item else { continue };
                    let next = match (&next, &item.default) {
                        (Value::Undefined, Some(default)) => self.eval(default)?,
                        _ => next,
                    };
                    self.bind_pattern(&item.target, next, mode)?;
                }
                if let Some(rest) = rest {
                    self.bind_pattern(rest, Value::array(values.collect()), mode)?;
                }
                Ok(())
            }
            Pattern::Object { props, rest } => {
                if value.is_nullish() {
                    let shown = value.to_js_string();
                    return Err(RunError::type_error(format!("Cannot destructure '{shown}' as it is {shown}.")));
                }
                let mut used = Vec::with_capacity(props.len());
                for prop in props {
                    let key = self.prop_key(&prop.key)?;
                    let mut field = self.get_member(&value, &key)?;
                    if matches!(field, Value::Undefined)
                        && let Some(default) = &prop.default
                    {
                        field = self.eval(default)?;
                    }
                    self.bind_pattern(&prop.target, field, mode)?;
                    used.push(key);
                }
                if let Some(rest) = rest {
                    let remaining = match &value {
                        Value::Object(obj) => obj
                            .borrow()
                            .props
                            .iter()
                            .filter(|(k, _)| !used.contains(k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                        _ => IndexMap::new(),
                    };
                    self.bind_pattern(&Pattern::Name(rest.clone()), Value::object(remaining), mode)?;
                }
                Ok(())
            }
        }
    }

    // ---- expressions ----

    pub(crate) fn eval(&mut self, expr: &ExprLoc) -> RunResult<Value> {
        match &expr.expr {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::Str(s) => Value::String(s.clone()),
            }),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => out.push_str(text),
                        TemplatePart::Expr(expr) => out.push_str(&self.eval(expr)?.to_js_string()),
                    }
                }
                Ok(Value::from(out))
            }
            Expr::Name(name) => self.lookup(name).ok_or_else(|| RunError::reference_error(name)),
            Expr::This => Ok(self.this_value()),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ArrayItem::Item(expr) => values.push(self.eval(expr)?),
                        ArrayItem::Spread(expr) => {
                            let spread = self.eval(expr)?;
                            values.extend(self.iterate(&spread)?);
                        }
                        ArrayItem::Hole => values.push(Value::Undefined),
                    }
                }
                Ok(Value::array(values))
            }
            Expr::Object(items) => self.eval_object(items),
            Expr::Function(def) => Ok(self.make_closure(def)),
            Expr::Member { .. } | Expr::Call { .. } | Expr::OptionalChain(_) => {
                Ok(self.eval_chain(expr)?.unwrap_or(Value::Undefined))
            }
            Expr::New { callee, args } => {
                let function = self.eval(callee)?;
                let args = self.eval_args(args)?;
                self.construct(callee, &function, &args)
            }
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Update { op, prefix, target } => {
                let delta = match op {
                    UpdateOp::Increment => 1.0,
                    UpdateOp::Decrement => -1.0,
                };
                let mut old = 0.0;
                let new = self.modify(target, |_, current| {
                    old = current.to_number();
                    Ok(Value::Number(old + delta))
                })?;
                Ok(if *prefix { new } else { Value::Number(old) })
            }
            Expr::Op { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary_op(*op, &left, &right)
            }
            Expr::CmpOp { left, op, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::Logical { left, op, right } => {
                let left = self.eval(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit { Ok(left) } else { self.eval(right) }
            }
            Expr::Conditional { test, then, otherwise } => {
                if self.eval(test)?.truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Assign { target, value } => {
                let value = self.eval(value)?;
                self.bind_pattern(target, value.clone(), BindMode::Assign)?;
                Ok(value)
            }
            Expr::OpAssign { target, op, value } => {
                let op = *op;
                self.modify(target, |this, current| {
                    let right = this.eval(value)?;
                    binary_op(op, &current, &right)
                })
            }
            Expr::LogicalAssign { target, op, value } => {
                let current = self.eval(target)?;
                let keep = match op {
                    LogicalOp::And => !current.truthy(),
                    LogicalOp::Or => current.truthy(),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.modify(target, |this, _| this.eval(value))
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr)?;
                }
                Ok(last)
            }
            Expr::Await(operand) => {
                let value = self.eval(operand)?;
                match value {
                    Value::Promise(settled) => match &*settled {
                        Settled::Fulfilled(value) => Ok(value.clone()),
                        Settled::Rejected(reason) => Err(RunError::throw(reason.clone())),
                    },
                    other => Ok(other),
                }
            }
        }
    }

    /// Evaluates a member/call chain. `None` means an optional link short-circuited.
    fn eval_chain(&mut self, expr: &ExprLoc) -> RunResult<Option<Value>> {
        match &expr.expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property)?;
                self.get_member(&object, &key).map(Some)
            }
            Expr::Call { callee, args, optional } => {
                let (function, this) = match &callee.expr {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(object) = self.eval_chain(object)? else {
                            return Ok(None);
                        };
                        if *member_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.member_key(property)?;
                        (self.get_member(&object, &key)?, object)
                    }
                    _ => {
                        let Some(function) = self.eval_chain(callee)? else {
                            return Ok(None);
                        };
                        (function, Value::Undefined)
                    }
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_args(args)?;
                if !function.is_callable() {
                    return Err(RunError::type_error(format!("{} is not a function", describe(callee))));
                }
                self.call_value(&function, this, &args).map(Some)
            }
            Expr::OptionalChain(inner) => Ok(Some(self.eval_chain(inner)?.unwrap_or(Value::Undefined))),
            _ => self.eval(expr).map(Some),
        }
    }

    fn eval_args(&mut self, args: &[Argument]) -> RunResult<ArgVec> {
        let mut values = ArgVec::new();
        for arg in args {
            match arg {
                Argument::Positional(expr) => values.push(self.eval(expr)?),
                Argument::Spread(expr) => {
                    let spread = self.eval(expr)?;
                    values.extend(self.iterate(&spread)?);
                }
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, items: &[ObjectItem]) -> RunResult<Value> {
        let mut props = IndexMap::with_capacity(items.len());
        for item in items {
            match item {
                ObjectItem::Prop { key, value } => {
                    let key = self.prop_key(key)?;
                    let value = self.eval(value)?;
                    props.insert(key, value);
                }
                ObjectItem::Spread(expr) => match self.eval(expr)? {
                    Value::Object(obj) => {
                        for (k, v) in &obj.borrow().props {
                            props.insert(k.clone(), v.clone());
                        }
                    }
                    Value::Array(arr) => {
                        for (i, v) in arr.borrow().items.iter().enumerate() {
                            props.insert(Rc::from(i.to_string()), v.clone());
                        }
                    }
                    Value::String(s) => {
                        for (i, c) in s.chars().enumerate() {
                            props.insert(Rc::from(i.to_string()), Value::from(c.to_string()));
                        }
                    }
                    _ => {}
                },
                ObjectItem::ShorthandDefault { .. } => {
                    return Err(RunError::exc(ExcType::SyntaxError, "Invalid shorthand property initializer"));
                }
            }
        }
        Ok(Value::object(props))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &ExprLoc) -> RunResult<Value> {
        match op {
            UnaryOp::TypeOf => {
                if let Expr::Name(name) = &operand.expr {
                    return Ok(Value::from(self.lookup(name).map_or("undefined", |v| v.type_of())));
                }
                Ok(Value::from(self.eval(operand)?.type_of()))
            }
            UnaryOp::Delete => match &operand.expr {
                Expr::Member { object, property, .. } => {
                    let object = self.eval(object)?;
                    let key = self.member_key(property)?;
                    self.delete_member(&object, &key).map(Value::Bool)
                }
                _ => {
                    self.eval(operand)?;
                    Ok(Value::Bool(true))
                }
            },
            _ => {
                let value = self.eval(operand)?;
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Neg => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::BitNot => Value::Number(f64::from(!value.to_int32())),
                    _ => Value::Undefined,
                })
            }
        }
    }

    /// Read-modify-write on a name or member target, evaluating the target's object and key once.
    fn modify(
        &mut self,
        target: &ExprLoc,
        f: impl FnOnce(&mut Self, Value) -> RunResult<Value>,
    ) -> RunResult<Value> {
        match &target.expr {
            Expr::Name(name) => {
                let current = self.lookup(name).ok_or_else(|| RunError::reference_error(name))?;
                let new = f(self, current)?;
                self.assign_name(name, new.clone())?;
                Ok(new)
            }
            Expr::Member { object, property, .. } => {
                let object = self.eval(object)?;
                let key = self.member_key(property)?;
                let current = self.get_member(&object, &key)?;
                let new = f(self, current)?;
                self.set_member(&object, &key, new.clone())?;
                Ok(new)
            }
            _ => Err(RunError::exc(
                ExcType::SyntaxError,
                "Invalid left-hand side in assignment",
            )),
        }
    }

    fn compare(&mut self, op: CmpOperator, left: &Value, right: &Value) -> RunResult<bool> {
        Ok(match op {
            CmpOperator::Eq => left.loose_equals(right),
            CmpOperator::NotEq => !left.loose_equals(right),
            CmpOperator::StrictEq => left.strict_equals(right),
            CmpOperator::StrictNotEq => !left.strict_equals(right),
            CmpOperator::Lt => less_than(left, right, false),
            CmpOperator::Gt => less_than(right, left, false),
            CmpOperator::LtE => less_than(right, left, true),
            CmpOperator::GtE => less_than(left, right, true),
            CmpOperator::In => self.has_property(right, &left.to_property_key())?,
            CmpOperator::InstanceOf => instance_of(left, right)?,
        })
    }
}

/// Converts a host failure into a catchable `HostError` object carrying a `code` property.
pub(crate) fn host_error(err: &HostError) -> RunError {
    let value = Value::error(ExcType::HostError, err.to_string());
    if let Value::Object(obj) = &value {
        obj.borrow_mut().props.insert(Rc::from("code"), Value::from(err.code()));
    }
    RunError::throw(value)
}

fn read_of_nullish(object: &Value, key: &str) -> RunError {
    RunError::type_error(format!(
        "Cannot read properties of {} (reading '{key}')",
        object.to_js_string()
    ))
}

fn read_only(key: &str) -> RunError {
    RunError::type_error(format!("Cannot assign to read only property '{key}' of object"))
}

/// Freezes injected values so snippets cannot mutate caller-owned constants.
fn deep_freeze(value: &Value, depth: usize) {
    if depth > crate::resource::MAX_DATA_RECURSION_DEPTH {
        return;
    }
    match value {
        Value::Array(arr) => {
            arr.borrow_mut().frozen = true;
            for item in &arr.borrow().items {
                deep_freeze(item, depth + 1);
            }
        }
        Value::Object(obj) => {
            obj.borrow_mut().frozen = true;
            for item in obj.borrow().props.values() {
                deep_freeze(item, depth + 1);
            }
        }
        _ => {}
    }
}

/// Source-like description of a callee for error messages, e.g. `range.foo`.
fn describe(expr: &ExprLoc) -> String {
    match &expr.expr {
        Expr::Name(name) => name.to_string(),
        Expr::This => "this".to_owned(),
        Expr::Member { object, property, .. } => match property {
            MemberKey::Name(name) => format!("{}.{name}", describe(object)),
            MemberKey::Computed(_) => format!("{}[...]", describe(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        Expr::OptionalChain(inner) => describe(inner),
        Expr::Literal(Literal::Str(s)) => format!("\"{s}\""),
        Expr::Literal(Literal::Number(n)) => crate::value::number_to_string(*n),
        _ => "expression".to_owned(),
    }
}

/// Primitive form used by `+` and relational comparison.
fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
        Value::Date(ms) => Value::Number(*ms),
        other => Value::from(other.to_js_string()),
    }
}

pub(crate) fn binary_op(op: Operator, left: &Value, right: &Value) -> RunResult<Value> {
    if op == Operator::Add {
        let (left, right) = match (left, right) {
            (Value::Date(_), _) | (_, Value::Date(_)) => (Value::from(left.to_js_string()), Value::from(right.to_js_string())),
            _ => (to_primitive(left), to_primitive(right)),
        };
        if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
            let mut out = left.to_js_string();
            out.push_str(&right.to_js_string());
            return Ok(Value::from(out));
        }
        return Ok(Value::Number(left.to_number() + right.to_number()));
    }
    let a = left.to_number();
    let b = right.to_number();
    Ok(Value::Number(match op {
        Operator::Add | Operator::Sub => a - b,
        Operator::Mult => a * b,
        Operator::Div => a / b,
        Operator::Mod => a % b,
        Operator::Pow => {
            if b.is_nan() || (a.abs() == 1.0 && b.is_infinite()) {
                f64::NAN
            } else {
                a.powf(b)
            }
        }
        Operator::LShift => f64::from(left.to_int32().wrapping_shl(right.to_int32() as u32 & 31)),
        Operator::RShift => f64::from(left.to_int32() >> (right.to_int32() as u32 & 31)),
        Operator::URShift => f64::from((left.to_int32() as u32) >> (right.to_int32() as u32 & 31)),
        Operator::BitOr => f64::from(left.to_int32() | right.to_int32()),
        Operator::BitXor => f64::from(left.to_int32() ^ right.to_int32()),
        Operator::BitAnd => f64::from(left.to_int32() & right.to_int32()),
    }))
}

/// `left < right`, or `!(left < right)` when `negate` is set (NaN still compares false).
fn less_than(left: &Value, right: &Value, negate: bool) -> bool {
    let (left, right) = (to_primitive(left), to_primitive(right));
    if let (Value::String(a), Value::String(b)) = (&left, &right) {
        return if negate { a >= b } else { a < b };
    }
    let (a, b) = (left.to_number(), right.to_number());
    if a.is_nan() || b.is_nan() {
        return false;
    }
    if negate { a >= b } else { a < b }
}

fn instance_of(left: &Value, right: &Value) -> RunResult<bool> {
    let Value::Intrinsic(intrinsic) = right else {
        if right.is_callable() {
            return Ok(false);
        }
        return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
    };
    let error_class = match left {
        Value::Object(obj) => match obj.borrow().class {
            ObjectClass::Error(class) => Some(class),
            ObjectClass::Plain => None,
        },
        _ => None,
    };
    Ok(match intrinsic {
        Intrinsic::Array => matches!(left, Value::Array(_)),
        Intrinsic::Object => !matches!(
            left,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        ),
        Intrinsic::Date => matches!(left, Value::Date(_)),
        Intrinsic::Promise => matches!(left, Value::Promise(_)),
        Intrinsic::Error => error_class.is_some(),
        Intrinsic::TypeError => error_class == Some(ExcType::TypeError),
        Intrinsic::RangeError => error_class == Some(ExcType::RangeError),
        Intrinsic::Number | Intrinsic::String | Intrinsic::Boolean => false,
        Intrinsic::Console | Intrinsic::Math | Intrinsic::Json => {
            return Err(RunError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
    })
}
