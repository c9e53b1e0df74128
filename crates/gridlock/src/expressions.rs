//! Syntax tree for the snippet language.
//!
//! The parser produces these nodes once per snippet; the evaluator walks them directly.
//! Function bodies are shared through `Rc` so closures created in loops do not clone syntax.

use std::rc::Rc;

use crate::exception::CodeLoc;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
}

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    // `+`
    Add,
    // `-`
    Sub,
    // `*`
    Mult,
    // `/`
    Div,
    // `%`
    Mod,
    // `**`
    Pow,
    // `<<`
    LShift,
    // `>>`
    RShift,
    // `>>>`
    URShift,
    // `|`
    BitOr,
    // `^`
    BitXor,
    // `&`
    BitAnd,
}

/// Defined separately since these operators always produce a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOperator {
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    InstanceOf,
}

/// Short-circuiting operators: `&&`, `||` and `??`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOp {
    Increment,
    Decrement,
}

/// Property key in an object literal or object pattern.
#[derive(Debug, Clone)]
pub(crate) enum PropKey {
    Static(Rc<str>),
    Computed(Box<ExprLoc>),
}

#[derive(Debug, Clone)]
pub(crate) enum MemberKey {
    Name(Rc<str>),
    Computed(Box<ExprLoc>),
}

#[derive(Debug, Clone)]
pub(crate) enum ArrayItem {
    Item(ExprLoc),
    Spread(ExprLoc),
    /// Elision, as in `[1, , 3]`.
    Hole,
}

#[derive(Debug, Clone)]
pub(crate) enum ObjectItem {
    Prop { key: PropKey, value: ExprLoc },
    Spread(ExprLoc),
    /// `{ a = 1 }`; only valid once the literal is reinterpreted as a destructuring target.
    ShorthandDefault { name: Rc<str>, default: ExprLoc },
}

#[derive(Debug, Clone)]
pub(crate) enum Argument {
    Positional(ExprLoc),
    Spread(ExprLoc),
}

#[derive(Debug, Clone)]
pub(crate) enum TemplatePart {
    Text(Rc<str>),
    Expr(ExprLoc),
}

/// Binding or assignment target.
///
/// Declarations and parameters only ever contain `Name` leaves; plain assignment expressions
/// may also target members, as in `[a.x, b[0]] = pair`.
#[derive(Debug, Clone)]
pub(crate) enum Pattern {
    Name(Rc<str>),
    Member(Box<ExprLoc>),
    Array {
        items: Vec<Option<PatternItem>>,
        rest: Option<Box<Pattern>>,
    },
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Rc<str>>,
    },
}

impl Pattern {
    /// Collects every name this pattern binds, in source order.
    pub(crate) fn bound_names(&self, out: &mut Vec<Rc<str>>) {
        match self {
            Self::Name(name) => out.push(name.clone()),
            Self::Member(_) => {}
            Self::Array { items, rest } => {
                for item in items.iter().flatten() {
                    item.target.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
            }
            Self::Object { props, rest } => {
                for prop in props {
                    prop.target.bound_names(out);
                }
                if let Some(rest) = rest {
                    out.push(rest.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PatternItem {
    pub target: Pattern,
    pub default: Option<ExprLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectPatternProp {
    pub key: PropKey,
    pub target: Pattern,
    pub default: Option<ExprLoc>,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Literal),
    Template(Vec<TemplatePart>),
    Name(Rc<str>),
    This,
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<FunctionDef>),
    Member {
        object: Box<ExprLoc>,
        property: MemberKey,
        /// `?.` link: evaluates to `undefined` for the whole chain if the object is nullish.
        optional: bool,
    },
    Call {
        callee: Box<ExprLoc>,
        args: Vec<Argument>,
        optional: bool,
    },
    /// Boundary of an expression chain containing at least one `?.` link.
    OptionalChain(Box<ExprLoc>),
    New {
        callee: Box<ExprLoc>,
        args: Vec<Argument>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<ExprLoc>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<ExprLoc>,
    },
    Op {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    CmpOp {
        left: Box<ExprLoc>,
        op: CmpOperator,
        right: Box<ExprLoc>,
    },
    Logical {
        left: Box<ExprLoc>,
        op: LogicalOp,
        right: Box<ExprLoc>,
    },
    Conditional {
        test: Box<ExprLoc>,
        then: Box<ExprLoc>,
        otherwise: Box<ExprLoc>,
    },
    Assign {
        target: Box<Pattern>,
        value: Box<ExprLoc>,
    },
    /// `x += 1`, `a.b *= 2`. The target is a `Name` or `Member` expression.
    OpAssign {
        target: Box<ExprLoc>,
        op: Operator,
        value: Box<ExprLoc>,
    },
    /// `x ||= y`, `x &&= y`, `x ??= y`.
    LogicalAssign {
        target: Box<ExprLoc>,
        op: LogicalOp,
        value: Box<ExprLoc>,
    },
    Sequence(Vec<ExprLoc>),
    Await(Box<ExprLoc>),
}

/// An expression with its source location.
#[derive(Debug, Clone)]
pub(crate) struct ExprLoc {
    pub loc: CodeLoc,
    pub expr: Expr,
}

impl ExprLoc {
    pub(crate) fn new(loc: CodeLoc, expr: Expr) -> Self {
        Self { loc, expr }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
pub(crate) struct Declarator {
    pub target: Pattern,
    pub init: Option<ExprLoc>,
}

/// Left side of `for (... of ...)` / `for (... in ...)`.
#[derive(Debug, Clone)]
pub(crate) struct ForBinding {
    /// `None` when the loop assigns to existing bindings, as in `for (x of xs)`.
    pub kind: Option<DeclKind>,
    pub target: Pattern,
}

#[derive(Debug, Clone)]
pub(crate) enum ForInit {
    Declare { kind: DeclKind, decls: Vec<Declarator> },
    Expr(ExprLoc),
}

#[derive(Debug, Clone)]
pub(crate) struct CatchClause {
    pub param: Option<Pattern>,
    pub body: Vec<NodeLoc>,
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchCase {
    /// `None` for the `default` clause.
    pub test: Option<ExprLoc>,
    pub body: Vec<NodeLoc>,
}

/// A statement.
#[derive(Debug, Clone)]
pub(crate) enum Node {
    Empty,
    Expr(ExprLoc),
    Declare {
        kind: DeclKind,
        decls: Vec<Declarator>,
    },
    /// Function declaration; hoisted to the top of its enclosing block.
    Function(Rc<FunctionDef>),
    Return(Option<ExprLoc>),
    If {
        test: ExprLoc,
        then: Box<NodeLoc>,
        otherwise: Option<Box<NodeLoc>>,
    },
    Block(Vec<NodeLoc>),
    For {
        init: Option<ForInit>,
        test: Option<ExprLoc>,
        update: Option<ExprLoc>,
        body: Box<NodeLoc>,
    },
    ForOf {
        binding: ForBinding,
        iterable: ExprLoc,
        body: Box<NodeLoc>,
    },
    ForIn {
        binding: ForBinding,
        object: ExprLoc,
        body: Box<NodeLoc>,
    },
    While {
        test: ExprLoc,
        body: Box<NodeLoc>,
    },
    DoWhile {
        body: Box<NodeLoc>,
        test: ExprLoc,
    },
    Break,
    Continue,
    Throw(ExprLoc),
    Try {
        block: Vec<NodeLoc>,
        catch: Option<CatchClause>,
        finally: Option<Vec<NodeLoc>>,
    },
    Switch {
        discriminant: ExprLoc,
        cases: Vec<SwitchCase>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct NodeLoc {
    pub loc: CodeLoc,
    pub node: Node,
}

#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub target: Pattern,
    pub default: Option<ExprLoc>,
}

#[derive(Debug, Clone)]
pub(crate) enum FunctionBody {
    Block(Vec<NodeLoc>),
    /// Concise arrow body: `x => x + 1`.
    Expr(ExprLoc),
}

/// A function literal, declaration or arrow, and also the top-level snippet body.
#[derive(Debug, Clone)]
pub(crate) struct FunctionDef {
    pub name: Option<Rc<str>>,
    pub params: Vec<Param>,
    pub rest: Option<Pattern>,
    pub body: FunctionBody,
    pub is_async: bool,
    /// Arrows inherit `this` from the defining scope.
    pub is_arrow: bool,
    /// Names declared with `var` anywhere in the body, excluding nested functions.
    pub var_names: Vec<Rc<str>>,
    pub loc: CodeLoc,
}
