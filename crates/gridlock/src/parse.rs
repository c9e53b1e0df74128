use std::rc::Rc;

use crate::{
    exception::{CodeLoc, ExcType, Exception},
    expressions::{
        Argument, ArrayItem, CatchClause, CmpOperator, DeclKind, Declarator, Expr, ExprLoc, ForBinding, ForInit,
        FunctionBody, FunctionDef, Literal, LogicalOp, MemberKey, Node, NodeLoc, ObjectItem, ObjectPatternProp,
        Operator, Param, Pattern, PatternItem, PropKey, SwitchCase, TemplatePart, UnaryOp, UpdateOp,
    },
    lexer::{Keyword, Punct, TemplateChunk, Token, TokenKind, tokenize},
    value::number_to_string,
};

/// Maximum nesting depth for statements and expressions during parsing.
///
/// Both the parser and the evaluator recurse once per nesting level, so this bounds native stack
/// use for inputs like `((((((x))))))` or thousands of nested blocks.
#[cfg(not(debug_assertions))]
pub const MAX_NESTING_DEPTH: u16 = 200;
/// In debug builds stack frames are much larger, so the limit is lower.
#[cfg(debug_assertions)]
pub const MAX_NESTING_DEPTH: u16 = 64;

/// Parses a snippet into the body of an implicit async function.
///
/// Top-level `return` and `await` are legal. Every failure is a `SyntaxError` with a location.
pub(crate) fn parse(code: &str) -> Result<Rc<FunctionDef>, Exception> {
    let tokens = tokenize(code)?;
    let mut parser = Parser::new(tokens, MAX_NESTING_DEPTH);
    parser.var_scopes.push(Vec::new());
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_statement()?);
    }
    parser.check_cover_defaults()?;
    let var_names = parser.var_scopes.pop().unwrap_or_default();
    Ok(Rc::new(FunctionDef {
        name: None,
        params: Vec::new(),
        rest: None,
        body: FunctionBody::Block(body),
        is_async: true,
        is_arrow: false,
        var_names,
        loc: CodeLoc { line: 1, column: 1 },
    }))
}

/// Binary operator classes recognized by the precedence climber.
#[derive(Debug, Clone, Copy)]
enum BinaryKind {
    Op(Operator),
    Cmp(CmpOperator),
    Logical(LogicalOp),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Starts at `MAX_NESTING_DEPTH` and decrements on each nested level.
    depth_remaining: u16,
    /// Set while parsing a `for` head, where a bare `in` ends the initializer.
    no_in: bool,
    /// One entry per enclosing function; collects `var` names for hoisting.
    var_scopes: Vec<Vec<Rc<str>>>,
    /// Locations of `{ a = 1 }` shorthands not yet consumed by a destructuring target.
    cover_defaults: Vec<CodeLoc>,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth_remaining: u16) -> Self {
        Self {
            tokens,
            pos: 0,
            depth_remaining,
            no_in: false,
            var_scopes: Vec::new(),
            cover_defaults: Vec::new(),
        }
    }

    // token helpers

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn loc(&self) -> CodeLoc {
        self.peek().loc
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    /// Consumes the current token. The final `Eof` is never consumed.
    fn advance(&mut self) -> Token {
        if self.pos >= self.tokens.len() - 1 {
            return self.peek().clone();
        }
        let token = &mut self.tokens[self.pos];
        let taken = Token {
            kind: std::mem::replace(&mut token.kind, TokenKind::Eof),
            loc: token.loc,
            newline_before: token.newline_before,
        };
        self.pos += 1;
        taken
    }

    fn is_punct(&self, punct: Punct) -> bool {
        matches!(self.peek_kind(), TokenKind::Punct(p) if *p == punct)
    }

    fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == keyword)
    }

    fn is_ident(&self, text: &str) -> bool {
        matches!(self.peek_kind(), TokenKind::Ident(name) if &**name == text)
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        let found = self.is_punct(punct);
        if found {
            self.advance();
        }
        found
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        let found = self.is_keyword(keyword);
        if found {
            self.advance();
        }
        found
    }

    fn expect_punct(&mut self, punct: Punct) -> Result<CodeLoc, Exception> {
        if self.is_punct(punct) {
            Ok(self.advance().loc)
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_ident(&mut self) -> Result<Rc<str>, Exception> {
        match self.peek_kind() {
            TokenKind::Ident(_) => match self.advance().kind {
                TokenKind::Ident(name) => Ok(name),
                _ => Err(self.unexpected()),
            },
            _ => Err(self.unexpected()),
        }
    }

    fn error_at(loc: CodeLoc, message: impl Into<String>) -> Exception {
        Exception::new(ExcType::SyntaxError, message).with_loc(loc)
    }

    fn unexpected(&self) -> Exception {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Eof => "Unexpected end of input".to_owned(),
            other => format!("Unexpected {}", other.describe()),
        };
        Self::error_at(token.loc, message)
    }

    /// Automatic semicolon insertion: a statement may end at `;`, before `}`, at end of input,
    /// or at a line break.
    fn consume_semicolon(&mut self) -> Result<(), Exception> {
        if self.eat_punct(Punct::Semi) || self.is_punct(Punct::RBrace) || self.at_eof() || self.peek().newline_before {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn enter(&mut self) -> Result<(), Exception> {
        if self.depth_remaining == 0 {
            return Err(Self::error_at(self.loc(), "Too many nested statements or expressions"));
        }
        self.depth_remaining -= 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth_remaining += 1;
    }

    /// Runs `f` with `in` re-enabled as a binary operator, restoring the previous mode after.
    fn with_in<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, Exception>) -> Result<T, Exception> {
        let saved = std::mem::replace(&mut self.no_in, false);
        let result = f(self);
        self.no_in = saved;
        result
    }

    fn check_cover_defaults(&self) -> Result<(), Exception> {
        match self.cover_defaults.first() {
            Some(loc) => Err(Self::error_at(*loc, "Invalid shorthand property initializer")),
            None => Ok(()),
        }
    }

    // statements

    fn parse_statement(&mut self) -> Result<NodeLoc, Exception> {
        self.enter()?;
        let result = self.parse_statement_impl();
        self.leave();
        result
    }

    fn parse_statement_impl(&mut self) -> Result<NodeLoc, Exception> {
        let loc = self.loc();
        let node = match self.peek_kind().clone() {
            TokenKind::Punct(Punct::LBrace) => Node::Block(self.parse_block()?),
            TokenKind::Punct(Punct::Semi) => {
                self.advance();
                Node::Empty
            }
            TokenKind::Keyword(kw @ (Keyword::Var | Keyword::Let | Keyword::Const)) => {
                self.advance();
                let kind = decl_kind(kw);
                let decls = self.parse_declarations(kind)?;
                self.consume_semicolon()?;
                Node::Declare { kind, decls }
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                Node::Function(self.parse_function_rest(false, loc, true)?)
            }
            TokenKind::Ident(name) if &*name == "async" && self.async_function_follows() => {
                self.advance();
                self.advance();
                Node::Function(self.parse_function_rest(true, loc, true)?)
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if()?,
            TokenKind::Keyword(Keyword::For) => self.parse_for()?,
            TokenKind::Keyword(Keyword::While) => {
                self.advance();
                let test = self.parse_paren_expression()?;
                let body = Box::new(self.parse_statement()?);
                Node::While { test, body }
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                if !self.eat_keyword(Keyword::While) {
                    return Err(self.unexpected());
                }
                let test = self.parse_paren_expression()?;
                self.eat_punct(Punct::Semi);
                Node::DoWhile { body, test }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                let value = if self.is_punct(Punct::Semi)
                    || self.is_punct(Punct::RBrace)
                    || self.at_eof()
                    || self.peek().newline_before
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon()?;
                Node::Return(value)
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                self.consume_semicolon()?;
                Node::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                self.consume_semicolon()?;
                Node::Continue
            }
            TokenKind::Keyword(Keyword::Throw) => {
                self.advance();
                if self.peek().newline_before {
                    return Err(Self::error_at(self.loc(), "Illegal newline after throw"));
                }
                let value = self.parse_expression()?;
                self.consume_semicolon()?;
                Node::Throw(value)
            }
            TokenKind::Keyword(Keyword::Try) => self.parse_try()?,
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch()?,
            TokenKind::Keyword(Keyword::Debugger) => {
                self.advance();
                self.consume_semicolon()?;
                Node::Empty
            }
            TokenKind::Keyword(Keyword::Class) => {
                return Err(Self::error_at(loc, "Class declarations are not supported"));
            }
            TokenKind::Keyword(Keyword::Import | Keyword::Export) => {
                return Err(Self::error_at(loc, "Cannot use import or export in a snippet"));
            }
            TokenKind::Keyword(Keyword::With) => {
                return Err(Self::error_at(loc, "with statements are not supported"));
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon()?;
                Node::Expr(expr)
            }
        };
        Ok(NodeLoc { loc, node })
    }

    fn async_function_follows(&self) -> bool {
        let next = self.peek_nth(1);
        matches!(next.kind, TokenKind::Keyword(Keyword::Function)) && !next.newline_before
    }

    fn parse_block(&mut self) -> Result<Vec<NodeLoc>, Exception> {
        self.expect_punct(Punct::LBrace)?;
        let mut body = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_paren_expression(&mut self) -> Result<ExprLoc, Exception> {
        self.expect_punct(Punct::LParen)?;
        let expr = self.with_in(Self::parse_expression)?;
        self.expect_punct(Punct::RParen)?;
        Ok(expr)
    }

    fn parse_declarations(&mut self, kind: DeclKind) -> Result<Vec<Declarator>, Exception> {
        let first = self.parse_binding_pattern()?;
        self.parse_declarations_from(kind, first)
    }

    /// Parses declarators after the first target has already been read.
    fn parse_declarations_from(&mut self, kind: DeclKind, first: Pattern) -> Result<Vec<Declarator>, Exception> {
        let mut decls = Vec::new();
        let mut target = first;
        loop {
            let loc = self.loc();
            let init = if self.eat_punct(Punct::Assign) {
                let mut init = self.parse_assignment()?;
                if let (Pattern::Name(name), Expr::Function(def)) = (&target, &mut init.expr)
                    && def.name.is_none()
                    && let Some(def) = Rc::get_mut(def)
                {
                    // `const f = () => ...` names the function `f`
                    def.name = Some(name.clone());
                }
                Some(init)
            } else {
                None
            };
            if init.is_none() {
                if kind == DeclKind::Const {
                    return Err(Self::error_at(loc, "Missing initializer in const declaration"));
                }
                if !matches!(target, Pattern::Name(_)) {
                    return Err(Self::error_at(loc, "Missing initializer in destructuring declaration"));
                }
            }
            self.record_vars(kind, &target);
            decls.push(Declarator { target, init });
            if !self.eat_punct(Punct::Comma) {
                return Ok(decls);
            }
            target = self.parse_binding_pattern()?;
        }
    }

    fn record_vars(&mut self, kind: DeclKind, target: &Pattern) {
        if kind == DeclKind::Var
            && let Some(scope) = self.var_scopes.last_mut()
        {
            let mut names = Vec::new();
            target.bound_names(&mut names);
            for name in names {
                if !scope.contains(&name) {
                    scope.push(name);
                }
            }
        }
    }

    fn parse_binding_pattern(&mut self) -> Result<Pattern, Exception> {
        match self.peek_kind() {
            TokenKind::Ident(_) => Ok(Pattern::Name(self.expect_ident()?)),
            TokenKind::Punct(Punct::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                let mut rest = None;
                loop {
                    if self.eat_punct(Punct::RBracket) {
                        break;
                    }
                    if self.eat_punct(Punct::Comma) {
                        items.push(None);
                        continue;
                    }
                    if self.eat_punct(Punct::Ellipsis) {
                        rest = Some(Box::new(self.parse_binding_pattern()?));
                        self.expect_punct(Punct::RBracket)?;
                        break;
                    }
                    let target = self.parse_binding_pattern()?;
                    let default = self.parse_default()?;
                    items.push(Some(PatternItem { target, default }));
                    if !self.is_punct(Punct::RBracket) {
                        self.expect_punct(Punct::Comma)?;
                    }
                }
                Ok(Pattern::Array { items, rest })
            }
            TokenKind::Punct(Punct::LBrace) => {
                self.advance();
                let mut props = Vec::new();
                let mut rest = None;
                loop {
                    if self.eat_punct(Punct::RBrace) {
                        break;
                    }
                    if self.eat_punct(Punct::Ellipsis) {
                        rest = Some(self.expect_ident()?);
                        self.expect_punct(Punct::RBrace)?;
                        break;
                    }
                    let shorthand = match self.peek_kind() {
                        TokenKind::Ident(name) => Some(name.clone()),
                        _ => None,
                    };
                    let key = self.parse_prop_key()?;
                    let target = if self.eat_punct(Punct::Colon) {
                        self.parse_binding_pattern()?
                    } else if let Some(name) = shorthand {
                        Pattern::Name(name)
                    } else {
                        return Err(self.unexpected());
                    };
                    let default = self.parse_default()?;
                    props.push(ObjectPatternProp { key, target, default });
                    if !self.is_punct(Punct::RBrace) {
                        self.expect_punct(Punct::Comma)?;
                    }
                }
                Ok(Pattern::Object { props, rest })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_default(&mut self) -> Result<Option<ExprLoc>, Exception> {
        if self.eat_punct(Punct::Assign) {
            Ok(Some(self.with_in(Self::parse_assignment)?))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> Result<Node, Exception> {
        self.advance();
        let test = self.parse_paren_expression()?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.eat_keyword(Keyword::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Node::If { test, then, otherwise })
    }

    fn parse_for(&mut self) -> Result<Node, Exception> {
        self.advance();
        if self.is_ident("await") || self.is_keyword(Keyword::Await) {
            return Err(Self::error_at(self.loc(), "for await loops are not supported"));
        }
        self.expect_punct(Punct::LParen)?;

        let init = if self.is_punct(Punct::Semi) {
            None
        } else if let TokenKind::Keyword(kw @ (Keyword::Var | Keyword::Let | Keyword::Const)) = *self.peek_kind() {
            self.advance();
            let kind = decl_kind(kw);
            let target = self.parse_binding_pattern()?;
            if let Some(node) = self.parse_for_each(Some(kind), &target)? {
                return Ok(node);
            }
            self.no_in = true;
            let decls = self.parse_declarations_from(kind, target);
            self.no_in = false;
            Some(ForInit::Declare { kind, decls: decls? })
        } else {
            self.no_in = true;
            let expr = self.parse_expression();
            self.no_in = false;
            let expr = expr?;
            if self.is_ident("of") || self.is_keyword(Keyword::In) {
                let loc = self.loc();
                let target = self.to_pattern(expr)?;
                return self
                    .parse_for_each(None, &target)?
                    .ok_or_else(|| Self::error_at(loc, "Invalid left-hand side in for loop"));
            }
            Some(ForInit::Expr(expr))
        };

        self.expect_punct(Punct::Semi)?;
        let test = if self.is_punct(Punct::Semi) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::Semi)?;
        let update = if self.is_punct(Punct::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        Ok(Node::For {
            init,
            test,
            update,
            body,
        })
    }

    /// Finishes a `for...of` / `for...in` head if one follows the binding.
    fn parse_for_each(&mut self, kind: Option<DeclKind>, target: &Pattern) -> Result<Option<Node>, Exception> {
        let is_of = self.is_ident("of");
        if !is_of && !self.is_keyword(Keyword::In) {
            return Ok(None);
        }
        self.advance();
        if let Some(kind) = kind {
            self.record_vars(kind, target);
        }
        let source = if is_of {
            self.with_in(Self::parse_assignment)?
        } else {
            self.with_in(Self::parse_expression)?
        };
        self.expect_punct(Punct::RParen)?;
        let body = Box::new(self.parse_statement()?);
        let binding = ForBinding {
            kind,
            target: target.clone(),
        };
        Ok(Some(if is_of {
            Node::ForOf {
                binding,
                iterable: source,
                body,
            }
        } else {
            Node::ForIn {
                binding,
                object: source,
                body,
            }
        }))
    }

    fn parse_try(&mut self) -> Result<Node, Exception> {
        let loc = self.advance().loc;
        let block = self.parse_block()?;
        let catch = if self.eat_keyword(Keyword::Catch) {
            let param = if self.eat_punct(Punct::LParen) {
                let param = self.parse_binding_pattern()?;
                self.expect_punct(Punct::RParen)?;
                Some(param)
            } else {
                None
            };
            Some(CatchClause {
                param,
                body: self.parse_block()?,
            })
        } else {
            None
        };
        let finally = if self.eat_keyword(Keyword::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(Self::error_at(loc, "Missing catch or finally after try"));
        }
        Ok(Node::Try { block, catch, finally })
    }

    fn parse_switch(&mut self) -> Result<Node, Exception> {
        self.advance();
        let discriminant = self.parse_paren_expression()?;
        self.expect_punct(Punct::LBrace)?;
        let mut cases = Vec::new();
        let mut seen_default = false;
        while !self.eat_punct(Punct::RBrace) {
            let loc = self.loc();
            let test = if self.eat_keyword(Keyword::Case) {
                Some(self.with_in(Self::parse_expression)?)
            } else if self.eat_keyword(Keyword::Default) {
                if seen_default {
                    return Err(Self::error_at(loc, "More than one default clause in switch statement"));
                }
                seen_default = true;
                None
            } else {
                return Err(self.unexpected());
            };
            self.expect_punct(Punct::Colon)?;
            let mut body = Vec::new();
            while !self.is_keyword(Keyword::Case) && !self.is_keyword(Keyword::Default) && !self.is_punct(Punct::RBrace) {
                if self.at_eof() {
                    return Err(self.unexpected());
                }
                body.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, body });
        }
        Ok(Node::Switch { discriminant, cases })
    }

    // functions

    /// Parses everything after `function` (or `async function`).
    fn parse_function_rest(&mut self, is_async: bool, loc: CodeLoc, require_name: bool) -> Result<Rc<FunctionDef>, Exception> {
        if self.is_punct(Punct::Star) {
            return Err(Self::error_at(self.loc(), "Generator functions are not supported"));
        }
        let name = if matches!(self.peek_kind(), TokenKind::Ident(_)) {
            Some(self.expect_ident()?)
        } else if require_name {
            return Err(self.unexpected());
        } else {
            None
        };
        self.parse_function_from_params(name, is_async, loc)
    }

    fn parse_function_from_params(
        &mut self,
        name: Option<Rc<str>>,
        is_async: bool,
        loc: CodeLoc,
    ) -> Result<Rc<FunctionDef>, Exception> {
        let (params, rest) = self.parse_params()?;
        let (body, var_names) = self.parse_function_body()?;
        Ok(Rc::new(FunctionDef {
            name,
            params,
            rest,
            body: FunctionBody::Block(body),
            is_async,
            is_arrow: false,
            var_names,
            loc,
        }))
    }

    fn parse_params(&mut self) -> Result<(Vec<Param>, Option<Pattern>), Exception> {
        self.expect_punct(Punct::LParen)?;
        self.with_in(|p| {
            let mut params = Vec::new();
            let mut rest = None;
            loop {
                if p.eat_punct(Punct::RParen) {
                    break;
                }
                if p.eat_punct(Punct::Ellipsis) {
                    rest = Some(p.parse_binding_pattern()?);
                    p.expect_punct(Punct::RParen)?;
                    break;
                }
                let target = p.parse_binding_pattern()?;
                let default = p.parse_default()?;
                params.push(Param { target, default });
                if !p.is_punct(Punct::RParen) {
                    p.expect_punct(Punct::Comma)?;
                }
            }
            Ok((params, rest))
        })
    }

    fn parse_function_body(&mut self) -> Result<(Vec<NodeLoc>, Vec<Rc<str>>), Exception> {
        self.var_scopes.push(Vec::new());
        let body = self.with_in(Self::parse_block);
        let var_names = self.var_scopes.pop().unwrap_or_default();
        Ok((body?, var_names))
    }

    /// Returns the index of the `)` matching the `(` at `start`, if any.
    fn matching_paren(&self, start: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(start) {
            match token.kind {
                TokenKind::Punct(Punct::LParen) => depth += 1,
                TokenKind::Punct(Punct::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                TokenKind::Eof => return None,
                _ => {}
            }
        }
        None
    }

    fn is_arrow_at(&self, index: usize) -> bool {
        self.tokens
            .get(index)
            .is_some_and(|t| matches!(t.kind, TokenKind::Punct(Punct::Arrow)) && !t.newline_before)
    }

    /// Detects an arrow function starting at the current token: `x =>`, `(a, b) =>`,
    /// `async x =>` or `async (a) =>`. Returns `(is_async, parenthesized)`.
    fn arrow_ahead(&self) -> Option<(bool, bool)> {
        let mut offset = 0;
        let mut is_async = false;
        if self.is_ident("async") {
            let next = self.peek_nth(1);
            if !next.newline_before
                && matches!(next.kind, TokenKind::Ident(_) | TokenKind::Punct(Punct::LParen))
            {
                is_async = true;
                offset = 1;
            }
        }
        let index = self.pos + offset;
        match self.tokens.get(index).map(|t| &t.kind) {
            Some(TokenKind::Ident(_)) if self.is_arrow_at(index + 1) => Some((is_async, false)),
            Some(TokenKind::Punct(Punct::LParen)) => {
                let close = self.matching_paren(index)?;
                self.is_arrow_at(close + 1).then_some((is_async, true))
            }
            _ => None,
        }
    }

    fn parse_arrow(&mut self, is_async: bool, parenthesized: bool) -> Result<ExprLoc, Exception> {
        let loc = self.loc();
        if is_async {
            self.advance();
        }
        let (params, rest) = if parenthesized {
            self.parse_params()?
        } else {
            let name = self.expect_ident()?;
            (
                vec![Param {
                    target: Pattern::Name(name),
                    default: None,
                }],
                None,
            )
        };
        self.expect_punct(Punct::Arrow)?;
        let (body, var_names) = if self.is_punct(Punct::LBrace) {
            let (body, var_names) = self.parse_function_body()?;
            (FunctionBody::Block(body), var_names)
        } else {
            (FunctionBody::Expr(self.parse_assignment()?), Vec::new())
        };
        let def = FunctionDef {
            name: None,
            params,
            rest,
            body,
            is_async,
            is_arrow: true,
            var_names,
            loc,
        };
        Ok(ExprLoc::new(loc, Expr::Function(Rc::new(def))))
    }

    // expressions

    fn parse_expression(&mut self) -> Result<ExprLoc, Exception> {
        let first = self.parse_assignment()?;
        if !self.is_punct(Punct::Comma) {
            return Ok(first);
        }
        let loc = first.loc;
        let mut items = vec![first];
        while self.eat_punct(Punct::Comma) {
            items.push(self.parse_assignment()?);
        }
        Ok(ExprLoc::new(loc, Expr::Sequence(items)))
    }

    fn parse_assignment(&mut self) -> Result<ExprLoc, Exception> {
        self.enter()?;
        let result = self.parse_assignment_impl();
        self.leave();
        result
    }

    fn parse_assignment_impl(&mut self) -> Result<ExprLoc, Exception> {
        if let Some((is_async, parenthesized)) = self.arrow_ahead() {
            return self.parse_arrow(is_async, parenthesized);
        }
        if self.is_keyword(Keyword::Yield) {
            return Err(Self::error_at(self.loc(), "yield is not supported"));
        }

        let left = self.parse_conditional()?;
        let loc = left.loc;
        let TokenKind::Punct(punct) = *self.peek_kind() else {
            return Ok(left);
        };
        // `Ok` for arithmetic compound assignment, `Err` for the logical forms
        let compound: Result<Operator, LogicalOp> = match punct {
            Punct::Assign => {
                self.advance();
                let target = self.to_pattern(left)?;
                let value = self.parse_assignment()?;
                return Ok(ExprLoc::new(
                    loc,
                    Expr::Assign {
                        target: Box::new(target),
                        value: Box::new(value),
                    },
                ));
            }
            Punct::PlusEq => Ok(Operator::Add),
            Punct::MinusEq => Ok(Operator::Sub),
            Punct::StarEq => Ok(Operator::Mult),
            Punct::SlashEq => Ok(Operator::Div),
            Punct::PercentEq => Ok(Operator::Mod),
            Punct::StarStarEq => Ok(Operator::Pow),
            Punct::AmpAmpEq => Err(LogicalOp::And),
            Punct::PipePipeEq => Err(LogicalOp::Or),
            Punct::QuestionQuestionEq => Err(LogicalOp::Nullish),
            _ => return Ok(left),
        };
        if !matches!(left.expr, Expr::Name(_) | Expr::Member { optional: false, .. }) {
            return Err(Self::error_at(loc, "Invalid left-hand side in assignment"));
        }
        self.advance();
        let value = Box::new(self.parse_assignment()?);
        let target = Box::new(left);
        let expr = match compound {
            Ok(op) => Expr::OpAssign { target, op, value },
            Err(op) => Expr::LogicalAssign { target, op, value },
        };
        Ok(ExprLoc::new(loc, expr))
    }

    /// Reinterprets an already-parsed expression as an assignment target.
    fn to_pattern(&mut self, expr: ExprLoc) -> Result<Pattern, Exception> {
        let loc = expr.loc;
        match expr.expr {
            Expr::Name(name) => Ok(Pattern::Name(name)),
            Expr::Member { optional: false, .. } => Ok(Pattern::Member(Box::new(expr))),
            Expr::Array(items) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ArrayItem::Hole => out.push(None),
                        ArrayItem::Item(item) => out.push(Some(self.to_pattern_item(item)?)),
                        ArrayItem::Spread(inner) if i + 1 == count => {
                            rest = Some(Box::new(self.to_pattern(inner)?));
                        }
                        ArrayItem::Spread(inner) => {
                            return Err(Self::error_at(inner.loc, "Rest element must be last element"));
                        }
                    }
                }
                Ok(Pattern::Array { items: out, rest })
            }
            Expr::Object(items) => {
                let mut props = Vec::new();
                let mut rest = None;
                let count = items.len();
                for (i, item) in items.into_iter().enumerate() {
                    match item {
                        ObjectItem::Prop { key, value } => {
                            let PatternItem { target, default } = self.to_pattern_item(value)?;
                            props.push(ObjectPatternProp { key, target, default });
                        }
                        ObjectItem::ShorthandDefault { name, default } => {
                            self.cover_defaults.retain(|l| *l != default.loc);
                            props.push(ObjectPatternProp {
                                key: PropKey::Static(name.clone()),
                                target: Pattern::Name(name),
                                default: Some(default),
                            });
                        }
                        ObjectItem::Spread(ExprLoc {
                            expr: Expr::Name(name), ..
                        }) if i + 1 == count => rest = Some(name),
                        ObjectItem::Spread(inner) => {
                            return Err(Self::error_at(inner.loc, "Invalid rest element"));
                        }
                    }
                }
                Ok(Pattern::Object { props, rest })
            }
            _ => Err(Self::error_at(loc, "Invalid left-hand side in assignment")),
        }
    }

    fn to_pattern_item(&mut self, expr: ExprLoc) -> Result<PatternItem, Exception> {
        match expr.expr {
            Expr::Assign { target, value } => Ok(PatternItem {
                target: *target,
                default: Some(*value),
            }),
            _ => Ok(PatternItem {
                target: self.to_pattern(expr)?,
                default: None,
            }),
        }
    }

    fn parse_conditional(&mut self) -> Result<ExprLoc, Exception> {
        let test = self.parse_binary(0)?;
        if !self.eat_punct(Punct::Question) {
            return Ok(test);
        }
        let then = self.with_in(Self::parse_assignment)?;
        self.expect_punct(Punct::Colon)?;
        let otherwise = self.parse_assignment()?;
        Ok(ExprLoc::new(
            test.loc,
            Expr::Conditional {
                test: Box::new(test),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
        ))
    }

    fn binary_op(&self) -> Option<(u8, BinaryKind)> {
        let op = match self.peek_kind() {
            TokenKind::Punct(p) => match p {
                Punct::QuestionQuestion => (1, BinaryKind::Logical(LogicalOp::Nullish)),
                Punct::PipePipe => (2, BinaryKind::Logical(LogicalOp::Or)),
                Punct::AmpAmp => (3, BinaryKind::Logical(LogicalOp::And)),
                Punct::Pipe => (4, BinaryKind::Op(Operator::BitOr)),
                Punct::Caret => (5, BinaryKind::Op(Operator::BitXor)),
                Punct::Amp => (6, BinaryKind::Op(Operator::BitAnd)),
                Punct::Eq => (7, BinaryKind::Cmp(CmpOperator::Eq)),
                Punct::NotEq => (7, BinaryKind::Cmp(CmpOperator::NotEq)),
                Punct::StrictEq => (7, BinaryKind::Cmp(CmpOperator::StrictEq)),
                Punct::StrictNotEq => (7, BinaryKind::Cmp(CmpOperator::StrictNotEq)),
                Punct::Lt => (8, BinaryKind::Cmp(CmpOperator::Lt)),
                Punct::Gt => (8, BinaryKind::Cmp(CmpOperator::Gt)),
                Punct::Le => (8, BinaryKind::Cmp(CmpOperator::LtE)),
                Punct::Ge => (8, BinaryKind::Cmp(CmpOperator::GtE)),
                Punct::Shl => (9, BinaryKind::Op(Operator::LShift)),
                Punct::Shr => (9, BinaryKind::Op(Operator::RShift)),
                Punct::UShr => (9, BinaryKind::Op(Operator::URShift)),
                Punct::Plus => (10, BinaryKind::Op(Operator::Add)),
                Punct::Minus => (10, BinaryKind::Op(Operator::Sub)),
                Punct::Star => (11, BinaryKind::Op(Operator::Mult)),
                Punct::Slash => (11, BinaryKind::Op(Operator::Div)),
                Punct::Percent => (11, BinaryKind::Op(Operator::Mod)),
                Punct::StarStar => (12, BinaryKind::Op(Operator::Pow)),
                _ => return None,
            },
            TokenKind::Keyword(Keyword::Instanceof) => (8, BinaryKind::Cmp(CmpOperator::InstanceOf)),
            TokenKind::Keyword(Keyword::In) if !self.no_in => (8, BinaryKind::Cmp(CmpOperator::In)),
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over all binary operators. `**` is right-associative.
    fn parse_binary(&mut self, min_prec: u8) -> Result<ExprLoc, Exception> {
        let mut left = self.parse_unary()?;
        while let Some((prec, kind)) = self.binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if matches!(kind, BinaryKind::Op(Operator::Pow)) { prec } else { prec + 1 };
            let right = Box::new(self.parse_binary(next_min)?);
            let loc = left.loc;
            let left_box = Box::new(left);
            let expr = match kind {
                BinaryKind::Op(op) => Expr::Op {
                    left: left_box,
                    op,
                    right,
                },
                BinaryKind::Cmp(op) => Expr::CmpOp {
                    left: left_box,
                    op,
                    right,
                },
                BinaryKind::Logical(op) => Expr::Logical {
                    left: left_box,
                    op,
                    right,
                },
            };
            left = ExprLoc::new(loc, expr);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ExprLoc, Exception> {
        self.enter()?;
        let result = self.parse_unary_impl();
        self.leave();
        result
    }

    fn parse_unary_impl(&mut self) -> Result<ExprLoc, Exception> {
        let loc = self.loc();
        let op = match self.peek_kind() {
            TokenKind::Punct(Punct::Bang) => UnaryOp::Not,
            TokenKind::Punct(Punct::Minus) => UnaryOp::Neg,
            TokenKind::Punct(Punct::Plus) => UnaryOp::Plus,
            TokenKind::Punct(Punct::Tilde) => UnaryOp::BitNot,
            TokenKind::Keyword(Keyword::Typeof) => UnaryOp::TypeOf,
            TokenKind::Keyword(Keyword::Void) => UnaryOp::Void,
            TokenKind::Keyword(Keyword::Delete) => UnaryOp::Delete,
            TokenKind::Keyword(Keyword::Await) => {
                self.advance();
                let operand = self.parse_unary()?;
                return Ok(ExprLoc::new(loc, Expr::Await(Box::new(operand))));
            }
            TokenKind::Punct(p @ (Punct::PlusPlus | Punct::MinusMinus)) => {
                let op = if *p == Punct::PlusPlus {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let target = self.parse_unary()?;
                Self::check_update_target(&target)?;
                return Ok(ExprLoc::new(
                    loc,
                    Expr::Update {
                        op,
                        prefix: true,
                        target: Box::new(target),
                    },
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(ExprLoc::new(
            loc,
            Expr::Unary {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    fn check_update_target(target: &ExprLoc) -> Result<(), Exception> {
        if matches!(target.expr, Expr::Name(_) | Expr::Member { optional: false, .. }) {
            Ok(())
        } else {
            Err(Self::error_at(
                target.loc,
                "Invalid left-hand side expression in update operation",
            ))
        }
    }

    fn parse_postfix(&mut self) -> Result<ExprLoc, Exception> {
        let expr = self.parse_lhs()?;
        let op = match self.peek() {
            Token {
                kind: TokenKind::Punct(Punct::PlusPlus),
                newline_before: false,
                ..
            } => UpdateOp::Increment,
            Token {
                kind: TokenKind::Punct(Punct::MinusMinus),
                newline_before: false,
                ..
            } => UpdateOp::Decrement,
            _ => return Ok(expr),
        };
        Self::check_update_target(&expr)?;
        self.advance();
        Ok(ExprLoc::new(
            expr.loc,
            Expr::Update {
                op,
                prefix: false,
                target: Box::new(expr),
            },
        ))
    }

    fn property_name(&mut self) -> Result<Rc<str>, Exception> {
        match self.peek_kind() {
            TokenKind::Ident(_) => self.expect_ident(),
            TokenKind::Keyword(kw) => {
                let name = Rc::from(kw.as_str());
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Member access and call chains, including `new` and optional chaining.
    fn parse_lhs(&mut self) -> Result<ExprLoc, Exception> {
        let loc = self.loc();
        let mut expr = if self.is_keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        let mut has_optional = false;
        loop {
            match self.peek_kind() {
                TokenKind::Punct(Punct::Dot) => {
                    self.advance();
                    let name = self.property_name()?;
                    expr = member(loc, expr, MemberKey::Name(name), false);
                }
                TokenKind::Punct(Punct::QuestionDot) => {
                    self.advance();
                    has_optional = true;
                    if self.is_punct(Punct::LParen) {
                        let args = self.parse_arguments()?;
                        expr = ExprLoc::new(
                            loc,
                            Expr::Call {
                                callee: Box::new(expr),
                                args,
                                optional: true,
                            },
                        );
                    } else if self.eat_punct(Punct::LBracket) {
                        let key = self.with_in(Self::parse_expression)?;
                        self.expect_punct(Punct::RBracket)?;
                        expr = member(loc, expr, MemberKey::Computed(Box::new(key)), true);
                    } else {
                        let name = self.property_name()?;
                        expr = member(loc, expr, MemberKey::Name(name), true);
                    }
                }
                TokenKind::Punct(Punct::LBracket) => {
                    self.advance();
                    let key = self.with_in(Self::parse_expression)?;
                    self.expect_punct(Punct::RBracket)?;
                    expr = member(loc, expr, MemberKey::Computed(Box::new(key)), false);
                }
                TokenKind::Punct(Punct::LParen) => {
                    let args = self.parse_arguments()?;
                    expr = ExprLoc::new(
                        loc,
                        Expr::Call {
                            callee: Box::new(expr),
                            args,
                            optional: false,
                        },
                    );
                }
                TokenKind::Template(_) => {
                    return Err(Self::error_at(self.loc(), "Tagged templates are not supported"));
                }
                _ => break,
            }
        }
        if has_optional {
            expr = ExprLoc::new(loc, Expr::OptionalChain(Box::new(expr)));
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> Result<ExprLoc, Exception> {
        let loc = self.advance().loc;
        if self.is_punct(Punct::Dot) {
            return Err(Self::error_at(loc, "new.target is not supported"));
        }
        let mut callee = if self.is_keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(Punct::Dot) {
                let name = self.property_name()?;
                callee = member(callee.loc, callee, MemberKey::Name(name), false);
            } else if self.eat_punct(Punct::LBracket) {
                let key = self.with_in(Self::parse_expression)?;
                self.expect_punct(Punct::RBracket)?;
                callee = member(callee.loc, callee, MemberKey::Computed(Box::new(key)), false);
            } else {
                break;
            }
        }
        let args = if self.is_punct(Punct::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(ExprLoc::new(
            loc,
            Expr::New {
                callee: Box::new(callee),
                args,
            },
        ))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Argument>, Exception> {
        self.expect_punct(Punct::LParen)?;
        self.with_in(|p| {
            let mut args = Vec::new();
            loop {
                if p.eat_punct(Punct::RParen) {
                    return Ok(args);
                }
                if p.eat_punct(Punct::Ellipsis) {
                    args.push(Argument::Spread(p.parse_assignment()?));
                } else {
                    args.push(Argument::Positional(p.parse_assignment()?));
                }
                if !p.is_punct(Punct::RParen) {
                    p.expect_punct(Punct::Comma)?;
                }
            }
        })
    }

    fn parse_primary(&mut self) -> Result<ExprLoc, Exception> {
        let loc = self.loc();
        let expr = match self.peek_kind() {
            TokenKind::Number(n) => {
                let n = *n;
                self.advance();
                Expr::Literal(Literal::Number(n))
            }
            TokenKind::Str(_) => match self.advance().kind {
                TokenKind::Str(s) => Expr::Literal(Literal::Str(s)),
                _ => return Err(self.unexpected()),
            },
            TokenKind::Template(_) => match self.advance().kind {
                TokenKind::Template(chunks) => Expr::Template(self.parse_template(chunks)?),
                _ => return Err(self.unexpected()),
            },
            TokenKind::Ident(name) if &**name == "async" && self.async_function_follows() => {
                self.advance();
                self.advance();
                Expr::Function(self.parse_function_rest(true, loc, false)?)
            }
            TokenKind::Ident(_) => Expr::Name(self.expect_ident()?),
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Expr::Literal(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Expr::Literal(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Expr::Literal(Literal::Null)
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Expr::This
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                Expr::Function(self.parse_function_rest(false, loc, false)?)
            }
            TokenKind::Keyword(Keyword::Class) => {
                return Err(Self::error_at(loc, "Class expressions are not supported"));
            }
            TokenKind::Punct(Punct::LParen) => {
                self.advance();
                let inner = self.with_in(Self::parse_expression)?;
                self.expect_punct(Punct::RParen)?;
                return Ok(inner);
            }
            TokenKind::Punct(Punct::LBracket) => self.with_in(Self::parse_array_literal)?,
            TokenKind::Punct(Punct::LBrace) => self.with_in(Self::parse_object_literal)?,
            _ => return Err(self.unexpected()),
        };
        Ok(ExprLoc::new(loc, expr))
    }

    fn parse_template(&mut self, chunks: Vec<TemplateChunk>) -> Result<Vec<TemplatePart>, Exception> {
        let mut parts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            match chunk {
                TemplateChunk::Text(text) => {
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(text));
                    }
                }
                TemplateChunk::Expr(tokens) => {
                    let mut sub = Parser::new(tokens, self.depth_remaining);
                    sub.var_scopes.push(Vec::new());
                    let expr = sub.parse_expression()?;
                    if !sub.at_eof() {
                        return Err(sub.unexpected());
                    }
                    sub.check_cover_defaults()?;
                    parts.push(TemplatePart::Expr(expr));
                }
            }
        }
        Ok(parts)
    }

    fn parse_array_literal(&mut self) -> Result<Expr, Exception> {
        self.expect_punct(Punct::LBracket)?;
        let mut items = Vec::new();
        loop {
            if self.eat_punct(Punct::RBracket) {
                return Ok(Expr::Array(items));
            }
            if self.eat_punct(Punct::Comma) {
                items.push(ArrayItem::Hole);
                continue;
            }
            if self.eat_punct(Punct::Ellipsis) {
                items.push(ArrayItem::Spread(self.parse_assignment()?));
            } else {
                items.push(ArrayItem::Item(self.parse_assignment()?));
            }
            if !self.is_punct(Punct::RBracket) {
                self.expect_punct(Punct::Comma)?;
            }
        }
    }

    fn parse_prop_key(&mut self) -> Result<PropKey, Exception> {
        match self.peek_kind() {
            TokenKind::Str(_) => match self.advance().kind {
                TokenKind::Str(s) => Ok(PropKey::Static(s)),
                _ => Err(self.unexpected()),
            },
            TokenKind::Number(n) => {
                let key = number_to_string(*n);
                self.advance();
                Ok(PropKey::Static(key.into()))
            }
            TokenKind::Punct(Punct::LBracket) => {
                self.advance();
                let key = self.with_in(Self::parse_assignment)?;
                self.expect_punct(Punct::RBracket)?;
                Ok(PropKey::Computed(Box::new(key)))
            }
            _ => Ok(PropKey::Static(self.property_name()?)),
        }
    }

    /// True when the token after a contextual word (`async`, `get`, `set`) starts a key,
    /// meaning the word is a modifier rather than the property name itself.
    fn modifier_follows(&self) -> bool {
        let next = self.peek_nth(1);
        !matches!(
            next.kind,
            TokenKind::Punct(Punct::Colon | Punct::LParen | Punct::Comma | Punct::RBrace | Punct::Assign)
        ) && !next.newline_before
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Exception> {
        self.expect_punct(Punct::LBrace)?;
        let mut items = Vec::new();
        loop {
            if self.eat_punct(Punct::RBrace) {
                return Ok(Expr::Object(items));
            }
            let loc = self.loc();
            if self.eat_punct(Punct::Ellipsis) {
                items.push(ObjectItem::Spread(self.parse_assignment()?));
            } else {
                if (self.is_ident("get") || self.is_ident("set")) && self.modifier_follows() {
                    return Err(Self::error_at(loc, "Getters and setters are not supported"));
                }
                let is_async = self.is_ident("async") && self.modifier_follows();
                if is_async {
                    self.advance();
                }
                let shorthand = match self.peek_kind() {
                    TokenKind::Ident(name) => Some(name.clone()),
                    _ => None,
                };
                let key = self.parse_prop_key()?;
                if self.is_punct(Punct::LParen) {
                    let name = match &key {
                        PropKey::Static(name) => Some(name.clone()),
                        PropKey::Computed(_) => None,
                    };
                    let def = self.parse_function_from_params(name, is_async, loc)?;
                    items.push(ObjectItem::Prop {
                        key,
                        value: ExprLoc::new(loc, Expr::Function(def)),
                    });
                } else if is_async {
                    return Err(self.unexpected());
                } else if self.eat_punct(Punct::Colon) {
                    let value = self.parse_assignment()?;
                    items.push(ObjectItem::Prop { key, value });
                } else if let Some(name) = shorthand {
                    if self.eat_punct(Punct::Assign) {
                        let default = self.parse_assignment()?;
                        self.cover_defaults.push(default.loc);
                        items.push(ObjectItem::ShorthandDefault { name, default });
                    } else {
                        items.push(ObjectItem::Prop {
                            key,
                            value: ExprLoc::new(loc, Expr::Name(name)),
                        });
                    }
                } else {
                    return Err(self.unexpected());
                }
            }
            if !self.is_punct(Punct::RBrace) {
                self.expect_punct(Punct::Comma)?;
            }
        }
    }
}

fn decl_kind(keyword: Keyword) -> DeclKind {
    match keyword {
        Keyword::Var => DeclKind::Var,
        Keyword::Const => DeclKind::Const,
        _ => DeclKind::Let,
    }
}

fn member(loc: CodeLoc, object: ExprLoc, property: MemberKey, optional: bool) -> ExprLoc {
    ExprLoc::new(
        loc,
        Expr::Member {
            object: Box::new(object),
            property,
            optional,
        },
    )
}
