//! Tokenizer for the snippet language.
//!
//! Produces a flat token vector terminated by `Eof`. Every token records whether a line
//! terminator preceded it, which is all the parser needs for automatic semicolon insertion and
//! the `return`/`throw` restricted productions. Template literals are tokenized eagerly: each
//! `${...}` substitution becomes a nested token vector parsed later by a sub-parser.

use std::rc::Rc;

use crate::exception::{CodeLoc, ExcType, Exception};

/// Reserved words recognized by the parser.
///
/// Contextual words (`of`, `async`, `get`, `set`) stay identifiers and are matched by text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Keyword {
    Let,
    Const,
    Var,
    Function,
    Await,
    Return,
    If,
    Else,
    For,
    In,
    While,
    Do,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    Switch,
    Case,
    Default,
    New,
    Typeof,
    Void,
    Delete,
    Instanceof,
    True,
    False,
    Null,
    This,
    Class,
    Import,
    Export,
    Yield,
    With,
    Debugger,
}

impl Keyword {
    fn from_ident(text: &str) -> Option<Self> {
        let kw = match text {
            "let" => Self::Let,
            "const" => Self::Const,
            "var" => Self::Var,
            "function" => Self::Function,
            "await" => Self::Await,
            "return" => Self::Return,
            "if" => Self::If,
            "else" => Self::Else,
            "for" => Self::For,
            "in" => Self::In,
            "while" => Self::While,
            "do" => Self::Do,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "throw" => Self::Throw,
            "try" => Self::Try,
            "catch" => Self::Catch,
            "finally" => Self::Finally,
            "switch" => Self::Switch,
            "case" => Self::Case,
            "default" => Self::Default,
            "new" => Self::New,
            "typeof" => Self::Typeof,
            "void" => Self::Void,
            "delete" => Self::Delete,
            "instanceof" => Self::Instanceof,
            "true" => Self::True,
            "false" => Self::False,
            "null" => Self::Null,
            "this" => Self::This,
            "class" => Self::Class,
            "import" => Self::Import,
            "export" => Self::Export,
            "yield" => Self::Yield,
            "with" => Self::With,
            "debugger" => Self::Debugger,
            _ => return None,
        };
        Some(kw)
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Let => "let",
            Self::Const => "const",
            Self::Var => "var",
            Self::Function => "function",
            Self::Await => "await",
            Self::Return => "return",
            Self::If => "if",
            Self::Else => "else",
            Self::For => "for",
            Self::In => "in",
            Self::While => "while",
            Self::Do => "do",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Throw => "throw",
            Self::Try => "try",
            Self::Catch => "catch",
            Self::Finally => "finally",
            Self::Switch => "switch",
            Self::Case => "case",
            Self::Default => "default",
            Self::New => "new",
            Self::Typeof => "typeof",
            Self::Void => "void",
            Self::Delete => "delete",
            Self::Instanceof => "instanceof",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::This => "this",
            Self::Class => "class",
            Self::Import => "import",
            Self::Export => "export",
            Self::Yield => "yield",
            Self::With => "with",
            Self::Debugger => "debugger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Punct {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    Ellipsis,
    Question,
    QuestionDot,
    QuestionQuestion,
    QuestionQuestionEq,
    Colon,
    Arrow,
    Assign,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,
    Bang,
    Tilde,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    UShr,
    AmpAmp,
    PipePipe,
    PlusEq,
    MinusEq,
    StarEq,
    StarStarEq,
    SlashEq,
    PercentEq,
    AmpAmpEq,
    PipePipeEq,
}

/// Punctuators ordered longest first so the first prefix match is the maximal munch.
const PUNCTUATORS: &[(&str, Punct)] = &[
    (">>>", Punct::UShr),
    ("===", Punct::StrictEq),
    ("!==", Punct::StrictNotEq),
    ("...", Punct::Ellipsis),
    ("**=", Punct::StarStarEq),
    ("??=", Punct::QuestionQuestionEq),
    ("&&=", Punct::AmpAmpEq),
    ("||=", Punct::PipePipeEq),
    ("=>", Punct::Arrow),
    ("==", Punct::Eq),
    ("!=", Punct::NotEq),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("**", Punct::StarStar),
    ("++", Punct::PlusPlus),
    ("--", Punct::MinusMinus),
    ("&&", Punct::AmpAmp),
    ("||", Punct::PipePipe),
    ("??", Punct::QuestionQuestion),
    ("?.", Punct::QuestionDot),
    ("<<", Punct::Shl),
    (">>", Punct::Shr),
    ("+=", Punct::PlusEq),
    ("-=", Punct::MinusEq),
    ("*=", Punct::StarEq),
    ("/=", Punct::SlashEq),
    ("%=", Punct::PercentEq),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    (";", Punct::Semi),
    (",", Punct::Comma),
    (".", Punct::Dot),
    ("?", Punct::Question),
    (":", Punct::Colon),
    ("=", Punct::Assign),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("~", Punct::Tilde),
    ("&", Punct::Amp),
    ("|", Punct::Pipe),
    ("^", Punct::Caret),
];

impl Punct {
    pub(crate) fn as_str(self) -> &'static str {
        PUNCTUATORS
            .iter()
            .find(|(_, p)| *p == self)
            .map_or("?", |(text, _)| text)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TemplateChunk {
    Text(Rc<str>),
    Expr(Vec<Token>),
}

#[derive(Debug, Clone)]
pub(crate) enum TokenKind {
    Number(f64),
    Str(Rc<str>),
    Template(Vec<TemplateChunk>),
    Ident(Rc<str>),
    Keyword(Keyword),
    Punct(Punct),
    Eof,
}

impl TokenKind {
    /// Short human-readable form for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Str(s) => format!("string '{s}'"),
            Self::Template(_) => "template literal".to_owned(),
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Keyword(kw) => format!("'{}'", kw.as_str()),
            Self::Punct(p) => format!("'{}'", p.as_str()),
            Self::Eof => "end of input".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub loc: CodeLoc,
    /// A line terminator appeared between the previous token and this one.
    pub newline_before: bool,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, Exception> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = matches!(token.kind, TokenKind::Eof);
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn loc(&self) -> CodeLoc {
        CodeLoc {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, loc: CodeLoc, message: impl Into<String>) -> Exception {
        Exception::new(ExcType::SyntaxError, message).with_loc(loc)
    }

    fn starts_with(&self, text: &str) -> bool {
        text.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    /// Skips whitespace and comments, returning whether a line terminator was crossed.
    fn skip_trivia(&mut self) -> Result<bool, Exception> {
        let mut newline = false;
        loop {
            match self.peek() {
                Some('\n' | '\u{2028}' | '\u{2029}') => {
                    newline = true;
                    self.bump();
                }
                Some(c) if c.is_whitespace() || c == '\u{feff}' => {
                    self.bump();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    let start = self.loc();
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break;
                            }
                            Some('\n') => newline = true,
                            Some(_) => {}
                            None => return Err(self.error(start, "Unterminated comment")),
                        }
                    }
                }
                _ => return Ok(newline),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Exception> {
        let newline_before = self.skip_trivia()?;
        let loc = self.loc();
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c) if c.is_ascii_digit() => self.number(loc)?,
            Some('.') if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(loc)?,
            Some(c @ ('"' | '\'')) => {
                self.bump();
                TokenKind::Str(self.string(c, loc)?.into())
            }
            Some('`') => {
                self.bump();
                self.template(loc)?
            }
            Some(c) if is_ident_start(c) => {
                let mut text = String::new();
                while let Some(c) = self.peek().filter(|c| is_ident_part(*c)) {
                    text.push(c);
                    self.bump();
                }
                match Keyword::from_ident(&text) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident(text.into()),
                }
            }
            Some(c) => self.punct(c, loc)?,
        };
        Ok(Token {
            kind,
            loc,
            newline_before,
        })
    }

    fn punct(&mut self, c: char, loc: CodeLoc) -> Result<TokenKind, Exception> {
        // `a?.5:1` is a conditional, not optional chaining
        if self.starts_with("?.") && self.peek_at(2).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            return Ok(TokenKind::Punct(Punct::Question));
        }
        for (text, punct) in PUNCTUATORS {
            if self.starts_with(text) {
                for _ in 0..text.chars().count() {
                    self.bump();
                }
                return Ok(TokenKind::Punct(*punct));
            }
        }
        Err(self.error(loc, format!("Invalid or unexpected token '{c}'")))
    }

    fn number(&mut self, loc: CodeLoc) -> Result<TokenKind, Exception> {
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
                    if c != '_' {
                        digits.push(c);
                    }
                    self.bump();
                }
                let value = u64::from_str_radix(&digits, radix)
                    .map_err(|_| self.error(loc, "Invalid or unexpected token"))?;
                return Ok(TokenKind::Number(value as f64));
            }
        }

        let mut text = String::new();
        let mut push_digits = |lexer: &mut Self, text: &mut String| {
            while let Some(c) = lexer.peek().filter(|c| c.is_ascii_digit() || *c == '_') {
                if c != '_' {
                    text.push(c);
                }
                lexer.bump();
            }
        };
        push_digits(self, &mut text);
        if self.peek() == Some('.') {
            text.push('.');
            self.bump();
            push_digits(self, &mut text);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign_ok = matches!(self.peek_at(1), Some('+' | '-')) && self.peek_at(2).is_some_and(|c| c.is_ascii_digit());
            if sign_ok || self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
                text.push('e');
                self.bump();
                if sign_ok && let Some(sign) = self.bump() {
                    text.push(sign);
                }
                push_digits(self, &mut text);
            }
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error(loc, "Invalid or unexpected token"));
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| self.error(loc, "Invalid number literal"))
    }

    fn escape(&mut self, loc: CodeLoc) -> Result<Option<char>, Exception> {
        let Some(c) = self.bump() else {
            return Err(self.error(loc, "Invalid or unexpected token"));
        };
        let decoded = match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'b' => '\u{8}',
            'f' => '\u{c}',
            'v' => '\u{b}',
            '0' if !self.peek().is_some_and(|c| c.is_ascii_digit()) => '\0',
            'x' => {
                let code = self.hex_digits(2, loc)?;
                char::from_u32(code).ok_or_else(|| self.error(loc, "Invalid hexadecimal escape sequence"))?
            }
            'u' => {
                let code = if self.peek() == Some('{') {
                    self.bump();
                    let mut code = 0u32;
                    loop {
                        match self.bump() {
                            Some('}') => break,
                            Some(d) if d.is_ascii_hexdigit() => {
                                code = code
                                    .checked_mul(16)
                                    .and_then(|v| v.checked_add(d.to_digit(16).unwrap_or(0)))
                                    .ok_or_else(|| self.error(loc, "Undefined Unicode code-point"))?;
                            }
                            _ => return Err(self.error(loc, "Invalid Unicode escape sequence")),
                        }
                    }
                    code
                } else {
                    self.hex_digits(4, loc)?
                };
                // lone surrogates have no `char`; substitute the replacement character
                char::from_u32(code).unwrap_or('\u{fffd}')
            }
            // line continuation
            '\n' => return Ok(None),
            '\r' => {
                if self.peek() == Some('\n') {
                    self.bump();
                }
                return Ok(None);
            }
            other => other,
        };
        Ok(Some(decoded))
    }

    fn hex_digits(&mut self, count: usize, loc: CodeLoc) -> Result<u32, Exception> {
        let mut code = 0u32;
        for _ in 0..count {
            match self.bump().and_then(|d| d.to_digit(16)) {
                Some(digit) => code = code * 16 + digit,
                None => return Err(self.error(loc, "Invalid hexadecimal escape sequence")),
            }
        }
        Ok(code)
    }

    fn string(&mut self, quote: char, loc: CodeLoc) -> Result<String, Exception> {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(text),
                Some('\\') => {
                    if let Some(c) = self.escape(loc)? {
                        text.push(c);
                    }
                }
                Some('\n') | None => return Err(self.error(loc, "Invalid or unexpected token")),
                Some(c) => text.push(c),
            }
        }
    }

    fn template(&mut self, loc: CodeLoc) -> Result<TokenKind, Exception> {
        let mut chunks = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => {
                    if let Some(c) = self.escape(loc)? {
                        text.push(c);
                    }
                }
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    chunks.push(TemplateChunk::Text(std::mem::take(&mut text).into()));
                    chunks.push(TemplateChunk::Expr(self.substitution(loc)?));
                }
                Some(c) => text.push(c),
                None => return Err(self.error(loc, "Unterminated template literal")),
            }
        }
        chunks.push(TemplateChunk::Text(text.into()));
        Ok(TokenKind::Template(chunks))
    }

    /// Tokenizes a `${ ... }` body up to its matching close brace.
    fn substitution(&mut self, loc: CodeLoc) -> Result<Vec<Token>, Exception> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.next_token()?;
            match token.kind {
                TokenKind::Eof => return Err(self.error(loc, "Unterminated template literal")),
                TokenKind::Punct(Punct::LBrace) => depth += 1,
                TokenKind::Punct(Punct::RBrace) if depth == 0 => {
                    tokens.push(Token {
                        kind: TokenKind::Eof,
                        loc: token.loc,
                        newline_before: false,
                    });
                    return Ok(tokens);
                }
                TokenKind::Punct(Punct::RBrace) => depth -= 1,
                _ => {}
            }
            tokens.push(token);
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric() || c == '\u{200c}' || c == '\u{200d}'
}
