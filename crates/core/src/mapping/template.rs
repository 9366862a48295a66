//! Sandboxed templates for derived attributes.
//!
//! A template is literal text with `${ expression }` placeholders (the `$` is
//! the configured template marker; a doubled marker renders a literal one).
//! Expressions can only read internal attribute values, so rendering performs
//! no I/O and runs in time linear in the template size.
//!
//! | Syntax | Meaning |
//! |--------|---------|
//! | `mail` | the values of internal attribute `mail` (a list) |
//! | `"text"`, `'text'` | string literal |
//! | `mail[0]`, `mail[-1]` | list indexing, negative from the end |
//! | `a + b` | string concatenation, or list concatenation |
//! | `scope(x)`, `x \| scope` | domain part of a scoped value |
//! | `( ... )` | grouping |
//!
//! A placeholder that evaluates to a list renders its items joined with the
//! multivalue separator.

use tracing::debug;

use crate::errors::TemplateError;
use crate::models::InternalAttributes;

/// Longest accepted template source, in bytes.
pub const MAX_TEMPLATE_LEN: usize = 4096;

/// Deepest accepted expression nesting (parentheses, calls, filters).
pub const MAX_NESTING_DEPTH: usize = 32;

/// Longest accepted rendered output, in bytes.
pub const MAX_RENDERED_LEN: usize = 64 * 1024;

/// Names callable from a template.
const BUILTINS: &[&str] = &["scope"];

/// Return the part of a scoped value after the first `@`.
///
/// `scope("jdoe@example.org")` is `"example.org"`. Values without an `@` are
/// rejected rather than passed through.
pub fn scope(value: &str) -> Result<&str, TemplateError> {
    value
        .split_once('@')
        .map(|(_, domain)| domain)
        .ok_or_else(|| TemplateError::Unscoped(value.to_string()))
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Placeholder(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Variable(String),
    Literal(String),
    Index(Box<Expr>, i64),
    Concat(Box<Expr>, Box<Expr>),
    Call(String, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplateValue {
    Str(String),
    List(Vec<String>),
}

impl TemplateValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse `source`, using `marker` to introduce placeholders.
    pub fn compile(source: &str, marker: char) -> Result<Self, TemplateError> {
        if source.len() > MAX_TEMPLATE_LEN {
            return Err(TemplateError::TooComplex(format!(
                "template is {} bytes, limit is {MAX_TEMPLATE_LEN}",
                source.len()
            )));
        }
        let segments = Parser::new(source).parse_template(marker)?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The source text this template was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against the values currently bound in `bindings`.
    pub fn render(
        &self,
        bindings: &InternalAttributes,
        multivalue_separator: char,
    ) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(expr) => match evaluate(expr, bindings)? {
                    TemplateValue::Str(s) => out.push_str(&s),
                    TemplateValue::List(items) => {
                        let mut buf = [0u8; 4];
                        out.push_str(&items.join(&*multivalue_separator.encode_utf8(&mut buf)));
                    }
                },
            }
            if out.len() > MAX_RENDERED_LEN {
                return Err(TemplateError::TooComplex(format!(
                    "rendered output exceeds {MAX_RENDERED_LEN} bytes"
                )));
            }
        }
        debug!(template = %self.source, rendered = %out, "rendered template");
        Ok(out)
    }

    /// Render and split the output into attribute values.
    ///
    /// Empty pieces are dropped, so a template rendering to the empty string
    /// produces no values.
    pub fn render_values(
        &self,
        bindings: &InternalAttributes,
        multivalue_separator: char,
    ) -> Result<Vec<String>, TemplateError> {
        let rendered = self.render(bindings, multivalue_separator)?;
        Ok(rendered
            .split(multivalue_separator)
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect())
    }
}

fn evaluate(expr: &Expr, bindings: &InternalAttributes) -> Result<TemplateValue, TemplateError> {
    match expr {
        Expr::Variable(name) => bindings
            .get(name)
            .map(|values| TemplateValue::List(values.clone()))
            .ok_or_else(|| TemplateError::UndefinedVariable(name.clone())),
        Expr::Literal(s) => Ok(TemplateValue::Str(s.clone())),
        Expr::Index(target, index) => match evaluate(target, bindings)? {
            TemplateValue::List(items) => {
                let len = items.len();
                let resolved = if *index < 0 {
                    i64::try_from(len).ok().map(|l| l + index)
                } else {
                    Some(*index)
                };
                resolved
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| items.into_iter().nth(i))
                    .map(TemplateValue::Str)
                    .ok_or(TemplateError::IndexOutOfRange { index: *index, len })
            }
            TemplateValue::Str(_) => Err(TemplateError::TypeMismatch(
                "cannot index into a string".into(),
            )),
        },
        Expr::Concat(lhs, rhs) => {
            match (evaluate(lhs, bindings)?, evaluate(rhs, bindings)?) {
                (TemplateValue::Str(mut a), TemplateValue::Str(b)) => {
                    a.push_str(&b);
                    Ok(TemplateValue::Str(a))
                }
                (TemplateValue::List(mut a), TemplateValue::List(b)) => {
                    a.extend(b);
                    Ok(TemplateValue::List(a))
                }
                (a, b) => Err(TemplateError::TypeMismatch(format!(
                    "cannot concatenate {} and {}",
                    a.kind(),
                    b.kind()
                ))),
            }
        }
        Expr::Call(name, arg) => match (name.as_str(), evaluate(arg, bindings)?) {
            ("scope", TemplateValue::Str(s)) => Ok(TemplateValue::Str(scope(&s)?.to_string())),
            ("scope", other) => Err(TemplateError::TypeMismatch(format!(
                "scope expects a string, got a {}",
                other.kind()
            ))),
            (other, _) => Err(TemplateError::UnknownFunction(other.to_string())),
        },
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error(&self, detail: impl Into<String>) -> TemplateError {
        TemplateError::Syntax {
            position: self.pos,
            detail: detail.into(),
        }
    }

    fn parse_template(mut self, marker: char) -> Result<Vec<Segment>, TemplateError> {
        let mut segments = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.bump() {
            if c != marker {
                text.push(c);
                continue;
            }
            match self.peek() {
                Some(next) if next == marker => {
                    self.bump();
                    text.push(marker);
                }
                Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    let expr = self.parse_filtered()?;
                    if !self.eat('}') {
                        return Err(self.error("expected '}' to close placeholder"));
                    }
                    segments.push(Segment::Placeholder(expr));
                }
                _ => text.push(c),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Ok(segments)
    }

    // filtered := concat ( '|' ident )*
    fn parse_filtered(&mut self) -> Result<Expr, TemplateError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(TemplateError::TooComplex(format!(
                "expression nesting exceeds {MAX_NESTING_DEPTH}"
            )));
        }

        let mut expr = self.parse_concat()?;
        while self.eat('|') {
            self.skip_ws();
            let name = self.parse_ident()?;
            expr = self.builtin_call(name, expr)?;
        }

        self.depth -= 1;
        Ok(expr)
    }

    // concat := postfix ( '+' postfix )*
    fn parse_concat(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.parse_postfix()?;
        while self.eat('+') {
            let rhs = self.parse_postfix()?;
            expr = Expr::Concat(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    // postfix := primary ( '[' integer ']' )*
    fn parse_postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.parse_primary()?;
        while self.eat('[') {
            self.skip_ws();
            let index = self.parse_integer()?;
            if !self.eat(']') {
                return Err(self.error("expected ']' after index"));
            }
            expr = Expr::Index(Box::new(expr), index);
        }
        Ok(expr)
    }

    // primary := string | ident | ident '(' filtered ')' | '(' filtered ')'
    fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                self.parse_string(quote).map(Expr::Literal)
            }
            Some('(') => {
                self.bump();
                let expr = self.parse_filtered()?;
                if !self.eat(')') {
                    return Err(self.error("expected ')'"));
                }
                Ok(expr)
            }
            Some(c) if is_ident_start(c) => {
                let name = self.parse_ident()?;
                if self.eat('(') {
                    let arg = self.parse_filtered()?;
                    if !self.eat(')') {
                        return Err(self.error("expected ')' after function argument"));
                    }
                    self.builtin_call(name, arg)
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of template")),
        }
    }

    fn builtin_call(&self, name: String, arg: Expr) -> Result<Expr, TemplateError> {
        if BUILTINS.contains(&name.as_str()) {
            Ok(Expr::Call(name, Box::new(arg)))
        } else {
            Err(TemplateError::UnknownFunction(name))
        }
    }

    fn parse_ident(&mut self) -> Result<String, TemplateError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if is_ident_start(c) => {
                self.bump();
            }
            _ => return Err(self.error("expected an identifier")),
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn parse_integer(&mut self) -> Result<i64, TemplateError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        let digits = &self.src[start..self.pos];
        digits
            .parse()
            .map_err(|_| TemplateError::Syntax {
                position: start,
                detail: format!("invalid index '{digits}'"),
            })
    }

    // Called after the opening quote has been consumed.
    fn parse_string(&mut self, quote: char) -> Result<String, TemplateError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string literal")),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(c @ ('\\' | '"' | '\'')) => out.push(c),
                    Some(c) => return Err(self.error(format!("unknown escape '\\{c}'"))),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
