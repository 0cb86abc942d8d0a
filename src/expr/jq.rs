//! A hand-written recursive-descent parser and evaluator for the documented
//! jq-subset runtime expression language.
//!
//! Supported: identity `.`, field paths `.a.b.c`, object construction
//! `{ k: expr, ... }`, array construction `[ expr, ... ]`, string/number/
//! bool/null literals, default `a // b`, equality/inequality, ordering
//! (`<`, `>`, `<=`, `>=`), boolean `and`/`or`/`not`, `contains(x)`,
//! `startswith(x)`, `endswith(x)`, `test(regex)`, string interpolation
//! `"foo \(.x) bar"`, and `if <cond> then <a> else <b> end` (nestable).
//! Arithmetic is limited to integer/float `+ - * /`.
//!
//! There is no pipe operator in this subset: every expression evaluates
//! relative to the same root input (the value map's JSON form).

use crate::error::ExpressionError;
use regex::Regex;
use serde_json::Value;

/// Parses and evaluates a full `${ ... }` source string against `root`.
///
/// # Examples
///
/// ```
/// use hyperfleet_engine::expr::jq::eval_str;
/// use serde_json::json;
///
/// let root = json!({"event": {"id": "evt-1"}});
/// assert_eq!(eval_str("${ .event.id }", &root).unwrap(), json!("evt-1"));
/// assert_eq!(eval_str("${ .missing // \"fallback\" }", &root).unwrap(), json!("fallback"));
/// ```
pub fn eval_str(source: &str, root: &Value) -> Result<Value, ExpressionError> {
    let inner = strip_braces(source, source)?;
    let tokens = lex(inner, source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        source,
    };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;
    eval_node(&ast, root, source)
}

fn strip_braces<'a>(trimmed: &'a str, source: &str) -> Result<&'a str, ExpressionError> {
    let t = trimmed.trim();
    let t = t
        .strip_prefix("${")
        .ok_or_else(|| ExpressionError::Parse {
            source_text: source.to_string(),
            reason: "expected `${` prefix".to_string(),
        })?;
    let t = t
        .strip_suffix('}')
        .ok_or_else(|| ExpressionError::Parse {
            source_text: source.to_string(),
            reason: "expected `}` suffix".to_string(),
        })?;
    Ok(t.trim())
}

/// Truthiness per jq semantics: `null` and `false` are falsy, everything
/// else (including `0` and `""`) is truthy.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

// ===========================================================================
// Lexer
// ===========================================================================

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Dot,
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    DefaultOp,
    Plus,
    Minus,
    Star,
    Slash,
    And,
    Or,
    Not,
    If,
    Then,
    Else,
    End,
}

fn lex(input: &str, source: &str) -> Result<Vec<Token>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    tokens.push(Token::DefaultOp);
                    i += 2;
                } else {
                    tokens.push(Token::Slash);
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' => {
                let (s, consumed) = lex_string(&chars[i..], source)?;
                tokens.push(Token::Str(s));
                i += consumed;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| ExpressionError::Parse {
                    source_text: source.to_string(),
                    reason: format!("invalid number literal `{text}`"),
                })?;
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(match text.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "if" => Token::If,
                    "then" => Token::Then,
                    "else" => Token::Else,
                    "end" => Token::End,
                    _ => Token::Ident(text),
                });
            }
            other => {
                return Err(ExpressionError::Parse {
                    source_text: source.to_string(),
                    reason: format!("unexpected character `{other}`"),
                });
            }
        }
    }
    Ok(tokens)
}

/// Lexes a quoted string, preserving `\( ... )` interpolation segments
/// verbatim as `StrPart::Expr` by returning the raw string content; parsed
/// later in `parse_string_literal`.
fn lex_string(chars: &[char], source: &str) -> Result<(String, usize), ExpressionError> {
    let mut i = 1; // skip opening quote
    let mut out = String::new();
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' if chars.get(i + 1) == Some(&'(') => {
                // Copy the interpolation marker through for the parser to
                // split on later; find the matching close paren.
                let mut depth = 1;
                let mut j = i + 2;
                out.push_str("\\(");
                while j < chars.len() && depth > 0 {
                    match chars[j] {
                        '(' => depth += 1,
                        ')' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        out.push(chars[j]);
                    }
                    j += 1;
                }
                out.push(')');
                i = j;
            }
            '\\' if chars.get(i + 1) == Some(&'"') => {
                out.push('"');
                i += 2;
            }
            '\\' if chars.get(i + 1) == Some(&'n') => {
                out.push('\n');
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExpressionError::Parse {
        source_text: source.to_string(),
        reason: "unterminated string literal".to_string(),
    })
}

// ===========================================================================
// AST
// ===========================================================================

#[derive(Clone, Debug)]
enum Node {
    Identity,
    Field(Box<Node>, String),
    Literal(Value),
    InterpolatedString(Vec<StrPart>),
    Object(Vec<(String, Node)>),
    Array(Vec<Node>),
    Default(Box<Node>, Box<Node>),
    BinOp(BinOp, Box<Node>, Box<Node>),
    Not(Box<Node>),
    Method(Box<Node>, Method, Vec<Node>),
    If(Box<Node>, Box<Node>, Box<Node>),
}

#[derive(Clone, Debug)]
enum StrPart {
    Text(String),
    Expr(Box<Node>),
}

#[derive(Clone, Copy, Debug)]
enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug)]
enum Method {
    Contains,
    StartsWith,
    EndsWith,
    Test,
}

// ===========================================================================
// Parser
// ===========================================================================

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ExpressionError> {
        match self.bump() {
            Some(t) if t == expected => Ok(()),
            other => Err(ExpressionError::Parse {
                source_text: self.source.to_string(),
                reason: format!("expected {expected:?}, found {other:?}"),
            }),
        }
    }

    fn expect_end(&self) -> Result<(), ExpressionError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(ExpressionError::Parse {
                source_text: self.source.to_string(),
                reason: "trailing tokens after expression".to_string(),
            })
        }
    }

    fn parse_expr(&mut self) -> Result<Node, ExpressionError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Node::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Node::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Node, ExpressionError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.bump();
            let inner = self.parse_not()?;
            Ok(Node::Not(Box::new(inner)))
        } else {
            self.parse_default()
        }
    }

    fn parse_default(&mut self) -> Result<Node, ExpressionError> {
        let lhs = self.parse_compare()?;
        if matches!(self.peek(), Some(Token::DefaultOp)) {
            self.bump();
            let rhs = self.parse_default()?;
            Ok(Node::Default(Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_compare(&mut self) -> Result<Node, ExpressionError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinOp::Eq),
            Some(Token::Ne) => Some(BinOp::Ne),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::Le) => Some(BinOp::Le),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::Ge) => Some(BinOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let rhs = self.parse_add()?;
            Ok(Node::BinOp(op, Box::new(lhs), Box::new(rhs)))
        } else {
            Ok(lhs)
        }
    }

    fn parse_add(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_mul()?;
            lhs = Node::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Node, ExpressionError> {
        let mut lhs = self.parse_postfix()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.parse_postfix()?;
            lhs = Node::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_postfix(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.bump();
                    let Some(Token::Ident(name)) = self.bump().cloned() else {
                        return Err(ExpressionError::Parse {
                            source_text: self.source.to_string(),
                            reason: "expected identifier after `.`".to_string(),
                        });
                    };
                    if matches!(self.peek(), Some(Token::LParen)) {
                        let method = match name.as_str() {
                            "contains" => Method::Contains,
                            "startswith" => Method::StartsWith,
                            "endswith" => Method::EndsWith,
                            "test" => Method::Test,
                            other => {
                                return Err(ExpressionError::Parse {
                                    source_text: self.source.to_string(),
                                    reason: format!("unknown method `{other}`"),
                                });
                            }
                        };
                        let args = self.parse_args()?;
                        node = Node::Method(Box::new(node), method, args);
                    } else {
                        node = Node::Field(Box::new(node), name);
                    }
                }
                Some(Token::LParen) if matches!(node, Node::Identity) => {
                    // bare `contains(x)` etc. applied to the identity
                    break;
                }
                _ => break,
            }
        }
        // Bare builtin call without a leading field path, e.g. `contains("x")`.
        if let Node::Identity = node {
            if let Some(Token::Ident(name)) = self.peek().cloned() {
                if matches!(self.tokens.get(self.pos + 1), Some(Token::LParen)) {
                    let method = match name.as_str() {
                        "contains" => Some(Method::Contains),
                        "startswith" => Some(Method::StartsWith),
                        "endswith" => Some(Method::EndsWith),
                        "test" => Some(Method::Test),
                        _ => None,
                    };
                    if let Some(method) = method {
                        self.bump();
                        let args = self.parse_args()?;
                        node = Node::Method(Box::new(Node::Identity), method, args);
                    }
                }
            }
        }
        Ok(node)
    }

    fn parse_args(&mut self) -> Result<Vec<Node>, ExpressionError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_expr()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Node, ExpressionError> {
        match self.bump().cloned() {
            Some(Token::Dot) => {
                if let Some(Token::Ident(name)) = self.peek().cloned() {
                    self.bump();
                    let mut node = Node::Field(Box::new(Node::Identity), name);
                    while matches!(self.peek(), Some(Token::Dot)) {
                        self.bump();
                        let Some(Token::Ident(name)) = self.bump().cloned() else {
                            return Err(ExpressionError::Parse {
                                source_text: self.source.to_string(),
                                reason: "expected identifier after `.`".to_string(),
                            });
                        };
                        node = Node::Field(Box::new(node), name);
                    }
                    Ok(node)
                } else {
                    Ok(Node::Identity)
                }
            }
            Some(Token::Str(s)) => Ok(parse_string_literal(&s, self.source)?),
            Some(Token::Num(n)) => Ok(Node::Literal(
                serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            )),
            Some(Token::True) => Ok(Node::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Node::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Node::Literal(Value::Null)),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBrace) => self.parse_object(),
            Some(Token::LBracket) => self.parse_array(),
            Some(Token::If) => self.parse_if(),
            other => Err(ExpressionError::Parse {
                source_text: self.source.to_string(),
                reason: format!("unexpected token {other:?}"),
            }),
        }
    }

    fn parse_object(&mut self) -> Result<Node, ExpressionError> {
        let mut entries = Vec::new();
        if !matches!(self.peek(), Some(Token::RBrace)) {
            loop {
                let key = match self.bump().cloned() {
                    Some(Token::Ident(name)) => name,
                    Some(Token::Str(s)) => s,
                    other => {
                        return Err(ExpressionError::Parse {
                            source_text: self.source.to_string(),
                            reason: format!("expected object key, found {other:?}"),
                        });
                    }
                };
                self.expect(&Token::Colon)?;
                let value = self.parse_expr()?;
                entries.push((key, value));
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Node::Object(entries))
    }

    fn parse_array(&mut self) -> Result<Node, ExpressionError> {
        let mut items = Vec::new();
        if !matches!(self.peek(), Some(Token::RBracket)) {
            loop {
                items.push(self.parse_expr()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(Node::Array(items))
    }

    fn parse_if(&mut self) -> Result<Node, ExpressionError> {
        let cond = self.parse_expr()?;
        self.expect(&Token::Then)?;
        let then_branch = self.parse_expr()?;
        self.expect(&Token::Else)?;
        let else_branch = self.parse_expr()?;
        self.expect(&Token::End)?;
        Ok(Node::If(
            Box::new(cond),
            Box::new(then_branch),
            Box::new(else_branch),
        ))
    }
}

fn parse_string_literal(raw: &str, source: &str) -> Result<Node, ExpressionError> {
    if !raw.contains("\\(") {
        return Ok(Node::Literal(Value::String(raw.to_string())));
    }
    let mut parts = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find("\\(") {
        if start > 0 {
            parts.push(StrPart::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            return Err(ExpressionError::Parse {
                source_text: source.to_string(),
                reason: "unterminated string interpolation".to_string(),
            });
        };
        let inner_src = &after[..end];
        let tokens = lex(inner_src, source)?;
        let mut p = Parser {
            tokens: &tokens,
            pos: 0,
            source,
        };
        let node = p.parse_expr()?;
        p.expect_end()?;
        parts.push(StrPart::Expr(Box::new(node)));
        rest = &after[end + 1..];
    }
    if !rest.is_empty() {
        parts.push(StrPart::Text(rest.to_string()));
    }
    Ok(Node::InterpolatedString(parts))
}

// ===========================================================================
// Evaluator
// ===========================================================================

fn eval_node(node: &Node, root: &Value, source: &str) -> Result<Value, ExpressionError> {
    match node {
        Node::Identity => Ok(root.clone()),
        Node::Field(base, name) => {
            let base_val = eval_node(base, root, source)?;
            Ok(base_val
                .as_object()
                .and_then(|m| m.get(name))
                .cloned()
                .unwrap_or(Value::Null))
        }
        Node::Literal(v) => Ok(v.clone()),
        Node::InterpolatedString(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    StrPart::Text(t) => out.push_str(t),
                    StrPart::Expr(e) => {
                        let v = eval_node(e, root, source)?;
                        out.push_str(&stringify(&v));
                    }
                }
            }
            Ok(Value::String(out))
        }
        Node::Object(entries) => {
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (k, v) in entries {
                map.insert(k.clone(), eval_node(v, root, source)?);
            }
            Ok(Value::Object(map))
        }
        Node::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(eval_node(item, root, source)?);
            }
            Ok(Value::Array(out))
        }
        Node::Default(lhs, rhs) => {
            let left = eval_node(lhs, root, source)?;
            let is_empty = matches!(left, Value::Null);
            if is_empty {
                eval_node(rhs, root, source)
            } else {
                Ok(left)
            }
        }
        Node::BinOp(op, lhs, rhs) => eval_binop(*op, lhs, rhs, root, source),
        Node::Not(inner) => {
            let v = eval_node(inner, root, source)?;
            Ok(Value::Bool(!is_truthy(&v)))
        }
        Node::Method(base, method, args) => eval_method(base, *method, args, root, source),
        Node::If(cond, then_branch, else_branch) => {
            let c = eval_node(cond, root, source)?;
            if is_truthy(&c) {
                eval_node(then_branch, root, source)
            } else {
                eval_node(else_branch, root, source)
            }
        }
    }
}

fn eval_binop(
    op: BinOp,
    lhs: &Node,
    rhs: &Node,
    root: &Value,
    source: &str,
) -> Result<Value, ExpressionError> {
    match op {
        BinOp::And => {
            let l = eval_node(lhs, root, source)?;
            if !is_truthy(&l) {
                return Ok(Value::Bool(false));
            }
            let r = eval_node(rhs, root, source)?;
            Ok(Value::Bool(is_truthy(&r)))
        }
        BinOp::Or => {
            let l = eval_node(lhs, root, source)?;
            if is_truthy(&l) {
                return Ok(Value::Bool(true));
            }
            let r = eval_node(rhs, root, source)?;
            Ok(Value::Bool(is_truthy(&r)))
        }
        BinOp::Eq => Ok(Value::Bool(
            eval_node(lhs, root, source)? == eval_node(rhs, root, source)?,
        )),
        BinOp::Ne => Ok(Value::Bool(
            eval_node(lhs, root, source)? != eval_node(rhs, root, source)?,
        )),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let l = eval_node(lhs, root, source)?;
            let r = eval_node(rhs, root, source)?;
            compare(op, &l, &r, source)
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let l = eval_node(lhs, root, source)?;
            let r = eval_node(rhs, root, source)?;
            arithmetic(op, &l, &r, source)
        }
    }
}

fn compare(op: BinOp, l: &Value, r: &Value, source: &str) -> Result<Value, ExpressionError> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or(f64::NAN)
            .partial_cmp(&b.as_f64().unwrap_or(f64::NAN)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(ExpressionError::TypeMismatch {
                source_text: source.to_string(),
                reason: format!("cannot compare {l:?} with {r:?}"),
            });
        }
    };
    let Some(ordering) = ordering else {
        return Err(ExpressionError::TypeMismatch {
            source_text: source.to_string(),
            reason: "comparison produced no ordering (NaN?)".to_string(),
        });
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinOp, l: &Value, r: &Value, source: &str) -> Result<Value, ExpressionError> {
    let (Value::Number(a), Value::Number(b)) = (l, r) else {
        return Err(ExpressionError::TypeMismatch {
            source_text: source.to_string(),
            reason: format!("cannot apply arithmetic to {l:?} and {r:?} (use `//` for a default)"),
        });
    };
    let a = a.as_f64().unwrap_or_default();
    let b = b.as_f64().unwrap_or_default();
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => unreachable!(),
    };
    if result.fract() == 0.0 && result.is_finite() {
        Ok(Value::Number((result as i64).into()))
    } else {
        Ok(serde_json::Number::from_f64(result)
            .map(Value::Number)
            .unwrap_or(Value::Null))
    }
}

fn eval_method(
    base: &Node,
    method: Method,
    args: &[Node],
    root: &Value,
    source: &str,
) -> Result<Value, ExpressionError> {
    let base_val = eval_node(base, root, source)?;
    let arg_val = match args.first() {
        Some(n) => eval_node(n, root, source)?,
        None => Value::Null,
    };
    match method {
        Method::Contains => Ok(Value::Bool(match (&base_val, &arg_val) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Array(items), needle) => items.contains(needle),
            _ => false,
        })),
        Method::StartsWith => {
            let needle = arg_val.as_str().unwrap_or_default();
            Ok(Value::Bool(
                base_val.as_str().is_some_and(|s| s.starts_with(needle)),
            ))
        }
        Method::EndsWith => {
            let needle = arg_val.as_str().unwrap_or_default();
            Ok(Value::Bool(
                base_val.as_str().is_some_and(|s| s.ends_with(needle)),
            ))
        }
        Method::Test => {
            let pattern = arg_val.as_str().unwrap_or_default();
            let re = Regex::new(pattern).map_err(|e| ExpressionError::Parse {
                source_text: source.to_string(),
                reason: format!("invalid regex `{pattern}`: {e}"),
            })?;
            Ok(Value::Bool(
                base_val.as_str().is_some_and(|s| re.is_match(s)),
            ))
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
