//! Expression lexer and parser
//!
//! Parses the body of a `{{ ... }}` block into an [`Expr`] tree.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons,
//! `+ - ~`, `* /`, unary minus, filters (`|`), postfix access and calls.

use crate::error::{Error, Result};
use serde_json::Value;

// ============================================================================
// AST
// ============================================================================

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
    In,
}

/// Parsed template expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Root variable name
    Var(String),
    /// Attribute access `a.b`
    Attr(Box<Expr>, String),
    /// Subscript access `a['b']` or `a[0]`
    Index(Box<Expr>, Box<Expr>),
    /// Function call `name(args)`
    Call(String, Vec<Expr>),
    /// Filter application `value | name(args)`
    Filter(Box<Expr>, String, Vec<Expr>),
    /// Logical negation
    Not(Box<Expr>),
    /// Arithmetic negation
    Neg(Box<Expr>),
    /// Binary operation
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// List literal
    List(Vec<Expr>),
}

impl Expr {
    /// Dotted path for variable lookups, used in error messages
    pub fn path(&self) -> String {
        match self {
            Expr::Var(name) => name.clone(),
            Expr::Attr(base, name) => format!("{}.{name}", base.path()),
            Expr::Index(base, index) => match index.as_ref() {
                Expr::Literal(Value::String(s)) => format!("{}.{s}", base.path()),
                Expr::Literal(v) => format!("{}[{v}]", base.path()),
                _ => format!("{}[..]", base.path()),
            },
            _ => "<expression>".to_string(),
        }
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Sym(&'static str),
}

const SYMBOLS: [&str; 19] = [
    "==", "!=", "<=", ">=", "<", ">", "=", "(", ")", "[", "]", ".", ",", "|", "+", "-", "~", "*",
    "/",
];

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(Error::template(format!(
                            "Unterminated string literal in '{input}'"
                        )))
                    }
                    Some('\\') => {
                        if let Some(next) = chars.get(i + 1) {
                            s.push(*next);
                        }
                        i += 2;
                    }
                    Some(ch) if *ch == quote => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        s.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(s));
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let is_float = chars.get(i) == Some(&'.')
                && chars.get(i + 1).is_some_and(char::is_ascii_digit);
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().collect();
            if is_float {
                let f = text
                    .parse::<f64>()
                    .map_err(|e| Error::template(format!("Invalid number '{text}': {e}")))?;
                tokens.push(Token::Float(f));
            } else {
                let n = text
                    .parse::<i64>()
                    .map_err(|e| Error::template(format!("Invalid number '{text}': {e}")))?;
                tokens.push(Token::Int(n));
            }
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
        match SYMBOLS.iter().find(|sym| rest.starts_with(*sym)) {
            Some(sym) => {
                tokens.push(Token::Sym(*sym));
                i += sym.len();
            }
            None => {
                return Err(Error::template(format!(
                    "Unexpected character '{c}' in '{input}'"
                )))
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

/// Parse an expression body (the text between `{{` and `}}`)
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source: input,
    };
    let expr = parser.parse_or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::template(format!(
            "{message} at token {} in '{}'",
            self.pos, self.source
        ))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token::Sym(s)) if *s == sym)
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == word)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.peek_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.peek_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{sym}'")))
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.tokens.get(self.pos) {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected identifier")),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_keyword("and") {
            let right = self.parse_not()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Sym("==")) => BinOp::Eq,
            Some(Token::Sym("!=")) => BinOp::Ne,
            Some(Token::Sym("<")) => BinOp::Lt,
            Some(Token::Sym("<=")) => BinOp::Le,
            Some(Token::Sym(">")) => BinOp::Gt,
            Some(Token::Sym(">=")) => BinOp::Ge,
            Some(Token::Ident(s)) if s == "in" => BinOp::In,
            Some(Token::Ident(s)) if s == "not" => {
                // `a not in b`
                if matches!(self.tokens.get(self.pos + 1), Some(Token::Ident(w)) if w == "in") {
                    self.pos += 2;
                    let right = self.parse_additive()?;
                    return Ok(Expr::Not(Box::new(Expr::Binary(
                        BinOp::In,
                        Box::new(left),
                        Box::new(right),
                    ))));
                }
                return Ok(left);
            }
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinOp::Add
            } else if self.eat_sym("-") {
                BinOp::Sub
            } else if self.eat_sym("~") {
                BinOp::Concat
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinOp::Mul
            } else if self.eat_sym("/") {
                BinOp::Div
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat_sym("-") {
            return Ok(Expr::Neg(Box::new(self.parse_unary()?)));
        }
        self.parse_filtered()
    }

    fn parse_filtered(&mut self) -> Result<Expr> {
        let mut expr = self.parse_postfix()?;
        while self.eat_sym("|") {
            let name = self.expect_ident()?;
            let args = if self.peek_sym("(") {
                self.parse_args()?
            } else {
                Vec::new()
            };
            expr = Expr::Filter(Box::new(expr), name, args);
        }
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_sym(".") {
                let name = match self.tokens.get(self.pos) {
                    Some(Token::Ident(name)) => name.clone(),
                    Some(Token::Int(n)) => n.to_string(),
                    _ => return Err(self.error("expected attribute name")),
                };
                self.pos += 1;
                expr = Expr::Attr(Box::new(expr), name);
            } else if self.eat_sym("[") {
                let index = self.parse_or()?;
                self.expect_sym("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        if self.eat_sym(")") {
            return Ok(args);
        }
        loop {
            // keyword arguments are accepted positionally: `format='%Y'`
            if matches!(self.tokens.get(self.pos), Some(Token::Ident(_)))
                && matches!(self.tokens.get(self.pos + 1), Some(Token::Sym("=")))
            {
                self.pos += 2;
            }
            args.push(self.parse_or()?);
            if self.eat_sym(")") {
                return Ok(args);
            }
            self.expect_sym(",")?;
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| self.error("unexpected end of expression"))?;
        self.pos += 1;

        match token {
            Token::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Token::Float(f) => Ok(Expr::Literal(Value::from(f))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Sym("(") => {
                let expr = self.parse_or()?;
                self.expect_sym(")")?;
                Ok(expr)
            }
            Token::Sym("[") => {
                let mut items = Vec::new();
                if !self.eat_sym("]") {
                    loop {
                        items.push(self.parse_or()?);
                        if self.eat_sym("]") {
                            break;
                        }
                        self.expect_sym(",")?;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::Ident(name) => match name.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "none" | "None" => Ok(Expr::Literal(Value::Null)),
                _ if self.peek_sym("(") => {
                    let args = self.parse_args()?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Var(name)),
            },
            Token::Sym(sym) => {
                self.pos -= 1;
                Err(self.error(&format!("unexpected '{sym}'")))
            }
        }
    }
}
