//! `${...}` expression evaluation
//!
//! A small Python-flavoured expression language: numbers, quoted strings,
//! property names, arithmetic (`+ - * / // % **`), comparisons, `and`/`or`/`not`,
//! `a if cond else b`, and a handful of math builtins (`radians`, `sin`, ...).
//! Expressions are parsed to a tree first so that `and`, `or` and conditionals
//! only evaluate the branch they take.

use std::cmp::Ordering;
use std::fmt;

/// A property or expression value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Interpret literal text: integers and floats become numbers, anything
    /// else stays a string
    pub fn from_literal(text: &str) -> Self {
        let trimmed = text.trim();
        let numeric = trimmed
            .trim_start_matches(['+', '-'])
            .starts_with(|c: char| c.is_ascii_digit() || c == '.');

        if numeric {
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::Int(i);
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                return Value::Float(f);
            }
        }
        Value::Str(text.to_string())
    }

    /// Boolean reading used by `xacro:if`/`xacro:unless`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => match s.trim() {
                "true" | "True" | "1" => Some(true),
                "false" | "False" | "0" => Some(false),
                _ => None,
            },
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
        }
    }

    fn number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            Value::Str(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Shortest round-tripping form with a signed, two-digit exponent (`1e+16`,
/// `1.5e-05`), as Python's `repr` prints floats
fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    // Debug keeps the trailing ".0" on whole floats
    let repr = format!("{:?}", x);
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => repr,
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

/// Errors that can occur while evaluating an expression
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("name '{0}' is not defined")]
    UndefinedName(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),
}

/// Evaluate `expression`, resolving names through `lookup`
pub fn evaluate(
    expression: &str,
    lookup: &dyn Fn(&str) -> Option<Value>,
) -> Result<Value, ExprError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ExprError::Syntax("empty expression".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expression()?;
    if let Some(token) = parser.peek() {
        return Err(ExprError::Syntax(format!("unexpected {}", token)));
    }

    eval(&expr, lookup)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Value),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(v) => write!(f, "number {}", v),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Ident(name) => write!(f, "name '{}'", name),
            Token::Op(op) => write!(f, "'{}'", op),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

/// Longest operators first
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+", "-", "*", "/", "%", "<", ">",
];

const KEYWORDS: &[&str] = &["and", "or", "not", "if", "else"];

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let starts_number = c.is_ascii_digit()
            || (c == b'.' && bytes.get(i + 1).is_some_and(|d| d.is_ascii_digit()));
        if starts_number {
            let start = i;
            let mut is_float = false;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i < bytes.len() && bytes[i] == b'.' {
                is_float = true;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
            }
            if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                let mut j = i + 1;
                if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].is_ascii_digit() {
                    is_float = true;
                    i = j;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }

            let text = &input[start..i];
            let value = if is_float {
                text.parse().map(Value::Float).ok()
            } else {
                text.parse().map(Value::Int).ok()
            };
            let value =
                value.ok_or_else(|| ExprError::Syntax(format!("invalid number '{}'", text)))?;
            tokens.push(Token::Number(value));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token::Ident(input[start..i].to_string()));
            continue;
        }

        if c == b'\'' || c == b'"' {
            let quote = c as char;
            let rest = &input[i + 1..];
            let end = rest
                .find(quote)
                .ok_or_else(|| ExprError::Syntax("unterminated string".to_string()))?;
            tokens.push(Token::Str(rest[..end].to_string()));
            i += end + 2;
            continue;
        }

        match c {
            b'(' => tokens.push(Token::LParen),
            b')' => tokens.push(Token::RParen),
            b',' => tokens.push(Token::Comma),
            _ => {
                let rest = &input[i..];
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| {
                        let found = rest.chars().next().unwrap_or_default();
                        ExprError::Syntax(format!("unexpected character '{}'", found))
                    })?;
                tokens.push(Token::Op(*op));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "//" => BinaryOp::FloorDiv,
            "%" => BinaryOp::Rem,
            "**" => BinaryOp::Pow,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Name(String),
    Call(String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        then: Box<Expr>,
        condition: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(name)) if name == keyword) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_op(&mut self, ops: &[&str]) -> Option<BinaryOp> {
        if let Some(Token::Op(op)) = self.peek() {
            if ops.contains(op) {
                let op = BinaryOp::from_symbol(op);
                self.pos += 1;
                return op;
            }
        }
        None
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::Syntax(format!(
                "expected {}, found {}",
                expected, token
            ))),
            None => Err(ExprError::Syntax(format!(
                "expected {}, found end of expression",
                expected
            ))),
        }
    }

    /// `or_expr [if or_expr else expression]`
    fn expression(&mut self) -> Result<Expr, ExprError> {
        let then = self.or()?;
        if !self.eat_keyword("if") {
            return Ok(then);
        }
        let condition = self.or()?;
        if !self.eat_keyword("else") {
            return Err(ExprError::Syntax("expected 'else'".to_string()));
        }
        let otherwise = self.expression()?;
        Ok(Expr::Conditional {
            then: Box::new(then),
            condition: Box::new(condition),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let operand = self.not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.additive()?;
        while let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.term()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "//", "%"]) {
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Op("-")) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Some(Token::Op("+")) => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.unary()?)))
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.atom()?;
        if self.eat_op(&["**"]).is_some() {
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, ExprError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Literal(value)),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Ok(Expr::Literal(Value::Bool(true))),
                "False" => Ok(Expr::Literal(Value::Bool(false))),
                keyword if KEYWORDS.contains(&keyword) => Err(ExprError::Syntax(format!(
                    "unexpected keyword '{}'",
                    keyword
                ))),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.expression()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::Call(name, args))
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(token) => Err(ExprError::Syntax(format!("unexpected {}", token))),
            None => Err(ExprError::Syntax("unexpected end of expression".to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, lookup: &dyn Fn(&str) -> Option<Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => lookup(name)
            .or_else(|| constant(name))
            .ok_or_else(|| ExprError::UndefinedName(name.clone())),
        Expr::Call(name, args) => {
            let values = args
                .iter()
                .map(|arg| eval(arg, lookup))
                .collect::<Result<Vec<_>, _>>()?;
            call_builtin(name, &values)
        }
        Expr::Unary(op, operand) => unary(*op, eval(operand, lookup)?),
        Expr::Binary(op, left, right) => binary(*op, eval(left, lookup)?, eval(right, lookup)?),
        Expr::And(left, right) => {
            let left = eval(left, lookup)?;
            if left.truthy() {
                eval(right, lookup)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval(left, lookup)?;
            if left.truthy() {
                Ok(left)
            } else {
                eval(right, lookup)
            }
        }
        Expr::Conditional {
            then,
            condition,
            otherwise,
        } => {
            if eval(condition, lookup)?.truthy() {
                eval(then, lookup)
            } else {
                eval(otherwise, lookup)
            }
        }
    }
}

fn constant(name: &str) -> Option<Value> {
    match name {
        "pi" => Some(Value::Float(std::f64::consts::PI)),
        "e" => Some(Value::Float(std::f64::consts::E)),
        "inf" => Some(Value::Float(f64::INFINITY)),
        _ => None,
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value, ExprError> {
    if op == UnaryOp::Not {
        return Ok(Value::Bool(!value.truthy()));
    }

    match value.number() {
        Some(Number::Int(i)) => {
            if op == UnaryOp::Neg {
                i.checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| ExprError::Type("integer overflow".to_string()))
            } else {
                Ok(Value::Int(i))
            }
        }
        Some(Number::Float(f)) => Ok(Value::Float(if op == UnaryOp::Neg { -f } else { f })),
        None => Err(ExprError::Type(format!(
            "bad operand type for unary operator: '{}'",
            value.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&left, &right)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinaryOp::Add => match (&left, &right) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ => arithmetic(op, &left, &right),
        },
        _ => arithmetic(op, &left, &right),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.number(), right.number()) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => a == b,
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Result<Ordering, ExprError> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    match (left.number(), right.number()) {
        (Some(Number::Int(a)), Some(Number::Int(b))) => Ok(a.cmp(&b)),
        (Some(a), Some(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .ok_or_else(|| ExprError::Type("cannot order NaN".to_string())),
        _ => Err(ExprError::Type(format!(
            "cannot compare '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let (Some(a), Some(b)) = (left.number(), right.number()) else {
        return Err(ExprError::Type(format!(
            "unsupported operand types for {:?}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        )));
    };

    let overflow = || ExprError::Type("integer overflow".to_string());

    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        return match op {
            BinaryOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinaryOp::Div if y == 0 => Err(ExprError::DivisionByZero),
            BinaryOp::Div => Ok(Value::Float(x as f64 / y as f64)),
            BinaryOp::FloorDiv | BinaryOp::Rem if y == 0 => Err(ExprError::DivisionByZero),
            BinaryOp::FloorDiv => {
                let q = x.checked_div(y).ok_or_else(overflow)?;
                let floored = if x % y != 0 && ((x < 0) != (y < 0)) {
                    q - 1
                } else {
                    q
                };
                Ok(Value::Int(floored))
            }
            BinaryOp::Rem => {
                // The result takes the sign of the divisor; MIN % -1 is 0
                let r = x.wrapping_rem(y);
                let floored = if r != 0 && ((r < 0) != (y < 0)) {
                    r + y
                } else {
                    r
                };
                Ok(Value::Int(floored))
            }
            BinaryOp::Pow => match u32::try_from(y) {
                Ok(exp) => x.checked_pow(exp).map(Value::Int).ok_or_else(overflow),
                Err(_) if y < 0 => Ok(Value::Float((x as f64).powf(y as f64))),
                Err(_) => Err(overflow()),
            },
            _ => Err(ExprError::Type(format!("{:?} is not arithmetic", op))),
        };
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Rem if y == 0.0 => {
            return Err(ExprError::DivisionByZero)
        }
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Rem => x - y * (x / y).floor(),
        BinaryOp::Pow => x.powf(y),
        _ => return Err(ExprError::Type(format!("{:?} is not arithmetic", op))),
    };
    Ok(Value::Float(result))
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let float = |index: usize| -> Result<f64, ExprError> {
        args.get(index)
            .and_then(Value::number)
            .map(Number::as_f64)
            .ok_or_else(|| ExprError::Type(format!("{}() expects numeric arguments", name)))
    };

    let unary_float = |f: fn(f64) -> f64| -> Result<Value, ExprError> {
        if args.len() != 1 {
            return Err(ExprError::Type(format!(
                "{}() takes exactly one argument ({} given)",
                name,
                args.len()
            )));
        }
        Ok(Value::Float(f(float(0)?)))
    };

    match name {
        "radians" => unary_float(f64::to_radians),
        "degrees" => unary_float(f64::to_degrees),
        "sin" => unary_float(f64::sin),
        "cos" => unary_float(f64::cos),
        "tan" => unary_float(f64::tan),
        "asin" => unary_float(f64::asin),
        "acos" => unary_float(f64::acos),
        "atan" => unary_float(f64::atan),
        "exp" => unary_float(f64::exp),
        "sqrt" => {
            if float(0)? < 0.0 {
                return Err(ExprError::Type("math domain error".to_string()));
            }
            unary_float(f64::sqrt)
        }
        "log" => {
            if float(0)? <= 0.0 {
                return Err(ExprError::Type("math domain error".to_string()));
            }
            unary_float(f64::ln)
        }
        "atan2" if args.len() == 2 => Ok(Value::Float(float(0)?.atan2(float(1)?))),
        "pow" if args.len() == 2 => binary(BinaryOp::Pow, args[0].clone(), args[1].clone()),
        "abs" if args.len() == 1 => match args[0].number() {
            Some(Number::Int(i)) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| ExprError::Type("integer overflow".to_string())),
            Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
            None => Err(ExprError::Type("abs() expects a number".to_string())),
        },
        "floor" if args.len() == 1 => Ok(Value::Int(float(0)?.floor() as i64)),
        "ceil" if args.len() == 1 => Ok(Value::Int(float(0)?.ceil() as i64)),
        // Halves round to the even neighbour
        "round" if args.len() == 1 => Ok(Value::Int(float(0)?.round_ties_even() as i64)),
        "int" if args.len() == 1 => match &args[0] {
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| ExprError::Type(format!("invalid literal for int(): '{}'", s))),
            _ => Ok(Value::Int(float(0)?.trunc() as i64)),
        },
        "float" if args.len() == 1 => match &args[0] {
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ExprError::Type(format!("could not convert '{}' to float", s))),
            _ => Ok(Value::Float(float(0)?)),
        },
        "str" if args.len() == 1 => Ok(Value::Str(args[0].to_string())),
        "min" | "max" if !args.is_empty() => {
            let wanted = if name == "min" {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best = args[0].clone();
            for candidate in &args[1..] {
                if compare(candidate, &best)? == wanted {
                    best = candidate.clone();
                }
            }
            Ok(best)
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}
