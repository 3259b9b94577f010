//! Expression engine used by format rules, link mappings and the solver.
//!
//! Source text is tokenized, parsed into an [`Expr`] tree and compiled into
//! [`Bytecode`] for a small stack machine. Values are tagged: either a
//! [`Quantity`] (complex payload plus unit dimensions) or a string.

use crate::units::{Dimensions, Quantity, AMPERE, CANDELA, KELVIN, KILOGRAM, METRE, MOLE, SECOND};
use num_complex::Complex64;
use num_traits::Zero;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s) but was given {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("undefined variable '{0}'")]
    Undefined(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("unit error: {0}")]
    Unit(String),
    #[error("algebraic error: {0}")]
    Algebraic(String),
}

impl EvalError {
    fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Errors caused by the numeric value of an input rather than by the shape
    /// of the expression. These are recoverable inside the solver.
    pub fn is_algebraic(&self) -> bool {
        matches!(self, Self::Algebraic(_))
    }
}

/// A value on the VM stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(Quantity),
    Text(String),
}

impl Value {
    pub fn real(value: f64) -> Self {
        Self::Number(Quantity::dimensionless(value))
    }

    pub fn quantity(value: f64, dims: Dimensions) -> Self {
        Self::Number(Quantity::real(value, dims))
    }

    pub fn as_number(&self) -> Option<&Quantity> {
        match self {
            Self::Number(q) => Some(q),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(q) => {
                if q.is_real() {
                    write!(f, "{}", q.value.re)?;
                } else {
                    write!(f, "({}{:+}i)", q.value.re, q.value.im)?;
                }
                if !q.dims.is_dimensionless() {
                    write!(f, " {}", q.dims)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn holds(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            (Self::Lt, Some(Less)) => true,
            (Self::Le, Some(Less | Equal)) => true,
            (Self::Gt, Some(Greater)) => true,
            (Self::Ge, Some(Greater | Equal)) => true,
            (Self::Eq, Some(Equal)) => true,
            (Self::Ne, Some(Less | Greater)) | (Self::Ne, None) => true,
            _ => false,
        }
    }
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Logn,
    Sqrt,
    Abs,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Re,
    Im,
    Select,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "asin" => Self::Asin,
            "acos" => Self::Acos,
            "atan" => Self::Atan,
            "sinh" => Self::Sinh,
            "cosh" => Self::Cosh,
            "tanh" => Self::Tanh,
            "exp" => Self::Exp,
            "ln" | "log" => Self::Ln,
            "log10" => Self::Log10,
            "logn" => Self::Logn,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "round" => Self::Round,
            "min" => Self::Min,
            "max" => Self::Max,
            "Re" | "re" => Self::Re,
            "Im" | "im" => Self::Im,
            "select" => Self::Select,
            _ => return None,
        };
        Some(f)
    }

    fn arity(self) -> usize {
        match self {
            Self::Logn | Self::Min | Self::Max => 2,
            Self::Select => 3,
            _ => 1,
        }
    }
}

/// OpCodes for the stack machine.
#[derive(Debug, Clone, PartialEq)]
pub enum OpCode {
    /// Pushes a dimensionless real constant.
    LoadConst(f64),
    /// Pushes a string literal.
    LoadText(String),
    /// Pushes the current value of a scope slot.
    LoadSlot(usize),
    /// Pops (b, a), pushes a + b. Strings concatenate.
    Add,
    Sub,
    Mul,
    Div,
    /// Pops (b, a), pushes the floating-point remainder of a / b.
    Mod,
    Pow,
    Neg,
    /// Pops (b, a), pushes 1 when the comparison holds and 0 otherwise.
    Compare(Comparison),
    /// Pops the given number of arguments and pushes the result of the call.
    Call(Function, usize),
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based virtual machine.
///
/// The VM is stateless; `execute` reads slot values from the scope and uses
/// the caller's stack buffer for intermediates.
pub struct VM;

impl VM {
    pub fn execute(
        bytecode: &Bytecode,
        scope: &Scope,
        stack: &mut Vec<Value>,
    ) -> Result<Value, EvalError> {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(Value::real(*val)),
                OpCode::LoadText(text) => stack.push(Value::Text(text.clone())),
                OpCode::LoadSlot(slot) => match scope.value(*slot) {
                    Some(v) => stack.push(v.clone()),
                    None => return Err(EvalError::Undefined(scope.name_of(*slot).to_string())),
                },
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    stack.push(add(a, b)?);
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    let (a, b) = (number(a, "-")?, number(b, "-")?);
                    same_units(&a, &b, "subtract")?;
                    stack.push(finite(a.value - b.value, a.dims)?);
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    let (a, b) = (number(a, "*")?, number(b, "*")?);
                    stack.push(finite(a.value * b.value, a.dims.multiply(&b.dims))?);
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    let (a, b) = (number(a, "/")?, number(b, "/")?);
                    if b.value.is_zero() {
                        return Err(EvalError::Algebraic("division by zero".to_string()));
                    }
                    stack.push(finite(a.value / b.value, a.dims.divide(&b.dims))?);
                }
                OpCode::Mod => {
                    let (a, b) = pop_pair(stack)?;
                    let (a, b) = (number(a, "%")?, number(b, "%")?);
                    same_units(&a, &b, "take the modulo of")?;
                    let (x, y) = (real(&a, "%")?, real(&b, "%")?);
                    if y == 0.0 {
                        return Err(EvalError::Algebraic("modulo by zero".to_string()));
                    }
                    stack.push(finite(Complex64::new(x % y, 0.0), a.dims)?);
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    let (a, b) = (number(a, "^")?, number(b, "^")?);
                    stack.push(power(a, b)?);
                }
                OpCode::Neg => {
                    let a = number(pop(stack)?, "-")?;
                    stack.push(Value::Number(Quantity::new(-a.value, a.dims)));
                }
                OpCode::Compare(cmp) => {
                    let (a, b) = pop_pair(stack)?;
                    stack.push(Value::real(if compare(*cmp, a, b)? { 1.0 } else { 0.0 }));
                }
                OpCode::Call(func, argc) => {
                    if stack.len() < *argc {
                        return Err(EvalError::Type("malformed bytecode".to_string()));
                    }
                    let args = stack.split_off(stack.len() - argc);
                    stack.push(call(*func, args)?);
                }
            }
        }

        pop(stack)
    }
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, EvalError> {
    stack
        .pop()
        .ok_or_else(|| EvalError::Type("malformed bytecode".to_string()))
}

fn pop_pair(stack: &mut Vec<Value>) -> Result<(Value, Value), EvalError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

fn number(v: Value, op: &str) -> Result<Quantity, EvalError> {
    match v {
        Value::Number(q) => Ok(q),
        Value::Text(_) => Err(EvalError::Type(format!(
            "operator '{op}' cannot be applied to a string"
        ))),
    }
}

fn real(q: &Quantity, what: &str) -> Result<f64, EvalError> {
    if q.is_real() {
        Ok(q.value.re)
    } else {
        Err(EvalError::Type(format!("{what} requires a real argument")))
    }
}

fn same_units(a: &Quantity, b: &Quantity, verb: &str) -> Result<(), EvalError> {
    if a.dims.matches(&b.dims) {
        Ok(())
    } else {
        Err(EvalError::Unit(format!(
            "cannot {verb} quantities with units of <{}> and <{}>",
            a.dims, b.dims
        )))
    }
}

fn dimensionless(q: &Quantity, name: &str) -> Result<(), EvalError> {
    if q.dims.is_dimensionless() {
        Ok(())
    } else {
        Err(EvalError::Unit(format!(
            "{name}() requires a dimensionless argument, got <{}>",
            q.dims
        )))
    }
}

fn finite(value: Complex64, dims: Dimensions) -> Result<Value, EvalError> {
    if value.re.is_finite() && value.im.is_finite() {
        Ok(Value::Number(Quantity::new(value, dims)))
    } else {
        Err(EvalError::Algebraic("result is not finite".to_string()))
    }
}

fn add(a: Value, b: Value) -> Result<Value, EvalError> {
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => Ok(Value::Text(a + &b)),
        (a, b) => {
            let (a, b) = (number(a, "+")?, number(b, "+")?);
            same_units(&a, &b, "add")?;
            finite(a.value + b.value, a.dims)
        }
    }
}

fn power(base: Quantity, exponent: Quantity) -> Result<Value, EvalError> {
    dimensionless(&exponent, "pow")?;
    if !base.dims.is_dimensionless() && !exponent.is_real() {
        return Err(EvalError::Unit(
            "a quantity with units cannot be raised to a complex power".to_string(),
        ));
    }
    let dims = base.dims.powf(exponent.value.re);
    if base.value.is_zero() && exponent.value.re < 0.0 {
        return Err(EvalError::Algebraic("zero raised to a negative power".to_string()));
    }
    let value = if base.is_real()
        && exponent.is_real()
        && (base.value.re >= 0.0 || exponent.value.re.fract() == 0.0)
    {
        Complex64::new(base.value.re.powf(exponent.value.re), 0.0)
    } else {
        base.value.powc(exponent.value)
    };
    finite(value, dims)
}

fn compare(cmp: Comparison, a: Value, b: Value) -> Result<bool, EvalError> {
    match (a, b) {
        (Value::Text(a), Value::Text(b)) => match cmp {
            Comparison::Eq => Ok(a == b),
            Comparison::Ne => Ok(a != b),
            _ => Ok(cmp.holds(a.partial_cmp(&b))),
        },
        (Value::Number(a), Value::Number(b)) => {
            same_units(&a, &b, "compare")?;
            match cmp {
                Comparison::Eq => Ok(a.value == b.value),
                Comparison::Ne => Ok(a.value != b.value),
                _ => Ok(cmp.holds(real(&a, "comparison")?.partial_cmp(&real(&b, "comparison")?))),
            }
        }
        _ => Err(EvalError::Type("cannot compare a string with a number".to_string())),
    }
}

/// Applies a real function, falling back to the complex branch when the real
/// result is undefined.
fn real_or_complex(
    q: Quantity,
    real_fn: fn(f64) -> f64,
    complex_fn: fn(Complex64) -> Complex64,
) -> Result<Value, EvalError> {
    if q.is_real() {
        let r = real_fn(q.value.re);
        if !r.is_nan() {
            return finite(Complex64::new(r, 0.0), q.dims);
        }
    }
    finite(complex_fn(q.value), q.dims)
}

fn principal_ln(z: Complex64) -> Complex64 {
    if z.im == 0.0 && z.re > 0.0 {
        Complex64::new(z.re.ln(), 0.0)
    } else {
        z.ln()
    }
}

fn call(func: Function, args: Vec<Value>) -> Result<Value, EvalError> {
    if func == Function::Select {
        let mut args = args.into_iter();
        let (cond, a, b) = match (args.next(), args.next(), args.next()) {
            (Some(c), Some(a), Some(b)) => (c, a, b),
            _ => return Err(EvalError::Type("malformed bytecode".to_string())),
        };
        let cond = number(cond, "select")?;
        return Ok(if cond.value.is_zero() { b } else { a });
    }

    let mut nums = Vec::with_capacity(args.len());
    for arg in args {
        nums.push(number(arg, "function call")?);
    }
    let x = nums[0];
    let name = format!("{func:?}").to_lowercase();

    match func {
        Function::Abs => finite(Complex64::new(x.value.norm(), 0.0), x.dims),
        Function::Re => finite(Complex64::new(x.value.re, 0.0), x.dims),
        Function::Im => finite(Complex64::new(x.value.im, 0.0), x.dims),
        Function::Floor | Function::Ceil | Function::Round => {
            let v = real(&x, &name)?;
            let r = match func {
                Function::Floor => v.floor(),
                Function::Ceil => v.ceil(),
                _ => v.round(),
            };
            finite(Complex64::new(r, 0.0), x.dims)
        }
        Function::Min | Function::Max => {
            let y = nums[1];
            same_units(&x, &y, "compare")?;
            let (a, b) = (real(&x, &name)?, real(&y, &name)?);
            let r = if func == Function::Min { a.min(b) } else { a.max(b) };
            finite(Complex64::new(r, 0.0), x.dims)
        }
        Function::Sqrt => {
            let dims = x.dims.powf(0.5);
            let value = if x.is_real() && x.value.re >= 0.0 {
                Complex64::new(x.value.re.sqrt(), 0.0)
            } else {
                x.value.sqrt()
            };
            finite(value, dims)
        }
        _ => {
            dimensionless(&x, &name)?;
            match func {
                Function::Sin => real_or_complex(x, f64::sin, Complex64::sin),
                Function::Cos => real_or_complex(x, f64::cos, Complex64::cos),
                Function::Tan => real_or_complex(x, f64::tan, Complex64::tan),
                Function::Asin => real_or_complex(x, f64::asin, Complex64::asin),
                Function::Acos => real_or_complex(x, f64::acos, Complex64::acos),
                Function::Atan => real_or_complex(x, f64::atan, Complex64::atan),
                Function::Sinh => real_or_complex(x, f64::sinh, Complex64::sinh),
                Function::Cosh => real_or_complex(x, f64::cosh, Complex64::cosh),
                Function::Tanh => real_or_complex(x, f64::tanh, Complex64::tanh),
                Function::Exp => real_or_complex(x, f64::exp, Complex64::exp),
                Function::Ln | Function::Log10 | Function::Logn => {
                    if x.value.is_zero() {
                        return Err(EvalError::Algebraic(format!("{name}() of zero")));
                    }
                    let ln = principal_ln(x.value);
                    let divisor = match func {
                        Function::Ln => Complex64::new(1.0, 0.0),
                        Function::Log10 => Complex64::new(std::f64::consts::LN_10, 0.0),
                        _ => {
                            let base = nums[1];
                            dimensionless(&base, &name)?;
                            let lb = principal_ln(base.value);
                            if lb.is_zero() {
                                return Err(EvalError::Algebraic(
                                    "logarithm to base one".to_string(),
                                ));
                            }
                            lb
                        }
                    };
                    finite(ln / divisor, Dimensions::dimensionless())
                }
                _ => Err(EvalError::UnknownFunction(name)),
            }
        }
    }
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // + - * / % ^
    Compare(Box<Expr>, Comparison, Box<Expr>),
    Unary(char, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, EvalError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(EvalError::syntax(parser.offset(), "unexpected trailing input")),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Text(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Cmp(Comparison),
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else if (d == 'e' || d == 'E') && !num_str.contains(['e', 'E']) {
                    num_str.push(d);
                    chars.next();
                    if let Some(&(_, sign)) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            num_str.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| EvalError::syntax(start, format!("malformed number '{num_str}'")))?;
            tokens.push((Token::Number(value), start));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Identifier(ident), start));
        } else if c == '"' || c == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            for (_, d) in chars.by_ref() {
                if d == c {
                    closed = true;
                    break;
                }
                text.push(d);
            }
            if !closed {
                return Err(EvalError::syntax(start, "unterminated string literal"));
            }
            tokens.push((Token::Text(text), start));
        } else {
            chars.next();
            let next = chars.peek().map(|&(_, d)| d);
            let mut two = |token: Token| {
                chars.next();
                token
            };
            let token = match (c, next) {
                ('*', Some('*')) => two(Token::Caret),
                ('<', Some('=')) => two(Token::Cmp(Comparison::Le)),
                ('>', Some('=')) => two(Token::Cmp(Comparison::Ge)),
                ('=', Some('=')) => two(Token::Cmp(Comparison::Eq)),
                ('!', Some('=')) => two(Token::Cmp(Comparison::Ne)),
                ('<', Some('>')) => two(Token::Cmp(Comparison::Ne)),
                ('<', _) => Token::Cmp(Comparison::Lt),
                ('>', _) => Token::Cmp(Comparison::Gt),
                ('+', _) => Token::Plus,
                ('-', _) => Token::Minus,
                ('*', _) => Token::Star,
                ('/', _) => Token::Slash,
                ('%', _) => Token::Percent,
                ('^', _) => Token::Caret,
                (',', _) => Token::Comma,
                ('(', _) => Token::LParen,
                (')', _) => Token::RParen,
                _ => return Err(EvalError::syntax(start, format!("unexpected character '{c}'"))),
            };
            tokens.push((token, start));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(t, _)| t.clone())
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.peek()?;
        self.pos += 1;
        Some(t)
    }

    fn expect_rparen(&mut self) -> Result<(), EvalError> {
        let offset = self.offset();
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(EvalError::syntax(offset, "expected ')'")),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, EvalError> {
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        while let Some(Token::Cmp(cmp)) = self.peek() {
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Compare(Box::new(left), cmp, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_factor_op()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_factor_op()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor_op(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                Token::Percent => '%',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Unary('-', Box::new(expr)))
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    /// Exponentiation binds tighter than unary minus and is right-associative,
    /// so `-2^2` is `-(2^2)` and `2^3^2` is `2^(3^2)`.
    fn parse_power(&mut self) -> Result<Expr, EvalError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let offset = self.offset();
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Text(s)) => Ok(Expr::Text(s)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume(); // eat '('
                    let mut args = Vec::new();
                    if let Some(Token::RParen) = self.peek() {
                        self.consume();
                        return Ok(Expr::Call(name, args));
                    }
                    loop {
                        args.push(self.parse_expression()?);
                        if let Some(Token::Comma) = self.peek() {
                            self.consume();
                            continue;
                        }
                        self.expect_rparen()?;
                        return Ok(Expr::Call(name, args));
                    }
                }
                Ok(Expr::Variable(name))
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(_) => Err(EvalError::syntax(offset, "unexpected token")),
            None => Err(EvalError::syntax(offset, "unexpected end of expression")),
        }
    }
}

// --- Scope ---

/// Named variable slots shared by every compiled expression of a canvas.
///
/// Compiling an expression reserves a slot for each identifier it mentions,
/// so later bindings are visible to already-compiled bytecode.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    slots: HashMap<String, usize>,
    names: Vec<String>,
    values: Vec<Option<Value>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope pre-populated with the SI base units, a handful of derived and
    /// prefixed units, and `pi`.
    pub fn with_si_units() -> Self {
        let mut scope = Self::new();
        let base = |i| Dimensions::base(i);
        let m = base(METRE);
        let kg = base(KILOGRAM);
        let s = base(SECOND);
        let newton = kg.multiply(&m).divide(&s.powf(2.0));
        let joule = newton.multiply(&m);
        let watt = joule.divide(&s);
        let units: [(&str, f64, Dimensions); 18] = [
            ("m", 1.0, m),
            ("kg", 1.0, kg),
            ("s", 1.0, s),
            ("A", 1.0, base(AMPERE)),
            ("K", 1.0, base(KELVIN)),
            ("mol", 1.0, base(MOLE)),
            ("cd", 1.0, base(CANDELA)),
            ("g", 1e-3, kg),
            ("km", 1e3, m),
            ("cm", 1e-2, m),
            ("mm", 1e-3, m),
            ("ms", 1e-3, s),
            ("N", 1.0, newton),
            ("J", 1.0, joule),
            ("W", 1.0, watt),
            ("Hz", 1.0, Dimensions::dimensionless().divide(&s)),
            ("Pa", 1.0, newton.divide(&m.powf(2.0))),
            ("pi", std::f64::consts::PI, Dimensions::dimensionless()),
        ];
        for (name, value, dims) in units {
            scope.define(name, Value::quantity(value, dims));
        }
        scope
    }

    /// Returns the slot for `name`, creating an unset one if needed.
    pub fn reserve(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.slots.get(name) {
            return slot;
        }
        let slot = self.values.len();
        self.slots.insert(name.to_string(), slot);
        self.names.push(name.to_string());
        self.values.push(None);
        slot
    }

    pub fn define(&mut self, name: &str, value: Value) -> usize {
        let slot = self.reserve(name);
        self.values[slot] = Some(value);
        slot
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).and_then(|slot| self.value(slot))
    }

    pub fn value(&self, slot: usize) -> Option<&Value> {
        self.values.get(slot).and_then(|v| v.as_ref())
    }

    pub fn set(&mut self, slot: usize, value: Option<Value>) {
        if let Some(entry) = self.values.get_mut(slot) {
            *entry = value;
        }
    }

    pub fn name_of(&self, slot: usize) -> &str {
        self.names.get(slot).map_or("?", |s| s.as_str())
    }

    /// Temporarily takes over the variable `name`. The previous value is
    /// restored when the returned guard is dropped.
    pub fn bind(&mut self, name: &str) -> Binding<'_> {
        let slot = self.reserve(name);
        let previous = self.values[slot].clone();
        Binding {
            scope: self,
            slot,
            previous,
        }
    }
}

/// Scoped binding of one variable; see [`Scope::bind`].
pub struct Binding<'a> {
    scope: &'a mut Scope,
    slot: usize,
    previous: Option<Value>,
}

impl Binding<'_> {
    pub fn set(&mut self, value: Value) {
        self.scope.values[self.slot] = Some(value);
    }

    pub fn set_quantity(&mut self, value: f64, dims: Dimensions) {
        self.set(Value::quantity(value, dims));
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn scope(&self) -> &Scope {
        &*self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut *self.scope
    }
}

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        self.scope.values[self.slot] = self.previous.take();
    }
}

// --- Compiler ---

/// Compiles an AST (`Expr`) into `Bytecode`, resolving identifiers to scope
/// slots.
pub struct Compiler<'s> {
    scope: &'s mut Scope,
}

impl<'s> Compiler<'s> {
    pub fn new(scope: &'s mut Scope) -> Self {
        Self { scope }
    }

    pub fn compile(&mut self, expr: &Expr) -> Result<Bytecode, EvalError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&mut self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), EvalError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Text(s) => ops.push(OpCode::LoadText(s.clone())),
            Expr::Variable(name) => ops.push(OpCode::LoadSlot(self.scope.reserve(name))),
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '%' => OpCode::Mod,
                    '^' => OpCode::Pow,
                    _ => return Err(EvalError::syntax(0, format!("unknown operator '{op}'"))),
                });
            }
            Expr::Compare(left, cmp, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(OpCode::Compare(*cmp));
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => return Err(EvalError::syntax(0, format!("unknown operator '{op}'"))),
                }
            }
            Expr::Call(name, args) => {
                let func = Function::lookup(name)
                    .ok_or_else(|| EvalError::UnknownFunction(name.clone()))?;
                if args.len() != func.arity() {
                    return Err(EvalError::Arity {
                        name: name.clone(),
                        expected: func.arity().to_string(),
                        got: args.len(),
                    });
                }
                for arg in args {
                    self.compile_recursive(arg, ops)?;
                }
                ops.push(OpCode::Call(func, args.len()));
            }
        }
        Ok(())
    }
}

// --- Expression ---

/// A compiled expression together with its reusable evaluation stack.
///
/// The stack uses interior mutability, so an `Expression` is `!Sync`.
#[derive(Debug)]
pub struct Expression {
    source: String,
    bytecode: Bytecode,
    stack: RefCell<Vec<Value>>,
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            bytecode: self.bytecode.clone(),
            stack: RefCell::new(Vec::with_capacity(16)),
        }
    }
}

impl Expression {
    pub fn compile(source: &str, scope: &mut Scope) -> Result<Self, EvalError> {
        let ast = parse(source)?;
        let bytecode = Compiler::new(scope).compile(&ast)?;
        Ok(Self {
            source: source.trim().to_string(),
            bytecode,
            stack: RefCell::new(Vec::with_capacity(16)),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, EvalError> {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, scope, &mut stack)
    }

    /// Evaluates and requires a numeric result.
    pub fn evaluate_number(&self, scope: &Scope) -> Result<Quantity, EvalError> {
        match self.evaluate(scope)? {
            Value::Number(q) => Ok(q),
            Value::Text(_) => Err(EvalError::Type(format!(
                "expression '{}' evaluated to a string where a number was expected",
                self.source
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str, scope: &mut Scope) -> Result<Value, EvalError> {
        let expr = Expression::compile(source, scope)?;
        expr.evaluate(scope)
    }

    fn eval_real(source: &str) -> f64 {
        let mut scope = Scope::with_si_units();
        match eval(source, &mut scope).expect("expression should evaluate") {
            Value::Number(q) => {
                assert!(q.is_real(), "expected a real result for {source}");
                q.value.re
            }
            other => panic!("expected a number, got {other:?}"),
        }
    }

    #[test]
    fn arithmetic_precedence() {
        assert_eq!(eval_real("1 + 2 * 3"), 7.0);
        assert_eq!(eval_real("(1 + 2) * 3"), 9.0);
        assert_eq!(eval_real("-2^2"), -4.0);
        assert_eq!(eval_real("2^3^2"), 512.0);
        assert_eq!(eval_real("2**3"), 8.0);
        assert_eq!(eval_real("7 % 4"), 3.0);
        assert_eq!(eval_real("1.5e3 / 3"), 500.0);
        assert_eq!(eval_real("2 < 3"), 1.0);
        assert_eq!(eval_real("select(0, 10, 20)"), 20.0);
    }

    #[test]
    fn functions_and_logarithms() {
        assert!((eval_real("logn(1000, 10)") - 3.0).abs() < 1e-12);
        assert!((eval_real("log10(0.01)") + 2.0).abs() < 1e-12);
        assert!((eval_real("sin(pi / 2)") - 1.0).abs() < 1e-12);
        assert_eq!(eval_real("max(2, 5)"), 5.0);
        assert_eq!(eval_real("floor(2.7)"), 2.0);
    }

    #[test]
    fn negative_square_root_is_complex() {
        let mut scope = Scope::new();
        let value = eval("sqrt(-4)", &mut scope).expect("sqrt should evaluate");
        let q = value.as_number().expect("number");
        assert!((q.value.im - 2.0).abs() < 1e-12);
        assert!(q.value.re.abs() < 1e-12);
    }

    #[test]
    fn units_are_tracked_and_checked() {
        let mut scope = Scope::with_si_units();
        let value = eval("3 * km / s", &mut scope).expect("should evaluate");
        let q = value.as_number().expect("number");
        assert_eq!(q.value.re, 3000.0);
        assert_eq!(q.dims.0[METRE], 1.0);
        assert_eq!(q.dims.0[SECOND], -1.0);

        let err = eval("1 * m + 1 * s", &mut scope).expect_err("mismatch should fail");
        assert!(matches!(err, EvalError::Unit(_)), "unexpected error: {err}");
    }

    #[test]
    fn strings_concatenate_and_reject_arithmetic() {
        let mut scope = Scope::new();
        let value = eval("'ab' + \"cd\"", &mut scope).expect("concat");
        assert_eq!(value.as_text(), Some("abcd"));

        let err = eval("'ab' * 2", &mut scope).expect_err("type error expected");
        assert!(matches!(err, EvalError::Type(_)), "unexpected error: {err}");
    }

    #[test]
    fn algebraic_failures_are_reported() {
        let mut scope = Scope::new();
        let err = eval("1 / 0", &mut scope).expect_err("division by zero");
        assert!(err.is_algebraic(), "unexpected error: {err}");
        let err = eval("ln(0)", &mut scope).expect_err("log of zero");
        assert!(err.is_algebraic(), "unexpected error: {err}");
    }

    #[test]
    fn parse_errors_carry_offsets() {
        match parse("1 + $") {
            Err(EvalError::Syntax { offset, .. }) => assert_eq!(offset, 4),
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert!(matches!(parse("(1 + 2"), Err(EvalError::Syntax { .. })));
        let mut scope = Scope::new();
        let err = Expression::compile("nosuch(1)", &mut scope).expect_err("unknown function");
        assert!(matches!(err, EvalError::UnknownFunction(_)));
        let err = Expression::compile("logn(1)", &mut scope).expect_err("arity");
        assert!(matches!(err, EvalError::Arity { .. }));
    }

    #[test]
    fn binding_restores_previous_value() {
        let mut scope = Scope::new();
        scope.define("x", Value::real(1.0));
        let expr = Expression::compile("x * 2", &mut scope).expect("compile");
        {
            let mut binding = scope.bind("x");
            binding.set(Value::real(21.0));
            let v = expr.evaluate(binding.scope()).expect("eval");
            assert_eq!(v, Value::real(42.0));
        }
        assert_eq!(scope.get("x"), Some(&Value::real(1.0)));

        {
            let mut binding = scope.bind("fresh");
            binding.set(Value::real(3.0));
        }
        assert_eq!(scope.get("fresh"), None);
    }

    #[test]
    fn undefined_variables_are_reported_at_evaluation() {
        let mut scope = Scope::new();
        let expr = Expression::compile("y + 1", &mut scope).expect("compile reserves y");
        let err = expr.evaluate(&scope).expect_err("y is unset");
        assert_eq!(err, EvalError::Undefined("y".to_string()));
        scope.define("y", Value::real(2.0));
        assert_eq!(expr.evaluate(&scope).expect("eval"), Value::real(3.0));
    }
}
