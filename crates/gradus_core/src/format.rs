//! Tick label format rules.
//!
//! A rule is written `"template" % (arg1, arg2, ...)`: the arguments are
//! expressions over the axis variable and are substituted into the template
//! with printf-style conversions. A rule that is not a quoted template is a
//! single expression which must itself evaluate to a string.

use crate::expression::{EvalError, Expression, Scope, Value};
use crate::label::numeric_display;

/// Most format arguments an axis may declare.
pub const MAX_ARGS: usize = 32;

#[derive(Debug, Clone)]
pub struct FormatRule {
    source: String,
    template: Option<String>,
    args: Vec<Expression>,
}

impl FormatRule {
    pub fn parse(source: &str, scope: &mut Scope) -> Result<Self, EvalError> {
        let text = source.trim();
        let Some((template, rest)) = split_template(text)? else {
            let expr = Expression::compile(text, scope)?;
            return Ok(Self {
                source: text.to_string(),
                template: None,
                args: vec![expr],
            });
        };

        let rest = rest.trim_start();
        let mut args = Vec::new();
        if !rest.is_empty() {
            let offset = text.len() - rest.len();
            let Some(list) = rest.strip_prefix('%') else {
                return Err(EvalError::Syntax {
                    offset,
                    message: "expected '%' after format template".to_string(),
                });
            };
            let list = list.trim();
            let inner = match (list.strip_prefix('('), list.ends_with(')')) {
                (Some(open), true) if enclosing_parens(list) => &open[..open.len() - 1],
                _ => list,
            };
            for piece in split_top_level(inner) {
                if piece.trim().is_empty() {
                    continue;
                }
                args.push(Expression::compile(piece, scope)?);
            }
            if args.len() > MAX_ARGS {
                return Err(EvalError::Type(format!(
                    "a format rule may have at most {MAX_ARGS} arguments"
                )));
            }
        }

        Ok(Self {
            source: text.to_string(),
            template: Some(template),
            args,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the rule is a quoted template rather than a bare expression.
    pub fn has_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn args(&self) -> &[Expression] {
        &self.args
    }

    /// Evaluates the arguments in `scope` and renders the label.
    pub fn render(&self, scope: &Scope, significant_figures: usize) -> Result<String, EvalError> {
        let mut values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            values.push(arg.evaluate(scope)?);
        }
        match &self.template {
            Some(template) => printf(template, &values, significant_figures),
            None => match values.into_iter().next() {
                Some(Value::Text(s)) => Ok(s),
                _ => Err(EvalError::Type("tick label was not a string".to_string())),
            },
        }
    }
}

/// Splits a leading quoted template off `text`. Returns `None` when the text
/// does not begin with a string literal.
fn split_template(text: &str) -> Result<Option<(String, &str)>, EvalError> {
    let body = text.strip_prefix('r').unwrap_or(text);
    let quote = if body.starts_with("\"\"\"") {
        "\"\"\""
    } else if body.starts_with("'''") {
        "'''"
    } else if body.starts_with('"') {
        "\""
    } else if body.starts_with('\'') {
        "'"
    } else {
        return Ok(None);
    };
    let inner = &body[quote.len()..];
    match inner.find(quote) {
        Some(end) => Ok(Some((inner[..end].to_string(), &inner[end + quote.len()..]))),
        None => Err(EvalError::Syntax {
            offset: 0,
            message: "unterminated format template".to_string(),
        }),
    }
}

/// True when the parenthesis opening `list` is the one closing it.
fn enclosing_parens(list: &str) -> bool {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == list.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn split_top_level(list: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                pieces.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&list[start..]);
    pieces
}

#[derive(Debug, Default)]
struct Conversion {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

/// printf-style substitution of `values` into `template`.
///
/// Supports `%%` and the `s d i f e g` conversions (and upper-case forms)
/// with flags, width and precision. `%s` renders numbers to the given
/// number of significant figures.
pub fn printf(template: &str, values: &[Value], significant_figures: usize) -> Result<String, EvalError> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.chars().peekable();
    let mut next_value = values.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut conv = Conversion::default();
        while let Some(&f) = chars.peek() {
            match f {
                '-' => conv.left = true,
                '+' => conv.plus = true,
                ' ' => conv.space = true,
                '0' => conv.zero = true,
                '#' => conv.alternate = true,
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            conv.width = conv.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + d as usize;
                chars.next();
            }
            conv.precision = Some(precision);
        }
        conv.kind = chars
            .next()
            .ok_or_else(|| EvalError::Type("incomplete format specifier".to_string()))?;

        let value = next_value
            .next()
            .ok_or_else(|| EvalError::Type("not enough arguments for format string".to_string()))?;
        out.push_str(&convert(&conv, value, significant_figures)?);
    }

    if next_value.next().is_some() {
        return Err(EvalError::Type(
            "not all arguments converted during string formatting".to_string(),
        ));
    }
    Ok(out)
}

fn convert(conv: &Conversion, value: &Value, significant_figures: usize) -> Result<String, EvalError> {
    if conv.kind == 's' || conv.kind == 'S' {
        let mut text = match value {
            Value::Text(s) => s.clone(),
            Value::Number(q) if q.is_real() => numeric_display(q.value.re, significant_figures),
            Value::Number(q) => format!(
                "{}{}{}i",
                numeric_display(q.value.re, significant_figures),
                if q.value.im < 0.0 { "-" } else { "+" },
                numeric_display(q.value.im.abs(), significant_figures)
            ),
        };
        if let Some(p) = conv.precision {
            text = text.chars().take(p).collect();
        }
        return Ok(pad(conv, String::new(), text, false));
    }

    let x = match value {
        Value::Number(q) if q.is_real() => q.value.re,
        Value::Number(_) => {
            return Err(EvalError::Type(format!(
                "%{} requires a real number",
                conv.kind
            )))
        }
        Value::Text(_) => {
            return Err(EvalError::Type(format!(
                "%{} requires a number, not a string",
                conv.kind
            )))
        }
    };
    let sign = if x.is_sign_negative() && x != 0.0 {
        "-"
    } else if conv.plus {
        "+"
    } else if conv.space {
        " "
    } else {
        ""
    };
    let magnitude = x.abs();
    let body = match conv.kind {
        // Beyond u64 the cast would saturate.
        'd' | 'i' if magnitude < u64::MAX as f64 => format!("{}", magnitude.trunc() as u64),
        'd' | 'i' => format!("{:.0}", magnitude.trunc()),
        'f' | 'F' => format!("{:.*}", conv.precision.unwrap_or(6), magnitude),
        'e' | 'E' => c_exponent(magnitude, conv.precision.unwrap_or(6)),
        'g' | 'G' => c_general(magnitude, conv.precision.unwrap_or(6), conv.alternate),
        other => {
            return Err(EvalError::Type(format!(
                "unsupported format conversion '%{other}'"
            )))
        }
    };
    let body = if conv.kind.is_ascii_uppercase() {
        body.to_uppercase()
    } else {
        body
    };
    Ok(pad(conv, sign.to_string(), body, magnitude.is_finite()))
}

fn pad(conv: &Conversion, sign: String, body: String, numeric: bool) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= conv.width {
        return sign + &body;
    }
    let fill = conv.width - len;
    if conv.left {
        format!("{sign}{body}{}", " ".repeat(fill))
    } else if conv.zero && numeric {
        format!("{sign}{}{body}", "0".repeat(fill))
    } else {
        format!("{}{sign}{body}", " ".repeat(fill))
    }
}

/// `%e` with a C-style exponent (sign and at least two digits).
fn c_exponent(x: f64, precision: usize) -> String {
    let rust = format!("{:.*e}", precision, x);
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => rust,
    }
}

fn c_general(x: f64, precision: usize, alternate: bool) -> String {
    if !x.is_finite() {
        return format!("{x}");
    }
    let p = precision.max(1);
    let exponent = if x == 0.0 {
        0
    } else {
        let rounded = format!("{:.*e}", p - 1, x);
        rounded
            .split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let text = if exponent >= -4 && exponent < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exponent).max(0) as usize, x)
    } else {
        c_exponent(x, p - 1)
    };
    if alternate {
        return text;
    }
    match text.split_once('e') {
        Some((mantissa, exp)) => format!("{}e{exp}", trim_zeros(mantissa)),
        None => trim_zeros(&text).to_string(),
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}
