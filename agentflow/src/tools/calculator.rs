//! Arithmetic expression evaluator.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | name | name '(' args ')' | '(' expr ')'
//! ```
//!
//! Exponentiation is right-associative and binds tighter than unary minus, so
//! `-2^2` is `-4`. Input length and nesting depth are bounded so hostile
//! input fails with a `SyntaxError` instead of exhausting the stack.

use std::f64::consts::{E, PI};

use tracing::{debug, info};

use super::{Tool, ToolOutput};

const DESCRIPTION: &str = "Evaluate arithmetic expressions. Supports + - * / % ^ **, parentheses, \
sqrt, sin, cos, tan, log, log10, exp, abs, round, floor, ceil, pow, min, max, and the constants pi and e.";

/// Longest accepted expression, in bytes.
pub const MAX_INPUT_LEN: usize = 4096;
/// Deepest accepted nesting of parentheses, calls, unary signs, and exponents.
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    fn execute(&self, input: &str) -> ToolOutput {
        let expression = input.trim();
        info!(expression, "evaluating expression");
        match evaluate(expression) {
            Ok(value) => {
                let formatted = format_number(value);
                debug!(result = %formatted, "evaluated expression");
                ToolOutput::ok(formatted)
            }
            Err(err) => ToolOutput::failure(err.kind(), err.message()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalcError {
    Syntax(String),
    Math(String),
    Security(String),
}

impl CalcError {
    pub fn kind(&self) -> &'static str {
        match self {
            CalcError::Syntax(_) => "SyntaxError",
            CalcError::Math(_) => "MathError",
            CalcError::Security(_) => "SecurityError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CalcError::Syntax(m) | CalcError::Math(m) | CalcError::Security(m) => m,
        }
    }
}

fn syntax(message: impl Into<String>) -> CalcError {
    CalcError::Syntax(message.into())
}

fn math(message: impl Into<String>) -> CalcError {
    CalcError::Math(message.into())
}

/// Evaluate `expression` to a finite number.
pub fn evaluate(expression: &str) -> Result<f64, CalcError> {
    if expression.len() > MAX_INPUT_LEN {
        return Err(syntax(format!(
            "expression too long ({} bytes, max {MAX_INPUT_LEN})",
            expression.len()
        )));
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(syntax("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(syntax(format!("unexpected {}", token.describe())));
    }
    if !value.is_finite() {
        return Err(math("result is not a finite number"));
    }
    Ok(value)
}

/// Integral values print without a fractional part; others are rounded to 10 decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        // Also folds -0 into 0.
        return format!("{}", value as i64);
    }
    let rounded = (value * 1e10).round() / 1e10;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        return format!("{}", rounded as i64);
    }
    format!("{rounded}")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {n}"),
            Token::Ident(name) => format!("name '{name}'"),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Caret => "'^'".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Scientific notation: 1e5, 2.5E-3
                if i + 1 < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| syntax(format!("invalid number '{text}'")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                if name.contains("__") {
                    return Err(CalcError::Security(format!("name '{name}' is not allowed")));
                }
                tokens.push(Token::Ident(name.to_ascii_lowercase()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            _ => {
                let token = match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => {
                        return Err(CalcError::Security(format!(
                            "invalid character '{other}' in expression; only numbers, operators, and functions are allowed"
                        )));
                    }
                };
                tokens.push(token);
                i += 1;
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CalcError>,
    ) -> Result<T, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(syntax("expression nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                value += self.term()?;
            } else if self.eat(&Token::Minus) {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.unary()?;
        loop {
            if self.eat(&Token::Star) {
                value *= self.unary()?;
            } else if self.eat(&Token::Slash) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(math("Division by zero"));
                }
                value /= divisor;
            } else if self.eat(&Token::Percent) {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err(math("Modulo by zero"));
                }
                // Sign follows the divisor.
                value = value - divisor * (value / divisor).floor();
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.eat(&Token::Minus) {
            return Ok(-self.nested(Self::unary)?);
        }
        if self.eat(&Token::Plus) {
            return self.nested(Self::unary);
        }
        self.power()
    }

    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.eat(&Token::Caret) {
            let exponent = self.nested(Self::unary)?;
            return checked_pow(base, exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                if !self.eat(&Token::RParen) {
                    return Err(syntax("missing closing parenthesis"));
                }
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.nested(Self::args)?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(syntax(format!("unexpected {}", token.describe()))),
            None => Err(syntax("unexpected end of expression")),
        }
    }

    fn args(&mut self) -> Result<Vec<f64>, CalcError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            return Err(syntax("expected ',' or ')' in argument list"));
        }
    }
}

fn constant(name: &str) -> Result<f64, CalcError> {
    match name {
        "pi" => Ok(PI),
        "e" => Ok(E),
        other => Err(syntax(format!("unknown constant '{other}'"))),
    }
}

fn checked_pow(base: f64, exponent: f64) -> Result<f64, CalcError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(math("Division by zero"));
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(math("fractional power of a negative number"));
    }
    Ok(base.powf(exponent))
}

fn arity(name: &str, args: &[f64], expected: usize) -> Result<(), CalcError> {
    if args.len() != expected {
        return Err(syntax(format!(
            "{name}() takes {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn call(name: &str, args: &[f64]) -> Result<f64, CalcError> {
    match name {
        "sqrt" => {
            arity(name, args, 1)?;
            if args[0] < 0.0 {
                return Err(math("math domain error: sqrt of a negative number"));
            }
            Ok(args[0].sqrt())
        }
        "sin" | "cos" | "tan" | "exp" | "abs" | "floor" | "ceil" | "log10" => {
            arity(name, args, 1)?;
            let x = args[0];
            Ok(match name {
                "sin" => x.sin(),
                "cos" => x.cos(),
                "tan" => x.tan(),
                "exp" => x.exp(),
                "abs" => x.abs(),
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => {
                    if x <= 0.0 {
                        return Err(math("math domain error: log10 of a non-positive number"));
                    }
                    x.log10()
                }
            })
        }
        "log" => match args {
            [x] if *x > 0.0 => Ok(x.ln()),
            [x, base] if *x > 0.0 && *base > 0.0 && *base != 1.0 => Ok(x.log(*base)),
            [_] | [_, _] => Err(math("math domain error: log of a non-positive number or invalid base")),
            _ => Err(syntax(format!("log() takes 1 or 2 arguments, got {}", args.len()))),
        },
        "round" => match args {
            [x] => Ok(x.round()),
            [x, digits] => {
                let factor = 10f64.powi(*digits as i32);
                Ok((x * factor).round() / factor)
            }
            _ => Err(syntax(format!("round() takes 1 or 2 arguments, got {}", args.len()))),
        },
        "pow" => {
            arity(name, args, 2)?;
            checked_pow(args[0], args[1])
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(syntax(format!("{name}() needs at least one argument")));
            }
            let fold = if name == "min" { f64::min } else { f64::max };
            Ok(args[1..].iter().copied().fold(args[0], fold))
        }
        other => Err(syntax(format!("unknown function '{other}'"))),
    }
}
