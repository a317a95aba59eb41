//! Calculator tool — evaluates arithmetic expressions.
//!
//! Input is restricted to digits, `+ - * / % ( ) .` and whitespace before
//! anything is parsed. Supports `**` exponentiation, `%` remainder and
//! unary signs via a recursive-descent parser. No variables, no functions.

use async_trait::async_trait;
use stratagem_core::tool::{Tool, ToolContext, ToolKind, ToolOutput};

/// Deepest nesting of parentheses, unary signs and exponents accepted.
const MAX_DEPTH: usize = 64;

const INVALID_CHARACTERS: &str = "Error: Invalid characters in expression. Only digits, +, -, *, /, %, (, ), . and spaces are allowed.";

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Calculator
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports +, -, *, /, %, ** and parentheses. Input: the expression, e.g. (2 + 3) * 4"
    }

    async fn execute(&self, input: &str, _ctx: &ToolContext) -> ToolOutput {
        ToolOutput::text(calculate(input))
    }
}

/// Sanitize, evaluate and stringify. Never fails; errors come back as text.
pub fn calculate(input: &str) -> String {
    let expr = input.trim();
    if !is_sanitized(expr) {
        return INVALID_CHARACTERS.to_string();
    }

    match evaluate(expr) {
        Ok(value) => format_number(value),
        Err(e) => format!("Calculation error: {e}"),
    }
}

fn is_sanitized(expr: &str) -> bool {
    expr.chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || "+-*/().%".contains(c))
}

/// Format nicely: no trailing `.0` for integral results.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        ));
    }
    if !result.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::StarStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
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
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left /= right;
                }
                Token::Percent => {
                    self.consume();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err("Division by zero".into());
                    }
                    left %= right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // Every recursive path re-enters through here.
    fn parse_unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".into());
        }
        self.depth += 1;
        let value = self.parse_signed();
        self.depth -= 1;
        value
    }

    // unary = ('-' | '+') unary | power
    fn parse_signed(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power = primary ('**' unary)?   (right-associative)
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if let Some(Token::StarStar) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(calculate("2 * 3 + 4"), "10");
    }

    #[test]
    fn nested_parentheses() {
        assert_eq!(evaluate("((1 + 2) * (3 + 4))").unwrap(), 21.0);
    }

    #[test]
    fn remainder_and_power() {
        assert_eq!(evaluate("17 % 5").unwrap(), 2.0);
        assert_eq!(evaluate("2 ** 10").unwrap(), 1024.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("2 * 3 ** 2").unwrap(), 18.0);
    }

    #[test]
    fn unary_signs() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("+4 - -1").unwrap(), 5.0);
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_crash() {
        let parens = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert_eq!(
            calculate(&parens),
            "Calculation error: Expression nested too deeply"
        );
        let signs = format!("{}1", "-".repeat(100_000));
        assert_eq!(
            calculate(&signs),
            "Calculation error: Expression nested too deeply"
        );
        let powers = vec!["1"; 5000].join(" ** ");
        assert!(calculate(&powers).starts_with("Calculation error:"));

        let shallow = format!("{}7{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(calculate(&shallow), "7");
        assert_eq!(calculate("- - - 3"), "-3");
    }

    #[test]
    fn decimals() {
        assert_eq!(evaluate("3.14 * 2").unwrap(), 6.28);
        assert!(calculate("10 / 3").starts_with("3.333"));
        assert_eq!(calculate("10 / 4"), "2.5");
    }

    #[test]
    fn rejects_foreign_characters() {
        let out = calculate("sqrt(16)");
        assert!(out.starts_with("Error: Invalid characters"));
        assert!(out.contains("%"));
        assert!(calculate("2 + x").starts_with("Error:"));
    }

    #[test]
    fn evaluation_errors_are_reported() {
        assert_eq!(calculate("1 / 0"), "Calculation error: Division by zero");
        assert!(calculate("2 +").starts_with("Calculation error:"));
        assert!(calculate("").starts_with("Calculation error:"));
        assert!(calculate("(1 + 2").starts_with("Calculation error:"));
    }

    #[tokio::test]
    async fn tool_execute() {
        let out = CalculatorTool
            .execute(" 15 * 4 ", &ToolContext::default())
            .await;
        assert_eq!(out.text, "60");
        assert_eq!(out.llm_calls, 0);
    }
}
