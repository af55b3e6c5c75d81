//! OpenSCENARIO expression parsing and evaluation
//!
//! This module provides:
//! - Expression parsing for OpenSCENARIO's mathematical expressions
//! - Expression evaluation with parameter substitution
//! - Support for the `${expression}` syntax from the XSD schema
//!
//! Supported operators: +, -, *, /, %, (, )
//! Supported operands: numeric literals and parameter names

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Expression token types for parsing
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Parameter(String),
    Operator(Operator),
    LeftParen,
    RightParen,
}

/// Supported mathematical operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Abstract syntax tree node for expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Parameter(String),
    BinaryOp {
        left: Box<Expr>,
        operator: Operator,
        right: Box<Expr>,
    },
    UnaryMinus(Box<Expr>),
}

/// Recursive-descent parser for OpenSCENARIO mathematical expressions
#[derive(Debug)]
pub struct ExpressionParser {
    tokens: Vec<Token>,
    current: usize,
}

impl ExpressionParser {
    /// Create a new parser over the given expression string
    pub fn new(expression: &str) -> Result<Self> {
        let tokens = Self::tokenize(expression)?;
        Ok(Self { tokens, current: 0 })
    }

    /// Parse the expression into an AST
    pub fn parse(&mut self) -> Result<Expr> {
        let expr = self.parse_additive()?;
        if self.current < self.tokens.len() {
            return Err(Error::expression(
                "",
                "unexpected token after end of expression",
            ));
        }
        Ok(expr)
    }

    fn tokenize(input: &str) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut chars = input.chars().peekable();

        while let Some(&ch) = chars.peek() {
            match ch {
                ' ' | '\t' => {
                    chars.next();
                }
                '0'..='9' | '.' => {
                    let mut literal = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_digit() || c == '.' {
                            literal.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    let number = literal.parse::<f64>().map_err(|_| {
                        Error::expression(input, &format!("invalid number '{}'", literal))
                    })?;
                    tokens.push(Token::Number(number));
                }
                'a'..='z' | 'A'..='Z' | '_' | '$' => {
                    let mut name = String::new();
                    if ch == '$' {
                        chars.next();
                    }
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if name.is_empty() {
                        return Err(Error::expression(input, "empty parameter name"));
                    }
                    tokens.push(Token::Parameter(name));
                }
                '+' => {
                    chars.next();
                    tokens.push(Token::Operator(Operator::Add));
                }
                '-' => {
                    chars.next();
                    tokens.push(Token::Operator(Operator::Subtract));
                }
                '*' => {
                    chars.next();
                    tokens.push(Token::Operator(Operator::Multiply));
                }
                '/' => {
                    chars.next();
                    tokens.push(Token::Operator(Operator::Divide));
                }
                '%' => {
                    chars.next();
                    tokens.push(Token::Operator(Operator::Modulo));
                }
                '(' => {
                    chars.next();
                    tokens.push(Token::LeftParen);
                }
                ')' => {
                    chars.next();
                    tokens.push(Token::RightParen);
                }
                _ => {
                    return Err(Error::expression(
                        input,
                        &format!("unexpected character '{}'", ch),
                    ));
                }
            }
        }
        Ok(tokens)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        while let Some(Token::Operator(op @ (Operator::Add | Operator::Subtract))) = self.peek() {
            let operator = *op;
            self.current += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(Token::Operator(
            op @ (Operator::Multiply | Operator::Divide | Operator::Modulo),
        )) = self.peek()
        {
            let operator = *op;
            self.current += 1;
            let right = self.parse_unary()?;
            left = Expr::BinaryOp {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Operator(Operator::Subtract)) = self.peek() {
            self.current += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::UnaryMinus(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.current += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Parameter(name)) => {
                self.current += 1;
                Ok(Expr::Parameter(name))
            }
            Some(Token::LeftParen) => {
                self.current += 1;
                let inner = self.parse_additive()?;
                match self.peek() {
                    Some(Token::RightParen) => {
                        self.current += 1;
                        Ok(inner)
                    }
                    _ => Err(Error::expression("", "missing closing parenthesis")),
                }
            }
            _ => Err(Error::expression("", "expected number, parameter or '('")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.current)
    }
}

fn evaluate_ast(expr: &Expr, parameters: &HashMap<String, String>) -> Result<f64> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Parameter(name) => {
            let raw = parameters
                .get(name)
                .ok_or_else(|| Error::no_such_name(name.clone()))?;
            raw.parse::<f64>().map_err(|_| {
                Error::expression(name, &format!("parameter value '{}' is not numeric", raw))
            })
        }
        Expr::UnaryMinus(inner) => Ok(-evaluate_ast(inner, parameters)?),
        Expr::BinaryOp {
            left,
            operator,
            right,
        } => {
            let lhs = evaluate_ast(left, parameters)?;
            let rhs = evaluate_ast(right, parameters)?;
            match operator {
                Operator::Add => Ok(lhs + rhs),
                Operator::Subtract => Ok(lhs - rhs),
                Operator::Multiply => Ok(lhs * rhs),
                Operator::Divide => {
                    if rhs == 0.0 {
                        Err(Error::expression("", "division by zero"))
                    } else {
                        Ok(lhs / rhs)
                    }
                }
                Operator::Modulo => {
                    if rhs == 0.0 {
                        Err(Error::expression("", "modulo by zero"))
                    } else {
                        Ok(lhs % rhs)
                    }
                }
            }
        }
    }
}

/// Evaluate an expression string (the content between `${` and `}`) against a
/// parameter map
pub fn evaluate_expression(expression: &str, parameters: &HashMap<String, String>) -> Result<f64> {
    let mut parser =
        ExpressionParser::new(expression).map_err(|e| e.with_context(expression))?;
    let ast = parser
        .parse()
        .map_err(|e| e.with_context(expression))?;
    evaluate_ast(&ast, parameters).map_err(|e| e.with_context(expression))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn evaluates_literals_and_precedence() {
        let p = HashMap::new();
        assert_eq!(evaluate_expression("1 + 2 * 3", &p).unwrap(), 7.0);
        assert_eq!(evaluate_expression("(1 + 2) * 3", &p).unwrap(), 9.0);
        assert_eq!(evaluate_expression("10 % 4", &p).unwrap(), 2.0);
    }

    #[test]
    fn evaluates_unary_minus() {
        let p = HashMap::new();
        assert_eq!(evaluate_expression("-3 + 5", &p).unwrap(), 2.0);
        assert_eq!(evaluate_expression("--2", &p).unwrap(), 2.0);
    }

    #[test]
    fn substitutes_parameters() {
        let p = params(&[("initialSpeed", "8"), ("factor", "2.5")]);
        assert_eq!(
            evaluate_expression("$initialSpeed * factor", &p).unwrap(),
            20.0
        );
    }

    #[test]
    fn unknown_parameter_is_error() {
        let err = evaluate_expression("missing + 1", &HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::NoSuchName { .. }));
    }

    #[test]
    fn division_by_zero_is_error() {
        let err = evaluate_expression("1 / 0", &HashMap::new()).unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn trailing_garbage_is_error() {
        assert!(evaluate_expression("1 2", &HashMap::new()).is_err());
    }
}
