//! Integer expression evaluation.
//!
//! The extended dialect accepts arithmetic and bitwise expressions over
//! decimal literals, `$` hex values, character literals and
//! previously-defined symbols. Precedence, loosest first: `|`, `^`, `&`,
//! `<<` `>>`, `+` `-`, `*` `/` `%`, unary `-`.

use std::collections::HashMap;

use super::errors::AssembleErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Number(i64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    LParen,
    RParen,
}

/// Evaluate an expression to an integer.
///
/// # Arguments
///
/// * `input` - Expression text.
/// * `symbols` - Symbol table for identifier resolution.
///
/// # Returns
///
/// * Value result.
///
pub fn evaluate(
    input: &str,
    symbols: &HashMap<String, i64>,
) -> Result<i64, AssembleErrorKind> {
    let tokens = tokenize(input, symbols)?;
    if tokens.is_empty() {
        return Err(AssembleErrorKind::BadNumber(input.to_owned()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(AssembleErrorKind::BadNumber(input.to_owned()));
    }

    Ok(value)
}

/// Parse a quoted character literal, e.g. `'a'` or `'\n'`.
///
/// Known escapes are `\n \t \r \\ \' \" \0`; an unknown escape resolves to
/// the escaped character itself.
pub fn parse_char_literal(token: &str) -> Result<u8, AssembleErrorKind> {
    let bad = || AssembleErrorKind::BadChar(token.to_owned());
    let body = token
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(bad)?;

    let chars: Vec<char> = body.chars().collect();
    let value = match chars.as_slice() {
        [c] => *c,
        ['\\', c] => match c {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '0' => '\0',
            other => *other,
        },
        _ => return Err(bad()),
    };

    if value as u32 > 255 {
        return Err(bad());
    }

    Ok(value as u32 as u8)
}

fn tokenize(
    input: &str,
    symbols: &HashMap<String, i64>,
) -> Result<Vec<Token>, AssembleErrorKind> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        match ch {
            c if c.is_whitespace() => idx += 1,
            '+' => {
                tokens.push(Token::Plus);
                idx += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                idx += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                idx += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                idx += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                idx += 1;
            }
            '&' => {
                tokens.push(Token::And);
                idx += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                idx += 1;
            }
            '^' => {
                tokens.push(Token::Xor);
                idx += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                idx += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                idx += 1;
            }
            '<' | '>' => {
                if idx + 1 >= chars.len() || chars[idx + 1] != ch {
                    return Err(AssembleErrorKind::BadNumber(input.to_owned()));
                }
                tokens.push(if ch == '<' { Token::Shl } else { Token::Shr });
                idx += 2;
            }
            '$' => {
                let start = idx + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_hexdigit() {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                let value = i64::from_str_radix(&digits, 16)
                    .map_err(|_| AssembleErrorKind::BadAddress(format!("${}", digits)))?;
                tokens.push(Token::Number(value));
                idx = end;
            }
            '\'' => {
                let mut end = idx + 1;
                let mut escaped = false;
                while end < chars.len() {
                    if escaped {
                        escaped = false;
                    } else if chars[end] == '\\' {
                        escaped = true;
                    } else if chars[end] == '\'' {
                        break;
                    }
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(AssembleErrorKind::BadChar(input.to_owned()));
                }
                let literal: String = chars[idx..=end].iter().collect();
                tokens.push(Token::Number(i64::from(parse_char_literal(&literal)?)));
                idx = end + 1;
            }
            c if c.is_ascii_digit() => {
                let start = idx;
                while idx < chars.len() && chars[idx].is_ascii_digit() {
                    idx += 1;
                }
                if idx < chars.len() && (chars[idx].is_alphanumeric() || chars[idx] == '_') {
                    return Err(AssembleErrorKind::BadNumber(input.to_owned()));
                }
                let digits: String = chars[start..idx].iter().collect();
                let value = digits
                    .parse::<i64>()
                    .map_err(|_| AssembleErrorKind::BadNumber(digits.clone()))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = idx;
                while idx < chars.len() && (chars[idx].is_alphanumeric() || chars[idx] == '_') {
                    idx += 1;
                }
                let name: String = chars[start..idx].iter().collect();
                let value = symbols
                    .get(&name)
                    .copied()
                    .ok_or(AssembleErrorKind::UnresolvedSymbol(name))?;
                tokens.push(Token::Number(value));
            }
            _ => return Err(AssembleErrorKind::BadNumber(input.to_owned())),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_xor()?;
        while self.peek() == Some(Token::Or) {
            self.advance();
            value |= self.parse_xor()?;
        }
        Ok(value)
    }

    fn parse_xor(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_and()?;
        while self.peek() == Some(Token::Xor) {
            self.advance();
            value ^= self.parse_and()?;
        }
        Ok(value)
    }

    fn parse_and(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_shift()?;
        while self.peek() == Some(Token::And) {
            self.advance();
            value &= self.parse_shift()?;
        }
        Ok(value)
    }

    fn parse_shift(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_add()?;
        loop {
            match self.peek() {
                Some(Token::Shl) => {
                    self.advance();
                    let rhs = self.parse_add()?;
                    value = value.wrapping_shl(rhs as u32);
                }
                Some(Token::Shr) => {
                    self.advance();
                    let rhs = self.parse_add()?;
                    value = value.wrapping_shr(rhs as u32);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_add(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_mul()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.parse_mul()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.parse_mul()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_mul(&mut self) -> Result<i64, AssembleErrorKind> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    value *= self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(AssembleErrorKind::BadNumber("division by zero".to_owned()));
                    }
                    value /= rhs;
                }
                Some(Token::Percent) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    if rhs == 0 {
                        return Err(AssembleErrorKind::BadNumber("division by zero".to_owned()));
                    }
                    value %= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<i64, AssembleErrorKind> {
        if self.peek() == Some(Token::Minus) {
            self.advance();
            return Ok(-self.parse_unary()?);
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<i64, AssembleErrorKind> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(AssembleErrorKind::BadNumber("missing `)`".to_owned()));
                }
                Ok(value)
            }
            _ => Err(AssembleErrorKind::BadNumber("incomplete expression".to_owned())),
        }
    }
}
