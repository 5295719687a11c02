//! Tokenizer for guard expressions.

use super::CmpOp;
use super::error::{ExprError, ExprResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
    Op(CmpOp),
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Number(v) => format!("number {v}"),
            Self::Str(s) => format!("string \"{s}\""),
            Self::True => "'true'".into(),
            Self::False => "'false'".into(),
            Self::AndAnd => "'&&'".into(),
            Self::OrOr => "'||'".into(),
            Self::Bang => "'!'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
            Self::Op(op) => format!("'{}'", op.symbol()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Whether `name` can be used verbatim as a variable (an optional trailing
/// `'` marks a primed variable).
pub fn is_valid_identifier(name: &str) -> bool {
    let base = name.strip_suffix('\'').unwrap_or(name);
    let mut chars = base.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && base != "true" && base != "false"
}

pub fn tokenize(text: &str) -> ExprResult<Vec<Token>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let start = pos;
        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'(' => {
                pos += 1;
                TokenKind::LParen
            }
            b')' => {
                pos += 1;
                TokenKind::RParen
            }
            b'&' if bytes.get(pos + 1) == Some(&b'&') => {
                pos += 2;
                TokenKind::AndAnd
            }
            b'|' if bytes.get(pos + 1) == Some(&b'|') => {
                pos += 2;
                TokenKind::OrOr
            }
            b'!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Op(CmpOp::Ne)
            }
            b'!' => {
                pos += 1;
                TokenKind::Bang
            }
            b'=' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::Op(CmpOp::Eq)
            }
            b'<' | b'>' => {
                let inclusive = bytes.get(pos + 1) == Some(&b'=');
                pos += if inclusive { 2 } else { 1 };
                TokenKind::Op(match (c, inclusive) {
                    (b'<', true) => CmpOp::Le,
                    (b'<', false) => CmpOp::Lt,
                    (_, true) => CmpOp::Ge,
                    (_, false) => CmpOp::Gt,
                })
            }
            b'"' => {
                let (value, next) = lex_string(text, pos)?;
                pos = next;
                TokenKind::Str(value)
            }
            b'0'..=b'9' | b'.' => {
                let (value, next) = lex_number(text, pos)?;
                pos = next;
                TokenKind::Number(value)
            }
            b'-' if matches!(bytes.get(pos + 1), Some(b'0'..=b'9' | b'.')) => {
                let (value, next) = lex_number(text, pos + 1)?;
                pos = next;
                TokenKind::Number(-value)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                if bytes.get(pos) == Some(&b'\'') {
                    pos += 1;
                }
                match &text[start..pos] {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    name => TokenKind::Ident(name.to_string()),
                }
            }
            _ => {
                let found = text[pos..].chars().next().unwrap_or('\0');
                return Err(ExprError::UnexpectedChar { found, offset: pos });
            }
        };
        tokens.push(Token {
            kind,
            offset: start,
        });
    }

    Ok(tokens)
}

fn lex_string(text: &str, start: usize) -> ExprResult<(String, usize)> {
    let mut value = String::new();
    let mut chars = text[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, start + 1 + i + 1)),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            c => value.push(c),
        }
    }
    Err(ExprError::UnterminatedString { offset: start })
}

fn lex_number(text: &str, start: usize) -> ExprResult<(f64, usize)> {
    let bytes = text.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
        pos += 1;
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if matches!(bytes.get(exp), Some(b'0'..=b'9')) {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    let literal = &text[start..pos];
    literal
        .parse::<f64>()
        .map(|v| (v, pos))
        .map_err(|_| ExprError::InvalidNumber {
            text: literal.to_string(),
            offset: start,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_comparisons() {
        assert_eq!(
            kinds("amount' >= -0.5 && s != \"a\\\"b\""),
            vec![
                TokenKind::Ident("amount'".into()),
                TokenKind::Op(CmpOp::Ge),
                TokenKind::Number(-0.5),
                TokenKind::AndAnd,
                TokenKind::Ident("s".into()),
                TokenKind::Op(CmpOp::Ne),
                TokenKind::Str("a\"b".into()),
            ]
        );
    }

    #[test]
    fn numbers_accept_leading_dot_and_exponent() {
        assert_eq!(kinds(".5"), vec![TokenKind::Number(0.5)]);
        assert_eq!(kinds("1.5E3"), vec![TokenKind::Number(1500.0)]);
    }

    #[test]
    fn rejects_single_equals() {
        assert!(matches!(
            tokenize("x = 1"),
            Err(ExprError::UnexpectedChar { found: '=', .. })
        ));
    }

    #[test]
    fn unterminated_string_is_reported() {
        assert!(matches!(
            tokenize("s == \"abc"),
            Err(ExprError::UnterminatedString { offset: 5 })
        ));
    }

    #[test]
    fn identifier_validity() {
        assert!(is_valid_identifier("a_b1"));
        assert!(is_valid_identifier("x'"));
        assert!(!is_valid_identifier("1x"));
        assert!(!is_valid_identifier("a b"));
        assert!(!is_valid_identifier("true"));
    }
}
