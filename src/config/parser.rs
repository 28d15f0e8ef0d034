//! Recursive-descent parser over the token stream produced by [`super::lexer`].
//!
//! [`FromYaml`] implementations are emitted by the `derive_yaml` proc-macro for
//! every configuration struct; this module supplies the trait itself plus the
//! primitive impls (`String`, integers, `bool`, `Option<T>`, `Vec<T>`,
//! `HashMap<K, V>`) the derive relies on, and the [`ConfigParser`] cursor API
//! the generated code calls into.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::mem::discriminant;
use std::str::FromStr;

use super::lexer::{Lexer, Loc, Token, TokenType};

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub message: String,
    pub loc: Option<Loc>,
    pub context: Vec<String>,
}

impl ConfigError {
    pub fn new(message: impl Into<String>, loc: Option<Loc>) -> Self {
        ConfigError {
            message: message.into(),
            loc,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[1;31m❌ Configuration Error:\x1b[0m {}", self.message)?;
        if let Some(loc) = self.loc {
            write!(f, " (at {loc})")?;
        }
        if !self.context.is_empty() {
            let mut indent = String::new();
            for ctx in self.context.iter().rev() {
                writeln!(f)?;
                write!(f, "  {indent}\x1b[38;5;244m↳ while parsing {ctx}\x1b[0m")?;
                indent.push(' ');
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

pub type ParseResult<T> = Result<T, ConfigError>;

pub struct ConfigParser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl ConfigParser {
    pub fn new(tokens: Vec<Token>) -> Self {
        ConfigParser { tokens, cursor: 0 }
    }

    pub fn peek_kind(&self) -> Option<&TokenType> {
        self.tokens.get(self.cursor).map(|t| &t.kind)
    }

    pub fn peek_kind_at(&self, offset: usize) -> Option<&TokenType> {
        self.tokens.get(self.cursor + offset).map(|t| &t.kind)
    }

    pub fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    pub fn peek_loc(&self) -> Option<Loc> {
        self.tokens.get(self.cursor).map(|t| t.loc)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.cursor).cloned();
        if t.is_some() {
            self.cursor += 1;
        }
        t
    }

    pub fn consume(&mut self, expected: TokenType) -> ParseResult<Token> {
        match self.tokens.get(self.cursor) {
            Some(t) if discriminant(&t.kind) == discriminant(&expected) => {
                let t = t.clone();
                self.cursor += 1;
                Ok(t)
            }
            Some(t) => Err(ConfigError::new(
                format!("Expected {expected}, found {}", t.kind),
                Some(t.loc),
            )),
            None => Err(ConfigError::new(
                format!("Expected {expected}, found end of input"),
                None,
            )),
        }
    }

    pub fn consume_key(&mut self, _key: &str) -> ParseResult<()> {
        self.cursor += 1;
        self.consume(TokenType::Colon)?;
        Ok(())
    }

    pub fn skip_newlines(&mut self) {
        while matches!(
            self.peek_kind(),
            Some(TokenType::Newline) | Some(TokenType::Indent(_))
        ) {
            self.cursor += 1;
        }
    }

    pub fn skip_newlines_only(&mut self) -> bool {
        let start = self.cursor;
        while matches!(self.peek_kind(), Some(TokenType::Newline)) {
            self.cursor += 1;
        }
        self.cursor != start
    }

    pub fn parse_scalar_string(&mut self) -> ParseResult<String> {
        match self.next_token() {
            Some(Token {
                kind: TokenType::Text(s),
                ..
            }) => Ok(s),
            Some(Token {
                kind: TokenType::StringLit(s),
                ..
            }) => Ok(s),
            Some(Token {
                kind: TokenType::Number(n),
                ..
            }) => Ok(n.to_string()),
            Some(t) => Err(ConfigError::new(
                format!("Expected scalar value, found {}", t.kind),
                Some(t.loc),
            )),
            None => Err(ConfigError::new(
                "Expected scalar value, found end of input",
                None,
            )),
        }
    }

    pub fn parse_scalar_number(&mut self) -> ParseResult<u64> {
        match self.next_token() {
            Some(Token {
                kind: TokenType::Number(n),
                ..
            }) => Ok(n),
            Some(t) => Err(ConfigError::new(
                format!("Expected number, found {}", t.kind),
                Some(t.loc),
            )),
            None => Err(ConfigError::new("Expected number, found end of input", None)),
        }
    }

    pub fn skip_value(&mut self, min_indent: usize) -> ParseResult<()> {
        while !matches!(self.peek_kind(), Some(TokenType::Newline) | None) {
            self.cursor += 1;
        }
        loop {
            let save = self.cursor;
            self.cursor += 1; // consume the newline
            match self.peek_kind() {
                Some(TokenType::Indent(n)) if *n > min_indent => {
                    self.cursor += 1;
                    while !matches!(self.peek_kind(), Some(TokenType::Newline) | None) {
                        self.cursor += 1;
                    }
                }
                _ => {
                    self.cursor = save;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Returns whether there is another field at `min_indent` to parse.
    /// `struct_indent` is established by the first field and every later
    /// field must match it exactly; a dedent or a dash at this level ends the
    /// enclosing block.
    pub fn check_indentation(
        &mut self,
        min_indent: usize,
        struct_indent: &mut Option<usize>,
    ) -> ParseResult<bool> {
        self.skip_newlines_only();
        match self.peek_kind() {
            None => Ok(false),
            Some(TokenType::Dash) => Ok(false),
            Some(TokenType::Indent(n)) => {
                let n = *n;
                if n <= min_indent {
                    return Ok(false);
                }
                match struct_indent {
                    Some(expected) if *expected != n => Err(ConfigError::new(
                        format!(
                            "Inconsistent indentation: expected {expected} spaces, found {n}"
                        ),
                        self.peek_loc(),
                    )),
                    Some(_) => {
                        self.cursor += 1;
                        Ok(true)
                    }
                    None => {
                        *struct_indent = Some(n);
                        self.cursor += 1;
                        Ok(true)
                    }
                }
            }
            Some(_) => {
                if min_indent == 0 {
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    pub fn is_end_of_block(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenType::Dash))
    }

    pub fn parse_map_key(&mut self) -> ParseResult<Option<String>> {
        match (self.peek_kind(), self.peek_kind_at(1)) {
            (Some(TokenType::Text(_)), Some(TokenType::Colon))
            | (Some(TokenType::StringLit(_)), Some(TokenType::Colon)) => {
                let key = self.parse_scalar_string()?;
                Ok(Some(key))
            }
            (Some(TokenType::Number(_)), Some(TokenType::Colon)) => Err(ConfigError::new(
                "Expected map key, found number",
                self.peek_loc(),
            )),
            (Some(_), _) => Err(ConfigError::new(
                "Expected key-value pair, found scalar",
                self.peek_loc(),
            )),
            (None, _) => Ok(None),
        }
    }
}

pub trait FromYaml: Sized {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self>;

    fn from_str(input: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(input)
            .tokenize()
            .map_err(|e| ConfigError::new(e, None).with_context("lexing phase"))?;
        let mut parser = ConfigParser::new(tokens);
        let value = Self::from_yaml(&mut parser, 0)?;
        parser.skip_newlines();
        if parser.peek_kind().is_some() {
            return Err(ConfigError::new(
                format!(
                    "Unexpected trailing content: {}",
                    parser.peek_token().unwrap().kind
                ),
                parser.peek_loc(),
            ));
        }
        Ok(value)
    }
}

impl FromYaml for String {
    fn from_yaml(parser: &mut ConfigParser, _min_indent: usize) -> ParseResult<Self> {
        parser.parse_scalar_string()
    }
}

impl FromYaml for u16 {
    fn from_yaml(parser: &mut ConfigParser, _min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let n = parser.parse_scalar_number()?;
        u16::try_from(n).map_err(|_| ConfigError::new(format!("{n} does not fit in a u16"), loc))
    }
}

impl FromYaml for usize {
    fn from_yaml(parser: &mut ConfigParser, _min_indent: usize) -> ParseResult<Self> {
        Ok(parser.parse_scalar_number()? as usize)
    }
}

impl FromYaml for u32 {
    fn from_yaml(parser: &mut ConfigParser, _min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let n = parser.parse_scalar_number()?;
        u32::try_from(n).map_err(|_| ConfigError::new(format!("{n} does not fit in a u32"), loc))
    }
}

impl FromYaml for bool {
    fn from_yaml(parser: &mut ConfigParser, _min_indent: usize) -> ParseResult<Self> {
        let loc = parser.peek_loc();
        let s = parser.parse_scalar_string()?;
        match s.as_str() {
            "true" | "on" | "yes" => Ok(true),
            "false" | "off" | "no" => Ok(false),
            other => Err(ConfigError::new(format!("Invalid boolean: '{other}'"), loc)),
        }
    }
}

impl<T: FromYaml> FromYaml for Option<T> {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        Ok(Some(T::from_yaml(parser, min_indent)?))
    }
}

impl<T: FromYaml> FromYaml for Vec<T> {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        if matches!(parser.peek_kind(), Some(TokenType::LBracket)) {
            return parse_inline_list(parser);
        }
        parse_block_list(parser, min_indent)
    }
}

fn parse_inline_list<T: FromYaml>(parser: &mut ConfigParser) -> ParseResult<Vec<T>> {
    parser.consume(TokenType::LBracket)?;
    let mut items = Vec::new();
    loop {
        parser.skip_newlines();
        if matches!(parser.peek_kind(), Some(TokenType::RBracket)) {
            break;
        }
        items.push(T::from_yaml(parser, 0).map_err(|e| e.with_context("list item"))?);
        parser.skip_newlines();
        match parser.peek_kind() {
            Some(TokenType::Comma) => {
                parser.next_token();
            }
            Some(TokenType::RBracket) => break,
            _ => {
                return Err(ConfigError::new(
                    "Expected ',' or ']' in inline list",
                    parser.peek_loc(),
                ));
            }
        }
    }
    parser.consume(TokenType::RBracket)?;
    Ok(items)
}

fn parse_block_list<T: FromYaml>(
    parser: &mut ConfigParser,
    min_indent: usize,
) -> ParseResult<Vec<T>> {
    let mut items = Vec::new();
    let mut list_indent: Option<usize> = None;
    loop {
        let save = parser.cursor;
        parser.skip_newlines_only();
        match parser.peek_kind() {
            Some(TokenType::Indent(n)) => {
                let n = *n;
                if n <= min_indent {
                    parser.cursor = save;
                    break;
                }
                match list_indent {
                    Some(expected) if expected != n => {
                        parser.cursor = save;
                        break;
                    }
                    _ => list_indent = Some(n),
                }
                parser.next_token();
                if !matches!(parser.peek_kind(), Some(TokenType::Dash)) {
                    return Err(ConfigError::new(
                        "Block list item must start on a new line",
                        parser.peek_loc(),
                    ));
                }
            }
            Some(TokenType::Dash) if min_indent == 0 && list_indent.is_none() => {
                list_indent = Some(0);
            }
            Some(TokenType::Dash) => {}
            _ => {
                parser.cursor = save;
                break;
            }
        }
        if !matches!(parser.peek_kind(), Some(TokenType::Dash)) {
            parser.cursor = save;
            break;
        }
        parser.next_token();
        let item_indent = list_indent.unwrap_or(min_indent) + 1;
        items.push(T::from_yaml(parser, item_indent).map_err(|e| e.with_context("list item"))?);
    }
    Ok(items)
}

impl<K, V> FromYaml for HashMap<K, V>
where
    K: FromStr + Eq + Hash + fmt::Display,
    V: FromYaml,
{
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        let mut map = HashMap::new();
        let mut struct_indent = None;
        while parser.check_indentation(min_indent, &mut struct_indent)? {
            let loc = parser.peek_loc();
            let Some(key_str) = parser.parse_map_key()? else {
                break;
            };
            let key = K::from_str(&key_str)
                .map_err(|_| ConfigError::new(format!("Invalid map key: '{key_str}'"), loc))?;
            parser.consume(TokenType::Colon)?;
            let value_indent = struct_indent.unwrap_or(min_indent);
            let value = V::from_yaml(parser, value_indent)
                .map_err(|e| e.with_context(format!("value for key '{key_str}'")))?;
            if map.contains_key(&key) {
                return Err(ConfigError::new(
                    format!("Duplicate key '{key_str}' in map"),
                    loc,
                ));
            }
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_string() {
        let v = <String as FromYaml>::from_str("hello").unwrap();
        assert_eq!(v, "hello");
    }

    #[test]
    fn parses_bool() {
        assert!(<bool as FromYaml>::from_str("true").unwrap());
        assert!(!<bool as FromYaml>::from_str("off").unwrap());
        assert!(<bool as FromYaml>::from_str("maybe").is_err());
    }

    #[test]
    fn parses_inline_list() {
        let v = <Vec<String> as FromYaml>::from_str("[GET, POST, HEAD]").unwrap();
        assert_eq!(v, vec!["GET", "POST", "HEAD"]);
    }

    #[test]
    fn parses_block_list() {
        let v = <Vec<u16> as FromYaml>::from_str("- 80\n- 8080\n").unwrap();
        assert_eq!(v, vec![80, 8080]);
    }
}
