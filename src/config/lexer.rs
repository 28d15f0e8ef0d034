//! Indentation-sensitive tokenizer for the configuration file's YAML subset.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    Text(String),
    StringLit(String),
    Number(u64),
    Colon,
    Dash,
    LBracket,
    RBracket,
    Comma,
    Newline,
    Indent(usize),
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Text(s) => write!(f, "{s}"),
            TokenType::StringLit(s) => write!(f, "\"{s}\""),
            TokenType::Number(n) => write!(f, "{n}"),
            TokenType::Colon => write!(f, ":"),
            TokenType::Dash => write!(f, "-"),
            TokenType::LBracket => write!(f, "["),
            TokenType::RBracket => write!(f, "]"),
            TokenType::Comma => write!(f, ","),
            TokenType::Newline => write!(f, "\\n"),
            TokenType::Indent(n) => write!(f, "{}", " ".repeat(*n)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenType,
    pub loc: Loc,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' at {}", self.kind, self.loc)
    }
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.next();
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        c
    }

    fn peek(&mut self) -> Option<&char> {
        self.input.peek()
    }

    fn current_loc(&self) -> Loc {
        Loc {
            line: self.line,
            col: self.col,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        let mut is_start_of_line = true;

        while let Some(&c) = self.peek() {
            if is_start_of_line && c != '\n' {
                self.handle_indentation(&mut tokens)?;
                is_start_of_line = false;
                continue;
            }

            let loc = self.current_loc();
            match c {
                '#' => {
                    self.skip_comment();
                }
                ':' => {
                    self.advance();
                    tokens.push(Token {
                        kind: TokenType::Colon,
                        loc,
                    });
                }
                '-' => {
                    self.handle_dash(&mut tokens, loc)?;
                }
                '[' => {
                    self.advance();
                    tokens.push(Token {
                        kind: TokenType::LBracket,
                        loc,
                    });
                }
                ']' => {
                    self.advance();
                    tokens.push(Token {
                        kind: TokenType::RBracket,
                        loc,
                    });
                }
                ',' => {
                    self.advance();
                    tokens.push(Token {
                        kind: TokenType::Comma,
                        loc,
                    });
                }
                '\n' => {
                    self.advance();
                    tokens.push(Token {
                        kind: TokenType::Newline,
                        loc,
                    });
                    is_start_of_line = true;
                }
                '"' | '\'' => {
                    self.handle_quoted_string(&mut tokens, loc, c)?;
                }
                c if c.is_whitespace() => {
                    self.advance();
                }
                _ => {
                    self.handle_text_or_number(&mut tokens, loc)?;
                }
            }
        }

        Ok(tokens)
    }

    fn handle_indentation(&mut self, tokens: &mut Vec<Token>) -> Result<(), String> {
        let loc = self.current_loc();
        let mut count = 0usize;
        while let Some(&c) = self.peek() {
            match c {
                ' ' => {
                    count += 1;
                    self.advance();
                }
                '\t' => {
                    count += 4;
                    self.advance();
                }
                _ => break,
            }
        }
        if !matches!(self.peek(), Some('\n') | Some('#') | None) {
            tokens.push(Token {
                kind: TokenType::Indent(count),
                loc,
            });
        }
        Ok(())
    }

    fn skip_comment(&mut self) {
        while let Some(&c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn handle_dash(&mut self, tokens: &mut Vec<Token>, loc: Loc) -> Result<(), String> {
        self.advance();
        match self.peek() {
            Some(&c) if c.is_whitespace() || c == '\n' => {
                tokens.push(Token {
                    kind: TokenType::Dash,
                    loc,
                });
            }
            None => {
                tokens.push(Token {
                    kind: TokenType::Dash,
                    loc,
                });
            }
            _ => {
                let mut text = String::from("-");
                while let Some(&c) = self.peek() {
                    if c.is_alphanumeric() || "._-/".contains(c) {
                        text.push(c);
                        self.advance();
                    } else {
                        break;
                    }
                }
                tokens.push(Token {
                    kind: TokenType::Text(text),
                    loc,
                });
            }
        }
        Ok(())
    }

    fn handle_quoted_string(
        &mut self,
        tokens: &mut Vec<Token>,
        loc: Loc,
        quote_char: char,
    ) -> Result<(), String> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.advance() {
                Some(c) if c == quote_char => break,
                Some(c) => text.push(c),
                None => {
                    return Err(format!("Unterminated string starting at {loc}"));
                }
            }
        }
        tokens.push(Token {
            kind: TokenType::StringLit(text),
            loc,
        });
        Ok(())
    }

    fn handle_text_or_number(&mut self, tokens: &mut Vec<Token>, loc: Loc) -> Result<(), String> {
        let mut text = String::new();
        while let Some(&c) = self.peek() {
            if c.is_alphanumeric() || "._-/".contains(c) {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if text.is_empty() {
            let c = self.advance().unwrap();
            return Err(format!("Unexpected character: '{c}' at {loc}"));
        }
        if let Ok(n) = text.parse::<u64>() {
            tokens.push(Token {
                kind: TokenType::Number(n),
                loc,
            });
        } else {
            tokens.push(Token {
                kind: TokenType::Text(text),
                loc,
            });
        }
        Ok(())
    }
}
