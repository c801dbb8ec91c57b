//! Tokenizer for contract source.

use super::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    /// decimal literal text, parsed later so no precision is lost
    Decimal(String),
    Str(String),

    // keywords
    Import,
    Var,
    Hash,
    Foreign,
    Fn,
    Export,
    Construct,
    Let,
    If,
    Else,
    While,
    Return,
    Assert,
    And,
    Or,
    Not,
    True,
    False,
    Null,

    // punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Dot,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

fn keyword(word: &str) -> Option<Tok> {
    Some(match word {
        "import" => Tok::Import,
        "var" => Tok::Var,
        "hash" => Tok::Hash,
        "foreign" => Tok::Foreign,
        "fn" => Tok::Fn,
        "export" => Tok::Export,
        "construct" => Tok::Construct,
        "let" => Tok::Let,
        "if" => Tok::If,
        "else" => Tok::Else,
        "while" => Tok::While,
        "return" => Tok::Return,
        "assert" => Tok::Assert,
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "true" => Tok::True,
        "false" => Tok::False,
        "null" => Tok::Null,
        _ => return None,
    })
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, CompileError> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    let mut line = 1;

    let err = |line: usize, msg: String| CompileError::Syntax { line, msg };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let tok = keyword(&word).unwrap_or(Tok::Ident(word));
                out.push(Token { tok, line });
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_decimal = false;
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_decimal = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let tok = if is_decimal {
                    Tok::Decimal(text)
                } else {
                    Tok::Int(
                        text.parse::<i64>()
                            .map_err(|_| err(line, format!("integer literal {} out of range", text)))?,
                    )
                };
                out.push(Token { tok, line });
            }
            '"' | '\'' => {
                let quote = c;
                let start_line = line;
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= chars.len() {
                        return Err(err(start_line, "unterminated string literal".into()));
                    }
                    let ch = chars[i];
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    match ch {
                        '\n' => return Err(err(start_line, "newline in string literal".into())),
                        '\\' => {
                            let esc = chars.get(i).copied().ok_or_else(|| err(line, "dangling escape".into()))?;
                            i += 1;
                            s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                '\\' => '\\',
                                '"' => '"',
                                '\'' => '\'',
                                '0' => '\0',
                                other => return Err(err(line, format!("unknown escape \\{}", other))),
                            });
                        }
                        other => s.push(other),
                    }
                }
                out.push(Token { tok: Tok::Str(s), line: start_line });
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (tok, len) = match (c, next) {
                    ('=', Some('=')) => (Tok::Eq, 2),
                    ('!', Some('=')) => (Tok::Ne, 2),
                    ('<', Some('=')) => (Tok::Le, 2),
                    ('>', Some('=')) => (Tok::Ge, 2),
                    ('/', Some('/')) => (Tok::SlashSlash, 2),
                    ('=', _) => (Tok::Assign, 1),
                    ('<', _) => (Tok::Lt, 1),
                    ('>', _) => (Tok::Gt, 1),
                    ('/', _) => (Tok::Slash, 1),
                    ('(', _) => (Tok::LParen, 1),
                    (')', _) => (Tok::RParen, 1),
                    ('{', _) => (Tok::LBrace, 1),
                    ('}', _) => (Tok::RBrace, 1),
                    ('[', _) => (Tok::LBracket, 1),
                    (']', _) => (Tok::RBracket, 1),
                    (',', _) => (Tok::Comma, 1),
                    (';', _) => (Tok::Semi, 1),
                    (':', _) => (Tok::Colon, 1),
                    ('.', _) => (Tok::Dot, 1),
                    ('+', _) => (Tok::Plus, 1),
                    ('-', _) => (Tok::Minus, 1),
                    ('*', _) => (Tok::Star, 1),
                    ('%', _) => (Tok::Percent, 1),
                    _ => return Err(err(line, format!("unexpected character {:?}", c))),
                };
                out.push(Token { tok, line });
                i += len;
            }
        }
    }

    out.push(Token { tok: Tok::Eof, line });
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_keywords_and_operators() {
        assert_eq!(
            toks("export fn f(x) { return x // 2 >= 1.50; }"),
            vec![
                Tok::Export,
                Tok::Fn,
                Tok::Ident("f".into()),
                Tok::LParen,
                Tok::Ident("x".into()),
                Tok::RParen,
                Tok::LBrace,
                Tok::Return,
                Tok::Ident("x".into()),
                Tok::SlashSlash,
                Tok::Int(2),
                Tok::Ge,
                Tok::Decimal("1.50".into()),
                Tok::Semi,
                Tok::RBrace,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = tokenize("# header\nvar x; # trailing\n\nvar y;").unwrap();
        assert_eq!(tokens[0].line, 2);
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(toks(r#""a\"b\n""#)[0], Tok::Str("a\"b\n".into()));
        assert_eq!(toks("'it'")[0], Tok::Str("it".into()));
        assert!(tokenize("\"open").is_err());
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(tokenize("var $x;"), Err(CompileError::Syntax { line: 1, .. })));
    }
}
