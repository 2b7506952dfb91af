/// JSON token kinds. Whitespace is kept so positions stay exact.
#[derive(Debug, PartialEq, Clone)]
pub enum TokenType {
    Eof,
    Whitespace,
    /// Anything that is not JSON: a stray character, an unclosed string or a bad escape.
    Unknown,

    /// A string literal, enclosed in double quotes, with escapes resolved.
    String(String),
    /// A number literal kept in its textual form so integer and decimal
    /// semantics can be decided later against the expected type.
    Number(String),
    True,
    False,
    Null,

    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
}

/// A token and the byte range it covers.
#[derive(Debug, Clone)]
pub struct Token {
    pub ttype: TokenType,
    pub pos_start: usize,
    pub pos_end: usize,
}

impl Token {
    pub fn new(ttype: TokenType, pos_start: usize, pos_end: usize) -> Token {
        Token {
            ttype,
            pos_start,
            pos_end,
        }
    }
}

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            position: 0,
        }
    }

    pub fn lex(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.ttype == TokenType::Eof {
                tokens.push(token);
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    pub fn next_token(&mut self) -> Token {
        let start_pos = self.position;

        let ttype = if let Some(char) = self.advance() {
            match char {
                '{' => TokenType::LBrace,
                '}' => TokenType::RBrace,
                '[' => TokenType::LBracket,
                ']' => TokenType::RBracket,
                ',' => TokenType::Comma,
                ':' => TokenType::Colon,
                '"' => self.read_string(),
                c if is_json_whitespace(c) => self.read_whitespace(),
                c if c.is_ascii_alphabetic() => self.read_keyword(c),
                c if c.is_ascii_digit()
                    || (c == '-' && self.peek().is_some_and(|c| c.is_ascii_digit())) =>
                {
                    self.read_number(c)
                }
                _ => TokenType::Unknown,
            }
        } else {
            TokenType::Eof
        };

        Token::new(ttype, start_pos, self.position)
    }

    fn advance(&mut self) -> Option<char> {
        let char = self.chars.next();
        if let Some(c) = char {
            self.position += c.len_utf8();
        }
        char
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn read_whitespace(&mut self) -> TokenType {
        while let Some(c) = self.peek() {
            if is_json_whitespace(*c) {
                self.advance();
            } else {
                break;
            }
        }
        TokenType::Whitespace
    }

    fn read_string(&mut self) -> TokenType {
        let mut value = String::new();
        while let Some(c) = self.advance() {
            match c {
                '"' => return TokenType::String(value),
                '\\' => match self.advance() {
                    Some('"') => value.push('"'),
                    Some('\\') => value.push('\\'),
                    Some('/') => value.push('/'),
                    Some('b') => value.push('\u{0008}'),
                    Some('f') => value.push('\u{000C}'),
                    Some('n') => value.push('\n'),
                    Some('r') => value.push('\r'),
                    Some('t') => value.push('\t'),
                    Some('u') => match self.read_unicode_escape() {
                        Some(decoded) => value.push(decoded),
                        None => return TokenType::Unknown,
                    },
                    _ => return TokenType::Unknown, // Bad or unclosed escape sequence
                },
                c if (c as u32) < 0x20 => return TokenType::Unknown,
                c => value.push(c),
            }
        }
        TokenType::Unknown
    }

    /// Decodes the four hex digits after `\u`, pairing surrogates.
    fn read_unicode_escape(&mut self) -> Option<char> {
        let high = self.read_hex4()?;
        if !(0xD800..0xDC00).contains(&high) {
            return char::from_u32(high);
        }
        if self.advance()? != '\\' || self.advance()? != 'u' {
            return None;
        }
        let low = self.read_hex4()?;
        if !(0xDC00..0xE000).contains(&low) {
            return None;
        }
        char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
    }

    fn read_hex4(&mut self) -> Option<u32> {
        let mut code = 0;
        for _ in 0..4 {
            code = code * 16 + self.advance()?.to_digit(16)?;
        }
        Some(code)
    }

    fn read_keyword(&mut self, first_char: char) -> TokenType {
        let mut word = String::new();
        word.push(first_char);

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() {
                let c = *c;
                self.advance();
                word.push(c);
            } else {
                break;
            }
        }

        match word.as_str() {
            "true" => TokenType::True,
            "false" => TokenType::False,
            "null" => TokenType::Null,
            _ => TokenType::Unknown,
        }
    }

    fn read_number(&mut self, first_char: char) -> TokenType {
        let mut number_str = String::new();
        number_str.push(first_char);
        let mut has_dot = false;
        let mut has_exponent = false;

        while let Some(&c) = self.peek() {
            if c.is_ascii_digit() {
                self.advance();
                number_str.push(c);
            } else if c == '.' && !has_dot && !has_exponent {
                has_dot = true;
                self.advance();
                number_str.push(c);
            } else if (c == 'e' || c == 'E') && !has_exponent {
                has_exponent = true;
                self.advance();
                number_str.push(c);
                // sign after the exponent marker
                if let Some(&sign_char) = self.peek() {
                    if sign_char == '+' || sign_char == '-' {
                        self.advance();
                        number_str.push(sign_char);
                    }
                }
            } else {
                break;
            }
        }

        if number_str.parse::<f64>().is_ok() && !number_str.ends_with('.') {
            TokenType::Number(number_str)
        } else {
            TokenType::Unknown
        }
    }
}

fn is_json_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tokens(input: &str, expected: Vec<TokenType>) {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.lex();
        let token_types: Vec<TokenType> = tokens
            .into_iter()
            .map(|t| t.ttype)
            .filter(|t| !matches!(t, TokenType::Whitespace))
            .collect();

        assert_eq!(token_types, expected);
    }

    #[test]
    fn test_eof() {
        assert_tokens("", vec![TokenType::Eof]);
    }

    #[test]
    fn test_punctuation() {
        assert_tokens(
            "{}[],:",
            vec![
                TokenType::LBrace,
                TokenType::RBrace,
                TokenType::LBracket,
                TokenType::RBracket,
                TokenType::Comma,
                TokenType::Colon,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_keywords() {
        assert_tokens(
            "true false null nil",
            vec![
                TokenType::True,
                TokenType::False,
                TokenType::Null,
                TokenType::Unknown,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_numbers_keep_their_text() {
        assert_tokens(
            "123 -10 45.67 1e10 2.5E-3",
            vec![
                TokenType::Number("123".to_string()),
                TokenType::Number("-10".to_string()),
                TokenType::Number("45.67".to_string()),
                TokenType::Number("1e10".to_string()),
                TokenType::Number("2.5E-3".to_string()),
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_strings_with_escapes() {
        assert_tokens(
            r#""a\"b\\c\/d\n" "\u00e9\ud83d\ude00""#,
            vec![
                TokenType::String("a\"b\\c/d\n".to_string()),
                TokenType::String("é😀".to_string()),
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_unterminated_string_is_unknown() {
        assert_tokens(r#""open"#, vec![TokenType::Unknown, TokenType::Eof]);
    }

    #[test]
    fn test_only_json_whitespace_is_skipped() {
        assert_tokens(
            " \t\r\n1",
            vec![TokenType::Number("1".to_string()), TokenType::Eof],
        );
        assert_tokens(
            "\u{a0}1\u{2028}",
            vec![
                TokenType::Unknown,
                TokenType::Number("1".to_string()),
                TokenType::Unknown,
                TokenType::Eof,
            ],
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let mut lexer = Lexer::new("[\"é\",1]");
        let tokens = lexer.lex();
        let number = tokens
            .iter()
            .find(|t| matches!(t.ttype, TokenType::Number(_)))
            .unwrap();
        assert_eq!((number.pos_start, number.pos_end), (6, 7));
    }
}
