use crate::error::{JsonReaderError, ODataError};
use crate::json::lexer::{Lexer, Token, TokenType};
use crate::json::{JsonNode, JsonPrimitive, SpannedNode};
use crate::utils::get_line_and_column;
use miette::NamedSource;
use std::sync::Arc;

/// A recursive descent parser that flattens a JSON text into the node
/// stream consumed by [`BufferingJsonReader`](crate::json::BufferingJsonReader).
#[derive(Debug)]
pub struct NodeParser<'a> {
    source: Arc<NamedSource<String>>,
    tokens: Vec<Token>,
    position: usize,
    source_text: &'a str,
    nodes: Vec<SpannedNode>,
    depth: usize,
    max_depth: usize,
}

impl<'a> NodeParser<'a> {
    pub fn new(source_text: &'a str, name: String, max_depth: usize) -> Self {
        let source = Arc::new(NamedSource::new(name, source_text.to_string()));
        let mut lexer = Lexer::new(source_text);
        let tokens: Vec<Token> = lexer
            .lex()
            .into_iter()
            .filter(|t| !matches!(t.ttype, TokenType::Whitespace))
            .collect();

        Self {
            source,
            tokens,
            position: 0,
            source_text,
            nodes: Vec::new(),
            depth: 0,
            max_depth,
        }
    }

    ///    Document ::= Value EOF
    pub fn parse_document(mut self) -> Result<Vec<SpannedNode>, ODataError> {
        self.parse_value()?;
        let end = self.current_token()?.clone();
        if end.ttype != TokenType::Eof {
            return self.err_unexpected("end of input");
        }
        self.nodes.push(SpannedNode {
            node: JsonNode::EndOfInput,
            start: end.pos_start,
            end: end.pos_end,
        });
        Ok(self.nodes)
    }

    /// Value ::= Object | Array | String | Number | "true" | "false" | "null"
    fn parse_value(&mut self) -> Result<(), ODataError> {
        let token = self.current_token()?.clone();
        let primitive = match &token.ttype {
            TokenType::LBrace => return self.parse_object(),
            TokenType::LBracket => return self.parse_array(),
            TokenType::String(s) => JsonPrimitive::String(s.clone()),
            TokenType::Number(n) => JsonPrimitive::Number(n.clone()),
            TokenType::True => JsonPrimitive::Boolean(true),
            TokenType::False => JsonPrimitive::Boolean(false),
            TokenType::Null => JsonPrimitive::Null,
            TokenType::Unknown => return self.err_invalid(&token),
            _ => return self.err_unexpected("a value"),
        };
        self.advance();
        self.push(JsonNode::Primitive(primitive), &token);
        Ok(())
    }

    /// Object ::= "{" [ Member { "," Member } ] "}"
    /// Member ::= String ":" Value
    fn parse_object(&mut self) -> Result<(), ODataError> {
        let start_token = self.current_token()?.clone();
        self.enter_scope(&start_token)?;
        self.expect(TokenType::LBrace)?;
        self.push(JsonNode::StartObject, &start_token);
        if !self.check(TokenType::RBrace) {
            loop {
                let name_token = self.current_token()?.clone();
                match &name_token.ttype {
                    TokenType::String(name) => {
                        self.advance();
                        self.push(JsonNode::Property(name.clone()), &name_token);
                    }
                    TokenType::Unknown => return self.err_invalid(&name_token),
                    _ => return self.err_unexpected("a property name"),
                }
                self.expect(TokenType::Colon)?;
                self.parse_value()?;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        let end_token = self.current_token()?.clone();
        self.expect(TokenType::RBrace)?;
        self.push(JsonNode::EndObject, &end_token);
        self.depth -= 1;
        Ok(())
    }

    /// Array ::= "[" [ Value { "," Value } ] "]"
    fn parse_array(&mut self) -> Result<(), ODataError> {
        let start_token = self.current_token()?.clone();
        self.enter_scope(&start_token)?;
        self.expect(TokenType::LBracket)?;
        self.push(JsonNode::StartArray, &start_token);
        if !self.check(TokenType::RBracket) {
            loop {
                self.parse_value()?;
                if !self.match_token(TokenType::Comma) {
                    break;
                }
            }
        }
        let end_token = self.current_token()?.clone();
        self.expect(TokenType::RBracket)?;
        self.push(JsonNode::EndArray, &end_token);
        self.depth -= 1;
        Ok(())
    }

    // === Helper Methods ===

    fn enter_scope(&mut self, token: &Token) -> Result<(), ODataError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(JsonReaderError::MaxDepthExceeded {
                src: (*self.source).clone(),
                span: (token.pos_start, token.pos_end - token.pos_start).into(),
                max_depth: self.max_depth,
            }
            .into());
        }
        Ok(())
    }

    fn push(&mut self, node: JsonNode, token: &Token) {
        self.nodes.push(SpannedNode {
            node,
            start: token.pos_start,
            end: token.pos_end,
        });
    }

    fn current_token(&self) -> Result<&Token, ODataError> {
        self.tokens.get(self.position).ok_or_else(|| {
            let pos = self.source_text.len().saturating_sub(1);
            JsonReaderError::UnexpectedEof {
                src: (*self.source).clone(),
                span: (pos, 0).into(),
            }
            .into()
        })
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: TokenType) -> Result<(), ODataError> {
        let token = self.current_token()?.clone();
        if std::mem::discriminant(&token.ttype) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else if token.ttype == TokenType::Unknown {
            self.err_invalid(&token)
        } else {
            self.err_unexpected(&format!("{expected:?}"))
        }
    }

    fn match_token(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, ttype: TokenType) -> bool {
        if let Ok(token) = self.current_token() {
            std::mem::discriminant(&token.ttype) == std::mem::discriminant(&ttype)
        } else {
            false
        }
    }

    fn err_unexpected<T>(&self, expected: &str) -> Result<T, ODataError> {
        let token = self.current_token()?;
        if token.ttype == TokenType::Eof {
            return Err(JsonReaderError::UnexpectedEof {
                src: (*self.source).clone(),
                span: (token.pos_start, 0).into(),
            }
            .into());
        }
        let (line, column) = get_line_and_column(self.source_text, token.pos_start);
        Err(JsonReaderError::UnexpectedToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            expected: expected.to_string(),
            line,
            column,
        }
        .into())
    }

    fn err_invalid<T>(&self, token: &Token) -> Result<T, ODataError> {
        let (line, column) = get_line_and_column(self.source_text, token.pos_start);
        Err(JsonReaderError::InvalidToken {
            src: (*self.source).clone(),
            span: (token.pos_start, token.pos_end - token.pos_start).into(),
            line,
            column,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<JsonNode> {
        match NodeParser::new(source, "test.json".to_string(), 100).parse_document() {
            Ok(nodes) => nodes.into_iter().map(|n| n.node).collect(),
            Err(err) => panic!("{:#}", miette::Report::new(err)),
        }
    }

    fn parse_err(source: &str, max_depth: usize) -> JsonReaderError {
        match NodeParser::new(source, "test.json".to_string(), max_depth).parse_document() {
            Err(ODataError::Json(err)) => err,
            other => panic!("Expected a JSON reader error, got {other:?}"),
        }
    }

    #[test]
    fn test_flat_object() {
        let nodes = parse_ok(r#"{ "a": 1, "b": [true, null] }"#);
        assert_eq!(
            nodes,
            vec![
                JsonNode::StartObject,
                JsonNode::Property("a".to_string()),
                JsonNode::Primitive(JsonPrimitive::Number("1".to_string())),
                JsonNode::Property("b".to_string()),
                JsonNode::StartArray,
                JsonNode::Primitive(JsonPrimitive::Boolean(true)),
                JsonNode::Primitive(JsonPrimitive::Null),
                JsonNode::EndArray,
                JsonNode::EndObject,
                JsonNode::EndOfInput,
            ]
        );
    }

    #[test]
    fn test_top_level_primitive() {
        assert_eq!(
            parse_ok(r#""text""#),
            vec![
                JsonNode::Primitive(JsonPrimitive::String("text".to_string())),
                JsonNode::EndOfInput
            ]
        );
    }

    #[test]
    fn test_trailing_comma_is_rejected() {
        assert!(matches!(
            parse_err("[1, 2, ]", 100),
            JsonReaderError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_trailing_content_is_rejected() {
        assert!(matches!(
            parse_err("{} {}", 100),
            JsonReaderError::UnexpectedToken { .. }
        ));
    }

    #[test]
    fn test_truncated_input() {
        assert!(matches!(
            parse_err(r#"{ "a": "#, 100),
            JsonReaderError::UnexpectedEof { .. }
        ));
    }

    #[test]
    fn test_invalid_token_reports_position() {
        match parse_err("{\n  \"a\": nope\n}", 100) {
            JsonReaderError::InvalidToken { line, column, .. } => {
                assert_eq!((line, column), (2, 8));
            }
            other => panic!("Unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_depth_limit() {
        assert!(matches!(
            parse_err("[[[1]]]", 2),
            JsonReaderError::MaxDepthExceeded { max_depth: 2, .. }
        ));
        assert_eq!(
            NodeParser::new("[[1]]", "t".to_string(), 2)
                .parse_document()
                .map(|n| n.len())
                .ok(),
            Some(6)
        );
    }
}
