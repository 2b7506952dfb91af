use crate::error::{InternalError, JsonReaderError, ODataError, UsageError};
use crate::json::parser::NodeParser;
use crate::json::{AsyncTokenSource, JsonNode, SpannedNode, TokenSource};
use crate::media_type::Charset;
use crate::utils::get_line_and_column;
use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncReadExt};
use miette::NamedSource;
use std::fmt;
use std::pin::Pin;

const DEFAULT_SOURCE_NAME: &str = "payload.json";
const DEFAULT_MAX_DEPTH: usize = 100;

enum Input {
    /// Text not parsed yet; parsing happens on the first read so syntax
    /// errors surface from `read`.
    Text(String),
    Pending {
        stream: Pin<Box<dyn AsyncRead + Send>>,
        charset: Charset,
    },
    Parsed(Parsed),
    Failed(ODataError),
}

struct Parsed {
    text: String,
    nodes: Vec<SpannedNode>,
}

/// The token source used by every reader in this crate.
///
/// The whole payload is tokenized up front into a flat node list, so
/// buffering is a saved cursor and `stop_buffering` a cursor restore.
pub struct BufferingJsonReader {
    name: String,
    input: Input,
    max_depth: usize,
    /// Index of the current node; `None` before the first read.
    cursor: Option<usize>,
    buffer_mark: Option<Option<usize>>,
}

impl fmt::Debug for BufferingJsonReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferingJsonReader")
            .field("name", &self.name)
            .field("cursor", &self.cursor)
            .field("buffering", &self.buffer_mark.is_some())
            .finish()
    }
}

impl BufferingJsonReader {
    pub fn new(text: &str) -> Self {
        Self::new_with_name(text, DEFAULT_SOURCE_NAME.to_string())
    }

    pub fn new_with_name(text: &str, name: String) -> Self {
        Self {
            name,
            input: Input::Text(text.to_string()),
            max_depth: DEFAULT_MAX_DEPTH,
            cursor: None,
            buffer_mark: None,
        }
    }

    /// A reader over a stream that must be buffered with
    /// [`AsyncTokenSource::prepare_async`] before it can be read.
    pub fn from_async_read<R>(stream: R, charset: Charset) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            name: DEFAULT_SOURCE_NAME.to_string(),
            input: Input::Pending {
                stream: Box::pin(stream),
                charset,
            },
            max_depth: DEFAULT_MAX_DEPTH,
            cursor: None,
            buffer_mark: None,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.set_max_depth(max_depth);
        self
    }

    /// Byte offset of the current node in the payload text.
    #[must_use]
    pub fn position(&self) -> usize {
        match (&self.input, self.cursor) {
            (Input::Parsed(parsed), Some(cursor)) => parsed.nodes[cursor].start,
            _ => 0,
        }
    }

    fn parsed(&mut self) -> Result<&Parsed, ODataError> {
        if let Input::Text(text) = &mut self.input {
            let text = std::mem::take(text);
            let result = NodeParser::new(&text, self.name.clone(), self.max_depth).parse_document();
            self.input = match result {
                Ok(nodes) => Input::Parsed(Parsed { text, nodes }),
                Err(err) => Input::Failed(err),
            };
        }
        match &self.input {
            Input::Parsed(parsed) => Ok(parsed),
            Input::Failed(err) => Err(err.clone()),
            Input::Pending { .. } | Input::Text(_) => Err(UsageError::AsyncInputNotBuffered.into()),
        }
    }

    /// Index one past the value starting at `start`.
    fn value_end(nodes: &[SpannedNode], start: usize) -> usize {
        let mut depth = 0usize;
        let mut index = start;
        loop {
            match nodes[index].node {
                JsonNode::StartObject | JsonNode::StartArray => depth += 1,
                JsonNode::EndObject | JsonNode::EndArray => depth = depth.saturating_sub(1),
                _ => {}
            }
            index += 1;
            if depth == 0 || index >= nodes.len() {
                return index;
            }
        }
    }

    fn current_value_range(&mut self) -> Result<(usize, usize), ODataError> {
        if !self.node().is_value_start() {
            return Err(self.unexpected("the start of a value"));
        }
        let start = self.cursor.unwrap_or_default();
        let parsed = self.parsed()?;
        Ok((start, Self::value_end(&parsed.nodes, start)))
    }
}

static NONE_NODE: JsonNode = JsonNode::None;

impl TokenSource for BufferingJsonReader {
    fn read(&mut self) -> Result<bool, ODataError> {
        let cursor = self.cursor;
        let parsed = self.parsed()?;
        let last = parsed.nodes.len() - 1;
        let next = match cursor {
            None => 0,
            Some(index) => (index + 1).min(last),
        };
        self.cursor = Some(next);
        log::trace!("json reader at node {next}");
        Ok(next < last)
    }

    fn node(&self) -> &JsonNode {
        match (&self.input, self.cursor) {
            (Input::Parsed(parsed), Some(cursor)) => &parsed.nodes[cursor].node,
            _ => &NONE_NODE,
        }
    }

    fn start_buffering(&mut self) -> Result<(), ODataError> {
        if self.buffer_mark.is_some() {
            return Err(InternalError::BufferingAlreadyActive.into());
        }
        self.buffer_mark = Some(self.cursor);
        Ok(())
    }

    fn stop_buffering(&mut self) -> Result<(), ODataError> {
        match self.buffer_mark.take() {
            Some(mark) => {
                self.cursor = mark;
                Ok(())
            }
            None => Err(InternalError::NotBuffering.into()),
        }
    }

    fn is_buffering(&self) -> bool {
        self.buffer_mark.is_some()
    }

    fn skip_value(&mut self) -> Result<(), ODataError> {
        let (_, end) = self.current_value_range()?;
        self.cursor = Some(end);
        Ok(())
    }

    fn read_raw_value(&mut self) -> Result<String, ODataError> {
        let (start, end) = self.current_value_range()?;
        let parsed = self.parsed()?;
        let raw = parsed.text[parsed.nodes[start].start..parsed.nodes[end - 1].end].to_string();
        self.cursor = Some(end);
        Ok(raw)
    }

    fn unexpected(&self, expected: &str) -> ODataError {
        let found = self.node().to_string();
        match (&self.input, self.cursor) {
            (Input::Parsed(parsed), Some(cursor)) => {
                let node = &parsed.nodes[cursor];
                let (line, column) = get_line_and_column(&parsed.text, node.start);
                JsonReaderError::UnexpectedNode {
                    src: NamedSource::new(self.name.clone(), parsed.text.clone()),
                    span: (node.start, node.end - node.start).into(),
                    expected: expected.to_string(),
                    found,
                    line,
                    column,
                }
                .into()
            }
            _ => JsonReaderError::UnexpectedNode {
                src: NamedSource::new(self.name.clone(), String::new()),
                span: (0, 0).into(),
                expected: expected.to_string(),
                found,
                line: 1,
                column: 1,
            }
            .into(),
        }
    }

    fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
    }
}

#[async_trait]
impl AsyncTokenSource for BufferingJsonReader {
    async fn prepare_async(&mut self) -> Result<(), ODataError> {
        if let Input::Pending { stream, charset } = &mut self.input {
            let mut bytes = Vec::new();
            let charset = *charset;
            let outcome = stream.read_to_end(&mut bytes).await;
            let decoded = outcome
                .map_err(ODataError::from)
                .and_then(|_| charset.decode(&bytes));
            match decoded {
                Ok(text) => {
                    log::debug!("buffered {} bytes of asynchronous input", bytes.len());
                    self.input = Input::Text(text);
                }
                Err(err) => {
                    self.input = Input::Failed(err.clone());
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::JsonPrimitive;

    fn number(text: &str) -> JsonNode {
        JsonNode::Primitive(JsonPrimitive::Number(text.to_string()))
    }

    #[test]
    fn test_reads_nodes_in_order() {
        let mut reader = BufferingJsonReader::new(r#"{"a":[1,2]}"#);
        assert_eq!(*reader.node(), JsonNode::None);
        let mut seen = Vec::new();
        while reader.read().unwrap() {
            seen.push(reader.node().clone());
        }
        assert_eq!(*reader.node(), JsonNode::EndOfInput);
        assert_eq!(
            seen,
            vec![
                JsonNode::StartObject,
                JsonNode::Property("a".to_string()),
                JsonNode::StartArray,
                number("1"),
                number("2"),
                JsonNode::EndArray,
                JsonNode::EndObject,
            ]
        );
    }

    #[test]
    fn test_depth_is_limited_by_default() {
        let text = format!("{}{}", "[".repeat(DEFAULT_MAX_DEPTH + 1), "]".repeat(DEFAULT_MAX_DEPTH + 1));
        let mut reader = BufferingJsonReader::new(&text);
        assert!(matches!(
            reader.read(),
            Err(ODataError::Json(JsonReaderError::MaxDepthExceeded { max_depth: DEFAULT_MAX_DEPTH, .. }))
        ));

        let mut raised = BufferingJsonReader::new(&text).with_max_depth(DEFAULT_MAX_DEPTH + 1);
        assert!(raised.read().unwrap());
    }

    #[test]
    fn test_buffering_rewinds() {
        let mut reader = BufferingJsonReader::new(r#"[1,2,3]"#);
        reader.read().unwrap();
        reader.read().unwrap();
        reader.start_buffering().unwrap();
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(*reader.node(), number("3"));
        reader.stop_buffering().unwrap();
        assert_eq!(*reader.node(), number("1"));
        assert!(!reader.is_buffering());
    }

    #[test]
    fn test_nested_buffering_is_an_internal_error() {
        let mut reader = BufferingJsonReader::new("[]");
        reader.read().unwrap();
        reader.start_buffering().unwrap();
        let err = reader.start_buffering().unwrap_err();
        assert!(err.is_internal());
        assert!(reader.stop_buffering().is_ok());
        assert!(reader.stop_buffering().unwrap_err().is_internal());
    }

    #[test]
    fn test_with_buffering_releases_on_failure() {
        let mut reader = BufferingJsonReader::new(r#"{"a":1}"#);
        reader.read().unwrap();
        let result: Result<(), ODataError> = reader.with_buffering(|r| {
            r.read()?;
            r.read_start_array()
        });
        assert!(result.is_err());
        assert!(!reader.is_buffering());
        assert_eq!(*reader.node(), JsonNode::StartObject);
    }

    #[test]
    fn test_skip_and_raw_value() {
        let mut reader = BufferingJsonReader::new(r#"{"a":{"b":[1, {"c":null}]},"d":true}"#);
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.read_property_name().unwrap(), "a");
        let raw = reader
            .with_buffering(|r| r.read_raw_value())
            .unwrap();
        assert_eq!(raw, r#"{"b":[1, {"c":null}]}"#);
        assert_eq!(*reader.node(), JsonNode::StartObject);
        reader.skip_value().unwrap();
        assert_eq!(*reader.node(), JsonNode::Property("d".to_string()));
    }

    #[test]
    fn test_syntax_errors_surface_from_read() {
        let mut reader = BufferingJsonReader::new("[1,");
        assert!(matches!(reader.read(), Err(ODataError::Json(_))));
        assert!(matches!(reader.read(), Err(ODataError::Json(_))));
    }

    #[test]
    fn test_unprepared_async_input_cannot_be_read_synchronously() {
        let mut reader =
            BufferingJsonReader::from_async_read(futures::io::Cursor::new(b"[]".to_vec()), Charset::Utf8);
        assert!(matches!(
            reader.read(),
            Err(ODataError::Usage(UsageError::AsyncInputNotBuffered))
        ));
        futures::executor::block_on(reader.prepare_async()).unwrap();
        assert!(reader.read().unwrap());
        assert_eq!(*reader.node(), JsonNode::StartArray);
    }
}
