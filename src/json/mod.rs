//! JSON token plumbing: lexing, node parsing, the buffering token source
//! the readers pull from, and the writer the serializers push into.

pub mod lexer;
pub mod parser;
mod reader;
mod writer;

pub use reader::BufferingJsonReader;
pub use writer::JsonWriter;

use crate::error::ODataError;
use async_trait::async_trait;
use std::fmt;

/// A structural event in a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonNode {
    /// Nothing has been read yet.
    None,
    StartObject,
    EndObject,
    StartArray,
    EndArray,
    Property(String),
    Primitive(JsonPrimitive),
    EndOfInput,
}

impl JsonNode {
    #[must_use]
    pub fn is_value_start(&self) -> bool {
        matches!(
            self,
            JsonNode::StartObject | JsonNode::StartArray | JsonNode::Primitive(_)
        )
    }
}

impl fmt::Display for JsonNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonNode::None => write!(f, "nothing"),
            JsonNode::StartObject => write!(f, "start of object"),
            JsonNode::EndObject => write!(f, "end of object"),
            JsonNode::StartArray => write!(f, "start of array"),
            JsonNode::EndArray => write!(f, "end of array"),
            JsonNode::Property(name) => write!(f, "property '{name}'"),
            JsonNode::Primitive(primitive) => write!(f, "{primitive}"),
            JsonNode::EndOfInput => write!(f, "end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonPrimitive {
    Null,
    Boolean(bool),
    /// Number text exactly as it appeared in the payload.
    Number(String),
    String(String),
}

impl fmt::Display for JsonPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonPrimitive::Null => write!(f, "null"),
            JsonPrimitive::Boolean(b) => write!(f, "{b}"),
            JsonPrimitive::Number(n) => write!(f, "number {n}"),
            JsonPrimitive::String(s) => write!(f, "string \"{s}\""),
        }
    }
}

/// A node with its byte span in the payload text.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedNode {
    pub node: JsonNode,
    pub start: usize,
    pub end: usize,
}

/// A buffering-capable streaming source of [`JsonNode`]s.
///
/// `read` moves to the next node. While buffering, reads are speculative:
/// `stop_buffering` rewinds to the node that was current when
/// `start_buffering` was called.
pub trait TokenSource {
    /// Advances to the next node. Returns `false` once the end of input is
    /// the current node.
    fn read(&mut self) -> Result<bool, ODataError>;

    fn node(&self) -> &JsonNode;

    fn start_buffering(&mut self) -> Result<(), ODataError>;

    fn stop_buffering(&mut self) -> Result<(), ODataError>;

    fn is_buffering(&self) -> bool;

    /// Skips the value starting at the current node and moves to the node
    /// after it.
    fn skip_value(&mut self) -> Result<(), ODataError>;

    /// Returns the raw text of the value starting at the current node and
    /// moves to the node after it.
    fn read_raw_value(&mut self) -> Result<String, ODataError>;

    /// Builds the error reported when the current node is not `expected`.
    fn unexpected(&self, expected: &str) -> ODataError;

    /// Caps the nesting depth of the payload. Has no effect once the first
    /// node was read.
    fn set_max_depth(&mut self, max_depth: usize);

    /// Runs `f` in buffering mode. Buffering is released before the result
    /// is returned, whether `f` succeeded or not.
    fn with_buffering<T, F>(&mut self, f: F) -> Result<T, ODataError>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T, ODataError>,
    {
        self.start_buffering()?;
        let result = f(self);
        let stopped = self.stop_buffering();
        let value = result?;
        stopped?;
        Ok(value)
    }

    fn read_start_object(&mut self) -> Result<(), ODataError> {
        if *self.node() != JsonNode::StartObject {
            return Err(self.unexpected("start of object"));
        }
        self.read()?;
        Ok(())
    }

    fn read_end_object(&mut self) -> Result<(), ODataError> {
        if *self.node() != JsonNode::EndObject {
            return Err(self.unexpected("end of object"));
        }
        self.read()?;
        Ok(())
    }

    fn read_start_array(&mut self) -> Result<(), ODataError> {
        if *self.node() != JsonNode::StartArray {
            return Err(self.unexpected("start of array"));
        }
        self.read()?;
        Ok(())
    }

    fn read_end_array(&mut self) -> Result<(), ODataError> {
        if *self.node() != JsonNode::EndArray {
            return Err(self.unexpected("end of array"));
        }
        self.read()?;
        Ok(())
    }

    fn read_property_name(&mut self) -> Result<String, ODataError> {
        let name = match self.node() {
            JsonNode::Property(name) => name.clone(),
            _ => return Err(self.unexpected("a property")),
        };
        self.read()?;
        Ok(name)
    }

    fn read_primitive(&mut self) -> Result<JsonPrimitive, ODataError> {
        let primitive = match self.node() {
            JsonNode::Primitive(primitive) => primitive.clone(),
            _ => return Err(self.unexpected("a primitive value")),
        };
        self.read()?;
        Ok(primitive)
    }

    /// Reads a string or `null`.
    fn read_string_or_null(&mut self) -> Result<Option<String>, ODataError> {
        match self.node() {
            JsonNode::Primitive(JsonPrimitive::String(_)) | JsonNode::Primitive(JsonPrimitive::Null) => {
                match self.read_primitive()? {
                    JsonPrimitive::String(text) => Ok(Some(text)),
                    _ => Ok(None),
                }
            }
            _ => Err(self.unexpected("a string")),
        }
    }

    /// Materializes the value at the current node as a generic JSON value.
    fn read_json_value(&mut self) -> Result<serde_json::Value, ODataError> {
        match self.node().clone() {
            JsonNode::StartObject => {
                self.read()?;
                let members = self.read_json_members()?;
                self.read_end_object()?;
                Ok(serde_json::Value::Object(members))
            }
            JsonNode::StartArray => {
                self.read()?;
                let mut items = Vec::new();
                while *self.node() != JsonNode::EndArray {
                    items.push(self.read_json_value()?);
                }
                self.read_end_array()?;
                Ok(serde_json::Value::Array(items))
            }
            JsonNode::Primitive(_) => match self.read_primitive()? {
                JsonPrimitive::Null => Ok(serde_json::Value::Null),
                JsonPrimitive::Boolean(b) => Ok(serde_json::Value::Bool(b)),
                JsonPrimitive::String(s) => Ok(serde_json::Value::String(s)),
                JsonPrimitive::Number(n) => {
                    let number: serde_json::Number = n
                        .parse()
                        .map_err(|_| self.unexpected("a JSON number"))?;
                    Ok(serde_json::Value::Number(number))
                }
            },
            _ => Err(self.unexpected("a value")),
        }
    }

    /// Reads properties up to, but not including, the end of the enclosing object.
    fn read_json_members(
        &mut self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ODataError> {
        let mut members = serde_json::Map::new();
        while let JsonNode::Property(_) = self.node() {
            let name = self.read_property_name()?;
            let value = self.read_json_value()?;
            members.insert(name, value);
        }
        Ok(members)
    }
}

impl<T: TokenSource + ?Sized> TokenSource for &mut T {
    fn read(&mut self) -> Result<bool, ODataError> {
        (**self).read()
    }

    fn node(&self) -> &JsonNode {
        (**self).node()
    }

    fn start_buffering(&mut self) -> Result<(), ODataError> {
        (**self).start_buffering()
    }

    fn stop_buffering(&mut self) -> Result<(), ODataError> {
        (**self).stop_buffering()
    }

    fn is_buffering(&self) -> bool {
        (**self).is_buffering()
    }

    fn skip_value(&mut self) -> Result<(), ODataError> {
        (**self).skip_value()
    }

    fn read_raw_value(&mut self) -> Result<String, ODataError> {
        (**self).read_raw_value()
    }

    fn unexpected(&self, expected: &str) -> ODataError {
        (**self).unexpected(expected)
    }

    fn set_max_depth(&mut self, max_depth: usize) {
        (**self).set_max_depth(max_depth)
    }
}

/// A token source whose underlying input arrives asynchronously.
///
/// `prepare_async` suspends until the input is available to the
/// synchronous [`TokenSource`] operations; it is a no-op once prepared.
#[async_trait]
pub trait AsyncTokenSource: TokenSource + Send {
    async fn prepare_async(&mut self) -> Result<(), ODataError>;
}

#[async_trait]
impl<T: AsyncTokenSource + ?Sized> AsyncTokenSource for &mut T {
    async fn prepare_async(&mut self) -> Result<(), ODataError> {
        (**self).prepare_async().await
    }
}
