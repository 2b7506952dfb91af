use crate::error::ODataError;
use futures::io::{AsyncWrite, AsyncWriteExt};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Object,
    Array,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    has_members: bool,
}

/// An in-memory JSON text builder. Separators are tracked per scope, so
/// callers only emit names and values.
#[derive(Debug, Default)]
pub struct JsonWriter {
    buffer: String,
    scopes: Vec<Scope>,
    after_name: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_object(&mut self) {
        self.before_value();
        self.buffer.push('{');
        self.scopes.push(Scope {
            kind: ScopeKind::Object,
            has_members: false,
        });
    }

    pub fn end_object(&mut self) {
        self.end_scope(ScopeKind::Object, '}');
    }

    pub fn start_array(&mut self) {
        self.before_value();
        self.buffer.push('[');
        self.scopes.push(Scope {
            kind: ScopeKind::Array,
            has_members: false,
        });
    }

    pub fn end_array(&mut self) {
        self.end_scope(ScopeKind::Array, ']');
    }

    /// Writes a property name inside the current object.
    pub fn name(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.has_members {
                self.buffer.push(',');
            }
            scope.has_members = true;
        }
        self.push_quoted(name);
        self.buffer.push(':');
        self.after_name = true;
    }

    pub fn string(&mut self, value: &str) {
        self.before_value();
        self.push_quoted(value);
    }

    pub fn string_or_null(&mut self, value: Option<&str>) {
        match value {
            Some(text) => self.string(text),
            None => self.null(),
        }
    }

    pub fn boolean(&mut self, value: bool) {
        self.before_value();
        self.buffer.push_str(if value { "true" } else { "false" });
    }

    pub fn int(&mut self, value: i64) {
        self.before_value();
        self.buffer.push_str(&value.to_string());
    }

    /// Finite doubles are numbers; infinities and NaN use the OData literals.
    pub fn double(&mut self, value: f64) {
        if value.is_nan() {
            self.string("NaN");
        } else if value.is_infinite() {
            self.string(if value > 0.0 { "INF" } else { "-INF" });
        } else {
            self.before_value();
            let mut text = value.to_string();
            if !text.contains(['.', 'e', 'E']) {
                text.push_str(".0");
            }
            self.buffer.push_str(&text);
        }
    }

    pub fn null(&mut self) {
        self.before_value();
        self.buffer.push_str("null");
    }

    /// Writes already serialized JSON text as the next value.
    pub fn raw_json(&mut self, raw: &str) {
        self.before_value();
        self.buffer.push_str(raw);
    }

    pub fn json_value(&mut self, value: &serde_json::Value) {
        self.raw_json(&value.to_string());
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Moves everything written so far into `output`.
    pub fn flush_to<W: Write>(&mut self, output: &mut W) -> Result<(), ODataError> {
        output.write_all(self.buffer.as_bytes())?;
        output.flush()?;
        self.buffer.clear();
        Ok(())
    }

    pub async fn flush_to_async<W>(&mut self, output: &mut W) -> Result<(), ODataError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        output.write_all(self.buffer.as_bytes()).await?;
        output.flush().await?;
        self.buffer.clear();
        Ok(())
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.buffer
    }

    fn before_value(&mut self) {
        if self.after_name {
            self.after_name = false;
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind == ScopeKind::Array {
                if scope.has_members {
                    self.buffer.push(',');
                }
                scope.has_members = true;
            }
        }
    }

    fn end_scope(&mut self, kind: ScopeKind, closing: char) {
        if self.scopes.last().is_some_and(|scope| scope.kind == kind) {
            self.scopes.pop();
        }
        self.buffer.push(closing);
    }

    fn push_quoted(&mut self, text: &str) {
        // Serializing a str cannot fail.
        let quoted = serde_json::to_string(text).unwrap_or_default();
        self.buffer.push_str(&quoted);
    }
}
