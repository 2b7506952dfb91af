//! Push writer for collection payloads.

use crate::collection_validator::CollectionWithoutExpectedTypeValidator;
use crate::deserializer::{ODATA_METADATA, VALUE, VERBOSE_DATA};
use crate::edm::{
    collection_item_type_name, collection_type_name, CoreTypeResolver, TypeReference, TypeResolver,
};
use crate::error::{ODataError, StructuralError, UsageError};
use crate::json::JsonWriter;
use crate::model::ODataValue;
use crate::serializer::JsonSerializer;
use crate::settings::{PayloadFormat, WriterSettings};
use futures::io::AsyncWrite;
use std::fmt;
use std::io::Write;

const COMPONENT: &str = "collection writer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataCollectionWriterState {
    Start,
    Collection,
    Item,
    Completed,
    Error,
}

impl fmt::Display for ODataCollectionWriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ODataCollectionWriterState::Start => "Start",
            ODataCollectionWriterState::Collection => "Collection",
            ODataCollectionWriterState::Item => "Item",
            ODataCollectionWriterState::Completed => "Completed",
            ODataCollectionWriterState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

/// Writes a collection payload item by item into an in-memory buffer that
/// is drained with [`flush`](Self::flush) or [`flush_async`](Self::flush_async).
pub struct ODataCollectionWriter<'a> {
    serializer: JsonSerializer<'a>,
    writer: JsonWriter,
    state: ODataCollectionWriterState,
    expected_item_type: Option<TypeReference>,
    item_type: Option<TypeReference>,
    validator: Option<CollectionWithoutExpectedTypeValidator<'a>>,
}

impl ODataCollectionWriter<'static> {
    pub fn new(settings: &WriterSettings, expected_item_type: Option<TypeReference>) -> Self {
        Self::with_resolver(settings, &CoreTypeResolver, expected_item_type)
    }
}

impl<'a> ODataCollectionWriter<'a> {
    pub fn with_resolver(
        settings: &WriterSettings,
        resolver: &'a dyn TypeResolver,
        expected_item_type: Option<TypeReference>,
    ) -> Self {
        Self {
            serializer: JsonSerializer::new(settings.clone(), resolver),
            writer: JsonWriter::new(),
            state: ODataCollectionWriterState::Start,
            expected_item_type,
            item_type: None,
            validator: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ODataCollectionWriterState {
        self.state
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.serializer.settings().content_type()
    }

    /// Text written and not flushed yet.
    #[must_use]
    pub fn output(&self) -> &str {
        self.writer.as_str()
    }

    /// Opens the collection. Without an expected item type, `type_name`
    /// (`Collection(T)`) fixes the item type; otherwise the first item does.
    pub fn write_start(&mut self, type_name: Option<&str>) -> Result<(), ODataError> {
        self.transition("write_start", &[ODataCollectionWriterState::Start], |this| {
            this.start_collection(type_name)?;
            Ok(ODataCollectionWriterState::Collection)
        })
    }

    pub fn write_item(&mut self, item: &ODataValue) -> Result<(), ODataError> {
        use ODataCollectionWriterState::*;
        self.transition("write_item", &[Collection, Item], |this| {
            this.serializer.write_collection_item(
                &mut this.writer,
                item,
                this.item_type.as_ref(),
                this.validator.as_mut(),
            )?;
            Ok(Item)
        })
    }

    pub fn write_end(&mut self) -> Result<(), ODataError> {
        use ODataCollectionWriterState::*;
        self.transition("write_end", &[Collection, Item], |this| {
            this.writer.end_array();
            this.writer.end_object();
            Ok(Completed)
        })
    }

    pub fn flush<W: Write>(&mut self, output: &mut W) -> Result<(), ODataError> {
        self.writer.flush_to(output)
    }

    pub async fn flush_async<W>(&mut self, output: &mut W) -> Result<(), ODataError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.writer.flush_to_async(output).await
    }

    fn transition<F>(
        &mut self,
        operation: &'static str,
        allowed: &[ODataCollectionWriterState],
        f: F,
    ) -> Result<(), ODataError>
    where
        F: FnOnce(&mut Self) -> Result<ODataCollectionWriterState, ODataError>,
    {
        if self.state == ODataCollectionWriterState::Error {
            return Err(UsageError::ErrorState { component: COMPONENT }.into());
        }
        if !allowed.contains(&self.state) {
            return Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: self.state.to_string(),
                operation,
            }
            .into());
        }
        match f(self) {
            Ok(next) => {
                log::trace!("{COMPONENT} moved from {} to {next}", self.state);
                self.state = next;
                Ok(())
            }
            Err(err) => {
                log::debug!("{COMPONENT} failed in '{operation}': {err}");
                self.state = ODataCollectionWriterState::Error;
                Err(err)
            }
        }
    }

    fn start_collection(&mut self, type_name: Option<&str>) -> Result<(), ODataError> {
        self.serializer
            .ensure_format_supported(COMPONENT, &[PayloadFormat::JsonLight, PayloadFormat::VerboseJson])?;
        let announced_item = match type_name {
            Some(name) => Some(collection_item_type_name(name).ok_or_else(|| {
                ODataError::from(StructuralError::InvalidCollectionTypeName {
                    type_name: name.to_string(),
                })
            })?),
            None => None,
        };
        match &self.expected_item_type {
            Some(expected) => self.item_type = Some(expected.clone()),
            None => {
                self.item_type = announced_item.map(|name| self.serializer.type_reference_for(name));
                self.validator = Some(CollectionWithoutExpectedTypeValidator::new(
                    self.serializer.resolver(),
                    announced_item,
                ));
            }
        }

        self.writer.start_object();
        if self.serializer.is_json_light() {
            let metadata_uri = self
                .item_type
                .as_ref()
                .and_then(|t| self.serializer.metadata_uri(&collection_type_name(&t.full_name)));
            if let Some(uri) = metadata_uri {
                self.writer.name(ODATA_METADATA);
                self.writer.string(&uri);
            }
            self.writer.name(VALUE);
        } else {
            self.writer.name(VERBOSE_DATA);
        }
        self.writer.start_array();
        Ok(())
    }
}
