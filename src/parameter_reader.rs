//! Pull reader for operation parameter payloads.

use crate::collection_reader::ODataCollectionReader;
use crate::deserializer::{expect_end_of_input, JsonDeserializer};
use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::edm::{CoreTypeResolver, TypeKind, TypeReference, TypeResolver};
use crate::error::{InternalError, ODataError, StructuralError, UsageError};
use crate::json::{AsyncTokenSource, JsonNode, JsonPrimitive, TokenSource};
use crate::model::{CollectionValue, ODataProperty, ODataValue};
use crate::settings::{ODataVersion, ReaderSettings};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const COMPONENT: &str = "parameter reader";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataParameterReaderState {
    Start,
    Value,
    Collection,
    Exception,
    Completed,
}

impl fmt::Display for ODataParameterReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ODataParameterReaderState::Start => "Start",
            ODataParameterReaderState::Value => "Value",
            ODataParameterReaderState::Collection => "Collection",
            ODataParameterReaderState::Exception => "Exception",
            ODataParameterReaderState::Completed => "Completed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug)]
enum SubReader {
    NotCreated,
    Created(Arc<AtomicBool>),
}

/// Reads the parameters of an operation invocation one at a time.
///
/// Primitive and complex parameters are surfaced in the `Value` state.
/// A collection parameter stops the reader in the `Collection` state; its
/// items are read through [`create_collection_reader`](Self::create_collection_reader),
/// and that sub-reader has to complete before the next [`read`](Self::read).
pub struct ODataParameterReader<'a, S: TokenSource> {
    source: S,
    deserializer: JsonDeserializer<'a>,
    signature: Option<Vec<(String, TypeReference)>>,
    state: ODataParameterReaderState,
    checker: DuplicatePropertyNamesChecker,
    name: Option<String>,
    value: Option<ODataValue>,
    collection_item_type: Option<TypeReference>,
    sub_reader: SubReader,
}

impl<S: TokenSource> ODataParameterReader<'static, S> {
    pub fn new(
        source: S,
        settings: &ReaderSettings,
        signature: Option<Vec<(String, TypeReference)>>,
    ) -> Self {
        Self::with_resolver(source, settings, &CoreTypeResolver, signature)
    }
}

impl<'a, S: TokenSource> ODataParameterReader<'a, S> {
    /// With a `signature`, every parameter must be declared in it and takes
    /// its declared type. Without one, types come from the payload.
    pub fn with_resolver(
        mut source: S,
        settings: &ReaderSettings,
        resolver: &'a dyn TypeResolver,
        signature: Option<Vec<(String, TypeReference)>>,
    ) -> Self {
        source.set_max_depth(settings.max_nesting_depth);
        let deserializer = JsonDeserializer::new(settings.clone(), resolver);
        let checker = deserializer.new_checker();
        Self {
            source,
            deserializer,
            signature,
            state: ODataParameterReaderState::Start,
            checker,
            name: None,
            value: None,
            collection_item_type: None,
            sub_reader: SubReader::NotCreated,
        }
    }

    #[must_use]
    pub fn state(&self) -> ODataParameterReaderState {
        self.state
    }

    /// Name of the current parameter, in the `Value` and `Collection` states.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Value of the current parameter, in the `Value` state.
    #[must_use]
    pub fn value(&self) -> Option<&ODataValue> {
        self.value.as_ref()
    }

    pub fn read(&mut self) -> Result<bool, ODataError> {
        self.ensure_usable("read")?;
        let result = self
            .read_implementation()
            .and_then(|()| self.verify_landing());
        match result {
            Ok(()) => {
                log::trace!("{COMPONENT} moved to {}", self.state);
                Ok(self.state != ODataParameterReaderState::Completed)
            }
            Err(err) => {
                log::debug!("{COMPONENT} failed in state {}: {err}", self.state);
                self.state = ODataParameterReaderState::Exception;
                self.name = None;
                self.value = None;
                Err(err)
            }
        }
    }

    pub async fn read_async(&mut self) -> Result<bool, ODataError>
    where
        S: AsyncTokenSource,
    {
        self.ensure_usable("read")?;
        if let Err(err) = self.source.prepare_async().await {
            self.state = ODataParameterReaderState::Exception;
            return Err(err);
        }
        self.read()
    }

    /// A reader over the items of the current collection parameter. It can
    /// be created once per parameter.
    pub fn create_collection_reader(&mut self) -> Result<ODataCollectionReader<'a, &mut S>, ODataError> {
        self.ensure_usable("create_collection_reader")?;
        if self.state != ODataParameterReaderState::Collection
            || !matches!(self.sub_reader, SubReader::NotCreated)
        {
            return Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: self.state.to_string(),
                operation: "create_collection_reader",
            }
            .into());
        }
        let completion = Arc::new(AtomicBool::new(false));
        self.sub_reader = SubReader::Created(Arc::clone(&completion));
        Ok(ODataCollectionReader::for_parameter(
            &mut self.source,
            self.deserializer.clone(),
            self.collection_item_type.clone(),
            completion,
        ))
    }

    fn ensure_usable(&self, operation: &'static str) -> Result<(), ODataError> {
        match self.state {
            ODataParameterReaderState::Exception => Err(UsageError::ErrorState { component: COMPONENT }.into()),
            ODataParameterReaderState::Completed => Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: self.state.to_string(),
                operation,
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn verify_landing(&self) -> Result<(), ODataError> {
        use ODataParameterReaderState::*;
        const EXPECTED: [ODataParameterReaderState; 3] = [Value, Collection, Completed];
        if EXPECTED.contains(&self.state) {
            return Ok(());
        }
        Err(InternalError::UnexpectedState {
            component: COMPONENT,
            operation: "read",
            expected: "Value, Collection, Completed".to_string(),
            actual: self.state.to_string(),
        }
        .into())
    }

    fn read_implementation(&mut self) -> Result<(), ODataError> {
        match self.state {
            ODataParameterReaderState::Start => {
                self.deserializer.ensure_format_supported(COMPONENT)?;
                self.source.read()?;
                self.source.read_start_object()?;
            }
            ODataParameterReaderState::Collection => self.finish_collection_parameter()?,
            _ => {}
        }
        self.read_next_parameter()
    }

    fn finish_collection_parameter(&mut self) -> Result<(), ODataError> {
        let completed = match &self.sub_reader {
            SubReader::Created(completion) => completion.load(Ordering::Acquire),
            SubReader::NotCreated => false,
        };
        if !completed {
            return Err(UsageError::SubReaderNotCompleted {
                parameter_name: self.name.clone().unwrap_or_default(),
            }
            .into());
        }
        self.source.read_end_array()?;
        self.sub_reader = SubReader::NotCreated;
        self.collection_item_type = None;
        Ok(())
    }

    fn read_next_parameter(&mut self) -> Result<(), ODataError> {
        self.name = None;
        self.value = None;
        loop {
            let name = match self.source.node() {
                JsonNode::EndObject => {
                    self.source.read_end_object()?;
                    expect_end_of_input(&self.source)?;
                    self.state = ODataParameterReaderState::Completed;
                    return Ok(());
                }
                JsonNode::Property(name) => name.clone(),
                _ => return Err(self.source.unexpected("a parameter or end of object")),
            };
            self.source.read()?;
            self.checker.mark_property_as_processed(&name)?;
            if name.contains('.') || name.contains('@') {
                // Annotations carry no parameter.
                self.source.skip_value()?;
                continue;
            }
            return self.read_parameter(name);
        }
    }

    fn read_parameter(&mut self, name: String) -> Result<(), ODataError> {
        let declared = self.declared_type(&name)?;
        let is_collection = match &declared {
            Some(declared) => declared.kind == TypeKind::Collection,
            None => *self.source.node() == JsonNode::StartArray,
        };
        let is_null = *self.source.node() == JsonNode::Primitive(JsonPrimitive::Null);

        if is_collection && !is_null {
            self.deserializer
                .settings()
                .version
                .ensure_supports("Collection parameters", ODataVersion::V3)?;
            if *self.source.node() != JsonNode::StartArray {
                return Err(self.source.unexpected("start of array"));
            }
            let placeholder = ODataProperty::new(&name, ODataValue::Collection(CollectionValue::default()));
            self.checker.check_for_duplicate_property_names(&placeholder)?;
            self.collection_item_type = declared
                .as_ref()
                .and_then(|t| t.collection_item_type(self.deserializer.resolver()));
            self.sub_reader = SubReader::NotCreated;
            self.name = Some(name);
            self.state = ODataParameterReaderState::Collection;
            return Ok(());
        }

        let read = self
            .deserializer
            .read_value(&mut self.source, declared.as_ref(), None, None)?;
        let property = ODataProperty::new(&name, read.value);
        self.checker.check_for_duplicate_property_names(&property)?;
        self.name = Some(property.name);
        self.value = Some(property.value);
        self.state = ODataParameterReaderState::Value;
        Ok(())
    }

    fn declared_type(&self, name: &str) -> Result<Option<TypeReference>, ODataError> {
        let Some(signature) = &self.signature else {
            return Ok(None);
        };
        let Some((_, declared)) = signature.iter().find(|(parameter, _)| parameter == name) else {
            log::debug!("parameter '{name}' is not declared");
            return Err(StructuralError::ParameterNotInMetadata {
                parameter_name: name.to_string(),
            }
            .into());
        };
        if declared.kind == TypeKind::Entity {
            return Err(StructuralError::UnsupportedParameterType {
                parameter_name: name.to_string(),
                kind: declared.kind.to_string(),
            }
            .into());
        }
        Ok(Some(declared.clone()))
    }
}
