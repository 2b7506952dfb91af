//! Pull reader for collection payloads and collection parameters.

use crate::collection_validator::CollectionWithoutExpectedTypeValidator;
use crate::deserializer::{
    expect_end_of_input, missing_value_property, read_verbose_wrapper_start, skip_remaining_members,
    unexpected_property, JsonDeserializer, ODATA_METADATA, VALUE,
};
use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::edm::{
    collection_item_type_name, collection_type_name, CoreTypeResolver, TypeKind, TypeReference, TypeResolver,
};
use crate::error::{InternalError, ODataError, StructuralError, UsageError};
use crate::json::{AsyncTokenSource, JsonNode, TokenSource};
use crate::model::ODataValue;
use crate::settings::{PayloadFormat, ReaderSettings};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const COMPONENT: &str = "collection reader";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataCollectionReaderState {
    Start,
    CollectionStart,
    Value,
    CollectionEnd,
    Exception,
    Completed,
}

impl fmt::Display for ODataCollectionReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ODataCollectionReaderState::Start => "Start",
            ODataCollectionReaderState::CollectionStart => "CollectionStart",
            ODataCollectionReaderState::Value => "Value",
            ODataCollectionReaderState::CollectionEnd => "CollectionEnd",
            ODataCollectionReaderState::Exception => "Exception",
            ODataCollectionReaderState::Completed => "Completed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    /// A complete payload with its format wrapper.
    Payload,
    /// A bare array owned by a parameter reader. The closing bracket is left
    /// for the owner.
    Parameter,
}

/// Reads the items of a collection one at a time.
///
/// Every successful [`read`](Self::read) moves to the next state and returns
/// `false` once the reader is `Completed`. The first failure moves the reader
/// to `Exception` for good.
pub struct ODataCollectionReader<'a, S: TokenSource> {
    source: S,
    deserializer: JsonDeserializer<'a>,
    state: ODataCollectionReaderState,
    framing: Framing,
    expected_item_type: Option<TypeReference>,
    item_type: Option<TypeReference>,
    validator: Option<CollectionWithoutExpectedTypeValidator<'a>>,
    checker: DuplicatePropertyNamesChecker,
    collection_type_name: Option<String>,
    item: Option<ODataValue>,
    wrapper_depth: usize,
    completion: Option<Arc<AtomicBool>>,
}

impl<S: TokenSource> ODataCollectionReader<'static, S> {
    /// A reader resolving primitive types with [`CoreTypeResolver`].
    pub fn new(source: S, settings: &ReaderSettings, expected_item_type: Option<TypeReference>) -> Self {
        Self::with_resolver(source, settings, &CoreTypeResolver, expected_item_type)
    }
}

impl<'a, S: TokenSource> ODataCollectionReader<'a, S> {
    pub fn with_resolver(
        mut source: S,
        settings: &ReaderSettings,
        resolver: &'a dyn TypeResolver,
        expected_item_type: Option<TypeReference>,
    ) -> Self {
        source.set_max_depth(settings.max_nesting_depth);
        let deserializer = JsonDeserializer::new(settings.clone(), resolver);
        Self::build(source, deserializer, Framing::Payload, expected_item_type, None)
    }

    /// A reader over the array value of a collection parameter. The source
    /// must be positioned on the opening bracket.
    pub(crate) fn for_parameter(
        source: S,
        deserializer: JsonDeserializer<'a>,
        expected_item_type: Option<TypeReference>,
        completion: Arc<AtomicBool>,
    ) -> Self {
        Self::build(
            source,
            deserializer,
            Framing::Parameter,
            expected_item_type,
            Some(completion),
        )
    }

    fn build(
        source: S,
        deserializer: JsonDeserializer<'a>,
        framing: Framing,
        expected_item_type: Option<TypeReference>,
        completion: Option<Arc<AtomicBool>>,
    ) -> Self {
        let checker = deserializer.new_checker();
        Self {
            source,
            deserializer,
            state: ODataCollectionReaderState::Start,
            framing,
            expected_item_type,
            item_type: None,
            validator: None,
            checker,
            collection_type_name: None,
            item: None,
            wrapper_depth: 0,
            completion,
        }
    }

    #[must_use]
    pub fn state(&self) -> ODataCollectionReaderState {
        self.state
    }

    /// The current item. Only set in the `Value` state.
    #[must_use]
    pub fn item(&self) -> Option<&ODataValue> {
        self.item.as_ref()
    }

    /// The collection type name announced by the payload, if any.
    #[must_use]
    pub fn collection_type_name(&self) -> Option<&str> {
        self.collection_type_name.as_deref()
    }

    /// The item type in effect: the expected one, the announced one, or the
    /// one fixed by the items read so far.
    #[must_use]
    pub fn item_type_name(&self) -> Option<&str> {
        self.expected_item_type
            .as_ref()
            .map(|t| t.full_name.as_str())
            .or_else(|| self.validator.as_ref().and_then(|v| v.item_type_name()))
    }

    pub fn into_source(self) -> S {
        self.source
    }

    pub fn read(&mut self) -> Result<bool, ODataError> {
        self.ensure_readable()?;
        let expected = self.expected_successors();
        let result = self.read_implementation().and_then(|()| self.verify_landing(expected));
        match result {
            Ok(()) => {
                log::trace!("{COMPONENT} moved to {}", self.state);
                Ok(self.state != ODataCollectionReaderState::Completed)
            }
            Err(err) => {
                log::debug!("{COMPONENT} failed in state {}: {err}", self.state);
                self.state = ODataCollectionReaderState::Exception;
                self.item = None;
                Err(err)
            }
        }
    }

    /// The asynchronous counterpart of [`read`](Self::read). Only the input
    /// suspends; the state transition itself is the synchronous one.
    pub async fn read_async(&mut self) -> Result<bool, ODataError>
    where
        S: AsyncTokenSource,
    {
        self.ensure_readable()?;
        if let Err(err) = self.source.prepare_async().await {
            self.state = ODataCollectionReaderState::Exception;
            return Err(err);
        }
        self.read()
    }

    fn ensure_readable(&self) -> Result<(), ODataError> {
        match self.state {
            ODataCollectionReaderState::Exception => Err(UsageError::ErrorState { component: COMPONENT }.into()),
            ODataCollectionReaderState::Completed => Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: self.state.to_string(),
                operation: "read",
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn expected_successors(&self) -> &'static [ODataCollectionReaderState] {
        use ODataCollectionReaderState::*;
        match self.state {
            Start => &[CollectionStart],
            CollectionStart | Value => &[Value, CollectionEnd],
            CollectionEnd => &[Completed],
            Exception | Completed => &[],
        }
    }

    fn verify_landing(&self, expected: &[ODataCollectionReaderState]) -> Result<(), ODataError> {
        if expected.contains(&self.state) {
            return Ok(());
        }
        Err(InternalError::UnexpectedState {
            component: COMPONENT,
            operation: "read",
            expected: expected
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            actual: self.state.to_string(),
        }
        .into())
    }

    fn read_implementation(&mut self) -> Result<(), ODataError> {
        match self.state {
            ODataCollectionReaderState::Start => self.read_collection_start(),
            ODataCollectionReaderState::CollectionStart | ODataCollectionReaderState::Value => {
                self.read_next_item()
            }
            ODataCollectionReaderState::CollectionEnd => self.read_collection_end(),
            ODataCollectionReaderState::Exception | ODataCollectionReaderState::Completed => Ok(()),
        }
    }

    fn read_collection_start(&mut self) -> Result<(), ODataError> {
        self.deserializer.ensure_format_supported(COMPONENT)?;
        if let Some(expected) = self.expected_item_type.as_ref().filter(|t| t.kind == TypeKind::Collection) {
            return Err(StructuralError::InvalidItemTypeKind {
                kind: expected.kind.to_string(),
            }
            .into());
        }
        let mut announced_item_type = None;
        if self.framing == Framing::Payload {
            self.source.read()?;
            match self.deserializer.settings().format {
                PayloadFormat::VerboseJson => self.read_verbose_wrapper()?,
                _ => announced_item_type = self.read_json_light_wrapper()?,
            }
        }
        self.source.read_start_array()?;

        match &self.expected_item_type {
            Some(expected) => self.item_type = Some(expected.clone()),
            None => {
                self.item_type = announced_item_type
                    .as_deref()
                    .map(|name| self.deserializer.type_reference_for(name));
                self.validator = Some(CollectionWithoutExpectedTypeValidator::new(
                    self.deserializer.resolver(),
                    announced_item_type.as_deref(),
                ));
            }
        }
        self.state = ODataCollectionReaderState::CollectionStart;
        Ok(())
    }

    /// Reads `{"odata.metadata":..., "value":` and returns the item type named
    /// by a `#Collection(T)` metadata fragment.
    fn read_json_light_wrapper(&mut self) -> Result<Option<String>, ODataError> {
        self.source.read_start_object()?;
        self.wrapper_depth = 1;
        let mut item_type = None;
        loop {
            let name = match self.source.node() {
                JsonNode::Property(name) => name.clone(),
                _ => return Err(missing_value_property(VALUE)),
            };
            self.source.read()?;
            self.checker.mark_property_as_processed(&name)?;
            match name.as_str() {
                VALUE => break,
                ODATA_METADATA => {
                    if let Some(uri) = self.source.read_string_or_null()? {
                        item_type = metadata_item_type(&uri)?;
                        self.collection_type_name = item_type.as_deref().map(collection_type_name);
                    }
                }
                other if is_instance_annotation(other) => self.source.skip_value()?,
                other => return Err(unexpected_property(other, "a collection payload")),
            }
        }
        self.checker.clear();
        Ok(item_type)
    }

    fn read_verbose_wrapper(&mut self) -> Result<(), ODataError> {
        read_verbose_wrapper_start(&mut self.source)?;
        self.wrapper_depth = 1;
        if *self.source.node() == JsonNode::StartObject {
            self.source.read_start_object()?;
            self.wrapper_depth = 2;
            self.deserializer.read_up_to_results(&mut self.source)?;
        }
        Ok(())
    }

    fn read_next_item(&mut self) -> Result<(), ODataError> {
        self.item = None;
        if *self.source.node() == JsonNode::EndArray {
            self.state = ODataCollectionReaderState::CollectionEnd;
            return Ok(());
        }
        let item = self.deserializer.read_collection_item(
            &mut self.source,
            self.item_type.as_ref(),
            self.validator.as_mut(),
            &mut self.checker,
        )?;
        self.item = Some(item);
        self.state = ODataCollectionReaderState::Value;
        Ok(())
    }

    fn read_collection_end(&mut self) -> Result<(), ODataError> {
        if self.framing == Framing::Payload {
            self.source.read_end_array()?;
            let json_light = self.deserializer.settings().format != PayloadFormat::VerboseJson;
            for _ in 0..self.wrapper_depth {
                if json_light {
                    while let JsonNode::Property(name) = self.source.node().clone() {
                        if !is_instance_annotation(&name) {
                            return Err(unexpected_property(&name, "a collection payload"));
                        }
                        self.source.read()?;
                        self.source.skip_value()?;
                    }
                } else {
                    skip_remaining_members(&mut self.source)?;
                }
                self.source.read_end_object()?;
            }
            expect_end_of_input(&self.source)?;
        }
        if let Some(completion) = &self.completion {
            completion.store(true, Ordering::Release);
        }
        self.state = ODataCollectionReaderState::Completed;
        Ok(())
    }
}

fn is_instance_annotation(name: &str) -> bool {
    name.contains('.') && !name.contains('@')
}

/// The item type named by a metadata URI ending in `#Collection(T)`.
fn metadata_item_type(uri: &str) -> Result<Option<String>, ODataError> {
    let Some((_, fragment)) = uri.rsplit_once('#') else {
        return Ok(None);
    };
    if !fragment.starts_with("Collection(") {
        return Ok(None);
    }
    collection_item_type_name(fragment)
        .map(|item| Some(item.to_string()))
        .ok_or_else(|| {
            StructuralError::InvalidCollectionTypeName {
                type_name: fragment.to_string(),
            }
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::PrimitiveTypeKind;
    use crate::json::BufferingJsonReader;
    use crate::model::PrimitiveValue;

    fn reader(text: &str) -> ODataCollectionReader<'static, BufferingJsonReader> {
        ODataCollectionReader::new(BufferingJsonReader::new(text), &ReaderSettings::default(), None)
    }

    #[test]
    fn test_metadata_fragment() {
        assert_eq!(
            metadata_item_type("http://host/$metadata#Collection(Edm.Int32)").unwrap(),
            Some("Edm.Int32".to_string())
        );
        assert_eq!(metadata_item_type("http://host/$metadata#Customers").unwrap(), None);
        assert!(metadata_item_type("http://host/$metadata#Collection()").is_err());
    }

    #[test]
    fn test_state_sequence() {
        let mut reader = reader(r#"{"odata.metadata":"http://h/$metadata#Collection(Edm.Int32)","value":[1,2]}"#);
        assert_eq!(reader.state(), ODataCollectionReaderState::Start);
        assert!(reader.read().unwrap());
        assert_eq!(reader.state(), ODataCollectionReaderState::CollectionStart);
        assert_eq!(reader.collection_type_name(), Some("Collection(Edm.Int32)"));
        assert!(reader.read().unwrap());
        assert_eq!(reader.item(), Some(&ODataValue::Primitive(PrimitiveValue::Int32(1))));
        assert!(reader.read().unwrap());
        assert!(reader.read().unwrap());
        assert_eq!(reader.state(), ODataCollectionReaderState::CollectionEnd);
        assert!(!reader.read().unwrap());
        assert_eq!(reader.state(), ODataCollectionReaderState::Completed);
    }

    #[test]
    fn test_read_after_completion_is_a_usage_error() {
        let mut reader = reader(r#"{"value":[]}"#);
        while reader.read().unwrap() {}
        assert!(matches!(
            reader.read(),
            Err(ODataError::Usage(UsageError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn test_failure_is_terminal() {
        let mut reader = reader(r#"{"value":[[1]]}"#);
        reader.read().unwrap();
        assert!(matches!(
            reader.read(),
            Err(ODataError::Structural(StructuralError::InvalidItemTypeKind { .. }))
        ));
        assert_eq!(reader.state(), ODataCollectionReaderState::Exception);
        assert!(matches!(
            reader.read(),
            Err(ODataError::Usage(UsageError::ErrorState { .. }))
        ));
    }

    #[test]
    fn test_expected_item_type_converts_items() {
        let settings = ReaderSettings::default();
        let expected = TypeReference::primitive(PrimitiveTypeKind::Int64, false);
        let mut reader = ODataCollectionReader::new(
            BufferingJsonReader::new(r#"{"value":["5",null]}"#),
            &settings,
            Some(expected),
        );
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.item(), Some(&ODataValue::Primitive(PrimitiveValue::Int64(5))));
        assert!(matches!(
            reader.read(),
            Err(ODataError::Structural(StructuralError::NullValueForNonNullableType { .. }))
        ));
    }
}
