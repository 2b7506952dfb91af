use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// The error type returned by every public reading, writing and validation
/// operation of this crate.
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ODataError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Json(#[from] JsonReaderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Internal(#[from] InternalError),

    #[error("Invalid settings: {message}")]
    #[diagnostic(
        code(odata::config),
        help("Check the settings document against the ReaderSettings/WriterSettings fields.")
    )]
    Config { message: String },

    #[error("I/O failure: {message}")]
    #[diagnostic(code(odata::io))]
    Io { message: String },
}

impl From<std::io::Error> for ODataError {
    fn from(err: std::io::Error) -> Self {
        ODataError::Io {
            message: err.to_string(),
        }
    }
}

/// Coarse classification of failures. Callers use it to tell payload-format
/// violations apart from bugs in a format reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    DuplicateStructuralName,
    IncompatibleCollectionItem,
    InvalidTypeNameSyntax,
    AnnotationOrdering,
    SingletonLinkConflict,
    InternalError,
    InvalidPayload,
    Version,
    Usage,
    Io,
    Config,
}

impl ODataError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ODataError::Json(_) => ErrorCategory::InvalidPayload,
            ODataError::Structural(err) => err.category(),
            ODataError::Usage(_) => ErrorCategory::Usage,
            ODataError::Internal(_) => ErrorCategory::InternalError,
            ODataError::Config { .. } => ErrorCategory::Config,
            ODataError::Io { .. } => ErrorCategory::Io,
        }
    }

    /// True when the error signals a bug in an implementing reader or writer
    /// rather than a problem with the payload.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, ODataError::Internal(_))
    }
}

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum JsonReaderError {
    #[error("Unexpected token at line {line}, column {column}")]
    #[diagnostic(
        code(json::unexpected_token),
        help("The JSON reader found a token it did not expect in this position.")
    )]
    UnexpectedToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("Expected {expected}, but found this")]
        span: SourceSpan,
        expected: String,
        line: usize,
        column: usize,
    },

    #[error("Unexpected end of input")]
    #[diagnostic(
        code(json::unexpected_eof),
        help("The payload ended unexpectedly. The reader expected more tokens.")
    )]
    UnexpectedEof {
        #[source_code]
        src: NamedSource<String>,
        #[label("Input ended unexpectedly here")]
        span: SourceSpan,
    },

    #[error("Invalid token at line {line}, column {column}")]
    #[diagnostic(
        code(json::invalid_token),
        help("Unterminated strings, bad escapes and malformed numbers end up here.")
    )]
    InvalidToken {
        #[source_code]
        src: NamedSource<String>,
        #[label("This is not valid JSON")]
        span: SourceSpan,
        line: usize,
        column: usize,
    },

    #[error("Unexpected {found} at line {line}, column {column}: expected {expected}")]
    #[diagnostic(code(json::unexpected_node))]
    UnexpectedNode {
        #[source_code]
        src: NamedSource<String>,
        #[label("Found {found} here")]
        span: SourceSpan,
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("Nesting depth exceeds the maximum of {max_depth}")]
    #[diagnostic(
        code(json::max_depth_exceeded),
        help("Raise max_nesting_depth in the reader settings if this payload is legitimate.")
    )]
    MaxDepthExceeded {
        #[source_code]
        src: NamedSource<String>,
        #[label("Limit reached here")]
        span: SourceSpan,
        max_depth: usize,
    },
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum StructuralError {
    #[error("Multiple properties with the name '{property_name}' were detected in an entry or a complex value")]
    #[diagnostic(
        code(odata::duplicate_property_names_not_allowed),
        help("Stream and collection properties can never repeat; other properties only repeat when allow_duplicate_properties is set.")
    )]
    DuplicatePropertyNamesNotAllowed { property_name: String },

    #[error("Multiple annotations with the name '{annotation_name}' were detected")]
    #[diagnostic(code(odata::duplicate_annotation_not_allowed))]
    DuplicateAnnotationNotAllowed { annotation_name: String },

    #[error("Multiple annotations with the name '{annotation_name}' were detected for the property '{property_name}'")]
    #[diagnostic(code(odata::duplicate_annotation_for_property_not_allowed))]
    DuplicateAnnotationForPropertyNotAllowed {
        annotation_name: String,
        property_name: String,
    },

    #[error("Multiple annotations with the name '{annotation_name}' were detected for the instance annotation '{property_name}'")]
    #[diagnostic(code(odata::duplicate_annotation_for_instance_annotation_not_allowed))]
    DuplicateAnnotationForInstanceAnnotationNotAllowed {
        annotation_name: String,
        property_name: String,
    },

    #[error("The annotation '{annotation_name}' for the property '{property_name}' was found after the property itself")]
    #[diagnostic(
        code(odata::property_annotation_after_the_property),
        help("Property annotations must precede the property they annotate.")
    )]
    PropertyAnnotationAfterTheProperty {
        annotation_name: String,
        property_name: String,
    },

    #[error("Annotations were found for the property '{property_name}', but the property itself is missing")]
    #[diagnostic(code(odata::property_annotation_without_property))]
    PropertyAnnotationWithoutProperty { property_name: String },

    #[error("Multiple links were found for the singleton navigation property '{property_name}'")]
    #[diagnostic(
        code(odata::multiple_links_for_singleton),
        help("Only collection-valued navigation properties may carry a binding link next to an expanded link.")
    )]
    MultipleLinksForSingleton { property_name: String },

    #[error("An item of kind '{kind}' was found in a collection; only primitive and complex items are allowed")]
    #[diagnostic(code(odata::invalid_item_type_kind))]
    InvalidItemTypeKind { kind: String },

    #[error("An item of kind '{item_kind}' was found in a collection of '{expected_kind}' items")]
    #[diagnostic(code(odata::incompatible_item_type_kind))]
    IncompatibleItemTypeKind {
        item_kind: String,
        expected_kind: String,
    },

    #[error("An item of type '{item_type_name}' was found in a collection of '{expected_type_name}' items")]
    #[diagnostic(code(odata::incompatible_item_type_name))]
    IncompatibleItemTypeName {
        item_type_name: String,
        expected_type_name: String,
    },

    #[error("The type name '{type_name}' is not a valid collection type name; expected 'Collection(ItemType)'")]
    #[diagnostic(code(odata::invalid_collection_type_name))]
    InvalidCollectionTypeName { type_name: String },

    #[error("A null value was found for the non-nullable type '{type_name}'")]
    #[diagnostic(code(odata::null_value_for_non_nullable_type))]
    NullValueForNonNullableType { type_name: String },

    #[error("Cannot convert '{value}' to a value of type '{type_name}'")]
    #[diagnostic(code(odata::invalid_primitive_value))]
    InvalidPrimitiveValue { value: String, type_name: String },

    #[error("Unexpected property '{property_name}' in {context}")]
    #[diagnostic(code(odata::unexpected_property))]
    UnexpectedProperty {
        property_name: String,
        context: String,
    },

    #[error("The collection wrapper does not contain the '{property_name}' property")]
    #[diagnostic(code(odata::missing_value_property))]
    MissingValueProperty { property_name: String },

    #[error("The parameter '{parameter_name}' is not declared by the operation")]
    #[diagnostic(code(odata::parameter_not_in_metadata))]
    ParameterNotInMetadata { parameter_name: String },

    #[error("The parameter '{parameter_name}' has the unsupported type kind '{kind}'")]
    #[diagnostic(code(odata::unsupported_parameter_type))]
    UnsupportedParameterType {
        parameter_name: String,
        kind: String,
    },

    #[error("The stream property '{property_name}' has an inline value")]
    #[diagnostic(code(odata::stream_property_with_value))]
    StreamPropertyWithValue { property_name: String },

    #[error("{feature} requires protocol version {required} but the message uses {version}")]
    #[diagnostic(code(odata::version_not_supported))]
    VersionNotSupported {
        feature: String,
        version: String,
        required: String,
    },

    #[error("The media type '{media_type}' is invalid: {reason}")]
    #[diagnostic(code(odata::invalid_media_type))]
    InvalidMediaType { media_type: String, reason: String },

    #[error("The character set '{charset}' is not supported")]
    #[diagnostic(code(odata::unsupported_encoding))]
    UnsupportedEncoding { charset: String },
}

impl StructuralError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        use StructuralError::*;
        match self {
            DuplicatePropertyNamesNotAllowed { .. } => ErrorCategory::DuplicateStructuralName,
            DuplicateAnnotationNotAllowed { .. }
            | DuplicateAnnotationForPropertyNotAllowed { .. }
            | DuplicateAnnotationForInstanceAnnotationNotAllowed { .. }
            | PropertyAnnotationAfterTheProperty { .. }
            | PropertyAnnotationWithoutProperty { .. } => ErrorCategory::AnnotationOrdering,
            MultipleLinksForSingleton { .. } => ErrorCategory::SingletonLinkConflict,
            InvalidItemTypeKind { .. }
            | IncompatibleItemTypeKind { .. }
            | IncompatibleItemTypeName { .. }
            | NullValueForNonNullableType { .. } => ErrorCategory::IncompatibleCollectionItem,
            InvalidCollectionTypeName { .. } => ErrorCategory::InvalidTypeNameSyntax,
            VersionNotSupported { .. } => ErrorCategory::Version,
            InvalidPrimitiveValue { .. }
            | UnexpectedProperty { .. }
            | MissingValueProperty { .. }
            | ParameterNotInMetadata { .. }
            | UnsupportedParameterType { .. }
            | StreamPropertyWithValue { .. }
            | InvalidMediaType { .. }
            | UnsupportedEncoding { .. } => ErrorCategory::InvalidPayload,
        }
    }
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum UsageError {
    #[error("Cannot call '{operation}' on the {component} in state '{state}'")]
    #[diagnostic(code(odata::invalid_transition))]
    InvalidTransition {
        component: &'static str,
        state: String,
        operation: &'static str,
    },

    #[error("The {component} failed earlier and cannot be used anymore")]
    #[diagnostic(
        code(odata::error_state),
        help("Readers and writers are single-use once a fault has been reported.")
    )]
    ErrorState { component: &'static str },

    #[error("The collection sub-reader for parameter '{parameter_name}' must be created and read to completion before the next read")]
    #[diagnostic(code(odata::sub_reader_not_completed))]
    SubReaderNotCompleted { parameter_name: String },

    #[error("The {format} format cannot be processed by the {component}")]
    #[diagnostic(code(odata::unsupported_format))]
    UnsupportedFormat {
        component: &'static str,
        format: String,
    },

    #[error("The asynchronous input has not been buffered yet; use the async read operations")]
    #[diagnostic(code(odata::async_input_not_buffered))]
    AsyncInputNotBuffered,
}

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum InternalError {
    #[error("The {component} landed in state '{actual}' after '{operation}'; expected one of: {expected}")]
    #[diagnostic(code(odata::internal::unexpected_state))]
    UnexpectedState {
        component: &'static str,
        operation: &'static str,
        expected: String,
        actual: String,
    },

    #[error("The navigation link '{finished}' was finished while '{started}' was the one started")]
    #[diagnostic(code(odata::internal::navigation_link_mismatch))]
    NavigationLinkMismatch { started: String, finished: String },

    #[error("The token source is already buffering")]
    #[diagnostic(code(odata::internal::buffering_already_active))]
    BufferingAlreadyActive,

    #[error("The token source is not buffering")]
    #[diagnostic(code(odata::internal::not_buffering))]
    NotBuffering,
}
