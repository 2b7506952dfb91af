//! Writing values and properties. Shared by the collection and entry writers.

use crate::collection_validator::CollectionWithoutExpectedTypeValidator;
use crate::deserializer::{
    MEDIA_CONTENT_TYPE, MEDIA_EDIT_LINK, MEDIA_ETAG, MEDIA_READ_LINK, ODATA_TYPE, VERBOSE_MEDIA_RESOURCE,
    VERBOSE_METADATA, VERBOSE_RESULTS,
};
use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::edm::{PrimitiveTypeKind, TypeKind, TypeReference, TypeResolver};
use crate::error::{ODataError, StructuralError, UsageError};
use crate::json::JsonWriter;
use crate::model::{
    CollectionValue, ComplexValue, ODataProperty, ODataValue, PrimitiveValue, StreamReferenceValue,
};
use crate::settings::{ODataVersion, PayloadFormat, WriterSettings};
use crate::type_name_oracle::TypeNameOracle;

#[derive(Clone)]
pub struct JsonSerializer<'a> {
    settings: WriterSettings,
    resolver: &'a dyn TypeResolver,
}

impl<'a> JsonSerializer<'a> {
    pub fn new(settings: WriterSettings, resolver: &'a dyn TypeResolver) -> Self {
        Self { settings, resolver }
    }

    #[must_use]
    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    #[must_use]
    pub fn resolver(&self) -> &'a dyn TypeResolver {
        self.resolver
    }

    #[must_use]
    pub fn new_checker(&self) -> DuplicatePropertyNamesChecker {
        self.settings.duplicate_property_names_checker()
    }

    #[must_use]
    pub fn is_json_light(&self) -> bool {
        self.settings.format == PayloadFormat::JsonLight
    }

    pub fn ensure_format_supported(
        &self,
        component: &'static str,
        formats: &[PayloadFormat],
    ) -> Result<(), ODataError> {
        if !formats.contains(&self.settings.format) {
            return Err(UsageError::UnsupportedFormat {
                component,
                format: self.settings.format.to_string(),
            }
            .into());
        }
        self.settings.format.ensure_supported_by(self.settings.version)
    }

    /// `<metadata document>#<fragment>`, when a metadata document is configured.
    #[must_use]
    pub fn metadata_uri(&self, fragment: &str) -> Option<String> {
        self.settings
            .metadata_document_uri
            .as_deref()
            .map(|uri| format!("{uri}#{fragment}"))
    }

    #[must_use]
    pub fn type_reference_for(&self, type_name: &str) -> TypeReference {
        match self.resolver.find_primitive_type(type_name) {
            Some(primitive) => TypeReference::primitive(primitive, true),
            None => TypeReference::complex(type_name, true),
        }
    }

    /// Writes `property` as a member of the current object, with the type
    /// annotation it needs. Stream properties become annotations only.
    pub fn write_property(
        &self,
        writer: &mut JsonWriter,
        property: &ODataProperty,
        declared: Option<&TypeReference>,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        checker.check_for_duplicate_property_names(property)?;
        let name = property.name.as_str();
        if let ODataValue::StreamReference(stream) = &property.value {
            return self.write_stream_property(writer, name, stream);
        }
        if self.is_json_light() {
            if let Some(type_name) = self.property_type_annotation(&property.value, declared)? {
                writer.name(&format!("{name}@{ODATA_TYPE}"));
                writer.string(&type_name);
            }
        }
        writer.name(name);
        self.write_value(writer, &property.value, declared)
    }

    /// Writes a value that is not an item of an enclosing collection.
    pub fn write_value(
        &self,
        writer: &mut JsonWriter,
        value: &ODataValue,
        declared: Option<&TypeReference>,
    ) -> Result<(), ODataError> {
        match value {
            ODataValue::Null => {
                if let Some(declared) = declared.filter(|t| !t.nullable) {
                    return Err(StructuralError::NullValueForNonNullableType {
                        type_name: declared.full_name.clone(),
                    }
                    .into());
                }
                writer.null();
                Ok(())
            }
            ODataValue::Primitive(primitive) => write_primitive(writer, primitive),
            ODataValue::Complex(complex) => {
                let type_name = self.type_name_to_write(value, declared, None)?;
                self.write_complex(writer, complex, type_name.as_deref())
            }
            ODataValue::Collection(collection) => self.write_collection(writer, value, collection, declared),
            ODataValue::StreamReference(_) => Err(StructuralError::StreamPropertyWithValue {
                property_name: String::new(),
            }
            .into()),
        }
    }

    /// Writes one item of a collection. The validator is consulted for
    /// collections without an expected item type.
    pub fn write_collection_item(
        &self,
        writer: &mut JsonWriter,
        item: &ODataValue,
        item_type: Option<&TypeReference>,
        mut validator: Option<&mut CollectionWithoutExpectedTypeValidator<'_>>,
    ) -> Result<(), ODataError> {
        match item {
            ODataValue::Null => return self.write_value(writer, item, item_type),
            ODataValue::Collection(_) | ODataValue::StreamReference(_) => {
                log::debug!("collection item of kind {} rejected", item.type_kind());
                return Err(StructuralError::InvalidItemTypeKind {
                    kind: match item {
                        ODataValue::Collection(_) => TypeKind::Collection.to_string(),
                        _ => "StreamReference".to_string(),
                    },
                }
                .into());
            }
            _ => {}
        }
        if let Some(validator) = validator.as_deref_mut() {
            validator.validate_collection_item(item.intrinsic_type_name(), item.type_kind())?;
        }
        match item {
            ODataValue::Complex(complex) => {
                let type_name = self.type_name_to_write(item, item_type, validator.as_deref())?;
                self.write_complex(writer, complex, type_name.as_deref())
            }
            _ => self.write_value(writer, item, item_type),
        }
    }

    /// The type name a complex or collection value carries on the wire. A
    /// name that only repeats the declared type is dropped.
    fn type_name_to_write(
        &self,
        value: &ODataValue,
        declared: Option<&TypeReference>,
        validator: Option<&CollectionWithoutExpectedTypeValidator<'_>>,
    ) -> Result<Option<String>, ODataError> {
        let overridden = value.serialization_type_name();
        let resolved = TypeNameOracle::resolve_value_type_name(value, declared, overridden, validator)?;
        let repeats_declared =
            declared.is_some_and(|d| resolved.type_name.as_deref() == Some(d.full_name.as_str()));
        if overridden.is_none() && repeats_declared {
            return Ok(None);
        }
        Ok(resolved.type_name)
    }

    fn property_type_annotation(
        &self,
        value: &ODataValue,
        declared: Option<&TypeReference>,
    ) -> Result<Option<String>, ODataError> {
        match value {
            ODataValue::Primitive(primitive) if declared.is_none() && !is_natural_json(primitive) => {
                Ok(Some(primitive.type_kind().full_name().to_string()))
            }
            ODataValue::Collection(_) => self.type_name_to_write(value, declared, None),
            _ => Ok(None),
        }
    }

    fn write_complex(
        &self,
        writer: &mut JsonWriter,
        complex: &ComplexValue,
        type_name: Option<&str>,
    ) -> Result<(), ODataError> {
        writer.start_object();
        if let Some(type_name) = type_name {
            self.write_type_name(writer, type_name);
        }
        let mut checker = self.new_checker();
        for property in &complex.properties {
            self.write_property(writer, property, None, &mut checker)?;
        }
        writer.end_object();
        Ok(())
    }

    fn write_collection(
        &self,
        writer: &mut JsonWriter,
        value: &ODataValue,
        collection: &CollectionValue,
        declared: Option<&TypeReference>,
    ) -> Result<(), ODataError> {
        self.settings
            .version
            .ensure_supports("Collection values", ODataVersion::V3)?;
        let resolved = TypeNameOracle::resolve_value_type_name(value, declared, None, None)?;
        let expected_item = declared.and_then(|d| d.collection_item_type(self.resolver));
        let mut validator = match &expected_item {
            Some(_) => None,
            None => Some(CollectionWithoutExpectedTypeValidator::new(
                self.resolver,
                resolved.collection_item_type_name.as_deref(),
            )),
        };
        let item_type = expected_item.or_else(|| {
            resolved
                .collection_item_type_name
                .as_deref()
                .map(|name| self.type_reference_for(name))
        });

        let verbose = !self.is_json_light();
        if verbose {
            writer.start_object();
            if let Some(type_name) = self.type_name_to_write(value, declared, None)? {
                self.write_type_name(writer, &type_name);
            }
            writer.name(VERBOSE_RESULTS);
        }
        writer.start_array();
        for item in &collection.items {
            self.write_collection_item(writer, item, item_type.as_ref(), validator.as_mut())?;
        }
        writer.end_array();
        if verbose {
            writer.end_object();
        }
        Ok(())
    }

    fn write_stream_property(
        &self,
        writer: &mut JsonWriter,
        name: &str,
        stream: &StreamReferenceValue,
    ) -> Result<(), ODataError> {
        self.settings
            .version
            .ensure_supports("Stream properties", ODataVersion::V3)?;
        let fields = [
            (MEDIA_EDIT_LINK, "edit_media", &stream.edit_link),
            (MEDIA_READ_LINK, "media_src", &stream.read_link),
            (MEDIA_CONTENT_TYPE, "content_type", &stream.content_type),
            (MEDIA_ETAG, "media_etag", &stream.etag),
        ];
        if self.is_json_light() {
            for (annotation, _, value) in fields {
                if let Some(value) = value {
                    writer.name(&format!("{name}@{annotation}"));
                    writer.string(value);
                }
            }
            return Ok(());
        }
        writer.name(name);
        writer.start_object();
        writer.name(VERBOSE_MEDIA_RESOURCE);
        writer.start_object();
        for (_, member, value) in fields {
            if let Some(value) = value {
                writer.name(member);
                writer.string(value);
            }
        }
        writer.end_object();
        writer.end_object();
        Ok(())
    }

    fn write_type_name(&self, writer: &mut JsonWriter, type_name: &str) {
        if self.is_json_light() {
            writer.name(ODATA_TYPE);
            writer.string(type_name);
        } else {
            writer.name(VERBOSE_METADATA);
            writer.start_object();
            writer.name("type");
            writer.string(type_name);
            writer.end_object();
        }
    }
}

/// Values a reader recovers with the right type without an annotation.
fn is_natural_json(primitive: &PrimitiveValue) -> bool {
    match primitive {
        PrimitiveValue::Boolean(_) | PrimitiveValue::Int32(_) | PrimitiveValue::String(_) => true,
        PrimitiveValue::Double(value) => value.is_finite(),
        _ => false,
    }
}

fn write_primitive(writer: &mut JsonWriter, primitive: &PrimitiveValue) -> Result<(), ODataError> {
    match primitive {
        PrimitiveValue::Boolean(value) => writer.boolean(*value),
        PrimitiveValue::Int32(value) => writer.int(i64::from(*value)),
        PrimitiveValue::Int64(value) => writer.string(&value.to_string()),
        PrimitiveValue::Double(value) => writer.double(*value),
        PrimitiveValue::Decimal(text) | PrimitiveValue::String(text) => writer.string(text),
        PrimitiveValue::Spatial(spatial) => {
            writer.json_value(&serde_json::Value::Object(spatial.geo_json.clone()));
        }
        PrimitiveValue::Literal { kind, text } => match kind {
            PrimitiveTypeKind::Byte | PrimitiveTypeKind::SByte | PrimitiveTypeKind::Int16 => {
                let number: i64 = text.parse().map_err(|_| invalid_literal(text, *kind))?;
                writer.int(number);
            }
            PrimitiveTypeKind::Single => {
                let number: f64 = text.parse().map_err(|_| invalid_literal(text, *kind))?;
                writer.double(number);
            }
            _ => writer.string(text),
        },
    }
    Ok(())
}

fn invalid_literal(text: &str, kind: PrimitiveTypeKind) -> ODataError {
    StructuralError::InvalidPrimitiveValue {
        value: text.to_string(),
        type_name: kind.full_name().to_string(),
    }
    .into()
}
