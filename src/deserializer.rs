//! Reading values, entries and feeds from JSON Light and Verbose JSON
//! payloads. The readers pull from a [`TokenSource`] and validate as they go.

use crate::collection_validator::CollectionWithoutExpectedTypeValidator;
use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::edm::{collection_item_type_name, PrimitiveTypeKind, TypeKind, TypeReference, TypeResolver};
use crate::error::{ODataError, StructuralError, UsageError};
use crate::json::{JsonNode, JsonPrimitive, TokenSource};
use crate::model::{
    CollectionValue, ComplexValue, NavigationContent, NavigationProperty, ODataAssociationLink, ODataEntry,
    ODataNavigationLink, ODataProperty, ODataValue, PrimitiveValue, SpatialValue, StreamReferenceValue,
};
use crate::settings::{ODataVersion, PayloadFormat, ReaderSettings};
use std::collections::HashMap;

pub(crate) const ODATA_TYPE: &str = "odata.type";
pub(crate) const ODATA_METADATA: &str = "odata.metadata";
pub(crate) const ODATA_ID: &str = "odata.id";
pub(crate) const ODATA_EDIT_LINK: &str = "odata.editLink";
pub(crate) const ODATA_READ_LINK: &str = "odata.readLink";
pub(crate) const ODATA_ETAG: &str = "odata.etag";
pub(crate) const NAVIGATION_LINK_URL: &str = "odata.navigationLinkUrl";
pub(crate) const ASSOCIATION_LINK_URL: &str = "odata.associationLinkUrl";
pub(crate) const MEDIA_READ_LINK: &str = "odata.mediaReadLink";
pub(crate) const MEDIA_EDIT_LINK: &str = "odata.mediaEditLink";
pub(crate) const MEDIA_CONTENT_TYPE: &str = "odata.mediaContentType";
pub(crate) const MEDIA_ETAG: &str = "odata.mediaETag";
pub(crate) const VALUE: &str = "value";

pub(crate) const VERBOSE_DATA: &str = "d";
pub(crate) const VERBOSE_RESULTS: &str = "results";
pub(crate) const VERBOSE_METADATA: &str = "__metadata";
pub(crate) const VERBOSE_DEFERRED: &str = "__deferred";
pub(crate) const VERBOSE_MEDIA_RESOURCE: &str = "__mediaresource";

const MEDIA_ANNOTATIONS: [&str; 4] = [MEDIA_READ_LINK, MEDIA_EDIT_LINK, MEDIA_CONTENT_TYPE, MEDIA_ETAG];

/// A value together with the type name the payload declared for it. The
/// collection validator works on declared names, not on inferred ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadValue {
    pub value: ODataValue,
    pub payload_type_name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum ValueKind {
    Primitive(Option<PrimitiveTypeKind>),
    Spatial(PrimitiveTypeKind),
    Complex,
    Collection,
}

/// What a lookahead pass found inside an object.
#[derive(Debug, Default)]
struct ObjectShape {
    type_name: Option<String>,
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    geo_json_type: Option<String>,
    has_results: bool,
    has_deferred: bool,
    has_media_resource: bool,
}

enum Member<'n> {
    ODataInstanceAnnotation,
    CustomInstanceAnnotation,
    ODataPropertyAnnotation { property: &'n str, annotation: &'n str },
    CustomPropertyAnnotation { property: &'n str, annotation: &'n str },
    VerboseMetadata,
    Property,
}

#[derive(Clone)]
pub struct JsonDeserializer<'a> {
    settings: ReaderSettings,
    resolver: &'a dyn TypeResolver,
}

impl<'a> JsonDeserializer<'a> {
    pub fn new(settings: ReaderSettings, resolver: &'a dyn TypeResolver) -> Self {
        Self { settings, resolver }
    }

    #[must_use]
    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    #[must_use]
    pub fn resolver(&self) -> &'a dyn TypeResolver {
        self.resolver
    }

    /// A checker configured from the reader settings.
    #[must_use]
    pub fn new_checker(&self) -> DuplicatePropertyNamesChecker {
        self.settings.duplicate_property_names_checker()
    }

    /// Fails for formats this crate cannot read and for format/version
    /// combinations the protocol does not define.
    pub fn ensure_format_supported(&self, component: &'static str) -> Result<(), ODataError> {
        if self.settings.format == PayloadFormat::Atom {
            return Err(UsageError::UnsupportedFormat {
                component,
                format: self.settings.format.to_string(),
            }
            .into());
        }
        self.settings.format.ensure_supported_by(self.settings.version)
    }

    /// A reference for an item type known only by name.
    #[must_use]
    pub fn type_reference_for(&self, type_name: &str) -> TypeReference {
        match self.resolver.find_primitive_type(type_name) {
            Some(primitive) => TypeReference::primitive(primitive, true),
            None => TypeReference::complex(type_name, true),
        }
    }

    /// Reads the value starting at the current node and moves past it.
    ///
    /// `payload_type_name` is a type name found on the wire next to the
    /// value, such as a JSON Light `odata.type` property annotation. A complex
    /// value is checked with `checker` when one is given, otherwise with a
    /// fresh checker.
    pub fn read_value<S: TokenSource>(
        &self,
        source: &mut S,
        expected: Option<&TypeReference>,
        payload_type_name: Option<&str>,
        checker: Option<&mut DuplicatePropertyNamesChecker>,
    ) -> Result<ReadValue, ODataError> {
        if *source.node() == JsonNode::Primitive(JsonPrimitive::Null) {
            source.read()?;
            if let Some(expected) = expected.filter(|t| !t.nullable) {
                return Err(null_for_non_nullable(&expected.full_name));
            }
            return Ok(ReadValue {
                value: ODataValue::Null,
                payload_type_name: payload_type_name.map(str::to_string),
            });
        }

        let shape = if *source.node() == JsonNode::StartObject {
            self.peek_object(source)?
        } else {
            ObjectShape::default()
        };
        let payload_type_name = payload_type_name.map(str::to_string).or(shape.type_name.clone());
        let target_name = payload_type_name
            .clone()
            .or_else(|| expected.map(|t| t.full_name.clone()));

        let value = match self.value_kind(source.node(), target_name.as_deref(), &shape) {
            ValueKind::Primitive(Some(kind)) => {
                let primitive = match source.node() {
                    JsonNode::Primitive(_) => source.read_primitive()?,
                    other => return Err(invalid_primitive(&other.to_string(), kind)),
                };
                ODataValue::Primitive(convert_primitive(&primitive, kind)?)
            }
            ValueKind::Primitive(None) => {
                let primitive = source.read_primitive()?;
                ODataValue::Primitive(untyped_primitive(&primitive)?)
            }
            ValueKind::Spatial(kind) => ODataValue::Primitive(self.read_spatial(source, kind)?),
            ValueKind::Complex => {
                let complex = match checker {
                    Some(checker) => self.read_complex_value(source, target_name.as_deref(), checker)?,
                    None => {
                        let mut checker = self.new_checker();
                        self.read_complex_value(source, target_name.as_deref(), &mut checker)?
                    }
                };
                ODataValue::Complex(complex)
            }
            ValueKind::Collection => {
                let expected = expected.filter(|t| t.kind == TypeKind::Collection);
                ODataValue::Collection(self.read_collection_value(source, target_name.as_deref(), expected)?)
            }
        };
        Ok(ReadValue {
            value,
            payload_type_name,
        })
    }

    fn value_kind(&self, node: &JsonNode, type_name: Option<&str>, shape: &ObjectShape) -> ValueKind {
        if let Some(name) = type_name {
            if name.starts_with("Collection(") {
                return ValueKind::Collection;
            }
            return match self.resolver.find_primitive_type(name) {
                Some(kind) if self.resolver.is_spatial(kind) => ValueKind::Spatial(kind),
                Some(kind) => ValueKind::Primitive(Some(kind)),
                None => ValueKind::Complex,
            };
        }
        match node {
            JsonNode::StartArray => ValueKind::Collection,
            JsonNode::StartObject if shape.geo_json_type.is_some() => {
                ValueKind::Spatial(PrimitiveTypeKind::Geography)
            }
            JsonNode::StartObject if shape.has_results => ValueKind::Collection,
            JsonNode::StartObject => ValueKind::Complex,
            _ => ValueKind::Primitive(None),
        }
    }

    pub fn read_complex_value<S: TokenSource>(
        &self,
        source: &mut S,
        type_name: Option<&str>,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<ComplexValue, ODataError> {
        source.read_start_object()?;
        let mut complex = ComplexValue::new(type_name);
        while let JsonNode::Property(name) = source.node().clone() {
            source.read()?;
            match self.classify_member(&name) {
                Member::ODataInstanceAnnotation | Member::CustomInstanceAnnotation | Member::VerboseMetadata => {
                    checker.mark_property_as_processed(&name)?;
                    source.skip_value()?;
                }
                Member::ODataPropertyAnnotation { property, annotation } => {
                    let value = source.read_json_value()?;
                    checker.add_odata_property_annotation(property, annotation, value)?;
                }
                Member::CustomPropertyAnnotation { property, annotation } => {
                    checker.add_custom_property_annotation(property, annotation)?;
                    source.skip_value()?;
                }
                Member::Property => {
                    let type_name = checker
                        .odata_property_annotations(&name)
                        .and_then(|annotations| annotation_string(annotations, ODATA_TYPE));
                    checker.mark_property_as_processed(&name)?;
                    let read = self.read_value(source, None, type_name.as_deref(), None)?;
                    let property = ODataProperty::new(&name, read.value);
                    checker.check_for_duplicate_property_names(&property)?;
                    complex.properties.push(property);
                }
            }
        }
        if let Some(orphan) = checker
            .get_all_unprocessed_properties()
            .into_iter()
            .find(|name| checker.odata_property_annotations(name).is_some_and(|a| !a.is_empty()))
        {
            return Err(annotation_without_property(orphan));
        }
        source.read_end_object()?;
        Ok(complex)
    }

    /// Reads a collection value: a JSON array, or in Verbose JSON an object
    /// with a `results` array.
    pub fn read_collection_value<S: TokenSource>(
        &self,
        source: &mut S,
        type_name: Option<&str>,
        expected: Option<&TypeReference>,
    ) -> Result<CollectionValue, ODataError> {
        self.settings
            .version
            .ensure_supports("Collection values", ODataVersion::V3)?;
        let item_type_name = match type_name {
            Some(name) => Some(collection_item_type_name(name).ok_or_else(|| {
                ODataError::from(StructuralError::InvalidCollectionTypeName {
                    type_name: name.to_string(),
                })
            })?),
            None => None,
        };
        let expected_item = expected.and_then(|t| t.collection_item_type(self.resolver));
        let mut validator = match expected_item {
            Some(_) => None,
            None => Some(CollectionWithoutExpectedTypeValidator::new(self.resolver, item_type_name)),
        };
        let item_type = expected_item.or_else(|| item_type_name.map(|name| self.type_reference_for(name)));

        let wrapped = *source.node() == JsonNode::StartObject;
        if wrapped {
            source.read_start_object()?;
            self.read_up_to_results(source)?;
        }
        source.read_start_array()?;
        let mut checker = self.new_checker();
        let mut items = Vec::new();
        while *source.node() != JsonNode::EndArray {
            items.push(self.read_collection_item(
                source,
                item_type.as_ref(),
                validator.as_mut(),
                &mut checker,
            )?);
        }
        source.read_end_array()?;
        if wrapped {
            skip_remaining_members(source)?;
            source.read_end_object()?;
        }
        Ok(CollectionValue::new(type_name, items))
    }

    /// Reads one collection item. `checker` is cleared and reused for complex
    /// items; null items skip the validator.
    pub fn read_collection_item<S: TokenSource>(
        &self,
        source: &mut S,
        item_type: Option<&TypeReference>,
        validator: Option<&mut CollectionWithoutExpectedTypeValidator<'_>>,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<ODataValue, ODataError> {
        match source.node() {
            JsonNode::StartArray => {
                log::debug!("nested collection rejected");
                return Err(StructuralError::InvalidItemTypeKind {
                    kind: TypeKind::Collection.to_string(),
                }
                .into());
            }
            JsonNode::Primitive(JsonPrimitive::Null) => {
                if let Some(item_type) = item_type.filter(|t| !t.nullable) {
                    return Err(null_for_non_nullable(&item_type.full_name));
                }
                source.read()?;
                return Ok(ODataValue::Null);
            }
            _ => {}
        }
        checker.clear();
        let read = self.read_value(source, item_type, None, Some(checker))?;
        if let Some(validator) = validator {
            let item_type_name = read.payload_type_name.as_deref().or(match &read.value {
                ODataValue::Primitive(PrimitiveValue::Spatial(spatial)) => Some(spatial.kind.full_name()),
                _ => None,
            });
            validator.validate_collection_item(item_type_name, read.value.type_kind())?;
        }
        Ok(read.value)
    }

    /// Reads an entry object at the current node.
    pub fn read_entry<S: TokenSource>(
        &self,
        source: &mut S,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<ODataEntry, ODataError> {
        let mut entry = match self.settings.format {
            PayloadFormat::VerboseJson => self.read_verbose_entry(source, checker)?,
            _ => self.read_json_light_entry(source, checker)?,
        };
        entry.raw_annotations = checker.annotation_collector().take_annotations();
        Ok(entry)
    }

    /// Reads the entries of a JSON array at the current node.
    pub fn read_entries<S: TokenSource>(&self, source: &mut S) -> Result<Vec<ODataEntry>, ODataError> {
        source.read_start_array()?;
        let mut entries = Vec::new();
        while *source.node() != JsonNode::EndArray {
            let mut checker = self.new_checker();
            entries.push(self.read_entry(source, &mut checker)?);
        }
        source.read_end_array()?;
        Ok(entries)
    }

    /// Reads a complete entry payload, wrapper included.
    pub fn read_entry_payload<S: TokenSource>(&self, source: &mut S) -> Result<ODataEntry, ODataError> {
        self.ensure_format_supported("entry reader")?;
        source.read()?;
        let mut checker = self.new_checker();
        let entry = match self.settings.format {
            PayloadFormat::VerboseJson => {
                read_verbose_wrapper_start(source)?;
                let entry = self.read_entry(source, &mut checker)?;
                skip_remaining_members(source)?;
                source.read_end_object()?;
                entry
            }
            _ => self.read_entry(source, &mut checker)?,
        };
        expect_end_of_input(source)?;
        Ok(entry)
    }

    /// Reads a complete feed payload, wrapper included.
    pub fn read_feed_payload<S: TokenSource>(&self, source: &mut S) -> Result<Vec<ODataEntry>, ODataError> {
        self.ensure_format_supported("feed reader")?;
        source.read()?;
        let entries = match self.settings.format {
            PayloadFormat::VerboseJson => {
                read_verbose_wrapper_start(source)?;
                let entries = if *source.node() == JsonNode::StartObject {
                    source.read_start_object()?;
                    self.read_up_to_results(source)?;
                    let entries = self.read_entries(source)?;
                    skip_remaining_members(source)?;
                    source.read_end_object()?;
                    entries
                } else {
                    self.read_entries(source)?
                };
                skip_remaining_members(source)?;
                source.read_end_object()?;
                entries
            }
            _ => {
                source.read_start_object()?;
                let mut entries = None;
                while let JsonNode::Property(name) = source.node().clone() {
                    source.read()?;
                    match self.classify_member(&name) {
                        Member::Property if name == VALUE && entries.is_none() => {
                            entries = Some(self.read_entries(source)?);
                        }
                        Member::ODataInstanceAnnotation | Member::CustomInstanceAnnotation => {
                            source.skip_value()?;
                        }
                        _ => return Err(unexpected_property(&name, "a feed")),
                    }
                }
                source.read_end_object()?;
                entries.ok_or_else(|| missing_value_property(VALUE))?
            }
        };
        expect_end_of_input(source)?;
        Ok(entries)
    }

    fn read_json_light_entry<S: TokenSource>(
        &self,
        source: &mut S,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<ODataEntry, ODataError> {
        source.read_start_object()?;
        let mut entry = ODataEntry::default();
        while let JsonNode::Property(name) = source.node().clone() {
            source.read()?;
            match self.classify_member(&name) {
                Member::ODataInstanceAnnotation => {
                    checker.mark_property_as_processed(&name)?;
                    match name.as_str() {
                        ODATA_TYPE => entry.type_name = source.read_string_or_null()?,
                        ODATA_ID => entry.id = source.read_string_or_null()?,
                        ODATA_EDIT_LINK => entry.edit_link = source.read_string_or_null()?,
                        ODATA_READ_LINK => entry.read_link = source.read_string_or_null()?,
                        ODATA_ETAG => entry.etag = source.read_string_or_null()?,
                        _ => source.skip_value()?,
                    }
                }
                Member::CustomInstanceAnnotation | Member::VerboseMetadata => {
                    checker.mark_property_as_processed(&name)?;
                    checker
                        .annotation_collector()
                        .try_peek_and_collect_annotation_raw_json(source, "", &name)?;
                    source.skip_value()?;
                }
                Member::ODataPropertyAnnotation { property, annotation } => {
                    let value = source.read_json_value()?;
                    checker.add_odata_property_annotation(property, annotation, value)?;
                }
                Member::CustomPropertyAnnotation { property, annotation } => {
                    checker.add_custom_property_annotation(property, annotation)?;
                    checker
                        .annotation_collector()
                        .try_peek_and_collect_annotation_raw_json(source, property, annotation)?;
                    source.skip_value()?;
                }
                Member::Property => self.read_entry_property(source, &name, &mut entry, checker)?,
            }
        }
        self.read_links_without_value(&mut entry, checker)?;
        source.read_end_object()?;
        Ok(entry)
    }

    fn read_entry_property<S: TokenSource>(
        &self,
        source: &mut S,
        name: &str,
        entry: &mut ODataEntry,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        let annotations = checker
            .odata_property_annotations(name)
            .cloned()
            .unwrap_or_default();
        if MEDIA_ANNOTATIONS.iter().any(|a| annotations.contains_key(*a)) {
            return Err(StructuralError::StreamPropertyWithValue {
                property_name: name.to_string(),
            }
            .into());
        }
        checker.mark_property_as_processed(name)?;

        if annotations.contains_key(NAVIGATION_LINK_URL) {
            let mut link = ODataNavigationLink::new(name);
            link.url = annotation_string(&annotations, NAVIGATION_LINK_URL);
            self.read_expanded_navigation_link(source, link, entry, checker)?;
        } else {
            let type_name = annotation_string(&annotations, ODATA_TYPE);
            let read = self.read_value(source, None, type_name.as_deref(), None)?;
            let property = ODataProperty::new(name, read.value);
            checker.check_for_duplicate_property_names(&property)?;
            entry.properties.push(property);
        }

        if annotations.contains_key(ASSOCIATION_LINK_URL) {
            let link = ODataAssociationLink {
                name: name.to_string(),
                url: annotation_string(&annotations, ASSOCIATION_LINK_URL),
            };
            self.add_association_link(link, entry, checker)?;
        }
        Ok(())
    }

    fn read_expanded_navigation_link<S: TokenSource>(
        &self,
        source: &mut S,
        mut link: ODataNavigationLink,
        entry: &mut ODataEntry,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        checker.check_for_duplicate_property_names_on_navigation_link_start(&link)?;
        let content = match source.node() {
            JsonNode::StartObject => {
                let mut nested = self.new_checker();
                NavigationContent::Entry(Box::new(self.read_entry(source, &mut nested)?))
            }
            JsonNode::StartArray => NavigationContent::Feed(self.read_entries(source)?),
            JsonNode::Primitive(JsonPrimitive::Null) => {
                source.read()?;
                NavigationContent::Null
            }
            _ => return Err(source.unexpected("an expanded entry, feed or null")),
        };
        let is_collection = matches!(content, NavigationContent::Feed(_));
        link.is_collection = Some(is_collection);
        checker.check_for_duplicate_navigation_link_names(&link, true, Some(is_collection))?;
        log::trace!("expanded navigation link '{}'", link.name);
        entry.navigation_properties.push(NavigationProperty { link, content });
        Ok(())
    }

    /// Claims the annotations left without a property value: deferred
    /// navigation links, association links and stream properties.
    fn read_links_without_value(
        &self,
        entry: &mut ODataEntry,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        let pending: Vec<String> = checker
            .get_all_unprocessed_properties()
            .into_iter()
            .map(str::to_string)
            .collect();
        for name in pending {
            let annotations = checker
                .odata_property_annotations(&name)
                .cloned()
                .unwrap_or_default();
            if annotations.is_empty() {
                continue;
            }
            checker.mark_property_as_processed(&name)?;
            let mut claimed = false;

            if annotations.contains_key(NAVIGATION_LINK_URL) {
                let mut link = ODataNavigationLink::new(&name);
                link.url = annotation_string(&annotations, NAVIGATION_LINK_URL);
                checker.check_for_duplicate_navigation_link_names(&link, false, None)?;
                entry.navigation_properties.push(NavigationProperty {
                    link,
                    content: NavigationContent::Deferred,
                });
                claimed = true;
            }
            if annotations.contains_key(ASSOCIATION_LINK_URL) {
                let link = ODataAssociationLink {
                    name: name.clone(),
                    url: annotation_string(&annotations, ASSOCIATION_LINK_URL),
                };
                self.add_association_link(link, entry, checker)?;
                claimed = true;
            }
            if MEDIA_ANNOTATIONS.iter().any(|a| annotations.contains_key(*a)) {
                let stream = StreamReferenceValue {
                    read_link: annotation_string(&annotations, MEDIA_READ_LINK),
                    edit_link: annotation_string(&annotations, MEDIA_EDIT_LINK),
                    content_type: annotation_string(&annotations, MEDIA_CONTENT_TYPE),
                    etag: annotation_string(&annotations, MEDIA_ETAG),
                };
                self.add_stream_property(&name, stream, entry, checker)?;
                claimed = true;
            }
            if !claimed {
                return Err(annotation_without_property(&name));
            }
        }
        Ok(())
    }

    fn add_association_link(
        &self,
        link: ODataAssociationLink,
        entry: &mut ODataEntry,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        self.settings
            .version
            .ensure_supports("Association links", ODataVersion::V3)?;
        checker.check_for_duplicate_association_link_names(&link)?;
        entry.association_links.push(link);
        Ok(())
    }

    fn add_stream_property(
        &self,
        name: &str,
        stream: StreamReferenceValue,
        entry: &mut ODataEntry,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<(), ODataError> {
        self.settings
            .version
            .ensure_supports("Stream properties", ODataVersion::V3)?;
        let property = ODataProperty::new(name, ODataValue::StreamReference(stream));
        checker.check_for_duplicate_property_names(&property)?;
        entry.properties.push(property);
        Ok(())
    }

    fn read_verbose_entry<S: TokenSource>(
        &self,
        source: &mut S,
        checker: &mut DuplicatePropertyNamesChecker,
    ) -> Result<ODataEntry, ODataError> {
        source.read_start_object()?;
        let mut entry = ODataEntry::default();
        while let JsonNode::Property(name) = source.node().clone() {
            source.read()?;
            checker.mark_property_as_processed(&name)?;
            if name == VERBOSE_METADATA {
                let metadata = source.read_json_value()?;
                let field = |key: &str| metadata.get(key).and_then(|v| v.as_str()).map(str::to_string);
                entry.type_name = field("type");
                entry.id = field("id").or_else(|| field("uri"));
                entry.edit_link = field("uri");
                entry.etag = field("etag");
                continue;
            }
            if *source.node() != JsonNode::StartObject {
                let read = self.read_value(source, None, None, None)?;
                let property = ODataProperty::new(&name, read.value);
                checker.check_for_duplicate_property_names(&property)?;
                entry.properties.push(property);
                continue;
            }

            let shape = self.peek_object(source)?;
            let is_entry = shape.metadata.as_ref().is_some_and(|m| m.contains_key("uri"));
            let is_feed = shape.has_results
                && !shape
                    .type_name
                    .as_deref()
                    .is_some_and(|t| t.starts_with("Collection("));
            if shape.has_deferred {
                let deferred = source.read_json_value()?;
                let mut link = ODataNavigationLink::new(&name);
                link.url = deferred
                    .get(VERBOSE_DEFERRED)
                    .and_then(|d| d.get("uri"))
                    .and_then(|u| u.as_str())
                    .map(str::to_string);
                checker.check_for_duplicate_navigation_link_names(&link, false, None)?;
                entry.navigation_properties.push(NavigationProperty {
                    link,
                    content: NavigationContent::Deferred,
                });
            } else if shape.has_media_resource {
                let resource = source.read_json_value()?;
                let media = resource.get(VERBOSE_MEDIA_RESOURCE);
                let field = |key: &str| {
                    media
                        .and_then(|m| m.get(key))
                        .and_then(|v| v.as_str())
                        .map(str::to_string)
                };
                let stream = StreamReferenceValue {
                    read_link: field("media_src"),
                    edit_link: field("edit_media"),
                    content_type: field("content_type"),
                    etag: field("media_etag"),
                };
                self.add_stream_property(&name, stream, &mut entry, checker)?;
            } else if is_entry || is_feed {
                let link = ODataNavigationLink::new(&name);
                checker.check_for_duplicate_property_names_on_navigation_link_start(&link)?;
                let content = if is_entry {
                    let mut nested = self.new_checker();
                    NavigationContent::Entry(Box::new(self.read_entry(source, &mut nested)?))
                } else {
                    source.read_start_object()?;
                    self.read_up_to_results(source)?;
                    let entries = self.read_entries(source)?;
                    skip_remaining_members(source)?;
                    source.read_end_object()?;
                    NavigationContent::Feed(entries)
                };
                let link = link.with_is_collection(is_feed);
                checker.check_for_duplicate_navigation_link_names(&link, true, Some(is_feed))?;
                entry.navigation_properties.push(NavigationProperty { link, content });
            } else {
                let read = self.read_value(source, None, None, None)?;
                let property = ODataProperty::new(&name, read.value);
                checker.check_for_duplicate_property_names(&property)?;
                entry.properties.push(property);
            }
        }
        source.read_end_object()?;
        Ok(entry)
    }

    fn read_spatial<S: TokenSource>(
        &self,
        source: &mut S,
        requested: PrimitiveTypeKind,
    ) -> Result<PrimitiveValue, ODataError> {
        if *source.node() != JsonNode::StartObject {
            return Err(invalid_primitive(&source.node().to_string(), requested));
        }
        let mut geo_json = match source.read_json_value()? {
            serde_json::Value::Object(map) => map,
            other => return Err(invalid_primitive(&other.to_string(), requested)),
        };
        geo_json.remove(VERBOSE_METADATA);
        let geometry = self
            .resolver
            .is_assignable_from(PrimitiveTypeKind::Geometry, requested);
        let kind = geo_json
            .get("type")
            .and_then(|t| t.as_str())
            .and_then(|t| spatial_kind(t, geometry))
            .filter(|kind| self.resolver.is_assignable_from(requested, *kind))
            .ok_or_else(|| {
                invalid_primitive(&serde_json::Value::Object(geo_json.clone()).to_string(), requested)
            })?;
        Ok(PrimitiveValue::Spatial(SpatialValue { kind, geo_json }))
    }

    /// Looks at an object without consuming it.
    fn peek_object<S: TokenSource>(&self, source: &mut S) -> Result<ObjectShape, ODataError> {
        let verbose = self.settings.format == PayloadFormat::VerboseJson;
        source.with_buffering(|s| {
            let mut shape = ObjectShape::default();
            let mut geo_json_type = None;
            let mut has_geo_members = false;
            s.read_start_object()?;
            while let JsonNode::Property(name) = s.node().clone() {
                s.read()?;
                match name.as_str() {
                    ODATA_TYPE if !verbose => shape.type_name = s.read_string_or_null()?,
                    VERBOSE_METADATA if verbose => {
                        if let serde_json::Value::Object(metadata) = s.read_json_value()? {
                            shape.type_name = metadata
                                .get("type")
                                .and_then(|t| t.as_str())
                                .map(str::to_string);
                            shape.metadata = Some(metadata);
                        }
                    }
                    VERBOSE_RESULTS if verbose => {
                        shape.has_results = true;
                        s.skip_value()?;
                    }
                    VERBOSE_DEFERRED if verbose => {
                        shape.has_deferred = true;
                        s.skip_value()?;
                    }
                    VERBOSE_MEDIA_RESOURCE if verbose => {
                        shape.has_media_resource = true;
                        s.skip_value()?;
                    }
                    "type" => {
                        if let JsonNode::Primitive(JsonPrimitive::String(geo_type)) = s.node() {
                            geo_json_type = Some(geo_type.clone());
                        }
                        s.skip_value()?;
                    }
                    "coordinates" | "geometries" => {
                        has_geo_members = true;
                        s.skip_value()?;
                    }
                    _ => s.skip_value()?,
                }
            }
            if has_geo_members {
                shape.geo_json_type = geo_json_type.filter(|t| spatial_kind(t, false).is_some());
            }
            Ok(shape)
        })
    }

    /// Skips Verbose JSON members up to and including the `results` name.
    pub(crate) fn read_up_to_results<S: TokenSource>(&self, source: &mut S) -> Result<(), ODataError> {
        while let JsonNode::Property(name) = source.node().clone() {
            source.read()?;
            if name == VERBOSE_RESULTS {
                return Ok(());
            }
            source.skip_value()?;
        }
        Err(missing_value_property(VERBOSE_RESULTS))
    }

    fn classify_member<'n>(&self, name: &'n str) -> Member<'n> {
        if self.settings.format == PayloadFormat::VerboseJson {
            return if name == VERBOSE_METADATA {
                Member::VerboseMetadata
            } else {
                Member::Property
            };
        }
        if let Some((property, annotation)) = name.split_once('@') {
            return if annotation.starts_with("odata.") {
                Member::ODataPropertyAnnotation { property, annotation }
            } else {
                Member::CustomPropertyAnnotation { property, annotation }
            };
        }
        if name.starts_with("odata.") {
            Member::ODataInstanceAnnotation
        } else if name.contains('.') {
            Member::CustomInstanceAnnotation
        } else {
            Member::Property
        }
    }
}

/// Consumes the start of `{"d": ...` and leaves the source on the value of `d`.
pub(crate) fn read_verbose_wrapper_start<S: TokenSource>(source: &mut S) -> Result<(), ODataError> {
    source.read_start_object()?;
    match source.node().clone() {
        JsonNode::Property(name) if name == VERBOSE_DATA => {
            source.read()?;
            Ok(())
        }
        JsonNode::Property(name) => Err(unexpected_property(&name, "a Verbose JSON payload")),
        _ => Err(missing_value_property(VERBOSE_DATA)),
    }
}

/// Skips the remaining members of the current object.
pub(crate) fn skip_remaining_members<S: TokenSource>(source: &mut S) -> Result<(), ODataError> {
    while let JsonNode::Property(_) = source.node() {
        source.read()?;
        source.skip_value()?;
    }
    Ok(())
}

pub(crate) fn expect_end_of_input<S: TokenSource>(source: &S) -> Result<(), ODataError> {
    if *source.node() != JsonNode::EndOfInput {
        return Err(source.unexpected("end of input"));
    }
    Ok(())
}

pub(crate) fn unexpected_property(name: &str, context: &str) -> ODataError {
    log::debug!("unexpected property '{name}' in {context}");
    StructuralError::UnexpectedProperty {
        property_name: name.to_string(),
        context: context.to_string(),
    }
    .into()
}

pub(crate) fn missing_value_property(name: &str) -> ODataError {
    StructuralError::MissingValueProperty {
        property_name: name.to_string(),
    }
    .into()
}

fn annotation_string(annotations: &HashMap<String, serde_json::Value>, name: &str) -> Option<String> {
    annotations
        .get(name)
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

fn annotation_without_property(name: &str) -> ODataError {
    log::debug!("annotations for missing property '{name}'");
    StructuralError::PropertyAnnotationWithoutProperty {
        property_name: name.to_string(),
    }
    .into()
}

fn null_for_non_nullable(type_name: &str) -> ODataError {
    StructuralError::NullValueForNonNullableType {
        type_name: type_name.to_string(),
    }
    .into()
}

fn invalid_primitive(value: &str, kind: PrimitiveTypeKind) -> ODataError {
    log::debug!("value {value} is not a valid {kind}");
    StructuralError::InvalidPrimitiveValue {
        value: value.to_string(),
        type_name: kind.full_name().to_string(),
    }
    .into()
}

fn primitive_text(primitive: &JsonPrimitive) -> String {
    match primitive {
        JsonPrimitive::Null => "null".to_string(),
        JsonPrimitive::Boolean(b) => b.to_string(),
        JsonPrimitive::Number(n) | JsonPrimitive::String(n) => n.clone(),
    }
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Converts a JSON primitive to a value of `kind`.
pub(crate) fn convert_primitive(
    primitive: &JsonPrimitive,
    kind: PrimitiveTypeKind,
) -> Result<PrimitiveValue, ODataError> {
    use PrimitiveTypeKind as K;
    let invalid = || invalid_primitive(&primitive_text(primitive), kind);
    let literal = |text: &str| PrimitiveValue::Literal {
        kind,
        text: text.to_string(),
    };
    let value = match (kind, primitive) {
        (K::Boolean, JsonPrimitive::Boolean(b)) => PrimitiveValue::Boolean(*b),
        (K::String, JsonPrimitive::String(s)) => PrimitiveValue::String(s.clone()),
        (K::Int32, JsonPrimitive::Number(n)) => PrimitiveValue::Int32(n.parse().map_err(|_| invalid())?),
        (K::Int64, JsonPrimitive::Number(n) | JsonPrimitive::String(n)) => {
            PrimitiveValue::Int64(n.parse().map_err(|_| invalid())?)
        }
        (K::Double, JsonPrimitive::Number(n) | JsonPrimitive::String(n)) => {
            PrimitiveValue::Double(parse_double(n).ok_or_else(invalid)?)
        }
        (K::Decimal, JsonPrimitive::Number(n) | JsonPrimitive::String(n)) => {
            n.parse::<f64>().map_err(|_| invalid())?;
            PrimitiveValue::Decimal(n.clone())
        }
        (K::Single, JsonPrimitive::Number(n) | JsonPrimitive::String(n)) => {
            parse_double(n).ok_or_else(invalid)?;
            literal(n)
        }
        (K::Byte, JsonPrimitive::Number(n)) => {
            n.parse::<u8>().map_err(|_| invalid())?;
            literal(n)
        }
        (K::SByte, JsonPrimitive::Number(n)) => {
            n.parse::<i8>().map_err(|_| invalid())?;
            literal(n)
        }
        (K::Int16, JsonPrimitive::Number(n)) => {
            n.parse::<i16>().map_err(|_| invalid())?;
            literal(n)
        }
        (K::Binary | K::DateTime | K::DateTimeOffset | K::Guid | K::Time, JsonPrimitive::String(s)) => {
            literal(s)
        }
        _ => return Err(invalid()),
    };
    Ok(value)
}

/// Values without any type information keep their JSON type; integral
/// numbers become `Edm.Int32` when they fit and `Edm.Double` otherwise.
fn untyped_primitive(primitive: &JsonPrimitive) -> Result<PrimitiveValue, ODataError> {
    match primitive {
        JsonPrimitive::Boolean(b) => Ok(PrimitiveValue::Boolean(*b)),
        JsonPrimitive::String(s) => Ok(PrimitiveValue::String(s.clone())),
        JsonPrimitive::Number(n) => match n.parse::<i32>() {
            Ok(int) => Ok(PrimitiveValue::Int32(int)),
            Err(_) => n
                .parse::<f64>()
                .map(PrimitiveValue::Double)
                .map_err(|_| invalid_primitive(n, PrimitiveTypeKind::Double)),
        },
        JsonPrimitive::Null => Err(invalid_primitive("null", PrimitiveTypeKind::String)),
    }
}

fn spatial_kind(geo_json_type: &str, geometry: bool) -> Option<PrimitiveTypeKind> {
    use PrimitiveTypeKind::*;
    let kind = match (geo_json_type, geometry) {
        ("Point", false) => GeographyPoint,
        ("LineString", false) => GeographyLineString,
        ("Polygon", false) => GeographyPolygon,
        ("MultiPoint", false) => GeographyMultiPoint,
        ("MultiLineString", false) => GeographyMultiLineString,
        ("MultiPolygon", false) => GeographyMultiPolygon,
        ("GeometryCollection", false) => GeographyCollection,
        ("Point", true) => GeometryPoint,
        ("LineString", true) => GeometryLineString,
        ("Polygon", true) => GeometryPolygon,
        ("MultiPoint", true) => GeometryMultiPoint,
        ("MultiLineString", true) => GeometryMultiLineString,
        ("MultiPolygon", true) => GeometryMultiPolygon,
        ("GeometryCollection", true) => GeometryCollection,
        _ => return None,
    };
    Some(kind)
}
