use crate::edm::{PrimitiveTypeKind, TypeKind};
use std::fmt;

/// Explicit override of the type name written for a value or entry.
///
/// `SerializationTypeName(None)` asks the writer to omit the type name
/// entirely, even where one would otherwise be inferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationTypeName(pub Option<String>);

#[derive(Debug, Clone, PartialEq)]
pub enum ODataValue {
    Null,
    Primitive(PrimitiveValue),
    Complex(ComplexValue),
    Collection(CollectionValue),
    StreamReference(StreamReferenceValue),
}

impl ODataValue {
    /// The type kind the value carries on its own; `None` for nulls.
    #[must_use]
    pub fn type_kind(&self) -> TypeKind {
        match self {
            ODataValue::Null => TypeKind::None,
            ODataValue::Primitive(_) | ODataValue::StreamReference(_) => TypeKind::Primitive,
            ODataValue::Complex(_) => TypeKind::Complex,
            ODataValue::Collection(_) => TypeKind::Collection,
        }
    }

    /// The type name the value declares for itself, if it is self-describing.
    #[must_use]
    pub fn intrinsic_type_name(&self) -> Option<&str> {
        match self {
            ODataValue::Primitive(primitive) => Some(primitive.type_kind().full_name()),
            ODataValue::Complex(complex) => complex.type_name.as_deref(),
            ODataValue::Collection(collection) => collection.type_name.as_deref(),
            ODataValue::Null | ODataValue::StreamReference(_) => None,
        }
    }

    #[must_use]
    pub fn serialization_type_name(&self) -> Option<&SerializationTypeName> {
        match self {
            ODataValue::Complex(complex) => complex.serialization_type_name.as_ref(),
            ODataValue::Collection(collection) => collection.serialization_type_name.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ODataValue::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    /// Decimal digits kept verbatim; no arithmetic happens in this crate.
    Decimal(String),
    String(String),
    Spatial(SpatialValue),
    /// A value kept in its wire literal form: dates, times, guids, binary
    /// and the narrow numeric types.
    Literal { kind: PrimitiveTypeKind, text: String },
}

impl PrimitiveValue {
    #[must_use]
    pub fn type_kind(&self) -> PrimitiveTypeKind {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveTypeKind::Boolean,
            PrimitiveValue::Int32(_) => PrimitiveTypeKind::Int32,
            PrimitiveValue::Int64(_) => PrimitiveTypeKind::Int64,
            PrimitiveValue::Double(_) => PrimitiveTypeKind::Double,
            PrimitiveValue::Decimal(_) => PrimitiveTypeKind::Decimal,
            PrimitiveValue::String(_) => PrimitiveTypeKind::String,
            PrimitiveValue::Spatial(spatial) => spatial.kind,
            PrimitiveValue::Literal { kind, .. } => *kind,
        }
    }
}

/// A spatial value kept as its GeoJSON representation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialValue {
    pub kind: PrimitiveTypeKind,
    pub geo_json: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexValue {
    pub type_name: Option<String>,
    pub properties: Vec<ODataProperty>,
    pub serialization_type_name: Option<SerializationTypeName>,
}

impl ComplexValue {
    #[must_use]
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: &str, value: ODataValue) -> Self {
        self.properties.push(ODataProperty::new(name, value));
        self
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ODataValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionValue {
    pub type_name: Option<String>,
    pub items: Vec<ODataValue>,
    pub serialization_type_name: Option<SerializationTypeName>,
}

impl CollectionValue {
    #[must_use]
    pub fn new(type_name: Option<&str>, items: Vec<ODataValue>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            items,
            serialization_type_name: None,
        }
    }
}

/// A reference to a binary media resource, never a literal value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamReferenceValue {
    pub read_link: Option<String>,
    pub edit_link: Option<String>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ODataProperty {
    pub name: String,
    pub value: ODataValue,
}

impl ODataProperty {
    #[must_use]
    pub fn new(name: &str, value: ODataValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataNavigationLink {
    pub name: String,
    pub url: Option<String>,
    /// `Some(true)` for a collection-valued navigation property,
    /// `Some(false)` for a singleton, `None` while unknown.
    pub is_collection: Option<bool>,
}

impl ODataNavigationLink {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            url: None,
            is_collection: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    #[must_use]
    pub fn with_is_collection(mut self, is_collection: bool) -> Self {
        self.is_collection = Some(is_collection);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ODataAssociationLink {
    pub name: String,
    pub url: Option<String>,
}

impl ODataAssociationLink {
    #[must_use]
    pub fn new(name: &str, url: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            url: url.map(str::to_string),
        }
    }
}

/// What a navigation link carries inline.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationContent {
    Deferred,
    Entry(Box<ODataEntry>),
    Null,
    Feed(Vec<ODataEntry>),
}

impl NavigationContent {
    #[must_use]
    pub fn is_expanded(&self) -> bool {
        !matches!(self, NavigationContent::Deferred)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationProperty {
    pub link: ODataNavigationLink,
    pub content: NavigationContent,
}

/// Raw JSON text of an annotation captured during reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAnnotation {
    pub property_name: String,
    pub annotation_name: String,
    pub raw_json: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ODataEntry {
    pub type_name: Option<String>,
    pub id: Option<String>,
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    pub etag: Option<String>,
    pub properties: Vec<ODataProperty>,
    pub navigation_properties: Vec<NavigationProperty>,
    pub association_links: Vec<ODataAssociationLink>,
    pub raw_annotations: Vec<RawAnnotation>,
    pub serialization_type_name: Option<SerializationTypeName>,
}

impl ODataEntry {
    #[must_use]
    pub fn new(type_name: Option<&str>) -> Self {
        Self {
            type_name: type_name.map(str::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&ODataValue> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    #[must_use]
    pub fn navigation_property(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation_properties
            .iter()
            .find(|n| n.link.name == name)
    }
}

impl fmt::Display for ODataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ODataValue::Null => write!(f, "null"),
            ODataValue::Primitive(p) => write!(f, "{}", p.type_kind()),
            ODataValue::Complex(c) => write!(f, "{}", c.type_name.as_deref().unwrap_or("complex")),
            ODataValue::Collection(c) => {
                write!(f, "{}", c.type_name.as_deref().unwrap_or("collection"))
            }
            ODataValue::StreamReference(_) => write!(f, "stream"),
        }
    }
}
