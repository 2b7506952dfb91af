//! The slice of the entity data model this crate consumes: type kinds, the
//! built-in primitive types with their spatial hierarchy, and the
//! [`TypeResolver`] collaborator used by the validators.

use std::fmt;

/// Kind of a type as it appears in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    None,
    Primitive,
    Complex,
    Collection,
    Entity,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::None => "None",
            TypeKind::Primitive => "Primitive",
            TypeKind::Complex => "Complex",
            TypeKind::Collection => "Collection",
            TypeKind::Entity => "Entity",
        };
        f.write_str(name)
    }
}

/// The built-in `Edm.*` primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTypeKind {
    Binary,
    Boolean,
    Byte,
    DateTime,
    DateTimeOffset,
    Decimal,
    Double,
    Guid,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    Stream,
    String,
    Time,
    Geography,
    GeographyPoint,
    GeographyLineString,
    GeographyPolygon,
    GeographyCollection,
    GeographyMultiPolygon,
    GeographyMultiLineString,
    GeographyMultiPoint,
    Geometry,
    GeometryPoint,
    GeometryLineString,
    GeometryPolygon,
    GeometryCollection,
    GeometryMultiPolygon,
    GeometryMultiLineString,
    GeometryMultiPoint,
}

const ALL_PRIMITIVE_TYPES: &[PrimitiveTypeKind] = &[
    PrimitiveTypeKind::Binary,
    PrimitiveTypeKind::Boolean,
    PrimitiveTypeKind::Byte,
    PrimitiveTypeKind::DateTime,
    PrimitiveTypeKind::DateTimeOffset,
    PrimitiveTypeKind::Decimal,
    PrimitiveTypeKind::Double,
    PrimitiveTypeKind::Guid,
    PrimitiveTypeKind::Int16,
    PrimitiveTypeKind::Int32,
    PrimitiveTypeKind::Int64,
    PrimitiveTypeKind::SByte,
    PrimitiveTypeKind::Single,
    PrimitiveTypeKind::Stream,
    PrimitiveTypeKind::String,
    PrimitiveTypeKind::Time,
    PrimitiveTypeKind::Geography,
    PrimitiveTypeKind::GeographyPoint,
    PrimitiveTypeKind::GeographyLineString,
    PrimitiveTypeKind::GeographyPolygon,
    PrimitiveTypeKind::GeographyCollection,
    PrimitiveTypeKind::GeographyMultiPolygon,
    PrimitiveTypeKind::GeographyMultiLineString,
    PrimitiveTypeKind::GeographyMultiPoint,
    PrimitiveTypeKind::Geometry,
    PrimitiveTypeKind::GeometryPoint,
    PrimitiveTypeKind::GeometryLineString,
    PrimitiveTypeKind::GeometryPolygon,
    PrimitiveTypeKind::GeometryCollection,
    PrimitiveTypeKind::GeometryMultiPolygon,
    PrimitiveTypeKind::GeometryMultiLineString,
    PrimitiveTypeKind::GeometryMultiPoint,
];

impl PrimitiveTypeKind {
    /// The qualified `Edm.*` name of the type.
    #[must_use]
    pub fn full_name(self) -> &'static str {
        use PrimitiveTypeKind::*;
        match self {
            Binary => "Edm.Binary",
            Boolean => "Edm.Boolean",
            Byte => "Edm.Byte",
            DateTime => "Edm.DateTime",
            DateTimeOffset => "Edm.DateTimeOffset",
            Decimal => "Edm.Decimal",
            Double => "Edm.Double",
            Guid => "Edm.Guid",
            Int16 => "Edm.Int16",
            Int32 => "Edm.Int32",
            Int64 => "Edm.Int64",
            SByte => "Edm.SByte",
            Single => "Edm.Single",
            Stream => "Edm.Stream",
            String => "Edm.String",
            Time => "Edm.Time",
            Geography => "Edm.Geography",
            GeographyPoint => "Edm.GeographyPoint",
            GeographyLineString => "Edm.GeographyLineString",
            GeographyPolygon => "Edm.GeographyPolygon",
            GeographyCollection => "Edm.GeographyCollection",
            GeographyMultiPolygon => "Edm.GeographyMultiPolygon",
            GeographyMultiLineString => "Edm.GeographyMultiLineString",
            GeographyMultiPoint => "Edm.GeographyMultiPoint",
            Geometry => "Edm.Geometry",
            GeometryPoint => "Edm.GeometryPoint",
            GeometryLineString => "Edm.GeometryLineString",
            GeometryPolygon => "Edm.GeometryPolygon",
            GeometryCollection => "Edm.GeometryCollection",
            GeometryMultiPolygon => "Edm.GeometryMultiPolygon",
            GeometryMultiLineString => "Edm.GeometryMultiLineString",
            GeometryMultiPoint => "Edm.GeometryMultiPoint",
        }
    }

    /// Looks a primitive type up by its qualified name. The comparison is ordinal.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_PRIMITIVE_TYPES
            .iter()
            .copied()
            .find(|kind| kind.full_name() == name)
    }

    #[must_use]
    pub fn is_spatial(self) -> bool {
        self.base_type().is_some()
            || matches!(self, PrimitiveTypeKind::Geography | PrimitiveTypeKind::Geometry)
    }

    /// The direct spatial base type; `None` for the spatial roots and every
    /// non-spatial type.
    #[must_use]
    pub fn base_type(self) -> Option<Self> {
        use PrimitiveTypeKind::*;
        match self {
            GeographyPoint | GeographyLineString | GeographyPolygon | GeographyCollection => {
                Some(Geography)
            }
            GeographyMultiPolygon | GeographyMultiLineString | GeographyMultiPoint => {
                Some(GeographyCollection)
            }
            GeometryPoint | GeometryLineString | GeometryPolygon | GeometryCollection => {
                Some(Geometry)
            }
            GeometryMultiPolygon | GeometryMultiLineString | GeometryMultiPoint => {
                Some(GeometryCollection)
            }
            _ => None,
        }
    }

    /// The type itself followed by its base types, most derived first.
    fn ancestry(self) -> Vec<Self> {
        let mut chain = vec![self];
        let mut current = self;
        while let Some(base) = current.base_type() {
            chain.push(base);
            current = base;
        }
        chain
    }
}

impl fmt::Display for PrimitiveTypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name())
    }
}

/// A declared type as handed to the core by the metadata provider.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeReference {
    pub kind: TypeKind,
    pub full_name: String,
    pub nullable: bool,
}

impl TypeReference {
    #[must_use]
    pub fn primitive(kind: PrimitiveTypeKind, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Primitive,
            full_name: kind.full_name().to_string(),
            nullable,
        }
    }

    #[must_use]
    pub fn complex(full_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            kind: TypeKind::Complex,
            full_name: full_name.into(),
            nullable,
        }
    }

    #[must_use]
    pub fn entity(full_name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Entity,
            full_name: full_name.into(),
            nullable: true,
        }
    }

    /// A `Collection(item)` reference. Collections themselves are never null.
    #[must_use]
    pub fn collection(item: &TypeReference) -> Self {
        Self {
            kind: TypeKind::Collection,
            full_name: collection_type_name(&item.full_name),
            nullable: false,
        }
    }

    /// The item type of a collection reference, resolved against `resolver`.
    /// Item types that are not primitive are taken to be complex.
    #[must_use]
    pub fn collection_item_type(&self, resolver: &dyn TypeResolver) -> Option<TypeReference> {
        if self.kind != TypeKind::Collection {
            return None;
        }
        let item_name = collection_item_type_name(&self.full_name)?;
        Some(match resolver.find_primitive_type(item_name) {
            Some(primitive) => TypeReference::primitive(primitive, true),
            None => TypeReference::complex(item_name, true),
        })
    }

    #[must_use]
    pub fn as_primitive(&self) -> Option<PrimitiveTypeKind> {
        if self.kind == TypeKind::Primitive {
            PrimitiveTypeKind::from_name(&self.full_name)
        } else {
            None
        }
    }
}

/// Lookup and assignability services over primitive types. The default
/// implementation is [`CoreTypeResolver`]; a metadata provider with its own
/// type definitions implements this trait.
pub trait TypeResolver: Send + Sync {
    fn find_primitive_type(&self, name: &str) -> Option<PrimitiveTypeKind>;

    /// Whether a value of type `sub` can be used where `base` is expected.
    fn is_assignable_from(&self, base: PrimitiveTypeKind, sub: PrimitiveTypeKind) -> bool;

    /// The most derived type both arguments are assignable to, if any.
    fn common_base_type(
        &self,
        first: PrimitiveTypeKind,
        second: PrimitiveTypeKind,
    ) -> Option<PrimitiveTypeKind>;

    fn is_spatial(&self, kind: PrimitiveTypeKind) -> bool {
        kind.is_spatial()
    }
}

/// Resolver over the built-in `Edm.*` types only.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreTypeResolver;

impl TypeResolver for CoreTypeResolver {
    fn find_primitive_type(&self, name: &str) -> Option<PrimitiveTypeKind> {
        PrimitiveTypeKind::from_name(name)
    }

    fn is_assignable_from(&self, base: PrimitiveTypeKind, sub: PrimitiveTypeKind) -> bool {
        sub.ancestry().contains(&base)
    }

    fn common_base_type(
        &self,
        first: PrimitiveTypeKind,
        second: PrimitiveTypeKind,
    ) -> Option<PrimitiveTypeKind> {
        let second_chain = second.ancestry();
        first
            .ancestry()
            .into_iter()
            .find(|candidate| second_chain.contains(candidate))
    }
}

const COLLECTION_PREFIX: &str = "Collection(";

/// Extracts `Item` from `Collection(Item)`. Returns `None` when the name does
/// not have that shape or the item name is empty.
#[must_use]
pub fn collection_item_type_name(type_name: &str) -> Option<&str> {
    let inner = type_name
        .strip_prefix(COLLECTION_PREFIX)?
        .strip_suffix(')')?;
    if inner.is_empty() || inner.contains(COLLECTION_PREFIX) {
        return None;
    }
    Some(inner)
}

#[must_use]
pub fn collection_type_name(item_type_name: &str) -> String {
    format!("{COLLECTION_PREFIX}{item_type_name})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_lookup_is_ordinal() {
        assert_eq!(
            PrimitiveTypeKind::from_name("Edm.Int32"),
            Some(PrimitiveTypeKind::Int32)
        );
        assert_eq!(PrimitiveTypeKind::from_name("edm.int32"), None);
        assert_eq!(PrimitiveTypeKind::from_name("NS.Address"), None);
    }

    #[test]
    fn test_spatial_classification() {
        assert!(PrimitiveTypeKind::Geography.is_spatial());
        assert!(PrimitiveTypeKind::GeometryMultiPoint.is_spatial());
        assert!(!PrimitiveTypeKind::String.is_spatial());
    }

    #[test]
    fn test_common_base_of_geography_subtypes() {
        let resolver = CoreTypeResolver;
        assert_eq!(
            resolver.common_base_type(
                PrimitiveTypeKind::GeographyPoint,
                PrimitiveTypeKind::GeographyLineString
            ),
            Some(PrimitiveTypeKind::Geography)
        );
        assert_eq!(
            resolver.common_base_type(
                PrimitiveTypeKind::GeographyMultiPoint,
                PrimitiveTypeKind::GeographyMultiPolygon
            ),
            Some(PrimitiveTypeKind::GeographyCollection)
        );
        assert_eq!(
            resolver.common_base_type(
                PrimitiveTypeKind::GeographyPoint,
                PrimitiveTypeKind::GeometryPoint
            ),
            None
        );
    }

    #[test]
    fn test_assignability_follows_base_chain() {
        let resolver = CoreTypeResolver;
        assert!(resolver.is_assignable_from(
            PrimitiveTypeKind::Geography,
            PrimitiveTypeKind::GeographyMultiPoint
        ));
        assert!(!resolver.is_assignable_from(
            PrimitiveTypeKind::GeographyPoint,
            PrimitiveTypeKind::Geography
        ));
        assert!(resolver.is_assignable_from(PrimitiveTypeKind::Int32, PrimitiveTypeKind::Int32));
    }

    #[test]
    fn test_collection_type_name_parsing() {
        assert_eq!(collection_item_type_name("Collection(Edm.String)"), Some("Edm.String"));
        assert_eq!(collection_item_type_name("Collection()"), None);
        assert_eq!(collection_item_type_name("Edm.String"), None);
        assert_eq!(collection_item_type_name("Collection(Edm.String"), None);
        assert_eq!(
            collection_item_type_name("Collection(Collection(Edm.String))"),
            None
        );
        assert_eq!(collection_type_name("NS.Address"), "Collection(NS.Address)");
    }
}
