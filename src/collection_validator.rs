//! Item type consensus for collections that have no expected item type.

use crate::edm::{PrimitiveTypeKind, TypeKind, TypeResolver};
use crate::error::{ODataError, StructuralError};
use crate::utils::names_equal;

const DEFAULT_PRIMITIVE_ITEM_TYPE: &str = "Edm.String";

/// Checks that every item of a collection without an expected type has the
/// same kind and a compatible type name.
///
/// The item type either comes from the collection's own type name or is
/// fixed by the first item. In the second case spatial items widen the
/// fixed type to the common base of everything seen so far.
pub struct CollectionWithoutExpectedTypeValidator<'r> {
    resolver: &'r dyn TypeResolver,
    item_type_derived_from_collection: bool,
    item_type_name: Option<String>,
    item_type_kind: TypeKind,
    primitive_item_type: Option<PrimitiveTypeKind>,
}

impl std::fmt::Debug for CollectionWithoutExpectedTypeValidator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionWithoutExpectedTypeValidator")
            .field("derived", &self.item_type_derived_from_collection)
            .field("item_type_name", &self.item_type_name)
            .field("item_type_kind", &self.item_type_kind)
            .finish()
    }
}

impl<'r> CollectionWithoutExpectedTypeValidator<'r> {
    pub fn new(resolver: &'r dyn TypeResolver, item_type_name_from_collection: Option<&str>) -> Self {
        let mut validator = Self {
            resolver,
            item_type_derived_from_collection: item_type_name_from_collection.is_some(),
            item_type_name: item_type_name_from_collection.map(str::to_string),
            item_type_kind: TypeKind::None,
            primitive_item_type: None,
        };
        if let Some(name) = item_type_name_from_collection {
            validator.item_type_kind = validator.compute_expected_type_kind(name);
        }
        validator
    }

    /// The item type name taken from the collection's own type name, if the
    /// item type was not inferred from the items.
    #[must_use]
    pub fn item_type_name_from_collection(&self) -> Option<&str> {
        if self.item_type_derived_from_collection {
            self.item_type_name.as_deref()
        } else {
            None
        }
    }

    /// The item type currently established for the collection.
    #[must_use]
    pub fn item_type_name(&self) -> Option<&str> {
        self.item_type_name.as_deref()
    }

    #[must_use]
    pub fn item_type_kind(&self) -> TypeKind {
        self.item_type_kind
    }

    pub fn validate_collection_item(
        &mut self,
        item_type_name: Option<&str>,
        item_type_kind: TypeKind,
    ) -> Result<(), ODataError> {
        if !matches!(item_type_kind, TypeKind::Primitive | TypeKind::Complex) {
            log::debug!("collection item of kind {item_type_kind} rejected");
            return Err(StructuralError::InvalidItemTypeKind {
                kind: item_type_kind.to_string(),
            }
            .into());
        }

        if self.item_type_derived_from_collection {
            let item_type_name = item_type_name.or(self.item_type_name.as_deref()).map(str::to_string);
            return self.validate_item_type_name_and_kind(item_type_name.as_deref(), item_type_kind);
        }

        if self.item_type_kind == TypeKind::None {
            // First item fixes the collection item type.
            match item_type_name {
                None => {
                    self.item_type_kind = item_type_kind;
                    if item_type_kind == TypeKind::Primitive {
                        self.item_type_name = Some(DEFAULT_PRIMITIVE_ITEM_TYPE.to_string());
                        self.primitive_item_type =
                            self.resolver.find_primitive_type(DEFAULT_PRIMITIVE_ITEM_TYPE);
                    } else {
                        self.item_type_name = None;
                    }
                }
                Some(name) => {
                    self.item_type_kind = self.compute_expected_type_kind(name);
                    self.item_type_name = Some(name.to_string());
                }
            }
        }

        let item_type_name = match (item_type_name, item_type_kind) {
            (None, TypeKind::Primitive) => Some(DEFAULT_PRIMITIVE_ITEM_TYPE),
            (name, _) => name,
        };
        self.validate_item_type_name_and_kind(item_type_name, item_type_kind)
    }

    fn compute_expected_type_kind(&mut self, type_name: &str) -> TypeKind {
        match self.resolver.find_primitive_type(type_name) {
            Some(primitive) => {
                self.primitive_item_type = Some(primitive);
                TypeKind::Primitive
            }
            None => {
                self.primitive_item_type = None;
                TypeKind::Complex
            }
        }
    }

    fn validate_item_type_name_and_kind(
        &mut self,
        item_type_name: Option<&str>,
        item_type_kind: TypeKind,
    ) -> Result<(), ODataError> {
        if self.item_type_kind != item_type_kind {
            log::debug!(
                "collection item of kind {item_type_kind} does not match {}",
                self.item_type_kind
            );
            return Err(StructuralError::IncompatibleItemTypeKind {
                item_kind: item_type_kind.to_string(),
                expected_kind: self.item_type_kind.to_string(),
            }
            .into());
        }

        if item_type_kind == TypeKind::Primitive {
            if names_equal(self.item_type_name.as_deref(), item_type_name) {
                return Ok(());
            }
            if let Some(fixed) = self.primitive_item_type.filter(|k| self.resolver.is_spatial(*k)) {
                if let Some(item) = item_type_name.and_then(|n| self.resolver.find_primitive_type(n)) {
                    if self.item_type_derived_from_collection {
                        if self.resolver.is_assignable_from(fixed, item) {
                            return Ok(());
                        }
                    } else if let Some(common) = self.resolver.common_base_type(fixed, item) {
                        log::trace!("collection item type widened from {fixed} to {common}");
                        self.primitive_item_type = Some(common);
                        self.item_type_name = Some(common.full_name().to_string());
                        return Ok(());
                    }
                }
            }
            return Err(self.incompatible_name(item_type_name));
        }

        if !names_equal(self.item_type_name.as_deref(), item_type_name) {
            return Err(self.incompatible_name(item_type_name));
        }
        Ok(())
    }

    fn incompatible_name(&self, item_type_name: Option<&str>) -> ODataError {
        log::debug!(
            "collection item type {item_type_name:?} does not match {:?}",
            self.item_type_name
        );
        StructuralError::IncompatibleItemTypeName {
            item_type_name: item_type_name.unwrap_or_default().to_string(),
            expected_type_name: self.item_type_name.clone().unwrap_or_default(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::CoreTypeResolver;

    #[test]
    fn test_declared_item_type_defaults_missing_names() {
        let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("Edm.Int32"));
        assert_eq!(validator.item_type_kind(), TypeKind::Primitive);
        validator.validate_collection_item(None, TypeKind::Primitive).unwrap();
        validator
            .validate_collection_item(Some("Edm.Int32"), TypeKind::Primitive)
            .unwrap();
        assert!(validator
            .validate_collection_item(Some("Edm.String"), TypeKind::Primitive)
            .is_err());
    }

    #[test]
    fn test_unknown_declared_name_is_complex() {
        let validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("NS.Address"));
        assert_eq!(validator.item_type_kind(), TypeKind::Complex);
        assert_eq!(validator.item_type_name_from_collection(), Some("NS.Address"));
    }

    #[test]
    fn test_untyped_primitives_default_to_string() {
        let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
        validator.validate_collection_item(None, TypeKind::Primitive).unwrap();
        assert_eq!(validator.item_type_name(), Some("Edm.String"));
        validator
            .validate_collection_item(Some("Edm.String"), TypeKind::Primitive)
            .unwrap();
        let err = validator
            .validate_collection_item(Some("Edm.Int32"), TypeKind::Primitive)
            .unwrap_err();
        assert!(matches!(
            err,
            ODataError::Structural(StructuralError::IncompatibleItemTypeName { .. })
        ));
        assert_eq!(validator.item_type_name_from_collection(), None);
    }

    #[test]
    fn test_untyped_complex_items_must_stay_untyped() {
        let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
        validator.validate_collection_item(None, TypeKind::Complex).unwrap();
        validator.validate_collection_item(None, TypeKind::Complex).unwrap();
        assert!(validator
            .validate_collection_item(Some("NS.Address"), TypeKind::Complex)
            .is_err());
    }

    #[test]
    fn test_nested_collections_and_entities_are_rejected() {
        let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
        for kind in [TypeKind::Collection, TypeKind::Entity, TypeKind::None] {
            assert!(matches!(
                validator.validate_collection_item(None, kind),
                Err(ODataError::Structural(StructuralError::InvalidItemTypeKind { .. }))
            ));
        }
    }

    #[test]
    fn test_declared_spatial_type_accepts_subtypes_only() {
        let mut validator =
            CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("Edm.Geography"));
        validator
            .validate_collection_item(Some("Edm.GeographyPoint"), TypeKind::Primitive)
            .unwrap();
        assert_eq!(validator.item_type_name(), Some("Edm.Geography"));
        assert!(validator
            .validate_collection_item(Some("Edm.GeometryPoint"), TypeKind::Primitive)
            .is_err());

        let mut narrow =
            CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("Edm.GeographyPoint"));
        assert!(narrow
            .validate_collection_item(Some("Edm.GeographyLineString"), TypeKind::Primitive)
            .is_err());
    }
}
