//! Decides which type names end up on the wire.

use crate::collection_validator::CollectionWithoutExpectedTypeValidator;
use crate::edm::{collection_item_type_name, TypeReference};
use crate::error::{ODataError, StructuralError};
use crate::model::{ODataEntry, ODataValue, SerializationTypeName};

/// Outcome of [`TypeNameOracle::resolve_value_type_name`]. A `None` type name
/// means nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedTypeName {
    pub type_name: Option<String>,
    /// Item type of a collection value, when the type name is written.
    pub collection_item_type_name: Option<String>,
}

/// Stateless type name resolution shared by the serializers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeNameOracle;

impl TypeNameOracle {
    /// The explicit override if one is attached, otherwise the entry's own type name.
    #[must_use]
    pub fn resolve_entry_type_name(entry: &ODataEntry) -> Option<&str> {
        match &entry.serialization_type_name {
            Some(SerializationTypeName(name)) => name.as_deref(),
            None => entry.type_name.as_deref(),
        }
    }

    pub fn resolve_value_type_name(
        value: &ODataValue,
        declared_type: Option<&TypeReference>,
        serialization_type_name: Option<&SerializationTypeName>,
        collection_validator: Option<&CollectionWithoutExpectedTypeValidator<'_>>,
    ) -> Result<ResolvedTypeName, ODataError> {
        let mut type_name = value
            .intrinsic_type_name()
            .map(str::to_string)
            .or_else(|| declared_type.map(|t| t.full_name.clone()));

        if let Some(item_type_name) = collection_validator.and_then(|v| v.item_type_name_from_collection()) {
            if type_name.as_deref() == Some(item_type_name) {
                type_name = None;
            }
        }

        let mut collection_item_type = None;
        if let (Some(name), ODataValue::Collection(_)) = (type_name.as_deref(), value) {
            let item = collection_item_type_name(name).ok_or_else(|| {
                log::debug!("collection type name '{name}' rejected");
                ODataError::from(StructuralError::InvalidCollectionTypeName {
                    type_name: name.to_string(),
                })
            })?;
            collection_item_type = Some(item.to_string());
        }

        if let Some(SerializationTypeName(name)) = serialization_type_name {
            type_name = name.clone();
        }

        Ok(ResolvedTypeName {
            type_name,
            collection_item_type_name: collection_item_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edm::{CoreTypeResolver, PrimitiveTypeKind};
    use crate::model::{CollectionValue, ComplexValue, PrimitiveValue};

    #[test]
    fn test_entry_override_wins() {
        let mut entry = ODataEntry::new(Some("NS.Customer"));
        assert_eq!(TypeNameOracle::resolve_entry_type_name(&entry), Some("NS.Customer"));
        entry.serialization_type_name = Some(SerializationTypeName(None));
        assert_eq!(TypeNameOracle::resolve_entry_type_name(&entry), None);
        entry.serialization_type_name = Some(SerializationTypeName(Some("NS.Vip".to_string())));
        assert_eq!(TypeNameOracle::resolve_entry_type_name(&entry), Some("NS.Vip"));
    }

    #[test]
    fn test_declared_type_is_used_for_untyped_values() {
        let value = ODataValue::Complex(ComplexValue::new(None));
        let declared = TypeReference::complex("NS.Address", true);
        let resolved =
            TypeNameOracle::resolve_value_type_name(&value, Some(&declared), None, None).unwrap();
        assert_eq!(resolved.type_name.as_deref(), Some("NS.Address"));
    }

    #[test]
    fn test_item_type_of_the_enclosing_collection_is_suppressed() {
        let validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("Edm.Int32"));
        let value = ODataValue::Primitive(PrimitiveValue::Int32(3));
        let resolved =
            TypeNameOracle::resolve_value_type_name(&value, None, None, Some(&validator)).unwrap();
        assert_eq!(resolved, ResolvedTypeName::default());

        let other = ODataValue::Primitive(PrimitiveValue::Int64(3));
        let resolved =
            TypeNameOracle::resolve_value_type_name(&other, None, None, Some(&validator)).unwrap();
        assert_eq!(resolved.type_name.as_deref(), Some(PrimitiveTypeKind::Int64.full_name()));
    }

    #[test]
    fn test_collection_item_type_is_derived() {
        let value = ODataValue::Collection(CollectionValue::new(Some("Collection(NS.Address)"), vec![]));
        let resolved = TypeNameOracle::resolve_value_type_name(&value, None, None, None).unwrap();
        assert_eq!(resolved.collection_item_type_name.as_deref(), Some("NS.Address"));

        let broken = ODataValue::Collection(CollectionValue::new(Some("NS.Address"), vec![]));
        assert!(matches!(
            TypeNameOracle::resolve_value_type_name(&broken, None, None, None),
            Err(ODataError::Structural(StructuralError::InvalidCollectionTypeName { .. }))
        ));
    }

    #[test]
    fn test_override_replaces_inference() {
        let value = ODataValue::Primitive(PrimitiveValue::String("x".to_string()));
        let hidden = SerializationTypeName(None);
        let resolved =
            TypeNameOracle::resolve_value_type_name(&value, None, Some(&hidden), None).unwrap();
        assert_eq!(resolved.type_name, None);
    }
}
