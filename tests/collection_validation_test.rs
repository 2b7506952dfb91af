use odata_core::error::StructuralError;
use odata_core::model::{CollectionValue, ComplexValue, PrimitiveValue, SerializationTypeName};
use odata_core::model::ODataValue;
use odata_core::{
    CollectionWithoutExpectedTypeValidator, CoreTypeResolver, ODataEntry, ODataError, PrimitiveTypeKind,
    TypeKind, TypeNameOracle, TypeReference,
};

#[test]
fn test_spatial_items_widen_to_common_base() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
    validator
        .validate_collection_item(Some("Edm.GeographyPoint"), TypeKind::Primitive)
        .unwrap();
    assert_eq!(validator.item_type_name(), Some("Edm.GeographyPoint"));
    validator
        .validate_collection_item(Some("Edm.GeographyLineString"), TypeKind::Primitive)
        .unwrap();
    assert_eq!(validator.item_type_name(), Some("Edm.Geography"));
    validator
        .validate_collection_item(Some("Edm.GeographyPoint"), TypeKind::Primitive)
        .unwrap();
    assert!(matches!(
        validator.validate_collection_item(Some("Edm.GeometryPoint"), TypeKind::Primitive),
        Err(ODataError::Structural(StructuralError::IncompatibleItemTypeName { .. }))
    ));
}

#[test]
fn test_non_spatial_primitives_never_widen() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
    validator
        .validate_collection_item(Some("Edm.Int32"), TypeKind::Primitive)
        .unwrap();
    assert!(validator
        .validate_collection_item(Some("Edm.Int64"), TypeKind::Primitive)
        .is_err());
}

#[test]
fn test_kind_mismatch_is_reported_before_names() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("NS.Address"));
    assert!(matches!(
        validator.validate_collection_item(Some("Edm.String"), TypeKind::Primitive),
        Err(ODataError::Structural(StructuralError::IncompatibleItemTypeKind { .. }))
    ));
}

#[test]
fn test_type_name_comparison_is_case_sensitive() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("NS.Address"));
    validator
        .validate_collection_item(Some("NS.Address"), TypeKind::Complex)
        .unwrap();
    assert!(validator
        .validate_collection_item(Some("ns.address"), TypeKind::Complex)
        .is_err());
}

#[test]
fn test_oracle_suppresses_name_repeated_from_collection() {
    let validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, Some("NS.Address"));
    let item = ODataValue::Complex(ComplexValue::new(Some("NS.Address")));
    let resolved = TypeNameOracle::resolve_value_type_name(&item, None, None, Some(&validator)).unwrap();
    assert_eq!(resolved.type_name, None);

    let derived = ODataValue::Complex(ComplexValue::new(Some("NS.HomeAddress")));
    let resolved = TypeNameOracle::resolve_value_type_name(&derived, None, None, Some(&validator)).unwrap();
    assert_eq!(resolved.type_name.as_deref(), Some("NS.HomeAddress"));
}

#[test]
fn test_oracle_keeps_inferred_item_names() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
    validator
        .validate_collection_item(Some("NS.Address"), TypeKind::Complex)
        .unwrap();
    let item = ODataValue::Complex(ComplexValue::new(Some("NS.Address")));
    let resolved = TypeNameOracle::resolve_value_type_name(&item, None, None, Some(&validator)).unwrap();
    assert_eq!(resolved.type_name.as_deref(), Some("NS.Address"));
}

#[test]
fn test_oracle_override_and_collection_item() {
    let tags = ODataValue::Collection(CollectionValue::new(
        Some("Collection(Edm.String)"),
        vec![ODataValue::Primitive(PrimitiveValue::String("a".into()))],
    ));
    let resolved = TypeNameOracle::resolve_value_type_name(&tags, None, None, None).unwrap();
    assert_eq!(resolved.type_name.as_deref(), Some("Collection(Edm.String)"));
    assert_eq!(resolved.collection_item_type_name.as_deref(), Some("Edm.String"));

    let hidden = SerializationTypeName(None);
    let resolved = TypeNameOracle::resolve_value_type_name(&tags, None, Some(&hidden), None).unwrap();
    assert_eq!(resolved.type_name, None);
    assert_eq!(resolved.collection_item_type_name.as_deref(), Some("Edm.String"));
}

#[test]
fn test_oracle_rejects_malformed_collection_names() {
    let declared = TypeReference {
        kind: TypeKind::Collection,
        full_name: "NS.Tags".to_string(),
        nullable: true,
    };
    let tags = ODataValue::Collection(CollectionValue::new(None, Vec::new()));
    assert!(matches!(
        TypeNameOracle::resolve_value_type_name(&tags, Some(&declared), None, None),
        Err(ODataError::Structural(StructuralError::InvalidCollectionTypeName { .. }))
    ));
}

#[test]
fn test_oracle_falls_back_to_declared_type() {
    let declared = TypeReference::primitive(PrimitiveTypeKind::Int64, false);
    let value = ODataValue::Null;
    let resolved = TypeNameOracle::resolve_value_type_name(&value, Some(&declared), None, None).unwrap();
    assert_eq!(resolved.type_name.as_deref(), Some("Edm.Int64"));
}

#[test]
fn test_entry_type_name_override() {
    let mut entry = ODataEntry::new(Some("NS.Customer"));
    entry.serialization_type_name = Some(SerializationTypeName(Some("NS.VipCustomer".to_string())));
    assert_eq!(TypeNameOracle::resolve_entry_type_name(&entry), Some("NS.VipCustomer"));
}

#[test]
fn test_complex_item_after_widened_spatial_items() {
    let mut validator = CollectionWithoutExpectedTypeValidator::new(&CoreTypeResolver, None);
    validator
        .validate_collection_item(Some("Edm.GeographyPoint"), TypeKind::Primitive)
        .unwrap();
    validator
        .validate_collection_item(Some("Edm.GeographyLineString"), TypeKind::Primitive)
        .unwrap();
    assert_eq!(validator.item_type_name(), Some("Edm.Geography"));
    assert!(matches!(
        validator.validate_collection_item(Some("NS.Address"), TypeKind::Complex),
        Err(ODataError::Structural(StructuralError::IncompatibleItemTypeKind { .. }))
    ));
}
