use futures::executor::block_on;
use futures::io::Cursor;
use odata_core::error::{StructuralError, UsageError};
use odata_core::json::BufferingJsonReader;
use odata_core::media_type::Charset;
use odata_core::model::PrimitiveValue;
use odata_core::{
    ODataError, ODataParameterReader, ODataParameterReaderState, ODataValue, ODataVersion, PrimitiveTypeKind,
    ReaderSettings, TypeKind, TypeReference,
};

fn signature() -> Vec<(String, TypeReference)> {
    vec![
        (
            "count".to_string(),
            TypeReference::primitive(PrimitiveTypeKind::Int64, false),
        ),
        (
            "tags".to_string(),
            TypeReference::collection(&TypeReference::primitive(PrimitiveTypeKind::String, true)),
        ),
        ("address".to_string(), TypeReference::complex("NS.Address", true)),
    ]
}

#[test]
fn test_declared_parameters_take_their_declared_types() {
    let payload = r#"{"count":"42","tags":["a","b"],"address":{"City":"Oslo"}}"#;
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(payload),
        &ReaderSettings::request(),
        Some(signature()),
    );

    assert!(reader.read().unwrap());
    assert_eq!(reader.value(), Some(&ODataValue::Primitive(PrimitiveValue::Int64(42))));

    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Collection);
    assert_eq!(reader.name(), Some("tags"));
    let mut tags = Vec::new();
    {
        let mut items = reader.create_collection_reader().unwrap();
        assert_eq!(items.item_type_name(), Some("Edm.String"));
        while items.read().unwrap() {
            if let Some(item) = items.item() {
                tags.push(item.clone());
            }
        }
    }
    assert_eq!(tags.len(), 2);

    assert!(reader.read().unwrap());
    assert_eq!(reader.name(), Some("address"));
    let Some(ODataValue::Complex(address)) = reader.value() else {
        panic!("expected a complex parameter");
    };
    assert_eq!(address.type_name.as_deref(), Some("NS.Address"));

    assert!(!reader.read().unwrap());
    assert!(matches!(
        reader.read(),
        Err(ODataError::Usage(UsageError::InvalidTransition { .. }))
    ));
}

#[test]
fn test_null_for_non_nullable_parameter() {
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"count":null}"#),
        &ReaderSettings::request(),
        Some(signature()),
    );
    assert!(matches!(
        reader.read(),
        Err(ODataError::Structural(StructuralError::NullValueForNonNullableType { .. }))
    ));
    assert_eq!(reader.state(), ODataParameterReaderState::Exception);
}

#[test]
fn test_null_collection_parameter_is_a_value() {
    let signature = vec![(
        "tags".to_string(),
        TypeReference {
            kind: TypeKind::Collection,
            full_name: "Collection(Edm.String)".to_string(),
            nullable: true,
        },
    )];
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"tags":null}"#),
        &ReaderSettings::request(),
        Some(signature),
    );
    assert!(reader.read().unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Value);
    assert_eq!(reader.value(), Some(&ODataValue::Null));
}

#[test]
fn test_entity_parameters_are_not_supported() {
    let signature = vec![("customer".to_string(), TypeReference::entity("NS.Customer"))];
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"customer":{}}"#),
        &ReaderSettings::request(),
        Some(signature),
    );
    assert!(matches!(
        reader.read(),
        Err(ODataError::Structural(StructuralError::UnsupportedParameterType { .. }))
    ));
}

#[test]
fn test_collection_parameters_need_version_3() {
    let settings = ReaderSettings {
        version: ODataVersion::V2,
        format: odata_core::PayloadFormat::VerboseJson,
        ..ReaderSettings::request()
    };
    let mut reader = ODataParameterReader::new(BufferingJsonReader::new(r#"{"ids":[1]}"#), &settings, None);
    assert!(matches!(
        reader.read(),
        Err(ODataError::Structural(StructuralError::VersionNotSupported { .. }))
    ));
}

#[test]
fn test_annotations_between_parameters_are_skipped() {
    let payload = r#"{"odata.metadata":"http://h/$metadata","a":1,"a@ns.note":"x","b":2}"#;
    let mut reader = ODataParameterReader::new(BufferingJsonReader::new(payload), &ReaderSettings::request(), None);
    let mut names = Vec::new();
    while reader.read().unwrap() {
        names.push(reader.name().unwrap_or_default().to_string());
    }
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_duplicate_collection_parameter() {
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"ids":[1],"ids":[2]}"#),
        &ReaderSettings::request(),
        None,
    );
    assert!(reader.read().unwrap());
    {
        let mut items = reader.create_collection_reader().unwrap();
        while items.read().unwrap() {}
    }
    assert!(matches!(
        reader.read(),
        Err(ODataError::Structural(StructuralError::DuplicatePropertyNamesNotAllowed { .. }))
    ));
}

#[test]
fn test_async_parameters() {
    let source = BufferingJsonReader::from_async_read(Cursor::new(br#"{"x":true}"#.to_vec()), Charset::Utf8);
    let mut reader = ODataParameterReader::new(source, &ReaderSettings::request(), None);
    assert!(block_on(reader.read_async()).unwrap());
    assert_eq!(reader.value(), Some(&ODataValue::Primitive(PrimitiveValue::Boolean(true))));
    assert!(!block_on(reader.read_async()).unwrap());
    assert_eq!(reader.state(), ODataParameterReaderState::Completed);
}

#[test]
fn test_collection_declared_in_signature_must_be_an_array() {
    let signature = vec![(
        "tags".to_string(),
        TypeReference {
            kind: TypeKind::Collection,
            full_name: "Collection(Edm.String)".to_string(),
            nullable: true,
        },
    )];
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"tags":"a"}"#),
        &ReaderSettings::request(),
        Some(signature),
    );
    assert!(matches!(reader.read(), Err(ODataError::Json(_))));
}

#[test]
fn test_nesting_depth_applies_to_parameters() {
    let settings = ReaderSettings {
        max_nesting_depth: 2,
        ..ReaderSettings::request()
    };
    let mut reader = ODataParameterReader::new(
        BufferingJsonReader::new(r#"{"address":{"geo":{"lat":1}}}"#),
        &settings,
        None,
    );
    assert!(matches!(
        reader.read(),
        Err(ODataError::Json(odata_core::error::JsonReaderError::MaxDepthExceeded { .. }))
    ));
}
