use odata_core::error::{InternalError, StructuralError};
use odata_core::model::{
    CollectionValue, ODataAssociationLink, ODataNavigationLink, ODataProperty, ODataValue, PrimitiveValue,
    StreamReferenceValue,
};
use odata_core::{DuplicatePropertyNamesChecker, ODataError};

fn simple(name: &str) -> ODataProperty {
    ODataProperty::new(name, ODataValue::Primitive(PrimitiveValue::Int32(1)))
}

fn is_duplicate(result: Result<impl std::fmt::Debug, ODataError>) -> bool {
    matches!(
        result,
        Err(ODataError::Structural(StructuralError::DuplicatePropertyNamesNotAllowed { .. }))
    )
}

#[test]
fn test_simple_property_twice_depends_on_setting() {
    let mut strict = DuplicatePropertyNamesChecker::new(false, true);
    strict.check_for_duplicate_property_names(&simple("Name")).unwrap();
    assert!(is_duplicate(strict.check_for_duplicate_property_names(&simple("Name"))));

    let mut lenient = DuplicatePropertyNamesChecker::new(true, true);
    lenient.check_for_duplicate_property_names(&simple("Name")).unwrap();
    lenient.check_for_duplicate_property_names(&simple("Name")).unwrap();
}

#[test]
fn test_collections_and_streams_are_never_repeated() {
    let collection = ODataProperty::new("Tags", ODataValue::Collection(CollectionValue::default()));
    let stream = ODataProperty::new("Photo", ODataValue::StreamReference(StreamReferenceValue::default()));
    let mut checker = DuplicatePropertyNamesChecker::new(true, false);
    checker.check_for_duplicate_property_names(&collection).unwrap();
    assert!(is_duplicate(checker.check_for_duplicate_property_names(&collection)));
    checker.check_for_duplicate_property_names(&stream).unwrap();
    assert!(is_duplicate(checker.check_for_duplicate_property_names(&simple("Photo"))));
}

#[test]
fn test_clear_makes_names_available_again() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, true);
    checker.check_for_duplicate_property_names(&simple("A")).unwrap();
    checker.mark_property_as_processed("odata.type").unwrap();
    checker.clear();
    checker.clear();
    checker.check_for_duplicate_property_names(&simple("A")).unwrap();
    checker.mark_property_as_processed("odata.type").unwrap();
    assert_eq!(checker.get_all_unprocessed_properties(), vec!["A"]);
}

#[test]
fn test_annotations_before_property_are_collected() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, true);
    checker
        .add_odata_property_annotation("Price", "odata.type", serde_json::json!("Edm.Decimal"))
        .unwrap();
    checker.add_custom_property_annotation("Price", "ns.unit").unwrap();
    assert_eq!(checker.get_all_unprocessed_properties(), vec!["Price"]);
    let annotations = checker.odata_property_annotations("Price").unwrap();
    assert_eq!(annotations.get("odata.type"), Some(&serde_json::json!("Edm.Decimal")));

    checker.mark_property_as_processed("Price").unwrap();
    checker.check_for_duplicate_property_names(&simple("Price")).unwrap();
    assert!(checker.odata_property_annotations("Price").is_none());
    assert!(matches!(
        checker.add_custom_property_annotation("Price", "ns.other"),
        Err(ODataError::Structural(StructuralError::PropertyAnnotationAfterTheProperty { .. }))
    ));
}

#[test]
fn test_repeated_custom_annotation() {
    let mut checker = DuplicatePropertyNamesChecker::new(true, true);
    checker.add_custom_property_annotation("Price", "ns.unit").unwrap();
    assert!(matches!(
        checker.add_custom_property_annotation("Price", "ns.unit"),
        Err(ODataError::Structural(
            StructuralError::DuplicateAnnotationForPropertyNotAllowed { .. }
        ))
    ));
}

#[test]
fn test_instance_annotation_processed_twice() {
    let mut checker = DuplicatePropertyNamesChecker::new(true, true);
    checker.mark_property_as_processed("odata.id").unwrap();
    assert!(matches!(
        checker.mark_property_as_processed("odata.id"),
        Err(ODataError::Structural(StructuralError::DuplicateAnnotationNotAllowed { .. }))
    ));
}

#[test]
fn test_deferred_and_expanded_collection_link_in_request() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, false);
    let link = ODataNavigationLink::new("Orders");
    checker
        .check_for_duplicate_navigation_link_names(&link, false, None)
        .unwrap();
    checker
        .check_for_duplicate_property_names_on_navigation_link_start(&link)
        .unwrap();
    checker
        .check_for_duplicate_navigation_link_names(&link, true, Some(true))
        .unwrap();
}

#[test]
fn test_second_singleton_link_in_request() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, false);
    let link = ODataNavigationLink::new("Manager");
    checker
        .check_for_duplicate_navigation_link_names(&link, true, Some(false))
        .unwrap();
    assert!(matches!(
        checker.check_for_duplicate_navigation_link_names(&link, false, None),
        Err(ODataError::Structural(StructuralError::MultipleLinksForSingleton { .. }))
    ));
}

#[test]
fn test_second_link_in_response() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, true);
    let link = ODataNavigationLink::new("Orders");
    checker
        .check_for_duplicate_navigation_link_names(&link, false, Some(true))
        .unwrap();
    assert!(is_duplicate(
        checker.check_for_duplicate_property_names_on_navigation_link_start(&link)
    ));
}

#[test]
fn test_navigation_and_association_link_merge_both_ways() {
    let navigation = ODataNavigationLink::new("Orders").with_url("http://h/Orders");
    let association = ODataAssociationLink::new("Orders", Some("http://h/$links/Orders"));

    let mut first = DuplicatePropertyNamesChecker::new(false, true);
    assert_eq!(
        first
            .check_for_duplicate_navigation_link_names(&navigation, false, None)
            .unwrap(),
        None
    );
    assert_eq!(
        first.check_for_duplicate_association_link_names(&association).unwrap(),
        Some(navigation.clone())
    );

    let mut second = DuplicatePropertyNamesChecker::new(false, true);
    assert_eq!(
        second.check_for_duplicate_association_link_names(&association).unwrap(),
        None
    );
    assert_eq!(
        second
            .check_for_duplicate_navigation_link_names(&navigation, true, Some(true))
            .unwrap(),
        Some(association.clone())
    );
    assert!(is_duplicate(second.check_for_duplicate_association_link_names(&association)));
}

#[test]
fn test_unfinished_navigation_link_start() {
    let mut checker = DuplicatePropertyNamesChecker::new(false, true);
    checker
        .check_for_duplicate_property_names_on_navigation_link_start(&ODataNavigationLink::new("Orders"))
        .unwrap();
    assert!(matches!(
        checker.check_for_duplicate_property_names(&simple("Name")),
        Err(ODataError::Internal(InternalError::NavigationLinkMismatch { .. }))
    ));
}

fn outcomes(checker: &mut DuplicatePropertyNamesChecker) -> Vec<bool> {
    let orders = ODataNavigationLink::new("Orders");
    let manager = ODataNavigationLink::new("Manager");
    let photo = ODataProperty::new("Photo", ODataValue::StreamReference(StreamReferenceValue::default()));
    vec![
        checker.check_for_duplicate_property_names(&simple("A")).is_ok(),
        checker.check_for_duplicate_property_names(&simple("A")).is_ok(),
        checker.check_for_duplicate_property_names(&photo).is_ok(),
        checker.check_for_duplicate_property_names(&simple("Photo")).is_ok(),
        checker.add_custom_property_annotation("B", "ns.note").is_ok(),
        checker.mark_property_as_processed("B").is_ok(),
        checker.add_custom_property_annotation("B", "ns.other").is_ok(),
        checker
            .check_for_duplicate_navigation_link_names(&orders, false, None)
            .is_ok(),
        checker
            .check_for_duplicate_association_link_names(&ODataAssociationLink::new("Orders", None))
            .is_ok(),
        checker
            .check_for_duplicate_navigation_link_names(&manager, true, Some(false))
            .is_ok(),
        checker
            .check_for_duplicate_navigation_link_names(&manager, false, None)
            .is_ok(),
    ]
}

#[test]
fn test_cleared_checker_behaves_like_a_fresh_one() {
    for (allow, response) in [(false, true), (true, false), (false, false)] {
        let mut fresh = DuplicatePropertyNamesChecker::new(allow, response);
        let expected = outcomes(&mut fresh);

        let mut reused = DuplicatePropertyNamesChecker::new(allow, response);
        let _ = outcomes(&mut reused);
        reused.clear();
        assert_eq!(outcomes(&mut reused), expected);
        assert_eq!(
            reused.get_all_unprocessed_properties(),
            fresh.get_all_unprocessed_properties()
        );
    }
}

#[test]
fn test_association_link_first_then_deferred_navigation_link() {
    let association = ODataAssociationLink::new("Orders", Some("http://h/$links/Orders"));
    let mut checker = DuplicatePropertyNamesChecker::new(false, true);
    assert_eq!(
        checker.check_for_duplicate_association_link_names(&association).unwrap(),
        None
    );
    assert_eq!(
        checker
            .check_for_duplicate_navigation_link_names(&ODataNavigationLink::new("Orders"), false, None)
            .unwrap(),
        Some(association)
    );
}

#[test]
fn test_two_deferred_singleton_links_with_duplicates_allowed() {
    let mut checker = DuplicatePropertyNamesChecker::new(true, false);
    let manager = ODataNavigationLink::new("Manager").with_is_collection(false);
    assert_eq!(
        checker
            .check_for_duplicate_navigation_link_names(&manager, false, Some(false))
            .unwrap(),
        None
    );
    assert_eq!(
        checker
            .check_for_duplicate_navigation_link_names(&manager, false, Some(false))
            .unwrap(),
        None
    );
}
