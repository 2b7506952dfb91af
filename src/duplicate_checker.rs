//! Duplicate name detection within one entry or complex value scope.

use crate::error::{InternalError, ODataError, StructuralError};
use crate::json::TokenSource;
use crate::model::{ODataAssociationLink, ODataNavigationLink, ODataProperty, ODataValue, RawAnnotation};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DuplicationKind {
    /// Only annotations were seen for the name so far.
    PropertyAnnotationSeen,
    /// No further property with the name is ever accepted.
    Prohibited,
    /// Duplicates are accepted when the settings allow them.
    PotentiallyAllowed,
    NavigationProperty,
}

#[derive(Debug, Clone, PartialEq)]
enum AnnotationSlot {
    Open(HashMap<String, serde_json::Value>),
    Processed,
}

#[derive(Debug, Clone)]
struct DuplicationRecord {
    kind: DuplicationKind,
    navigation_link: Option<ODataNavigationLink>,
    association_link: Option<ODataAssociationLink>,
    is_collection: Option<bool>,
    odata_annotations: AnnotationSlot,
    custom_annotations: HashSet<String>,
}

impl DuplicationRecord {
    fn new(kind: DuplicationKind) -> Self {
        Self {
            kind,
            navigation_link: None,
            association_link: None,
            is_collection: None,
            odata_annotations: AnnotationSlot::Open(HashMap::new()),
            custom_annotations: HashSet::new(),
        }
    }
}

/// Tracks every name seen within one structural scope and decides which
/// repeats are legal.
///
/// One checker serves one scope at a time. Call [`clear`](Self::clear) to
/// reuse it for a sibling scope.
#[derive(Debug, Clone)]
pub struct DuplicatePropertyNamesChecker {
    allow_duplicate_properties: bool,
    is_response: bool,
    names: HashMap<String, usize>,
    records: Vec<(String, DuplicationRecord)>,
    navigation_link_start: Option<String>,
    annotation_collector: PropertyAnnotationCollector,
}

impl DuplicatePropertyNamesChecker {
    #[must_use]
    pub fn new(allow_duplicate_properties: bool, is_response: bool) -> Self {
        Self {
            allow_duplicate_properties,
            is_response,
            names: HashMap::new(),
            records: Vec::new(),
            navigation_link_start: None,
            annotation_collector: PropertyAnnotationCollector::default(),
        }
    }

    #[must_use]
    pub fn with_raw_annotation_capture(mut self, enabled: bool) -> Self {
        self.annotation_collector.set_should_collect(enabled);
        self
    }

    #[must_use]
    pub fn allow_duplicate_properties(&self) -> bool {
        self.allow_duplicate_properties
    }

    #[must_use]
    pub fn is_response(&self) -> bool {
        self.is_response
    }

    pub fn annotation_collector(&mut self) -> &mut PropertyAnnotationCollector {
        &mut self.annotation_collector
    }

    pub fn check_for_duplicate_property_names(&mut self, property: &ODataProperty) -> Result<(), ODataError> {
        let name = property.name.as_str();
        self.verify_no_pending_navigation_link(name)?;
        let kind = if matches!(
            property.value,
            ODataValue::StreamReference(_) | ODataValue::Collection(_)
        ) {
            DuplicationKind::Prohibited
        } else {
            DuplicationKind::PotentiallyAllowed
        };

        let Some(index) = self.names.get(name).copied() else {
            self.insert(name, DuplicationRecord::new(kind));
            return Ok(());
        };
        let allow = self.allow_duplicate_properties;
        let record = &mut self.records[index].1;
        if record.kind == DuplicationKind::PropertyAnnotationSeen {
            record.kind = kind;
            return Ok(());
        }
        if record.kind == DuplicationKind::Prohibited
            || kind == DuplicationKind::Prohibited
            || (record.kind == DuplicationKind::NavigationProperty && record.association_link.is_some())
            || !allow
        {
            return Err(duplicate_property(name));
        }
        Ok(())
    }

    /// Lookahead check made before it is known whether the link is expanded.
    /// Nothing is recorded except the pending link, which must be finished by
    /// [`check_for_duplicate_navigation_link_names`](Self::check_for_duplicate_navigation_link_names)
    /// before any other name is checked.
    pub fn check_for_duplicate_property_names_on_navigation_link_start(
        &mut self,
        link: &ODataNavigationLink,
    ) -> Result<(), ODataError> {
        self.verify_no_pending_navigation_link(&link.name)?;
        if let Some(&index) = self.names.get(&link.name) {
            self.check_existing_record_for_navigation_link(&link.name, &self.records[index].1)?;
        }
        self.navigation_link_start = Some(link.name.clone());
        Ok(())
    }

    /// Records a navigation link. Returns the association link already
    /// recorded for the same name, if any.
    pub fn check_for_duplicate_navigation_link_names(
        &mut self,
        link: &ODataNavigationLink,
        is_expanded: bool,
        is_collection: Option<bool>,
    ) -> Result<Option<ODataAssociationLink>, ODataError> {
        self.verify_no_pending_navigation_link(&link.name)?;
        self.navigation_link_start = None;

        // A deferred link is only trusted when it says it is a collection.
        let effective_is_collection = if is_expanded {
            is_collection
        } else if is_collection == Some(true) {
            Some(true)
        } else {
            None
        };

        let Some(index) = self.names.get(&link.name).copied() else {
            let mut record = DuplicationRecord::new(DuplicationKind::NavigationProperty);
            record.navigation_link = Some(link.clone());
            record.is_collection = effective_is_collection;
            self.insert(&link.name, record);
            return Ok(None);
        };

        self.check_existing_record_for_navigation_link(&link.name, &self.records[index].1)?;
        let allow = self.allow_duplicate_properties;
        let record = &mut self.records[index].1;
        let association_only = record.kind == DuplicationKind::NavigationProperty
            && record.association_link.is_some()
            && record.navigation_link.is_none();

        if record.kind == DuplicationKind::PropertyAnnotationSeen || association_only || allow {
            record.kind = DuplicationKind::NavigationProperty;
            record.navigation_link = Some(link.clone());
            record.is_collection = effective_is_collection;
        } else {
            // Second link in a request: legal only for a collection that is
            // bound with a deferred link next to an expanded one.
            if effective_is_collection == Some(false) || record.is_collection == Some(false) {
                log::debug!("second link for singleton navigation property '{}'", link.name);
                return Err(StructuralError::MultipleLinksForSingleton {
                    property_name: link.name.clone(),
                }
                .into());
            }
            if effective_is_collection.is_some() {
                record.is_collection = effective_is_collection;
            }
        }
        Ok(record.association_link.clone())
    }

    /// Records an association link. Returns the navigation link already
    /// recorded for the same name, if any.
    pub fn check_for_duplicate_association_link_names(
        &mut self,
        link: &ODataAssociationLink,
    ) -> Result<Option<ODataNavigationLink>, ODataError> {
        self.verify_no_pending_navigation_link(&link.name)?;
        let Some(index) = self.names.get(&link.name).copied() else {
            let mut record = DuplicationRecord::new(DuplicationKind::NavigationProperty);
            record.association_link = Some(link.clone());
            self.insert(&link.name, record);
            return Ok(None);
        };
        let record = &mut self.records[index].1;
        let mergeable = record.kind == DuplicationKind::PropertyAnnotationSeen
            || (record.kind == DuplicationKind::NavigationProperty && record.association_link.is_none());
        if !mergeable {
            return Err(duplicate_property(&link.name));
        }
        record.kind = DuplicationKind::NavigationProperty;
        record.association_link = Some(link.clone());
        Ok(record.navigation_link.clone())
    }

    /// Attaches a reserved `odata.*` annotation to `property_name`.
    pub fn add_odata_property_annotation(
        &mut self,
        property_name: &str,
        annotation_name: &str,
        value: serde_json::Value,
    ) -> Result<(), ODataError> {
        let record = self.record_for_annotation(property_name, annotation_name)?;
        let AnnotationSlot::Open(annotations) = &mut record.odata_annotations else {
            return Err(annotation_after_property(property_name, annotation_name));
        };
        if annotations.contains_key(annotation_name) {
            log::debug!("duplicate annotation '{annotation_name}' for '{property_name}'");
            let annotation_name = annotation_name.to_string();
            return Err(if property_name.is_empty() {
                StructuralError::DuplicateAnnotationNotAllowed { annotation_name }
            } else if is_annotation_name(property_name) {
                StructuralError::DuplicateAnnotationForInstanceAnnotationNotAllowed {
                    annotation_name,
                    property_name: property_name.to_string(),
                }
            } else {
                StructuralError::DuplicateAnnotationForPropertyNotAllowed {
                    annotation_name,
                    property_name: property_name.to_string(),
                }
            }
            .into());
        }
        annotations.insert(annotation_name.to_string(), value);
        Ok(())
    }

    pub fn add_custom_property_annotation(
        &mut self,
        property_name: &str,
        annotation_name: &str,
    ) -> Result<(), ODataError> {
        let record = self.record_for_annotation(property_name, annotation_name)?;
        if !record.custom_annotations.insert(annotation_name.to_string()) {
            log::debug!("duplicate custom annotation '{annotation_name}' for '{property_name}'");
            return Err(StructuralError::DuplicateAnnotationForPropertyNotAllowed {
                annotation_name: annotation_name.to_string(),
                property_name: property_name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// The reserved annotations collected for `property_name`, unless the
    /// property was already processed.
    #[must_use]
    pub fn odata_property_annotations(
        &self,
        property_name: &str,
    ) -> Option<&HashMap<String, serde_json::Value>> {
        let index = *self.names.get(property_name)?;
        match &self.records[index].1.odata_annotations {
            AnnotationSlot::Open(annotations) => Some(annotations),
            AnnotationSlot::Processed => None,
        }
    }

    /// Freezes the annotations of `property_name`. Any later annotation for
    /// the name fails.
    pub fn mark_property_as_processed(&mut self, property_name: &str) -> Result<(), ODataError> {
        let index = match self.names.get(property_name).copied() {
            Some(index) => index,
            None => self.insert(
                property_name,
                DuplicationRecord::new(DuplicationKind::PropertyAnnotationSeen),
            ),
        };
        let allow = self.allow_duplicate_properties;
        let record = &mut self.records[index].1;
        if record.odata_annotations == AnnotationSlot::Processed {
            if is_annotation_name(property_name) {
                return Err(StructuralError::DuplicateAnnotationNotAllowed {
                    annotation_name: property_name.to_string(),
                }
                .into());
            }
            if allow {
                return Ok(());
            }
            return Err(duplicate_property(property_name));
        }
        record.odata_annotations = AnnotationSlot::Processed;
        Ok(())
    }

    /// Every non-empty name whose annotations were never claimed by a property.
    #[must_use]
    pub fn get_all_unprocessed_properties(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|(name, record)| {
                !name.is_empty() && record.odata_annotations != AnnotationSlot::Processed
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Forgets every name so the checker can serve a sibling scope.
    pub fn clear(&mut self) {
        self.names.clear();
        self.records.clear();
        self.navigation_link_start = None;
        self.annotation_collector.clear();
    }

    fn insert(&mut self, name: &str, record: DuplicationRecord) -> usize {
        let index = self.records.len();
        self.records.push((name.to_string(), record));
        self.names.insert(name.to_string(), index);
        index
    }

    fn record_for_annotation(
        &mut self,
        property_name: &str,
        annotation_name: &str,
    ) -> Result<&mut DuplicationRecord, ODataError> {
        let index = match self.names.get(property_name).copied() {
            Some(index) => index,
            None => self.insert(
                property_name,
                DuplicationRecord::new(DuplicationKind::PropertyAnnotationSeen),
            ),
        };
        let record = &mut self.records[index].1;
        if record.odata_annotations == AnnotationSlot::Processed {
            return Err(annotation_after_property(property_name, annotation_name));
        }
        Ok(record)
    }

    fn check_existing_record_for_navigation_link(
        &self,
        name: &str,
        record: &DuplicationRecord,
    ) -> Result<(), ODataError> {
        let association_only = record.kind == DuplicationKind::NavigationProperty
            && record.association_link.is_some()
            && record.navigation_link.is_none();
        if association_only || record.kind == DuplicationKind::PropertyAnnotationSeen {
            return Ok(());
        }
        let allow = self.allow_duplicate_properties;
        if record.kind == DuplicationKind::Prohibited
            || (record.kind == DuplicationKind::PotentiallyAllowed && !allow)
            || (record.kind == DuplicationKind::NavigationProperty && self.is_response && !allow)
        {
            return Err(duplicate_property(name));
        }
        Ok(())
    }

    fn verify_no_pending_navigation_link(&self, name: &str) -> Result<(), ODataError> {
        match &self.navigation_link_start {
            Some(started) if started != name => Err(InternalError::NavigationLinkMismatch {
                started: started.clone(),
                finished: name.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

/// Names like `odata.type` or `ns.term` denote annotations rather than properties.
fn is_annotation_name(name: &str) -> bool {
    name.contains('.')
}

fn duplicate_property(name: &str) -> ODataError {
    log::debug!("duplicate property '{name}' rejected");
    StructuralError::DuplicatePropertyNamesNotAllowed {
        property_name: name.to_string(),
    }
    .into()
}

fn annotation_after_property(property_name: &str, annotation_name: &str) -> ODataError {
    log::debug!("annotation '{annotation_name}' arrived after property '{property_name}'");
    StructuralError::PropertyAnnotationAfterTheProperty {
        annotation_name: annotation_name.to_string(),
        property_name: property_name.to_string(),
    }
    .into()
}

/// Optional capture of the raw JSON text of annotations.
///
/// Capture is skipped while the token source is buffering, so lookahead
/// passes never record anything.
#[derive(Debug, Clone, Default)]
pub struct PropertyAnnotationCollector {
    should_collect: bool,
    annotations: Vec<RawAnnotation>,
}

impl PropertyAnnotationCollector {
    #[must_use]
    pub fn should_collect(&self) -> bool {
        self.should_collect
    }

    pub fn set_should_collect(&mut self, should_collect: bool) {
        self.should_collect = should_collect;
    }

    /// Peeks the value at the current node and stores its raw text under
    /// (`property_name`, `annotation_name`). The source is left where it was.
    pub fn try_peek_and_collect_annotation_raw_json<S: TokenSource>(
        &mut self,
        source: &mut S,
        property_name: &str,
        annotation_name: &str,
    ) -> Result<(), ODataError> {
        if !self.should_collect || source.is_buffering() {
            return Ok(());
        }
        let raw_json = source.with_buffering(|s| s.read_raw_value())?;
        match self
            .annotations
            .iter_mut()
            .find(|a| a.property_name == property_name && a.annotation_name == annotation_name)
        {
            Some(existing) => existing.raw_json = raw_json,
            None => self.annotations.push(RawAnnotation {
                property_name: property_name.to_string(),
                annotation_name: annotation_name.to_string(),
                raw_json,
            }),
        }
        Ok(())
    }

    #[must_use]
    pub fn annotations(&self) -> &[RawAnnotation] {
        &self.annotations
    }

    pub fn take_annotations(&mut self) -> Vec<RawAnnotation> {
        std::mem::take(&mut self.annotations)
    }

    fn clear(&mut self) {
        self.annotations.clear();
    }
}
