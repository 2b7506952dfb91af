//! Push writer for JSON Light entries, feeds and navigation links.

use crate::deserializer::{
    ASSOCIATION_LINK_URL, NAVIGATION_LINK_URL, ODATA_EDIT_LINK, ODATA_ETAG, ODATA_ID, ODATA_READ_LINK,
    ODATA_TYPE, VALUE,
};
use crate::duplicate_checker::DuplicatePropertyNamesChecker;
use crate::edm::{CoreTypeResolver, TypeResolver};
use crate::error::{InternalError, ODataError, UsageError};
use crate::json::JsonWriter;
use crate::model::{NavigationContent, ODataEntry, ODataNavigationLink};
use crate::serializer::JsonSerializer;
use crate::settings::{ODataVersion, PayloadFormat, WriterSettings};
use crate::type_name_oracle::TypeNameOracle;
use futures::io::AsyncWrite;
use std::fmt;
use std::io::Write;

const COMPONENT: &str = "entry writer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataEntryWriterState {
    Start,
    Entry,
    Feed,
    NavigationLink,
    NavigationLinkWithContent,
    Completed,
    Error,
}

impl fmt::Display for ODataEntryWriterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ODataEntryWriterState::Start => "Start",
            ODataEntryWriterState::Entry => "Entry",
            ODataEntryWriterState::Feed => "Feed",
            ODataEntryWriterState::NavigationLink => "NavigationLink",
            ODataEntryWriterState::NavigationLinkWithContent => "NavigationLinkWithContent",
            ODataEntryWriterState::Completed => "Completed",
            ODataEntryWriterState::Error => "Error",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug)]
enum Scope {
    Entry(DuplicatePropertyNamesChecker),
    Feed { top_level: bool },
    /// `content` is `Some(is_feed)` once expanded content was started.
    NavigationLink {
        link: ODataNavigationLink,
        content: Option<bool>,
    },
}

/// Writes an entry or a feed as a sequence of start and end calls.
///
/// Every `write_start_*` is closed by one [`write_end`](Self::write_end).
/// Navigation links are only legal directly inside an entry; their expanded
/// content is an entry, a feed or `null`.
pub struct ODataEntryWriter<'a> {
    serializer: JsonSerializer<'a>,
    writer: JsonWriter,
    scopes: Vec<Scope>,
    started: bool,
    failed: bool,
}

impl ODataEntryWriter<'static> {
    pub fn new(settings: &WriterSettings) -> Self {
        Self::with_resolver(settings, &CoreTypeResolver)
    }
}

impl<'a> ODataEntryWriter<'a> {
    pub fn with_resolver(settings: &WriterSettings, resolver: &'a dyn TypeResolver) -> Self {
        Self {
            serializer: JsonSerializer::new(settings.clone(), resolver),
            writer: JsonWriter::new(),
            scopes: Vec::new(),
            started: false,
            failed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ODataEntryWriterState {
        if self.failed {
            return ODataEntryWriterState::Error;
        }
        match self.scopes.last() {
            None if self.started => ODataEntryWriterState::Completed,
            None => ODataEntryWriterState::Start,
            Some(Scope::Entry(_)) => ODataEntryWriterState::Entry,
            Some(Scope::Feed { .. }) => ODataEntryWriterState::Feed,
            Some(Scope::NavigationLink { content: None, .. }) => ODataEntryWriterState::NavigationLink,
            Some(Scope::NavigationLink { content: Some(_), .. }) => {
                ODataEntryWriterState::NavigationLinkWithContent
            }
        }
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.serializer.settings().content_type()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        self.writer.as_str()
    }

    /// Starts an entry and writes its metadata, properties and association
    /// links. Its navigation links follow with
    /// [`write_start_navigation_link`](Self::write_start_navigation_link).
    pub fn write_start_entry(&mut self, entry: &ODataEntry) -> Result<(), ODataError> {
        use ODataEntryWriterState::*;
        self.transition("write_start_entry", &[Start, Feed, NavigationLink], |this, from| {
            if from == NavigationLink {
                this.start_expanded_content(false)?;
            }
            let checker = this.write_entry_body(entry)?;
            this.scopes.push(Scope::Entry(checker));
            Ok(())
        })
    }

    /// Writes `null` as the expanded content of a singleton navigation link.
    pub fn write_null_entry(&mut self) -> Result<(), ODataError> {
        self.transition("write_null_entry", &[ODataEntryWriterState::NavigationLink], |this, _| {
            this.start_expanded_content(false)?;
            this.writer.null();
            Ok(())
        })
    }

    pub fn write_start_feed(&mut self) -> Result<(), ODataError> {
        use ODataEntryWriterState::*;
        self.transition("write_start_feed", &[Start, NavigationLink], |this, from| {
            let top_level = from == Start;
            if top_level {
                this.writer.start_object();
                this.writer.name(VALUE);
            } else {
                this.start_expanded_content(true)?;
            }
            this.writer.start_array();
            this.scopes.push(Scope::Feed { top_level });
            Ok(())
        })
    }

    pub fn write_start_navigation_link(&mut self, link: &ODataNavigationLink) -> Result<(), ODataError> {
        self.transition("write_start_navigation_link", &[ODataEntryWriterState::Entry], |this, _| {
            this.entry_checker(0)?
                .check_for_duplicate_property_names_on_navigation_link_start(link)?;
            this.scopes.push(Scope::NavigationLink {
                link: link.clone(),
                content: None,
            });
            Ok(())
        })
    }

    /// Closes the innermost open entry, feed or navigation link.
    pub fn write_end(&mut self) -> Result<(), ODataError> {
        use ODataEntryWriterState::*;
        self.transition(
            "write_end",
            &[Entry, Feed, NavigationLink, NavigationLinkWithContent],
            |this, _| {
                match this.scopes.last() {
                    Some(Scope::NavigationLink { link, content }) => {
                        let (link, content) = (link.clone(), *content);
                        this.finish_navigation_link(&link, content)?;
                    }
                    Some(Scope::Entry(_)) => this.writer.end_object(),
                    Some(Scope::Feed { top_level }) => {
                        let top_level = *top_level;
                        this.writer.end_array();
                        if top_level {
                            this.writer.end_object();
                        }
                    }
                    None => {}
                }
                this.scopes.pop();
                Ok(())
            },
        )
    }

    /// Writes `entry` with all its navigation properties.
    pub fn write_entry(&mut self, entry: &ODataEntry) -> Result<(), ODataError> {
        self.write_start_entry(entry)?;
        for navigation in &entry.navigation_properties {
            self.write_start_navigation_link(&navigation.link)?;
            match &navigation.content {
                NavigationContent::Deferred => {}
                NavigationContent::Null => self.write_null_entry()?,
                NavigationContent::Entry(expanded) => self.write_entry(expanded)?,
                NavigationContent::Feed(entries) => {
                    self.write_start_feed()?;
                    for expanded in entries {
                        self.write_entry(expanded)?;
                    }
                    self.write_end()?;
                }
            }
            self.write_end()?;
        }
        self.write_end()
    }

    pub fn flush<W: Write>(&mut self, output: &mut W) -> Result<(), ODataError> {
        self.writer.flush_to(output)
    }

    pub async fn flush_async<W>(&mut self, output: &mut W) -> Result<(), ODataError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.writer.flush_to_async(output).await
    }

    fn transition<F>(
        &mut self,
        operation: &'static str,
        allowed: &[ODataEntryWriterState],
        f: F,
    ) -> Result<(), ODataError>
    where
        F: FnOnce(&mut Self, ODataEntryWriterState) -> Result<(), ODataError>,
    {
        let state = self.state();
        if state == ODataEntryWriterState::Error {
            return Err(UsageError::ErrorState { component: COMPONENT }.into());
        }
        if !allowed.contains(&state) {
            return Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: state.to_string(),
                operation,
            }
            .into());
        }
        if state == ODataEntryWriterState::Start {
            if let Err(err) = self
                .serializer
                .ensure_format_supported(COMPONENT, &[PayloadFormat::JsonLight])
            {
                self.failed = true;
                return Err(err);
            }
        }
        self.started = true;
        match f(self, state) {
            Ok(()) => {
                log::trace!("{COMPONENT} moved from {state} to {}", self.state());
                Ok(())
            }
            Err(err) => {
                log::debug!("{COMPONENT} failed in '{operation}': {err}");
                self.failed = true;
                Err(err)
            }
        }
    }

    /// The checker of the entry `depth` scopes below the innermost one.
    fn entry_checker(&mut self, depth: usize) -> Result<&mut DuplicatePropertyNamesChecker, ODataError> {
        let actual = self.state().to_string();
        let index = self.scopes.len().checked_sub(depth + 1);
        match index.and_then(|index| self.scopes.get_mut(index)) {
            Some(Scope::Entry(checker)) => Ok(checker),
            _ => Err(InternalError::UnexpectedState {
                component: COMPONENT,
                operation: "navigation link",
                expected: ODataEntryWriterState::Entry.to_string(),
                actual,
            }
            .into()),
        }
    }

    fn start_expanded_content(&mut self, is_feed: bool) -> Result<(), ODataError> {
        let actual = self.state().to_string();
        let Some(Scope::NavigationLink { link, content }) = self.scopes.last_mut() else {
            return Err(InternalError::UnexpectedState {
                component: COMPONENT,
                operation: "expanded content",
                expected: ODataEntryWriterState::NavigationLink.to_string(),
                actual,
            }
            .into());
        };
        if link.is_collection.is_some_and(|is_collection| is_collection != is_feed) {
            return Err(UsageError::InvalidTransition {
                component: COMPONENT,
                state: ODataEntryWriterState::NavigationLink.to_string(),
                operation: if is_feed { "write_start_feed" } else { "write_start_entry" },
            }
            .into());
        }
        *content = Some(is_feed);
        let link = link.clone();
        self.write_navigation_link_url(&link);
        self.writer.name(&link.name);
        Ok(())
    }

    fn finish_navigation_link(
        &mut self,
        link: &ODataNavigationLink,
        content: Option<bool>,
    ) -> Result<(), ODataError> {
        let checker = self.entry_checker(1)?;
        match content {
            Some(is_feed) => {
                checker.check_for_duplicate_navigation_link_names(link, true, Some(is_feed))?;
            }
            None => {
                checker.check_for_duplicate_navigation_link_names(link, false, link.is_collection)?;
                self.write_navigation_link_url(link);
            }
        }
        Ok(())
    }

    fn write_navigation_link_url(&mut self, link: &ODataNavigationLink) {
        if let Some(url) = &link.url {
            self.writer.name(&format!("{}@{NAVIGATION_LINK_URL}", link.name));
            self.writer.string(url);
        }
    }

    fn write_entry_body(&mut self, entry: &ODataEntry) -> Result<DuplicatePropertyNamesChecker, ODataError> {
        let mut checker = self.serializer.new_checker();
        let writer = &mut self.writer;
        writer.start_object();
        let metadata = [
            (ODATA_TYPE, TypeNameOracle::resolve_entry_type_name(entry)),
            (ODATA_ID, entry.id.as_deref()),
            (ODATA_ETAG, entry.etag.as_deref()),
            (ODATA_EDIT_LINK, entry.edit_link.as_deref()),
            (ODATA_READ_LINK, entry.read_link.as_deref()),
        ];
        for (name, value) in metadata {
            if let Some(value) = value {
                writer.name(name);
                writer.string(value);
            }
        }

        for annotation in entry.raw_annotations.iter().filter(|a| a.property_name.is_empty()) {
            checker.mark_property_as_processed(&annotation.annotation_name)?;
            writer.name(&annotation.annotation_name);
            writer.raw_json(&annotation.raw_json);
        }
        for property in &entry.properties {
            for annotation in entry
                .raw_annotations
                .iter()
                .filter(|a| a.property_name == property.name)
            {
                checker.add_custom_property_annotation(&property.name, &annotation.annotation_name)?;
                writer.name(&format!("{}@{}", property.name, annotation.annotation_name));
                writer.raw_json(&annotation.raw_json);
            }
            self.serializer.write_property(writer, property, None, &mut checker)?;
        }

        for link in &entry.association_links {
            self.serializer
                .settings()
                .version
                .ensure_supports("Association links", ODataVersion::V3)?;
            checker.check_for_duplicate_association_link_names(link)?;
            writer.name(&format!("{}@{ASSOCIATION_LINK_URL}", link.name));
            writer.string_or_null(link.url.as_deref());
        }
        Ok(checker)
    }
}
