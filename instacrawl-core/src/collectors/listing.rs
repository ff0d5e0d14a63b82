use std::marker::PhantomData;

use serde_json::Value;
use tracing::trace;

use crate::collect::{
    ActionSpec, CanonicalRecord, CollectError, CollectResult, Cursor, Page, PagedResource,
    ParamMatch, RequestPattern,
};
use crate::schema::{Entity, Identified};

/// Where a page keeps its items.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Layout {
    /// GraphQL connection: `{path}.edges[].{node}` next to `{path}.page_info`.
    Connection {
        path: &'static str,
        node: &'static str,
    },
    /// A plain array, optionally unwrapping `node` from every entry.
    List {
        path: &'static str,
        node: Option<&'static str>,
    },
    /// The ranked sections of a hashtag page.
    Sections,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Carrier {
    Query,
    Form,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Paging {
    Single,
    /// GraphQL `after` variable fed from the connection's `page_info`.
    After,
    /// `max_id` parameter fed from `token`, with an optional explicit "more" flag.
    MaxId {
        carrier: Carrier,
        token: &'static str,
        more: Option<&'static str>,
    },
}

/// A paged endpoint described by data rather than code.
pub(crate) struct Listing<T> {
    name: &'static str,
    target: String,
    base: RequestPattern,
    layout: Layout,
    paging: Paging,
    first: ActionSpec,
    next: ActionSpec,
    tag_media_id: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T> Listing<T> {
    pub(crate) fn new(
        name: &'static str,
        target: impl Into<String>,
        base: RequestPattern,
        layout: Layout,
    ) -> Self {
        Self {
            name,
            target: target.into(),
            base,
            layout,
            paging: Paging::Single,
            first: ActionSpec::settle(name),
            next: ActionSpec::settle(name),
            tag_media_id: false,
            _item: PhantomData,
        }
    }

    pub(crate) fn paging(mut self, paging: Paging) -> Self {
        self.paging = paging;
        self
    }

    pub(crate) fn first(mut self, action: ActionSpec) -> Self {
        self.first = action;
        self
    }

    pub(crate) fn next(mut self, action: ActionSpec) -> Self {
        self.next = action;
        self
    }

    /// Copies the request's `media_id` variable into every item.
    pub(crate) fn tag_media_id(mut self) -> Self {
        self.tag_media_id = true;
        self
    }

    fn malformed(&self, page: &Page, what: &str) -> CollectError {
        CollectError::malformed(&page.response.url, format!("{} page has no {what}", self.name))
    }
}

impl<T: Identified> PagedResource for Listing<T> {
    type Item = T;

    fn name(&self) -> &str {
        self.name
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn action(&self, cursor: &Cursor) -> ActionSpec {
        if cursor.is_start() {
            self.first.clone()
        } else {
            self.next.clone().with_cursor(cursor.token())
        }
    }

    fn pattern(&self, cursor: &Cursor) -> RequestPattern {
        let base = self.base.clone();
        match self.paging {
            Paging::Single => base,
            Paging::After => base.cursor_variable("after", cursor.token()),
            Paging::MaxId { carrier, .. } => {
                let matcher = match cursor.token() {
                    Some(token) => ParamMatch::Equals(token.to_string()),
                    None => ParamMatch::AbsentOrEquals(String::new()),
                };
                match carrier {
                    Carrier::Query => base.query("max_id", matcher),
                    Carrier::Form => base.form("max_id", matcher),
                }
            }
        }
    }

    fn items(&self, page: &Page) -> CollectResult<Vec<CollectResult<CanonicalRecord>>> {
        let record = &page.record;
        let mut items = match self.layout {
            Layout::Connection { path, node } => record
                .entries(&format!("{path}.edges"))
                .ok_or_else(|| self.malformed(page, path))?
                .into_iter()
                .map(|edge| unwrap_entry::<T>(edge, Some(node)))
                .collect::<Vec<_>>(),
            Layout::List { path, node } => record
                .entries(path)
                .ok_or_else(|| self.malformed(page, path))?
                .into_iter()
                .map(|entry| unwrap_entry::<T>(entry, node))
                .collect(),
            Layout::Sections => {
                if !record.contains("data") {
                    return Err(self.malformed(page, "data"));
                }
                section_medias::<T>(record)
            }
        };

        if self.tag_media_id {
            let media_id = page
                .response
                .variables()
                .and_then(|vars| vars.get("media_id").cloned())
                .filter(|value| !value.is_null());
            if let Some(media_id) = media_id {
                let media_id = match media_id {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                for item in items.iter_mut().flatten() {
                    item.insert("media_id", Value::String(media_id.clone()));
                }
            }
        }
        trace!(resource = self.name, items = items.len(), "Extracted page items");
        Ok(items)
    }

    fn next_cursor(&self, page: &Page) -> Cursor {
        let record = &page.record;
        match (self.paging, self.layout) {
            (Paging::After, Layout::Connection { path, .. }) => Cursor::from_page(
                record.str_at(&format!("{path}.page_info.end_cursor")),
                record
                    .bool_at(&format!("{path}.page_info.has_next_page"))
                    .unwrap_or(false),
            ),
            (Paging::MaxId { token, more, .. }, _) => {
                let token = token_at(record, token);
                let more = match more {
                    Some(path) => record.bool_at(path).unwrap_or(false),
                    None => token.is_some(),
                };
                Cursor::from_page(token.as_deref(), more)
            }
            _ => Cursor::exhausted(),
        }
    }
}

/// Reads a pagination token that upstream sends as either a string or a number.
fn token_at(record: &CanonicalRecord, path: &str) -> Option<String> {
    match record.lookup(path)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Pulls the item out of one array entry, optionally unwrapping `node`.
fn unwrap_entry<T: Entity>(
    entry: Option<CanonicalRecord>,
    node: Option<&str>,
) -> CollectResult<CanonicalRecord> {
    let entry = entry.ok_or_else(|| CollectError::schema(T::NAME, "entry is not an object"))?;
    match node {
        Some(node) => entry
            .subtree(node)
            .ok_or_else(|| CollectError::schema(T::NAME, format!("entry has no `{node}` object"))),
        None => Ok(entry),
    }
}

fn section_medias<T: Entity>(record: &CanonicalRecord) -> Vec<CollectResult<CanonicalRecord>> {
    let sections = record.records("data.top.sections").unwrap_or_default();
    let mut medias = Vec::new();
    for section in &sections {
        let entries = if section.str_at("layout_type") == Some("one_by_two_left") {
            let mut entries = section
                .entries("layout_content.fill_items")
                .unwrap_or_default();
            entries.extend(
                section
                    .entries("layout_content.one_by_two_item.clips.items")
                    .unwrap_or_default(),
            );
            entries
        } else {
            section.entries("layout_content.medias").unwrap_or_default()
        };
        medias.extend(
            entries
                .into_iter()
                .map(|entry| unwrap_entry::<T>(entry, Some("media"))),
        );
    }
    medias
}
