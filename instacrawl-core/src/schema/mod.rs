//! Typed domain records and the tables that map captured JSON onto them.

mod comment;
mod field;
mod hashtag;
mod post;
mod search;
mod user;

use tracing::debug;

use crate::collect::{CanonicalRecord, CollectError, CollectResult};

pub use comment::{Comment, CommentAuthor};
pub use field::{resolve, Fallback, FieldKind, FieldSet, FieldSpec, FieldValue, Presence};
pub use hashtag::{Hashtag, HashtagBasicInfo, HashtagProfile, MusicPosts};
pub use post::{Caption, Location, MediaType, Music, Post, Reel, Usertag};
pub use search::{
    PlaceLocation, SearchPlace, SearchResult, SearchResultHashtag, SearchResultPlace,
    SearchResultUser,
};
pub use user::{FriendshipStatus, Liker, UserBasicInfo, UserInfo};

/// A record type assembled from a field table.
pub trait Entity: Sized {
    const NAME: &'static str;
    const FIELDS: &'static [FieldSpec];

    /// Builds the entity from resolved fields. `record` is the same subtree
    /// the fields came from, for nested entities and derived values.
    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self>;
}

/// An entity with a stable identity, used to deduplicate collections.
pub trait Identified: Entity {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EntityMapper;

impl EntityMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map<E: Entity>(&self, record: &CanonicalRecord) -> CollectResult<E> {
        let fields = resolve(E::NAME, E::FIELDS, record)?;
        E::assemble(fields, record)
    }
}

/// Maps the first object found under `paths`, failing the parent when none maps.
pub(crate) fn required_nested<E: Entity>(
    parent: &'static str,
    record: &CanonicalRecord,
    paths: &[&str],
) -> CollectResult<E> {
    let subtree = paths
        .iter()
        .find_map(|path| record.subtree(path))
        .ok_or_else(|| {
            CollectError::schema(parent, format!("missing nested {} at {}", E::NAME, paths.join("|")))
        })?;
    EntityMapper.map(&subtree).map_err(|err| match err {
        CollectError::SchemaMismatch { reason, .. } => {
            CollectError::schema(parent, format!("nested {}: {reason}", E::NAME))
        }
        other => other,
    })
}

/// Maps an optional nested object; absent or unmappable subtrees become `None`.
pub(crate) fn optional_nested<E: Entity>(record: &CanonicalRecord, path: &str) -> Option<E> {
    let subtree = record.subtree(path)?;
    match EntityMapper.map(&subtree) {
        Ok(entity) => Some(entity),
        Err(err) => {
            debug!(entity = E::NAME, path, error = %err, "Dropping unmappable nested entity");
            None
        }
    }
}

/// Maps every object in the array at `path`, skipping entries that do not map.
pub(crate) fn nested_list<E: Entity>(record: &CanonicalRecord, path: &str) -> Vec<E> {
    record
        .records(path)
        .unwrap_or_default()
        .iter()
        .filter_map(|item| match EntityMapper.map(item) {
            Ok(entity) => Some(entity),
            Err(err) => {
                debug!(entity = E::NAME, path, error = %err, "Skipping unmappable list entry");
                None
            }
        })
        .collect()
}
