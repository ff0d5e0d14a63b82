use serde::{Deserialize, Serialize};

use crate::collect::{CanonicalRecord, CollectResult};

use super::field::{Fallback, FieldKind, FieldSet, FieldSpec};
use super::hashtag::HashtagBasicInfo;
use super::user::UserBasicInfo;
use super::{required_nested, Entity};

const POSITION: FieldSpec = FieldSpec::required("position", &["position"], FieldKind::Count);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultUser {
    pub position: u64,
    pub user: UserBasicInfo,
}

impl Entity for SearchResultUser {
    const NAME: &'static str = "search_user";
    const FIELDS: &'static [FieldSpec] = &[POSITION];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            position: fields.count("position"),
            user: required_nested(Self::NAME, record, &["user"])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultHashtag {
    pub position: u64,
    pub hashtag: HashtagBasicInfo,
}

impl Entity for SearchResultHashtag {
    const NAME: &'static str = "search_hashtag";
    const FIELDS: &'static [FieldSpec] = &[POSITION];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            position: fields.count("position"),
            hashtag: required_nested(Self::NAME, record, &["hashtag"])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceLocation {
    pub id: String,
    pub name: String,
}

impl Entity for PlaceLocation {
    const NAME: &'static str = "place_location";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id", "facebook_places_id"], FieldKind::Str),
        FieldSpec::required("name", &["name"], FieldKind::Str),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            name: fields.str("name"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlace {
    pub location: PlaceLocation,
    pub title: String,
    pub subtitle: String,
}

impl Entity for SearchPlace {
    const NAME: &'static str = "search_place";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::defaulted("title", &["title"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::defaulted("subtitle", &["subtitle"], FieldKind::Str, Fallback::Str("")),
    ];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            location: required_nested(Self::NAME, record, &["location"])?,
            title: fields.str("title"),
            subtitle: fields.str("subtitle"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultPlace {
    pub position: u64,
    pub place: SearchPlace,
}

impl Entity for SearchResultPlace {
    const NAME: &'static str = "search_result_place";
    const FIELDS: &'static [FieldSpec] = &[POSITION];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            position: fields.count("position"),
            place: required_nested(Self::NAME, record, &["place"])?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub hashtags: Vec<SearchResultHashtag>,
    pub users: Vec<SearchResultUser>,
    pub places: Vec<SearchResultPlace>,
    pub personalised: bool,
}
