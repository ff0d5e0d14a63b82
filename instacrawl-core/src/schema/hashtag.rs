use serde::{Deserialize, Serialize};

use crate::collect::{CanonicalRecord, CollectResult};

use super::field::{Fallback, FieldKind, FieldSet, FieldSpec};
use super::post::{Music, Post};
use super::{optional_nested, Entity, Identified};

const ID: FieldSpec = FieldSpec::required("id", &["id", "pk"], FieldKind::Str);
const NAME_FIELD: FieldSpec = FieldSpec::required("name", &["name"], FieldKind::Str);
const POST_COUNT: FieldSpec = FieldSpec::defaulted(
    "post_count",
    &["media_count", "post_count"],
    FieldKind::Count,
    Fallback::Int(0),
);
const PROFILE_PIC: FieldSpec = FieldSpec::defaulted(
    "profile_pic_url",
    &["profile_pic_url"],
    FieldKind::Str,
    Fallback::Str(""),
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashtagBasicInfo {
    pub id: String,
    pub name: String,
    pub post_count: u64,
    pub profile_pic_url: String,
}

impl HashtagBasicInfo {
    fn from_fields(fields: &FieldSet) -> Self {
        Self {
            id: fields.str("id"),
            name: fields.str("name"),
            post_count: fields.count("post_count"),
            profile_pic_url: fields.str("profile_pic_url"),
        }
    }
}

impl Entity for HashtagBasicInfo {
    const NAME: &'static str = "hashtag";
    const FIELDS: &'static [FieldSpec] = &[ID, NAME_FIELD, POST_COUNT, PROFILE_PIC];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self::from_fields(&fields))
    }
}

impl Identified for HashtagBasicInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Header of a hashtag page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashtagProfile {
    #[serde(flatten)]
    pub info: HashtagBasicInfo,
    pub is_trending: bool,
    pub related_tags: Vec<String>,
    pub subtitle: String,
}

impl Entity for HashtagProfile {
    const NAME: &'static str = "hashtag_profile";
    const FIELDS: &'static [FieldSpec] = &[
        ID,
        NAME_FIELD,
        POST_COUNT,
        PROFILE_PIC,
        FieldSpec::defaulted("is_trending", &["is_trending"], FieldKind::Bool, Fallback::Bool(false)),
        FieldSpec::defaulted("related_tags", &["related_tags"], FieldKind::StrList, Fallback::Empty),
        FieldSpec::defaulted("subtitle", &["subtitle"], FieldKind::Str, Fallback::Str("")),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            info: HashtagBasicInfo::from_fields(&fields),
            is_trending: fields.bool("is_trending"),
            related_tags: fields.strs("related_tags"),
            subtitle: fields.str("subtitle"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hashtag {
    #[serde(flatten)]
    pub profile: HashtagProfile,
    pub posts: Vec<Post>,
    pub count: usize,
}

impl Hashtag {
    pub fn new(profile: HashtagProfile, posts: Vec<Post>) -> Self {
        Self {
            profile,
            count: posts.len(),
            posts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicPosts {
    pub music: Option<Music>,
    pub clips_count: u64,
    pub photos_count: u64,
    pub posts: Vec<Post>,
    pub count: usize,
}

impl MusicPosts {
    /// Reads the audio header from the first `clips/music` page.
    pub fn new(first_page: Option<&CanonicalRecord>, posts: Vec<Post>) -> Self {
        let music = first_page.and_then(|page| {
            optional_nested(page, "metadata.music_info")
                .or_else(|| optional_nested(page, "metadata.original_sound_info"))
        });
        let counts = |path: &str| {
            first_page
                .and_then(|page| page.u64_at(path))
                .unwrap_or_default()
        };
        Self {
            music,
            clips_count: counts("media_count.clips_count"),
            photos_count: counts("media_count.photos_count"),
            count: posts.len(),
            posts,
        }
    }
}
