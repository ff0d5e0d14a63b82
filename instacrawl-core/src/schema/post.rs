use serde::{Deserialize, Serialize};

use crate::collect::{CanonicalRecord, CollectError, CollectResult};

use super::field::{Fallback, FieldKind, FieldSet, FieldSpec};
use super::user::UserBasicInfo;
use super::{nested_list, optional_nested, required_nested, Entity, Identified};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Photo,
    Video,
    Reel,
    Igtv,
    Carousel,
}

impl MediaType {
    /// Resolves the numeric `media_type` together with `product_type`.
    pub fn from_codes(media_type: i64, product_type: &str) -> Option<Self> {
        match (media_type, product_type) {
            (1, _) => Some(MediaType::Photo),
            (2, "clips") => Some(MediaType::Reel),
            (2, "igtv") => Some(MediaType::Igtv),
            (2, _) => Some(MediaType::Video),
            (8, _) => Some(MediaType::Carousel),
            _ => None,
        }
    }

    pub fn is_video(self) -> bool {
        matches!(self, MediaType::Video | MediaType::Reel | MediaType::Igtv)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub id: String,
    pub text: String,
    pub created_at_utc: Option<i64>,
}

impl Entity for Caption {
    const NAME: &'static str = "caption";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::defaulted("text", &["text"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::optional("created_at_utc", &["created_at_utc", "created_at"], FieldKind::Int),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            text: fields.str("text"),
            created_at_utc: fields.opt_int("created_at_utc"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub short_name: Option<String>,
    pub name: String,
    pub city: Option<String>,
    pub lng: Option<f64>,
    pub lat: Option<f64>,
    pub address: Option<String>,
}

impl Entity for Location {
    const NAME: &'static str = "location";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id", "facebook_places_id"], FieldKind::Str),
        FieldSpec::optional("short_name", &["short_name"], FieldKind::Str),
        FieldSpec::required("name", &["name"], FieldKind::Str),
        FieldSpec::optional("city", &["city"], FieldKind::Str),
        FieldSpec::optional("lng", &["lng"], FieldKind::Float),
        FieldSpec::optional("lat", &["lat"], FieldKind::Float),
        FieldSpec::optional("address", &["address"], FieldKind::Str),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            short_name: fields.opt_str("short_name"),
            name: fields.str("name"),
            city: fields.opt_str("city"),
            lng: fields.opt_float("lng"),
            lat: fields.opt_float("lat"),
            address: fields.opt_str("address"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Usertag {
    pub user: UserBasicInfo,
    pub position: Vec<f64>,
    pub start_time_in_video_in_sec: Option<f64>,
    pub duration_in_video_in_sec: Option<f64>,
}

impl Entity for Usertag {
    const NAME: &'static str = "usertag";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::defaulted("position", &["position"], FieldKind::FloatList, Fallback::Empty),
        FieldSpec::optional(
            "start_time_in_video_in_sec",
            &["start_time_in_video_in_sec"],
            FieldKind::Float,
        ),
        FieldSpec::optional(
            "duration_in_video_in_sec",
            &["duration_in_video_in_sec"],
            FieldKind::Float,
        ),
    ];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            user: required_nested(Self::NAME, record, &["user"])?,
            position: fields.floats("position"),
            start_time_in_video_in_sec: fields.opt_float("start_time_in_video_in_sec"),
            duration_in_video_in_sec: fields.opt_float("duration_in_video_in_sec"),
        })
    }
}

/// Audio attached to a clip, either licensed music or an original sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Music {
    pub id: String,
    pub is_trending_in_clips: Option<bool>,
    pub artist: Option<UserBasicInfo>,
    pub artist_name: Option<String>,
    pub title: Option<String>,
    pub duration_in_ms: Option<i64>,
    pub url: Option<String>,
}

impl Music {
    /// Picks the audio block of a clip by its `audio_type`.
    pub fn from_clips_metadata(clips_metadata: &CanonicalRecord) -> Option<Music> {
        let preferred = match clips_metadata.str_at("audio_type") {
            Some("licensed_music") => "music_info",
            Some("original_sounds") => "original_sound_info",
            _ if clips_metadata.contains("music_info") => "music_info",
            _ => "original_sound_info",
        };
        optional_nested(clips_metadata, preferred)
    }
}

impl Entity for Music {
    const NAME: &'static str = "music";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required(
            "id",
            &[
                "music_asset_info.audio_cluster_id",
                "audio_asset_id",
                "audio_cluster_id",
                "id",
            ],
            FieldKind::Str,
        ),
        FieldSpec::optional(
            "is_trending_in_clips",
            &[
                "music_consumption_info.is_trending_in_clips",
                "consumption_info.is_trending_in_clips",
            ],
            FieldKind::Bool,
        ),
        FieldSpec::optional(
            "artist_name",
            &["music_asset_info.display_artist", "ig_artist.username"],
            FieldKind::Str,
        ),
        FieldSpec::optional(
            "title",
            &["music_asset_info.title", "original_audio_title", "title"],
            FieldKind::Str,
        ),
        FieldSpec::optional(
            "duration_in_ms",
            &["music_asset_info.duration_in_ms", "duration_in_ms"],
            FieldKind::Int,
        ),
        FieldSpec::optional(
            "url",
            &[
                "music_asset_info.progressive_download_url",
                "progressive_download_url",
            ],
            FieldKind::Str,
        ),
    ];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            is_trending_in_clips: fields.opt_bool("is_trending_in_clips"),
            artist: optional_nested(record, "ig_artist"),
            artist_name: fields.opt_str("artist_name"),
            title: fields.opt_str("title"),
            duration_in_ms: fields.opt_int("duration_in_ms"),
            url: fields.opt_str("url"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub code: String,
    pub user: UserBasicInfo,
    pub taken_at: i64,
    pub media_type: MediaType,
    pub caption: Option<Caption>,
    pub accessibility_caption: String,
    pub usertags: Vec<Usertag>,
    pub location: Option<Location>,
    pub music: Option<Music>,
    pub original_width: u64,
    pub original_height: u64,
    pub urls: Vec<String>,
    pub has_shared_to_fb: bool,
    pub like_count: u64,
    pub comment_count: u64,
}

/// Reels share the post shape; their `media_type` is [`MediaType::Reel`].
pub type Reel = Post;

impl Entity for Post {
    const NAME: &'static str = "post";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::required("code", &["code", "shortcode"], FieldKind::Str),
        FieldSpec::required("taken_at", &["taken_at", "taken_at_timestamp"], FieldKind::Int),
        FieldSpec::required("media_type", &["media_type"], FieldKind::Int),
        FieldSpec::defaulted("product_type", &["product_type"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::optional("accessibility_caption", &["accessibility_caption"], FieldKind::Str),
        FieldSpec::defaulted("original_width", &["original_width"], FieldKind::Count, Fallback::Int(0)),
        FieldSpec::defaulted("original_height", &["original_height"], FieldKind::Count, Fallback::Int(0)),
        FieldSpec::defaulted(
            "has_shared_to_fb",
            &["has_shared_to_fb"],
            FieldKind::Bool,
            Fallback::Bool(false),
        ),
        FieldSpec::defaulted("like_count", &["like_count"], FieldKind::Count, Fallback::Int(0)),
        FieldSpec::defaulted("comment_count", &["comment_count"], FieldKind::Count, Fallback::Int(0)),
    ];

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        let code = fields.int("media_type");
        let product_type = fields.str("product_type");
        let media_type = MediaType::from_codes(code, &product_type).ok_or_else(|| {
            CollectError::schema(
                Self::NAME,
                format!("unknown media_type {code} with product_type `{product_type}`"),
            )
        })?;

        let caption: Option<Caption> = optional_nested(record, "caption");
        let accessibility_caption = fields
            .opt_str("accessibility_caption")
            .or_else(|| caption.as_ref().map(|c| c.text.clone()))
            .unwrap_or_default();
        let music = record
            .subtree("clips_metadata")
            .and_then(|clips| Music::from_clips_metadata(&clips));

        Ok(Self {
            id: fields.str("id"),
            code: fields.str("code"),
            user: required_nested(Self::NAME, record, &["user", "owner"])?,
            taken_at: fields.int("taken_at"),
            media_type,
            caption,
            accessibility_caption,
            usertags: nested_list(record, "usertags.in"),
            location: optional_nested(record, "location"),
            music,
            original_width: fields.count("original_width"),
            original_height: fields.count("original_height"),
            urls: media_urls(record, media_type),
            has_shared_to_fb: fields.bool("has_shared_to_fb"),
            like_count: fields.count("like_count"),
            comment_count: fields.count("comment_count"),
        })
    }
}

impl Identified for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

fn media_urls(record: &CanonicalRecord, media_type: MediaType) -> Vec<String> {
    const FIRST_IMAGE: &str = "image_versions2.candidates.0.url";
    match media_type {
        kind if kind.is_video() => record
            .str_at("video_versions.-1.url")
            .or_else(|| record.str_at(FIRST_IMAGE))
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
        MediaType::Carousel => record
            .records("carousel_media")
            .unwrap_or_default()
            .iter()
            .filter_map(|child| child.str_at(FIRST_IMAGE).map(str::to_string))
            .collect(),
        _ => record
            .str_at(FIRST_IMAGE)
            .map(|url| vec![url.to_string()])
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityMapper;
    use serde_json::{json, Value};

    fn record(value: Value) -> CanonicalRecord {
        CanonicalRecord::from_value(value).unwrap()
    }

    fn reel() -> Value {
        json!({
            "pk": "3179223655971394742",
            "id": "3179223655971394742_528817151",
            "code": "CwfNn0Ar",
            "taken_at": 1694000000,
            "media_type": 2,
            "product_type": "clips",
            "user": {"pk": "528817151", "username": "nasa", "full_name": "NASA"},
            "caption": {"pk": "1799", "text": "Launch day", "created_at": 1694000001},
            "like_count": 1200,
            "comment_count": 33,
            "video_versions": [{"url": "https://cdn/low.mp4"}, {"url": "https://cdn/high.mp4"}],
            "usertags": {"in": [
                {"user": {"pk": "1", "username": "esa"}, "position": [0.5, 0.25]},
                {"position": [0.1, 0.1]}
            ]},
            "location": {"pk": 213, "name": "Cape Canaveral", "lat": 28.39, "lng": "-80.6"},
            "clips_metadata": {
                "audio_type": "original_sounds",
                "music_info": null,
                "original_sound_info": {
                    "audio_asset_id": 99,
                    "original_audio_title": "Original audio",
                    "duration_in_ms": 15000,
                    "ig_artist": {"pk": "528817151", "username": "nasa"},
                    "consumption_info": {"is_trending_in_clips": false}
                }
            }
        })
    }

    #[test]
    fn maps_reel_with_nested_values() {
        let post: Post = EntityMapper.map(&record(reel())).unwrap();
        assert_eq!(post.id, "3179223655971394742");
        assert_eq!(post.media_type, MediaType::Reel);
        assert_eq!(post.urls, vec!["https://cdn/high.mp4"]);
        assert_eq!(post.accessibility_caption, "Launch day");
        assert_eq!(post.caption.as_ref().unwrap().created_at_utc, Some(1694000001));
        assert_eq!(post.usertags.len(), 1);
        assert_eq!(post.usertags[0].position, vec![0.5, 0.25]);
        let location = post.location.as_ref().unwrap();
        assert_eq!(location.id, "213");
        assert_eq!(location.lng, Some(-80.6));
        let music = post.music.as_ref().unwrap();
        assert_eq!(music.id, "99");
        assert_eq!(music.title.as_deref(), Some("Original audio"));
        assert_eq!(music.artist.as_ref().unwrap().username, "nasa");
        assert_eq!(music.is_trending_in_clips, Some(false));
    }

    #[test]
    fn licensed_music_reads_asset_info() {
        let clips = record(json!({
            "audio_type": "licensed_music",
            "music_info": {
                "music_asset_info": {
                    "audio_cluster_id": "5531",
                    "title": "Clair de Lune",
                    "display_artist": "Debussy",
                    "duration_in_ms": 300000,
                    "progressive_download_url": "https://cdn/audio.m4a"
                },
                "music_consumption_info": {"is_trending_in_clips": true}
            }
        }));
        let music = Music::from_clips_metadata(&clips).unwrap();
        assert_eq!(music.id, "5531");
        assert_eq!(music.artist_name.as_deref(), Some("Debussy"));
        assert_eq!(music.url.as_deref(), Some("https://cdn/audio.m4a"));
        assert_eq!(music.is_trending_in_clips, Some(true));
        assert!(music.artist.is_none());
    }

    #[test]
    fn carousel_collects_first_candidate_per_child() {
        let post: Post = EntityMapper
            .map(&record(json!({
                "pk": "1", "code": "C1", "taken_at": 1, "media_type": 8,
                "owner": {"id": "2", "username": "nasa"},
                "carousel_media": [
                    {"image_versions2": {"candidates": [{"url": "a"}, {"url": "a-small"}]}},
                    {"image_versions2": {"candidates": [{"url": "b"}]}}
                ]
            })))
            .unwrap();
        assert_eq!(post.media_type, MediaType::Carousel);
        assert_eq!(post.urls, vec!["a", "b"]);
        assert_eq!(post.user.username, "nasa");
        assert!(post.caption.is_none());
        assert!(post.usertags.is_empty());
        assert_eq!(post.like_count, 0);
    }

    #[test]
    fn missing_identity_or_user_is_a_mismatch() {
        let mut no_id = reel();
        no_id.as_object_mut().unwrap().remove("pk");
        no_id.as_object_mut().unwrap().remove("id");
        assert!(matches!(
            EntityMapper.map::<Post>(&record(no_id)),
            Err(CollectError::SchemaMismatch { .. })
        ));

        let mut no_user = reel();
        no_user.as_object_mut().unwrap().remove("user");
        assert!(matches!(
            EntityMapper.map::<Post>(&record(no_user)),
            Err(CollectError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn mapping_is_idempotent() {
        let raw = record(reel());
        let first: Post = EntityMapper.map(&raw).unwrap();
        let second: Post = EntityMapper.map(&raw).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn media_type_codes() {
        assert_eq!(MediaType::from_codes(1, ""), Some(MediaType::Photo));
        assert_eq!(MediaType::from_codes(2, "feed"), Some(MediaType::Video));
        assert_eq!(MediaType::from_codes(2, "igtv"), Some(MediaType::Igtv));
        assert_eq!(MediaType::from_codes(8, "carousel_container"), Some(MediaType::Carousel));
        assert_eq!(MediaType::from_codes(5, ""), None);
    }
}
