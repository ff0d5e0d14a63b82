use serde::{Deserialize, Serialize};

use crate::collect::{CanonicalRecord, CollectResult};

use super::field::{Fallback, FieldKind, FieldSet, FieldSpec};
use super::{optional_nested, Entity, Identified};

const BASIC_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("id", &["pk", "id", "pk_id"], FieldKind::Str),
    FieldSpec::required("username", &["username"], FieldKind::Str),
    FieldSpec::defaulted("fullname", &["full_name", "fullname"], FieldKind::Str, Fallback::Str("")),
    FieldSpec::defaulted(
        "profile_pic_url",
        &["profile_pic_url"],
        FieldKind::Str,
        Fallback::Str(""),
    ),
    FieldSpec::optional("is_private", &["is_private"], FieldKind::Bool),
    FieldSpec::defaulted("is_verified", &["is_verified"], FieldKind::Bool, Fallback::Bool(false)),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBasicInfo {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub profile_pic_url: String,
    pub is_private: Option<bool>,
    pub is_verified: bool,
}

impl UserBasicInfo {
    fn from_fields(fields: &FieldSet) -> Self {
        Self {
            id: fields.str("id"),
            username: fields.str("username"),
            fullname: fields.str("fullname"),
            profile_pic_url: fields.str("profile_pic_url"),
            is_private: fields.opt_bool("is_private"),
            is_verified: fields.bool("is_verified"),
        }
    }
}

impl Entity for UserBasicInfo {
    const NAME: &'static str = "user";
    const FIELDS: &'static [FieldSpec] = BASIC_FIELDS;

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self::from_fields(&fields))
    }
}

impl Identified for UserBasicInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Full profile as served by `web_profile_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub profile_pic_url: String,
    pub is_private: Option<bool>,
    pub is_verified: bool,
    pub biography: String,
    pub follower_count: u64,
    pub following_count: u64,
    pub following_tag_count: u64,
    pub post_count: u64,
    pub usertags_count: u64,
}

impl Entity for UserInfo {
    const NAME: &'static str = "user_info";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("id", &["pk", "id"], FieldKind::Str),
        FieldSpec::required("username", &["username"], FieldKind::Str),
        FieldSpec::defaulted("fullname", &["full_name"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::defaulted(
            "profile_pic_url",
            &["profile_pic_url_hd", "profile_pic_url"],
            FieldKind::Str,
            Fallback::Str(""),
        ),
        FieldSpec::optional("is_private", &["is_private"], FieldKind::Bool),
        FieldSpec::defaulted("is_verified", &["is_verified"], FieldKind::Bool, Fallback::Bool(false)),
        FieldSpec::defaulted("biography", &["biography"], FieldKind::Str, Fallback::Str("")),
        FieldSpec::required(
            "follower_count",
            &["edge_followed_by.count", "follower_count"],
            FieldKind::Count,
        ),
        FieldSpec::required(
            "following_count",
            &["edge_follow.count", "following_count"],
            FieldKind::Count,
        ),
        FieldSpec::defaulted(
            "following_tag_count",
            &["edge_following_hashtag.count", "following_tag_count"],
            FieldKind::Count,
            Fallback::Int(0),
        ),
        FieldSpec::required(
            "post_count",
            &["edge_owner_to_timeline_media.count", "media_count"],
            FieldKind::Count,
        ),
        FieldSpec::defaulted(
            "usertags_count",
            &["usertags_count", "edge_user_to_photos_of_you.count"],
            FieldKind::Count,
            Fallback::Int(0),
        ),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            id: fields.str("id"),
            username: fields.str("username"),
            fullname: fields.str("fullname"),
            profile_pic_url: fields.str("profile_pic_url"),
            is_private: fields.opt_bool("is_private"),
            is_verified: fields.bool("is_verified"),
            biography: fields.str("biography"),
            follower_count: fields.count("follower_count"),
            following_count: fields.count("following_count"),
            following_tag_count: fields.count("following_tag_count"),
            post_count: fields.count("post_count"),
            usertags_count: fields.count("usertags_count"),
        })
    }
}

impl Identified for UserInfo {
    fn id(&self) -> &str {
        &self.id
    }
}

impl UserInfo {
    pub fn is_private_account(&self) -> bool {
        self.is_private.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FriendshipStatus {
    pub following: bool,
    pub followed_by: bool,
    pub blocking: Option<bool>,
    pub muting: Option<bool>,
    pub is_private: Option<bool>,
    pub incoming_request: Option<bool>,
    pub outgoing_request: Option<bool>,
    pub is_bestie: Option<bool>,
    pub is_restricted: Option<bool>,
    pub is_feed_favorite: Option<bool>,
    pub subscribed: Option<bool>,
}

impl Entity for FriendshipStatus {
    const NAME: &'static str = "friendship_status";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("following", &["following"], FieldKind::Bool),
        FieldSpec::defaulted("followed_by", &["followed_by"], FieldKind::Bool, Fallback::Bool(false)),
        FieldSpec::optional("blocking", &["blocking"], FieldKind::Bool),
        FieldSpec::optional("muting", &["muting"], FieldKind::Bool),
        FieldSpec::optional("is_private", &["is_private"], FieldKind::Bool),
        FieldSpec::optional("incoming_request", &["incoming_request"], FieldKind::Bool),
        FieldSpec::optional("outgoing_request", &["outgoing_request"], FieldKind::Bool),
        FieldSpec::optional("is_bestie", &["is_bestie"], FieldKind::Bool),
        FieldSpec::optional("is_restricted", &["is_restricted"], FieldKind::Bool),
        FieldSpec::optional("is_feed_favorite", &["is_feed_favorite"], FieldKind::Bool),
        FieldSpec::optional("subscribed", &["subscribed"], FieldKind::Bool),
    ];

    fn assemble(fields: FieldSet, _record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            following: fields.bool("following"),
            followed_by: fields.bool("followed_by"),
            blocking: fields.opt_bool("blocking"),
            muting: fields.opt_bool("muting"),
            is_private: fields.opt_bool("is_private"),
            incoming_request: fields.opt_bool("incoming_request"),
            outgoing_request: fields.opt_bool("outgoing_request"),
            is_bestie: fields.opt_bool("is_bestie"),
            is_restricted: fields.opt_bool("is_restricted"),
            is_feed_favorite: fields.opt_bool("is_feed_favorite"),
            subscribed: fields.opt_bool("subscribed"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Liker {
    #[serde(flatten)]
    pub user: UserBasicInfo,
    pub friendship_status: Option<FriendshipStatus>,
}

impl Entity for Liker {
    const NAME: &'static str = "liker";
    const FIELDS: &'static [FieldSpec] = BASIC_FIELDS;

    fn assemble(fields: FieldSet, record: &CanonicalRecord) -> CollectResult<Self> {
        Ok(Self {
            user: UserBasicInfo::from_fields(&fields),
            friendship_status: optional_nested(record, "friendship_status"),
        })
    }
}

impl Identified for Liker {
    fn id(&self) -> &str {
        &self.user.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityMapper;
    use serde_json::json;

    fn record(value: serde_json::Value) -> CanonicalRecord {
        CanonicalRecord::from_value(value).unwrap()
    }

    #[test]
    fn maps_web_profile_info_user() {
        let user: UserInfo = EntityMapper
            .map(&record(json!({
                "id": "528817151",
                "username": "nasa",
                "full_name": "NASA",
                "biography": "Exploring the universe",
                "is_private": false,
                "is_verified": true,
                "profile_pic_url": "https://cdn/small.jpg",
                "profile_pic_url_hd": "https://cdn/hd.jpg",
                "edge_followed_by": {"count": 97000000},
                "edge_follow": {"count": 80},
                "edge_owner_to_timeline_media": {"count": 4200},
            })))
            .unwrap();
        assert_eq!(user.id, "528817151");
        assert_eq!(user.follower_count, 97_000_000);
        assert_eq!(user.profile_pic_url, "https://cdn/hd.jpg");
        assert_eq!(user.following_tag_count, 0);
        assert!(!user.is_private_account());
    }

    #[test]
    fn liker_keeps_friendship_when_present() {
        let liker: Liker = EntityMapper
            .map(&record(json!({
                "pk": 42,
                "username": "astro",
                "friendship_status": {"following": true, "is_bestie": false},
            })))
            .unwrap();
        assert_eq!(liker.id(), "42");
        assert_eq!(liker.user.fullname, "");
        let status = liker.friendship_status.unwrap();
        assert!(status.following);
        assert!(!status.followed_by);
        assert_eq!(status.is_bestie, Some(false));
    }

    #[test]
    fn liker_serializes_flat() {
        let liker: Liker = EntityMapper
            .map(&record(json!({"pk": "7", "username": "flat"})))
            .unwrap();
        let value = serde_json::to_value(&liker).unwrap();
        assert_eq!(value["username"], "flat");
        assert!(value["friendship_status"].is_null());
    }
}
