use crate::collect::{ActionSpec, CollectionResult, ParamMatch, RequestPattern};
use crate::schema::{HashtagBasicInfo, UserBasicInfo};

use super::listing::{Carrier, Layout, Listing, Paging};
use super::{finish, selectors, Collected, Collector, FOLLOWING_HASHTAGS_DOC_ID, INSTAGRAM_HOST};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Followers,
    Following,
}

impl Direction {
    fn segment(self) -> &'static str {
        match self {
            Direction::Followers => "followers",
            Direction::Following => "following",
        }
    }
}

impl Collector {
    pub async fn collect_followers_of_user(
        &self,
        username: &str,
        limit: usize,
    ) -> Collected<UserBasicInfo> {
        self.collect_friendships(username, Direction::Followers, limit)
            .await
    }

    pub async fn collect_followings_of_user(
        &self,
        username: &str,
        limit: usize,
    ) -> Collected<UserBasicInfo> {
        self.collect_friendships(username, Direction::Following, limit)
            .await
    }

    async fn collect_friendships(
        &self,
        username: &str,
        direction: Direction,
        limit: usize,
    ) -> Collected<UserBasicInfo> {
        let segment = direction.segment();
        let Some(user) = self.open_public_profile(username, "", segment).await? else {
            return Ok(CollectionResult::empty());
        };
        let listing = Listing::new(
            segment,
            username,
            RequestPattern::get(&format!("/api/v1/friendships/{}/{segment}/", user.id))
                .host(INSTAGRAM_HOST),
            Layout::List {
                path: "users",
                node: None,
            },
        )
        .paging(Paging::MaxId {
            carrier: Carrier::Query,
            token: "next_max_id",
            more: None,
        })
        .first(ActionSpec::new(segment).click(format!("a[href='/{username}/{segment}/']")))
        .next(ActionSpec::new("friendships-next").scroll_into_view(selectors::DIALOG_TAIL));
        finish(self.harvest(&listing, limit).await)
    }

    pub async fn collect_following_hashtags_of_user(
        &self,
        username: &str,
        limit: usize,
    ) -> Collected<HashtagBasicInfo> {
        let Some(user) = self
            .open_public_profile(username, "", "following_hashtags")
            .await?
        else {
            return Ok(CollectionResult::empty());
        };
        let listing = Listing::new(
            "following_hashtags",
            username,
            RequestPattern::get("/graphql/query/")
                .host(INSTAGRAM_HOST)
                .query(
                    "doc_id",
                    ParamMatch::Equals(FOLLOWING_HASHTAGS_DOC_ID.to_string()),
                )
                .variable("id", ParamMatch::Equals(user.id.clone())),
            Layout::Connection {
                path: "data.user.edge_following_hashtag",
                node: "node",
            },
        )
        .first(
            ActionSpec::new("following-hashtags")
                .click(format!("a[href='/{username}/following/']"))
                .click(selectors::HASHTAGS_TAB),
        );
        finish(self.harvest(&listing, limit).await)
    }
}
