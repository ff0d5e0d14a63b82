use crate::collect::{ActionSpec, CollectionResult, ParamMatch};
use crate::schema::{Post, Reel};

use super::listing::{Layout, Listing, Paging};
use super::{finish, graphql, profile_action, selectors, Collected, Collector};

const POSTS_CONNECTION: &str = "data.xdt_api__v1__feed__user_timeline_graphql_connection";
const REELS_CONNECTION: &str = "data.xdt_api__v1__clips__user__connection_v2";
const TAGGED_CONNECTION: &str = "data.xdt_api__v1__usertags__user_id__feed_connection";

fn scroll_footer(name: &'static str) -> ActionSpec {
    ActionSpec::new(name).scroll_into_view(selectors::FOOTER)
}

/// The first page rides on the profile navigation; retries load the tab again.
fn from_profile(name: &'static str, username: &str, tab: &str) -> ActionSpec {
    ActionSpec::settle(name).replaying(profile_action(username, tab))
}

impl Collector {
    pub async fn collect_posts_of_user(&self, username: &str, limit: usize) -> Collected<Post> {
        if self.open_public_profile(username, "", "posts").await?.is_none() {
            return Ok(CollectionResult::empty());
        }
        let listing = Listing::new(
            "posts",
            username,
            graphql().variable("username", ParamMatch::Equals(username.to_string())),
            Layout::Connection {
                path: POSTS_CONNECTION,
                node: "node",
            },
        )
        .paging(Paging::After)
        .first(from_profile("posts", username, ""))
        .next(scroll_footer("posts-next"));
        finish(self.harvest(&listing, limit).await)
    }

    pub async fn collect_reels_of_user(&self, username: &str, limit: usize) -> Collected<Reel> {
        let Some(user) = self.open_public_profile(username, "reels/", "reels").await? else {
            return Ok(CollectionResult::empty());
        };
        let listing = Listing::new(
            "reels",
            username,
            graphql().variable("data.target_user_id", ParamMatch::Equals(user.id.clone())),
            Layout::Connection {
                path: REELS_CONNECTION,
                node: "node.media",
            },
        )
        .paging(Paging::After)
        .first(from_profile("reels", username, "reels/"))
        .next(scroll_footer("reels-next"));
        finish(self.harvest(&listing, limit).await)
    }

    pub async fn collect_tagged_posts_of_user(
        &self,
        username: &str,
        limit: usize,
    ) -> Collected<Post> {
        let Some(user) = self.open_public_profile(username, "tagged/", "tagged").await? else {
            return Ok(CollectionResult::empty());
        };
        let listing = Listing::new(
            "tagged",
            username,
            graphql().variable("user_id", ParamMatch::Equals(user.id.clone())),
            Layout::Connection {
                path: TAGGED_CONNECTION,
                node: "node",
            },
        )
        .paging(Paging::After)
        .first(from_profile("tagged", username, "tagged/"))
        .next(scroll_footer("tagged-next"));
        finish(self.harvest(&listing, limit).await)
    }
}
