use tracing::{info, warn};

use crate::collect::{ActionSpec, CollectResult, ParamMatch, RequestPattern};
use crate::schema::{FriendshipStatus, UserInfo};

use super::{selectors, Collector, INSTAGRAM_HOST};

impl Collector {
    pub async fn collect_user_info(&self, username: &str) -> CollectResult<UserInfo> {
        let user = self.open_profile(username, "").await?;
        info!(username, id = %user.id, followers = user.follower_count, "Collected user info");
        Ok(user)
    }

    /// Reads the relation from `username2`'s side: `followed_by` is true when
    /// `username2` shows up in `username1`'s following list, `following` when
    /// `username1` shows up in `username2`'s.
    pub async fn get_friendship_status(
        &self,
        username1: &str,
        username2: &str,
    ) -> CollectResult<FriendshipStatus> {
        let first = self.open_profile(username1, "").await?;
        let followed_by = self.follows(&first, username2).await?;
        let second = self.open_profile(username2, "").await?;
        let following = self.follows(&second, username1).await?;
        info!(username1, username2, following, followed_by, "Collected friendship status");
        Ok(FriendshipStatus {
            following,
            followed_by,
            is_private: second.is_private,
            ..FriendshipStatus::default()
        })
    }

    /// Searches the open profile's following list for `other`.
    async fn follows(&self, user: &UserInfo, other: &str) -> CollectResult<bool> {
        if user.is_private_account() {
            warn!(
                username = %user.username,
                "Following list of a private account is hidden, assuming not following"
            );
            return Ok(false);
        }
        let action = ActionSpec::new("following-search")
            .click(format!("a[href='/{}/following/']", user.username))
            .type_text(selectors::DIALOG_SEARCH, other);
        let pattern =
            RequestPattern::get(&format!("/api/v1/friendships/{}/following/", user.id))
                .host(INSTAGRAM_HOST)
                .query("query", ParamMatch::Equals(other.to_string()));
        let page = self
            .engine()
            .fetch_page("friendship_status", &action, &pattern)
            .await?;
        let found = page
            .record
            .records("users")
            .unwrap_or_default()
            .iter()
            .any(|candidate| candidate.str_at("username") == Some(other));
        Ok(found)
    }
}
