use crate::collect::{ActionSpec, ParamMatch, RequestPattern};
use crate::schema::{Comment, Liker};

use super::listing::{Layout, Listing, Paging};
use super::{finish, graphql, page_url, selectors, Collected, Collector, INSTAGRAM_HOST};

const COMMENTS_CONNECTION: &str = "data.xdt_api__v1__media__media_id__comments__connection";

impl Collector {
    /// Likers come back as a single page.
    pub async fn collect_likers_of_post(&self, post_code: &str, limit: usize) -> Collected<Liker> {
        let listing = Listing::new(
            "likers",
            post_code,
            RequestPattern::get("/api/v1/media/*/likers/").host(INSTAGRAM_HOST),
            Layout::List {
                path: "users",
                node: None,
            },
        )
        .first(
            ActionSpec::navigate("post", page_url(&format!("p/{post_code}/")))
                .click(selectors::LIKERS_LINK),
        );
        finish(self.harvest(&listing, limit).await)
    }

    pub async fn collect_comments_of_post(
        &self,
        post_code: &str,
        limit: usize,
    ) -> Collected<Comment> {
        let listing = Listing::new(
            "comments",
            post_code,
            graphql().variable("media_id", ParamMatch::Present),
            Layout::Connection {
                path: COMMENTS_CONNECTION,
                node: "node",
            },
        )
        .paging(Paging::After)
        .tag_media_id()
        .first(ActionSpec::navigate(
            "post",
            page_url(&format!("p/{post_code}/")),
        ))
        .next(ActionSpec::new("comments-next").scroll_into_view(selectors::COMMENTS_TAIL));
        finish(self.harvest(&listing, limit).await)
    }
}
