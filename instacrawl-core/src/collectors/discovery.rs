use serde_json::json;
use tracing::{info, warn};

use crate::collect::{
    ActionSpec, CanonicalRecord, CollectError, CollectFailure, CollectResult, ParamMatch,
    RequestPattern,
};
use crate::schema::{
    Entity, EntityMapper, Hashtag, HashtagProfile, MusicPosts, Post, SearchResult,
};

use super::listing::{Carrier, Layout, Listing, Paging};
use super::{graphql, page_url, selectors, Collector, INSTAGRAM_HOST, INSTAGRAM_URL};

const TOP_SEARCH: &str = "data.xdt_api__v1__fbsearch__topsearch_connection";
const SERP: &str = "data.xdt_api__v1__fbsearch__non_profiled_serp";

impl Collector {
    /// One page of blended search results.
    pub async fn search_with_keyword(
        &self,
        keyword: &str,
        personalised: bool,
    ) -> CollectResult<SearchResult> {
        let action = ActionSpec::navigate("home", INSTAGRAM_URL)
            .click(selectors::SEARCH_ICON)
            .type_text(selectors::SEARCH_INPUT, keyword);
        let (pattern, root) = if personalised {
            (
                graphql().variable("data.query", ParamMatch::Equals(keyword.to_string())),
                TOP_SEARCH,
            )
        } else {
            (
                graphql().variable("query", ParamMatch::Equals(keyword.to_string())),
                SERP,
            )
        };
        let page = self.engine().fetch_page("search", &action, &pattern).await?;
        let results = page
            .record
            .subtree(root)
            .ok_or_else(|| CollectError::malformed(&page.response.url, format!("no {root}")))?;

        let users = if personalised {
            map_all(&results.records("users").unwrap_or_default())
        } else {
            let ranked = results
                .records("users")
                .unwrap_or_default()
                .into_iter()
                .enumerate()
                .filter_map(|(position, user)| {
                    CanonicalRecord::from_value(json!({
                        "position": position,
                        "user": user.into_value(),
                    }))
                })
                .collect::<Vec<_>>();
            map_all(&ranked)
        };
        let result = SearchResult {
            hashtags: map_all(&results.records("hashtags").unwrap_or_default()),
            users,
            places: map_all(&results.records("places").unwrap_or_default()),
            personalised,
        };
        info!(
            keyword,
            users = result.users.len(),
            hashtags = result.hashtags.len(),
            places = result.places.len(),
            "Collected search results"
        );
        Ok(result)
    }

    pub async fn collect_top_posts_of_hashtag(
        &self,
        hashtag: &str,
        limit: usize,
    ) -> Result<Hashtag, CollectFailure<Post>> {
        let tag = hashtag.trim_start_matches('#');
        let listing: Listing<Post> = Listing::new(
            "top_posts",
            tag,
            RequestPattern::get("/api/v1/tags/web_info/")
                .host(INSTAGRAM_HOST)
                .query("tag_name", ParamMatch::Equals(tag.to_string())),
            Layout::Sections,
        )
        .first(ActionSpec::navigate(
            "hashtag",
            page_url(&format!("explore/tags/{tag}/")),
        ));
        let harvest = self.harvest(&listing, limit).await?;
        let header = harvest
            .first_page
            .as_ref()
            .and_then(|page| page.subtree("data"))
            .ok_or_else(|| CollectError::NotFound(format!("hashtag #{tag}")))?;
        let profile: HashtagProfile = EntityMapper
            .map(&header)
            .map_err(|err| CollectFailure::new(err, harvest.result.items.clone()))?;
        Ok(Hashtag::new(profile, harvest.result.items))
    }

    pub async fn collect_posts_by_music_id(
        &self,
        music_id: &str,
        limit: usize,
    ) -> Result<MusicPosts, CollectFailure<Post>> {
        let listing: Listing<Post> = Listing::new(
            "music_posts",
            music_id,
            RequestPattern::post("/api/v1/clips/music/")
                .host(INSTAGRAM_HOST)
                .form("audio_cluster_id", ParamMatch::Equals(music_id.to_string())),
            Layout::List {
                path: "items",
                node: Some("media"),
            },
        )
        .paging(Paging::MaxId {
            carrier: Carrier::Form,
            token: "paging_info.max_id",
            more: Some("paging_info.more_available"),
        })
        .first(ActionSpec::navigate(
            "music",
            page_url(&format!("reels/audio/{music_id}/")),
        ))
        .next(ActionSpec::new("music-next").scroll_window());
        let harvest = self.harvest(&listing, limit).await?;
        Ok(MusicPosts::new(
            harvest.first_page.as_ref(),
            harvest.result.items,
        ))
    }
}

/// Maps every record, logging and skipping the ones that do not fit.
fn map_all<E: Entity>(records: &[CanonicalRecord]) -> Vec<E> {
    records
        .iter()
        .filter_map(|record| match EntityMapper.map::<E>(record) {
            Ok(entity) => Some(entity),
            Err(error) => {
                warn!(entity = E::NAME, error = %error, "Skipping search entry");
                None
            }
        })
        .collect()
}
