//! One entry point per upstream resource, all running over a single [`Session`].

mod discovery;
mod follows;
mod listing;
mod media;
mod profile;
mod timeline;

use tracing::warn;

use crate::collect::{
    ActionSpec, CollectError, CollectFailure, CollectResult, CollectTelemetry, CollectionResult,
    Harvest, PagedResource, PaginationEngine, ParamMatch, RequestPattern, Session,
};
use crate::config::CrawlerConfig;
use crate::schema::{EntityMapper, UserInfo};

pub const INSTAGRAM_HOST: &str = "www.instagram.com";
pub const INSTAGRAM_URL: &str = "https://www.instagram.com";

pub(crate) const GRAPHQL_PATH: &str = "/api/graphql";
pub(crate) const PROFILE_INFO_PATH: &str = "/api/v1/users/web_profile_info/";
pub(crate) const FOLLOWING_HASHTAGS_DOC_ID: &str = "17901966028246171";

pub(crate) mod selectors {
    pub const FOOTER: &str = "footer";
    pub const DIALOG_TAIL: &str = "div[role='dialog'] div[style*='flex-direction: column'] > div:last-child";
    pub const DIALOG_SEARCH: &str = "div[role='dialog'] input[type='text']";
    pub const HASHTAGS_TAB: &str = "div[role='dialog'] div[role='tablist'] > div:last-child";
    pub const LIKERS_LINK: &str = "a[href$='/liked_by/']";
    pub const COMMENTS_TAIL: &str = "article ul > div:last-child, div[role='dialog'] ul > div:last-child";
    pub const SEARCH_ICON: &str = "svg[aria-label='Search']";
    pub const SEARCH_INPUT: &str = "input[aria-label='Search input']";
}

/// Outcome of a paged collection: everything requested, or an error with what was gathered.
pub type Collected<T> = Result<CollectionResult<T>, CollectFailure<T>>;

pub(crate) fn finish<T>(harvest: Result<Harvest<T>, CollectFailure<T>>) -> Collected<T> {
    harvest.map(|harvest| harvest.result)
}

pub(crate) fn page_url(path: &str) -> String {
    format!("{INSTAGRAM_URL}/{}", path.trim_start_matches('/'))
}

/// Navigation to `/{username}/{tab}`, which also issues the profile request.
pub(crate) fn profile_action(username: &str, tab: &str) -> ActionSpec {
    ActionSpec::navigate("profile", page_url(&format!("{username}/{tab}")))
}

pub(crate) fn graphql() -> RequestPattern {
    RequestPattern::post(GRAPHQL_PATH).host(INSTAGRAM_HOST)
}

/// Runs collections for one authenticated browser session.
pub struct Collector {
    session: Session,
    config: CrawlerConfig,
    telemetry: Option<CollectTelemetry>,
}

impl Collector {
    pub fn new(session: Session, config: CrawlerConfig) -> Self {
        Self {
            session,
            config,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Option<CollectTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    fn engine(&self) -> PaginationEngine<'_> {
        PaginationEngine::new(&self.session, &self.config).with_telemetry(self.telemetry.as_ref())
    }

    async fn harvest<R: PagedResource>(
        &self,
        resource: &R,
        limit: usize,
    ) -> Result<Harvest<R::Item>, CollectFailure<R::Item>> {
        self.engine().collect(resource, limit).await
    }

    /// Opens `/{username}/{tab}` and reads the profile request that the page issues.
    async fn open_profile(&self, username: &str, tab: &str) -> CollectResult<UserInfo> {
        let action = profile_action(username, tab);
        let pattern = RequestPattern::get(PROFILE_INFO_PATH)
            .host(INSTAGRAM_HOST)
            .query("username", ParamMatch::Equals(username.to_string()));
        let page = self.engine().fetch_page("user_info", &action, &pattern).await?;
        let user = page
            .record
            .subtree("data.user")
            .ok_or_else(|| CollectError::NotFound(format!("user {username}")))?;
        EntityMapper.map(&user)
    }

    /// Resolves a profile for a user-scoped listing; `None` means the account is private.
    async fn open_public_profile(
        &self,
        username: &str,
        tab: &str,
        resource: &str,
    ) -> CollectResult<Option<UserInfo>> {
        let user = self.open_profile(username, tab).await?;
        if user.is_private_account() {
            warn!(username, resource, "Account is private, nothing to collect");
            return Ok(None);
        }
        Ok(Some(user))
    }
}
