use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use instacrawl_core::browser::{BrowserLauncher, LaunchOverrides};
use instacrawl_core::collect::{
    CollectError, CollectFailure, CollectTelemetry, CollectionResult, TelemetryError,
};
use instacrawl_core::collectors::Collector;
use instacrawl_core::schema::{
    Comment, FriendshipStatus, Hashtag, HashtagBasicInfo, Liker, MusicPosts, Post, SearchResult,
    UserBasicInfo, UserInfo,
};
use instacrawl_core::{load_crawler_config, CrawlerConfig};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] instacrawl_core::ConfigError),
    #[error("browser error: {0}")]
    Browser(#[from] instacrawl_core::BrowserError),
    #[error("collection failed: {0}")]
    Collect(#[from] CollectError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Collects public Instagram data through a logged-in browser", long_about = None)]
pub struct Cli {
    /// Path to crawler.toml
    #[arg(long, default_value = "configs/crawler.toml")]
    pub config: PathBuf,
    /// Force a headless browser regardless of the config file
    #[arg(long, conflicts_with = "headed")]
    pub headless: bool,
    /// Force a visible browser window
    #[arg(long)]
    pub headed: bool,
    /// Reuse this Chromium profile directory (must already be logged in)
    #[arg(long)]
    pub user_data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> LaunchOverrides {
        let headless = match (self.headless, self.headed) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        LaunchOverrides {
            headless,
            user_data_dir: self.user_data_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Profile details of one user
    UserInfo { username: String },
    /// Whether two users follow each other
    Friendship { username1: String, username2: String },
    /// Timeline posts of a user
    Posts(UserListArgs),
    /// Reels of a user
    Reels(UserListArgs),
    /// Posts a user is tagged in
    Tagged(UserListArgs),
    /// Accounts following a user
    Followers(UserListArgs),
    /// Accounts a user follows
    Followings(UserListArgs),
    /// Hashtags a user follows
    #[command(name = "hashtags")]
    FollowingHashtags(UserListArgs),
    /// Accounts that liked a post
    Likers(PostListArgs),
    /// Comments under a post
    Comments(PostListArgs),
    /// Blended keyword search
    Search(SearchArgs),
    /// Hashtag profile with its top posts
    TopPosts(HashtagArgs),
    /// Posts using a music track
    Music(MusicArgs),
}

#[derive(Args, Debug)]
pub struct UserListArgs {
    pub username: String,
    /// Maximum items to collect, 0 for everything (defaults to pagination.default_limit)
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct PostListArgs {
    /// Shortcode from the post URL
    pub post_code: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    pub keyword: String,
    /// Use the logged-in account's personalised search
    #[arg(long)]
    pub personalised: bool,
}

#[derive(Args, Debug)]
pub struct HashtagArgs {
    pub tag: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct MusicArgs {
    pub music_id: String,
    #[arg(long)]
    pub limit: Option<usize>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = load_crawler_config(&cli.config)?;
    let base_dir = cli
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    if let Some(dir) = &config.chromium.user_data_dir {
        let resolved = config.resolve_path(&base_dir, dir);
        config.chromium.user_data_dir = Some(resolved.display().to_string());
    }
    let telemetry = CollectTelemetry::from_config(&config.observability, &base_dir)?;

    let automation = BrowserLauncher::new(config.clone())
        .launch_with_overrides(cli.overrides())
        .await?;
    let outcome = match automation.open_session().await {
        Ok(session) => {
            let collector = Collector::new(session, config).with_telemetry(telemetry);
            execute(&collector, &cli.command, cli.format).await
        }
        Err(err) => Err(err.into()),
    };
    automation.shutdown().await?;
    outcome
}

async fn execute(collector: &Collector, command: &Commands, format: OutputFormat) -> Result<()> {
    let limit = |requested: Option<usize>| resolve_limit(requested, collector.config());
    match command {
        Commands::UserInfo { username } => {
            render(&collector.collect_user_info(username).await?, format)
        }
        Commands::Friendship {
            username1,
            username2,
        } => render(
            &collector.get_friendship_status(username1, username2).await?,
            format,
        ),
        Commands::Posts(args) => collected(
            collector
                .collect_posts_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::Reels(args) => collected(
            collector
                .collect_reels_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::Tagged(args) => collected(
            collector
                .collect_tagged_posts_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::Followers(args) => collected(
            collector
                .collect_followers_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::Followings(args) => collected(
            collector
                .collect_followings_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::FollowingHashtags(args) => collected(
            collector
                .collect_following_hashtags_of_user(&args.username, limit(args.limit))
                .await,
            format,
        ),
        Commands::Likers(args) => collected(
            collector
                .collect_likers_of_post(&args.post_code, limit(args.limit))
                .await,
            format,
        ),
        Commands::Comments(args) => collected(
            collector
                .collect_comments_of_post(&args.post_code, limit(args.limit))
                .await,
            format,
        ),
        Commands::Search(args) => render(
            &collector
                .search_with_keyword(&args.keyword, args.personalised)
                .await?,
            format,
        ),
        Commands::TopPosts(args) => match collector
            .collect_top_posts_of_hashtag(&args.tag, limit(args.limit))
            .await
        {
            Ok(hashtag) => render(&hashtag, format),
            Err(failure) => partial(failure, format),
        },
        Commands::Music(args) => match collector
            .collect_posts_by_music_id(&args.music_id, limit(args.limit))
            .await
        {
            Ok(posts) => render(&posts, format),
            Err(failure) => partial(failure, format),
        },
    }
}

fn resolve_limit(requested: Option<usize>, config: &CrawlerConfig) -> usize {
    requested.unwrap_or(config.pagination.default_limit)
}

fn collected<T>(
    outcome: std::result::Result<CollectionResult<T>, CollectFailure<T>>,
    format: OutputFormat,
) -> Result<()>
where
    T: Serialize + Summary,
{
    match outcome {
        Ok(result) => {
            info!(count = result.count, "Collection complete");
            render(&result, format)
        }
        Err(failure) => partial(failure, format),
    }
}

/// Prints what was gathered before the failure, then reports the failure.
fn partial<T>(failure: CollectFailure<T>, format: OutputFormat) -> Result<()>
where
    T: Serialize + Summary,
{
    warn!(
        collected = failure.partial.count,
        error = %failure.error,
        "Collection stopped early, printing partial result"
    );
    render(&failure.partial, format)?;
    Err(AppError::Collect(failure.error))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

/// One-line text form of a collected item.
trait Summary {
    fn summary(&self) -> String;
}

impl<T: Summary> DisplayFallback for CollectionResult<T> {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} item(s)", self.count)];
        lines.extend(self.items.iter().map(|item| format!("  {}", item.summary())));
        lines.join("\n")
    }
}

impl Summary for UserBasicInfo {
    fn summary(&self) -> String {
        let verified = if self.is_verified { " ✓" } else { "" };
        format!("@{}{} ({}) {}", self.username, verified, self.id, self.fullname)
    }
}

impl Summary for Liker {
    fn summary(&self) -> String {
        self.user.summary()
    }
}

impl Summary for Post {
    fn summary(&self) -> String {
        format!(
            "{} {:?} by @{} likes={} comments={}",
            self.code, self.media_type, self.user.username, self.like_count, self.comment_count
        )
    }
}

impl Summary for Comment {
    fn summary(&self) -> String {
        format!(
            "@{}: {} (likes={})",
            self.user.username, self.text, self.comment_like_count
        )
    }
}

impl Summary for HashtagBasicInfo {
    fn summary(&self) -> String {
        format!("#{} posts={}", self.name, self.post_count)
    }
}

impl DisplayFallback for UserInfo {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("@{} ({})", self.username, self.id),
            format!("Name: {}", self.fullname),
            format!(
                "Followers: {} | Following: {} | Posts: {}",
                self.follower_count, self.following_count, self.post_count
            ),
            format!(
                "Private: {} | Verified: {}",
                self.is_private_account(),
                self.is_verified
            ),
        ];
        if !self.biography.is_empty() {
            lines.push(format!("Bio: {}", self.biography));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for FriendshipStatus {
    fn display(&self) -> String {
        format!(
            "following: {}\nfollowed_by: {}",
            self.following, self.followed_by
        )
    }
}

impl DisplayFallback for SearchResult {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Users ({})", self.users.len()));
        for entry in &self.users {
            lines.push(format!("  {}. {}", entry.position, entry.user.summary()));
        }
        lines.push(format!("Hashtags ({})", self.hashtags.len()));
        for entry in &self.hashtags {
            lines.push(format!("  {}. {}", entry.position, entry.hashtag.summary()));
        }
        lines.push(format!("Places ({})", self.places.len()));
        for entry in &self.places {
            lines.push(format!("  {}. {}", entry.position, entry.place.location.name));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Hashtag {
    fn display(&self) -> String {
        let mut lines = vec![
            self.profile.info.summary(),
            format!("Top posts: {}", self.count),
        ];
        lines.extend(self.posts.iter().map(|post| format!("  {}", post.summary())));
        lines.join("\n")
    }
}

impl DisplayFallback for MusicPosts {
    fn display(&self) -> String {
        let title = self
            .music
            .as_ref()
            .and_then(|music| music.title.clone())
            .unwrap_or_else(|| "unknown track".to_string());
        let mut lines = vec![
            format!("{title} clips={} photos={}", self.clips_count, self.photos_count),
            format!("Posts: {}", self.count),
        ];
        lines.extend(self.posts.iter().map(|post| format!("  {}", post.summary())));
        lines.join("\n")
    }
}
