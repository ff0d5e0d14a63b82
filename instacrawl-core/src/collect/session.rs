use std::cell::Cell;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::capture::CaptureStore;
use super::error::CollectResult;

/// One primitive browser interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    Navigate { url: String },
    Click { selector: String },
    TypeText { selector: String, text: String },
    ScrollIntoView { selector: String },
    ScrollWindow,
}

/// A named sequence of interactions expected to make the page issue one request.
///
/// A spec without steps means the request was already set off by the previous
/// action, so its response is searched from that earlier trigger time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub name: String,
    pub steps: Vec<Action>,
    pub cursor: Option<String>,
    /// Re-issues the request a settle spec waits on when a retry needs a fresh response.
    pub replay: Option<Box<ActionSpec>>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            cursor: None,
            replay: None,
        }
    }

    pub fn navigate(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(name).then(Action::Navigate { url: url.into() })
    }

    /// Waits on the response of the previous trigger.
    pub fn settle(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    pub fn then(mut self, action: Action) -> Self {
        self.steps.push(action);
        self
    }

    pub fn click(self, selector: impl Into<String>) -> Self {
        self.then(Action::Click {
            selector: selector.into(),
        })
    }

    pub fn type_text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.then(Action::TypeText {
            selector: selector.into(),
            text: text.into(),
        })
    }

    pub fn scroll_into_view(self, selector: impl Into<String>) -> Self {
        self.then(Action::ScrollIntoView {
            selector: selector.into(),
        })
    }

    pub fn scroll_window(self) -> Self {
        self.then(Action::ScrollWindow)
    }

    /// Sets the action to perform again when a settle spec is retried.
    pub fn replaying(mut self, action: ActionSpec) -> Self {
        self.replay = Some(Box::new(action));
        self
    }

    pub fn with_cursor(mut self, cursor: Option<&str>) -> Self {
        self.cursor = cursor.map(str::to_string);
        self
    }

    pub fn is_settle(&self) -> bool {
        self.steps.is_empty()
    }
}

#[async_trait(?Send)]
pub trait ActionTrigger {
    async fn perform(&self, spec: &ActionSpec) -> CollectResult<()>;
}

#[async_trait(?Send)]
pub trait SessionAuth {
    async fn is_valid(&self) -> bool;
}

/// The authenticated browser handle every collection runs against.
pub struct Session {
    trigger: Box<dyn ActionTrigger>,
    captures: Box<dyn CaptureStore>,
    auth: Box<dyn SessionAuth>,
    last_trigger: Cell<Option<DateTime<Utc>>>,
}

impl Session {
    pub fn new(
        trigger: Box<dyn ActionTrigger>,
        captures: Box<dyn CaptureStore>,
        auth: Box<dyn SessionAuth>,
    ) -> Self {
        Self {
            trigger,
            captures,
            auth,
            last_trigger: Cell::new(None),
        }
    }

    pub fn captures(&self) -> &dyn CaptureStore {
        self.captures.as_ref()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth.is_valid().await
    }

    /// Performs `spec` and returns the instant its responses may start from.
    ///
    /// `attempt` is zero-based. A settle spec reuses the previous trigger time on
    /// its first attempt and performs its replay action on later ones.
    pub async fn trigger(&self, spec: &ActionSpec, attempt: usize) -> CollectResult<DateTime<Utc>> {
        let spec = match (spec.is_settle(), spec.replay.as_deref()) {
            (true, Some(replay)) if attempt > 0 => replay,
            (true, _) => return Ok(self.last_trigger.get().unwrap_or_else(Utc::now)),
            (false, _) => spec,
        };
        let started = Utc::now();
        self.trigger.perform(spec).await?;
        self.last_trigger.set(Some(started));
        Ok(started)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("last_trigger", &self.last_trigger.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::capture::SharedCaptureLog;
    use std::rc::Rc;

    struct CountingTrigger(Rc<Cell<usize>>);

    #[async_trait(?Send)]
    impl ActionTrigger for CountingTrigger {
        async fn perform(&self, _spec: &ActionSpec) -> CollectResult<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    struct AlwaysValid;

    #[async_trait(?Send)]
    impl SessionAuth for AlwaysValid {
        async fn is_valid(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn settle_reuses_previous_trigger_time() {
        let performed = Rc::new(Cell::new(0));
        let session = Session::new(
            Box::new(CountingTrigger(Rc::clone(&performed))),
            Box::new(SharedCaptureLog::new(4)),
            Box::new(AlwaysValid),
        );
        let navigated = session
            .trigger(&ActionSpec::navigate("profile", "https://www.instagram.com/nasa/"), 0)
            .await
            .unwrap();
        let settled = session.trigger(&ActionSpec::settle("posts"), 0).await.unwrap();
        assert_eq!(navigated, settled);
        assert_eq!(performed.get(), 1);

        let retried = session.trigger(&ActionSpec::settle("posts"), 2).await.unwrap();
        assert_eq!(retried, navigated);
        assert_eq!(performed.get(), 1);
    }

    #[tokio::test]
    async fn retried_settle_performs_its_replay() {
        let performed = Rc::new(Cell::new(0));
        let session = Session::new(
            Box::new(CountingTrigger(Rc::clone(&performed))),
            Box::new(SharedCaptureLog::new(4)),
            Box::new(AlwaysValid),
        );
        let profile = ActionSpec::navigate("profile", "https://www.instagram.com/nasa/");
        let first = session.trigger(&profile, 0).await.unwrap();
        let posts = ActionSpec::settle("posts").replaying(profile);

        assert_eq!(session.trigger(&posts, 0).await.unwrap(), first);
        assert_eq!(performed.get(), 1);

        let replayed = session.trigger(&posts, 1).await.unwrap();
        assert!(replayed >= first);
        assert_eq!(performed.get(), 2);
        assert!(posts.is_settle());
    }

    #[test]
    fn builder_keeps_step_order() {
        let spec = ActionSpec::navigate("followers", "https://www.instagram.com/nasa/")
            .click("a[href='/nasa/followers/']")
            .scroll_window()
            .with_cursor(Some("12"));
        assert_eq!(spec.steps.len(), 3);
        assert!(matches!(spec.steps[1], Action::Click { .. }));
        assert_eq!(spec.cursor.as_deref(), Some("12"));
        assert!(!spec.is_settle());
    }
}
