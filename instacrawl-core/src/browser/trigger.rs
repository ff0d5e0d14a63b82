use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::element::Element;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::collect::{Action, ActionSpec, ActionTrigger, CollectResult};
use crate::config::ActionSection;

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};

/// Drives a page through the interactions of an [`ActionSpec`].
#[derive(Debug, Clone)]
pub struct BrowserActionTrigger {
    context: BrowserContext,
    config: ActionSection,
}

impl BrowserActionTrigger {
    pub fn new(context: BrowserContext, config: ActionSection) -> Self {
        Self { context, config }
    }

    async fn run_step(&self, step: &Action) -> BrowserResult<()> {
        match step {
            Action::Navigate { url } => self.context.goto(url).await,
            Action::Click { selector } => {
                let element = self.find(selector).await?;
                element.click().await.map_err(|err| {
                    BrowserError::Unexpected(format!("click on {selector} failed: {err}"))
                })?;
                Ok(())
            }
            Action::TypeText { selector, text } => {
                let element = self.find(selector).await?;
                element.click().await?;
                element.type_str(text).await.map_err(|err| {
                    BrowserError::Unexpected(format!("typing into {selector} failed: {err}"))
                })?;
                Ok(())
            }
            Action::ScrollIntoView { selector } => {
                let element = self.find(selector).await?;
                element.scroll_into_view().await?;
                Ok(())
            }
            Action::ScrollWindow => {
                let script = format!("window.scrollBy(0, {});", self.config.scroll_step_px);
                self.context.page().evaluate(script.as_str()).await?;
                Ok(())
            }
        }
    }

    async fn find(&self, selector: &str) -> BrowserResult<Element> {
        self.context
            .page()
            .find_element(selector.to_string())
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))
    }

    async fn idle(&self) {
        let [lower, upper] = self.config.idle_range_ms;
        let millis = if upper > lower {
            rand::thread_rng().gen_range(lower..=upper)
        } else {
            lower
        };
        trace!(millis, "Idling after step");
        sleep(Duration::from_millis(millis)).await;
    }
}

#[async_trait(?Send)]
impl ActionTrigger for BrowserActionTrigger {
    async fn perform(&self, spec: &ActionSpec) -> CollectResult<()> {
        debug!(action = %spec.name, steps = spec.steps.len(), cursor = ?spec.cursor, "Performing action");
        for step in &spec.steps {
            self.run_step(step).await?;
            self.idle().await;
        }
        Ok(())
    }
}
