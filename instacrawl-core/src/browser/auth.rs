use async_trait::async_trait;
use chromiumoxide::page::Page;
use tracing::warn;

use crate::collect::SessionAuth;

const SESSION_COOKIE: &str = "sessionid";

/// Treats the page as logged in while it carries a non-empty session cookie.
#[derive(Debug, Clone)]
pub struct SessionCookieAuth {
    page: Page,
}

impl SessionCookieAuth {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait(?Send)]
impl SessionAuth for SessionCookieAuth {
    async fn is_valid(&self) -> bool {
        match self.page.get_cookies().await {
            Ok(cookies) => cookies
                .iter()
                .any(|cookie| cookie.name == SESSION_COOKIE && !cookie.value.is_empty()),
            Err(err) => {
                warn!(error = %err, "Unable to read session cookies");
                false
            }
        }
    }
}
