mod auth;
mod automation;
mod capture;
mod error;
mod trigger;

pub use auth::SessionCookieAuth;
pub use automation::{
    BrowserAutomation, BrowserContext, BrowserLauncher, LaunchOverrides, ViewportSpec,
};
pub use capture::CdpCaptureStore;
pub use error::{BrowserError, BrowserResult};
pub use trigger::BrowserActionTrigger;
