mod automation;
mod error;
mod session;

pub use automation::{BrowserHandle, BrowserLauncher, LaunchOverrides};
pub use error::{BrowserError, BrowserResult};
pub use session::{ChromiumSession, PageSession};
