//! 浏览器层：会话边界、标签页交接，以及（feature "browser"）基于 Headless Chrome 的实现

pub mod handoff;
pub mod session;

#[cfg(feature = "browser")]
pub mod chrome;
#[cfg(feature = "browser")]
pub mod chrome_executor;

pub use handoff::handoff;
pub use session::{BrowserSession, OpenTab, TabHandle};

#[cfg(feature = "browser")]
pub use chrome::{ChromeSession, ChromeSessionOptions};
#[cfg(feature = "browser")]
pub use chrome_executor::ChromeStepExecutor;
