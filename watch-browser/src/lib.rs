pub mod fetcher;
pub mod webdriver;

pub use fetcher::StaticSurface;
pub use webdriver::{BrowserConfig, WebdriverSurface, MOBILE_USER_AGENT};
