use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use thirtyfour::prelude::*;
use url::Url;

use watch_error::{Result, WatchError};
use watch_extract::PageSurface;

/// Mobile portrait sessions get the lightweight page layout the
/// extraction selectors target.
pub const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 16_5 like Mac OS X) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.5 Mobile/15E148 Safari/604.1";

/// Consent banner confirmations, most conservative first.
const CONSENT_PHRASES: [&str; 5] = [
    "Only allow essential cookies",
    "Allow all cookies",
    "Accept all",
    "Allow essential cookies",
    "Accept",
];

const CONSENT_BUDGET: Duration = Duration::from_secs(3);
const CONSENT_SETTLE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub user_agent: String,
    pub window_size: (u32, u32),
    pub lang: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        BrowserConfig {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            user_agent: MOBILE_USER_AGENT.to_string(),
            window_size: (390, 844),
            lang: "en-US,en".to_string(),
        }
    }
}

/// Live page behind a webdriver session.
pub struct WebdriverSurface {
    driver: Option<WebDriver>,
}

impl WebdriverSurface {
    /// Start a session against a running webdriver endpoint. A refusing
    /// endpoint or a rejected capability set both surface as
    /// [`WatchError::BrowserUnavailable`].
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if config.headless {
            caps.add_arg("--headless=new").map_err(unavailable)?;
        }
        caps.set_no_sandbox().map_err(unavailable)?;
        caps.set_disable_gpu().map_err(unavailable)?;
        caps.set_disable_dev_shm_usage().map_err(unavailable)?;
        let (width, height) = config.window_size;
        caps.add_arg(&format!("--window-size={width},{height}"))
            .map_err(unavailable)?;
        caps.add_arg(&format!("--lang={}", config.lang))
            .map_err(unavailable)?;
        caps.add_arg(&format!("--user-agent={}", config.user_agent))
            .map_err(unavailable)?;

        let driver = WebDriver::new(&config.webdriver_url, caps)
            .await
            .map_err(unavailable)?;
        log::info!("webdriver session started at {}", config.webdriver_url);
        Ok(WebdriverSurface {
            driver: Some(driver),
        })
    }

    fn driver(&self) -> Result<&WebDriver> {
        self.driver
            .as_ref()
            .ok_or_else(|| WatchError::BrowserUnavailable("session already closed".to_string()))
    }
}

fn unavailable(err: impl std::fmt::Display) -> WatchError {
    WatchError::BrowserUnavailable(err.to_string())
}

fn webdriver_err(err: WebDriverError) -> WatchError {
    WatchError::Other(anyhow::anyhow!("webdriver: {err}"))
}

/// Case-insensitive containment, so suffixed or decorated labels like
/// "Allow all cookies and continue" still count as a match.
fn label_matches(label: &str, phrase: &str) -> bool {
    label
        .to_ascii_lowercase()
        .contains(&phrase.to_ascii_lowercase())
}

/// Click through a consent banner if one covers the page. Best effort:
/// most pages have no banner, and a click racing the banner's own
/// dismissal is fine to lose.
async fn dismiss_consent(driver: &WebDriver) {
    let deadline = Instant::now() + CONSENT_BUDGET;
    loop {
        let buttons = match driver.find_all(By::Css("button")).await {
            Ok(buttons) => buttons,
            Err(_) => return,
        };
        let mut labeled = Vec::new();
        for button in buttons {
            if let Ok(text) = button.text().await {
                labeled.push((button, text.trim().to_string()));
            }
        }
        for phrase in CONSENT_PHRASES {
            if let Some((button, text)) = labeled
                .iter()
                .find(|(_, text)| label_matches(text, phrase))
            {
                if button.click().await.is_ok() {
                    log::debug!("dismissed consent banner via {text:?}");
                    tokio::time::sleep(CONSENT_SETTLE).await;
                }
                return;
            }
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(CONSENT_SETTLE).await;
    }
}

#[async_trait]
impl PageSurface for WebdriverSurface {
    async fn goto(&self, url: &Url) -> Result<()> {
        let driver = self.driver()?;
        driver
            .goto(url.as_str())
            .await
            .map_err(|err| WatchError::BrowserUnavailable(format!("navigation failed: {err}")))?;
        dismiss_consent(driver).await;
        Ok(())
    }

    async fn current_url(&self) -> Result<Url> {
        self.driver()?.current_url().await.map_err(webdriver_err)
    }

    async fn markup(&self) -> Result<String> {
        self.driver()?.source().await.map_err(webdriver_err)
    }

    async fn attr_first(&self, selector: &str, attr: &str) -> Result<Option<String>> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(webdriver_err)?;
        for element in elements {
            if let Some(value) = element.attr(attr).await.map_err(webdriver_err)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn attr_all(&self, selector: &str, attr: &str) -> Result<Vec<String>> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(webdriver_err)?;
        let mut values = Vec::new();
        for element in elements {
            if let Some(value) = element.attr(attr).await.map_err(webdriver_err)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    async fn text_all(&self, selector: &str) -> Result<Vec<String>> {
        let elements = self
            .driver()?
            .find_all(By::Css(selector))
            .await
            .map_err(webdriver_err)?;
        let mut texts = Vec::new();
        for element in elements {
            texts.push(element.text().await.map_err(webdriver_err)?);
        }
        Ok(texts)
    }

    async fn eval(&self, script: &str) -> Result<Value> {
        let ret = self
            .driver()?
            .execute(script, Vec::<Value>::new())
            .await
            .map_err(webdriver_err)?;
        Ok(ret.json().clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.driver()?
            .screenshot_as_png()
            .await
            .map_err(webdriver_err)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            driver.quit().await.map_err(webdriver_err)?;
            log::info!("webdriver session closed");
        }
        Ok(())
    }
}
