use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::RwLock;
use url::Url;

use watch_error::{Result, WatchError};
use watch_extract::PageSurface;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Pull-only fallback surface: one GET for the markup, selector
/// queries answered from the parsed document. No scripts, no
/// screenshots, no late rendering, so strategies that need a live page
/// simply miss here.
pub struct StaticSurface {
    client: reqwest::Client,
    // The parsed document is not Send, so the raw markup is what lives
    // across awaits; each query re-parses it.
    markup: RwLock<Option<String>>,
    location: RwLock<Option<Url>>,
}

impl StaticSurface {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_str(user_agent)
                .map_err(|err| WatchError::Parse(format!("bad user agent: {err}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(FETCH_TIMEOUT)
            .build()?;
        Ok(StaticSurface {
            client,
            markup: RwLock::new(None),
            location: RwLock::new(None),
        })
    }

    #[cfg(test)]
    fn with_markup(markup: &str) -> Self {
        StaticSurface {
            client: reqwest::Client::new(),
            markup: RwLock::new(Some(markup.to_string())),
            location: RwLock::new(None),
        }
    }

    async fn document(&self) -> Result<String> {
        self.markup
            .read()
            .await
            .clone()
            .ok_or_else(|| WatchError::Other(anyhow::anyhow!("no page loaded yet")))
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|_| WatchError::Parse(format!("unparseable selector: {selector}")))
}

#[async_trait]
impl PageSurface for StaticSurface {
    async fn goto(&self, url: &Url) -> Result<()> {
        let fetch_err =
            |err: reqwest::Error| WatchError::BrowserUnavailable(format!("page fetch failed: {err}"));
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(fetch_err)?
            .error_for_status()
            .map_err(fetch_err)?;
        // The landing address differs from the request on redirects.
        let landed = response.url().clone();
        let markup = response.text().await.map_err(fetch_err)?;
        log::debug!("fetched {} bytes of markup from {landed}", markup.len());
        *self.markup.write().await = Some(markup);
        *self.location.write().await = Some(landed);
        Ok(())
    }

    async fn current_url(&self) -> Result<Url> {
        self.location
            .read()
            .await
            .clone()
            .ok_or_else(|| WatchError::Other(anyhow::anyhow!("no page loaded yet")))
    }

    async fn markup(&self) -> Result<String> {
        self.document().await
    }

    async fn attr_first(&self, selector: &str, attr: &str) -> Result<Option<String>> {
        let markup = self.document().await?;
        let selector = compile(selector)?;
        let html = Html::parse_document(&markup);
        Ok(html
            .select(&selector)
            .find_map(|element| element.value().attr(attr).map(str::to_string)))
    }

    async fn attr_all(&self, selector: &str, attr: &str) -> Result<Vec<String>> {
        let markup = self.document().await?;
        let selector = compile(selector)?;
        let html = Html::parse_document(&markup);
        Ok(html
            .select(&selector)
            .filter_map(|element| element.value().attr(attr).map(str::to_string))
            .collect())
    }

    async fn text_all(&self, selector: &str) -> Result<Vec<String>> {
        let markup = self.document().await?;
        let selector = compile(selector)?;
        let html = Html::parse_document(&markup);
        Ok(html
            .select(&selector)
            .map(|element| element.text().collect::<String>())
            .collect())
    }

    async fn eval(&self, _script: &str) -> Result<Value> {
        // No script engine. Strategies that need one read null as a miss.
        Ok(Value::Null)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Err(WatchError::Other(anyhow::anyhow!(
            "static surface cannot take screenshots"
        )))
    }

    async fn close(&mut self) -> Result<()> {
        *self.markup.write().await = None;
        *self.location.write().await = None;
        Ok(())
    }
}
