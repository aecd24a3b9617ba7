use serde_json::Value;
use url::Url;

use watch_error::{Result, WatchError};

/// Authenticated two-step lookup for the full-resolution avatar. Only
/// ever invoked to upgrade a URL the chain already confirmed changed;
/// every failure here degrades silently back to the on-page URL.
pub struct HiResLookup {
    client: reqwest::Client,
    subject_endpoint: String,
    detail_endpoint: String,
    session_cookie: String,
}

pub const DEFAULT_SUBJECT_ENDPOINT: &str =
    "https://i.instagram.com/api/v1/users/web_profile_info/?username={subject}";
pub const DEFAULT_DETAIL_ENDPOINT: &str = "https://i.instagram.com/api/v1/users/{id}/info/";

/// Application id the mobile web client sends; the endpoints refuse
/// requests without it.
const APP_ID_HEADER: &str = "x-ig-app-id";
const APP_ID: &str = "936619743392459";

impl HiResLookup {
    pub fn new(client: reqwest::Client, session_cookie: String) -> Self {
        Self::with_endpoints(
            client,
            DEFAULT_SUBJECT_ENDPOINT.to_string(),
            DEFAULT_DETAIL_ENDPOINT.to_string(),
            session_cookie,
        )
    }

    /// Endpoint templates carry `{subject}` and `{id}` placeholders.
    pub fn with_endpoints(
        client: reqwest::Client,
        subject_endpoint: String,
        detail_endpoint: String,
        session_cookie: String,
    ) -> Self {
        HiResLookup {
            client,
            subject_endpoint,
            detail_endpoint,
            session_cookie,
        }
    }

    /// Resolve the high-resolution avatar variant, or nothing.
    pub async fn upgrade(&self, subject: &str) -> Option<Url> {
        let id = match self.subject_id(subject).await {
            Ok(id) => id,
            Err(err) => {
                log::warn!("subject id lookup failed: {err}");
                return None;
            }
        };
        match self.detail_picture(&id).await {
            Ok(url) => {
                log::debug!("high-resolution avatar: {url}");
                Some(url)
            }
            Err(err) => {
                log::warn!("detail lookup failed: {err}");
                None
            }
        }
    }

    async fn subject_id(&self, subject: &str) -> Result<String> {
        let url = self.subject_endpoint.replace("{subject}", subject);
        let value = self.get_json(&url).await?;
        value
            .pointer("/data/user/id")
            .and_then(id_text)
            .ok_or_else(|| WatchError::Parse("subject lookup carried no user id".to_string()))
    }

    async fn detail_picture(&self, id: &str) -> Result<Url> {
        let url = self.detail_endpoint.replace("{id}", id);
        let value = self.get_json(&url).await?;
        let raw = value
            .pointer("/user/hd_profile_pic_url_info/url")
            .and_then(Value::as_str)
            .ok_or_else(|| WatchError::Parse("detail lookup carried no picture".to_string()))?;
        Ok(Url::parse(raw)?)
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let value = self
            .client
            .get(url)
            .header(APP_ID_HEADER, APP_ID)
            .header(reqwest::header::COOKIE, self.cookie_header())
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    }

    fn cookie_header(&self) -> String {
        if self.session_cookie.contains('=') {
            self.session_cookie.clone()
        } else {
            format!("sessionid={}", self.session_cookie)
        }
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// One-shot HTTP fixture: serves the canned bodies in order, one
    /// connection per body.
    async fn spawn_fixture(bodies: Vec<String>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let _ = socket.read(&mut buf).await.unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
content-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn upgrade_walks_both_lookups() {
        let subject_body =
            r#"{"data":{"user":{"id":"4021","username":"ghost"}}}"#.to_string();
        let detail_body = concat!(
            r#"{"user":{"hd_profile_pic_url_info":"#,
            r#"{"url":"https://cdn.example/hd_4021.jpg","width":1080}}}"#
        )
        .to_string();
        let addr = spawn_fixture(vec![subject_body, detail_body]).await;

        let lookup = HiResLookup::with_endpoints(
            reqwest::Client::new(),
            format!("http://{addr}/profile?u={{subject}}"),
            format!("http://{addr}/detail/{{id}}/"),
            "sessionid=abc123".to_string(),
        );
        let url = lookup.upgrade("ghost").await;
        assert_eq!(
            url.map(String::from).as_deref(),
            Some("https://cdn.example/hd_4021.jpg")
        );
    }

    #[tokio::test]
    async fn malformed_subject_lookup_degrades_to_none() {
        let addr = spawn_fixture(vec![r#"{"data":{"user":{}}}"#.to_string()]).await;
        let lookup = HiResLookup::with_endpoints(
            reqwest::Client::new(),
            format!("http://{addr}/profile?u={{subject}}"),
            format!("http://{addr}/detail/{{id}}/"),
            "abc123".to_string(),
        );
        assert_eq!(lookup.upgrade("ghost").await, None);
    }

    #[test]
    fn bare_session_value_gets_cookie_name() {
        let bare = HiResLookup::new(reqwest::Client::new(), "abc123".to_string());
        assert_eq!(bare.cookie_header(), "sessionid=abc123");
        let full = HiResLookup::new(reqwest::Client::new(), "sessionid=abc123".to_string());
        assert_eq!(full.cookie_header(), "sessionid=abc123");
    }
}
