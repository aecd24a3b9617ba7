mod cli;
mod lock;
mod run;

use std::time::Duration;

use clap::Parser;

use watch_browser::{StaticSurface, WebdriverSurface, MOBILE_USER_AGENT};
use watch_error::{Result, WatchError};
use watch_extract::PageSurface;

use crate::cli::{Cli, Engine, Invocation};
use crate::lock::RunLock;
use crate::run::{run, RunOutcome};

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Cli::parse();
    let invocation = match args.into_invocation() {
        Ok(invocation) => invocation,
        Err(err) => {
            println!("Bad arguments: {err}");
            std::process::exit(1);
        }
    };

    match execute(invocation).await {
        Ok(RunOutcome::Succeeded) => println!("Run complete."),
        Ok(RunOutcome::DegradedSucceeded) => println!("Run complete, some fields absent."),
        Err(err) => {
            log::error!("run failed: {err}");
            println!("Error: {err}");
            std::process::exit(match err {
                WatchError::BrowserUnavailable(_) => 3,
                WatchError::AuthenticationRequired(_) => 2,
                _ => 1,
            });
        }
    }
}

async fn execute(invocation: Invocation) -> Result<RunOutcome> {
    let Invocation {
        config,
        engine,
        browser,
    } = invocation;

    let _lock = RunLock::acquire(&config.baseline_path.with_extension("lock"))?;

    let client = download_client()?;

    let mut surface: Box<dyn PageSurface> = match engine {
        Engine::Webdriver => Box::new(WebdriverSurface::connect(&browser).await?),
        Engine::Fetch => Box::new(StaticSurface::new(&browser.user_agent)?),
    };

    // The session is released on every path out of the run.
    let outcome = run(&config, surface.as_ref(), &client).await;
    if let Err(err) = surface.close().await {
        log::warn!("surface did not close cleanly: {err}");
    }
    outcome
}

/// Client for artifact downloads and the high-resolution lookup. It
/// identifies itself the same way the page surfaces do.
fn download_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(MOBILE_USER_AGENT)
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(client)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn downloads_identify_as_mobile_safari() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let read = socket.read(&mut buf).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf[..read]).into_owned());
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let client = download_client().unwrap();
        client
            .get(format!("http://{addr}/avatar.jpg"))
            .send()
            .await
            .unwrap();

        let request = rx.await.unwrap().to_ascii_lowercase();
        assert!(
            request.contains("user-agent: mozilla/5.0 (iphone"),
            "request was: {request}"
        );
    }
}
