use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use watch_browser::BrowserConfig;
use watch_error::Result;
use watch_extract::ChainBudgets;
use watch_fingerprint::FingerprintKind;

use crate::run::RunConfig;

#[derive(Parser, Debug)]
#[clap(name = "profile-watch")]
#[clap(
    about = "Watch a public profile page for avatar and stat changes",
    long_about = None
)]
pub struct Cli {
    /// Profile handle to watch.
    #[clap(long, env = "WATCH_SUBJECT")]
    pub subject: String,

    /// Base URL the profile page lives under.
    #[clap(long, default_value = "https://www.instagram.com")]
    pub base_url: Url,

    /// How to reach the page.
    #[clap(long, value_enum, default_value_t = Engine::Webdriver)]
    pub engine: Engine,

    /// Webdriver endpoint, used by the webdriver engine.
    #[clap(long, env = "WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    /// Avatar identity strategy: compare normalized URLs, or hash the
    /// downloaded bytes to see through CDN path churn.
    #[clap(long, value_enum, default_value_t = FingerprintArg::Url)]
    pub fingerprint: FingerprintArg,

    /// Fail the run when no avatar strategy produces a URL.
    #[clap(long)]
    pub strict: bool,

    /// Directory avatar snapshots are written to.
    #[clap(long, default_value = "profile_pics")]
    pub avatar_dir: PathBuf,

    /// Append-only run history.
    #[clap(long, default_value = "profile_log.csv")]
    pub ledger: PathBuf,

    /// Single-slot baseline fingerprint file.
    #[clap(long, default_value = "last_avatar.txt")]
    pub baseline: PathBuf,

    /// Session cookie enabling the high-resolution avatar lookup.
    #[clap(long, env = "WATCH_SESSION")]
    pub session: Option<String>,

    /// Run the browser headless.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Full rendered session through a webdriver endpoint.
    Webdriver,
    /// Single static fetch of the page markup.
    Fetch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FingerprintArg {
    Url,
    Hash,
}

impl From<FingerprintArg> for FingerprintKind {
    fn from(arg: FingerprintArg) -> Self {
        match arg {
            FingerprintArg::Url => FingerprintKind::NormalizedUrl,
            FingerprintArg::Hash => FingerprintKind::ContentHash,
        }
    }
}

/// One parsed invocation: what to watch plus how to reach the page.
pub struct Invocation {
    pub config: RunConfig,
    pub engine: Engine,
    pub browser: BrowserConfig,
}

impl Cli {
    pub fn into_invocation(self) -> Result<Invocation> {
        let profile_url = self
            .base_url
            .join(&format!("{}/", self.subject.trim_matches('/')))?;
        let config = RunConfig {
            subject: self.subject,
            profile_url,
            fingerprint_kind: self.fingerprint.into(),
            strict: self.strict,
            budgets: ChainBudgets::default(),
            baseline_path: self.baseline,
            ledger_path: self.ledger,
            avatar_dir: self.avatar_dir,
            session_cookie: self.session,
        };
        let browser = BrowserConfig {
            webdriver_url: self.webdriver_url,
            headless: self.headless,
            ..BrowserConfig::default()
        };
        Ok(Invocation {
            config,
            engine: self.engine,
            browser,
        })
    }
}
