use std::path::PathBuf;

use chrono::{DateTime, Local};
use url::Url;

use watch_avatars::{AvatarSource, AvatarStore};
use watch_baseline::{BaselineStore, ChangeDetector};
use watch_error::{Result, WatchError};
use watch_extract::auth::detect_auth_wall;
use watch_extract::avatar::resolve_avatar;
use watch_extract::hires::HiResLookup;
use watch_extract::stats::{resolve_stats, StatCounts};
use watch_extract::{ChainBudgets, Extraction, PageSurface};
use watch_fingerprint::{Fingerprint, FingerprintKind};
use watch_ledger::{Ledger, ProfileSnapshot};

/// Everything one watch pass needs to know, resolved from arguments
/// and environment before any I/O starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub subject: String,
    pub profile_url: Url,
    pub fingerprint_kind: FingerprintKind,
    pub strict: bool,
    pub budgets: ChainBudgets,
    pub baseline_path: PathBuf,
    pub ledger_path: PathBuf,
    pub avatar_dir: PathBuf,
    pub session_cookie: Option<String>,
}

/// How a completed run went. A run that fails fast never reaches an
/// outcome; it surfaces as a [`WatchError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Avatar resolved and all three counts present.
    Succeeded,
    /// The run finished and appended its row, but some field stayed
    /// absent or the avatar artifact could not be stored.
    DegradedSucceeded,
}

/// Drive one watch pass over an already-connected surface.
///
/// Ordering holds regardless of partial failures: the auth-wall probe
/// runs before any extraction chain, the baseline moves only after the
/// avatar artifact is on disk, and exactly one ledger row is appended
/// per run that got as far as loading the page.
pub async fn run(
    config: &RunConfig,
    surface: &dyn PageSurface,
    client: &reqwest::Client,
) -> Result<RunOutcome> {
    let baseline_store = BaselineStore::new(&config.baseline_path);
    let mut detector = ChangeDetector::load(&baseline_store)?;
    let ledger = Ledger::new(&config.ledger_path);
    let taken_at = Local::now();

    log::info!("watching {} at {}", config.subject, config.profile_url);
    surface.goto(&config.profile_url).await?;

    if let Some(signature) = detect_auth_wall(surface).await {
        ledger.append(&snapshot(config, &taken_at, &StatCounts::default(), false))?;
        return Err(WatchError::AuthenticationRequired(signature));
    }

    let avatar = resolve_avatar(surface, &config.budgets).await;
    let stats = resolve_stats(surface, &config.budgets).await;

    let mut picture_updated = false;
    let mut degraded = false;
    if let Extraction::Found(avatar_url) = &avatar {
        match avatar_fingerprint(config.fingerprint_kind, client, avatar_url).await {
            Some((fingerprint, prefetched)) => {
                if detector.is_update(&fingerprint) {
                    log::info!("avatar changed for {}", config.subject);
                    let source = avatar_source(config, client, avatar_url, prefetched).await;
                    let store = AvatarStore::new(&config.avatar_dir);
                    match store.save(client, source, &config.subject, &taken_at).await {
                        Ok(path) => {
                            if let Err(err) = detector.commit(&baseline_store, fingerprint) {
                                log::warn!(
                                    "artifact saved to {} but baseline not persisted: {err}",
                                    path.display()
                                );
                            }
                            picture_updated = true;
                        }
                        Err(err) => {
                            log::warn!("avatar changed but was not persisted: {err}");
                            degraded = true;
                        }
                    }
                } else {
                    log::debug!("avatar unchanged for {}", config.subject);
                }
            }
            None => degraded = true,
        }
    } else {
        log::warn!("no avatar strategy produced a URL for {}", config.subject);
    }

    ledger.append(&snapshot(config, &taken_at, &stats, picture_updated))?;

    if let Extraction::NotFound = avatar {
        if config.strict {
            return Err(WatchError::ChainExhausted("avatar"));
        }
        return Ok(RunOutcome::DegradedSucceeded);
    }
    if degraded || !stats.is_complete() {
        Ok(RunOutcome::DegradedSucceeded)
    } else {
        Ok(RunOutcome::Succeeded)
    }
}

fn snapshot(
    config: &RunConfig,
    taken_at: &DateTime<Local>,
    stats: &StatCounts,
    picture_updated: bool,
) -> ProfileSnapshot {
    ProfileSnapshot {
        taken_at: *taken_at,
        subject: config.subject.clone(),
        followers: stats.followers,
        following: stats.following,
        posts: stats.posts,
        picture_updated,
    }
}

/// Fingerprint the candidate per the configured strategy. Hash mode
/// needs the bytes, so they come back too for reuse as the artifact.
/// `None` means the avatar's identity could not be established this
/// run; the detector is then never consulted and the baseline stays.
async fn avatar_fingerprint(
    kind: FingerprintKind,
    client: &reqwest::Client,
    avatar_url: &Url,
) -> Option<(Fingerprint, Option<Vec<u8>>)> {
    match kind {
        FingerprintKind::NormalizedUrl => Some((Fingerprint::from_url(avatar_url), None)),
        FingerprintKind::ContentHash => match fetch_bytes(client, avatar_url).await {
            Ok(bytes) => Some((Fingerprint::from_bytes(&bytes), Some(bytes))),
            Err(err) => {
                log::warn!("could not fetch avatar for hashing: {err}");
                None
            }
        },
    }
}

async fn fetch_bytes(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>> {
    let bytes = client
        .get(url.as_str())
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

/// Pick where the artifact bytes come from. A confirmed change first
/// offers the authenticated lookup a chance to upgrade the URL to its
/// high-resolution variant; bytes already fetched for hashing are
/// reused as-is when no upgrade happened.
async fn avatar_source(
    config: &RunConfig,
    client: &reqwest::Client,
    avatar_url: &Url,
    prefetched: Option<Vec<u8>>,
) -> AvatarSource {
    let mut artifact_url = avatar_url.clone();
    if let Some(cookie) = &config.session_cookie {
        let lookup = HiResLookup::new(client.clone(), cookie.clone());
        if let Some(upgraded) = lookup.upgrade(&config.subject).await {
            artifact_url = upgraded;
        }
    }
    if artifact_url == *avatar_url {
        if let Some(bytes) = prefetched {
            return AvatarSource::Bytes(bytes);
        }
    }
    AvatarSource::Remote(artifact_url)
}
