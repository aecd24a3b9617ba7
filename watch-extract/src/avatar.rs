use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::{ChainBudgets, Extraction, PageSurface};

/// Ordered avatar strategies, highest fidelity first. Adding, removing
/// or reordering a tier is a data change here, not a control-flow
/// rewrite.
pub const AVATAR_CHAIN: [AvatarStrategy; 4] = [
    AvatarStrategy::AltLabel,
    AvatarStrategy::HeaderWidest,
    AvatarStrategy::ShareCard,
    AvatarStrategy::MarkupJson,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvatarStrategy {
    /// An image labeled as the profile picture. Matched by containment
    /// so partially localized labels still hit.
    AltLabel,
    /// Widest naturally rendered header image on a content-delivery
    /// host. Needs a script-capable surface.
    HeaderWidest,
    /// Social-share card image, equivalent metadata spellings in order.
    ShareCard,
    /// Picture URL embedded as a JSON string in the raw markup.
    MarkupJson,
}

const ALT_LABEL_SELECTORS: [&str; 3] = [
    "img[alt*='profile picture']",
    "header img[alt*='profile picture']",
    "header a img",
];

const SHARE_CARD_SELECTORS: [(&str, &str); 4] = [
    ("meta[property='og:image']", "content"),
    ("meta[name='og:image']", "content"),
    ("meta[property='og:image:secure_url']", "content"),
    ("meta[name='twitter:image']", "content"),
];

/// Host fragments of the CDNs profile media is served from. Header
/// images on other hosts are sprites and icons, not the avatar.
const CDN_HOST_HINTS: [&str; 2] = ["cdninstagram", "fbcdn"];

const HEADER_IMAGES_SCRIPT: &str = "return Array.from(document.querySelectorAll('header img'))\
    .map(function (img) { return { src: img.currentSrc || img.src || '', \
width: img.naturalWidth || 0 }; });";

static MARKUP_PIC_HD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""profile_pic_url_hd"\s*:\s*"((?:\\.|[^"\\])+)""#).unwrap());
static MARKUP_PIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""profile_pic_url"\s*:\s*"((?:\\.|[^"\\])+)""#).unwrap());

/// Run the avatar chain and return the first hit. A strategy that
/// errors internally counts as a miss and the chain moves on.
pub async fn resolve_avatar(surface: &dyn PageSurface, budgets: &ChainBudgets) -> Extraction<Url> {
    for strategy in AVATAR_CHAIN {
        match run_strategy(surface, strategy, budgets).await {
            Extraction::Found(url) => {
                log::debug!("avatar resolved by {strategy:?}: {url}");
                return Extraction::Found(url);
            }
            Extraction::NotFound => log::debug!("avatar strategy {strategy:?} missed"),
        }
    }
    Extraction::NotFound
}

async fn run_strategy(
    surface: &dyn PageSurface,
    strategy: AvatarStrategy,
    budgets: &ChainBudgets,
) -> Extraction<Url> {
    match strategy {
        AvatarStrategy::AltLabel => alt_label(surface, budgets).await,
        AvatarStrategy::HeaderWidest => header_widest(surface).await,
        AvatarStrategy::ShareCard => share_card(surface).await,
        AvatarStrategy::MarkupJson => markup_json(surface).await,
    }
}

/// Labeled images render late on slow pages, so this tier re-probes
/// until its budget runs out. Always probes at least once.
async fn alt_label(surface: &dyn PageSurface, budgets: &ChainBudgets) -> Extraction<Url> {
    let deadline = Instant::now() + budgets.avatar;
    loop {
        for selector in ALT_LABEL_SELECTORS {
            match surface.attr_first(selector, "src").await {
                Ok(Some(src)) => {
                    if let Some(url) = parse_candidate(&src) {
                        return Extraction::Found(url);
                    }
                }
                Ok(None) => {}
                Err(err) => log::debug!("avatar selector {selector} failed: {err}"),
            }
        }
        if Instant::now() >= deadline {
            return Extraction::NotFound;
        }
        tokio::time::sleep(budgets.step).await;
    }
}

#[derive(Debug, Deserialize)]
struct HeaderImage {
    #[serde(default)]
    src: String,
    #[serde(default)]
    width: u64,
}

async fn header_widest(surface: &dyn PageSurface) -> Extraction<Url> {
    let value = match surface.eval(HEADER_IMAGES_SCRIPT).await {
        Ok(value) => value,
        Err(err) => {
            log::debug!("header image script failed: {err}");
            return Extraction::NotFound;
        }
    };
    let images: Vec<HeaderImage> = match serde_json::from_value(value) {
        Ok(images) => images,
        Err(_) => return Extraction::NotFound,
    };
    images
        .into_iter()
        .filter(|image| image.width > 0)
        .filter_map(|image| parse_candidate(&image.src).map(|url| (url, image.width)))
        .filter(|(url, _)| is_cdn_host(url))
        .max_by_key(|(_, width)| *width)
        .map(|(url, _)| url)
        .into()
}

async fn share_card(surface: &dyn PageSurface) -> Extraction<Url> {
    for (selector, attr) in SHARE_CARD_SELECTORS {
        match surface.attr_first(selector, attr).await {
            Ok(Some(content)) => {
                if let Some(url) = parse_candidate(&content) {
                    return Extraction::Found(url);
                }
            }
            Ok(None) => {}
            Err(err) => log::debug!("avatar selector {selector} failed: {err}"),
        }
    }
    Extraction::NotFound
}

async fn markup_json(surface: &dyn PageSurface) -> Extraction<Url> {
    let markup = match surface.markup().await {
        Ok(markup) => markup,
        Err(err) => {
            log::debug!("markup read failed: {err}");
            return Extraction::NotFound;
        }
    };
    for re in [&*MARKUP_PIC_HD_RE, &*MARKUP_PIC_RE] {
        if let Some(caps) = re.captures(&markup) {
            if let Some(url) = parse_candidate(&decode_embedded_url(&caps[1])) {
                return Extraction::Found(url);
            }
        }
    }
    Extraction::NotFound
}

fn parse_candidate(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Url::parse(raw).ok()
}

fn is_cdn_host(url: &Url) -> bool {
    url.host_str()
        .map(|host| CDN_HOST_HINTS.iter().any(|hint| host.contains(hint)))
        .unwrap_or(false)
}

/// Undo the escaping a URL picks up when embedded as a JSON string:
/// `\/`, `\uXXXX` and the ampersand entity.
fn decode_embedded_url(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('u') => {
                let code: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&code, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&code);
                    }
                }
            }
            Some(escaped) => out.push(escaped),
            None => {}
        }
    }
    out.replace("&amp;", "&")
}
