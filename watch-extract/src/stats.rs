use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::count::parse_compact_count;
use crate::{ChainBudgets, PageSurface};

/// Ordered stats strategies. Later tiers only fill fields the earlier
/// ones left absent.
pub const STATS_CHAIN: [StatsStrategy; 2] =
    [StatsStrategy::HeaderItems, StatsStrategy::DescriptionMeta];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsStrategy {
    /// Labeled stat items rendered near the page header.
    HeaderItems,
    /// Counts quoted in the social-preview description.
    DescriptionMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Followers,
    Following,
    Posts,
}

pub const STAT_FIELDS: [StatField; 3] =
    [StatField::Followers, StatField::Following, StatField::Posts];

impl StatField {
    /// Label fragment that identifies the field in page text. The
    /// fragments are mutually exclusive across labels.
    pub fn keyword(&self) -> &'static str {
        match self {
            StatField::Followers => "follower",
            StatField::Following => "following",
            StatField::Posts => "post",
        }
    }
}

/// Resolved profile counts. An absent field means every strategy
/// missed it; the fields never block each other.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatCounts {
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub posts: Option<u64>,
}

impl StatCounts {
    pub fn get(&self, field: StatField) -> Option<u64> {
        match field {
            StatField::Followers => self.followers,
            StatField::Following => self.following,
            StatField::Posts => self.posts,
        }
    }

    pub fn is_complete(&self) -> bool {
        STAT_FIELDS.iter().all(|field| self.get(*field).is_some())
    }

    pub fn is_empty(&self) -> bool {
        STAT_FIELDS.iter().all(|field| self.get(*field).is_none())
    }

    fn fill_absent(&mut self, field: StatField, value: u64) {
        let slot = match field {
            StatField::Followers => &mut self.followers,
            StatField::Following => &mut self.following,
            StatField::Posts => &mut self.posts,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

const STAT_ITEM_SELECTORS: [&str; 3] = [
    "header section li",
    "header section button",
    "header section a",
];

const DESCRIPTION_SELECTORS: [(&str, &str); 2] = [
    ("meta[name='description']", "content"),
    ("meta[property='og:description']", "content"),
];

/// First count token in a stat item. The boundary after the suffix
/// keeps `105 banana` from reading as 105 billion.
static COUNT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d[\d.,]*)\s*([kmb]\b)?").unwrap());

static FOLLOWERS_RE: Lazy<Regex> = Lazy::new(|| description_regex("followers?"));
static FOLLOWING_RE: Lazy<Regex> = Lazy::new(|| description_regex("following"));
static POSTS_RE: Lazy<Regex> = Lazy::new(|| description_regex("posts?"));

fn description_regex(label: &str) -> Regex {
    Regex::new(&format!(r"(?i)(\d[\d.,]*\s*[kmb]?)\s+{label}")).unwrap()
}

fn description_regex_for(field: StatField) -> &'static Regex {
    match field {
        StatField::Followers => &FOLLOWERS_RE,
        StatField::Following => &FOLLOWING_RE,
        StatField::Posts => &POSTS_RE,
    }
}

/// Classify one labeled stat item, e.g. `1,234 followers`.
pub fn classify_stat_line(line: &str) -> Option<(StatField, u64)> {
    let lower = line.to_ascii_lowercase();
    let field = STAT_FIELDS
        .iter()
        .copied()
        .find(|field| lower.contains(field.keyword()))?;
    let caps = COUNT_TOKEN_RE.captures(&lower)?;
    let token = match caps.get(2) {
        Some(suffix) => format!("{}{}", &caps[1], suffix.as_str()),
        None => caps[1].to_string(),
    };
    parse_compact_count(&token)
        .found()
        .map(|count| (field, count))
}

/// Run the stats chain. Each field resolves independently and keeps
/// the first value any strategy produced for it.
pub async fn resolve_stats(surface: &dyn PageSurface, budgets: &ChainBudgets) -> StatCounts {
    let mut counts = StatCounts::default();
    for strategy in STATS_CHAIN {
        match strategy {
            StatsStrategy::HeaderItems => header_items(surface, budgets, &mut counts).await,
            StatsStrategy::DescriptionMeta => description_meta(surface, &mut counts).await,
        }
        if counts.is_complete() {
            break;
        }
        log::debug!("stats after {strategy:?}: {counts:?}");
    }
    counts
}

/// Stat items render late on slow pages, so this tier re-probes until
/// it has all three fields or its budget runs out.
async fn header_items(surface: &dyn PageSurface, budgets: &ChainBudgets, counts: &mut StatCounts) {
    let deadline = Instant::now() + budgets.stats;
    loop {
        for selector in STAT_ITEM_SELECTORS {
            let lines = match surface.text_all(selector).await {
                Ok(lines) => lines,
                Err(err) => {
                    log::debug!("stats selector {selector} failed: {err}");
                    continue;
                }
            };
            for line in lines {
                if let Some((field, count)) = classify_stat_line(&line) {
                    counts.fill_absent(field, count);
                }
            }
        }
        if counts.is_complete() || Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(budgets.step).await;
    }
}

async fn description_meta(surface: &dyn PageSurface, counts: &mut StatCounts) {
    for (selector, attr) in DESCRIPTION_SELECTORS {
        let content = match surface.attr_first(selector, attr).await {
            Ok(Some(content)) => content,
            Ok(None) => continue,
            Err(err) => {
                log::debug!("stats selector {selector} failed: {err}");
                continue;
            }
        };
        for field in STAT_FIELDS {
            if counts.get(field).is_some() {
                continue;
            }
            if let Some(caps) = description_regex_for(field).captures(&content) {
                let token: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();
                if let Some(count) = parse_compact_count(&token).found() {
                    counts.fill_absent(field, count);
                }
            }
        }
        if counts.is_complete() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::testing::MockSurface;

    use super::*;

    #[rstest]
    #[case("1,234 followers", StatField::Followers, 1_234)]
    #[case("128 following", StatField::Following, 128)]
    #[case("6 posts", StatField::Posts, 6)]
    #[case("1 post", StatField::Posts, 1)]
    #[case("1.2m Followers", StatField::Followers, 1_200_000)]
    #[case("Followers: 42", StatField::Followers, 42)]
    fn classifies_stat_lines(
        #[case] line: &str,
        #[case] field: StatField,
        #[case] count: u64,
    ) {
        assert_eq!(classify_stat_line(line), Some((field, count)));
    }

    #[rstest]
    #[case("followers")]
    #[case("105 likes")]
    #[case("")]
    fn rejects_unusable_lines(#[case] line: &str) {
        assert_eq!(classify_stat_line(line), None);
    }

    #[test_log::test(tokio::test)]
    async fn header_items_resolve_all_fields() {
        let surface = MockSurface::default()
            .with_text("header section li", "105 followers")
            .with_text("header section li", "128 following")
            .with_text("header section li", "6 posts");
        let counts = resolve_stats(&surface, &ChainBudgets::none()).await;
        assert_eq!(
            counts,
            StatCounts {
                followers: Some(105),
                following: Some(128),
                posts: Some(6),
            }
        );
        assert!(counts.is_complete());
    }

    #[test_log::test(tokio::test)]
    async fn description_fills_only_absent_fields() {
        let surface = MockSurface::default()
            .with_text("header section li", "105 followers")
            .with_attr(
                "meta[name='description']",
                "content",
                "9.9k Followers, 128 Following, 6 Posts - photos and videos",
            );
        let counts = resolve_stats(&surface, &ChainBudgets::none()).await;
        assert_eq!(
            counts,
            StatCounts {
                followers: Some(105),
                following: Some(128),
                posts: Some(6),
            }
        );
    }

    #[tokio::test]
    async fn missing_fields_stay_absent() {
        let surface = MockSurface::default().with_attr(
            "meta[property='og:description']",
            "content",
            "1.2m Followers - come see",
        );
        let counts = resolve_stats(&surface, &ChainBudgets::none()).await;
        assert_eq!(counts.followers, Some(1_200_000));
        assert_eq!(counts.following, None);
        assert_eq!(counts.posts, None);
        assert!(!counts.is_complete());
        assert!(!counts.is_empty());
    }

    #[tokio::test]
    async fn empty_page_resolves_nothing() {
        let counts = resolve_stats(&MockSurface::default(), &ChainBudgets::none()).await;
        assert!(counts.is_empty());
    }
}
