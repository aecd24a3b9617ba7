use core::fmt::Display;
use core::str::FromStr;

use blake3::Hasher;
use hex::encode;
use serde::{Deserialize, Serialize};
use url::Url;

use watch_error::WatchError;

/// Which identity strategy produced a [`Fingerprint`].
///
/// `NormalizedUrl` compares instantly without downloading anything;
/// `ContentHash` survives CDN path churn at the cost of one download.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub enum FingerprintKind {
    NormalizedUrl,
    ContentHash,
}

impl FingerprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintKind::NormalizedUrl => "url",
            FingerprintKind::ContentHash => "hash",
        }
    }
}

impl Display for FingerprintKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FingerprintKind {
    type Err = WatchError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s {
            "url" => Ok(FingerprintKind::NormalizedUrl),
            "hash" => Ok(FingerprintKind::ContentHash),
            other => Err(WatchError::Parse(format!(
                "unknown fingerprint kind: {other}"
            ))),
        }
    }
}

/// Identity of the currently shown avatar, independent of its bytes.
///
/// Two fingerprints are equal only when both the kind and the value match,
/// so a deployment that switches strategies re-baselines instead of
/// comparing a URL against a hash.
#[derive(
    Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Fingerprint {
    kind: FingerprintKind,
    value: String,
}

impl Fingerprint {
    pub fn kind(&self) -> FingerprintKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Fingerprint a resource by its normalized URL.
    pub fn from_url(url: &Url) -> Self {
        Fingerprint {
            kind: FingerprintKind::NormalizedUrl,
            value: normalize_image_url(url).into(),
        }
    }

    /// Fingerprint a resource by hashing its bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        log::debug!("Computing BLAKE3 hash for {} bytes", bytes.len());

        let mut hasher = Hasher::new();
        hasher.update(bytes);
        let hash = hasher.finalize();
        Fingerprint {
            kind: FingerprintKind::ContentHash,
            value: encode(hash.as_bytes()),
        }
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

impl FromStr for Fingerprint {
    type Err = WatchError;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        let (kind, value) = s
            .split_once(':')
            .ok_or_else(|| WatchError::Parse(format!("not a fingerprint: {s}")))?;
        if value.is_empty() {
            return Err(WatchError::Parse("empty fingerprint value".into()));
        }
        Ok(Fingerprint {
            kind: kind.parse()?,
            value: value.to_string(),
        })
    }
}

/// Drop the query string and fragment, keeping scheme, host and path
/// unchanged. CDN URLs append cache-busting query parameters on every
/// fetch; comparing normalized URLs avoids false "changed" signals.
///
/// Idempotent: `normalize_image_url(&normalize_image_url(u)) == normalize_image_url(u)`.
pub fn normalize_image_url(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const BASES: [&str; 3] = [
        "https://cdn.example.com/v/t51/290x290/avatar.jpg",
        "http://pics.example.org/u/42",
        "https://media.example.net/a/b/c.png",
    ];

    #[test]
    fn normalization_strips_query_and_fragment() {
        let url = Url::parse(
            "https://cdn.example.com/avatar.jpg?stp=dst-jpg&cb=1234#frag",
        )
        .unwrap();
        assert_eq!(
            normalize_image_url(&url).as_str(),
            "https://cdn.example.com/avatar.jpg"
        );
    }

    #[test]
    fn bytes_fingerprint_is_hex_blake3() {
        let fp = Fingerprint::from_bytes(b"");
        assert_eq!(fp.kind(), FingerprintKind::ContentHash);
        assert_eq!(
            fp.value(),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn bytes_fingerprints_differ_per_content() {
        assert_eq!(
            Fingerprint::from_bytes(b"same"),
            Fingerprint::from_bytes(b"same")
        );
        assert_ne!(
            Fingerprint::from_bytes(b"one"),
            Fingerprint::from_bytes(b"two")
        );
    }

    #[test]
    fn kinds_never_compare_equal() {
        let url = Url::parse("https://cdn.example.com/avatar.jpg").unwrap();
        let by_url = Fingerprint::from_url(&url);
        let by_hash = Fingerprint::from_bytes(url.as_str().as_bytes());
        assert_ne!(by_url, by_hash);
    }

    #[test]
    fn fingerprint_round_trips_as_text() {
        let url = Url::parse("https://cdn.example.com/avatar.jpg?cb=9").unwrap();
        for fp in [Fingerprint::from_url(&url), Fingerprint::from_bytes(b"img")] {
            let line = fp.to_string();
            assert_eq!(line.parse::<Fingerprint>().unwrap(), fp);
        }
    }

    #[test]
    fn url_values_keep_their_own_colons() {
        let parsed: Fingerprint = "url:https://cdn.example.com/a.jpg"
            .parse()
            .unwrap();
        assert_eq!(parsed.kind(), FingerprintKind::NormalizedUrl);
        assert_eq!(parsed.value(), "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!("".parse::<Fingerprint>().is_err());
        assert!("hash:".parse::<Fingerprint>().is_err());
        assert!("sha256:abcd".parse::<Fingerprint>().is_err());
        assert!("no-colon-here".parse::<Fingerprint>().is_err());
    }

    #[quickcheck]
    fn normalize_is_idempotent(base: u8, query: String, fragment: String) -> bool {
        let mut url = Url::parse(BASES[base as usize % BASES.len()]).unwrap();
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        if !fragment.is_empty() {
            url.set_fragment(Some(&fragment));
        }
        let once = normalize_image_url(&url);
        normalize_image_url(&once) == once
    }

    #[quickcheck]
    fn cache_busters_never_change_the_fingerprint(
        base: u8,
        q1: String,
        q2: String,
    ) -> bool {
        let url = Url::parse(BASES[base as usize % BASES.len()]).unwrap();
        let mut left = url.clone();
        let mut right = url;
        left.set_query(Some(&q1));
        right.set_query(Some(&q2));
        Fingerprint::from_url(&left) == Fingerprint::from_url(&right)
    }
}
