use crate::Extraction;

/// Parse a human-formatted count like `1,234`, `1.2k` or `3.4M`.
///
/// Suffixes `k`, `m` and `b` scale by thousand, million and billion,
/// case-insensitively, and a comma before a suffix reads as a decimal
/// point. Anything that is not a count comes back as
/// [`Extraction::NotFound`]; callers treat that as a strategy miss,
/// never as an error.
pub fn parse_compact_count(text: &str) -> Extraction<u64> {
    let trimmed = text.trim().to_ascii_lowercase();
    if trimmed.is_empty() {
        return Extraction::NotFound;
    }

    let (body, multiplier) = match trimmed.as_bytes()[trimmed.len() - 1] {
        b'k' => (&trimmed[..trimmed.len() - 1], Some(1_000u64)),
        b'm' => (&trimmed[..trimmed.len() - 1], Some(1_000_000)),
        b'b' => (&trimmed[..trimmed.len() - 1], Some(1_000_000_000)),
        _ => (trimmed.as_str(), None),
    };

    match multiplier {
        None => {
            let digits: String = body.chars().filter(|c| *c != ',').collect();
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Extraction::NotFound;
            }
            digits.parse::<u64>().ok().into()
        }
        Some(multiplier) => scaled(body.trim_end(), multiplier),
    }
}

/// `12.3` with a multiplier of a million is 12_300_000. Fractional
/// digits are applied in integer space so the result floors instead of
/// wobbling through a float.
fn scaled(body: &str, multiplier: u64) -> Extraction<u64> {
    let normalized = body.replace(',', ".");
    let mut parts = normalized.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next().unwrap_or_default();
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Extraction::NotFound;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Extraction::NotFound;
    }

    let Some(mut value) = whole
        .parse::<u64>()
        .ok()
        .and_then(|whole| whole.checked_mul(multiplier))
    else {
        return Extraction::NotFound;
    };
    let mut scale = multiplier;
    for digit in fraction.bytes() {
        scale /= 10;
        if scale == 0 {
            break;
        }
        match value.checked_add((digit - b'0') as u64 * scale) {
            Some(next) => value = next,
            None => return Extraction::NotFound,
        }
    }
    Extraction::Found(value)
}
