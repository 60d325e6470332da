//! Content fingerprints: the exact-duplicate URL key, the 64-bit simhash used for
//! near-duplicate detection, and the calendar day key used for date filtering.
//!
//! - `normalize_url` / `url_hash`: strip fragment + tracking params, lower-case host,
//!   drop trailing slash on non-root paths, then SHA-256 → hex.
//! - `simhash64`: term-frequency weighted simhash over a lower-cased token stream,
//!   rendered as a fixed 64-character `0`/`1` string.
//! - `hamming_distance`: differing positions over the overlapping prefix.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use url::Url;

/// Width of a similarity signature in bits.
pub const SIMHASH_BITS: usize = 64;

/// Query parameters that only carry attribution and never change the target document.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
];

static RE_EMBEDDED_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("embedded url regex"));

/// Normalize a URL so that cosmetic variants map to one identity.
/// Unparseable input is returned trimmed, unchanged otherwise.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut u = match Url::parse(trimmed) {
        Ok(u) => u,
        Err(_) => return trimmed.to_string(),
    };

    u.set_fragment(None);

    if u.query().is_some() {
        let kept: Vec<(String, String)> = u
            .query_pairs()
            .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            u.set_query(None);
        } else {
            u.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    let path = u.path().to_string();
    if path != "/" && path.ends_with('/') {
        let stripped = path.trim_end_matches('/');
        u.set_path(if stripped.is_empty() { "/" } else { stripped });
    }

    // `Url` already lower-cases special-scheme hosts; this covers the rest.
    if let Some(host) = u.host_str() {
        let lower = host.to_ascii_lowercase();
        if lower != host {
            let _ = u.set_host(Some(&lower));
        }
    }

    u.to_string()
}

/// Hex digest of the normalized URL. Identity key of an item.
pub fn url_hash(raw: &str) -> String {
    let norm = normalize_url(raw);
    hex_digest(norm.as_bytes())
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Lower-case, drop embedded links, keep alphanumerics and CJK ideographs as token
/// characters, everything else separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let without_urls = RE_EMBEDDED_URL.replace_all(&lower, " ");
    without_urls
        .split(|c: char| !is_token_char(c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// 64-bit simhash of `text` as a string of `0`/`1`. Empty input gives all zeros.
pub fn simhash64(text: &str) -> String {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return "0".repeat(SIMHASH_BITS);
    }

    let mut weights: HashMap<String, i64> = HashMap::new();
    for t in tokens {
        *weights.entry(t).or_insert(0) += 1;
    }

    let mut acc = [0i64; SIMHASH_BITS];
    for (token, w) in &weights {
        let h = token_hash64(token);
        for (i, slot) in acc.iter_mut().enumerate() {
            // bit 0 of the string is the most significant bit of the hash
            if (h >> (SIMHASH_BITS - 1 - i)) & 1 == 1 {
                *slot += w;
            } else {
                *slot -= w;
            }
        }
    }

    acc.iter().map(|&v| if v >= 0 { '1' } else { '0' }).collect()
}

/// First 8 bytes of SHA-256, big-endian.
fn token_hash64(token: &str) -> u64 {
    let digest = Sha256::digest(token.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

/// Count of differing positions. Signatures of unequal length are compared over
/// their common prefix only.
pub fn hamming_distance(a: &str, b: &str) -> u32 {
    a.bytes().zip(b.bytes()).filter(|(x, y)| x != y).count() as u32
}

/// `YYYY-MM-DD` of `ts` in the reference time zone.
pub fn day_key(ts: DateTime<Utc>, tz: Tz) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// Parse a zone name, falling back to `America/New_York`.
pub fn parse_timezone(name: &str) -> Tz {
    name.trim().parse::<Tz>().unwrap_or_else(|_| {
        tracing::warn!(tz = name, "unknown time zone, using America/New_York");
        chrono_tz::America::New_York
    })
}
