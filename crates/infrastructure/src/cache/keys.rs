//! Deterministic, namespaced cache keys.
//!
//! Every key is `<prefix>:<part>[:<part>...]` with parts lower-cased and
//! runs of non-alphanumeric characters collapsed to `_`, so semantically
//! equal inputs always map to the same key. Keys parse back into their
//! prefix and parts and can be matched against `*`/`?` glob patterns for
//! bulk invalidation.

use serde_json::Value;

use harvester_core::{HarvesterError, HarvesterResult};

use super::checksum::short_hash;

/// Key namespaces, one per cached domain object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePrefix {
    Match,
    League,
    Season,
    Url,
    Search,
}

impl CachePrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            CachePrefix::Match => "match",
            CachePrefix::League => "league",
            CachePrefix::Season => "season",
            CachePrefix::Url => "url",
            CachePrefix::Search => "search",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "match" => Some(CachePrefix::Match),
            "league" => Some(CachePrefix::League),
            "season" => Some(CachePrefix::Season),
            "url" => Some(CachePrefix::Url),
            "search" => Some(CachePrefix::Search),
            _ => None,
        }
    }
}

impl std::fmt::Display for CachePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower-case and collapse every run of non-alphanumerics to one `_`.
fn sanitize(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    let mut last_was_sep = false;
    for ch in part.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out
}

pub fn match_key(match_id: &str) -> String {
    format!("match:{}", sanitize(match_id))
}

pub fn league_key(country: &str, league: &str) -> String {
    format!("league:{}:{}", sanitize(country), sanitize(league))
}

pub fn season_key(country: &str, league: &str, season: &str) -> String {
    format!(
        "season:{}:{}:{}",
        sanitize(country),
        sanitize(league),
        sanitize(season)
    )
}

/// URL keys hash the address instead of embedding it.
pub fn url_key(url: &str) -> String {
    format!("url:{}", short_hash(url))
}

/// Search keys hash the query, plus the filter set when present.
pub fn search_key(query: &str, filters: Option<&Value>) -> String {
    match filters {
        Some(filters) => format!(
            "search:{}:{}",
            short_hash(query),
            short_hash(&filters.to_string())
        ),
        None => format!("search:{}", short_hash(query)),
    }
}

/// A key decomposed back into its namespace and parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub prefix: CachePrefix,
    pub parts: Vec<String>,
}

pub fn parse_key(key: &str) -> HarvesterResult<ParsedKey> {
    let mut segments = key.split(':');
    let prefix = segments
        .next()
        .and_then(CachePrefix::parse)
        .ok_or_else(|| {
            HarvesterError::validation_error(format!("unrecognized cache key: {key}"))
        })?;
    let parts: Vec<String> = segments.map(str::to_string).collect();
    if parts.is_empty() || parts.iter().any(String::is_empty) {
        return Err(HarvesterError::validation_error(format!(
            "malformed cache key: {key}"
        )));
    }
    Ok(ParsedKey { prefix, parts })
}

/// Glob match with `*` (any run) and `?` (any single character).
pub fn matches_pattern(key: &str, pattern: &str) -> bool {
    let key: Vec<char> = key.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    // iterative matcher with star backtracking
    let (mut k, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            k += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, k));
            p += 1;
        } else if let Some((star_p, star_k)) = star {
            p = star_p + 1;
            k = star_k + 1;
            star = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
