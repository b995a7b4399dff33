//! Page-level banner extraction as a pipeline of independent candidate
//! extractors. Each extractor is a pure function over the page text;
//! selection resolves, validates and scores the combined output.

use super::validate::{is_valid_banner_image, validate_image_url};
use once_cell::sync::Lazy;
use regex::Regex;

/// A candidate image URL with an estimated-area score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub score: u32,
}

/// Score assigned to an `<img>` with no usable dimension attributes.
const UNKNOWN_DIMS_SCORE: u32 = 500;
/// Base score for `<source srcset>` entries; the declared width is added.
const SRCSET_BASE_SCORE: u32 = 800;

static RE_META_PAIRS: Lazy<Vec<Regex>> = Lazy::new(|| {
    let keys = [
        "og:image",
        "og:image:url",
        "og:image:secure_url",
        "twitter:image",
        "twitter:image:src",
    ];
    let mut patterns = Vec::new();
    for key in keys {
        let key = key.replace(':', r"\:");
        patterns.push(
            Regex::new(&format!(
                r#"(?i)<meta[^>]+(?:property|name)\s*=\s*["']{key}["'][^>]+content\s*=\s*["']([^"']+)["']"#
            ))
            .unwrap(),
        );
        patterns.push(
            Regex::new(&format!(
                r#"(?i)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]+(?:property|name)\s*=\s*["']{key}["']"#
            ))
            .unwrap(),
        );
    }
    patterns
});

static RE_JSON_LD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]+type=["']application/ld\+json["'][^>]*>(.*?)</script>"#).unwrap()
});
static RE_HTML_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static RE_LINK_IMAGE_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel=["']image_src["'][^>]+href=["']([^"']+)["']"#).unwrap()
});
static RE_IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["'][^>]*>"#).unwrap());
static RE_ATTR_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)width=["']?(\d+)["']?"#).unwrap());
static RE_ATTR_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)height=["']?(\d+)["']?"#).unwrap());
static RE_SOURCE_SRCSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<source[^>]+srcset=["']([^"']+)["']"#).unwrap());

/// `og:image` / twitter-card meta tags, in declaration-priority order.
pub fn meta_candidates(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    for re in RE_META_PAIRS.iter() {
        if let Some(caps) = re.captures(html) {
            let url = caps[1].trim().to_string();
            if !url.is_empty() {
                out.push(url);
            }
        }
    }
    out
}

fn json_ld_image_field(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("@id"))
            .and_then(|v| v.as_str())
            .map(String::from),
        serde_json::Value::Array(items) => items.iter().find_map(json_ld_image_field),
        _ => None,
    }
}

/// `image` / `thumbnailUrl` fields inside JSON-LD structured data.
pub fn json_ld_candidates(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in RE_JSON_LD.captures_iter(html) {
        let json_text = RE_HTML_COMMENT.replace_all(caps[1].trim(), "");
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&json_text) else {
            continue;
        };
        let objects: Vec<&serde_json::Value> = match &data {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for obj in objects {
            for key in ["image", "thumbnailUrl", "thumbnailURL"] {
                if let Some(candidate) = obj.get(key).and_then(json_ld_image_field) {
                    let candidate = candidate.trim().to_string();
                    if !candidate.is_empty() {
                        out.push(candidate);
                    }
                }
            }
        }
    }
    out
}

/// `<link rel="image_src">` headers, a legacy but still common hint.
pub fn link_rel_candidates(html: &str) -> Vec<String> {
    RE_LINK_IMAGE_SRC
        .captures_iter(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `<img>` tags scored by their declared pixel area, with a bonus for a
/// banner-like aspect ratio (1.5 to 2.5).
pub fn img_tag_candidates(html: &str) -> Vec<Candidate> {
    let mut out = Vec::new();
    for caps in RE_IMG_TAG.captures_iter(html) {
        let url = caps[1].trim().to_string();
        if url.is_empty() {
            continue;
        }
        let tag = &caps[0];
        let width: u32 = RE_ATTR_WIDTH
            .captures(tag)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        let height: u32 = RE_ATTR_HEIGHT
            .captures(tag)
            .and_then(|c| c[1].parse().ok())
            .unwrap_or(0);
        let score = if width == 0 && height == 0 {
            UNKNOWN_DIMS_SCORE
        } else {
            let mut score = width.saturating_mul(height);
            if width > 0 && height > 0 {
                let aspect = width as f64 / height as f64;
                if (1.5..=2.5).contains(&aspect) {
                    score = (score as f64 * 1.2) as u32;
                }
            }
            score
        };
        out.push(Candidate { url, score });
    }
    out
}

/// `<source srcset>` entries; the widest declared variant wins.
pub fn srcset_candidates(html: &str) -> Vec<Candidate> {
    let mut out = Vec::new();
    for caps in RE_SOURCE_SRCSET.captures_iter(html) {
        let mut best_url = String::new();
        let mut best_w = 0u32;
        for part in caps[1].split(',') {
            let mut segs = part.split_whitespace();
            let Some(url) = segs.next() else { continue };
            let w: u32 = segs
                .next()
                .and_then(|d| d.strip_suffix('w'))
                .and_then(|d| d.parse().ok())
                .unwrap_or(0);
            if w >= best_w {
                best_w = w;
                best_url = url.to_string();
            }
        }
        if !best_url.is_empty() {
            out.push(Candidate {
                url: best_url,
                score: SRCSET_BASE_SCORE + best_w,
            });
        }
    }
    out
}

/// Resolve a possibly protocol-relative or path-relative URL against the
/// page it was found on. Only absolute http(s) results survive.
fn absolutize(raw: &str, base: Option<&url::Url>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("data:") {
        return None;
    }
    let resolved = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        base?.join(raw).ok()?.to_string()
    };
    if resolved.starts_with("http://") || resolved.starts_with("https://") {
        Some(resolved)
    } else {
        None
    }
}

/// Run all extractors over the page and pick the best valid candidate.
///
/// Meta, JSON-LD and link-rel hints are authoritative and returned in
/// that order; only when none validates are the scored `<img>`/srcset
/// candidates consulted, highest score first.
pub fn select_banner(html: &str, page_url: &str) -> Option<String> {
    let base = url::Url::parse(page_url).ok();
    let base = base.as_ref();

    let hinted = meta_candidates(html)
        .into_iter()
        .chain(json_ld_candidates(html))
        .chain(link_rel_candidates(html));
    for raw in hinted {
        if let Some(url) = absolutize(&raw, base) {
            if validate_image_url(&url) && is_valid_banner_image(&url) {
                return Some(url);
            }
        }
    }

    let mut scored: Vec<Candidate> = img_tag_candidates(html)
        .into_iter()
        .chain(srcset_candidates(html))
        .filter_map(|c| {
            let url = absolutize(&c.url, base)?;
            (validate_image_url(&url) && is_valid_banner_image(&url))
                .then_some(Candidate { url, score: c.score })
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.into_iter().next().map(|c| c.url)
}
