//! Heuristics that reject logos, icons, avatars and thumbnails so only
//! banner-sized candidates survive.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum acceptable width/height hints, in pixels.
const MIN_WIDTH: u32 = 400;
const MIN_HEIGHT: u32 = 300;

const EXCLUDE_KEYWORDS: &[&str] = &[
    "logo", "icon", "avatar", "favicon", "sprite", "thumbnail", "thumb", "small", "mini",
    "profile", "user", "author",
];

const EXCLUDE_PATH_SEGMENTS: &[&str] =
    &["/thumb/", "/small/", "/mini/", "/icon/", "/logo/", "/avatar/"];

static RE_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_-]w(\d+)").unwrap());
static RE_HEIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_-]h(\d+)").unwrap());
static RE_SQUARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_-]s(\d+)").unwrap());
static RE_SIZE_PARAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_-]size=(\d+)").unwrap());
static RE_DIMENSIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[=_-](\d+)x(\d+)").unwrap());
static RE_GOOGLE_CDN: Lazy<Regex> = Lazy::new(|| Regex::new(r"=s\d*-w(\d+)").unwrap());

fn capture_u32(re: &Regex, haystack: &str, group: usize) -> Option<u32> {
    re.captures(haystack)
        .and_then(|caps| caps.get(group))
        .and_then(|m| m.as_str().parse().ok())
}

/// True when a URL plausibly points at a banner-sized image rather than
/// iconography. Purely lexical; no network access.
pub fn is_valid_banner_image(img_url: &str) -> bool {
    let lower = img_url.to_lowercase();

    if EXCLUDE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return false;
    }

    for re in [&*RE_WIDTH, &*RE_SQUARE, &*RE_SIZE_PARAM] {
        if let Some(size) = capture_u32(re, &lower, 1) {
            if size < MIN_WIDTH {
                return false;
            }
        }
    }
    // A bare height hint shares the 400 floor; MIN_HEIGHT applies only
    // to explicit WxH pairs below.
    if let Some(h) = capture_u32(&RE_HEIGHT, &lower, 1) {
        if h < MIN_WIDTH {
            return false;
        }
    }
    if lower.contains("size=small") {
        return false;
    }
    if let Some(caps) = RE_DIMENSIONS.captures(&lower) {
        let w: u32 = caps[1].parse().unwrap_or(0);
        let h: u32 = caps[2].parse().unwrap_or(0);
        if w < MIN_WIDTH || h < MIN_HEIGHT {
            return false;
        }
    }
    if lower.contains("googleusercontent.com") {
        if let Some(w) = capture_u32(&RE_GOOGLE_CDN, &lower, 1) {
            if w < MIN_WIDTH {
                return false;
            }
        }
    }
    if EXCLUDE_PATH_SEGMENTS.iter().any(|seg| lower.contains(seg)) {
        return false;
    }

    true
}

/// Basic sanity check on an image URL before it is stored or fetched:
/// http(s) scheme, bounded length, no data: URIs (the placeholder is
/// assigned explicitly, never discovered).
pub fn validate_image_url(url: &str) -> bool {
    !url.is_empty()
        && url.len() <= 2048
        && !url.starts_with("data:")
        && (url.starts_with("http://") || url.starts_with("https://"))
}
