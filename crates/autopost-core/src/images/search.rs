//! Image-search providers, scraped from the public result pages.
//! Google is the primary strategy, Bing the independent fallback.

use super::validate::{is_valid_banner_image, validate_image_url};
use crate::shutdown::ShutdownSignal;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Direct image links embedded anywhere in the result page.
static RE_DIRECT_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https://[^\s"'<>]+\.(?:jpg|jpeg|png|webp|gif)(?:\?[^\s"'<>]*)?"#).unwrap()
});
/// Original-image fields in Google's inline result JSON.
static RE_GOOGLE_JSON: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r#""ou"\s*:\s*"([^"]+)""#, r#""url"\s*:\s*"([^"]+)""#, r#""src"\s*:\s*"([^"]+)""#]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});
static RE_IMGURL_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)imgurl=([^&"'<>]+)"#).unwrap());
/// Original-image fields on Bing result tiles.
static RE_BING_MURL: Lazy<Regex> = Lazy::new(|| Regex::new(r#""murl"\s*:\s*"([^"]+)""#).unwrap());
static RE_BING_IMGURL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)imgurl:([^,&"']+)"#).unwrap());

fn unescape_json_url(raw: &str) -> String {
    raw.replace("\\/", "/")
        .replace("\\u003d", "=")
        .replace("\\u0026", "&")
        .replace("\\\"", "\"")
        .replace("\\'", "'")
}

fn keep(url: &str) -> bool {
    url.starts_with("https://") && is_valid_banner_image(url) && validate_image_url(url)
}

/// Extract candidate image URLs from a Google Images result page.
/// Fewer query parameters rank first; ties break lexicographically.
pub fn google_candidates(html: &str) -> Vec<String> {
    let mut found = std::collections::BTreeSet::new();
    for m in RE_DIRECT_URL.find_iter(html) {
        let url = m.as_str().trim_matches(['"', '\'']).to_string();
        if keep(&url) {
            found.insert(url);
        }
    }
    for re in RE_GOOGLE_JSON.iter() {
        for caps in re.captures_iter(html) {
            let url = unescape_json_url(caps[1].trim());
            if keep(&url) {
                found.insert(url);
            }
        }
    }
    for caps in RE_IMGURL_PARAM.captures_iter(html) {
        let mut decoded = urlencoding::decode(&caps[1]).map(|c| c.into_owned()).unwrap_or_default();
        if decoded.contains("%2F") || decoded.contains("%3A") {
            decoded = urlencoding::decode(&decoded)
                .map(|c| c.into_owned())
                .unwrap_or(decoded);
        }
        if keep(&decoded) {
            found.insert(decoded);
        }
    }
    let mut urls: Vec<String> = found.into_iter().collect();
    urls.sort_by_key(|u| (u.matches('?').count(), u.clone()));
    urls
}

fn bing_hosted(url: &str) -> bool {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default();
    host.contains("bing.com")
        || host.contains("microsoft.com")
        || host.contains("mm.bing.net")
        || url.contains("/OHR/")
}

/// Extract candidate image URLs from a Bing Images result page, in
/// page order, skipping Bing-hosted thumbnails and daily wallpapers.
pub fn bing_candidates(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut ordered = Vec::new();
    for caps in RE_BING_MURL.captures_iter(html) {
        let url = unescape_json_url(caps[1].trim());
        if url.starts_with("http") && !bing_hosted(&url) && keep(&url) && seen.insert(url.clone()) {
            ordered.push(url);
        }
    }
    for caps in RE_BING_IMGURL.captures_iter(html) {
        let url = urlencoding::decode(caps[1].trim())
            .map(|c| c.into_owned())
            .unwrap_or_default();
        if url.starts_with("http") && !bing_hosted(&url) && keep(&url) && seen.insert(url.clone()) {
            ordered.push(url);
        }
    }
    ordered
}

fn is_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    lower.contains("captcha")
        || lower.contains("unusual traffic")
        || lower.contains("our systems have detected")
        || lower.contains("throttled")
        || lower.contains("temporarily unavailable")
}

/// Fetch one provider page with bounded linear-backoff retries on
/// transient failures. Retry waits honor the shutdown signal so a stop
/// request is never delayed by a backing-off search.
async fn fetch_with_retry(
    client: &reqwest::Client,
    shutdown: &mut ShutdownSignal,
    url: &str,
) -> Option<String> {
    if shutdown.is_shutdown() {
        return None;
    }
    for attempt in 1..=MAX_RETRIES {
        let backoff = RETRY_DELAY * attempt;
        match client.get(url).timeout(SEARCH_TIMEOUT).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(url = %url, %status, attempt, "Image search throttled");
                } else if let Ok(html) = resp.text().await {
                    if is_blocked(&html) || html.len() < 1000 {
                        debug!(url = %url, attempt, "Image search page looks blocked");
                    } else {
                        return Some(html);
                    }
                }
            }
            Err(e) => warn!(url = %url, error = %e, attempt, "Image search request failed"),
        }
        if attempt == MAX_RETRIES || shutdown.wait(backoff).await {
            return None;
        }
    }
    None
}

async fn search_google_images(
    client: &reqwest::Client,
    shutdown: &mut ShutdownSignal,
    query: &str,
    max_results: usize,
) -> Vec<String> {
    let q = urlencoding::encode(query);
    let urls = [
        format!("https://www.google.com/search?q={q}&tbm=isch&hl=ro&gl=RO"),
        // Newer results UI, tried when the classic page yields nothing.
        format!("https://www.google.com/search?q={q}&udm=2&hl=ro&gl=RO"),
    ];
    for url in &urls {
        if shutdown.is_shutdown() {
            return Vec::new();
        }
        if let Some(html) = fetch_with_retry(client, shutdown, url).await {
            let mut candidates = google_candidates(&html);
            if !candidates.is_empty() {
                candidates.truncate(max_results);
                return candidates;
            }
        }
    }
    Vec::new()
}

async fn search_bing_images(
    client: &reqwest::Client,
    shutdown: &mut ShutdownSignal,
    query: &str,
    max_results: usize,
) -> Vec<String> {
    let url = format!(
        "https://www.bing.com/images/search?q={}&mkt=ro-RO&qft=+filterui:imagesize-large",
        urlencoding::encode(query)
    );
    if let Some(html) = fetch_with_retry(client, shutdown, &url).await {
        let mut candidates = bing_candidates(&html);
        candidates.truncate(max_results);
        return candidates;
    }
    Vec::new()
}

/// Search both providers in order: Google first, Bing as the
/// independent fallback. At most `max_results` (capped at 3) URLs.
pub async fn search_images(
    client: &reqwest::Client,
    shutdown: &mut ShutdownSignal,
    query: &str,
    max_results: usize,
) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let max_results = max_results.min(3);
    let results = search_google_images(client, shutdown, query, max_results).await;
    if !results.is_empty() {
        return results;
    }
    search_bing_images(client, shutdown, query, max_results).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_direct_urls_are_collected_and_ranked() {
        let html = r#"
        <script>"https://pics.example.com/story-banner.jpg?sig=abc"</script>
        <div>https://pics.example.com/other-banner.png</div>
        "#;
        let got = google_candidates(html);
        // The query-free URL ranks first.
        assert_eq!(got[0], "https://pics.example.com/other-banner.png");
        assert!(got.contains(&"https://pics.example.com/story-banner.jpg?sig=abc".to_string()));
    }

    #[test]
    fn google_json_fields_are_unescaped() {
        let html = r#"{"ou":"https:\/\/pics.example.com\/a-banner.jpg"}"#;
        assert_eq!(
            google_candidates(html),
            vec!["https://pics.example.com/a-banner.jpg"]
        );
    }

    #[test]
    fn google_imgurl_param_is_percent_decoded() {
        let html = r#"<a href="/imgres?imgurl=https%3A%2F%2Fpics.example.com%2Fwide.jpg&h=1">"#;
        assert_eq!(
            google_candidates(html),
            vec!["https://pics.example.com/wide.jpg"]
        );
    }

    #[test]
    fn google_rejects_icon_urls() {
        let html = r#"https://pics.example.com/logo.png https://pics.example.com/thumb/a.jpg"#;
        assert!(google_candidates(html).is_empty());
    }

    #[test]
    fn bing_murl_in_page_order() {
        let html = r#"
        {"murl":"https:\/\/pics.example.com\/first.jpg","turl":"x"}
        {"murl":"https:\/\/pics.example.com\/second.jpg"}
        {"murl":"https:\/\/pics.example.com\/first.jpg"}
        "#;
        assert_eq!(
            bing_candidates(html),
            vec![
                "https://pics.example.com/first.jpg",
                "https://pics.example.com/second.jpg"
            ]
        );
    }

    #[test]
    fn bing_hosted_images_are_skipped() {
        let html = r#"
        {"murl":"https://mm.bing.net/th/id/abc.jpg"}
        {"murl":"https://www.bing.com/th/OHR/wallpaper.jpg"}
        {"murl":"https://pics.example.com/real.jpg"}
        "#;
        assert_eq!(bing_candidates(html), vec!["https://pics.example.com/real.jpg"]);
    }

    #[test]
    fn blocked_pages_are_detected() {
        assert!(is_blocked("please solve this CAPTCHA to continue"));
        assert!(is_blocked("we have detected unusual traffic"));
        assert!(is_blocked("request throttled"));
        assert!(!is_blocked("<html>normal results</html>"));
    }

    #[tokio::test]
    async fn shutdown_aborts_retry_backoff() {
        let (handle, mut signal) = crate::shutdown::channel();
        handle.shutdown();
        let client = reqwest::Client::new();
        // With shutdown already signalled, no provider is contacted and
        // no backoff is slept out.
        let start = std::time::Instant::now();
        let got = search_images(&client, &mut signal, "eclipse", 3).await;
        assert!(got.is_empty());
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
