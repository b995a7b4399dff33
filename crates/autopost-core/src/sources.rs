//! Source discovery: query the Google News search feed for a topic and
//! turn the results into candidate sources with best-effort excerpts.

use crate::extract;
use crate::models::NewsSource;
use tracing::{info, warn};

/// Character budget for a publisher-page excerpt.
const EXCERPT_CHARS: usize = 1200;

/// Per-page fetch timeout. Discovery is best-effort; slow publishers
/// fall back to the feed snippet.
const PAGE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

fn search_feed_url(topic: &str) -> String {
    format!(
        "https://news.google.com/rss/search?q={}&hl=ro&gl=RO&ceid=RO%3Aro",
        urlencoding::encode(topic)
    )
}

/// Unwrap a Google News indirection link to the publisher URL when the
/// `url=` query parameter is present; otherwise keep the link as-is.
pub fn publisher_url(link: &str) -> String {
    if let Ok(parsed) = url::Url::parse(link) {
        let is_google_news = parsed
            .host_str()
            .map(|h| h.contains("news.google.com"))
            .unwrap_or(false);
        if is_google_news {
            if let Some((_, value)) = parsed.query_pairs().find(|(k, _)| k == "url") {
                return value.into_owned();
            }
        }
    }
    link.to_string()
}

fn first_img_src(description_html: &str) -> Option<String> {
    let re = regex::Regex::new(r#"(?i)<img[^>]+src=["']([^"']+)["']"#).unwrap();
    re.captures(description_html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Discover up to `max_results` candidate news items for a topic.
///
/// Returns an empty list on total failure (network or parse); callers
/// must treat "no sources" as a distinct outcome, not an error.
pub async fn discover(
    client: &reqwest::Client,
    topic: &str,
    max_results: usize,
) -> Vec<NewsSource> {
    let feed_url = search_feed_url(topic);
    let bytes = match client.get(&feed_url).send().await {
        Ok(resp) => match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to read news feed body");
                return Vec::new();
            }
        },
        Err(e) => {
            warn!(topic = %topic, error = %e, "Failed to fetch news feed");
            return Vec::new();
        }
    };

    let parsed = match feed_rs::parser::parse(&bytes[..]) {
        Ok(p) => p,
        Err(e) => {
            warn!(topic = %topic, error = %e, "Failed to parse news feed");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    for entry in parsed.entries {
        if candidates.len() >= max_results {
            break;
        }
        let title = match entry.title.as_ref().map(|t| t.content.trim().to_string()) {
            Some(t) if !t.is_empty() => t,
            _ => continue,
        };
        let link = entry
            .links
            .first()
            .map(|l| publisher_url(&l.href))
            .unwrap_or_default();

        let media_hint = entry
            .media
            .first()
            .and_then(|m| {
                m.content
                    .first()
                    .and_then(|c| c.url.as_ref().map(|u| u.to_string()))
                    .or_else(|| m.thumbnails.first().map(|t| t.image.uri.clone()))
            })
            .filter(|u| !u.is_empty());

        let description_html = entry
            .summary
            .map(|s| s.content)
            .unwrap_or_default();
        let image_hint = media_hint.or_else(|| first_img_src(&description_html));
        let snippet = extract::strip_html(&description_html);

        candidates.push((title, link, snippet, image_hint));
    }

    // Fetch publisher pages concurrently; keep the feed snippet when the
    // page yields nothing longer.
    let fetches = candidates.iter().map(|(_, link, snippet, _)| async move {
        if link.is_empty() {
            return snippet.clone();
        }
        match fetch_page_excerpt(client, link).await {
            Some(text) if text.len() > snippet.len() => text,
            _ => snippet.clone(),
        }
    });
    let excerpts = futures::future::join_all(fetches).await;

    let sources: Vec<NewsSource> = candidates
        .into_iter()
        .zip(excerpts)
        .map(|((title, url, _, image_hint), excerpt)| NewsSource {
            title,
            url,
            excerpt,
            image_hint,
        })
        .collect();

    info!(topic = %topic, count = sources.len(), "Source discovery finished");
    sources
}

/// Fetch a publisher page and extract paragraph text. None on any
/// failure or empty content.
async fn fetch_page_excerpt(client: &reqwest::Client, url: &str) -> Option<String> {
    let response = match client.get(url).timeout(PAGE_TIMEOUT).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %url, error = %e, "Failed to fetch publisher page");
            return None;
        }
    };
    if !response.status().is_success() {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    let html = String::from_utf8_lossy(&bytes[..bytes.len().min(262_144)]);
    let text = extract::paragraph_text(&html, EXCERPT_CHARS);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Fetch the raw HTML of a page, bounded to 256KB. Used by image
/// extraction, where the interesting tags may sit past `<head>`.
pub async fn fetch_page_html(client: &reqwest::Client, url: &str) -> Option<String> {
    if url.is_empty() {
        return None;
    }
    let response = client.get(url).timeout(PAGE_TIMEOUT).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let bytes = response.bytes().await.ok()?;
    Some(String::from_utf8_lossy(&bytes[..bytes.len().min(262_144)]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_url_encodes_query() {
        let url = search_feed_url("Eclipse 2025 & beyond");
        assert!(url.starts_with("https://news.google.com/rss/search?q=Eclipse%202025"));
        assert!(url.contains("%26"));
    }

    #[test]
    fn google_news_links_are_unwrapped() {
        let link = "https://news.google.com/articles/abc?url=https%3A%2F%2Fexample.com%2Fstory&x=1";
        assert_eq!(publisher_url(link), "https://example.com/story");
    }

    #[test]
    fn direct_links_pass_through() {
        assert_eq!(
            publisher_url("https://example.com/story"),
            "https://example.com/story"
        );
        // Unparseable input is kept verbatim rather than dropped.
        assert_eq!(publisher_url("not a url"), "not a url");
    }

    #[test]
    fn google_news_without_url_param_is_kept() {
        let link = "https://news.google.com/rss/articles/xyz";
        assert_eq!(publisher_url(link), link);
    }

    #[test]
    fn first_img_src_reads_description_html() {
        let html = r#"<a href="x"><img src="https://img.example.com/a.jpg" alt=""></a>"#;
        assert_eq!(
            first_img_src(html),
            Some("https://img.example.com/a.jpg".into())
        );
        assert_eq!(first_img_src("<p>no image</p>"), None);
    }
}
