//! Banner-image discovery: independent search strategies followed by
//! page-level extraction from the discovered sources.

pub mod extract;
pub mod search;
pub mod validate;

use crate::models::NewsSource;
use crate::shutdown::ShutdownSignal;
use crate::sources;
use tracing::info;
use validate::{is_valid_banner_image, validate_image_url};

/// Walk the discovered sources and pull the first valid banner: the
/// feed-provided image hint when present, otherwise whatever the page
/// extractors find, in source order.
pub async fn extract_from_sources(
    client: &reqwest::Client,
    list: &[NewsSource],
) -> Option<String> {
    for source in list {
        if let Some(hint) = source.image_hint.as_deref() {
            if validate_image_url(hint) && is_valid_banner_image(hint) {
                return Some(hint.to_string());
            }
        }
        if source.url.is_empty() {
            continue;
        }
        if let Some(html) = sources::fetch_page_html(client, &source.url).await {
            if let Some(url) = extract::select_banner(&html, &source.url) {
                return Some(url);
            }
        }
    }
    None
}

/// Find a validated, non-placeholder banner image for a topic.
///
/// Strategy order: Google Images, Bing Images, then extraction from the
/// discovered source pages. When the top search result fails URL
/// validation the remaining candidates are tried before falling back.
/// Returns None when every strategy comes up empty.
pub async fn find_banner_image(
    client: &reqwest::Client,
    shutdown: &mut ShutdownSignal,
    topic: &str,
    list: &[NewsSource],
) -> Option<String> {
    let candidates = search::search_images(client, shutdown, topic, 3).await;
    if !candidates.is_empty() {
        info!(topic = %topic, count = candidates.len(), "Image search found candidates");
        for url in candidates {
            if validate_image_url(&url) {
                return Some(url);
            }
        }
    }
    if shutdown.is_shutdown() {
        return None;
    }
    extract_from_sources(client, list).await
}
