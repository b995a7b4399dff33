//! Rehosting: download a remote banner and store a local copy so the
//! article does not depend on the original host staying up.

use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Hard cap on a downloaded image payload.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15);

const KNOWN_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Where rehosted images land and how they are addressed publicly.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub public_prefix: String,
}

/// Reduce a topic name to a filesystem-safe slug.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_dash = true;
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "image".to_string()
    } else {
        slug
    }
}

/// Infer a file extension from the URL suffix, falling back to the
/// response content-type, defaulting to `.jpg`.
pub fn guess_extension(url: &str, content_type: Option<&str>) -> &'static str {
    let path = url.to_lowercase();
    let path = path.split('?').next().unwrap_or("");
    for ext in KNOWN_EXTENSIONS {
        if path.ends_with(ext) {
            return if *ext == ".jpeg" { ".jpg" } else { ext };
        }
    }
    let ct = content_type.unwrap_or("").to_lowercase();
    if ct.contains("png") {
        ".png"
    } else if ct.contains("webp") {
        ".webp"
    } else if ct.contains("gif") {
        ".gif"
    } else {
        ".jpg"
    }
}

fn has_image_extension(url: &str) -> bool {
    let path = url.to_lowercase();
    let path = path.split('?').next().unwrap_or("");
    KNOWN_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// Write image bytes under the upload dir and return the public URL.
fn store(cfg: &UploadConfig, slug: &str, ext: &str, data: &[u8]) -> Option<String> {
    if std::fs::create_dir_all(&cfg.dir).is_err() {
        return None;
    }
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let filename = format!("{slug}-{timestamp}{ext}");
    let path = cfg.dir.join(&filename);
    match std::fs::write(&path, data) {
        Ok(()) => Some(format!(
            "{}/{}",
            cfg.public_prefix.trim_end_matches('/'),
            filename
        )),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to write rehosted image");
            None
        }
    }
}

async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
) -> Option<(Vec<u8>, Option<String>)> {
    let referer = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| format!("{}://{}/", u.scheme(), h)))
        .unwrap_or_else(|| "https://www.google.com/".to_string());
    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .header("Accept", "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
        .header("Referer", referer)
        .send()
        .await
        .ok()?;
    if !response.status().is_success() {
        return None;
    }
    if let Some(len) = response.content_length() {
        if len as usize > MAX_IMAGE_BYTES {
            return None;
        }
    }
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.bytes().await.ok()?;
    if bytes.is_empty() || bytes.len() > MAX_IMAGE_BYTES {
        return None;
    }
    Some((bytes.to_vec(), content_type))
}

/// Download a validated remote image and store it locally. Returns the
/// public URL of the stored copy, or None on any failure, in which
/// case the caller falls back to the remote URL or the placeholder.
pub async fn download_image(
    client: &reqwest::Client,
    cfg: &UploadConfig,
    url: &str,
    name_hint: &str,
) -> Option<String> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return None;
    }

    let mut fetched = fetch_bytes(client, url).await;
    if fetched.is_none() {
        // Some CDNs reject expired signed query strings but serve the
        // bare object fine.
        if let Some(stripped) = url.split(['#', '?']).next().filter(|s| *s != url && !s.is_empty())
        {
            fetched = fetch_bytes(client, stripped).await;
        }
    }
    let (data, content_type) = fetched?;

    if let Some(ct) = content_type.as_deref() {
        if !ct.to_lowercase().starts_with("image/") && !has_image_extension(url) {
            return None;
        }
    }

    let ext = guess_extension(url, content_type.as_deref());
    store(cfg, &slugify(name_hint), ext, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_flattens_punctuation() {
        assert_eq!(slugify("Eclipse 2025: totală!"), "eclipse-2025-total");
        assert_eq!(slugify("   "), "image");
        assert_eq!(slugify("--a--b--"), "a-b");
    }

    #[test]
    fn extension_from_url_wins() {
        assert_eq!(guess_extension("https://x/a.PNG?sig=1", Some("image/jpeg")), ".png");
        assert_eq!(guess_extension("https://x/a.jpeg", None), ".jpg");
    }

    #[test]
    fn extension_from_content_type_fallback() {
        assert_eq!(guess_extension("https://x/a", Some("image/webp")), ".webp");
        assert_eq!(guess_extension("https://x/a", Some("text/html")), ".jpg");
        assert_eq!(guess_extension("https://x/a", None), ".jpg");
    }

    #[test]
    fn store_writes_file_and_builds_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = UploadConfig {
            dir: dir.path().to_path_buf(),
            public_prefix: "/uploads/".into(),
        };
        let public = store(&cfg, "eclipse-2025", ".jpg", b"fake-bytes").unwrap();
        assert!(public.starts_with("/uploads/eclipse-2025-"));
        assert!(public.ends_with(".jpg"));
        let stored: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected() {
        let client = reqwest::Client::new();
        let dir = tempfile::tempdir().unwrap();
        let cfg = UploadConfig {
            dir: dir.path().to_path_buf(),
            public_prefix: "/uploads".into(),
        };
        assert!(download_image(&client, &cfg, "data:image/png;base64,x", "t").await.is_none());
        assert!(download_image(&client, &cfg, "file:///etc/passwd", "t").await.is_none());
    }
}
