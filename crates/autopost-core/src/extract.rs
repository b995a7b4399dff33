//! Best-effort plain-text extraction from publisher HTML.

/// Decode the handful of HTML entities that show up in feed snippets
/// and paragraph text. Not a full entity table on purpose.
pub fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Strip tags from an HTML snippet and collapse whitespace.
pub fn strip_html(snippet: &str) -> String {
    let re_tag = regex::Regex::new(r"<[^>]+>").unwrap();
    let re_ws = regex::Regex::new(r"\s+").unwrap();
    let text = re_tag.replace_all(snippet, " ");
    let text = re_ws.replace_all(&text, " ");
    decode_entities(text.trim())
}

/// Extract paragraph/heading/list text from a full HTML page, skipping
/// script and style blocks. Returns up to `max_chars` characters,
/// truncated at a char boundary.
pub fn paragraph_text(html: &str, max_chars: usize) -> String {
    let re_script = regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap();
    let re_style = regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap();
    let cleaned = re_script.replace_all(html, "");
    let cleaned = re_style.replace_all(&cleaned, "");

    let re_blocks = regex::Regex::new(r"(?is)<(?:p|h[1-6]|li)[^>]*>(.*?)</(?:p|h[1-6]|li)>").unwrap();
    let re_tag = regex::Regex::new(r"<[^>]+>").unwrap();

    let mut parts = Vec::new();
    let mut total = 0;
    for cap in re_blocks.captures_iter(&cleaned) {
        let inner = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let text = re_tag.replace_all(inner, "");
        let text = text.trim();
        if text.len() < 5 {
            continue;
        }
        let decoded = decode_entities(text);
        let decoded = decoded.trim().to_string();
        if decoded.is_empty() {
            continue;
        }
        total += decoded.len();
        parts.push(decoded);
        if total >= max_chars {
            break;
        }
    }

    let mut result = parts.join("\n");
    if result.len() > max_chars {
        let mut end = max_chars;
        while end > 0 && !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }
    result
}

/// Truncate a string to `max_chars` characters (not bytes).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
