//! Generation adapter: one call to the Gemini `generateContent`
//! endpoint, composing an article from real source text.

use crate::error::Result;
use crate::extract::truncate_chars;
use crate::models::{Generated, NewsSource, TITLE_MAX_CHARS};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Upstream token budget; source text is truncated to fit.
const SOURCE_TEXT_CHARS: usize = 3000;
const GENERATE_TIMEOUT: Duration = Duration::from_secs(25);

fn model_name() -> String {
    std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string())
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

/// Concatenate source titles and excerpts into one bounded text block.
pub fn unified_source_text(sources: &[NewsSource]) -> String {
    let mut parts = Vec::new();
    for source in sources {
        let title = source.title.trim();
        if !title.is_empty() {
            parts.push(title.to_string());
        }
        let excerpt = source.excerpt.trim();
        if !excerpt.is_empty() {
            parts.push(excerpt.to_string());
        }
    }
    let unified = parts.join("\n\n");
    truncate_chars(unified.trim(), SOURCE_TEXT_CHARS)
}

fn build_instruction(topic: &str, categories: &[String], source_text: &str) -> String {
    format!(
        "You are an editor. Write a journalistic news article IN ROMANIAN from the content below.\n\
         Do not invent facts. No demo text, no templates.\n\
         Structure: 3-6 coherent paragraphs (400-650 words), clear and objective tone.\n\
         Paragraphs MUST be separated by blank lines. No subheadings, lists or decorative markers.\n\
         The first paragraph is the LEAD: it summarizes the central idea, self-contained, 2-4 sentences, max 400 characters.\n\n\
         Content:\n{source_text}\n\n\
         Output STRICTLY one JSON object (no extra text, no code fences) with the fields:\n\
         - title: professional news headline (max 120 characters), no quotes\n\
         - category: choose ONLY from the allowed list\n\
         - content: the final article (3-6 paragraphs separated by blank lines)\n\
         - hashtags: 5-7 SEO keywords separated by commas, without #\n\
         Allowed categories: {}.\n\
         Subject: {topic}.",
        categories.join(", ")
    )
}

/// Strip markdown code-fence wrapping that models add despite being
/// told not to.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let inner = trimmed.trim_matches('`');
    let inner = inner.trim();
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim().to_string()
}

/// Parse the model's reply into a `Generated`. A malformed reply yields
/// an empty result (title defaulting to the topic name) so the caller
/// can treat it as "no content produced" rather than a hard failure.
pub fn parse_generated(reply: &str, topic: &str) -> Generated {
    let json_str = strip_code_fences(reply);
    let value: serde_json::Value = serde_json::from_str(&json_str).unwrap_or_default();

    let field = |key: &str| -> Option<String> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };

    Generated {
        title: truncate_chars(
            &field("title").unwrap_or_else(|| topic.to_string()),
            TITLE_MAX_CHARS,
        ),
        category: field("category"),
        content: field("content"),
        hashtags: field("hashtags"),
    }
}

fn extract_reply_text(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        // A non-JSON body is handed to the article parser as-is; it
        // degrades to an empty result there.
        Err(_) => return body.to_string(),
    };
    value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Issue one generation request for a topic.
///
/// Transport and HTTP-status failures are hard errors; a reply that
/// fails to parse degrades to an empty `Generated`.
pub async fn generate(
    client: &reqwest::Client,
    api_key: &str,
    topic: &str,
    categories: &[String],
    sources: &[NewsSource],
) -> Result<Generated> {
    let source_text = unified_source_text(sources);
    let instruction = build_instruction(topic, categories, &source_text);
    let endpoint = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
        model_name(),
        api_key
    );

    let request = GenerateRequest {
        contents: vec![RequestContent {
            parts: vec![RequestPart { text: instruction }],
        }],
    };

    info!(topic = %topic, sources = sources.len(), "Requesting article generation");

    let response = client
        .post(&endpoint)
        .timeout(GENERATE_TIMEOUT)
        .json(&request)
        .send()
        .await?
        .error_for_status()?;
    let body = response.text().await?;

    Ok(parse_generated(&extract_reply_text(&body), topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, excerpt: &str) -> NewsSource {
        NewsSource {
            title: title.into(),
            url: "https://example.com".into(),
            excerpt: excerpt.into(),
            image_hint: None,
        }
    }

    #[test]
    fn unified_text_joins_and_truncates() {
        let text = unified_source_text(&[
            source("First headline", "First excerpt."),
            source("Second headline", ""),
        ]);
        assert_eq!(text, "First headline\n\nFirst excerpt.\n\nSecond headline");

        let long = "x".repeat(5000);
        let text = unified_source_text(&[source("t", &long)]);
        assert_eq!(text.chars().count(), 3000);
    }

    #[test]
    fn code_fences_are_unwrapped() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn well_formed_reply_is_parsed() {
        let reply = r#"{"title":"Eclipsa totală vine","category":"Tech","content":"Lead.\n\nBody.","hashtags":"eclipsa, soare"}"#;
        let g = parse_generated(reply, "Eclipse 2025");
        assert_eq!(g.title, "Eclipsa totală vine");
        assert_eq!(g.category.as_deref(), Some("Tech"));
        assert!(g.has_content());
        assert_eq!(g.hashtags.as_deref(), Some("eclipsa, soare"));
    }

    #[test]
    fn malformed_reply_degrades_to_empty() {
        let g = parse_generated("sorry, I cannot do that", "Eclipse 2025");
        assert_eq!(g.title, "Eclipse 2025");
        assert!(g.category.is_none());
        assert!(!g.has_content());
    }

    #[test]
    fn overlong_title_is_capped() {
        let reply = format!("{{\"title\":\"{}\"}}", "T".repeat(300));
        let g = parse_generated(&reply, "topic");
        assert_eq!(g.title.chars().count(), 120);
    }

    #[test]
    fn reply_text_is_unwrapped_from_candidates() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"title\":\"X\"}"}]}}]}"#;
        assert_eq!(extract_reply_text(body), "{\"title\":\"X\"}");
        assert_eq!(extract_reply_text("plain text"), "plain text");
    }

    #[test]
    fn instruction_lists_allowed_categories() {
        let categories = vec!["Tech".to_string(), "Sport".to_string()];
        let instruction = build_instruction("Eclipse", &categories, "some text");
        assert!(instruction.contains("Tech, Sport"));
        assert!(instruction.contains("Subject: Eclipse."));
        assert!(instruction.contains("some text"));
    }
}
