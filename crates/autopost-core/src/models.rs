use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag stamped on every article the worker creates.
pub const ARTICLE_SOURCE: &str = "Autoposter";

/// `imported_from` tag of topics injected by the external trend importer.
pub const TREND_IMPORT_TAG: &str = "trend-source";

/// Hard cap on article titles.
pub const TITLE_MAX_CHARS: usize = 120;

/// Inline 800x450 grey SVG used when no banner image could be obtained.
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml;base64,PHN2ZyB3aWR0aD0iODAwIiBoZWlnaHQ9IjQ1MCIgeG1sbnM9Imh0dHA6Ly93d3cudzMub3JnLzIwMDAvc3ZnIj48cmVjdCB3aWR0aD0iMTAwJSIgaGVpZ2h0PSIxMDAlIiBmaWxsPSIjZTVlN2ViIi8+PC9zdmc+";

/// A subject awaiting article generation. Owned by the external topic
/// management layer; the worker only reads these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Topic {
    /// Trend-imported topics are time-boxed and drop out of the selection
    /// set once expired. Everything else is always eligible.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.imported_from.as_deref() {
            Some(TREND_IMPORT_TAG) => self.expires_at.map(|exp| exp >= now).unwrap_or(true),
            _ => true,
        }
    }
}

/// Outcome of the last processing attempt for a topic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostResult {
    Posted,
    Error,
}

impl PostResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posted => "posted",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "posted" => Some(Self::Posted),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Per-topic status row, upserted by the worker after every attempt.
/// Operator visibility only; cooldown decisions use article history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicStatus {
    pub topic_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_posted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<PostResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A finished article, insert-only from the worker's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub summary: String,
    pub image_url: String,
    pub source: String,
    pub category: String,
    pub published_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<String>,
}

/// Severity of an audit-log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Append-only audit trail row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// One candidate news item produced by source discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSource {
    pub title: String,
    pub url: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_hint: Option<String>,
}

/// Structured result of a generation call. A parse failure leaves
/// everything but the title empty, which callers treat as "no content".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Generated {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<String>,
}

impl Generated {
    pub fn has_content(&self) -> bool {
        self.content
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn topic(imported_from: Option<&str>, expires_at: Option<DateTime<Utc>>) -> Topic {
        Topic {
            id: 1,
            name: "Eclipse 2025".into(),
            description: None,
            created_at: Utc::now(),
            imported_from: imported_from.map(Into::into),
            expires_at,
        }
    }

    #[test]
    fn plain_topic_is_always_eligible() {
        let now = Utc::now();
        assert!(topic(None, None).is_eligible(now));
        assert!(topic(None, Some(now - Duration::hours(1))).is_eligible(now));
    }

    #[test]
    fn expired_trend_topic_is_excluded() {
        let now = Utc::now();
        assert!(!topic(Some(TREND_IMPORT_TAG), Some(now - Duration::seconds(1))).is_eligible(now));
        assert!(topic(Some(TREND_IMPORT_TAG), Some(now + Duration::hours(1))).is_eligible(now));
        // No expiry recorded: keep it in the set.
        assert!(topic(Some(TREND_IMPORT_TAG), None).is_eligible(now));
    }

    #[test]
    fn other_import_tags_ignore_expiry() {
        let now = Utc::now();
        assert!(topic(Some("manual"), Some(now - Duration::hours(2))).is_eligible(now));
    }

    #[test]
    fn post_result_roundtrip() {
        for r in [PostResult::Posted, PostResult::Error] {
            assert_eq!(PostResult::from_str(r.as_str()), Some(r));
        }
        assert_eq!(PostResult::from_str("bogus"), None);
    }

    #[test]
    fn log_level_roundtrip() {
        for l in [LogLevel::Info, LogLevel::Warning, LogLevel::Error] {
            assert_eq!(LogLevel::from_str(l.as_str()), Some(l));
        }
    }

    #[test]
    fn generated_content_presence() {
        assert!(!Generated::default().has_content());
        let g = Generated {
            content: Some("   ".into()),
            ..Default::default()
        };
        assert!(!g.has_content());
        let g = Generated {
            content: Some("A lead paragraph.".into()),
            ..Default::default()
        };
        assert!(g.has_content());
    }
}
