use autopost_core::error::{AppError, Result};
use autopost_core::models::{
    Article, LogEntry, LogLevel, PostResult, Topic, TopicStatus, ARTICLE_SOURCE,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::sync::Mutex;

/// Settings key holding the generation-service credential.
pub const GEMINI_API_KEY_SETTING: &str = "gemini_api_key";
/// Settings key holding the durable manual-stop flag.
pub const MANUAL_STOP_SETTING: &str = "autoposter_manual_stop";

pub struct Db {
    conn: Mutex<Connection>,
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(AppError::db)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(AppError::db)?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::db)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL,
                imported_from TEXT,
                expires_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_topics_created
                ON topics(created_at DESC);

            CREATE TABLE IF NOT EXISTS topic_status (
                topic_id INTEGER PRIMARY KEY,
                last_posted_at TEXT,
                last_result TEXT,
                last_error TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                summary TEXT NOT NULL,
                image_url TEXT NOT NULL,
                source TEXT NOT NULL,
                category TEXT NOT NULL,
                published_at TEXT NOT NULL,
                hashtags TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_articles_pub
                ON articles(published_at DESC);
            CREATE INDEX IF NOT EXISTS idx_articles_source_pub
                ON articles(source, published_at DESC);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS autoposter_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_logs_ts
                ON autoposter_logs(ts DESC);",
        )
        .map_err(AppError::db)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ── settings ──────────────────────────────────────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::db(other)),
        })
    }

    pub fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(AppError::db)?;
        Ok(())
    }

    pub fn gemini_api_key(&self) -> Result<Option<String>> {
        Ok(self
            .get_setting(GEMINI_API_KEY_SETTING)?
            .filter(|k| !k.trim().is_empty()))
    }

    /// Durable manual-stop flag; a second instance or a restarted
    /// process must not auto-resume a manually stopped worker.
    pub fn manual_stop(&self) -> bool {
        matches!(
            self.get_setting(MANUAL_STOP_SETTING),
            Ok(Some(v)) if v == "true"
        )
    }

    pub fn set_manual_stop(&self, stopped: bool) -> Result<()> {
        self.put_setting(MANUAL_STOP_SETTING, if stopped { "true" } else { "false" })
    }

    // ── taxonomy ──────────────────────────────────────────────────────

    pub fn category_names(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM categories ORDER BY id")
            .map_err(AppError::db)?;
        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(AppError::db)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(AppError::db)?;
        Ok(names)
    }

    pub fn category_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))
            .map_err(AppError::db)
    }

    pub fn insert_category(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
            params![name],
        )
        .map_err(AppError::db)?;
        Ok(())
    }

    // ── topics ────────────────────────────────────────────────────────

    /// All topics, newest first. Eligibility filtering happens in the
    /// worker so the expiry rule stays a unit-testable pure function.
    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, created_at, imported_from, expires_at
                 FROM topics ORDER BY created_at DESC, id DESC",
            )
            .map_err(AppError::db)?;
        let topics = stmt
            .query_map([], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: parse_ts(row.get(3)?)?,
                    imported_from: row.get(4)?,
                    expires_at: row
                        .get::<_, Option<String>>(5)?
                        .map(parse_ts)
                        .transpose()?,
                })
            })
            .map_err(AppError::db)?
            .collect::<rusqlite::Result<Vec<Topic>>>()
            .map_err(AppError::db)?;
        Ok(topics)
    }

    /// Topic rows are owned by the external topic-management layer;
    /// this insert exists for seeding and tests.
    pub fn add_topic(
        &self,
        name: &str,
        created_at: DateTime<Utc>,
        imported_from: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO topics (name, created_at, imported_from, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                name,
                created_at.to_rfc3339(),
                imported_from,
                expires_at.map(|d| d.to_rfc3339())
            ],
        )
        .map_err(AppError::db)?;
        Ok(conn.last_insert_rowid())
    }

    // ── articles ──────────────────────────────────────────────────────

    pub fn insert_article(&self, article: &Article) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO articles (title, summary, image_url, source, category, published_at, hashtags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                article.title,
                article.summary,
                article.image_url,
                article.source,
                article.category,
                article.published_at.to_rfc3339(),
                article.hashtags
            ],
        )
        .map_err(AppError::db)?;
        Ok(conn.last_insert_rowid())
    }

    /// Cooldown probe: has the worker already published about this
    /// topic within 24 hours? Case-insensitive substring match on the
    /// title, restricted to worker-created articles.
    pub fn recently_posted(&self, topic_name: &str, window_start: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM articles
                 WHERE source = ?1
                   AND published_at >= ?2
                   AND instr(lower(title), lower(?3)) > 0
             )",
            params![ARTICLE_SOURCE, window_start.to_rfc3339(), topic_name],
            |row| row.get(0),
        )
        .map_err(AppError::db)
    }

    pub fn latest_article(&self) -> Result<Option<Article>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT title, summary, image_url, source, category, published_at, hashtags
             FROM articles ORDER BY id DESC LIMIT 1",
            [],
            |row| {
                Ok(Article {
                    title: row.get(0)?,
                    summary: row.get(1)?,
                    image_url: row.get(2)?,
                    source: row.get(3)?,
                    category: row.get(4)?,
                    published_at: parse_ts(row.get(5)?)?,
                    hashtags: row.get(6)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::db(other)),
        })
    }

    // ── topic status ──────────────────────────────────────────────────

    pub fn upsert_topic_status(
        &self,
        topic_id: i64,
        result: PostResult,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let posted_at = matches!(result, PostResult::Posted).then(|| now.to_rfc3339());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO topic_status (topic_id, last_posted_at, last_result, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(topic_id) DO UPDATE SET
                 last_posted_at = COALESCE(excluded.last_posted_at, topic_status.last_posted_at),
                 last_result = excluded.last_result,
                 last_error = excluded.last_error,
                 updated_at = excluded.updated_at",
            params![topic_id, posted_at, result.as_str(), error, now.to_rfc3339()],
        )
        .map_err(AppError::db)?;
        Ok(())
    }

    pub fn topic_status(&self, topic_id: i64) -> Result<Option<TopicStatus>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT topic_id, last_posted_at, last_result, last_error, updated_at
             FROM topic_status WHERE topic_id = ?1",
            params![topic_id],
            |row| {
                Ok(TopicStatus {
                    topic_id: row.get(0)?,
                    last_posted_at: row
                        .get::<_, Option<String>>(1)?
                        .map(parse_ts)
                        .transpose()?,
                    last_result: row
                        .get::<_, Option<String>>(2)?
                        .and_then(|s| PostResult::from_str(&s)),
                    last_error: row.get(3)?,
                    updated_at: parse_ts(row.get(4)?)?,
                })
            },
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(AppError::db(other)),
        })
    }

    // ── audit log ─────────────────────────────────────────────────────

    pub fn append_log(&self, level: LogLevel, message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO autoposter_logs (ts, level, message) VALUES (?1, ?2, ?3)",
            params![Utc::now().to_rfc3339(), level.as_str(), message],
        )
        .map_err(AppError::db)?;
        Ok(())
    }

    /// Most-recent-first page of the audit trail for the operator UI.
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT id, ts, level, message FROM autoposter_logs
                 ORDER BY id DESC LIMIT ?1",
            )
            .map_err(AppError::db)?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    ts: parse_ts(row.get(1)?)?,
                    level: LogLevel::from_str(&row.get::<_, String>(2)?)
                        .unwrap_or(LogLevel::Info),
                    message: row.get(3)?,
                })
            })
            .map_err(AppError::db)?
            .collect::<rusqlite::Result<Vec<LogEntry>>>()
            .map_err(AppError::db)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(title: &str, source: &str, published_at: DateTime<Utc>) -> Article {
        Article {
            title: title.into(),
            summary: "Body.".into(),
            image_url: "https://img.example.com/a.jpg".into(),
            source: source.into(),
            category: "Tech".into(),
            published_at,
            hashtags: None,
        }
    }

    #[test]
    fn settings_roundtrip_and_manual_stop() {
        let db = Db::open_in_memory().unwrap();
        assert_eq!(db.get_setting("missing").unwrap(), None);
        assert!(!db.manual_stop());

        db.set_manual_stop(true).unwrap();
        assert!(db.manual_stop());
        db.set_manual_stop(false).unwrap();
        assert!(!db.manual_stop());

        db.put_setting(GEMINI_API_KEY_SETTING, "secret").unwrap();
        assert_eq!(db.gemini_api_key().unwrap(), Some("secret".into()));
        db.put_setting(GEMINI_API_KEY_SETTING, "  ").unwrap();
        assert_eq!(db.gemini_api_key().unwrap(), None);
    }

    #[test]
    fn topics_come_back_newest_first() {
        let db = Db::open_in_memory().unwrap();
        let now = Utc::now();
        db.add_topic("old", now - Duration::hours(2), None, None).unwrap();
        db.add_topic("new", now, None, None).unwrap();
        db.add_topic("mid", now - Duration::hours(1), None, None).unwrap();

        let names: Vec<_> = db.list_topics().unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[test]
    fn cooldown_probe_matches_recent_autoposter_titles() {
        let db = Db::open_in_memory().unwrap();
        let now = Utc::now();
        let window_start = now - Duration::hours(24);

        db.insert_article(&article("Eclipsa ECLIPSE 2025 explicată", ARTICLE_SOURCE, now))
            .unwrap();
        assert!(db.recently_posted("eclipse 2025", window_start).unwrap());
        assert!(!db.recently_posted("world cup", window_start).unwrap());
    }

    #[test]
    fn cooldown_probe_ignores_old_and_foreign_articles() {
        let db = Db::open_in_memory().unwrap();
        let now = Utc::now();
        let window_start = now - Duration::hours(24);

        db.insert_article(&article(
            "Eclipse 2025 article",
            ARTICLE_SOURCE,
            now - Duration::hours(25),
        ))
        .unwrap();
        db.insert_article(&article("Eclipse 2025 elsewhere", "Imported", now))
            .unwrap();
        assert!(!db.recently_posted("Eclipse 2025", window_start).unwrap());
    }

    #[test]
    fn topic_status_upsert_keeps_last_posted_at() {
        let db = Db::open_in_memory().unwrap();
        let topic_id = db.add_topic("t", Utc::now(), None, None).unwrap();
        let t0 = Utc::now();

        db.upsert_topic_status(topic_id, PostResult::Posted, None, t0).unwrap();
        let st = db.topic_status(topic_id).unwrap().unwrap();
        assert_eq!(st.last_result, Some(PostResult::Posted));
        assert!(st.last_posted_at.is_some());

        let t1 = t0 + Duration::minutes(5);
        db.upsert_topic_status(topic_id, PostResult::Error, Some("no sources"), t1)
            .unwrap();
        let st = db.topic_status(topic_id).unwrap().unwrap();
        assert_eq!(st.last_result, Some(PostResult::Error));
        assert_eq!(st.last_error.as_deref(), Some("no sources"));
        // The posted timestamp from the earlier success survives.
        assert!(st.last_posted_at.is_some());
        assert_eq!(st.updated_at.timestamp(), t1.timestamp());
    }

    #[test]
    fn recent_logs_page_newest_first() {
        let db = Db::open_in_memory().unwrap();
        for i in 0..5 {
            db.append_log(LogLevel::Info, &format!("entry {i}")).unwrap();
        }
        let logs = db.recent_logs(3).unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "entry 4");
        assert_eq!(logs[2].message, "entry 2");
    }

    #[test]
    fn categories_are_seed_once() {
        let db = Db::open_in_memory().unwrap();
        db.insert_category("Tech").unwrap();
        db.insert_category("Sport").unwrap();
        db.insert_category("Tech").unwrap();
        assert_eq!(db.category_count().unwrap(), 2);
        assert_eq!(db.category_names().unwrap(), vec!["Tech", "Sport"]);
    }
}
