use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopost_core::extract::truncate_chars;
use autopost_core::models::{
    Article, Generated, LogLevel, NewsSource, PostResult, Topic, ARTICLE_SOURCE,
    PLACEHOLDER_IMAGE, TITLE_MAX_CHARS,
};
use autopost_core::rehost::UploadConfig;
use autopost_core::shutdown::{self, ShutdownSignal};
use autopost_core::{generate, images, rehost, sources, taxonomy, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::Db;

pub const DEFAULT_DELAY_SECONDS: u64 = 12;

const COOLDOWN_HOURS: i64 = 24;
const MAX_SOURCES: usize = 3;
const IDLE_WAIT: Duration = Duration::from_secs(10);
const CYCLE_WAIT: Duration = Duration::from_secs(5);
const STOP_GRACE: Duration = Duration::from_secs(3);

pub struct WorkerConfig {
    /// Pacing delay between topics, keeps us under provider rate limits.
    pub delay: Duration,
    pub upload: UploadConfig,
}

/// Point-in-time snapshot of the worker, taken under the state lock.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub items_created: u64,
    pub last_error: Option<String>,
    pub current_topic: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    ManuallyStopped,
    MissingCredential,
}

enum CycleEnd {
    Continue,
    Stop,
}

enum TopicOutcome {
    Posted,
    Failed,
    Aborted,
}

/// The network stages of the per-topic pipeline, behind a seam so the
/// scheduler can be exercised without leaving the process.
pub trait Pipeline: Send + Sync {
    fn discover(
        &self,
        client: &reqwest::Client,
        topic: &str,
        max_results: usize,
    ) -> BoxFuture<'static, Vec<NewsSource>>;

    fn find_banner(
        &self,
        client: &reqwest::Client,
        signal: ShutdownSignal,
        topic: &str,
        list: Vec<NewsSource>,
    ) -> BoxFuture<'static, Option<String>>;

    fn rehost(
        &self,
        client: &reqwest::Client,
        upload: &UploadConfig,
        url: &str,
        name_hint: &str,
    ) -> BoxFuture<'static, Option<String>>;

    fn generate(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        topic: &str,
        categories: &[String],
        sources: &[NewsSource],
    ) -> BoxFuture<'static, Result<Generated>>;
}

/// Production pipeline delegating to the live implementations.
pub struct LivePipeline;

impl Pipeline for LivePipeline {
    fn discover(
        &self,
        client: &reqwest::Client,
        topic: &str,
        max_results: usize,
    ) -> BoxFuture<'static, Vec<NewsSource>> {
        let client = client.clone();
        let topic = topic.to_string();
        Box::pin(async move { sources::discover(&client, &topic, max_results).await })
    }

    fn find_banner(
        &self,
        client: &reqwest::Client,
        mut signal: ShutdownSignal,
        topic: &str,
        list: Vec<NewsSource>,
    ) -> BoxFuture<'static, Option<String>> {
        let client = client.clone();
        let topic = topic.to_string();
        Box::pin(async move { images::find_banner_image(&client, &mut signal, &topic, &list).await })
    }

    fn rehost(
        &self,
        client: &reqwest::Client,
        upload: &UploadConfig,
        url: &str,
        name_hint: &str,
    ) -> BoxFuture<'static, Option<String>> {
        let client = client.clone();
        let upload = upload.clone();
        let url = url.to_string();
        let name_hint = name_hint.to_string();
        Box::pin(async move { rehost::download_image(&client, &upload, &url, &name_hint).await })
    }

    fn generate(
        &self,
        client: &reqwest::Client,
        api_key: &str,
        topic: &str,
        categories: &[String],
        sources: &[NewsSource],
    ) -> BoxFuture<'static, Result<Generated>> {
        let client = client.clone();
        let api_key = api_key.to_string();
        let topic = topic.to_string();
        let categories = categories.to_vec();
        let sources = sources.to_vec();
        Box::pin(
            async move { generate::generate(&client, &api_key, &topic, &categories, &sources).await },
        )
    }
}

struct Inner {
    running: bool,
    manual_stopped: bool,
    started_at: Option<DateTime<Utc>>,
    items_created: u64,
    last_error: Option<String>,
    current_topic: Option<String>,
    handle: Option<JoinHandle<()>>,
    shutdown: Option<shutdown::ShutdownHandle>,
}

pub struct Autoposter {
    db: Arc<Db>,
    client: reqwest::Client,
    config: WorkerConfig,
    pipeline: Box<dyn Pipeline>,
    inner: Mutex<Inner>,
}

impl Autoposter {
    pub fn new(db: Arc<Db>, client: reqwest::Client, config: WorkerConfig) -> Self {
        Self::with_pipeline(db, client, config, Box::new(LivePipeline))
    }

    pub fn with_pipeline(
        db: Arc<Db>,
        client: reqwest::Client,
        config: WorkerConfig,
        pipeline: Box<dyn Pipeline>,
    ) -> Self {
        Self {
            db,
            client,
            config,
            pipeline,
            inner: Mutex::new(Inner {
                running: false,
                manual_stopped: false,
                started_at: None,
                items_created: 0,
                last_error: None,
                current_topic: None,
                handle: None,
                shutdown: None,
            }),
        }
    }

    /// Stopped if either flag says so. The flag is intentionally kept
    /// both in memory and as a durable setting: a restarted process or
    /// a second instance must not resume a worker the operator stopped.
    fn is_manual_stopped(&self) -> bool {
        self.inner.lock().unwrap().manual_stopped || self.db.manual_stop()
    }

    /// Start the background loop. A start clears the in-memory stop
    /// flag of this instance, but never the durable one: while the
    /// setting reads true the operator wants the worker down, and a
    /// restarted process or second instance must not resume it. The
    /// operator clears the setting to allow a start. Soft-fails into
    /// `last_error` instead of returning Err: the operator reads the
    /// outcome from `status()`.
    pub fn start(self: &Arc<Self>) -> StartOutcome {
        let mut inner = self.inner.lock().unwrap();
        if inner.running {
            return StartOutcome::AlreadyRunning;
        }

        inner.manual_stopped = false;
        if self.db.manual_stop() {
            inner.last_error = Some("stopped manually, clear the stop flag to resume".into());
            return StartOutcome::ManuallyStopped;
        }

        match self.db.gemini_api_key() {
            Ok(Some(_)) => {}
            _ => {
                inner.last_error = Some("Missing Gemini API key".into());
                return StartOutcome::MissingCredential;
            }
        }

        inner.running = true;
        inner.started_at = Some(Utc::now());
        inner.last_error = None;

        let (handle, signal) = shutdown::channel();
        inner.shutdown = Some(handle);
        let worker = Arc::clone(self);
        inner.handle = Some(tokio::spawn(async move {
            worker.run(signal).await;
        }));
        StartOutcome::Started
    }

    /// Stop the loop. Sets both manual-stop flags, fires the shutdown
    /// signal and waits briefly for the task; `running` is forced off
    /// regardless of whether the task acknowledged in time.
    pub async fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.running {
                return;
            }
            inner.manual_stopped = true;
            if let Err(e) = self.db.set_manual_stop(true) {
                warn!(error = %e, "Failed to persist manual-stop flag");
            }
            if let Some(h) = inner.shutdown.take() {
                h.shutdown();
            }
            inner.running = false;
            inner.current_topic = None;
            inner.handle.take()
        };
        if let Some(task) = handle {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!("Worker task did not stop within the grace period");
            }
        }
    }

    /// Clears the volatile counters only; does not touch the run state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.items_created = 0;
        inner.last_error = None;
    }

    pub fn status(&self) -> Status {
        let inner = self.inner.lock().unwrap();
        Status {
            running: inner.running,
            started_at: inner.started_at,
            items_created: inner.items_created,
            last_error: inner.last_error.clone(),
            current_topic: inner.current_topic.clone(),
        }
    }

    fn set_current_topic(&self, name: Option<&str>) {
        self.inner.lock().unwrap().current_topic = name.map(String::from);
    }

    /// Append to the durable audit trail; a failed write must never
    /// take the loop down, so it only warns.
    fn log(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.db.append_log(level, message) {
            warn!(error = %e, message, "Failed to append audit log entry");
        }
    }

    async fn run(self: Arc<Self>, mut signal: ShutdownSignal) {
        self.log(LogLevel::Info, "Autoposter started");
        loop {
            if signal.is_shutdown() {
                break;
            }
            if self.is_manual_stopped() {
                self.log(LogLevel::Info, "Autoposter stopped manually");
                break;
            }
            match self.run_cycle(&mut signal).await {
                Ok(CycleEnd::Continue) => {}
                Ok(CycleEnd::Stop) => break,
                Err(e) => {
                    error!(error = %e, "Autoposter loop aborted");
                    self.log(
                        LogLevel::Error,
                        &format!("Fatal error: {}", truncate_chars(&e.to_string(), 150)),
                    );
                    self.inner.lock().unwrap().last_error = Some(e.to_string());
                    break;
                }
            }
        }
        let mut inner = self.inner.lock().unwrap();
        inner.running = false;
        inner.current_topic = None;
    }

    async fn run_cycle(&self, signal: &mut ShutdownSignal) -> Result<CycleEnd> {
        let now = Utc::now();
        let topics: Vec<Topic> = self
            .db
            .list_topics()?
            .into_iter()
            .filter(|t| t.is_eligible(now))
            .collect();

        if topics.is_empty() {
            self.set_current_topic(Some("Idle"));
            return Ok(if signal.wait(IDLE_WAIT).await {
                CycleEnd::Stop
            } else {
                CycleEnd::Continue
            });
        }

        let (mut processed, mut posted, mut skipped, mut failed) = (0u32, 0u32, 0u32, 0u32);
        for topic in &topics {
            if signal.is_shutdown() || self.is_manual_stopped() {
                break;
            }
            processed += 1;
            self.set_current_topic(Some(&topic.name));

            let window_start = Utc::now() - ChronoDuration::hours(COOLDOWN_HOURS);
            if self.db.recently_posted(&topic.name, window_start)? {
                skipped += 1;
                self.log(
                    LogLevel::Info,
                    &format!("Skipping '{}', posted within the last 24h", topic.name),
                );
                continue;
            }

            // Pacing between generation calls.
            if signal.wait(self.config.delay).await {
                break;
            }

            match self.process_topic(topic, signal).await? {
                TopicOutcome::Posted => posted += 1,
                TopicOutcome::Failed => failed += 1,
                TopicOutcome::Aborted => break,
            }
        }

        self.set_current_topic(Some("Idle"));
        self.log(
            LogLevel::Info,
            &format!(
                "Cycle finished: {posted} posted, {skipped} skipped, {failed} failed out of {processed} topics"
            ),
        );

        if signal.is_shutdown() || self.is_manual_stopped() {
            return Ok(CycleEnd::Stop);
        }
        Ok(if signal.wait(CYCLE_WAIT).await {
            CycleEnd::Stop
        } else {
            CycleEnd::Continue
        })
    }

    /// One topic through the full pipeline. `Err` is reserved for
    /// storage failures, which abort the whole loop; everything the
    /// network or the generation service does wrong stays a per-topic
    /// `Failed`.
    async fn process_topic(&self, topic: &Topic, signal: &ShutdownSignal) -> Result<TopicOutcome> {
        let src_list = self
            .pipeline
            .discover(&self.client, &topic.name, MAX_SOURCES)
            .await;
        if src_list.is_empty() {
            self.log(
                LogLevel::Warning,
                &format!("'{}': no news sources found", topic.name),
            );
            self.db.upsert_topic_status(
                topic.id,
                PostResult::Error,
                Some("no news sources found"),
                Utc::now(),
            )?;
            return Ok(TopicOutcome::Failed);
        }
        self.log(
            LogLevel::Info,
            &format!("'{}': {} sources found", topic.name, src_list.len()),
        );

        let remote = self
            .pipeline
            .find_banner(&self.client, signal.clone(), &topic.name, src_list.clone())
            .await;
        if signal.is_shutdown() {
            return Ok(TopicOutcome::Aborted);
        }

        let local = match remote.as_deref() {
            Some(url) => {
                self.pipeline
                    .rehost(&self.client, &self.config.upload, url, &topic.name)
                    .await
            }
            None => None,
        };
        let image_url = match (local, remote) {
            (Some(local_url), _) => local_url,
            (None, Some(remote_url)) => {
                self.log(
                    LogLevel::Warning,
                    &format!("'{}': image rehost failed, keeping remote URL", topic.name),
                );
                remote_url
            }
            (None, None) => {
                self.log(
                    LogLevel::Warning,
                    &format!("'{}': no banner image found, using placeholder", topic.name),
                );
                PLACEHOLDER_IMAGE.to_string()
            }
        };

        // Read the credential fresh for every generation call so a key
        // rotated through settings takes effect without a restart.
        let api_key = match self.db.gemini_api_key()? {
            Some(key) => key,
            None => {
                self.log(
                    LogLevel::Warning,
                    &format!("'{}': generation credential missing", topic.name),
                );
                self.db.upsert_topic_status(
                    topic.id,
                    PostResult::Error,
                    Some("generation credential missing"),
                    Utc::now(),
                )?;
                return Ok(TopicOutcome::Failed);
            }
        };
        let categories = self.db.category_names()?;

        let generated =
            match self
                .pipeline
                .generate(&self.client, &api_key, &topic.name, &categories, &src_list)
                .await
            {
                Ok(g) => g,
                Err(e) => {
                    let msg = truncate_chars(&e.to_string(), 80);
                    self.log(
                        LogLevel::Error,
                        &format!("'{}': generation failed: {}", topic.name, msg),
                    );
                    self.db.upsert_topic_status(
                        topic.id,
                        PostResult::Error,
                        Some(&msg),
                        Utc::now(),
                    )?;
                    return Ok(TopicOutcome::Failed);
                }
            };

        if !generated.has_content() {
            self.log(
                LogLevel::Warning,
                &format!("'{}': empty content, nothing posted", topic.name),
            );
            self.db.upsert_topic_status(
                topic.id,
                PostResult::Error,
                Some("empty content"),
                Utc::now(),
            )?;
            return Ok(TopicOutcome::Failed);
        }

        let category = taxonomy::choose_category(generated.category.as_deref(), &categories)
            .unwrap_or_else(|| topic.name.clone());
        let now = Utc::now();
        let article = Article {
            title: truncate_chars(&generated.title, TITLE_MAX_CHARS),
            summary: generated.content.unwrap_or_default(),
            image_url,
            source: ARTICLE_SOURCE.to_string(),
            category: category.clone(),
            published_at: now,
            hashtags: taxonomy::normalize_hashtags(generated.hashtags.as_deref()),
        };
        self.db.insert_article(&article)?;
        self.db
            .upsert_topic_status(topic.id, PostResult::Posted, None, now)?;
        self.log(
            LogLevel::Info,
            &format!(
                "'{}' posted as '{}' [{}]",
                topic.name,
                truncate_chars(&article.title, 50),
                category
            ),
        );
        info!(topic = %topic.name, category = %category, "Article published");

        let mut inner = self.inner.lock().unwrap();
        inner.items_created += 1;
        inner.last_error = None;
        Ok(TopicOutcome::Posted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GEMINI_API_KEY_SETTING;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn test_config(uploads: &TempDir) -> WorkerConfig {
        WorkerConfig {
            delay: Duration::from_millis(10),
            upload: UploadConfig {
                dir: uploads.path().to_path_buf(),
                public_prefix: "/uploads".into(),
            },
        }
    }

    fn worker(db: Arc<Db>, uploads: &TempDir) -> Arc<Autoposter> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        Arc::new(Autoposter::new(db, client, test_config(uploads)))
    }

    /// Canned pipeline: no network, counts generation calls.
    struct StubPipeline {
        sources: Vec<NewsSource>,
        banner: Option<String>,
        reply: Generated,
        generate_calls: Arc<AtomicUsize>,
    }

    impl Pipeline for StubPipeline {
        fn discover(
            &self,
            _client: &reqwest::Client,
            _topic: &str,
            _max_results: usize,
        ) -> BoxFuture<'static, Vec<NewsSource>> {
            let out = self.sources.clone();
            Box::pin(async move { out })
        }

        fn find_banner(
            &self,
            _client: &reqwest::Client,
            _signal: ShutdownSignal,
            _topic: &str,
            _list: Vec<NewsSource>,
        ) -> BoxFuture<'static, Option<String>> {
            let out = self.banner.clone();
            Box::pin(async move { out })
        }

        fn rehost(
            &self,
            _client: &reqwest::Client,
            _upload: &UploadConfig,
            _url: &str,
            _name_hint: &str,
        ) -> BoxFuture<'static, Option<String>> {
            Box::pin(async move { None })
        }

        fn generate(
            &self,
            _client: &reqwest::Client,
            _api_key: &str,
            _topic: &str,
            _categories: &[String],
            _sources: &[NewsSource],
        ) -> BoxFuture<'static, Result<Generated>> {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            let out = self.reply.clone();
            Box::pin(async move { Ok(out) })
        }
    }

    fn stub_worker(db: Arc<Db>, uploads: &TempDir, pipeline: StubPipeline) -> Arc<Autoposter> {
        let client = reqwest::Client::new();
        Arc::new(Autoposter::with_pipeline(
            db,
            client,
            test_config(uploads),
            Box::new(pipeline),
        ))
    }

    fn stub_source() -> NewsSource {
        NewsSource {
            title: "Eclipse headline".into(),
            url: "https://example.com/story".into(),
            excerpt: "Excerpt text.".into(),
            image_hint: None,
        }
    }

    fn article_reply() -> Generated {
        Generated {
            title: "Eclipsa totală de mâine".into(),
            category: Some("Tech".into()),
            content: Some("Lead paragraph.\n\nSecond paragraph.".into()),
            hashtags: Some("eclipsa, soare".into()),
        }
    }

    fn seeded_db(topic_name: &str) -> (Arc<Db>, i64) {
        let db = Arc::new(Db::open_in_memory().unwrap());
        db.put_setting(GEMINI_API_KEY_SETTING, "k").unwrap();
        db.insert_category("Tech").unwrap();
        let id = db.add_topic(topic_name, Utc::now(), None, None).unwrap();
        (db, id)
    }

    #[tokio::test]
    async fn start_soft_fails_without_credential() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let uploads = TempDir::new().unwrap();
        let ap = worker(db, &uploads);

        assert_eq!(ap.start(), StartOutcome::MissingCredential);
        let st = ap.status();
        assert!(!st.running);
        assert_eq!(st.last_error.as_deref(), Some("Missing Gemini API key"));
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        db.put_setting(GEMINI_API_KEY_SETTING, "k").unwrap();
        let uploads = TempDir::new().unwrap();
        let ap = worker(Arc::clone(&db), &uploads);

        // No topics in the database, so the loop just idles.
        assert_eq!(ap.start(), StartOutcome::Started);
        assert_eq!(ap.start(), StartOutcome::AlreadyRunning);
        assert!(ap.status().running);

        ap.stop().await;
        assert!(!ap.status().running);
        assert!(db.manual_stop());
        // Second stop is a no-op.
        ap.stop().await;
        assert!(!ap.status().running);
    }

    #[tokio::test]
    async fn durable_stop_flag_blocks_start_across_restarts() {
        // A fresh instance over storage carrying the stop flag models a
        // restarted process: it must not resume on its own.
        let db = Arc::new(Db::open_in_memory().unwrap());
        db.put_setting(GEMINI_API_KEY_SETTING, "k").unwrap();
        db.set_manual_stop(true).unwrap();
        let uploads = TempDir::new().unwrap();
        let ap = worker(Arc::clone(&db), &uploads);

        assert_eq!(ap.start(), StartOutcome::ManuallyStopped);
        let st = ap.status();
        assert!(!st.running);
        assert!(st.last_error.is_some());
        // The flag is the operator's, start must leave it alone.
        assert!(db.manual_stop());
    }

    #[tokio::test]
    async fn operator_clears_stop_flag_to_resume() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        db.put_setting(GEMINI_API_KEY_SETTING, "k").unwrap();
        let uploads = TempDir::new().unwrap();
        let ap = worker(Arc::clone(&db), &uploads);

        assert_eq!(ap.start(), StartOutcome::Started);
        ap.stop().await;
        assert!(db.manual_stop());

        // Still stopped until the operator clears the setting.
        assert_eq!(ap.start(), StartOutcome::ManuallyStopped);
        db.set_manual_stop(false).unwrap();
        assert_eq!(ap.start(), StartOutcome::Started);
        assert!(ap.status().running);
        ap.stop().await;
    }

    #[tokio::test]
    async fn exhausted_image_strategies_fall_back_to_placeholder() {
        let (db, topic_id) = seeded_db("Eclipse 2025");
        let uploads = TempDir::new().unwrap();
        let ap = stub_worker(
            Arc::clone(&db),
            &uploads,
            StubPipeline {
                sources: vec![stub_source()],
                banner: None,
                reply: article_reply(),
                generate_calls: Arc::new(AtomicUsize::new(0)),
            },
        );
        let (_handle, signal) = shutdown::channel();
        let topic = db.list_topics().unwrap().remove(0);

        let outcome = ap.process_topic(&topic, &signal).await.unwrap();
        assert!(matches!(outcome, TopicOutcome::Posted));

        let article = db.latest_article().unwrap().unwrap();
        assert_eq!(article.image_url, PLACEHOLDER_IMAGE);
        assert!(db
            .recent_logs(20)
            .unwrap()
            .iter()
            .any(|l| l.level == LogLevel::Warning && l.message.contains("placeholder")));
        let st = db.topic_status(topic_id).unwrap().unwrap();
        assert_eq!(st.last_result, Some(PostResult::Posted));
    }

    #[tokio::test]
    async fn empty_generated_body_records_error_status() {
        let (db, topic_id) = seeded_db("Eclipse 2025");
        let uploads = TempDir::new().unwrap();
        let ap = stub_worker(
            Arc::clone(&db),
            &uploads,
            StubPipeline {
                sources: vec![stub_source()],
                banner: Some("https://cdn.example.com/hero.jpg".into()),
                reply: Generated {
                    title: "Eclipsa".into(),
                    ..Default::default()
                },
                generate_calls: Arc::new(AtomicUsize::new(0)),
            },
        );
        let (_handle, signal) = shutdown::channel();
        let topic = db.list_topics().unwrap().remove(0);

        let outcome = ap.process_topic(&topic, &signal).await.unwrap();
        assert!(matches!(outcome, TopicOutcome::Failed));

        // No article row; the failure lands in the status table.
        assert!(db.latest_article().unwrap().is_none());
        let st = db.topic_status(topic_id).unwrap().unwrap();
        assert_eq!(st.last_result, Some(PostResult::Error));
        assert_eq!(st.last_error.as_deref(), Some("empty content"));
        assert!(db
            .recent_logs(20)
            .unwrap()
            .iter()
            .any(|l| l.level == LogLevel::Warning && l.message.contains("empty content")));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_hit_never_reaches_generation() {
        let (db, _topic_id) = seeded_db("Eclipse 2025");
        db.insert_article(&Article {
            title: "Eclipse 2025 pe scurt".into(),
            summary: "Body.".into(),
            image_url: "https://img.example.com/a.jpg".into(),
            source: ARTICLE_SOURCE.into(),
            category: "Tech".into(),
            published_at: Utc::now(),
            hashtags: None,
        })
        .unwrap();
        let generate_calls = Arc::new(AtomicUsize::new(0));
        let uploads = TempDir::new().unwrap();
        let ap = stub_worker(
            Arc::clone(&db),
            &uploads,
            StubPipeline {
                sources: vec![stub_source()],
                banner: None,
                reply: article_reply(),
                generate_calls: Arc::clone(&generate_calls),
            },
        );
        let (_handle, mut signal) = shutdown::channel();

        let end = ap.run_cycle(&mut signal).await.unwrap();
        assert!(matches!(end, CycleEnd::Continue));
        assert_eq!(generate_calls.load(Ordering::SeqCst), 0);
        // Only the pre-seeded article exists.
        let article = db.latest_article().unwrap().unwrap();
        assert_eq!(article.title, "Eclipse 2025 pe scurt");
        assert!(db
            .recent_logs(20)
            .unwrap()
            .iter()
            .any(|l| l.message.contains("Skipping")));
    }

    #[tokio::test]
    async fn reset_clears_volatile_counters() {
        let db = Arc::new(Db::open_in_memory().unwrap());
        let uploads = TempDir::new().unwrap();
        let ap = worker(db, &uploads);

        assert_eq!(ap.start(), StartOutcome::MissingCredential);
        assert!(ap.status().last_error.is_some());

        ap.reset();
        let st = ap.status();
        assert_eq!(st.items_created, 0);
        assert!(st.last_error.is_none());
    }
}
