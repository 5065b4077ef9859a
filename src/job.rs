// src/job.rs
//! Single-flight job tracker around one pipeline run, with a once-per-day gate.
//!
//! State lives in one owned object behind a mutex; the lock is never held
//! across an await. The gate metadata is read once at construction and only
//! written back by the success path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{error, info, warn};

use crate::ingest::ensure_metrics_described;
use crate::ingest::types::Source;
use crate::pipeline::{CollectionRun, Progress};

/// Closed set of job stages. `Fetch` carries the source being fetched and
/// serializes as the source name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Queued,
    Running,
    Fetch(Source),
    Dedupe,
    Picked,
    Summarize,
    Save,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Queued => "queued",
            Stage::Running => "running",
            Stage::Fetch(s) => s.as_str(),
            Stage::Dedupe => "dedupe",
            Stage::Picked => "picked",
            Stage::Summarize => "summarize",
            Stage::Save => "save",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }

    /// Transition table.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;
        if next == Error {
            return !matches!(self, Idle | Done | Error);
        }
        match (*self, next) {
            (Idle | Done | Error, Queued) => true,
            (Queued, Running) => true,
            (Running, Running | Fetch(_) | Dedupe) => true,
            (Fetch(a), Fetch(b)) => source_rank(a) < source_rank(b),
            (Fetch(_), Dedupe) => true,
            (Dedupe, Picked) => true,
            (Picked, Summarize | Save | Done) => true,
            (Summarize, Save) => true,
            (Save, Summarize | Save | Done) => true,
            _ => false,
        }
    }
}

fn source_rank(s: Source) -> usize {
    Source::ALL.iter().position(|x| *x == s).unwrap_or(usize::MAX)
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Durable gate state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub last_collected_day: Option<String>,
    pub last_completed_at: Option<DateTime<Utc>>,
}

impl CollectionMeta {
    /// Missing file means "never collected". A corrupt file is logged and ignored.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "collect meta unreadable; starting fresh");
                Self::default()
            }
        }
    }

    /// tmp + rename so a crash never leaves a half-written file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// One run's record. Survives after the run ends until the next `start()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionJob {
    pub job_id: String,
    #[serde(skip)]
    pub running: bool,
    pub stage: Stage,
    pub message: String,
    pub percent: u8,
    pub total: usize,
    pub done: usize,
    pub count: usize,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub running: bool,
    pub collected_today: bool,
    pub day: String,
    #[serde(flatten)]
    pub job: Option<CollectionJob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartCode {
    Started,
    AlreadyRunning,
    AlreadyCollectedToday,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    #[serde(rename = "ok")]
    pub accepted: bool,
    pub code: StartCode,
    pub status: JobStatus,
}

type DayFn = Box<dyn Fn() -> String + Send + Sync>;

/// Local calendar date, `YYYY-MM-DD`.
pub fn local_day_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(p) => p
            .downcast_ref::<&str>()
            .map_or_else(|| "unknown panic".to_string(), |s| s.to_string()),
    }
}

fn new_job_id() -> String {
    format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
}

struct TrackerState {
    job: Option<CollectionJob>,
    meta: CollectionMeta,
}

pub struct JobTracker {
    runner: Arc<dyn CollectionRun>,
    meta_path: PathBuf,
    day_key: DayFn,
    state: Mutex<TrackerState>,
}

impl JobTracker {
    pub fn new(runner: Arc<dyn CollectionRun>, meta_path: impl Into<PathBuf>) -> Self {
        let meta_path = meta_path.into();
        let meta = CollectionMeta::load(&meta_path);
        Self {
            runner,
            meta_path,
            day_key: Box::new(local_day_key),
            state: Mutex::new(TrackerState { job: None, meta }),
        }
    }

    /// Override the calendar used by the gate.
    pub fn with_day_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.day_key = Box::new(f);
        self
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn snapshot(&self, st: &TrackerState) -> JobStatus {
        let day = (self.day_key)();
        JobStatus {
            running: st.job.as_ref().is_some_and(|j| j.running),
            collected_today: st.meta.last_collected_day.as_deref() == Some(day.as_str()),
            day,
            job: st.job.clone(),
        }
    }

    pub fn status(&self) -> JobStatus {
        let st = self.lock();
        self.snapshot(&st)
    }

    /// Non-blocking: decides under the lock, spawns the run, returns.
    pub fn start(self: &Arc<Self>) -> StartOutcome {
        let mut st = self.lock();

        if st.job.as_ref().is_some_and(|j| j.running) {
            return StartOutcome {
                accepted: true,
                code: StartCode::AlreadyRunning,
                status: self.snapshot(&st),
            };
        }

        let day = (self.day_key)();
        if st.meta.last_collected_day.as_deref() == Some(day.as_str()) {
            return StartOutcome {
                accepted: false,
                code: StartCode::AlreadyCollectedToday,
                status: self.snapshot(&st),
            };
        }

        let now = Utc::now();
        let prev = st.job.as_ref().map_or(Stage::Idle, |j| j.stage);
        debug_assert!(prev.can_advance_to(Stage::Queued));
        let job_id = new_job_id();
        st.job = Some(CollectionJob {
            job_id: job_id.clone(),
            running: true,
            stage: Stage::Queued,
            message: "queued".into(),
            percent: 0,
            total: 0,
            done: 0,
            count: 0,
            error: None,
            started_at: now,
            updated_at: now,
        });
        if let Some(job) = st.job.as_mut() {
            job.stage = Stage::Running;
            job.message = "starting".into();
        }
        let status = self.snapshot(&st);
        drop(st);

        info!(job_id = %job_id, "collection started");
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive(job_id).await });

        StartOutcome {
            accepted: true,
            code: StartCode::Started,
            status,
        }
    }

    /// Runs the pipeline in its own task so a panic still ends the job as `Error`.
    async fn drive(self: Arc<Self>, job_id: String) {
        ensure_metrics_described();
        let this = Arc::clone(&self);
        let id = job_id.clone();
        let run = tokio::spawn(async move {
            let on_progress = |p: Progress| this.apply_progress(&id, p);
            this.runner.run(&on_progress).await
        });
        match run.await {
            Ok(Ok(count)) => self.finish_ok(&job_id, count),
            Ok(Err(e)) => self.finish_err(&job_id, &e),
            Err(join) => {
                let err = if join.is_panic() {
                    anyhow::anyhow!("collection panicked: {}", panic_message(join.into_panic()))
                } else {
                    anyhow::anyhow!("collection task cancelled")
                };
                self.finish_err(&job_id, &err);
            }
        }
    }

    fn apply_progress(&self, job_id: &str, p: Progress) {
        let mut st = self.lock();
        let Some(job) = st.job.as_mut().filter(|j| j.job_id == job_id && j.running) else {
            return;
        };
        if job.stage != p.stage && !job.stage.can_advance_to(p.stage) {
            warn!(from = %job.stage, to = %p.stage, "rejected stage transition");
            return;
        }
        job.stage = p.stage;
        job.message = p.message;
        job.percent = job.percent.max(p.percent.min(100));
        job.total = p.total;
        job.done = p.done.min(p.total);
        job.count = p.count;
        job.updated_at = Utc::now();
    }

    fn finish_ok(&self, job_id: &str, count: usize) {
        let now = Utc::now();
        let meta = {
            let mut st = self.lock();
            if let Some(job) = st.job.as_mut().filter(|j| j.job_id == job_id) {
                job.running = false;
                job.stage = Stage::Done;
                job.message = format!("collected {count} items");
                job.percent = 100;
                job.count = count;
                job.done = job.total;
                job.updated_at = now;
            }
            st.meta = CollectionMeta {
                last_collected_day: Some((self.day_key)()),
                last_completed_at: Some(now),
            };
            st.meta.clone()
        };

        if let Err(e) = meta.save(&self.meta_path) {
            warn!(path = %self.meta_path.display(), error = %e, "failed to persist collect meta");
        }
        counter!("collect_runs_total", "outcome" => "ok").increment(1);
        gauge!("collect_last_success_ts").set(now.timestamp() as f64);
        info!(job_id, count, "collection done");
    }

    fn finish_err(&self, job_id: &str, err: &anyhow::Error) {
        let msg = format!("{err:#}");
        {
            let mut st = self.lock();
            if let Some(job) = st.job.as_mut().filter(|j| j.job_id == job_id) {
                job.running = false;
                job.stage = Stage::Error;
                job.message = "collection failed".into();
                job.error = Some(msg.clone());
                job.updated_at = Utc::now();
            }
        }
        counter!("collect_runs_total", "outcome" => "error").increment(1);
        error!(job_id, error = %msg, "collection failed");
    }
}
