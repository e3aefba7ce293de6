//! Long-form script relay.
//!
//! A run covers the requested duration with a strictly ordered series of
//! generation calls, one per chapter. Chapter N+1's request carries a
//! continuation hint taken from chapter N, so chapters are never generated in
//! parallel. Whatever terminal state the run reaches, the chapters collected so
//! far are returned.
//!
//! ```text
//! Idle --start--> Running --+--> Completed
//!                           +--> Cancelled   (token raised; snapshot produced)
//!                           +--> Failed(QuotaExceeded | NetworkOrServerError)
//! ```

use crate::api::{ChapterResult, GenerationClient, GenerationError};
use crate::assembler::{ScriptAssembler, last_sentence};
use crate::chapter_plan::{CHUNK_SECONDS, ChapterPlan};
use crate::config::Config;
use crate::duration::format_duration;
use crate::progress::ProgressReport;
use crate::prompt::{ChapterRequest, GenerationSpec, PromptBuilder, SCENES_PER_CHAPTER};
use crate::snapshot::InterruptedSnapshot;
use crate::{logi, logok, logw};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayFailure {
    #[error("generation quota exceeded; retrying within this run will not help")]
    QuotaExceeded { retry_delay_secs: Option<f64> },
    #[error("generation failed: {message}")]
    NetworkOrServerError { message: String },
}

impl From<GenerationError> for RelayFailure {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::QuotaExceeded { retry_delay_secs, .. } => {
                Self::QuotaExceeded { retry_delay_secs }
            }
            other => Self::NetworkOrServerError {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayStatus {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed(RelayFailure),
}

impl RelayStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session cannot start from status {0}")]
    NotIdle(&'static str),
    #[error("session is not running (status {0})")]
    NotRunning(&'static str),
    #[error("terminal status required, got {0}")]
    NotTerminal(&'static str),
}

/// Live state of one relay run. Created per run, never restarted.
#[derive(Debug, Clone)]
pub struct RelaySession {
    total_seconds: u32,
    plan: ChapterPlan,
    collected_scripts: Vec<String>,
    previous_context: String,
    completed_scenes: u32,
    current_chapter: u32,
    status: RelayStatus,
}

impl RelaySession {
    pub fn new(total_seconds: u32) -> Self {
        Self {
            total_seconds,
            plan: ChapterPlan {
                total_seconds,
                chapters: Vec::new(),
            },
            collected_scripts: Vec::new(),
            previous_context: String::new(),
            completed_scenes: 0,
            current_chapter: 0,
            status: RelayStatus::Idle,
        }
    }

    /// `Idle -> Running`; lays out the chapter plan.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.status != RelayStatus::Idle {
            return Err(SessionError::NotIdle(self.status.label()));
        }
        self.plan = ChapterPlan::for_seconds(self.total_seconds);
        self.status = RelayStatus::Running;
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), SessionError> {
        if self.status != RelayStatus::Running {
            return Err(SessionError::NotRunning(self.status.label()));
        }
        Ok(())
    }

    fn begin_chapter(&mut self, index: u32) -> Result<(), SessionError> {
        self.ensure_running()?;
        self.current_chapter = index;
        Ok(())
    }

    /// Stores a finished chapter and moves the continuation hint forward:
    /// service hint, else the chapter's last sentence, else the old context.
    fn record_chapter(&mut self, result: ChapterResult, cleaned: &str) -> Result<(), SessionError> {
        self.ensure_running()?;

        if self.plan.is_relay() {
            if let Some(next) = result
                .hint()
                .map(str::to_string)
                .or_else(|| last_sentence(cleaned))
            {
                self.previous_context = next;
            }
        }

        let scenes = result.scene_count.unwrap_or(SCENES_PER_CHAPTER);
        self.completed_scenes = (self.completed_scenes + scenes).min(self.total_scenes());
        self.collected_scripts.push(result.script);
        Ok(())
    }

    fn finish(&mut self, status: RelayStatus) -> Result<(), SessionError> {
        self.ensure_running()?;
        if !status.is_terminal() {
            return Err(SessionError::NotTerminal(status.label()));
        }
        self.status = status;
        Ok(())
    }

    pub fn status(&self) -> &RelayStatus {
        &self.status
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn chunk_seconds(&self) -> u32 {
        CHUNK_SECONDS
    }

    pub fn plan(&self) -> &ChapterPlan {
        &self.plan
    }

    pub fn chapter_count(&self) -> u32 {
        self.plan.chapter_count()
    }

    pub fn current_chapter(&self) -> u32 {
        self.current_chapter
    }

    pub fn collected_scripts(&self) -> &[String] {
        &self.collected_scripts
    }

    pub fn previous_context(&self) -> &str {
        &self.previous_context
    }

    pub fn completed_scenes(&self) -> u32 {
        self.completed_scenes
    }

    pub fn total_scenes(&self) -> u32 {
        self.chapter_count() * SCENES_PER_CHAPTER
    }

    pub fn progress(&self) -> ProgressReport {
        ProgressReport::from_session(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    /// Pause before re-asking for a chapter that came back too short.
    pub retry_delay: Duration,
    /// Budget for one attempt at one chapter; `None` waits indefinitely.
    pub chapter_timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(1),
            chapter_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl From<&Config> for RelaySettings {
    fn from(cfg: &Config) -> Self {
        Self {
            retry_delay: cfg.retry_delay(),
            chapter_timeout: cfg.chapter_timeout(),
        }
    }
}

/// What a finished run hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayOutcome {
    pub status: RelayStatus,
    /// Collected chapters joined and cleaned.
    pub script: String,
    pub chapters: Vec<String>,
    pub progress: ProgressReport,
    /// Present only for cancelled runs.
    pub snapshot: Option<InterruptedSnapshot>,
}

impl RelayOutcome {
    pub fn is_partial(&self) -> bool {
        self.status != RelayStatus::Completed
    }
}

enum CallError {
    Cancelled,
    Failed(GenerationError),
}

pub struct RelayController {
    client: Box<dyn GenerationClient>,
    assembler: ScriptAssembler,
    settings: RelaySettings,
}

impl RelayController {
    pub fn new(client: Box<dyn GenerationClient>, settings: RelaySettings) -> anyhow::Result<Self> {
        Ok(Self {
            client,
            assembler: ScriptAssembler::new()?,
            settings,
        })
    }

    pub fn assembler(&self) -> &ScriptAssembler {
        &self.assembler
    }

    pub async fn run(&self, spec: &GenerationSpec, cancel: &CancellationToken) -> RelayOutcome {
        self.run_with(spec, cancel, |_| {}).await
    }

    /// Runs a fresh session to a terminal status, calling `on_progress` after
    /// every state change.
    pub async fn run_with<F>(
        &self,
        spec: &GenerationSpec,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> RelayOutcome
    where
        F: FnMut(&RelaySession) + Send,
    {
        let mut session = RelaySession::new(spec.total_seconds());
        if let Err(e) = self.drive(&mut session, spec, cancel, &mut on_progress).await {
            tracing::error!("relay session aborted: {e}");
        }
        self.outcome(session, spec)
    }

    fn outcome(&self, session: RelaySession, spec: &GenerationSpec) -> RelayOutcome {
        let script = self.assembler.assemble(session.collected_scripts());
        let snapshot = (session.status == RelayStatus::Cancelled)
            .then(|| InterruptedSnapshot::capture(spec, script.clone()));
        RelayOutcome {
            progress: session.progress(),
            status: session.status,
            chapters: session.collected_scripts,
            script,
            snapshot,
        }
    }

    /// Drives `session` from `Idle` to a terminal status. Fails only if the
    /// session was already used.
    pub async fn drive<F>(
        &self,
        session: &mut RelaySession,
        spec: &GenerationSpec,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<(), SessionError>
    where
        F: FnMut(&RelaySession) + Send,
    {
        session.start()?;
        let plan = session.plan().clone();
        let builder = PromptBuilder::new(spec, &plan);
        let total = plan.chapter_count();

        if plan.is_relay() {
            logi(format!(
                "{}-minute relay started ({} chapters, {} each)",
                (f64::from(plan.total_seconds) / 60.0).round() as u32,
                total,
                format_duration(f64::from(CHUNK_SECONDS) / 60.0)
            ));
        } else {
            logi(format!(
                "Single-call script started ({})",
                format_duration(f64::from(plan.total_seconds) / 60.0)
            ));
        }
        on_progress(session);

        for index in 1..=total {
            if cancel.is_cancelled() {
                logw(format!(
                    "[stop] Cancelled before chapter {}; keeping {} finished chapter(s)",
                    index,
                    session.collected_scripts().len()
                ));
                session.finish(RelayStatus::Cancelled)?;
                on_progress(session);
                return Ok(());
            }

            session.begin_chapter(index)?;
            let Some(request) = builder.build(index, session.previous_context()) else {
                session.finish(RelayStatus::Failed(RelayFailure::NetworkOrServerError {
                    message: format!("no chapter {} in plan", index),
                }))?;
                on_progress(session);
                return Ok(());
            };

            logi(format!(
                "[{}/{}] Generating chapter ({} of content)",
                index,
                total,
                format_duration(request.target_minutes)
            ));

            // A blank relay chapter is kept and the context carries over; a
            // single-call run has nothing else to fall back on.
            let reply = self.call_with_retry(&request, cancel).await.and_then(|result| {
                if !plan.is_relay() && result.script.trim().is_empty() {
                    Err(CallError::Failed(GenerationError::EmptyScript))
                } else {
                    Ok(result)
                }
            });

            match reply {
                Ok(result) => {
                    let cleaned = self.assembler.clean(&result.script);
                    session.record_chapter(result, &cleaned)?;
                    logok(format!("[{}/{}] Chapter done", index, total));
                    on_progress(session);
                }
                Err(CallError::Cancelled) => {
                    logw(format!(
                        "[stop] Cancelled during chapter {}; keeping {} finished chapter(s)",
                        index,
                        session.collected_scripts().len()
                    ));
                    session.finish(RelayStatus::Cancelled)?;
                    on_progress(session);
                    return Ok(());
                }
                Err(CallError::Failed(err)) => {
                    let failure = RelayFailure::from(err);
                    match &failure {
                        RelayFailure::QuotaExceeded { retry_delay_secs } => logw(format!(
                            "[stop] Quota exceeded at chapter {} (retry hint: {}); {} chapter(s) kept",
                            index,
                            retry_delay_secs
                                .map(|s| format!("{}s", s.ceil() as u64))
                                .unwrap_or_else(|| "none".to_string()),
                            session.collected_scripts().len()
                        )),
                        RelayFailure::NetworkOrServerError { message } => logw(format!(
                            "[stop] Chapter {} failed: {}; {} chapter(s) kept",
                            index,
                            message,
                            session.collected_scripts().len()
                        )),
                    }
                    session.finish(RelayStatus::Failed(failure))?;
                    on_progress(session);
                    return Ok(());
                }
            }
        }

        session.finish(RelayStatus::Completed)?;
        logok(if plan.is_relay() {
            "Relay generation complete"
        } else {
            "Script generation complete"
        });
        on_progress(session);
        Ok(())
    }

    async fn call_with_retry(
        &self,
        request: &ChapterRequest,
        cancel: &CancellationToken,
    ) -> Result<ChapterResult, CallError> {
        match self.call_once(request, cancel).await {
            Err(CallError::Failed(err)) if err.is_too_short() => {
                logw(format!(
                    "[{}/{}] Response too short; retrying once",
                    request.current_chapter, request.total_chapters
                ));
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CallError::Cancelled),
                    _ = tokio::time::sleep(self.settings.retry_delay) => {}
                }
                self.call_once(request, cancel).await
            }
            other => other,
        }
    }

    async fn call_once(
        &self,
        request: &ChapterRequest,
        cancel: &CancellationToken,
    ) -> Result<ChapterResult, CallError> {
        let attempt = async {
            match self.settings.chapter_timeout {
                Some(limit) => tokio::time::timeout(limit, self.client.generate(request))
                    .await
                    .unwrap_or(Err(GenerationError::Timeout(limit))),
                None => self.client.generate(request).await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallError::Cancelled),
            res = attempt => res.map_err(CallError::Failed),
        }
    }
}
