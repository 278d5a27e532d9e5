//! The Orchestrator (§4.8): the single public façade over the context
//! orchestration core.
//!
//! Per §5, each session has exactly one serialization point — a
//! `tokio::sync::Mutex<SessionState>` — guarding the Active Context and any
//! in-flight compression for that session. Sessions are otherwise
//! independent and run in parallel, mirroring how the teacher's
//! `SessionManager` keys active sessions in a `DashMap` rather than behind
//! one global lock.

use std::collections::HashMap;
use std::sync::Arc;

use ctxcore_context::{ModeTemplateStore, Tier, ToolRegistry};
use ctxcore_core::{
    CheckpointRecord, Message, SessionId, SnapshotId, SnapshotPurpose, SnapshotState,
};
use ctxcore_llm::ModelProvider;
use ctxcore_settings::CoreSettings;
use ctxcore_storage::{HistoryStore, RetentionPolicy, SnapshotStore, SnapshotSummary};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::emergency::run_emergency_compaction;
use crate::errors::{OrchestratorError, Result};
use crate::session::{SessionState, StartSessionConfig};

/// Current wall-clock in epoch milliseconds. The only place the Orchestrator
/// reads real time; every lower layer takes `now` as an explicit argument so
/// it stays deterministic under test.
fn now_millis() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}

/// The context orchestration core's public façade.
pub struct Orchestrator {
    history: Arc<dyn HistoryStore>,
    snapshots: Arc<dyn SnapshotStore>,
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    templates: Arc<dyn ModeTemplateStore>,
    tools: Arc<dyn ToolRegistry>,
    settings: CoreSettings,
    retention: RetentionPolicy,
    sessions: DashMap<SessionId, Arc<Mutex<SessionState>>>,
}

impl Orchestrator {
    /// Build an Orchestrator over the given storage, model providers (keyed
    /// by model id), and the out-of-scope template/tool collaborators
    /// (§1, §9 "inject at session construction").
    #[must_use]
    pub fn new(
        history: Arc<dyn HistoryStore>,
        snapshots: Arc<dyn SnapshotStore>,
        providers: HashMap<String, Arc<dyn ModelProvider>>,
        templates: Arc<dyn ModeTemplateStore>,
        tools: Arc<dyn ToolRegistry>,
        settings: CoreSettings,
    ) -> Self {
        let retention = RetentionPolicy {
            max_retained: settings.max_snapshots_retained,
            ..RetentionPolicy::default_policy()
        };
        Self {
            history,
            snapshots,
            providers,
            templates,
            tools,
            settings,
            retention,
            sessions: DashMap::new(),
        }
    }

    fn provider(&self, model_id: &str) -> Result<Arc<dyn ModelProvider>> {
        self.providers
            .get(model_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::Validation(format!("unregistered model id: {model_id}")))
    }

    async fn tier_for(&self, provider: &Arc<dyn ModelProvider>) -> Result<Tier> {
        let window = match provider.advertised_context().await {
            Ok(window) => window,
            Err(err) => {
                let Some(default_window) = self.settings.default_model_window else {
                    return Err(err.into());
                };
                warn!(model_id = provider.model_id(), %err, default_window, "advertised_context unavailable, using configured default window");
                default_window
            }
        };
        Ok(ctxcore_context::tier_for_window(window, &self.settings.tier_overrides))
    }

    async fn locked(&self, session_id: &SessionId) -> Result<Arc<Mutex<SessionState>>> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    /// Start a fresh session bound to `config.model_id`, with its system
    /// prompt assembled from `config.mode_name` (§4.8 `start_session`).
    #[instrument(skip(self, config), fields(model_id = %config.model_id, mode_name = %config.mode_name))]
    pub async fn start_session(&self, config: StartSessionConfig) -> Result<SessionId> {
        let session_id = SessionId::new();
        let provider = self.provider(&config.model_id)?;
        let tier = self.tier_for(&provider).await?;
        let (counter, compressor, assembler) =
            SessionState::rebind_provider(provider.clone(), self.templates.clone(), self.tools.clone());

        let now = now_millis();
        let system_prompt = assembler.assemble(&config.mode_name, &tier, &config.model_id, now).await?;
        let manager = ctxcore_context::ActiveContextManager::new(system_prompt, counter.clone(), config.model_id.clone()).await;

        let state = SessionState {
            manager,
            compressor,
            assembler,
            counter,
            provider,
            tier,
            model_id: config.model_id,
            mode_name: config.mode_name,
        };
        let _ = self.sessions.insert(session_id.clone(), Arc::new(Mutex::new(state)));
        info!(session_id = %session_id, "session started");
        Ok(session_id)
    }

    /// Rebind `session_id` to `model_id`: resolves its tier, rebuilds the
    /// system prompt, and rebalances budgets, possibly triggering
    /// compression (§4.8 `bind_model`).
    #[instrument(skip(self), fields(session_id = %session_id, model_id))]
    pub async fn bind_model(&self, session_id: &SessionId, model_id: &str) -> Result<()> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;

        let provider = self.provider(model_id)?;
        let tier = self.tier_for(&provider).await?;
        let (counter, compressor, assembler) =
            SessionState::rebind_provider(provider.clone(), self.templates.clone(), self.tools.clone());

        let now = now_millis();
        let system_prompt = assembler.assemble(&state.mode_name, &tier, model_id, now).await?;

        let view = state.manager.snapshot_view();
        state.manager = ctxcore_context::ActiveContextManager::rehydrate(
            system_prompt,
            view.checkpoints,
            view.recent_messages,
            counter.clone(),
            model_id.to_owned(),
        )
        .await;
        state.compressor = compressor;
        state.assembler = assembler;
        state.counter = counter;
        state.provider = provider;
        state.tier = tier;
        state.model_id = model_id.to_owned();

        self.rebalance_locked(&mut state, session_id, now).await?;
        Ok(())
    }

    /// Rebuild the system prompt for `mode_name`, preserving the *current*
    /// tier's sanity-check policy (§4.8 `set_mode`, §4.7).
    #[instrument(skip(self), fields(session_id = %session_id, mode_name))]
    pub async fn set_mode(&self, session_id: &SessionId, mode_name: &str) -> Result<()> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;
        let now = now_millis();
        let system_prompt = state.assembler.assemble(mode_name, &state.tier, &state.model_id, now).await?;
        state.manager.set_system_prompt(system_prompt).await;
        state.mode_name = mode_name.to_owned();
        Ok(())
    }

    /// Append a user message: persisted to Session History, then appended
    /// to Active Context, then budget-checked (§4.8 `add_user_message`).
    pub async fn add_user_message(&self, session_id: &SessionId, text: impl Into<String>) -> Result<()> {
        self.add_message(session_id, Message::user(text.into(), now_millis())).await
    }

    /// Append an assistant message. See [`Self::add_user_message`].
    pub async fn add_assistant_message(&self, session_id: &SessionId, text: impl Into<String>) -> Result<()> {
        self.add_message(session_id, Message::assistant(text.into(), now_millis())).await
    }

    #[instrument(skip(self, message), fields(session_id = %session_id))]
    async fn add_message(&self, session_id: &SessionId, message: Message) -> Result<()> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;

        self.history.append(session_id, message.clone()).await?;

        let now = now_millis();
        if let Err(err) = state.manager.append_recent(message.clone(), &state.tier).await {
            warn!(session_id = %session_id, %err, "append rejected, attempting compression before retry");
            self.maybe_compress_locked(&mut state, session_id, now).await?;
            state.manager.append_recent(message, &state.tier).await.map_err(|_| {
                OrchestratorError::BudgetExceeded(
                    "message still does not fit after compression; caller must run emergency_compact".into(),
                )
            })?;
        }

        self.maybe_compress_locked(&mut state, session_id, now).await?;
        Ok(())
    }

    /// Run one compression pass if the soft-cap or `recent_keep_max`
    /// trigger fires (§4.5). Best-effort: a single pass per call, matching
    /// the "at most one compression per session may be in flight" guarantee
    /// that the caller's own mutex lock already provides.
    async fn maybe_compress_locked(&self, state: &mut SessionState, session_id: &SessionId, now: f64) -> Result<()> {
        let total = state.manager.token_count().total;
        let over_recent = state.manager.recent_messages().len() > state.tier.recent_keep_max;
        if total < state.tier.soft_cap && !over_recent {
            return Ok(());
        }
        match state.compressor.compress(&mut state.manager, &state.tier, &state.model_id, now).await {
            Ok(record) => {
                self.history.record_checkpoint(session_id, record).await?;
                info!(session_id = %session_id, "compression committed via soft-cap trigger");
                Ok(())
            }
            Err(ctxcore_context::ContextError::NoEligibleSpan(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Rebalance after a model rebind: run compression passes until under
    /// `hard_cap`, or escalate to emergency recovery if compression alone
    /// cannot do it.
    async fn rebalance_locked(&self, state: &mut SessionState, session_id: &SessionId, now: f64) -> Result<()> {
        loop {
            if state.manager.token_count().total <= state.tier.hard_cap {
                self.maybe_compress_locked(state, session_id, now).await?;
                return Ok(());
            }
            match state.compressor.compress(&mut state.manager, &state.tier, &state.model_id, now).await {
                Ok(record) => {
                    self.history.record_checkpoint(session_id, record).await?;
                }
                Err(_) => {
                    run_emergency_compaction(state, session_id, &self.snapshots, now).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Return the exact structure to send to the model (§4.8
    /// `prepare_llm_input`). Passes `validate()` and the two boundary
    /// guards before returning.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn prepare_llm_input(&self, session_id: &SessionId) -> Result<ctxcore_core::ActiveContextView> {
        let lock = self.locked(session_id).await?;
        let state = lock.lock().await;
        let view = state.manager.snapshot_view();
        view.validate(state.tier.hard_cap, Some((state.tier.recent_keep_min, state.tier.recent_keep_max)))
            .map_err(ctxcore_context::ContextError::from)?;
        Ok(view)
    }

    /// List this session's snapshots, newest first (§4.8 `list_snapshots`).
    pub async fn list_snapshots(&self, session_id: &SessionId) -> Result<Vec<SnapshotSummary>> {
        let _ = self.locked(session_id).await?;
        Ok(self.snapshots.list(session_id).await?)
    }

    /// Flush Session History, then capture a [`SnapshotState`] of the
    /// current Active Context (§4.8 `create_snapshot`; §4.3 callers must
    /// flush first so the snapshot never outruns durable history).
    #[instrument(skip(self), fields(session_id = %session_id, ?purpose))]
    pub async fn create_snapshot(&self, session_id: &SessionId, purpose: SnapshotPurpose) -> Result<SnapshotId> {
        let lock = self.locked(session_id).await?;
        let state = lock.lock().await;
        self.history.flush(session_id).await?;

        let view = state.manager.snapshot_view();
        let snapshot_state = SnapshotState {
            messages: view.recent_messages,
            checkpoints: view.checkpoints,
            goals: None,
            metadata: serde_json::json!({"model_used": state.model_id}),
        };
        let id = self.snapshots.create(session_id, snapshot_state, purpose).await?;
        self.snapshots.prune(session_id, self.retention).await?;
        Ok(id)
    }

    /// Load `snapshot_id` and rehydrate it as the session's Active Context
    /// (§4.8 `rollback_to`; §4.3 `rollback` itself only reads).
    #[instrument(skip(self), fields(session_id = %session_id, snapshot_id = %snapshot_id))]
    pub async fn rollback_to(&self, session_id: &SessionId, snapshot_id: &SnapshotId) -> Result<()> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;

        let snapshot = self.snapshots.rollback(session_id, snapshot_id).await?;
        let now = now_millis();
        let system_prompt = state.assembler.assemble(&state.mode_name, &state.tier, &state.model_id, now).await?;
        state.manager = ctxcore_context::ActiveContextManager::rehydrate(
            system_prompt,
            snapshot.state.checkpoints,
            snapshot.state.messages,
            state.counter.clone(),
            state.model_id.clone(),
        )
        .await;
        Ok(())
    }

    /// Run the §7 emergency-recovery cascade directly (§4.8
    /// `emergency_compact`).
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn emergency_compact(&self, session_id: &SessionId) -> Result<SnapshotId> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;
        let now = now_millis();
        run_emergency_compaction(&mut state, session_id, &self.snapshots, now).await
    }

    /// Current tier and token accounting for `session_id` (backs the CLI's
    /// `context stats` surface, §6).
    pub async fn context_stats(&self, session_id: &SessionId) -> Result<(Tier, ctxcore_core::TokenBreakdown, usize)> {
        let lock = self.locked(session_id).await?;
        let state = lock.lock().await;
        Ok((state.tier, state.manager.token_count(), state.manager.checkpoints().len()))
    }

    /// Force a compression pass regardless of soft-cap (backs the CLI's
    /// `context compress` surface, §6).
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn force_compress(&self, session_id: &SessionId) -> Result<Option<CheckpointRecord>> {
        let lock = self.locked(session_id).await?;
        let mut state = lock.lock().await;
        let now = now_millis();
        match state.compressor.compress(&mut state.manager, &state.tier, &state.model_id, now).await {
            Ok(record) => {
                self.history.record_checkpoint(session_id, record.clone()).await?;
                Ok(Some(record))
            }
            Err(ctxcore_context::ContextError::NoEligibleSpan(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
