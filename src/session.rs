//! Session state - the engine behind every front end
//!
//! Holds the stored and live config, task, prompt buffer, in-flight flag, last result,
//! transcript and a cached copy of history. Front ends raise intents; a
//! dispatching intent hands back a [`PendingDispatch`] which owns everything
//! it needs, so it can be awaited inline or spawned. Its [`Completion`] is
//! fed back through [`SessionState::complete`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admin::{self, AdminAction};
use crate::client::{Dispatcher, RequestSpec, ResponseResult};
use crate::config::{Config, ConfigStore, ENV_API_KEY, ENV_BASE_URL};
use crate::history::{self, HistoryItem, HistoryStore};
use crate::routes::{self, Diagnostic, Task};

/// Why an intent was refused before reaching the network
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("a request is already in flight")]
    Busy,
    #[error("credential required")]
    CredentialRequired,
    #[error("no history item with id {0}")]
    UnknownHistoryItem(String),
}

/// A network-dispatching intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Send { prompt: String, task: Task },
    Diagnostic(Diagnostic),
    Admin(AdminAction),
}

impl Intent {
    pub fn label(&self) -> String {
        match self {
            Intent::Send { task, .. } => format!("send ({})", task),
            Intent::Diagnostic(d) => d.name().to_string(),
            Intent::Admin(a) => format!("admin {}", a.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub text: String,
}

/// Process-only replacements for stored fields
#[derive(Debug, Clone, Default)]
struct Overrides {
    base_url: Option<String>,
    credential: Option<String>,
}

/// An accepted intent waiting for its I/O
#[derive(Debug)]
pub struct PendingDispatch {
    intent: Intent,
    request: RequestSpec,
    dispatcher: Dispatcher,
}

impl PendingDispatch {
    pub fn intent(&self) -> &Intent {
        &self.intent
    }

    pub fn request(&self) -> &RequestSpec {
        &self.request
    }

    /// Perform the call; never fails, failures land in the result
    pub async fn run(self) -> Completion {
        let result = self.dispatcher.execute(&self.request).await;
        Completion {
            intent: self.intent,
            result,
        }
    }
}

/// Outcome of a [`PendingDispatch`], applied with [`SessionState::complete`]
#[derive(Debug, Clone)]
pub struct Completion {
    pub intent: Intent,
    pub result: ResponseResult,
}

pub struct SessionState {
    /// What is on disk; edits start from here
    stored: Config,
    /// What dispatches use: `stored` plus `overrides`
    config: Config,
    overrides: Overrides,
    config_store: ConfigStore,
    history_store: HistoryStore,
    dispatcher: Dispatcher,

    task: Task,
    prompt: String,
    in_flight: Option<Intent>,
    last_result: Option<ResponseResult>,
    history: Vec<HistoryItem>,
    transcript: Vec<TranscriptMessage>,
}

impl SessionState {
    /// Start a session from persisted config and history
    pub fn open(config_store: ConfigStore, history_store: HistoryStore) -> Self {
        let config = config_store.load();
        Self::new(config, config_store, history_store)
    }

    /// Start with an explicit config, nothing is written
    pub fn new(config: Config, config_store: ConfigStore, history_store: HistoryStore) -> Self {
        let history = history_store.load();
        Self {
            dispatcher: Dispatcher::new(&config),
            stored: config.clone(),
            config,
            overrides: Overrides::default(),
            config_store,
            history_store,
            task: Task::default(),
            prompt: String::new(),
            in_flight: None,
            last_result: None,
            history,
            transcript: vec![],
        }
    }

    /// Apply TITAN_BASE_URL / TITAN_API_KEY to the live config only
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_BASE_URL).ok(),
            std::env::var(ENV_API_KEY).ok(),
        )
    }

    /// Override base URL and/or credential for this process; never persisted
    pub fn with_overrides(mut self, base_url: Option<String>, credential: Option<String>) -> Self {
        let blank = |v: &String| v.trim().is_empty();
        self.overrides = Overrides {
            base_url: base_url.filter(|v| !blank(v)),
            credential: credential.filter(|v| !blank(v)),
        };
        self.apply_overrides();
        self
    }

    fn apply_overrides(&mut self) {
        self.config = self.stored.clone().with_overrides(
            self.overrides.base_url.clone(),
            self.overrides.credential.clone(),
        );
        self.dispatcher = Dispatcher::new(&self.config);
    }

    // ═══════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════

    /// Config in effect for dispatches
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Config as persisted, without overrides
    pub fn stored_config(&self) -> &Config {
        &self.stored
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn is_dispatching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&Intent> {
        self.in_flight.as_ref()
    }

    pub fn last_result(&self) -> Option<&ResponseResult> {
        self.last_result.as_ref()
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    /// Whether Send should be enabled
    pub fn can_send(&self) -> bool {
        !self.is_dispatching() && !self.prompt.trim().is_empty()
    }

    // ═══════════════════════════════════════════════════════════════
    // Local mutations
    // ═══════════════════════════════════════════════════════════════

    pub fn set_task(&mut self, task: Task) {
        self.task = task;
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn prompt_mut(&mut self) -> &mut String {
        &mut self.prompt
    }

    /// Persist a new config and use it from now on. A field that was edited
    /// drops its override; a dispatch already in flight keeps the old config
    pub fn save_config(&mut self, config: Config) -> Result<()> {
        let saved = self.config_store.save(&config)?;
        if saved.base_url != self.stored.base_url {
            self.overrides.base_url = None;
        }
        if saved.credential != self.stored.credential {
            self.overrides.credential = None;
        }
        self.stored = saved;
        self.apply_overrides();
        tracing::info!(base_url = %self.config.base_url, "config updated");
        Ok(())
    }

    /// Edit the stored config and save it; overrides never leak into the file
    pub fn update_config(&mut self, edit: impl FnOnce(&mut Config)) -> Result<()> {
        let mut next = self.stored.clone();
        edit(&mut next);
        self.save_config(next)
    }

    /// Copy a past prompt (and its task) back into the buffer
    pub fn load_from_history(&mut self, id: &str) -> Result<(), Rejected> {
        let item = self
            .history
            .iter()
            .find(|item| item.id == id)
            .ok_or_else(|| Rejected::UnknownHistoryItem(id.to_string()))?;
        self.prompt = item.prompt.clone();
        self.task = item.task;
        Ok(())
    }

    /// Empty the prompt and transcript; the last result is kept while a call is in flight
    pub fn clear(&mut self) {
        self.prompt.clear();
        self.transcript.clear();
        if !self.is_dispatching() {
            self.last_result = None;
        }
    }

    pub fn remove_history_item(&mut self, id: &str) -> Result<(), Rejected> {
        if !self.history.iter().any(|item| item.id == id) {
            return Err(Rejected::UnknownHistoryItem(id.to_string()));
        }
        self.history.retain(|item| item.id != id);
        self.history_store.save(&self.history);
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.history_store.clear();
        self.history.clear();
    }

    // ═══════════════════════════════════════════════════════════════
    // Dispatching intents
    // ═══════════════════════════════════════════════════════════════

    /// Send the prompt buffer to /v1/route
    pub fn send(&mut self) -> Result<PendingDispatch, Rejected> {
        if self.is_dispatching() {
            return Err(Rejected::Busy);
        }
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(Rejected::EmptyPrompt);
        }

        let task = self.task;
        let request = routes::route_request(&prompt, task);
        self.transcript.push(TranscriptMessage {
            role: Role::User,
            text: prompt.clone(),
        });
        Ok(self.begin(Intent::Send { prompt, task }, request))
    }

    /// Set prompt and task, then [`send`](Self::send)
    pub fn send_prompt(&mut self, prompt: &str, task: Task) -> Result<PendingDispatch, Rejected> {
        if self.is_dispatching() {
            return Err(Rejected::Busy);
        }
        if prompt.trim().is_empty() {
            return Err(Rejected::EmptyPrompt);
        }
        self.prompt = prompt.to_string();
        self.task = task;
        self.send()
    }

    pub fn run_diagnostic(&mut self, diagnostic: Diagnostic) -> Result<PendingDispatch, Rejected> {
        if self.is_dispatching() {
            return Err(Rejected::Busy);
        }
        Ok(self.begin(Intent::Diagnostic(diagnostic), diagnostic.request()))
    }

    /// Admin calls need a credential; without one the local error becomes the last result
    pub fn admin_action(&mut self, action: AdminAction) -> Result<PendingDispatch, Rejected> {
        if self.is_dispatching() {
            return Err(Rejected::Busy);
        }
        match admin::authorize(action, &self.config) {
            Ok(request) => Ok(self.begin(Intent::Admin(action), request)),
            Err(err) => {
                self.last_result = Some(err.to_result());
                Err(Rejected::CredentialRequired)
            }
        }
    }

    fn begin(&mut self, intent: Intent, request: RequestSpec) -> PendingDispatch {
        tracing::debug!(intent = %intent.label(), path = %request.path, "intent accepted");
        self.last_result = None;
        self.in_flight = Some(intent.clone());
        PendingDispatch {
            intent,
            request,
            dispatcher: self.dispatcher.clone(),
        }
    }

    /// Apply a finished dispatch: dispatching -> idle
    pub fn complete(&mut self, completion: Completion) {
        let Completion { intent, result } = completion;

        if self.in_flight.as_ref() != Some(&intent) {
            tracing::warn!(intent = %intent.label(), "completion does not match in-flight intent");
        }
        self.in_flight = None;

        if let Intent::Send { prompt, task } = &intent {
            history::insert(&mut self.history, HistoryItem::new(prompt, *task, &result));
            self.history_store.save(&self.history);
            self.transcript.push(TranscriptMessage {
                role: Role::Assistant,
                text: assistant_text(&result),
            });
        }

        tracing::info!(intent = %intent.label(), "{}", result.summary());
        self.last_result = Some(result);
    }

    /// Run a pending dispatch inline and apply it (one-shot commands, tests)
    pub async fn settle(&mut self, pending: PendingDispatch) -> &ResponseResult {
        let completion = pending.run().await;
        self.complete(completion);
        self.last_result
            .get_or_insert_with(|| ResponseResult::local_error("no result"))
    }
}

fn assistant_text(result: &ResponseResult) -> String {
    match (&result.error, result.status) {
        (Some(err), None) => format!("[error: {}]", err),
        (_, Some(status)) if !result.ok => format!("[HTTP {}]\n{}", status, result.body_text()),
        _ => result.body_text(),
    }
}
