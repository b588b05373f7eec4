//! The game pipeline: authorize, execute, observe, advance the story.
//!
//! [`Game`] is the single writer of progress. Every operation computes its
//! progress events first and applies them in one step, so a snapshot taken
//! between operations (e.g. by the autosaver) never sees half a command.

use crate::core::config::{PendingPolicy, ShellConfig};
use crate::core::engine::{Engine, ExecutionResult};
use crate::core::error::ShellError;
use crate::core::journal::Journal;
use crate::core::progress::{BeatId, MessageId, ProgressEvent, ProgressSnapshot, StoryFlag};
use crate::core::session::{ChallengeKind, HostAddress, Session};
use crate::core::sql::Command;
use crate::core::store::{self, KvStore, SaveSnapshot};
use crate::core::world;
use crate::plugins::authorize::{self, Authorized, Decision};
use crate::plugins::catalog::{self, RenderedMessage};
use crate::plugins::challenge;
use crate::plugins::narrative::{Action, EventGraph, EventKind, StoryTrigger};
use crate::plugins::observer::{self, Discovery, Observation};
use crate::plugins::suggest::{self, Suggestion};
use serde::Serialize;

pub const NO_PENDING: &str = "No challenge is pending.";
pub const BAD_LOGIN: &str = "Access denied: invalid username or password.";

#[derive(Debug)]
pub enum Outcome {
    Rows(ExecutionResult),
    Connected(HostAddress),
    Disconnected,
    LoggedIn { name: String, permission: u8 },
    ChallengeRequired(ChallengeKind),
    /// Syntax or authorization failure; nothing ran.
    Denied(ShellError),
    /// The engine rejected an authorized statement.
    EngineError(ShellError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Denied(_) | Outcome::EngineError(_))
    }
}

#[derive(Debug)]
pub struct Response {
    pub outcome: Outcome,
    pub discoveries: Vec<Discovery>,
    pub notices: Vec<String>,
}

impl Response {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            discoveries: Vec::new(),
            notices: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameStatus {
    pub identity: Option<String>,
    pub connected_host: Option<String>,
    pub logged_in_as: Option<String>,
    pub permission_level: u8,
    pub pending_challenge: Option<ChallengeKind>,
    pub narrative_cursor: String,
    pub flags: Vec<StoryFlag>,
    pub unread_mail: Vec<MessageId>,
}

pub struct Game {
    engine: Engine,
    session: Session,
    progress: ProgressSnapshot,
    story: EventGraph,
    journal: Journal,
    config: ShellConfig,
    notes: String,
}

impl Game {
    /// Fresh world and progress. The configured player name, if any,
    /// becomes the identity.
    pub fn new(config: ShellConfig, journal: Journal) -> Result<Self, ShellError> {
        let mut progress = ProgressSnapshot::default();
        if let Some(name) = &config.player {
            progress.apply(&ProgressEvent::SetIdentity { name: name.clone() });
        }
        let game = Self {
            engine: Engine::new_world()?,
            session: Session::new(),
            progress,
            story: EventGraph::builtin(),
            journal,
            config,
            notes: String::new(),
        };
        game.journal.note(game.actor(), "game.new", "ok", None);
        Ok(game)
    }

    pub fn from_snapshot(
        snapshot: SaveSnapshot,
        config: ShellConfig,
        journal: Journal,
    ) -> Result<Self, ShellError> {
        let mut progress = snapshot.progress;
        progress.normalize();
        Ok(Self {
            engine: Engine::import_snapshot(&snapshot.world)?,
            session: Session::new(),
            progress,
            story: EventGraph::builtin(),
            journal,
            config,
            notes: snapshot.notes,
        })
    }

    /// Resume the saved game, or start a new one when nothing is saved.
    pub fn load(
        store: &dyn KvStore,
        config: ShellConfig,
        journal: Journal,
    ) -> Result<Self, ShellError> {
        match store::load(store) {
            Ok(Some(snapshot)) => {
                let game = Self::from_snapshot(snapshot, config, journal)?;
                game.journal.note(game.actor(), "game.load", "ok", None);
                Ok(game)
            }
            Ok(None) => Self::new(config, journal),
            Err(e) => {
                journal.note("player", "game.load", "error", Some(&e.to_string()));
                Err(e)
            }
        }
    }

    pub fn progress(&self) -> &ProgressSnapshot {
        &self.progress
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn story(&self) -> &EventGraph {
        &self.story
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    fn actor(&self) -> &str {
        self.progress.identity.as_deref().unwrap_or("player")
    }

    /// Apply a batch of events as one step.
    fn commit(&mut self, events: &[ProgressEvent]) -> usize {
        self.progress.apply_all(events)
    }

    fn trigger_events(&self, trigger: Option<StoryTrigger>) -> Vec<ProgressEvent> {
        let Some(trigger) = trigger else {
            return Vec::new();
        };
        match self.story.trigger_event(trigger.event_key()) {
            Ok(event) => {
                self.journal
                    .note(self.actor(), "narrative.trigger", "ok", Some(trigger.name()));
                vec![event]
            }
            Err(e) => {
                self.journal.note(
                    self.actor(),
                    "narrative.trigger",
                    "error",
                    Some(&e.to_string()),
                );
                Vec::new()
            }
        }
    }

    /// Set the player's name. Only the first name sticks.
    pub fn set_identity(&mut self, name: &str) -> bool {
        self.commit(&[ProgressEvent::SetIdentity {
            name: name.to_string(),
        }]) > 0
    }

    /// Handle one line of player input.
    pub fn submit(&mut self, raw: &str) -> Response {
        let command = Command::parse(raw);
        let verb = command.verb().unwrap_or_default();
        let decision = authorize::authorize(
            &command,
            &self.session,
            &self.progress,
            self.config.pending_policy,
        );

        let mut notices = Vec::new();
        if self.config.pending_policy == PendingPolicy::Supersede
            && !decision.is_block()
            && let Some(dropped) = self.session.take_pending()
        {
            notices.push(format!(
                "Pending {} challenge discarded.",
                dropped.challenge.as_str()
            ));
            self.journal.note(
                self.actor(),
                "challenge.supersede",
                "ok",
                Some(dropped.challenge.as_str()),
            );
        }

        let mut response = match decision {
            Decision::Block(denial) => {
                self.journal
                    .note(self.actor(), "authorize", "block", Some(&verb));
                Response::new(Outcome::Denied(denial.into_error()))
            }
            Decision::Defer(pending) => {
                // A password is only asked for a command it can unlock.
                if let Err(e) = challenge::extract_target(&command, pending.challenge) {
                    self.journal.note(
                        self.actor(),
                        "authorize",
                        "block",
                        Some(pending.challenge.as_str()),
                    );
                    return Response {
                        notices,
                        ..Response::new(Outcome::Denied(e))
                    };
                }
                let trigger = challenge::on_deferred(&pending, &self.progress);
                let events = self.trigger_events(trigger);
                let kind = pending.challenge;
                self.session.defer(pending);
                self.commit(&events);
                self.journal
                    .note(self.actor(), "authorize", "defer", Some(kind.as_str()));
                Response::new(Outcome::ChallengeRequired(kind))
            }
            Decision::Allow(allowed) => {
                self.journal
                    .note(self.actor(), "authorize", "allow", Some(&verb));
                self.run(allowed)
            }
        };
        notices.append(&mut response.notices);
        response.notices = notices;
        response
    }

    fn run(&mut self, allowed: Authorized) -> Response {
        match allowed {
            Authorized::Connect(host) => {
                self.session.connect(host);
                if host == world::MAIN_HOST {
                    self.commit(&[ProgressEvent::SetFlag {
                        flag: StoryFlag::ConnectedToMainIp,
                    }]);
                }
                Response::new(Outcome::Connected(host))
            }
            Authorized::Disconnect => {
                self.session.disconnect();
                Response::new(Outcome::Disconnected)
            }
            Authorized::Login { name, password } => self.login(&name, &password),
            Authorized::Sql(sql) => self.execute(&sql),
        }
    }

    fn login(&mut self, name: &str, password: &str) -> Response {
        let user = match self.engine.lookup_user(name) {
            Ok(user) => user,
            Err(e) => return Response::new(Outcome::EngineError(e)),
        };
        match user {
            Some(user) if user.plaintext_password() == password => {
                let permission = u8::try_from(user.permission.max(0)).unwrap_or(u8::MAX);
                self.session.login(&user.name, permission);
                self.journal
                    .note(self.actor(), "login", "ok", Some(&user.name));
                Response::new(Outcome::LoggedIn {
                    name: user.name,
                    permission,
                })
            }
            _ => {
                self.journal.note(self.actor(), "login", "denied", None);
                Response::new(Outcome::Denied(ShellError::AuthorizationDenied(
                    BAD_LOGIN.to_string(),
                )))
            }
        }
    }

    fn execute(&mut self, sql: &str) -> Response {
        let result = match self.engine.execute(sql) {
            Ok(result) => result,
            Err(e) => {
                self.journal
                    .note(self.actor(), "execute", "error", Some(&e.to_string()));
                return Response::new(Outcome::EngineError(e));
            }
        };

        let executed = Command::parse(sql);
        let discoveries = observer::observe(
            &Observation {
                command: &executed,
                result: &result,
            },
            &self.progress,
        );
        let mut events: Vec<ProgressEvent> =
            discoveries.iter().map(|d| d.event.clone()).collect();
        // Several detectors may fire at once; the last trigger decides where
        // the story goes.
        let trigger = discoveries.iter().filter_map(|d| d.trigger).last();
        events.extend(self.trigger_events(trigger));
        self.commit(&events);

        for discovery in &discoveries {
            self.journal.note(
                self.actor(),
                "observe",
                "discovery",
                Some(&discovery.detector.name()),
            );
        }
        self.journal.note(
            self.actor(),
            "execute",
            "ok",
            Some(&format!("rows={} changes={}", result.rows.len(), result.changes)),
        );

        Response {
            outcome: Outcome::Rows(result),
            discoveries,
            notices: Vec::new(),
        }
    }

    /// Answer the pending challenge. The pending command is consumed whether
    /// or not the credential matches.
    pub fn resolve_challenge(&mut self, credential: &str) -> Response {
        let Some(pending) = self.session.take_pending() else {
            return Response::new(Outcome::Denied(ShellError::AuthorizationDenied(
                NO_PENDING.to_string(),
            )));
        };
        let resolution = challenge::resolve_challenge(
            &pending,
            credential,
            &self.engine,
            &self.session,
            &self.progress,
        );

        let mut events = resolution.events;
        events.extend(self.trigger_events(resolution.trigger));
        self.commit(&events);

        let kind = pending.challenge.as_str();
        match resolution.outcome {
            Ok(result) => {
                self.journal
                    .note(self.actor(), "challenge", "granted", Some(kind));
                Response::new(Outcome::Rows(result))
            }
            Err(e @ ShellError::EngineExecution(_)) => {
                self.journal.note(self.actor(), "challenge", "error", Some(kind));
                Response::new(Outcome::EngineError(e))
            }
            Err(e) => {
                self.journal
                    .note(self.actor(), "challenge", "denied", Some(kind));
                Response::new(Outcome::Denied(e))
            }
        }
    }

    /// Drop the pending challenge without touching progress.
    pub fn cancel_challenge(&mut self) -> bool {
        let cancelled = self.session.take_pending();
        if let Some(pending) = &cancelled {
            self.journal.note(
                self.actor(),
                "challenge",
                "cancelled",
                Some(pending.challenge.as_str()),
            );
        }
        cancelled.is_some()
    }

    /// Completions against the tables the player can currently see.
    pub fn suggest(&self, partial: &str) -> Vec<Suggestion> {
        match self.engine.schema_snapshot() {
            Ok(schema) => suggest::suggest(
                partial,
                &authorize::visible_schema(&schema, &self.session, &self.progress),
            ),
            Err(_) => Vec::new(),
        }
    }

    /// Poll the story until something must be shown or nothing moves.
    pub fn check_for_progress(&mut self) -> Action {
        for _ in 0..=self.story.events().len() {
            let step = self.story.check_for_progress(&self.progress);
            let changed = self.commit(&step.events);
            if step.action != Action::None {
                self.journal.note(
                    self.actor(),
                    "narrative.present",
                    "ok",
                    Some(self.progress.narrative_cursor.as_str()),
                );
                return step.action;
            }
            if changed == 0 {
                break;
            }
        }
        Action::None
    }

    /// The cutscene at the cursor, while it has not been acknowledged.
    pub fn pending_cutscene(&self) -> Option<BeatId> {
        match self.story.get(&self.progress.narrative_cursor)?.kind {
            EventKind::Cutscene(beat) if !self.progress.beat_viewed(beat) => Some(beat),
            _ => None,
        }
    }

    pub fn acknowledge_beat(&mut self, beat: BeatId) {
        let events = self.story.acknowledge_beat(&self.progress, beat);
        self.commit(&events);
        self.journal
            .note(self.actor(), "narrative.ack", "ok", Some(beat.as_str()));
    }

    /// Open a revealed message and mark it read.
    pub fn read_message(&mut self, id: MessageId) -> Result<RenderedMessage, ShellError> {
        if !self.progress.message(id).revealed {
            return Err(ShellError::NotFound(format!("message '{id}'")));
        }
        let events = self.story.read_message(&self.progress, id);
        self.commit(&events);
        self.journal
            .note(self.actor(), "narrative.read", "ok", Some(id.as_str()));
        Ok(catalog::render_message(id, self.progress.identity.as_deref()))
    }

    /// Revealed messages, oldest first, with their read state.
    pub fn mailbox(&self) -> Vec<(MessageId, bool)> {
        MessageId::ALL
            .iter()
            .filter(|id| self.progress.message(**id).revealed)
            .map(|id| (*id, self.progress.message(*id).acknowledged))
            .collect()
    }

    pub fn trigger_event(&mut self, key: &str) -> Result<(), ShellError> {
        let event = self.story.trigger_event(key)?;
        self.commit(&[event]);
        self.journal
            .note(self.actor(), "narrative.trigger", "ok", Some(key));
        Ok(())
    }

    /// New world and progress; the identity survives.
    pub fn reset(&mut self) -> Result<(), ShellError> {
        let engine = Engine::new_world()?;
        self.engine = engine;
        self.progress = self.progress.reset();
        self.session = Session::new();
        self.notes.clear();
        self.journal.note(self.actor(), "game.reset", "ok", None);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SaveSnapshot, ShellError> {
        Ok(SaveSnapshot {
            progress: self.progress.clone(),
            world: self.engine.export_snapshot()?,
            notes: self.notes.clone(),
        })
    }

    /// The player's notepad.
    pub fn notes(&self) -> &str {
        &self.notes
    }

    /// Append a line to the notepad. Note text is never journaled.
    pub fn add_note(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.notes.push_str(line);
        self.notes.push('\n');
        self.journal.note(self.actor(), "notes.add", "ok", None);
    }

    pub fn clear_notes(&mut self) {
        self.notes.clear();
        self.journal.note(self.actor(), "notes.clear", "ok", None);
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), ShellError> {
        let result = self.snapshot().and_then(|s| store::save(store, &s));
        let status = if result.is_ok() { "ok" } else { "error" };
        self.journal.note(self.actor(), "game.save", status, None);
        result
    }

    pub fn status(&self) -> GameStatus {
        GameStatus {
            identity: self.progress.identity.clone(),
            connected_host: self.session.connected_host.map(|h| h.to_string()),
            logged_in_as: self.session.logged_in_identity.clone(),
            permission_level: self.session.permission_level,
            pending_challenge: self.session.pending_command.as_ref().map(|p| p.challenge),
            narrative_cursor: self.progress.narrative_cursor.clone(),
            flags: StoryFlag::ALL
                .iter()
                .copied()
                .filter(|f| self.progress.flag(*f))
                .collect(),
            unread_mail: self
                .mailbox()
                .into_iter()
                .filter(|(_, read)| !read)
                .map(|(id, _)| id)
                .collect(),
        }
    }
}
