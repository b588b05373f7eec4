//! Command authorization: the gate between player input and the engine.
//!
//! [`authorize`] is pure. It looks at a normalized command, the session and
//! the progress snapshot and decides to allow (possibly rewritten), block, or
//! defer the command behind a credential challenge. Nothing reaches the
//! engine without passing through here, challenge resubmissions included.

use crate::core::config::PendingPolicy;
use crate::core::engine::SchemaSnapshot;
use crate::core::error::ShellError;
use crate::core::progress::{MessageId, ProgressSnapshot, StoryFlag};
use crate::core::session::{self, ChallengeKind, HostAddress, PendingCommand, Session};
use crate::core::sql::{Command, Select, unquote};
use crate::core::world;

pub const NOT_CONNECTED: &str = "Not connected. Use CONNECT <ip address> first.";
pub const PENDING_FIRST: &str = "Finish or cancel the pending challenge first.";

/// What an allowed command does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorized {
    Connect(HostAddress),
    Disconnect,
    Login { name: String, password: String },
    /// SQL to run, after any rewriting.
    Sql(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    Syntax,
    Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub kind: DenialKind,
    pub reason: String,
}

impl Denial {
    pub fn syntax(reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::Syntax,
            reason: reason.into(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            kind: DenialKind::Authorization,
            reason: reason.into(),
        }
    }

    pub fn into_error(self) -> ShellError {
        match self.kind {
            DenialKind::Syntax => ShellError::SyntaxRejected(self.reason),
            DenialKind::Authorization => ShellError::AuthorizationDenied(self.reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Authorized),
    Block(Denial),
    Defer(PendingCommand),
}

impl Decision {
    pub fn is_block(&self) -> bool {
        matches!(self, Decision::Block(_))
    }
}

/// Verbs that write. Anything else is treated as a read.
const WRITE_VERBS: &[&str] = &["insert", "update", "delete", "replace", "create"];

/// Verbs the terminal never runs: they reach outside the game database or
/// rewrite its schema.
const RESTRICTED_VERBS: &[&str] = &["attach", "detach", "vacuum", "pragma", "drop", "alter"];

struct Access<'a> {
    session: &'a Session,
    progress: &'a ProgressSnapshot,
    target: Option<&'a str>,
}

impl Access<'_> {
    fn writes(&self, table: &str) -> bool {
        self.target == Some(table)
    }
}

/// A per-table gate. `check` returns the block message when access is refused.
struct TableGate {
    table: &'static str,
    check: fn(&Access<'_>) -> Option<&'static str>,
    /// Hidden from suggestions while reads are refused.
    hidden: bool,
}

static TABLE_GATES: &[TableGate] = &[
    TableGate {
        table: "passwords",
        check: passwords_gate,
        hidden: true,
    },
    TableGate {
        table: "hints",
        check: hints_gate,
        hidden: true,
    },
    TableGate {
        table: "firewall",
        check: firewall_gate,
        hidden: false,
    },
    TableGate {
        table: "log",
        check: log_gate,
        hidden: false,
    },
    TableGate {
        table: "directories",
        check: pc_files_gate,
        hidden: false,
    },
    TableGate {
        table: "content",
        check: pc_files_gate,
        hidden: false,
    },
    TableGate {
        table: "user",
        check: user_gate,
        hidden: false,
    },
];

fn passwords_gate(_: &Access<'_>) -> Option<&'static str> {
    Some("Access denied: Passwords is restricted.")
}

fn hints_gate(access: &Access<'_>) -> Option<&'static str> {
    if !access.progress.message(MessageId::ItExpert3).acknowledged {
        return Some("no such table: Hints");
    }
    if access.writes("hints") {
        return Some("Access denied: Hints is read-only.");
    }
    None
}

fn firewall_gate(access: &Access<'_>) -> Option<&'static str> {
    if access.session.is_connected_to(world::MAIN_HOST) {
        None
    } else {
        Some("The firewall is not reachable from this host.")
    }
}

fn log_gate(access: &Access<'_>) -> Option<&'static str> {
    if access.progress.flag(StoryFlag::UnlockedAnyRouter) {
        None
    } else {
        Some("Access denied: logs are only readable through an unlocked router.")
    }
}

fn pc_files_gate(access: &Access<'_>) -> Option<&'static str> {
    if !access.progress.flag(StoryFlag::UnlockedPc1) {
        return Some("Access denied: no PC access. Get access to a lab PC first.");
    }
    let writing = access.writes("directories") || access.writes("content");
    if writing && !access.progress.flag(StoryFlag::Firewall4Beaten) {
        return Some("Access denied: the firewall still protects PC files.");
    }
    None
}

fn user_gate(access: &Access<'_>) -> Option<&'static str> {
    if access.writes("user") {
        Some("Access denied: User accounts are read-only.")
    } else {
        None
    }
}

const HINT_UNLOCKS: &[StoryFlag] = &[
    StoryFlag::FoundStudentPassword,
    StoryFlag::UnlockedPc1,
    StoryFlag::Firewall1Beaten,
    StoryFlag::FoundHashingKey,
    StoryFlag::UnlockedAnyRouter,
    StoryFlag::Firewall2Beaten,
    StoryFlag::AccessedLogs,
    StoryFlag::Firewall3Beaten,
];

/// Highest `Hints.id` the player may read.
pub fn hint_threshold(progress: &ProgressSnapshot) -> usize {
    2 + HINT_UNLOCKS.iter().filter(|f| progress.flag(**f)).count()
}

/// Decide what happens to `command`.
pub fn authorize(
    command: &Command,
    session: &Session,
    progress: &ProgressSnapshot,
    policy: PendingPolicy,
) -> Decision {
    let Some(verb) = command.verb() else {
        return Decision::Block(Denial::syntax("Empty command."));
    };

    if session.has_pending() && policy == PendingPolicy::Reject {
        return Decision::Block(Denial::denied(PENDING_FIRST));
    }

    if verb == "connect" {
        return authorize_connect(command, session);
    }
    if !session.is_connected() {
        return Decision::Block(Denial::denied(NOT_CONNECTED));
    }

    match verb.as_str() {
        "disconnect" if command.args().iter().all(|t| t.is_symbol(";")) => {
            return Decision::Allow(Authorized::Disconnect);
        }
        "disconnect" => return Decision::Block(Denial::syntax("Usage: DISCONNECT")),
        "login" => return authorize_login(command),
        _ => {}
    }

    if command.statement_count() > 1 {
        return Decision::Block(Denial::syntax("One statement at a time."));
    }
    if RESTRICTED_VERBS.contains(&verb.as_str()) {
        return Decision::Block(Denial::denied(format!(
            "Access denied: {} is disabled on this terminal.",
            verb.to_ascii_uppercase()
        )));
    }
    if verb == "create" && command.args().iter().take(3).any(|t| t.is_keyword("trigger")) {
        return Decision::Block(Denial::denied(
            "Access denied: triggers are disabled on this terminal.",
        ));
    }

    let statement_verb = command.statement_verb().unwrap_or_else(|| verb.clone());
    let writing = WRITE_VERBS.contains(&statement_verb.as_str());
    let target = if writing { command.target_table() } else { None };
    let access = Access {
        session,
        progress,
        target: target.as_deref(),
    };

    for gate in TABLE_GATES {
        if command.references(gate.table)
            && let Some(message) = (gate.check)(&access)
        {
            return Decision::Block(Denial::denied(message));
        }
    }

    if let Some(decision) = classify_challenge(command, &statement_verb, target.as_deref()) {
        return decision;
    }

    if command.references("hints") {
        return restrict_hints(command, progress);
    }

    Decision::Allow(Authorized::Sql(command.text.clone()))
}

fn authorize_connect(command: &Command, session: &Session) -> Decision {
    let address = command
        .tokens
        .first()
        .map(|t| command.text[t.end..].trim().trim_end_matches(';').trim())
        .unwrap_or_default();
    if address.is_empty() {
        return Decision::Block(Denial::syntax("Usage: CONNECT <ip address>"));
    }
    let host = match address.parse::<HostAddress>() {
        Ok(host) => host,
        Err(e) => return Decision::Block(Denial::syntax(e.to_string())),
    };

    let required = session::required_permission(host);
    if required > session.permission_level {
        let label = world::PRIVILEGED_HOSTS
            .iter()
            .find(|p| p.host == host)
            .map(|p| format!(" ({})", p.label))
            .unwrap_or_default();
        return Decision::Block(Denial::denied(format!(
            "Access denied: {host}{label} requires permission level {required}, current level is {}.",
            session.permission_level
        )));
    }
    Decision::Allow(Authorized::Connect(host))
}

/// Space-separated arguments after the verb. A quoted argument may hold
/// spaces and loses its quotes.
fn arguments(command: &Command) -> Vec<String> {
    let args = command.args();
    let end = args
        .iter()
        .rposition(|t| !t.is_symbol(";"))
        .map_or(0, |at| at + 1);
    let mut spans: Vec<(usize, usize)> = Vec::new();
    for token in &args[..end] {
        match spans.last_mut() {
            Some((_, last_end)) if *last_end == token.start => *last_end = token.end,
            _ => spans.push((token.start, token.end)),
        }
    }
    spans
        .into_iter()
        .map(|(start, end)| unquote(&command.text[start..end]))
        .collect()
}

fn authorize_login(command: &Command) -> Decision {
    match <[String; 2]>::try_from(arguments(command)) {
        Ok([name, password]) => Decision::Allow(Authorized::Login { name, password }),
        Err(_) => Decision::Block(Denial::syntax("Usage: LOGIN <name> <password>")),
    }
}

/// Writes that need a credential are deferred; other writes to the same
/// tables are refused.
fn classify_challenge(command: &Command, verb: &str, target: Option<&str>) -> Option<Decision> {
    let defer = |challenge| {
        Decision::Defer(PendingCommand {
            text: command.text.clone(),
            challenge,
        })
    };
    match (target?, verb) {
        ("firewall", "update") => Some(defer(ChallengeKind::Firewall)),
        ("firewall", _) => Some(Decision::Block(Denial::denied(
            "Access denied: firewall levels can only be switched off.",
        ))),
        ("router", "update") => Some(defer(ChallengeKind::Router)),
        ("router", _) => Some(Decision::Block(Denial::denied(
            "Access denied: routers cannot be added or removed.",
        ))),
        ("user_has_access_to_pc", "insert" | "replace") => Some(defer(ChallengeKind::PcAccess)),
        ("user_has_access_to_pc", _) => Some(Decision::Block(Denial::denied(
            "Access denied: PC access can only be granted.",
        ))),
        _ => None,
    }
}

/// Narrow a read of `Hints` to the rows unlocked so far. Anything that is not
/// a single-source SELECT over `Hints` is refused.
fn restrict_hints(command: &Command, progress: &ProgressSnapshot) -> Decision {
    let refused = || {
        Decision::Block(Denial::denied(
            "Access denied: notes can only be read with a simple SELECT ... FROM Hints.",
        ))
    };
    let Some(select) = Select::parse(command) else {
        return refused();
    };
    let Some(source) = select.source_table().filter(|s| s.name == "hints") else {
        return refused();
    };
    let guard = format!("{}.id <= {}", source.qualifier, hint_threshold(progress));
    Decision::Allow(Authorized::Sql(select.and_where(&guard).render()))
}

/// The schema with tables the player cannot see removed.
pub fn visible_schema(
    schema: &SchemaSnapshot,
    session: &Session,
    progress: &ProgressSnapshot,
) -> SchemaSnapshot {
    let access = Access {
        session,
        progress,
        target: None,
    };
    let tables = schema
        .tables
        .iter()
        .filter(|table| {
            !TABLE_GATES.iter().any(|gate| {
                gate.hidden
                    && gate.table.eq_ignore_ascii_case(&table.name)
                    && (gate.check)(&access).is_some()
            })
        })
        .cloned()
        .collect();
    SchemaSnapshot { tables }
}
