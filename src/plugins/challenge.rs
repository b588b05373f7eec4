//! Credential challenges for deferred commands.
//!
//! A deferred command runs only after it is authorized again, its credential
//! parameter is extracted, and the supplied credential matches. Any step that
//! cannot be completed denies the command.

use crate::core::config::PendingPolicy;
use crate::core::engine::{Engine, ExecutionResult};
use crate::core::error::ShellError;
use crate::core::progress::{MessageId, ProgressEvent, ProgressSnapshot, StoryFlag};
use crate::core::session::{ChallengeKind, PendingCommand, Session};
use crate::core::sql::{Command, Token, TokenKind};
use crate::core::world;
use crate::plugins::authorize::{self, Decision};
use crate::plugins::narrative::StoryTrigger;

pub const WRONG_PASSWORD: &str = "Access denied: wrong password.";

/// The credential parameter pulled out of a deferred command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    FirewallLevel(i64),
    PcAccess { user: String, pc: String },
    Router { ip: String },
}

#[derive(Debug)]
pub struct Resolution {
    pub outcome: Result<ExecutionResult, ShellError>,
    pub events: Vec<ProgressEvent>,
    pub trigger: Option<StoryTrigger>,
}

impl Resolution {
    fn denied(error: ShellError) -> Self {
        Self {
            outcome: Err(error),
            events: Vec::new(),
            trigger: None,
        }
    }
}

pub fn extract_target(command: &Command, kind: ChallengeKind) -> Result<Target, ShellError> {
    match kind {
        ChallengeKind::Firewall => firewall_level(command)
            .map(Target::FirewallLevel)
            .ok_or_else(|| {
                ShellError::SyntaxRejected(
                    "A firewall password switches off one level: \
                     UPDATE Firewall SET status = 'inactive' WHERE level = <n>."
                        .into(),
                )
            }),
        ChallengeKind::PcAccess => pc_access_values(command)
            .map(|(user, pc)| Target::PcAccess { user, pc })
            .ok_or_else(|| {
                ShellError::SyntaxRejected(
                    "Could not read the user and PC. Use VALUES ('<user>', '<pc ip>').".into(),
                )
            }),
        ChallengeKind::Router => router_ip(command)
            .map(|ip| Target::Router { ip })
            .ok_or_else(|| {
                ShellError::SyntaxRejected(
                    "A router password unlocks one router: \
                     UPDATE Router SET locked = 0 WHERE IP = '<router ip>'."
                        .into(),
                )
            }),
    }
}

/// `UPDATE <table> SET <col> = <value>[, ...] WHERE <col> = <value>` and
/// nothing more. Values are single tokens.
struct PlainUpdate<'a> {
    table: String,
    assignments: Vec<(String, &'a Token)>,
    filter: (String, &'a Token),
}

fn column_equals(tokens: &[Token]) -> Option<(String, &Token)> {
    match tokens {
        [column, eq, value] if eq.is_symbol("=") && value.kind != TokenKind::Symbol => {
            Some((column.ident()?, value))
        }
        _ => None,
    }
}

fn plain_update(command: &Command) -> Option<PlainUpdate<'_>> {
    let end = command.tokens.iter().rposition(|t| !t.is_symbol(";"))? + 1;
    let [update, table, set, rest @ ..] = &command.tokens[..end] else {
        return None;
    };
    if !update.is_keyword("update") || !set.is_keyword("set") {
        return None;
    }
    let where_at = rest.iter().position(|t| t.is_keyword("where"))?;
    let assignments = rest[..where_at]
        .split(|t| t.is_symbol(","))
        .map(column_equals)
        .collect::<Option<Vec<_>>>()?;
    Some(PlainUpdate {
        table: table.ident()?,
        assignments,
        filter: column_equals(&rest[where_at + 1..])?,
    })
}

/// Level of `UPDATE Firewall SET status = 'inactive' WHERE level = <n>`.
fn firewall_level(command: &Command) -> Option<i64> {
    let update = plain_update(command)?;
    let [(column, value)] = update.assignments.as_slice() else {
        return None;
    };
    let (filter, level) = &update.filter;
    let switches_off = update.table == "firewall"
        && column == "status"
        && value.kind == TokenKind::StringLit
        && value.value() == world::FIREWALL_INACTIVE;
    if !switches_off
        || filter != "level"
        || !matches!(level.kind, TokenKind::Number | TokenKind::StringLit)
    {
        return None;
    }
    level.value().trim().parse().ok()
}

/// Address of `UPDATE Router SET locked = 0 WHERE IP = '<ip>'`.
fn router_ip(command: &Command) -> Option<String> {
    let update = plain_update(command)?;
    let [(column, value)] = update.assignments.as_slice() else {
        return None;
    };
    let (filter, ip) = &update.filter;
    let unlocks = update.table == "router"
        && column == "locked"
        && (value.value() == "0" || value.is_keyword("false"));
    (unlocks && filter == "ip" && ip.kind == TokenKind::StringLit).then(|| ip.value())
}

/// Items of the parenthesized list that starts at `tokens[0]`; each item must
/// be a single token.
fn paren_items(tokens: &[Token]) -> Option<Vec<String>> {
    let (first, rest) = tokens.split_first()?;
    if !first.is_symbol("(") {
        return None;
    }
    let mut items = Vec::new();
    let mut expect_item = true;
    for token in rest {
        if token.is_symbol(")") {
            return (!expect_item).then_some(items);
        }
        if expect_item && token.kind != TokenKind::Symbol {
            items.push(token.value());
            expect_item = false;
        } else if !expect_item && token.is_symbol(",") {
            expect_item = true;
        } else {
            return None;
        }
    }
    None
}

fn pc_access_values(command: &Command) -> Option<(String, String)> {
    let tokens = &command.tokens;
    let values_at = tokens.iter().position(|t| t.is_keyword("values"))?;
    let tail = &tokens[values_at + 1..];
    if tail.iter().filter(|t| t.is_symbol("(")).count() != 1 {
        return None;
    }
    let values = paren_items(tail)?;

    let into_at = tokens.iter().position(|t| t.is_keyword("into"))?;
    let head = &tokens[into_at + 1..values_at];
    let (user_at, pc_at) = match head.iter().position(|t| t.is_symbol("(")) {
        Some(open) => {
            let columns = paren_items(&head[open..])?;
            let find = |name: &str| columns.iter().position(|c| c.eq_ignore_ascii_case(name));
            (find("user")?, find("pc")?)
        }
        None => (0, 1),
    };
    if values.len() != 2 {
        return None;
    }
    Some((values.get(user_at)?.clone(), values.get(pc_at)?.clone()))
}

/// Hook run when a command is first deferred.
pub fn on_deferred(pending: &PendingCommand, progress: &ProgressSnapshot) -> Option<StoryTrigger> {
    if pending.challenge != ChallengeKind::Firewall
        || progress.message(MessageId::ItExpert6).revealed
    {
        return None;
    }
    let command = Command::parse(&pending.text);
    match extract_target(&command, ChallengeKind::Firewall) {
        Ok(Target::FirewallLevel(4)) => Some(StoryTrigger::NeedFirewall4Hint),
        _ => None,
    }
}

fn expected_credential(engine: &Engine, target: &Target) -> Result<String, ShellError> {
    match target {
        Target::FirewallLevel(level) => engine
            .lookup_firewall_password(*level)?
            .ok_or_else(|| ShellError::AuthorizationDenied(format!("No firewall level {level}."))),
        Target::PcAccess { user, .. } => engine
            .lookup_user(user)?
            .map(|u| u.plaintext_password())
            .ok_or_else(|| ShellError::AuthorizationDenied(format!("Unknown user '{user}'."))),
        Target::Router { .. } => engine
            .lookup_user(world::ROUTER_ACCOUNT)?
            .map(|u| u.plaintext_password())
            .ok_or_else(|| ShellError::AuthorizationDenied("Router account missing.".into())),
    }
}

/// Check `credential` for `pending`, run it on a match, and report effects.
///
/// `session` must no longer hold `pending`.
pub fn resolve_challenge(
    pending: &PendingCommand,
    credential: &str,
    engine: &Engine,
    session: &Session,
    progress: &ProgressSnapshot,
) -> Resolution {
    let command = Command::parse(&pending.text);
    match authorize::authorize(&command, session, progress, PendingPolicy::Reject) {
        Decision::Defer(again) if again.challenge == pending.challenge => {}
        Decision::Block(denial) => return Resolution::denied(denial.into_error()),
        _ => {
            return Resolution::denied(ShellError::AuthorizationDenied(
                "Access denied: the pending command is no longer valid.".into(),
            ));
        }
    }

    let target = match extract_target(&command, pending.challenge) {
        Ok(target) => target,
        Err(e) => return Resolution::denied(e),
    };
    let expected = match expected_credential(engine, &target) {
        Ok(expected) => expected,
        Err(e) => return Resolution::denied(e),
    };

    if credential.trim() != expected {
        let trigger = (pending.challenge == ChallengeKind::Firewall
            && !progress.message(MessageId::ItExpert2).revealed)
            .then_some(StoryTrigger::FirewallPasswordFailed);
        return Resolution {
            outcome: Err(ShellError::AuthorizationDenied(WRONG_PASSWORD.into())),
            events: Vec::new(),
            trigger,
        };
    }

    let result = match engine.execute(&command.text) {
        Ok(result) => result,
        Err(e) => return Resolution::denied(e),
    };
    let (events, trigger) = if result.changes > 0 {
        success_effects(&target, progress)
    } else {
        (Vec::new(), None)
    };
    Resolution {
        outcome: Ok(result),
        events,
        trigger,
    }
}

fn success_effects(
    target: &Target,
    progress: &ProgressSnapshot,
) -> (Vec<ProgressEvent>, Option<StoryTrigger>) {
    let mut events = Vec::new();
    let mut trigger = None;
    let mut set = |flag: StoryFlag| {
        if progress.flag(flag) {
            return false;
        }
        events.push(ProgressEvent::SetFlag { flag });
        true
    };

    match target {
        Target::FirewallLevel(level) => {
            let flag = u8::try_from(*level).ok().and_then(StoryFlag::firewall);
            if let Some(flag) = flag
                && set(flag)
            {
                trigger = match *level {
                    1 => Some(StoryTrigger::Firewall1Beaten),
                    2 if progress.flag(StoryFlag::UnlockedAnyRouter) => {
                        Some(StoryTrigger::Firewall2Beaten)
                    }
                    3 if progress.flag(StoryFlag::IdentifiedInfectedPc) => {
                        Some(StoryTrigger::Firewall3Beaten)
                    }
                    _ => None,
                };
            }
        }
        Target::PcAccess { user, pc } => {
            if pc == world::PC_1 {
                set(StoryFlag::UnlockedPc1);
            }
            if user == world::STUDENT_ACCOUNT && set(StoryFlag::FoundStudentPassword) {
                trigger = Some(StoryTrigger::StudentPasswordFound);
            }
        }
        Target::Router { .. } => {
            if set(StoryFlag::UnlockedAnyRouter) {
                trigger = if progress.flag(StoryFlag::Firewall2Beaten) {
                    Some(StoryTrigger::Firewall2Beaten)
                } else {
                    Some(StoryTrigger::RouterUnlocked)
                };
            }
        }
    }
    (events, trigger)
}
