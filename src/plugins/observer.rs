//! Result observer: turns what a command returned into discoveries.
//!
//! Each detector looks at the command and its result, and proposes at most one
//! progress event plus at most one story trigger. Detectors skip themselves
//! once their target is already set, so repeating a command never re-fires.

use crate::core::engine::ExecutionResult;
use crate::core::progress::{ProgressEvent, ProgressSnapshot, SecretKey, StoryFlag};
use crate::core::sql::Command;
use crate::core::world;
use crate::plugins::narrative::StoryTrigger;
use regex::Regex;
use std::sync::LazyLock;

static FIREWALL_PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)firewall level (\d) password:\s*(\S+)").unwrap());
static HASHING_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)hashing key:\s*(\S+)").unwrap());
static ROUTER_PASSWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)router password:\s*(\S+)").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub command: &'a Command,
    pub result: &'a ExecutionResult,
}

impl Observation<'_> {
    fn is_read(&self) -> bool {
        self.command.statement_verb().as_deref() == Some("select")
    }

    fn reads(&self, table: &str) -> bool {
        self.is_read() && self.command.references(table)
    }

    fn find_text(&self, needle: &str) -> bool {
        self.result.texts().any(|t| t.contains(needle))
    }

    fn capture(&self, re: &Regex) -> Option<String> {
        self.result
            .texts()
            .find_map(|t| re.captures(t).map(|c| c[1].to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    FirewallPassword(u8),
    HashingKeySecret,
    HashingKeyFlag,
    RouterPasswordSecret,
    RouterPasswordFlag,
    StudentCredentials,
    NotesList,
    HintRead,
    LogsAccessed,
    InfectedPc,
    BotnetDeleted,
    DecipheredPasswords,
    LabTechPassword,
}

pub static DETECTORS: &[Detector] = &[
    Detector::FirewallPassword(1),
    Detector::FirewallPassword(2),
    Detector::FirewallPassword(3),
    Detector::FirewallPassword(4),
    Detector::HashingKeySecret,
    Detector::HashingKeyFlag,
    Detector::RouterPasswordSecret,
    Detector::RouterPasswordFlag,
    Detector::StudentCredentials,
    Detector::NotesList,
    Detector::HintRead,
    Detector::LogsAccessed,
    Detector::InfectedPc,
    Detector::BotnetDeleted,
    Detector::DecipheredPasswords,
    Detector::LabTechPassword,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub detector: Detector,
    pub event: ProgressEvent,
    pub trigger: Option<StoryTrigger>,
}

fn router_plaintext() -> Option<&'static str> {
    world::ciphered_account(world::ROUTER_ACCOUNT).map(|a| a.plaintext)
}

fn lab_tech_plaintext() -> Option<&'static str> {
    world::ciphered_account(world::LAB_TECH_ACCOUNT).map(|a| a.plaintext)
}

impl Detector {
    pub fn name(&self) -> String {
        match self {
            Detector::FirewallPassword(level) => format!("firewall_password_{level}"),
            Detector::HashingKeySecret => "hashing_key_secret".into(),
            Detector::HashingKeyFlag => "hashing_key_flag".into(),
            Detector::RouterPasswordSecret => "router_password_secret".into(),
            Detector::RouterPasswordFlag => "router_password_flag".into(),
            Detector::StudentCredentials => "student_credentials".into(),
            Detector::NotesList => "notes_list".into(),
            Detector::HintRead => "hint_read".into(),
            Detector::LogsAccessed => "logs_accessed".into(),
            Detector::InfectedPc => "infected_pc".into(),
            Detector::BotnetDeleted => "botnet_deleted".into(),
            Detector::DecipheredPasswords => "deciphered_passwords".into(),
            Detector::LabTechPassword => "lab_tech_password".into(),
        }
    }

    pub fn detect(&self, obs: &Observation<'_>, progress: &ProgressSnapshot) -> Option<Discovery> {
        let (event, trigger) = match self {
            Detector::FirewallPassword(level) => {
                let key = SecretKey::firewall(*level)?;
                if progress.secret(key).is_some() {
                    return None;
                }
                let value = obs.result.texts().find_map(|t| {
                    FIREWALL_PASSWORD_RE
                        .captures_iter(t)
                        .find(|c| c[1].parse::<u8>().ok() == Some(*level))
                        .map(|c| c[2].to_string())
                })?;
                (ProgressEvent::DiscoverSecret { key, value }, None)
            }
            Detector::HashingKeySecret => {
                if progress.secret(SecretKey::HashingKey).is_some() {
                    return None;
                }
                let value = obs.capture(&HASHING_KEY_RE)?;
                (
                    ProgressEvent::DiscoverSecret {
                        key: SecretKey::HashingKey,
                        value,
                    },
                    None,
                )
            }
            Detector::HashingKeyFlag => {
                if progress.flag(StoryFlag::FoundHashingKey) {
                    return None;
                }
                obs.capture(&HASHING_KEY_RE)?;
                (set(StoryFlag::FoundHashingKey), None)
            }
            Detector::RouterPasswordSecret => {
                if progress.secret(SecretKey::RouterPassword).is_some() {
                    return None;
                }
                let value = router_password_in(obs)?;
                (
                    ProgressEvent::DiscoverSecret {
                        key: SecretKey::RouterPassword,
                        value,
                    },
                    None,
                )
            }
            Detector::RouterPasswordFlag => {
                if progress.flag(StoryFlag::FoundRouterPassword) {
                    return None;
                }
                router_password_in(obs)?;
                (set(StoryFlag::FoundRouterPassword), None)
            }
            Detector::StudentCredentials => {
                if progress.flag(StoryFlag::FoundStudentPassword)
                    || !obs.reads("user")
                    || !obs.result.texts().any(|t| t == world::STUDENT_ACCOUNT)
                {
                    return None;
                }
                (
                    set(StoryFlag::FoundStudentPassword),
                    Some(StoryTrigger::StudentPasswordFound),
                )
            }
            Detector::NotesList => {
                if progress.flag(StoryFlag::FoundNotesList)
                    || !obs.reads("hints")
                    || obs.result.column_index("title").is_none()
                {
                    return None;
                }
                (set(StoryFlag::FoundNotesList), None)
            }
            Detector::HintRead => {
                if progress.flag(StoryFlag::ReadAnyHint)
                    || !obs.reads("hints")
                    || obs.result.column_index("text").is_none()
                    || !obs.result.has_rows()
                {
                    return None;
                }
                (set(StoryFlag::ReadAnyHint), None)
            }
            Detector::LogsAccessed => {
                if progress.flag(StoryFlag::AccessedLogs)
                    || !obs.reads("log")
                    || !obs.result.has_rows()
                {
                    return None;
                }
                (set(StoryFlag::AccessedLogs), None)
            }
            Detector::InfectedPc => {
                if progress.flag(StoryFlag::IdentifiedInfectedPc)
                    || !obs.reads("log")
                    || !obs.command.text.contains(world::INFECTED_PC)
                    || !obs.find_text(world::INFECTED_PC)
                {
                    return None;
                }
                // Mail 7 needs level 3 down as well; whichever comes last
                // sends it.
                let trigger = if progress.flag(StoryFlag::Firewall3Beaten) {
                    StoryTrigger::Firewall3Beaten
                } else {
                    StoryTrigger::InfectedPcIdentified
                };
                (set(StoryFlag::IdentifiedInfectedPc), Some(trigger))
            }
            Detector::BotnetDeleted => {
                if progress.flag(StoryFlag::DeletedBotnetScript) || obs.result.changes == 0 {
                    return None;
                }
                if obs.command.statement_verb().as_deref() != Some("delete") {
                    return None;
                }
                let botnet_id = match obs.command.target_table().as_deref() {
                    Some("content") => world::BOTNET_CONTENT_ID,
                    Some("directories") => world::BOTNET_DIRECTORY_ID,
                    _ => return None,
                };
                if !obs.command.integers().any(|n| n == botnet_id) {
                    return None;
                }
                (
                    set(StoryFlag::DeletedBotnetScript),
                    Some(StoryTrigger::BotnetDeleted),
                )
            }
            Detector::DecipheredPasswords => {
                if progress.flag(StoryFlag::UnhashedLevel1Passwords) {
                    return None;
                }
                let found = world::CIPHERED_ACCOUNTS
                    .iter()
                    .filter(|a| a.permission == 1)
                    .any(|a| obs.find_text(a.plaintext));
                if !found {
                    return None;
                }
                (set(StoryFlag::UnhashedLevel1Passwords), None)
            }
            Detector::LabTechPassword => {
                if progress.secret(SecretKey::F2).is_some() {
                    return None;
                }
                let plaintext = lab_tech_plaintext()?;
                if !obs.find_text(plaintext) {
                    return None;
                }
                (
                    ProgressEvent::DiscoverSecret {
                        key: SecretKey::F2,
                        value: plaintext.to_string(),
                    },
                    None,
                )
            }
        };
        Some(Discovery {
            detector: *self,
            event,
            trigger,
        })
    }
}

fn set(flag: StoryFlag) -> ProgressEvent {
    ProgressEvent::SetFlag { flag }
}

fn router_password_in(obs: &Observation<'_>) -> Option<String> {
    if let Some(value) = obs.capture(&ROUTER_PASSWORD_RE) {
        return Some(value);
    }
    let plaintext = router_plaintext()?;
    obs.find_text(plaintext).then(|| plaintext.to_string())
}

/// Run every detector against the same result and progress.
pub fn observe(obs: &Observation<'_>, progress: &ProgressSnapshot) -> Vec<Discovery> {
    DETECTORS
        .iter()
        .filter_map(|d| d.detect(obs, progress))
        .collect()
}
