//! Player progress: the one persisted piece of game state.
//!
//! Every mutation goes through [`ProgressSnapshot::apply`], which reports
//! whether the event changed anything. Flags, reveals, acknowledgements,
//! beats and secrets only ever move forward; the only way back is
//! [`ProgressSnapshot::reset`].

use crate::core::error::ShellError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Key of the first node of the story.
pub const START_EVENT: &str = "start";

macro_rules! keyed_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $key)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ShellError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| ShellError::NotFound(format!("{} '{}'", stringify!($name), s)))
            }
        }
    };
}

keyed_enum! {
    /// Story milestones. Set by discoveries and challenges, cleared only by reset.
    StoryFlag {
        Firewall1Beaten => "firewall_1_beaten",
        Firewall2Beaten => "firewall_2_beaten",
        Firewall3Beaten => "firewall_3_beaten",
        Firewall4Beaten => "firewall_4_beaten",
        ConnectedToMainIp => "connected_to_main_ip",
        FoundStudentPassword => "found_student_password",
        UnlockedPc1 => "unlocked_pc_1",
        FoundNotesList => "found_notes_list",
        ReadAnyHint => "read_any_hint",
        FoundHashingKey => "found_hashing_key",
        UnhashedLevel1Passwords => "unhashed_level_1_passwords",
        FoundRouterPassword => "found_router_password",
        UnlockedAnyRouter => "unlocked_any_router",
        AccessedLogs => "accessed_logs",
        IdentifiedInfectedPc => "identified_infected_pc",
        DeletedBotnetScript => "deleted_botnet_script",
    }
}

keyed_enum! {
    /// In-game mail.
    MessageId {
        Rector1 => "rector_1",
        ItExpert1 => "it_expert_1",
        ItExpert2 => "it_expert_2",
        ItExpert3 => "it_expert_3",
        ItExpert4 => "it_expert_4",
        ItExpert5 => "it_expert_5",
        ItExpert6 => "it_expert_6",
        ItExpert7 => "it_expert_7",
    }
}

keyed_enum! {
    /// Cutscenes.
    BeatId {
        Intro => "intro",
        NarrativeBridge => "narrative_bridge",
        FirewallWarning => "firewall_warning",
        StudentFound => "student_found",
        RouterUnlock => "router_unlock",
        InfectedFound => "infected_found",
        Victory => "victory",
    }
}

keyed_enum! {
    /// Puzzle answers learned from query results.
    SecretKey {
        F1 => "f1",
        F2 => "f2",
        F3 => "f3",
        F4 => "f4",
        HashingKey => "hashing_key",
        RouterPassword => "router_password",
    }
}

impl StoryFlag {
    /// `firewall_N_beaten` for levels 1 through 4.
    pub fn firewall(level: u8) -> Option<StoryFlag> {
        match level {
            1 => Some(StoryFlag::Firewall1Beaten),
            2 => Some(StoryFlag::Firewall2Beaten),
            3 => Some(StoryFlag::Firewall3Beaten),
            4 => Some(StoryFlag::Firewall4Beaten),
            _ => None,
        }
    }
}

impl SecretKey {
    /// `fN` for firewall levels 1 through 4.
    pub fn firewall(level: u8) -> Option<SecretKey> {
        match level {
            1 => Some(SecretKey::F1),
            2 => Some(SecretKey::F2),
            3 => Some(SecretKey::F3),
            4 => Some(SecretKey::F4),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageState {
    pub revealed: bool,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatState {
    pub viewed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub story_flags: BTreeMap<StoryFlag, bool>,
    #[serde(default)]
    pub messages: BTreeMap<MessageId, MessageState>,
    #[serde(default)]
    pub narrative_beats: BTreeMap<BeatId, BeatState>,
    #[serde(default)]
    pub discovered_secrets: BTreeMap<SecretKey, Option<String>>,
    #[serde(default = "default_cursor")]
    pub narrative_cursor: String,
}

fn default_cursor() -> String {
    START_EVENT.to_string()
}

/// A single forward step of progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    SetIdentity { name: String },
    SetFlag { flag: StoryFlag },
    RevealMessage { id: MessageId },
    /// Marks the message read; reading implies it was revealed.
    AcknowledgeMessage { id: MessageId },
    ViewBeat { id: BeatId },
    DiscoverSecret { key: SecretKey, value: String },
    MoveCursor { key: String },
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        let mut snapshot = Self {
            identity: None,
            story_flags: BTreeMap::new(),
            messages: BTreeMap::new(),
            narrative_beats: BTreeMap::new(),
            discovered_secrets: BTreeMap::new(),
            narrative_cursor: default_cursor(),
        };
        snapshot.normalize();
        snapshot
    }
}

impl ProgressSnapshot {
    /// Fill every known key that is missing, e.g. after loading an older save.
    pub fn normalize(&mut self) {
        for flag in StoryFlag::ALL {
            self.story_flags.entry(*flag).or_insert(false);
        }
        for id in MessageId::ALL {
            self.messages.entry(*id).or_default();
        }
        for id in BeatId::ALL {
            self.narrative_beats.entry(*id).or_default();
        }
        for key in SecretKey::ALL {
            self.discovered_secrets.entry(*key).or_insert(None);
        }
        if self.narrative_cursor.is_empty() {
            self.narrative_cursor = default_cursor();
        }
    }

    /// Fresh progress that keeps only the player's identity.
    pub fn reset(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            identity: self.identity.clone(),
            ..ProgressSnapshot::default()
        }
    }

    pub fn flag(&self, flag: StoryFlag) -> bool {
        self.story_flags.get(&flag).copied().unwrap_or(false)
    }

    pub fn message(&self, id: MessageId) -> MessageState {
        self.messages.get(&id).copied().unwrap_or_default()
    }

    pub fn beat_viewed(&self, id: BeatId) -> bool {
        self.narrative_beats.get(&id).is_some_and(|b| b.viewed)
    }

    pub fn secret(&self, key: SecretKey) -> Option<&str> {
        self.discovered_secrets
            .get(&key)
            .and_then(|v| v.as_deref())
    }

    /// Apply one event. Returns `true` when the snapshot changed.
    pub fn apply(&mut self, event: &ProgressEvent) -> bool {
        match event {
            ProgressEvent::SetIdentity { name } => {
                if self.identity.is_some() || name.trim().is_empty() {
                    return false;
                }
                self.identity = Some(name.trim().to_string());
                true
            }
            ProgressEvent::SetFlag { flag } => {
                let slot = self.story_flags.entry(*flag).or_insert(false);
                !std::mem::replace(slot, true)
            }
            ProgressEvent::RevealMessage { id } => {
                let state = self.messages.entry(*id).or_default();
                !std::mem::replace(&mut state.revealed, true)
            }
            ProgressEvent::AcknowledgeMessage { id } => {
                let state = self.messages.entry(*id).or_default();
                let revealed = !std::mem::replace(&mut state.revealed, true);
                let acknowledged = !std::mem::replace(&mut state.acknowledged, true);
                revealed || acknowledged
            }
            ProgressEvent::ViewBeat { id } => {
                let state = self.narrative_beats.entry(*id).or_default();
                !std::mem::replace(&mut state.viewed, true)
            }
            ProgressEvent::DiscoverSecret { key, value } => {
                let slot = self.discovered_secrets.entry(*key).or_insert(None);
                if slot.is_some() {
                    return false;
                }
                *slot = Some(value.clone());
                true
            }
            ProgressEvent::MoveCursor { key } => {
                if self.narrative_cursor == *key {
                    return false;
                }
                self.narrative_cursor = key.clone();
                true
            }
        }
    }

    /// Apply a batch in order. Returns how many events changed the snapshot.
    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a ProgressEvent>) -> usize {
        events.into_iter().filter(|e| self.apply(e)).count()
    }
}
