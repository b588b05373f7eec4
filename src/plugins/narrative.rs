//! Narrative state machine.
//!
//! The story is a set of singly linked chains of cutscene, message and
//! wait-for-read nodes compiled into the binary. The only mutable state is
//! the cursor stored in the progress snapshot; every function here is pure
//! and returns the [`ProgressEvent`]s the caller must apply.
//!
//! Cutscenes wait for the player to acknowledge them. Messages do not: the
//! poll that reveals a message also moves the cursor past it.

use crate::core::error::ShellError;
use crate::core::progress::{BeatId, MessageId, ProgressEvent, ProgressSnapshot, START_EVENT};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Cutscene(BeatId),
    Message(MessageId),
    WaitForAck(MessageId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryEvent {
    pub key: &'static str,
    pub kind: EventKind,
    /// `None` marks the end of a chain.
    pub next: Option<&'static str>,
}

// --- Story flow (compiled into binary) ---

pub static STORY_FLOW: &[StoryEvent] = &[
    // Intro
    StoryEvent {
        key: START_EVENT,
        kind: EventKind::Cutscene(BeatId::Intro),
        next: Some("email_rector_1"),
    },
    StoryEvent {
        key: "email_rector_1",
        kind: EventKind::Message(MessageId::Rector1),
        next: Some("wait_email_rector_1"),
    },
    StoryEvent {
        key: "wait_email_rector_1",
        kind: EventKind::WaitForAck(MessageId::Rector1),
        next: Some("cutscene_narrative_bridge"),
    },
    StoryEvent {
        key: "cutscene_narrative_bridge",
        kind: EventKind::Cutscene(BeatId::NarrativeBridge),
        next: Some("email_it_expert_1"),
    },
    StoryEvent {
        key: "email_it_expert_1",
        kind: EventKind::Message(MessageId::ItExpert1),
        next: Some("wait_email_it_expert_1"),
    },
    StoryEvent {
        key: "wait_email_it_expert_1",
        kind: EventKind::WaitForAck(MessageId::ItExpert1),
        next: Some("cutscene_firewall_warning"),
    },
    StoryEvent {
        key: "cutscene_firewall_warning",
        kind: EventKind::Cutscene(BeatId::FirewallWarning),
        next: None,
    },
    // Getting started
    StoryEvent {
        key: "email_it_expert_2",
        kind: EventKind::Message(MessageId::ItExpert2),
        next: Some("wait_email_it_expert_2"),
    },
    StoryEvent {
        key: "wait_email_it_expert_2",
        kind: EventKind::WaitForAck(MessageId::ItExpert2),
        next: None,
    },
    StoryEvent {
        key: "cutscene_student_found",
        kind: EventKind::Cutscene(BeatId::StudentFound),
        next: Some("email_it_expert_3"),
    },
    StoryEvent {
        key: "email_it_expert_3",
        kind: EventKind::Message(MessageId::ItExpert3),
        next: Some("wait_email_it_expert_3"),
    },
    StoryEvent {
        key: "wait_email_it_expert_3",
        kind: EventKind::WaitForAck(MessageId::ItExpert3),
        next: None,
    },
    // Breaking the network
    StoryEvent {
        key: "email_it_expert_4",
        kind: EventKind::Message(MessageId::ItExpert4),
        next: Some("wait_email_it_expert_4"),
    },
    StoryEvent {
        key: "wait_email_it_expert_4",
        kind: EventKind::WaitForAck(MessageId::ItExpert4),
        next: None,
    },
    StoryEvent {
        key: "cutscene_router_unlock",
        kind: EventKind::Cutscene(BeatId::RouterUnlock),
        next: None,
    },
    // Investigation
    StoryEvent {
        key: "email_it_expert_5",
        kind: EventKind::Message(MessageId::ItExpert5),
        next: Some("wait_email_it_expert_5"),
    },
    StoryEvent {
        key: "wait_email_it_expert_5",
        kind: EventKind::WaitForAck(MessageId::ItExpert5),
        next: None,
    },
    StoryEvent {
        key: "cutscene_infected_found",
        kind: EventKind::Cutscene(BeatId::InfectedFound),
        next: None,
    },
    StoryEvent {
        key: "email_it_expert_7",
        kind: EventKind::Message(MessageId::ItExpert7),
        next: Some("wait_email_it_expert_7"),
    },
    StoryEvent {
        key: "wait_email_it_expert_7",
        kind: EventKind::WaitForAck(MessageId::ItExpert7),
        next: None,
    },
    StoryEvent {
        key: "email_it_expert_6",
        kind: EventKind::Message(MessageId::ItExpert6),
        next: Some("wait_email_it_expert_6"),
    },
    StoryEvent {
        key: "wait_email_it_expert_6",
        kind: EventKind::WaitForAck(MessageId::ItExpert6),
        next: None,
    },
    // Finale
    StoryEvent {
        key: "cutscene_victory",
        kind: EventKind::Cutscene(BeatId::Victory),
        next: None,
    },
];

/// Gameplay moments that jump the story out of its linear chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryTrigger {
    FirewallPasswordFailed,
    StudentPasswordFound,
    Firewall1Beaten,
    RouterUnlocked,
    Firewall2Beaten,
    InfectedPcIdentified,
    Firewall3Beaten,
    NeedFirewall4Hint,
    BotnetDeleted,
}

impl StoryTrigger {
    pub const ALL: &'static [StoryTrigger] = &[
        StoryTrigger::FirewallPasswordFailed,
        StoryTrigger::StudentPasswordFound,
        StoryTrigger::Firewall1Beaten,
        StoryTrigger::RouterUnlocked,
        StoryTrigger::Firewall2Beaten,
        StoryTrigger::InfectedPcIdentified,
        StoryTrigger::Firewall3Beaten,
        StoryTrigger::NeedFirewall4Hint,
        StoryTrigger::BotnetDeleted,
    ];

    pub fn event_key(&self) -> &'static str {
        match self {
            StoryTrigger::FirewallPasswordFailed => "email_it_expert_2",
            StoryTrigger::StudentPasswordFound => "cutscene_student_found",
            StoryTrigger::Firewall1Beaten => "email_it_expert_4",
            StoryTrigger::RouterUnlocked => "cutscene_router_unlock",
            StoryTrigger::Firewall2Beaten => "email_it_expert_5",
            StoryTrigger::InfectedPcIdentified => "cutscene_infected_found",
            StoryTrigger::Firewall3Beaten => "email_it_expert_7",
            StoryTrigger::NeedFirewall4Hint => "email_it_expert_6",
            StoryTrigger::BotnetDeleted => "cutscene_victory",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoryTrigger::FirewallPasswordFailed => "FIREWALL_PASSWORD_FAILED",
            StoryTrigger::StudentPasswordFound => "STUDENT_PASSWORD_FOUND",
            StoryTrigger::Firewall1Beaten => "FIREWALL_1_BEATEN",
            StoryTrigger::RouterUnlocked => "ROUTER_UNLOCKED",
            StoryTrigger::Firewall2Beaten => "FIREWALL_2_BEATEN",
            StoryTrigger::InfectedPcIdentified => "INFECTED_PC_IDENTIFIED",
            StoryTrigger::Firewall3Beaten => "FIREWALL_3_BEATEN",
            StoryTrigger::NeedFirewall4Hint => "NEED_FIREWALL_4_HINT",
            StoryTrigger::BotnetDeleted => "BOTNET_DELETED",
        }
    }
}

/// What the presentation layer should show next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    PresentCutscene(BeatId),
    PresentMessage(MessageId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    pub events: Vec<ProgressEvent>,
}

impl Step {
    fn idle() -> Self {
        Step {
            action: Action::None,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventGraph {
    events: &'static [StoryEvent],
}

impl EventGraph {
    /// Validate a graph: unique keys, a start node, and every `next` resolves.
    pub fn new(events: &'static [StoryEvent]) -> Result<Self, ShellError> {
        let mut keys = HashSet::new();
        for event in events {
            if !keys.insert(event.key) {
                return Err(ShellError::ConfigError(format!(
                    "duplicate story event '{}'",
                    event.key
                )));
            }
        }
        if !keys.contains(START_EVENT) {
            return Err(ShellError::ConfigError(format!(
                "story has no '{START_EVENT}' event"
            )));
        }
        for event in events {
            if let Some(next) = event.next
                && !keys.contains(next)
            {
                return Err(ShellError::ConfigError(format!(
                    "story event '{}' points at unknown '{}'",
                    event.key, next
                )));
            }
        }
        Ok(Self { events })
    }

    pub fn builtin() -> Self {
        Self { events: STORY_FLOW }
    }

    pub fn get(&self, key: &str) -> Option<&StoryEvent> {
        self.events.iter().find(|e| e.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn events(&self) -> &[StoryEvent] {
        self.events
    }

    fn current(&self, progress: &ProgressSnapshot) -> Option<&StoryEvent> {
        self.get(&progress.narrative_cursor)
    }

    /// Move to the next node. `None` at a terminal (or unknown) node.
    pub fn advance(&self, progress: &ProgressSnapshot) -> Option<ProgressEvent> {
        let next = self.current(progress)?.next?;
        Some(ProgressEvent::MoveCursor {
            key: next.to_string(),
        })
    }

    /// Jump to any known node. Unknown keys leave the cursor alone.
    pub fn trigger_event(&self, key: &str) -> Result<ProgressEvent, ShellError> {
        if !self.contains(key) {
            return Err(ShellError::NotFound(format!("story event '{key}'")));
        }
        Ok(ProgressEvent::MoveCursor {
            key: key.to_string(),
        })
    }

    /// Poll for what to present. Re-polling without acting on the result
    /// presents the same cutscene again, and a message is revealed only once.
    pub fn check_for_progress(&self, progress: &ProgressSnapshot) -> Step {
        let Some(event) = self.current(progress) else {
            return Step::idle();
        };
        let advance = self.advance(progress).into_iter();

        match event.kind {
            EventKind::Cutscene(beat) if !progress.beat_viewed(beat) => Step {
                action: Action::PresentCutscene(beat),
                events: Vec::new(),
            },
            EventKind::Message(id) if !progress.message(id).revealed => {
                let mut events = vec![ProgressEvent::RevealMessage { id }];
                events.extend(advance);
                Step {
                    action: Action::PresentMessage(id),
                    events,
                }
            }
            EventKind::WaitForAck(id) if !progress.message(id).acknowledged => Step::idle(),
            // Already seen: nothing to present, just move on.
            _ => Step {
                action: Action::None,
                events: advance.collect(),
            },
        }
    }

    /// The player closed a cutscene.
    pub fn acknowledge_beat(&self, progress: &ProgressSnapshot, beat: BeatId) -> Vec<ProgressEvent> {
        let mut events = vec![ProgressEvent::ViewBeat { id: beat }];
        if self
            .current(progress)
            .is_some_and(|e| e.kind == EventKind::Cutscene(beat))
        {
            events.extend(self.advance(progress));
        }
        events
    }

    /// The player read a message.
    pub fn read_message(&self, progress: &ProgressSnapshot, id: MessageId) -> Vec<ProgressEvent> {
        let mut events = vec![ProgressEvent::AcknowledgeMessage { id }];
        if self
            .current(progress)
            .is_some_and(|e| e.kind == EventKind::WaitForAck(id))
        {
            events.extend(self.advance(progress));
        }
        events
    }
}
