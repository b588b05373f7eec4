use breachdb::core::error::ShellError;
use breachdb::core::progress::{BeatId, MessageId, ProgressSnapshot, START_EVENT};
use breachdb::plugins::narrative::{
    Action, EventGraph, EventKind, STORY_FLOW, StoryEvent, StoryTrigger,
};

/// Poll once and apply what the poll asked for.
fn poll(graph: &EventGraph, progress: &mut ProgressSnapshot) -> Action {
    let step = graph.check_for_progress(progress);
    progress.apply_all(&step.events);
    step.action
}

#[test]
fn test_every_next_resolves_and_chains_terminate() {
    let graph = EventGraph::new(STORY_FLOW).unwrap();
    for event in graph.events() {
        let mut seen = 0;
        let mut cursor = Some(event.key);
        while let Some(key) = cursor {
            seen += 1;
            assert!(seen <= graph.events().len(), "cycle through {key}");
            cursor = graph.get(key).unwrap().next;
        }
    }
}

#[test]
fn test_dangling_next_is_rejected() {
    static BROKEN: &[StoryEvent] = &[StoryEvent {
        key: "start",
        kind: EventKind::Cutscene(BeatId::Intro),
        next: Some("nowhere"),
    }];
    assert!(matches!(
        EventGraph::new(BROKEN),
        Err(ShellError::ConfigError(_))
    ));
}

#[test]
fn test_message_is_revealed_exactly_once() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();
    progress.narrative_cursor = "email_it_expert_1".into();

    assert_eq!(
        poll(&graph, &mut progress),
        Action::PresentMessage(MessageId::ItExpert1)
    );
    assert!(progress.message(MessageId::ItExpert1).revealed);
    assert_eq!(progress.narrative_cursor, "wait_email_it_expert_1");

    for _ in 0..5 {
        assert_eq!(poll(&graph, &mut progress), Action::None);
        assert!(progress.message(MessageId::ItExpert1).revealed);
        assert_eq!(progress.narrative_cursor, "wait_email_it_expert_1");
    }
}

#[test]
fn test_cutscene_waits_for_acknowledgement() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();

    for _ in 0..3 {
        assert_eq!(
            poll(&graph, &mut progress),
            Action::PresentCutscene(BeatId::Intro)
        );
        assert_eq!(progress.narrative_cursor, START_EVENT);
    }

    let events = graph.acknowledge_beat(&progress, BeatId::Intro);
    progress.apply_all(&events);
    assert!(progress.beat_viewed(BeatId::Intro));
    assert_eq!(progress.narrative_cursor, "email_rector_1");
}

#[test]
fn test_reading_the_awaited_message_moves_on() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();
    progress.narrative_cursor = "email_rector_1".into();
    poll(&graph, &mut progress);

    // Reading a different message does not release the wait.
    let events = graph.read_message(&progress, MessageId::ItExpert1);
    progress.apply_all(&events);
    assert_eq!(progress.narrative_cursor, "wait_email_rector_1");

    let events = graph.read_message(&progress, MessageId::Rector1);
    progress.apply_all(&events);
    assert_eq!(progress.narrative_cursor, "cutscene_narrative_bridge");
    assert_eq!(
        poll(&graph, &mut progress),
        Action::PresentCutscene(BeatId::NarrativeBridge)
    );
}

#[test]
fn test_terminal_nodes_are_absorbing() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();
    progress.narrative_cursor = "cutscene_victory".into();
    assert!(graph.advance(&progress).is_none());

    let events = graph.acknowledge_beat(&progress, BeatId::Victory);
    progress.apply_all(&events);
    assert_eq!(progress.narrative_cursor, "cutscene_victory");
    assert_eq!(poll(&graph, &mut progress), Action::None);
    assert_eq!(progress.narrative_cursor, "cutscene_victory");
}

#[test]
fn test_triggers_jump_and_unknown_keys_do_not() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();

    let event = graph
        .trigger_event(StoryTrigger::InfectedPcIdentified.event_key())
        .unwrap();
    progress.apply(&event);
    assert_eq!(progress.narrative_cursor, "cutscene_infected_found");

    assert!(matches!(
        graph.trigger_event("email_it_expert_99"),
        Err(ShellError::NotFound(_))
    ));
    assert_eq!(progress.narrative_cursor, "cutscene_infected_found");
}

#[test]
fn test_reset_returns_to_start_and_keeps_identity() {
    let graph = EventGraph::builtin();
    let mut progress = ProgressSnapshot::default();
    progress.identity = Some("neo".into());
    progress.narrative_cursor = "wait_email_it_expert_5".into();
    poll(&graph, &mut progress);

    let fresh = progress.reset();
    assert_eq!(fresh.identity.as_deref(), Some("neo"));
    assert_eq!(fresh.narrative_cursor, START_EVENT);
    assert_eq!(fresh, ProgressSnapshot {
        identity: Some("neo".into()),
        ..ProgressSnapshot::default()
    });
}
