use breachdb::core::engine::{Cell, Engine, ExecutionResult};
use breachdb::core::progress::{ProgressEvent, ProgressSnapshot, SecretKey, StoryFlag};
use breachdb::core::sql::Command;
use breachdb::plugins::narrative::StoryTrigger;
use breachdb::plugins::observer::{Detector, Discovery, Observation, observe};

fn run(engine: &Engine, sql: &str, progress: &ProgressSnapshot) -> Vec<Discovery> {
    let command = Command::parse(sql);
    let result = engine.execute(sql).unwrap();
    observe(
        &Observation {
            command: &command,
            result: &result,
        },
        progress,
    )
}

fn apply(progress: &mut ProgressSnapshot, discoveries: &[Discovery]) {
    for discovery in discoveries {
        progress.apply(&discovery.event);
    }
}

fn detectors(discoveries: &[Discovery]) -> Vec<Detector> {
    discoveries.iter().map(|d| d.detector).collect()
}

#[test]
fn test_firewall_secret_is_discovered_once() {
    let command = Command::parse("SELECT content FROM content");
    let result = ExecutionResult {
        columns: vec!["content".into()],
        rows: vec![vec![Cell::Text("Firewall level 1 password: ABC123".into())]],
        changes: 0,
    };
    let obs = Observation {
        command: &command,
        result: &result,
    };
    let mut progress = ProgressSnapshot::default();
    assert_eq!(progress.secret(SecretKey::F1), None);

    let first = observe(&obs, &progress);
    assert_eq!(detectors(&first), vec![Detector::FirewallPassword(1)]);
    apply(&mut progress, &first);
    assert_eq!(progress.secret(SecretKey::F1), Some("ABC123"));

    assert!(observe(&obs, &progress).is_empty());
    assert_eq!(progress.secret(SecretKey::F1), Some("ABC123"));
}

#[test]
fn test_hashing_key_sets_secret_and_flag() {
    let engine = Engine::new_world().unwrap();
    let mut progress = ProgressSnapshot::default();
    let found = run(&engine, "SELECT * FROM content WHERE id = 2", &progress);
    assert_eq!(
        detectors(&found),
        vec![Detector::HashingKeySecret, Detector::HashingKeyFlag]
    );
    apply(&mut progress, &found);
    assert_eq!(progress.secret(SecretKey::HashingKey), Some("tul"));
    assert!(progress.flag(StoryFlag::FoundHashingKey));
}

#[test]
fn test_one_read_can_satisfy_several_detectors() {
    let engine = Engine::new_world().unwrap();
    let mut progress = ProgressSnapshot::default();
    let found = run(
        &engine,
        "SELECT name, unhash(password, 'tul') AS password FROM User",
        &progress,
    );
    let names = detectors(&found);
    for expected in [
        Detector::RouterPasswordSecret,
        Detector::RouterPasswordFlag,
        Detector::StudentCredentials,
        Detector::DecipheredPasswords,
        Detector::LabTechPassword,
    ] {
        assert!(names.contains(&expected), "{expected:?} missing from {names:?}");
    }
    let triggers: Vec<StoryTrigger> = found.iter().filter_map(|d| d.trigger).collect();
    assert_eq!(triggers, vec![StoryTrigger::StudentPasswordFound]);

    apply(&mut progress, &found);
    assert_eq!(progress.secret(SecretKey::F2), Some("quantum7"));
    assert_eq!(progress.secret(SecretKey::RouterPassword), Some("gatekeeper9"));
    assert!(progress.flag(StoryFlag::UnhashedLevel1Passwords));

    let again = run(
        &engine,
        "SELECT name, unhash(password, 'tul') AS password FROM User",
        &progress,
    );
    assert!(again.is_empty());
}

#[test]
fn test_ciphered_passwords_do_not_leak_secrets() {
    let engine = Engine::new_world().unwrap();
    let progress = ProgressSnapshot::default();
    let found = run(&engine, "SELECT password FROM User WHERE name <> 'student'", &progress);
    assert!(found.is_empty(), "{:?}", detectors(&found));
}

#[test]
fn test_infected_pc_needs_the_address_in_the_query() {
    let engine = Engine::new_world().unwrap();
    let progress = ProgressSnapshot::default();

    let browsing = run(&engine, "SELECT * FROM Log", &progress);
    assert_eq!(detectors(&browsing), vec![Detector::LogsAccessed]);

    let pinned = run(
        &engine,
        "SELECT * FROM Log WHERE source_ip = '10.0.0.66'",
        &progress,
    );
    let infected = pinned
        .iter()
        .find(|d| d.detector == Detector::InfectedPc)
        .unwrap();
    assert_eq!(infected.trigger, Some(StoryTrigger::InfectedPcIdentified));
}

#[test]
fn test_infected_pc_after_level_three_sends_the_files_mail() {
    let engine = Engine::new_world().unwrap();
    let mut progress = ProgressSnapshot::default();
    progress.apply(&ProgressEvent::SetFlag {
        flag: StoryFlag::Firewall3Beaten,
    });

    let found = run(
        &engine,
        "SELECT source_ip FROM Log WHERE source_ip = '10.0.0.66'",
        &progress,
    );
    let infected = found
        .iter()
        .find(|d| d.detector == Detector::InfectedPc)
        .unwrap();
    assert_eq!(infected.trigger, Some(StoryTrigger::Firewall3Beaten));
}

#[test]
fn test_botnet_deletion_requires_the_script_and_a_change() {
    let engine = Engine::new_world().unwrap();
    let progress = ProgressSnapshot::default();

    assert!(run(&engine, "DELETE FROM Directories WHERE id = 99999", &progress).is_empty());

    let deleted = run(&engine, "DELETE FROM Directories WHERE id = 606", &progress);
    assert_eq!(detectors(&deleted), vec![Detector::BotnetDeleted]);
    assert_eq!(deleted[0].trigger, Some(StoryTrigger::BotnetDeleted));

    // Already gone: nothing changes, nothing fires.
    assert!(run(&engine, "DELETE FROM Directories WHERE id = 606", &progress).is_empty());
}
