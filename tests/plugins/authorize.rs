use breachdb::core::config::PendingPolicy;
use breachdb::core::engine::Engine;
use breachdb::core::error::ShellError;
use breachdb::core::progress::{MessageId, ProgressEvent, ProgressSnapshot, StoryFlag};
use breachdb::core::session::{ChallengeKind, HostAddress, PendingCommand, Session};
use breachdb::core::sql::Command;
use breachdb::core::world;
use breachdb::plugins::authorize::{Authorized, Decision, NOT_CONNECTED, PENDING_FIRST, authorize};

fn decide(sql: &str, session: &Session, progress: &ProgressSnapshot) -> Decision {
    authorize(&Command::parse(sql), session, progress, PendingPolicy::Reject)
}

fn connected() -> Session {
    let mut session = Session::new();
    session.connect(world::MAIN_HOST);
    session
}

fn with_notes() -> ProgressSnapshot {
    let mut progress = ProgressSnapshot::default();
    progress.apply(&ProgressEvent::AcknowledgeMessage {
        id: MessageId::ItExpert3,
    });
    progress
}

fn allowed_sql(decision: Decision) -> String {
    match decision {
        Decision::Allow(Authorized::Sql(sql)) => sql,
        other => panic!("expected allowed SQL, got {other:?}"),
    }
}

fn block_reason(decision: Decision) -> String {
    match decision {
        Decision::Block(denial) => denial.reason,
        other => panic!("expected a block, got {other:?}"),
    }
}

#[test]
fn test_everything_but_connect_is_blocked_while_disconnected() {
    let session = Session::new();
    let progress = ProgressSnapshot::default();
    for sql in [
        "SELECT * FROM Users",
        "SELECT 1",
        "DISCONNECT",
        "LOGIN student student",
        "UPDATE Firewall SET status = 'inactive' WHERE level = 1",
        "CREATE TABLE notes (x)",
    ] {
        assert_eq!(block_reason(decide(sql, &session, &progress)), NOT_CONNECTED, "{sql}");
    }
    assert_eq!(
        decide("connect 174.156.12.4", &session, &progress),
        Decision::Allow(Authorized::Connect(world::MAIN_HOST))
    );
}

#[test]
fn test_connect_validates_the_address() {
    let session = Session::new();
    let progress = ProgressSnapshot::default();
    for bad in ["CONNECT 256.1.1.1", "CONNECT 10.0.0", "CONNECT a.b.c.d", "CONNECT"] {
        match decide(bad, &session, &progress) {
            Decision::Block(denial) => {
                assert!(matches!(denial.into_error(), ShellError::SyntaxRejected(_)), "{bad}")
            }
            other => panic!("{bad}: {other:?}"),
        }
    }
}

#[test]
fn test_privileged_host_reports_required_and_current_level() {
    let session = Session::new();
    let reason = block_reason(decide(
        "CONNECT 174.156.12.1",
        &session,
        &ProgressSnapshot::default(),
    ));
    assert!(reason.contains("requires permission level 2"), "{reason}");
    assert!(reason.contains("current level is 0"), "{reason}");

    let mut elevated = connected();
    elevated.login("itexpert", 2);
    assert_eq!(
        decide("CONNECT 174.156.12.1", &elevated, &ProgressSnapshot::default()),
        Decision::Allow(Authorized::Connect(HostAddress::new(174, 156, 12, 1)))
    );
}

#[test]
fn test_passwords_table_is_never_readable() {
    let session = connected();
    let mut progress = with_notes();
    for flag in StoryFlag::ALL {
        progress.apply(&ProgressEvent::SetFlag { flag: *flag });
    }
    assert!(decide("SELECT * FROM Passwords", &session, &progress).is_block());
    assert!(decide("select password from passwords where level = 1", &session, &progress).is_block());
}

#[test]
fn test_hints_do_not_exist_until_the_notes_mail_is_read() {
    let session = connected();
    let reason = block_reason(decide(
        "SELECT * FROM Hints",
        &session,
        &ProgressSnapshot::default(),
    ));
    assert_eq!(reason, "no such table: Hints");

    // A literal mentioning the table is not a reference to it.
    assert!(!decide("SELECT 'Hints'", &session, &ProgressSnapshot::default()).is_block());
}

#[test]
fn test_hint_reads_are_narrowed_to_unlocked_rows() {
    let session = connected();
    let progress = with_notes();
    assert_eq!(
        allowed_sql(decide("SELECT id, title FROM Hints ORDER BY id", &session, &progress)),
        "SELECT id, title FROM Hints WHERE Hints.id <= 2 ORDER BY id"
    );
    assert_eq!(
        allowed_sql(decide("SELECT text FROM Hints h WHERE h.id = 5", &session, &progress)),
        "SELECT text FROM Hints h WHERE (h.id = 5) AND h.id <= 2"
    );
}

#[test]
fn test_rewritten_hint_rows_are_a_subset() {
    let engine = Engine::new_world().unwrap();
    let session = connected();
    let mut progress = with_notes();
    progress.apply(&ProgressEvent::SetFlag {
        flag: StoryFlag::UnlockedPc1,
    });

    let original = "SELECT id FROM Hints WHERE id > 1 ORDER BY id LIMIT 5";
    let rewritten = allowed_sql(decide(original, &session, &progress));
    let all = engine.execute(original).unwrap().rows;
    let narrowed = engine.execute(&rewritten).unwrap().rows;

    assert!(!narrowed.is_empty());
    assert!(narrowed.len() < all.len());
    assert!(narrowed.iter().all(|row| all.contains(row)));

    let again = allowed_sql(decide(&rewritten, &session, &progress));
    assert_eq!(again, rewritten);
}

#[test]
fn test_unparseable_hint_reads_fail_closed() {
    let session = connected();
    let progress = with_notes();
    for sql in [
        "SELECT * FROM Hints JOIN PC",
        "SELECT * FROM Hints UNION SELECT * FROM Hints",
        "SELECT * FROM PC WHERE IP IN (SELECT text FROM Hints)",
        "WITH h AS (SELECT * FROM Hints) SELECT * FROM h",
        "UPDATE Hints SET text = ''",
    ] {
        assert!(decide(sql, &session, &progress).is_block(), "{sql}");
    }
}

#[test]
fn test_challenge_writes_are_deferred() {
    let session = connected();
    let progress = ProgressSnapshot::default();
    let cases = [
        (
            "UPDATE Firewall SET status = 'inactive' WHERE level = 1",
            ChallengeKind::Firewall,
        ),
        (
            "UPDATE Router SET locked = 0 WHERE IP = '10.0.0.1'",
            ChallengeKind::Router,
        ),
        (
            "INSERT INTO User_has_access_to_PC VALUES ('student', '10.0.0.11')",
            ChallengeKind::PcAccess,
        ),
    ];
    for (sql, challenge) in cases {
        assert_eq!(
            decide(sql, &session, &progress),
            Decision::Defer(PendingCommand {
                text: sql.to_string(),
                challenge,
            })
        );
    }
    assert!(decide("DELETE FROM Firewall", &session, &progress).is_block());
}

#[test]
fn test_firewall_is_only_reachable_from_the_main_host() {
    let mut session = Session::new();
    session.connect(HostAddress::new(10, 0, 0, 11));
    assert!(decide("SELECT * FROM Firewall", &session, &ProgressSnapshot::default()).is_block());
}

#[test]
fn test_pending_challenge_policy() {
    let mut session = connected();
    session.defer(PendingCommand {
        text: "UPDATE Firewall SET status = 'inactive' WHERE level = 1".into(),
        challenge: ChallengeKind::Firewall,
    });
    let progress = ProgressSnapshot::default();

    let command = Command::parse("SELECT * FROM PC");
    assert_eq!(
        block_reason(authorize(&command, &session, &progress, PendingPolicy::Reject)),
        PENDING_FIRST
    );
    assert!(!authorize(&command, &session, &progress, PendingPolicy::Supersede).is_block());
}

#[test]
fn test_logs_and_pc_files_follow_story_flags() {
    let session = connected();
    let mut progress = ProgressSnapshot::default();
    assert!(decide("SELECT * FROM Log", &session, &progress).is_block());
    assert!(decide("SELECT * FROM Directories", &session, &progress).is_block());

    progress.apply(&ProgressEvent::SetFlag {
        flag: StoryFlag::UnlockedAnyRouter,
    });
    progress.apply(&ProgressEvent::SetFlag {
        flag: StoryFlag::UnlockedPc1,
    });
    assert!(!decide("SELECT * FROM Log", &session, &progress).is_block());
    assert!(!decide("SELECT * FROM Directories", &session, &progress).is_block());
    assert!(decide("DELETE FROM content WHERE id = 66", &session, &progress).is_block());

    progress.apply(&ProgressEvent::SetFlag {
        flag: StoryFlag::Firewall4Beaten,
    });
    assert!(!decide("DELETE FROM content WHERE id = 66", &session, &progress).is_block());
}
