use breachdb::core::engine::Engine;
use breachdb::plugins::suggest::{MAX_SUGGESTIONS, SuggestionKind, suggest};

fn world_schema() -> breachdb::core::engine::SchemaSnapshot {
    Engine::new_world().unwrap().schema_snapshot().unwrap()
}

fn texts(partial: &str) -> Vec<String> {
    suggest(partial, &world_schema())
        .into_iter()
        .map(|s| s.text)
        .collect()
}

#[test]
fn test_completed_table_name_is_excluded() {
    let schema = world_schema();
    for table in schema.table_names() {
        let partial = format!("SELECT * FROM {table}");
        let found = suggest(&partial, &schema);
        assert!(
            found.iter().all(|s| !s.text.eq_ignore_ascii_case(table)),
            "{partial} suggested itself"
        );
    }
}

#[test]
fn test_tables_after_from_and_update() {
    assert!(texts("SELECT * FROM Fi").contains(&"Firewall".to_string()));
    assert_eq!(texts("UPDATE Rou")[0], "Router");
    assert!(texts("INSERT INTO User_").contains(&"User_has_access_to_PC".to_string()));
}

#[test]
fn test_columns_are_tagged_with_their_table() {
    let schema = world_schema();
    let found = suggest("SELECT * FROM Log WHERE sou", &schema);
    assert_eq!(found[0].text, "source_ip");
    assert_eq!(
        found[0].kind,
        SuggestionKind::Column {
            table: "Log".into()
        }
    );
}

#[test]
fn test_keywords_follow_contextual_matches() {
    let schema = world_schema();
    let found = suggest("SELECT * FROM PC WHERE ", &schema);
    let first_keyword = found
        .iter()
        .position(|s| s.kind == SuggestionKind::Keyword)
        .unwrap_or(found.len());
    assert!(found[..first_keyword]
        .iter()
        .all(|s| matches!(s.kind, SuggestionKind::Column { .. })));
    assert!(found.len() <= MAX_SUGGESTIONS);
}

#[test]
fn test_suggest_is_pure() {
    let schema = world_schema();
    let partial = "SELECT name FROM User WHERE pa";
    assert_eq!(suggest(partial, &schema), suggest(partial, &schema));
    assert_eq!(texts("lo"), vec!["LOGIN"]);
}
