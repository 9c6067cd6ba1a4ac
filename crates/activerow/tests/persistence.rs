mod common;

use std::sync::{Arc, Mutex};

use activerow::prelude::*;
use activerow::{Column, Dialect, MockConnection, TxEvent};
use common::{fixture, fixture_with};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> activerow::CallbackFn {
    let log = Arc::clone(log);
    callback(move |_| {
        log.lock().unwrap().push(label);
        Ok(())
    })
}

#[test]
fn test_insert_assigns_generated_key() {
    let fx = fixture();
    fx.conn.set_next_insert_id(7);
    let mut author = fx
        .model("Author")
        .build(row! { "name" => "Tito" }.into_map())
        .unwrap();
    assert!(author.save(true).unwrap());

    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "INSERT INTO `authors`(`name`,`created_at`,`updated_at`) VALUES(?,?,?)"
    );
    assert_eq!(stmt.values[0], Value::from("Tito"));
    assert_eq!(author.attribute("id"), Some(&Value::Int(7)));
    assert!(!author.is_new_record());
    assert!(!author.is_dirty());
    assert!(matches!(author.attribute("created_at"), Some(Value::DateTime(_))));
}

#[test]
fn test_update_stamps_updated_at() {
    let fx = fixture();
    let mut author = fx.load(
        "Author",
        row! { "id" => 1, "name" => "Tito", "updated_at" => "2020-01-01 00:00:00" },
    );
    author.set("name", "Jax").unwrap();
    assert!(author.save(true).unwrap());
    assert_eq!(
        fx.conn.last_statement().unwrap().sql,
        "UPDATE `authors` SET `name`=?, `updated_at`=? WHERE `id`=?"
    );
}

#[test]
fn test_clean_record_update_is_a_no_op() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 1, "name" => "Tito" });
    assert!(author.save(true).unwrap());
    assert!(fx.conn.statements().is_empty());
}

#[test]
fn test_before_save_halt_skips_the_write() {
    let fx = fixture_with(vec![
        ModelConfig::new("HaltingAuthor")
            .table("authors")
            .callback_fn("before_save", callback(|_| Ok(false))),
    ]);
    let mut author = fx
        .model("HaltingAuthor")
        .build(row! { "name" => "Tito" }.into_map())
        .unwrap();
    assert!(!author.save(true).unwrap());
    assert!(author.is_new_record());
    assert_eq!(fx.conn.count_matching("INSERT"), 0);
    assert_eq!(fx.conn.count_matching("UPDATE"), 0);
}

#[test]
fn test_save_hooks_run_before_create_hooks() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let fx = fixture_with(vec![
        ModelConfig::new("TracedAuthor")
            .table("authors")
            .callback_fn("before_create", recorder(&log, "before_create"))
            .callback_fn("before_save", recorder(&log, "before_save"))
            .callback_fn("after_create", recorder(&log, "after_create"))
            .callback_fn("after_save", recorder(&log, "after_save"))
            .callback_fn("before_validation", recorder(&log, "before_validation")),
    ]);
    let mut author = fx
        .model("TracedAuthor")
        .build(row! { "name" => "Tito" }.into_map())
        .unwrap();
    assert!(author.save(true).unwrap());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "before_validation",
            "before_save",
            "before_create",
            "after_save",
            "after_create",
        ]
    );

    log.lock().unwrap().clear();
    author.save(false).unwrap();
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_named_method_callbacks() {
    let fx = fixture_with(vec![
        ModelConfig::new("ShoutingAuthor")
            .table("authors")
            .method(
                "shout",
                callback(|r| {
                    let name = r.get("name")?.to_string().to_uppercase();
                    r.set("name", name)
                }),
            )
            .callback("before_create", "shout"),
    ]);
    let mut author = fx
        .model("ShoutingAuthor")
        .build(row! { "name" => "tito" }.into_map())
        .unwrap();
    author.save(true).unwrap();
    assert_eq!(author.attribute("name"), Some(&Value::from("TITO")));

    let err = Registry::builder()
        .model(ModelConfig::new("Broken").callback("before_save", "missing"))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        Error::config("Unknown method for callback: before_save: #missing")
    );
}

#[test]
fn test_save_then_reload_round_trips() {
    let fx = fixture();
    let mut author = fx
        .model("Author")
        .build(row! { "name" => "Tito", "parent_author_id" => 2 }.into_map())
        .unwrap();
    author.save(true).unwrap();
    let before = author.attributes().clone();

    let mut stored = Row::new();
    for (name, value) in &before {
        stored.insert(name.clone(), value.clone());
    }
    fx.conn.clear_log();
    fx.conn.push_rows(vec![stored]);
    author.set("name", "Changed").unwrap();
    author.reload().unwrap();

    assert_eq!(author.attributes(), &before);
    assert!(!author.is_dirty());
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM `authors` WHERE `id`=? LIMIT 0,1");
    assert_eq!(stmt.values, vec![Value::Int(1)]);
}

#[test]
fn test_reload_missing_row() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 1 });
    assert_eq!(
        author.reload().unwrap_err(),
        Error::RecordNotFound("Couldn't find Author with ID=1".into())
    );
}

#[test]
fn test_delete() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 3, "name" => "Tito" });
    assert!(author.delete().unwrap());
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "DELETE FROM `authors` WHERE `id`=?");
    assert_eq!(stmt.values, vec![Value::Int(3)]);
}

#[test]
fn test_writes_without_primary_key_fail() {
    let fx = fixture_with(vec![ModelConfig::new("LogEntry").table("logs")]);
    fx.conn
        .define_table("logs", vec![Column::new("message", "text")]);
    fx.conn.push_rows(vec![row! { "message" => "hello" }]);
    let mut entry = fx
        .model("LogEntry")
        .all(FindOptions::new())
        .unwrap()
        .pop()
        .unwrap();

    assert_eq!(
        entry.delete().unwrap_err(),
        Error::config("Cannot delete, no primary key defined for: LogEntry")
    );
    entry.set("message", "bye").unwrap();
    assert_eq!(
        entry.save(true).unwrap_err(),
        Error::config("Cannot update, no primary key defined for: LogEntry")
    );
}

#[test]
fn test_update_attributes_and_update_attribute() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 1, "name" => "Tito" });
    assert!(author
        .update_attributes(row! { "name" => "Jax", "parent_author_id" => 5 }.into_map())
        .unwrap());
    assert_eq!(
        fx.conn.last_statement().unwrap().sql,
        "UPDATE `authors` SET `name`=?, `parent_author_id`=? WHERE `id`=?"
    );

    assert!(author.update_attribute("name", "Kam").unwrap());
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "UPDATE `authors` SET `name`=? WHERE `id`=?");
    assert_eq!(stmt.values, vec![Value::from("Kam"), Value::Int(1)]);
}

#[test]
fn test_validation_failure_blocks_save() {
    let fx = fixture_with(vec![
        ModelConfig::new("CheckedBook")
            .table("books")
            .validates(Validation::presence_of(["name"]))
            .validates(Validation::length_of(["name"]).maximum(5))
            .validate_with(|r| {
                if r.get("name")? == Value::from("bad") {
                    r.errors_mut().add("name", Some("is bad"));
                }
                Ok(())
            }),
    ]);
    let books = fx.model("CheckedBook");

    let mut book = books.build(row! { "name" => "" }.into_map()).unwrap();
    assert!(!book.save(true).unwrap());
    assert_eq!(book.errors().unwrap().on("name"), Some(&["can't be blank".to_string()][..]));
    assert_eq!(fx.conn.count_matching("INSERT"), 0);

    book.set("name", "Ancient Art").unwrap();
    assert!(book.is_invalid().unwrap());
    assert_eq!(
        book.errors().unwrap().full_messages(),
        vec!["Name is too long (maximum is 5 characters)".to_string()]
    );

    book.set("name", "bad").unwrap();
    assert!(!book.is_valid().unwrap());
    assert_eq!(book.errors().unwrap().on("name"), Some(&["is bad".to_string()][..]));

    // Skipping validation saves anyway.
    assert!(book.save(false).unwrap());
    assert_eq!(fx.conn.count_matching("INSERT"), 1);
}

#[test]
fn test_length_range_options_are_exclusive() {
    let fx = fixture_with(vec![
        ModelConfig::new("OverSpecified")
            .table("books")
            .validates(Validation::length_of(["name"]).within(1, 5).is(3)),
    ]);
    let mut book = fx
        .model("OverSpecified")
        .build(row! { "name" => "abc" }.into_map())
        .unwrap();
    assert_eq!(
        book.is_valid().unwrap_err(),
        Error::ValidationsArgument("Too many range options specified.  Choose only one.".into())
    );
}

#[test]
fn test_uniqueness_queries_other_rows() {
    let fx = fixture_with(vec![
        ModelConfig::new("UniqueBook")
            .table("books")
            .validates(Validation::uniqueness_of(["name"])),
    ]);
    let mut book = fx
        .model("UniqueBook")
        .build(row! { "name" => "Ancient Art" }.into_map())
        .unwrap();
    fx.conn.push_rows(vec![row! { "COUNT(*)" => 1 }]);
    assert!(!book.is_valid().unwrap());
    assert_eq!(book.errors().unwrap().on("name"), Some(&["must be unique".to_string()][..]));

    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT COUNT(*) FROM `books` WHERE id is not null and name=?"
    );
    assert_eq!(stmt.values, vec![Value::from("Ancient Art")]);
}

#[test]
fn test_transaction_outcomes() {
    let fx = fixture();
    let authors = fx.model("Author");

    let committed = authors
        .transaction(|m| {
            m.create(row! { "name" => "Tito" }.into_map(), true)?;
            Ok(TxOutcome::Commit)
        })
        .unwrap();
    assert!(committed);

    let rolled_back = authors.transaction(|_| Ok(false)).unwrap();
    assert!(!rolled_back);

    let err = authors
        .transaction(|_| -> Result<()> { Err(Error::config("boom")) })
        .unwrap_err();
    assert_eq!(err, Error::config("boom"));

    assert_eq!(
        fx.conn.transactions(),
        vec![
            TxEvent::Begin,
            TxEvent::Commit,
            TxEvent::Begin,
            TxEvent::Rollback,
            TxEvent::Begin,
            TxEvent::Rollback,
        ]
    );
}

#[test]
fn test_postgres_sequence_insert() {
    let conn = Arc::new(MockConnection::new(Dialect::Postgres).with_table(
        "authors",
        vec![Column::new("id", "int").primary_key(), Column::new("name", "varchar(25)")],
    ));
    let registry = Registry::builder()
        .connection("development", conn.clone())
        .model(ModelConfig::new("Author"))
        .build()
        .unwrap();
    let mut author = registry
        .model("Author")
        .unwrap()
        .build(row! { "name" => "Tito" }.into_map())
        .unwrap();
    author.save(true).unwrap();

    assert_eq!(
        conn.last_statement().unwrap().sql,
        "INSERT INTO \"authors\"(\"name\",\"id\") VALUES(?,nextval('authors_id_seq'))"
    );
    assert_eq!(author.attribute("id"), Some(&Value::Int(1)));
}

#[test]
fn test_oracle_preselects_sequence_values() {
    let conn = Arc::new(MockConnection::new(Dialect::Oracle).with_table(
        "authors",
        vec![Column::new("id", "int").primary_key(), Column::new("name", "varchar(25)")],
    ));
    let registry = Registry::builder()
        .connection("development", conn.clone())
        .model(ModelConfig::new("Author"))
        .build()
        .unwrap();
    conn.push_rows(vec![row! { "nextval" => 42 }]);
    let mut author = registry
        .model("Author")
        .unwrap()
        .build(row! { "name" => "Tito" }.into_map())
        .unwrap();
    author.save(true).unwrap();

    assert_eq!(
        conn.sql_log(),
        vec![
            "SELECT authors_seq.nextval FROM dual".to_string(),
            "INSERT INTO authors(name,id) VALUES(?,?)".to_string(),
        ]
    );
    assert_eq!(author.attribute("id"), Some(&Value::Int(42)));
}

#[test]
fn test_build_and_set_timestamps() {
    let fx = fixture();
    let mut author = fx.model("Author").build(IndexMap::new()).unwrap();
    author.set_timestamps().unwrap();
    assert!(matches!(author.attribute("created_at"), Some(Value::DateTime(_))));
    assert!(matches!(author.attribute("updated_at"), Some(Value::DateTime(_))));
}

#[test]
fn test_database_failure_rolls_back_and_propagates() {
    let fx = fixture();
    fx.conn.fail_on("INSERT INTO `authors`", "23000", "Duplicate entry");
    let err = fx
        .model("Author")
        .transaction(|m| m.create(row! { "name" => "Tito" }.into_map(), true).map(|_| ()))
        .unwrap_err();
    assert_eq!(err, Error::database("23000", "Duplicate entry"));
    assert_eq!(err.to_string(), "Database error 23000: Duplicate entry");
    assert_eq!(fx.conn.transactions(), vec![TxEvent::Begin, TxEvent::Rollback]);
}

#[test]
fn test_failed_rollback_keeps_the_original_error() {
    let fx = fixture();
    fx.conn.fail_transaction(TxEvent::Rollback, "08003", "connection gone");
    let err = fx
        .model("Author")
        .transaction(|_| -> Result<()> { Err(Error::config("boom")) })
        .unwrap_err();
    assert_eq!(err, Error::config("boom"));
    assert_eq!(fx.conn.transactions(), vec![TxEvent::Begin, TxEvent::Rollback]);
}

#[test]
fn test_failed_commit_rolls_back() {
    let fx = fixture();
    fx.conn.fail_transaction(TxEvent::Commit, "40001", "serialization failure");
    let err = fx.model("Author").transaction(|_| Ok(true)).unwrap_err();
    assert_eq!(err, Error::database("40001", "serialization failure"));
    assert_eq!(
        fx.conn.transactions(),
        vec![TxEvent::Begin, TxEvent::Commit, TxEvent::Rollback]
    );
}
