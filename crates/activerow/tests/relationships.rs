mod common;

use activerow::prelude::*;
use activerow::N1Stats;
use common::{fixture, fixture_only};
use pretty_assertions::assert_eq;

#[test]
fn test_lazy_belongs_to() {
    let fx = fixture();
    let mut book = fx.load("Book", row! { "id" => 1, "author_id" => 5, "name" => "Ancient Art" });
    fx.conn.push_rows(vec![row! { "id" => 5, "name" => "Tito" }]);

    let author = book.related("author").unwrap().one().unwrap();
    assert_eq!(author.attribute("name"), Some(&Value::from("Tito")));
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM `authors` WHERE `id`=? LIMIT 0,1");
    assert_eq!(stmt.values, vec![Value::Int(5)]);

    // Second read is served from the loaded value.
    book.related("author").unwrap();
    assert_eq!(fx.conn.count_matching("SELECT"), 1);
}

#[test]
fn test_lazy_has_many_applies_declared_order() {
    let fx = fixture();
    let mut venue = fx.load("Venue", row! { "id" => 2, "name" => "Warner Theatre" });
    fx.conn.push_rows(vec![
        row! { "id" => 1, "venue_id" => 2, "title" => "Opening" },
        row! { "id" => 4, "venue_id" => 2, "title" => "Closing" },
    ]);

    let events = venue.related("events").unwrap().many();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].attribute("title"), Some(&Value::from("Closing")));
    assert_eq!(
        fx.conn.last_statement().unwrap().sql,
        "SELECT * FROM `events` WHERE `venue_id`=? ORDER BY id asc"
    );
}

#[test]
fn test_null_key_loads_nothing() {
    let fx = fixture();
    let mut book = fx.load("Book", row! { "id" => 1, "author_id" => Value::Null });
    assert!(book.related("author").unwrap().one().is_none());
    assert!(book.related("author").unwrap().is_empty());
    assert_eq!(fx.conn.statements().len(), 0);
}

#[test]
fn test_lazy_has_many_through() {
    let fx = fixture();
    let mut venue = fx.load("Venue", row! { "id" => 1 });
    fx.conn.push_rows(vec![row! { "id" => 3, "name" => "David" }]);

    let hosts = venue.related("hosts").unwrap();
    assert_eq!(hosts.len(), 1);
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT `hosts`.* FROM `hosts` INNER JOIN `events` ON(`hosts`.id = `events`.host_id) WHERE `venue_id`=?"
    );
    assert_eq!(stmt.values, vec![Value::Int(1)]);
}

#[test]
fn test_lazy_loads_feed_the_n1_tracker() {
    let fx = fixture();
    fx.conn.push_rows(vec![
        row! { "id" => 1, "author_id" => 1 },
        row! { "id" => 2, "author_id" => 2 },
        row! { "id" => 3, "author_id" => 3 },
    ]);
    let mut books = fx.model("Book").all(FindOptions::new()).unwrap();
    for book in &mut books {
        book.related("author").unwrap();
    }

    assert_eq!(fx.conn.count_matching("FROM `authors`"), 3);
    assert_eq!(
        fx.registry.n1_stats(),
        N1Stats {
            total_loads: 3,
            relationships_loaded: 1,
            potential_n1: 1,
        }
    );
    fx.registry.reset_n1_stats();
    assert_eq!(fx.registry.n1_stats(), N1Stats::default());
}

#[test]
fn test_eager_belongs_to_batches_keys() {
    let fx = fixture();
    fx.conn.push_rows(vec![
        row! { "id" => 1, "author_id" => 1 },
        row! { "id" => 2, "author_id" => 2 },
        row! { "id" => 3, "author_id" => 1 },
        row! { "id" => 4, "author_id" => Value::Null },
    ]);
    fx.conn.push_rows(vec![
        row! { "id" => 1, "name" => "Tito" },
        row! { "id" => 2, "name" => "George" },
    ]);

    let mut books = fx
        .model("Book")
        .all(FindOptions::new().include("author"))
        .unwrap();

    assert_eq!(fx.conn.statements().len(), 2);
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM `authors` WHERE `id` IN(?,?)");
    assert_eq!(stmt.values, vec![Value::Int(1), Value::Int(2)]);

    let names: Vec<Value> = books
        .iter_mut()
        .map(|b| {
            b.related("author")
                .unwrap()
                .one()
                .map_or(Value::Null, |a| a.attribute("name").cloned().unwrap_or_default())
        })
        .collect();
    assert_eq!(
        names,
        vec![Value::from("Tito"), Value::from("George"), Value::from("Tito"), Value::Null]
    );
    // Every owner was populated, so nothing was loaded lazily.
    assert_eq!(fx.conn.statements().len(), 2);
    assert_eq!(fx.registry.n1_stats().total_loads, 0);
}

#[test]
fn test_eager_owners_get_independent_copies() {
    let fx = fixture();
    fx.conn.push_rows(vec![
        row! { "id" => 1, "author_id" => 1 },
        row! { "id" => 2, "author_id" => 1 },
    ]);
    fx.conn.push_rows(vec![row! { "id" => 1, "name" => "Tito" }]);
    let mut books = fx
        .model("Book")
        .all(FindOptions::new().include("author"))
        .unwrap();

    if let Related::One(Some(author)) = books[0].related_mut("author").unwrap() {
        author.set("name", "Changed").unwrap();
    }
    let other = books[1].related("author").unwrap().one().unwrap();
    assert_eq!(other.attribute("name"), Some(&Value::from("Tito")));
    assert!(!other.is_dirty());
}

#[test]
fn test_eager_has_many_with_nested_include() {
    let fx = fixture();
    fx.conn
        .push_rows(vec![row! { "id" => 1 }, row! { "id" => 2 }, row! { "id" => 3 }]);
    fx.conn.push_rows(vec![
        row! { "id" => 10, "venue_id" => 1, "host_id" => 7 },
        row! { "id" => 11, "venue_id" => 2, "host_id" => 7 },
        row! { "id" => 12, "venue_id" => 1, "host_id" => 8 },
    ]);
    fx.conn.push_rows(vec![
        row! { "id" => 7, "name" => "David" },
        row! { "id" => 8, "name" => "Nancy" },
    ]);

    let mut venues = fx
        .model("Venue")
        .all(FindOptions::new().include(Include::new("events").with("host")))
        .unwrap();

    assert_eq!(
        fx.conn.sql_log(),
        vec![
            "SELECT * FROM `venues`".to_string(),
            "SELECT * FROM `events` WHERE `venue_id` IN(?,?,?) ORDER BY id asc".to_string(),
            "SELECT * FROM `hosts` WHERE `id` IN(?,?)".to_string(),
        ]
    );

    let counts: Vec<usize> = venues
        .iter_mut()
        .map(|v| v.related("events").unwrap().len())
        .collect();
    assert_eq!(counts, vec![2, 1, 0]);

    let events = venues[0].related_mut("events").unwrap().many_mut();
    let host = events[1].related("host").unwrap().one().unwrap();
    assert_eq!(host.attribute("name"), Some(&Value::from("Nancy")));
    assert_eq!(fx.conn.statements().len(), 3);
}

#[test]
fn test_eager_has_many_through() {
    let fx = fixture();
    fx.conn.push_rows(vec![row! { "id" => 1 }, row! { "id" => 2 }]);
    fx.conn.push_rows(vec![
        row! { "id" => 7, "name" => "David", "ar_through_key__" => 1 },
        row! { "id" => 8, "name" => "Nancy", "ar_through_key__" => 1 },
        row! { "id" => 7, "name" => "David", "ar_through_key__" => 2 },
    ]);

    let mut venues = fx
        .model("Venue")
        .all(FindOptions::new().include("hosts"))
        .unwrap();

    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(
        stmt.sql,
        "SELECT `hosts`.*, `events`.`venue_id` AS ar_through_key__ FROM `hosts` INNER JOIN `events` ON(`hosts`.id = `events`.host_id) WHERE `events`.`venue_id` IN(?,?)"
    );
    assert_eq!(stmt.values, vec![Value::Int(1), Value::Int(2)]);

    let first = venues[0].related("hosts").unwrap().many();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].attribute("ar_through_key__"), None);
    assert_eq!(venues[1].related("hosts").unwrap().len(), 1);
}

#[test]
fn test_eager_load_without_keys_skips_the_query() {
    let fx = fixture();
    fx.conn
        .push_rows(vec![row! { "id" => 1, "author_id" => Value::Null }]);
    let mut books = fx
        .model("Book")
        .all(FindOptions::new().include("author"))
        .unwrap();
    assert_eq!(fx.conn.statements().len(), 1);
    assert!(books[0].related("author").unwrap().is_empty());
    assert_eq!(fx.conn.statements().len(), 1);
}

#[test]
fn test_build_and_create_association() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 4, "name" => "Tito" });

    let book = author
        .build_association("book", row! { "name" => "Ancient Art" }.into_map())
        .unwrap();
    assert!(book.is_new_record());
    assert_eq!(book.table().class_name, "Book");
    assert_eq!(book.attribute("author_id"), Some(&Value::Int(4)));
    assert_eq!(
        fx.conn.last_statement().unwrap().sql,
        "SELECT * FROM `books` WHERE `author_id`=?"
    );

    fx.conn.set_next_insert_id(20);
    let created = author
        .create_association("books", row! { "name" => "Second" }.into_map())
        .unwrap();
    assert_eq!(created.attribute("id"), Some(&Value::Int(20)));
    let stmt = fx.conn.last_statement().unwrap();
    assert_eq!(stmt.sql, "INSERT INTO `books`(`author_id`,`name`) VALUES(?,?)");
    assert_eq!(stmt.values, vec![Value::Int(4), Value::from("Second")]);
    assert_eq!(author.related("books").unwrap().len(), 1);

    assert_eq!(
        author
            .build_association("publisher", Default::default())
            .unwrap_err(),
        Error::config("Call to undefined method: build_publisher")
    );
}

#[test]
fn test_undeclared_relationship() {
    let fx = fixture();
    let mut author = fx.load("Author", row! { "id" => 1 });
    assert_eq!(
        author.related("publisher").unwrap_err(),
        Error::Relationship(
            "Relationship named publisher has not been declared for class: Author".into()
        )
    );
}

#[test]
fn test_through_a_has_one_is_rejected() {
    let err = Registry::builder()
        .model(ModelConfig::new("Venue").relationship(Relationship::has_many("hosts").through("spot")))
        .model(
            ModelConfig::new("Host")
                .relationship(Relationship::has_one("spot").class_name("Venue")),
        )
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        Error::HasManyThrough(
            "has_many through can only use a belongs_to or has_many association".into()
        )
    );
}

#[test]
fn test_through_requires_the_intermediate_association() {
    let fx_err = Registry::builder()
        .model(ModelConfig::new("Venue").relationship(Relationship::has_many("hosts").through("events")))
        .model(ModelConfig::new("Host"))
        .build()
        .unwrap_err();
    assert_eq!(
        fx_err,
        Error::HasManyThrough("Could not find the association events in model Venue".into())
    );
}

#[test]
fn test_relationship_targets_must_be_registered() {
    let fx = fixture_only(vec![ModelConfig::new("Author")]);
    assert!(fx.registry.model_config("Author").is_some());

    let err = Registry::builder()
        .model(ModelConfig::new("Book").relationship(Relationship::belongs_to("author")))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        Error::Relationship("'Author' must be a registered model".into())
    );
}
