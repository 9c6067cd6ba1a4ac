//! Shared fixtures: a scripted connection with the authors/books and
//! venues/events/hosts schemas, and a registry describing their models.

#![allow(dead_code)]

use std::sync::Arc;

use activerow::prelude::*;
use activerow::{Column, MockConnection};

pub struct Fixture {
    pub conn: Arc<MockConnection>,
    pub registry: Arc<Registry>,
}

impl Fixture {
    pub fn model(&self, class: &str) -> Model {
        self.registry.model(class).unwrap()
    }

    /// Hydrate one `class` record from `row` through a scripted find.
    pub fn load(&self, class: &str, row: Row) -> Record {
        let id = row.get("id").cloned().unwrap_or_default();
        self.conn.push_rows(vec![row]);
        let record = self
            .model(class)
            .find(Find::Id(id), FindOptions::new())
            .unwrap()
            .into_one()
            .unwrap();
        self.conn.clear_log();
        record
    }
}

fn id() -> Column {
    Column::new("id", "int").primary_key().auto_increment()
}

pub fn connection() -> Arc<MockConnection> {
    Arc::new(
        MockConnection::default()
            .with_table(
                "authors",
                vec![
                    id(),
                    Column::new("parent_author_id", "int"),
                    Column::new("name", "varchar(25)").default_value("default_name"),
                    Column::new("encrypted_password", "varchar(50)"),
                    Column::new("created_at", "datetime"),
                    Column::new("updated_at", "datetime"),
                ],
            )
            .with_table(
                "books",
                vec![
                    id(),
                    Column::new("author_id", "int"),
                    Column::new("name", "varchar(50)"),
                    Column::new("special", "decimal(10,2)"),
                ],
            )
            .with_table(
                "venues",
                vec![
                    id(),
                    Column::new("name", "varchar(50)"),
                    Column::new("city", "varchar(60)"),
                    Column::new("state", "char(2)"),
                    Column::new("address", "varchar(50)"),
                    Column::new("phone", "varchar(10)"),
                ],
            )
            .with_table(
                "events",
                vec![
                    id(),
                    Column::new("venue_id", "int"),
                    Column::new("host_id", "int"),
                    Column::new("title", "varchar(60)"),
                    Column::new("description", "varchar(50)"),
                ],
            )
            .with_table("hosts", vec![id(), Column::new("name", "varchar(25)")]),
    )
}

pub fn models() -> Vec<ModelConfig> {
    vec![
        ModelConfig::new("Author")
            .relationship(Relationship::has_many("books"))
            .relationship(
                Relationship::has_one("parent_author")
                    .class_name("Author")
                    .foreign_key("parent_author_id"),
            )
            .protected(["encrypted_password"]),
        ModelConfig::new("Book").relationship(Relationship::belongs_to("author")),
        ModelConfig::new("Venue")
            .relationship(Relationship::has_many("events").order("id asc"))
            .relationship(Relationship::has_many("hosts").through("events"))
            .alias("marquee", "name")
            .alias("mycity", "city"),
        ModelConfig::new("Event")
            .relationship(Relationship::belongs_to("venue"))
            .relationship(Relationship::belongs_to("host"))
            .delegate(Delegate::new("venue", ["state", "address"]))
            .delegate(Delegate::new("host", ["name"]).prefix("woot")),
        ModelConfig::new("Host")
            .relationship(Relationship::has_many("events"))
            .relationship(Relationship::has_many("venues").through("events")),
    ]
}

/// Fixture with the standard models plus `extra`.
pub fn fixture_with(extra: Vec<ModelConfig>) -> Fixture {
    let conn = connection();
    let mut builder = Registry::builder().connection("development", conn.clone());
    for model in models().into_iter().chain(extra) {
        builder = builder.model(model);
    }
    Fixture {
        registry: builder.build().unwrap(),
        conn,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(Vec::new())
}

/// Fixture whose models are all replaced by `models`.
pub fn fixture_only(models: Vec<ModelConfig>) -> Fixture {
    let conn = connection();
    let mut builder = Registry::builder().connection("development", conn.clone());
    for model in models {
        builder = builder.model(model);
    }
    Fixture {
        registry: builder.build().unwrap(),
        conn,
    }
}
