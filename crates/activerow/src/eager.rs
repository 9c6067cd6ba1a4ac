//! Batched association loading for `include`.
//!
//! One query per included association, no matter how many owners: the
//! distinct owner keys are bound into a single `IN(?)` condition and the
//! results are handed back out by key. Each owner receives its own copies of
//! the matching records, and owners without matches get an empty value so
//! later reads do not fall back to lazy loading.

use std::collections::HashMap;
use std::sync::Arc;

use activerow_core::{Error, Result, Value, inflector};
use activerow_query::{Conditions, Include, Joins, conditions_from_underscored};

use crate::record::{Record, Related};
use crate::registry::Registry;
use crate::relationship::{Relationship, RelationshipKind};
use crate::table::Table;

/// Column carrying the owner key of a through association's rows.
const THROUGH_KEY: &str = "ar_through_key__";

/// Load `rel` for every record in `owners` with a single query, eager
/// loading `nested` on the results.
pub(crate) fn load_eagerly(
    rel: &Relationship,
    registry: &Arc<Registry>,
    table: &Table,
    owners: &mut [Record],
    nested: &[Include],
) -> Result<()> {
    let fk = rel.foreign_keys(&table.class_name);
    let pk = rel.primary_keys(registry, table)?;
    let first = |keys: &[String]| {
        keys.first().cloned().ok_or_else(|| {
            Error::Relationship(format!("Relationship {} has no key columns", rel.name))
        })
    };
    let (query_key, owner_key) = match rel.kind {
        RelationshipKind::BelongsTo => (first(&pk)?, inflector::variablize(&first(&fk)?)),
        _ => (first(&fk)?, first(&pk)?),
    };

    let mut seen = Vec::new();
    let mut keys = Vec::new();
    for owner in owners.iter() {
        let Some(value) = owner.attribute(&owner_key) else {
            continue;
        };
        if let Some(key) = value.match_key() {
            if !seen.contains(&key) {
                seen.push(key);
                keys.push(value.clone());
            }
        }
    }

    if keys.is_empty() {
        for owner in owners.iter_mut() {
            owner.set_relationship(&rel.name, rel.empty());
        }
        return Ok(());
    }

    let target_class = rel.target_class();
    let target = registry.table(&target_class)?;
    let conn = Arc::clone(target.conn());
    let through = rel.kind != RelationshipKind::BelongsTo && rel.through.is_some();

    let mut options = rel.finder_options();
    options.include = nested.to_vec();
    let key_condition = if through {
        let through_rel = rel.through_relationship(registry, &table.class_name)?;
        let through_table = registry.table(&through_rel.target_class())?;
        let through_key = format!(
            "{}.{}",
            through_table.fully_qualified_name(true),
            conn.quote_name(&query_key)
        );
        let select = options
            .select
            .clone()
            .unwrap_or_else(|| format!("{}.*", target.fully_qualified_name(true)));
        options.select = Some(format!("{select}, {through_key} AS {THROUGH_KEY}"));
        options.joins = Some(Joins::Raw(rel.through_join(registry, &table.class_name)?));
        Conditions::sql_with(format!("{through_key} IN(?)"), vec![Value::Array(keys)])
    } else {
        conditions_from_underscored(&conn, &query_key, &[Value::Array(keys)], None).ok_or_else(
            || Error::Relationship(format!("Relationship {} has no key columns", rel.name)),
        )?
    };
    options.conditions = Some(match options.conditions.take() {
        Some(declared) => declared.and(key_condition, Some(conn)),
        None => key_condition,
    });

    let related = registry.model(&target_class)?.all(options)?;

    let mut by_key: HashMap<String, Vec<Record>> = HashMap::new();
    for mut record in related {
        let key = if through {
            record.remove_attribute(THROUGH_KEY)
        } else {
            record.attribute(&query_key).cloned()
        };
        if let Some(key) = key.as_ref().and_then(Value::match_key) {
            by_key.entry(key).or_default().push(record);
        }
    }

    tracing::debug!(
        relationship = %rel.name,
        owners = owners.len(),
        matched = by_key.len(),
        "Eager loaded association"
    );

    for owner in owners.iter_mut() {
        let matches = owner
            .attribute(&owner_key)
            .and_then(Value::match_key)
            .and_then(|key| by_key.get(&key));
        let related = match (rel.is_poly(), matches) {
            (true, Some(records)) => Related::Many(records.clone()),
            (false, Some(records)) => Related::One(records.first().cloned().map(Box::new)),
            (_, None) => rel.empty(),
        };
        owner.set_relationship(&rel.name, related);
    }
    Ok(())
}
