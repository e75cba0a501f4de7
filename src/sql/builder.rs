//! Builds parameterized statements over one JSONB collection table per entity kind.
//!
//! Table names come from `EntityKind` only; every value is a bind parameter.

use super::params::SqlParam;
use crate::backend::{clamp_limit, Aggregate};
use crate::entity::EntityKind;
use crate::store::quote_ident;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Row projection: reserved keys first, document fields merged on top.
const ROW: &str = "jsonb_build_object('id', id, 'created_at', created_at, 'updated_at', updated_at) || doc";

/// Numeric value of the document field bound as `$1`; NULL when the value is not a JSON number.
const NUMERIC_FIELD: &str = "CASE WHEN jsonb_typeof(doc -> $1::text) = 'number' THEN (doc ->> $1::text)::float8 END";

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: SqlParam) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// ` WHERE doc @> $n` for non-empty filters. Scalars match exactly, arrays and objects by containment.
    fn push_filters(&mut self, filters: &[(String, Value)]) -> String {
        if filters.is_empty() {
            return String::new();
        }
        let contained: Map<String, Value> = filters.iter().cloned().collect();
        let n = self.push_param(SqlParam::Json(Value::Object(contained)));
        format!(" WHERE doc @> ${}", n)
    }
}

pub fn collection_table(kind: EntityKind) -> String {
    quote_ident(kind.collection())
}

/// DDL for one collection: table plus a created_at index for newest-first listing.
pub fn create_collection(kind: EntityKind) -> Vec<String> {
    let table = collection_table(kind);
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id UUID PRIMARY KEY, \
             doc JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(), \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            table
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (created_at DESC)",
            quote_ident(&format!("{}_created_at_idx", kind.collection())),
            table
        ),
    ]
}

pub fn insert(kind: EntityKind, id: Uuid, doc: Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_param = q.push_param(SqlParam::Uuid(id));
    let doc_param = q.push_param(SqlParam::Json(Value::Object(doc)));
    q.sql = format!(
        "INSERT INTO {} (id, doc) VALUES (${}, ${}) RETURNING {}",
        collection_table(kind),
        id_param,
        doc_param,
        ROW
    );
    q
}

pub fn select_by_id(kind: EntityKind, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(SqlParam::Uuid(id));
    q.sql = format!("SELECT {} FROM {} WHERE id = $1", ROW, collection_table(kind));
    q
}

/// Newest first, limit clamped to the store maximum.
pub fn select_list(kind: EntityKind, filters: &[(String, Value)], limit: Option<u32>, offset: Option<u32>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.push_filters(filters);
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY created_at DESC LIMIT {}{}",
        ROW,
        collection_table(kind),
        where_clause,
        clamp_limit(limit),
        offset_clause
    );
    q
}

/// Newest first, rows whose text `field` equals `value` ignoring case.
pub fn select_text_ignore_case(kind: EntityKind, field: &str, value: &str, limit: Option<u32>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let field_param = q.push_param(SqlParam::Text(field.to_string()));
    let value_param = q.push_param(SqlParam::Text(value.to_string()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE lower(doc ->> ${}::text) = lower(${}::text) ORDER BY created_at DESC LIMIT {}",
        ROW,
        collection_table(kind),
        field_param,
        value_param,
        clamp_limit(limit)
    );
    q
}

/// Shallow merge of `doc` into the stored document.
pub fn update(kind: EntityKind, id: Uuid, doc: Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(SqlParam::Uuid(id));
    q.push_param(SqlParam::Json(Value::Object(doc)));
    q.sql = format!(
        "UPDATE {} SET doc = doc || $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        collection_table(kind),
        ROW
    );
    q
}

pub fn delete(kind: EntityKind, id: Uuid) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(SqlParam::Uuid(id));
    q.sql = format!("DELETE FROM {} WHERE id = $1 RETURNING {}", collection_table(kind), ROW);
    q
}

pub fn count(kind: EntityKind, filters: &[(String, Value)]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.push_filters(filters);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", collection_table(kind), where_clause);
    q
}

/// Single JSONB value: a number, null for an empty average/min/max, or an object for `CountBy`.
pub fn aggregate(kind: EntityKind, op: &Aggregate) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(SqlParam::Text(op.field().to_string()));
    let table = collection_table(kind);
    q.sql = match op {
        Aggregate::Sum { .. } => format!("SELECT to_jsonb(COALESCE(SUM({}), 0)) FROM {}", NUMERIC_FIELD, table),
        Aggregate::Average { .. } => numeric_or_null("AVG", &table),
        Aggregate::Min { .. } => numeric_or_null("MIN", &table),
        Aggregate::Max { .. } => numeric_or_null("MAX", &table),
        Aggregate::CountBy { .. } => format!(
            "SELECT COALESCE(jsonb_object_agg(g.k, g.n), '{{}}'::jsonb) FROM \
             (SELECT COALESCE(doc ->> $1::text, 'null') AS k, COUNT(*) AS n FROM {} GROUP BY 1) g",
            table
        ),
    };
    q
}

fn numeric_or_null(func: &str, table: &str) -> String {
    format!(
        "SELECT COALESCE(to_jsonb({}({})), 'null'::jsonb) FROM {}",
        func, NUMERIC_FIELD, table
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_without_filters_has_no_where() {
        let q = select_list(EntityKind::Orders, &[], None, Some(20));
        assert_eq!(
            q.sql,
            format!(
                "SELECT {} FROM \"orders\" ORDER BY created_at DESC LIMIT 100 OFFSET 20",
                ROW
            )
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn filters_become_one_containment_param() {
        let filters = vec![
            ("status".to_string(), json!("open")),
            ("table".to_string(), json!(4)),
        ];
        let q = count(EntityKind::KitchenTickets, &filters);
        assert_eq!(q.sql, "SELECT COUNT(*) FROM \"kitchen_tickets\" WHERE doc @> $1");
        match &q.params[..] {
            [SqlParam::Json(v)] => assert_eq!(v, &json!({"status": "open", "table": 4})),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn text_match_folds_both_sides() {
        let q = select_text_ignore_case(EntityKind::Users, "email", "owner@taco.io", Some(1));
        assert!(q.sql.contains("WHERE lower(doc ->> $1::text) = lower($2::text)"));
        assert!(q.sql.ends_with("LIMIT 1"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn update_merges_document() {
        let q = update(EntityKind::MenuItems, Uuid::nil(), Map::new());
        assert!(q.sql.starts_with("UPDATE \"menu_items\" SET doc = doc || $2, updated_at = NOW() WHERE id = $1"));
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn aggregates_bind_field_name() {
        let q = aggregate(EntityKind::Orders, &Aggregate::Sum { field: "total".into() });
        assert!(q.sql.contains("COALESCE(SUM("));
        assert!(matches!(&q.params[..], [SqlParam::Text(f)] if f == "total"));
        let q = aggregate(EntityKind::Orders, &Aggregate::CountBy { field: "status".into() });
        assert!(q.sql.contains("jsonb_object_agg"));
    }

    #[test]
    fn collection_ddl_is_idempotent() {
        let ddl = create_collection(EntityKind::Inventory);
        assert_eq!(ddl.len(), 2);
        assert!(ddl.iter().all(|s| s.contains("IF NOT EXISTS")));
    }
}
