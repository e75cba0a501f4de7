//! Bind values for collection statements.

use serde_json::Value;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::QueryScalar;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    /// Bound as JSONB.
    Json(Value),
    Text(String),
}

pub fn bind_scalar<'q, O>(
    query: QueryScalar<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    params.iter().fold(query, |q, p| match p {
        SqlParam::Uuid(u) => q.bind(*u),
        SqlParam::Json(v) => q.bind(v.clone()),
        SqlParam::Text(s) => q.bind(s.clone()),
    })
}
