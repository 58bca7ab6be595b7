//! Helpers layered on [`QueryExecutor`] and [`ResultSet`]

use super::error::{Result, StorageError};
use super::executor::{BinaryDataDecoder, QueryExecutor};
use super::query_builder::{
    CompiledQuery, Criteria, DeleteBuilder, InsertBuilder, OrderBy, SelectBuilder, UpdateBuilder,
};
use super::result_set::ResultSet;
use super::value::{Row, SqlValue};
use serde::Serialize;
use tracing::debug;

/// Collect every remaining row
///
/// # Errors
///
/// Propagates iteration failures.
pub async fn fetch_all(mut result_set: ResultSet) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    while result_set.advance().await? {
        if let Some(row) = result_set.take_current() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Read a result that holds at most one row
///
/// # Errors
///
/// Returns [`StorageError::OneResultExpected`] when several rows come back.
pub async fn fetch_one(result_set: ResultSet) -> Result<Option<Row>> {
    let mut rows = fetch_all(result_set).await?;
    match rows.len() {
        0 | 1 => Ok(rows.pop()),
        count => Err(StorageError::OneResultExpected { count }),
    }
}

/// Next value of a PostgreSQL sequence
///
/// # Errors
///
/// Returns the normalized execution error, or `StorageInteractingFailed` when
/// the sequence yields nothing.
pub async fn sequence<E>(executor: &E, name: &str) -> Result<String>
where
    E: QueryExecutor + ?Sized,
{
    let result = executor
        .execute(&format!("SELECT nextval('{}')", name), &[])
        .await?;

    fetch_one(result)
        .await?
        .and_then(|row| row.first().and_then(SqlValue::to_text))
        .ok_or_else(|| {
            StorageError::storage_interacting(format!("Sequence \"{}\" returned no value", name))
        })
}

/// SELECT rows of `table` matching all `criteria`
///
/// # Errors
///
/// Returns the normalized execution error.
pub async fn find<E>(
    executor: &E,
    table: &str,
    criteria: &[Criteria],
    limit: Option<usize>,
    order_by: &[OrderBy],
) -> Result<ResultSet>
where
    E: QueryExecutor + ?Sized,
{
    let mut select = select_query(table);
    if let Some(limit) = limit {
        select = select.limit(limit);
    }
    let query = build_query(select, criteria, order_by);

    executor.execute(&query.sql, &query.parameters).await
}

/// DELETE rows of `table` matching all `criteria`, returning the count
///
/// # Errors
///
/// Returns the normalized execution error.
pub async fn remove<E>(executor: &E, table: &str, criteria: &[Criteria]) -> Result<u64>
where
    E: QueryExecutor + ?Sized,
{
    let query = delete_query(table).where_all(criteria.iter().cloned()).compile();
    let result = executor.execute(&query.sql, &query.parameters).await?;
    Ok(result.affected_rows())
}

/// Apply criteria and ordering to a SELECT
pub fn build_query(select: SelectBuilder, criteria: &[Criteria], order_by: &[OrderBy]) -> CompiledQuery {
    select
        .where_all(criteria.iter().cloned())
        .order_by_all(order_by.iter().cloned())
        .compile()
}

/// `field = value`
pub fn equals_criteria(field: &str, value: impl Into<SqlValue>) -> Criteria {
    Criteria::equals(field, value)
}

/// `field != value`
pub fn not_equals_criteria(field: &str, value: impl Into<SqlValue>) -> Criteria {
    Criteria::not_equals(field, value)
}

/// Start a SELECT on `table`
pub fn select_query(table: &str) -> SelectBuilder {
    SelectBuilder::new(table)
}

/// Start a DELETE on `table`
pub fn delete_query(table: &str) -> DeleteBuilder {
    DeleteBuilder::new(table)
}

/// INSERT the fields of `object` into `table`
///
/// # Errors
///
/// Returns [`StorageError::IncorrectParameterCast`] if `object` is not a flat
/// struct or map of scalars.
pub fn insert_query<T: Serialize>(table: &str, object: &T) -> Result<InsertBuilder> {
    Ok(cast_object_to_columns(object)?
        .into_iter()
        .fold(InsertBuilder::new(table), |builder, (column, value)| {
            builder.value(&column, value)
        }))
}

/// UPDATE `table` setting the fields of `object`
///
/// # Errors
///
/// Returns [`StorageError::IncorrectParameterCast`] if `object` is not a flat
/// struct or map of scalars.
pub fn update_query<T: Serialize>(table: &str, object: &T) -> Result<UpdateBuilder> {
    Ok(cast_object_to_columns(object)?
        .into_iter()
        .fold(UpdateBuilder::new(table), |builder, (column, value)| {
            builder.set(&column, value)
        }))
}

/// Flatten a serializable object into snake_case columns
///
/// # Errors
///
/// Returns [`StorageError::IncorrectParameterCast`] for non-object input or
/// nested structures.
pub fn cast_object_to_columns<T: Serialize>(object: &T) -> Result<Vec<(String, SqlValue)>> {
    match serde_json::to_value(object)? {
        serde_json::Value::Object(fields) => fields
            .into_iter()
            .map(|(name, value)| Ok((to_snake_case(&name), SqlValue::try_from(value)?)))
            .collect(),
        other => Err(StorageError::incorrect_parameter_cast(format!(
            "\"{}\" can't be mapped to table columns",
            other
        ))),
    }
}

/// `createdAt` -> `created_at`
pub fn to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake
}

/// Decode every non-empty text field of `row`
///
/// Binary fields already hold the stored bytes and are left as they are.
pub fn unescape_binary_row(decoder: &dyn BinaryDataDecoder, row: Row) -> Row {
    row.map_values(|value| match value {
        SqlValue::String(text) if !text.is_empty() => {
            match String::from_utf8(decoder.unescape_binary(text.as_bytes())) {
                Ok(decoded) => SqlValue::String(decoded),
                Err(err) => SqlValue::Bytes(err.into_bytes()),
            }
        }
        other => other,
    })
}

/// Log a statement before it runs
pub(crate) fn log_statement(sql: &str, params: &[SqlValue]) {
    debug!(sql, ?params, "executing statement");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::binary::decode_bytea;
    use serde::Serialize;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Customer {
        id: i64,
        first_name: String,
        email_address: Option<String>,
    }

    #[derive(Serialize)]
    struct Order {
        id: i64,
        lines: Vec<i64>,
    }

    struct Bytea;

    impl BinaryDataDecoder for Bytea {
        fn unescape_binary(&self, payload: &[u8]) -> Vec<u8> {
            decode_bytea(payload)
        }
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("createdAt"), "created_at");
        assert_eq!(to_snake_case("someLongFieldName"), "some_long_field_name");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Id"), "id");
    }

    #[test]
    fn test_insert_query_from_object() {
        let customer = Customer {
            id: 7,
            first_name: "Ada".to_string(),
            email_address: None,
        };

        let query = insert_query("customer", &customer).unwrap().compile();

        assert!(query.sql.starts_with("INSERT INTO customer ("));
        assert!(query.sql.contains("first_name"));
        assert!(query.sql.contains("email_address"));
        assert_eq!(query.parameters.len(), 3);
        assert!(query.parameters.contains(&SqlValue::Null));
    }

    #[test]
    fn test_update_query_from_object() {
        let customer = Customer {
            id: 7,
            first_name: "Ada".to_string(),
            email_address: Some("ada@example.com".to_string()),
        };

        let query = update_query("customer", &customer)
            .unwrap()
            .where_criteria(equals_criteria("id", 7))
            .compile();

        assert!(query.sql.starts_with("UPDATE customer SET "));
        assert!(query.sql.ends_with(" WHERE id = ?"));
        assert_eq!(query.parameters.len(), 4);
    }

    #[test]
    fn test_nested_structures_are_rejected() {
        let order = Order {
            id: 1,
            lines: vec![1, 2],
        };
        let err = insert_query("orders", &order).unwrap_err();
        assert!(matches!(err, StorageError::IncorrectParameterCast(_)));

        let err = cast_object_to_columns(&"scalar").unwrap_err();
        assert!(matches!(err, StorageError::IncorrectParameterCast(_)));
    }

    #[test]
    fn test_build_query() {
        let query = build_query(
            select_query("test_table").limit(5),
            &[
                equals_criteria("key", "value"),
                not_equals_criteria("state", "closed"),
            ],
            &[OrderBy::asc("key")],
        );

        assert_eq!(
            query.sql,
            "SELECT * FROM test_table WHERE key = ? AND state != ? ORDER BY key ASC LIMIT 5"
        );
        assert_eq!(query.parameters.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_one_variants() {
        let none = fetch_one(ResultSet::buffered(Vec::new(), 0, None)).await.unwrap();
        assert!(none.is_none());

        let one = fetch_one(ResultSet::buffered(vec![Row::new().with("id", 1)], 0, None))
            .await
            .unwrap();
        assert_eq!(one.and_then(|r| r.get("id").cloned()), Some(SqlValue::Long(1)));

        let err = fetch_one(ResultSet::buffered(
            vec![Row::new().with("id", 1), Row::new().with("id", 2)],
            0,
            None,
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, StorageError::OneResultExpected { count: 2 }));
        assert!(err.to_string().contains("\"2\""));
    }

    #[tokio::test]
    async fn test_fetch_all_on_command_result() {
        let rows = fetch_all(ResultSet::command(4)).await.unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_unescape_binary_row() {
        let row = Row::new()
            .with("hash", r"\x6869")
            .with("empty", "")
            .with("id", 10);

        let row = unescape_binary_row(&Bytea, row);

        assert_eq!(row.get("hash"), Some(&SqlValue::from("hi")));
        assert_eq!(row.get("empty"), Some(&SqlValue::from("")));
        assert_eq!(row.get("id"), Some(&SqlValue::Long(10)));
    }

    #[test]
    fn test_unescape_binary_row_keeps_raw_bytes() {
        let row = Row::new()
            .with("hex_like", SqlValue::Bytes(br"h69".to_vec()))
            .with("backslashes", SqlValue::Bytes(br"a\b".to_vec()))
            .with("escaped", r"a\b");

        let row = unescape_binary_row(&Bytea, row);

        assert_eq!(row.get("hex_like"), Some(&SqlValue::Bytes(br"h69".to_vec())));
        assert_eq!(row.get("backslashes"), Some(&SqlValue::Bytes(br"a\b".to_vec())));
        assert_eq!(row.get("escaped"), Some(&SqlValue::from(r"a")));
    }
}
