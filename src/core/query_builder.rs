//! SQL query builder
//!
//! Builds statements with positional `?` placeholders; values never end up in
//! the SQL text. Used by the helper functions and the finders.

use super::value::SqlValue;
use serde::Serialize;

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// Not equal to (!=)
    Ne,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// LIKE pattern matching
    Like,
    /// IS NULL
    IsNull,
    /// IS NOT NULL
    IsNotNull,
}

impl Operator {
    fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// One WHERE condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criteria {
    column: String,
    operator: Operator,
    value: Option<SqlValue>,
}

impl Criteria {
    /// Condition comparing `column` against a bound value
    ///
    /// Comparing with null turns `Eq`/`Ne` into `IS NULL`/`IS NOT NULL`.
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        let operator = match (operator, value.is_null()) {
            (Operator::Eq, true) => Operator::IsNull,
            (Operator::Ne, true) => Operator::IsNotNull,
            (operator, _) => operator,
        };
        let value = match operator {
            Operator::IsNull | Operator::IsNotNull => None,
            _ => Some(value),
        };
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// `column = value`
    pub fn equals(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(column, Operator::Eq, value)
    }

    /// `column != value`
    pub fn not_equals(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::new(column, Operator::Ne, value)
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Bound value, `None` for null checks
    pub fn value(&self) -> Option<&SqlValue> {
        self.value.as_ref()
    }

    fn to_sql(&self) -> String {
        match self.value {
            Some(_) => format!("{} {} ?", self.column, self.operator.as_sql()),
            None => format!("{} {}", self.column, self.operator.as_sql()),
        }
    }
}

/// ORDER BY direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrderDirection {
    /// Ascending order
    Asc,
    /// Descending order
    Desc,
}

impl OrderDirection {
    fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// ORDER BY clause entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub parameters: Vec<SqlValue>,
}

fn where_clause(criteria: &[Criteria]) -> String {
    if criteria.is_empty() {
        return String::new();
    }
    let conditions: Vec<String> = criteria.iter().map(Criteria::to_sql).collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

fn criteria_params(criteria: &[Criteria]) -> impl Iterator<Item = SqlValue> + '_ {
    criteria.iter().filter_map(|c| c.value.clone())
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    criteria: Vec<Criteria>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl SelectBuilder {
    /// Create a new SELECT query builder
    ///
    /// # Example
    ///
    /// ```
    /// use service_bus_storage::core::query_builder::{Criteria, SelectBuilder};
    ///
    /// let query = SelectBuilder::new("users")
    ///     .columns(&["id", "name"])
    ///     .where_criteria(Criteria::equals("id", 1))
    ///     .compile();
    ///
    /// assert_eq!(query.sql, "SELECT id, name FROM users WHERE id = ?");
    /// ```
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: vec!["*".to_string()],
            criteria: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Select specific columns
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a WHERE condition, conditions are joined with AND
    #[must_use]
    pub fn where_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    /// Add several WHERE conditions
    #[must_use]
    pub fn where_all(mut self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.criteria.extend(criteria);
        self
    }

    /// Add ORDER BY clause
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    /// Add several ORDER BY clauses
    #[must_use]
    pub fn order_by_all(mut self, order_by: impl IntoIterator<Item = OrderBy>) -> Self {
        self.order_by.extend(order_by);
        self
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add OFFSET clause
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        sql.push_str(&where_clause(&self.criteria));

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", clauses.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<SqlValue> {
        criteria_params(&self.criteria).collect()
    }

    /// SQL text together with its parameters
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery {
            sql: self.build(),
            parameters: self.params(),
        }
    }
}

/// INSERT query builder
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    values: Vec<SqlValue>,
    returning: Vec<String>,
}

impl InsertBuilder {
    /// Create a new INSERT query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    /// Add a column-value pair
    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Add a RETURNING clause
    #[must_use]
    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.returning = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let placeholders = vec!["?"; self.values.len()];
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders.join(", ")
        );
        if !self.returning.is_empty() {
            sql.push_str(&format!(" RETURNING {}", self.returning.join(", ")));
        }
        sql
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<SqlValue> {
        self.values.clone()
    }

    /// SQL text together with its parameters
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery {
            sql: self.build(),
            parameters: self.params(),
        }
    }
}

/// UPDATE query builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set_columns: Vec<String>,
    set_values: Vec<SqlValue>,
    criteria: Vec<Criteria>,
}

impl UpdateBuilder {
    /// Create a new UPDATE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set_columns: Vec::new(),
            set_values: Vec::new(),
            criteria: Vec::new(),
        }
    }

    /// Set a column value
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.set_columns.push(column.to_string());
        self.set_values.push(value.into());
        self
    }

    /// Add a WHERE condition
    #[must_use]
    pub fn where_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let set_clauses: Vec<String> = self
            .set_columns
            .iter()
            .map(|col| format!("{} = ?", col))
            .collect();

        format!(
            "UPDATE {} SET {}{}",
            self.table,
            set_clauses.join(", "),
            where_clause(&self.criteria)
        )
    }

    /// Get the parameter values (SET values followed by WHERE values)
    pub fn params(&self) -> Vec<SqlValue> {
        let mut params = self.set_values.clone();
        params.extend(criteria_params(&self.criteria));
        params
    }

    /// SQL text together with its parameters
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery {
            sql: self.build(),
            parameters: self.params(),
        }
    }
}

/// DELETE query builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    criteria: Vec<Criteria>,
}

impl DeleteBuilder {
    /// Create a new DELETE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            criteria: Vec::new(),
        }
    }

    /// Add a WHERE condition
    #[must_use]
    pub fn where_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria.push(criteria);
        self
    }

    /// Add several WHERE conditions
    #[must_use]
    pub fn where_all(mut self, criteria: impl IntoIterator<Item = Criteria>) -> Self {
        self.criteria.extend(criteria);
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        format!("DELETE FROM {}{}", self.table, where_clause(&self.criteria))
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<SqlValue> {
        criteria_params(&self.criteria).collect()
    }

    /// SQL text together with its parameters
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery {
            sql: self.build(),
            parameters: self.params(),
        }
    }
}
