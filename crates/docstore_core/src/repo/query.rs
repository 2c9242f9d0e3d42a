//! Composable predicates and queries compiled to SQL.
//!
//! # Invariants
//! - Predicates never embed values in SQL text; every value is bound.
//! - Case-insensitive predicates fold both sides with the connection's
//!   Unicode `fold_case`, not SQLite's ASCII-only `NOCASE`/`LIKE` folding.
//! - `contains` treats `%`, `_` and `\` in the needle literally.

use crate::db::FOLD_CASE_FUNCTION;
use crate::model::entity::EntityField;
use rusqlite::types::Value;
use std::ops::Not;

/// Comparison operator for [`Predicate::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }
}

/// Boolean expression over entity fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<F> {
    /// Use [`Predicate::IsNull`] for NULL checks; `= NULL` never matches.
    Compare { field: F, op: CompareOp, value: Value },
    EqIgnoreCase { field: F, value: String },
    Contains { field: F, needle: String },
    /// Matches when any element of a JSON array column contains `needle`.
    AnyElementContains { field: F, needle: String },
    IsNull(F),
    /// Empty `And` matches everything.
    And(Vec<Predicate<F>>),
    /// Empty `Or` matches nothing.
    Or(Vec<Predicate<F>>),
    Not(Box<Predicate<F>>),
}

impl<F: EntityField> Predicate<F> {
    pub fn compare(field: F, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field,
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn lt(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: F, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn eq_ignore_case(field: F, value: impl Into<String>) -> Self {
        Self::EqIgnoreCase {
            field,
            value: value.into(),
        }
    }

    pub fn contains(field: F, needle: impl Into<String>) -> Self {
        Self::Contains {
            field,
            needle: needle.into(),
        }
    }

    pub fn any_element_contains(field: F, needle: impl Into<String>) -> Self {
        Self::AnyElementContains {
            field,
            needle: needle.into(),
        }
    }

    pub fn is_null(field: F) -> Self {
        Self::IsNull(field)
    }

    /// Conjunction, flattening nested `And`s.
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction, flattening nested `Or`s.
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Appends this predicate as SQL to `sql`, pushing bound values in order.
    pub(crate) fn write_sql(&self, sql: &mut String, binds: &mut Vec<Value>) {
        match self {
            Self::Compare { field, op, value } => {
                sql.push_str(field.column());
                sql.push(' ');
                sql.push_str(op.as_sql());
                sql.push_str(" ?");
                binds.push(value.clone());
            }
            Self::EqIgnoreCase { field, value } => {
                push_folded(sql, field.column());
                sql.push_str(" = ");
                push_folded(sql, "?");
                binds.push(Value::Text(value.clone()));
            }
            Self::Contains { field, needle } => {
                push_folded(sql, field.column());
                sql.push_str(" LIKE ");
                push_folded(sql, "?");
                sql.push_str(" ESCAPE '\\'");
                binds.push(Value::Text(like_pattern(needle)));
            }
            Self::AnyElementContains { field, needle } => {
                sql.push_str("EXISTS (SELECT 1 FROM json_each(");
                sql.push_str(field.column());
                sql.push_str(") WHERE ");
                push_folded(sql, "json_each.value");
                sql.push_str(" LIKE ");
                push_folded(sql, "?");
                sql.push_str(" ESCAPE '\\')");
                binds.push(Value::Text(like_pattern(needle)));
            }
            Self::IsNull(field) => {
                sql.push_str(field.column());
                sql.push_str(" IS NULL");
            }
            Self::And(parts) => write_joined(parts, " AND ", "1 = 1", sql, binds),
            Self::Or(parts) => write_joined(parts, " OR ", "1 = 0", sql, binds),
            Self::Not(inner) => {
                sql.push_str("NOT (");
                inner.write_sql(sql, binds);
                sql.push(')');
            }
        }
    }
}

impl<F> Not for Predicate<F> {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::Not(Box::new(self))
    }
}

fn write_joined<F: EntityField>(
    parts: &[Predicate<F>],
    separator: &str,
    empty: &str,
    sql: &mut String,
    binds: &mut Vec<Value>,
) {
    if parts.is_empty() {
        sql.push_str(empty);
        return;
    }

    sql.push('(');
    for (index, part) in parts.iter().enumerate() {
        if index > 0 {
            sql.push_str(separator);
        }
        part.write_sql(sql, binds);
    }
    sql.push(')');
}

/// Wraps `expr` in the Unicode case fold registered by [`crate::db::open_db`].
fn push_folded(sql: &mut String, expr: &str) {
    sql.push_str(FOLD_CASE_FUNCTION);
    sql.push('(');
    sql.push_str(expr);
    sql.push(')');
}

fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Sort direction for [`Query::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Composed read: filter, ordering, limit and deleted-row visibility.
#[derive(Debug, Clone, PartialEq)]
pub struct Query<F> {
    pub filter: Option<Predicate<F>>,
    pub order_by: Vec<(F, SortOrder)>,
    pub limit: Option<u32>,
    /// Opt-in for restore/admin flows; off for every standard read.
    pub include_deleted: bool,
}

impl<F> Default for Query<F> {
    fn default() -> Self {
        Self {
            filter: None,
            order_by: Vec::new(),
            limit: None,
            include_deleted: false,
        }
    }
}

impl<F: EntityField> Query<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, predicate: Predicate<F>) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn order_by(mut self, field: F, order: SortOrder) -> Self {
        self.order_by.push((field, order));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Appends `WHERE`/`ORDER BY`/`LIMIT` clauses for a single-table select.
    ///
    /// Ties in the requested ordering fall back to `rowid` in the direction
    /// of the last sort key, i.e. insertion order.
    pub(crate) fn write_clauses(&self, sql: &mut String, binds: &mut Vec<Value>) {
        sql.push_str(" WHERE 1 = 1");
        if !self.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if let Some(filter) = self.filter.as_ref() {
            sql.push_str(" AND ");
            filter.write_sql(sql, binds);
        }

        sql.push_str(" ORDER BY ");
        for (field, order) in &self.order_by {
            sql.push_str(field.column());
            sql.push(' ');
            sql.push_str(order.as_sql());
            sql.push_str(", ");
        }
        let tie_break = self
            .order_by
            .last()
            .map_or(SortOrder::Asc, |(_, order)| *order);
        sql.push_str("rowid ");
        sql.push_str(tie_break.as_sql());

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(i64::from(limit)));
        }
    }
}
