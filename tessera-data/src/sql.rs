//! Rendering of plans and row changes as parameterized SQL.
//!
//! Plans fold into a single `SELECT` where the stages allow it and nest as
//! subqueries where they don't (filtering or ordering after a projection or
//! a page, projecting twice, joining).

use std::fmt;

use crate::entity::Table;
use crate::error::DataError;
use crate::expr::{BinaryOp, Expr, OrderKey};
use crate::plan::{JoinKind, Plan, Source, Stage};
use crate::record::Record;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Generic SQL using `?` placeholders (default).
    #[default]
    Generic,
    /// SQLite-style `?` placeholders.
    Sqlite,
    /// MySQL-style `?` placeholders with backtick quoting.
    MySql,
    /// Postgres-style `$1, $2, ...` placeholders.
    Postgres,
}

impl Dialect {
    fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Generic | Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    fn quote_char(self) -> char {
        match self {
            Dialect::MySql => '`',
            Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => '"',
        }
    }

    /// `LIMIT` clause standing for "no limit" when only an offset is set.
    fn unbounded_limit(self) -> Option<&'static str> {
        match self {
            Dialect::Sqlite => Some(" LIMIT -1"),
            Dialect::MySql => Some(" LIMIT 18446744073709551615"),
            Dialect::Generic | Dialect::Postgres => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdentifierPolicy {
    /// Validate identifiers against a conservative pattern.
    Validate,
    /// Validate and quote identifiers using the dialect quoting style.
    #[default]
    Quote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidIdentifier { kind: &'static str, ident: String },
    /// The plan contains something SQL cannot express.
    Unrenderable(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidIdentifier { kind, ident } => {
                write!(f, "Invalid {kind} identifier: {ident}")
            }
            QueryError::Unrenderable(msg) => write!(f, "Cannot render as SQL: {msg}"),
        }
    }
}

impl std::error::Error for QueryError {}

/// SQL text with its bind values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub binds: Vec<Value>,
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

enum FromClause {
    Table(&'static str),
    Subquery(Box<Select>, String),
    Join {
        kind: JoinKind,
        left: Box<Select>,
        left_alias: String,
        right: Box<Select>,
        right_alias: String,
        left_key: String,
        right_key: String,
    },
}

enum Item {
    Star(Option<String>),
    Column(String),
    Expr { expr: Expr, alias: String },
}

struct Select {
    items: Vec<Item>,
    from: FromClause,
    filters: Vec<Expr>,
    order: Vec<OrderKey>,
    offset: u64,
    limit: Option<u64>,
    /// Output differs from the `FROM` columns; later stages must nest.
    projected: bool,
}

impl Select {
    fn new(from: FromClause, items: Vec<Item>) -> Self {
        Select {
            items,
            from,
            filters: Vec::new(),
            order: Vec::new(),
            offset: 0,
            limit: None,
            projected: false,
        }
    }

    fn paginated(&self) -> bool {
        self.offset > 0 || self.limit.is_some()
    }

    fn is_plain(&self) -> bool {
        !self.projected && !self.paginated()
    }

    /// Name that qualifies columns of the `FROM` clause.
    fn scope(&self) -> Option<String> {
        match &self.from {
            FromClause::Table(name) => Some(name.to_string()),
            FromClause::Subquery(_, alias) => Some(alias.clone()),
            FromClause::Join { .. } => None,
        }
    }
}

/// Renders plans and row changes for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlRenderer {
    dialect: Dialect,
    identifier_policy: IdentifierPolicy,
}

struct Writer {
    sql: String,
    binds: Vec<Value>,
    dialect: Dialect,
}

impl Writer {
    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: Value) {
        self.binds.push(value);
        let placeholder = self.dialect.placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
    }

    fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            binds: self.binds,
        }
    }
}

impl SqlRenderer {
    pub fn new(dialect: Dialect) -> Self {
        SqlRenderer {
            dialect,
            identifier_policy: IdentifierPolicy::Quote,
        }
    }

    pub fn identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.identifier_policy = policy;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn writer(&self) -> Writer {
        Writer {
            sql: String::new(),
            binds: Vec::new(),
            dialect: self.dialect,
        }
    }

    /// Render a store-rooted plan as one `SELECT`.
    pub fn select(&self, plan: &Plan) -> Result<SqlStatement, DataError> {
        let select = self.build(plan, &mut 0)?;
        let mut w = self.writer();
        self.write_select(&select, &mut w)?;
        Ok(w.finish())
    }

    /// Render `SELECT COUNT(*)` over the rows of a plan.
    pub fn count(&self, plan: &Plan) -> Result<SqlStatement, DataError> {
        let select = self.build(plan, &mut 0)?;
        let mut w = self.writer();
        w.push("SELECT COUNT(*) FROM ");
        if select.is_plain() {
            self.write_from(&select.from, &mut w)?;
            self.write_where(&select.filters, &mut w)?;
        } else {
            w.push("(");
            self.write_select(&select, &mut w)?;
            w.push(") AS ");
            w.push(&self.ident("t_count", "alias")?);
        }
        Ok(w.finish())
    }

    pub fn insert(&self, table: &Table, record: &Record) -> Result<SqlStatement, DataError> {
        let mut w = self.writer();
        w.push(&format!("INSERT INTO {} (", self.ident(table.name, "table")?));
        let columns = record
            .names()
            .map(|name| self.ident(name, "column"))
            .collect::<Result<Vec<_>, _>>()?;
        w.push(&columns.join(", "));
        w.push(") VALUES (");
        for (i, (_, value)) in record.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.bind(value.clone());
        }
        w.push(")");
        Ok(w.finish())
    }

    /// `UPDATE` the given fields of one row. The key column is never assigned.
    pub fn update(
        &self,
        table: &Table,
        key: i64,
        changes: &Record,
    ) -> Result<SqlStatement, DataError> {
        let mut w = self.writer();
        w.push(&format!("UPDATE {} SET ", self.ident(table.name, "table")?));
        let mut first = true;
        for (name, value) in changes.iter().filter(|(name, _)| *name != table.key) {
            if !first {
                w.push(", ");
            }
            first = false;
            w.push(&format!("{} = ", self.ident(name, "column")?));
            w.bind(value.clone());
        }
        if first {
            return Err(QueryError::Unrenderable(format!(
                "update of `{}` with no fields",
                table.name
            ))
            .into());
        }
        w.push(&format!(" WHERE {} = ", self.ident(table.key, "column")?));
        w.bind(Value::I64(key));
        Ok(w.finish())
    }

    pub fn delete(&self, table: &Table, key: i64) -> Result<SqlStatement, DataError> {
        let mut w = self.writer();
        w.push(&format!(
            "DELETE FROM {} WHERE {} = ",
            self.ident(table.name, "table")?,
            self.ident(table.key, "column")?
        ));
        w.bind(Value::I64(key));
        Ok(w.finish())
    }

    fn build(&self, plan: &Plan, aliases: &mut usize) -> Result<Select, DataError> {
        let table = match plan.source() {
            Source::Table(table) => table,
            Source::Rows(_) => {
                return Err(QueryError::Unrenderable("in-memory rows".into()).into());
            }
        };
        let items = table
            .columns
            .iter()
            .map(|c| Item::Column(c.to_string()))
            .collect();
        let mut select = Select::new(FromClause::Table(table.name), items);

        for stage in plan.stages() {
            select = match stage {
                Stage::Filter(predicate) => {
                    let mut select = if select.is_plain() {
                        select
                    } else {
                        nest(select, aliases)
                    };
                    select.filters.push(predicate.clone());
                    select
                }
                Stage::Project(projection) => {
                    let mut select = if select.projected {
                        nest(select, aliases)
                    } else {
                        select
                    };
                    // Output aliases may shadow source columns in ORDER BY.
                    if let Some(scope) = select.scope() {
                        select.order = select
                            .order
                            .iter()
                            .map(|key| OrderKey {
                                expr: qualify(&key.expr, &scope),
                                descending: key.descending,
                            })
                            .collect();
                    }
                    select.items = projection
                        .fields()
                        .iter()
                        .map(|(name, expr)| Item::Expr {
                            expr: expr.clone(),
                            alias: name.clone(),
                        })
                        .collect();
                    select.projected = true;
                    select
                }
                Stage::OrderBy(keys) => {
                    let mut select = if select.is_plain() {
                        select
                    } else {
                        nest(select, aliases)
                    };
                    let mut order = keys.clone();
                    order.append(&mut select.order);
                    select.order = order;
                    select
                }
                Stage::Skip(n) => {
                    select.offset = select.offset.saturating_add(*n);
                    select.limit = select.limit.map(|limit| limit.saturating_sub(*n));
                    select
                }
                Stage::Take(n) => {
                    select.limit = Some(select.limit.map_or(*n, |limit| limit.min(*n)));
                    select
                }
                Stage::Join(join) => {
                    let right_columns = join.right.columns().ok_or_else(|| {
                        QueryError::Unrenderable("join input with unknown columns".into())
                    })?;
                    let right = self.build(&join.right, aliases)?;
                    *aliases += 1;
                    let left_alias = format!("l{aliases}");
                    let right_alias = format!("r{aliases}");
                    let mut items = vec![Item::Star(Some(left_alias.clone()))];
                    items.extend(right_columns.iter().map(|c| Item::Expr {
                        expr: Expr::column(&format!("{right_alias}.{c}")),
                        alias: format!("{}{c}", join.prefix),
                    }));
                    let mut joined = Select::new(
                        FromClause::Join {
                            kind: join.kind,
                            left: Box::new(select),
                            left_alias,
                            right: Box::new(right),
                            right_alias,
                            left_key: join.left_key.clone(),
                            right_key: join.right_key.clone(),
                        },
                        items,
                    );
                    joined.projected = true;
                    joined
                }
            };
        }
        Ok(select)
    }

    fn write_select(&self, select: &Select, w: &mut Writer) -> Result<(), DataError> {
        w.push("SELECT ");
        for (i, item) in select.items.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match item {
                Item::Star(None) => w.push("*"),
                Item::Star(Some(alias)) => {
                    w.push(&self.ident(alias, "alias")?);
                    w.push(".*");
                }
                Item::Column(name) => w.push(&self.ident(name, "column")?),
                Item::Expr { expr, alias } => {
                    match expr {
                        Expr::Column(name) if name == alias => {
                            w.push(&self.ident(name, "column")?);
                            continue;
                        }
                        _ => self.write_expr(expr, false, w)?,
                    }
                    w.push(" AS ");
                    w.push(&self.ident(alias, "alias")?);
                }
            }
        }
        w.push(" FROM ");
        self.write_from(&select.from, w)?;
        self.write_where(&select.filters, w)?;
        if !select.order.is_empty() {
            w.push(" ORDER BY ");
            for (i, key) in select.order.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                self.write_expr(&key.expr, false, w)?;
                w.push(if key.descending { " DESC" } else { " ASC" });
            }
        }
        match (select.limit, select.offset) {
            (Some(limit), 0) => w.push(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => w.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (None, 0) => {}
            (None, offset) => {
                if let Some(unbounded) = self.dialect.unbounded_limit() {
                    w.push(unbounded);
                }
                w.push(&format!(" OFFSET {offset}"));
            }
        }
        Ok(())
    }

    fn write_from(&self, from: &FromClause, w: &mut Writer) -> Result<(), DataError> {
        match from {
            FromClause::Table(name) => w.push(&self.ident(name, "table")?),
            FromClause::Subquery(inner, alias) => {
                w.push("(");
                self.write_select(inner, w)?;
                w.push(") AS ");
                w.push(&self.ident(alias, "alias")?);
            }
            FromClause::Join {
                kind,
                left,
                left_alias,
                right,
                right_alias,
                left_key,
                right_key,
            } => {
                w.push("(");
                self.write_select(left, w)?;
                w.push(") AS ");
                w.push(&self.ident(left_alias, "alias")?);
                w.push(match kind {
                    JoinKind::Inner => " INNER JOIN (",
                    JoinKind::Left => " LEFT JOIN (",
                });
                self.write_select(right, w)?;
                w.push(") AS ");
                w.push(&self.ident(right_alias, "alias")?);
                w.push(&format!(
                    " ON {} = {}",
                    self.ident(&format!("{left_alias}.{left_key}"), "column")?,
                    self.ident(&format!("{right_alias}.{right_key}"), "column")?
                ));
            }
        }
        Ok(())
    }

    fn write_where(&self, filters: &[Expr], w: &mut Writer) -> Result<(), DataError> {
        if filters.is_empty() {
            return Ok(());
        }
        w.push(" WHERE ");
        let nested = filters.len() > 1;
        for (i, filter) in filters.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            self.write_expr(filter, nested, w)?;
        }
        Ok(())
    }

    /// `nested` is set when the expression is an operand of another one.
    fn write_expr(&self, expr: &Expr, nested: bool, w: &mut Writer) -> Result<(), DataError> {
        match expr {
            Expr::Column(name) => w.push(&self.ident(name, "column")?),
            Expr::Value(value) => w.bind(value.clone()),
            Expr::Binary { op, lhs, rhs } => {
                let wrap = nested && !op.is_comparison();
                if wrap {
                    w.push("(");
                }
                self.write_expr(lhs, true, w)?;
                w.push(&format!(" {} ", op.sql()));
                self.write_expr(rhs, true, w)?;
                if wrap {
                    w.push(")");
                }
            }
            Expr::And(operands) => self.write_junction(operands, " AND ", "1 = 1", nested, w)?,
            Expr::Or(operands) => self.write_junction(operands, " OR ", "1 = 0", nested, w)?,
            Expr::Not(inner) => match inner.as_ref() {
                Expr::IsNull(operand) => {
                    self.write_expr(operand, true, w)?;
                    w.push(" IS NOT NULL");
                }
                other => {
                    w.push("NOT (");
                    self.write_expr(other, false, w)?;
                    w.push(")");
                }
            },
            Expr::IsNull(operand) => {
                self.write_expr(operand, true, w)?;
                w.push(" IS NULL");
            }
            Expr::InList { expr, list } => {
                if list.is_empty() {
                    w.push("1 = 0");
                    return Ok(());
                }
                self.write_expr(expr, true, w)?;
                w.push(" IN (");
                for (i, value) in list.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.bind(value.clone());
                }
                w.push(")");
            }
            Expr::Like { expr, pattern } => {
                self.write_expr(expr, true, w)?;
                w.push(" LIKE ");
                w.bind(Value::String(pattern.clone()));
            }
            Expr::Concat(operands) => {
                let (open, sep) = match self.dialect {
                    Dialect::MySql => ("CONCAT(", ", "),
                    Dialect::Generic | Dialect::Sqlite | Dialect::Postgres => ("(", " || "),
                };
                w.push(open);
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        w.push(sep);
                    }
                    self.write_expr(operand, true, w)?;
                }
                w.push(")");
            }
        }
        Ok(())
    }

    fn write_junction(
        &self,
        operands: &[Expr],
        separator: &str,
        empty: &str,
        nested: bool,
        w: &mut Writer,
    ) -> Result<(), DataError> {
        if operands.is_empty() {
            w.push(empty);
            return Ok(());
        }
        if nested {
            w.push("(");
        }
        for (i, operand) in operands.iter().enumerate() {
            if i > 0 {
                w.push(separator);
            }
            self.write_expr(operand, true, w)?;
        }
        if nested {
            w.push(")");
        }
        Ok(())
    }

    fn ident(&self, ident: &str, kind: &'static str) -> Result<String, QueryError> {
        if !is_valid_identifier(ident) {
            return Err(QueryError::InvalidIdentifier {
                kind,
                ident: ident.to_string(),
            });
        }
        Ok(match self.identifier_policy {
            IdentifierPolicy::Quote => quote_identifier(ident, self.dialect),
            IdentifierPolicy::Validate => ident.to_string(),
        })
    }
}

fn nest(select: Select, aliases: &mut usize) -> Select {
    *aliases += 1;
    let alias = format!("t{aliases}");
    Select::new(FromClause::Subquery(Box::new(select), alias), vec![Item::Star(None)])
}

fn qualify(expr: &Expr, scope: &str) -> Expr {
    let boxed = |inner: &Expr| Box::new(qualify(inner, scope));
    let all = |operands: &[Expr]| -> Vec<Expr> {
        operands.iter().map(|e| qualify(e, scope)).collect()
    };
    match expr {
        Expr::Column(name) if !name.contains('.') => Expr::Column(format!("{scope}.{name}")),
        Expr::Column(_) | Expr::Value(_) => expr.clone(),
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: boxed(lhs),
            rhs: boxed(rhs),
        },
        Expr::And(operands) => Expr::And(all(operands)),
        Expr::Or(operands) => Expr::Or(all(operands)),
        Expr::Not(inner) => Expr::Not(boxed(inner)),
        Expr::IsNull(inner) => Expr::IsNull(boxed(inner)),
        Expr::InList { expr, list } => Expr::InList {
            expr: boxed(expr),
            list: list.clone(),
        },
        Expr::Like { expr, pattern } => Expr::Like {
            expr: boxed(expr),
            pattern: pattern.clone(),
        },
        Expr::Concat(operands) => Expr::Concat(all(operands)),
    }
}

fn is_valid_identifier(ident: &str) -> bool {
    !ident.is_empty() && ident.split('.').all(is_valid_segment)
}

fn is_valid_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_identifier(ident: &str, dialect: Dialect) -> String {
    let quote = dialect.quote_char();
    ident
        .split('.')
        .map(|part| format!("{quote}{part}{quote}"))
        .collect::<Vec<_>>()
        .join(".")
}
