use std::sync::Arc;

use crate::context::PersistenceContext;
use crate::entity::Table;
use crate::error::DataError;
use crate::expr::{Expr, OrderKey};
use crate::record::Record;
use crate::value::Value;

/// Where the rows of a plan come from.
#[derive(Debug, Clone)]
pub enum Source {
    /// Rows live in the store; the plan runs there.
    Table(Table),
    /// Rows are already in memory; the plan runs over them.
    Rows(Arc<Vec<Record>>),
}

/// Named output fields computed from each input record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, Expr)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output `name` computed by `expr`.
    pub fn field(mut self, name: &str, expr: impl Into<Expr>) -> Self {
        self.fields.push((name.to_string(), expr.into()));
        self
    }

    /// Output the input column `name` unchanged.
    pub fn keep(self, name: &str) -> Self {
        self.field(name, Expr::column(name))
    }

    /// Output the input column `from` as `to`.
    pub fn rename(self, from: &str, to: &str) -> Self {
        self.field(to, Expr::column(from))
    }

    pub fn fields(&self) -> &[(String, Expr)] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn apply(&self, record: &Record) -> Result<Record, DataError> {
        let mut out = Record::new();
        for (name, expr) in &self.fields {
            out.insert(name, expr.eval(record)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Equi-join of the current rows with the rows of another plan.
///
/// Right-hand fields are added to each output record as `{prefix}{name}`.
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub right: Plan,
    pub left_key: String,
    pub right_key: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub enum Stage {
    Filter(Expr),
    Project(Projection),
    Join(Box<Join>),
    /// Sort by these keys; earlier orderings become tie-breakers.
    OrderBy(Vec<OrderKey>),
    Skip(u64),
    Take(u64),
}

/// A deferred pipeline: a source followed by stages.
#[derive(Debug, Clone)]
pub struct Plan {
    source: Source,
    stages: Vec<Stage>,
}

impl Plan {
    pub fn scan(table: Table) -> Self {
        Plan {
            source: Source::Table(table),
            stages: Vec::new(),
        }
    }

    pub fn rows(rows: Vec<Record>) -> Self {
        Plan {
            source: Source::Rows(Arc::new(rows)),
            stages: Vec::new(),
        }
    }

    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn root_table(&self) -> Option<&Table> {
        match &self.source {
            Source::Table(table) => Some(table),
            Source::Rows(_) => None,
        }
    }

    /// True when every source of the plan, joins included, is a store table.
    pub fn is_deferred(&self) -> bool {
        matches!(self.source, Source::Table(_))
            && self.stages.iter().all(|stage| match stage {
                Stage::Join(join) => join.right.is_deferred(),
                _ => true,
            })
    }

    /// Output column names, when they can be known without running the plan.
    pub fn columns(&self) -> Option<Vec<String>> {
        let mut columns: Vec<String> = match &self.source {
            Source::Table(table) => table.columns.iter().map(|c| c.to_string()).collect(),
            Source::Rows(rows) => rows.first()?.names().map(str::to_string).collect(),
        };
        for stage in &self.stages {
            match stage {
                Stage::Project(projection) => {
                    columns = projection.names().map(str::to_string).collect();
                }
                Stage::Join(join) => {
                    let right = join.right.columns()?;
                    columns.extend(right.iter().map(|c| format!("{}{c}", join.prefix)));
                }
                Stage::Filter(_) | Stage::OrderBy(_) | Stage::Skip(_) | Stage::Take(_) => {}
            }
        }
        Some(columns)
    }

    /// Run the stages over `rows`, fetching join inputs through `join_rows`.
    pub fn evaluate(
        &self,
        mut rows: Vec<Record>,
        join_rows: &mut dyn FnMut(&Plan) -> Result<Vec<Record>, DataError>,
    ) -> Result<Vec<Record>, DataError> {
        for stage in &self.stages {
            rows = match stage {
                Stage::Filter(predicate) => {
                    let mut kept = Vec::with_capacity(rows.len());
                    for row in rows {
                        if predicate.matches(&row)? {
                            kept.push(row);
                        }
                    }
                    kept
                }
                Stage::Project(projection) => rows
                    .iter()
                    .map(|row| projection.apply(row))
                    .collect::<Result<_, _>>()?,
                Stage::Join(join) => {
                    let right = join_rows(&join.right)?;
                    nested_loop_join(rows, &right, join)?
                }
                Stage::OrderBy(keys) => sort_rows(rows, keys)?,
                Stage::Skip(n) => {
                    let n = usize::try_from(*n).unwrap_or(usize::MAX).min(rows.len());
                    rows.drain(..n);
                    rows
                }
                Stage::Take(n) => {
                    rows.truncate(usize::try_from(*n).unwrap_or(usize::MAX));
                    rows
                }
            };
        }
        Ok(rows)
    }
}

fn nested_loop_join(
    left: Vec<Record>,
    right: &[Record],
    join: &Join,
) -> Result<Vec<Record>, DataError> {
    let right_columns: Vec<String> = match join.right.columns() {
        Some(columns) => columns,
        None => right
            .first()
            .map(|row| row.names().map(str::to_string).collect())
            .unwrap_or_default(),
    };
    let left_key = Expr::column(&join.left_key);
    let right_key = Expr::column(&join.right_key);

    let mut out = Vec::with_capacity(left.len());
    for row in left {
        let key = left_key.eval(&row)?;
        let mut matched = false;
        for candidate in right {
            if key.sql_cmp(&right_key.eval(candidate)?) == Some(std::cmp::Ordering::Equal) {
                matched = true;
                let mut joined = row.clone();
                for (name, value) in candidate.iter() {
                    joined.insert(&format!("{}{name}", join.prefix), value.clone());
                }
                out.push(joined);
            }
        }
        if !matched && join.kind == JoinKind::Left {
            let mut joined = row;
            for name in &right_columns {
                joined.insert(&format!("{}{name}", join.prefix), Value::Null);
            }
            out.push(joined);
        }
    }
    Ok(out)
}

fn sort_rows(rows: Vec<Record>, keys: &[OrderKey]) -> Result<Vec<Record>, DataError> {
    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows {
        let values = keys
            .iter()
            .map(|key| key.expr.eval(&row))
            .collect::<Result<Vec<_>, _>>()?;
        keyed.push((values, row));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for (key, (x, y)) in keys.iter().zip(a.iter().zip(b.iter())) {
            let ordering = x.sort_cmp(y);
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering.is_ne() {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

/// Run a plan: in the store when it is deferred, otherwise in memory with
/// table sources read through `ctx`.
pub fn execute(plan: &Plan, ctx: &dyn PersistenceContext) -> Result<Vec<Record>, DataError> {
    if plan.is_deferred() {
        return ctx.fetch(plan);
    }
    let rows = match plan.source() {
        Source::Rows(rows) => rows.as_ref().clone(),
        Source::Table(table) => ctx.fetch(&Plan::scan(*table))?,
    };
    plan.evaluate(rows, &mut |right| execute(right, ctx))
}

pub fn count(plan: &Plan, ctx: &dyn PersistenceContext) -> Result<u64, DataError> {
    if plan.is_deferred() {
        return ctx.count(plan);
    }
    Ok(execute(plan, ctx)?.len() as u64)
}
