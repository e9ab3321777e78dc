use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::config::DataConfig;
use crate::context::{PersistenceContext, Transaction};
use crate::entity::{Entity, Table};
use crate::error::{DataError, ValidationFailure};
use crate::plan::{Plan, Source};
use crate::record::Record;
use crate::sql::Dialect;
use crate::tracker::{ChangeTracker, EntryState};
use crate::value::Value;

/// A rule checked against every row of a table when changes are saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    NotNull(&'static str),
    Unique(&'static str),
}

type Rows = BTreeMap<i64, Record>;

#[derive(Debug, Clone, Default)]
struct Store {
    tables: BTreeMap<String, Rows>,
}

impl Store {
    fn rows(&self, table: &str) -> Option<&Rows> {
        self.tables.get(table)
    }

    fn row(&self, table: &str, key: i64) -> Option<&Record> {
        self.tables.get(table)?.get(&key)
    }

    fn max_key(&self, table: &str) -> Option<i64> {
        self.tables.get(table)?.keys().next_back().copied()
    }
}

/// A persistence context over in-memory tables.
///
/// Behaves like a store-backed context: changes are tracked until
/// [`save_changes`](PersistenceContext::save_changes), table constraints are
/// validated atomically at save time, and transactions roll back to a
/// snapshot. Raw commands understand a small SQL subset:
///
/// - `SELECT * FROM t [WHERE c = ? [AND c = ?]...]`
/// - `UPDATE t SET c = ?[, c = ?]... [WHERE ...]`
/// - `DELETE FROM t [WHERE ...]`
///
/// Raw commands write to the tables directly, bypassing tracked changes.
#[derive(Debug, Default)]
pub struct MemoryContext {
    dialect: Dialect,
    store: RefCell<Store>,
    tracker: RefCell<ChangeTracker>,
    constraints: Vec<(&'static str, Constraint)>,
    snapshot: RefCell<Option<(Store, ChangeTracker)>>,
    in_transaction: Cell<bool>,
}

impl MemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dialect reported to callers rendering SQL for this context.
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn from_config(config: &DataConfig) -> Self {
        Self::new().with_dialect(config.dialect)
    }

    pub fn with_constraint(mut self, table: &Table, constraint: Constraint) -> Self {
        self.constraints.push((table.name, constraint));
        self
    }

    /// Store rows directly, as if they had been saved earlier. Rows without
    /// a key get the next free one.
    pub fn with_rows(self, table: &Table, rows: Vec<Record>) -> Self {
        self.seed(table, rows);
        self
    }

    pub fn with_entities<E: Entity>(self, entities: &[E]) -> Self {
        self.seed(&E::TABLE, entities.iter().map(|e| e.to_record()).collect());
        self
    }

    pub fn seed(&self, table: &Table, rows: Vec<Record>) {
        let mut store = self.store.borrow_mut();
        let stored = store.tables.entry(table.name.to_string()).or_default();
        for mut row in rows {
            let key = match table.key_of(&row) {
                Some(key) => key,
                None => {
                    let key = stored.keys().next_back().map_or(1, |k| k + 1);
                    row.insert(table.key, key);
                    key
                }
            };
            stored.insert(key, row);
        }
    }

    /// Saved rows of a table in key order, ignoring pending changes.
    pub fn stored_rows(&self, table: &Table) -> Vec<Record> {
        self.store
            .borrow()
            .rows(table.name)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of tracked changes waiting for `save_changes`.
    pub fn pending_changes(&self) -> usize {
        self.tracker.borrow().pending().count()
    }

    fn stored(&self, table: &Table, key: i64) -> Option<Record> {
        self.store.borrow().row(table.name, key).cloned()
    }

    fn is_known(&self, table: &Table, key: i64) -> bool {
        self.tracker.borrow().get(table, key).is_some() || self.stored(table, key).is_some()
    }

    fn next_key(&self, table: &Table) -> i64 {
        let stored = self.store.borrow().max_key(table.name);
        let tracked = self.tracker.borrow().max_key(table);
        stored.max(tracked).map_or(1, |k| k + 1)
    }

    fn validate(&self, store: &Store) -> Vec<ValidationFailure> {
        let mut failures = Vec::new();
        for (table, constraint) in &self.constraints {
            let Some(rows) = store.rows(table) else {
                continue;
            };
            match constraint {
                Constraint::NotNull(column) => {
                    for (key, row) in rows {
                        if row.value(column).map_or(true, Value::is_null) {
                            failures.push(ValidationFailure::new(
                                table,
                                Some(*column),
                                format!("row {key}: value is required"),
                            ));
                        }
                    }
                }
                Constraint::Unique(column) => {
                    let mut seen: Vec<&Value> = Vec::new();
                    for (key, row) in rows {
                        let Some(value) = row.value(column).filter(|v| !v.is_null()) else {
                            continue;
                        };
                        if seen.iter().any(|s| s.sql_cmp(value).is_some_and(|o| o.is_eq())) {
                            failures.push(ValidationFailure::new(
                                table,
                                Some(*column),
                                format!("row {key}: duplicate value {value}"),
                            ));
                        } else {
                            seen.push(value);
                        }
                    }
                }
            }
        }
        failures
    }

    fn run_raw(&self, command: RawCommand) -> Result<RawOutcome, DataError> {
        match command {
            RawCommand::Select { table, condition } => {
                let store = self.store.borrow();
                let rows = store
                    .rows(&table)
                    .map(|rows| {
                        rows.values()
                            .filter(|row| condition_matches(&condition, row))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(RawOutcome::Rows(rows))
            }
            RawCommand::Update {
                table,
                assignments,
                condition,
            } => {
                let mut store = self.store.borrow_mut();
                let mut affected = 0;
                if let Some(rows) = store.tables.get_mut(&table) {
                    for row in rows.values_mut() {
                        if condition_matches(&condition, row) {
                            for (column, value) in &assignments {
                                row.insert(column, value.clone());
                            }
                            affected += 1;
                        }
                    }
                }
                Ok(RawOutcome::Affected(affected))
            }
            RawCommand::Delete { table, condition } => {
                let mut store = self.store.borrow_mut();
                let mut affected = 0;
                if let Some(rows) = store.tables.get_mut(&table) {
                    let before = rows.len();
                    rows.retain(|_, row| !condition_matches(&condition, row));
                    affected = (before - rows.len()) as u64;
                }
                Ok(RawOutcome::Affected(affected))
            }
        }
    }
}

impl PersistenceContext for MemoryContext {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn fetch(&self, plan: &Plan) -> Result<Vec<Record>, DataError> {
        let rows = match plan.source() {
            Source::Table(table) => self.stored_rows(table),
            Source::Rows(rows) => rows.as_ref().clone(),
        };
        plan.evaluate(rows, &mut |right| self.fetch(right))
    }

    fn count(&self, plan: &Plan) -> Result<u64, DataError> {
        Ok(self.fetch(plan)?.len() as u64)
    }

    fn find(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        if let Some(entry) = self.tracker.borrow().get(table, key) {
            return Ok(match entry.state {
                EntryState::Deleted => None,
                _ => Some(entry.record.clone()),
            });
        }
        let Some(record) = self.stored(table, key) else {
            return Ok(None);
        };
        self.tracker.borrow_mut().attach(table, key, record.clone());
        Ok(Some(record))
    }

    fn insert(&self, table: &Table, mut record: Record) -> Result<i64, DataError> {
        let key = match table.key_of(&record) {
            Some(key) => key,
            None => {
                let key = self.next_key(table);
                record.insert(table.key, key);
                key
            }
        };
        self.tracker.borrow_mut().add(table, key, record)?;
        Ok(key)
    }

    fn mark_modified(&self, table: &Table, record: Record) -> Result<(), DataError> {
        let key = table
            .key_of(&record)
            .ok_or_else(|| DataError::NotFound(format!("{} row without a key", table.name)))?;
        if !self.is_known(table, key) {
            return Err(DataError::NotFound(format!("{} with key {key}", table.name)));
        }
        self.tracker.borrow_mut().modify(table, key, record)
    }

    fn update_fields(&self, table: &Table, key: i64, changes: Record) -> Result<(), DataError> {
        let base = self.stored(table, key);
        self.tracker
            .borrow_mut()
            .update_fields(table, key, base, &changes)
    }

    fn remove(&self, table: &Table, key: i64) -> Result<(), DataError> {
        if !self.is_known(table, key) {
            return Err(DataError::NotFound(format!("{} with key {key}", table.name)));
        }
        let base = self.stored(table, key);
        self.tracker.borrow_mut().delete(table, key, base);
        Ok(())
    }

    fn reload(&self, table: &Table, key: i64) -> Result<Option<Record>, DataError> {
        self.tracker.borrow_mut().detach(table, key);
        self.find(table, key)
    }

    fn begin_transaction(&self) -> Result<Box<dyn Transaction + '_>, DataError> {
        if self.in_transaction.get() {
            return Err(DataError::NestedTransaction);
        }
        *self.snapshot.borrow_mut() = Some((
            self.store.borrow().clone(),
            self.tracker.borrow().clone(),
        ));
        self.in_transaction.set(true);
        tracing::debug!("Memory transaction started");
        Ok(Box::new(MemoryTransaction {
            ctx: self,
            active: true,
        }))
    }

    fn execute_raw(&self, command: &str, params: &[Value]) -> Result<u64, DataError> {
        match self.run_raw(parse_raw(command, params)?)? {
            RawOutcome::Affected(n) => Ok(n),
            RawOutcome::Rows(_) => Err(DataError::Unsupported(
                "SELECT passed to execute_raw; use query_raw".into(),
            )),
        }
    }

    fn query_raw(&self, command: &str, params: &[Value]) -> Result<Vec<Record>, DataError> {
        match self.run_raw(parse_raw(command, params)?)? {
            RawOutcome::Rows(rows) => Ok(rows),
            RawOutcome::Affected(_) => Err(DataError::Unsupported(
                "query_raw expects a SELECT".into(),
            )),
        }
    }

    fn save_changes(&self) -> Result<u64, DataError> {
        let mut next = self.store.borrow().clone();
        let mut failures = Vec::new();
        let mut saved = 0;
        for entry in self.tracker.borrow().pending() {
            let rows = next.tables.entry(entry.table.name.to_string()).or_default();
            match entry.state {
                EntryState::Added => {
                    if rows.contains_key(&entry.key) {
                        failures.push(ValidationFailure::new(
                            entry.table.name,
                            Some(entry.table.key),
                            format!("duplicate key {}", entry.key),
                        ));
                    }
                    rows.insert(entry.key, entry.record.clone());
                }
                EntryState::Modified => {
                    rows.insert(entry.key, entry.record.clone());
                }
                EntryState::Deleted => {
                    rows.remove(&entry.key);
                }
                EntryState::Unchanged => continue,
            }
            saved += 1;
        }
        failures.extend(self.validate(&next));
        if !failures.is_empty() {
            return Err(DataError::PersistValidationFailed(failures));
        }
        *self.store.borrow_mut() = next;
        self.tracker.borrow_mut().accept_all();
        tracing::debug!(saved, "Memory changes saved");
        Ok(saved)
    }
}

struct MemoryTransaction<'a> {
    ctx: &'a MemoryContext,
    active: bool,
}

impl MemoryTransaction<'_> {
    fn finish(&mut self) {
        self.active = false;
        self.ctx.in_transaction.set(false);
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn commit(&mut self) -> Result<(), DataError> {
        if !self.active {
            return Err(DataError::Unsupported("transaction already finished".into()));
        }
        self.ctx.snapshot.borrow_mut().take();
        self.finish();
        tracing::debug!("Memory transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DataError> {
        if !self.active {
            return Err(DataError::Unsupported("transaction already finished".into()));
        }
        if let Some((store, tracker)) = self.ctx.snapshot.borrow_mut().take() {
            *self.ctx.store.borrow_mut() = store;
            *self.ctx.tracker.borrow_mut() = tracker;
        }
        self.finish();
        tracing::debug!("Memory transaction rolled back");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if self.active {
            let _ = self.rollback();
        }
    }
}

// ── raw commands ────────────────────────────────────────────────────────

type Condition = Vec<(String, Value)>;

#[derive(Debug, PartialEq)]
enum RawCommand {
    Select {
        table: String,
        condition: Condition,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        condition: Condition,
    },
    Delete {
        table: String,
        condition: Condition,
    },
}

enum RawOutcome {
    Affected(u64),
    Rows(Vec<Record>),
}

fn condition_matches(condition: &Condition, row: &Record) -> bool {
    condition.iter().all(|(column, expected)| {
        row.value(column)
            .and_then(|v| v.sql_cmp(expected))
            .is_some_and(|o| o.is_eq())
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Param,
    Literal(Value),
    Symbol(char),
}

fn unsupported(command: &str, detail: &str) -> DataError {
    DataError::Unsupported(format!("raw command `{command}`: {detail}"))
}

fn tokenize(command: &str) -> Result<Vec<Token>, DataError> {
    let mut tokens = Vec::new();
    let mut chars = command.trim().trim_end_matches(';').chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '?' => {
                chars.next();
                tokens.push(Token::Param);
            }
            '=' | ',' | '*' => {
                chars.next();
                tokens.push(Token::Symbol(c));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            text.push('\'');
                        }
                        Some('\'') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(unsupported(command, "unterminated string")),
                    }
                }
                tokens.push(Token::Literal(Value::String(text)));
            }
            '"' | '`' => {
                chars.next();
                let ident: String = chars.by_ref().take_while(|&ch| ch != c).collect();
                tokens.push(Token::Word(ident));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '-' || ch == '.' {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = match text.parse::<i64>() {
                    Ok(i) => Value::I64(i),
                    Err(_) => text
                        .parse::<f64>()
                        .map(Value::F64)
                        .map_err(|_| unsupported(command, "malformed number"))?,
                };
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                        word.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            other => return Err(unsupported(command, &format!("unexpected `{other}`"))),
        }
    }
    Ok(tokens)
}

struct RawParser<'a> {
    command: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    params: &'a [Value],
    next_param: usize,
}

impl<'a> RawParser<'a> {
    fn new(command: &'a str, params: &'a [Value]) -> Result<Self, DataError> {
        Ok(RawParser {
            command,
            tokens: tokenize(command)?,
            pos: 0,
            params,
            next_param: 0,
        })
    }

    fn error(&self, detail: &str) -> DataError {
        unsupported(self.command, detail)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.tokens.get(self.pos), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), DataError> {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn symbol(&mut self, symbol: char) -> Result<(), DataError> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{symbol}`")))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.tokens.get(self.pos) == Some(&Token::Symbol(symbol)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, DataError> {
        match self.tokens.get(self.pos) {
            Some(Token::Word(word)) => {
                let word = word.clone();
                self.pos += 1;
                Ok(word)
            }
            _ => Err(self.error("expected an identifier")),
        }
    }

    fn value(&mut self) -> Result<Value, DataError> {
        let value = match self.tokens.get(self.pos) {
            Some(Token::Param) => {
                let value = self
                    .params
                    .get(self.next_param)
                    .cloned()
                    .ok_or_else(|| self.error("not enough parameters"))?;
                self.next_param += 1;
                value
            }
            Some(Token::Literal(value)) => value.clone(),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("null") => Value::Null,
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => Value::Bool(true),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => return Err(self.error("expected a value")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn assignment(&mut self) -> Result<(String, Value), DataError> {
        let column = self.ident()?;
        self.symbol('=')?;
        Ok((column, self.value()?))
    }

    fn condition(&mut self) -> Result<Condition, DataError> {
        let mut condition = Vec::new();
        if self.peek_keyword("where") {
            self.pos += 1;
            condition.push(self.assignment()?);
            while self.peek_keyword("and") {
                self.pos += 1;
                condition.push(self.assignment()?);
            }
        }
        Ok(condition)
    }

    fn finish(self, command: RawCommand) -> Result<RawCommand, DataError> {
        if self.pos != self.tokens.len() {
            return Err(self.error("unexpected trailing input"));
        }
        if self.next_param != self.params.len() {
            return Err(self.error("too many parameters"));
        }
        Ok(command)
    }
}

fn parse_raw(command: &str, params: &[Value]) -> Result<RawCommand, DataError> {
    let mut parser = RawParser::new(command, params)?;
    let parsed = if parser.peek_keyword("select") {
        parser.pos += 1;
        parser.symbol('*')?;
        parser.keyword("from")?;
        let table = parser.ident()?;
        let condition = parser.condition()?;
        RawCommand::Select { table, condition }
    } else if parser.peek_keyword("update") {
        parser.pos += 1;
        let table = parser.ident()?;
        parser.keyword("set")?;
        let mut assignments = vec![parser.assignment()?];
        while parser.eat_symbol(',') {
            assignments.push(parser.assignment()?);
        }
        let condition = parser.condition()?;
        RawCommand::Update {
            table,
            assignments,
            condition,
        }
    } else if parser.peek_keyword("delete") {
        parser.pos += 1;
        parser.keyword("from")?;
        let table = parser.ident()?;
        let condition = parser.condition()?;
        RawCommand::Delete { table, condition }
    } else {
        return Err(parser.error("only SELECT, UPDATE and DELETE are supported"));
    };
    parser.finish(parsed)
}
