use std::collections::BTreeMap;

use crate::selection::SelectionMask;
use crate::types::Candidate;

const DUMP_VALUE_LIMIT: usize = 120;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(u64),
    Index(usize),
    Flag(bool),
    Candidate(Candidate),
    Candidates(Vec<Candidate>),
    Mask(SelectionMask),
}

/// Data of one route run: fetched collections, selections, seed values and
/// prompt variables. Dropped when the route is left.
#[derive(Debug, Default)]
pub struct SessionContext {
    data: BTreeMap<String, Value>,
    prompt_vars: BTreeMap<String, String>,
    notices: Vec<String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// The list stored under `key`, empty when missing.
    pub fn candidates(&self, key: &str) -> &[Candidate] {
        match self.get(key) {
            Some(Value::Candidates(items)) => items,
            _ => &[],
        }
    }

    pub fn candidate(&self, key: &str) -> Option<&Candidate> {
        match self.get(key) {
            Some(Value::Candidate(item)) => Some(item),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn number(&self, key: &str) -> Option<u64> {
        match self.get(key) {
            Some(Value::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn index(&self, key: &str) -> Option<usize> {
        match self.get(key) {
            Some(Value::Index(idx)) => Some(*idx),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Flag(true)))
    }

    pub fn mask(&self, key: &str) -> Option<&SelectionMask> {
        match self.get(key) {
            Some(Value::Mask(mask)) => Some(mask),
            _ => None,
        }
    }

    pub fn set_prompt_var(&mut self, key: &str, value: impl ToString) {
        self.prompt_vars.insert(key.to_string(), value.to_string());
    }

    /// Forgets every prompt variable.
    pub fn clear_prompt_vars(&mut self) {
        self.prompt_vars.clear();
    }

    pub fn prompt_vars(&self) -> &BTreeMap<String, String> {
        &self.prompt_vars
    }

    /// Queues a message for the user; printed after the step returns.
    pub fn notice(&mut self, message: impl Into<String>) {
        self.notices.push(message.into());
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// First `limit` entries as `key: value` lines for error reports.
    pub fn dump(&self, limit: usize) -> Vec<String> {
        self.data
            .iter()
            .take(limit)
            .map(|(key, value)| {
                let mut rendered = format!("{value:?}");
                if rendered.chars().count() > DUMP_VALUE_LIMIT {
                    rendered = rendered.chars().take(DUMP_VALUE_LIMIT).collect();
                    rendered.push_str("...");
                }
                format!("{key}: {rendered}")
            })
            .collect()
    }
}

/// States visited before the current one, most recent last.
#[derive(Debug, Default, Clone)]
pub struct NavigationHistory(Vec<String>);

impl NavigationHistory {
    pub fn push(&mut self, state: impl Into<String>) {
        self.0.push(state.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn path(&self, current: &str) -> String {
        self.0
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(current))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
