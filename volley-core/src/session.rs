use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl SessionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SessionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for SessionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SessionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Per-user variable store.
///
/// Each virtual user owns exactly one session for its whole lifetime; sessions are never shared
/// between users.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: u64,
    scenario: Arc<str>,
    vars: HashMap<String, SessionValue>,
}

impl Session {
    pub fn new(user_id: u64, scenario: impl Into<Arc<str>>) -> Self {
        Self {
            user_id,
            scenario: scenario.into(),
            vars: HashMap::new(),
        }
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SessionValue>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&SessionValue> {
        self.vars.get(name)
    }

    /// String view of a variable; `None` when missing or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SessionValue::as_str)
    }

    pub fn remove(&mut self, name: &str) -> Option<SessionValue> {
        self.vars.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
