//! Built-in session actions.

use crate::scenario::{ActionError, Step};
use crate::session::SessionValue;

/// Store a constant value.
pub fn set(var: &str, value: impl Into<SessionValue>) -> Step {
    let var = var.to_string();
    let value = value.into();
    Step::action(&format!("set {var}"), move |session| {
        session.set(var.clone(), value.clone());
        Ok(())
    })
}

/// Store 32 lowercase hex characters taken from a fresh v4 UUID.
pub fn random_id(var: &str) -> Step {
    let var = var.to_string();
    Step::action(&format!("random id {var}"), move |session| {
        session.set(var.clone(), uuid::Uuid::new_v4().simple().to_string());
        Ok(())
    })
}

/// Store the first `len` characters of the string variable `from` into `into`.
pub fn substring(from: &str, into: &str, len: usize) -> Step {
    let from = from.to_string();
    let into = into.to_string();
    Step::action(&format!("substring {from} -> {into}"), move |session| {
        let source = match session.get(&from) {
            Some(SessionValue::Str(s)) => s,
            Some(other) => {
                return Err(ActionError::new(format!(
                    "`{from}` is not a string (found `{other}`)"
                )));
            }
            None => return Err(ActionError::new(format!("session has no variable `{from}`"))),
        };

        let boundaries = source.char_indices().map(|(i, _)| i);
        let Some(end) = boundaries.chain(std::iter::once(source.len())).nth(len) else {
            return Err(ActionError::new(format!(
                "`{from}` is shorter than {len} characters"
            )));
        };

        let prefix = source[..end].to_string();
        session.set(into.clone(), prefix);
        Ok(())
    })
}
