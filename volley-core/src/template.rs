//! String templates with `#{name}` references into the session.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unterminated `#{{` at byte {at} in `{template}`")]
    Unterminated { template: String, at: usize },

    #[error("empty variable name at byte {at} in `{template}`")]
    EmptyName { template: String, at: usize },

    #[error("session has no variable `{0}`")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Var(String),
}

/// A string parsed once into literal and variable parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = raw;
        let mut offset = 0;

        while let Some(start) = rest.find("#{") {
            literal.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(TemplateError::Unterminated {
                    template: raw.to_string(),
                    at: offset + start,
                });
            };

            let name = after[..end].trim();
            if name.is_empty() {
                return Err(TemplateError::EmptyName {
                    template: raw.to_string(),
                    at: offset + start,
                });
            }

            if !literal.is_empty() {
                parts.push(Part::Literal(std::mem::take(&mut literal)));
            }
            parts.push(Part::Var(name.to_string()));

            let consumed = start + 2 + end + 1;
            offset += consumed;
            rest = &rest[consumed..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template contains no variable references.
    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Var(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    pub fn resolve(&self, session: &Session) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                Part::Literal(s) => out.push_str(s),
                Part::Var(name) => {
                    let value = session
                        .get(name)
                        .ok_or_else(|| TemplateError::UnknownVariable(name.clone()))?;
                    let _ = write!(out, "{value}");
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        let mut s = Session::new(7, "links");
        s.set("slug", "abc123");
        s.set("n", 2_i64);
        s
    }

    #[test]
    fn resolves_variables_between_literals() {
        let t = Template::parse("/links/#{slug}?page=#{n}").unwrap_or_else(|e| panic!("{e}"));
        assert!(!t.is_static());
        assert_eq!(t.variables().collect::<Vec<_>>(), vec!["slug", "n"]);
        assert_eq!(t.resolve(&session()), Ok("/links/abc123?page=2".to_string()));
    }

    #[test]
    fn plain_strings_are_static() {
        let t = Template::parse("/links").unwrap_or_else(|e| panic!("{e}"));
        assert!(t.is_static());
        assert_eq!(t.resolve(&Session::new(1, "s")), Ok("/links".to_string()));
    }

    #[test]
    fn lone_hash_is_literal() {
        let t = Template::parse("/#anchor#{slug}").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(t.resolve(&session()), Ok("/#anchorabc123".to_string()));
    }

    #[test]
    fn rejects_malformed_references() {
        assert!(matches!(
            Template::parse("/links/#{slug"),
            Err(TemplateError::Unterminated { at: 7, .. })
        ));
        assert!(matches!(
            Template::parse("/#{ }"),
            Err(TemplateError::EmptyName { .. })
        ));
    }

    #[test]
    fn unknown_variable_fails_resolution() {
        let t = Template::parse("/#{missing}").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            t.resolve(&session()),
            Err(TemplateError::UnknownVariable("missing".to_string()))
        );
    }
}
