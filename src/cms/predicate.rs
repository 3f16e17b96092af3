//! Query predicates in the CMS query language
//!
//! Predicates render to the bracketed form accepted by the search
//! endpoint's `q` parameter, e.g. `[at(document.type, "post")]`.

use std::fmt;

/// An `at(path, value)` predicate: the field at `path` equals `value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub path: String,
    pub value: String,
}

impl Predicate {
    pub fn at(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Match every document of a custom type
    pub fn document_type(doc_type: &str) -> Self {
        Self::at("document.type", doc_type)
    }

    /// Match the document of `doc_type` with the given uid
    pub fn uid(doc_type: &str, uid: &str) -> Self {
        Self::at(format!("my.{}.uid", doc_type), uid)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[at({}, {})]", self.path, quote(&self.value))
    }
}

/// Render a predicate list as the value of the `q` parameter
pub fn query_string(predicates: &[Predicate]) -> String {
    let inner: String = predicates.iter().map(|p| p.to_string()).collect();
    format!("[{}]", inner)
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
