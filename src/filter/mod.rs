pub mod numeric;
pub mod regex;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::http::Response;

pub use self::numeric::{CounterFilter, StatusFilter};
pub use self::regex::RegexFilter;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("{kind} filter or matcher: invalid value: {value}")]
    InvalidValue { kind: &'static str, value: String },

    #[error("unknown filter or matcher type: {name}")]
    UnknownKind { name: String },
}

/// A predicate over a captured response. Used both as a matcher (report when
/// true) and as a filter (hide when true).
pub trait FilterProvider: fmt::Debug + Send + Sync {
    fn filter(&self, response: &Response) -> Result<bool, FilterError>;

    fn repr(&self) -> String;

    /// The string the predicate was built from, independent of any request.
    fn raw_value(&self) -> &str;
}

#[derive(Serialize)]
struct FilterValue<'a> {
    value: &'a str,
}

impl Serialize for dyn FilterProvider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FilterValue {
            value: self.raw_value(),
        }
        .serialize(serializer)
    }
}

pub fn new_filter_by_name(name: &str, value: &str) -> Result<Box<dyn FilterProvider>, FilterError> {
    match name.trim().to_lowercase().as_str() {
        "status" => Ok(Box::new(StatusFilter::new(value)?)),
        "size" => Ok(Box::new(CounterFilter::size(value)?)),
        "word" | "words" => Ok(Box::new(CounterFilter::words(value)?)),
        "line" | "lines" => Ok(Box::new(CounterFilter::lines(value)?)),
        "regex" | "regexp" => Ok(Box::new(RegexFilter::new(value)?)),
        _ => Err(FilterError::UnknownKind {
            name: name.to_string(),
        }),
    }
}

/// Matchers and filters active for a run, keyed by kind. A response is worth
/// reporting when any matcher accepts it (or none are set) and no filter
/// does. Evaluation errors count as "no match" on either side.
#[derive(Debug, Default, Serialize)]
pub struct MatchPolicy {
    matchers: BTreeMap<String, Box<dyn FilterProvider>>,
    filters: BTreeMap<String, Box<dyn FilterProvider>>,
}

impl MatchPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_matcher(&mut self, name: &str, value: &str) -> Result<(), FilterError> {
        let provider = new_filter_by_name(name, value)?;
        self.matchers.insert(name.trim().to_lowercase(), provider);
        Ok(())
    }

    pub fn add_filter(&mut self, name: &str, value: &str) -> Result<(), FilterError> {
        let provider = new_filter_by_name(name, value)?;
        self.filters.insert(name.trim().to_lowercase(), provider);
        Ok(())
    }

    pub fn matchers(&self) -> impl Iterator<Item = &dyn FilterProvider> {
        self.matchers.values().map(|m| m.as_ref())
    }

    pub fn filters(&self) -> impl Iterator<Item = &dyn FilterProvider> {
        self.filters.values().map(|f| f.as_ref())
    }

    pub fn is_interesting(&self, response: &Response) -> bool {
        let matched = self.matchers.is_empty()
            || self
                .matchers
                .values()
                .any(|m| m.filter(response).unwrap_or(false));
        if !matched {
            return false;
        }
        !self
            .filters
            .values()
            .any(|f| f.filter(response).unwrap_or(false))
    }
}
