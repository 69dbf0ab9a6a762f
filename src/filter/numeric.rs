use super::{FilterError, FilterProvider};
use crate::http::Response;

/// Inclusive `min-max`; a bare number is a one-value range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueRange {
    pub min: u64,
    pub max: u64,
}

impl ValueRange {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some((a, b)) = value.split_once('-') {
            let min = a.trim().parse::<u64>().ok()?;
            let max = b.trim().parse::<u64>().ok()?;
            if min > max {
                return None;
            }
            return Some(Self { min, max });
        }
        let v = value.parse::<u64>().ok()?;
        Some(Self { min: v, max: v })
    }

    pub fn contains(&self, v: u64) -> bool {
        self.min <= v && v <= self.max
    }
}

fn parse_ranges(kind: &'static str, value: &str) -> Result<Vec<ValueRange>, FilterError> {
    let invalid = || FilterError::InvalidValue {
        kind,
        value: value.to_string(),
    };
    let mut out = Vec::new();
    for part in value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        out.push(ValueRange::parse(part).ok_or_else(invalid)?);
    }
    if out.is_empty() {
        return Err(invalid());
    }
    Ok(out)
}

#[derive(Clone, Debug)]
pub struct StatusFilter {
    values: Vec<ValueRange>,
    all: bool,
    raw: String,
}

impl StatusFilter {
    pub fn new(value: &str) -> Result<Self, FilterError> {
        let mut all = false;
        let mut rest: Vec<&str> = Vec::new();
        for part in value.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if part.eq_ignore_ascii_case("all") {
                all = true;
            } else {
                rest.push(part);
            }
        }
        let values = if rest.is_empty() && all {
            Vec::new()
        } else {
            parse_ranges("Status", &rest.join(","))?
        };
        Ok(Self {
            values,
            all,
            raw: value.to_string(),
        })
    }
}

impl FilterProvider for StatusFilter {
    fn filter(&self, response: &Response) -> Result<bool, FilterError> {
        if self.all {
            return Ok(true);
        }
        let status = u64::from(response.status_code);
        Ok(self.values.iter().any(|r| r.contains(status)))
    }

    fn repr(&self) -> String {
        format!("Response status: {}", self.raw)
    }

    fn raw_value(&self) -> &str {
        &self.raw
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Counter {
    Size,
    Words,
    Lines,
}

impl Counter {
    fn label(&self) -> &'static str {
        match self {
            Counter::Size => "size",
            Counter::Words => "words",
            Counter::Lines => "lines",
        }
    }
}

/// Size, word and line predicates share everything but the field read.
#[derive(Clone, Debug)]
pub struct CounterFilter {
    counter: Counter,
    values: Vec<ValueRange>,
    raw: String,
}

impl CounterFilter {
    pub fn new(counter: Counter, value: &str) -> Result<Self, FilterError> {
        let kind = match counter {
            Counter::Size => "Size",
            Counter::Words => "Word",
            Counter::Lines => "Line",
        };
        Ok(Self {
            counter,
            values: parse_ranges(kind, value)?,
            raw: value.to_string(),
        })
    }

    pub fn size(value: &str) -> Result<Self, FilterError> {
        Self::new(Counter::Size, value)
    }

    pub fn words(value: &str) -> Result<Self, FilterError> {
        Self::new(Counter::Words, value)
    }

    pub fn lines(value: &str) -> Result<Self, FilterError> {
        Self::new(Counter::Lines, value)
    }
}

impl FilterProvider for CounterFilter {
    fn filter(&self, response: &Response) -> Result<bool, FilterError> {
        let v = match self.counter {
            Counter::Size => response.content_length,
            // Nothing was downloaded, so there is nothing to count.
            Counter::Words | Counter::Lines if response.cancelled => return Ok(false),
            Counter::Words => response.content_words,
            Counter::Lines => response.content_lines,
        };
        Ok(self.values.iter().any(|r| r.contains(v)))
    }

    fn repr(&self) -> String {
        format!("Response {}: {}", self.counter.label(), self.raw)
    }

    fn raw_value(&self) -> &str {
        &self.raw
    }
}
