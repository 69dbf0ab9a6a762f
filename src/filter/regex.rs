use regex::bytes::Regex;

use super::{FilterError, FilterProvider};
use crate::http::Response;
use crate::template::Substitution;

/// Matches a pattern against the response headers followed by the body.
///
/// Keywords from the originating request's input are spliced into the
/// pattern (regex-escaped) before every match, so `value=FUZZ` asserts the
/// fuzzed value is echoed back literally.
#[derive(Clone, Debug)]
pub struct RegexFilter {
    value: Regex,
    raw: String,
}

impl RegexFilter {
    pub fn new(value: &str) -> Result<Self, FilterError> {
        let re = Regex::new(value).map_err(|_| FilterError::InvalidValue {
            kind: "Regexp",
            value: value.to_string(),
        })?;
        Ok(Self {
            value: re,
            raw: value.to_string(),
        })
    }
}

fn match_data(response: &Response) -> Vec<u8> {
    let mut names: Vec<&String> = response.headers.keys().collect();
    names.sort();
    let mut out = Vec::with_capacity(response.data.len() + 512);
    for name in names {
        for value in response.headers[name].iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
    out.extend_from_slice(&response.data);
    out
}

impl FilterProvider for RegexFilter {
    fn filter(&self, response: &Response) -> Result<bool, FilterError> {
        let data = match_data(response);
        let subs = Substitution::regex_escaped(&response.request.input);
        let pattern = subs.apply(&self.raw);
        if pattern == self.raw {
            return Ok(self.value.is_match(&data));
        }
        match Regex::new(&pattern) {
            Ok(re) => Ok(re.is_match(&data)),
            Err(e) => {
                log::warn!("regexp {pattern:?} no longer compiles after substitution: {e}");
                Ok(false)
            }
        }
    }

    fn repr(&self) -> String {
        format!("Regexp: {}", self.raw)
    }

    fn raw_value(&self) -> &str {
        &self.raw
    }
}
