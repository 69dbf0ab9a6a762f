use std::collections::HashMap;

use crate::config::Config;

/// Keyword to raw substituted value, exactly as used to build one request.
pub type Input = HashMap<String, Vec<u8>>;

/// One attempted HTTP call, built fresh for every fuzz attempt.
///
/// Only `url` changes after construction: the redirect loop rewrites it in
/// place while following hops.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub data: Vec<u8>,
    pub host: String,
    pub input: Input,
    pub raw: String,
}

impl Request {
    /// Unsubstituted request straight from the configured templates.
    pub fn new(config: &Config) -> Self {
        Self {
            method: config.method.clone(),
            url: config.url.clone(),
            headers: config.headers.clone(),
            data: config.data.clone().into_bytes(),
            host: String::new(),
            input: Input::new(),
            raw: String::new(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Input value for `keyword`, lossily decoded for display.
    pub fn input_value(&self, keyword: &str) -> Option<String> {
        self.input
            .get(keyword)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}
