use std::collections::HashMap;
use std::sync::Arc;

use crate::http::Request;
use crate::template::canonical_header_key;

/// What came back for one `Request`, decoded and counted for the filters.
///
/// When `cancelled` is set the body was never downloaded: `data` is empty,
/// `content_length` holds the declared `Content-Length` (or zero) and the
/// word and line counters are zero.
#[derive(Clone, Debug)]
pub struct Response {
    pub status_code: u16,
    pub headers: HashMap<String, Vec<String>>,
    pub data: Vec<u8>,
    /// Rune count of the decoded body, not its wire size.
    pub content_length: u64,
    pub content_words: u64,
    pub content_lines: u64,
    pub cancelled: bool,
    pub request: Arc<Request>,
    pub raw: String,
    /// Filled in by whoever persists the dump, never by the runner.
    pub result_file: String,
}

impl Response {
    pub fn new(status_code: u16, headers: HashMap<String, Vec<String>>, request: Arc<Request>) -> Self {
        Self {
            status_code,
            headers,
            data: Vec::new(),
            content_length: 0,
            content_words: 0,
            content_lines: 0,
            cancelled: false,
            request,
            raw: String::new(),
            result_file: String::new(),
        }
    }

    pub fn from_header_map(
        status_code: u16,
        headers: &reqwest::header::HeaderMap,
        request: Arc<Request>,
    ) -> Self {
        Self::new(status_code, header_map_to_hashmap(headers), request)
    }

    /// First value of header `name`, looked up case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(values) = self.headers.get(&canonical_header_key(name)) {
            return values.first().map(|v| v.as_str());
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.first())
            .map(|v| v.as_str())
    }

    /// Declared `Content-Length`, when it parses as a number.
    pub fn declared_length(&self) -> Option<u64> {
        self.header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.content_length = count_runes(&body);
        self.content_words = count_segments(&body, b' ');
        self.content_lines = count_segments(&body, b'\n');
        self.data = body;
        self.cancelled = false;
    }

    pub fn cancel(&mut self) {
        self.data.clear();
        self.content_length = self.declared_length().unwrap_or(0);
        self.content_words = 0;
        self.content_lines = 0;
        self.cancelled = true;
    }

    /// `Location` of a 3xx response, or an empty string. With `absolute` the
    /// location is resolved against the originating request URL; if either
    /// side fails to parse the raw location is returned.
    pub fn redirect_location(&self, absolute: bool) -> String {
        let mut location = String::new();
        if (300..=399).contains(&self.status_code) {
            location = self.header("Location").unwrap_or_default().to_string();
        }
        if !absolute || location.is_empty() {
            return location;
        }
        match reqwest::Url::parse(&self.request.url).and_then(|base| base.join(&location)) {
            Ok(resolved) => resolved.to_string(),
            Err(_) => location,
        }
    }
}

pub fn header_map_to_hashmap(headers: &reqwest::header::HeaderMap) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (k, v) in headers.iter() {
        let value = String::from_utf8_lossy(v.as_bytes()).trim().to_string();
        out.entry(canonical_header_key(k.as_str()))
            .or_default()
            .push(value);
    }
    out
}

/// Counts characters the way a UTF-8 decoder walking the bytes would:
/// every invalid byte counts as one replacement rune.
pub fn count_runes(body: &[u8]) -> u64 {
    body.utf8_chunks()
        .map(|chunk| (chunk.valid().chars().count() + chunk.invalid().len()) as u64)
        .sum()
}

/// Number of pieces a plain split on `delim` yields, empty pieces included.
pub fn count_segments(body: &[u8], delim: u8) -> u64 {
    body.split(|b| *b == delim).count() as u64
}
