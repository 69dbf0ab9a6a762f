use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write;

use crate::http::Input;

/// Ordered keyword/value pairs applied to a template in a single pass.
///
/// Keywords are tried longest first (ties broken lexically), so `FUZZ2` wins
/// over `FUZZ` at the same position. Substituted values are never rescanned,
/// which means a value that spells another keyword is emitted verbatim.
#[derive(Clone, Debug, Default)]
pub struct Substitution<'a> {
    pairs: Vec<(&'a str, Cow<'a, [u8]>)>,
}

impl<'a> Substitution<'a> {
    pub fn new(input: &'a Input) -> Self {
        let pairs = input
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.as_str(), Cow::Borrowed(v.as_slice())))
            .collect();
        Self::ordered(pairs)
    }

    /// Same keywords, but each value regex-escaped so it matches literally
    /// once spliced into a pattern.
    pub fn regex_escaped(input: &'a Input) -> Self {
        let pairs = input
            .iter()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| {
                let escaped = regex::escape(&String::from_utf8_lossy(v));
                (k.as_str(), Cow::Owned(escaped.into_bytes()))
            })
            .collect();
        Self::ordered(pairs)
    }

    fn ordered(mut pairs: Vec<(&'a str, Cow<'a, [u8]>)>) -> Self {
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn apply_bytes(&self, template: &[u8]) -> Vec<u8> {
        if self.pairs.is_empty() {
            return template.to_vec();
        }
        let mut out = Vec::with_capacity(template.len());
        let mut i = 0usize;
        'scan: while i < template.len() {
            for (keyword, value) in self.pairs.iter() {
                if template[i..].starts_with(keyword.as_bytes()) {
                    out.extend_from_slice(value);
                    i += keyword.len();
                    continue 'scan;
                }
            }
            out.push(template[i]);
            i += 1;
        }
        out
    }

    pub fn apply(&self, template: &str) -> String {
        if self.pairs.is_empty() {
            return template.to_string();
        }
        String::from_utf8_lossy(&self.apply_bytes(template.as_bytes())).into_owned()
    }

    /// Like `apply`, but bytes that are not valid UTF-8 are percent-encoded
    /// rather than replaced, so raw wordlist bytes still reach the wire.
    pub fn apply_url(&self, template: &str) -> String {
        let bytes = self.apply_bytes(template.as_bytes());
        let mut out = String::with_capacity(bytes.len());
        for chunk in bytes.utf8_chunks() {
            out.push_str(chunk.valid());
            for b in chunk.invalid() {
                let _ = write!(out, "%{b:02X}");
            }
        }
        out
    }

    /// Substitutes both names and values, re-canonicalizing each name.
    /// Names that collapse onto the same canonical key keep the value of the
    /// lexically last template name.
    pub fn apply_headers(&self, headers: &HashMap<String, String>) -> HashMap<String, String> {
        let mut names: Vec<&String> = headers.keys().collect();
        names.sort();
        let mut out = HashMap::with_capacity(headers.len());
        for name in names {
            let value = &headers[name];
            out.insert(canonical_header_key(&self.apply(name)), self.apply(value));
        }
        out
    }
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_'
                | b'`' | b'|' | b'~'
        )
}

/// MIME-style canonical header name: `content-type` becomes `Content-Type`.
/// Names holding bytes outside the HTTP token set are returned untouched.
pub fn canonical_header_key(key: &str) -> String {
    if key.is_empty() || !key.bytes().all(is_token_byte) {
        return key.to_string();
    }
    let mut upper = true;
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        if upper {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch.to_ascii_lowercase());
        }
        upper = ch == '-';
    }
    out
}
