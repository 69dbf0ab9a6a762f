use std::fmt::Write;

use crate::http::{Request, Response};

/// Request side of the dump: URI, a counters summary, then the headers that
/// went on the wire.
pub fn dump_request(req: &Request, resp: &Response, headers: &[(String, String)]) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "{}\n\nStatus: {}, Size: {}, Words: {}, Lines: {}\n\n",
        req.url, resp.status_code, resp.content_length, resp.content_words, resp.content_lines
    );
    for (k, v) in headers {
        let _ = writeln!(out, "> {}: {}", k, v);
    }
    out
}

pub fn dump_response(resp: &Response) -> String {
    let mut out = format!("< HTTP/1.1 {}\n", resp.status_code);
    let mut names: Vec<&String> = resp.headers.keys().collect();
    names.sort();
    for name in names {
        for value in resp.headers[name].iter() {
            let _ = writeln!(out, "< {}: {}", name, value);
        }
    }
    out.push('\n');
    out.push_str(&String::from_utf8_lossy(&resp.data));
    out
}
