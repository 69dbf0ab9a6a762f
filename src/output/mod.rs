use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::http::Response;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
    Xml,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".xml") {
        return Some(OutputFormat::Xml);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

#[derive(Clone, Debug, Serialize)]
pub struct OutputRecord {
    pub input: Vec<(String, String)>,
    pub url: String,
    pub status: u16,
    pub size: u64,
    pub words: u64,
    pub lines: u64,
    pub redirect_location: String,
    pub result_file: String,
}

impl OutputRecord {
    pub fn from_response(resp: &Response) -> Self {
        let mut input: Vec<(String, String)> = resp
            .request
            .input
            .iter()
            .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
            .collect();
        input.sort();
        Self {
            input,
            url: resp.request.url.clone(),
            status: resp.status_code,
            size: resp.content_length,
            words: resp.content_words,
            lines: resp.content_lines,
            redirect_location: resp.redirect_location(true),
            result_file: resp.result_file.clone(),
        }
    }
}

pub fn render_text(records: &[OutputRecord]) -> Vec<u8> {
    let mut out = String::new();
    for r in records {
        out.push_str(&r.url);
        out.push('\n');
    }
    out.into_bytes()
}

pub fn render_json(records: &[OutputRecord]) -> Vec<u8> {
    serde_json::to_vec_pretty(records).unwrap_or_else(|_| b"[]\n".to_vec())
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn render_xml(records: &[OutputRecord]) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push('\n');
    out.push_str("<results>\n");
    for r in records {
        out.push_str("  <result>\n");
        out.push_str("    <input>\n");
        for (k, v) in &r.input {
            out.push_str(&format!(
                "      <value keyword=\"{}\">{}</value>\n",
                escape_xml(k),
                escape_xml(v)
            ));
        }
        out.push_str("    </input>\n");
        out.push_str(&format!("    <url>{}</url>\n", escape_xml(&r.url)));
        out.push_str(&format!("    <status>{}</status>\n", r.status));
        out.push_str(&format!("    <size>{}</size>\n", r.size));
        out.push_str(&format!("    <words>{}</words>\n", r.words));
        out.push_str(&format!("    <lines>{}</lines>\n", r.lines));
        out.push_str(&format!(
            "    <redirect_location>{}</redirect_location>\n",
            escape_xml(&r.redirect_location)
        ));
        out.push_str(&format!(
            "    <result_file>{}</result_file>\n",
            escape_xml(&r.result_file)
        ));
        out.push_str("  </result>\n");
    }
    out.push_str("</results>\n");
    out.into_bytes()
}

pub fn render(format: OutputFormat, records: &[OutputRecord]) -> Vec<u8> {
    match format {
        OutputFormat::Text => render_text(records),
        OutputFormat::Json => render_json(records),
        OutputFormat::Xml => render_xml(records),
    }
}

/// Stable file name for a response: same URL and input, same file.
pub fn dump_file_name(resp: &Response) -> String {
    let mut hasher = DefaultHasher::new();
    resp.request.url.hash(&mut hasher);
    let mut input: Vec<_> = resp.request.input.iter().collect();
    input.sort();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Writes the request and response dumps under `dir` and returns the path,
/// for the caller to store in `Response::result_file`.
pub async fn write_dump(dir: &Path, resp: &Response) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(dump_file_name(resp));
    let mut contents = String::with_capacity(resp.request.raw.len() + resp.raw.len() + 1);
    contents.push_str(&resp.request.raw);
    contents.push('\n');
    contents.push_str(&resp.raw);
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}
