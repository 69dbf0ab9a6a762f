use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::app::{build_run_config, run_async};
use crate::cli::args::CliArgs;
use crate::config::{Config, ConfigFile};
use crate::http::Input;
use crate::runner::{RunnerError, RunnerProvider, SimpleRunner, MAX_REDIRECTS};

type Handler = dyn Fn(usize, &str) -> Vec<u8> + Send + Sync;

/// Loopback HTTP/1.1 server answering every connection with whatever the
/// handler returns for (request index, raw request). Connections are closed
/// after one exchange.
struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    async fn start<F>(handler: F) -> Self
    where
        F: Fn(usize, &str) -> Vec<u8> + Send + Sync + 'static,
    {
        Self::start_delayed(Duration::ZERO, handler).await
    }

    /// Holds every response back for `delay` after the request is read.
    async fn start_delayed<F>(delay: Duration, handler: F) -> Self
    where
        F: Fn(usize, &str) -> Vec<u8> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let accept_hits = hits.clone();
        let accept_requests = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let idx = accept_hits.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                let requests = accept_requests.clone();
                tokio::spawn(async move {
                    let _ = serve_one(stream, idx, delay, handler, requests).await;
                });
            }
        });

        Self {
            addr,
            hits,
            requests,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn request(&self, idx: usize) -> String {
        self.requests.lock().unwrap()[idx].clone()
    }
}

async fn serve_one(
    mut stream: TcpStream,
    idx: usize,
    delay: Duration,
    handler: Arc<Handler>,
    requests: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&chunk[..n]);
        if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
    let body_len = head
        .lines()
        .find_map(|l| {
            let (k, v) = l.split_once(':')?;
            k.eq_ignore_ascii_case("content-length")
                .then(|| v.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while raw.len() < head_end + body_len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
    }
    let request = String::from_utf8_lossy(&raw).to_string();
    {
        let mut all = requests.lock().unwrap();
        if all.len() <= idx {
            all.resize(idx + 1, String::new());
        }
        all[idx] = request.clone();
    }
    let response = handler(idx, &request);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    stream.write_all(&response).await?;
    stream.shutdown().await
}

fn reply(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (k, v) in headers {
        out.push_str(&format!("{k}: {v}\r\n"));
    }
    if !headers
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-length"))
    {
        out.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    out.push_str("\r\n");
    let mut out = out.into_bytes();
    out.extend_from_slice(body);
    out
}

fn input(pairs: &[(&str, &str)]) -> Input {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
        .collect()
}

fn runner(config: Config) -> SimpleRunner {
    SimpleRunner::new(config.timeout(Duration::from_secs(5))).unwrap()
}

#[tokio::test]
async fn endless_redirects_stop_after_seventeen_attempts() {
    let server = TestServer::start(|_, _| reply("302 Found", &[("Location", "/again")], b"")).await;
    let runner = runner(Config::new(server.url("/start")).follow_redirects(true));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let err = runner.execute(&mut req).await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::TooManyRedirects { hops, .. } if hops == MAX_REDIRECTS
    ));
    assert!(err.is_per_request());
    assert_eq!(server.hits(), MAX_REDIRECTS + 1);
}

#[tokio::test]
async fn relative_redirect_keeps_method_and_body() {
    let server = TestServer::start(|idx, _| {
        if idx == 0 {
            reply("302 Found", &[("Location", "next")], b"")
        } else {
            reply("200 OK", &[], b"done")
        }
    })
    .await;
    let config = Config::new(server.url("/dir/start"))
        .method("POST")
        .data("a=FUZZ")
        .follow_redirects(true);
    let runner = runner(config);
    let mut req = runner.prepare(&input(&[("FUZZ", "x")])).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.data, b"done");
    assert_eq!(req.url, server.url("/dir/next"));
    assert_eq!(resp.request.url, server.url("/dir/next"));

    let second = server.request(1);
    assert!(second.starts_with("POST /dir/next HTTP/1.1"), "{second}");
    assert!(second.ends_with("a=x"), "{second}");
}

#[tokio::test]
async fn redirect_without_location_is_an_error() {
    let server = TestServer::start(|_, _| reply("301 Moved Permanently", &[], b"")).await;
    let runner = runner(Config::new(server.url("/")).follow_redirects(true));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let err = runner.execute(&mut req).await.unwrap_err();
    assert!(matches!(
        err,
        RunnerError::MissingLocationHeader { status: 301, .. }
    ));
    assert_eq!(runner.pool().buffers().idle(), 1);
}

#[tokio::test]
async fn redirects_are_reported_when_not_followed() {
    let server =
        TestServer::start(|_, _| reply("302 Found", &[("Location", "/login")], b"")).await;
    let runner = runner(Config::new(server.url("/admin")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert_eq!(resp.status_code, 302);
    assert_eq!(resp.redirect_location(false), "/login");
    assert_eq!(resp.redirect_location(true), server.url("/login"));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn oversized_declared_body_is_cancelled() {
    let server = TestServer::start(|_, _| {
        reply(
            "200 OK",
            &[("Content-Length", "6000000"), ("Content-Encoding", "gzip")],
            b"",
        )
    })
    .await;
    let runner = runner(Config::new(server.url("/big")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert!(resp.cancelled);
    assert!(resp.data.is_empty());
    assert_eq!(resp.content_length, 6_000_000);
    assert_eq!(resp.content_words, 0);
    assert_eq!(resp.content_lines, 0);
}

#[tokio::test]
async fn oversized_streamed_body_is_cancelled() {
    let server = TestServer::start(|_, _| {
        let chunk = vec![b'a'; 1024 * 1024];
        let mut out =
            b"HTTP/1.1 200 OK\r\nConnection: close\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        for _ in 0..6 {
            out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
            out.extend_from_slice(&chunk);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"0\r\n\r\n");
        out
    })
    .await;
    let runner = runner(Config::new(server.url("/stream")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert!(resp.cancelled);
    assert!(resp.data.is_empty());
    assert_eq!(resp.content_length, 0);
}

#[tokio::test]
async fn ignore_body_skips_download() {
    let server = TestServer::start(|_, _| reply("200 OK", &[], b"abc")).await;
    let runner = runner(Config::new(server.url("/")).ignore_body(true));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert!(resp.cancelled);
    assert!(resp.data.is_empty());
    assert_eq!(resp.content_length, 3);
}

fn gzip(body: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(body).unwrap();
    enc.finish().unwrap()
}

fn zlib(body: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(body).unwrap();
    enc.finish().unwrap()
}

#[tokio::test]
async fn compressed_bodies_are_counted_after_decoding() {
    const BODY: &[u8] = b"hello world\nsecond line of text\n";
    let server = TestServer::start(|_, request| {
        if request.starts_with("GET /gzip") {
            reply("200 OK", &[("Content-Encoding", "gzip")], &gzip(BODY))
        } else if request.starts_with("GET /deflate") {
            reply("200 OK", &[("Content-Encoding", "deflate")], &zlib(BODY))
        } else {
            reply("200 OK", &[], BODY)
        }
    })
    .await;
    let runner = runner(Config::new(server.url("/FUZZ")));

    let mut seen = Vec::new();
    for path in ["plain", "gzip", "deflate"] {
        let mut req = runner.prepare(&input(&[("FUZZ", path)])).unwrap();
        let resp = runner.execute(&mut req).await.unwrap();
        assert_eq!(resp.data, BODY, "{path}");
        seen.push((resp.content_length, resp.content_words, resp.content_lines));
    }
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0], seen[2]);
}

#[tokio::test]
async fn unknown_encoding_passes_through() {
    let server =
        TestServer::start(|_, _| reply("200 OK", &[("Content-Encoding", "br")], b"\x01\x02raw"))
            .await;
    let runner = runner(Config::new(server.url("/")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert_eq!(resp.data, b"\x01\x02raw");
}

#[tokio::test]
async fn size_counts_characters_not_bytes() {
    let server = TestServer::start(|_, _| reply("200 OK", &[], b"h\xff\xc3\xa9")).await;
    let runner = runner(Config::new(server.url("/")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert_eq!(resp.data.len(), 4);
    assert_eq!(resp.content_length, 3);
}

#[tokio::test]
async fn dumps_are_attached_when_output_directory_set() {
    let server =
        TestServer::start(|_, _| reply("200 OK", &[("X-Test", "yes")], b"payload")).await;
    let config = Config::new(server.url("/FUZZ"))
        .header("X-Probe", "FUZZ")
        .output_directory("/tmp/fuzzcore-dumps");
    let runner = runner(config);
    let mut req = runner.prepare(&input(&[("FUZZ", "admin")])).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert!(req.raw.starts_with(&format!("{}\n\nStatus: 200, Size: 7", server.url("/admin"))));
    assert!(req.raw.contains("> X-Probe: admin\n"));
    assert_eq!(resp.request.raw, req.raw);
    assert!(resp.raw.starts_with("< HTTP/1.1 200\n"));
    assert!(resp.raw.contains("< X-Test: yes\n"));
    assert!(resp.raw.ends_with("\npayload"));
}

#[tokio::test]
async fn dumps_stay_empty_by_default() {
    let server = TestServer::start(|_, _| reply("200 OK", &[], b"payload")).await;
    let runner = runner(Config::new(server.url("/")));
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert!(req.raw.is_empty());
    assert!(resp.raw.is_empty());
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let runner = runner(Config::new(format!("http://{addr}/")));
    let mut req = runner.prepare(&Input::new()).unwrap();
    let err = runner.execute(&mut req).await.unwrap_err();
    assert!(matches!(err, RunnerError::Network { .. }));
    assert!(err.is_per_request());
    assert!(!err.is_timeout());
    assert_eq!(runner.pool().buffers().idle(), 1);
}

#[tokio::test]
async fn timeout_applies_to_each_redirect_hop() {
    let server = TestServer::start_delayed(Duration::from_millis(700), |idx, _| {
        if idx < 3 {
            let next = format!("/hop{}", idx + 1);
            reply("302 Found", &[("Location", next.as_str())], b"")
        } else {
            reply("200 OK", &[], b"done")
        }
    })
    .await;
    let config = Config::new(server.url("/hop0"))
        .follow_redirects(true)
        .timeout(Duration::from_secs(1));
    let runner = SimpleRunner::new(config).unwrap();
    let mut req = runner.prepare(&Input::new()).unwrap();

    let resp = runner.execute(&mut req).await.unwrap();
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.data, b"done");
    assert_eq!(server.hits(), 4);
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server =
        TestServer::start_delayed(Duration::from_millis(1500), |_, _| reply("200 OK", &[], b""))
            .await;
    let config = Config::new(server.url("/")).timeout(Duration::from_millis(500));
    let runner = SimpleRunner::new(config).unwrap();
    let mut req = runner.prepare(&Input::new()).unwrap();

    let err = runner.execute(&mut req).await.unwrap_err();
    assert!(matches!(err, RunnerError::Network { .. }));
    assert!(err.is_timeout());
    assert!(err.is_per_request());
    assert_eq!(runner.pool().buffers().idle(), 1);
}

#[tokio::test]
async fn host_header_is_sent_and_recorded() {
    let server = TestServer::start(|_, _| reply("200 OK", &[], b"")).await;
    let runner = runner(Config::new(server.url("/")).header("Host", "FUZZ.internal"));
    let mut req = runner.prepare(&input(&[("FUZZ", "dev")])).unwrap();
    assert_eq!(req.host, "dev.internal");

    runner.execute(&mut req).await.unwrap();
    assert!(server.request(0).to_lowercase().contains("host: dev.internal\r\n"));
}

fn temp_file(name: &str, contents: &str) -> String {
    let path = std::env::temp_dir().join(format!("fuzzcore-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn full_run_reports_matching_inputs() {
    let server = TestServer::start(|_, request| {
        if request.starts_with("GET /admin ") {
            reply("200 OK", &[], b"welcome admin")
        } else {
            reply("404 Not Found", &[], b"nope")
        }
    })
    .await;
    let wordlist = temp_file("words.txt", "admin\r\nmissing\n\nbackup\n");
    let output = std::env::temp_dir()
        .join(format!("fuzzcore-{}-out.json", std::process::id()))
        .display()
        .to_string();
    let url = server.url("/FUZZ");
    let args = CliArgs::parse_from([
        "fuzzcore",
        "-u",
        url.as_str(),
        "-w",
        wordlist.as_str(),
        "-t",
        "2",
        "-o",
        output.as_str(),
    ]);
    let run = build_run_config(args, ConfigFile::default()).unwrap();

    let summary = run_async(run).await.unwrap();
    assert_eq!(summary.requests, 3);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.records.len(), 1);
    assert_eq!(summary.records[0].url, server.url("/admin"));

    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
    assert_eq!(written[0]["status"], 200);
    let _ = std::fs::remove_file(&wordlist);
    let _ = std::fs::remove_file(&output);
}

#[tokio::test]
async fn full_run_combines_every_keyword() {
    let server = TestServer::start(|_, request| {
        if request.contains("user=root&pass=toor") {
            reply("200 OK", &[], b"ok")
        } else {
            reply("401 Unauthorized", &[], b"denied")
        }
    })
    .await;
    let users = temp_file("users.txt", "admin\nroot\n");
    let passwords = temp_file("pass.txt", "hunter2\ntoor\n");
    let url = server.url("/login");
    let users_arg = format!("{users}:USER");
    let passwords_arg = format!("{passwords}:PASS");
    let args = CliArgs::parse_from([
        "fuzzcore",
        "-u",
        url.as_str(),
        "-X",
        "POST",
        "-d",
        "user=USER&pass=PASS",
        "-w",
        users_arg.as_str(),
        "-w",
        passwords_arg.as_str(),
        "--fc",
        "401",
    ]);
    let run = build_run_config(args, ConfigFile::default()).unwrap();

    let summary = run_async(run).await.unwrap();
    assert_eq!(summary.requests, 4);
    assert_eq!(summary.records.len(), 1);
    let input: HashMap<_, _> = summary.records[0].input.iter().cloned().collect();
    assert_eq!(input["USER"], "root");
    assert_eq!(input["PASS"], "toor");
    let _ = std::fs::remove_file(&users);
    let _ = std::fs::remove_file(&passwords);
}
