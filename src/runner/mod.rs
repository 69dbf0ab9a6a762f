pub mod decode;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;
use crate::http::{dump, Input, Request, Response};
use crate::pool::{ConnectionPool, MAX_DOWNLOAD_SIZE};
use crate::template::Substitution;

use self::decode::{decode_body, ContentEncoding};

/// Hops followed before giving up; the initial attempt is not a hop.
pub const MAX_REDIRECTS: usize = 16;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to build HTTP client: {source}")]
    HttpClientBuild {
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to setup proxy: {proxy}: {source}")]
    ProxySetup {
        proxy: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid method: {method}")]
    InvalidMethod { method: String },

    #[error("invalid URL: {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header: {name}")]
    InvalidHeader { name: String },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("too many redirects ({hops}) starting from {url}")]
    TooManyRedirects { url: String, hops: usize },

    #[error("location header not found in {status} response from {url}")]
    MissingLocationHeader { url: String, status: u16 },

    #[error("invalid redirect location: {location}: {source}")]
    InvalidRedirectLocation {
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to decode {encoding} body from {url}: {source}")]
    Decode {
        encoding: &'static str,
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Errors that only doom the request that raised them. Anything else is
    /// a startup problem and should stop the run before it begins.
    pub fn is_per_request(&self) -> bool {
        !matches!(
            self,
            RunnerError::HttpClientBuild { .. } | RunnerError::ProxySetup { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Network { source, .. } if source.is_timeout())
    }
}

/// Turns keyword inputs into requests and requests into responses.
pub trait RunnerProvider {
    fn prepare(&self, input: &Input) -> Result<Request, RunnerError>;

    fn execute(
        &self,
        req: &mut Request,
    ) -> impl Future<Output = Result<Response, RunnerError>> + Send;
}

/// Only one runner exists; every name resolves to it.
pub fn new_runner_by_name(name: &str, config: Config) -> Result<SimpleRunner, RunnerError> {
    log::debug!("creating runner {name:?}");
    SimpleRunner::new(config)
}

#[derive(Clone, Debug)]
pub struct SimpleRunner {
    config: Arc<Config>,
    pool: ConnectionPool,
}

impl SimpleRunner {
    pub fn new(config: Config) -> Result<Self, RunnerError> {
        let pool = ConnectionPool::new(&config)?;
        Ok(Self::with_pool(Arc::new(config), pool))
    }

    pub fn with_pool(config: Arc<Config>, pool: ConnectionPool) -> Self {
        Self { config, pool }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Headers as they go on the wire, sorted by name. A default User-Agent
    /// is added when the template did not set one.
    pub fn wire_headers(&self, req: &Request) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = req
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if req.header("User-Agent").is_none() {
            out.push(("User-Agent".to_string(), self.config.user_agent()));
        }
        out.sort();
        out
    }

    fn finalize(
        &self,
        req: &mut Request,
        mut resp: Response,
        sent: &[(String, String)],
    ) -> Response {
        if self.config.dump_enabled() {
            req.raw = dump::dump_request(req, &resp, sent);
            resp.raw = dump::dump_response(&resp);
            resp.request = Arc::new(req.clone());
        }
        resp
    }
}

fn is_redirect(status: u16) -> bool {
    matches!(status, 301 | 302 | 303 | 307 | 308)
}

fn build_header_map(
    headers: &[(String, String)],
) -> Result<reqwest::header::HeaderMap, RunnerError> {
    let mut out = reqwest::header::HeaderMap::with_capacity(headers.len());
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("content-length") {
            continue;
        }
        let name = reqwest::header::HeaderName::from_bytes(k.trim().as_bytes())
            .map_err(|_| RunnerError::InvalidHeader { name: k.clone() })?;
        let value = reqwest::header::HeaderValue::from_str(v.trim())
            .map_err(|_| RunnerError::InvalidHeader { name: k.clone() })?;
        out.insert(name, value);
    }
    Ok(out)
}

impl RunnerProvider for SimpleRunner {
    fn prepare(&self, input: &Input) -> Result<Request, RunnerError> {
        let subs = Substitution::new(input);
        let mut req = Request::new(&self.config);
        req.method = subs.apply(&self.config.method);
        req.url = subs.apply_url(&self.config.url);
        req.headers = subs.apply_headers(&self.config.headers);
        req.data = subs.apply_bytes(self.config.data.as_bytes());
        if let Some(host) = req.header("Host") {
            req.host = host.to_string();
        }
        req.input = input.clone();
        Ok(req)
    }

    async fn execute(&self, req: &mut Request) -> Result<Response, RunnerError> {
        let method = reqwest::Method::from_bytes(req.method.as_bytes()).map_err(|_| {
            RunnerError::InvalidMethod {
                method: req.method.clone(),
            }
        })?;
        let sent = self.wire_headers(req);
        let headers = build_header_map(&sent)?;
        let started_from = req.url.clone();

        // Returned to the pool when dropped, on every exit below.
        let mut body = self.pool.buffers().acquire();

        let mut hops = 0usize;
        let mut http_resp = loop {
            let url = reqwest::Url::parse(&req.url).map_err(|e| RunnerError::InvalidUrl {
                url: req.url.clone(),
                source: e,
            })?;
            let mut builder = self
                .pool
                .client()
                .request(method.clone(), url.clone())
                .headers(headers.clone())
                .timeout(self.config.timeout);
            if !req.data.is_empty() {
                builder = builder.body(req.data.clone());
            }
            let http_resp = builder.send().await.map_err(|e| RunnerError::Network {
                url: req.url.clone(),
                source: e,
            })?;

            let status = http_resp.status().as_u16();
            if !(self.config.follow_redirects && is_redirect(status)) {
                break http_resp;
            }

            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(RunnerError::TooManyRedirects {
                    url: started_from,
                    hops: MAX_REDIRECTS,
                });
            }
            let location = http_resp
                .headers()
                .get(reqwest::header::LOCATION)
                .map(|v| String::from_utf8_lossy(v.as_bytes()).trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RunnerError::MissingLocationHeader {
                    url: req.url.clone(),
                    status,
                })?;
            let next = url
                .join(&location)
                .map_err(|e| RunnerError::InvalidRedirectLocation {
                    location: location.clone(),
                    source: e,
                })?;
            log::debug!("redirect hop {hops}: {} -> {next}", req.url);
            req.url = next.to_string();
        };

        let status = http_resp.status().as_u16();
        let mut resp =
            Response::from_header_map(status, http_resp.headers(), Arc::new(req.clone()));

        let declared = resp.declared_length();
        let too_large = declared.is_some_and(|size| size > MAX_DOWNLOAD_SIZE as u64);
        if self.config.ignore_body || too_large {
            log::debug!(
                "skipping body of {} (declared length {:?})",
                req.url,
                declared
            );
            resp.cancel();
            return Ok(self.finalize(req, resp, &sent));
        }

        loop {
            let chunk = http_resp.chunk().await.map_err(|e| RunnerError::Network {
                url: req.url.clone(),
                source: e,
            })?;
            let Some(chunk) = chunk else {
                break;
            };
            if body.len() + chunk.len() > MAX_DOWNLOAD_SIZE {
                log::debug!("body of {} exceeded {MAX_DOWNLOAD_SIZE} bytes", req.url);
                resp.cancel();
                return Ok(self.finalize(req, resp, &sent));
            }
            body.extend_from_slice(&chunk);
        }

        let encoding = ContentEncoding::parse(resp.header("Content-Encoding"));
        log::trace!("decoding {} bytes as {}", body.len(), encoding.as_str());
        let decoded = decode_body(encoding, &body).map_err(|e| RunnerError::Decode {
            encoding: encoding.as_str(),
            url: req.url.clone(),
            source: e,
        })?;
        resp.set_body(decoded);

        Ok(self.finalize(req, resp, &sent))
    }
}
