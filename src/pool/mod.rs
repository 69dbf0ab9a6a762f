use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::runner::RunnerError;

/// Download results up to 5 MiB.
pub const MAX_DOWNLOAD_SIZE: usize = 5_242_880;

const BUFFER_CAPACITY: usize = 64 * 1024;
const MAX_POOLED_BUFFERS: usize = 256;

/// Transport shared by every in-flight request of a run. Cloning is cheap and
/// all clones share the same connections and body buffers.
#[derive(Clone, Debug)]
pub struct ConnectionPool {
    client: reqwest::Client,
    buffers: BufferPool,
}

impl ConnectionPool {
    pub fn new(config: &Config) -> Result<Self, RunnerError> {
        Ok(Self {
            client: build_client(config)?,
            buffers: BufferPool::new(MAX_POOLED_BUFFERS),
        })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn buffers(&self) -> &BufferPool {
        &self.buffers
    }
}

/// Redirects are never followed by the client itself; the runner drives them
/// so every hop is observable and bounded.
fn build_client(config: &Config) -> Result<reqwest::Client, RunnerError> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(config.max_idle_per_host)
        .tcp_nodelay(true)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy).map_err(|e| RunnerError::ProxySetup {
            proxy: proxy.to_string(),
            source: e,
        })?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| RunnerError::HttpClientBuild { source: e })
}

/// Free list of body buffers. A buffer is handed out per `execute` call and
/// comes back when its guard drops, whatever path the call exits through.
#[derive(Clone, Debug)]
pub struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
    max_pooled: usize,
}

impl BufferPool {
    pub fn new(max_pooled: usize) -> Self {
        Self {
            free: Arc::new(Mutex::new(Vec::new())),
            max_pooled,
        }
    }

    pub fn acquire(&self) -> PooledBuffer {
        let buf = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_else(|| Vec::with_capacity(BUFFER_CAPACITY));
        PooledBuffer {
            buf,
            pool: self.clone(),
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > MAX_DOWNLOAD_SIZE {
            return;
        }
        buf.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_pooled {
                free.push(buf);
            }
        }
    }
}

pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
