pub mod app;
pub mod cli;
pub mod config;
pub mod filter;
pub mod http;
pub mod output;
pub mod pool;
pub mod progress;
pub mod runner;
pub mod template;

pub use crate::config::{Config, ConfigError};
pub use crate::filter::{new_filter_by_name, FilterError, FilterProvider, MatchPolicy};
pub use crate::http::{Input, Request, Response};
pub use crate::runner::{new_runner_by_name, RunnerError, RunnerProvider, SimpleRunner};

#[cfg(test)]
mod tests;
