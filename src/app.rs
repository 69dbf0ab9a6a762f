use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use governor::{Quota, RateLimiter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task;

use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, Config, ConfigFile};
use crate::filter::MatchPolicy;
use crate::http::{Input, Response};
use crate::output::{self, OutputFormat, OutputRecord};
use crate::progress::Progress;
use crate::runner::{RunnerError, RunnerProvider, SimpleRunner};

pub const DEFAULT_KEYWORD: &str = "FUZZ";
pub const DEFAULT_MATCH_STATUS: &str = "200,204,301,302,307,401,403,405,500";
pub const DEFAULT_CONCURRENCY: u32 = 40;

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<16}: {}", label, value);
}

/// Splits `FILE[:KEYWORD]`. A trailing segment that looks like part of a
/// path (a Windows drive, a separator) is not taken as a keyword.
pub fn split_wordlist_arg(raw: &str) -> (String, String) {
    match raw.rsplit_once(':') {
        Some((path, keyword))
            if !path.is_empty() && !keyword.contains('/') && !keyword.contains('\\') =>
        {
            (path.to_string(), keyword.to_string())
        }
        _ => (raw.to_string(), DEFAULT_KEYWORD.to_string()),
    }
}

fn parse_header_line(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim_start().to_string()))
        }
        _ => Err(format!("invalid header '{raw}', expected \"Name: Value\"")),
    }
}

#[derive(Debug)]
pub(crate) struct RunConfig {
    pub(crate) config: Config,
    pub(crate) wordlists: Vec<(String, String)>,
    pub(crate) policy: MatchPolicy,
    pub(crate) concurrency: usize,
    pub(crate) rate: u32,
    pub(crate) output: Option<String>,
    pub(crate) output_format: OutputFormat,
    pub(crate) no_color: bool,
}

impl RunConfig {
    fn keywords(&self) -> Vec<String> {
        self.wordlists.iter().map(|(_, k)| k.clone()).collect()
    }
}

/// What a finished run produced, kept for the output file and for tests.
#[derive(Debug, Default)]
pub(crate) struct RunSummary {
    pub(crate) requests: usize,
    pub(crate) errors: usize,
    pub(crate) records: Vec<OutputRecord>,
}

fn pick_list(cli: Vec<String>, file: Option<Vec<String>>) -> Vec<String> {
    if cli.is_empty() {
        file.unwrap_or_default()
    } else {
        cli
    }
}

pub(crate) fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let url = args
        .url
        .or(cfg.url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| "missing target url (-u)".to_string())?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let concurrency = args
        .concurrency
        .or(cfg.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1) as usize;
    let rate = args.rate.or(cfg.rate).unwrap_or(0);
    let timeout = args
        .timeout
        .or(cfg.timeout)
        .unwrap_or(config::DEFAULT_TIMEOUT_SECONDS);
    let follow_redirects = args.follow_redirects || cfg.follow_redirects.unwrap_or(false);
    let ignore_body = args.ignore_body || cfg.ignore_body.unwrap_or(false);
    let output_directory = args
        .output_directory
        .or(cfg.output_directory)
        .map(|d| config::expand_tilde_string(&d))
        .unwrap_or_default();

    let mut config = Config::new(url)
        .method(
            args.method
                .or(cfg.method)
                .unwrap_or_else(|| config::DEFAULT_METHOD.to_string()),
        )
        .data(args.data.or(cfg.data).unwrap_or_default())
        .timeout(Duration::from_secs(timeout))
        .follow_redirects(follow_redirects)
        .ignore_body(ignore_body)
        .output_directory(output_directory)
        .proxy(args.proxy.or(cfg.proxy));
    for raw in pick_list(args.headers, cfg.headers) {
        let (name, value) = parse_header_line(&raw)?;
        config = config.header(name, value);
    }

    let mut wordlists: Vec<(String, String)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for raw in pick_list(args.wordlists, cfg.wordlists) {
        let (path, keyword) = split_wordlist_arg(&raw);
        if !seen.insert(keyword.clone()) {
            return Err(format!("keyword '{keyword}' is bound to more than one wordlist"));
        }
        wordlists.push((config::expand_tilde_string(&path), keyword));
    }
    if wordlists.is_empty() {
        return Err("no wordlist given (-w)".to_string());
    }

    let mut policy = MatchPolicy::new();
    let match_status = args
        .match_status
        .or(cfg.match_status)
        .unwrap_or_else(|| DEFAULT_MATCH_STATUS.to_string());
    let matchers = [
        ("status", Some(match_status)),
        ("size", args.match_size.or(cfg.match_size)),
        ("word", args.match_words.or(cfg.match_words)),
        ("line", args.match_lines.or(cfg.match_lines)),
        ("regexp", args.match_regex.or(cfg.match_regex)),
    ];
    for (name, value) in matchers {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            policy
                .add_matcher(name, &value)
                .map_err(|e| e.to_string())?;
        }
    }
    let filters = [
        ("status", args.filter_status.or(cfg.filter_status)),
        ("size", args.filter_size.or(cfg.filter_size)),
        ("word", args.filter_words.or(cfg.filter_words)),
        ("line", args.filter_lines.or(cfg.filter_lines)),
        ("regexp", args.filter_regex.or(cfg.filter_regex)),
    ];
    for (name, value) in filters {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            policy.add_filter(name, &value).map_err(|e| e.to_string())?;
        }
    }

    let output = args
        .output
        .or(cfg.output)
        .filter(|o| !o.trim().is_empty())
        .map(|o| config::expand_tilde_string(&o));
    let output_format = match args.output_format.or(cfg.output_format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid --output-format '{raw}'"))?,
        None => output
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Text),
    };

    let run = RunConfig {
        config,
        wordlists,
        policy,
        concurrency,
        rate,
        output,
        output_format,
        no_color,
    };
    run.config
        .validate(&run.keywords())
        .map_err(|e| e.to_string())?;
    Ok(run)
}

/// One value per non-empty line, with CRLF endings tolerated. Values are
/// kept as raw bytes.
async fn read_wordlist(path: &str) -> Result<Vec<Vec<u8>>, String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| format!("failed to open wordlist '{path}': {e}"))?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .await
        .map_err(|e| format!("failed to read wordlist '{path}': {e}"))?;
    let words: Vec<Vec<u8>> = contents
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| line.to_vec())
        .collect();
    if words.is_empty() {
        return Err(format!("wordlist '{path}' is empty"));
    }
    Ok(words)
}

fn describe_input(input: &[(String, String)]) -> String {
    match input {
        [(_, value)] => value.clone(),
        _ => input
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join(" | "),
    }
}

fn format_result_line(record: &OutputRecord) -> String {
    let status = record.status.to_string();
    let status = match record.status {
        200..=299 => status.green(),
        300..=399 => status.blue(),
        400..=499 => status.yellow(),
        500..=599 => status.red(),
        _ => status.normal(),
    };
    let mut line = format!(
        "{:<24} [Status: {}, Size: {}, Words: {}, Lines: {}]",
        describe_input(&record.input),
        status,
        record.size,
        record.words,
        record.lines
    );
    if !record.redirect_location.is_empty() {
        line.push_str(&format!(" -> {}", record.redirect_location.cyan()));
    }
    line
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

type JobOutcome = (String, Result<Response, RunnerError>);

pub(crate) async fn run_async(run: RunConfig) -> Result<RunSummary, String> {
    if run.no_color {
        colored::control::set_override(false);
    }

    let keywords = run.keywords();
    let mut lists: Vec<Vec<Vec<u8>>> = Vec::with_capacity(run.wordlists.len());
    for (path, keyword) in run.wordlists.iter() {
        let words = read_wordlist(path).await?;
        log::info!("loaded {} values for {keyword} from {path}", words.len());
        lists.push(words);
    }
    let total: usize = lists.iter().map(|l| l.len()).product();

    format_kv_line("Method", &run.config.method);
    format_kv_line("URL", &run.config.url);
    for (path, keyword) in run.wordlists.iter() {
        format_kv_line("Wordlist", &format!("{keyword}: {path}"));
    }
    format_kv_line("Follow redirects", &run.config.follow_redirects.to_string());
    format_kv_line("Timeout", &run.config.timeout.as_secs().to_string());
    format_kv_line("Threads", &run.concurrency.to_string());
    for m in run.policy.matchers() {
        format_kv_line("Matcher", &m.repr());
    }
    for f in run.policy.filters() {
        format_kv_line("Filter", &f.repr());
    }
    println!();

    let dump_dir = run
        .config
        .dump_enabled()
        .then(|| std::path::PathBuf::from(&run.config.output_directory));
    let runner = Arc::new(SimpleRunner::new(run.config).map_err(|e| e.to_string())?);
    let limiter = NonZeroU32::new(run.rate)
        .map(|r| Arc::new(RateLimiter::direct(Quota::per_second(r))));

    let pb = ProgressBar::new(total.max(1) as u64);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(200));
    pb.set_style(
        ProgressStyle::with_template(
            ":: Progress: [{pos}/{len}] :: {per_sec} :: Duration: [{elapsed_precise}] :: {msg}",
        )
        .map_err(|e| format!("failed to build progress bar style: {e}"))?
        .progress_chars(r#"#>-"#),
    );

    let mut progress = Progress::new(total, 1);
    progress.queue_pos = 1;
    let mut summary = RunSummary::default();
    let mut in_flight = FuturesUnordered::new();

    let combos = lists.iter().map(|l| l.iter()).multi_cartesian_product();
    for values in combos {
        let input: Input = keywords
            .iter()
            .cloned()
            .zip(values.into_iter().cloned())
            .collect();
        let runner = runner.clone();
        let limiter = limiter.clone();
        in_flight.push(task::spawn(async move {
            if let Some(lim) = limiter.as_ref() {
                lim.until_ready().await;
            }
            let label = describe_raw_input(&input);
            let outcome = match runner.prepare(&input) {
                Ok(mut req) => runner.execute(&mut req).await,
                Err(e) => Err(e),
            };
            (label, outcome)
        }));

        if in_flight.len() >= run.concurrency {
            if let Some(joined) = in_flight.next().await {
                let outcome = joined.map_err(|e| format!("request task failed: {e}"))?;
                handle_outcome(
                    outcome,
                    &run.policy,
                    dump_dir.as_deref(),
                    &pb,
                    &mut progress,
                    &mut summary,
                )
                .await?;
            }
        }
    }
    while let Some(joined) = in_flight.next().await {
        let outcome = joined.map_err(|e| format!("request task failed: {e}"))?;
        handle_outcome(
            outcome,
            &run.policy,
            dump_dir.as_deref(),
            &pb,
            &mut progress,
            &mut summary,
        )
        .await?;
    }
    pb.finish_and_clear();

    summary.requests = progress.req_count;
    summary.errors = progress.error_count;

    if let Some(outfile_path) = run.output.as_deref() {
        let rendered = output::render(run.output_format, &summary.records);
        let mut outfile = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(outfile_path)
            .await
            .map_err(|e| format!("failed to open output file: {e}"))?;
        outfile
            .write_all(&rendered)
            .await
            .map_err(|e| format!("failed to write output file: {e}"))?;
        outfile
            .flush()
            .await
            .map_err(|e| format!("failed to flush output file: {e}"))?;
    }

    println!();
    println!(
        ":: Completed :: {} requests, {} errors, {} matches in {}s ::",
        progress.req_count,
        progress.error_count,
        summary.records.len(),
        progress.elapsed().as_secs()
    );
    Ok(summary)
}

fn describe_raw_input(input: &Input) -> String {
    let mut pairs: Vec<(String, String)> = input
        .iter()
        .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
        .collect();
    pairs.sort();
    describe_input(&pairs)
}

async fn handle_outcome(
    outcome: JobOutcome,
    policy: &MatchPolicy,
    dump_dir: Option<&std::path::Path>,
    pb: &ProgressBar,
    progress: &mut Progress,
    summary: &mut RunSummary,
) -> Result<(), String> {
    let (label, result) = outcome;
    progress.req_count += 1;
    pb.inc(1);
    match result {
        Ok(mut resp) => {
            if policy.is_interesting(&resp) {
                if let Some(dir) = dump_dir {
                    match output::write_dump(dir, &resp).await {
                        Ok(path) => resp.result_file = path.display().to_string(),
                        Err(e) => log::warn!("failed to write dump for {label}: {e}"),
                    }
                }
                let record = OutputRecord::from_response(&resp);
                pb.println(format_result_line(&record));
                summary.records.push(record);
            }
        }
        Err(e) if e.is_per_request() => {
            progress.error_count += 1;
            if e.is_timeout() {
                log::info!("{label}: {e}");
            } else {
                log::warn!("{label}: {e}");
            }
            pb.set_message(format!("Errors: {}", progress.error_count));
        }
        Err(e) => return Err(e.to_string()),
    }
    Ok(())
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp => {
                print!("{}", CliArgs::command().render_long_help());
                return Ok(());
            }
            ErrorKind::DisplayVersion => {
                let cmd = CliArgs::command();
                print!("{}", cmd.render_version());
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_logging(args.verbose);

    let cfg = match args.config.as_deref() {
        Some(path) => config::load_config(&config::expand_tilde(path), false),
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true),
            None => Ok(ConfigFile::default()),
        },
    }
    .map_err(|e| e.to_string())?;

    let run = build_run_config(args, cfg)?;
    log::debug!("run configuration: {:?}", run.config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
