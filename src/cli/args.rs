use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fuzzcore",
    version,
    about = "keyword-driven HTTP fuzzer",
    long_about = "Fuzzcore substitutes wordlist values into a request template, sends each request and reports the responses your matchers accept and your filters do not reject.\n\nExamples:\n  fuzzcore -u https://target.tld/FUZZ -w words.txt\n  fuzzcore -u https://target.tld/login -X POST -d 'user=USER&pass=PASS' -w users.txt:USER -w pass.txt:PASS --fc 401\n  fuzzcore -u https://target.tld/?q=FUZZ -w xss.txt --mr 'value=FUZZ'"
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'o',
        long = "o",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write matched results to a file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output file format: text, json or xml (inferred from the file name by default)."
    )]
    pub output_format: Option<String>,

    #[arg(
        long = "od",
        visible_alias = "output-directory",
        value_name = "DIR",
        help_heading = "Output",
        help = "Write a request/response dump of every match into this directory."
    )]
    pub output_directory: Option<String>,

    #[arg(
        short = 'u',
        long = "u",
        visible_alias = "url",
        value_name = "URL",
        help_heading = "Request",
        help = "Target URL template."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'X',
        long = "x",
        visible_alias = "method",
        value_name = "METHOD",
        help_heading = "Request",
        help = "HTTP method template (default GET)."
    )]
    pub method: Option<String>,

    #[arg(
        short = 'H',
        long = "h",
        visible_alias = "header",
        value_name = "\"Name: Value\"",
        action = ArgAction::Append,
        help_heading = "Request",
        help = "Header template (repeatable)."
    )]
    pub headers: Vec<String>,

    #[arg(
        short = 'd',
        long = "d",
        visible_alias = "data",
        value_name = "DATA",
        help_heading = "Request",
        help = "Request body template."
    )]
    pub data: Option<String>,

    #[arg(
        short = 'w',
        long = "w",
        visible_alias = "wordlist",
        value_name = "FILE[:KEYWORD]",
        action = ArgAction::Append,
        help_heading = "Input",
        help = "Wordlist and the keyword it fills (keyword defaults to FUZZ). Repeatable."
    )]
    pub wordlists: Vec<String>,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.fuzzcore/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        short = 't',
        long = "t",
        visible_alias = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Requests in flight at once."
    )]
    pub concurrency: Option<u32>,

    #[arg(
        long = "rate",
        value_name = "RPS",
        help_heading = "Performance",
        help = "Request rate limit (requests per second, 0 = unlimited)."
    )]
    pub rate: Option<u32>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Performance",
        help = "Timeout for each attempt, redirect hops included."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'r',
        long = "r",
        visible_alias = "follow-redirects",
        help_heading = "Request",
        help = "Follow redirects (up to 16 hops)."
    )]
    pub follow_redirects: bool,

    #[arg(
        long = "ignore-body",
        help_heading = "Request",
        help = "Do not download response bodies."
    )]
    pub ignore_body: bool,

    #[arg(
        short = 'x',
        long = "proxy",
        value_name = "URL",
        help_heading = "Request",
        help = "Proxy URL (http, https or socks5)."
    )]
    pub proxy: Option<String>,

    #[arg(
        long = "mc",
        value_name = "CODES",
        help_heading = "Matchers",
        help = "Match status codes (e.g. 200,301-399 or all)."
    )]
    pub match_status: Option<String>,

    #[arg(
        long = "ms",
        value_name = "SIZES",
        help_heading = "Matchers",
        help = "Match response size."
    )]
    pub match_size: Option<String>,

    #[arg(
        long = "mw",
        value_name = "WORDS",
        help_heading = "Matchers",
        help = "Match word count."
    )]
    pub match_words: Option<String>,

    #[arg(
        long = "ml",
        value_name = "LINES",
        help_heading = "Matchers",
        help = "Match line count."
    )]
    pub match_lines: Option<String>,

    #[arg(
        long = "mr",
        value_name = "REGEX",
        help_heading = "Matchers",
        help = "Match regex over headers and body; keywords are replaced by their value."
    )]
    pub match_regex: Option<String>,

    #[arg(
        long = "fc",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Filter status codes."
    )]
    pub filter_status: Option<String>,

    #[arg(
        long = "fs",
        value_name = "SIZES",
        help_heading = "Filters",
        help = "Filter response size."
    )]
    pub filter_size: Option<String>,

    #[arg(
        long = "fw",
        value_name = "WORDS",
        help_heading = "Filters",
        help = "Filter word count."
    )]
    pub filter_words: Option<String>,

    #[arg(
        long = "fl",
        value_name = "LINES",
        help_heading = "Filters",
        help = "Filter line count."
    )]
    pub filter_lines: Option<String>,

    #[arg(
        long = "fr",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Filter regex over headers and body; keywords are replaced by their value."
    )]
    pub filter_regex: Option<String>,
}
