use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(0) = args.concurrency {
        return Err("invalid concurrency, expected positive integer".to_string());
    }
    if let Some(0) = args.timeout {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    for raw in args.headers.iter() {
        let valid = raw
            .split_once(':')
            .map(|(name, _)| !name.trim().is_empty())
            .unwrap_or(false);
        if !valid {
            return Err(format!("invalid header '{raw}', expected \"Name: Value\""));
        }
    }
    for raw in args.wordlists.iter() {
        let (path, keyword) = crate::app::split_wordlist_arg(raw);
        if path.trim().is_empty() || keyword.trim().is_empty() {
            return Err(format!("invalid wordlist '{raw}', expected FILE[:KEYWORD]"));
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!("invalid --output-format '{raw}'"));
        }
    }
    Ok(())
}
