use std::time::Duration;

use crate::error::{AppError, Result};

pub const NASDAQ_API_URL: &str = "https://api.nasdaq.com/api/company";
pub const RESEND_API_URL: &str = "https://api.resend.com";

/// Public listing page for a symbol's filings, linked from notification emails.
pub const NASDAQ_FILINGS_PAGE: &str = "https://www.nasdaq.com/market-activity/stocks";

/// The filing API rejects requests without a browser-like agent.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

pub const DEFAULT_STATE_FILE: &str = "./watcher-state.json";
pub const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 30;
pub const DEFAULT_FILINGS_LIMIT: usize = 14;
pub const DEFAULT_EMAIL_SUBJECT: &str = "SEC Filing Alert";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Variables that must be present for the watcher to start.
const REQUIRED_VARS: &[&str] = &["RESEND_API_KEY", "EMAIL_FROM", "EMAIL_TO", "SYMBOLS"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Tickers to watch, upper-cased, in configured order (SYMBOLS, comma-separated).
    pub symbols: Vec<String>,
    pub check_interval_minutes: u64,
    /// Per-symbol fetch limit (FILINGS_LIMIT)
    pub filings_limit: usize,
    pub state_file: String,
    pub resend_api_key: String,
    pub email_from: String,
    pub email_to: Vec<String>,
    pub email_subject: String,
    pub run_once: bool,
    pub send_test_email: bool,
    pub fetch_timeout_secs: u64,
    pub notify_timeout_secs: u64,
    pub nasdaq_api_url: String,
    pub resend_api_url: String,
    /// Status API port; the API is not started when unset (API_PORT)
    pub api_port: Option<u16>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let symbols = parse_symbols(&get("SYMBOLS").unwrap_or_default());
        if symbols.is_empty() {
            return Err(AppError::Config(
                "SYMBOLS contains no tickers (example: SYMBOLS=PCSA,AAPL,TSLA)".to_string(),
            ));
        }

        let check_interval_minutes = parse_positive(
            "CHECK_INTERVAL_MINUTES",
            get("CHECK_INTERVAL_MINUTES"),
            DEFAULT_CHECK_INTERVAL_MINUTES,
        )?;
        let filings_limit =
            parse_positive("FILINGS_LIMIT", get("FILINGS_LIMIT"), DEFAULT_FILINGS_LIMIT as u64)?
                as usize;
        let fetch_timeout_secs = parse_positive(
            "FETCH_TIMEOUT_SECS",
            get("FETCH_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;
        let notify_timeout_secs = parse_positive(
            "NOTIFY_TIMEOUT_SECS",
            get("NOTIFY_TIMEOUT_SECS"),
            DEFAULT_TIMEOUT_SECS,
        )?;

        let api_port = match get("API_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                AppError::Config("API_PORT must be a valid port number".to_string())
            })?),
            None => None,
        };

        Ok(Self {
            symbols,
            check_interval_minutes,
            filings_limit,
            state_file: get("STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
            resend_api_key: get("RESEND_API_KEY").unwrap_or_default(),
            email_from: get("EMAIL_FROM").unwrap_or_default(),
            email_to: split_list(&get("EMAIL_TO").unwrap_or_default()),
            email_subject: get("EMAIL_SUBJECT")
                .unwrap_or_else(|| DEFAULT_EMAIL_SUBJECT.to_string()),
            run_once: parse_flag(get("RUN_ONCE")),
            send_test_email: parse_flag(get("SEND_TEST_EMAIL")),
            fetch_timeout_secs,
            notify_timeout_secs,
            nasdaq_api_url: get("NASDAQ_API_URL").unwrap_or_else(|| NASDAQ_API_URL.to_string()),
            resend_api_url: get("RESEND_API_URL").unwrap_or_else(|| RESEND_API_URL.to_string()),
            api_port,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }
}

/// Upper-cases and dedupes tickers, keeping the first occurrence's position.
fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for s in split_list(raw) {
        let s = s.to_uppercase();
        if !symbols.contains(&s) {
            symbols.push(s);
        }
    }
    symbols
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(raw: Option<String>) -> bool {
    raw.map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_positive(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AppError::Config(format!("{key} must be a positive integer, got {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("RESEND_API_KEY", "re_123"),
            ("EMAIL_FROM", "watcher@example.com"),
            ("EMAIL_TO", "a@example.com, b@example.com"),
            ("SYMBOLS", " pcsa, aapl,,PCSA ,tsla"),
        ]
    }

    #[test]
    fn defaults_applied_when_optional_vars_absent() {
        let cfg = Config::from_lookup(lookup(&required())).unwrap();
        assert_eq!(cfg.symbols, vec!["PCSA", "AAPL", "TSLA"]);
        assert_eq!(cfg.email_to, vec!["a@example.com", "b@example.com"]);
        assert_eq!(cfg.check_interval_minutes, 30);
        assert_eq!(cfg.filings_limit, 14);
        assert_eq!(cfg.state_file, DEFAULT_STATE_FILE);
        assert_eq!(cfg.email_subject, DEFAULT_EMAIL_SUBJECT);
        assert!(!cfg.run_once);
        assert!(!cfg.send_test_email);
        assert_eq!(cfg.api_port, None);
        assert_eq!(cfg.check_interval(), Duration::from_secs(1800));
    }

    #[test]
    fn missing_vars_are_all_named() {
        let err = Config::from_lookup(lookup(&[("EMAIL_FROM", "x@example.com")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("RESEND_API_KEY"), "{msg}");
        assert!(msg.contains("EMAIL_TO"), "{msg}");
        assert!(msg.contains("SYMBOLS"), "{msg}");
        assert!(!msg.contains("EMAIL_FROM"), "{msg}");
    }

    #[test]
    fn symbols_of_only_separators_is_an_error() {
        let mut vars = required();
        vars.retain(|(k, _)| *k != "SYMBOLS");
        vars.push(("SYMBOLS", " , ,"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn flags_and_numbers_parse() {
        let mut vars = required();
        vars.extend([
            ("RUN_ONCE", "true"),
            ("SEND_TEST_EMAIL", "TRUE"),
            ("CHECK_INTERVAL_MINUTES", "5"),
            ("FILINGS_LIMIT", "3"),
            ("API_PORT", "8080"),
        ]);
        let cfg = Config::from_lookup(lookup(&vars)).unwrap();
        assert!(cfg.run_once);
        assert!(cfg.send_test_email);
        assert_eq!(cfg.check_interval_minutes, 5);
        assert_eq!(cfg.filings_limit, 3);
        assert_eq!(cfg.api_port, Some(8080));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut vars = required();
        vars.push(("CHECK_INTERVAL_MINUTES", "0"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());

        let mut vars = required();
        vars.push(("FILINGS_LIMIT", "many"));
        assert!(Config::from_lookup(lookup(&vars)).is_err());
    }
}
