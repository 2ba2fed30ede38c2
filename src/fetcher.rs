use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use tracing::{debug, info, warn};

use crate::config::{Config, USER_AGENT as BROWSER_AGENT};
use crate::error::{AppError, Result};
use crate::types::{Filing, SecFilingsResponse};

/// Where filings come from. An empty list is a valid answer ("nothing
/// published right now"); transport and decoding problems are errors the
/// caller handles per symbol.
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn fetch(&self, symbol: &str, limit: usize) -> Result<Vec<Filing>>;
}

/// Filing source backed by the Nasdaq company API.
pub struct NasdaqClient {
    client: reqwest::Client,
    base_url: String,
}

impl NasdaqClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.nasdaq_api_url.trim_end_matches('/').to_string(),
        })
    }

    fn filings_url(&self, symbol: &str, limit: usize) -> String {
        format!(
            "{}/{}/sec-filings?limit={}&sortColumn=filed&sortOrder=desc&IsQuoteMedia=true",
            self.base_url, symbol, limit
        )
    }
}

#[async_trait]
impl FilingSource for NasdaqClient {
    async fn fetch(&self, symbol: &str, limit: usize) -> Result<Vec<Filing>> {
        let url = self.filings_url(symbol, limit);
        debug!(symbol = %symbol, "Fetching SEC filings from: {url}");

        let resp = self
            .client
            .get(&url)
            .header(USER_AGENT, BROWSER_AGENT)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "API request for {symbol} failed with status {status}"
            )));
        }

        let body = resp.text().await?;
        let filings = parse_filings_response(symbol, &body)?;
        info!(
            symbol = %symbol,
            count = filings.len(),
            "[{symbol}] Successfully fetched {} filings",
            filings.len(),
        );
        Ok(filings)
    }
}

/// Decodes the API envelope. A non-200 `rCode` is an error; a missing `data`
/// or `rows` is an empty result.
pub fn parse_filings_response(symbol: &str, body: &str) -> Result<Vec<Filing>> {
    let resp: SecFilingsResponse = serde_json::from_str(body)?;

    if resp.status.r_code != 200 {
        let message = resp.message.unwrap_or_default();
        return Err(AppError::Upstream(format!(
            "API returned error code {} for {symbol}: {message}",
            resp.status.r_code
        )));
    }

    match resp.data.and_then(|d| {
        if let Some(total) = d.total_records {
            let echoed = d.symbol.as_deref().unwrap_or(symbol);
            debug!(symbol = %echoed, total, "Upstream reports {total} total records");
        }
        d.rows
    }) {
        Some(rows) => Ok(rows),
        None => {
            warn!(symbol = %symbol, "[{symbol}] No filings data found in API response");
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows() {
        let body = r#"{
            "data": {
                "symbol": "PCSA",
                "totalRecords": 120,
                "rows": [
                    {"companyName": "Processa", "reportingOwner": "", "formType": "8-K", "filed": "10/14/2025", "period": "10/10/2025",
                     "view": {"htmlLink": "https://x/1.htm", "docLink": "", "pdfLink": "https://x/1.pdf", "xbrLink": "", "ixbrlContent": "", "xlsLink": "", "xBrlSubDoc": ""}},
                    {"companyName": "Processa", "reportingOwner": "Young George", "formType": "4", "filed": "10/10/2025", "period": "10/08/2025", "view": {}}
                ],
                "headers": {"companyName": "Company"}
            },
            "message": null,
            "status": {"rCode": 200, "bCodeMessage": null, "developerMessage": null}
        }"#;
        let filings = parse_filings_response("PCSA", body).unwrap();
        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].form_type, "8-K");
        assert_eq!(filings[0].view.pdf(), Some("https://x/1.pdf"));
        assert_eq!(filings[1].owner(), Some("Young George"));
    }

    #[test]
    fn null_data_is_empty_not_error() {
        let body = r#"{"data": null, "message": null, "status": {"rCode": 200}}"#;
        assert!(parse_filings_response("PCSA", body).unwrap().is_empty());

        let body = r#"{"data": {"symbol": "PCSA", "rows": null}, "status": {"rCode": 200}}"#;
        assert!(parse_filings_response("PCSA", body).unwrap().is_empty());
    }

    #[test]
    fn bad_rcode_is_error() {
        let body = r#"{"data": null, "message": "Symbol not found", "status": {"rCode": 400}}"#;
        let err = parse_filings_response("NOPE", body).unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
        assert!(err.to_string().contains("400"));
    }

    #[test]
    fn malformed_payload_is_error() {
        assert!(matches!(
            parse_filings_response("PCSA", "<html>blocked</html>"),
            Err(AppError::Json(_))
        ));
    }

    #[test]
    fn url_carries_symbol_and_limit() {
        let client = NasdaqClient {
            client: reqwest::Client::new(),
            base_url: "https://api.example.com/api/company".to_string(),
        };
        assert_eq!(
            client.filings_url("PCSA", 14),
            "https://api.example.com/api/company/PCSA/sec-filings?limit=14&sortColumn=filed&sortOrder=desc&IsQuoteMedia=true"
        );
    }
}
