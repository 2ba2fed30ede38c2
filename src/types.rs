use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Filing
// ---------------------------------------------------------------------------

/// One regulatory disclosure as returned by the filing API.
///
/// `filed` is kept as the upstream string and never reparsed; it only feeds
/// identity and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filing {
    #[serde(default)]
    pub company_name: String,
    /// Empty or absent for company-level (non-insider) filings.
    #[serde(default)]
    pub reporting_owner: Option<String>,
    pub form_type: String,
    pub filed: String,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub view: FilingView,
}

impl Filing {
    /// Reporting owner, or None for company filings.
    pub fn owner(&self) -> Option<&str> {
        non_empty(&self.reporting_owner)
    }

    pub fn period(&self) -> Option<&str> {
        non_empty(&self.period)
    }
}

/// Document links attached to a filing. Upstream sends empty strings for
/// formats it does not have; accessors fold those into None.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingView {
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub doc_link: Option<String>,
    #[serde(default)]
    pub pdf_link: Option<String>,
    #[serde(default)]
    pub xbr_link: Option<String>,
    #[serde(default)]
    pub ixbrl_content: Option<String>,
    #[serde(default)]
    pub xls_link: Option<String>,
    #[serde(default, rename = "xBrlSubDoc")]
    pub xbrl_sub_doc: Option<String>,
}

impl FilingView {
    pub fn html(&self) -> Option<&str> {
        non_empty(&self.html_link)
    }

    pub fn pdf(&self) -> Option<&str> {
        non_empty(&self.pdf_link)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Notification batch
// ---------------------------------------------------------------------------

/// A newly detected filing tagged with the symbol it was fetched for.
/// Collected per cycle and handed to the notifier once; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilingWithSymbol {
    pub symbol: String,
    pub filing: Filing,
}

/// Distinct symbols of a batch in encounter order.
pub fn batch_symbols(batch: &[FilingWithSymbol]) -> Vec<&str> {
    let mut symbols: Vec<&str> = Vec::new();
    for entry in batch {
        if !symbols.contains(&entry.symbol.as_str()) {
            symbols.push(&entry.symbol);
        }
    }
    symbols
}

// ---------------------------------------------------------------------------
// Filing API envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SecFilingsResponse {
    #[serde(default)]
    pub data: Option<SecFilingsData>,
    #[serde(default)]
    pub message: Option<String>,
    pub status: ResponseStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecFilingsData {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub total_records: Option<u64>,
    #[serde(default)]
    pub rows: Option<Vec<Filing>>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseStatus {
    #[serde(rename = "rCode")]
    pub r_code: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filing_with_nulls_and_empty_links() {
        let raw = r#"{
            "companyName": "Processa Pharmaceuticals, Inc.",
            "reportingOwner": "",
            "formType": "8-K",
            "filed": "10/14/2025",
            "period": null,
            "view": {"htmlLink": "https://example.com/a.htm", "pdfLink": "", "xBrlSubDoc": "x"}
        }"#;
        let filing: Filing = serde_json::from_str(raw).unwrap();
        assert_eq!(filing.form_type, "8-K");
        assert_eq!(filing.owner(), None);
        assert_eq!(filing.period(), None);
        assert_eq!(filing.view.html(), Some("https://example.com/a.htm"));
        assert_eq!(filing.view.pdf(), None);
        assert_eq!(filing.view.xbrl_sub_doc.as_deref(), Some("x"));
    }

    #[test]
    fn missing_view_defaults_to_no_links() {
        let raw = r#"{"companyName": "Acme", "reportingOwner": "Doe John", "formType": "4", "filed": "2025-01-02"}"#;
        let filing: Filing = serde_json::from_str(raw).unwrap();
        assert_eq!(filing.owner(), Some("Doe John"));
        assert_eq!(filing.view, FilingView::default());
    }

    #[test]
    fn batch_symbols_keep_encounter_order() {
        let filing: Filing = serde_json::from_str(
            r#"{"companyName": "Acme", "formType": "4", "filed": "2025-01-02"}"#,
        )
        .unwrap();
        let batch: Vec<FilingWithSymbol> = ["BBB", "AAA", "BBB", "CCC"]
            .iter()
            .map(|s| FilingWithSymbol { symbol: s.to_string(), filing: filing.clone() })
            .collect();
        assert_eq!(batch_symbols(&batch), vec!["BBB", "AAA", "CCC"]);
    }
}
