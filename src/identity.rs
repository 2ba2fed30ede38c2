use crate::types::Filing;

/// Joins the identity components.
pub const IDENTITY_SEPARATOR: char = '_';

/// Stands in for the reporting owner on company-level filings.
pub const COMPANY_PLACEHOLDER: &str = "company";

/// Stable identity of a filing within one symbol: `filed_formType_owner`.
///
/// The filing API exposes no canonical id, so this is a composite surrogate
/// key. Two distinct filings by the same owner with the same form type on the
/// same day collapse into one identity; that collision is accepted.
pub fn filing_id(filing: &Filing) -> String {
    let owner = filing.owner().unwrap_or(COMPANY_PLACEHOLDER);
    format!(
        "{}{sep}{}{sep}{}",
        filing.filed,
        filing.form_type,
        owner,
        sep = IDENTITY_SEPARATOR
    )
}
