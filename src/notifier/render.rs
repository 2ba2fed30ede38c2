//! Email bodies for filing alerts and the connectivity test.
//!
//! Every upstream value interpolated into HTML is text-escaped; links are
//! attribute-escaped.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::config::NASDAQ_FILINGS_PAGE;
use crate::types::{batch_symbols, FilingWithSymbol};

/// Symbols shown in a subject line before collapsing into "+N more".
const SUBJECT_SYMBOLS: usize = 3;

/// A rendered message, provider-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn format_checked_at(at: DateTime<Utc>) -> String {
    at.format("%A, %B %-d, %Y at %H:%M UTC").to_string()
}

fn filings_page(symbol: &str) -> String {
    format!("{NASDAQ_FILINGS_PAGE}/{}/sec-filings", symbol.to_lowercase())
}

/// `"AAA, BBB - 3 New Filings"`, or `"AAA, BBB, CCC +2 more - 9 New Filings"`.
pub fn subject(batch: &[FilingWithSymbol]) -> String {
    let symbols = batch_symbols(batch);
    let symbols_text = if symbols.len() > SUBJECT_SYMBOLS {
        format!(
            "{} +{} more",
            symbols[..SUBJECT_SYMBOLS].join(", "),
            symbols.len() - SUBJECT_SYMBOLS
        )
    } else {
        symbols.join(", ")
    };
    format!("{symbols_text} - {} New Filing{}", batch.len(), plural(batch.len()))
}

/// Groups a batch by symbol, keeping encounter order for both groups and
/// filings within a group.
fn group_by_symbol(batch: &[FilingWithSymbol]) -> Vec<(&str, Vec<&FilingWithSymbol>)> {
    let mut groups: Vec<(&str, Vec<&FilingWithSymbol>)> = Vec::new();
    for entry in batch {
        match groups.iter_mut().find(|(s, _)| *s == entry.symbol) {
            Some((_, filings)) => filings.push(entry),
            None => groups.push((entry.symbol.as_str(), vec![entry])),
        }
    }
    groups
}

pub fn new_filings_email(batch: &[FilingWithSymbol], checked_at: DateTime<Utc>) -> Email {
    Email {
        subject: subject(batch),
        html: new_filings_html(batch, checked_at),
        text: new_filings_text(batch, checked_at),
    }
}

fn filing_card_html(out: &mut String, entry: &FilingWithSymbol) {
    let f = &entry.filing;
    let _ = write!(
        out,
        r#"<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-bottom:16px;border:1px solid #e5e7eb;border-radius:8px;">
<tr><td style="padding:20px;">
<div style="margin-bottom:12px;"><span style="background:#10b981;color:#fff;padding:6px 12px;border-radius:20px;font-size:12px;font-weight:700;">{symbol}</span> <span style="background:#667eea;color:#fff;padding:6px 14px;border-radius:20px;font-size:13px;font-weight:600;">{form}</span></div>
<table cellpadding="0" cellspacing="0" border="0" width="100%">
<tr><td style="padding:6px 0;color:#6b7280;width:35%;"><strong>Company:</strong></td><td style="padding:6px 0;">{company}</td></tr>
"#,
        symbol = encode_text(&entry.symbol),
        form = encode_text(&f.form_type),
        company = encode_text(&f.company_name),
    );
    if let Some(owner) = f.owner() {
        let _ = writeln!(
            out,
            r#"<tr><td style="padding:6px 0;color:#6b7280;"><strong>Owner:</strong></td><td style="padding:6px 0;">{}</td></tr>"#,
            encode_text(owner)
        );
    }
    let _ = writeln!(
        out,
        r#"<tr><td style="padding:6px 0;color:#6b7280;"><strong>Filed Date:</strong></td><td style="padding:6px 0;">{}</td></tr>"#,
        encode_text(&f.filed)
    );
    if let Some(period) = f.period() {
        let _ = writeln!(
            out,
            r#"<tr><td style="padding:6px 0;color:#6b7280;"><strong>Period:</strong></td><td style="padding:6px 0;">{}</td></tr>"#,
            encode_text(period)
        );
    }
    out.push_str("</table>\n");

    // The PDF button only accompanies an HTML one.
    if let Some(html_link) = f.view.html() {
        let _ = write!(
            out,
            r#"<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-top:16px;"><tr><td align="center" style="padding:4px;"><a href="{}" style="display:block;background:#1a73e8;color:#fff;padding:12px 20px;text-decoration:none;border-radius:6px;font-weight:600;">View HTML</a></td>"#,
            encode_double_quoted_attribute(html_link)
        );
        if let Some(pdf_link) = f.view.pdf() {
            let _ = write!(
                out,
                r#"<td align="center" style="padding:4px;"><a href="{}" style="display:block;background:#dc3545;color:#fff;padding:12px 20px;text-decoration:none;border-radius:6px;font-weight:600;">View PDF</a></td>"#,
                encode_double_quoted_attribute(pdf_link)
            );
        }
        out.push_str("</tr></table>\n");
    }
    out.push_str("</td></tr></table>\n");
}

fn new_filings_html(batch: &[FilingWithSymbol], checked_at: DateTime<Utc>) -> String {
    let groups = group_by_symbol(batch);
    let symbols: Vec<&str> = groups.iter().map(|(s, _)| *s).collect();
    let symbols_list = encode_text(&symbols.join(", ")).into_owned();
    let total = batch.len();

    let mut sections = String::new();
    for (symbol, filings) in &groups {
        let _ = writeln!(
            sections,
            r#"<h2 style="margin:24px 0 16px 0;font-size:18px;border-bottom:2px solid #10b981;padding-bottom:8px;">{} &middot; {} New Filing{}</h2>"#,
            encode_text(symbol),
            filings.len(),
            plural(filings.len())
        );
        for entry in filings {
            filing_card_html(&mut sections, entry);
        }
    }

    let mut view_all = String::new();
    for symbol in &symbols {
        let _ = writeln!(
            view_all,
            r#"<tr><td align="center" style="padding:6px 0;"><a href="{}" style="display:inline-block;background:#10b981;color:#fff;padding:12px 28px;text-decoration:none;border-radius:8px;font-weight:600;">View All {} Filings</a></td></tr>"#,
            encode_double_quoted_attribute(&filings_page(symbol)),
            encode_text(symbol)
        );
    }

    let has_have = if total == 1 { "has" } else { "have" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>SEC Filing Alert</title>
</head>
<body style="margin:0;padding:0;background-color:#f3f4f6;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;">
<table cellpadding="0" cellspacing="0" border="0" width="100%" style="max-width:600px;margin:0 auto;background:#ffffff;">
<tr><td style="background:#667eea;padding:40px 20px;text-align:center;">
<h1 style="margin:0;color:#ffffff;font-size:28px;">New SEC Filing Alert</h1>
<p style="margin:12px 0 0 0;color:#ffffff;font-size:16px;">{symbols_list} - {total} New Filing{s}</p>
</td></tr>
<tr><td style="padding:32px 20px;">
<p style="margin:0 0 24px 0;padding:16px;background:#f0f9ff;border-left:4px solid #1a73e8;font-size:16px;"><strong>{total}</strong> new SEC filing{s} {has_have} been published</p>
{sections}<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-top:24px;">
{view_all}</table>
</td></tr>
<tr><td style="background:#f9fafb;padding:24px 20px;border-top:1px solid #e5e7eb;text-align:center;color:#6b7280;font-size:12px;">
<p style="margin:0 0 8px 0;">This is an automated notification from the SEC Filings Watcher</p>
<p style="margin:0;">Checked at: {checked}</p>
<p style="margin:12px 0 0 0;">Monitoring: {symbols_list}</p>
</td></tr>
</table>
</body>
</html>
"#,
        s = plural(total),
        checked = format_checked_at(checked_at),
    )
}

fn new_filings_text(batch: &[FilingWithSymbol], checked_at: DateTime<Utc>) -> String {
    let groups = group_by_symbol(batch);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} new SEC filing{} detected\n",
        batch.len(),
        plural(batch.len())
    );
    for (symbol, filings) in &groups {
        let _ = writeln!(out, "== {symbol} ({} new) ==", filings.len());
        for entry in filings {
            let f = &entry.filing;
            let _ = write!(out, "- {} | {} | Filed: {}", f.form_type, f.company_name, f.filed);
            if let Some(owner) = f.owner() {
                let _ = write!(out, " | Owner: {owner}");
            }
            if let Some(period) = f.period() {
                let _ = write!(out, " | Period: {period}");
            }
            out.push('\n');
            if let Some(link) = f.view.html() {
                let _ = writeln!(out, "  HTML: {link}");
            }
            if let Some(link) = f.view.pdf() {
                let _ = writeln!(out, "  PDF: {link}");
            }
        }
        let _ = writeln!(out, "All {symbol} filings: {}\n", filings_page(symbol));
    }
    let _ = writeln!(out, "Checked at: {}", format_checked_at(checked_at));
    out
}

/// The "configuration works" message sent in test-email mode.
pub fn test_email(subject_prefix: &str, symbols: &[String], sent_at: DateTime<Utc>) -> Email {
    let symbols_list = symbols.join(", ");
    let links: String = symbols
        .iter()
        .map(|s| {
            format!(
                r#"<p style="margin:6px 0;"><a href="{}" style="color:#1a73e8;">View {} Filings</a></p>"#,
                encode_double_quoted_attribute(&filings_page(s)),
                encode_text(s)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Watcher Test Email</title></head>
<body style="margin:0;padding:0;background-color:#f3f4f6;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,Arial,sans-serif;">
<table cellpadding="0" cellspacing="0" border="0" width="100%" style="max-width:600px;margin:0 auto;background:#ffffff;">
<tr><td style="background:#10b981;padding:40px 20px;text-align:center;"><h2 style="margin:0;color:#ffffff;font-size:24px;">Test Email Successful</h2></td></tr>
<tr><td style="padding:40px 20px;text-align:center;">
<p style="font-size:16px;">Your <strong>SEC Filings Watcher</strong> is configured correctly!</p>
<p style="font-size:15px;">&#10003; Email notifications are working<br>&#10003; Ready to monitor: {watched}</p>
<p style="font-size:15px;color:#6b7280;">You will receive notifications here when new filings are detected.</p>
{links}
</td></tr>
<tr><td style="background:#f9fafb;padding:20px;text-align:center;color:#9ca3af;font-size:12px;">Sent at: {sent}</td></tr>
</table>
</body>
</html>
"#,
        watched = encode_text(&symbols_list),
        sent = format_checked_at(sent_at),
    );

    let text = format!(
        "Test Email Successful\n\nYour SEC Filings Watcher is configured correctly.\nReady to monitor: {symbols_list}\n\nSent at: {}\n",
        format_checked_at(sent_at)
    );

    Email {
        subject: format!("✅ {subject_prefix} - Test Email"),
        html,
        text,
    }
}
