use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use scraper::{Html, Selector};
use tracing::info;

use crate::table::WorkItem;

/// Plain client for the constituents page. It carries none of the quote
/// site's session headers.
pub fn source_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder.build().context("Failed to build HTTP client")
}

/// Fetch the constituents page and return normalized tickers.
pub async fn fetch_constituents(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    info!("Fetching constituents: {}", url);
    let html = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch constituents page")?;

    let tickers: Vec<String> = parse_constituents(&html)?
        .iter()
        .map(|t| normalize_ticker(t))
        .collect();
    info!("Universe composed of {} securities", tickers.len());
    Ok(tickers)
}

/// First cell of every body row of the first sortable wikitable.
pub fn parse_constituents(html: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let table_sel = selector("table.wikitable.sortable")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let table = doc
        .select(&table_sel)
        .next()
        .ok_or_else(|| anyhow!("No constituents table on page"))?;

    let tickers: Vec<String> = table
        .select(&row_sel)
        .filter_map(|row| row.select(&cell_sel).next())
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if tickers.is_empty() {
        bail!("Constituents table has no rows");
    }
    Ok(tickers)
}

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow!("bad selector '{}': {}", s, e))
}

/// Wikipedia writes share classes with a dot (BRK.B), FinViz with a dash.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().replace('.', "-")
}

/// Build one work item per ticker, `{}` in the template standing for the
/// ticker. Later duplicates are dropped.
pub fn work_items(tickers: &[String], url_template: &str) -> Vec<WorkItem> {
    let mut seen = HashSet::new();
    tickers
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .map(|t| WorkItem::new(t.clone(), url_template.replace("{}", t)))
        .collect()
}

// ── Tests ──
