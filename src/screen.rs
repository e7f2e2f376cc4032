use std::cmp::Ordering;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::table::Table;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+(?:\.\d+)?)\s*([KMBT%])?$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
}

/// `column op value`, e.g. `P/B lt 1.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub column: String,
    pub op: Comparison,
    pub value: f64,
}

impl Criterion {
    pub fn new(column: &str, op: Comparison, value: f64) -> Self {
        Self {
            column: column.to_string(),
            op,
            value,
        }
    }

    /// A missing value never satisfies a criterion.
    pub fn holds(&self, x: Option<f64>) -> bool {
        let Some(x) = x else { return false };
        match self.op {
            Comparison::Lt => x < self.value,
            Comparison::Le => x <= self.value,
            Comparison::Gt => x > self.value,
            Comparison::Ge => x >= self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedRow {
    /// Id column value as scraped.
    pub label: Option<String>,
    /// Every other column, parsed. `None` for missing or unparseable.
    pub values: Vec<Option<f64>>,
}

/// A table whose metric columns are numeric. `columns[0]` is the id
/// column; `columns[i + 1]` describes `values[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenedTable {
    pub columns: Vec<String>,
    pub rows: Vec<ScreenedRow>,
}

impl ScreenedTable {
    fn value_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().skip(1).position(|c| c == column)
    }
}

/// Parse a FinViz metric into a number. Market caps and other magnitudes
/// come out in billions, percentages as plain numbers ("12.5%" is 12.5).
pub fn parse_metric(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    let caps = NUMBER_RE.captures(&cleaned)?;
    let n: f64 = caps[1].parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("T") => 1e3,
        Some("M") => 1e-3,
        Some("K") => 1e-6,
        _ => 1.0,
    };
    Some(n * scale)
}

/// Convert, filter and sort the aggregated table.
pub fn apply(table: Table, criteria: &[Criterion], sort: &SortSpec) -> Result<ScreenedTable> {
    for c in criteria {
        if !table.columns.iter().skip(1).any(|col| col == &c.column) {
            bail!("Unknown criterion column '{}'", c.column);
        }
    }

    let columns = table.columns;
    let mut rows: Vec<ScreenedRow> = table
        .rows
        .into_iter()
        .map(|row| {
            let mut values = row.values.into_iter();
            let label = values.next().flatten();
            let values = values
                .zip(columns.iter().skip(1))
                .map(|(v, col)| {
                    let raw = v?;
                    let parsed = parse_metric(&raw);
                    if parsed.is_none() && raw.trim() != "-" {
                        warn!(ticker = %row.id, column = %col, value = %raw, "Unparseable metric");
                    }
                    parsed
                })
                .collect();
            ScreenedRow { label, values }
        })
        .collect();

    let mut screened = ScreenedTable {
        columns,
        rows: Vec::new(),
    };

    let idx: Vec<(usize, &Criterion)> = criteria
        .iter()
        .filter_map(|c| screened.value_index(&c.column).map(|i| (i, c)))
        .collect();
    rows.retain(|r| idx.iter().all(|(i, c)| c.holds(r.values[*i])));

    let Some(key) = screened.value_index(&sort.column) else {
        bail!("Unknown sort column '{}'", sort.column);
    };
    rows.sort_by(|a, b| compare(a.values[key], b.values[key], sort.descending));

    info!("{} rows pass {} criteria", rows.len(), criteria.len());
    screened.rows = rows;
    Ok(screened)
}

/// Missing values always sort last.
fn compare(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Row;

    fn table(rows: &[(&str, &str, &str, &str)]) -> Table {
        Table {
            columns: vec!["Ticker".into(), "P/B".into(), "ROI".into(), "ROE".into()],
            rows: rows
                .iter()
                .map(|(id, pb, roi, roe)| Row {
                    id: id.to_string(),
                    values: [*id, *pb, *roi, *roe]
                        .iter()
                        .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                        .collect(),
                })
                .collect(),
        }
    }

    fn default_criteria() -> Vec<Criterion> {
        vec![
            Criterion::new("P/B", Comparison::Lt, 1.5),
            Criterion::new("ROI", Comparison::Gt, 0.1),
        ]
    }

    fn by_roe() -> SortSpec {
        SortSpec {
            column: "ROE".into(),
            descending: true,
        }
    }

    fn labels(t: &ScreenedTable) -> Vec<&str> {
        t.rows.iter().map(|r| r.label.as_deref().unwrap_or("")).collect()
    }

    #[test]
    fn parses_finviz_metrics() {
        assert_eq!(parse_metric("801.72B"), Some(801.72));
        assert_eq!(parse_metric("1.2T"), Some(1200.0));
        assert_eq!(parse_metric("512.3M"), Some(0.5123));
        assert_eq!(parse_metric("18.30%"), Some(18.3));
        assert_eq!(parse_metric("-10.00%"), Some(-10.0));
        assert_eq!(parse_metric("1,234.5"), Some(1234.5));
        assert_eq!(parse_metric("0.68"), Some(0.68));
        assert_eq!(parse_metric("-"), None);
        assert_eq!(parse_metric(""), None);
        assert_eq!(parse_metric("May 02 AMC"), None);
    }

    #[test]
    fn filters_on_every_criterion() {
        let t = table(&[
            ("CHEAP", "0.9", "5.2%", "12%"),
            ("PRICEY", "5.79", "18.3%", "35.3%"),
            ("LOSS", "1.1", "-3%", "-8%"),
            ("EDGE", "1.5", "1%", "9%"),
        ]);
        let s = apply(t, &default_criteria(), &by_roe()).unwrap();
        assert_eq!(labels(&s), vec!["CHEAP"]);
        assert_eq!(s.rows[0].values, vec![Some(0.9), Some(5.2), Some(12.0)]);
    }

    #[test]
    fn missing_values_fail_criteria() {
        let t = table(&[("NOPB", "-", "20%", "30%"), ("NOROI", "1.0", "", "30%"), ("OK", "1.0", "2%", "")]);
        let s = apply(t, &default_criteria(), &by_roe()).unwrap();
        assert_eq!(labels(&s), vec!["OK"]);
    }

    #[test]
    fn sorts_descending_with_missing_last() {
        let t = table(&[
            ("A", "1", "1%", "5%"),
            ("B", "1", "1%", "-"),
            ("C", "1", "1%", "25%"),
            ("D", "1", "1%", "15%"),
        ]);
        let s = apply(t, &default_criteria(), &by_roe()).unwrap();
        assert_eq!(labels(&s), vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn ascending_sort() {
        let t = table(&[("A", "1", "1%", "5%"), ("B", "0.5", "1%", "1%")]);
        let sort = SortSpec {
            column: "P/B".into(),
            descending: false,
        };
        let s = apply(t, &[], &sort).unwrap();
        assert_eq!(labels(&s), vec!["B", "A"]);
    }

    #[test]
    fn unknown_columns_rejected() {
        let bad = vec![Criterion::new("EV/EBITDA", Comparison::Lt, 10.0)];
        assert!(apply(table(&[]), &bad, &by_roe()).is_err());

        let sort = SortSpec {
            column: "Beta".into(),
            descending: true,
        };
        assert!(apply(table(&[]), &[], &sort).is_err());
    }

    #[test]
    fn empty_table_stays_empty() {
        let s = apply(table(&[]), &default_criteria(), &by_roe()).unwrap();
        assert!(s.rows.is_empty());
        assert_eq!(s.columns.len(), 4);
    }

    #[test]
    fn criterion_from_toml_shape() {
        let c: Criterion = serde_json::from_str(r#"{"column":"P/B","op":"lt","value":1.5}"#).unwrap();
        assert_eq!(c, Criterion::new("P/B", Comparison::Lt, 1.5));
        assert!(c.holds(Some(1.0)));
        assert!(!c.holds(Some(1.5)));
        assert!(!c.holds(None));
    }
}
