use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::warn;

pub const DEFAULT_FIELDS: &[&str] = &[
    "Ticker",
    "Market Cap",
    "Price",
    "P/E",
    "PEG",
    "P/B",
    "Quick Ratio",
    "Debt/Eq",
    "ROI",
    "ROE",
    "EPS Q/Q",
    "Insider Own",
    "Dividend %",
];

/// One unit of scrape work: a ticker and its quote page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub url: String,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        WorkItem {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// Ordered column names. The first column is the id column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<String>,
}

impl FieldSchema {
    /// Returns `None` for an empty field list.
    pub fn new(fields: Vec<String>) -> Option<Self> {
        if fields.is_empty() {
            None
        } else {
            Some(FieldSchema { fields })
        }
    }

    pub fn id_field(&self) -> &str {
        &self.fields[0]
    }

    /// Every field except the id column, in schema order.
    pub fn metric_fields(&self) -> &[String] {
        &self.fields[1..]
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        FieldSchema {
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// Fully extracted metrics for one ticker. `None` means the page showed
/// no value for that field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub fields: BTreeMap<String, Option<String>>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_deref())
    }
}

/// Insertion-ordered records keyed by id.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<Record>,
    ids: HashSet<String>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. A second record for an id already present is
    /// dropped and `false` returned.
    pub fn insert(&mut self, record: Record) -> bool {
        if !self.ids.insert(record.id.clone()) {
            warn!(ticker = %record.id, "duplicate record dropped");
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub values: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn ids(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.id.as_str()).collect()
    }
}

/// One row per record in insertion order, one column per schema field.
pub fn aggregate(results: ResultSet, schema: &FieldSchema) -> Table {
    let rows = results
        .into_records()
        .into_iter()
        .map(|mut record| {
            let values = schema
                .fields()
                .iter()
                .map(|f| record.fields.remove(f).flatten())
                .collect();
            Row {
                id: record.id,
                values,
            }
        })
        .collect();

    Table {
        columns: schema.fields().to_vec(),
        rows,
    }
}

// ── Tests ──
