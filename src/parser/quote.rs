use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};

use super::layout::QuoteLayout;
use super::PageExtractor;
use crate::error::ExtractError;
use crate::table::{FieldSchema, Record};

/// Label-driven extractor for quote pages of a given layout.
pub struct QuoteExtractor {
    layout: &'static QuoteLayout,
    metrics: Selector,
    cell: Selector,
    title: Selector,
    title_item: Selector,
}

impl QuoteExtractor {
    pub fn new(layout: &'static QuoteLayout) -> Result<Self> {
        Ok(Self {
            layout,
            metrics: compile(layout, layout.metrics_region)?,
            cell: compile(layout, layout.cell)?,
            title: compile(layout, layout.title_region)?,
            title_item: compile(layout, layout.title_item)?,
        })
    }
}

fn compile(layout: &QuoteLayout, selector: &'static str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| anyhow!("layout {}: bad selector '{}': {}", layout.version, selector, e))
}

impl PageExtractor for QuoteExtractor {
    fn extract(&self, id: &str, body: &str, schema: &FieldSchema) -> Result<Record, ExtractError> {
        let doc = Html::parse_document(body);

        let metrics = doc
            .select(&self.metrics)
            .next()
            .ok_or_else(|| ExtractError::MissingRegion {
                id: id.to_string(),
                region: "metrics",
            })?;
        let title = doc
            .select(&self.title)
            .next()
            .ok_or_else(|| ExtractError::MissingRegion {
                id: id.to_string(),
                region: "title",
            })?;

        let title_text = title
            .select(&self.title_item)
            .nth(self.layout.title_index)
            .map(text_of)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExtractError::MissingTitle { id: id.to_string() })?;

        let cells: Vec<String> = metrics.select(&self.cell).map(text_of).collect();

        let mut fields = BTreeMap::new();
        fields.insert(schema.id_field().to_string(), Some(title_text));
        for field in schema.metric_fields() {
            let value = cells
                .iter()
                .position(|c| c == field)
                .and_then(|i| cells.get(i + 1))
                .ok_or_else(|| ExtractError::MissingField {
                    id: id.to_string(),
                    field: field.clone(),
                })?;
            fields.insert(field.clone(), available(value));
        }

        Ok(Record {
            id: id.to_string(),
            fields,
        })
    }
}

/// Concatenated text content with whitespace runs collapsed.
fn text_of(el: ElementRef) -> String {
    let raw: String = el.text().collect();
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// FinViz renders missing values as "-".
fn available(value: &str) -> Option<String> {
    match value.trim() {
        "" | "-" => None,
        v => Some(v.to_string()),
    }
}

// ── Tests ──
