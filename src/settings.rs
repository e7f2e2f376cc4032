use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::parser::{layout, QuoteLayout};
use crate::scrape::DEFAULT_MAX_WORKERS;
use crate::screen::{Comparison, Criterion, SortSpec};
use crate::table::{FieldSchema, DEFAULT_FIELDS};

/// Runtime settings. Layered: defaults, then `screener.toml` (or the
/// `--config` file), then `SCREENER_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name used in the output file, e.g. `sp500`.
    pub universe: String,
    pub constituents_url: String,
    /// Quote page URL, `{}` is replaced by the ticker.
    pub quote_url: String,
    pub max_workers: usize,
    /// 0 disables the request timeout.
    pub request_timeout_secs: u64,
    /// Parent of the log file and of `screens/`.
    pub base_dir: PathBuf,
    pub log_file: String,
    pub layout: String,
    pub fields: Vec<String>,
    pub criteria: Vec<Criterion>,
    pub sort_by: String,
    pub sort_descending: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            universe: "sp500".to_string(),
            constituents_url: "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies".to_string(),
            quote_url: "http://finviz.com/quote.ashx?t={}".to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            request_timeout_secs: 30,
            base_dir: PathBuf::from("."),
            log_file: "what_happens.log".to_string(),
            layout: layout::FINVIZ_2017.version.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            criteria: vec![
                Criterion::new("P/B", Comparison::Lt, 1.5),
                Criterion::new("ROI", Comparison::Gt, 0.1),
            ],
            sort_by: "ROE".to_string(),
            sort_descending: true,
        }
    }
}

impl Settings {
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let builder = match file {
            Some(p) => Config::builder().add_source(File::from(p)),
            None => Config::builder().add_source(File::with_name("screener").required(false)),
        };
        builder
            .add_source(Environment::with_prefix("SCREENER").try_parsing(true))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            bail!("fields must name at least the id column");
        }
        if !self.quote_url.contains("{}") {
            bail!("quote_url must contain '{{}}' for the ticker: {}", self.quote_url);
        }
        self.quote_layout()?;
        let metrics = &self.fields[1..];
        if let Some(c) = self.criteria.iter().find(|c| !metrics.contains(&c.column)) {
            bail!("criterion column '{}' is not a metric field", c.column);
        }
        if !metrics.contains(&self.sort_by) {
            bail!("sort_by '{}' is not a metric field", self.sort_by);
        }
        Ok(())
    }

    pub fn schema(&self) -> Result<FieldSchema> {
        FieldSchema::new(self.fields.clone()).ok_or_else(|| anyhow!("empty field schema"))
    }

    pub fn quote_layout(&self) -> Result<&'static QuoteLayout> {
        layout::by_version(&self.layout).ok_or_else(|| {
            anyhow!(
                "unknown layout '{}' (known: {})",
                self.layout,
                layout::versions().join(", ")
            )
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(&self.log_file)
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec {
            column: self.sort_by.clone(),
            descending: self.sort_descending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Serializes tests that read SCREENER_* from the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.max_workers, 50);
        assert_eq!(s.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(s.log_path(), PathBuf::from("./what_happens.log"));
        assert_eq!(s.schema().unwrap().fields().len(), 13);
        assert_eq!(s.quote_layout().unwrap().version, "finviz-2017");
    }

    #[test]
    fn zero_timeout_disables_it() {
        let s = Settings {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(s.timeout(), None);
    }

    #[test]
    fn rejects_bad_settings() {
        let no_placeholder = Settings {
            quote_url: "http://finviz.com/quote.ashx".into(),
            ..Default::default()
        };
        assert!(no_placeholder.validate().is_err());

        let bad_layout = Settings {
            layout: "finviz-1999".into(),
            ..Default::default()
        };
        assert!(bad_layout.validate().is_err());

        let bad_sort = Settings {
            sort_by: "Ticker".into(),
            ..Default::default()
        };
        assert!(bad_sort.validate().is_err());

        let bad_criterion = Settings {
            fields: vec!["Ticker".into(), "ROE".into()],
            ..Default::default()
        };
        assert!(bad_criterion.validate().is_err());

        let empty = Settings {
            fields: Vec::new(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn loads_file_over_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screener.toml");
        std::fs::write(
            &path,
            r#"
universe = "sp500-test"
max_workers = 8
layout = "finviz-2023"
sort_by = "P/B"
sort_descending = false

[[criteria]]
column = "ROE"
op = "ge"
value = 15
"#,
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        s.validate().unwrap();
        assert_eq!(s.universe, "sp500-test");
        assert_eq!(s.max_workers, 8);
        assert_eq!(s.layout, "finviz-2023");
        assert_eq!(s.criteria, vec![Criterion::new("ROE", Comparison::Ge, 15.0)]);
        assert!(!s.sort_descending);
        // untouched keys keep their defaults
        assert_eq!(s.quote_url, "http://finviz.com/quote.ashx?t={}");
        assert_eq!(s.fields.len(), 13);
    }

    #[test]
    fn environment_overrides_file_and_defaults() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screener.toml");
        std::fs::write(&path, "max_workers = 8\nuniverse = \"from-file\"\n").unwrap();

        std::env::set_var("SCREENER_MAX_WORKERS", "12");
        std::env::set_var("SCREENER_REQUEST_TIMEOUT_SECS", "0");
        let loaded = Settings::load(Some(&path));
        std::env::remove_var("SCREENER_MAX_WORKERS");
        std::env::remove_var("SCREENER_REQUEST_TIMEOUT_SECS");

        let s = loaded.unwrap();
        assert_eq!(s.max_workers, 12);
        assert_eq!(s.timeout(), None);
        assert_eq!(s.universe, "from-file");
        assert_eq!(s.layout, "finviz-2017");
    }
}
