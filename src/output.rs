use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::screen::ScreenedTable;

const SCREENS_DIR: &str = "screens";

/// `<base>/screens/screener_<universe>_<YYYYMMDD>.csv`
pub fn screen_path(base_dir: &Path, universe: &str, date: NaiveDate) -> PathBuf {
    base_dir
        .join(SCREENS_DIR)
        .join(format!("screener_{}_{}.csv", universe, date.format("%Y%m%d")))
}

/// Write the screened table with a header row and no index column.
pub fn write_csv(path: &Path, table: &ScreenedTable) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        let mut record = Vec::with_capacity(table.columns.len());
        record.push(row.label.clone().unwrap_or_default());
        record.extend(row.values.iter().map(|v| v.map(format_number).unwrap_or_default()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Integral values keep one decimal so every metric column reads as a float.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}
