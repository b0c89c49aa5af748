//! JSON reports over the read models.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use stockroom_core::StoreId;
use stockroom_inventory::MovementKind;

use crate::projections::MovementFilter;
use crate::services::{ServiceError, Stockroom};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Current catalog with quantities.
    Stock,
    Entries,
    Exits,
    /// Entries and exits together.
    Movements,
    Orders,
    Alerts,
}

impl ReportKind {
    pub const ALL: [ReportKind; 6] = [
        ReportKind::Stock,
        ReportKind::Entries,
        ReportKind::Exits,
        ReportKind::Movements,
        ReportKind::Orders,
        ReportKind::Alerts,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            ReportKind::Stock => "stock",
            ReportKind::Entries => "entries",
            ReportKind::Exits => "exits",
            ReportKind::Movements => "movements",
            ReportKind::Orders => "orders",
            ReportKind::Alerts => "alerts",
        }
    }

    /// Whether a date range narrows this report.
    pub fn uses_range(self) -> bool {
        matches!(self, ReportKind::Entries | ReportKind::Exits | ReportKind::Movements)
    }
}

impl core::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.slug() == s)
            .ok_or_else(|| format!("unknown report kind '{s}'"))
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn to_filter(self, kind: Option<MovementKind>) -> MovementFilter {
        MovementFilter {
            kind,
            product_id: None,
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub store_id: StoreId,
    pub store_name: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "DateRange::is_unbounded")]
    pub range: DateRange,
    pub rows: JsonValue,
}

impl Report {
    pub fn row_count(&self) -> usize {
        self.rows.as_array().map(Vec::len).unwrap_or(0)
    }

    /// `report_<slug>_<YYYY-MM-DD>.json`, dated by generation day.
    pub fn file_name(&self) -> String {
        format!(
            "report_{}_{}.json",
            self.kind.slug(),
            self.generated_at.date_naive().format("%Y-%m-%d")
        )
    }
}

impl Stockroom {
    /// Build a report of one store. The range is ignored for reports that are
    /// not movement histories.
    pub fn report(&self, store_id: StoreId, kind: ReportKind, range: DateRange) -> Result<Report, ServiceError> {
        let store = self.get_store(store_id)?;
        let range = if kind.uses_range() { range } else { DateRange::default() };

        let rows = match kind {
            ReportKind::Stock => serde_json::to_value(self.list_products(store_id))?,
            ReportKind::Entries => {
                serde_json::to_value(self.list_movements(store_id, &range.to_filter(Some(MovementKind::Entry))))?
            }
            ReportKind::Exits => {
                serde_json::to_value(self.list_movements(store_id, &range.to_filter(Some(MovementKind::Exit))))?
            }
            ReportKind::Movements => serde_json::to_value(self.list_movements(store_id, &range.to_filter(None)))?,
            ReportKind::Orders => serde_json::to_value(self.list_orders(store_id))?,
            ReportKind::Alerts => serde_json::to_value(self.alerts(store_id))?,
        };

        let report = Report {
            kind,
            store_id,
            store_name: store.name,
            generated_at: Utc::now(),
            range,
            rows,
        };
        tracing::info!(%store_id, kind = %kind, rows = report.row_count(), "report generated");
        Ok(report)
    }
}

/// Write `report` as pretty JSON under `dir`, creating it if needed.
pub fn write_report(dir: &Path, report: &Report) -> Result<PathBuf, ServiceError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(report.file_name());
    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(kind: ReportKind) -> Report {
        Report {
            kind,
            store_id: StoreId::new(),
            store_name: "Centro".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 5, 3, 23, 59, 0).unwrap(),
            range: DateRange::default(),
            rows: serde_json::json!([]),
        }
    }

    #[test]
    fn kinds_parse_from_slugs() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.slug().parse::<ReportKind>().unwrap(), kind);
        }
        assert_eq!(" Exits ".parse::<ReportKind>().unwrap(), ReportKind::Exits);
        assert!("ledger".parse::<ReportKind>().is_err());
    }

    #[test]
    fn file_name_uses_generation_day() {
        assert_eq!(report(ReportKind::Entries).file_name(), "report_entries_2024-05-03.json");
    }

    #[test]
    fn unbounded_range_is_omitted_from_output() {
        let json = serde_json::to_value(report(ReportKind::Stock)).unwrap();
        assert!(json.get("range").is_none());
        assert_eq!(json["kind"], "stock");
    }

    #[test]
    fn write_report_creates_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("reports");
        let path = write_report(&out, &report(ReportKind::Alerts)).unwrap();

        assert_eq!(path, out.join("report_alerts_2024-05-03.json"));
        let written: JsonValue = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["store_name"], "Centro");
        assert_eq!(written["rows"], serde_json::json!([]));
    }

    #[test]
    fn range_only_applies_to_movement_reports() {
        let room = Stockroom::in_memory().unwrap();
        let store = room
            .register_store("Centro", stockroom_stores::ContactInfo::default())
            .unwrap();
        let range = DateRange {
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: None,
        };

        let stock = room.report(store.store_id, ReportKind::Stock, range).unwrap();
        assert!(stock.range.is_unbounded());
        let exits = room.report(store.store_id, ReportKind::Exits, range).unwrap();
        assert_eq!(exits.range, range);
        assert_eq!(exits.row_count(), 0);
    }
}
