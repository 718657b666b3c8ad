use crate::error::Error;
use crate::finder::{ComponentStats, FileFinder, FinderScope, StatsWindow};
use crate::progress::ProgressReporter;
use crate::query::NamedParams;
use crate::storage::{Database, RecordStore};
use chrono::{DateTime, Duration, Months, Utc};
use indicatif::HumanBytes;

/// History tables and the column their rows age by.
pub const HISTORY_TABLES: [(&str, &str); 4] = [
    ("logstore_standard_log", "timecreated"),
    ("logstore_lanalytics_log", "timecreated"),
    ("grade_grades_history", "timemodified"),
    ("grade_items_history", "timemodified"),
];

pub const REPORTED_COMPONENTS: [&str; 2] = ["assignsubmission_file", "backup"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCount {
    pub label: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTableStats {
    pub table: String,
    pub total: i64,
    pub periods: Vec<PeriodCount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryTableEntry {
    Missing(String),
    Present(HistoryTableStats),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentReport {
    pub component: String,
    pub total: ComponentStats,
    pub periods: Vec<(String, ComponentStats)>,
}

/// `now` minus whole calendar years.
pub fn years_ago(now: DateTime<Utc>, years: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(years * 12))
        .unwrap_or_else(|| now - Duration::days(365 * i64::from(years)))
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Row counts per history table: total, newer than one year, between two years and one year.
pub fn history_table_stats(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<Vec<HistoryTableEntry>, Error> {
    let one_year = years_ago(now, 1);
    let two_years = years_ago(now, 2);
    let mut report = Vec::new();

    for (table, field) in HISTORY_TABLES {
        if !db.table_exists(table)? {
            report.push(HistoryTableEntry::Missing(table.to_string()));
            continue;
        }

        let total = db.count_where(table, "1 = 1", &NamedParams::new())?;
        let recent = db.count_where(
            table,
            &format!("{} >= :since", field),
            &NamedParams::new().with("since", one_year.timestamp()),
        )?;
        let previous = db.count_where(
            table,
            &format!("{field} >= :from AND {field} < :until"),
            &NamedParams::new()
                .with("from", two_years.timestamp())
                .with("until", one_year.timestamp()),
        )?;

        report.push(HistoryTableEntry::Present(HistoryTableStats {
            table: table.to_string(),
            total,
            periods: vec![
                PeriodCount {
                    label: format!("to {}", date(one_year)),
                    count: recent,
                },
                PeriodCount {
                    label: format!("from {} to {}", date(one_year), date(two_years)),
                    count: previous,
                },
            ],
        }));
    }

    Ok(report)
}

pub fn component_stats(
    finder: &FileFinder<'_>,
    component: &str,
    now: DateTime<Utc>,
) -> Result<ComponentReport, Error> {
    let one_year = years_ago(now, 1);
    let two_years = years_ago(now, 2);

    Ok(ComponentReport {
        component: component.to_string(),
        total: finder.stats(component, StatsWindow::All)?,
        periods: vec![
            (
                format!("to {}", date(one_year)),
                finder.stats(component, StatsWindow::NewerThan(one_year.timestamp()))?,
            ),
            (
                format!("from {} to {}", date(one_year), date(two_years)),
                finder.stats(
                    component,
                    StatsWindow::Between {
                        from: two_years.timestamp(),
                        until: one_year.timestamp(),
                    },
                )?,
            ),
        ],
    })
}

/// Write the file and history statistics report.
pub fn write_usage_report(db: &Database, reporter: &dyn ProgressReporter) -> Result<(), Error> {
    let now = Utc::now();
    let finder = FileFinder::new(db, FinderScope::Admin);

    reporter.write_line("=== FILE STATISTICS ===");
    for component in REPORTED_COMPONENTS {
        let report = component_stats(&finder, component, now)?;
        reporter.write_line(&format!(
            "{}: {} files, {}",
            report.component,
            report.total.count,
            HumanBytes(report.total.size.max(0) as u64)
        ));
        for (label, stats) in &report.periods {
            reporter.write_line(&format!(
                "  {} ({}): {} files, {}",
                report.component,
                label,
                stats.count,
                HumanBytes(stats.size.max(0) as u64)
            ));
        }
    }

    reporter.write_line("=== HISTORY TABLE STATISTICS ===");
    for entry in history_table_stats(db, now)? {
        match entry {
            HistoryTableEntry::Missing(table) => {
                reporter.write_line(&format!("Table {} does not exist. Skipping.", table))
            }
            HistoryTableEntry::Present(stats) => {
                reporter.write_line(&format!("{}: {} records", stats.table, stats.total));
                for period in &stats.periods {
                    reporter.write_line(&format!(
                        "  {} ({}): {} records",
                        stats.table, period.label, period.count
                    ));
                }
            }
        }
    }

    reporter.write_line("Statistics report completed.");
    Ok(())
}
