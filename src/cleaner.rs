use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::loader::{parse_number, parse_timestamp};
use crate::metrics::Domain;
use crate::models::Table;
use crate::settings::CleaningSettings;

// ---------------------------------------------------------------------------
// Filter rules (enum dispatch, applied in a fixed order)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum FilterRule {
    /// Remove an exclusion column (e.g. a `Conditions Met` flag).
    DropMarkerColumn { name: String },
    DropBlankRows,
    /// Remove residual total lines written by an earlier run.
    DropTotalLines { marker: String },
    DropShortDuration { column: String, minutes: f64 },
    /// Drop rows closer than `minutes` to the previous kept row.
    DropTooClose { column: String, minutes: f64 },
}

impl FilterRule {
    /// Position in the cleaning sequence. Column removal comes first so that
    /// rows left empty by it are caught as blank; spacing comes last because
    /// it looks at adjacency in the already filtered rows.
    fn rank(&self) -> u8 {
        match self {
            Self::DropMarkerColumn { .. } => 0,
            Self::DropBlankRows => 1,
            Self::DropTotalLines { .. } => 2,
            Self::DropShortDuration { .. } => 3,
            Self::DropTooClose { .. } => 4,
        }
    }

    fn apply(&self, table: Table) -> Table {
        match self {
            Self::DropMarkerColumn { name } => drop_column(table, name),
            Self::DropBlankRows => retain_rows(table, |row| row.iter().any(|v| !v.trim().is_empty())),
            Self::DropTotalLines { marker } => {
                retain_rows(table, |row| !row.iter().any(|v| v.trim() == marker))
            }
            Self::DropShortDuration { column, minutes } => drop_short(table, column, *minutes),
            Self::DropTooClose { column, minutes } => drop_too_close(table, column, *minutes),
        }
    }
}

pub fn rules_from_settings(cleaning: &CleaningSettings) -> Vec<FilterRule> {
    let mut rules = vec![
        FilterRule::DropMarkerColumn {
            name: cleaning.exclude_column.clone(),
        },
        FilterRule::DropBlankRows,
        FilterRule::DropTotalLines {
            marker: cleaning.total_marker.clone(),
        },
        FilterRule::DropShortDuration {
            column: cleaning.duration_column.clone(),
            minutes: cleaning.min_duration_minutes,
        },
    ];
    if let Some(minutes) = cleaning.min_spacing_minutes {
        rules.push(FilterRule::DropTooClose {
            column: cleaning.timestamp_column.clone(),
            minutes,
        });
    }
    rules
}

/// Rules for one domain's input. Duration and spacing only describe energy
/// event tables; sampled series (voltage, harmonics, power factor) keep every
/// sample, including rows that share a timestamp.
pub fn rules_for_domain(domain: Domain, cleaning: &CleaningSettings) -> Vec<FilterRule> {
    let mut rules = rules_from_settings(cleaning);
    if !domain.is_event_table() {
        rules.retain(|r| {
            !matches!(
                r,
                FilterRule::DropShortDuration { .. } | FilterRule::DropTooClose { .. }
            )
        });
    }
    rules
}

/// Clean one month's raw table. An absent table cleans to an empty one.
/// Cleaning a cleaned table returns it unchanged.
pub fn clean(raw: Option<Table>, rules: &[FilterRule]) -> Table {
    let Some(mut table) = raw else {
        return Table::default();
    };
    let before = table.rows.len();
    let mut ordered: Vec<&FilterRule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.rank());
    for rule in ordered {
        table = rule.apply(table);
    }
    let dropped = before - table.rows.len();
    if dropped > 0 {
        info!("Cleaning dropped {dropped} of {before} rows");
    }
    table
}

// ---------------------------------------------------------------------------
// Rule implementations
// ---------------------------------------------------------------------------

fn retain_rows(mut table: Table, keep: impl Fn(&[String]) -> bool) -> Table {
    table.rows.retain(|row| keep(row.as_slice()));
    table
}

fn drop_column(mut table: Table, name: &str) -> Table {
    let Some(col) = table.column(name) else {
        return table;
    };
    table.headers.remove(col);
    for row in &mut table.rows {
        if col < row.len() {
            row.remove(col);
        }
    }
    table
}

fn drop_short(table: Table, column: &str, minutes: f64) -> Table {
    let Some(col) = table.column(column) else {
        debug!("Column '{column}' not present, duration filter skipped");
        return table;
    };
    retain_rows(table, |row| match parse_number(&row[col]) {
        Some(v) => v >= minutes,
        None => {
            warn!("Dropping row with non-numeric '{column}' value {:?}", row[col]);
            false
        }
    })
}

fn drop_too_close(mut table: Table, column: &str, minutes: f64) -> Table {
    let Some(col) = table.column(column) else {
        debug!("Column '{column}' not present, spacing filter skipped");
        return table;
    };
    let min_ms = (minutes * 60_000.0).round() as i64;
    let mut last_kept: Option<NaiveDateTime> = None;
    table.rows.retain(|row| {
        let Some(ts) = parse_timestamp(&row[col]) else {
            warn!("Dropping row with unreadable '{column}' value {:?}", row[col]);
            return false;
        };
        let keep = match last_kept {
            Some(prev) => (ts - prev).num_milliseconds() >= min_ms,
            None => true,
        };
        if keep {
            last_kept = Some(ts);
        }
        keep
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    fn default_rules() -> Vec<FilterRule> {
        rules_from_settings(&CleaningSettings::default())
    }

    #[test]
    fn test_absent_table_cleans_to_empty() {
        let t = clean(None, &default_rules());
        assert!(t.is_empty());
        assert_eq!(t.data_row_count(), 0);
    }

    #[test]
    fn test_marker_column_and_blank_rows_removed() {
        let raw = table(
            &["Time Elapsed (minutes)", "Energy Saving (kWh)", "Conditions Met"],
            &[
                &["5", "10", "TRUE"],
                &["", "", "TRUE"],
                &["", "", ""],
                &["7", "20", "FALSE"],
            ],
        );
        let t = clean(Some(raw), &default_rules());
        assert_eq!(t.headers, vec!["Time Elapsed (minutes)", "Energy Saving (kWh)"]);
        assert_eq!(t.rows.len(), 2);
        assert!(t.rows.iter().all(|r| r.len() == 2));
    }

    #[test]
    fn test_total_lines_removed() {
        let raw = table(
            &["Label", "Energy Saving (kWh)"],
            &[&["a", "10"], &["Total savings", "10"]],
        );
        let t = clean(Some(raw), &default_rules());
        assert_eq!(t.rows.len(), 1);
    }

    #[test]
    fn test_short_and_non_numeric_durations_dropped() {
        let raw = table(
            &["Time Elapsed (minutes)", "Energy Saving (kWh)"],
            &[&["0.5", "1"], &["1", "2"], &["abc", "3"], &["12", "4"]],
        );
        let t = clean(Some(raw), &default_rules());
        let kept: Vec<&str> = t.values(1).collect();
        assert_eq!(kept, vec!["2", "4"]);
    }

    #[test]
    fn test_spacing_uses_filtered_adjacency() {
        let raw = table(
            &["Timestamp", "Deviation"],
            &[&["00:00:00", "0.5"], &["00:06:00", "2.0"], &["00:06:30", "2.0"]],
        );
        let rules = vec![FilterRule::DropTooClose {
            column: "Timestamp".into(),
            minutes: 6.0,
        }];
        let t = clean(Some(raw), &rules);
        let kept: Vec<&str> = t.values(0).collect();
        assert_eq!(kept, vec!["00:00:00", "00:06:00"]);
    }

    #[test]
    fn test_spacing_compares_against_last_kept_row() {
        let raw = table(
            &["Timestamp"],
            &[&["00:00"], &["00:04"], &["00:07"], &["00:12"]],
        );
        let rules = vec![FilterRule::DropTooClose {
            column: "Timestamp".into(),
            minutes: 6.0,
        }];
        let t = clean(Some(raw), &rules);
        let kept: Vec<&str> = t.values(0).collect();
        // 00:07 is 7 minutes after 00:00 (00:04 was dropped), 00:12 only 5 after 00:07
        assert_eq!(kept, vec!["00:00", "00:07"]);
    }

    #[test]
    fn test_rule_order_is_fixed() {
        // Duration before marker removal in the input list must not matter.
        let raw = table(
            &["Time Elapsed (minutes)", "Conditions Met"],
            &[&["", "TRUE"], &["3", "TRUE"]],
        );
        let mut rules = default_rules();
        rules.reverse();
        let t = clean(Some(raw), &rules);
        assert_eq!(t.rows.len(), 1);
        assert_eq!(t.headers, vec!["Time Elapsed (minutes)"]);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut settings = CleaningSettings::default();
        settings.min_spacing_minutes = Some(6.0);
        let rules = rules_from_settings(&settings);
        let raw = table(
            &["Timestamp", "Time Elapsed (minutes)", "Energy Saving (kWh)", "Conditions Met"],
            &[
                &["00:00:00", "3", "10", "TRUE"],
                &["00:06:00", "0.2", "5", "TRUE"],
                &["00:07:00", "4", "", "FALSE"],
                &["", "", "", ""],
                &["00:20:00", "9", "20", "TRUE"],
                &["Total savings", "", "35", ""],
            ],
        );
        let once = clean(Some(raw), &rules);
        let twice = clean(Some(once.clone()), &rules);
        assert_eq!(once, twice);
        assert_eq!(once.rows.len(), 3);
    }

    #[test]
    fn test_sampled_domains_keep_every_sample() {
        let mut settings = CleaningSettings::default();
        settings.min_spacing_minutes = Some(6.0);
        let raw = table(
            &["Timestamp", "Grid Voltage", "Load Voltage", "Time Elapsed (minutes)"],
            &[
                &["00:00", "180", "", "0"],
                &["00:00", "", "229", "0"],
                &["00:05", "180", "", "0"],
            ],
        );
        for domain in [Domain::Voltage, Domain::Harmonics, Domain::PowerFactor] {
            let rules = rules_for_domain(domain, &settings);
            assert_eq!(rules.len(), 3);
            assert_eq!(clean(Some(raw.clone()), &rules).rows.len(), 3);
        }
        let genset = rules_for_domain(Domain::Genset, &settings);
        assert_eq!(genset.len(), 5);
        assert!(clean(Some(raw), &genset).is_empty());
    }

    #[test]
    fn test_missing_filter_columns_leave_table_untouched() {
        let raw = table(&["THD_I", "THD_V"], &[&["3", "4"]]);
        let t = clean(Some(raw.clone()), &default_rules());
        assert_eq!(t, raw);
    }
}
