use chrono::Month;

pub const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// One observation line of an input table, positionally aligned with
/// [`Table::headers`].
pub type RawRow = Vec<String>;

/// A month's telemetry table: one header line plus data rows of equal width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<RawRow>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of worksheet rows the table occupies, header included. The
    /// computed block is addressed relative to this value.
    pub fn data_row_count(&self) -> usize {
        if self.headers.is_empty() {
            0
        } else {
            self.rows.len() + 1
        }
    }

    /// Trimmed cell values of one column, in row order.
    pub fn values<'a>(&'a self, col: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows
            .iter()
            .map(move |row| row.get(col).map(|v| v.trim()).unwrap_or(""))
    }
}

/// Named figures computed for one month. Insertion order is kept so console
/// output follows the layout order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    values: Vec<(String, f64)>,
    unavailable: Option<String>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name set to zero, flagged with the reason the figures could not
    /// be derived.
    pub fn zeroed(names: &[&str], reason: impl Into<String>) -> Self {
        Self {
            values: names.iter().map(|n| (n.to_string(), 0.0)).collect(),
            unavailable: Some(reason.into()),
        }
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name.to_string(), value)),
        }
    }

    pub fn flag(&mut self, reason: impl Into<String>) {
        self.unavailable = Some(reason.into());
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn unavailable(&self) -> Option<&str> {
        self.unavailable.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_pads_short_rows() {
        let t = Table::new(strings(&["A", "B", "C"]), vec![strings(&["1"])]);
        assert_eq!(t.rows[0], strings(&["1", "", ""]));
    }

    #[test]
    fn test_data_row_count_includes_header() {
        let t = Table::new(strings(&["A"]), vec![strings(&["1"]), strings(&["2"])]);
        assert_eq!(t.data_row_count(), 3);
        assert_eq!(Table::default().data_row_count(), 0);
    }

    #[test]
    fn test_column_lookup_ignores_padding() {
        let t = Table::new(strings(&["Timestamp", " THD_I "]), vec![]);
        assert_eq!(t.column("THD_I"), Some(1));
        assert_eq!(t.column("THD_V"), None);
    }

    #[test]
    fn test_metric_set_insert_replaces() {
        let mut m = MetricSet::new();
        m.insert("Total kWh Saved", 1.0);
        m.insert("Outage Savings", 2.0);
        m.insert("Total kWh Saved", 3.0);
        assert_eq!(m.len(), 2);
        assert_eq!(m.get("Total kWh Saved"), Some(3.0));
        let names: Vec<&str> = m.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Total kWh Saved", "Outage Savings"]);
    }

    #[test]
    fn test_zeroed_metric_set_is_flagged() {
        let m = MetricSet::zeroed(&["A", "B"], "column missing");
        assert_eq!(m.get("B"), Some(0.0));
        assert_eq!(m.unavailable(), Some("column missing"));
    }
}
