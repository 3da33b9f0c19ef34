use std::collections::BTreeMap;

use chrono::Month;
use tracing::{info, warn};

use crate::loader::{load_yields, parse_number};
use crate::models::{MetricSet, Table};
use crate::settings::{InputSource, Settings, YieldSource};

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

pub const TOTAL_KWH_SAVED: &str = "Total kWh Saved";
pub const NUMBER_OF_OUTAGES: &str = "Number of Outages";
pub const GENSET_FUEL_SAVINGS: &str = "Genset Fuel Savings";
pub const FREQUENCY_FUEL_SAVINGS: &str = "Frequency Fuel Savings";
pub const OUTAGE_SAVINGS: &str = "Outage Savings";
pub const SOLAR_YIELD: &str = "Solar Yield";
pub const GRID_YIELD: &str = "Grid Yield";
pub const GENSET_YIELD: &str = "Genset Yield";
pub const DEVIATION_COST: &str = "Deviation Cost";
pub const MAINTENANCE_COST_DELTA: &str = "Maintenance Cost Delta";
pub const DOWNTIME_COST: &str = "Downtime Cost";
pub const PENALTY_COST: &str = "Penalty Cost";
pub const NON_COMPLIANT_ENERGY: &str = "Total Non-Compliant Energy (kVAh)";
pub const ENERGY_LOSSES: &str = "Total Energy Losses (kWh)";
pub const HARMONIC_COST_SAVINGS: &str = "Total Cost Savings ($)";
pub const LOW_POWER_FACTOR_SAMPLES: &str = "Low Power Factor Samples";
pub const POWER_FACTOR_PENALTY: &str = "Power Factor Penalty Savings";
pub const VOLTAGE_EXCURSIONS: &str = "Voltage Excursion Samples";
pub const VOLTAGE_MISMATCH_SAVINGS: &str = "Voltage Mismatch Savings";
pub const TOTAL_MONTH_SAVINGS: &str = "Total Month Savings";

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Genset,
    Frequency,
    Harmonics,
    PowerFactor,
    Voltage,
}

pub const ALL_DOMAINS: &[Domain] = &[
    Domain::Genset,
    Domain::Frequency,
    Domain::Harmonics,
    Domain::PowerFactor,
    Domain::Voltage,
];

impl Domain {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Genset => "genset",
            Self::Frequency => "frequency",
            Self::Harmonics => "harmonics",
            Self::PowerFactor => "power-factor",
            Self::Voltage => "voltage",
        }
    }

    /// Inputs that record discrete energy events, as opposed to a regular
    /// sample series.
    pub fn is_event_table(&self) -> bool {
        matches!(self, Self::Genset | Self::Frequency)
    }

    /// Label used in the workbook file name.
    pub fn file_label(&self) -> &'static str {
        match self {
            Self::Genset => "Genset_Fuel",
            Self::Frequency => "Frequency",
            Self::Harmonics => "Harmonic",
            Self::PowerFactor => "Power_Factor",
            Self::Voltage => "Voltage",
        }
    }

    pub fn input<'a>(&self, settings: &'a Settings) -> &'a InputSource {
        match self {
            Self::Genset => &settings.inputs.genset,
            Self::Frequency => &settings.inputs.frequency,
            Self::Harmonics => &settings.inputs.harmonics,
            Self::PowerFactor => &settings.inputs.power_factor,
            Self::Voltage => &settings.inputs.voltage,
        }
    }

    /// Metric names in worksheet order.
    pub fn metric_names(&self) -> &'static [&'static str] {
        match self {
            Self::Genset => &[
                TOTAL_KWH_SAVED,
                NUMBER_OF_OUTAGES,
                GENSET_FUEL_SAVINGS,
                OUTAGE_SAVINGS,
                SOLAR_YIELD,
                GRID_YIELD,
                GENSET_YIELD,
                TOTAL_MONTH_SAVINGS,
            ],
            Self::Frequency => &[
                TOTAL_KWH_SAVED,
                NUMBER_OF_OUTAGES,
                FREQUENCY_FUEL_SAVINGS,
                OUTAGE_SAVINGS,
                DEVIATION_COST,
                MAINTENANCE_COST_DELTA,
                DOWNTIME_COST,
                PENALTY_COST,
                TOTAL_MONTH_SAVINGS,
            ],
            Self::Harmonics => &[
                NON_COMPLIANT_ENERGY,
                ENERGY_LOSSES,
                HARMONIC_COST_SAVINGS,
                TOTAL_MONTH_SAVINGS,
            ],
            Self::PowerFactor => &[
                LOW_POWER_FACTOR_SAMPLES,
                POWER_FACTOR_PENALTY,
                TOTAL_MONTH_SAVINGS,
            ],
            Self::Voltage => &[
                VOLTAGE_EXCURSIONS,
                VOLTAGE_MISMATCH_SAVINGS,
                TOTAL_MONTH_SAVINGS,
            ],
        }
    }
}

pub fn get_by_key(key: &str) -> Option<Domain> {
    ALL_DOMAINS.iter().find(|d| d.key() == key).copied()
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Per-month yield figures keyed by month name. Only the genset report
/// carries them.
#[derive(Debug, Clone, Default)]
pub struct Yields {
    pub solar: BTreeMap<String, f64>,
    pub grid: BTreeMap<String, f64>,
    pub genset: BTreeMap<String, f64>,
}

impl Yields {
    pub fn load(settings: &Settings) -> Self {
        let y = &settings.yields;
        let load = |source: &YieldSource| {
            load_yields(&y.resolve(&settings.data_root, settings.year, source), source)
        };
        Self {
            solar: load(&y.solar),
            grid: load(&y.grid),
            genset: load(&y.genset),
        }
    }
}

/// Computes a domain's figures for one cleaned month. Holds only immutable
/// configuration, so the same calculator can serve every month.
pub struct Calculator<'a> {
    domain: Domain,
    settings: &'a Settings,
    yields: Yields,
}

impl<'a> Calculator<'a> {
    pub fn new(domain: Domain, settings: &'a Settings) -> Self {
        let yields = match domain {
            Domain::Genset => Yields::load(settings),
            _ => Yields::default(),
        };
        Self::with_yields(domain, settings, yields)
    }

    pub fn with_yields(domain: Domain, settings: &'a Settings, yields: Yields) -> Self {
        Self {
            domain,
            settings,
            yields,
        }
    }

    /// Never fails: a missing required column produces a zeroed, flagged set.
    pub fn compute(&self, month: Month, table: &Table) -> MetricSet {
        let names = self.domain.metric_names();
        let result = match self.domain {
            Domain::Genset => self.genset(month, table),
            Domain::Frequency => self.frequency(table),
            Domain::Harmonics => self.harmonics(table),
            Domain::PowerFactor => self.power_factor(table),
            Domain::Voltage => self.voltage(table),
        };
        match result {
            Ok(metrics) => {
                info!(
                    "Calculated {} savings for {}: {:.2}",
                    self.domain.key(),
                    month.name(),
                    metrics.get(TOTAL_MONTH_SAVINGS).unwrap_or(0.0)
                );
                metrics
            }
            Err(reason) => {
                warn!("{reason} for {}. Metrics unavailable.", month.name());
                MetricSet::zeroed(names, reason)
            }
        }
    }

    fn genset(&self, month: Month, table: &Table) -> Result<MetricSet, String> {
        let energy = EnergyFigures::compute(table, self.settings)?;
        let mut m = MetricSet::new();
        energy.write_into(&mut m, GENSET_FUEL_SAVINGS);
        let name = month.name();
        for (metric, source) in [
            (SOLAR_YIELD, &self.yields.solar),
            (GRID_YIELD, &self.yields.grid),
            (GENSET_YIELD, &self.yields.genset),
        ] {
            if let Some(v) = source.get(name) {
                m.insert(metric, *v);
            }
        }
        m.insert(TOTAL_MONTH_SAVINGS, energy.fuel_savings + energy.outage_savings);
        if energy.no_events {
            m.flag("no outage events recorded");
        }
        Ok(m)
    }

    /// Energy and deviation figures are independent: a table with only one of
    /// the two columns still yields that half, with the other half zeroed and
    /// the set flagged.
    fn frequency(&self, table: &Table) -> Result<MetricSet, String> {
        let cfg = &self.settings.frequency;
        let energy = match EnergyFigures::compute(table, self.settings) {
            Ok(energy) => Some(energy),
            Err(reason) if table.column(&cfg.column).is_some() => {
                warn!("{reason}. Energy savings set to zero.");
                None
            }
            Err(reason) => return Err(reason),
        };
        let mut m = MetricSet::new();
        match &energy {
            Some(e) => e.write_into(&mut m, FREQUENCY_FUEL_SAVINGS),
            None => EnergyFigures::zero().write_into(&mut m, FREQUENCY_FUEL_SAVINGS),
        }

        let (mut deviation, mut maintenance, mut downtime, mut penalty) = (0.0, 0.0, 0.0, 0.0);
        match table.column(&cfg.column) {
            Some(col) => {
                for raw in table.values(col) {
                    let Some(dev) = numeric(raw, &cfg.column) else {
                        continue;
                    };
                    let dev = dev.abs();
                    if dev > cfg.tolerance_hz {
                        deviation += dev * cfg.deviation_rate;
                        maintenance += dev * cfg.maintenance_rate;
                        downtime += dev * cfg.downtime_rate;
                        penalty += dev * cfg.penalty_rate;
                    }
                }
            }
            None => {
                warn!("{} column not found. Deviation costs set to zero.", cfg.column);
                m.flag(format!("{} column not found", cfg.column));
            }
        }
        m.insert(DEVIATION_COST, deviation);
        m.insert(MAINTENANCE_COST_DELTA, maintenance);
        m.insert(DOWNTIME_COST, downtime);
        m.insert(PENALTY_COST, penalty);
        let energy_savings = energy
            .as_ref()
            .map_or(0.0, |e| e.fuel_savings + e.outage_savings);
        m.insert(
            TOTAL_MONTH_SAVINGS,
            energy_savings + deviation + maintenance + downtime + penalty,
        );
        match &energy {
            None => m.flag(format!("{} column not found", self.settings.energy_column)),
            Some(e) if e.no_events => m.flag("no outage events recorded"),
            Some(_) => {}
        }
        Ok(m)
    }

    fn harmonics(&self, table: &Table) -> Result<MetricSet, String> {
        let cfg = &self.settings.harmonics;
        let thd_i_col = required(table, &cfg.thd_i_column)?;
        let thd_v_col = required(table, &cfg.thd_v_column)?;
        let kva_col = required(table, &cfg.apparent_power_column)?;
        let hours = cfg.sample_interval_minutes / 60.0;

        let (mut non_compliant, mut losses, mut cost) = (0.0, 0.0, 0.0);
        for row in &table.rows {
            let (Some(thd_i), Some(thd_v), Some(kva)) = (
                numeric(&row[thd_i_col], &cfg.thd_i_column),
                numeric(&row[thd_v_col], &cfg.thd_v_column),
                numeric(&row[kva_col], &cfg.apparent_power_column),
            ) else {
                continue;
            };
            if thd_i > cfg.limits.thd_i || thd_v > cfg.limits.thd_v {
                let energy = kva * hours;
                let loss = cfg.loss_factor * energy * (thd_i / 100.0);
                non_compliant += energy;
                losses += loss;
                cost += loss * cfg.cost_per_kwh;
            }
        }
        let mut m = MetricSet::new();
        m.insert(NON_COMPLIANT_ENERGY, non_compliant);
        m.insert(ENERGY_LOSSES, losses);
        m.insert(HARMONIC_COST_SAVINGS, cost);
        m.insert(TOTAL_MONTH_SAVINGS, cost);
        Ok(m)
    }

    fn power_factor(&self, table: &Table) -> Result<MetricSet, String> {
        let cfg = &self.settings.power_factor;
        let col = required(table, &cfg.column)?;
        let (mut samples, mut penalty) = (0usize, 0.0);
        for raw in table.values(col) {
            let Some(pf) = numeric(raw, &cfg.column) else {
                continue;
            };
            if pf < cfg.target_power_factor {
                samples += 1;
                penalty += cfg.penalty_rate * (cfg.target_power_factor - pf);
            }
        }
        let mut m = MetricSet::new();
        m.insert(LOW_POWER_FACTOR_SAMPLES, samples as f64);
        m.insert(POWER_FACTOR_PENALTY, penalty);
        m.insert(TOTAL_MONTH_SAVINGS, penalty);
        Ok(m)
    }

    fn voltage(&self, table: &Table) -> Result<MetricSet, String> {
        let cfg = &self.settings.voltage;
        if cfg.site_voltage <= 0.0 {
            return Err("site_voltage must be positive".to_string());
        }
        let grid_col = required(table, &cfg.grid_column)?;
        let load_col = required(table, &cfg.load_column)?;
        let ts_col = table.column(&cfg.timestamp_column);
        let energy = cfg.site_capacity_kva * cfg.sample_interval_minutes / 60.0;

        let (mut excursions, mut savings) = (0usize, 0.0);
        for (grid, load) in pair_samples(table, ts_col, grid_col, load_col) {
            let grid_dev = (grid - cfg.site_voltage).abs();
            let load_dev = (load - cfg.site_voltage).abs();
            if grid_dev / cfg.site_voltage > cfg.tolerance {
                excursions += 1;
                savings += energy * cfg.mismatch_rate * (grid_dev - load_dev) / cfg.site_voltage;
            }
        }
        let mut m = MetricSet::new();
        m.insert(VOLTAGE_EXCURSIONS, excursions as f64);
        m.insert(VOLTAGE_MISMATCH_SAVINGS, savings);
        m.insert(TOTAL_MONTH_SAVINGS, savings);
        Ok(m)
    }
}

// ---------------------------------------------------------------------------
// Shared figures
// ---------------------------------------------------------------------------

struct EnergyFigures {
    kwh_saved: f64,
    outages: f64,
    fuel_savings: f64,
    outage_savings: f64,
    no_events: bool,
}

impl EnergyFigures {
    /// Outages are the number of recorded (non-blank, non-zero) savings
    /// entries minus one. An empty column would give -1; it is clamped to 0
    /// and reported through `no_events`.
    fn compute(table: &Table, settings: &Settings) -> Result<Self, String> {
        let column = &settings.energy_column;
        let col = required(table, column)?;
        let mut kwh_saved = 0.0;
        let mut entries = 0usize;
        for raw in table.values(col) {
            let Some(v) = numeric(raw, column) else {
                continue;
            };
            if v > 0.0 {
                kwh_saved += v;
                entries += 1;
            }
        }
        let no_events = entries == 0;
        let outages = entries.saturating_sub(1) as f64;
        Ok(Self {
            kwh_saved,
            outages,
            fuel_savings: kwh_saved * settings.cost_fuel_plus_mtce,
            outage_savings: outages * settings.cost_per_outage,
            no_events,
        })
    }

    fn zero() -> Self {
        Self {
            kwh_saved: 0.0,
            outages: 0.0,
            fuel_savings: 0.0,
            outage_savings: 0.0,
            no_events: false,
        }
    }

    fn write_into(&self, m: &mut MetricSet, fuel_metric: &str) {
        m.insert(TOTAL_KWH_SAVED, self.kwh_saved);
        m.insert(NUMBER_OF_OUTAGES, self.outages);
        m.insert(fuel_metric, self.fuel_savings);
        m.insert(OUTAGE_SAVINGS, self.outage_savings);
    }
}

fn required(table: &Table, column: &str) -> Result<usize, String> {
    table
        .column(column)
        .ok_or_else(|| format!("{column} column not found"))
}

/// Blank cells are skipped quietly; text in a numeric column is skipped with
/// a warning.
fn numeric(raw: &str, column: &str) -> Option<f64> {
    if raw.trim().is_empty() {
        return None;
    }
    let value = parse_number(raw);
    if value.is_none() {
        warn!("Skipping non-numeric '{column}' value {raw:?}");
    }
    value
}

/// Pair grid and load readings taken at the same timestamp. Rows sharing a
/// timestamp are merged; the first reading of each kind wins. Without a
/// timestamp column each row is its own sample.
fn pair_samples(
    table: &Table,
    ts_col: Option<usize>,
    grid_col: usize,
    load_col: usize,
) -> Vec<(f64, f64)> {
    let mut order: Vec<(Option<f64>, Option<f64>)> = Vec::new();
    let mut index: BTreeMap<String, usize> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let key = match ts_col {
            Some(c) => row[c].trim().to_string(),
            None => i.to_string(),
        };
        if key.is_empty() {
            continue;
        }
        let slot = *index.entry(key).or_insert_with(|| {
            order.push((None, None));
            order.len() - 1
        });
        let entry = &mut order[slot];
        if entry.0.is_none() {
            entry.0 = parse_number(&row[grid_col]);
        }
        if entry.1.is_none() {
            entry.1 = parse_number(&row[load_col]);
        }
    }
    order
        .into_iter()
        .filter_map(|(g, l)| Some((g?, l?)))
        .collect()
}
