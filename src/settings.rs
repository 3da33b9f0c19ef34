use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SavingsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub year: i32,
    pub site: String,
    #[serde(default = "default_data_root")]
    pub data_root: String,
    #[serde(default = "default_results_dir")]
    pub results_dir: String,
    #[serde(rename = "cost_fuel_plus_MTCE", default)]
    pub cost_fuel_plus_mtce: f64,
    #[serde(default)]
    pub cost_per_outage: f64,
    #[serde(default = "default_energy_column")]
    pub energy_column: String,
    #[serde(default)]
    pub cleaning: CleaningSettings,
    #[serde(default)]
    pub inputs: InputSettings,
    #[serde(default)]
    pub frequency: FrequencySettings,
    #[serde(default)]
    pub harmonics: HarmonicSettings,
    #[serde(default)]
    pub power_factor: PowerFactorSettings,
    #[serde(default)]
    pub voltage: VoltageSettings,
    #[serde(default)]
    pub yields: YieldSettings,
}

fn default_data_root() -> String {
    "data".to_string()
}

fn default_results_dir() -> String {
    "results".to_string()
}

fn default_energy_column() -> String {
    "Energy Saving (kWh)".to_string()
}

fn default_interval() -> f64 {
    5.0
}

fn default_delimiter() -> char {
    ','
}

fn default_timestamp_column() -> String {
    "Timestamp".to_string()
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningSettings {
    #[serde(default = "default_exclude_column")]
    pub exclude_column: String,
    #[serde(default = "default_total_marker")]
    pub total_marker: String,
    #[serde(default = "default_duration_column")]
    pub duration_column: String,
    #[serde(default = "default_min_duration")]
    pub min_duration_minutes: f64,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default)]
    pub min_spacing_minutes: Option<f64>,
    #[serde(default)]
    pub overwrite_source: bool,
}

fn default_exclude_column() -> String {
    "Conditions Met".to_string()
}

fn default_total_marker() -> String {
    "Total savings".to_string()
}

fn default_duration_column() -> String {
    "Time Elapsed (minutes)".to_string()
}

fn default_min_duration() -> f64 {
    1.0
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            exclude_column: default_exclude_column(),
            total_marker: default_total_marker(),
            duration_column: default_duration_column(),
            min_duration_minutes: default_min_duration(),
            timestamp_column: default_timestamp_column(),
            min_spacing_minutes: None,
            overwrite_source: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Input tables
// ---------------------------------------------------------------------------

/// Where a domain's monthly tables live. `path` is relative to `data_root`
/// and may contain `{year}` and `{month}` placeholders. With `month_column`
/// set, the path names one yearly table split into months by that column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSource {
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub month_column: Option<String>,
}

impl InputSource {
    fn per_month(path: &str) -> Self {
        Self {
            path: path.to_string(),
            delimiter: default_delimiter(),
            month_column: None,
        }
    }

    pub fn resolve(&self, data_root: &str, year: i32, month: &str) -> PathBuf {
        let rel = self
            .path
            .replace("{year}", &year.to_string())
            .replace("{month}", month);
        PathBuf::from(shellexpand_path(data_root)).join(rel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default = "default_genset_input")]
    pub genset: InputSource,
    #[serde(default = "default_frequency_input")]
    pub frequency: InputSource,
    #[serde(default = "default_harmonics_input")]
    pub harmonics: InputSource,
    #[serde(default = "default_power_factor_input")]
    pub power_factor: InputSource,
    #[serde(default = "default_voltage_input")]
    pub voltage: InputSource,
}

fn default_genset_input() -> InputSource {
    InputSource::per_month("genset_savings_data/{year}/{month}-Genset-Savings.csv")
}

fn default_frequency_input() -> InputSource {
    InputSource::per_month("frequency_savings_data/{year}/{month}-Frequency-Savings.csv")
}

fn default_harmonics_input() -> InputSource {
    InputSource {
        path: "harmonic_data/{year}/Harmonic-Distortion-Month.csv".to_string(),
        delimiter: default_delimiter(),
        month_column: Some("Month".to_string()),
    }
}

fn default_power_factor_input() -> InputSource {
    InputSource {
        path: "power_factor_data/{year}/{month}-Power-Factor.csv".to_string(),
        delimiter: '\t',
        month_column: None,
    }
}

fn default_voltage_input() -> InputSource {
    InputSource::per_month("voltage_data/{year}/{month}-Voltage-Timeseries.csv")
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            genset: default_genset_input(),
            frequency: default_frequency_input(),
            harmonics: default_harmonics_input(),
            power_factor: default_power_factor_input(),
            voltage: default_voltage_input(),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain tariffs and tolerances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencySettings {
    #[serde(default = "default_frequency_column")]
    pub column: String,
    #[serde(default)]
    pub tolerance_hz: f64,
    #[serde(default)]
    pub deviation_rate: f64,
    #[serde(default)]
    pub maintenance_rate: f64,
    #[serde(default)]
    pub downtime_rate: f64,
    #[serde(default)]
    pub penalty_rate: f64,
}

fn default_frequency_column() -> String {
    "Frequency Deviation (Hz)".to_string()
}

impl Default for FrequencySettings {
    fn default() -> Self {
        Self {
            column: default_frequency_column(),
            tolerance_hz: 0.0,
            deviation_rate: 0.0,
            maintenance_rate: 0.0,
            downtime_rate: 0.0,
            penalty_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarmonicLimits {
    #[serde(rename = "THD_I", default)]
    pub thd_i: f64,
    #[serde(rename = "THD_V", default)]
    pub thd_v: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarmonicSettings {
    #[serde(default)]
    pub limits: HarmonicLimits,
    #[serde(default)]
    pub loss_factor: f64,
    #[serde(default)]
    pub cost_per_kwh: f64,
    #[serde(default = "default_interval")]
    pub sample_interval_minutes: f64,
    #[serde(default = "default_thd_i_column")]
    pub thd_i_column: String,
    #[serde(default = "default_thd_v_column")]
    pub thd_v_column: String,
    #[serde(default = "default_apparent_power_column")]
    pub apparent_power_column: String,
}

fn default_thd_i_column() -> String {
    "THD_I".to_string()
}

fn default_thd_v_column() -> String {
    "THD_V".to_string()
}

fn default_apparent_power_column() -> String {
    "Apparent Power (kVA)".to_string()
}

impl Default for HarmonicSettings {
    fn default() -> Self {
        Self {
            limits: HarmonicLimits::default(),
            loss_factor: 0.0,
            cost_per_kwh: 0.0,
            sample_interval_minutes: default_interval(),
            thd_i_column: default_thd_i_column(),
            thd_v_column: default_thd_v_column(),
            apparent_power_column: default_apparent_power_column(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerFactorSettings {
    #[serde(default = "default_power_factor_column")]
    pub column: String,
    #[serde(default = "default_target_power_factor")]
    pub target_power_factor: f64,
    #[serde(default)]
    pub penalty_rate: f64,
}

fn default_power_factor_column() -> String {
    "Power Factor".to_string()
}

fn default_target_power_factor() -> f64 {
    0.95
}

impl Default for PowerFactorSettings {
    fn default() -> Self {
        Self {
            column: default_power_factor_column(),
            target_power_factor: default_target_power_factor(),
            penalty_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoltageSettings {
    #[serde(default = "default_site_voltage")]
    pub site_voltage: f64,
    #[serde(default)]
    pub tolerance: f64,
    #[serde(default)]
    pub site_capacity_kva: f64,
    #[serde(default)]
    pub mismatch_rate: f64,
    #[serde(default = "default_interval")]
    pub sample_interval_minutes: f64,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_grid_voltage_column")]
    pub grid_column: String,
    #[serde(default = "default_load_voltage_column")]
    pub load_column: String,
}

fn default_site_voltage() -> f64 {
    230.0
}

fn default_grid_voltage_column() -> String {
    "Grid Voltage".to_string()
}

fn default_load_voltage_column() -> String {
    "Load Voltage".to_string()
}

impl Default for VoltageSettings {
    fn default() -> Self {
        Self {
            site_voltage: default_site_voltage(),
            tolerance: 0.0,
            site_capacity_kva: 0.0,
            mismatch_rate: 0.0,
            sample_interval_minutes: default_interval(),
            timestamp_column: default_timestamp_column(),
            grid_column: default_grid_voltage_column(),
            load_column: default_load_voltage_column(),
        }
    }
}

// ---------------------------------------------------------------------------
// Genset yield tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldSource {
    pub file: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldSettings {
    #[serde(default = "default_yield_dir")]
    pub dir: String,
    #[serde(default = "default_solar_yield")]
    pub solar: YieldSource,
    #[serde(default = "default_grid_yield")]
    pub grid: YieldSource,
    #[serde(default = "default_genset_yield")]
    pub genset: YieldSource,
}

fn default_yield_dir() -> String {
    "yield_data{year}".to_string()
}

fn yield_source(file: &str, column: &str) -> YieldSource {
    YieldSource {
        file: file.to_string(),
        column: column.to_string(),
    }
}

fn default_solar_yield() -> YieldSource {
    yield_source("Solar-Energy-Yield-Month.csv", "Solar Energy Yield Month")
}

fn default_grid_yield() -> YieldSource {
    yield_source("Grid-Energy-Yield-Month.csv", "Grid Energy Yield Month")
}

fn default_genset_yield() -> YieldSource {
    yield_source("Genset-Energy-Yield-Month.csv", "Genset Energy Yield Month")
}

impl Default for YieldSettings {
    fn default() -> Self {
        Self {
            dir: default_yield_dir(),
            solar: default_solar_yield(),
            grid: default_grid_yield(),
            genset: default_genset_yield(),
        }
    }
}

impl YieldSettings {
    pub fn resolve(&self, data_root: &str, year: i32, source: &YieldSource) -> PathBuf {
        let dir = self.dir.replace("{year}", &year.to_string());
        PathBuf::from(shellexpand_path(data_root)).join(dir).join(&source.file)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Settings {
    pub fn results_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.results_dir))
    }
}

/// Read the run configuration. A missing or malformed file is fatal.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Err(SavingsError::Config(format!(
            "{} does not exist",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    if settings.site.trim().is_empty() {
        return Err(SavingsError::Config("`site` must not be empty".to_string()));
    }
    info!("Loaded {}", path.display());
    Ok(settings)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
