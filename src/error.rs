use thiserror::Error;

#[derive(Error, Debug)]
pub enum SavingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook write error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("Workbook read error: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Layout error: {0}")]
    Layout(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SavingsError>;
