use std::io::Error;
use std::path::PathBuf;

use derive_setters::Setters;
use polars::error::PolarsError;
use ratatui::crossterm::event::KeyEvent;
use thiserror::Error;

use crate::grid::PageSize;

pub const APP_TITLE: &str = "People Dashboard";
pub const APP_SUBTITLE: &str = "Client-side table using ratatui";
pub const EXPORT_FILE_NAME: &str = "employees.csv";
pub const EMPTY_DATASET_MESSAGE: &str = "No data available. Check JSON import and console.";
pub const NO_MATCHING_ROWS_MESSAGE: &str = "No rows to show";

pub const HELP_TEXT: &str = "\
ptv - people table viewer

Navigation
  j / Down      next row            k / Up        previous row
  h / Left      previous column     l / Right     next column
  n / PageDown  next page           p / PageUp    previous page
  g / Home      first row           G / End       last row

Grid
  /             quick search (Esc clears)
  f             filter current column
  F             clear filter of current column
  s / S         sort current column ascending / descending
  u             clear sort
  r             cycle rows per page (10, 25, 50)

Selection
  Space         toggle selection of current row
  a             select all displayed rows
  A             clear selection

Other
  Enter         show record        Esc    back
  y / Y         copy cell / row    e      export CSV
  t             toggle light/dark  ?      this help
  q             quit
";

#[derive(Debug, Error)]
pub enum PTVError {
    #[error("I/O error: {0}")]
    IoError(#[from] Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Preference file error: {0}")]
    PreferenceParseError(#[from] toml::de::Error),

    #[error("Preference file error: {0}")]
    PreferenceWriteError(#[from] toml::ser::Error),

    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),

    #[error("Loading failed: {0}")]
    LoadingFailed(String),

    #[error("File not found")]
    FileNotFound,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid page size {0}, expected one of 10, 25, 50")]
    InvalidPageSize(u16),
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_")]
pub struct PTVConfig {
    pub event_poll_time: u64,
    pub max_column_width: usize,
    pub page_size: PageSize,
    pub export_dir: PathBuf,
    #[setters(strip_option)]
    pub preferences_path: Option<PathBuf>,
    #[setters(strip_option)]
    pub log_file: Option<PathBuf>,
}

impl Default for PTVConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            max_column_width: 32,
            page_size: PageSize::default(),
            export_dir: PathBuf::from("."),
            preferences_path: None,
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    MoveBeginning,
    MoveEnd,
    NextPage,
    PreviousPage,
    CyclePageSize,
    Search,
    Filter,
    ClearFilter,
    SortAscending,
    SortDescending,
    ClearSort,
    ToggleSelection,
    SelectAll,
    ClearSelection,
    ToggleTheme,
    ExportCsv,
    CopyCell,
    CopyRow,
    Help,
    Enter,
    Exit,
    Resize(usize, usize),
    RawKey(KeyEvent),
}
