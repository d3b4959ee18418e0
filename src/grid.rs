use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use polars::prelude::{Column as FrameColumn, CsvWriter, DataFrame, PolarsError, SerWriter};
use rayon::prelude::*;
use tracing::{debug, info, trace};

use crate::columns::{CellValue, ColumnDef, FilterKind};
use crate::dataset::EmployeeRecord;
use crate::domain::{EXPORT_FILE_NAME, PTVError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
}

impl PageSize {
    pub fn rows(self) -> usize {
        match self {
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
        }
    }

    pub fn next(self) -> Self {
        match self {
            PageSize::Ten => PageSize::TwentyFive,
            PageSize::TwentyFive => PageSize::Fifty,
            PageSize::Fifty => PageSize::Ten,
        }
    }

    pub fn from_rows(rows: u16) -> Result<Self, PTVError> {
        match rows {
            10 => Ok(PageSize::Ten),
            25 => Ok(PageSize::TwentyFive),
            50 => Ok(PageSize::Fifty),
            other => Err(PTVError::InvalidPageSize(other)),
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rows())
    }
}

/// Runtime options pushed into the grid by the view-state controller.
#[derive(Debug, Clone, PartialEq)]
pub enum GridOption {
    QuickFilterText(String),
    PaginationPageSize(PageSize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortModel {
    pub column: usize,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    /// Split a leading operator off an expression. No operator means equality.
    fn split(expr: &str) -> (Self, &str) {
        const OPERATORS: [(&str, Comparison); 6] = [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            ("!=", Comparison::Ne),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
            ("=", Comparison::Eq),
        ];
        let expr = expr.trim();
        OPERATORS
            .iter()
            .find_map(|(op, cmp)| expr.strip_prefix(op).map(|rest| (*cmp, rest.trim())))
            .unwrap_or((Comparison::Eq, expr))
    }

    fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnFilter {
    Text(String),
    Number(Comparison, f64),
    Date(Comparison, NaiveDate),
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl ColumnFilter {
    fn parse(kind: FilterKind, expr: &str) -> Result<Self, PTVError> {
        match kind {
            FilterKind::Text => Ok(ColumnFilter::Text(expr.trim().to_lowercase())),
            FilterKind::Number => {
                let (cmp, operand) = Comparison::split(expr);
                operand
                    .parse::<f64>()
                    .map(|n| ColumnFilter::Number(cmp, n))
                    .map_err(|_| PTVError::InvalidFilter(format!("'{operand}' is not a number")))
            }
            FilterKind::Date => {
                let (cmp, operand) = Comparison::split(expr);
                NaiveDate::parse_from_str(operand, DATE_FORMAT)
                    .map(|d| ColumnFilter::Date(cmp, d))
                    .map_err(|_| {
                        PTVError::InvalidFilter(format!("'{operand}' is not a YYYY-MM-DD date"))
                    })
            }
            FilterKind::None => Err(PTVError::InvalidFilter(
                "this column cannot be filtered".into(),
            )),
        }
    }

    fn matches(&self, column: &ColumnDef, record: &EmployeeRecord) -> bool {
        match self {
            ColumnFilter::Text(needle) => column
                .display_text(record)
                .to_lowercase()
                .contains(needle.as_str()),
            ColumnFilter::Number(cmp, operand) => column
                .value(record)
                .as_number()
                .is_some_and(|n| cmp.holds(n, *operand)),
            ColumnFilter::Date(cmp, operand) => {
                NaiveDate::parse_from_str(column.value(record).as_text().trim(), DATE_FORMAT)
                    .is_ok_and(|d| cmp.holds(d, *operand))
            }
        }
    }
}

/// Selection handle for one row, handed to the selection cell renderer.
pub struct RowNode<'a> {
    grid: &'a mut Grid,
    record_idx: usize,
}

impl RowNode<'_> {
    pub fn is_selected(&self) -> bool {
        self.grid.is_selected(self.record_idx)
    }

    pub fn set_selected(&mut self, selected: bool) {
        if selected {
            self.grid.selected.insert(self.record_idx);
        } else {
            self.grid.selected.remove(&self.record_idx);
        }
        trace!("Row {} selected: {selected}", self.record_idx);
    }
}

/// Filtering, sorting, pagination and selection over a fixed set of records.
pub struct Grid {
    columns: Vec<ColumnDef>,
    records: Vec<EmployeeRecord>,
    search_text: Vec<String>, // Lower-cased text of every column per record, for the quick filter
    quick_filter: String,
    column_filters: BTreeMap<usize, (String, ColumnFilter)>,
    sort: Option<SortModel>,
    page_size: PageSize,
    page: usize,
    selected: BTreeSet<usize>, // Record indices, survives filtering
    rows: Arc<Vec<usize>>,     // Displayed order of record indices after filter and sort
}

impl Grid {
    pub fn new(columns: Vec<ColumnDef>, records: Vec<EmployeeRecord>, page_size: PageSize) -> Self {
        let search_text = records
            .par_iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| c.display_text(record).to_lowercase())
                    .collect::<Vec<String>>()
                    .join("\n")
            })
            .collect();
        let mut grid = Self {
            columns,
            records,
            search_text,
            quick_filter: String::new(),
            column_filters: BTreeMap::new(),
            sort: None,
            page_size,
            page: 0,
            selected: BTreeSet::new(),
            rows: Arc::new(Vec::new()),
        };
        grid.refresh_rows();
        grid
    }

    pub fn set_grid_option(&mut self, option: GridOption) {
        debug!("Grid option {option:?}");
        match option {
            GridOption::QuickFilterText(text) => {
                if text != self.quick_filter {
                    self.quick_filter = text;
                    self.page = 0;
                    self.refresh_rows();
                }
            }
            GridOption::PaginationPageSize(size) => {
                let first_row = self.page * self.page_size.rows();
                self.page_size = size;
                self.page = first_row / size.rows();
                self.clamp_page();
            }
        }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn record(&self, record_idx: usize) -> Option<&EmployeeRecord> {
        self.records.get(record_idx)
    }

    pub fn total_row_count(&self) -> usize {
        self.records.len()
    }

    pub fn displayed_rows(&self) -> &[usize] {
        &self.rows
    }

    pub fn displayed_row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.rows.len().div_ceil(self.page_size.rows())
    }

    /// Record indices shown on the current page.
    pub fn page_rows(&self) -> &[usize] {
        let begin = std::cmp::min(self.page * self.page_size.rows(), self.rows.len());
        let end = std::cmp::min(begin + self.page_size.rows(), self.rows.len());
        &self.rows[begin..end]
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.clamp_page();
    }

    pub fn next_page(&mut self) -> bool {
        let before = self.page;
        self.set_page(self.page + 1);
        before != self.page
    }

    pub fn previous_page(&mut self) -> bool {
        let before = self.page;
        self.set_page(self.page.saturating_sub(1));
        before != self.page
    }

    fn clamp_page(&mut self) {
        self.page = std::cmp::min(self.page, self.page_count().saturating_sub(1));
    }

    pub fn sort(&self) -> Option<SortModel> {
        self.sort
    }

    /// Returns false if the column does not allow sorting.
    pub fn sort_by(&mut self, column: usize, direction: SortDirection) -> bool {
        if !self.columns.get(column).is_some_and(|c| c.sortable) {
            return false;
        }
        self.sort = Some(SortModel { column, direction });
        self.refresh_rows();
        self.clamp_page();
        true
    }

    pub fn clear_sort(&mut self) {
        if self.sort.take().is_some() {
            self.refresh_rows();
        }
    }

    pub fn column_filter(&self, column: usize) -> Option<&str> {
        self.column_filters.get(&column).map(|(expr, _)| expr.as_str())
    }

    /// An empty expression removes the filter. An invalid one leaves the
    /// current filter untouched.
    pub fn set_column_filter(&mut self, column: usize, expr: &str) -> Result<(), PTVError> {
        let kind = self
            .columns
            .get(column)
            .map(|c| c.filter)
            .ok_or_else(|| PTVError::InvalidFilter(format!("unknown column {column}")))?;
        if expr.trim().is_empty() {
            self.clear_column_filter(column);
            return Ok(());
        }
        let filter = ColumnFilter::parse(kind, expr)?;
        self.column_filters
            .insert(column, (expr.trim().to_string(), filter));
        self.page = 0;
        self.refresh_rows();
        Ok(())
    }

    pub fn clear_column_filter(&mut self, column: usize) {
        if self.column_filters.remove(&column).is_some() {
            self.page = 0;
            self.refresh_rows();
        }
    }

    pub fn is_selected(&self, record_idx: usize) -> bool {
        self.selected.contains(&record_idx)
    }

    pub fn row_node(&mut self, record_idx: usize) -> RowNode<'_> {
        RowNode {
            grid: self,
            record_idx,
        }
    }

    pub fn select_all_displayed(&mut self) {
        self.selected.extend(self.rows.iter().copied());
    }

    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Write every displayed row (all pages) to `employees.csv` in `dir`.
    pub fn export_csv(&self, dir: &Path) -> Result<PathBuf, PTVError> {
        let path = dir.join(EXPORT_FILE_NAME);
        let mut frame = self.to_frame()?;
        let mut file = File::create(&path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut frame)?;
        info!("Exported {} rows to {}", frame.height(), path.display());
        Ok(path)
    }

    fn to_frame(&self) -> Result<DataFrame, PolarsError> {
        let columns = self
            .columns
            .iter()
            .filter(|c| c.is_exported())
            .map(|c| {
                let values: Vec<String> = self
                    .rows
                    .iter()
                    .map(|&idx| c.display_text(&self.records[idx]))
                    .collect();
                FrameColumn::new(c.header.into(), values)
            })
            .collect();
        DataFrame::new(columns)
    }

    fn refresh_rows(&mut self) {
        let start_time = Instant::now();
        let words: Vec<String> = self
            .quick_filter
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let columns = &self.columns;
        let records = &self.records;
        let search_text = &self.search_text;
        let column_filters = &self.column_filters;

        let mut rows: Vec<usize> = (0..records.len())
            .into_par_iter()
            .filter(|&idx| {
                words.iter().all(|w| search_text[idx].contains(w.as_str()))
                    && column_filters
                        .iter()
                        .all(|(&col, (_, filter))| filter.matches(&columns[col], &records[idx]))
            })
            .collect();

        if let Some(sort) = self.sort {
            let column = &columns[sort.column];
            let mut keyed: Vec<(usize, CellValue)> = rows
                .iter()
                .map(|&idx| (idx, column.value(&records[idx])))
                .collect();
            keyed.sort_by(|(_, a), (_, b)| match sort.direction {
                SortDirection::Ascending => a.compare(b),
                SortDirection::Descending => b.compare(a),
            });
            rows = keyed.into_iter().map(|(idx, _)| idx).collect();
        }

        trace!(
            "Refreshed grid: {} of {} rows in {}ms",
            rows.len(),
            records.len(),
            start_time.elapsed().as_millis()
        );
        self.rows = Arc::new(rows);
    }
}

#[cfg(test)]
impl Grid {
    pub fn quick_filter_text(&self) -> &str {
        &self.quick_filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{column_defs, toggle_row_selection};
    use crate::dataset::{Skills, bundled};
    use std::fs;
    use tempfile::tempdir;

    const SALARY: usize = 6;
    const HIRE_DATE: usize = 7;
    const NAME: usize = 2;
    const SKILLS: usize = 13;

    fn person(id: i64, first: &str, department: &str, salary: Option<f64>) -> EmployeeRecord {
        EmployeeRecord {
            id: Some(id),
            first_name: Some(first.into()),
            last_name: Some("Test".into()),
            department: Some(department.into()),
            salary,
            skills: Some(Skills::Text("Rust, Go".into())),
            ..Default::default()
        }
    }

    fn small_grid() -> Grid {
        Grid::new(
            column_defs(),
            vec![
                person(1, "Ada", "Engineering", Some(120000.0)),
                person(2, "Bob", "Sales", Some(70000.0)),
                person(3, "Cy", "Engineering", None),
                person(4, "Di", "Marketing", Some(95000.0)),
            ],
            PageSize::Ten,
        )
    }

    fn first_names(grid: &Grid) -> Vec<String> {
        grid.displayed_rows()
            .iter()
            .map(|&i| grid.record(i).unwrap().first_name.clone().unwrap())
            .collect()
    }

    #[test]
    fn page_size_parsing_and_cycle() {
        assert_eq!(PageSize::from_rows(25).unwrap(), PageSize::TwentyFive);
        assert!(matches!(
            PageSize::from_rows(20),
            Err(PTVError::InvalidPageSize(20))
        ));
        assert_eq!(PageSize::Fifty.next(), PageSize::Ten);
        assert_eq!(PageSize::Ten.to_string(), "10");
    }

    #[test]
    fn quick_filter_is_case_insensitive_and_needs_every_word() {
        let mut grid = small_grid();
        grid.set_grid_option(GridOption::QuickFilterText("ENGINEERING".into()));
        assert_eq!(first_names(&grid), vec!["Ada", "Cy"]);

        grid.set_grid_option(GridOption::QuickFilterText("engineering ada".into()));
        assert_eq!(first_names(&grid), vec!["Ada"]);

        grid.set_grid_option(GridOption::QuickFilterText("rust".into()));
        assert_eq!(grid.displayed_row_count(), 4);

        grid.set_grid_option(GridOption::QuickFilterText(String::new()));
        assert_eq!(grid.displayed_row_count(), 4);
    }

    #[test]
    fn number_filter_and_invalid_expression() {
        let mut grid = small_grid();
        grid.set_column_filter(SALARY, ">=90000").unwrap();
        assert_eq!(first_names(&grid), vec!["Ada", "Di"]);
        assert_eq!(grid.column_filter(SALARY), Some(">=90000"));

        assert!(matches!(
            grid.set_column_filter(SALARY, ">= lots"),
            Err(PTVError::InvalidFilter(_))
        ));
        assert_eq!(first_names(&grid), vec!["Ada", "Di"]);

        grid.set_column_filter(SALARY, "").unwrap();
        assert_eq!(grid.displayed_row_count(), 4);
        assert_eq!(grid.column_filter(SALARY), None);
    }

    #[test]
    fn text_and_date_filters() {
        let mut grid = Grid::new(column_defs(), bundled(), PageSize::Ten);
        grid.set_column_filter(HIRE_DATE, "< 2015-01-01").unwrap();
        let years: Vec<String> = grid
            .displayed_rows()
            .iter()
            .map(|&i| grid.record(i).unwrap().hire_date.clone().unwrap())
            .collect();
        assert!(!years.is_empty());
        assert!(years.iter().all(|d| d.as_str() < "2015-01-01"));
        assert!(grid.set_column_filter(HIRE_DATE, "yesterday").is_err());

        grid.clear_column_filter(HIRE_DATE);
        grid.set_column_filter(NAME, "ava JOHN").unwrap();
        assert_eq!(grid.displayed_row_count(), 1);
        assert!(grid.set_column_filter(0, "x").is_err());
    }

    #[test]
    fn sort_descending_and_nulls_first_ascending() {
        let mut grid = small_grid();
        assert!(grid.sort_by(SALARY, SortDirection::Descending));
        assert_eq!(first_names(&grid), vec!["Ada", "Di", "Bob", "Cy"]);
        assert!(grid.sort_by(SALARY, SortDirection::Ascending));
        assert_eq!(first_names(&grid), vec!["Cy", "Bob", "Di", "Ada"]);
        assert!(!grid.sort_by(0, SortDirection::Ascending));
        grid.clear_sort();
        assert_eq!(first_names(&grid), vec!["Ada", "Bob", "Cy", "Di"]);
    }

    #[test]
    fn page_size_change_keeps_position_and_filter() {
        let mut grid = Grid::new(column_defs(), bundled(), PageSize::Ten);
        assert_eq!(grid.page_count(), 2);
        assert!(grid.next_page());
        assert!(!grid.next_page());
        assert_eq!(grid.page_rows().len(), 10);

        grid.set_grid_option(GridOption::QuickFilterText("e".into()));
        assert_eq!(grid.page(), 0);
        let filtered = grid.displayed_row_count();

        grid.set_grid_option(GridOption::PaginationPageSize(PageSize::Fifty));
        assert_eq!(grid.quick_filter_text(), "e");
        assert_eq!(grid.displayed_row_count(), filtered);
        assert_eq!(grid.page_count(), 1);
        assert_eq!(grid.page(), 0);
    }

    fn numbered(count: i64) -> Grid {
        Grid::new(
            column_defs(),
            (1..=count)
                .map(|i| person(i, "P", "Sales", Some(i as f64 * 1000.0)))
                .collect(),
            PageSize::Ten,
        )
    }

    #[test]
    fn page_size_change_keeps_top_row_of_current_page() {
        let mut grid = numbered(60);
        grid.set_page(3);
        assert_eq!(grid.page_rows()[0], 30);

        grid.set_grid_option(GridOption::PaginationPageSize(PageSize::TwentyFive));
        assert_eq!(grid.page(), 1);
        assert_eq!(grid.page_rows()[0], 25);
        assert!(grid.page_rows().contains(&30));

        grid.set_grid_option(GridOption::PaginationPageSize(PageSize::Fifty));
        assert_eq!(grid.page(), 0);
        assert!(grid.page_rows().contains(&30));

        grid.set_grid_option(GridOption::PaginationPageSize(PageSize::Ten));
        assert_eq!(grid.page(), 0);
    }

    #[test]
    fn sort_keeps_current_page_within_bounds() {
        let mut grid = numbered(60);
        grid.set_page(4);
        assert!(grid.sort_by(SALARY, SortDirection::Descending));
        assert_eq!(grid.page(), 4);
        // Records 60..=51 are on page 0, so page 4 starts at record 20
        assert_eq!(grid.record(grid.page_rows()[0]).unwrap().id, Some(20));

        grid.set_page(99);
        assert_eq!(grid.page(), 5);
        assert!(grid.sort_by(NAME, SortDirection::Ascending));
        assert_eq!(grid.page(), 5);
        grid.clear_sort();
        assert_eq!(grid.page(), 5);
    }

    #[test]
    fn mixed_value_kinds_sort_by_text() {
        let skills = [
            Some(Skills::List(vec!["Go".into()])),
            Some(Skills::Text("Rust, Go".into())),
            Some(Skills::List(vec!["Ada".into()])),
            None,
        ];
        let records = skills
            .into_iter()
            .enumerate()
            .map(|(i, skills)| EmployeeRecord {
                id: Some(i as i64),
                skills,
                ..Default::default()
            })
            .collect();
        let mut grid = Grid::new(column_defs(), records, PageSize::Ten);
        assert!(grid.sort_by(SKILLS, SortDirection::Ascending));
        assert_eq!(grid.displayed_rows(), &[3usize, 2, 0, 1]);

        assert_eq!(
            CellValue::Text("10".into()).compare(&CellValue::Int(9)),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            CellValue::Bool(true).compare(&CellValue::Number(1.0)),
            std::cmp::Ordering::Greater
        );
        assert_eq!(
            CellValue::Int(2).compare(&CellValue::Number(10.0)),
            std::cmp::Ordering::Less
        );
    }

    #[test]
    fn selection_survives_filtering_and_counts_all_rows() {
        let mut grid = small_grid();
        for idx in [0, 1, 2] {
            assert!(toggle_row_selection(&mut grid.row_node(idx)));
        }
        assert!(!toggle_row_selection(&mut grid.row_node(1)));
        assert_eq!(grid.selected_count(), 2);

        grid.set_grid_option(GridOption::QuickFilterText("marketing".into()));
        assert_eq!(grid.selected_count(), 2);
        grid.select_all_displayed();
        assert_eq!(grid.selected_count(), 3);
        assert!(grid.is_selected(3));
        assert!(!grid.is_selected(1));

        grid.deselect_all();
        assert_eq!(grid.selected_count(), 0);
    }

    #[test]
    fn export_writes_all_filtered_rows() {
        let dir = tempdir().unwrap();
        let mut grid = Grid::new(column_defs(), bundled(), PageSize::Ten);
        grid.set_grid_option(GridOption::QuickFilterText("engineering".into()));
        grid.sort_by(SALARY, SortDirection::Descending);
        let expected = grid.displayed_row_count();
        assert!(expected > PageSize::Ten.rows() / 2);

        let path = grid.export_csv(dir.path()).unwrap();
        assert_eq!(path, dir.path().join("employees.csv"));

        let csv = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert!(lines[0].starts_with("#,Name,Email,Department,Position,Salary"));
        assert_eq!(lines.len(), expected + 1);
        assert!(lines[1].contains("Daniel Young"));
        assert!(lines[1].contains("\"$165,000\""));
    }

    #[test]
    fn empty_grid_has_no_pages() {
        let mut grid = Grid::new(column_defs(), Vec::new(), PageSize::Ten);
        assert_eq!(grid.page_count(), 0);
        assert!(grid.page_rows().is_empty());
        assert!(!grid.next_page());
        let dir = tempdir().unwrap();
        let csv = fs::read_to_string(grid.export_csv(dir.path()).unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
