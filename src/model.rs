use arboard::Clipboard;
use ratatui::crossterm::event::KeyEvent;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::columns::{
    CellVisual, ColumnDef, ColumnWidth, FilterKind, RenderContext, column_defs, row_height,
    toggle_row_selection,
};
use crate::dataset::EmployeeRecord;
use crate::domain::{
    EMPTY_DATASET_MESSAGE, HELP_TEXT, Message, NO_MATCHING_ROWS_MESSAGE, PTVConfig, PTVError,
};
use crate::grid::{Grid, GridOption, PageSize, SortDirection};
use crate::inputter::{InputResult, Inputter};
use crate::preferences::{PreferenceStore, THEME_PREFERENCE_KEY};
use crate::theme::{Theme, ThemeMode};
use crate::ui::{COLUMN_SPACING, HEADER_HEIGHT, STATUSLINE_HEIGHT, TABLE_HEADER_HEIGHT};

#[derive(Debug, PartialEq)]
pub enum Status {
    READY,
    QUITTING,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Modus {
    TABLE,
    RECORD,
    POPUP,
    SEARCH,
    FILTER,
}

/// The four independent pieces of state behind the dashboard header.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub quick_filter_text: String,
    pub page_size: PageSize,
    pub selected_count: usize,
    pub theme_mode: ThemeMode,
}

#[derive(Clone, Debug)]
pub struct ColumnView {
    pub name: String,
    pub width: usize,
    pub pinned: bool,
    pub sort: Option<SortDirection>,
    pub filtered: bool,
}

#[derive(Clone, Debug)]
pub struct RowView {
    pub height: u16,
    pub selected: bool,
    pub cells: Vec<CellVisual>,
}

#[derive(Clone, Debug, Default)]
pub struct RecordData {
    pub title: String,
    pub fields: Vec<(String, String)>,
    pub selected: usize,
    pub offset: usize,
}

struct RecordView {
    position: usize, // Index into the grid's displayed rows
    curser_row: usize,
    offset: usize,
}

#[derive(Default, Clone, Debug)]
pub struct UILayout {
    pub width: usize,
    pub height: usize,
    pub table_width: usize,
    pub table_height: usize,
}

impl UILayout {
    pub fn from_values(ui_width: usize, ui_height: usize) -> Self {
        let layout = UILayout {
            width: ui_width,
            height: ui_height,
            table_width: ui_width,
            table_height: ui_height
                .saturating_sub(HEADER_HEIGHT + TABLE_HEADER_HEIGHT + STATUSLINE_HEIGHT),
        };
        trace!("Build UILayout: {:?}", layout);
        layout
    }
}

/// Everything the UI needs to draw one frame.
pub struct UIData {
    pub view: ViewState,
    pub theme: Theme,
    pub columns: Vec<ColumnView>,
    pub rows: Vec<RowView>,
    pub selected_row: usize,
    pub selected_column: usize,
    pub page: usize,
    pub page_count: usize,
    pub displayed_rows: usize,
    pub total_rows: usize,
    pub empty_message: Option<&'static str>,
    pub search: InputResult,
    pub search_active: bool,
    pub filter_prompt: Option<(String, InputResult)>,
    pub record: Option<RecordData>,
    pub show_popup: bool,
    pub popup_message: String,
    pub status_message: String,
    pub last_update: Instant,
}

impl UIData {
    pub fn empty() -> Self {
        UIData {
            view: ViewState {
                quick_filter_text: String::new(),
                page_size: PageSize::default(),
                selected_count: 0,
                theme_mode: ThemeMode::default(),
            },
            theme: Theme::default(),
            columns: Vec::new(),
            rows: Vec::new(),
            selected_row: 0,
            selected_column: 0,
            page: 0,
            page_count: 0,
            displayed_rows: 0,
            total_rows: 0,
            empty_message: None,
            search: InputResult::default(),
            search_active: false,
            filter_prompt: None,
            record: None,
            show_popup: false,
            popup_message: String::new(),
            status_message: String::new(),
            last_update: Instant::now(),
        }
    }
}

/// View-state controller: owns the dashboard state and drives the grid.
pub struct Model {
    config: PTVConfig,
    pub status: Status,
    modus: Modus,
    previous_modus: Modus,
    grid: Grid,
    view: ViewState,
    theme: Theme,
    preferences: Box<dyn PreferenceStore>,
    column_widths: Vec<usize>,
    visible_columns: Vec<(usize, usize)>, // (column idx, render width)
    curser_row: usize,                    // Row on the current page
    curser_column: usize,                 // Column idx
    offset_row: usize,                    // First page row on screen
    offset_column: usize,                 // First scrollable column on screen
    record_view: RecordView,
    filter_column: Option<usize>,
    uilayout: UILayout,
    uidata: UIData,
    clipboard: Option<Clipboard>,
    input: Inputter,
    last_input: InputResult,
    status_message: String,
}

impl Model {
    pub fn init(
        config: &PTVConfig,
        records: Vec<EmployeeRecord>,
        preferences: Box<dyn PreferenceStore>,
        ui_width: usize,
        ui_height: usize,
    ) -> Self {
        let theme_mode =
            ThemeMode::from_preference(preferences.get(THEME_PREFERENCE_KEY).as_deref());
        let columns = column_defs();
        let start_time = Instant::now();
        let column_widths = columns
            .par_iter()
            .map(|c| Self::calculate_column_width(c, &records, config.max_column_width))
            .collect();
        debug!(
            "Column widths took {}ms for {} records",
            start_time.elapsed().as_millis(),
            records.len()
        );
        let nrecords = records.len();
        let grid = Grid::new(columns, records, config.page_size);

        let mut model = Self {
            config: config.clone(),
            status: Status::READY,
            modus: Modus::TABLE,
            previous_modus: Modus::TABLE,
            grid,
            view: ViewState {
                quick_filter_text: String::new(),
                page_size: config.page_size,
                selected_count: 0,
                theme_mode,
            },
            theme: Theme::new(theme_mode),
            preferences,
            column_widths,
            visible_columns: Vec::new(),
            curser_row: 0,
            curser_column: 0,
            offset_row: 0,
            offset_column: 0,
            record_view: RecordView {
                position: 0,
                curser_row: 0,
                offset: 0,
            },
            filter_column: None,
            uilayout: UILayout::from_values(ui_width, ui_height),
            uidata: UIData::empty(),
            clipboard: None,
            input: Inputter::default(),
            last_input: InputResult::default(),
            status_message: String::new(),
        };
        info!("Loaded {nrecords} records, theme {}", theme_mode.as_str());
        model.set_status_message(format!("Loaded {nrecords} employees. Press ? for help."));
        model.update_table_data();
        model
    }

    fn calculate_column_width(
        column: &ColumnDef,
        records: &[EmployeeRecord],
        max_column_width: usize,
    ) -> usize {
        match column.width {
            ColumnWidth::Fixed(width) => width as usize,
            ColumnWidth::Min(min) => {
                let content = records
                    .iter()
                    .map(|r| column.display_text(r).chars().count())
                    .max()
                    .unwrap_or(0);
                let natural = std::cmp::max(column.header.chars().count() + 2, content);
                std::cmp::max(min as usize, std::cmp::min(natural, max_column_width))
            }
        }
    }

    pub fn get_uidata(&self) -> &UIData {
        &self.uidata
    }

    pub fn raw_keyevents(&self) -> bool {
        matches!(self.modus, Modus::SEARCH | Modus::FILTER)
    }

    pub fn quit(&mut self) {
        self.status = Status::QUITTING;
    }

    fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.uidata.status_message = self.status_message.clone();
        self.uidata.last_update = Instant::now();
    }

    pub fn update(&mut self, message: Option<Message>) -> Result<(), PTVError> {
        let Some(msg) = message else {
            return Ok(());
        };
        trace!("Update: Modus {:?}, Message {:?}", self.modus, msg);
        match self.modus {
            Modus::TABLE => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_table_selection_down(),
                Message::MoveUp => self.move_table_selection_up(),
                Message::MoveLeft => self.move_table_selection_left(),
                Message::MoveRight => self.move_table_selection_right(),
                Message::MoveBeginning => self.move_table_selection_beginning(),
                Message::MoveEnd => self.move_table_selection_end(),
                Message::NextPage => self.change_page(true),
                Message::PreviousPage => self.change_page(false),
                Message::CyclePageSize => self.set_page_size(self.view.page_size.next()),
                Message::Search => self.enter_search_mode(),
                Message::Filter => self.enter_filter_mode(),
                Message::ClearFilter => self.clear_current_column_filter(),
                Message::SortAscending => self.sort_current_column(SortDirection::Ascending),
                Message::SortDescending => self.sort_current_column(SortDirection::Descending),
                Message::ClearSort => {
                    self.grid.clear_sort();
                    self.update_table_data();
                }
                Message::ToggleSelection => self.toggle_current_selection(),
                Message::SelectAll => self.select_all(),
                Message::ClearSelection => self.clear_selection(),
                Message::ToggleTheme => self.toggle_theme(),
                Message::ExportCsv => self.export_csv(),
                Message::CopyCell => self.copy_table_cell(),
                Message::CopyRow => self.copy_table_row(),
                Message::Help => self.show_help(),
                Message::Enter => self.enter(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::RECORD => match msg {
                Message::Quit => self.quit(),
                Message::MoveDown => self.move_record_selection(true),
                Message::MoveUp => self.move_record_selection(false),
                Message::MoveLeft => self.step_record(false),
                Message::MoveRight => self.step_record(true),
                Message::ToggleSelection => self.toggle_current_selection(),
                Message::ToggleTheme => self.toggle_theme(),
                Message::CopyCell => self.copy_record_cell(),
                Message::Help => self.show_help(),
                Message::Enter | Message::Exit => self.exit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
            Modus::POPUP => match msg {
                Message::Quit => self.quit(),
                Message::Resize(width, height) => self.ui_resize(width, height),
                Message::Exit | Message::Enter | Message::Help => self.exit(),
                _ => (),
            },
            Modus::SEARCH | Modus::FILTER => match msg {
                Message::RawKey(key) => self.raw_input(key),
                Message::Resize(width, height) => self.ui_resize(width, height),
                _ => (),
            },
        }
        Ok(())
    }

    // -------------------- View state operations ---------------------- //

    pub fn set_quick_filter(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.view.quick_filter_text = text.clone();
        self.grid.set_grid_option(GridOption::QuickFilterText(text));
        self.reset_table_curser();
        self.update_table_data();
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.view.page_size = page_size;
        self.grid
            .set_grid_option(GridOption::PaginationPageSize(page_size));
        self.offset_row = 0;
        self.set_status_message(format!("{page_size} rows per page"));
        self.update_table_data();
    }

    pub fn toggle_theme(&mut self) {
        let mode = self.view.theme_mode.toggled();
        self.view.theme_mode = mode;
        self.theme = Theme::new(mode);
        match self.preferences.set(THEME_PREFERENCE_KEY, mode.as_str()) {
            Ok(()) => self.set_status_message(format!("Switched to {} mode", mode.as_str())),
            Err(e) => {
                warn!("Could not persist theme preference: {e}");
                self.set_status_message(format!("Theme not saved: {e}"));
            }
        }
        self.update_table_data();
    }

    pub fn on_selection_changed(&mut self) {
        self.view.selected_count = self.grid.selected_count();
        trace!("Selected rows: {}", self.view.selected_count);
    }

    pub fn export_csv(&mut self) {
        match self.grid.export_csv(&self.config.export_dir) {
            Ok(path) => self.set_status_message(format!(
                "Exported {} rows to {}",
                self.grid.displayed_row_count(),
                path.display()
            )),
            Err(e) => {
                error!("CSV export failed: {e}");
                self.set_status_message(format!("Export failed: {e}"));
            }
        }
    }

    // -------------------- Control handling functions ---------------------- //

    fn current_record_idx(&self) -> Option<usize> {
        match self.modus {
            Modus::RECORD => self
                .grid
                .displayed_rows()
                .get(self.record_view.position)
                .copied(),
            _ => self.grid.page_rows().get(self.curser_row).copied(),
        }
    }

    fn toggle_current_selection(&mut self) {
        if let Some(record_idx) = self.current_record_idx() {
            toggle_row_selection(&mut self.grid.row_node(record_idx));
            self.on_selection_changed();
            self.refresh_view();
        }
    }

    fn select_all(&mut self) {
        self.grid.select_all_displayed();
        self.on_selection_changed();
        self.update_table_data();
    }

    fn clear_selection(&mut self) {
        self.grid.deselect_all();
        self.on_selection_changed();
        self.update_table_data();
    }

    fn sort_current_column(&mut self, direction: SortDirection) {
        let header = self.grid.columns()[self.curser_column].header;
        if self.grid.sort_by(self.curser_column, direction) {
            self.set_status_message(format!("Sorted by {header} {direction:?}"));
        } else {
            self.set_status_message("This column cannot be sorted");
        }
        self.update_table_data();
    }

    fn clear_current_column_filter(&mut self) {
        self.grid.clear_column_filter(self.curser_column);
        self.reset_table_curser();
        self.update_table_data();
    }

    fn enter_search_mode(&mut self) {
        trace!("Entering search mode ...");
        self.previous_modus = self.modus;
        self.modus = Modus::SEARCH;
        self.input.clear();
        self.input.set(&self.view.quick_filter_text);
        self.last_input = self.input.get();
        self.update_table_data();
    }

    fn enter_filter_mode(&mut self) {
        let column = &self.grid.columns()[self.curser_column];
        if column.filter == FilterKind::None {
            self.set_status_message("This column cannot be filtered");
            return;
        }
        trace!("Entering filter mode for {} ...", column.header);
        let current = self
            .grid
            .column_filter(self.curser_column)
            .unwrap_or_default()
            .to_string();
        self.previous_modus = self.modus;
        self.modus = Modus::FILTER;
        self.filter_column = Some(self.curser_column);
        self.input.clear();
        self.input.set(&current);
        self.last_input = self.input.get();
        self.update_table_data();
    }

    fn raw_input(&mut self, key: KeyEvent) {
        self.last_input = self.input.read(key);
        match self.modus {
            Modus::SEARCH => {
                if self.last_input.changed {
                    self.set_quick_filter(self.last_input.input.clone());
                }
            }
            Modus::FILTER => {
                if self.last_input.finished && !self.last_input.canceled {
                    self.apply_column_filter();
                }
            }
            _ => {}
        }
        if self.last_input.finished {
            self.modus = self.previous_modus;
            self.previous_modus = Modus::SEARCH;
            self.filter_column = None;
        }
        self.update_table_data();
    }

    fn apply_column_filter(&mut self) {
        let Some(column) = self.filter_column else {
            return;
        };
        let expr = self.last_input.input.clone();
        match self.grid.set_column_filter(column, &expr) {
            Ok(()) => {
                let header = self.grid.columns()[column].header;
                self.set_status_message(if expr.trim().is_empty() {
                    format!("Cleared filter on {header}")
                } else {
                    format!("Filtered {header} by {}", expr.trim())
                });
                self.reset_table_curser();
            }
            Err(e) => {
                debug!("Rejected filter {expr:?}: {e}");
                self.set_status_message(e.to_string());
            }
        }
    }

    fn enter(&mut self) {
        if let Some(position) = self
            .current_record_idx()
            .and_then(|idx| self.grid.displayed_rows().iter().position(|&r| r == idx))
        {
            self.record_view = RecordView {
                position,
                curser_row: 0,
                offset: 0,
            };
            self.previous_modus = Modus::TABLE;
            self.modus = Modus::RECORD;
            self.refresh_view();
        }
    }

    fn exit(&mut self) {
        match self.modus {
            Modus::RECORD => {
                // Land on the page of the record we were looking at.
                let page_size = self.grid.page_size().rows();
                self.grid.set_page(self.record_view.position / page_size);
                self.curser_row = self.record_view.position % page_size;
                self.previous_modus = Modus::RECORD;
                self.modus = Modus::TABLE;
            }
            Modus::POPUP => {
                trace!("Close popup ...");
                self.modus = self.previous_modus;
                self.previous_modus = Modus::POPUP;
            }
            _ => {}
        }
        self.refresh_view();
    }

    fn show_help(&mut self) {
        self.previous_modus = self.modus;
        self.modus = Modus::POPUP;
        self.refresh_view();
    }

    fn ui_resize(&mut self, width: usize, height: usize) {
        trace!(
            "UI was resized! w:{}->{}, h:{}->{}",
            self.uilayout.width, width, self.uilayout.height, height
        );
        self.uilayout = UILayout::from_values(width, height);
        self.refresh_view();
    }

    fn change_page(&mut self, forward: bool) {
        let moved = if forward {
            self.grid.next_page()
        } else {
            self.grid.previous_page()
        };
        if moved {
            self.reset_table_curser();
            self.update_table_data();
        }
    }

    fn reset_table_curser(&mut self) {
        self.curser_row = 0;
        self.offset_row = 0;
    }

    fn move_table_selection_beginning(&mut self) {
        self.grid.set_page(0);
        self.reset_table_curser();
        self.update_table_data();
    }

    fn move_table_selection_end(&mut self) {
        self.grid.set_page(self.grid.page_count().saturating_sub(1));
        self.curser_row = self.grid.page_rows().len().saturating_sub(1);
        self.update_table_data();
    }

    fn move_table_selection_up(&mut self) {
        if self.curser_row > 0 {
            self.curser_row -= 1;
        } else if self.grid.previous_page() {
            // Continue at the bottom of the previous page
            self.curser_row = self.grid.page_rows().len().saturating_sub(1);
        }
        self.update_table_data();
    }

    fn move_table_selection_down(&mut self) {
        if self.curser_row + 1 < self.grid.page_rows().len() {
            self.curser_row += 1;
        } else if self.grid.next_page() {
            self.reset_table_curser();
        }
        self.update_table_data();
    }

    fn move_table_selection_left(&mut self) {
        self.curser_column = self.curser_column.saturating_sub(1);
        self.update_table_data();
    }

    fn move_table_selection_right(&mut self) {
        if self.curser_column + 1 < self.grid.columns().len() {
            self.curser_column += 1;
        }
        self.update_table_data();
    }

    fn move_record_selection(&mut self, down: bool) {
        let record = &mut self.record_view;
        let nfields = self
            .grid
            .columns()
            .iter()
            .filter(|c| c.is_exported())
            .count();
        if down {
            record.curser_row = std::cmp::min(record.curser_row + 1, nfields.saturating_sub(1));
        } else {
            record.curser_row = record.curser_row.saturating_sub(1);
        }
        self.update_record_data();
    }

    fn step_record(&mut self, forward: bool) {
        let record = &mut self.record_view;
        if forward {
            if record.position + 1 < self.grid.displayed_row_count() {
                record.position += 1;
            }
        } else {
            record.position = record.position.saturating_sub(1);
        }
        self.update_record_data();
    }

    fn cell_text(&self, column: &ColumnDef, record_idx: usize) -> String {
        let Some(record) = self.grid.record(record_idx) else {
            return String::new();
        };
        match column.renderer {
            Some(_) => column
                .render(
                    record,
                    &RenderContext {
                        theme: &self.theme,
                        selected: self.grid.is_selected(record_idx),
                    },
                )
                .plain_text(),
            None => column.display_text(record),
        }
    }

    fn copy_to_clipboard(&mut self, text: String) {
        if self.clipboard.is_none() {
            match Clipboard::new() {
                Ok(clipboard) => self.clipboard = Some(clipboard),
                Err(e) => {
                    error!("Clipboard not available: {e:?}");
                    self.set_status_message("Clipboard not available");
                    return;
                }
            }
        }
        let result = match self.clipboard.as_mut() {
            Some(clipboard) => clipboard.set_text(text),
            None => return,
        };
        match result {
            Ok(_) => self.set_status_message("Copied to clipboard"),
            Err(e) => {
                error!("Error copying to clipboard: {e:?}");
                self.set_status_message("Copy to clipboard failed");
            }
        }
    }

    fn copy_table_cell(&mut self) {
        if let Some(record_idx) = self.current_record_idx() {
            let column = &self.grid.columns()[self.curser_column];
            let cell = self.cell_text(column, record_idx);
            trace!("Cell content: {}", cell);
            self.copy_to_clipboard(cell);
        }
    }

    fn wrap_cell_content(c: &str) -> String {
        if c.contains(['"', ',', '\n']) {
            format!("\"{}\"", c.replace('"', "\"\""))
        } else {
            c.to_string()
        }
    }

    fn copy_table_row(&mut self) {
        if let Some(record_idx) = self.current_record_idx() {
            let Some(record) = self.grid.record(record_idx) else {
                return;
            };
            let row_content = self
                .grid
                .columns()
                .iter()
                .filter(|c| c.is_exported())
                .map(|c| Self::wrap_cell_content(&c.display_text(record)))
                .collect::<Vec<String>>()
                .join(",");
            self.copy_to_clipboard(row_content);
        }
    }

    fn copy_record_cell(&mut self) {
        if let Some(record) = self.build_record_data() {
            if let Some((_, value)) = record.fields.get(record.selected) {
                self.copy_to_clipboard(value.clone());
            }
        }
    }

    // -------------------- UI data ---------------------- //

    fn refresh_view(&mut self) {
        match self.modus {
            Modus::RECORD => self.update_record_data(),
            _ => self.update_table_data(),
        }
    }

    fn update_visible_columns(&mut self) {
        let columns = self.grid.columns();
        let widths = &self.column_widths;
        let mut budget = self.uilayout.table_width;
        let mut visible = Vec::new();

        for (idx, _) in columns.iter().enumerate().filter(|(_, c)| c.pinned) {
            let width = widths[idx] + COLUMN_SPACING;
            if width > budget {
                break;
            }
            budget -= width;
            visible.push((idx, widths[idx]));
        }

        let scrollable: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.pinned)
            .map(|(idx, _)| idx)
            .collect();
        self.offset_column = std::cmp::min(self.offset_column, scrollable.len().saturating_sub(1));

        // Scroll just far enough to keep the curser column on screen
        if let Some(pos) = scrollable.iter().position(|&c| c == self.curser_column) {
            if pos < self.offset_column {
                self.offset_column = pos;
            }
            while self.offset_column < pos
                && scrollable[self.offset_column..=pos]
                    .iter()
                    .map(|&c| widths[c] + COLUMN_SPACING)
                    .sum::<usize>()
                    > budget
            {
                self.offset_column += 1;
            }
        }

        for &idx in scrollable.iter().skip(self.offset_column) {
            let width = widths[idx] + COLUMN_SPACING;
            if width <= budget {
                budget -= width;
                visible.push((idx, widths[idx]));
            } else {
                // Add the last partially visible column
                if budget > COLUMN_SPACING {
                    visible.push((idx, budget - COLUMN_SPACING));
                }
                break;
            }
        }
        self.visible_columns = visible;
    }

    fn update_table_data(&mut self) {
        self.update_visible_columns();

        let page_rows = self.grid.page_rows().to_vec();
        self.curser_row = std::cmp::min(self.curser_row, page_rows.len().saturating_sub(1));
        let heights: Vec<usize> = page_rows
            .iter()
            .map(|&idx| self.grid.record(idx).map_or(1, row_height) as usize)
            .collect();

        // Keep the curser row inside the table body
        let table_height = self.uilayout.table_height;
        if self.curser_row < self.offset_row {
            self.offset_row = self.curser_row;
        }
        while self.offset_row < self.curser_row
            && heights[self.offset_row..=self.curser_row].iter().sum::<usize>() > table_height
        {
            self.offset_row += 1;
        }
        self.offset_row = std::cmp::min(self.offset_row, page_rows.len().saturating_sub(1));

        let mut rows = Vec::new();
        let mut used_height = 0;
        for (pos, &record_idx) in page_rows.iter().enumerate().skip(self.offset_row) {
            if !rows.is_empty() && used_height + heights[pos] > table_height {
                break;
            }
            used_height += heights[pos];
            let Some(record) = self.grid.record(record_idx) else {
                continue;
            };
            let cx = RenderContext {
                theme: &self.theme,
                selected: self.grid.is_selected(record_idx),
            };
            let cells = self
                .visible_columns
                .iter()
                .map(|&(cidx, _)| self.grid.columns()[cidx].render(record, &cx))
                .collect();
            rows.push(RowView {
                height: heights[pos] as u16,
                selected: cx.selected,
                cells,
            });
        }

        let sort = self.grid.sort();
        let columns = self
            .visible_columns
            .iter()
            .map(|&(cidx, width)| {
                let column = &self.grid.columns()[cidx];
                ColumnView {
                    name: column.header.to_string(),
                    width,
                    pinned: column.pinned,
                    sort: sort.filter(|s| s.column == cidx).map(|s| s.direction),
                    filtered: self.grid.column_filter(cidx).is_some(),
                }
            })
            .collect();

        let empty_message = if self.grid.total_row_count() == 0 {
            Some(EMPTY_DATASET_MESSAGE)
        } else if self.grid.displayed_row_count() == 0 {
            Some(NO_MATCHING_ROWS_MESSAGE)
        } else {
            None
        };

        let filter_prompt = self.filter_column.map(|cidx| {
            (
                self.grid.columns()[cidx].header.to_string(),
                self.last_input.clone(),
            )
        });
        let search = match self.modus {
            Modus::SEARCH => self.last_input.clone(),
            _ => InputResult {
                curser_pos: self.view.quick_filter_text.chars().count(),
                input: self.view.quick_filter_text.clone(),
                ..Default::default()
            },
        };

        self.uidata = UIData {
            view: self.view.clone(),
            theme: self.theme.clone(),
            columns,
            rows,
            selected_row: self.curser_row.saturating_sub(self.offset_row),
            selected_column: self
                .visible_columns
                .iter()
                .position(|&(c, _)| c == self.curser_column)
                .unwrap_or(0),
            page: self.grid.page(),
            page_count: self.grid.page_count(),
            displayed_rows: self.grid.displayed_row_count(),
            total_rows: self.grid.total_row_count(),
            empty_message,
            search,
            search_active: self.modus == Modus::SEARCH,
            filter_prompt,
            record: None,
            show_popup: self.modus == Modus::POPUP,
            popup_message: if self.modus == Modus::POPUP {
                HELP_TEXT.to_string()
            } else {
                String::new()
            },
            status_message: self.status_message.clone(),
            last_update: Instant::now(),
        };
    }

    fn build_record_data(&self) -> Option<RecordData> {
        let record_idx = self
            .grid
            .displayed_rows()
            .get(self.record_view.position)
            .copied()?;
        let record = self.grid.record(record_idx)?;
        let fields = self
            .grid
            .columns()
            .iter()
            .filter(|c| c.is_exported())
            .map(|c| (c.header.to_string(), self.cell_text(c, record_idx)))
            .collect();
        let selected = if self.grid.is_selected(record_idx) {
            " [selected]"
        } else {
            ""
        };
        Some(RecordData {
            title: format!(
                "Record {}/{}: {} {}{selected}",
                self.record_view.position + 1,
                self.grid.displayed_row_count(),
                record.first_name.as_deref().unwrap_or_default(),
                record.last_name.as_deref().unwrap_or_default(),
            ),
            fields,
            selected: self.record_view.curser_row,
            offset: self.record_view.offset,
        })
    }

    fn update_record_data(&mut self) {
        let height = self.uilayout.table_height;
        let record = &mut self.record_view;
        if record.curser_row < record.offset {
            record.offset = record.curser_row;
        } else if height > 0 && record.curser_row >= record.offset + height {
            record.offset = record.curser_row + 1 - height;
        }
        self.update_table_data();
        self.uidata.record = self.build_record_data();
    }
}

#[cfg(test)]
impl Model {
    pub fn view_state(&self) -> &ViewState {
        &self.view
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }
}
