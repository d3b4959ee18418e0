use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap},
};

use crate::columns::{CellVisual, ChipVariant, Tone};
use crate::domain::{APP_SUBTITLE, APP_TITLE, PTVConfig};
use crate::inputter::InputResult;
use crate::model::{Model, RecordData, UIData};
use crate::theme::Theme;

pub const HEADER_HEIGHT: usize = 4; // Title, subtitle, toolbar and a separator
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const STATUSLINE_HEIGHT: usize = 1;
pub const COLUMN_SPACING: usize = 1;

const POPUP_WIDTH: u16 = 72;
const POPUP_HEIGHT: u16 = 34;

pub struct TableUI {
    show_column_markers: bool,
}

impl TableUI {
    pub fn new(cfg: &PTVConfig) -> Self {
        Self {
            show_column_markers: cfg.max_column_width > 8,
        }
    }

    pub fn draw(&mut self, model: &Model, frame: &mut Frame) {
        let uidata = model.get_uidata();
        let theme = &uidata.theme;
        frame.render_widget(
            Block::new().style(Style::new().bg(theme.background).fg(theme.text)),
            frame.area(),
        );

        let [header_area, table_area, status_area] = Layout::vertical([
            Constraint::Length(HEADER_HEIGHT as u16),
            Constraint::Min(0),
            Constraint::Length(STATUSLINE_HEIGHT as u16),
        ])
        .areas(frame.area());

        self.draw_header(uidata, frame, header_area);
        match (&uidata.record, uidata.empty_message) {
            (Some(record), _) => self.draw_record(record, theme, frame, table_area),
            (None, Some(message)) => self.draw_empty(message, theme, frame, table_area),
            (None, None) => self.draw_table(uidata, frame, table_area),
        }
        self.draw_statusline(uidata, frame, status_area);

        if uidata.show_popup {
            self.draw_popup(uidata, frame);
        }
    }

    fn draw_header(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let theme = &uidata.theme;
        let view = &uidata.view;
        let block = Block::new()
            .borders(Borders::BOTTOM)
            .border_style(Style::new().fg(theme.border))
            .style(Style::new().bg(theme.header_background));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let [title_area, subtitle_area, toolbar_area] =
            Layout::vertical([Constraint::Length(1); 3]).areas(inner);

        let mode = if view.theme_mode.is_light() {
            " ☀ light "
        } else {
            " ☾ dark "
        };
        frame.render_widget(
            Line::from(vec![
                Span::styled(format!(" {APP_TITLE}"), Style::new().fg(theme.primary).bold()),
            ]),
            title_area,
        );
        frame.render_widget(
            Line::from(Span::styled(mode, Style::new().fg(theme.text_secondary))).right_aligned(),
            title_area,
        );
        frame.render_widget(
            Line::from(Span::styled(
                format!(" {APP_SUBTITLE}"),
                Style::new().fg(theme.text_secondary),
            )),
            subtitle_area,
        );

        let key = |k: &'static str| Span::styled(k, Style::new().fg(theme.primary_light).bold());
        let search_style = if uidata.search_active {
            Style::new().fg(theme.text).underlined()
        } else {
            Style::new().fg(theme.text)
        };
        let search_prefix = " Search: ";
        let toolbar = Line::from(vec![
            Span::styled(search_prefix, Style::new().fg(theme.text_secondary)),
            Span::styled(format!("{:<24}", uidata.search.input), search_style),
            "  ".into(),
            key("[r]"),
            Span::raw(format!(" Rows per page: {}  ", view.page_size)),
            key("[e]"),
            Span::raw(" Export CSV  "),
            Span::styled(
                format!("Selected: {}", view.selected_count),
                Style::new().fg(if view.selected_count > 0 {
                    theme.primary
                } else {
                    theme.text_secondary
                }),
            ),
        ]);
        frame.render_widget(toolbar, toolbar_area);

        if uidata.search_active {
            set_input_cursor(
                frame,
                toolbar_area,
                search_prefix.chars().count(),
                &uidata.search,
            );
        }
    }

    fn draw_table(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let theme = &uidata.theme;
        let header_style = Style::new()
            .fg(theme.text)
            .bg(theme.header_background)
            .add_modifier(Modifier::BOLD);

        let header = Row::new(uidata.columns.iter().map(|c| {
            let mut name = c.name.clone();
            if self.show_column_markers {
                match c.sort {
                    Some(crate::grid::SortDirection::Ascending) => name.push_str(" ▲"),
                    Some(crate::grid::SortDirection::Descending) => name.push_str(" ▼"),
                    None => {}
                }
                if c.filtered {
                    name.push_str(" ⧩");
                }
            }
            // Pinned columns stay put while the rest scroll
            if c.pinned {
                Cell::from(name).style(Style::new().fg(theme.primary_light))
            } else {
                Cell::from(name)
            }
        }))
        .style(header_style)
        .height(TABLE_HEADER_HEIGHT as u16);

        let rows = uidata.rows.iter().map(|row| {
            let cells = row
                .cells
                .iter()
                .zip(uidata.columns.iter())
                .map(|(visual, column)| Cell::from(visual_to_text(visual, column.width, theme)));
            let style = if row.selected {
                Style::new().bg(theme.selected_row)
            } else {
                Style::new()
            };
            Row::new(cells).height(row.height).style(style)
        });

        let widths = uidata
            .columns
            .iter()
            .map(|c| Constraint::Length(c.width as u16));

        let table = Table::new(rows, widths)
            .header(header)
            .column_spacing(COLUMN_SPACING as u16)
            .row_highlight_style(Style::new().bg(theme.row_hover))
            .cell_highlight_style(Style::new().add_modifier(Modifier::REVERSED));

        let mut state = TableState::default()
            .with_selected(Some(uidata.selected_row))
            .with_selected_column(Some(uidata.selected_column));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_empty(&self, message: &str, theme: &Theme, frame: &mut Frame, area: Rect) {
        let [center] = Layout::vertical([Constraint::Length(1)])
            .flex(Flex::Center)
            .areas(area);
        frame.render_widget(
            Paragraph::new(message)
                .centered()
                .style(Style::new().fg(theme.text_secondary).italic()),
            center,
        );
    }

    fn draw_record(&self, record: &RecordData, theme: &Theme, frame: &mut Frame, area: Rect) {
        let block = Block::bordered()
            .title(Line::from(format!(" {} ", record.title)).bold())
            .border_style(Style::new().fg(theme.border));
        let label_width = record
            .fields
            .iter()
            .map(|(k, _)| k.chars().count())
            .max()
            .unwrap_or(0) as u16;

        let rows = record.fields.iter().map(|(k, v)| {
            Row::new(vec![
                Cell::from(Span::styled(k.clone(), Style::new().fg(theme.text_secondary))),
                Cell::from(v.clone()),
            ])
        });
        let table = Table::new(rows, [Constraint::Length(label_width + 1), Constraint::Fill(1)])
            .block(block)
            .row_highlight_style(Style::new().bg(theme.row_hover));

        let mut state = TableState::default()
            .with_offset(record.offset)
            .with_selected(Some(record.selected));
        frame.render_stateful_widget(table, area, &mut state);
    }

    fn draw_statusline(&self, uidata: &UIData, frame: &mut Frame, area: Rect) {
        let theme = &uidata.theme;
        let style = Style::new().fg(theme.text).bg(theme.header_background);

        if let Some((column, input)) = &uidata.filter_prompt {
            let prefix = format!(" Filter {column}: ");
            frame.render_widget(
                Line::from(vec![
                    Span::styled(prefix.clone(), Style::new().fg(theme.primary).bold()),
                    Span::raw(input.input.clone()),
                ])
                .style(style),
                area,
            );
            set_input_cursor(frame, area, prefix.chars().count(), input);
            return;
        }

        let paging = if uidata.page_count == 0 {
            format!("0 of {} rows ", uidata.total_rows)
        } else {
            format!(
                "Page {} of {} · {} of {} rows ",
                uidata.page + 1,
                uidata.page_count,
                uidata.displayed_rows,
                uidata.total_rows
            )
        };
        frame.render_widget(
            Line::from(format!(" {}", uidata.status_message)).style(style),
            area,
        );
        frame.render_widget(
            Line::from(Span::styled(paging, Style::new().fg(theme.text_secondary))).right_aligned(),
            area,
        );
    }

    fn draw_popup(&self, uidata: &UIData, frame: &mut Frame) {
        let theme = &uidata.theme;
        let area = centered(frame.area(), POPUP_WIDTH, POPUP_HEIGHT);
        frame.render_widget(Clear, area);
        frame.render_widget(
            Paragraph::new(uidata.popup_message.as_str())
                .wrap(Wrap { trim: false })
                .style(Style::new().fg(theme.text).bg(theme.background))
                .block(
                    Block::bordered()
                        .title(" Help ".bold())
                        .title_bottom(Line::from(" Esc to close ").right_aligned())
                        .border_style(Style::new().fg(theme.primary)),
                ),
            area,
        );
    }
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [area] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(area);
    let [area] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    area
}

fn set_input_cursor(frame: &mut Frame, area: Rect, prefix: usize, input: &InputResult) {
    let x = area.x as usize + prefix + input.curser_pos;
    if x < (area.x + area.width) as usize {
        frame.set_cursor_position(Position::new(x as u16, area.y));
    }
}

fn contrast(color: Color) -> Color {
    match color {
        Color::Rgb(r, g, b) if (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000 > 150 => {
            Color::Black
        }
        _ => Color::White,
    }
}

/// Lay out chips greedily over as many lines as needed.
fn chip_lines(items: &[String], variant: ChipVariant, color: Color, width: usize) -> Vec<Line<'static>> {
    let style = match variant {
        ChipVariant::Filled => Style::new().bg(color).fg(contrast(color)),
        ChipVariant::Outlined => Style::new().fg(color),
    };
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut used = 0;
    for item in items {
        let chip = match variant {
            ChipVariant::Filled => format!(" {item} "),
            ChipVariant::Outlined => format!("({item})"),
        };
        let chip_width = chip.chars().count() + 1;
        if used > 0 && used + chip_width > width {
            lines.push(Line::from(std::mem::take(&mut spans)));
            used = 0;
        }
        spans.push(Span::styled(chip, style));
        spans.push(Span::raw(" "));
        used += chip_width;
    }
    if !spans.is_empty() {
        lines.push(Line::from(spans));
    }
    lines
}

pub fn visual_to_text(visual: &CellVisual, width: usize, theme: &Theme) -> Text<'static> {
    match visual {
        CellVisual::Text(text) => Text::from(text.clone()),
        CellVisual::Pill {
            label,
            tone,
            color,
            variant,
        } => {
            let icon = match tone {
                Tone::Success => "✔",
                Tone::Error => "✖",
            };
            let style = match variant {
                ChipVariant::Filled => Style::new().bg(*color).fg(contrast(*color)),
                ChipVariant::Outlined => Style::new().fg(*color),
            };
            Text::from(Line::from(Span::styled(format!("{icon} {label}"), style)))
        }
        CellVisual::Bar {
            percent,
            label,
            bar_color,
            label_color,
        } => {
            let bar_width = width.saturating_sub(label.chars().count() + 1);
            let filled = ((percent / 100.0) * bar_width as f64).round() as usize;
            let filled = filled.min(bar_width);
            Text::from(Line::from(vec![
                Span::styled("█".repeat(filled), Style::new().fg(*bar_color)),
                Span::styled(
                    "░".repeat(bar_width - filled),
                    Style::new().fg(theme.border),
                ),
                Span::raw(" "),
                Span::styled(label.clone(), Style::new().fg(*label_color).bold()),
            ]))
        }
        CellVisual::Link { text, color, .. } => Text::from(Line::from(Span::styled(
            text.clone(),
            Style::new().fg(*color).underlined(),
        ))),
        CellVisual::Badge { label, color } => Text::from(Line::from(Span::styled(
            format!(" {label} "),
            Style::new().bg(*color).fg(contrast(*color)).bold(),
        ))),
        CellVisual::Chips {
            items,
            variant,
            color,
        } => Text::from(chip_lines(items, *variant, *color, width)),
        CellVisual::Checkbox { checked, color } => {
            let mark = if *checked { "[x]" } else { "[ ]" };
            Text::from(Line::from(Span::styled(mark, Style::new().fg(*color).bold())))
        }
    }
}
