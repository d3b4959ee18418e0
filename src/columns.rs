use std::cmp::Ordering;

use derive_setters::Setters;
use ratatui::style::Color;

use crate::dataset::{EmployeeRecord, Skills};
use crate::grid::RowNode;
use crate::theme::{Theme, rgb};

pub const DEFAULT_ROW_HEIGHT: u16 = 1;
pub const TALL_ROW_HEIGHT: u16 = 3;
const DEFAULT_MIN_WIDTH: u16 = 12;
const DEFAULT_DEPARTMENT_COLOR: Color = rgb(0x616161);

/// A value read from a record by a column.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Number(f64),
    Text(String),
    Bool(bool),
    List(Vec<String>),
}

impl CellValue {
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::List(items) => items.join(", "),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Null | CellValue::List(_) => None,
        }
    }

    /// JS-style truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Null => false,
            CellValue::Bool(b) => *b,
            CellValue::Int(i) => *i != 0,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
            CellValue::List(_) => true,
        }
    }

    /// Ordering used by the grid sort. Nulls sort before everything else.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            (CellValue::Null, _) => Ordering::Less,
            (_, CellValue::Null) => Ordering::Greater,
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::List(a), CellValue::List(b)) => a.cmp(b),
            (a, b) => match (a.numeric_value(), b.numeric_value()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.as_text().cmp(&b.as_text()),
            },
        }
    }

    fn numeric_value(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Id,
    Email,
    Department,
    Position,
    Salary,
    HireDate,
    Age,
    Location,
    PerformanceRating,
    ProjectsCompleted,
    IsActive,
    Skills,
    Manager,
}

fn text_value(value: &Option<String>) -> CellValue {
    value.clone().map_or(CellValue::Null, CellValue::Text)
}

fn number_value(value: Option<f64>) -> CellValue {
    value.map_or(CellValue::Null, CellValue::Number)
}

impl Field {
    pub fn value(self, record: &EmployeeRecord) -> CellValue {
        match self {
            Field::Id => record.id.map_or(CellValue::Null, CellValue::Int),
            Field::Email => text_value(&record.email),
            Field::Department => text_value(&record.department),
            Field::Position => text_value(&record.position),
            Field::Salary => number_value(record.salary),
            Field::HireDate => text_value(&record.hire_date),
            Field::Age => number_value(record.age),
            Field::Location => text_value(&record.location),
            Field::PerformanceRating => number_value(record.performance_rating),
            Field::ProjectsCompleted => record
                .projects_completed
                .map_or(CellValue::Null, CellValue::Int),
            Field::IsActive => record.is_active.map_or(CellValue::Null, CellValue::Bool),
            Field::Skills => match &record.skills {
                None => CellValue::Null,
                Some(Skills::List(items)) => CellValue::List(items.clone()),
                Some(Skills::Text(text)) => CellValue::Text(text.clone()),
            },
            Field::Manager => text_value(&record.manager),
        }
    }
}

/// Where a column gets its value from.
#[derive(Debug, Clone, Copy)]
pub enum ValueSource {
    Field(Field),
    Derived(fn(&EmployeeRecord) -> CellValue),
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnWidth {
    Fixed(u16),
    Min(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Text,
    Number,
    Date,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVariant {
    Filled,
    Outlined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Error,
}

/// What a cell should look like, independent of the terminal backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CellVisual {
    Text(String),
    Pill {
        label: &'static str,
        tone: Tone,
        color: Color,
        variant: ChipVariant,
    },
    Bar {
        percent: f64,
        label: String,
        bar_color: Color,
        label_color: Color,
    },
    Link {
        text: String,
        target: String,
        color: Color,
    },
    Badge {
        label: String,
        color: Color,
    },
    Chips {
        items: Vec<String>,
        variant: ChipVariant,
        color: Color,
    },
    Checkbox {
        checked: bool,
        color: Color,
    },
}

impl CellVisual {
    pub fn plain_text(&self) -> String {
        match self {
            CellVisual::Text(text) => text.clone(),
            CellVisual::Pill { label, .. } => label.to_string(),
            CellVisual::Bar { label, .. } => label.clone(),
            CellVisual::Link { text, .. } => text.clone(),
            CellVisual::Badge { label, .. } => label.clone(),
            CellVisual::Chips { items, .. } => items.join(", "),
            CellVisual::Checkbox { checked, .. } => {
                let mark = if *checked { "[x]" } else { "[ ]" };
                mark.to_string()
            }
        }
    }
}

/// Per-cell inputs besides the value itself.
pub struct RenderContext<'a> {
    pub theme: &'a Theme,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellRenderer {
    Selection,
    Status,
    Rating,
    Mail,
    Department,
    Skills,
}

impl CellRenderer {
    pub fn render(&self, value: &CellValue, cx: &RenderContext) -> CellVisual {
        match self {
            CellRenderer::Selection => selection_checkbox(cx),
            CellRenderer::Status => status_pill(value, cx.theme),
            CellRenderer::Rating => rating_bar(value, cx.theme),
            CellRenderer::Mail => mail_link(value, cx.theme),
            CellRenderer::Department => department_badge(value),
            CellRenderer::Skills => skills_chips(value, cx.theme),
        }
    }
}

fn chip_variant(theme: &Theme) -> ChipVariant {
    if theme.mode.is_light() {
        ChipVariant::Filled
    } else {
        ChipVariant::Outlined
    }
}

pub fn status_pill(value: &CellValue, theme: &Theme) -> CellVisual {
    let active = value.is_truthy();
    CellVisual::Pill {
        label: if active { "Active" } else { "Inactive" },
        tone: if active { Tone::Success } else { Tone::Error },
        color: if active { theme.success } else { theme.error },
        variant: chip_variant(theme),
    }
}

/// Non-numeric ratings count as 0.
pub fn coerce_rating(value: &CellValue) -> f64 {
    value.as_number().filter(|v| !v.is_nan()).unwrap_or(0.0)
}

pub fn rating_percent(rating: f64) -> f64 {
    rating.clamp(0.0, 5.0) / 5.0 * 100.0
}

/// One decimal of the exact binary value. Only x.25 and x.75 are exact
/// ties, and those round away from zero.
pub fn format_rating(rating: f64) -> String {
    let quarters = rating * 4.0;
    if quarters.fract() == 0.0 && (quarters as i64) % 2 != 0 {
        return format!("{:.1}", rating + rating.signum() * 0.05);
    }
    format!("{:.1}", rating)
}

pub fn rating_bar(value: &CellValue, theme: &Theme) -> CellVisual {
    let rating = coerce_rating(value);
    CellVisual::Bar {
        percent: rating_percent(rating),
        label: format_rating(rating),
        bar_color: theme.primary,
        label_color: theme.rating_label,
    }
}

pub fn mail_link(value: &CellValue, theme: &Theme) -> CellVisual {
    let text = value.as_text();
    CellVisual::Link {
        target: format!("mailto:{text}"),
        text,
        color: if theme.mode.is_light() {
            theme.primary_dark
        } else {
            theme.primary_light
        },
    }
}

pub fn department_color(department: &str) -> Color {
    match department.to_lowercase().as_str() {
        "engineering" => rgb(0x0078d4),
        "marketing" => rgb(0x9c27b0),
        "sales" => rgb(0xff6f00),
        "hr" => rgb(0x2e7d32),
        "finance" => rgb(0x455a64),
        _ => DEFAULT_DEPARTMENT_COLOR,
    }
}

pub fn department_badge(value: &CellValue) -> CellVisual {
    let label = value.as_text();
    CellVisual::Badge {
        color: department_color(&label),
        label,
    }
}

pub fn skill_items(value: &CellValue) -> Vec<String> {
    match value {
        CellValue::List(items) => items.clone(),
        CellValue::Null => Vec::new(),
        other => other
            .as_text()
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

pub fn skills_chips(value: &CellValue, theme: &Theme) -> CellVisual {
    CellVisual::Chips {
        items: skill_items(value),
        variant: chip_variant(theme),
        color: if theme.mode.is_light() {
            theme.chip_default
        } else {
            theme.primary
        },
    }
}

/// The checkbox shows whatever the grid's selection model says right now.
pub fn selection_checkbox(cx: &RenderContext) -> CellVisual {
    CellVisual::Checkbox {
        checked: cx.selected,
        color: cx.theme.primary,
    }
}

/// Flip the checkbox of a row and push the new state into the grid.
pub fn toggle_row_selection(node: &mut RowNode<'_>) -> bool {
    let checked = !node.is_selected();
    node.set_selected(checked);
    checked
}

pub fn full_name(record: &EmployeeRecord) -> CellValue {
    CellValue::Text(format!(
        "{} {}",
        record.first_name.as_deref().unwrap_or_default(),
        record.last_name.as_deref().unwrap_or_default()
    ))
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, c) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

pub fn format_salary(value: &CellValue) -> String {
    match value.as_number().filter(|v| v.is_finite()) {
        None => String::new(),
        Some(amount) => {
            let rounded = amount.abs().round() as u64;
            let sign = if amount < 0.0 && rounded > 0 { "-" } else { "" };
            format!("{sign}${}", group_thousands(rounded))
        }
    }
}

pub fn row_height(record: &EmployeeRecord) -> u16 {
    match &record.skills {
        Some(Skills::List(items)) if !items.is_empty() => TALL_ROW_HEIGHT,
        _ => DEFAULT_ROW_HEIGHT,
    }
}

#[derive(Debug, Clone, Setters)]
#[setters(prefix = "with_", strip_option)]
pub struct ColumnDef {
    pub header: &'static str,
    pub source: ValueSource,
    pub width: ColumnWidth,
    pub pinned: bool,
    pub sortable: bool,
    pub filter: FilterKind,
    pub renderer: Option<CellRenderer>,
    pub formatter: Option<fn(&CellValue) -> String>,
}

impl ColumnDef {
    pub fn new(header: &'static str, source: ValueSource) -> Self {
        Self {
            header,
            source,
            width: ColumnWidth::Min(DEFAULT_MIN_WIDTH),
            pinned: false,
            sortable: true,
            filter: FilterKind::Text,
            renderer: None,
            formatter: None,
        }
    }

    pub fn field(header: &'static str, field: Field) -> Self {
        Self::new(header, ValueSource::Field(field))
    }

    pub fn value(&self, record: &EmployeeRecord) -> CellValue {
        match self.source {
            ValueSource::Field(field) => field.value(record),
            ValueSource::Derived(getter) => getter(record),
            ValueSource::Nothing => CellValue::Null,
        }
    }

    /// Text used for filtering, export and copying.
    pub fn display_text(&self, record: &EmployeeRecord) -> String {
        let value = self.value(record);
        match self.formatter {
            Some(format) => format(&value),
            None => value.as_text(),
        }
    }

    pub fn render(&self, record: &EmployeeRecord, cx: &RenderContext) -> CellVisual {
        match self.renderer {
            Some(renderer) => renderer.render(&self.value(record), cx),
            None => CellVisual::Text(self.display_text(record)),
        }
    }

    pub fn is_exported(&self) -> bool {
        !self.header.is_empty()
    }
}

/// The grid's column layout, in display order.
pub fn column_defs() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("", ValueSource::Nothing)
            .with_width(ColumnWidth::Fixed(3))
            .with_pinned(true)
            .with_sortable(false)
            .with_filter(FilterKind::None)
            .with_renderer(CellRenderer::Selection),
        ColumnDef::field("#", Field::Id)
            .with_width(ColumnWidth::Fixed(4))
            .with_pinned(true),
        ColumnDef::new("Name", ValueSource::Derived(full_name)).with_width(ColumnWidth::Min(17)),
        ColumnDef::field("Email", Field::Email)
            .with_renderer(CellRenderer::Mail)
            .with_width(ColumnWidth::Min(22)),
        ColumnDef::field("Department", Field::Department)
            .with_renderer(CellRenderer::Department)
            .with_width(ColumnWidth::Min(13)),
        ColumnDef::field("Position", Field::Position).with_width(ColumnWidth::Min(18)),
        ColumnDef::field("Salary", Field::Salary)
            .with_filter(FilterKind::Number)
            .with_formatter(format_salary)
            .with_width(ColumnWidth::Min(10)),
        ColumnDef::field("Hire Date", Field::HireDate)
            .with_filter(FilterKind::Date)
            .with_width(ColumnWidth::Min(10)),
        ColumnDef::field("Age", Field::Age)
            .with_filter(FilterKind::Number)
            .with_width(ColumnWidth::Fixed(5)),
        ColumnDef::field("Location", Field::Location),
        ColumnDef::field("Rating", Field::PerformanceRating)
            .with_renderer(CellRenderer::Rating)
            .with_filter(FilterKind::Number)
            .with_width(ColumnWidth::Min(16)),
        ColumnDef::field("Projects", Field::ProjectsCompleted)
            .with_filter(FilterKind::Number)
            .with_width(ColumnWidth::Min(8)),
        ColumnDef::field("Status", Field::IsActive)
            .with_renderer(CellRenderer::Status)
            .with_width(ColumnWidth::Min(10)),
        ColumnDef::field("Skills", Field::Skills)
            .with_renderer(CellRenderer::Skills)
            .with_width(ColumnWidth::Min(22)),
        ColumnDef::field("Manager", Field::Manager).with_width(ColumnWidth::Min(16)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::ThemeMode;

    fn light() -> Theme {
        Theme::new(ThemeMode::Light)
    }

    fn dark() -> Theme {
        Theme::new(ThemeMode::Dark)
    }

    #[test]
    fn rating_bar_clamps_percent_and_keeps_label_unclamped() {
        let theme = dark();
        let check = |value: CellValue, percent: f64, label: &str| match rating_bar(&value, &theme)
        {
            CellVisual::Bar {
                percent: p,
                label: l,
                ..
            } => {
                assert!((p - percent).abs() < 1e-9, "{value:?}: {p} != {percent}");
                assert_eq!(l, label);
            }
            other => panic!("unexpected visual {other:?}"),
        };
        check(CellValue::Number(7.0), 100.0, "7.0");
        check(CellValue::Number(-3.0), 0.0, "-3.0");
        check(CellValue::Number(2.5), 50.0, "2.5");
        check(CellValue::Number(4.25), 85.0, "4.3");
        check(CellValue::Number(4.75), 95.0, "4.8");
        check(CellValue::Number(3.14159), 62.8318, "3.1");
        check(CellValue::Text("4".into()), 80.0, "4.0");
        check(CellValue::Null, 0.0, "0.0");
        check(CellValue::Number(f64::NAN), 0.0, "0.0");
    }

    #[test]
    fn rating_label_rounds_the_stored_binary_value() {
        // 0.15 and 4.35 are stored slightly below the midpoint
        assert_eq!(format_rating(0.15), "0.1");
        assert_eq!(format_rating(4.35), "4.3");
        assert_eq!(format_rating(1.05), "1.1");
        assert_eq!(format_rating(2.5), "2.5");
        assert_eq!(format_rating(0.25), "0.3");
        assert_eq!(format_rating(-4.25), "-4.3");
        assert_eq!(format_rating(3.96), "4.0");
    }

    #[test]
    fn rating_colors_depend_on_theme() {
        let CellVisual::Bar { label_color, .. } = rating_bar(&CellValue::Number(3.0), &dark())
        else {
            panic!("expected bar");
        };
        assert_eq!(label_color, rgb(0xcfe8ff));
        let CellVisual::Bar { label_color, .. } = rating_bar(&CellValue::Number(3.0), &light())
        else {
            panic!("expected bar");
        };
        assert_eq!(label_color, light().text);
    }

    #[test]
    fn department_color_is_case_insensitive_with_grey_default() {
        assert_eq!(department_color("Engineering"), department_color("engineering"));
        assert_eq!(department_color("ENGINEERING"), rgb(0x0078d4));
        assert_eq!(department_color("HR"), rgb(0x2e7d32));
        assert_eq!(department_color("Legal"), DEFAULT_DEPARTMENT_COLOR);
        assert_eq!(department_color(""), DEFAULT_DEPARTMENT_COLOR);
        assert_eq!(
            department_badge(&CellValue::Null),
            CellVisual::Badge {
                label: String::new(),
                color: DEFAULT_DEPARTMENT_COLOR
            }
        );
    }

    #[test]
    fn skills_text_is_split_and_empty_fragments_dropped() {
        let value = CellValue::Text("Go, Rust  Python".into());
        assert_eq!(skill_items(&value), vec!["Go", "Rust", "Python"]);
        assert_eq!(skill_items(&CellValue::Text(" , ,".into())), Vec::<String>::new());
        assert_eq!(skill_items(&CellValue::Null), Vec::<String>::new());

        let list = CellValue::List(vec!["Rust".into(), "Go".into()]);
        assert_eq!(skill_items(&list), vec!["Rust", "Go"]);
    }

    #[test]
    fn skills_chip_style_depends_on_theme() {
        let value = CellValue::Text("Go".into());
        assert_eq!(
            skills_chips(&value, &light()),
            CellVisual::Chips {
                items: vec!["Go".into()],
                variant: ChipVariant::Filled,
                color: light().chip_default
            }
        );
        assert_eq!(
            skills_chips(&value, &dark()),
            CellVisual::Chips {
                items: vec!["Go".into()],
                variant: ChipVariant::Outlined,
                color: dark().primary
            }
        );
    }

    #[test]
    fn status_pill_labels_and_variants() {
        let active = status_pill(&CellValue::Bool(true), &light());
        assert_eq!(
            active,
            CellVisual::Pill {
                label: "Active",
                tone: Tone::Success,
                color: light().success,
                variant: ChipVariant::Filled
            }
        );
        let CellVisual::Pill {
            label,
            tone,
            variant,
            ..
        } = status_pill(&CellValue::Null, &dark())
        else {
            panic!("expected pill");
        };
        assert_eq!((label, tone, variant), ("Inactive", Tone::Error, ChipVariant::Outlined));
    }

    #[test]
    fn mail_link_targets_mailto() {
        let value = CellValue::Text("ada@example.com".into());
        assert_eq!(
            mail_link(&value, &dark()),
            CellVisual::Link {
                text: "ada@example.com".into(),
                target: "mailto:ada@example.com".into(),
                color: dark().primary_light
            }
        );
        let CellVisual::Link { color, .. } = mail_link(&value, &light()) else {
            panic!("expected link");
        };
        assert_eq!(color, light().primary_dark);
    }

    #[test]
    fn salary_is_formatted_as_whole_dollars() {
        assert_eq!(format_salary(&CellValue::Number(85000.0)), "$85,000");
        assert_eq!(format_salary(&CellValue::Number(1234567.6)), "$1,234,568");
        assert_eq!(format_salary(&CellValue::Number(999.0)), "$999");
        assert_eq!(format_salary(&CellValue::Number(-1200.0)), "-$1,200");
        assert_eq!(format_salary(&CellValue::Number(0.0)), "$0");
        assert_eq!(format_salary(&CellValue::Null), "");
    }

    #[test]
    fn name_is_derived_from_first_and_last() {
        let record = EmployeeRecord {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        };
        assert_eq!(full_name(&record), CellValue::Text("Ada Lovelace".into()));
        let name = column_defs()
            .into_iter()
            .find(|c| c.header == "Name")
            .unwrap();
        assert_eq!(name.display_text(&record), "Ada Lovelace");
    }

    #[test]
    fn only_non_empty_skill_lists_get_tall_rows() {
        let mut record = EmployeeRecord::default();
        assert_eq!(row_height(&record), DEFAULT_ROW_HEIGHT);
        record.skills = Some(Skills::Text("Go, Rust".into()));
        assert_eq!(row_height(&record), DEFAULT_ROW_HEIGHT);
        record.skills = Some(Skills::List(Vec::new()));
        assert_eq!(row_height(&record), DEFAULT_ROW_HEIGHT);
        record.skills = Some(Skills::List(vec!["Go".into()]));
        assert_eq!(row_height(&record), TALL_ROW_HEIGHT);
    }

    #[test]
    fn column_layout_matches_dashboard() {
        let columns = column_defs();
        let headers: Vec<&str> = columns.iter().map(|c| c.header).collect();
        assert_eq!(
            headers,
            vec![
                "", "#", "Name", "Email", "Department", "Position", "Salary", "Hire Date", "Age",
                "Location", "Rating", "Projects", "Status", "Skills", "Manager"
            ]
        );
        assert!(columns[0].pinned && columns[1].pinned);
        assert!(!columns[0].sortable);
        assert_eq!(columns[0].filter, FilterKind::None);
        assert!(columns[2..].iter().all(|c| !c.pinned));
    }

    #[test]
    fn null_sorts_before_values() {
        assert_eq!(CellValue::Null.compare(&CellValue::Int(1)), Ordering::Less);
        assert_eq!(
            CellValue::Int(2).compare(&CellValue::Number(10.5)),
            Ordering::Less
        );
        assert_eq!(
            CellValue::Text("b".into()).compare(&CellValue::Text("a".into())),
            Ordering::Greater
        );
    }
}
