use ratatui::style::Color;

/// Build a terminal color from a `0xRRGGBB` literal.
pub const fn rgb(hex: u32) -> Color {
    Color::Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemeMode {
    Light,
    #[default]
    Dark,
}

impl ThemeMode {
    /// Anything but an exact `"light"` marker (including no marker) is dark.
    pub fn from_preference(value: Option<&str>) -> Self {
        match value {
            Some("light") => ThemeMode::Light,
            _ => ThemeMode::Dark,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThemeMode::Light => "light",
            ThemeMode::Dark => "dark",
        }
    }

    pub fn is_light(self) -> bool {
        self == ThemeMode::Light
    }
}

/// Palette derived from a `ThemeMode`. Every themed cell renderer and the
/// grid chrome read their colors from here.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub mode: ThemeMode,
    pub primary: Color,
    pub primary_light: Color,
    pub primary_dark: Color,
    pub background: Color,
    pub header_background: Color,
    pub text: Color,
    pub text_secondary: Color,
    pub border: Color,
    pub row_hover: Color,
    pub selected_row: Color,
    pub success: Color,
    pub error: Color,
    pub chip_default: Color,
    pub rating_label: Color,
}

const PRIMARY: Color = rgb(0x0078d4);
const PRIMARY_LIGHT: Color = rgb(0x3393dd);
const PRIMARY_DARK: Color = rgb(0x0060aa);

impl Theme {
    pub fn new(mode: ThemeMode) -> Self {
        match mode {
            ThemeMode::Light => Theme {
                mode,
                primary: PRIMARY,
                primary_light: PRIMARY_LIGHT,
                primary_dark: PRIMARY_DARK,
                background: rgb(0xffffff),
                header_background: rgb(0xffffff),
                text: rgb(0x212121),
                text_secondary: rgb(0x666666),
                border: rgb(0xe5e7eb),
                row_hover: rgb(0xeef3ff),
                selected_row: rgb(0xe6f2ff),
                success: rgb(0x2e7d32),
                error: rgb(0xd32f2f),
                chip_default: rgb(0xe0e0e0),
                rating_label: rgb(0x212121),
            },
            ThemeMode::Dark => Theme {
                mode,
                primary: PRIMARY,
                primary_light: PRIMARY_LIGHT,
                primary_dark: PRIMARY_DARK,
                background: rgb(0x0b1220),
                header_background: rgb(0x0f172a),
                text: rgb(0xffffff),
                text_secondary: rgb(0xb3b3b3),
                border: rgb(0x1f2937),
                row_hover: rgb(0x111d34),
                selected_row: rgb(0x0e2448),
                success: rgb(0x66bb6a),
                error: rgb(0xf44336),
                chip_default: rgb(0x616161),
                rating_label: rgb(0xcfe8ff),
            },
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Theme::new(ThemeMode::default())
    }
}
