use std::{env, sync::OnceLock, time::Duration};

use ratatui::style::Color;

pub const THEME_ENV: &str = "ROLODEX_THEME";

const LUMA_THRESHOLD: f32 = 0.6;
// Terminals can answer the luma query with noise right after startup, so the
// palette is chosen from the median of a few samples.
const LUMA_SAMPLES: usize = 5;
const LUMA_SAMPLE_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dark,
    Light,
}

impl Mode {
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("light") {
            Some(Mode::Light)
        } else if value.eq_ignore_ascii_case("dark") {
            Some(Mode::Dark)
        } else {
            None
        }
    }
}

#[derive(Clone, Copy)]
pub struct Theme {
    bg: Color,
    panel_bg: Color,
    panel_bg_alt: Color,
    text: Color,
    text_muted: Color,
    accent: Color,
    accent_alt: Color,
    border: Color,
    selection_bg: Color,
    selection_fg: Color,
    success: Color,
    warning: Color,
    error: Color,
}

impl Theme {
    /// The process-wide palette: `ROLODEX_THEME` wins, otherwise the
    /// terminal background decides.
    pub fn current() -> Self {
        static THEME: OnceLock<Theme> = OnceLock::new();
        *THEME.get_or_init(|| {
            let forced = env::var(THEME_ENV).ok().and_then(|value| Mode::parse(&value));
            let mode = forced.unwrap_or_else(|| match detect_terminal_luma() {
                Some(luma) if luma > LUMA_THRESHOLD => Mode::Light,
                _ => Mode::Dark,
            });
            tracing::debug!(?mode, forced = forced.is_some(), "theme");
            Self::for_mode(mode)
        })
    }

    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Dark => Self::dark(),
            Mode::Light => Self::light(),
        }
    }

    fn dark() -> Self {
        Self {
            bg: Color::Rgb(14, 16, 22),
            panel_bg: Color::Rgb(19, 23, 31),
            panel_bg_alt: Color::Rgb(24, 29, 38),
            text: Color::Rgb(226, 232, 240),
            text_muted: Color::Rgb(148, 160, 176),
            accent: Color::Rgb(125, 196, 228),
            accent_alt: Color::Rgb(236, 183, 118),
            border: Color::Rgb(66, 78, 96),
            selection_bg: Color::Rgb(40, 54, 80),
            selection_fg: Color::Rgb(236, 240, 246),
            success: Color::Rgb(152, 200, 110),
            warning: Color::Rgb(230, 180, 100),
            error: Color::Rgb(240, 113, 120),
        }
    }

    fn light() -> Self {
        Self {
            bg: Color::Rgb(248, 248, 246),
            panel_bg: Color::Rgb(255, 255, 255),
            panel_bg_alt: Color::Rgb(241, 242, 245),
            text: Color::Rgb(30, 34, 42),
            text_muted: Color::Rgb(96, 102, 114),
            accent: Color::Rgb(28, 110, 170),
            accent_alt: Color::Rgb(176, 88, 12),
            border: Color::Rgb(160, 166, 178),
            selection_bg: Color::Rgb(214, 230, 252),
            selection_fg: Color::Rgb(16, 24, 40),
            success: Color::Rgb(44, 150, 70),
            warning: Color::Rgb(176, 88, 12),
            error: Color::Rgb(208, 62, 40),
        }
    }

    pub fn bg(&self) -> Color {
        self.bg
    }

    pub fn panel_bg(&self) -> Color {
        self.panel_bg
    }

    pub fn panel_bg_alt(&self) -> Color {
        self.panel_bg_alt
    }

    pub fn text(&self) -> Color {
        self.text
    }

    pub fn text_muted(&self) -> Color {
        self.text_muted
    }

    pub fn accent(&self) -> Color {
        self.accent
    }

    pub fn accent_alt(&self) -> Color {
        self.accent_alt
    }

    pub fn border(&self) -> Color {
        self.border
    }

    pub fn selection_bg(&self) -> Color {
        self.selection_bg
    }

    pub fn selection_fg(&self) -> Color {
        self.selection_fg
    }

    pub fn success(&self) -> Color {
        self.success
    }

    pub fn warning(&self) -> Color {
        self.warning
    }

    pub fn error(&self) -> Color {
        self.error
    }
}

fn detect_terminal_luma() -> Option<f32> {
    let mut samples: Vec<f32> = (0..LUMA_SAMPLES)
        .filter_map(|attempt| {
            if attempt > 0 {
                std::thread::sleep(LUMA_SAMPLE_DELAY);
            }
            terminal_light::luma().ok().filter(|luma| luma.is_finite())
        })
        .collect();
    if samples.is_empty() {
        None
    } else {
        Some(median(&mut samples))
    }
}

fn median(samples: &mut [f32]) -> f32 {
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len().is_multiple_of(2) {
        (samples[mid - 1] + samples[mid]) / 2.0
    } else {
        samples[mid]
    }
}
