//! Color classification for ping and throughput values

use colored::{Color, Colorize};

/// Color used for phase labels such as "Download:"
pub const LABEL_COLOR: Color = Color::Blue;

/// Latency classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingLevel {
    Fast,     // < 50 ms
    Moderate, // < 150 ms
    Slow,
}

impl PingLevel {
    pub fn from_ms(ms: f64) -> Self {
        if ms < 50.0 {
            Self::Fast
        } else if ms < 150.0 {
            Self::Moderate
        } else {
            Self::Slow
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Fast => Color::Green,
            Self::Moderate => Color::Yellow,
            Self::Slow => Color::Red,
        }
    }
}

/// Throughput classification, in megabits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedLevel {
    Fast,     // >= 100 Mbps
    Moderate, // >= 20 Mbps
    Slow,
}

impl SpeedLevel {
    pub fn from_mbps(mbps: f64) -> Self {
        if mbps >= 100.0 {
            Self::Fast
        } else if mbps >= 20.0 {
            Self::Moderate
        } else {
            Self::Slow
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Fast => Color::Green,
            Self::Moderate => Color::Yellow,
            Self::Slow => Color::Red,
        }
    }
}

pub fn ping_color(ms: f64) -> Color {
    PingLevel::from_ms(ms).color()
}

/// Color for a rate; always classified on Mbps, whatever the display unit
pub fn speed_color(mbps: f64) -> Color {
    SpeedLevel::from_mbps(mbps).color()
}

/// Apply a color when enabled
pub fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}
