//! Light/dark preference.
//!
//! Precedence: the stored choice, then `ui.dark_mode` from config, then the
//! terminal's ambient signal (`COLORFGBG`), then light.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark(dark: bool) -> Self {
        if dark {
            Theme::Dark
        } else {
            Theme::Light
        }
    }

    pub fn is_dark(self) -> bool {
        self == Theme::Dark
    }

    pub fn toggled(self) -> Self {
        Self::from_dark(!self.is_dark())
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(format!("unknown theme '{}', expected dark or light", other)),
        }
    }
}

/// Interpret a `COLORFGBG` value (`fg;bg` or `fg;default;bg`).
///
/// Background colors 0-6 and 8 are dark.
pub fn parse_colorfgbg(value: &str) -> Option<bool> {
    let bg: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    Some(matches!(bg, 0..=6 | 8))
}

/// Ambient preference from the environment, if the terminal reports one.
pub fn ambient_dark() -> Option<bool> {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|v| parse_colorfgbg(&v))
}

pub fn resolve_dark_mode(
    stored: Option<bool>,
    configured: Option<bool>,
    ambient: Option<bool>,
) -> Theme {
    Theme::from_dark(stored.or(configured).or(ambient).unwrap_or(false))
}
