use ratatui::style::Color;

use common::CallStatus;
use realtime::ConnectionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThemeKind {
    Dark,
    Light,
}

impl ThemeKind {
    pub fn toggled(self) -> Self {
        match self {
            ThemeKind::Dark => ThemeKind::Light,
            ThemeKind::Light => ThemeKind::Dark,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ThemeColors {
    pub primary: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub muted: Color,
    pub accent: Color,
    pub surface: Color,
    pub text: Color,
}

impl ThemeColors {
    pub fn status(&self, status: CallStatus) -> Color {
        match status {
            CallStatus::Screening => self.warning,
            CallStatus::Blocked => self.error,
            CallStatus::Passed => self.success,
            CallStatus::Completed => self.muted,
        }
    }

    pub fn connection(&self, state: &ConnectionState) -> Color {
        match state {
            ConnectionState::Connected => self.success,
            ConnectionState::Connecting { .. } | ConnectionState::Backoff { .. } => self.warning,
            ConnectionState::Failed { .. } => self.error,
            ConnectionState::Disconnected => self.muted,
        }
    }

    /// Green below 30%, amber below 60%, red above.
    pub fn score(&self, score: f64) -> Color {
        if score >= 0.6 {
            self.error
        } else if score >= 0.3 {
            self.warning
        } else {
            self.success
        }
    }
}

pub fn get_theme(kind: ThemeKind) -> ThemeColors {
    match kind {
        ThemeKind::Dark => ThemeColors {
            primary: Color::Rgb(79, 172, 254),
            success: Color::Rgb(34, 197, 94),
            warning: Color::Rgb(251, 191, 36),
            error: Color::Rgb(239, 68, 68),
            muted: Color::Rgb(156, 163, 175),
            accent: Color::Rgb(168, 85, 247),
            surface: Color::Rgb(31, 41, 55),  // slate-800
            text: Color::Rgb(243, 244, 246),  // slate-100
        },
        ThemeKind::Light => ThemeColors {
            primary: Color::Rgb(37, 99, 235),   // blue-600
            success: Color::Rgb(22, 163, 74),   // green-600
            warning: Color::Rgb(245, 158, 11),  // amber-500
            error: Color::Rgb(220, 38, 38),     // red-600
            muted: Color::Rgb(100, 116, 139),   // slate-500
            accent: Color::Rgb(124, 58, 237),   // violet-600
            surface: Color::Rgb(255, 255, 255), // white
            text: Color::Rgb(15, 23, 42),       // slate-900
        },
    }
}
