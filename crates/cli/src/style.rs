//! Terminal styling for gate output.
//!
//! `console` disables colors on its own when stdout is not a terminal, so
//! CI logs get the plain markers.

use console::Style;
use rulegate_core::models::{format_ids, RuleId};

/// How a report line should read at a glance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Pass,
    Fail,
    Notice,
}

impl Tone {
    pub fn of(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    fn marker(self) -> (&'static str, Style) {
        match self {
            Self::Pass => ("✓", Style::new().green()),
            Self::Fail => ("✗", Style::new().red()),
            Self::Notice => ("⚠", Style::new().yellow()),
        }
    }
}

/// `msg` prefixed with the tone's colored marker.
pub fn line(tone: Tone, msg: &str) -> String {
    let (mark, style) = tone.marker();
    format!("{} {}", style.apply_to(mark), msg)
}

pub fn heading(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Secondary detail such as per-file check lines.
pub fn muted(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// Sorted bracketed id list, red and bold so offending ids stand out.
pub fn id_list(ids: &[RuleId]) -> String {
    Style::new().red().bold().apply_to(format_ids(ids)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_markers() {
        console::set_colors_enabled(false);
        assert_eq!(line(Tone::of(true), "ok"), "✓ ok");
        assert_eq!(line(Tone::of(false), "bad"), "✗ bad");
        assert_eq!(line(Tone::Notice, "hm"), "⚠ hm");
        assert_eq!(id_list(&[RuleId(7), RuleId(3)]), "[3, 7]");
    }
}
