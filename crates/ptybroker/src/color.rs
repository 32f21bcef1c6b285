//! Terminal colors for CLI output.
//!
//! Respects `NO_COLOR`, `FORCE_COLOR` and TTY detection through
//! `owo-colors`' `if_supports_color()`. `--no-color` sets an in-process flag
//! that skips styling entirely.

use std::sync::atomic::{AtomicBool, Ordering};

use owo_colors::OwoColorize;
use owo_colors::Stream::{Stderr, Stdout};

static NO_COLOR_FLAG: AtomicBool = AtomicBool::new(false);

/// Called from main.rs when `--no-color` is passed.
pub fn set_no_color() {
    NO_COLOR_FLAG.store(true, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy)]
struct Rgb {
    r: u8,
    g: u8,
    b: u8,
}

impl Rgb {
    const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
        }
    }
}

const TEAL: Rgb = Rgb::from_hex(0x5FB3B3); // Session ids
const LEAF: Rgb = Rgb::from_hex(0x7FB069); // Alive
const RUST: Rgb = Rgb::from_hex(0xC8553D); // Dead, errors
const SLATE: Rgb = Rgb::from_hex(0x6C7A89); // Borders, hints

fn no_color() -> bool {
    NO_COLOR_FLAG.load(Ordering::Relaxed)
}

fn paint(text: &str, stream: owo_colors::Stream, rgb: Rgb) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(stream, |t| t.truecolor(rgb.r, rgb.g, rgb.b))
        .to_string()
}

pub fn teal(text: &str) -> String {
    paint(text, Stdout, TEAL)
}

pub fn leaf(text: &str) -> String {
    paint(text, Stdout, LEAF)
}

pub fn rust(text: &str) -> String {
    paint(text, Stdout, RUST)
}

pub fn slate(text: &str) -> String {
    paint(text, Stdout, SLATE)
}

pub fn bold(text: &str) -> String {
    if no_color() {
        return text.to_string();
    }
    text.if_supports_color(Stdout, |t| t.bold()).to_string()
}

/// Color-code a session state (alive/dead).
pub fn state(state_str: &str) -> String {
    match state_str.trim_end() {
        "alive" => leaf(state_str),
        "dead" => rust(state_str),
        _ => state_str.to_string(),
    }
}

/// Error styling for stderr messages.
pub fn error(text: &str) -> String {
    paint(text, Stderr, RUST)
}

/// Secondary info on stderr.
pub fn hint(text: &str) -> String {
    paint(text, Stderr, SLATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_from_hex() {
        let c = Rgb::from_hex(0x5FB3B3);
        assert_eq!((c.r, c.g, c.b), (95, 179, 179));
    }

    #[test]
    fn test_no_color_returns_plain_text() {
        set_no_color();
        assert_eq!(teal("s1"), "s1");
        assert_eq!(state("dead"), "dead");
        assert_eq!(error("boom"), "boom");
    }

    #[test]
    fn test_unknown_state_is_unstyled() {
        assert_eq!(state("zombie"), "zombie");
    }
}
