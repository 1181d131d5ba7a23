//! Terminal string styling
//!
//! Styling is applied whether or not stdout is a terminal. Set
//! `UTILKIT_NO_STYLE` to any value to get plain text back.

use console::Style;

pub use console::Color;

/// Disables styling when set
pub const NO_STYLE_ENV: &str = "UTILKIT_NO_STYLE";

fn styling_disabled() -> bool {
    std::env::var_os(NO_STYLE_ENV).is_some()
}

/// Style `text` with an optional foreground color and attributes
pub fn style(text: &str, color: Option<Color>, bold: bool, underline: bool) -> String {
    if styling_disabled() {
        return text.to_string();
    }

    let mut style = Style::new().force_styling(true);
    if let Some(color) = color {
        style = style.fg(color);
    }
    if bold {
        style = style.bold();
    }
    if underline {
        style = style.underlined();
    }
    style.apply_to(text).to_string()
}

pub fn green(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Green), bold, underline)
}

pub fn red(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Red), bold, underline)
}

pub fn yellow(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Yellow), bold, underline)
}

pub fn blue(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Blue), bold, underline)
}

pub fn cyan(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Cyan), bold, underline)
}

pub fn magenta(text: &str, bold: bool, underline: bool) -> String {
    style(text, Some(Color::Magenta), bold, underline)
}

pub fn bold(text: &str) -> String {
    style(text, None, true, false)
}

pub fn underline(text: &str) -> String {
    style(text, None, false, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_styled_output() {
        std::env::remove_var(NO_STYLE_ENV);
        let text = green("ok", true, false);
        assert!(text.starts_with("\u{1b}["));
        assert!(text.contains("ok"));
        assert_ne!(text, "ok");
        assert!(underline("u").contains("\u{1b}[4m"));
    }

    #[test]
    #[serial]
    fn test_no_style_env() {
        std::env::set_var(NO_STYLE_ENV, "1");
        assert_eq!(red("plain", true, true), "plain");
        assert_eq!(bold("plain"), "plain");
        std::env::remove_var(NO_STYLE_ENV);
    }
}
