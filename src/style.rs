//! Terminal styling utilities
//!
//! Consistent colors for console messages and the run report.
//! Uses crossterm for cross-platform terminal colors.

use crossterm::style::{StyledContent, Stylize};

/// Outcome status colors
/// - succeeded: Green
/// - timed_out: Yellow
/// - failed: Red
pub fn status_style(status: &str) -> StyledContent<String> {
    match status.to_lowercase().as_str() {
        "succeeded" => status.to_string().green(),
        "timed_out" => status.to_string().yellow(),
        "failed" => status.to_string().red(),
        _ => status.to_string().white(),
    }
}

/// Count styling: zero is dim, anything else takes the given color
pub fn count_succeeded(n: usize) -> StyledContent<String> {
    if n == 0 {
        n.to_string().dark_grey()
    } else {
        n.to_string().green()
    }
}

pub fn count_timed_out(n: usize) -> StyledContent<String> {
    if n == 0 {
        n.to_string().dark_grey()
    } else {
        n.to_string().yellow()
    }
}

pub fn count_failed(n: usize) -> StyledContent<String> {
    if n == 0 {
        n.to_string().dark_grey()
    } else {
        n.to_string().red()
    }
}

/// Section headers
pub fn header(text: &str) -> StyledContent<String> {
    text.to_string().bold()
}

/// Dim/muted text
pub fn dim(text: &str) -> StyledContent<String> {
    text.to_string().dark_grey()
}

/// Success text
pub fn success(text: &str) -> StyledContent<String> {
    text.to_string().green()
}

/// Warning text
pub fn warning(text: &str) -> StyledContent<String> {
    text.to_string().yellow()
}

/// Error text
pub fn error(text: &str) -> StyledContent<String> {
    text.to_string().red()
}

/// Organization id styling
pub fn org_id(id: &str) -> StyledContent<String> {
    id.to_string().cyan()
}

/// Path styling
pub fn path(p: &str) -> StyledContent<String> {
    p.to_string().blue()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_colors() {
        // Styling keeps the text itself intact
        assert_eq!(status_style("succeeded").content(), "succeeded");
        assert_eq!(status_style("timed_out").content(), "timed_out");
        assert_eq!(status_style("failed").content(), "failed");
    }

    #[test]
    fn test_counts() {
        assert_eq!(count_failed(0).content(), "0");
        assert_eq!(count_succeeded(12).content(), "12");
        let _ = count_timed_out(1);
    }
}
