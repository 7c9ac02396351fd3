// src/utils/html_debug.rs
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use crate::utils::error::AppError;

/// Patterns highlighted in dumps of pages where the result table was not found.
pub const PAGE_DEBUG_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)<table[^>]*>", "table"),
    (r"(?i)способ\s+закупки", "marker"),
    (r"(?i)статус", "marker"),
    (r"(?i)показано\s+[cс]\s+\d+\s+по\s+\d+\s+из\s+[\d\s]+\s+записей", "summary"),
    (r"(?i)showing\s+\d+\s*(?:[-–—]|to)\s*\d+\s+of\s+[\d\s,]+", "summary"),
    (r#"(?i)<ul[^>]*class="[^"]*pagination[^"]*"[^>]*>"#, "pagination"),
];

/// Saves a HTML snippet to a file with debug highlights
pub fn save_debug_html(html: &str, path: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    let mut file = File::create(path)?;

    // Add debug styling in head
    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n");

    // CSS for highlight colors
    debug_html.push_str(".highlight-table { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-marker { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-summary { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-pagination { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0); // Sort by position

    for (start, end, highlight_type) in sorted_highlights {
        // Overlapping matches are dropped; the earlier one already wrapped this text
        if start < last_pos {
            continue;
        }
        if start > last_pos {
            debug_html.push_str(&html[last_pos..start]);
        }

        let css_class = match highlight_type {
            "table" => "highlight-table",
            "marker" => "highlight-marker",
            "summary" => "highlight-summary",
            "pagination" => "highlight-pagination",
            _ => "highlight-custom",
        };

        debug_html.push_str(&format!("<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type));
        debug_html.push_str(&html[start..end]);
        debug_html.push_str("</span>");

        last_pos = end;
    }

    if last_pos < html.len() {
        debug_html.push_str(&html[last_pos..]);
    }

    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Creates a debug version of an HTML document with locations of specified regex patterns highlighted
pub fn create_debug_html(html: &str, path: &Path, patterns: &[(&str, &str)]) -> Result<(), AppError> {
    use regex::Regex;

    let mut highlights = Vec::new();

    for (pattern, highlight_type) in patterns {
        let re = Regex::new(pattern).map_err(|e| {
            AppError::Config(format!("Invalid regex pattern '{}': {}", pattern, e))
        })?;

        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *highlight_type));
        }
    }

    save_debug_html(html, path, &highlights)
}

/// Writes an annotated dump of a rendered page into `dir`, returning the file path.
pub fn dump_page(dir: &Path, page: u32, html: &str) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let path = dir.join(format!("page_{:04}_{}.html", page, stamp));
    create_debug_html(html, &path, PAGE_DEBUG_PATTERNS)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_highlights_markers() {
        let dir = tempfile::tempdir().unwrap();
        let html = r#"<div>Показано c 1 по 50 из 120 записей</div><table><tr><td>Статус</td></tr></table>"#;

        let path = dump_page(dir.path(), 7, html).unwrap();
        let written = fs::read_to_string(&path).unwrap();

        assert!(path.file_name().unwrap().to_string_lossy().starts_with("page_0007_"));
        assert!(written.contains("highlight-summary"));
        assert!(written.contains("highlight-table"));
        assert!(written.contains("highlight-marker"));
        assert!(written.contains("</body>"));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = create_debug_html("<p></p>", &dir.path().join("x.html"), &[("(", "custom")]);
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
