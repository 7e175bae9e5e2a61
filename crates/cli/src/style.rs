//! Colored status lines and table cells for terminal output.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::{style, Style};

use docsync_core::models::EventStatus;

fn marked(mark: &str, color: Style, msg: &str) -> String {
    format!("{} {msg}", color.apply_to(mark))
}

pub fn success(msg: &str) -> String {
    marked("✓", Style::new().green(), msg)
}

pub fn error(msg: &str) -> String {
    marked("✗", Style::new().red(), msg)
}

pub fn warn(msg: &str) -> String {
    marked("!", Style::new().yellow().bold(), msg)
}

pub fn header(msg: &str) -> String {
    style(msg).bold().underlined().to_string()
}

pub fn dim(msg: &str) -> String {
    style(msg).dim().to_string()
}

/// Empty table with the given column headings, wrapped to the terminal.
pub fn table(headings: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headings);
    table
}

pub fn status_cell(status: EventStatus) -> Cell {
    let color = match status {
        EventStatus::Success => Color::Green,
        EventStatus::Failed => Color::Red,
        EventStatus::Ignored => Color::DarkGrey,
        EventStatus::Pending | EventStatus::Processing => Color::Yellow,
    };
    Cell::new(status.to_string()).fg(color)
}

/// `ok` or `failed` for a single file's sync record.
pub fn outcome_cell(success: bool) -> Cell {
    if success {
        Cell::new("ok").fg(Color::Green)
    } else {
        Cell::new("failed").fg(Color::Red)
    }
}
