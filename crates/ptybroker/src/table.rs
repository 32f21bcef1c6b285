use unicode_width::UnicodeWidthStr;

use ptybroker_client::SessionInfo;

use crate::color;

const HEADERS: [&str; 7] = ["Id", "Shell", "Cwd", "Size", "State", "Created", "Buffered"];

/// Box-drawn table of daemon sessions. Column widths fit the widest cell.
pub struct SessionTable {
    rows: Vec<[String; 7]>,
    widths: [usize; 7],
}

impl SessionTable {
    pub fn new(sessions: &[SessionInfo]) -> Self {
        let rows: Vec<[String; 7]> = sessions.iter().map(row_cells).collect();
        let mut widths = HEADERS.map(display_width);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(display_width(cell));
            }
        }
        Self { rows, widths }
    }

    pub fn print(&self) {
        println!("{}", self.border('┌', '┬', '┐'));
        let header = HEADERS.map(|h| h.to_string());
        println!("{}", self.line(&header, |_, cell| color::bold(cell)));
        println!("{}", self.border('├', '┼', '┤'));
        for row in &self.rows {
            println!(
                "{}",
                self.line(row, |column, cell| match column {
                    0 => color::teal(cell),
                    4 => color::state(cell),
                    _ => cell.to_string(),
                })
            );
        }
        println!("{}", self.border('└', '┴', '┘'));
    }

    fn border(&self, left: char, middle: char, right: char) -> String {
        let segments: Vec<String> = self.widths.iter().map(|w| "─".repeat(w + 2)).collect();
        color::slate(&format!(
            "{}{}{}",
            left,
            segments.join(&middle.to_string()),
            right
        ))
    }

    fn line(&self, cells: &[String; 7], style: impl Fn(usize, &str) -> String) -> String {
        let sep = color::slate("│");
        let mut out = sep.clone();
        for (column, (cell, width)) in cells.iter().zip(self.widths).enumerate() {
            out.push(' ');
            out.push_str(&style(column, &pad(cell, width)));
            out.push(' ');
            out.push_str(&sep);
        }
        out
    }
}

fn row_cells(session: &SessionInfo) -> [String; 7] {
    let shell = if session.config.args.is_empty() {
        session.config.shell.clone()
    } else {
        format!("{} {}", session.config.shell, session.config.args.join(" "))
    };
    let created = session
        .created_at()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    [
        session.id.clone(),
        shell,
        session.config.cwd.clone(),
        format!("{}x{}", session.config.cols, session.config.rows),
        if session.is_dead { "dead" } else { "alive" }.to_string(),
        created,
        format_bytes(session.buffer_size),
    ]
}

fn format_bytes(bytes: usize) -> String {
    match bytes {
        0..1024 => format!("{} B", bytes),
        1024..1_048_576 => format!("{:.1} KiB", bytes as f64 / 1024.0),
        _ => format!("{:.1} MiB", bytes as f64 / 1_048_576.0),
    }
}

/// Terminal display width; wide characters (CJK, emoji) count as 2 columns.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Pad to a minimum display width without truncating.
pub(crate) fn pad(s: &str, min_width: usize) -> String {
    let width = display_width(s);
    if width >= min_width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(min_width - width))
    }
}
