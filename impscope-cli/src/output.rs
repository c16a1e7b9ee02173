use std::io::{self, IsTerminal, Write};

use comfy_table::{presets, CellAlignment, ContentArrangement, Table};
use impscope::report::{LogReporter, Record, Reporter, Severity};
use serde::Serialize;

use crate::app::GlobalOptions;

/// Print `data` as JSON (if `--json`) or call `display_fn` for human-readable output.
pub fn print_output<T: Serialize>(
    data: &T,
    opts: &GlobalOptions,
    display_fn: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(data)?;
        println!("{json}");
    } else {
        display_fn(data);
    }
    Ok(())
}

/// Column alignment for tabular output.
#[derive(Clone, Copy)]
pub enum Align {
    Left,
    Right,
}

/// Tabular writer backed by `comfy-table`, whitespace-aligned without borders.
pub struct TabWriter {
    table: Table,
    indent: String,
}

impl TabWriter {
    /// Create a new `TabWriter` with `(header, alignment)` column definitions.
    pub fn new(columns: Vec<(&str, Align)>) -> Self {
        let mut table = Table::new();
        table
            .load_preset(presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let headers: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        table.set_header(headers);

        // Outer columns drop their outside padding, inner ones keep a 2-space gap.
        let last = columns.len().saturating_sub(1);
        for (i, (_, align)) in columns.iter().enumerate() {
            let cell_align = match align {
                Align::Left => CellAlignment::Left,
                Align::Right => CellAlignment::Right,
            };
            if let Some(col) = table.column_mut(i) {
                col.set_cell_alignment(cell_align);
                let pad_left = if i == 0 { 0 } else { 1 };
                let pad_right = if i == last { 0 } else { 1 };
                col.set_padding((pad_left, pad_right));
            }
        }

        Self {
            table,
            indent: String::new(),
        }
    }

    /// Set the indent prefix for every line.
    pub fn indent(mut self, prefix: &str) -> Self {
        self.indent = prefix.to_string();
        self
    }

    /// Add a row. Values are given in column order.
    pub fn row(&mut self, values: Vec<String>) {
        self.table.add_row(values);
    }

    /// Render the table, one string per trimmed line.
    pub fn lines(&self) -> Vec<String> {
        self.table
            .to_string()
            .lines()
            .map(|line| format!("{}{}", self.indent, line.trim_end()))
            .collect()
    }

    /// Print the table to stdout.
    pub fn print(&self) {
        for line in self.lines() {
            println!("{line}");
        }
    }
}

/// Renders pass records on stdout, prefixed with their severity title.
///
/// On a terminal every pass, the first included, starts by clearing the screen, so a refresh
/// loop redraws in place. Elsewhere every pass after the first opens with a header line.
pub struct ConsoleReporter<W: Write> {
    out: W,
    clear: bool,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        let clear = io::stdout().is_terminal();
        ConsoleReporter::new(io::stdout(), clear)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, clear: bool) -> Self {
        ConsoleReporter { out, clear }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn record(&mut self, severity: Severity, record: Record) {
        // A closed stdout ends the listing, not the pass.
        let _ = writeln!(self.out, "[{}] {}", severity.title(), record);
    }

    fn begin_pass(&mut self, pass: usize) {
        let _ = if self.clear {
            write!(self.out, "\x1B[2J\x1B[H")
        } else if pass > 1 {
            writeln!(self.out, "\n--- pass {pass} ---")
        } else {
            Ok(())
        };
        let _ = self.out.flush();
    }
}

/// Picks the record sink selected by `--log`.
pub fn reporter(opts: &GlobalOptions) -> Box<dyn Reporter> {
    if opts.log {
        Box::new(LogReporter)
    } else {
        Box::new(ConsoleReporter::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_lines() {
        let mut reporter = ConsoleReporter::new(Vec::new(), false);
        reporter.begin_pass(1);
        reporter.record(Severity::Info, Record::ImageBase(0x40_0000));
        reporter.record(Severity::Plain, Record::EntryByOrdinal(3));
        reporter.begin_pass(2);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert_eq!(
            text,
            "[i] Image base: 0x400000\n[>]     Ordinal #3\n\n--- pass 2 ---\n"
        );
    }

    #[test]
    fn terminal_clears_on_first_pass() {
        let mut reporter = ConsoleReporter::new(Vec::new(), true);
        reporter.begin_pass(1);
        reporter.record(Severity::Success, Record::ModuleHeader("A.DLL".into()));
        reporter.begin_pass(2);

        let text = String::from_utf8(reporter.into_inner()).unwrap();
        assert!(text.starts_with("\x1B[2J\x1B[H"));
        assert_eq!(text.matches("\x1B[2J").count(), 2);
        assert!(!text.contains("--- pass"));
    }

    #[test]
    fn tab_writer_aligns() {
        let mut tw =
            TabWriter::new(vec![("Name", Align::Left), ("Size", Align::Right)]).indent("  ");
        tw.row(vec!["Import".into(), "40".into()]);
        tw.row(vec!["Iat".into(), "1024".into()]);

        let lines: Vec<String> = tw
            .lines()
            .into_iter()
            .filter(|line| !line.trim().is_empty())
            .collect();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|line| line.starts_with("  ")));
        assert!(lines[2].ends_with("1024"));
    }
}
