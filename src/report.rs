//! Structured output of an inspection pass.
//!
//! A pass never formats text itself. It hands every finding to a [`Reporter`] as a typed
//! [`Record`] tagged with a [`Severity`], in the order the image stores them: the image base,
//! the IAT address, then every module header followed by its entries. What a reporter does with
//! them, printing, logging or collecting, is up to the reporter.
//!
//! # Examples
//!
//! ```rust
//! use impscope::{pe::ImageBuilder, report::{Record, RecordLog}, InspectConfig, Inspector};
//!
//! let image = ImageBuilder::pe32().module("KERNEL32.DLL").by_ordinal(5).build();
//! let mut log = RecordLog::default();
//! Inspector::new(&image, InspectConfig::default()).pass(&mut log)?;
//!
//! assert!(log.records().contains(&Record::EntryByOrdinal(5)));
//! # Ok::<(), impscope::Error>(())
//! ```

use std::fmt;

use log::{log, Level};

/// Target used by [`LogReporter`] for every record.
pub const REPORT_TARGET: &str = "impscope::report";

/// Severity of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Listing output
    Plain,
    /// Informational
    Info,
    /// A stage completed
    Success,
    /// Something is absent or suspicious
    Warn,
    /// The pass failed
    Error,
}

impl Severity {
    /// Short title a console renderer prefixes the record with.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Severity::Plain => ">",
            Severity::Info => "i",
            Severity::Success => "+",
            Severity::Warn => "!",
            Severity::Error => "-",
        }
    }

    /// The `log` level this severity maps to.
    #[must_use]
    pub fn level(self) -> Level {
        match self {
            Severity::Error => Level::Error,
            Severity::Warn => Level::Warn,
            Severity::Plain | Severity::Info | Severity::Success => Level::Info,
        }
    }
}

/// One finding of an inspection pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Record {
    /// Runtime base address of the image
    ImageBase(u64),
    /// Runtime address of the import address table
    IatAddress(u64),
    /// An imported module, followed by its entries
    ModuleHeader(String),
    /// A symbol imported by name
    EntryByName(String),
    /// A symbol imported by ordinal
    EntryByOrdinal(u16),
    /// Free-form status of the pass
    Status(String),
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::ImageBase(address) => write!(f, "Image base: 0x{address:X}"),
            Record::IatAddress(address) => write!(f, "IAT: 0x{address:X}"),
            Record::ModuleHeader(name) => write!(f, "Module: {name}"),
            Record::EntryByName(name) => write!(f, "    {name}"),
            Record::EntryByOrdinal(ordinal) => write!(f, "    Ordinal #{ordinal}"),
            Record::Status(message) => write!(f, "{message}"),
        }
    }
}

/// Sink for the records of inspection passes.
pub trait Reporter {
    /// Receives one record.
    fn record(&mut self, severity: Severity, record: Record);

    /// Called by the refresh loop before pass number `pass` (starting at 1) begins.
    fn begin_pass(&mut self, _pass: usize) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn record(&mut self, severity: Severity, record: Record) {
        (**self).record(severity, record);
    }

    fn begin_pass(&mut self, pass: usize) {
        (**self).begin_pass(pass);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn record(&mut self, severity: Severity, record: Record) {
        (**self).record(severity, record);
    }

    fn begin_pass(&mut self, pass: usize) {
        (**self).begin_pass(pass);
    }
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn record(&mut self, _severity: Severity, _record: Record) {}
}

/// Reporter that collects the records of the most recent pass.
///
/// [`Reporter::begin_pass`] starts a fresh pass; the records of the previous one move to
/// [`RecordLog::previous`].
#[derive(Debug, Default, Clone)]
pub struct RecordLog {
    passes: usize,
    current: Vec<(Severity, Record)>,
    previous: Vec<(Severity, Record)>,
}

impl RecordLog {
    /// Records of the current pass with their severities.
    #[must_use]
    pub fn entries(&self) -> &[(Severity, Record)] {
        &self.current
    }

    /// Records of the current pass.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.current.iter().map(|(_, record)| record.clone()).collect()
    }

    /// Records of the pass before the current one.
    #[must_use]
    pub fn previous(&self) -> &[(Severity, Record)] {
        &self.previous
    }

    /// Number of passes begun.
    #[must_use]
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Records of the current pass at `severity`.
    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Record> {
        self.current
            .iter()
            .filter(move |(entry, _)| *entry == severity)
            .map(|(_, record)| record)
    }
}

impl Reporter for RecordLog {
    fn record(&mut self, severity: Severity, record: Record) {
        self.current.push((severity, record));
    }

    fn begin_pass(&mut self, _pass: usize) {
        self.passes += 1;
        self.previous = std::mem::take(&mut self.current);
    }
}

/// Reporter that forwards records to the `log` facade under [`REPORT_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn record(&mut self, severity: Severity, record: Record) {
        log!(target: REPORT_TARGET, severity.level(), "[{}] {}", severity.title(), record);
    }

    fn begin_pass(&mut self, pass: usize) {
        log!(target: REPORT_TARGET, Level::Debug, "Pass {}", pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles() {
        let titles: Vec<&str> = [
            Severity::Plain,
            Severity::Info,
            Severity::Success,
            Severity::Warn,
            Severity::Error,
        ]
        .iter()
        .map(|severity| severity.title())
        .collect();
        assert_eq!(titles, [">", "i", "+", "!", "-"]);
    }

    #[test]
    fn levels() {
        assert_eq!(Severity::Error.level(), Level::Error);
        assert_eq!(Severity::Warn.level(), Level::Warn);
        assert_eq!(Severity::Success.level(), Level::Info);
        assert_eq!(Severity::Plain.level(), Level::Info);
    }

    #[test]
    fn display() {
        assert_eq!(Record::ImageBase(0x40_0000).to_string(), "Image base: 0x400000");
        assert_eq!(Record::EntryByOrdinal(7).to_string(), "    Ordinal #7");
        assert_eq!(Record::ModuleHeader("A.DLL".into()).to_string(), "Module: A.DLL");
    }

    #[test]
    fn record_log_passes() {
        let mut log = RecordLog::default();
        log.begin_pass(1);
        log.record(Severity::Plain, Record::ImageBase(1));
        log.record(Severity::Warn, Record::Status("x".into()));
        assert_eq!(log.passes(), 1);
        assert_eq!(log.records().len(), 2);
        assert_eq!(log.with_severity(Severity::Warn).count(), 1);

        log.begin_pass(2);
        assert!(log.entries().is_empty());
        assert_eq!(log.previous().len(), 2);
        assert_eq!(log.passes(), 2);
    }

    #[test]
    fn forwarding_impls() {
        let mut log = RecordLog::default();
        {
            let mut by_ref = &mut log;
            Reporter::record(
                &mut by_ref,
                Severity::Info,
                Record::EntryByName("Sleep".into()),
            );
        }
        let mut boxed: Box<dyn Reporter> = Box::new(NullReporter);
        boxed.record(Severity::Error, Record::Status("dropped".into()));
        LogReporter.record(Severity::Info, Record::IatAddress(0x1000));

        assert_eq!(log.records(), vec![Record::EntryByName("Sleep".into())]);
    }
}
