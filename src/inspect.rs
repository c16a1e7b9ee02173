//! Inspection passes and the refresh loop.
//!
//! An [`Inspector`] runs the header reader, the import walker and the thunk decoder over one
//! image, reporting every finding as it goes and returning an [`ImportSnapshot`] of the pass.
//! Nothing is cached between passes: each pass re-reads the image from its base, so a pass over
//! a live image sees its current state.
//!
//! [`run`] repeats passes on a fixed interval until a [`StopSignal`] is raised or the configured
//! number of passes is reached. A failed pass is reported and counted, never propagated.
//!
//! # Examples
//!
//! ```rust
//! use impscope::{pe::{ImageBuilder, ImportEntry}, InspectConfig, Inspector};
//!
//! let image = ImageBuilder::pe32_plus()
//!     .module("KERNEL32.DLL").by_name("Sleep")
//!     .build();
//!
//! let snapshot = Inspector::new(&image, InspectConfig::default()).snapshot()?;
//! assert_eq!(snapshot.modules[0].name, "KERNEL32.DLL");
//! assert_eq!(snapshot.modules[0].entries, [ImportEntry::ByName("Sleep".into())]);
//! # Ok::<(), impscope::Error>(())
//! ```

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use log::{debug, warn};

use crate::{
    config::InspectConfig,
    image::ImageMemory,
    pe::{HeaderInfo, ImportEntry, ImportWalker, ModuleImport, ThunkDecoder},
    report::{NullReporter, Record, Reporter, Severity},
    Result,
};

/// Status text reported for an image without an import directory.
pub const NO_IMPORT_DIRECTORY: &str = "no import directory";

/// The imports of one module, as seen by one pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleImports {
    /// Name of the imported module
    pub name: String,
    /// Imported symbols in lookup table order
    pub entries: Vec<ImportEntry>,
}

/// Result of one pass. Valid only for the instant it was taken.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImportSnapshot {
    /// Runtime base of the image
    pub runtime_base: u64,
    /// Runtime address of the import address table, if the image has one
    pub iat_address: Option<u64>,
    /// Imported modules in directory order
    pub modules: Vec<ModuleImports>,
}

impl ImportSnapshot {
    /// Looks a module up by name, ignoring ASCII case.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleImports> {
        self.modules
            .iter()
            .find(|module| module.name.eq_ignore_ascii_case(name))
    }

    /// Total number of imported symbols over all modules.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.modules.iter().map(|module| module.entries.len()).sum()
    }
}

impl From<&ImportEntry> for Record {
    fn from(entry: &ImportEntry) -> Self {
        match entry {
            ImportEntry::ByName(name) => Record::EntryByName(name.clone()),
            ImportEntry::ByOrdinal(ordinal) => Record::EntryByOrdinal(*ordinal),
        }
    }
}

/// Drives inspection passes over one image.
pub struct Inspector<'a, M: ImageMemory + ?Sized> {
    memory: &'a M,
    config: InspectConfig,
}

impl<'a, M: ImageMemory + ?Sized> Inspector<'a, M> {
    /// Creates an inspector over `memory`.
    pub fn new(memory: &'a M, config: InspectConfig) -> Self {
        Inspector { memory, config }
    }

    /// The configuration passes run with.
    pub fn config(&self) -> &InspectConfig {
        &self.config
    }

    /// The inspected image.
    pub fn memory(&self) -> &'a M {
        self.memory
    }

    /// Reads the header chain.
    ///
    /// # Errors
    /// See [`HeaderInfo::read`].
    pub fn header(&self) -> Result<HeaderInfo> {
        HeaderInfo::read(self.memory)
    }

    /// Iterates the imported modules described by `header`.
    pub fn modules<'h>(&'h self, header: &'h HeaderInfo) -> ImportWalker<'h, M> {
        ImportWalker::new(self.memory, header, &self.config)
    }

    /// Iterates the entries imported from `module`.
    pub fn entries<'h>(
        &'h self,
        header: &'h HeaderInfo,
        module: &ModuleImport,
    ) -> ThunkDecoder<'h, M> {
        ThunkDecoder::new(self.memory, header, module.lookup_table, &self.config)
    }

    /// Runs one complete pass, streaming its records to `reporter`.
    ///
    /// # Errors
    /// Returns the first error of any stage, after reporting it as an [`Severity::Error`] status.
    pub fn pass<R: Reporter + ?Sized>(&self, reporter: &mut R) -> Result<ImportSnapshot> {
        match self.collect(reporter) {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => {
                reporter.record(Severity::Error, Record::Status(error.to_string()));
                Err(error)
            }
        }
    }

    /// Runs one complete pass without reporting.
    ///
    /// # Errors
    /// Returns the first error of any stage.
    pub fn snapshot(&self) -> Result<ImportSnapshot> {
        self.pass(&mut NullReporter)
    }

    fn collect<R: Reporter + ?Sized>(&self, reporter: &mut R) -> Result<ImportSnapshot> {
        let header = self.header()?;
        reporter.record(Severity::Info, Record::ImageBase(header.runtime_base));

        // The IAT is where the loader wrote resolved addresses, so it lives at the runtime base.
        let iat_address = match header.iat_directory() {
            Some(directory) => {
                let address = header.runtime_address(u64::from(directory.virtual_address))?;
                reporter.record(Severity::Info, Record::IatAddress(address));
                Some(address)
            }
            None => None,
        };

        let mut snapshot = ImportSnapshot {
            runtime_base: header.runtime_base,
            iat_address,
            modules: Vec::new(),
        };

        if header.import_directory().is_none() {
            reporter.record(Severity::Warn, Record::Status(NO_IMPORT_DIRECTORY.to_string()));
            return Ok(snapshot);
        }

        for module in self.modules(&header) {
            let module = module?;
            reporter.record(Severity::Success, Record::ModuleHeader(module.name.clone()));

            let mut entries = Vec::new();
            for entry in self.entries(&header, &module) {
                let entry = entry?;
                reporter.record(Severity::Plain, Record::from(&entry));
                entries.push(entry);
            }

            snapshot.modules.push(ModuleImports {
                name: module.name,
                entries,
            });
        }

        debug!(
            "Pass over 0x{:X}: {} module(s), {} entries",
            snapshot.runtime_base,
            snapshot.modules.len(),
            snapshot.entry_count()
        );

        Ok(snapshot)
    }
}

/// Cooperative cancellation token for [`run`].
///
/// Clones share the same flag. The loop polls it once per iteration; a pass that already
/// started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a signal that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` once [`StopSignal::stop`] was called on any clone.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Passes started
    pub passes: usize,
    /// Passes that ended in an error
    pub failures: usize,
}

impl RunSummary {
    /// Passes that completed without error.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.passes - self.failures
    }
}

/// Repeats passes of `inspector` until `stop` is raised or `max_passes` is reached.
///
/// Before each pass the loop polls `stop` and calls [`Reporter::begin_pass`]. Between passes it
/// sleeps for the configured refresh interval. Errors of a pass are reported by the pass itself
/// and counted in the summary.
pub fn run<M, R>(inspector: &Inspector<'_, M>, reporter: &mut R, stop: &StopSignal) -> RunSummary
where
    M: ImageMemory + ?Sized,
    R: Reporter + ?Sized,
{
    run_with(inspector.config(), reporter, stop, |reporter| inspector.pass(reporter))
}

/// Refresh loop around an arbitrary pass, paced and bounded by `config`.
///
/// `pass` runs once per iteration with the reporter; it is where a caller reloads its image
/// before inspecting it. Stop polling, pass limits and error accounting are those of [`run`].
pub fn run_with<R, F>(
    config: &InspectConfig,
    reporter: &mut R,
    stop: &StopSignal,
    mut pass: F,
) -> RunSummary
where
    R: Reporter + ?Sized,
    F: FnMut(&mut R) -> Result<ImportSnapshot>,
{
    let mut summary = RunSummary::default();

    loop {
        if stop.is_stopped() {
            debug!("Stop requested after {} pass(es)", summary.passes);
            break;
        }
        if config.max_passes.is_some_and(|max| summary.passes >= max) {
            break;
        }

        summary.passes += 1;
        reporter.begin_pass(summary.passes);
        if let Err(error) = pass(reporter) {
            summary.failures += 1;
            warn!("Pass {} failed: {}", summary.passes, error);
        }

        if config.max_passes.is_some_and(|max| summary.passes >= max) {
            break;
        }
        thread::sleep(config.refresh_interval);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::MappedImage,
        pe::ImageBuilder,
        report::RecordLog,
        test::{fast_config, sample_pe32},
        Error,
    };
    use std::time::Duration;

    #[test]
    fn pass_record_order() {
        let image = ImageBuilder::pe32()
            .image_base(0x40_0000)
            .module("KERNEL32.DLL")
            .by_name("Sleep")
            .by_ordinal(9)
            .module("USER32.DLL")
            .by_name("MessageBoxA")
            .build();
        let header = HeaderInfo::read(&image).unwrap();
        let iat = header.iat_directory().unwrap().virtual_address;

        let mut log = RecordLog::default();
        Inspector::new(&image, InspectConfig::default())
            .pass(&mut log)
            .unwrap();

        assert_eq!(
            log.records(),
            vec![
                Record::ImageBase(0x40_0000),
                Record::IatAddress(0x40_0000 + u64::from(iat)),
                Record::ModuleHeader("KERNEL32.DLL".into()),
                Record::EntryByName("Sleep".into()),
                Record::EntryByOrdinal(9),
                Record::ModuleHeader("USER32.DLL".into()),
                Record::EntryByName("MessageBoxA".into()),
            ]
        );
    }

    #[test]
    fn no_import_directory() {
        let image = ImageBuilder::pe32_plus()
            .module("IGNORED.DLL")
            .by_ordinal(1)
            .without_import_directory()
            .without_iat_directory()
            .build();

        let mut log = RecordLog::default();
        let snapshot = Inspector::new(&image, InspectConfig::default())
            .pass(&mut log)
            .unwrap();

        assert!(snapshot.modules.is_empty());
        assert_eq!(snapshot.iat_address, None);
        assert_eq!(
            log.entries(),
            &[
                (Severity::Info, Record::ImageBase(image.base())),
                (
                    Severity::Warn,
                    Record::Status(NO_IMPORT_DIRECTORY.to_string())
                ),
            ]
        );
    }

    #[test]
    fn failed_pass_reports_error() {
        let image = ImageBuilder::pe32()
            .module("A.DLL")
            .raw_thunk(0x00F0_0000)
            .build();

        let mut log = RecordLog::default();
        let result = Inspector::new(&image, InspectConfig::default()).pass(&mut log);

        assert!(matches!(result, Err(Error::DanglingPointer { .. })));
        let errors: Vec<&Record> = log.with_severity(Severity::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Record::Status(_)));
        assert!(log
            .records()
            .contains(&Record::ModuleHeader("A.DLL".into())));
    }

    #[test]
    fn snapshot_matches_pass() {
        let image = sample_pe32();
        let inspector = Inspector::new(&image, InspectConfig::default());

        let mut log = RecordLog::default();
        let passed = inspector.pass(&mut log).unwrap();
        let snapshot = inspector.snapshot().unwrap();

        assert_eq!(passed, snapshot);
        assert_eq!(snapshot.module("kernel32.dll").unwrap().entries.len(), 2);
        assert_eq!(snapshot.entry_count(), 3);
    }

    #[test]
    fn lazy_stages() {
        let image = sample_pe32();
        let inspector = Inspector::new(&image, InspectConfig::default());
        let header = inspector.header().unwrap();

        let modules: Vec<ModuleImport> = inspector
            .modules(&header)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(modules.len(), 2);

        let entries: Vec<ImportEntry> = inspector
            .entries(&header, &modules[1])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(entries, [ImportEntry::ByOrdinal(115)]);
    }

    #[test]
    fn run_honors_max_passes() {
        let image = sample_pe32();
        let inspector = Inspector::new(&image, fast_config().with_max_passes(3));
        let mut log = RecordLog::default();

        let summary = run(&inspector, &mut log, &StopSignal::new());

        assert_eq!(summary, RunSummary { passes: 3, failures: 0 });
        assert_eq!(log.passes(), 3);
        assert_eq!(
            log.records(),
            log.previous()
                .iter()
                .map(|(_, r)| r.clone())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn run_with_counts_failed_passes() {
        let image = sample_pe32();
        let broken = MappedImage::new(0x1000, vec![0u8; 0x40]);
        let config = fast_config().with_max_passes(4);
        let mut log = RecordLog::default();

        let mut calls = 0;
        let summary = run_with(&config, &mut log, &StopSignal::new(), |reporter| {
            calls += 1;
            let target = if calls % 2 == 0 { &broken } else { &image };
            Inspector::new(target, config).pass(reporter)
        });

        assert_eq!(calls, 4);
        assert_eq!(summary, RunSummary { passes: 4, failures: 2 });
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(log.passes(), 4);
    }

    #[test]
    fn run_stops_before_first_pass() {
        let image = sample_pe32();
        let inspector = Inspector::new(&image, fast_config());
        let stop = StopSignal::new();
        stop.clone().stop();

        let mut log = RecordLog::default();
        let summary = run(&inspector, &mut log, &stop);

        assert_eq!(summary.passes, 0);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn run_survives_failures() {
        let image = MappedImage::new(0x1000, vec![0u8; 0x100]);
        let inspector = Inspector::new(&image, fast_config().with_max_passes(2));

        let mut log = RecordLog::default();
        let summary = run(&inspector, &mut log, &StopSignal::new());

        assert_eq!(summary.passes, 2);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.succeeded(), 0);
    }

    #[test]
    fn run_stops_from_another_thread() {
        let image = sample_pe32();
        let inspector = Inspector::new(
            &image,
            InspectConfig::default().with_refresh_interval(Duration::from_millis(10)),
        );
        let stop = StopSignal::new();

        let remote = stop.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.stop();
        });

        let summary = run(&inspector, &mut NullReporter, &stop);
        handle.join().unwrap();

        assert!(summary.passes >= 1);
        assert_eq!(summary.failures, 0);
    }
}
