use std::path::Path;

use impscope::{
    report::{Record, Reporter, Severity},
    run as refresh, run_with, ImageMemory, Inspector, MappedImage, RunSummary, StopSignal,
};
use log::{info, warn};

use crate::{
    app::{GlobalOptions, RefreshOptions},
    commands::common::load_image,
    output::reporter,
};

/// Run the refresh loop over the file at `path`, reloading it before every pass.
pub fn run(
    path: &Path,
    refresh_opts: &RefreshOptions,
    opts: &GlobalOptions,
    stop: &StopSignal,
) -> anyhow::Result<()> {
    // A file that cannot be laid out at all is an error, not a failed pass.
    load_image(path)?;

    let config = refresh_opts.apply(opts.inspect_config());
    let mut reporter = reporter(opts);
    let summary = run_with(&config, &mut reporter, stop, |reporter| {
        let image = match MappedImage::from_file(path) {
            Ok(image) => image,
            Err(error) => {
                reporter.record(Severity::Error, Record::Status(error.to_string()));
                return Err(error);
            }
        };
        Inspector::new(&image, config).pass(reporter)
    });
    finish(&summary)
}

/// Run the refresh loop over `image` until Ctrl+C or the pass limit.
pub fn watch<M: ImageMemory + ?Sized>(
    image: &M,
    refresh_opts: &RefreshOptions,
    opts: &GlobalOptions,
    stop: &StopSignal,
) -> anyhow::Result<()> {
    let config = refresh_opts.apply(opts.inspect_config());
    let inspector = Inspector::new(image, config);

    let mut reporter = reporter(opts);
    let summary = refresh(&inspector, &mut reporter, stop);
    finish(&summary)
}

fn finish(summary: &RunSummary) -> anyhow::Result<()> {
    if summary.failures > 0 {
        warn!(
            "{} of {} pass(es) failed",
            summary.failures, summary.passes
        );
    } else {
        info!("{} pass(es) completed", summary.passes);
    }

    if summary.passes > 0 && summary.succeeded() == 0 {
        anyhow::bail!("all {} pass(es) failed", summary.passes);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{Cli, Command};
    use clap::Parser;
    use impscope::pe::ImageBuilder;
    use std::{fs, path::PathBuf};

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(args.iter().copied())
    }

    fn temp_image(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("impscope-{}-{name}", std::process::id()));
        fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn bounded_watch_succeeds() {
        let image = ImageBuilder::pe32().module("A.DLL").by_ordinal(1).build();
        let cli = parse(&["impscope", "--log", "self", "--interval-ms", "0", "--passes", "2"]);
        let Command::SelfImage { refresh } = &cli.command else {
            panic!("expected self");
        };

        watch(&image, refresh, &cli.global, &StopSignal::new()).unwrap();
    }

    #[test]
    fn all_failed_is_an_error() {
        let image = MappedImage::new(0x1000, vec![0u8; 0x40]);
        let cli = parse(&["impscope", "--log", "self", "--interval-ms", "0", "--passes", "1"]);
        let Command::SelfImage { refresh } = &cli.command else {
            panic!("expected self");
        };

        assert!(watch(&image, refresh, &cli.global, &StopSignal::new()).is_err());
    }

    #[test]
    fn watch_file_reloads() {
        let bytes = ImageBuilder::pe32_plus()
            .module("KERNEL32.DLL")
            .by_name("Sleep")
            .to_bytes();
        let path = temp_image("reload.dll", &bytes);
        let cli = parse(&[
            "impscope",
            "--log",
            "watch",
            path.to_str().unwrap(),
            "--interval-ms",
            "0",
            "--passes",
            "2",
        ]);
        let Command::Watch { path, refresh } = &cli.command else {
            panic!("expected watch");
        };

        let result = run(path, refresh, &cli.global, &StopSignal::new());
        fs::remove_file(path).unwrap();
        result.unwrap();
    }

    #[test]
    fn watch_missing_file_fails_upfront() {
        let path = std::env::temp_dir().join("impscope-missing-image.dll");
        let cli = parse(&["impscope", "--log", "watch", path.to_str().unwrap()]);
        let Command::Watch { path, refresh } = &cli.command else {
            panic!("expected watch");
        };

        assert!(run(path, refresh, &cli.global, &StopSignal::new()).is_err());
    }
}
