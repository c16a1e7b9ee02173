use anyhow::Context;
use impscope::{LiveImage, StopSignal};

use crate::{
    app::{GlobalOptions, RefreshOptions},
    commands::watch::watch,
};

pub fn run(
    refresh_opts: &RefreshOptions,
    opts: &GlobalOptions,
    stop: &StopSignal,
) -> anyhow::Result<()> {
    let image = LiveImage::current_process()
        .context("cannot inspect the image of the current process")?;
    watch(&image, refresh_opts, opts, stop)
}
