#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the fire resource CLI.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, and [`TractProgress`] draws the overlap build
//! on the returned [`MultiProgress`].

use std::sync::Arc;
use std::time::Duration;

use fire_resource_crosswalk::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

const SPINNER_TEMPLATE: &str = "{spinner:.cyan} {msg}";
const BAR_TEMPLATE: &str = "  {msg} {wide_bar:.cyan/dim} {pos}/{len} tracts [{elapsed_precise}, eta {eta}]";

/// Overlap build progress as an `indicatif` bar.
///
/// Spins until the tract count arrives, then counts tracts.
pub struct TractProgress {
    bar: ProgressBar,
}

impl TractProgress {
    /// Adds a bar to `multi`.
    #[must_use]
    pub fn attach(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template(SPINNER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(message.to_string());

        Arc::new(Self { bar })
    }
}

impl ProgressCallback for TractProgress {
    fn set_total(&self, total: u64) {
        self.bar.disable_steady_tick();
        self.bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        self.bar.set_length(total);
        self.bar.reset();
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger and returns the [`MultiProgress`] that
/// progress bars must be drawn on.
///
/// `RUST_LOG` filters output; without it only `info` and above are shown.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder.filter_level(log::LevelFilter::Info);
    }
    let logger = builder.build();
    let max_level = logger.filter();

    // Fails only if a logger is already installed.
    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(max_level);
    }

    multi
}
