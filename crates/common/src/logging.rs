use std::io;

use tracing_core::Level;
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Install the global diagnostics subscriber.
///
/// Diagnostics are written to stderr, leaving stdout to user-facing output.
pub fn init(config: &Config) {
    let fmt = fmt::format().with_target(false).compact();

    let target_filters = Targets::new()
        .with_target("aws_config", Level::WARN)
        .with_target("aws_smithy_runtime", Level::WARN)
        .with_target("hyper", Level::WARN)
        .with_default(config.logging.level);

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(fmt).with_writer(io::stderr))
        .with(target_filters)
        .init();
}
