use std::sync::Arc;

use anyhow::{Context, Result};
use time::{format_description, UtcOffset};
use tracing_log::LogTracer;
use tracing_subscriber::filter::dynamic_filter_fn;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::Cli;

pub fn init_logging(cli: &Cli) -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        match cli.debug {
            0 => std::env::set_var("RUST_LOG", "shellgate=info"),
            1 => std::env::set_var("RUST_LOG", "shellgate=debug"),
            2 => std::env::set_var("RUST_LOG", "shellgate=debug,russh=debug"),
            _ => std::env::set_var("RUST_LOG", "debug"),
        }
    }

    LogTracer::init().context("Failed to initialize log compatibility layer")?;

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let env_filter = Arc::new(EnvFilter::from_default_env());
    let enable_colors = console::user_attended();

    let text_layer_non_interactive = (!console::user_attended()).then({
        let env_filter = env_filter.clone();
        || {
            tracing_subscriber::fmt::layer()
                .with_ansi(enable_colors)
                .with_timer(OffsetTime::new(
                    offset,
                    #[allow(clippy::unwrap_used)]
                    format_description::parse("[day].[month].[year] [hour]:[minute]:[second]")
                        .unwrap(),
                ))
                .with_filter(dynamic_filter_fn(move |m, c| {
                    env_filter.enabled(m, c.clone())
                }))
        }
    });

    let text_layer_interactive = console::user_attended().then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(enable_colors)
            .with_target(false)
            .with_timer(OffsetTime::new(
                offset,
                #[allow(clippy::unwrap_used)]
                format_description::parse("[hour]:[minute]:[second]").unwrap(),
            ))
            .with_filter(dynamic_filter_fn(move |m, c| {
                env_filter.enabled(m, c.clone())
            }))
    });

    tracing_subscriber::registry()
        .with(text_layer_non_interactive)
        .with(text_layer_interactive)
        .init();

    Ok(())
}
