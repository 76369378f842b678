// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatter for the agent runtime.
//!
//! Lines are prefixed with `AGENT` so agent output can be told apart from
//! the host application's output on a shared stream:
//!
//! ```text
//! AGENT | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! For example:
//!
//! ```text
//! AGENT | INFO | Services started in 42ms (slowest: HarvestService at 3ms)
//! AGENT | WARN | Error stopping JmxService: JmxService failed to stop: port busy
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tracing_subscriber::FmtSubscriber;
//! use agent_services::logger::Formatter;
//!
//! let subscriber = FmtSubscriber::builder()
//!     .event_format(Formatter)
//!     .with_max_level(tracing::Level::INFO)
//!     .finish();
//!
//! tracing::subscriber::set_global_default(subscriber)?;
//! ```

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_PREFIX: &str = "AGENT";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        // Active spans, root first.
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
