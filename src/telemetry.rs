//! Tracing setup for the `svckit` binary.
//!
//! `OTEL_EXPORTER` selects where events go, `RUST_LOG` filters them. Library
//! code only emits events; installing a subscriber is the host's job.

use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::{bail, Result};
use opentelemetry::global;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_SERVICE_NAME: &str = "svckit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exporter {
    Stdout,
    Json,
    File,
    Otlp,
}

impl FromStr for Exporter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" | "" => Ok(Exporter::Stdout),
            "json" => Ok(Exporter::Json),
            "file" => Ok(Exporter::File),
            "otlp" => Ok(Exporter::Otlp),
            other => bail!("Unknown OTEL_EXPORTER: {}", other),
        }
    }
}

pub fn init_telemetry() -> Result<()> {
    let exporter = match std::env::var("OTEL_EXPORTER") {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            eprintln!("{}, falling back to stdout", e);
            Exporter::Stdout
        }),
        Err(_) => Exporter::Stdout,
    };

    init_with(exporter)
}

pub fn init_with(exporter: Exporter) -> Result<()> {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());

    match exporter {
        Exporter::Stdout => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
        Exporter::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?,
        Exporter::File => {
            let log_file_path = std::env::var("LOG_FILE")
                .unwrap_or_else(|_| format!("{}.log", DEFAULT_SERVICE_NAME));
            let log_file = OpenOptions::new().create(true).append(true).open(&log_file_path)?;

            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::sync::Arc::new(log_file))
                        .with_ansi(false),
                )
                .try_init()?;
            eprintln!("Logging to file: {}", log_file_path);
        }
        Exporter::Otlp => {
            let service_name = std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());

            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic())
                .with_trace_config(opentelemetry_sdk::trace::config().with_resource(
                    opentelemetry_sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                        "service.name",
                        service_name,
                    )]),
                ))
                .install_batch(opentelemetry_sdk::runtime::Tokio)?;

            registry
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .with(tracing_subscriber::fmt::layer())
                .try_init()?;
        }
    }

    Ok(())
}

/// Flushes pending spans. Harmless when no OTLP pipeline was installed.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
