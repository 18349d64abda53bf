/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::env;

use opentelemetry::{
    global,
    trace::{TraceError, TracerProvider as _},
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace as sdktrace, Resource};
use opentelemetry_semantic_conventions as semcov;
use tracing_subscriber::{filter::EnvFilter, filter::LevelFilter, fmt, prelude::*};

const SERVICE_NAME: &str = "carbide-boots";
const SERVICE_NAMESPACE: &str = "forge-system";

fn service_resource() -> Resource {
    Resource::new(vec![
        KeyValue::new(semcov::resource::SERVICE_NAME, SERVICE_NAME),
        KeyValue::new(semcov::resource::SERVICE_NAMESPACE, SERVICE_NAMESPACE),
    ])
}

fn init_otlp_tracer(endpoint: &str) -> Result<sdktrace::Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(sdktrace::config().with_resource(service_resource()))
        .install_batch(runtime::Tokio)
}

/// Tracer that records spans without exporting them. Spans still get real
/// trace and span ids, which is what boot filenames carry between DHCP and
/// TFTP.
fn init_local_tracer() -> sdktrace::Tracer {
    let provider = sdktrace::TracerProvider::builder()
        .with_config(sdktrace::config().with_resource(service_resource()))
        .build();
    let tracer = provider.tracer(SERVICE_NAME);
    let _ = global::set_tracer_provider(provider);
    tracer
}

/// Installs the global `tracing` subscriber. Must run inside the tokio
/// runtime when `otlp_endpoint` is set.
pub fn setup_logging(debug: u8, otlp_endpoint: Option<&str>) -> eyre::Result<()> {
    let mut global_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    if debug != 0 {
        env::set_var("RUST_BACKTRACE", "1");
        global_filter = global_filter.add_directive(
            match debug {
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
            .into(),
        );
    }
    global_filter = global_filter
        .add_directive("h2=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower=warn".parse()?);

    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = match otlp_endpoint {
        Some(endpoint) => init_otlp_tracer(endpoint)?,
        None => init_local_tracer(),
    };

    let telemetry = tracing_opentelemetry::layer()
        .with_exception_fields(true)
        .with_threads(false)
        .with_tracer(tracer);

    let stdout_formatter = fmt::Layer::default()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(global_filter)
        .with(stdout_formatter)
        .with(telemetry)
        .try_init()?;

    if let Some(endpoint) = otlp_endpoint {
        tracing::info!("Sending tracing data to {endpoint}");
    }
    Ok(())
}

/// Flushes spans still queued for export.
pub fn shutdown() {
    global::shutdown_tracer_provider();
}
