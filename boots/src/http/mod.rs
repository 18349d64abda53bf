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
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use opentelemetry::Context;
use tokio::net::TcpListener;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::{
    config::BootsConfig, errors::TftpError, hardware::HardwareSource, job::Job,
    tftp::ArtifactStore, traceparent,
};

pub mod ipxe;

#[derive(Debug, Clone)]
pub struct HttpState {
    pub config: Arc<BootsConfig>,
    pub hardware: Arc<dyn HardwareSource>,
    pub store: ArtifactStore,
}

impl HttpState {
    pub fn new(config: Arc<BootsConfig>, hardware: Arc<dyn HardwareSource>) -> Self {
        let store = ArtifactStore::new(&config.tftp.artifact_dir);
        Self {
            config,
            hardware,
            store,
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/auto.ipxe", get(auto_ipxe))
        .route("/:name", get(artifact))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: HttpState) -> std::io::Result<()> {
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn client_ipv4(peer: SocketAddr) -> Option<Ipv4Addr> {
    match peer.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(ip) => ip.to_ipv4_mapped(),
    }
}

/// iPXE script for the machine the request comes from
async fn auto_ipxe(
    State(state): State<HttpState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let Some(ip) = client_ipv4(peer) else {
        return (StatusCode::NOT_FOUND, "no IPv4 lease for client").into_response();
    };

    let (mac, hardware) = match state.hardware.by_ip(ip).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            tracing::info!(%ip, "auto.ipxe requested by unknown client");
            return (StatusCode::NOT_FOUND, "unknown client").into_response();
        }
        Err(e) => {
            tracing::error!(%ip, "hardware lookup failed: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let job = Job::new(mac, hardware);
    let script = ipxe::render_script(&job, &state.config);
    tracing::info!(%ip, %mac, "serving auto.ipxe");

    ([(header::CONTENT_TYPE, "text/plain")], script).into_response()
}

/// Boot program for UEFI HTTP boot clients. The name may carry the trace
/// suffix added to it in the DHCP reply.
async fn artifact(
    State(state): State<HttpState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    AxumPath(name): AxumPath<String>,
) -> Response {
    let (parent, filename) = traceparent::extract_traceparent_from_filename(&Context::current(), &name);
    let span = tracing::info_span!("http", %peer, filename);
    span.set_parent(parent);

    async move {
        match state.store.read(filename).await {
            Ok(data) => {
                tracing::info!(bytes = data.len(), "serving boot artifact");
                (
                    [(header::CONTENT_TYPE, "application/octet-stream")],
                    data,
                )
                    .into_response()
            }
            Err(TftpError::InvalidPath(_)) => {
                (StatusCode::FORBIDDEN, "invalid artifact name").into_response()
            }
            Err(e) => {
                tracing::info!("boot artifact not served: {e}");
                (StatusCode::NOT_FOUND, "no such artifact").into_response()
            }
        }
    }
    .instrument(span.clone())
    .await
}
