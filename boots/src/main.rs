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
use std::sync::Arc;

use boots::{
    config::parse_boots_config,
    dhcp::{server::create_udp_socket, DhcpServer},
    hardware::{HardwareSource, StaticHardwareSource},
    http::{self, HttpState},
    logging,
    tftp::TftpServer,
};
use eyre::WrapErr;
use tokio::net::{TcpListener, UdpSocket};

mod command_line;

use command_line::Options;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let options = Options::load();
    if options.version {
        println!("{} {}", env!("CARGO_BIN_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = options
        .config
        .ok_or_else(|| eyre::eyre!("--config is required"))?;
    let config = parse_boots_config(&config_path)?;
    logging::setup_logging(options.debug, config.otlp_endpoint.as_deref())?;

    let hardware: Arc<dyn HardwareSource> = Arc::new(
        StaticHardwareSource::load(&config.hardware_file)
            .await
            .wrap_err("Failed to load hardware inventory")?,
    );

    let dhcp_socket = create_udp_socket(&config.dhcp)
        .wrap_err_with(|| format!("Failed to bind DHCP socket on {}", config.dhcp.listen))?;
    let tftp_socket = UdpSocket::bind(config.tftp.listen)
        .await
        .wrap_err_with(|| format!("Failed to bind TFTP socket on {}", config.tftp.listen))?;
    let http_listener = TcpListener::bind(config.http.listen)
        .await
        .wrap_err_with(|| format!("Failed to bind HTTP listener on {}", config.http.listen))?;

    let dhcp = Arc::new(DhcpServer::new(config.clone(), hardware.clone()));
    let tftp = Arc::new(TftpServer::new(&config.tftp));
    let http_state = HttpState::new(config.clone(), hardware);

    tracing::info!(
        provisioner = %config.provisioner_engine_name,
        public_ipv4 = %config.public_ipv4,
        public_fqdn = %config.public_fqdn,
        "carbide-boots starting"
    );

    let result = tokio::select! {
        res = dhcp.run(dhcp_socket) => res.wrap_err("DHCP server failed"),
        res = tftp.run(tftp_socket) => res.wrap_err("TFTP server failed"),
        res = http::serve(http_listener, http_state) => res.wrap_err("HTTP server failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    logging::shutdown();
    result
}
