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
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use opentelemetry::Context;
use tokio::net::UdpSocket;
use tracing::Instrument;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{
    artifacts::ArtifactStore,
    packet::{ErrorCode, Mode, Packet, Request},
};
use crate::{config::TftpConfig, errors::TftpError, traceparent};

const DEFAULT_BLOCK_SIZE: u16 = 512;
const MIN_BLOCK_SIZE: u16 = 8;
const MAX_BLOCK_SIZE: u16 = 65464;
/// Largest request we accept. Requests are a name plus a few options.
const MAX_REQUEST_SIZE: usize = 1024;

/// What we agreed on with the client for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub block_size: u16,
    /// Options to confirm in an OACK. Empty when no OACK is due.
    pub acknowledged: Vec<(String, String)>,
}

/// Applies the `blksize` (RFC 2348) and `tsize` (RFC 2349) options of
/// `request`. Unknown or unparsable options are left out of the OACK, which
/// tells the client they were not accepted.
pub fn negotiate(request: &Request, file_size: u64, max_block_size: u16) -> Negotiated {
    let mut negotiated = Negotiated {
        block_size: DEFAULT_BLOCK_SIZE,
        acknowledged: Vec::new(),
    };

    for (key, value) in &request.options {
        match key.to_ascii_lowercase().as_str() {
            "blksize" => {
                let Ok(requested) = value.parse::<u32>() else {
                    continue;
                };
                if requested < u32::from(MIN_BLOCK_SIZE) {
                    continue;
                }
                let upper = max_block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
                let size = requested.min(u32::from(upper)) as u16;
                negotiated.block_size = size;
                negotiated
                    .acknowledged
                    .push((key.clone(), size.to_string()));
            }
            "tsize" => {
                negotiated
                    .acknowledged
                    .push((key.clone(), file_size.to_string()));
            }
            _ => {}
        }
    }

    negotiated
}

/// Converts file content to netascii (RFC 764): line feeds become CR LF and
/// a bare CR becomes CR NUL.
pub fn netascii(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 16);
    for byte in data {
        match byte {
            b'\n' => out.extend_from_slice(b"\r\n"),
            b'\r' => out.extend_from_slice(b"\r\0"),
            other => out.push(*other),
        }
    }
    out
}

/// Read-only TFTP server for boot artifacts.
#[derive(Debug)]
pub struct TftpServer {
    store: ArtifactStore,
    timeout: Duration,
    retries: u32,
    max_block_size: u16,
}

impl TftpServer {
    pub fn new(config: &TftpConfig) -> Self {
        Self {
            store: ArtifactStore::new(&config.artifact_dir),
            timeout: config.timeout(),
            retries: config.retries,
            max_block_size: config.max_block_size,
        }
    }

    /// Serves requests arriving on `socket` until receiving from it fails.
    /// Problems with a single peer never end the loop.
    pub async fn run(self: Arc<Self>, socket: UdpSocket) -> Result<(), TftpError> {
        let local_ip = socket.local_addr()?.ip();
        tracing::info!(
            "TFTP server listening on {}, serving {}",
            socket.local_addr()?,
            self.store.root().display()
        );

        loop {
            let mut buf = vec![0u8; MAX_REQUEST_SIZE];
            let (len, peer) = socket.recv_from(&mut buf).await?;
            self.clone()
                .dispatch(&socket, local_ip, &buf[..len], peer)
                .await;
        }
    }

    /// Starts a transfer for a read request. Anything else arriving on the
    /// listening port is answered with an error right away.
    async fn dispatch(
        self: Arc<Self>,
        socket: &UdpSocket,
        local_ip: IpAddr,
        datagram: &[u8],
        peer: SocketAddr,
    ) {
        let reply = match Packet::parse(datagram) {
            Ok(Packet::Rrq(request)) => {
                tokio::spawn(async move {
                    self.serve_read(local_ip, peer, request).await;
                });
                return;
            }
            Ok(Packet::Wrq(request)) => {
                tracing::info!(%peer, filename = %request.filename, "refusing TFTP write");
                Packet::error(ErrorCode::AccessViolation, "read only server")
            }
            Ok(other) => {
                tracing::debug!(%peer, ?other, "unexpected TFTP packet on the listening port");
                Packet::error(ErrorCode::UnknownTransferId, "no transfer in progress")
            }
            Err(e) => {
                tracing::debug!(%peer, "malformed TFTP packet: {e}");
                Packet::error(ErrorCode::IllegalOperation, e.to_string())
            }
        };

        if let Err(e) = socket.send_to(&reply.to_bytes(), peer).await {
            tracing::warn!(%peer, "failed to send TFTP error: {e}");
        }
    }

    /// Runs one read transfer from a fresh socket, continuing the trace the
    /// DHCP reply started when the filename carries one.
    async fn serve_read(&self, local_ip: IpAddr, peer: SocketAddr, request: Request) {
        let (parent, filename) =
            traceparent::extract_traceparent_from_filename(&Context::current(), &request.filename);
        let span = tracing::info_span!("tftp", %peer, filename);
        span.set_parent(parent);

        let result = self
            .transfer(local_ip, peer, filename, &request)
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        match result {
            Ok(bytes) => tracing::info!(bytes, "TFTP transfer complete"),
            Err(e) => tracing::warn!("TFTP transfer failed: {e}"),
        }
    }

    async fn transfer(
        &self,
        local_ip: IpAddr,
        peer: SocketAddr,
        filename: &str,
        request: &Request,
    ) -> Result<usize, TftpError> {
        let socket = UdpSocket::bind(SocketAddr::new(local_ip, 0)).await?;
        socket.connect(peer).await?;

        let data = match self.store.read(filename).await {
            Ok(data) if request.mode == Mode::Netascii => netascii(&data),
            Ok(data) => data,
            Err(e) => {
                let code = match &e {
                    TftpError::InvalidPath(_) => ErrorCode::AccessViolation,
                    _ => ErrorCode::FileNotFound,
                };
                socket
                    .send(&Packet::error(code, e.to_string()).to_bytes())
                    .await?;
                return Err(e);
            }
        };

        let negotiated = negotiate(request, data.len() as u64, self.max_block_size);
        if !negotiated.acknowledged.is_empty() {
            let oack = Packet::Oack {
                options: negotiated.acknowledged.clone(),
            };
            self.send_and_wait(&socket, peer, &oack, 0).await?;
        }

        let block_size = usize::from(negotiated.block_size);
        let mut block: u16 = 0;
        let mut chunks = data.chunks(block_size);
        loop {
            block = block.wrapping_add(1);
            let chunk = chunks.next().unwrap_or_default();
            let packet = Packet::Data {
                block,
                data: chunk.to_vec(),
            };
            self.send_and_wait(&socket, peer, &packet, block).await?;

            // A short block ends the transfer, which can be an empty one
            if chunk.len() < block_size {
                break;
            }
        }

        Ok(data.len())
    }

    /// Sends `packet` until the client acknowledges `block`.
    async fn send_and_wait(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        packet: &Packet,
        block: u16,
    ) -> Result<(), TftpError> {
        let bytes = packet.to_bytes();
        let mut buf = vec![0u8; MAX_REQUEST_SIZE];

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(block, attempt, "resending TFTP block");
            }
            socket.send(&bytes).await?;

            let deadline = tokio::time::Instant::now() + self.timeout;
            loop {
                let received = tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await;
                let Ok(received) = received else {
                    break;
                };
                match Packet::parse(&buf[..received?]) {
                    Ok(Packet::Ack { block: acked }) if acked == block => return Ok(()),
                    // Duplicate ACKs are not answered, see RFC 1123 4.2.3.1
                    Ok(Packet::Ack { .. }) => continue,
                    Ok(Packet::Error { message, .. }) => return Err(TftpError::PeerError(message)),
                    Ok(other) => tracing::debug!(?other, "ignoring unexpected TFTP packet"),
                    Err(e) => tracing::debug!("ignoring malformed TFTP packet: {e}"),
                }
            }
        }

        Err(TftpError::Timeout(peer))
    }
}
