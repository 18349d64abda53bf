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
use std::{net::SocketAddr, sync::Arc};

use dhcproto::v4::{Decodable, Decoder, Message, Opcode};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::Instrument;

use super::{
    negotiator::{Negotiator, Outcome},
    reply::{ReplyWriter, UdpReplyWriter},
    request::DhcpRequest,
};
use crate::{
    config::{BootsConfig, DhcpConfig},
    errors::DhcpError,
    hardware::HardwareSource,
    job::Job,
};

const MAX_DHCP_PACKET: usize = 1500;

pub fn create_udp_socket(config: &DhcpConfig) -> Result<UdpSocket, std::io::Error> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    if let Some(interface) = &config.interface {
        socket.bind_device(Some(interface.as_bytes()))?;
    }
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&config.listen.into())?;

    UdpSocket::from_std(socket.into())
}

#[derive(Debug)]
pub struct DhcpServer {
    hardware: Arc<dyn HardwareSource>,
    negotiator: Negotiator,
}

impl DhcpServer {
    pub fn new(config: Arc<BootsConfig>, hardware: Arc<dyn HardwareSource>) -> Self {
        Self {
            hardware,
            negotiator: Negotiator::new(config),
        }
    }

    /// Serves DHCP on `socket` until reading from it fails.
    pub async fn run(self: Arc<Self>, socket: UdpSocket) -> Result<(), DhcpError> {
        let socket = Arc::new(socket);
        let writer: Arc<dyn ReplyWriter> = Arc::new(UdpReplyWriter::new(socket.clone()));
        tracing::info!("DHCP server listening on {}", socket.local_addr()?);

        loop {
            let mut buf = vec![0u8; MAX_DHCP_PACKET];
            let (len, peer) = socket.recv_from(&mut buf).await?;
            buf.truncate(len);

            let server = self.clone();
            let writer = writer.clone();
            let span = tracing::info_span!(
                "dhcp",
                %peer,
                mac = tracing::field::Empty,
                xid = tracing::field::Empty,
            );
            tokio::spawn(
                async move {
                    server.handle_datagram_logged(&buf, peer, writer.as_ref()).await;
                }
                .instrument(span),
            );
        }
    }

    async fn handle_datagram_logged(&self, buf: &[u8], peer: SocketAddr, writer: &dyn ReplyWriter) {
        match self.handle_datagram(buf, writer).await {
            Ok(Some(outcome)) => tracing::debug!(?outcome, "DHCP packet handled"),
            Ok(None) => {}
            Err(DhcpError::Decode(e)) => {
                tracing::debug!(%peer, "dropping undecodable DHCP packet: {e}")
            }
            Err(e) => tracing::error!(%peer, "failed to answer DHCP packet: {e}"),
        }
    }

    /// Answers one datagram. `None` means the packet was dropped before
    /// negotiation: not a BOOTREQUEST, or hardware we know nothing about.
    pub async fn handle_datagram(
        &self,
        buf: &[u8],
        writer: &dyn ReplyWriter,
    ) -> Result<Option<Outcome>, DhcpError> {
        let packet = Message::decode(&mut Decoder::new(buf))?;
        if packet.opcode() != Opcode::BootRequest {
            return Ok(None);
        }

        let request = DhcpRequest::from_message(packet)?;
        let span = tracing::Span::current();
        span.record("mac", tracing::field::display(request.mac));
        span.record(
            "xid",
            tracing::field::display(format!("{:#010x}", request.packet.xid())),
        );

        let Some(hardware) = self.hardware.by_mac(request.mac).await? else {
            tracing::debug!(mac = %request.mac, "no hardware for MAC, ignoring");
            return Ok(None);
        };

        let job = Job::new(request.mac, hardware);
        self.negotiator
            .serve_dhcp(&job, &request, writer)
            .await
            .map(Some)
    }
}
