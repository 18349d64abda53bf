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
    net::{Ipv4Addr, SocketAddrV4},
    sync::Arc,
};

use async_trait::async_trait;
use dhcproto::v4::{DhcpOption, Encodable, Encoder, Message, MessageType, Opcode};
use tokio::net::UdpSocket;

use super::request::DhcpRequest;
use crate::{errors::DhcpError, hardware::Lease};

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

/// PXE discovery control (vendor option 43, sub-option 6): skip boot server
/// discovery and boot the file named in the reply.
const PXE_DISCOVERY_CONTROL: [u8; 4] = [6, 1, 8, 255];

/// A reply under construction.
#[derive(Debug, Clone)]
pub struct Reply {
    packet: Message,
}

impl Reply {
    /// Starts the answer to `request`. Only DISCOVER and REQUEST are
    /// answered; anything else yields `None`.
    pub fn new(request: &Message, server_ip: Ipv4Addr) -> Option<Self> {
        let message_type = match request.opts().msg_type()? {
            MessageType::Discover => MessageType::Offer,
            MessageType::Request => MessageType::Ack,
            _ => return None,
        };

        let mut packet = Message::default();
        packet
            .set_opcode(Opcode::BootReply)
            .set_htype(request.htype())
            .set_xid(request.xid())
            .set_flags(request.flags())
            .set_giaddr(request.giaddr())
            .set_chaddr(request.chaddr());
        packet
            .opts_mut()
            .insert(DhcpOption::MessageType(message_type));
        packet
            .opts_mut()
            .insert(DhcpOption::ServerIdentifier(server_ip));

        Some(Self { packet })
    }

    pub fn packet(&self) -> &Message {
        &self.packet
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.packet.opts().msg_type()
    }

    pub fn apply_lease(&mut self, lease: &Lease) {
        self.packet.set_yiaddr(lease.address.ip());

        let opts = self.packet.opts_mut();
        opts.insert(DhcpOption::SubnetMask(lease.address.mask()));
        if let Some(gateway) = lease.gateway {
            opts.insert(DhcpOption::Router(vec![gateway]));
        }
        if !lease.nameservers.is_empty() {
            opts.insert(DhcpOption::DomainNameServer(lease.nameservers.clone()));
        }
        if let Some(hostname) = &lease.hostname {
            opts.insert(DhcpOption::Hostname(hostname.clone()));
        }
        opts.insert(DhcpOption::AddressLeaseTime(lease.lease_time_secs));
        opts.insert(DhcpOption::Renewal(lease.lease_time_secs / 2));
        opts.insert(DhcpOption::Rebinding(
            (u64::from(lease.lease_time_secs) * 7 / 8) as u32,
        ));
    }

    /// Echoes the PXE identification options back to a boot ROM. Returns
    /// false, leaving the reply alone, when the request is not a PXE boot.
    pub fn setup_pxe(&mut self, request: &DhcpRequest) -> bool {
        let Some(vendor_class) = &request.vendor_class else {
            return false;
        };

        let opts = self.packet.opts_mut();
        opts.insert(DhcpOption::ClassIdentifier(
            vendor_class.client_type.as_str().as_bytes().to_vec(),
        ));
        if let Some(id) = &request.client_machine_id {
            opts.insert(DhcpOption::ClientMachineIdentifier(id.clone()));
        }
        opts.insert(DhcpOption::VendorExtensions(PXE_DISCOVERY_CONTROL.to_vec()));

        true
    }

    /// Points the client at its boot file, served from `next_server`.
    ///
    /// UEFI HTTP boot clients need a URL, so a bare artifact name is turned
    /// into one.
    pub fn set_filename(&mut self, filename: &str, next_server: Ipv4Addr, http_client: bool) {
        self.packet.set_siaddr(next_server);

        if http_client && !filename.contains("://") {
            let filename = filename.trim_start_matches('/');
            self.packet
                .set_fname_str(format!("http://{next_server}/{filename}"));
        } else {
            self.packet.set_fname_str(filename);
        }
    }

    pub fn filename(&self) -> Option<String> {
        self.packet
            .fname()
            .map(|f| String::from_utf8_lossy(f).trim_end_matches('\0').to_string())
            .filter(|f| !f.is_empty())
    }

    pub fn encode(&self) -> Result<Vec<u8>, DhcpError> {
        let mut buf = Vec::default();
        let mut e = Encoder::new(&mut buf);
        self.packet.encode(&mut e)?;
        Ok(buf)
    }
}

/// Where the answer to `request` has to go.
pub fn destination(request: &Message) -> SocketAddrV4 {
    if !request.giaddr().is_unspecified() {
        SocketAddrV4::new(request.giaddr(), SERVER_PORT)
    } else if !request.ciaddr().is_unspecified() {
        SocketAddrV4::new(request.ciaddr(), CLIENT_PORT)
    } else {
        SocketAddrV4::new(Ipv4Addr::BROADCAST, CLIENT_PORT)
    }
}

/// Transmits finished replies.
#[async_trait]
pub trait ReplyWriter: Send + Sync {
    async fn write_reply(&self, reply: &Reply, request: &Message) -> Result<(), DhcpError>;
}

#[derive(Debug, Clone)]
pub struct UdpReplyWriter {
    socket: Arc<UdpSocket>,
}

impl UdpReplyWriter {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

#[async_trait]
impl ReplyWriter for UdpReplyWriter {
    async fn write_reply(&self, reply: &Reply, request: &Message) -> Result<(), DhcpError> {
        let buf = reply.encode()?;
        let dst = destination(request);
        self.socket.send_to(&buf, dst).await?;
        tracing::debug!(%dst, bytes = buf.len(), "sent DHCP reply");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dhcproto::v4::{Decodable, Decoder, OptionCode};

    use super::*;
    use crate::dhcp::request::tests::{discover, pxe_option};

    const SERVER: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    fn lease() -> Lease {
        Lease {
            address: "10.0.0.10/24".parse().unwrap(),
            gateway: Some(Ipv4Addr::new(10, 0, 0, 1)),
            nameservers: vec![Ipv4Addr::new(10, 0, 0, 3)],
            hostname: Some("host-1".to_string()),
            lease_time_secs: 3600,
        }
    }

    #[test]
    fn it_answers_discover_with_offer() {
        let request = discover(vec![]);
        let reply = Reply::new(&request, SERVER).unwrap();

        assert_eq!(reply.message_type(), Some(MessageType::Offer));
        assert_eq!(reply.packet().opcode(), Opcode::BootReply);
        assert_eq!(reply.packet().xid(), request.xid());
        assert_eq!(reply.packet().chaddr(), request.chaddr());
        assert!(matches!(
            reply.packet().opts().get(OptionCode::ServerIdentifier),
            Some(DhcpOption::ServerIdentifier(ip)) if *ip == SERVER
        ));
    }

    #[test]
    fn it_answers_request_with_ack() {
        let mut request = discover(vec![]);
        request
            .opts_mut()
            .insert(DhcpOption::MessageType(MessageType::Request));
        let reply = Reply::new(&request, SERVER).unwrap();
        assert_eq!(reply.message_type(), Some(MessageType::Ack));
    }

    #[test]
    fn it_ignores_other_message_types() {
        for message_type in [MessageType::Release, MessageType::Inform, MessageType::Decline] {
            let mut request = discover(vec![]);
            request
                .opts_mut()
                .insert(DhcpOption::MessageType(message_type));
            assert!(Reply::new(&request, SERVER).is_none());
        }
    }

    #[test]
    fn it_applies_the_lease() {
        let mut reply = Reply::new(&discover(vec![]), SERVER).unwrap();
        reply.apply_lease(&lease());

        let packet = reply.packet();
        assert_eq!(packet.yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
        assert!(matches!(
            packet.opts().get(OptionCode::SubnetMask),
            Some(DhcpOption::SubnetMask(mask)) if *mask == Ipv4Addr::new(255, 255, 255, 0)
        ));
        assert!(matches!(
            packet.opts().get(OptionCode::Renewal),
            Some(DhcpOption::Renewal(1800))
        ));
        assert!(matches!(
            packet.opts().get(OptionCode::Rebinding),
            Some(DhcpOption::Rebinding(3150))
        ));
        assert!(matches!(
            packet.opts().get(OptionCode::Hostname),
            Some(DhcpOption::Hostname(h)) if h == "host-1"
        ));
    }

    #[test]
    fn it_echoes_pxe_options() {
        let request = DhcpRequest::from_message(discover(vec![
            pxe_option("PXEClient:Arch:00007:UNDI:003016"),
            DhcpOption::ClientMachineIdentifier(vec![0, 9, 8]),
        ]))
        .unwrap();
        let mut reply = Reply::new(&request.packet, SERVER).unwrap();

        assert!(reply.setup_pxe(&request));
        let opts = reply.packet().opts();
        assert!(matches!(
            opts.get(OptionCode::ClassIdentifier),
            Some(DhcpOption::ClassIdentifier(v)) if v.as_slice() == b"PXEClient"
        ));
        assert!(matches!(
            opts.get(OptionCode::ClientMachineIdentifier),
            Some(DhcpOption::ClientMachineIdentifier(v)) if *v == vec![0, 9, 8]
        ));
    }

    #[test]
    fn setup_pxe_skips_other_clients() {
        let request = DhcpRequest::from_message(discover(vec![])).unwrap();
        let mut reply = Reply::new(&request.packet, SERVER).unwrap();
        assert!(!reply.setup_pxe(&request));
        assert!(reply
            .packet()
            .opts()
            .get(OptionCode::ClassIdentifier)
            .is_none());
    }

    #[test]
    fn http_clients_get_a_url() {
        let mut reply = Reply::new(&discover(vec![]), SERVER).unwrap();
        reply.set_filename("ipxe.efi", SERVER, true);
        assert_eq!(reply.filename().as_deref(), Some("http://10.0.0.2/ipxe.efi"));
        assert_eq!(reply.packet().siaddr(), SERVER);

        reply.set_filename("http://boots.example.com/auto.ipxe", SERVER, true);
        assert_eq!(
            reply.filename().as_deref(),
            Some("http://boots.example.com/auto.ipxe")
        );

        reply.set_filename("undionly.kpxe", SERVER, false);
        assert_eq!(reply.filename().as_deref(), Some("undionly.kpxe"));
    }

    #[test]
    fn replies_survive_the_wire() {
        let mut reply = Reply::new(&discover(vec![]), SERVER).unwrap();
        reply.apply_lease(&lease());
        reply.set_filename("undionly.kpxe", SERVER, false);

        let buf = reply.encode().unwrap();
        let decoded = Message::decode(&mut Decoder::new(&buf)).unwrap();
        assert_eq!(decoded.opts().msg_type(), Some(MessageType::Offer));
        assert_eq!(decoded.yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    }

    #[test]
    fn reply_addressing() {
        let mut request = discover(vec![]);
        assert_eq!(
            destination(&request),
            SocketAddrV4::new(Ipv4Addr::BROADCAST, 68)
        );

        request.set_ciaddr(Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(
            destination(&request),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 10), 68)
        );

        request.set_giaddr(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(
            destination(&request),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 67)
        );
    }
}
