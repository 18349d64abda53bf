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
use std::fmt::Display;

use dhcproto::v4::{DhcpOption, Message, MessageType, OptionCode};
use mac_address::MacAddress;

use super::vendor_class::VendorClass;
use crate::{errors::DhcpError, job::boot::PacketArch};

/// Client system architecture type, RFC 4578 section 2.1 and the IANA
/// registry that extends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientArch(pub u16);

impl ClientArch {
    /// Name compared against the architecture recorded in the inventory.
    pub fn name(&self) -> &'static str {
        match self.0 {
            0 | 7 | 9 | 16 => "x86_64",
            6 | 15 => "i386",
            10 | 18 => "arm",
            11 | 19 => "aarch64",
            2 => "ia64",
            _ => "",
        }
    }

    pub fn is_uefi(&self) -> bool {
        matches!(self.0, 6..=11 | 15 | 16 | 18 | 19)
    }

    pub fn is_arm(&self) -> bool {
        matches!(self.0, 10 | 11 | 18 | 19)
    }
}

impl Display for ClientArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let firmware = if self.is_uefi() { "UEFI" } else { "BIOS" };
        match self.name() {
            "" => write!(f, "arch {} {}", self.0, firmware),
            name => write!(f, "{} {}", name, firmware),
        }
    }
}

/// What the negotiator needs to know about an inbound DHCP packet.
#[derive(Debug, Clone)]
pub struct DhcpRequest {
    pub packet: Message,
    pub message_type: Option<MessageType>,
    pub mac: MacAddress,
    /// Option 93, or the architecture announced in the vendor class.
    pub arch: Option<ClientArch>,
    /// Option 60, when it parses as a PXE or HTTP boot client.
    pub vendor_class: Option<VendorClass>,
    /// Option 77.
    pub user_class: Option<String>,
    /// Option 97, echoed back verbatim.
    pub client_machine_id: Option<Vec<u8>>,
}

impl DhcpRequest {
    pub fn from_message(packet: Message) -> Result<Self, DhcpError> {
        let mac = mac_from_chaddr(packet.chaddr())?;

        let vendor_class = match packet.opts().get(OptionCode::ClassIdentifier) {
            Some(DhcpOption::ClassIdentifier(raw)) => String::from_utf8_lossy(raw).parse().ok(),
            _ => None,
        };

        let arch = match packet.opts().get(OptionCode::ClientSystemArchitecture) {
            Some(DhcpOption::ClientSystemArchitecture(arch)) => Some(ClientArch(u16::from(*arch))),
            _ => vendor_class
                .as_ref()
                .and_then(|vc: &VendorClass| vc.client_architecture),
        };

        let user_class = match packet.opts().get(OptionCode::UserClass) {
            Some(DhcpOption::UserClass(raw)) => Some(String::from_utf8_lossy(raw).into_owned()),
            _ => None,
        };

        let client_machine_id = match packet.opts().get(OptionCode::ClientMachineIdentifier) {
            Some(DhcpOption::ClientMachineIdentifier(raw)) => Some(raw.clone()),
            _ => None,
        };

        Ok(Self {
            message_type: packet.opts().msg_type(),
            mac,
            arch,
            vendor_class,
            user_class,
            client_machine_id,
            packet,
        })
    }

    /// A PXE or UEFI HTTP boot ROM is asking for something to boot.
    pub fn is_pxe(&self) -> bool {
        self.vendor_class.is_some()
    }

    pub fn is_http_client(&self) -> bool {
        self.vendor_class.as_ref().is_some_and(VendorClass::http)
    }

    /// Our own iPXE build tags its requests with a well-known user class.
    pub fn is_our_ipxe(&self, user_class: &str) -> bool {
        self.user_class.as_deref() == Some(user_class)
    }

    pub fn arch_name(&self) -> &'static str {
        self.arch.map_or("", |arch| arch.name())
    }

    pub fn is_uefi(&self) -> bool {
        self.arch.is_some_and(|arch| arch.is_uefi())
    }

    pub fn is_arm(&self) -> bool {
        self.arch.is_some_and(|arch| arch.is_arm())
    }

    pub fn packet_arch(&self) -> PacketArch<'static> {
        PacketArch {
            name: self.arch_name(),
            is_arm: self.is_arm(),
            is_uefi: self.is_uefi(),
        }
    }
}

pub fn mac_from_chaddr(chaddr: &[u8]) -> Result<MacAddress, DhcpError> {
    let bytes: [u8; 6] = chaddr
        .get(..6)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| DhcpError::InvalidMacAddress(format!("{chaddr:02x?}")))?;
    Ok(MacAddress::new(bytes))
}

#[cfg(test)]
pub(crate) mod tests {
    use dhcproto::v4::{Architecture, Opcode};

    use super::*;

    pub(crate) const CLIENT_MAC: [u8; 6] = [0xb8, 0x3f, 0xd2, 0x00, 0x00, 0x01];

    pub(crate) fn discover(options: Vec<DhcpOption>) -> Message {
        let mut msg = Message::default();
        msg.set_opcode(Opcode::BootRequest)
            .set_xid(0x1234_5678)
            .set_chaddr(&CLIENT_MAC);
        msg.opts_mut()
            .insert(DhcpOption::MessageType(MessageType::Discover));
        for opt in options {
            msg.opts_mut().insert(opt);
        }
        msg
    }

    pub(crate) fn pxe_option(vendor_class: &str) -> DhcpOption {
        DhcpOption::ClassIdentifier(vendor_class.as_bytes().to_vec())
    }

    #[test]
    fn it_reads_option_93() {
        let req = DhcpRequest::from_message(discover(vec![
            pxe_option("PXEClient:Arch:00000:UNDI:002001"),
            DhcpOption::ClientSystemArchitecture(Architecture::from(11u16)),
        ]))
        .unwrap();

        assert_eq!(req.message_type, Some(MessageType::Discover));
        assert_eq!(req.mac, MacAddress::new(CLIENT_MAC));
        assert_eq!(req.arch, Some(ClientArch(11)));
        assert_eq!(req.arch_name(), "aarch64");
        assert!(req.is_arm());
        assert!(req.is_uefi());
        assert!(req.is_pxe());
        assert!(!req.is_http_client());
    }

    #[test]
    fn it_falls_back_to_the_vendor_class_arch() {
        let req = DhcpRequest::from_message(discover(vec![pxe_option(
            "HTTPClient:Arch:00016:UNDI:003001",
        )]))
        .unwrap();

        assert_eq!(req.arch, Some(ClientArch(16)));
        assert_eq!(req.arch_name(), "x86_64");
        assert!(req.is_uefi());
        assert!(!req.is_arm());
        assert!(req.is_http_client());
    }

    #[test]
    fn non_pxe_clients_have_no_arch() {
        let req =
            DhcpRequest::from_message(discover(vec![pxe_option("udhcp 1.36.1")])).unwrap();
        assert!(!req.is_pxe());
        assert_eq!(req.arch_name(), "");
        assert!(!req.is_uefi());
    }

    #[test]
    fn it_detects_our_ipxe() {
        let req = DhcpRequest::from_message(discover(vec![
            pxe_option("PXEClient:Arch:00007:UNDI:003016"),
            DhcpOption::UserClass(b"Tinkerbell".to_vec()),
            DhcpOption::ClientMachineIdentifier(vec![0, 1, 2, 3]),
        ]))
        .unwrap();

        assert!(req.is_our_ipxe("Tinkerbell"));
        assert!(!req.is_our_ipxe("iPXE"));
        assert_eq!(req.client_machine_id, Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn arch_codes() {
        assert!(!ClientArch(0).is_uefi());
        assert!(ClientArch(7).is_uefi());
        assert!(ClientArch(9).is_uefi());
        assert!(ClientArch(10).is_arm());
        assert!(!ClientArch(7).is_arm());
        assert!(ClientArch(18).is_uefi() && ClientArch(18).is_arm());
        assert_eq!(ClientArch(6).name(), "i386");
        assert_eq!(ClientArch(2).to_string(), "ia64 BIOS");
        assert_eq!(ClientArch(42).to_string(), "arch 42 BIOS");
    }

    #[test]
    fn it_rejects_short_hardware_addresses() {
        assert!(matches!(
            mac_from_chaddr(&[1, 2, 3]),
            Err(DhcpError::InvalidMacAddress(_))
        ));
    }
}
