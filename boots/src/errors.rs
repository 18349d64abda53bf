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
use std::path::PathBuf;

use mac_address::MacAddress;

use crate::boot_filename::{Architecture, Firmware};

/// Errors produced while answering a single DHCP packet.
///
/// Routine non-responses (not authoritative, packet type not answered, PXE
/// not allowed) are not errors; they are reported as an `Outcome`.
#[derive(thiserror::Error, Debug)]
pub enum DhcpError {
    #[error("No lease configured for {0}")]
    MissingLease(MacAddress),
    #[error("No boot filename for {arch} ({firmware})")]
    NoFilename {
        arch: Architecture,
        firmware: Firmware,
    },
    #[error("Unable to decode DHCP packet: {0}")]
    Decode(#[from] dhcproto::error::DecodeError),
    #[error("Unable to encode DHCP reply: {0}")]
    Encode(#[from] dhcproto::error::EncodeError),
    #[error("Invalid client hardware address: {0}")]
    InvalidMacAddress(String),
    #[error("Sending DHCP reply failed: {0}")]
    Transport(#[from] std::io::Error),
    #[error("Hardware lookup failed: {0}")]
    Hardware(#[from] HardwareError),
}

#[derive(thiserror::Error, Debug)]
pub enum HardwareError {
    #[error("Unable to read hardware file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Unable to parse hardware file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid MAC address {value} in hardware file {path}")]
    InvalidMac { path: PathBuf, value: String },
    #[error("MAC address {0} is declared by more than one hardware record")]
    DuplicateMac(MacAddress),
}

#[derive(thiserror::Error, Debug)]
pub enum TftpError {
    #[error("Packet too short: {0} bytes")]
    Truncated(usize),
    #[error("Unknown TFTP opcode {0}")]
    UnknownOpcode(u16),
    #[error("Field {0} is not a NUL terminated string")]
    UnterminatedString(&'static str),
    #[error("Field {0} is not valid UTF-8")]
    InvalidString(&'static str),
    #[error("Unsupported transfer mode {0}")]
    UnsupportedMode(String),
    #[error("Invalid artifact path {0}")]
    InvalidPath(String),
    #[error("Peer {0} stopped acknowledging")]
    Timeout(std::net::SocketAddr),
    #[error("Peer aborted transfer: {0}")]
    PeerError(String),
    #[error("TFTP I/O error: {0}")]
    Io(#[from] std::io::Error),
}
