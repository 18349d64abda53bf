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

//! Maps a client's architecture, firmware mode and boot client to the
//! second stage boot program we hand out.

use std::{fmt::Display, str::FromStr};

/// Boot program served to Huawei ARM servers, regardless of firmware mode.
pub const HUA_FILENAME: &str = "snp-hua.efi";
/// Boot program for ARM64 UEFI clients.
pub const ARM_UEFI_FILENAME: &str = "snp-nolacp.efi";
/// Boot program for x86_64 UEFI clients.
pub const X86_UEFI_FILENAME: &str = "ipxe.efi";
/// Boot program for legacy BIOS PXE ROMs.
pub const X86_BIOS_FILENAME: &str = "undionly.kpxe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86,
    Arm,
    /// Vendor specific ARM variant (Huawei) that needs its own SNP build.
    Hua,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firmware {
    Bios,
    Uefi,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownArchitecture(pub String);

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownFirmware(pub String);

impl Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::X86 => "x86",
                Self::Arm => "arm",
                Self::Hua => "hua",
            }
        )
    }
}

impl FromStr for Architecture {
    type Err = UnknownArchitecture;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "x86" => Ok(Self::X86),
            "arm" => Ok(Self::Arm),
            "hua" => Ok(Self::Hua),
            other => Err(UnknownArchitecture(other.to_string())),
        }
    }
}

impl Display for Firmware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Bios => "bios",
                Self::Uefi => "uefi",
            }
        )
    }
}

impl FromStr for Firmware {
    type Err = UnknownFirmware;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bios" => Ok(Self::Bios),
            "uefi" => Ok(Self::Uefi),
            other => Err(UnknownFirmware(other.to_string())),
        }
    }
}

/// URL of the iPXE script endpoint handed to our own iPXE build.
pub fn auto_ipxe_url(public_fqdn: &str) -> String {
    format!("http://{public_fqdn}/auto.ipxe")
}

/// Pick the boot program for a client that is allowed to PXE boot.
///
/// Our own iPXE build (detected through the DHCP user class) already runs a
/// network stack, so it gets the script URL instead of another binary.
/// Returns `None` when there is nothing suitable to boot, in which case no
/// filename must be put into the reply.
pub fn select_filename(
    arch: Architecture,
    firmware: Firmware,
    is_our_ipxe: bool,
    public_fqdn: &str,
) -> Option<String> {
    if is_our_ipxe {
        return Some(auto_ipxe_url(public_fqdn));
    }

    let filename = match (arch, firmware) {
        (Architecture::Hua, _) => HUA_FILENAME,
        (Architecture::Arm, Firmware::Uefi) => ARM_UEFI_FILENAME,
        (Architecture::X86, Firmware::Uefi) => X86_UEFI_FILENAME,
        (Architecture::X86, Firmware::Bios) => X86_BIOS_FILENAME,
        _ => return None,
    };

    Some(filename.to_string())
}
