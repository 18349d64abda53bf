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
use super::Job;
use crate::boot_filename::{Architecture, Firmware};

/// Architecture signals carried by the DHCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketArch<'a> {
    /// Empty when the packet names no architecture.
    pub name: &'a str,
    pub is_arm: bool,
    pub is_uefi: bool,
}

/// The packet disagreed with the inventory. The packet always wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    Arch { dhcp: String, job: String },
    Uefi { dhcp: bool, job: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchFirmware {
    pub arch: Architecture,
    pub firmware: Firmware,
    pub mismatches: Vec<Mismatch>,
}

pub fn arch_firmware(job: &Job, packet: PacketArch<'_>) -> ArchFirmware {
    let mut mismatches = Vec::new();
    let mut arch = Architecture::X86;

    if packet.name != job.arch() {
        mismatches.push(Mismatch::Arch {
            dhcp: packet.name.to_string(),
            job: job.arch().to_string(),
        });
    }

    if packet.is_arm {
        arch = match job.plan_arch() {
            "2a2" | "hua" => Architecture::Hua,
            _ => Architecture::Arm,
        };
    }

    if packet.is_uefi != job.is_uefi() {
        mismatches.push(Mismatch::Uefi {
            dhcp: packet.is_uefi,
            job: job.is_uefi(),
        });
    }

    let firmware = if packet.is_uefi {
        Firmware::Uefi
    } else {
        Firmware::Bios
    };

    ArchFirmware {
        arch,
        firmware,
        mismatches,
    }
}
