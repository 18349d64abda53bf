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

//! Read-only view of the hardware inventory the daemon boots.
//!
//! The negotiation logic only sees the [`Hardware`] trait. Where the records
//! come from is up to the [`HardwareSource`]; the one shipped here reads a
//! YAML inventory once at startup.

use std::{
    collections::HashMap,
    net::Ipv4Addr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use mac_address::MacAddress;
use serde::Deserialize;

use crate::errors::HardwareError;

/// Facts about one machine, as far as booting it is concerned.
pub trait Hardware: Send + Sync + std::fmt::Debug {
    /// Name of the provisioning engine that owns this machine. Empty when
    /// nobody claimed it.
    fn hardware_provisioner(&self) -> &str;
    fn hardware_allow_pxe(&self, mac: MacAddress) -> bool;
    /// Architecture the inventory expects the interface to report over DHCP.
    fn hardware_arch(&self, mac: MacAddress) -> &str;
    fn hardware_uefi(&self, mac: MacAddress) -> bool;
    /// Sub-architecture of the hardware plan, e.g. `2a2` for Huawei ARM.
    fn plan_arch(&self) -> &str;
    fn plan_slug(&self) -> &str;
    fn facility_code(&self) -> &str;
    fn lease(&self, mac: MacAddress) -> Option<&Lease>;
    fn instance(&self) -> Option<&Instance>;
}

#[async_trait]
pub trait HardwareSource: Send + Sync + std::fmt::Debug {
    async fn by_mac(&self, mac: MacAddress) -> Result<Option<Arc<dyn Hardware>>, HardwareError>;

    /// Finds the machine holding `ip` and the MAC of the interface it was
    /// leased to.
    async fn by_ip(
        &self,
        ip: Ipv4Addr,
    ) -> Result<Option<(MacAddress, Arc<dyn Hardware>)>, HardwareError>;
}

fn default_lease_time_secs() -> u32 {
    86400
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Lease {
    /// Address handed to the client, with the prefix of its segment.
    pub address: Ipv4Network,
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub nameservers: Vec<Ipv4Addr>,
    pub hostname: Option<String>,
    #[serde(default = "default_lease_time_secs")]
    pub lease_time_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interface {
    pub mac: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default)]
    pub uefi: bool,
    #[serde(default)]
    pub allow_pxe: bool,
    pub lease: Option<Lease>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct OperatingSystem {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub distro: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub allow_pxe: bool,
    /// Lifecycle state as reported by the inventory. Only `active` carries a
    /// meaning here.
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub operating_system: OperatingSystem,
    #[serde(default)]
    pub operating_system_version: OperatingSystem,
    #[serde(default)]
    pub plan_slug: String,
    pub ipxe_script_url: Option<String>,
}

/// How the operating system of an instance gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsClass {
    /// The user brings their own iPXE script.
    CustomIpxe,
    Custom,
    Vmware,
    Nixos,
    Standard,
}

impl OsClass {
    pub fn from_slug(slug: &str) -> Self {
        match slug {
            "custom_ipxe" => Self::CustomIpxe,
            "custom" => Self::Custom,
            s if s.starts_with("vmware") => Self::Vmware,
            s if s.starts_with("nixos") => Self::Nixos,
            _ => Self::Standard,
        }
    }
}

impl Instance {
    /// Slug of the OS, preferring the OS descriptor over the OS version.
    pub fn os_slug(&self) -> &str {
        if !self.operating_system.slug.is_empty() {
            &self.operating_system.slug
        } else {
            &self.operating_system_version.slug
        }
    }

    pub fn os_class(&self) -> OsClass {
        OsClass::from_slug(self.os_slug())
    }

    /// Installer responsible for this instance, used to build its boot URL.
    pub fn installer(&self) -> &str {
        match self.os_class() {
            OsClass::CustomIpxe => "custom_ipxe",
            OsClass::Custom => "custom",
            OsClass::Vmware => "vmware",
            OsClass::Nixos => "nixos",
            OsClass::Standard if !self.operating_system.distro.is_empty() => {
                self.operating_system.distro.as_str()
            }
            OsClass::Standard => self.os_slug(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HardwareRecord {
    pub id: String,
    #[serde(default)]
    pub provisioner: String,
    #[serde(default)]
    pub plan_slug: String,
    #[serde(default)]
    pub plan_arch: String,
    #[serde(default)]
    pub facility_code: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    pub instance: Option<Instance>,
    /// Interfaces keyed by parsed MAC, filled in when the record is loaded.
    #[serde(skip)]
    by_mac: HashMap<MacAddress, usize>,
}

impl HardwareRecord {
    fn interface(&self, mac: MacAddress) -> Option<&Interface> {
        self.by_mac.get(&mac).map(|i| &self.interfaces[*i])
    }

    fn index_interfaces(&mut self, path: &Path) -> Result<(), HardwareError> {
        self.by_mac.clear();
        for (i, interface) in self.interfaces.iter().enumerate() {
            let mac = MacAddress::from_str(&interface.mac).map_err(|_| {
                HardwareError::InvalidMac {
                    path: path.to_path_buf(),
                    value: interface.mac.clone(),
                }
            })?;
            if self.by_mac.insert(mac, i).is_some() {
                return Err(HardwareError::DuplicateMac(mac));
            }
        }
        Ok(())
    }
}

impl Hardware for HardwareRecord {
    fn hardware_provisioner(&self) -> &str {
        &self.provisioner
    }

    fn hardware_allow_pxe(&self, mac: MacAddress) -> bool {
        self.interface(mac).is_some_and(|i| i.allow_pxe)
    }

    fn hardware_arch(&self, mac: MacAddress) -> &str {
        self.interface(mac).map_or("", |i| i.arch.as_str())
    }

    fn hardware_uefi(&self, mac: MacAddress) -> bool {
        self.interface(mac).is_some_and(|i| i.uefi)
    }

    fn plan_arch(&self) -> &str {
        &self.plan_arch
    }

    fn plan_slug(&self) -> &str {
        &self.plan_slug
    }

    fn facility_code(&self) -> &str {
        &self.facility_code
    }

    fn lease(&self, mac: MacAddress) -> Option<&Lease> {
        self.interface(mac).and_then(|i| i.lease.as_ref())
    }

    fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }
}

/// Hardware inventory loaded from a YAML list of [`HardwareRecord`]s.
#[derive(Debug, Default)]
pub struct StaticHardwareSource {
    by_mac: HashMap<MacAddress, Arc<HardwareRecord>>,
    by_ip: HashMap<Ipv4Addr, MacAddress>,
}

impl StaticHardwareSource {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, HardwareError> {
        let path = path.as_ref();
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| HardwareError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        Self::from_yaml(&contents, path)
    }

    /// Parses an inventory. `origin` only shows up in error messages.
    pub fn from_yaml(contents: &str, origin: &Path) -> Result<Self, HardwareError> {
        let records: Vec<HardwareRecord> =
            serde_yaml::from_str(contents).map_err(|source| HardwareError::Parse {
                path: PathBuf::from(origin),
                source,
            })?;
        Self::from_records(records, origin)
    }

    pub fn from_records(
        records: Vec<HardwareRecord>,
        origin: &Path,
    ) -> Result<Self, HardwareError> {
        let mut source = Self::default();
        for mut record in records {
            record.index_interfaces(origin)?;
            let record = Arc::new(record);
            for (mac, i) in &record.by_mac {
                if source.by_mac.insert(*mac, record.clone()).is_some() {
                    return Err(HardwareError::DuplicateMac(*mac));
                }
                if let Some(lease) = &record.interfaces[*i].lease {
                    source.by_ip.insert(lease.address.ip(), *mac);
                }
            }
        }

        tracing::info!(
            machines = source.by_mac.len(),
            "Loaded hardware inventory from {}",
            origin.display()
        );
        Ok(source)
    }
}

#[async_trait]
impl HardwareSource for StaticHardwareSource {
    async fn by_mac(&self, mac: MacAddress) -> Result<Option<Arc<dyn Hardware>>, HardwareError> {
        Ok(self
            .by_mac
            .get(&mac)
            .map(|record| record.clone() as Arc<dyn Hardware>))
    }

    async fn by_ip(
        &self,
        ip: Ipv4Addr,
    ) -> Result<Option<(MacAddress, Arc<dyn Hardware>)>, HardwareError> {
        let Some(mac) = self.by_ip.get(&ip) else {
            return Ok(None);
        };
        Ok(self
            .by_mac
            .get(mac)
            .map(|record| (*mac, record.clone() as Arc<dyn Hardware>)))
    }
}
