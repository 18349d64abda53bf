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

use mac_address::MacAddress;

use crate::hardware::{Hardware, Instance, Lease, OsClass};

pub mod boot;
pub mod policy;

/// Everything known about the machine behind one inbound request.
#[derive(Debug, Clone)]
pub struct Job {
    mac: MacAddress,
    hardware: Arc<dyn Hardware>,
}

impl Job {
    pub fn new(mac: MacAddress, hardware: Arc<dyn Hardware>) -> Self {
        Self { mac, hardware }
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn hardware(&self) -> &dyn Hardware {
        self.hardware.as_ref()
    }

    pub fn instance(&self) -> Option<&Instance> {
        self.hardware.instance()
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.hardware.lease(self.mac)
    }

    /// Architecture the inventory records for the booting interface.
    pub fn arch(&self) -> &str {
        self.hardware.hardware_arch(self.mac)
    }

    pub fn is_uefi(&self) -> bool {
        self.hardware.hardware_uefi(self.mac)
    }

    pub fn plan_arch(&self) -> &str {
        self.hardware.plan_arch()
    }

    pub fn os_class(&self) -> OsClass {
        self.instance().map_or(OsClass::Standard, Instance::os_class)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hardware::{HardwareRecord, HardwareSource, StaticHardwareSource};

    pub(crate) const MAC: &str = "b8:3f:d2:00:00:01";

    /// Builds a job from a single YAML hardware record for `MAC`.
    pub(crate) async fn job_from_yaml(record: &str) -> Job {
        let records: Vec<HardwareRecord> = serde_yaml::from_str(record).unwrap();
        let source =
            StaticHardwareSource::from_records(records, std::path::Path::new("test.yaml")).unwrap();
        let mac: MacAddress = MAC.parse().unwrap();
        let hardware = source.by_mac(mac).await.unwrap().unwrap();
        Job::new(mac, hardware)
    }

    #[tokio::test]
    async fn it_exposes_the_interface_facts() {
        let job = job_from_yaml(
            r#"
- id: host
  plan_arch: hua
  interfaces:
    - mac: "b8:3f:d2:00:00:01"
      arch: aarch64
      uefi: true
"#,
        )
        .await;

        assert_eq!(job.arch(), "aarch64");
        assert!(job.is_uefi());
        assert_eq!(job.plan_arch(), "hua");
        assert!(job.instance().is_none());
        assert!(job.lease().is_none());
        assert_eq!(job.os_class(), OsClass::Standard);
    }
}
