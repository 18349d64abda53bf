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

//! Who answers for a machine, and whether it may network boot right now.

use super::Job;

/// Boot filename that does not exist. Handing it out makes the boot ROM
/// give up on PXE right away instead of waiting for ProxyDHCP offers.
pub const PXE_NOT_ALLOWED_FILENAME: &str = "/pxe-is-not-allowed";

const INSTANCE_STATE_ACTIVE: &str = "active";

/// Several provisioners can share a broadcast domain. Only the one named by
/// the hardware answers for it; unclaimed hardware is answered by everyone.
pub fn are_we_provisioner(job: &Job, engine_name: &str) -> bool {
    let provisioner = job.hardware().hardware_provisioner();
    provisioner.is_empty() || provisioner == engine_name
}

pub fn is_pxe_allowed(job: &Job) -> bool {
    if job.hardware().hardware_allow_pxe(job.mac()) {
        return true;
    }

    // An instance without an id is a placeholder, not an assignment
    job.instance()
        .is_some_and(|instance| !instance.id.is_empty() && instance.allow_pxe)
}

/// Filename for a machine that is not allowed to PXE boot.
///
/// Only an active instance gets the sentinel, so it falls back to its disk
/// without stalling. Anything else gets no answer at all.
pub fn pxe_not_allowed_filename(job: &Job) -> Option<&'static str> {
    match job.instance() {
        Some(instance) if instance.state == INSTANCE_STATE_ACTIVE => {
            Some(PXE_NOT_ALLOWED_FILENAME)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::tests::job_from_yaml;

    #[tokio::test]
    async fn unclaimed_hardware_is_ours() {
        let job = job_from_yaml(r#"[{ id: a, interfaces: [{ mac: "b8:3f:d2:00:00:01" }] }]"#).await;
        assert!(are_we_provisioner(&job, "boots"));
        assert!(are_we_provisioner(&job, "someone-else"));
        assert!(are_we_provisioner(&job, ""));
    }

    #[tokio::test]
    async fn claimed_hardware_is_only_answered_by_its_owner() {
        let job = job_from_yaml(
            r#"[{ id: a, provisioner: boots, interfaces: [{ mac: "b8:3f:d2:00:00:01" }] }]"#,
        )
        .await;
        assert!(are_we_provisioner(&job, "boots"));
        assert!(!are_we_provisioner(&job, "tinkerbell"));
    }

    #[tokio::test]
    async fn no_instance_and_no_flag_is_not_allowed() {
        let job = job_from_yaml(r#"[{ id: a, interfaces: [{ mac: "b8:3f:d2:00:00:01" }] }]"#).await;
        assert!(!is_pxe_allowed(&job));
        assert_eq!(pxe_not_allowed_filename(&job), None);
    }

    #[tokio::test]
    async fn the_hardware_flag_allows_pxe() {
        let job = job_from_yaml(
            r#"
- id: a
  interfaces: [{ mac: "b8:3f:d2:00:00:01", allow_pxe: true }]
  instance: { state: active, allow_pxe: false }
"#,
        )
        .await;
        assert!(is_pxe_allowed(&job));
    }

    #[tokio::test]
    async fn the_instance_flag_allows_pxe() {
        let job = job_from_yaml(
            r#"
- id: a
  interfaces: [{ mac: "b8:3f:d2:00:00:01" }]
  instance: { id: inst-a, state: provisioning, allow_pxe: true }
"#,
        )
        .await;
        assert!(is_pxe_allowed(&job));
    }

    #[tokio::test]
    async fn an_instance_without_an_id_does_not_count() {
        let job = job_from_yaml(
            r#"
- id: a
  interfaces: [{ mac: "b8:3f:d2:00:00:01" }]
  instance: { state: provisioning, allow_pxe: true }
"#,
        )
        .await;
        assert!(!is_pxe_allowed(&job));
    }

    #[tokio::test]
    async fn active_instances_get_the_sentinel() {
        let job = job_from_yaml(
            r#"
- id: a
  interfaces: [{ mac: "b8:3f:d2:00:00:01" }]
  instance: { state: active }
"#,
        )
        .await;
        assert!(!is_pxe_allowed(&job));
        assert_eq!(
            pxe_not_allowed_filename(&job),
            Some("/pxe-is-not-allowed")
        );
    }

    #[tokio::test]
    async fn other_states_stay_silent() {
        for state in ["provisioning", "deprovisioning", "Active", ""] {
            let job = job_from_yaml(&format!(
                r#"
- id: a
  interfaces: [{{ mac: "b8:3f:d2:00:00:01" }}]
  instance: {{ state: "{state}" }}
"#
            ))
            .await;
            assert_eq!(pxe_not_allowed_filename(&job), None, "{state}");
        }
    }
}
