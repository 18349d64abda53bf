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

//! The `auto.ipxe` script handed to our own iPXE build.

use crate::{
    config::BootsConfig,
    hardware::OsClass,
    job::{policy, Job},
};

/// Where the script sends the machine next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptAction {
    /// Leave iPXE and boot from the next device, usually the local disk.
    /// Carries the reason echoed on the console.
    Exit(&'static str),
    Chain(String),
}

pub fn script_action(job: &Job, config: &BootsConfig) -> ScriptAction {
    if !policy::is_pxe_allowed(job) {
        return ScriptAction::Exit("network boot is not allowed");
    }

    let Some(instance) = job.instance() else {
        return ScriptAction::Exit("no instance to install");
    };

    let target = match (job.os_class(), &instance.ipxe_script_url) {
        (OsClass::CustomIpxe, Some(url)) if !url.is_empty() => url.clone(),
        _ => {
            let Some(base) = config.installer_base_url() else {
                tracing::warn!(
                    mac = %job.mac(),
                    "no installer_base_url configured, booting from disk"
                );
                return ScriptAction::Exit("no installer configured");
            };
            format!("{base}/{}/auto.ipxe", instance.installer())
        }
    };

    // Our own auto.ipxe would hand out this very script again
    if config.is_own_url(&target) && target.trim_end_matches('/').ends_with("/auto.ipxe") {
        tracing::warn!(mac = %job.mac(), url = %target, "refusing to chain back to this daemon");
        return ScriptAction::Exit("boot script chains back to itself");
    }

    ScriptAction::Chain(target)
}

pub fn render_script(job: &Job, config: &BootsConfig) -> String {
    let facility = match job.hardware().facility_code() {
        "" => config.facility_code.as_str(),
        code => code,
    };

    let mut script = format!(
        "#!ipxe\n\nset mac {mac}\nset facility {facility}\nset plan {plan}\n",
        mac = job.mac(),
        plan = job.hardware().plan_slug(),
    );

    match script_action(job, config) {
        ScriptAction::Exit(reason) => {
            script.push_str(&format!("echo ${{mac}}: {reason}, booting from disk\n"));
            script.push_str("exit\n");
        }
        ScriptAction::Chain(url) => {
            script.push_str(&format!("chain --autofree {url}\n"));
        }
    }
    script
}
