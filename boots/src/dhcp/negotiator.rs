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

//! Decides how to answer a single DHCP packet for a known machine.

use std::sync::Arc;

use super::{
    reply::{Reply, ReplyWriter},
    request::DhcpRequest,
};
use crate::{
    boot_filename,
    config::BootsConfig,
    errors::DhcpError,
    job::{
        boot::{arch_firmware, Mismatch},
        policy, Job,
    },
    traceparent,
};

/// Why a packet was deliberately left unanswered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Only DISCOVER and REQUEST get an answer.
    NotDiscoverOrRequest,
    /// The machine may not PXE boot and has no active instance to warn.
    ///
    /// The client hears nothing. An error would not change that and would log
    /// a failure for every boot attempt of a parked machine, so this is an
    /// ordinary outcome.
    PxeNotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Another provisioner owns the hardware.
    NotAuthoritative,
    Ignored(IgnoreReason),
    Replied,
}

#[derive(Debug, Clone)]
pub struct Negotiator {
    config: Arc<BootsConfig>,
}

impl Negotiator {
    pub fn new(config: Arc<BootsConfig>) -> Self {
        Self { config }
    }

    /// Answers `request` for `job` through `writer`.
    ///
    /// Staying silent is a normal outcome and reported as `Ok`. Errors mean
    /// the reply could not be built or sent.
    pub async fn serve_dhcp(
        &self,
        job: &Job,
        request: &DhcpRequest,
        writer: &dyn ReplyWriter,
    ) -> Result<Outcome, DhcpError> {
        if !policy::are_we_provisioner(job, &self.config.provisioner_engine_name) {
            tracing::debug!(
                mac = %job.mac(),
                provisioner = job.hardware().hardware_provisioner(),
                "hardware belongs to another provisioner"
            );
            return Ok(Outcome::NotAuthoritative);
        }

        let Some(mut reply) = Reply::new(&request.packet, self.config.public_ipv4) else {
            tracing::debug!(
                mac = %job.mac(),
                message_type = ?request.message_type,
                "ignoring DHCP packet"
            );
            return Ok(Outcome::Ignored(IgnoreReason::NotDiscoverOrRequest));
        };

        let lease = job.lease().ok_or(DhcpError::MissingLease(job.mac()))?;
        reply.apply_lease(lease);

        if reply.setup_pxe(request) {
            let Some(filename) = self.pxe_filename(job, request)? else {
                tracing::info!(mac = %job.mac(), "PXE is not allowed, not answering");
                return Ok(Outcome::Ignored(IgnoreReason::PxeNotAllowed));
            };
            reply.set_filename(
                &filename,
                self.config.public_ipv4,
                request.is_http_client(),
            );
        } else {
            tracing::debug!(mac = %job.mac(), "not a PXE request, skipping boot filename");
        }

        writer.write_reply(&reply, &request.packet).await?;

        tracing::info!(
            mac = %job.mac(),
            message_type = ?reply.message_type(),
            yiaddr = %reply.packet().yiaddr(),
            filename = ?reply.filename(),
            "sent DHCP reply"
        );
        Ok(Outcome::Replied)
    }

    /// The boot filename for a PXE request, or `None` when the machine
    /// should not hear from us at all.
    fn pxe_filename(&self, job: &Job, request: &DhcpRequest) -> Result<Option<String>, DhcpError> {
        let decision = arch_firmware(job, request.packet_arch());
        for mismatch in &decision.mismatches {
            match mismatch {
                Mismatch::Arch { dhcp, job } => {
                    tracing::info!(%dhcp, %job, "arch mismatch, using dhcp")
                }
                Mismatch::Uefi { dhcp, job } => {
                    tracing::info!(dhcp, job, "uefi mismatch, using dhcp")
                }
            }
        }

        if !policy::is_pxe_allowed(job) {
            return Ok(policy::pxe_not_allowed_filename(job).map(str::to_string));
        }

        let is_our_ipxe = request.is_our_ipxe(&self.config.ipxe_user_class);
        let filename = boot_filename::select_filename(
            decision.arch,
            decision.firmware,
            is_our_ipxe,
            &self.config.public_fqdn,
        )
        .ok_or(DhcpError::NoFilename {
            arch: decision.arch,
            firmware: decision.firmware,
        })?;

        // URLs go to iPXE over HTTP and carry their own context
        if is_our_ipxe {
            Ok(Some(filename))
        } else {
            Ok(Some(traceparent::encode_current(&filename)))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{net::Ipv4Addr, path::PathBuf, sync::Mutex};

    use async_trait::async_trait;
    use dhcproto::v4::{Architecture, DhcpOption, Message, MessageType};

    use super::*;
    use crate::{
        config::{DhcpConfig, HttpConfig, TftpConfig},
        dhcp::request::tests::{discover, pxe_option},
        job::tests::job_from_yaml,
    };

    pub(crate) fn test_config() -> Arc<BootsConfig> {
        Arc::new(BootsConfig {
            provisioner_engine_name: "boots".to_string(),
            public_ipv4: Ipv4Addr::new(10, 0, 0, 2),
            public_fqdn: "boots.example.com".to_string(),
            facility_code: "sjc1".to_string(),
            hardware_file: PathBuf::from("hardware.yaml"),
            otlp_endpoint: None,
            ipxe_user_class: "Tinkerbell".to_string(),
            installer_base_url: Some("http://installers.example.com".to_string()),
            dhcp: DhcpConfig::default(),
            tftp: TftpConfig::default(),
            http: HttpConfig::default(),
        })
    }

    #[derive(Default)]
    pub(crate) struct RecordingWriter {
        pub replies: Mutex<Vec<Reply>>,
    }

    #[async_trait]
    impl ReplyWriter for RecordingWriter {
        async fn write_reply(&self, reply: &Reply, _request: &Message) -> Result<(), DhcpError> {
            self.replies.lock().unwrap().push(reply.clone());
            Ok(())
        }
    }

    struct BrokenWriter;

    #[async_trait]
    impl ReplyWriter for BrokenWriter {
        async fn write_reply(&self, _reply: &Reply, _request: &Message) -> Result<(), DhcpError> {
            Err(DhcpError::Transport(std::io::Error::new(
                std::io::ErrorKind::Other,
                "network unreachable",
            )))
        }
    }

    const LEASED: &str = r#"
  interfaces:
    - mac: "b8:3f:d2:00:00:01"
      arch: x86_64
      uefi: true
      lease: { address: 10.0.0.10/24, gateway: 10.0.0.1 }
"#;

    async fn job(extra: &str) -> Job {
        job_from_yaml(&format!("- id: host\n{extra}{LEASED}")).await
    }

    fn x86_uefi_pxe(extra: Vec<DhcpOption>) -> DhcpRequest {
        let mut options = vec![
            pxe_option("PXEClient:Arch:00007:UNDI:003016"),
            DhcpOption::ClientSystemArchitecture(Architecture::from(7u16)),
        ];
        options.extend(extra);
        DhcpRequest::from_message(discover(options)).unwrap()
    }

    async fn serve(job: &Job, request: &DhcpRequest) -> (Result<Outcome, DhcpError>, Vec<Reply>) {
        let writer = RecordingWriter::default();
        let outcome = Negotiator::new(test_config())
            .serve_dhcp(job, request, &writer)
            .await;
        let replies = writer.replies.into_inner().unwrap();
        (outcome, replies)
    }

    #[tokio::test]
    async fn it_stays_out_of_other_provisioners_hardware() {
        let job = job("  provisioner: tinkerbell\n").await;
        let (outcome, replies) = serve(&job, &x86_uefi_pxe(vec![])).await;
        assert_eq!(outcome.unwrap(), Outcome::NotAuthoritative);
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn it_ignores_non_discover_packets() {
        let job = job("").await;
        let mut packet = discover(vec![]);
        packet
            .opts_mut()
            .insert(DhcpOption::MessageType(MessageType::Release));
        let request = DhcpRequest::from_message(packet).unwrap();

        let (outcome, replies) = serve(&job, &request).await;
        assert_eq!(
            outcome.unwrap(),
            Outcome::Ignored(IgnoreReason::NotDiscoverOrRequest)
        );
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn a_missing_lease_is_a_configuration_error() {
        let job = job_from_yaml(r#"[{ id: a, interfaces: [{ mac: "b8:3f:d2:00:00:01" }] }]"#).await;
        let (outcome, replies) = serve(&job, &x86_uefi_pxe(vec![])).await;
        assert!(matches!(outcome, Err(DhcpError::MissingLease(_))));
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn allowed_x86_uefi_gets_ipxe_efi() {
        let job = job("  instance: { id: inst-a, state: provisioning, allow_pxe: true }\n").await;
        let (outcome, replies) = serve(&job, &x86_uefi_pxe(vec![])).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(replies.len(), 1);
        // No tracing subscriber is installed, so no trace suffix either
        assert_eq!(replies[0].filename().as_deref(), Some("ipxe.efi"));
        assert_eq!(replies[0].packet().siaddr(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(replies[0].packet().yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    }

    #[tokio::test]
    async fn our_ipxe_gets_the_script() {
        let job = job("  instance: { id: inst-a, allow_pxe: true }\n").await;
        let request = x86_uefi_pxe(vec![DhcpOption::UserClass(b"Tinkerbell".to_vec())]);
        let (outcome, replies) = serve(&job, &request).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(
            replies[0].filename().as_deref(),
            Some("http://boots.example.com/auto.ipxe")
        );
    }

    #[tokio::test]
    async fn active_instances_get_the_sentinel() {
        let job = job("  instance: { state: active, allow_pxe: false }\n").await;
        let (outcome, replies) = serve(&job, &x86_uefi_pxe(vec![])).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(
            replies[0].filename().as_deref(),
            Some("/pxe-is-not-allowed")
        );
    }

    #[tokio::test]
    async fn unprovisioned_hardware_that_may_not_pxe_hears_nothing() {
        let job = job("").await;
        let (outcome, replies) = serve(&job, &x86_uefi_pxe(vec![])).await;

        assert_eq!(
            outcome.unwrap(),
            Outcome::Ignored(IgnoreReason::PxeNotAllowed)
        );
        assert!(replies.is_empty());
    }

    #[tokio::test]
    async fn roms_without_an_arch_boot_as_x86_bios() {
        let job = job("  instance: { id: inst-a, allow_pxe: true }\n").await;
        let request =
            DhcpRequest::from_message(discover(vec![pxe_option("PXEClient")])).unwrap();
        let (outcome, replies) = serve(&job, &request).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(replies[0].filename().as_deref(), Some("undionly.kpxe"));
    }

    #[tokio::test]
    async fn non_pxe_requests_get_a_plain_lease() {
        let job = job("").await;
        let request = DhcpRequest::from_message(discover(vec![])).unwrap();
        let (outcome, replies) = serve(&job, &request).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(replies[0].filename(), None);
        assert_eq!(replies[0].packet().yiaddr(), Ipv4Addr::new(10, 0, 0, 10));
    }

    #[tokio::test]
    async fn http_boot_clients_get_a_url() {
        let job = job("  instance: { id: inst-a, allow_pxe: true }\n").await;
        let request = DhcpRequest::from_message(discover(vec![
            pxe_option("HTTPClient:Arch:00016:UNDI:003001"),
            DhcpOption::ClientSystemArchitecture(Architecture::from(16u16)),
        ]))
        .unwrap();
        let (outcome, replies) = serve(&job, &request).await;

        assert_eq!(outcome.unwrap(), Outcome::Replied);
        assert_eq!(
            replies[0].filename().as_deref(),
            Some("http://10.0.0.2/ipxe.efi")
        );
    }

    #[tokio::test]
    async fn transport_failures_are_reported() {
        let job = job("  instance: { id: inst-a, allow_pxe: true }\n").await;
        let outcome = Negotiator::new(test_config())
            .serve_dhcp(&job, &x86_uefi_pxe(vec![]), &BrokenWriter)
            .await;
        assert!(matches!(outcome, Err(DhcpError::Transport(_))));
    }
}
