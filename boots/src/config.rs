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
    net::{Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use eyre::WrapErr;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "CARBIDE_BOOTS_";

/// carbide-boots configuration file content
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct BootsConfig {
    /// Name this daemon answers to when hardware names its provisioner
    #[serde(default = "default_provisioner_engine_name")]
    pub provisioner_engine_name: String,

    /// Address clients reach us on. Used as DHCP server identifier and
    /// next-server.
    pub public_ipv4: Ipv4Addr,

    /// Host name clients reach the HTTP server on
    pub public_fqdn: String,

    /// Facility this daemon serves, passed on to iPXE scripts
    #[serde(default)]
    pub facility_code: String,

    /// YAML hardware inventory
    pub hardware_file: PathBuf,

    /// OTLP collector to send traces to. Traces stay local when unset.
    pub otlp_endpoint: Option<String>,

    /// DHCP user class announced by our own iPXE build
    #[serde(default = "default_ipxe_user_class")]
    pub ipxe_user_class: String,

    /// Where installers publish their `auto.ipxe` scripts. Must be another
    /// host, this daemon only serves its own `auto.ipxe` and flat artifacts.
    /// Without it, machines that need an installer boot from disk.
    pub installer_base_url: Option<String>,

    #[serde(default)]
    pub dhcp: DhcpConfig,

    #[serde(default)]
    pub tftp: TftpConfig,

    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DhcpConfig {
    #[serde(default = "default_dhcp_listen")]
    pub listen: SocketAddr,

    /// Bind the DHCP socket to this interface only
    pub interface: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TftpConfig {
    #[serde(default = "default_tftp_listen")]
    pub listen: SocketAddr,

    /// Directory the boot programs are served from
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// How long to wait for each ACK
    #[serde(default = "default_tftp_timeout_secs")]
    pub timeout_secs: u64,

    /// How often a block is resent before the transfer is abandoned
    #[serde(default = "default_tftp_retries")]
    pub retries: u32,

    /// Upper bound for the negotiated `blksize`
    #[serde(default = "default_max_block_size")]
    pub max_block_size: u16,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
}

impl BootsConfig {
    pub fn installer_base_url(&self) -> Option<&str> {
        self.installer_base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
    }

    /// Whether `url` would be answered by our own HTTP server.
    pub fn is_own_url(&self, url: &str) -> bool {
        let Some((scheme, rest)) = url.split_once("://") else {
            return false;
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()),
            None => (authority, None),
        };
        let port = match (port, scheme.to_ascii_lowercase().as_str()) {
            (Some(port), _) => port,
            (None, "https") => 443,
            (None, _) => 80,
        };

        port == self.http.listen.port()
            && (host.eq_ignore_ascii_case(&self.public_fqdn)
                || host == self.public_ipv4.to_string())
    }

    fn validate(&self) -> eyre::Result<()> {
        if let Some(url) = self.installer_base_url() {
            if self.is_own_url(url) {
                eyre::bail!(
                    "installer_base_url {url} points at this daemon, iPXE would chain back to itself"
                );
            }
        }
        Ok(())
    }
}

impl TftpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            listen: default_dhcp_listen(),
            interface: None,
        }
    }
}

impl Default for TftpConfig {
    fn default() -> Self {
        Self {
            listen: default_tftp_listen(),
            artifact_dir: default_artifact_dir(),
            timeout_secs: default_tftp_timeout_secs(),
            retries: default_tftp_retries(),
            max_block_size: default_max_block_size(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
        }
    }
}

fn default_provisioner_engine_name() -> String {
    "boots".to_string()
}

fn default_ipxe_user_class() -> String {
    "Tinkerbell".to_string()
}

fn default_dhcp_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 67))
}

fn default_tftp_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 69))
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80))
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("/var/lib/carbide-boots/artifacts")
}

fn default_tftp_timeout_secs() -> u64 {
    5
}

fn default_tftp_retries() -> u32 {
    5
}

fn default_max_block_size() -> u16 {
    1468
}

/// Reads the configuration file and overlays `CARBIDE_BOOTS_*` environment
/// variables. Nested keys use `__`, e.g. `CARBIDE_BOOTS_TFTP__RETRIES`.
pub fn parse_boots_config(config_path: &Path) -> eyre::Result<Arc<BootsConfig>> {
    let config: BootsConfig = Figment::new()
        .merge(Toml::file(config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .wrap_err_with(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.validate()?;

    Ok(Arc::new(config))
}
