use std::{fmt::Display, str::FromStr};

use super::request::ClientArch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    PXEClient,
    HTTPClient,
}

/// Option 60 as sent by PXE and UEFI HTTP boot ROMs,
/// e.g. `PXEClient:Arch:00007:UNDI:003016`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorClass {
    pub client_type: ClientType,
    pub client_architecture: Option<ClientArch>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum VendorClassParseError {
    InvalidFormat,
    UnsupportedClientType,
    InvalidArchitecture,
}

impl VendorClass {
    pub fn http(&self) -> bool {
        self.client_type == ClientType::HTTPClient
    }
}

impl ClientType {
    /// Identifier echoed back in option 60 of the reply.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PXEClient => "PXEClient",
            Self::HTTPClient => "HTTPClient",
        }
    }
}

impl Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::PXEClient => "PXE Client",
                Self::HTTPClient => "HTTP Client",
            }
        )
    }
}

impl Display for VendorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.client_architecture {
            Some(arch) => write!(f, "{} ({})", arch, self.client_type),
            None => write!(f, "{}", self.client_type),
        }
    }
}

impl FromStr for ClientType {
    type Err = VendorClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PXEClient" => Ok(Self::PXEClient),
            "HTTPClient" => Ok(Self::HTTPClient),
            _ => Err(VendorClassParseError::UnsupportedClientType),
        }
    }
}

///
/// Convert a string of the form Client:Arch:xxxxx:UNDI:yyyzzz to Self
///
impl FromStr for VendorClass {
    type Err = VendorClassParseError;

    fn from_str(vendor_class: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = vendor_class.split(':').collect();
        match parts.as_slice() {
            // Some ROMs only announce themselves
            [client] => Ok(VendorClass {
                client_type: client.parse()?,
                client_architecture: None,
            }),
            [client, "Arch", arch, ..] => Ok(VendorClass {
                client_type: client.parse()?,
                client_architecture: Some(
                    arch.parse::<u16>()
                        .map(ClientArch)
                        .map_err(|_| VendorClassParseError::InvalidArchitecture)?,
                ),
            }),
            _ => Err(VendorClassParseError::InvalidFormat),
        }
    }
}
