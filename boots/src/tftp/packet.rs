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

//! TFTP wire format (RFC 1350) with option extension packets (RFC 2347).

use std::{fmt::Display, str::FromStr};

use crate::errors::TftpError;

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;
const OPCODE_OACK: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Netascii,
    Octet,
}

impl FromStr for Mode {
    type Err = TftpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "netascii" => Ok(Self::Netascii),
            "octet" => Ok(Self::Octet),
            _ => Err(TftpError::UnsupportedMode(s.to_string())),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Netascii => "netascii",
                Self::Octet => "octet",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
    /// RFC 2347
    OptionNegotiation,
}

impl ErrorCode {
    fn to_u16(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileExists => 6,
            Self::NoSuchUser => 7,
            Self::OptionNegotiation => 8,
        }
    }

    fn from_u16(code: u16) -> Self {
        match code {
            1 => Self::FileNotFound,
            2 => Self::AccessViolation,
            3 => Self::DiskFull,
            4 => Self::IllegalOperation,
            5 => Self::UnknownTransferId,
            6 => Self::FileExists,
            7 => Self::NoSuchUser,
            8 => Self::OptionNegotiation,
            _ => Self::NotDefined,
        }
    }
}

/// A read or write request. Options keep the order the client sent them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub filename: String,
    pub mode: Mode,
    pub options: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq(Request),
    Wrq(Request),
    Data { block: u16, data: Vec<u8> },
    Ack { block: u16 },
    Error { code: ErrorCode, message: String },
    Oack { options: Vec<(String, String)> },
}

impl Packet {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn parse(buf: &[u8]) -> Result<Self, TftpError> {
        if buf.len() < 4 {
            return Err(TftpError::Truncated(buf.len()));
        }
        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let body = &buf[2..];

        match opcode {
            OPCODE_RRQ => Ok(Self::Rrq(parse_request(body)?)),
            OPCODE_WRQ => Ok(Self::Wrq(parse_request(body)?)),
            OPCODE_DATA => Ok(Self::Data {
                block: u16::from_be_bytes([body[0], body[1]]),
                data: body[2..].to_vec(),
            }),
            OPCODE_ACK => Ok(Self::Ack {
                block: u16::from_be_bytes([body[0], body[1]]),
            }),
            OPCODE_ERROR => {
                let code = ErrorCode::from_u16(u16::from_be_bytes([body[0], body[1]]));
                // Some clients leave out the terminating NUL
                let message = match read_string(&body[2..], "message") {
                    Ok((message, _)) => message,
                    Err(_) => String::from_utf8_lossy(&body[2..]).into_owned(),
                };
                Ok(Self::Error { code, message })
            }
            OPCODE_OACK => Ok(Self::Oack {
                options: parse_options(body)?,
            }),
            other => Err(TftpError::UnknownOpcode(other)),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Self::Rrq(request) | Self::Wrq(request) => {
                let opcode = if matches!(self, Self::Rrq(_)) {
                    OPCODE_RRQ
                } else {
                    OPCODE_WRQ
                };
                buf.extend_from_slice(&opcode.to_be_bytes());
                write_string(&mut buf, &request.filename);
                write_string(&mut buf, &request.mode.to_string());
                write_options(&mut buf, &request.options);
            }
            Self::Data { block, data } => {
                buf.extend_from_slice(&OPCODE_DATA.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(data);
            }
            Self::Ack { block } => {
                buf.extend_from_slice(&OPCODE_ACK.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
            }
            Self::Error { code, message } => {
                buf.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
                buf.extend_from_slice(&code.to_u16().to_be_bytes());
                write_string(&mut buf, message);
            }
            Self::Oack { options } => {
                buf.extend_from_slice(&OPCODE_OACK.to_be_bytes());
                write_options(&mut buf, options);
            }
        }
        buf
    }
}

fn read_string<'a>(buf: &'a [u8], field: &'static str) -> Result<(String, &'a [u8]), TftpError> {
    let end = buf
        .iter()
        .position(|b| *b == 0)
        .ok_or(TftpError::UnterminatedString(field))?;
    let value = std::str::from_utf8(&buf[..end]).map_err(|_| TftpError::InvalidString(field))?;
    Ok((value.to_string(), &buf[end + 1..]))
}

fn write_string(buf: &mut Vec<u8>, value: &str) {
    buf.extend_from_slice(value.as_bytes());
    buf.push(0);
}

fn parse_request(body: &[u8]) -> Result<Request, TftpError> {
    let (filename, rest) = read_string(body, "filename")?;
    let (mode, rest) = read_string(rest, "mode")?;
    Ok(Request {
        filename,
        mode: mode.parse()?,
        options: parse_options(rest)?,
    })
}

fn parse_options(mut buf: &[u8]) -> Result<Vec<(String, String)>, TftpError> {
    let mut options = Vec::new();
    while !buf.is_empty() {
        let (key, rest) = read_string(buf, "option name")?;
        let (value, rest) = read_string(rest, "option value")?;
        options.push((key, value));
        buf = rest;
    }
    Ok(options)
}

fn write_options(buf: &mut Vec<u8>, options: &[(String, String)]) {
    for (key, value) in options {
        write_string(buf, key);
        write_string(buf, value);
    }
}
