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

//! Carries a W3C traceparent through TFTP by appending it to the boot
//! filename handed out in the DHCP reply.
//!
//! The suffix has the shape `<name>-<version>-<trace id>-<span id>-<flags>`
//! with lowercase hex fields of 2, 32, 16 and 2 digits. Anything that does
//! not match exactly is left alone, so a malformed or missing suffix can
//! never break a boot.

use lazy_static::lazy_static;
use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use regex::Regex;
use tracing_opentelemetry::OpenTelemetrySpanExt;

const TRACEPARENT_VERSION: &str = "00";

lazy_static! {
    static ref TRACEPARENT_SUFFIX: Regex = Regex::new(
        r"(?s)^(?P<name>.+)-(?P<version>[0-9a-f]{2})-(?P<trace_id>[0-9a-f]{32})-(?P<span_id>[0-9a-f]{16})-(?P<flags>[0-9a-f]{2})$"
    )
    .unwrap();
}

/// Strips a traceparent suffix from `filename`.
///
/// When a valid suffix is present the returned context carries it as a remote
/// span context and the returned name is the filename as originally handed
/// out. Otherwise `cx` and `filename` come back untouched.
pub fn extract_traceparent_from_filename<'a>(
    cx: &Context,
    filename: &'a str,
) -> (Context, &'a str) {
    let Some(captures) = TRACEPARENT_SUFFIX.captures(filename) else {
        return (cx.clone(), filename);
    };

    // The regex already guarantees lowercase hex of the right width.
    let (Ok(trace_id), Ok(span_id), Ok(flags)) = (
        TraceId::from_hex(&captures["trace_id"]),
        SpanId::from_hex(&captures["span_id"]),
        u8::from_str_radix(&captures["flags"], 16),
    ) else {
        return (cx.clone(), filename);
    };

    let span_context = SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(flags),
        true,
        TraceState::default(),
    );
    if !span_context.is_valid() {
        tracing::debug!(filename, "ignoring traceparent with zero trace or span id");
        return (cx.clone(), filename);
    }

    let name_len = captures["name"].len();
    (
        cx.with_remote_span_context(span_context),
        &filename[..name_len],
    )
}

/// Appends the span of `cx` to `filename` so the TFTP server can pick up the
/// trace again. Without a valid span the filename is returned as is.
pub fn append_traceparent_to_filename(cx: &Context, filename: &str) -> String {
    let span = cx.span();
    let span_context = span.span_context();
    if !span_context.is_valid() {
        return filename.to_string();
    }

    format!(
        "{filename}-{TRACEPARENT_VERSION}-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        TraceFlags::SAMPLED.to_u8(),
    )
}

/// [`append_traceparent_to_filename`] for the current `tracing` span.
pub fn encode_current(filename: &str) -> String {
    append_traceparent_to_filename(&tracing::Span::current().context(), filename)
}
