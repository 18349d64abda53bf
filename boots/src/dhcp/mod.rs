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
pub mod negotiator;
pub mod reply;
pub mod request;
pub mod server;
pub mod vendor_class;

pub use negotiator::{IgnoreReason, Negotiator, Outcome};
pub use reply::{Reply, ReplyWriter};
pub use request::DhcpRequest;
pub use server::DhcpServer;
