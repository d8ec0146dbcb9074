// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-allocation control-plane server.
//!
//! A server owns the XSK map descriptors of one allocation. It accepts a single
//! connection from the pod, checks the pod name the pod claims against the
//! kubelet pod resources, and only then hands out descriptors. [`Client`] is
//! the pod side of the same protocol.

#![deny(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod client;
pub mod protocol;
pub mod server;
pub mod validator;

pub use client::{Client, ClientError};
pub use protocol::{PROTOCOL_VERSION, Request, RequestError, Response};
pub use server::{Ending, Server, ServerConfig, ServerConfigBuilder, ServerError, ServerOutcome, ServerState};
pub use validator::validate_pod;
