// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control-plane server of one allocation.
//!
//! A [`Server`] accepts exactly one connection. The first request must be
//! `/connect, <pod>`; the claimed pod is checked against the kubelet pod
//! resources and only a validated pod gets to ask for descriptors.

use crate::protocol::{Request, Response, Verb, busy_poll_values, parse};
use crate::validator::validate_pod;
use derive_builder::Builder;
use interface_manager::bpf::BusyPollConfigurator;
use ipc::{Datagram, FdChannel, FdListener};
use k8s_intf::{PodResourcesClient, PodResourcesError};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::future::FutureExt as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pod name reported before a connect request was received
const UNVALIDATED: &str = "unvalidated";

/// Parameters of a [`Server`]
#[derive(Builder, Clone)]
pub struct ServerConfig {
    /// Resource name the pod must hold the devices under, e.g. `afxdp/cdq`
    #[builder(setter(into))]
    pub resource_name: String,

    /// Bound on each accept, read, write and pod resources query. `None` waits forever.
    #[builder(setter(into), default)]
    pub idle_timeout: Option<Duration>,

    pub pod_resources: Arc<dyn PodResourcesClient>,

    pub busy_poll: Arc<dyn BusyPollConfigurator>,

    /// Stops the server at its next blocking point
    #[builder(default)]
    pub cancel: CancellationToken,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServerState {
    Listening,
    Connected,
    Validated,
    Terminated,
}

/// How a server that did not fail came to an end
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ending {
    /// The pod said `/fin`
    Fin,
    /// The first request was malformed or the pod did not own the devices
    NotValidated,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to accept a connection: {0}")]
    Accept(#[source] io::Error),
    #[error("transport failure: {0}")]
    Transport(#[source] io::Error),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("cancelled")]
    Cancelled,
    #[error("invalid busy poll arguments: {0}")]
    BusyPollArgs(String),
    #[error("pod resources query failed: {0}")]
    PodResources(#[from] PodResourcesError),
}

/// What a finished server reports
#[derive(Debug)]
pub struct ServerOutcome {
    /// The pod name claimed by the peer
    pub pod_name: String,
    /// Last state the server reached
    pub reached: ServerState,
    pub result: Result<Ending, ServerError>,
}

/// Run `fut` unless `limit` expires or `cancel` fires first
async fn bounded<T>(
    limit: Option<Duration>,
    cancel: &CancellationToken,
    phase: &'static str,
    fut: impl Future<Output = T>,
) -> Result<T, ServerError> {
    let fut = fut.with_cancellation_token(cancel);
    let out = match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ServerError::Timeout(phase))?,
        None => fut.await,
    };
    out.ok_or(ServerError::Cancelled)
}

/// The accepted connection, with the bounds applied to every exchange
struct Session {
    channel: Box<dyn FdChannel>,
    limit: Option<Duration>,
    cancel: CancellationToken,
}

impl Session {
    async fn recv(&mut self) -> Result<Datagram, ServerError> {
        bounded(self.limit, &self.cancel, "request", self.channel.recv())
            .await?
            .map_err(ServerError::Transport)
    }

    async fn reply(
        &mut self,
        response: Response,
        fd: Option<BorrowedFd<'_>>,
    ) -> Result<(), ServerError> {
        debug!("Replying {response}");
        bounded(
            self.limit,
            &self.cancel,
            "reply",
            self.channel.send(response.as_bytes(), fd),
        )
        .await?
        .map_err(ServerError::Transport)
    }
}

/// Control-plane server of one allocation
pub struct Server {
    config: ServerConfig,
    listener: Box<dyn FdListener>,
    devices: BTreeMap<String, OwnedFd>,
    pod_name: String,
    state: ServerState,
}

impl Server {
    #[must_use]
    pub fn new(config: ServerConfig, listener: Box<dyn FdListener>) -> Self {
        Self {
            config,
            listener,
            devices: BTreeMap::new(),
            pod_name: UNVALIDATED.to_owned(),
            state: ServerState::Listening,
        }
    }

    /// Hand the XSK map descriptor of `device` to the server
    pub fn add_device(&mut self, device: impl Into<String>, fd: OwnedFd) {
        self.devices.insert(device.into(), fd);
    }

    #[must_use]
    pub fn devices(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn resource_name(&self) -> &str {
        &self.config.resource_name
    }

    /// Serve the single connection of this allocation until it ends
    pub async fn run(mut self) -> ServerOutcome {
        let result = self.serve().await;
        let resource = &self.config.resource_name;
        match &result {
            Ok(Ending::Fin) => info!("Server for {resource}: pod {} is done", self.pod_name),
            Ok(Ending::NotValidated) => {
                warn!("Server for {resource}: pod {} was not validated", self.pod_name);
            }
            Err(ServerError::Cancelled) => debug!("Server for {resource}: cancelled"),
            Err(e) => error!("Server for {resource} stopped in state {}: {e}", self.state),
        }
        ServerOutcome {
            pod_name: self.pod_name,
            reached: self.state,
            result,
        }
    }

    async fn serve(&mut self) -> Result<Ending, ServerError> {
        let limit = self.config.idle_timeout;
        let cancel = self.config.cancel.clone();
        let channel = bounded(limit, &cancel, "connection", self.listener.accept())
            .await?
            .map_err(ServerError::Accept)?;
        self.state = ServerState::Connected;
        debug!("Server for {}: connected", self.config.resource_name);

        let mut session = Session {
            channel,
            limit,
            cancel,
        };
        if !self.handshake(&mut session).await? {
            return Ok(Ending::NotValidated);
        }
        self.state = ServerState::Validated;

        loop {
            let datagram = session.recv().await?;
            match parse(&datagram.payload, datagram.truncated) {
                Ok(Request::XskMapFd(device)) => match self.devices.get(&device) {
                    Some(fd) => {
                        debug!("Sending xsk map of {device} to pod {}", self.pod_name);
                        session.reply(Response::FdAck, Some(fd.as_fd())).await?;
                    }
                    None => {
                        warn!("Pod {} asked for unknown device {device}", self.pod_name);
                        session.reply(Response::FdNak, None).await?;
                    }
                },
                Ok(Request::Version) => session.reply(Response::Version, None).await?,
                Ok(Request::BusyPoll { timeout, budget }) => {
                    let response = self.busy_poll(&datagram, &timeout, &budget)?;
                    session.reply(response, None).await?;
                }
                Ok(Request::Fin) => {
                    session.reply(Response::FinAck, None).await?;
                    self.state = ServerState::Terminated;
                    return Ok(Ending::Fin);
                }
                Ok(Request::Connect(_)) => {
                    warn!("Pod {} sent a second connect request", self.pod_name);
                    session.reply(Response::Nak, None).await?;
                }
                Err(e) => {
                    warn!("Bad request from pod {}: {e}", self.pod_name);
                    session.reply(Response::Nak, None).await?;
                }
            }
        }
    }

    /// Read the connect request and validate the pod. `Ok(false)` means the
    /// pod was turned away.
    async fn handshake(&mut self, session: &mut Session) -> Result<bool, ServerError> {
        let datagram = session.recv().await?;
        let pod_name = match parse(&datagram.payload, datagram.truncated) {
            Ok(Request::Connect(pod_name)) => pod_name,
            Ok(other) => {
                warn!("Expected {} as first request, got {}", Verb::Connect, other.verb());
                session.reply(Response::HostNak, None).await?;
                return Ok(false);
            }
            Err(e) => {
                warn!("Bad connect request: {e}");
                session.reply(Response::HostNak, None).await?;
                return Ok(false);
            }
        };
        self.pod_name = pod_name;

        let devices: BTreeSet<&str> = self.devices.keys().map(String::as_str).collect();
        let validation = bounded(
            session.limit,
            &session.cancel,
            "pod resources",
            validate_pod(
                self.config.pod_resources.as_ref(),
                &self.pod_name,
                &self.config.resource_name,
                &devices,
            ),
        )
        .await?;
        match validation {
            Ok(true) => {
                info!("Pod {} validated for {devices:?}", self.pod_name);
                session.reply(Response::HostOk, None).await?;
                Ok(true)
            }
            Ok(false) => {
                session.reply(Response::HostNak, None).await?;
                Ok(false)
            }
            Err(e) => {
                error!("Unable to validate pod {}: {e}", self.pod_name);
                session.reply(Response::Error, None).await?;
                Err(ServerError::PodResources(e))
            }
        }
    }

    fn busy_poll(
        &self,
        datagram: &Datagram,
        timeout: &str,
        budget: &str,
    ) -> Result<Response, ServerError> {
        let (timeout, budget) = busy_poll_values(timeout, budget)
            .map_err(|e| ServerError::BusyPollArgs(format!("{timeout}, {budget}: {e}")))?;
        let Some(fd) = &datagram.fd else {
            warn!("Pod {}: busy poll request without a socket", self.pod_name);
            return Ok(Response::BusyPollNak);
        };
        match self
            .config
            .busy_poll
            .configure_busy_poll(fd.as_fd(), timeout, budget)
        {
            Ok(()) => Ok(Response::BusyPollAck),
            Err(e) => {
                warn!("Pod {}: {e}", self.pod_name);
                Ok(Response::BusyPollNak)
            }
        }
    }
}
