// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Pod side of the control-plane protocol.
//!
//! A [`Client`] wraps a connected [`FdChannel`], builds the requests and checks
//! the replies, so applications in the pod deal in descriptors and errors
//! instead of raw messages.

use crate::protocol::{Response, Verb};
use ipc::{Datagram, FdChannel, SeqpacketChannel};
use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;
use tracing::debug;

/// Ways a request made through a [`Client`] can fail
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("control-plane transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("{request:?} was answered with {reply:?}")]
    Rejected { request: String, reply: String },
    #[error("{0} was acknowledged without a descriptor")]
    MissingDescriptor(String),
}

fn expect(request: &str, reply: &Datagram, expected: Response) -> Result<(), ClientError> {
    if reply.payload == expected.as_bytes() {
        Ok(())
    } else {
        Err(ClientError::Rejected {
            request: request.to_owned(),
            reply: String::from_utf8_lossy(&reply.payload).into_owned(),
        })
    }
}

/// A validated session with the control-plane server of an allocation
#[derive(Debug)]
pub struct Client<C: FdChannel> {
    channel: C,
}

impl Client<SeqpacketChannel> {
    /// Connect to the server socket at `path` and introduce the pod as `pod_name`
    pub async fn dial(path: impl AsRef<Path>, pod_name: &str) -> Result<Self, ClientError> {
        Self::connect(SeqpacketChannel::connect(path)?, pod_name).await
    }
}

impl<C: FdChannel> Client<C> {
    /// Introduce the pod as `pod_name` over an already connected channel.
    ///
    /// Fails unless the server answers with [`Response::HostOk`].
    pub async fn connect(channel: C, pod_name: &str) -> Result<Self, ClientError> {
        let mut client = Self { channel };
        let request = format!("{}, {pod_name}", Verb::Connect);
        let reply = client.request(&request, None).await?;
        expect(&request, &reply, Response::HostOk)?;
        debug!("Pod {pod_name} validated by the device plugin");
        Ok(client)
    }

    async fn request(
        &mut self,
        request: &str,
        fd: Option<BorrowedFd<'_>>,
    ) -> Result<Datagram, ClientError> {
        self.channel.send(request.as_bytes(), fd).await?;
        Ok(self.channel.recv().await?)
    }

    /// The XSK map descriptor of `device`
    pub async fn request_xsk_map_fd(&mut self, device: &str) -> Result<OwnedFd, ClientError> {
        let request = format!("{}, {device}", Verb::XskMapFd);
        let reply = self.request(&request, None).await?;
        expect(&request, &reply, Response::FdAck)?;
        reply.fd.ok_or(ClientError::MissingDescriptor(request))
    }

    /// The protocol version the server speaks
    pub async fn request_version(&mut self) -> Result<String, ClientError> {
        let reply = self.request(&Verb::Version.to_string(), None).await?;
        Ok(String::from_utf8_lossy(&reply.payload).into_owned())
    }

    /// Ask the device plugin to enable busy polling on `socket`
    pub async fn request_busy_poll_config(
        &mut self,
        timeout: i32,
        budget: i32,
        socket: BorrowedFd<'_>,
    ) -> Result<(), ClientError> {
        let request = format!("{}, {timeout}, {budget}", Verb::BusyPoll);
        let reply = self.request(&request, Some(socket)).await?;
        expect(&request, &reply, Response::BusyPollAck)
    }

    /// End the session
    pub async fn close(mut self) -> Result<(), ClientError> {
        let request = Verb::Fin.to_string();
        let reply = self.request(&request, None).await?;
        expect(&request, &reply, Response::FinAck)
    }
}

#[cfg(test)]
mod test {
    use super::{Client, ClientError};
    use crate::protocol::PROTOCOL_VERSION;
    use crate::server::{Ending, Server, ServerConfigBuilder, ServerOutcome, ServerState};
    use interface_manager::testing::FakeBusyPoll;
    use ipc::FdChannel;
    use ipc::memory::{MemoryConnector, MemoryListener};
    use k8s_intf::testing::{FakePodResources, pod};
    use pretty_assertions::assert_eq;
    use std::os::fd::{AsFd, OwnedFd};
    use std::sync::Arc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    const RESOURCE: &str = "afxdp/pool1";

    fn dev_null() -> OwnedFd {
        OwnedFd::from(std::fs::File::open("/dev/null").unwrap())
    }

    fn serve(devices: &[&str]) -> (MemoryConnector, Arc<FakeBusyPoll>, JoinHandle<ServerOutcome>) {
        let (listener, connector) = MemoryListener::new();
        let busy_poll = Arc::new(FakeBusyPoll::default());
        let config = ServerConfigBuilder::default()
            .resource_name(RESOURCE)
            .idle_timeout(None)
            .pod_resources(Arc::new(FakePodResources::new(vec![pod(
                "podA",
                RESOURCE,
                devices,
            )])))
            .busy_poll(busy_poll.clone())
            .cancel(CancellationToken::new())
            .build()
            .unwrap();
        let mut server = Server::new(config, Box::new(listener));
        for device in devices {
            server.add_device(*device, dev_null());
        }
        (connector, busy_poll, tokio::spawn(server.run()))
    }

    #[tokio::test]
    async fn full_session() {
        let (connector, busy_poll, server) = serve(&["devA"]);
        let mut client = Client::connect(connector.connect().unwrap(), "podA")
            .await
            .unwrap();
        assert_eq!(client.request_version().await.unwrap(), PROTOCOL_VERSION);
        let fd = client.request_xsk_map_fd("devA").await.unwrap();
        let socket = dev_null();
        client
            .request_busy_poll_config(20, 64, socket.as_fd())
            .await
            .unwrap();
        assert_eq!(busy_poll.calls().len(), 1);
        client.close().await.unwrap();
        drop(fd);

        let outcome = server.await.unwrap();
        assert_eq!(outcome.reached, ServerState::Terminated);
        assert!(matches!(outcome.result, Ok(Ending::Fin)));
    }

    #[tokio::test]
    async fn unknown_pod_is_not_validated() {
        let (connector, _, server) = serve(&["devA"]);
        let err = Client::connect(connector.connect().unwrap(), "podB")
            .await
            .unwrap_err();
        match err {
            ClientError::Rejected { request, reply } => {
                assert_eq!(request, "/connect, podB");
                assert_eq!(reply, "/host_nak");
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(server.await.unwrap().result, Ok(Ending::NotValidated)));
    }

    #[tokio::test]
    async fn unknown_device_is_rejected() {
        let (connector, _, _server) = serve(&["devA"]);
        let mut client = Client::connect(connector.connect().unwrap(), "podA")
            .await
            .unwrap();
        let err = client.request_xsk_map_fd("devB").await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { ref reply, .. } if reply == "/fd_nak"));
        // the session survives a rejected request
        client.request_xsk_map_fd("devA").await.unwrap();
    }

    #[tokio::test]
    async fn ack_without_descriptor_is_an_error() {
        let (mut server, client) = ipc::memory::MemoryChannel::pair();
        let pod = tokio::spawn(async move {
            let mut client = Client::connect(client, "podA").await?;
            client.request_xsk_map_fd("devA").await
        });
        server.recv().await.unwrap();
        server.send(b"/host_ok", None).await.unwrap();
        server.recv().await.unwrap();
        server.send(b"/fd_ack", None).await.unwrap();
        let err = pod.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::MissingDescriptor(_)));
    }

    #[tokio::test]
    async fn closed_server_is_a_transport_error() {
        let (server, client) = ipc::memory::MemoryChannel::pair();
        drop(server);
        let err = Client::connect(client, "podA").await.unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }
}
