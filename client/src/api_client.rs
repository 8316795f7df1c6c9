//! Network calls issued by the interactive client.
//!
//! Every REPL command maps onto one or two functions here: a metadata
//! round trip to the name service, then, for `ins` and `cat`, direct block
//! I/O against data nodes. Each call opens its own connection and lets the
//! framed transport close it on drop.

use std::time::Duration;

use common::WireError;
use common::framing::Framed;
use common::message::{
    Action, ClientCommand, ClientRead, ClientResponse, DataRequest, NameRequest, NodeAddr,
    ReadResponse, WritePipeline,
};

/// Sends one namespace command to the name service and returns its reply.
///
/// # Arguments
/// * `namenode` - The name service endpoint.
/// * `action_type` - Which namespace operation to run.
/// * `path` - The absolute filesystem path the operation applies to.
pub async fn name_command(
    namenode: &NodeAddr,
    action_type: Action,
    path: &str,
    idle_timeout: Duration,
) -> Result<ClientResponse, WireError> {
    let mut framed = Framed::connect(namenode, idle_timeout).await?;
    framed
        .send_json(&NameRequest::Client(ClientCommand {
            action_type,
            path: path.to_string(),
        }))
        .await?;
    framed.recv_json().await
}

/// Pushes block bytes into the head of a write pipeline.
///
/// `downstream` is the rest of the chain; each node persists its copy and
/// forwards to the next. No acknowledgement comes back.
pub async fn push_block(
    target: &NodeAddr,
    block_id: &str,
    downstream: &[NodeAddr],
    bytes: &[u8],
    idle_timeout: Duration,
) -> Result<(), WireError> {
    let mut framed = Framed::connect(target, idle_timeout).await?;
    framed
        .send_json(&DataRequest::WritePipeline(WritePipeline {
            block_id: block_id.to_string(),
            datanodes: downstream.to_vec(),
        }))
        .await?;
    framed.send_frame(bytes).await
}

/// Asks one data node for a block's bytes.
///
/// `Ok(None)` means the node answered but does not hold the block; the
/// caller should try the next candidate.
pub async fn fetch_block(
    target: &NodeAddr,
    block_id: &str,
    idle_timeout: Duration,
) -> Result<Option<Vec<u8>>, WireError> {
    let mut framed = Framed::connect(target, idle_timeout).await?;
    framed
        .send_json(&DataRequest::ClientRead(ClientRead {
            block_id: block_id.to_string(),
        }))
        .await?;
    let response: ReadResponse = framed.recv_json().await?;
    if !response.success {
        return Ok(None);
    }
    Ok(Some(framed.recv_frame().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    async fn local_listener() -> (TcpListener, NodeAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let port = listener.local_addr().expect("no local addr").port();
        (listener, ("127.0.0.1".to_string(), port))
    }

    #[tokio::test]
    async fn name_commands_round_trip() {
        let (listener, addr) = local_listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept failed");
            let mut framed = Framed::new(stream, TEST_TIMEOUT);
            match framed.recv_json().await.expect("recv failed") {
                NameRequest::Client(command) => {
                    assert_eq!(command.action_type, Action::Mkdir);
                    assert_eq!(command.path, "/a");
                    framed
                        .send_json(&ClientResponse::ok())
                        .await
                        .expect("send failed");
                }
                other => panic!("received wrong message: {other:?}"),
            }
        });

        let response = name_command(&addr, Action::Mkdir, "/a", TEST_TIMEOUT)
            .await
            .expect("command failed");
        assert!(response.success);
    }

    #[tokio::test]
    async fn fetch_block_reports_a_miss_as_none() {
        let (listener, addr) = local_listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept failed");
            let mut framed = Framed::new(stream, TEST_TIMEOUT);
            let _: DataRequest = framed.recv_json().await.expect("recv failed");
            framed
                .send_json(&ReadResponse { success: false })
                .await
                .expect("send failed");
        });

        let fetched = fetch_block(&addr, "b1", TEST_TIMEOUT)
            .await
            .expect("fetch failed");
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn fetch_block_returns_the_data_frame_on_a_hit() {
        let (listener, addr) = local_listener().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept failed");
            let mut framed = Framed::new(stream, TEST_TIMEOUT);
            let _: DataRequest = framed.recv_json().await.expect("recv failed");
            framed
                .send_json(&ReadResponse { success: true })
                .await
                .expect("send failed");
            framed.send_frame(b"block bytes").await.expect("send failed");
        });

        let fetched = fetch_block(&addr, "b1", TEST_TIMEOUT)
            .await
            .expect("fetch failed");
        assert_eq!(fetched.as_deref(), Some(b"block bytes".as_slice()));
    }

    #[tokio::test]
    async fn a_refused_connection_is_a_transport_error() {
        let (listener, addr) = local_listener().await;
        drop(listener);

        assert!(matches!(
            fetch_block(&addr, "b1", TEST_TIMEOUT).await,
            Err(WireError::Io(_))
        ));
    }
}
