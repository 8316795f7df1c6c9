//! Per-connection request handling for the data node.
//!
//! Connections come from clients (pipeline head, reads) and from upstream
//! data nodes (pipeline tail). Either way the first frame decides what
//! follows on the wire.

use std::sync::Arc;
use std::time::Duration;

use common::WireError;
use common::framing::Framed;
use common::message::{DataRequest, NodeAddr, ReadResponse, WritePipeline, addr_display};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::store::BlockStore;

pub async fn handle_connection<S>(
    stream: S,
    store: Arc<BlockStore>,
    idle_timeout: Duration,
) -> Result<(), WireError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, idle_timeout);
    match framed.recv_json::<DataRequest>().await? {
        DataRequest::WritePipeline(header) => {
            let bytes = framed.recv_frame().await?;
            write_pipeline(header, bytes, &store, idle_timeout).await
        }
        DataRequest::ClientRead(request) => {
            let available = store.has_block(&request.block_id);
            framed.send_json(&ReadResponse { success: available }).await?;
            if available {
                let bytes = store.read_block(&request.block_id).await?;
                framed.send_frame(&bytes).await?;
            }
            Ok(())
        }
    }
}

/// Persists the block locally, then forwards it to the next node in the
/// chain. A forward failure leaves the local copy in place and is not
/// reported upstream; the block simply ends up under-replicated.
async fn write_pipeline(
    header: WritePipeline,
    bytes: Vec<u8>,
    store: &BlockStore,
    idle_timeout: Duration,
) -> Result<(), WireError> {
    store.add_block(&header.block_id, &bytes).await?;
    info!(block_id = %header.block_id, bytes = bytes.len(), "block written");

    if let Some((next, rest)) = header.datanodes.split_first() {
        let forward = WritePipeline {
            block_id: header.block_id.clone(),
            datanodes: rest.to_vec(),
        };
        if let Err(e) = forward_block(next, forward, &bytes, idle_timeout).await {
            warn!(
                block_id = %header.block_id,
                addr = %addr_display(next),
                error = %e,
                "pipeline forward failed"
            );
        }
    }
    Ok(())
}

async fn forward_block(
    next: &NodeAddr,
    header: WritePipeline,
    bytes: &[u8],
    idle_timeout: Duration,
) -> Result<(), WireError> {
    let mut framed = Framed::connect(next, idle_timeout).await?;
    framed.send_json(&DataRequest::WritePipeline(header)).await?;
    framed.send_frame(bytes).await?;
    info!(addr = %addr_display(next), "sent to next datanode");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::message::ClientRead;
    use tempfile::tempdir;
    use tokio::io::{DuplexStream, duplex};
    use tokio::net::TcpListener;

    const TEST_TIMEOUT: Duration = Duration::from_secs(1);

    fn connect(store: &Arc<BlockStore>) -> Framed<DuplexStream> {
        let (near, far) = duplex(64 * 1024);
        let store = Arc::clone(store);
        tokio::spawn(async move {
            let _ = handle_connection(far, store, TEST_TIMEOUT).await;
        });
        Framed::new(near, TEST_TIMEOUT)
    }

    #[tokio::test]
    async fn written_blocks_can_be_read_back() {
        let dir = tempdir().expect("failed to create tempdir");
        let store = Arc::new(BlockStore::open(dir.path()).expect("failed to open store"));

        let mut framed = connect(&store);
        framed
            .send_json(&DataRequest::WritePipeline(WritePipeline {
                block_id: "b1".to_string(),
                datanodes: vec![],
            }))
            .await
            .expect("send header failed");
        framed.send_frame(b"block bytes").await.expect("send bytes failed");
        drop(framed);

        // the write has no acknowledgement; wait for it to land
        for _ in 0..50 {
            if store.has_block("b1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut framed = connect(&store);
        framed
            .send_json(&DataRequest::ClientRead(ClientRead {
                block_id: "b1".to_string(),
            }))
            .await
            .expect("send failed");
        let response: ReadResponse = framed.recv_json().await.expect("recv failed");
        assert!(response.success);
        assert_eq!(
            framed.recv_frame().await.expect("recv bytes failed"),
            b"block bytes"
        );
    }

    #[tokio::test]
    async fn reading_an_unknown_block_fails_without_a_data_frame() {
        let dir = tempdir().expect("failed to create tempdir");
        let store = Arc::new(BlockStore::open(dir.path()).expect("failed to open store"));

        let mut framed = connect(&store);
        framed
            .send_json(&DataRequest::ClientRead(ClientRead {
                block_id: "missing".to_string(),
            }))
            .await
            .expect("send failed");
        let response: ReadResponse = framed.recv_json().await.expect("recv failed");
        assert!(!response.success);
        // the connection closes with no data frame following
        assert!(matches!(
            framed.recv_frame().await,
            Err(WireError::Truncated)
        ));
    }

    #[tokio::test]
    async fn the_pipeline_forwards_with_a_shortened_chain() {
        let next_listener = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let next_port = next_listener.local_addr().expect("no local addr").port();
        let downstream = tokio::spawn(async move {
            let (stream, _) = next_listener.accept().await.expect("accept failed");
            let mut framed = Framed::new(stream, TEST_TIMEOUT);
            let header: DataRequest = framed.recv_json().await.expect("recv header failed");
            let bytes = framed.recv_frame().await.expect("recv bytes failed");
            (header, bytes)
        });

        let dir = tempdir().expect("failed to create tempdir");
        let store = Arc::new(BlockStore::open(dir.path()).expect("failed to open store"));
        let mut framed = connect(&store);
        framed
            .send_json(&DataRequest::WritePipeline(WritePipeline {
                block_id: "b1".to_string(),
                datanodes: vec![("127.0.0.1".to_string(), next_port)],
            }))
            .await
            .expect("send header failed");
        framed.send_frame(b"replicated").await.expect("send bytes failed");

        let (header, bytes) = downstream.await.expect("downstream task failed");
        match header {
            DataRequest::WritePipeline(header) => {
                assert_eq!(header.block_id, "b1");
                assert!(header.datanodes.is_empty());
            }
            other => panic!("forwarded wrong message: {other:?}"),
        }
        assert_eq!(bytes, b"replicated");
        // the first hop kept its own copy
        assert!(store.has_block("b1"));
    }
}
