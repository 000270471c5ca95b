use crate::router::{self, RouterState};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use gardenstate_core::ipc::{GardenRequest, GardenResponse};
use std::path::Path;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

fn le_codec() -> LengthDelimitedCodec {
    // 4-byte little-endian length prefix + MessagePack payload
    LengthDelimitedCodec::builder().little_endian().new_codec()
}

fn encode(response: &GardenResponse) -> Option<Bytes> {
    match rmp_serde::to_vec_named(response) {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(e) => {
            tracing::error!("Failed to serialize response: {}", e);
            None
        }
    }
}

async fn serve_connection(stream: UnixStream, state: RouterState) {
    let (read, write) = stream.into_split();
    let mut framed_read = FramedRead::new(read, le_codec());
    let mut framed_write = FramedWrite::new(write, le_codec());

    while let Some(frame) = framed_read.next().await {
        let bytes_mut = match frame {
            Ok(b) => b,
            Err(e) => {
                tracing::error!("Frame error: {}", e);
                break;
            }
        };

        let response = match rmp_serde::from_slice::<GardenRequest>(&bytes_mut) {
            Ok(request) => router::handle_request(request, &state).await,
            Err(e) => GardenResponse::err(format!("Deserialization error: {}", e)),
        };

        let Some(resp_bytes) = encode(&response) else {
            break;
        };
        if let Err(e) = framed_write.send(resp_bytes).await {
            tracing::error!("Failed to send response: {}", e);
            break;
        }
    }
}

pub async fn run_unix_server(
    socket_path: &str,
    state: RouterState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    let listener = UnixListener::bind(socket_path)?;
    tracing::info!("IPC Server listening on {}", socket_path);

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                tokio::spawn(serve_connection(stream, state.clone()));
            }
            _ = shutdown.recv() => {
                tracing::info!("Shutting down IPC server...");
                break;
            }
        }
    }

    if Path::new(socket_path).exists() {
        std::fs::remove_file(socket_path)?;
    }

    Ok(())
}
