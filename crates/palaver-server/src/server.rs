//! The TCP line loop: accept, read one request line, answer, close.

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use palaver_proto::MAX_REQUEST_BYTES;
use palaver_store::ChatStore;

use crate::config::ServerConfig;
use crate::dispatch;

/// Bind and serve forever. Each connection carries exactly one request.
pub async fn serve(store: ChatStore, config: ServerConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "client connected");

        let store = store.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&store, &config, stream).await {
                debug!(%peer, %err, "connection error");
            }
        });
    }
}

async fn handle_connection(
    store: &ChatStore,
    config: &ServerConfig,
    stream: TcpStream,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader.take(MAX_REQUEST_BYTES));

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    debug!(request = line.trim(), "received");

    let response = dispatch::handle_line(store, config, &line).await;
    debug!(response = response.as_str(), "sending");

    writer.write_all(response.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.shutdown().await?;
    Ok(())
}
