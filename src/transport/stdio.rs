//! Stdio transport: newline-delimited JSON-RPC on stdin/stdout
//!
//! Single client, credentials from configuration. Stdout carries protocol
//! messages only; logs go elsewhere.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;

use super::protocol::McpServer;
use crate::resource::Credentials;

pub async fn serve_stdio(server: Arc<McpServer>, credentials: Credentials) -> Result<()> {
    tracing::info!("stdio transport ready");
    serve(server, credentials, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve requests from `reader` until EOF, writing replies to `writer`
pub async fn serve<R, W>(
    server: Arc<McpServer>,
    credentials: Credentials,
    reader: R,
    mut writer: W,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::channel::<Value>(64);

    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut notifications = server.subscribe();
    let notify_tx = out_tx.clone();
    let notify_task = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(message) => {
                    if notify_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("dropped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let server = Arc::clone(&server);
        let credentials = credentials.clone();
        let out_tx = out_tx.clone();
        // Requests run concurrently so a long deploy does not block pings
        in_flight.spawn(async move {
            if let Some(reply) = server.handle_text(&line, &credentials).await {
                let _ = out_tx.send(reply).await;
            }
        });
    }

    tracing::info!("stdin closed, finishing {} in-flight requests", in_flight.len());
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("request task failed: {}", e);
        }
    }

    notify_task.abort();
    drop(out_tx);
    writer_task
        .await
        .context("stdout writer panicked")?
        .context("failed to write stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, GatewaySettings};
    use crate::resource::{ResourceExecutor, ResourceKind};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use tokio::io::AsyncReadExt;

    struct NoopExecutor;

    #[async_trait]
    impl ResourceExecutor for NoopExecutor {
        async fn execute(
            &self,
            _kind: ResourceKind,
            _operation: &str,
            _args: &Map<String, Value>,
            _credentials: &Credentials,
        ) -> anyhow::Result<Option<Value>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_replies_one_line_per_request() {
        let gateway = Arc::new(Gateway::new(Arc::new(NoopExecutor), GatewaySettings::default()));
        let server = Arc::new(McpServer::new(gateway));

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        );
        let (client, server_end) = tokio::io::duplex(64 * 1024);

        serve(server, Credentials::new("t"), input.as_bytes(), server_end)
            .await
            .unwrap();

        let mut output = String::new();
        let mut client = client;
        client.read_to_string(&mut output).await.unwrap();

        let replies: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        let mut ids: Vec<i64> = replies.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert!(replies.iter().any(|r| r["result"] == json!({})));
    }
}
