//! NDJSON request loop.
//!
//! One request per input line, one response per output line. Requests are
//! handled concurrently, so responses may come back out of order; callers
//! match them by `id`.

use crate::handlers::Handlers;
use crate::protocol::{error_codes, Request, Response};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RESPONSE_QUEUE: usize = 64;

/// Serve requests from `input` until it closes, then wait for in-flight
/// requests to answer.
pub async fn serve<R, W>(handlers: Handlers, input: R, mut output: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Response>(RESPONSE_QUEUE);

    let reader = async move {
        let mut lines = input.lines();
        let mut received = 0u64;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            received += 1;

            let request = match Request::from_json(line) {
                Ok(request) => request,
                Err(e) => {
                    debug!(error = %e, "Unparseable request line");
                    let response = Response::error("", error_codes::PARSE_ERROR, &format!("Parse error: {e}"));
                    if tx.send(response).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let handlers = handlers.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = handlers.handle(request).await;
                let _ = tx.send(response).await;
            });
        }
        info!(requests = received, "Input closed");
        Ok::<(), io::Error>(())
    };

    let writer = async {
        while let Some(response) = rx.recv().await {
            let mut line = match response.to_json() {
                Ok(line) => line,
                Err(e) => {
                    warn!(id = %response.id, error = %e, "Failed to encode response");
                    continue;
                }
            };
            line.push('\n');
            output.write_all(line.as_bytes()).await?;
            output.flush().await?;
        }
        Ok::<(), io::Error>(())
    };

    // The reader drops its sender at EOF; the writer ends once every spawned
    // handler has answered and dropped its clone.
    let (read, write) = tokio::join!(reader, writer);
    read?;
    write
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use vault_database::DatabaseConfig;
    use vault_keyring::{DeviceIdentity, KeyManager, MemoryStorage};
    use vault_store::SecureDatabase;

    #[tokio::test]
    async fn test_serve_answers_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let keys = KeyManager::new(Box::new(MemoryStorage::new()), DeviceIdentity::new("serve@test"));
        let config = DatabaseConfig {
            health_check_interval: Duration::ZERO,
            ..DatabaseConfig::default()
        };
        let store = SecureDatabase::open(&dir.path().join("deskvault.db"), &keys, config)
            .await
            .unwrap();
        let handlers = Handlers::new(Arc::new(store));

        let input = concat!(
            r#"{"id":"1","method":"health"}"#,
            "\n\n",
            r#"{"id":"2","method":"preference.set","params":{"key":"k","value":1}}"#,
            "\n",
            "not json\n",
            r#"{"id":"3","method":"nope"}"#,
            "\n",
        );
        let mut output = Vec::new();
        serve(handlers, input.as_bytes(), &mut output).await.unwrap();

        let responses: HashMap<String, Response> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<Response>(l).unwrap())
            .map(|r| (r.id.clone(), r))
            .collect();
        assert_eq!(responses.len(), 4);
        assert!(responses["1"].is_success());
        assert!(responses["2"].is_success());
        assert_eq!(responses[""].error.as_ref().unwrap().code, error_codes::PARSE_ERROR);
        assert_eq!(responses["3"].error.as_ref().unwrap().code, error_codes::METHOD_NOT_FOUND);
    }
}
