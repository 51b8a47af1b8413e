//! A minimal HTTP JSON-RPC responder for unit tests.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub(crate) struct Reply {
    status: u16,
    body: Value,
}

impl Reply {
    pub(crate) fn ok(req: &Value, result: Value) -> Self {
        Self {
            status: 200,
            body: json!({ "jsonrpc": "2.0", "id": req["id"], "result": result }),
        }
    }

    pub(crate) fn status(status: u16, body: Value) -> Self {
        Self { status, body }
    }
}

/// Serve JSON-RPC requests with `handler` and return the endpoint URL.
pub(crate) async fn serve<F>(handler: F) -> String
where
    F: Fn(&Value) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = respond(stream, handler.as_ref()).await;
            });
        }
    });

    format!("http://{addr}")
}

async fn respond<F>(mut stream: TcpStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(&Value) -> Reply,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request: Value = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
    let reply = handler(&request);
    let body = reply.body.to_string();
    let head = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body.as_bytes()).await?;
    stream.shutdown().await
}
