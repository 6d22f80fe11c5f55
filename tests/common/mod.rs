//! One-shot HTTP stub for gateway tests.

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};
use url::Url;

/// Request as received by the stub.
#[derive(Debug)]
pub struct Recorded {
    /// Request line, e.g. `GET /latest?ids=... HTTP/1.1`.
    pub line: String,
    pub body: String,
}

/// Serves a single request with the given status line and JSON body.
///
/// Returns the base URL of the stub and a handle resolving to the request
/// it received.
pub async fn serve_once(status: &str, body: &str) -> (Url, JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let (head_len, content_len) = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request head");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                let content_len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .map_or(0, |v| v.trim().parse::<usize>().unwrap());
                break (pos + 4, content_len);
            }
        };
        while buf.len() < head_len + content_len {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before request body");
            buf.extend_from_slice(&chunk[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        let text = String::from_utf8_lossy(&buf).to_string();
        Recorded {
            line: text.lines().next().unwrap_or_default().to_string(),
            body: text[head_len..].to_string(),
        }
    });

    (Url::parse(&format!("http://{addr}/")).unwrap(), handle)
}
