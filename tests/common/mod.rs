//! Shared fixtures for integration tests: an in-process HTTP stub standing in
//! for inference servers, and an in-memory container runtime.

#![allow(dead_code)]

use async_trait::async_trait;
use docscribe::{ContainerRuntime, ContainerStatus, PreparedImage, RuntimeError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

// ── HTTP stub ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Lower-cased header names.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }

    /// The text part of a chat-completion request.
    pub fn prompt(&self) -> String {
        let json = self.json();
        json["messages"][0]["content"]
            .as_array()
            .expect("content parts")
            .iter()
            .find(|p| p["type"] == "text")
            .and_then(|p| p["text"].as_str())
            .expect("text part")
            .to_string()
    }

    pub fn image_count(&self) -> usize {
        self.json()["messages"][0]["content"]
            .as_array()
            .expect("content parts")
            .iter()
            .filter(|p| p["type"] == "image_url")
            .count()
    }
}

type Responder = dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server: one request per connection, canned replies.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                let responder = Arc::clone(&responder);
                tokio::spawn(async move {
                    let _ = serve(stream, recorded, responder).await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    /// Chat completions answered by `content_for(prompt)`; readiness probes get 200.
    pub async fn chat<F>(content_for: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::start(move |req| {
            if req.method == "GET" {
                return (200, r#"{"data":[]}"#.to_string());
            }
            (200, completion(&content_for(&req.prompt())))
        })
        .await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

/// A chat-completion body with `content` as the answer.
pub fn completion(content: &str) -> String {
    serde_json::json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

async fn serve(
    mut stream: TcpStream,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Arc<Responder>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];

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

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request = RecordedRequest {
        method,
        path,
        headers,
        body,
    };
    let (status, reply) = responder(&request);
    recorded.lock().unwrap().push(request);

    let response = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
        reason(status),
        reply.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Base URL on which nothing listens.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}

/// Placeholder page image; backends under test never decode it.
pub fn page(n: u8) -> PreparedImage {
    PreparedImage::new(vec![0x89, b'P', b'N', b'G', n], 100 + n as u32, 200)
}

// ── Container runtime fake ───────────────────────────────────────────────────

/// In-memory runtime recording every start/stop.
#[derive(Default)]
pub struct FakeRuntime {
    states: Mutex<HashMap<String, ContainerStatus>>,
    failing_stops: HashSet<String>,
    start_delay: Option<Duration>,
    /// `start:<name>` / `started:<name>` around every start.
    pub events: Mutex<Vec<String>>,
    pub starts: Mutex<Vec<String>>,
    pub stops: Mutex<Vec<String>>,
    pub inspects: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn with(containers: &[(&str, ContainerStatus)]) -> Self {
        Self {
            states: Mutex::new(
                containers
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.clone()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn failing_stop(mut self, name: &str) -> Self {
        self.failing_stops.insert(name.to_string());
        self
    }

    /// Make every start take `delay`, yielding to other tasks meanwhile.
    pub fn slow_start(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn status_of(&self, name: &str) -> Option<ContainerStatus> {
        self.states.lock().unwrap().get(name).cloned()
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.inspects.lock().unwrap().len() + self.starts().len() + self.stops().len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn status(&self, name: &str) -> Result<Option<ContainerStatus>, RuntimeError> {
        self.inspects.lock().unwrap().push(name.to_string());
        Ok(self.status_of(name))
    }

    async fn start(&self, name: &str) -> Result<(), RuntimeError> {
        self.starts.lock().unwrap().push(name.to_string());
        self.events.lock().unwrap().push(format!("start:{name}"));
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().unwrap().push(format!("started:{name}"));
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), ContainerStatus::Running);
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.stops.lock().unwrap().push(name.to_string());
        if self.failing_stops.contains(name) {
            return Err(RuntimeError::CommandFailed {
                action: "stop",
                name: name.to_string(),
                detail: "device or resource busy".to_string(),
            });
        }
        self.states
            .lock()
            .unwrap()
            .insert(name.to_string(), ContainerStatus::Exited);
        Ok(())
    }
}
