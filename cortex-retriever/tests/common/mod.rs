#![allow(dead_code)]

use async_trait::async_trait;
use cortex_embed::{EmbedConfig, Embedding, EmbeddingClient, EmbeddingProvider};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const VOCABULARY: [&str; 7] = [
    "rust", "python", "borrow", "garbage", "checker", "collector", "vector",
];

pub const DIMENSION: usize = VOCABULARY.len() + 1;

/// Deterministic bag-of-words embedding over a tiny vocabulary.
pub fn keyword_embedding(text: &str) -> Embedding {
    let mut vector = vec![0.0; DIMENSION];
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        let slot = VOCABULARY
            .iter()
            .position(|v| *v == word)
            .unwrap_or(VOCABULARY.len());
        vector[slot] += 1.0;
    }
    vector
}

pub struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed_batch(&self, texts: &[String]) -> cortex_embed::Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| keyword_embedding(t)).collect())
    }

    fn provider_name(&self) -> &str {
        "keyword"
    }
}

pub fn keyword_client() -> EmbeddingClient {
    let config = EmbedConfig::http("http://localhost/api/embeddings").with_inter_batch_delay_ms(0);
    EmbeddingClient::new(Arc::new(KeywordProvider), &config).unwrap()
}

/// A request captured by [`MockServer`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }

    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_lowercase());
        self.head.lines().find_map(|line| {
            line.to_lowercase()
                .starts_with(&prefix)
                .then(|| line[prefix.len()..].trim().to_string())
        })
    }
}

type Handler = dyn Fn(&CapturedRequest) -> (u16, String) + Send + Sync;

/// Answers every request through a handler and records what it saw.
pub struct MockServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&CapturedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let Some(request) = read_request(&mut socket).await else {
                        return;
                    };
                    let (status, body) = handler(&request);
                    recorded.lock().unwrap().push(request);
                    let response = format!(
                        "HTTP/1.1 {status} Mock\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
        }
    }

    /// Serves `/api/embeddings` with [`keyword_embedding`] vectors.
    pub async fn embeddings() -> Self {
        Self::start(|request| {
            let texts: Vec<String> =
                serde_json::from_value(request.json()["texts"].clone()).unwrap_or_default();
            let embeddings: Vec<Embedding> = texts.iter().map(|t| keyword_embedding(t)).collect();
            (200, serde_json::json!({ "embeddings": embeddings }).to_string())
        })
        .await
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            line.to_lowercase()
                .strip_prefix("content-length:")
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    Some(CapturedRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buffer[header_end..]).to_string(),
        head,
    })
}
