use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Outcome of a malware scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    /// Carries the signature name reported by the scanner.
    Infected(String),
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict>;
}

/// Streams files to a clamd daemon using the `INSTREAM` command.
pub struct ClamdScanner {
    addr: String,
    timeout: Duration,
}

/// clamd rejects chunks above its StreamMaxLength; stay well below it.
const CHUNK_SIZE: usize = 64 * 1024;

impl ClamdScanner {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    async fn instream(&self, data: &[u8]) -> Result<String> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("connect to clamd at {}", self.addr))?;

        stream.write_all(b"zINSTREAM\0").await?;
        for chunk in data.chunks(CHUNK_SIZE) {
            stream.write_all(&(chunk.len() as u32).to_be_bytes()).await?;
            stream.write_all(chunk).await?;
        }
        stream.write_all(&0u32.to_be_bytes()).await?;
        stream.flush().await?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await?;
        let reply = String::from_utf8_lossy(&reply);
        Ok(reply.trim_end_matches(['\0', '\n']).to_string())
    }
}

#[async_trait]
impl MalwareScanner for ClamdScanner {
    async fn scan(&self, data: &[u8]) -> Result<ScanVerdict> {
        let reply = tokio::time::timeout(self.timeout, self.instream(data))
            .await
            .context("clamd scan timed out")??;
        debug!(reply = %reply, "clamd reply");
        parse_reply(&reply)
    }
}

/// Parse `stream: OK` / `stream: <name> FOUND` / `... ERROR`.
fn parse_reply(reply: &str) -> Result<ScanVerdict> {
    let body = reply.split_once(": ").map_or(reply, |(_, rest)| rest);
    if body == "OK" {
        return Ok(ScanVerdict::Clean);
    }
    if let Some(signature) = body.strip_suffix(" FOUND") {
        return Ok(ScanVerdict::Infected(signature.to_string()));
    }
    bail!("unexpected clamd reply: {}", reply)
}
