//! Inbound side: recognition results published by the out-of-process classifier.
//!
//! The classifier speaks newline- or datagram-delimited JSON:
//!
//! ```text
//! {"type":"ready"}
//! {"type":"frame","timestamp_ms":1033,"hands":[{"side":"Right","gesture":{"category":"Open_Palm","confidence":0.93},"landmarks":[{"x":0.41,"y":0.66}]}]}
//! {"type":"error","message":"camera busy"}
//! ```

use crate::frame::RecognitionFrame;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::net::UdpSocket;
use tokio::process::{Child, ChildStdout, Command};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClassifierMessage {
    Ready,
    Frame(RecognitionFrame),
    Error { message: String },
}

impl ClassifierMessage {
    /// Parses one message, logging and discarding anything malformed.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        match serde_json::from_slice(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(
                    "Ignoring malformed classifier message ({}): {}",
                    e,
                    String::from_utf8_lossy(raw).trim()
                );
                None
            }
        }
    }
}

#[async_trait]
pub trait FrameSource: Send {
    /// Next well-formed message, or `None` once the classifier has gone away.
    async fn recv_message(&mut self) -> Result<Option<ClassifierMessage>>;

    /// Blocks until the classifier reports it is initialized.
    ///
    /// Frames that arrive earlier are dropped.
    async fn wait_ready(&mut self) -> Result<()> {
        loop {
            match self.recv_message().await? {
                Some(ClassifierMessage::Ready) => return Ok(()),
                Some(ClassifierMessage::Frame(frame)) => {
                    debug!("Dropping frame {} received before classifier was ready", frame.timestamp_ms);
                }
                Some(ClassifierMessage::Error { message }) => {
                    warn!("Classifier error while starting: {}", message);
                }
                None => bail!("Classifier went away before reporting ready"),
            }
        }
    }

    async fn next_frame(&mut self) -> Result<Option<RecognitionFrame>> {
        loop {
            match self.recv_message().await? {
                Some(ClassifierMessage::Frame(frame)) => return Ok(Some(frame)),
                Some(ClassifierMessage::Ready) => debug!("Classifier announced ready again"),
                Some(ClassifierMessage::Error { message }) => {
                    warn!("Classifier error: {}", message);
                }
                None => return Ok(None),
            }
        }
    }
}

/// One JSON message per datagram.
pub struct UdpFrameSource {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl UdpFrameSource {
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind classifier socket on {}", addr))?;
        info!("Listening for classifier frames on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            buf: vec![0u8; 64 * 1024],
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl FrameSource for UdpFrameSource {
    async fn recv_message(&mut self) -> Result<Option<ClassifierMessage>> {
        loop {
            let (len, _addr) = self
                .socket
                .recv_from(&mut self.buf)
                .await
                .context("Classifier socket receive failed")?;
            if let Some(message) = ClassifierMessage::parse(&self.buf[..len]) {
                return Ok(Some(message));
            }
        }
    }
}

/// Newline-delimited JSON, from stdin, a pipe, or a recorded session.
pub struct LineFrameSource<R> {
    lines: Lines<R>,
    pending_ready: bool,
}

impl<R> LineFrameSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// With `assume_ready` the stream is treated as ready before its first line.
    pub fn new(reader: R, assume_ready: bool) -> Self {
        Self {
            lines: reader.lines(),
            pending_ready: assume_ready,
        }
    }
}

impl LineFrameSource<Box<dyn AsyncBufRead + Unpin + Send>> {
    pub async fn open(path: &Path, assume_ready: bool) -> Result<Self> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if path == Path::new("-") {
            info!("Reading classifier frames from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        } else {
            let file = File::open(path)
                .await
                .with_context(|| format!("Failed to open frame file {:?}", path))?;
            info!("Reading classifier frames from {:?}", path);
            Box::new(BufReader::new(file))
        };
        Ok(Self::new(reader, assume_ready))
    }
}

#[async_trait]
impl<R> FrameSource for LineFrameSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn recv_message(&mut self) -> Result<Option<ClassifierMessage>> {
        if self.pending_ready {
            self.pending_ready = false;
            return Ok(Some(ClassifierMessage::Ready));
        }
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .context("Failed to read classifier line")?
        {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(message) = ClassifierMessage::parse(line.as_bytes()) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

/// Classifier launched as a child process, reporting on its stdout.
pub struct ProcessFrameSource {
    child: Child,
    inner: LineFrameSource<BufReader<ChildStdout>>,
}

impl ProcessFrameSource {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self> {
        info!("Starting classifier: {} {}", program, args.join(" "));
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start classifier process {:?}", program))?;
        let stdout = child
            .stdout
            .take()
            .context("Classifier process has no stdout")?;
        Ok(Self {
            child,
            inner: LineFrameSource::new(BufReader::new(stdout), false),
        })
    }
}

#[async_trait]
impl FrameSource for ProcessFrameSource {
    async fn recv_message(&mut self) -> Result<Option<ClassifierMessage>> {
        let message = self.inner.recv_message().await?;
        if message.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => warn!("Classifier process exited: {}", status),
                Ok(None) => warn!("Classifier closed its output"),
                Err(e) => warn!("Could not query classifier process: {}", e),
            }
        }
        Ok(message)
    }
}
