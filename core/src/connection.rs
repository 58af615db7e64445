//! Transport and the per-connection read/dispatch loop
//!
//! A [`Connection`] owns one transport plus the session, tracker and write
//! queue that live exactly as long as it does. Lines are parsed, run through
//! the session's bookkeeping, then dispatched, strictly in arrival order.

use crate::config::ServerConfig;
use crate::module::ModuleManager;
use crate::session::Session;
use crate::tracker::Tracker;
use crate::{tls, Client, Config, Error, Message, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 4096;

/// Anything a connection can run over: TCP, TLS, or an in-memory pipe
pub trait ConnectionStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ConnectionStream for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Open the transport described by the server config
pub async fn connect(server: &ServerConfig) -> Result<Box<dyn ConnectionStream>> {
    let addr = format!("{}:{}", server.host, server.port);
    tracing::info!("Connecting to {} ({})", addr, if server.tls { "TLS" } else { "plain" });

    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connection(format!("TCP connect to {} failed: {}", addr, e)))?;
    tcp.set_nodelay(true)?;

    if server.tls {
        let stream = tls::connect(tcp, &server.host, server.tls_verify).await?;
        Ok(Box::new(stream))
    } else {
        Ok(Box::new(tcp))
    }
}

/// One live connection to the server
pub struct Connection<S> {
    id: Uuid,
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    session: Session,
    tracker: Tracker,
    client: Client,
    outgoing: mpsc::UnboundedReceiver<String>,
    registration_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> Connection<S> {
    pub fn new(stream: S, config: &Config) -> Self {
        let session = Session::new(config);
        let (client, outgoing) = Client::new();
        let (reader, writer) = tokio::io::split(stream);

        Self {
            id: session.id(),
            reader,
            writer,
            session,
            tracker: Tracker::new(),
            client,
            outgoing,
            registration_timeout: config.connection.registration_timeout(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// A handle that writes to this connection
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Run until the server closes the connection or a fatal error occurs.
    ///
    /// The transport is released before modules hear about the disconnect.
    pub async fn run(mut self, modules: &mut ModuleManager) -> Result<()> {
        let result = self.serve(modules).await;
        match &result {
            Ok(()) => tracing::info!("Session {} ended", self.id),
            Err(e) => tracing::error!("Session {} terminated: {}", self.id, e),
        }

        drop(self.reader);
        drop(self.writer);
        drop(self.outgoing);
        self.session.close();
        modules.disconnected();

        result
    }

    async fn serve(&mut self, modules: &mut ModuleManager) -> Result<()> {
        self.session.on_connect();
        self.flush_session().await?;

        let deadline = tokio::time::sleep(self.registration_timeout.unwrap_or_default());
        tokio::pin!(deadline);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            tokio::select! {
                read = self.reader.read(&mut buf) => {
                    let n = read?;
                    if n == 0 {
                        tracing::info!("Connection closed by server");
                        return Ok(());
                    }
                    for line in self.session.receive(&buf[..n]) {
                        self.handle_line(&line, modules).await?;
                    }
                }
                Some(line) = self.outgoing.recv() => {
                    self.write_line(&line).await?;
                }
                _ = &mut deadline, if self.registration_timeout.is_some() && !self.session.is_ready() => {
                    return Err(Error::Connection(format!(
                        "Registration did not complete within {:?}",
                        self.registration_timeout.unwrap_or_default()
                    )));
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str, modules: &mut ModuleManager) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }
        tracing::debug!("<< {}", line);

        let message = match Message::parse(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping unparseable line {:?}: {}", line, e);
                return Ok(());
            }
        };

        self.session.handle_message(&message)?;
        self.flush_session().await?;

        modules.dispatch(&self.session, &mut self.tracker, &self.client, &message)?;
        self.flush_outgoing().await
    }

    /// Write module replies queued while handling the current line, so they
    /// go out before anything produced by the next one
    async fn flush_outgoing(&mut self) -> Result<()> {
        while let Ok(line) = self.outgoing.try_recv() {
            self.write_line(&line).await?;
        }
        Ok(())
    }

    async fn flush_session(&mut self) -> Result<()> {
        for line in self.session.take_outgoing() {
            self.write_line(&line).await?;
        }
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        tracing::debug!(">> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
