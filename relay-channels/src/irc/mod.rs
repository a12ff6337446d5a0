//! IRC channel adapter.
//!
//! Connects to a single server and channel over TCP (optionally TLS),
//! registers, keeps the connection alive and turns PRIVMSG lines into
//! [`ChannelMessage`]s. A dropped connection is re-established after a fixed
//! pause until [`Channel::shutdown`] is called.

pub mod protocol;

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelError, ChannelResult};
use async_trait::async_trait;
use protocol::IrcLine;
use relay_common::config::IrcConfig;
use relay_common::util::truncate_with_ellipsis;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_rustls::rustls::{self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

/// Longest line a server may send, CRLF included (RFC 1459).
pub const MAX_LINE_BYTES: usize = 512;

/// Byte stream the connection runs over: plain TCP or TLS.
trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

type BoxedStream = Box<dyn IrcStream>;
type LineReader = BufReader<ReadHalf<BoxedStream>>;

/// What a single server line asks of us.
#[derive(Debug)]
enum Event {
    /// Write this raw line back to the server
    Reply(String),
    /// Registration accepted under this nick; join the channel
    Registered(String),
    /// We joined a channel
    Joined(String),
    /// The server changed our nick
    NickChanged(String),
    /// A chat line for the relay
    Inbound(ChannelMessage),
    /// A line we understood the command of but not the shape
    Malformed(ChannelError),
    /// Chosen nick is taken
    NickInUse,
    /// Server is closing the link
    ServerError(String),
    Ignore,
}

/// How a connection ended.
#[derive(Debug)]
enum SessionEnd {
    Closed,
    Lost(ChannelError),
    InboundClosed,
}

/// Outcome of reading one line.
#[derive(Debug, PartialEq, Eq)]
enum LineRead {
    Line,
    /// Longer than [`MAX_LINE_BYTES`]; the rest of it was discarded
    Oversized,
    Eof,
}

/// Read one line into `buf`, never buffering more than [`MAX_LINE_BYTES`].
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<LineRead> {
    buf.clear();
    let read = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await?;

    if read == 0 {
        return Ok(LineRead::Eof);
    }
    if buf.ends_with(b"\n") || read < MAX_LINE_BYTES {
        return Ok(LineRead::Line);
    }

    loop {
        buf.clear();
        let read = AsyncReadExt::take(&mut *reader, MAX_LINE_BYTES as u64)
            .read_until(b'\n', buf)
            .await?;
        if read == 0 || buf.ends_with(b"\n") {
            buf.clear();
            return Ok(LineRead::Oversized);
        }
    }
}

/// IRC channel.
pub struct IrcChannel {
    config: IrcConfig,
    /// Nick the server knows us by; differs from the configured one after a collision
    current_nick: std::sync::Mutex<String>,
    reconnect_delay: Duration,
    quitting: AtomicBool,
    reader: Mutex<Option<LineReader>>,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
}

impl IrcChannel {
    pub fn new(config: IrcConfig) -> Self {
        Self {
            current_nick: std::sync::Mutex::new(config.nick.clone()),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            config,
            quitting: AtomicBool::new(false),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    /// Set the pause before reconnecting.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Nick currently in use on the server.
    pub fn current_nick(&self) -> String {
        self.current_nick
            .lock()
            .map(|nick| nick.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_nick(&self, nick: &str) {
        let mut current = self
            .current_nick
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = nick.to_string();
    }

    async fn connect(&self) -> ChannelResult<BoxedStream> {
        let address = self.config.address();
        let tcp = TcpStream::connect(&address)
            .await
            .map_err(|e| ChannelError::Connection(format!("{address}: {e}")))?;

        if !self.config.use_tls {
            return Ok(Box::new(tcp));
        }

        let connector = TlsConnector::from(Arc::new(tls_config(self.config.verify_tls)?));
        let server_name = ServerName::try_from(self.config.server.clone())
            .map_err(|e| ChannelError::Connection(format!("invalid server name: {e}")))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ChannelError::Connection(format!("TLS handshake failed: {e}")))?;

        Ok(Box::new(tls))
    }

    /// Open a connection, install its writer and send NICK/USER.
    async fn connect_and_register(&self) -> ChannelResult<LineReader> {
        let stream = self.connect().await?;
        let (read_half, write_half) = tokio::io::split(stream);
        *self.writer.lock().await = Some(write_half);

        self.set_nick(&self.config.nick);
        self.write_line(&protocol::nick(&self.config.nick)).await?;
        self.write_line(&protocol::user(&self.config.nick, &self.config.real_name))
            .await?;

        tracing::info!(
            server = %self.config.address(),
            nick = %self.config.nick,
            tls = self.config.use_tls,
            "Connected to IRC server"
        );
        Ok(BufReader::new(read_half))
    }

    async fn write_line(&self, line: &str) -> ChannelResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ChannelError::NotReady)?;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))
    }

    /// Decide what to do with one server line.
    fn interpret(&self, line: &IrcLine) -> Event {
        match line.command.as_str() {
            "PING" => Event::Reply(protocol::pong(line.trailing().unwrap_or_default())),
            "001" => Event::Registered(line.param(0).unwrap_or(&self.config.nick).to_string()),
            "433" => Event::NickInUse,
            "ERROR" => Event::ServerError(line.trailing().unwrap_or_default().to_string()),
            "JOIN" if self.is_self(line) => {
                Event::Joined(line.param(0).unwrap_or_default().to_string())
            }
            "NICK" if self.is_self(line) => match line.trailing() {
                Some(nick) => Event::NickChanged(nick.to_string()),
                None => Event::Ignore,
            },
            "PRIVMSG" => match self.privmsg(line) {
                Ok(Some(message)) => Event::Inbound(message),
                Ok(None) => Event::Ignore,
                Err(e) => Event::Malformed(e),
            },
            _ => Event::Ignore,
        }
    }

    fn is_self(&self, line: &IrcLine) -> bool {
        let current = self.current_nick();
        line.source_nick()
            .is_some_and(|nick| nick.eq_ignore_ascii_case(&current))
    }

    /// Turn a PRIVMSG into a message. Our own lines yield `None`.
    fn privmsg(&self, line: &IrcLine) -> ChannelResult<Option<ChannelMessage>> {
        if self.is_self(line) {
            return Ok(None);
        }

        let (Some(sender), Some(target), Some(text)) =
            (line.source_nick(), line.param(0), line.param(1))
        else {
            return Err(ChannelError::InvalidMessage(format!(
                "PRIVMSG without sender, target or text: {:?}",
                line.params
            )));
        };
        let is_direct = target.eq_ignore_ascii_case(&self.current_nick());

        Ok(Some(ChannelMessage::new(
            ChannelType::Irc,
            sender,
            target,
            text,
            is_direct,
        )))
    }

    /// Serve one connection until it ends.
    async fn run_session(&self, reader: &mut LineReader, inbound: &mpsc::Sender<ChannelMessage>) -> SessionEnd {
        let mut buf = Vec::with_capacity(MAX_LINE_BYTES);

        loop {
            match read_line(reader, &mut buf).await {
                Ok(LineRead::Line) => {}
                Ok(LineRead::Oversized) => {
                    tracing::warn!(limit = MAX_LINE_BYTES, "Dropped oversized line from server");
                    continue;
                }
                Ok(LineRead::Eof) => return SessionEnd::Closed,
                Err(e) => return SessionEnd::Lost(e.into()),
            }

            let raw = String::from_utf8_lossy(&buf);
            let Some(line) = IrcLine::parse(&raw) else {
                continue;
            };

            let written = match self.interpret(&line) {
                Event::Reply(reply) => self.write_line(&reply).await,
                Event::Registered(nick) => {
                    self.set_nick(&nick);
                    tracing::info!(nick = %nick, channel = %self.config.channel, "Registered, joining channel");
                    self.write_line(&protocol::join(&self.config.channel)).await
                }
                Event::Joined(channel) => {
                    tracing::info!(channel = %channel, "Joined channel");
                    Ok(())
                }
                Event::NickChanged(nick) => {
                    tracing::info!(nick = %nick, "Nick changed");
                    self.set_nick(&nick);
                    Ok(())
                }
                Event::Inbound(message) => {
                    tracing::debug!(
                        sender = %message.sender,
                        target_name = %message.target,
                        direct = message.is_direct,
                        "Received PRIVMSG"
                    );
                    if inbound.send(message).await.is_err() {
                        return SessionEnd::InboundClosed;
                    }
                    Ok(())
                }
                Event::Malformed(e) => {
                    tracing::warn!(error = %e, "Skipping malformed line");
                    Ok(())
                }
                Event::NickInUse => {
                    let nick = format!("{}_", self.current_nick());
                    tracing::warn!(nick = %nick, "Nick in use, retrying");
                    self.set_nick(&nick);
                    self.write_line(&protocol::nick(&nick)).await
                }
                Event::ServerError(reason) => {
                    tracing::error!(reason = %reason, "IRC server closed the link");
                    return SessionEnd::Lost(ChannelError::Connection(reason));
                }
                Event::Ignore => Ok(()),
            };

            if let Err(e) = written {
                return SessionEnd::Lost(e);
            }
        }
    }

    fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for IrcChannel {
    fn name(&self) -> &'static str {
        "irc"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        let reader = self.connect_and_register().await?;
        *self.reader.get_mut() = Some(reader);
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        self.write_line(&protocol::privmsg(&message.target, &message.text))
            .await?;

        tracing::trace!(
            target_name = %message.target,
            text = %truncate_with_ellipsis(&message.text, 80),
            "Sent PRIVMSG"
        );
        Ok(uuid::Uuid::new_v4().to_string())
    }

    /// Serve the connection, reconnecting after every drop until shutdown.
    async fn listen(&self, inbound: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        let mut slot = self.reader.lock().await;

        loop {
            if let Some(reader) = slot.as_mut() {
                match self.run_session(reader, &inbound).await {
                    SessionEnd::InboundClosed => {
                        return Err(ChannelError::Internal("inbound queue closed".into()));
                    }
                    SessionEnd::Closed if self.is_quitting() => return Ok(()),
                    SessionEnd::Closed => {
                        tracing::warn!(server = %self.config.address(), "Disconnected from IRC server");
                    }
                    SessionEnd::Lost(e) => {
                        tracing::warn!(server = %self.config.address(), error = %e, "Connection lost");
                    }
                }
                *slot = None;
                *self.writer.lock().await = None;
            }

            if self.is_quitting() {
                return Ok(());
            }

            tracing::info!(
                delay_secs = self.reconnect_delay.as_secs_f64(),
                "Reconnecting"
            );
            tokio::time::sleep(self.reconnect_delay).await;
            if self.is_quitting() {
                return Ok(());
            }

            match self.connect_and_register().await {
                Ok(reader) => *slot = Some(reader),
                Err(e) => tracing::warn!(error = %e, "Reconnect failed"),
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        if self.writer.lock().await.is_some() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        self.quitting.store(true, Ordering::SeqCst);
        self.write_line(&protocol::quit("Goodbye")).await?;

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        tracing::info!("IRC connection closed");
        Ok(())
    }
}

fn tls_config(verify: bool) -> ChannelResult<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let mut config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ChannelError::Connection(format!("TLS setup failed: {e}")))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if !verify {
        tracing::warn!("TLS certificate verification is disabled");
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(AcceptAnyCert(provider)));
    }

    Ok(config)
}

/// Certificate verifier for servers with self-signed certificates.
/// Signatures are still checked; the chain is not.
#[derive(Debug)]
struct AcceptAnyCert(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
