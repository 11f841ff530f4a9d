//! One protocol session: discover, connect, handshake, run commands, close.
//!
//! [`RpcSession`] exclusively owns its [`Connection`] from connect to close.
//! The connection is released exactly once on every path: explicitly through
//! [`RpcSession::close`], on handshake failure before the error is returned,
//! and otherwise when the session is dropped.

use serde_json::{Map, Value};
use tracing::{info, info_span};

use crate::config::RpcConfig;
use crate::models::{channels_from_data, Channel};
use crate::protocol::codec::FrameReader;
use crate::protocol::command::{deadline_after, CommandChannel};
use crate::protocol::handshake::Handshake;
use crate::protocol::{HandshakeResult, GET_CHANNELS_COMMAND};
use crate::transport::discovery::PathResolver;
use crate::transport::{platform_transport, Connection, Transport};
use crate::{AppError, Result};

/// A handshaken connection ready for commands.
pub struct RpcSession {
    conn: Box<dyn Connection>,
    reader: FrameReader,
    ready: HandshakeResult,
    config: RpcConfig,
}

impl RpcSession {
    /// Discover the endpoint from the environment and open a session over
    /// the platform transport.
    ///
    /// # Errors
    ///
    /// `AppError::Discovery`, `AppError::Connect`, or `AppError::Handshake`.
    pub fn open(config: &RpcConfig) -> Result<Self> {
        let transport = platform_transport();
        Self::open_with(config, &PathResolver::from_env(), transport.as_ref())
    }

    /// Open a session with an explicit resolver and transport.
    ///
    /// Discovery runs first; no connection is attempted if it fails.
    ///
    /// # Errors
    ///
    /// `AppError::Discovery`, `AppError::Connect`, or `AppError::Handshake`.
    pub fn open_with(
        config: &RpcConfig,
        resolver: &PathResolver,
        transport: &dyn Transport,
    ) -> Result<Self> {
        let path = resolver.resolve()?;
        let span = info_span!("rpc_session", transport = transport.name(), path = %path.display());
        let _guard = span.enter();

        let conn = transport.connect(&path)?;
        info!("connected");
        Self::from_connection(config, conn)
    }

    /// Run the handshake over an already open connection.
    ///
    /// The connection is closed before any handshake error is returned.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Handshake` if the peer does not confirm READY
    /// within the configured handshake timeout.
    pub fn from_connection(config: &RpcConfig, mut conn: Box<dyn Connection>) -> Result<Self> {
        let outcome = conn
            .set_read_timeout(Some(config.timeouts.handshake()))
            .map_err(|err| AppError::Handshake(format!("cannot set read timeout: {err}")))
            .and_then(|()| {
                Handshake::new(config.protocol_version, config.client_id.clone())
                    .perform(conn.as_mut())
            });

        match outcome {
            Ok(ready) => Ok(Self {
                conn,
                reader: FrameReader::new(),
                ready,
                config: config.clone(),
            }),
            Err(err) => {
                conn.close();
                Err(err)
            }
        }
    }

    /// What the peer reported when it confirmed the handshake.
    #[must_use]
    pub fn handshake(&self) -> &HandshakeResult {
        &self.ready
    }

    /// Configuration the session was opened with.
    #[must_use]
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// A command channel over this session's connection.
    pub fn channel(&mut self) -> CommandChannel<'_> {
        CommandChannel::new(self.conn.as_mut(), &mut self.reader)
            .with_poll_interval(self.config.timeouts.poll_interval())
    }

    /// Send `name` with `arguments` and wait for the response data, bounded
    /// by the configured command timeout.
    ///
    /// # Errors
    ///
    /// `AppError::Command`, `AppError::Timeout`, `AppError::ConnectionClosed`,
    /// `AppError::Config` for a timeout beyond the clock's range, or a
    /// framing/transport error.
    pub fn execute(&mut self, name: &str, arguments: Map<String, Value>) -> Result<Value> {
        let deadline = deadline_after(self.config.timeouts.command())?;
        let mut channel = self.channel();
        let nonce = channel.send_command(name, arguments)?;
        channel.await_response(&nonce, name, deadline)
    }

    /// List the channels of `guild_id`.
    ///
    /// # Errors
    ///
    /// Any error from [`RpcSession::execute`], or `AppError::Framing` if the
    /// response data is not a channel list.
    pub fn get_channels(&mut self, guild_id: &str) -> Result<Vec<Channel>> {
        let mut args = Map::new();
        args.insert("guild_id".into(), Value::String(guild_id.to_owned()));
        let data = self.execute(GET_CHANNELS_COMMAND, args)?;
        let channels = channels_from_data(data)?;
        info!(guild_id, count = channels.len(), "channels received");
        Ok(channels)
    }

    /// Close the connection now.
    pub fn close(mut self) {
        self.conn.close();
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        self.conn.close();
    }
}
