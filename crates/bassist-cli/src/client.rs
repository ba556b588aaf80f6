//! Framed protocol client
//!
//! Sends one command at a time and waits for the RESPONSE with the matching
//! sequence number. Events that arrive in between are handed to the caller.

use std::time::Duration;

use bassist_core::protocol::{read_message, write_message};
use bassist_core::{Command, Message, MessageType, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{CliError, Result};

pub struct Client<S> {
    stream: S,
    peer: String,
    seq: u8,
    response_timeout: Duration,
}

impl Client<TcpStream> {
    pub async fn connect(endpoint: &str, response_timeout: Duration) -> Result<Self> {
        info!("Connecting to bridge at {}", endpoint);
        let stream = TcpStream::connect(endpoint).await?;
        Ok(Self::new(stream, endpoint, response_timeout))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl Into<String>, response_timeout: Duration) -> Self {
        Self { stream, peer: peer.into(), seq: 0, response_timeout }
    }

    /// Send `command` and return the code of its RESPONSE
    pub async fn request(
        &mut self,
        command: &Command,
        mut on_event: impl FnMut(&Message),
    ) -> Result<i32> {
        self.seq = self.seq.wrapping_add(1);
        let message = command.to_message(self.seq)?;
        debug!("Sending {:?} (seq {})", command.subtype(), self.seq);
        write_message(&mut self.stream, &message).await?;

        let deadline = Instant::now() + self.response_timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, read_message(&mut self.stream)).await {
                Ok(frame) => frame?,
                Err(_) => {
                    return Err(CliError::Timeout {
                        subtype: message.subtype,
                        seq: message.seq,
                        waited_ms: self.response_timeout.as_millis() as u64,
                    })
                }
            };
            let Some(frame) = frame else {
                return Err(CliError::ConnectionClosed(self.peer.clone()));
            };

            if frame.kind == MessageType::Response
                && frame.seq == message.seq
                && frame.subtype == message.subtype
            {
                return frame
                    .return_code()
                    .ok_or(CliError::Protocol(ProtocolError::MissingField("error code")));
            }
            on_event(&frame);
        }
    }

    /// Hand every incoming frame to `on_event` until `window` elapses, or
    /// until the bridge closes the stream when there is no window
    pub async fn follow(
        &mut self,
        window: Option<Duration>,
        mut on_event: impl FnMut(&Message),
    ) -> Result<()> {
        let deadline = window.map(|window| Instant::now() + window);
        loop {
            let read = read_message(&mut self.stream);
            let frame = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
                    Ok(frame) => frame?,
                    Err(_) => return Ok(()),
                },
                None => read.await?,
            };
            match frame {
                Some(frame) => on_event(&frame),
                None => {
                    info!("Bridge at {} closed the connection", self.peer);
                    return Ok(());
                }
            }
        }
    }
}
