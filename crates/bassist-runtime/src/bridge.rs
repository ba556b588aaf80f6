//! Byte-stream bridge
//!
//! Pumps frames between a controller byte stream and an assistant's
//! channels: command frames read from the stream go to the command worker,
//! RESPONSE and EVENT frames from the emitter are written back. A frame that
//! fails to decode is logged and dropped.

use bassist_core::protocol::{read_message, write_message, StreamError};
use bassist_core::Message;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::builder::AssistantHandle;

/// Why a bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The controller closed its end of the stream
    StreamClosed,
    /// The assistant's command or output channel closed
    AssistantStopped,
}

/// Run a bridge until the stream or the assistant goes away
pub async fn run_bridge<S>(
    stream: S,
    commands: mpsc::Sender<Message>,
    mut output: mpsc::Receiver<Message>,
) -> Result<BridgeExit, StreamError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    info!("Controller bridge running");

    let inbound = async {
        loop {
            match read_message(&mut reader).await {
                Ok(Some(message)) => {
                    debug!("Frame from controller: subtype {:#04x}, seq {}", message.subtype, message.seq);
                    if commands.send(message).await.is_err() {
                        return Ok(BridgeExit::AssistantStopped);
                    }
                }
                Ok(None) => {
                    info!("Controller closed the stream");
                    return Ok(BridgeExit::StreamClosed);
                }
                Err(StreamError::Protocol(e)) => warn!("Dropping malformed frame: {}", e),
                Err(e) => return Err(e),
            }
        }
    };

    let outbound = async {
        while let Some(message) = output.recv().await {
            write_message(&mut writer, &message).await?;
        }
        Ok::<_, StreamError>(BridgeExit::AssistantStopped)
    };

    // Each direction owns its half of the stream, so a frame is never
    // abandoned part way through
    tokio::select! {
        exit = inbound => exit,
        exit = outbound => exit,
    }
}

/// Bridge `stream` to a running assistant. Takes the handle's output
/// receiver, so only one bridge can serve an assistant.
pub async fn serve<S>(handle: &mut AssistantHandle, stream: S) -> Result<BridgeExit, StreamError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let Some(output) = handle.take_output_receiver() else {
        warn!("Assistant output is already bridged");
        return Ok(BridgeExit::AssistantStopped);
    };
    run_bridge(stream, handle.command_sender(), output).await
}
