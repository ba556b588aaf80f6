//! One controller session: connect, send, print

use std::io::Write;

use bassist_core::Message;
use tracing::{info, warn};

use crate::cli::Commands;
use crate::client::Client;
use crate::commands::to_command;
use crate::config::CliConfig;
use crate::error::Result;
use crate::render::FrameView;

/// Writes frames to stdout as text or JSON lines
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    json: bool,
}

impl Printer {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn line(&self, message: &Message) -> String {
        let view = FrameView::new(message);
        if self.json {
            serde_json::to_string(&view).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
        } else {
            view.to_text()
        }
    }

    pub fn print(&self, message: &Message) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", self.line(message)) {
            warn!("Failed to write to stdout: {}", e);
        }
    }
}

/// Run `command` against the bridge and return the RESPONSE code, if any
pub async fn run(command: &Commands, config: &CliConfig) -> Result<Option<i32>> {
    let protocol_command = to_command(command)?;
    let printer = Printer::new(config.json);
    let mut client = Client::connect(&config.endpoint, config.response_timeout()).await?;

    let Some(protocol_command) = protocol_command else {
        info!("Monitoring events, press Ctrl+C to stop");
        let window = (config.follow_ms > 0).then(|| config.follow());
        client.follow(window, |m| printer.print(m)).await?;
        return Ok(None);
    };

    let rc = client.request(&protocol_command, |m| printer.print(m)).await?;
    if config.json {
        println!("{}", serde_json::json!({ "kind": "result", "rc": rc }));
    } else {
        println!("rc={}", rc);
    }

    if config.follow_ms > 0 {
        client.follow(Some(config.follow()), |m| printer.print(m)).await?;
    }
    Ok(Some(rc))
}
