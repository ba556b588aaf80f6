//! Turning subcommands into protocol commands

use bassist_core::{AddSourceRequest, Address, BroadcastCode, BroadcastId, Command, PaInterval, Sirk};

use crate::cli::Commands;
use crate::error::{CliError, Result};

/// Build the protocol command for a subcommand. `Monitor` sends nothing.
pub fn to_command(command: &Commands) -> Result<Option<Command>> {
    let command = match command {
        Commands::ScanSinks => Command::StartSinkScan,
        Commands::ScanSources { attempts } => Command::StartSourceScan { pa_sync_attempts: *attempts },
        Commands::ScanSet { sirk, size } => {
            Command::StartCsisScan { sirk: parse_key(sirk)?, set_size: *size }
        }
        Commands::StopScan => Command::StopScan,
        Commands::Connect { address } => Command::ConnectSink { address: parse_address(address)? },
        Commands::Disconnect { address } => {
            Command::DisconnectSink { address: parse_address(address)? }
        }
        Commands::AddSource { address, sid, interval, broadcast_id, bis_sync } => {
            Command::AddSource(AddSourceRequest {
                address: parse_address(address)?,
                sid: *sid,
                pa_interval: PaInterval(*interval),
                broadcast_id: parse_broadcast_id(broadcast_id)?,
                bis_sync: bis_sync.iter().map(|b| parse_hex_u32(b)).collect::<Result<_>>()?,
            })
        }
        Commands::RemoveSource { source_id, subgroups } => {
            Command::RemoveSource { source_id: *source_id, num_subgroups: *subgroups }
        }
        Commands::BroadcastCode { source_id, code, hex } => Command::SetBroadcastCode {
            source_id: *source_id,
            code: if *hex { parse_key(code)? } else { text_code(code)? },
        },
        Commands::PaSync { address, sid, interval } => Command::PaSync {
            address: parse_address(address)?,
            sid: *sid,
            pa_interval: PaInterval(*interval),
        },
        Commands::Volume { address, level } => {
            Command::SetVolume { address: parse_address(address)?, volume: *level }
        }
        Commands::Mute { address } => Command::Mute { address: parse_address(address)? },
        Commands::Unmute { address } => Command::Unmute { address: parse_address(address)? },
        Commands::Reset => Command::Reset,
        Commands::Heartbeat => Command::Heartbeat,
        Commands::Monitor => return Ok(None),
    };
    Ok(Some(command))
}

pub fn parse_address(s: &str) -> Result<Address> {
    s.parse()
        .map_err(|e| CliError::InvalidArgument(format!("bad address '{}': {}", s, e)))
}

/// A 16-byte key given as 32 hex digits
pub fn parse_key(s: &str) -> Result<Sirk> {
    let bytes = hex::decode(s.trim_start_matches("0x"))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| {
            CliError::InvalidArgument(format!("key must be 16 bytes, got {}", bytes.len()))
        })
}

/// A broadcast code given as text, zero padded to 16 bytes
pub fn text_code(s: &str) -> Result<BroadcastCode> {
    let text = s.as_bytes();
    if text.is_empty() || text.len() > 16 {
        return Err(CliError::InvalidArgument(format!(
            "broadcast code must be 1 to 16 bytes, got {}",
            text.len()
        )));
    }
    let mut code = [0u8; 16];
    code[..text.len()].copy_from_slice(text);
    Ok(code)
}

pub fn parse_broadcast_id(s: &str) -> Result<BroadcastId> {
    let value = parse_hex_u32(s)?;
    BroadcastId::try_from(value).map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn parse_hex_u32(s: &str) -> Result<u32> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| CliError::InvalidArgument(format!("bad hex value '{}': {}", s, e)))
}
