//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Bridge endpoint (host:port)
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// How long to wait for a RESPONSE, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Keep printing events for this many milliseconds after the response
    #[arg(short, long)]
    pub follow_ms: Option<u64>,

    /// Print frames as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Scan for sinks exposing the broadcast audio scan service
    ScanSinks,
    /// Scan for broadcast sources
    ScanSources {
        /// PA sync attempts per discovered source
        #[arg(short, long)]
        attempts: Option<u8>,
    },
    /// Scan for the remaining members of a coordinated set
    ScanSet {
        /// Set identity resolving key (32 hex digits)
        sirk: String,
        /// Number of members in the set
        size: u8,
    },
    /// Stop scanning
    StopScan,
    /// Connect to a sink
    Connect {
        /// Sink address, e.g. C0:FF:EE:00:00:01/random
        address: String,
    },
    /// Disconnect from a sink and forget its bond
    Disconnect { address: String },
    /// Ask every connected sink to sync to a broadcast source
    AddSource {
        /// Source address
        address: String,
        /// Advertising set id
        #[arg(long, default_value_t = 0)]
        sid: u8,
        /// PA interval in 1.25 ms units
        #[arg(long, default_value_t = 0xFFFF)]
        interval: u16,
        /// Broadcast id (hex, 24 bits)
        #[arg(long)]
        broadcast_id: String,
        /// BIS sync bitmap per subgroup (hex)
        #[arg(long = "bis", value_delimiter = ',')]
        bis_sync: Vec<String>,
    },
    /// Remove a broadcast source from every connected sink
    RemoveSource {
        source_id: u8,
        /// Number of subgroups the source was added with
        #[arg(long, default_value_t = 1)]
        subgroups: u8,
    },
    /// Provide the broadcast code of an encrypted source
    BroadcastCode {
        source_id: u8,
        /// Code as text (up to 16 bytes) or as 32 hex digits with --hex
        code: String,
        #[arg(long)]
        hex: bool,
    },
    /// Sync to a source's periodic advertising to read its BASE
    PaSync {
        address: String,
        #[arg(long, default_value_t = 0)]
        sid: u8,
        #[arg(long, default_value_t = 0xFFFF)]
        interval: u16,
    },
    /// Set the volume of a sink
    Volume { address: String, level: u8 },
    /// Mute a sink
    Mute { address: String },
    /// Unmute a sink
    Unmute { address: String },
    /// Stop everything and forget every bond
    Reset,
    /// Toggle the periodic heartbeat event
    Heartbeat,
    /// Print events without sending a command
    Monitor,
}
