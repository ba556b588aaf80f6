//! Shared helpers for the assistant integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bassist_core::protocol::{EventSubtype, TlvTag};
use bassist_core::{
    Address, AssistantConfig, BroadcastId, Command, ConnHandle, Message, MessageType, PaInterval,
    ReceiveState,
};
use bassist_runtime::testing::MockLinkLayer;
use bassist_runtime::{Assistant, AssistantBuilder, AssistantHandle, LinkEvent, ScanReport};
use tokio::sync::mpsc;

pub const SOURCE_ID: u32 = 0x1A2B3C;

pub fn source_address() -> Address {
    Address::random([0x01, 0x02, 0x03, 0x04, 0x05, 0xC6])
}

pub fn sink_address(n: u8) -> Address {
    Address::public([n, 0x10, 0x20, 0x30, 0x40, 0x50])
}

/// Extended advertising data of a broadcast source with id 0x1A2B3C
pub fn source_ad() -> Vec<u8> {
    vec![0x06, 0x16, 0x52, 0x18, 0x3C, 0x2B, 0x1A]
}

/// Advertising data of a sink exposing BASS service data
pub fn sink_ad() -> Vec<u8> {
    vec![0x03, 0x16, 0x4F, 0x18, 0x05, 0x09, b'B', b'u', b'd', b's']
}

/// Periodic advertising data carrying a one-subgroup, two-BIS BASE
pub fn base_ad() -> Vec<u8> {
    let body = [
        0x40, 0x9C, 0x00, // presentation delay 40 ms
        0x01, // subgroups
        0x02, // bis in subgroup
        0x06, 0x00, 0x00, 0x00, 0x00, // LC3
        0x00, // codec config
        0x00, // metadata
        0x01, 0x00, // bis 1
        0x02, 0x00, // bis 2
    ];
    let mut ad = vec![(body.len() + 3) as u8, 0x16, 0x51, 0x18];
    ad.extend_from_slice(&body);
    ad
}

pub fn source_report() -> ScanReport {
    ScanReport {
        address: source_address(),
        rssi: -45,
        sid: 2,
        connectable: false,
        interval: PaInterval(160),
        data: source_ad(),
    }
}

pub fn sink_report(n: u8) -> ScanReport {
    ScanReport {
        address: sink_address(n),
        rssi: -60,
        sid: 0,
        connectable: true,
        interval: PaInterval(0),
        data: sink_ad(),
    }
}

pub fn receive_state(source_id: u8) -> ReceiveState {
    ReceiveState {
        source_id,
        address: source_address(),
        sid: 2,
        broadcast_id: BroadcastId::new(SOURCE_ID),
        ..ReceiveState::default()
    }
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

/// A running assistant on a mock link layer.
///
/// Link events are handed straight to the assistant so their effects are
/// visible as soon as [`Harness::deliver`] returns; commands go through the
/// command worker like a controller's would.
pub struct Harness {
    pub link: Arc<MockLinkLayer>,
    pub handle: AssistantHandle,
    output: mpsc::Receiver<Message>,
    frames: VecDeque<Message>,
    seq: u8,
}

impl Harness {
    pub async fn start() -> Self {
        Self::with_config(AssistantConfig::testing()).await
    }

    pub async fn with_config(config: AssistantConfig) -> Self {
        let link = Arc::new(MockLinkLayer::new());
        let mut handle = AssistantBuilder::new(link.clone())
            .with_config(config)
            .build_and_start()
            .await
            .expect("assistant starts");
        let output = handle.take_output_receiver().expect("output receiver");
        Self { link, handle, output, frames: VecDeque::new(), seq: 0 }
    }

    pub fn assistant(&self) -> &Arc<Assistant> {
        self.handle.assistant()
    }

    /// Queue a command without waiting for its response; returns its seq
    pub async fn send(&mut self, command: Command) -> u8 {
        self.seq = self.seq.wrapping_add(1);
        let message = command.to_message(self.seq).expect("command encodes");
        self.handle.send_command(message).await.expect("command queued");
        self.seq
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.handle.send_command(message).await.expect("command queued");
    }

    /// Wait for the response to `seq`, keeping every other frame
    pub async fn response(&mut self, seq: u8) -> i32 {
        let wait = async {
            loop {
                let frame = self.output.recv().await.expect("assistant running");
                if frame.kind == MessageType::Response && frame.seq == seq {
                    return frame;
                }
                self.frames.push_back(frame);
            }
        };
        let frame = tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("response arrives");
        frame.return_code().expect("response carries a return code")
    }

    pub async fn command(&mut self, command: Command) -> i32 {
        let seq = self.send(command).await;
        self.response(seq).await
    }

    pub async fn deliver(&mut self, event: LinkEvent) {
        self.assistant().handle_link_event(event).await;
    }

    fn drain(&mut self) {
        while let Ok(frame) = self.output.try_recv() {
            self.frames.push_back(frame);
        }
    }

    /// Every event emitted so far and not yet taken
    pub fn events(&mut self) -> Vec<Message> {
        self.drain();
        let (events, rest): (Vec<_>, Vec<_>) =
            self.frames.drain(..).partition(|f| f.kind == MessageType::Event);
        self.frames.extend(rest);
        events
    }

    pub fn events_of(&mut self, subtype: EventSubtype) -> Vec<Message> {
        self.events().into_iter().filter(|e| e.subtype == subtype as u8).collect()
    }

    /// Wait for the next event of `subtype`, dropping events before it
    pub async fn next_event_of(&mut self, subtype: EventSubtype) -> Message {
        let wait = async {
            loop {
                self.drain();
                while let Some(frame) = self.frames.pop_front() {
                    if frame.kind == MessageType::Event && frame.subtype == subtype as u8 {
                        return frame;
                    }
                }
                let frame = self.output.recv().await.expect("assistant running");
                self.frames.push_back(frame);
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait).await.expect("event arrives")
    }

    /// Connect a sink and walk it through security and discovery
    pub async fn connect(&mut self, n: u8) -> ConnHandle {
        let conn = ConnHandle(u16::from(n));
        let address = sink_address(n);
        assert_eq!(self.command(Command::ConnectSink { address }).await, 0);

        self.deliver(LinkEvent::Connected { conn, address, status: 0 }).await;
        self.deliver(LinkEvent::SecurityChanged { conn, status: 0 }).await;
        self.deliver(LinkEvent::BassDiscovered { conn, status: 0, receive_states: 2 }).await;
        self.deliver(LinkEvent::VcpDiscovered { conn, status: 0 }).await;
        conn
    }
}

// ----------------------------------------------------------------------------
// Frame inspection
// ----------------------------------------------------------------------------

pub fn rc_of(event: &Message) -> i32 {
    event.return_code().expect("event carries a return code")
}

pub fn address_of(event: &Message) -> Address {
    let records = event.records().expect("event records");
    records.find_address().expect("address record").as_address().expect("valid address")
}

pub fn broadcast_id_of(event: &Message) -> BroadcastId {
    let records = event.records().expect("event records");
    records
        .find(TlvTag::BroadcastId)
        .expect("broadcast id record")
        .as_broadcast_id()
        .expect("valid broadcast id")
}

/// Poll `condition` until it holds, failing the test after a while
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never held");
}
