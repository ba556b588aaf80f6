//! Scanning and periodic advertising sync through a running assistant

mod common;

use std::time::Duration;

use bassist_core::protocol::{EventSubtype, TlvTag};
use bassist_core::{advertising::ad_type, csis, BroadcastId, Command, PaInterval, SyncTimeout};
use bassist_runtime::managers::{PaSyncPhase, ScanMask};
use bassist_runtime::testing::LinkCall;
use bassist_runtime::{LinkEvent, PaSyncParams, ScanReport};
use common::*;

#[tokio::test]
async fn test_source_found_synced_and_base_reported() {
    let mut h = Harness::start().await;
    assert_eq!(h.command(Command::StartSourceScan { pa_sync_attempts: Some(2) }).await, 0);
    assert_eq!(h.link.count("start_scan"), 1);
    assert_eq!(h.assistant().scan_mask(), ScanMask::SOURCE);

    h.deliver(LinkEvent::ScanReport(source_report())).await;

    let found = h.events_of(EventSubtype::SourceFound);
    assert_eq!(found.len(), 1);
    assert!(found[0].payload.starts_with(&source_ad()));
    assert_eq!(broadcast_id_of(&found[0]), BroadcastId::new(SOURCE_ID));
    assert_eq!(address_of(&found[0]), source_address());

    assert_eq!(
        h.link.last("create_pa_sync"),
        Some(LinkCall::CreatePaSync(PaSyncParams {
            address: source_address(),
            sid: 2,
            skip: 5,
            timeout: SyncTimeout(400),
            filter_duplicates: true,
        }))
    );
    assert_eq!(h.assistant().source(&source_address()).unwrap().sync_attempts_remaining, 1);
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Syncing);

    h.deliver(LinkEvent::PaSynced).await;
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Synced);

    h.deliver(LinkEvent::PaData { address: source_address(), data: base_ad() }).await;

    let bases = h.events_of(EventSubtype::SourceBaseFound);
    assert_eq!(bases.len(), 1);
    let records = bases[0].records().unwrap();
    assert_eq!(records.find(TlvTag::Base).unwrap().value, base_ad());
    assert_eq!(address_of(&bases[0]), source_address());

    assert_eq!(h.link.count("delete_pa_sync"), 1);
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Idle);
    assert!(h.assistant().pa_session().is_none());
    assert_eq!(h.assistant().source(&source_address()).unwrap().sync_attempts_remaining, 0);
    assert_eq!(h.assistant().stats().bases_found, 1);
}

#[tokio::test]
async fn test_no_sync_without_attempts() {
    let mut h = Harness::start().await;
    assert_eq!(h.command(Command::StartSourceScan { pa_sync_attempts: None }).await, 0);

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;

    assert_eq!(h.events_of(EventSubtype::SourceFound).len(), 2);
    assert_eq!(h.link.count("create_pa_sync"), 0);
    assert_eq!(h.assistant().registry_len(), 1);
}

#[tokio::test]
async fn test_reports_ignored_while_idle() {
    let mut h = Harness::start().await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    h.deliver(LinkEvent::ScanReport(sink_report(1))).await;

    assert!(h.events().is_empty());
    assert_eq!(h.assistant().registry_len(), 0);
}

#[tokio::test]
async fn test_pa_data_from_other_advertiser_ignored() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: Some(1) }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    h.deliver(LinkEvent::PaSynced).await;

    h.deliver(LinkEvent::PaData { address: sink_address(9), data: base_ad() }).await;
    h.deliver(LinkEvent::PaData { address: source_address(), data: vec![0x02, 0x01, 0x06] }).await;

    assert!(h.events_of(EventSubtype::SourceBaseFound).is_empty());
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Synced);
    assert_eq!(h.link.count("delete_pa_sync"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_deletes_stalled_sync() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: Some(2) }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Syncing);

    // interval 160 * 1.25 ms * 20 = 4 s
    tokio::time::sleep(Duration::from_millis(3900)).await;
    assert_eq!(h.link.count("delete_pa_sync"), 0);

    assert!(h.link.wait_for_within("delete_pa_sync", 1, Duration::from_secs(1)).await);
    let assistant = h.assistant().clone();
    eventually(|| assistant.pa_phase() == PaSyncPhase::Idle).await;
    assert_eq!(assistant.pa_session(), None);

    // The source still has an attempt left
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.link.count("create_pa_sync"), 2);
    assert_eq!(h.assistant().source(&source_address()).unwrap().sync_attempts_remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn test_synced_session_outlives_watchdog() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: Some(1) }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    h.deliver(LinkEvent::PaSynced).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.link.count("delete_pa_sync"), 0);
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Synced);
}

#[tokio::test]
async fn test_pa_terminated_clears_session() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: Some(1) }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;

    h.deliver(LinkEvent::PaTerminated { reason: 0x3E }).await;
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Idle);
    assert!(h.assistant().pa_session().is_none());
}

#[tokio::test]
async fn test_pa_sync_command_codes() {
    let mut h = Harness::start().await;
    let cmd = Command::PaSync { address: source_address(), sid: 2, pa_interval: PaInterval(160) };

    assert_eq!(h.command(cmd.clone()).await, -22);

    h.command(Command::StartSourceScan { pa_sync_attempts: None }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;

    assert_eq!(h.command(cmd.clone()).await, 0);
    assert_eq!(h.link.count("create_pa_sync"), 1);
    assert_eq!(h.command(cmd.clone()).await, -16);

    h.link.fail("create_pa_sync", -12);
    h.deliver(LinkEvent::PaTerminated { reason: 0 }).await;
    assert_eq!(h.command(cmd).await, -12);
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Idle);
}

#[tokio::test]
async fn test_base_with_pa_sync_command_deletes_sync() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: None }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    let cmd = Command::PaSync { address: source_address(), sid: 2, pa_interval: PaInterval(160) };
    assert_eq!(h.command(cmd).await, 0);

    h.deliver(LinkEvent::PaSynced).await;
    h.deliver(LinkEvent::BigInfo { address: source_address(), info: Default::default() }).await;
    h.deliver(LinkEvent::PaData { address: source_address(), data: base_ad() }).await;

    assert_eq!(h.events_of(EventSubtype::SourceBigInfo).len(), 1);
    assert_eq!(h.link.count("delete_pa_sync"), 1);
}

#[tokio::test]
async fn test_scan_timeout_reports_stop() {
    let mut h = Harness::start().await;
    h.command(Command::StartSinkScan).await;

    h.deliver(LinkEvent::ScanTimeout).await;
    let stopped = h.events_of(EventSubtype::ScanStopped);
    assert_eq!(stopped.len(), 1);
    assert_eq!(rc_of(&stopped[0]), 0);
    assert!(h.assistant().scan_mask().is_idle());
}

#[tokio::test]
async fn test_stop_scan() {
    let mut h = Harness::start().await;
    assert_eq!(h.command(Command::StopScan).await, 0);
    assert_eq!(h.link.count("stop_scan"), 0);

    h.command(Command::StartSourceScan { pa_sync_attempts: Some(1) }).await;
    h.command(Command::StartSinkScan).await;
    assert_eq!(h.link.count("start_scan"), 1);
    assert_eq!(h.assistant().scan_mask(), ScanMask::SOURCE | ScanMask::SINK);

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.command(Command::StopScan).await, 0);
    assert_eq!(h.link.count("stop_scan"), 1);
    assert_eq!(h.link.count("delete_pa_sync"), 1);
    assert!(h.assistant().scan_mask().is_idle());
}

#[tokio::test]
async fn test_stop_scan_failure_keeps_mask() {
    let mut h = Harness::start().await;
    h.command(Command::StartSinkScan).await;
    h.link.fail("stop_scan", -5);

    assert_eq!(h.command(Command::StopScan).await, -5);
    assert_eq!(h.assistant().scan_mask(), ScanMask::SINK);
}

#[tokio::test]
async fn test_start_scan_failure() {
    let mut h = Harness::start().await;
    h.link.fail("start_scan", -5);

    assert_eq!(h.command(Command::StartSinkScan).await, -5);
    assert!(h.assistant().scan_mask().is_idle());
}

#[tokio::test]
async fn test_new_source_scan_resets_registry() {
    let mut h = Harness::start().await;
    h.command(Command::StartSourceScan { pa_sync_attempts: None }).await;
    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.assistant().registry_len(), 1);

    h.command(Command::StartSourceScan { pa_sync_attempts: Some(3) }).await;
    assert_eq!(h.assistant().registry_len(), 0);

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    // one attempt spent on the create just issued
    assert_eq!(h.assistant().source(&source_address()).unwrap().sync_attempts_remaining, 2);
}

#[tokio::test]
async fn test_sink_scan_reports_sinks_only() {
    let mut h = Harness::start().await;
    h.command(Command::StartSinkScan).await;

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    h.deliver(LinkEvent::ScanReport(sink_report(1))).await;

    assert!(h.events_of(EventSubtype::SourceFound).is_empty());
    let sinks = h.events_of(EventSubtype::SinkFound);
    assert_eq!(sinks.len(), 1);
    assert_eq!(address_of(&sinks[0]), sink_address(1));
    let records = sinks[0].records().unwrap();
    assert_eq!(records.find(TlvTag::CompleteName).unwrap().value, b"Buds");
}

#[tokio::test]
async fn test_set_member_scan_completes() {
    const SIRK: [u8; 16] = [0x45; 16];
    let mut h = Harness::start().await;
    h.connect(1).await;

    let cmd = Command::StartCsisScan { sirk: SIRK, set_size: 2 };
    assert_eq!(h.command(cmd).await, 0);
    assert_eq!(h.assistant().set_members(), vec![sink_address(1)]);

    let mut data = vec![7, ad_type::CSIS_RSI];
    data.extend_from_slice(&csis::generate_rsi(&SIRK, 0x123456));
    let member = ScanReport {
        address: sink_address(2),
        rssi: -55,
        sid: 0,
        connectable: true,
        interval: PaInterval(0),
        data,
    };
    h.deliver(LinkEvent::ScanReport(member.clone())).await;

    let found = h.events_of(EventSubtype::SetMemberFound);
    assert_eq!(found.len(), 1);
    assert_eq!(address_of(&found[0]), sink_address(2));
    assert!(h.assistant().scan_mask().is_idle());
    assert_eq!(h.link.count("stop_scan"), 1);

    // The scan is over; a repeat is not reported
    h.deliver(LinkEvent::ScanReport(member)).await;
    assert!(h.events_of(EventSubtype::SetMemberFound).is_empty());
}

#[tokio::test]
async fn test_set_member_scan_ignores_other_sets() {
    let mut h = Harness::start().await;
    h.command(Command::StartCsisScan { sirk: [0x45; 16], set_size: 2 }).await;

    let mut data = vec![7, ad_type::CSIS_RSI];
    data.extend_from_slice(&csis::generate_rsi(&[0x99; 16], 0x123456));
    let stranger = ScanReport {
        address: sink_address(3),
        rssi: -55,
        sid: 0,
        connectable: true,
        interval: PaInterval(0),
        data,
    };
    h.deliver(LinkEvent::ScanReport(stranger)).await;

    assert!(h.events_of(EventSubtype::SetMemberFound).is_empty());
    assert_eq!(h.assistant().scan_mask(), ScanMask::SET_MEMBER);
}

fn set_member_report(sirk: &[u8; 16], n: u8) -> ScanReport {
    let mut data = vec![7, ad_type::CSIS_RSI];
    data.extend_from_slice(&csis::generate_rsi(sirk, 0x100000 | u32::from(n)));
    ScanReport {
        address: sink_address(n),
        rssi: -55,
        sid: 0,
        connectable: true,
        interval: PaInterval(0),
        data,
    }
}

#[tokio::test]
async fn test_source_scan_joins_running_scans() {
    let mut h = Harness::start().await;
    h.command(Command::StartSinkScan).await;
    h.command(Command::StartCsisScan { sirk: [0x45; 16], set_size: 3 }).await;
    assert_eq!(h.command(Command::StartSourceScan { pa_sync_attempts: None }).await, 0);
    assert_eq!(h.link.count("start_scan"), 1);
    assert_eq!(
        h.assistant().scan_mask(),
        ScanMask::SINK | ScanMask::SET_MEMBER | ScanMask::SOURCE
    );

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.assistant().registry_len(), 1);
    assert_eq!(h.link.count("create_pa_sync"), 0);

    // A repeat resets the registry with the new countdown
    assert_eq!(h.command(Command::StartSourceScan { pa_sync_attempts: Some(2) }).await, 0);
    assert_eq!(h.link.count("start_scan"), 1);
    assert_eq!(h.assistant().registry_len(), 0);

    h.deliver(LinkEvent::ScanReport(source_report())).await;
    assert_eq!(h.link.count("create_pa_sync"), 1);
    assert_eq!(h.assistant().source(&source_address()).unwrap().sync_attempts_remaining, 1);
    assert_eq!(h.assistant().pa_phase(), PaSyncPhase::Syncing);

    assert_eq!(h.command(Command::StopScan).await, 0);
    assert_eq!(h.link.count("stop_scan"), 1);
    assert_eq!(h.link.count("delete_pa_sync"), 1);
    assert!(h.assistant().scan_mask().is_idle());
    assert!(h.assistant().pa_session().is_none());
}

#[tokio::test]
async fn test_set_member_stop_failure_keeps_scanning() {
    const SIRK: [u8; 16] = [0x45; 16];
    let mut h = Harness::start().await;
    h.command(Command::StartCsisScan { sirk: SIRK, set_size: 1 }).await;
    h.link.fail("stop_scan", -5);

    h.deliver(LinkEvent::ScanReport(set_member_report(&SIRK, 2))).await;
    assert_eq!(h.events_of(EventSubtype::SetMemberFound).len(), 1);
    assert_eq!(h.link.count("stop_scan"), 1);
    assert_eq!(h.assistant().scan_mask(), ScanMask::SET_MEMBER);

    // The radio never stopped, so joining it does not start it again
    h.command(Command::StartSinkScan).await;
    assert_eq!(h.link.count("start_scan"), 1);

    h.link.clear_failure("stop_scan");
    assert_eq!(h.command(Command::StopScan).await, 0);
    assert_eq!(h.link.count("stop_scan"), 2);
    assert!(h.assistant().scan_mask().is_idle());
}

#[tokio::test]
async fn test_set_member_scan_of_unknown_size_keeps_running() {
    const SIRK: [u8; 16] = [0x45; 16];
    let mut h = Harness::start().await;
    h.command(Command::StartCsisScan { sirk: SIRK, set_size: 0 }).await;

    h.deliver(LinkEvent::ScanReport(set_member_report(&SIRK, 2))).await;
    h.deliver(LinkEvent::ScanReport(set_member_report(&SIRK, 3))).await;

    assert_eq!(h.events_of(EventSubtype::SetMemberFound).len(), 2);
    assert_eq!(h.link.count("stop_scan"), 0);
    assert_eq!(h.assistant().scan_mask(), ScanMask::SET_MEMBER);
}
