use std::sync::Arc;

use facerig_core::mocks::{DeadLink, LinkEvent, RecordingLink};
use facerig_core::{MoveMode, Rig, RigError, SendReport};
use facerig_hardware::SimulatedLink;
use facerig_traits::ManualClock;

fn rig_with(link: &RecordingLink<SimulatedLink, ManualClock>, clock: &ManualClock) -> Rig {
    let mut rig = Rig::builder()
        .with_clock(Arc::new(clock.clone()))
        .try_build()
        .unwrap();
    rig.connect(Box::new(link.clone()), false).unwrap();
    link.clear();
    rig
}

/// Events from the first write of `frame` onward.
fn from_write(events: &[LinkEvent], frame: &str) -> Vec<LinkEvent> {
    let start = events
        .iter()
        .position(|e| *e == LinkEvent::Write(frame.to_string()))
        .unwrap();
    events[start..].to_vec()
}

#[test]
fn rejected_lip_batch_sends_singles_back_to_back() {
    let clock = ManualClock::new();
    let sim = SimulatedLink::new();
    sim.set_batch_supported(false);
    let link = RecordingLink::new(sim, clock.clone());
    let mut rig = rig_with(&link, &clock);

    let out = rig.move_channel(2, 79, MoveMode::Interactive).unwrap();
    assert!(matches!(out.report, SendReport::Fallback { .. }));
    let [(c2, a2), (c3, a3)] = [out.targets[0], out.targets[1]];
    assert_eq!((c2, c3), (2, 3));

    let events: Vec<LinkEvent> = link.events().into_iter().map(|(_, e)| e).collect();
    let tail = from_write(&events, &format!("S2,{a2};3,{a3}"));
    assert!(matches!(&tail[1], LinkEvent::Read(Some(r)) if r.starts_with("ERROR")));
    assert_eq!(tail[2], LinkEvent::Write(format!("S2,{a2}")));
    assert_eq!(tail[3], LinkEvent::Write(format!("S3,{a3}")));
}

#[test]
fn rejected_eyelid_batch_waits_between_singles() {
    let clock = ManualClock::new();
    let sim = SimulatedLink::new();
    sim.set_batch_supported(false);
    let link = RecordingLink::new(sim, clock.clone());
    let mut rig = rig_with(&link, &clock);

    let out = rig.move_channel(6, 100, MoveMode::Scripted).unwrap();
    let [(_, a6), (_, a7)] = [out.targets[0], out.targets[1]];
    let events: Vec<LinkEvent> = link.events().into_iter().map(|(_, e)| e).collect();
    let tail = from_write(&events, &format!("S6,{a6}"));
    let s7 = tail
        .iter()
        .position(|e| *e == LinkEvent::Write(format!("S7,{a7}")))
        .unwrap();
    assert!(
        tail[..s7]
            .iter()
            .any(|e| matches!(e, LinkEvent::Read(Some(r)) if r.starts_with("OK"))),
        "{tail:?}"
    );
}

#[test]
fn accepted_batch_is_a_single_frame() {
    let clock = ManualClock::new();
    let link = RecordingLink::new(SimulatedLink::new(), clock.clone());
    let mut rig = rig_with(&link, &clock);
    let out = rig.move_channel(14, 120, MoveMode::Scripted).unwrap();
    assert!(matches!(out.report, SendReport::Delivered(_)));
    let frames: Vec<String> = link.writes().into_iter().map(|(_, f)| f).collect();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].starts_with("S12,"));
    assert!(frames[0].contains(";14,120"));
}

#[test]
fn write_failure_is_connection_lost_then_unavailable() {
    let mut rig = Rig::builder()
        .with_clock(Arc::new(ManualClock::new()))
        .try_build()
        .unwrap();
    let res = rig.connect(Box::new(DeadLink), false);
    assert!(matches!(res, Err(RigError::ConnectionLost(_))));
    assert!(!rig.is_connected());
    assert_eq!(
        rig.move_channel(2, 90, MoveMode::Interactive),
        Err(RigError::TransportUnavailable)
    );
}
