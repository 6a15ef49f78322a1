use std::sync::Arc;
use std::time::Duration;

use facerig_core::{DebounceCfg, InteractiveControl, LinkCfg, Rig, shared};
use facerig_hardware::SimulatedLink;
use facerig_traits::MonotonicClock;

fn control(link: &SimulatedLink) -> InteractiveControl {
    control_with(link, DebounceCfg::default())
}

fn control_with(link: &SimulatedLink, cfg: DebounceCfg) -> InteractiveControl {
    let mut rig = Rig::builder()
        .with_clock(Arc::new(MonotonicClock::new()))
        .with_link_cfg(LinkCfg {
            settle_after_open: Duration::ZERO,
            probe_timeout: Duration::from_millis(20),
            ..LinkCfg::default()
        })
        .try_build()
        .unwrap();
    rig.connect(Box::new(link.clone()), false).unwrap();
    link.transcript().clear();
    InteractiveControl::new(shared(rig), cfg)
}

#[test]
fn burst_of_updates_sends_last_value_once() {
    let link = SimulatedLink::new();
    let ctl = control(&link);
    for a in 50..=60 {
        ctl.update(11, a).unwrap();
    }
    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(link.transcript().frames(), vec!["S11,60"]);
}

#[test]
fn both_jaw_channels_share_one_key() {
    let link = SimulatedLink::new();
    let ctl = control(&link);
    ctl.update(0, 40).unwrap();
    ctl.update(1, 70).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(link.transcript().frames(), vec!["JS70"]);
}

#[test]
fn jaw_uses_its_own_longer_quantum() {
    let defaults = DebounceCfg::default();
    assert_eq!(defaults.channel, Duration::from_millis(40));
    assert_eq!(defaults.jaw, Duration::from_millis(60));

    // Stretched quanta keep the gap between them well clear of scheduler jitter.
    let link = SimulatedLink::new();
    let ctl = control_with(
        &link,
        DebounceCfg {
            channel: Duration::from_millis(40),
            jaw: Duration::from_millis(400),
        },
    );
    ctl.update(0, 40).unwrap();
    ctl.update(11, 40).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    ctl.update(0, 80).unwrap();
    ctl.update(11, 80).unwrap();
    std::thread::sleep(Duration::from_millis(700));
    assert_eq!(link.transcript().frames(), vec!["S11,40", "S11,80", "JS80"]);
}

#[test]
fn suppression_updates_state_without_sending() {
    let link = SimulatedLink::new();
    let ctl = control(&link);
    ctl.update(10, 20).unwrap();
    {
        let _quiet = ctl.suppress();
        ctl.update(10, 30).unwrap();
        ctl.update(4, 100).unwrap();
        ctl.update(0, 40).unwrap();
        std::thread::sleep(Duration::from_millis(150));
    }
    assert!(link.transcript().is_empty());
    let rig = ctl.rig().lock().unwrap();
    assert_eq!(rig.registry().current(10).unwrap(), 30);
    assert_eq!(rig.registry().current(4).unwrap(), 100);
    // The jaw is stored as a mirrored pair even though nothing was sent.
    assert_eq!(rig.registry().current(0).unwrap(), 40);
    assert_eq!(rig.registry().current(1).unwrap(), 140);
    drop(rig);
    assert!(!ctl.is_suppressed());
}

#[test]
fn out_of_range_channel_is_refused() {
    let link = SimulatedLink::new();
    let ctl = control(&link);
    assert!(ctl.update(16, 90).is_err());
}
