#![no_main]
use facerig_core::{Markers, Script};
use facerig_core::script::Instruction;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let script = Script::parse(data, &Markers::default());
    // Every accepted motion line must already be inside the wire limits.
    for line in script.lines() {
        if let Instruction::Move { channel, angle } = line.instruction {
            assert!(channel < 16, "channel {channel} from {:?}", line.text);
            assert!(angle <= 180, "angle {angle} from {:?}", line.text);
        }
    }
    let _ = script.check();
    let _ = script.total_delay_ms();
});
