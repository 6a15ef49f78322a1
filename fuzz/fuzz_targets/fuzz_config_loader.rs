#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors are fine; panics in parse or validate are not.
    if let Ok(cfg) = facerig_config::load_toml(data) {
        let _ = cfg.validate();
    }
});
