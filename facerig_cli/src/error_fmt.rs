//! Human-readable error descriptions and structured JSON error formatting.

use facerig_core::error::{BuildError, RigError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(BuildError::InvalidConfig(msg)) = err.downcast_ref::<BuildError>() {
        return format!(
            "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the [link] or [safety] tables.\nHow to fix: Edit the config file, then rerun."
        );
    }

    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::TransportUnavailable => "What happened: No controller board is connected.\nLikely causes: No port given, or the link dropped earlier in this run.\nHow to fix: Pass --port (or set link.port), check the USB cable, or use --sim to try without hardware.".to_string(),
            RigError::ConnectionLost(detail) => format!(
                "What happened: The link to the board was lost ({detail}).\nLikely causes: USB cable unplugged, board reset, or another program opened the port.\nHow to fix: Reconnect the board, close other serial tools, and rerun."
            ),
            RigError::AckTimeout(frame) => format!(
                "What happened: The board did not acknowledge {frame}.\nLikely causes: Wrong baud rate, busy firmware, or ack window too short.\nHow to fix: Check link.baud and raise link.ack_timeout_ms."
            ),
            RigError::DeviceRejected { frame, reply } => format!(
                "What happened: The board rejected {frame} with \"{reply}\".\nLikely causes: Firmware does not support this command or the channel is not wired.\nHow to fix: Run `facerig help-device` to see what the firmware accepts."
            ),
            RigError::UnknownChannel(id) => format!(
                "What happened: Channel {id} does not exist.\nLikely causes: Typo in the channel number.\nHow to fix: Use a channel between 0 and 15."
            ),
            RigError::InvalidCalibration(detail) => format!(
                "What happened: Calibration rejected ({detail}).\nLikely causes: Values outside 0..=180 in the CSV.\nHow to fix: Fix the CSV rows and rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'channel,min,max,mid'.".to_string();
    }

    if lower.contains("open serial port") {
        return format!(
            "What happened: The serial port could not be opened.\nLikely causes: Wrong port name, missing permissions, or the port is in use.\nHow to fix: Run `facerig ports` to list ports; on Linux add yourself to the dialout group.\nOriginal: {msg}"
        );
    }

    if lower.contains("serial support not compiled in") || lower.contains("no port given") {
        return format!("What happened: {msg}.\nHow to fix: Pass --port with a hardware build, or use --sim.");
    }

    if lower.contains("parse config") || lower.contains("must be") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: {msg}\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("script check found") {
        return format!("{msg}; see the warnings above.");
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<RigError>() {
        Some(RigError::TransportUnavailable) => "TransportUnavailable",
        Some(RigError::ConnectionLost(_)) => "ConnectionLost",
        Some(RigError::AckTimeout(_)) => "AckTimeout",
        Some(RigError::DeviceRejected { .. }) => "DeviceRejected",
        Some(RigError::ProtocolMismatch(_)) => "ProtocolMismatch",
        Some(RigError::UnknownChannel(_)) => "UnknownChannel",
        Some(RigError::InvalidCalibration(_)) => "InvalidCalibration",
        Some(RigError::State(_)) => "State",
        None if err.downcast_ref::<BuildError>().is_some() => "InvalidConfig",
        None => "Error",
    }
}

/// Stable exit codes for link failures; everything else returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<RigError>() {
        Some(RigError::TransportUnavailable) => 3,
        Some(RigError::ConnectionLost(_)) => 4,
        Some(RigError::DeviceRejected { .. } | RigError::ProtocolMismatch(_)) => 5,
        Some(RigError::AckTimeout(_)) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
