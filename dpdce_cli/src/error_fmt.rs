//! Human-readable error descriptions and structured JSON error formatting.

use dpdce_core::{EngineError, EnqueueError};
use serde_json::json;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(e) = err.downcast_ref::<EngineError>() {
        return match e {
            EngineError::Transmitter(msg) => format!(
                "What happened: The transmitter did not answer ({msg}).\nLikely causes: Transmitter not running, or its control ports differ from the config.\nHow to fix: Start the transmitter and check transmitter.dpd_port / transmitter.rc_port."
            ),
            EngineError::Artifact(msg) => format!(
                "What happened: Plot directory is unusable ({msg}).\nLikely causes: Missing permissions or a file where the directory should be.\nHow to fix: Point paths.plot_directory at a writable directory."
            ),
            EngineError::Transport(msg) => format!(
                "What happened: The control socket failed ({msg}).\nLikely causes: Network interface went away or the socket was closed.\nHow to fix: Restart the engine; check control.bind and control.port."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    if let Some(e) = err.downcast_ref::<EnqueueError>() {
        return format!("What happened: Command refused ({e}).\nHow to fix: Wait for the running phase to finish and retry.");
    }

    // String-based heuristics for errors coming from init or config
    let msg = err
        .chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ");
    let lower = msg.to_ascii_lowercase();

    if lower.contains("address already in use") || lower.contains("address in use") {
        return format!(
            "What happened: The control port is taken ({msg}).\nLikely causes: Another engine instance is running.\nHow to fix: Stop it or change control.port in the config."
        );
    }

    if lower.contains("read config") {
        return format!(
            "What happened: Config file could not be read ({msg}).\nHow to fix: Pass an existing file with --config."
        );
    }

    if lower.contains("parse config") || lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Missing section or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
        );
    }

    format!(
        "Something went wrong.\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 transmitter, 4 transport, 5 plot directory, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Transmitter(_)) => 3,
        Some(EngineError::Transport(_)) => 4,
        Some(EngineError::Artifact(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<EngineError>() {
        Some(EngineError::Transmitter(_)) => "Transmitter",
        Some(EngineError::Transport(_)) => "Transport",
        Some(EngineError::Artifact(_)) => "Artifact",
        Some(_) => "Engine",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EngineError::Transmitter("refused".into()), 3, "transmitter did not answer")]
    #[case(EngineError::Transport("closed".into()), 4, "control socket failed")]
    #[case(EngineError::Artifact("denied".into()), 5, "Plot directory")]
    #[case(EngineError::NoData, 1, "No data to calculate model")]
    fn typed_errors(#[case] e: EngineError, #[case] code: i32, #[case] needle: &str) {
        let report = eyre::Report::new(e);
        assert_eq!(exit_code_for_error(&report), code);
        assert!(humanize(&report).contains(needle), "{}", humanize(&report));
    }

    #[test]
    fn config_messages_are_explained() {
        let report = eyre::eyre!("control.port must be > 0");
        let text = humanize(&report);
        assert!(text.contains("Configuration is invalid"));
        assert!(text.contains("control.port must be > 0"));
    }

    #[test]
    fn json_error_has_reason_and_message() {
        let report = eyre::Report::new(EngineError::Transport("closed".into()));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&report)).unwrap();
        assert_eq!(v["reason"], "Transport");
        assert!(v["message"].as_str().unwrap().contains("closed"));
    }
}
