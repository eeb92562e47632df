//! Human vs. machine-readable command output

use serde::Serialize;
use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// Suppress progress bars, e.g. in CI logs.
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("SYMGRAPH_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn from_flag(json: bool) -> Self {
        if json { OutputMode::Json } else { OutputMode::Human }
    }

    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

#[derive(Debug, Serialize)]
struct Envelope<'a, T: Serialize> {
    ok: bool,
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Render the JSON envelope for a successful command.
pub fn success_envelope<T: Serialize>(command: &str, data: T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Envelope {
        ok: true,
        command,
        data: Some(data),
        error: None,
    })
}

/// Render the JSON envelope for a failed command.
pub fn error_envelope(command: &str, message: &str) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Envelope::<()> {
        ok: false,
        command,
        data: None,
        error: Some(message.to_string()),
    })
}

/// Print `data` as a success envelope. Human mode prints nothing; callers
/// render their own output there.
pub fn emit_success<T: Serialize>(mode: OutputMode, command: &str, data: T) -> anyhow::Result<()> {
    if mode == OutputMode::Json {
        println!("{}", success_envelope(command, data)?);
    }
    Ok(())
}

pub fn emit_error(mode: OutputMode, command: &str, message: &str) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => println!("{}", error_envelope(command, message)?),
        OutputMode::Human => crate::ui::error(message),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let json = success_envelope("stats", serde_json::json!({"nodes": 3})).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["command"], "stats");
        assert_eq!(value["data"]["nodes"], 3);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let json = error_envelope("ingest", "no such file").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], "no such file");
        assert!(value.get("data").is_none());
    }
}
