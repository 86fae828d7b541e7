//! Engine options.

use derive_more::Display;
use std::str::FromStr;

/// How aggressively the engine reconciles against the backend at startup.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupSync {
    /// Carry state over and retry pending deletes; no reconciliation.
    #[default]
    #[display("none")]
    None,
    /// Reconcile every source file against the backend's documents.
    #[display("upload")]
    Upload,
    /// Like `upload`, and additionally delete backend orphans/duplicates.
    #[display("full")]
    Full,
}

impl FromStr for StartupSync {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "upload" => Ok(Self::Upload),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown startup-sync mode {other:?} (expected none, upload or full)")),
        }
    }
}

/// Behavioural switches for the sync engine.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub startup_sync: StartupSync,
    /// Delete terminally-failed documents from the backend after logging.
    pub cleanup_failed_docs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("none", StartupSync::None)]
    #[case("upload", StartupSync::Upload)]
    #[case("FULL", StartupSync::Full)]
    fn test_from_str(#[case] input: &str, #[case] expected: StartupSync) {
        assert_eq!(input.parse::<StartupSync>().unwrap(), expected);
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("everything".parse::<StartupSync>().is_err());
    }

    #[rstest]
    #[case(StartupSync::None, "none")]
    #[case(StartupSync::Upload, "upload")]
    #[case(StartupSync::Full, "full")]
    fn test_display_round_trip(#[case] mode: StartupSync, #[case] text: &str) {
        assert_eq!(mode.to_string(), text);
        assert_eq!(text.parse::<StartupSync>().unwrap(), mode);
    }
}
