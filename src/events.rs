use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use config_model::{ConfigPatch, PlaybackPatch, RenderPatch};
use serde::{Deserialize, Serialize};

/// "Library changed" flag shared between the watcher side and the display thread.
///
/// Any clone may raise it; only the display thread takes it.
#[derive(Debug, Clone, Default)]
pub struct LibrarySignal(Arc<AtomicBool>);

impl LibrarySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One JSON line received on the control socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case", deny_unknown_fields)]
pub enum ControlCommand {
    ApplyConfig {
        #[serde(default)]
        render: Option<RenderPatch>,
        #[serde(default)]
        playback: Option<PlaybackPatch>,
    },
    RescanLibrary,
}

impl ControlCommand {
    pub fn into_patch(self) -> Option<ConfigPatch> {
        match self {
            Self::ApplyConfig { render, playback } => Some(ConfigPatch { render, playback }),
            Self::RescanLibrary => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlReply {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_is_cleared_by_take() {
        let signal = LibrarySignal::new();
        let watcher_side = signal.clone();
        assert!(!signal.take());
        watcher_side.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn control_commands_parse_from_json_lines() {
        let cmd: ControlCommand =
            serde_json::from_str(r#"{"command":"apply-config","render":{"mode":"cover"}}"#)
                .unwrap();
        let patch = cmd.into_patch().expect("apply-config carries a patch");
        assert!(patch.render.is_some());
        assert!(patch.playback.is_none());
        let rescan: ControlCommand =
            serde_json::from_str(r#"{"command":"rescan-library"}"#).unwrap();
        assert_eq!(rescan, ControlCommand::RescanLibrary);
        assert!(rescan.clone().into_patch().is_none());
        assert!(serde_json::from_str::<ControlCommand>(r#"{"command":"reboot"}"#).is_err());
    }
}
