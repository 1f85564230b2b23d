//! Console configuration
//!
//! Loaded by frontends from JSON; every field has a default so partial files
//! are accepted.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which controller is plugged into the console port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerType {
    /// Mouse for carts known to need it, pad otherwise
    #[default]
    Auto,
    Pad,
    Mouse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopyConfig {
    /// Start at the cartridge entry point instead of running the BIOS boot
    pub skip_bios: bool,
    /// Capture BIOS print calls as print jobs. When off, prints report
    /// "no seal cartridge".
    pub printer_enabled: bool,
    /// Skip the slow printer motor routine during boot
    pub skip_motor_move: bool,
    /// Where cartridge SRAM is persisted; `None` keeps it in memory only
    pub sram_path: Option<PathBuf>,
    /// Frames between SRAM commits
    pub sram_commit_interval: u32,
    pub controller: ControllerType,
    /// Stop with an error on the first latched CPU fault or unimplemented path
    pub strict: bool,
}

impl Default for LoopyConfig {
    fn default() -> Self {
        Self {
            skip_bios: false,
            printer_enabled: true,
            skip_motor_move: true,
            sram_path: None,
            sram_commit_interval: 60,
            controller: ControllerType::Auto,
            strict: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: LoopyConfig = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert!(cfg.strict);
        assert!(cfg.printer_enabled);
        assert_eq!(cfg.sram_commit_interval, 60);
        assert_eq!(cfg.controller, ControllerType::Auto);
    }

    #[test]
    fn test_controller_names() {
        let cfg: LoopyConfig = serde_json::from_str(r#"{"controller": "mouse"}"#).unwrap();
        assert_eq!(cfg.controller, ControllerType::Mouse);

        let json = serde_json::to_value(LoopyConfig::default()).unwrap();
        assert_eq!(json["controller"], "auto");
    }
}
