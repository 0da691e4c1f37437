//! # proletariat-settings
//!
//! Layered configuration for the proletariat agent.
//!
//! Settings are resolved from four layers (lowest priority first):
//! 1. **Compiled defaults**: [`AgentSettings::default()`]
//! 2. **User file**: `~/.proletariat/settings.json` or an explicit path
//! 3. **Environment variables**: `PROLETARIAT_*` overrides
//! 4. **Command-line flags**: applied by the binary
//!
//! [`AgentSettings::validate`] runs last and corrects out-of-range values.
//! There is no global instance: the binary loads settings once and hands
//! them to the agent it constructs.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_dot_proletariat() {
        let path = settings_path();
        assert!(path.ends_with(".proletariat/settings.json"));
    }

    #[test]
    fn loaded_defaults_validate() {
        let mut settings = load_settings_from_path(std::path::Path::new("/nonexistent.json"))
            .unwrap_or_default();
        assert!(settings.validate().is_ok());
    }
}
