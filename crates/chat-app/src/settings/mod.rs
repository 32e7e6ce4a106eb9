/// Settings persistence.
pub mod state;

pub use state::{AppSettings, AuthSettings, SettingsError, SettingsResult, SettingsStore};
