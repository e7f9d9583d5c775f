use serde::{Deserialize, Serialize};

use crate::domain::settings::Settings;

/// Protocol settings snapshot. Set at construction and never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsStore {
    settings: Settings,
}

impl SettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Offer settings from another source. The stored snapshot wins; returns whether the
    /// offered settings agree with it.
    pub fn offer(&self, settings: &Settings) -> bool {
        let agrees = &self.settings == settings;
        if !agrees {
            tracing::warn!("settings: ignoring configured settings that differ from the stored snapshot");
        }
        agrees
    }
}
