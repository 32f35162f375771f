//! Settings provider port.

use std::sync::RwLock;

use crate::settings::{Settings, SettingsError, validate_settings};

/// Source of the current settings snapshot.
///
/// Read once per task at creation time; later changes only affect tasks
/// created afterwards.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> Settings;
}

/// In-memory settings holder.
#[derive(Debug, Default)]
pub struct SharedSettings {
    inner: RwLock<Settings>,
}

impl SharedSettings {
    #[must_use]
    pub const fn new(settings: Settings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    /// Validate and swap in new settings.
    pub fn replace(&self, settings: Settings) -> Result<(), SettingsError> {
        validate_settings(&settings)?;
        *self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = settings;
        tracing::info!(target: "civdl.config", "settings replaced");
        Ok(())
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> Settings {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
