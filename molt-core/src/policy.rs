//! Download file naming.

use chrono::Local;

use crate::error::CoreError;

/// Default strftime pattern: local time down to the second, no zero padding
/// on month and day (e.g. `2024-3-7-14-05-09`).
pub const DEFAULT_NAME_FORMAT: &str = "%Y-%-m-%-d-%H-%M-%S";

/// Produces the file name for one downloaded candidate. Called once per
/// download.
pub trait NamePolicy: Send + Sync {
    fn generate_name(&self) -> Result<String, CoreError>;
}

/// Names candidates after the local wall-clock time.
#[derive(Debug, Clone)]
pub struct TimeNamePolicy {
    format: String,
}

impl TimeNamePolicy {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl Default for TimeNamePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_NAME_FORMAT)
    }
}

impl NamePolicy for TimeNamePolicy {
    fn generate_name(&self) -> Result<String, CoreError> {
        use std::fmt::Write;

        // An invalid specifier surfaces as fmt::Error here; to_string() panics.
        let mut name = String::new();
        write!(name, "{}", Local::now().format(&self.format)).map_err(|_| {
            CoreError::NamePolicy(format!("invalid time format '{}'", self.format))
        })?;

        if name.is_empty() || name.contains('/') {
            return Err(CoreError::NamePolicy(format!(
                "time format '{}' produced unusable file name '{name}'",
                self.format
            )));
        }
        Ok(name)
    }
}
