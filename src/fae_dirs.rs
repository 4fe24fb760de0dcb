//! Centralized filesystem paths for the voice tutor service.
//!
//! Single source of truth for where on disk the recovery database, usage
//! ledger, and log files live. Uses the [`dirs`] crate for platform-
//! appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `TUTOR_DATA_DIR` — overrides [`data_dir`]
//! - `RECOVERY_DB_PATH` — overrides [`recovery_db_path`] directly

use std::path::PathBuf;

/// Application data root directory.
///
/// Resolves to `dirs::data_dir()/voice-tutor/` by default. Override with
/// the `TUTOR_DATA_DIR` environment variable.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TUTOR_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("voice-tutor"))
        .unwrap_or_else(|| PathBuf::from("/tmp/voice-tutor-data"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Diagnostic bundle output directory (`data_dir()/diagnostics/`).
#[must_use]
pub fn diagnostics_dir() -> PathBuf {
    data_dir().join("diagnostics")
}

/// Recovery database path (`data_dir()/recovery.db`).
///
/// Override with the `RECOVERY_DB_PATH` environment variable.
#[must_use]
pub fn recovery_db_path() -> PathBuf {
    if let Some(p) = std::env::var_os("RECOVERY_DB_PATH") {
        return PathBuf::from(p);
    }
    data_dir().join("recovery.db")
}

/// Usage ledger path (`data_dir()/usage.jsonl`).
#[must_use]
pub fn usage_log_path() -> PathBuf {
    data_dir().join("usage.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_is_nonempty() {
        assert!(!data_dir().as_os_str().is_empty());
    }

    #[test]
    fn logs_dir_is_subpath_of_data_dir() {
        assert!(logs_dir().starts_with(data_dir()));
    }

    #[test]
    fn recovery_db_path_override_via_env() {
        let key = "RECOVERY_DB_PATH";
        let original = std::env::var_os(key);
        unsafe { std::env::set_var(key, "/custom/recovery.db") };
        assert_eq!(recovery_db_path(), PathBuf::from("/custom/recovery.db"));
        match original {
            Some(v) => unsafe { std::env::set_var(key, v) },
            None => unsafe { std::env::remove_var(key) },
        }
    }

    #[test]
    fn data_dir_override_via_env() {
        let key = "TUTOR_DATA_DIR";
        let original = std::env::var_os(key);
        unsafe { std::env::set_var(key, "/custom/data") };
        assert_eq!(data_dir(), PathBuf::from("/custom/data"));
        match original {
            Some(v) => unsafe { std::env::set_var(key, v) },
            None => unsafe { std::env::remove_var(key) },
        }
    }
}
