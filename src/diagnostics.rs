//! Diagnostic bundle creation for support purposes (§10.5).
//!
//! Zips the log directory plus a redacted config dump into a timestamped
//! archive under [`crate::fae_dirs::diagnostics_dir`]. Explicitly excludes
//! rating content (nothing here reads the recovery DB) and API keys (the
//! config dump is built from a redacted clone, never the live one).
//! Carried over from the teacher's own `diagnostics` module in spirit:
//! same zip-a-few-known-directories shape, narrowed to this service's data.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::config::TutorConfig;
use crate::error::{Result, TutorError};

/// Gathers a support bundle into a zip file and returns its path.
///
/// # Errors
///
/// Returns [`TutorError::Io`] if the output directory or zip file cannot be
/// created or written.
pub fn gather_diagnostic_bundle(config: &TutorConfig) -> Result<PathBuf> {
    let output_dir = crate::fae_dirs::diagnostics_dir();
    fs::create_dir_all(&output_dir)?;

    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    let zip_path = output_dir.join(format!("voice-tutor-diagnostics-{timestamp}.zip"));

    let file = fs::File::create(&zip_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let log_dir = crate::fae_dirs::logs_dir();
    if log_dir.is_dir() {
        add_directory_to_zip(&mut zip, &log_dir, "logs", options)?;
    }

    let redacted = redact(config);
    let config_toml = toml::to_string_pretty(&redacted)
        .map_err(|e| TutorError::Config(format!("serialize redacted config: {e}")))?;
    zip.start_file("config.toml", options).map_err(zip_err)?;
    zip.write_all(config_toml.as_bytes())?;

    let info = system_info();
    zip.start_file("system-info.txt", options).map_err(zip_err)?;
    zip.write_all(info.as_bytes())?;

    zip.finish().map_err(zip_err)?;
    Ok(zip_path)
}

/// Clones `config` with every credential field blanked out.
fn redact(config: &TutorConfig) -> TutorConfig {
    let mut redacted = config.clone();
    redacted.llm.api_key = redacted_marker(&redacted.llm.api_key);
    redacted.speech.api_key = redacted_marker(&redacted.speech.api_key);
    redacted.realtime.api_key = redacted_marker(&redacted.realtime.api_key);
    redacted.realtime.api_secret = redacted_marker(&redacted.realtime.api_secret);
    redacted
}

fn redacted_marker(value: &str) -> String {
    if value.is_empty() { String::new() } else { "<redacted>".to_owned() }
}

fn system_info() -> String {
    format!(
        "=== Voice Tutor Diagnostic Report ===\n\nversion: {version}\nos: {os}\narch: {arch}\ngenerated: {ts}\n",
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        ts = chrono::Utc::now().to_rfc3339(),
    )
}

fn add_directory_to_zip<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if path.is_file() {
            add_file_to_zip(zip, &path, &format!("{prefix}/{name}"), options)?;
        } else if path.is_dir() {
            add_directory_to_zip(zip, &path, &format!("{prefix}/{name}"), options)?;
        }
    }
    Ok(())
}

fn add_file_to_zip<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    zip_name: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let Ok(contents) = fs::read(path) else { return Ok(()) };
    zip.start_file(zip_name, options).map_err(zip_err)?;
    zip.write_all(&contents)?;
    Ok(())
}

fn zip_err(err: zip::result::ZipError) -> TutorError {
    TutorError::Io(std::io::Error::other(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_blanks_credentials_but_keeps_structure() {
        let mut config = TutorConfig::default();
        config.llm.api_key = "sk-secret".to_owned();
        config.llm.model = "gemini-1.5-flash".to_owned();
        config.realtime.api_secret = "topsecret".to_owned();

        let redacted = redact(&config);
        assert_eq!(redacted.llm.api_key, "<redacted>");
        assert_eq!(redacted.realtime.api_secret, "<redacted>");
        assert_eq!(redacted.llm.model, "gemini-1.5-flash");
    }

    #[test]
    fn redact_leaves_empty_credentials_empty() {
        let config = TutorConfig::default();
        let redacted = redact(&config);
        assert_eq!(redacted.llm.api_key, "");
    }

    #[test]
    fn gather_diagnostic_bundle_produces_a_readable_zip() {
        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("TUTOR_DATA_DIR", dir.path()) };

        let config = TutorConfig::default();
        let path = gather_diagnostic_bundle(&config).unwrap();
        assert!(path.exists());

        let file = fs::File::open(&path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect();
        names.sort();
        assert!(names.contains(&"config.toml".to_owned()));
        assert!(names.contains(&"system-info.txt".to_owned()));

        unsafe { std::env::remove_var("TUTOR_DATA_DIR") };
    }
}
