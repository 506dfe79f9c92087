use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::runner::TransportCommand;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: String,
    /// Where `receive` writes incoming bytes
    pub receive_output: PathBuf,
    pub log_file: Option<PathBuf>,
    pub transport: TransportCommand,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: "192.168.56.1".to_string(),
            port: "50000".to_string(),
            receive_output: PathBuf::from("received_file"),
            log_file: None,
            transport: TransportCommand::default(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("ncmeter");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("ncmeter");
    }
    PathBuf::from(".ncmeter")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("ncmeter.toml")
}

/// Load settings from `path`; a missing file yields defaults.
pub fn load_settings(path: &Path) -> Result<Settings> {
    match std::fs::read_to_string(path) {
        Ok(data) => toml::from_str(&data)
            .with_context(|| format!("invalid settings in {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).ok();
    let data = to_toml(settings)?;
    // atomic write
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    use std::io::Write as _;
    tmp.write_all(data.as_bytes())?;
    tmp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600));
    }
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Write default settings to `path`. An existing file is kept unless `force`.
pub fn init_settings(path: &Path, force: bool) -> Result<()> {
    if !force && path.exists() {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    save_settings(path, &Settings::default())
}

pub fn to_toml(settings: &Settings) -> Result<String> {
    Ok(toml::to_string(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let s = load_settings(&tmp.path().join("nope.toml")).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.port, "50000");
        assert_eq!(s.transport.program, "nc");
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("cfg/ncmeter.toml");
        let mut s = Settings::default();
        s.host = "10.1.2.3".into();
        s.log_file = Some(PathBuf::from("/tmp/ncmeter.log"));
        s.transport.program = "ncat".into();
        save_settings(&path, &s).unwrap();
        assert_eq!(load_settings(&path).unwrap(), s);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ncmeter.toml");
        std::fs::write(&path, "port = \"6000\"\n[transport]\nprogram = \"ncat\"\n").unwrap();
        let s = load_settings(&path).unwrap();
        assert_eq!(s.port, "6000");
        assert_eq!(s.host, "192.168.56.1");
        assert_eq!(s.transport.program, "ncat");
        assert_eq!(s.transport.receive_args, vec!["-l", "-p", "{port}"]);
    }

    #[test]
    fn init_keeps_existing_file_unless_forced() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ncmeter.toml");
        std::fs::write(&path, "host = \"10.9.9.9\"\n").unwrap();

        let err = init_settings(&path, false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(load_settings(&path).unwrap().host, "10.9.9.9");

        init_settings(&path, true).unwrap();
        assert_eq!(load_settings(&path).unwrap(), Settings::default());
    }

    #[test]
    fn init_creates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("new/ncmeter.toml");
        init_settings(&path, false).unwrap();
        assert_eq!(load_settings(&path).unwrap(), Settings::default());
    }

    #[test]
    fn garbage_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ncmeter.toml");
        std::fs::write(&path, "port = [").unwrap();
        assert!(load_settings(&path).is_err());
    }
}
