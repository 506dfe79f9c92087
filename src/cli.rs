//! Shared CLI helpers and small reusable Clap fragments

use clap::Args;
use std::path::PathBuf;

use crate::config::Settings;

/// Options every binary accepts
#[derive(Clone, Debug, Args)]
pub struct CommonOpts {
    /// Settings file (defaults to ~/.config/ncmeter/ncmeter.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Append activity lines to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,
}

impl CommonOpts {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::default_config_path)
    }

    /// Command-line log file wins over the settings file.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(p) = &self.log_file {
            settings.log_file = Some(p.clone());
        }
    }
}

/// Peer address overrides for one transfer
#[derive(Clone, Debug, Args)]
pub struct PeerOpts {
    /// Target address (free text, handed to the copy program)
    #[arg(long)]
    pub host: Option<String>,

    /// Port (free text, handed to the copy program)
    #[arg(short = 'p', long)]
    pub port: Option<String>,
}

impl PeerOpts {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(h) = &self.host {
            settings.host = h.clone();
        }
        if let Some(p) = &self.port {
            settings.port = p.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let mut s = Settings::default();
        PeerOpts {
            host: Some("10.9.9.9".into()),
            port: None,
        }
        .apply(&mut s);
        CommonOpts {
            config: None,
            log_file: Some(PathBuf::from("x.log")),
        }
        .apply(&mut s);
        assert_eq!(s.host, "10.9.9.9");
        assert_eq!(s.port, "50000");
        assert_eq!(s.log_file, Some(PathBuf::from("x.log")));
    }
}
