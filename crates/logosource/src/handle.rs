use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use directories_next::BaseDirs;

/// Where a logo comes from, parsed from a command-line string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoHandle {
    Preset(String),
    Stored(String),
    Url(String),
    Path(PathBuf),
}

impl LogoHandle {
    /// `preset:<name>`, `store:<id>`, `http(s)://...`, or a filesystem path.
    pub fn from_input(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            bail!("logo handle must not be empty");
        }
        if let Some(name) = input.strip_prefix("preset:") {
            return non_empty(name, "preset name").map(Self::Preset);
        }
        if let Some(id) = input.strip_prefix("store:") {
            let id = non_empty(id, "stored logo id")?;
            if !id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
            {
                bail!("stored logo id '{id}' may only contain letters, digits, '-' and '_'");
            }
            return Ok(Self::Stored(id));
        }
        if input.starts_with("http://") || input.starts_with("https://") {
            return Ok(Self::Url(input.to_string()));
        }
        Ok(Self::Path(expand_home(input)?))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Stored(_) | Self::Url(_))
    }
}

impl fmt::Display for LogoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preset(name) => write!(f, "preset:{name}"),
            Self::Stored(id) => write!(f, "store:{id}"),
            Self::Url(url) => f.write_str(url),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

fn non_empty(value: &str, what: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("{what} must not be empty");
    }
    Ok(value.to_string())
}

fn expand_home(input: &str) -> Result<PathBuf> {
    if input != "~" && !input.starts_with("~/") {
        return Ok(PathBuf::from(input));
    }
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| anyhow!("unable to determine home directory for '~' expansion"))?;
    let home = base_dirs.home_dir().to_path_buf();
    Ok(match input.strip_prefix("~/") {
        Some(rest) => home.join(rest),
        None => home,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_handles() {
        assert_eq!(
            LogoHandle::from_input("preset:ring").unwrap(),
            LogoHandle::Preset("ring".into())
        );
        assert_eq!(
            LogoHandle::from_input("store:a1B2-c_3").unwrap(),
            LogoHandle::Stored("a1B2-c_3".into())
        );
        assert_eq!(
            LogoHandle::from_input("https://cdn.example.org/logo.svg").unwrap(),
            LogoHandle::Url("https://cdn.example.org/logo.svg".into())
        );
    }

    #[test]
    fn falls_back_to_local_path() {
        assert!(matches!(
            LogoHandle::from_input("assets/logo.png").unwrap(),
            LogoHandle::Path(path) if path == PathBuf::from("assets/logo.png")
        ));
    }

    #[test]
    fn rejects_empty_and_unsafe_ids() {
        assert!(LogoHandle::from_input("  ").is_err());
        assert!(LogoHandle::from_input("preset:").is_err());
        assert!(LogoHandle::from_input("store:../etc").is_err());
    }

    #[test]
    fn display_round_trips_prefixes() {
        let handle = LogoHandle::from_input("store:abc").unwrap();
        assert_eq!(handle.to_string(), "store:abc");
        assert!(handle.is_remote());
    }
}
