//! Resolves [`LogoHandle`]s into encoded image bytes ready for the
//! normaliser. Presets come from the binary, paths from disk, and remote
//! handles go through [`LogoClient`] with an on-disk cache in front of it.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use logomask::{ImageKind, RawImage};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::presets::find_preset;
use crate::remote::{Download, LogoClient};
use crate::{LogoHandle, MAX_INPUT_BYTES};

/// Where the returned bytes were read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoOrigin {
    Bundled,
    File(PathBuf),
    Downloaded(PathBuf),
    Cached(PathBuf),
}

#[derive(Debug)]
pub struct ResolvedLogo {
    pub handle: LogoHandle,
    pub origin: LogoOrigin,
    pub image: RawImage,
}

/// Network behaviour for remote handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Use the cache when present, otherwise download.
    #[default]
    PreferCache,
    /// Always download and overwrite the cache.
    Refresh,
    /// Never touch the network.
    Offline,
}

#[derive(Debug)]
pub struct LogoRepository {
    cache_root: PathBuf,
    client: Option<LogoClient>,
}

impl LogoRepository {
    pub fn new(cache_root: PathBuf, client: Option<LogoClient>) -> Self {
        Self { cache_root, client }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn resolve(&self, handle: &LogoHandle, policy: FetchPolicy) -> Result<ResolvedLogo> {
        let (origin, image) = match handle {
            LogoHandle::Preset(name) => {
                let preset = find_preset(name).ok_or_else(|| {
                    anyhow!("unknown preset '{name}'; run `liquidmetal presets` to list them")
                })?;
                let image = RawImage::new(preset.svg.as_bytes().to_vec(), ImageKind::Svg);
                (LogoOrigin::Bundled, image)
            }
            LogoHandle::Path(path) => {
                let image = read_local(path)?;
                (LogoOrigin::File(path.clone()), image)
            }
            LogoHandle::Stored(id) => {
                let cache_path = self.cache_root.join("stored").join(id);
                self.resolve_remote(handle, &cache_path, policy, |client| {
                    client.fetch_stored(id)
                })?
            }
            LogoHandle::Url(url) => {
                let cache_path = self.cache_root.join("url").join(url_cache_key(url));
                self.resolve_remote(handle, &cache_path, policy, |client| {
                    client.fetch_url(url)
                })?
            }
        };
        debug!(%handle, kind = %image.kind(), bytes = image.len(), "resolved logo");
        Ok(ResolvedLogo {
            handle: handle.clone(),
            origin,
            image,
        })
    }

    fn resolve_remote<F>(
        &self,
        handle: &LogoHandle,
        cache_path: &Path,
        policy: FetchPolicy,
        fetch: F,
    ) -> Result<(LogoOrigin, RawImage)>
    where
        F: FnOnce(&LogoClient) -> Result<Download>,
    {
        if policy != FetchPolicy::Refresh && cache_path.exists() {
            match read_cached(cache_path) {
                Ok(image) => return Ok((LogoOrigin::Cached(cache_path.to_path_buf()), image)),
                Err(err) => {
                    warn!(%handle, error = %err, "logo cache invalid, refetching");
                    fs::remove_file(cache_path).ok();
                    fs::remove_file(kind_sidecar(cache_path)).ok();
                }
            }
        }

        if policy == FetchPolicy::Offline {
            bail!("'{handle}' is not cached and network access is disabled");
        }
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow!("'{handle}' needs network access but no client is configured"))?;

        let download = fetch(client)?;
        let kind = ImageKind::sniff(&download.bytes)
            .or_else(|| download.content_type.as_deref().and_then(ImageKind::from_mime))
            .or_else(|| kind_from_path(Path::new(download.url.path())))
            .ok_or_else(|| anyhow!("'{}' is not a supported image type", download.url))?;

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating cache dir {}", parent.display()))?;
        }
        fs::write(cache_path, &download.bytes)
            .with_context(|| format!("writing cache file {}", cache_path.display()))?;
        let kind_path = kind_sidecar(cache_path);
        fs::write(&kind_path, kind.to_string())
            .with_context(|| format!("writing cache file {}", kind_path.display()))?;
        debug!(%handle, path = %cache_path.display(), "cached downloaded logo");

        Ok((
            LogoOrigin::Downloaded(cache_path.to_path_buf()),
            RawImage::new(download.bytes, kind),
        ))
    }
}

fn read_local(path: &Path) -> Result<RawImage> {
    let metadata =
        fs::metadata(path).with_context(|| format!("unable to open logo '{}'", path.display()))?;
    if !metadata.is_file() {
        bail!("logo path '{}' is not a file", path.display());
    }
    if metadata.len() > MAX_INPUT_BYTES {
        bail!(
            "logo '{}' is {} bytes; the limit is {MAX_INPUT_BYTES} (4.5 MiB)",
            path.display(),
            metadata.len()
        );
    }
    let bytes = fs::read(path).with_context(|| format!("reading logo '{}'", path.display()))?;
    let kind = ImageKind::sniff(&bytes)
        .or_else(|| kind_from_path(path))
        .ok_or_else(|| anyhow!("'{}' is not a supported image type", path.display()))?;
    Ok(RawImage::new(bytes, kind))
}

fn read_cached(path: &Path) -> Result<RawImage> {
    let bytes = fs::read(path)?;
    if bytes.len() as u64 > MAX_INPUT_BYTES {
        bail!("cached logo exceeds the size limit");
    }
    let kind = ImageKind::sniff(&bytes)
        .or_else(|| {
            fs::read_to_string(kind_sidecar(path))
                .ok()
                .and_then(|label| ImageKind::from_extension(label.trim()))
        })
        .or_else(|| kind_from_path(path))
        .ok_or_else(|| anyhow!("cached logo has an unknown encoding"))?;
    Ok(RawImage::new(bytes, kind))
}

/// Records the encoding chosen at download time, which may have come from
/// headers or the URL rather than the bytes.
fn kind_sidecar(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".kind");
    PathBuf::from(name)
}

fn kind_from_path(path: &Path) -> Option<ImageKind> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageKind::from_extension)
}

fn url_cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
