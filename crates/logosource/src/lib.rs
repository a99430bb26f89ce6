mod handle;
mod presets;
mod remote;
mod repository;

pub use handle::LogoHandle;
pub use presets::{find_preset, Preset, DEFAULT_PRESET, PRESETS};
pub use remote::{Download, LogoClient, RemoteConfig};
pub use repository::{FetchPolicy, LogoOrigin, LogoRepository, ResolvedLogo};

/// Largest accepted logo input, 4.5 MiB.
pub const MAX_INPUT_BYTES: u64 = 4_718_592;
