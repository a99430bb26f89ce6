use std::fs;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use liquidconfig::{LiquidConfig, ShaderParameterSet};
use tracing::{debug, info, warn};

use crate::cli::ParamOverrides;
use crate::run::resolve_parameters;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls the config file and forwards each valid change of parameters.
///
/// Invalid edits are logged and skipped. The thread stops when the watcher
/// is dropped or the sink reports the receiver is gone.
pub struct ConfigWatcher {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    pub fn spawn<F>(path: PathBuf, overrides: ParamOverrides, sink: F) -> Result<Self>
    where
        F: FnMut(ShaderParameterSet) -> Result<()> + Send + 'static,
    {
        Self::spawn_with_interval(path, overrides, POLL_INTERVAL, sink)
    }

    fn spawn_with_interval<F>(
        path: PathBuf,
        overrides: ParamOverrides,
        interval: Duration,
        sink: F,
    ) -> Result<Self>
    where
        F: FnMut(ShaderParameterSet) -> Result<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded(0);
        let baseline = fs::read(&path).ok();
        info!(path = %path.display(), "watching config for parameter changes");
        let handle = thread::Builder::new()
            .name("liquidmetal-watch".into())
            .spawn(move || watch_loop(path, overrides, interval, baseline, stop_rx, sink))
            .map_err(|err| anyhow!("failed to spawn config watcher: {err}"))?;
        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn watch_loop<F>(
    path: PathBuf,
    overrides: ParamOverrides,
    interval: Duration,
    mut last: Option<Vec<u8>>,
    stop: Receiver<()>,
    mut sink: F,
) where
    F: FnMut(ShaderParameterSet) -> Result<()>,
{
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let current = fs::read(&path).ok();
        if current == last {
            continue;
        }
        last = current.clone();

        let Some(bytes) = current else {
            warn!(path = %path.display(), "config file removed; keeping current parameters");
            continue;
        };
        let text = String::from_utf8_lossy(&bytes);
        match LiquidConfig::from_toml_str(&text) {
            Ok(config) => {
                let params = resolve_parameters(&config.params, &overrides);
                if let Err(err) = sink(params) {
                    debug!("config watcher stopping: {err:#}");
                    return;
                }
                info!("config reloaded");
            }
            Err(err) => warn!(path = %path.display(), "ignoring invalid config: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    const QUICK: Duration = Duration::from_millis(10);
    const PATIENCE: Duration = Duration::from_secs(5);

    #[test]
    fn forwards_changed_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        fs::write(&path, "[params]\nedge = 0.5\n").unwrap();

        let (tx, rx) = unbounded();
        let _watcher = ConfigWatcher::spawn_with_interval(
            path.clone(),
            ParamOverrides::default(),
            QUICK,
            move |params| tx.send(params).map_err(|err| anyhow!(err.to_string())),
        )
        .unwrap();

        fs::write(&path, "[params]\nedge = 0.25\n").unwrap();
        let params = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(params.edge, 0.25);
    }

    #[test]
    fn invalid_edits_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        fs::write(&path, "[params]\nedge = 0.5\n").unwrap();

        let (tx, rx) = unbounded();
        let _watcher = ConfigWatcher::spawn_with_interval(
            path.clone(),
            ParamOverrides::default(),
            QUICK,
            move |params| tx.send(params).map_err(|err| anyhow!(err.to_string())),
        )
        .unwrap();

        fs::write(&path, "[params\nedge = ").unwrap();
        thread::sleep(QUICK * 5);
        fs::write(&path, "[params]\nliquid = 0.6\n").unwrap();
        let params = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(params.liquid, 0.6);
        assert_eq!(params.edge, ShaderParameterSet::default().edge);
    }

    #[test]
    fn overrides_and_clamping_apply_to_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        fs::write(&path, "").unwrap();

        let overrides = ParamOverrides {
            speed: Some(0.8),
            ..Default::default()
        };
        let (tx, rx) = unbounded();
        let _watcher = ConfigWatcher::spawn_with_interval(path.clone(), overrides, QUICK, move |params| {
            tx.send(params).map_err(|err| anyhow!(err.to_string()))
        })
        .unwrap();

        fs::write(&path, "[params]\nspeed = 0.1\npattern_scale = 50.0\n").unwrap();
        let params = rx.recv_timeout(PATIENCE).unwrap();
        assert_eq!(params.speed, 0.8);
        assert_eq!(params.pattern_scale, 10.0);
    }

    #[test]
    fn stops_when_the_sink_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("liquidmetal.toml");
        fs::write(&path, "").unwrap();

        let watcher = ConfigWatcher::spawn_with_interval(
            path.clone(),
            ParamOverrides::default(),
            QUICK,
            |_| Err(anyhow!("window closed")),
        )
        .unwrap();
        fs::write(&path, "[params]\nedge = 0.3\n").unwrap();
        drop(watcher);
    }
}
