use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::PathBuf,
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use super::pipeline::{FrameSource, SharedProfile, SharedStats, run_pipeline};
use super::runtime::socket_path;
use crate::config::DaemonConfigState;

const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

pub fn run_daemon(source: FrameSource) -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        if UnixStream::connect(&sock).is_ok() {
            return Err(anyhow!("posectl daemon already running at {}", sock.display()));
        }
        let _ = std::fs::remove_file(&sock);
    }
    let listener = UnixListener::bind(&sock)?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new(source)?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let (tx_evt, rx_evt) = mpsc::channel::<DaemonEvent>();

    let _pipeline = PipelineThread::start(&state, tx_evt)?;
    let _watcher = watch_profiles(&state.cfg.profiles_dir, tx_req.clone())?;
    forward_signals(tx_req.clone())?;

    let mut profile_edits = ReloadDebounce::new(RELOAD_DEBOUNCE);

    // accept loop
    listener.set_nonblocking(true)?;
    let result = loop {
        if let Ok((stream, _)) = listener.accept() {
            let tx = tx_req.clone();
            let st_snapshot = state.clone_shallow();
            thread::spawn(move || {
                if let Err(e) = handle_client(stream, st_snapshot, tx) {
                    error!("ipc client error: {e}");
                }
            });
        }

        let mut finished = None;
        while let Ok(evt) = rx_evt.try_recv() {
            match evt {
                DaemonEvent::SourceClosed => {
                    info!("frame source {} closed", state.source.describe());
                    finished = Some(Ok(()));
                }
                DaemonEvent::PipelineFailed(e) => {
                    finished = Some(Err(anyhow!("gesture pipeline failed: {e}")));
                }
            }
        }
        if let Some(r) = finished {
            break r;
        }

        let mut shutdown = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload => state.reload(),
                IpcMsg::ProfileChanged(path) => {
                    if path == state.cfg.active_path() {
                        profile_edits.touch(Instant::now());
                    }
                }
                IpcMsg::UseProfile(name) => {
                    if let Err(e) = state.cfg.set_active(&name) {
                        error!("use profile failed: {e}");
                    } else {
                        state.profile.replace(state.cfg.profile.clone());
                        info!("switched active profile to {}", state.cfg.active_name);
                    }
                }
                IpcMsg::Shutdown => shutdown = true,
            }
        }
        if shutdown {
            info!("daemon: shutting down");
            break Ok(());
        }

        if profile_edits.take_due(Instant::now()) {
            info!("active profile changed on disk");
            state.reload();
        }

        thread::sleep(Duration::from_millis(5));
    };

    let _ = std::fs::remove_file(&sock);
    result
}

fn handle_client(
    mut stream: UnixStream,
    st: DaemonState,
    tx_req: mpsc::Sender<IpcMsg>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let req: serde_json::Value = serde_json::from_str(&line)?;
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");

    let resp = match op {
        "status" => {
            let stats = st
                .stats
                .lock()
                .map(|s| serde_json::to_value(&*s))
                .map_err(|_| anyhow!("stats lock poisoned"))??;
            serde_json::json!({"ok": true, "data": {
                "active_profile": st.cfg.active_name,
                "profile_name": st.cfg.profile.meta.name,
                "config_dir": st.cfg.config_dir,
                "socket": socket_path()?,
                "source": st.source.describe(),
                "pipeline": stats,
            }})
        }
        "reload" => {
            let _ = tx_req.send(IpcMsg::Reload);
            serde_json::json!({"ok": true, "data": {"active_profile": st.cfg.active_name}})
        }
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.is_empty() || !st.cfg.profile_path(name).exists() {
                serde_json::json!({"ok": false, "error": format!("profile not found: {name}")})
            } else {
                let _ = tx_req.send(IpcMsg::UseProfile(name.to_string()));
                serde_json::json!({"ok": true, "data": {"active_profile": name}})
            }
        }
        "list" => {
            let list = st.cfg.list_profiles();
            serde_json::json!({"ok": true, "data": {"profiles": list, "active": st.cfg.active_name}})
        }
        "shutdown" => {
            let _ = tx_req.send(IpcMsg::Shutdown);
            serde_json::json!({"ok": true, "data": "shutting down"})
        }
        _ => serde_json::json!({"ok": false, "error": format!("unknown op: {op}")}),
    };

    writeln!(stream, "{}", resp)?;
    Ok(())
}

struct DaemonState {
    cfg: DaemonConfigState,
    source: FrameSource,
    profile: Arc<SharedProfile>,
    stats: SharedStats,
}

impl DaemonState {
    fn new(source: FrameSource) -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        let profile = Arc::new(SharedProfile::new(cfg.profile.clone()));
        Ok(Self {
            cfg,
            source,
            profile,
            stats: SharedStats::default(),
        })
    }

    fn clone_shallow(&self) -> Self {
        Self {
            cfg: self.cfg.clone(),
            source: self.source.clone(),
            profile: self.profile.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Keeps the last good profile when the file does not parse.
    fn reload(&mut self) {
        match self.cfg.reload() {
            Ok(()) => {
                self.profile.replace(self.cfg.profile.clone());
                info!("profile reloaded");
            }
            Err(e) => error!("reload failed: {e}"),
        }
    }
}

/// Trailing-edge debounce: fires once no change has arrived for `quiet`.
struct ReloadDebounce {
    pending: Option<Instant>,
    quiet: Duration,
}

impl ReloadDebounce {
    fn new(quiet: Duration) -> Self {
        Self {
            pending: None,
            quiet,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.pending = Some(now);
    }

    fn take_due(&mut self, now: Instant) -> bool {
        match self.pending {
            Some(t) if now.saturating_duration_since(t) >= self.quiet => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}

enum IpcMsg {
    Reload,
    ProfileChanged(PathBuf),
    UseProfile(String),
    Shutdown,
}

enum DaemonEvent {
    SourceClosed,
    PipelineFailed(String),
}

struct PipelineThread {
    _thread: thread::JoinHandle<()>,
}

impl PipelineThread {
    fn start(state: &DaemonState, tx_evt: mpsc::Sender<DaemonEvent>) -> Result<Self> {
        let reader = state.source.open()?;
        let profile = state.profile.clone();
        let stats = state.stats.clone();
        let handle = thread::spawn(move || {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let evt = match run_pipeline(reader, &profile, &stats, &mut out) {
                Ok(()) => DaemonEvent::SourceClosed,
                Err(e) => DaemonEvent::PipelineFailed(e.to_string()),
            };
            let _ = tx_evt.send(evt);
        });
        Ok(Self { _thread: handle })
    }
}

fn watch_profiles(
    dir: &std::path::Path,
    tx: mpsc::Sender<IpcMsg>,
) -> Result<notify::RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if matches!(ev.kind, EventKind::Modify(_) | EventKind::Create(_)) => {
                for path in ev.paths {
                    let _ = tx.send(IpcMsg::ProfileChanged(path));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("profile watcher error: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    debug!("watching {}", dir.display());
    Ok(watcher)
}

fn forward_signals(tx: mpsc::Sender<IpcMsg>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("received signal {sig}");
            let _ = tx.send(IpcMsg::Shutdown);
        }
    });
    Ok(())
}

// client helper
pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "posectl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_waits_for_the_last_write() {
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        let mut d = ReloadDebounce::new(RELOAD_DEBOUNCE);
        assert!(!d.take_due(t0));

        // Truncate then write: two events 100ms apart.
        d.touch(t0);
        d.touch(t0 + ms(100));
        assert!(!d.take_due(t0 + ms(300)));
        assert!(d.take_due(t0 + ms(350)));
        assert!(!d.take_due(t0 + ms(1000)));
    }
}
