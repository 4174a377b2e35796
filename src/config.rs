use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::gestures::GestureKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub cooldown_secs: f64,
    /// Evaluation order, highest priority first.
    pub priority: Vec<GestureKind>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cooldown_secs: 2.0,
            priority: GestureKind::DEFAULT_PRIORITY.to_vec(),
        }
    }
}

/// Wave ("Hi"): lateral swing of a raised wrist, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveConfig {
    pub enabled: bool,
    pub window: usize,
    pub min_samples: usize,
    pub step: f32,
    pub min_changes: usize,
    /// Normalized slack below the nose still counted as "raised".
    pub nose_slack: f32,
}

impl Default for WaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 10,
            min_samples: 8,
            step: 5.0,
            min_changes: 2,
            nose_slack: 0.1,
        }
    }
}

/// Raise hands ("Wow"): single-frame, normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaiseHandsConfig {
    pub enabled: bool,
    pub wrist_margin: f32,
}

impl Default for RaiseHandsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wrist_margin: 0.1,
        }
    }
}

/// Clap ("Good"): oscillating wrist separation inside the chest band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClapConfig {
    pub enabled: bool,
    pub window: usize,
    pub min_samples: usize,
    pub min_range: f32,
    pub close_band: f32,
    pub min_close: usize,
    pub min_far: usize,
    /// Chest band, normalized, relative to each shoulder.
    pub band_above: f32,
    pub band_below: f32,
}

impl Default for ClapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 10,
            min_samples: 8,
            min_range: 80.0,
            close_band: 40.0,
            min_close: 2,
            min_far: 2,
            band_above: 0.2,
            band_below: 0.3,
        }
    }
}

/// Nod ("Yes"): vertical nose peaks and valleys, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodConfig {
    pub enabled: bool,
    pub window: usize,
    pub min_samples: usize,
    pub min_range: f32,
    pub step: f32,
    pub approach_step: f32,
    /// Required count of peaks, and separately of valleys.
    pub min_changes: usize,
}

impl Default for NodConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 15,
            min_samples: 12,
            min_range: 8.0,
            step: 3.0,
            approach_step: 2.0,
            min_changes: 1,
        }
    }
}

/// Shake ("No"): horizontal nose turning points, in pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShakeConfig {
    pub enabled: bool,
    pub window: usize,
    pub min_samples: usize,
    pub min_range: f32,
    pub step: f32,
    pub min_changes: usize,
}

impl Default for ShakeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 15,
            min_samples: 10,
            min_range: 25.0,
            step: 5.0,
            min_changes: 2,
        }
    }
}

/// Per-gesture tuning, keyed by gesture name in the profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "lowercase")]
pub struct GestureTable {
    pub hi: WaveConfig,
    pub wow: RaiseHandsConfig,
    pub good: ClapConfig,
    pub yes: NodConfig,
    pub no: ShakeConfig,
}

impl GestureTable {
    pub fn is_enabled(&self, kind: GestureKind) -> bool {
        match kind {
            GestureKind::Hi => self.hi.enabled,
            GestureKind::Wow => self.wow.enabled,
            GestureKind::Good => self.good.enabled,
            GestureKind::Yes => self.yes.enabled,
            GestureKind::No => self.no.enabled,
        }
    }

    #[cfg(test)]
    pub fn set_enabled(&mut self, kind: GestureKind, on: bool) {
        match kind {
            GestureKind::Hi => self.hi.enabled = on,
            GestureKind::Wow => self.wow.enabled = on,
            GestureKind::Good => self.good.enabled = on,
            GestureKind::Yes => self.yes.enabled = on,
            GestureKind::No => self.no.enabled = on,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub gestures: GestureTable,
    /// Reply text attached to dispatched events, keyed by gesture name.
    #[serde(default)]
    pub responses: HashMap<String, String>,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Profile> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn load(path: &Path) -> Result<Profile> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        // A file caught mid-save reads as empty; never mistake it for defaults.
        if txt.trim().is_empty() {
            return Err(anyhow!("profile {} is empty", path.display()));
        }
        Self::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))
    }

    pub fn response_for(&self, kind: GestureKind) -> Option<&str> {
        self.responses
            .iter()
            .find(|(k, _)| k.parse::<GestureKind>().ok() == Some(kind))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(dirs.home_dir().join(".config").join("posectl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_from(config_dir()?)
    }

    pub fn load_from(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = Profile::load(&profdir.join(format!("{active_name}.toml")))?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profile_path(&self.active_name)
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    /// Re-read the active profile. On error the last good profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = Profile::load(&self.active_path())?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = Profile::load(&p)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }
}

fn validate_profile(p: &Profile) -> Result<()> {
    let cd = p.engine.cooldown_secs;
    if !cd.is_finite() || cd <= 0.0 {
        return Err(anyhow!("engine.cooldown_secs must be a positive number"));
    }

    let prio = &p.engine.priority;
    if prio.len() != GestureKind::ALL.len()
        || !GestureKind::ALL.iter().all(|k| prio.contains(k))
    {
        return Err(anyhow!(
            "engine.priority must list each of Hi, Wow, Good, Yes, No exactly once"
        ));
    }

    let g = &p.gestures;
    check_window("hi", g.hi.window, g.hi.min_samples)?;
    check_window("good", g.good.window, g.good.min_samples)?;
    check_window("yes", g.yes.window, g.yes.min_samples)?;
    check_window("no", g.no.window, g.no.min_samples)?;

    if g.yes.min_samples < 5 {
        return Err(anyhow!("gestures.yes.min_samples must be at least 5"));
    }
    if g.no.min_samples < 3 {
        return Err(anyhow!("gestures.no.min_samples must be at least 3"));
    }

    let thresholds = [
        ("hi.step", g.hi.step),
        ("hi.nose_slack", g.hi.nose_slack),
        ("wow.wrist_margin", g.wow.wrist_margin),
        ("good.min_range", g.good.min_range),
        ("good.close_band", g.good.close_band),
        ("good.band_above", g.good.band_above),
        ("good.band_below", g.good.band_below),
        ("yes.min_range", g.yes.min_range),
        ("yes.step", g.yes.step),
        ("yes.approach_step", g.yes.approach_step),
        ("no.min_range", g.no.min_range),
        ("no.step", g.no.step),
    ];
    for (key, v) in thresholds {
        if !v.is_finite() || v < 0.0 {
            return Err(anyhow!("gestures.{key} must be a non-negative number"));
        }
    }

    for (k, v) in &p.responses {
        if k.parse::<GestureKind>().is_err() {
            return Err(anyhow!("response key '{k}' is not a gesture name"));
        }
        if v.trim().is_empty() {
            return Err(anyhow!("response for '{k}' is empty"));
        }
    }
    Ok(())
}

fn check_window(key: &str, window: usize, min_samples: usize) -> Result<()> {
    if min_samples == 0 || min_samples > window {
        return Err(anyhow!(
            "gestures.{key}: min_samples must be in 1..=window ({window})"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_default_profile_parses() {
        let p = Profile::parse(default_profile_text()).unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
        assert_eq!(p.engine.cooldown_secs, 2.0);
        assert_eq!(p.engine.priority, GestureKind::DEFAULT_PRIORITY.to_vec());
        assert!(p.gestures.hi.enabled && p.gestures.wow.enabled && p.gestures.good.enabled);
        assert!(!p.gestures.yes.enabled && !p.gestures.no.enabled);
        assert_eq!(p.response_for(GestureKind::Hi), Some("Hello! Nice to see you."));
    }

    #[test]
    fn empty_profile_uses_defaults() {
        let p = Profile::parse("").unwrap();
        assert_eq!(p.gestures.hi.window, 10);
        assert_eq!(p.gestures.yes.min_samples, 12);
        assert_eq!(p.gestures.no.min_range, 25.0);
        assert!(p.responses.is_empty());
    }

    #[test]
    fn partial_tables_override_single_fields() {
        let p = Profile::parse(
            r#"
            [engine]
            cooldown_secs = 0.5
            priority = ["yes", "no", "wow", "good", "hi"]

            [gestures.yes]
            enabled = true
            min_range = 12.0
            "#,
        )
        .unwrap();
        assert_eq!(p.engine.cooldown_secs, 0.5);
        assert_eq!(p.engine.priority[0], GestureKind::Yes);
        assert!(p.gestures.yes.enabled);
        assert_eq!(p.gestures.yes.min_range, 12.0);
        assert_eq!(p.gestures.yes.window, 15);
    }

    #[test]
    fn rejects_bad_profiles() {
        let cases = [
            "[engine]\ncooldown_secs = 0.0",
            "[engine]\npriority = [\"wow\", \"good\", \"hi\", \"yes\"]",
            "[engine]\npriority = [\"wow\", \"wow\", \"hi\", \"yes\", \"no\"]",
            "[engine]\npriority = [\"wow\", \"good\", \"hi\", \"yes\", \"maybe\"]",
            "[gestures.hi]\nmin_samples = 11",
            "[gestures.good]\nmin_samples = 0",
            "[gestures.no]\nstep = -1.0",
            "[responses]\nwave = \"hey\"",
            "[responses]\nhi = \"  \"",
        ];
        for txt in cases {
            assert!(Profile::parse(txt).is_err(), "accepted: {txt}");
        }
    }

    #[test]
    fn installs_default_and_switches_profiles() {
        let dir = tempfile::tempdir().unwrap();

        let mut st = DaemonConfigState::load_from(dir.path().to_path_buf()).unwrap();
        assert_eq!(st.active_name, "default");
        assert!(st.profiles_dir.join("default.toml").exists());

        fs::write(
            st.profile_path("quiet"),
            "[meta]\nname = \"quiet\"\n[engine]\ncooldown_secs = 5.0\n",
        )
        .unwrap();
        assert_eq!(st.list_profiles(), vec!["default", "quiet"]);

        st.set_active("quiet").unwrap();
        assert_eq!(st.profile.engine.cooldown_secs, 5.0);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "quiet");
        assert!(st.set_active("missing").is_err());

        fs::write(st.active_path(), "[engine]\ncooldown_secs = -1.0\n").unwrap();
        assert!(st.reload().is_err());
        assert_eq!(st.profile.engine.cooldown_secs, 5.0);
    }

    #[test]
    fn empty_profile_file_keeps_last_good() {
        let dir = tempfile::tempdir().unwrap();
        let mut st = DaemonConfigState::load_from(dir.path().to_path_buf()).unwrap();

        fs::write(
            st.profile_path("tuned"),
            "[engine]\ncooldown_secs = 5.0\n[gestures.hi]\nenabled = false\n",
        )
        .unwrap();
        st.set_active("tuned").unwrap();

        for truncated in ["", "  \n\t\n"] {
            fs::write(st.active_path(), truncated).unwrap();
            assert!(st.reload().is_err());
            assert_eq!(st.profile.engine.cooldown_secs, 5.0);
            assert!(!st.profile.gestures.hi.enabled);
        }

        fs::write(st.profile_path("blank"), "").unwrap();
        assert!(st.set_active("blank").is_err());
        assert_eq!(st.active_name, "tuned");
    }
}
