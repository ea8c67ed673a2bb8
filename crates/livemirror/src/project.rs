//! Finding, opening and identifying Live projects on disk.
//!
//! Launching Live and asking it which set is open are host-specific, so they
//! sit behind [`Launcher`]. [`SystemLauncher`] does it the macOS way: `ps` to
//! see whether Live runs, Live's own `Log.txt` to see what it opened last,
//! and `open -a` to launch.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::error::{LiveError, Result};

/// Starts Live and reports what it has open.
pub trait Launcher: Send + Sync {
    /// The set Live has open, or `None` if Live isn't running or we can't tell.
    fn currently_open(&self) -> Option<PathBuf>;

    /// Ask the OS to open `project` in Live. Returns once the request is made.
    fn launch(&self, project: &Path) -> Result<()>;
}

/// Search roots for project names: the working directory, then `live_root`.
#[derive(Debug, Clone)]
pub struct ProjectLocator {
    roots: Vec<PathBuf>,
}

impl ProjectLocator {
    pub fn new(live_root: Option<PathBuf>) -> Self {
        let mut roots = vec![PathBuf::from(".")];
        roots.extend(live_root);
        Self { roots }
    }

    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Resolve `name` to an existing path.
    ///
    /// In each root, tries `name`, then `name.als`, then
    /// `name Project/name.als`.
    pub fn locate(&self, name: &str) -> Result<PathBuf> {
        for root in &self.roots {
            for candidate in candidates(root, name) {
                if candidate.exists() {
                    debug!("project {} found at {}", name, candidate.display());
                    return Ok(canonical(&candidate));
                }
            }
        }

        Err(LiveError::io(
            name,
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "couldn't find project file '{}' (searched {:?}; is LIVE_ROOT set?)",
                    name, self.roots
                ),
            ),
        ))
    }
}

fn candidates(root: &Path, name: &str) -> [PathBuf; 3] {
    let stem = Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string());
    let base = root.join(name);
    [
        base.clone(),
        root.join(format!("{}.als", name)),
        base.with_file_name(format!("{} Project", stem))
            .join(format!("{}.als", stem)),
    ]
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn als_line() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(file://\S.*\.als)\s*$").ok()).as_ref()
}

/// Last `.als` document mentioned in the contents of Live's `Log.txt`.
pub fn last_opened_set(log: &str) -> Option<PathBuf> {
    let re = als_line()?;
    let captures = log.lines().filter_map(|line| re.captures(line)).last()?;
    let url = captures.get(1)?.as_str();
    match Url::parse(url).map(|u| u.to_file_path()) {
        Ok(Ok(path)) => Some(canonical(&path)),
        _ => {
            debug!("not a local file URL in Log.txt: {}", url);
            None
        }
    }
}

/// macOS: Live in `/Applications`, logs in `~/Library/Preferences/Ableton`.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    preferences: PathBuf,
    applications: PathBuf,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        let preferences = directories::BaseDirs::new()
            .map(|d| d.home_dir().join("Library/Preferences/Ableton"))
            .unwrap_or_else(|| PathBuf::from("Library/Preferences/Ableton"));
        Self {
            preferences,
            applications: PathBuf::from("/Applications"),
        }
    }
}

impl SystemLauncher {
    pub fn new(preferences: PathBuf, applications: PathBuf) -> Self {
        Self {
            preferences,
            applications,
        }
    }

    fn live_running(&self) -> bool {
        match Command::new("ps").args(["axc", "-o", "command"]).output() {
            Ok(out) => String::from_utf8_lossy(&out.stdout)
                .lines()
                .any(|line| line.trim() == "Live"),
            Err(e) => {
                debug!("ps failed: {}", e);
                false
            }
        }
    }

    /// `Live */Log.txt` with the newest modification time.
    fn newest_log(&self) -> Option<PathBuf> {
        fs::read_dir(&self.preferences)
            .ok()?
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("Live "))
            .map(|e| e.path().join("Log.txt"))
            .filter_map(|p| {
                let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
                Some((modified, p))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, p)| p)
    }

    /// Alphabetically last `Ableton*.app`, i.e. the newest version.
    fn newest_app(&self) -> Option<PathBuf> {
        let mut apps: Vec<PathBuf> = fs::read_dir(&self.applications)
            .ok()?
            .flatten()
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.starts_with("Ableton") && name.ends_with(".app")
            })
            .map(|e| e.path())
            .collect();
        apps.sort();
        apps.pop()
    }
}

impl Launcher for SystemLauncher {
    fn currently_open(&self) -> Option<PathBuf> {
        if !self.live_running() {
            return None;
        }
        let log = self.newest_log()?;
        let contents = fs::read_to_string(&log).ok()?;
        last_opened_set(&contents)
    }

    fn launch(&self, project: &Path) -> Result<()> {
        let app = self.newest_app().ok_or_else(|| {
            LiveError::NotFound(format!("no Ableton*.app in {}", self.applications.display()))
        })?;
        info!("opening {} with {}", project.display(), app.display());

        let status = Command::new("open")
            .arg("-a")
            .arg(&app)
            .arg(project)
            .status()
            .map_err(|e| LiveError::io(&app, e))?;
        if !status.success() {
            return Err(LiveError::InvalidOperation(format!(
                "`open -a {}` exited with {}",
                app.display(),
                status
            )));
        }
        Ok(())
    }
}
