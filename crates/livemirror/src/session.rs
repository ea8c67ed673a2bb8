//! The session facade: owns the gateway and the mirrored graph.
//!
//! A [`Session`] is the only way in. It scans, loads and saves the graph,
//! drives the transport, and hands out lightweight handles ([`TrackRef`],
//! [`GroupRef`], [`SceneRef`], ...) that resolve through it on every call.
//!
//! Live pushes clip status changes, tempo changes, beats and a startup ping.
//! Handlers for those run on the gateway's listener thread and update the
//! graph in place, so the graph sits behind a lock shared with that thread.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use liveconf::LiveConfig;
use liveosc::{
    osc_args, BeatCallback, Gateway, GatewayConfig, Interrupt, OscValue, Signal, BEAT_ADDRESS,
    STARTUP_ADDRESS,
};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::handles::{GroupRef, SceneRef, TrackRef};
use crate::model::SessionGraph;
use crate::project::{Launcher, ProjectLocator, SystemLauncher};
use crate::property::{self, first_bool, first_f32, first_i32, Property, PropertyCache};
use crate::scanner::{self, ScanOptions, Scanner};
use crate::snapshot::SnapshotStore;

const PLAY: &str = "/live/play";
const PLAY_CONTINUE: &str = "/live/play/continue";
const PLAY_CLIPSLOT: &str = "/live/play/clipslot";
const PLAY_SCENE: &str = "/live/play/scene";
const STOP: &str = "/live/stop";
const STOP_CLIP: &str = "/live/stop/clip";
const STOP_TRACK: &str = "/live/stop/track";
const UNDO: &str = "/live/undo";
const REDO: &str = "/live/redo";
const PREV_CUE: &str = "/live/prev/cue";
const NEXT_CUE: &str = "/live/next/cue";
const STOP_ALL_CLIPS: &str = "/live/song/stop_all_clips";
const DUPLICATE_TRACK: &str = "/live/song/duplicate_track";
const DELETE_TRACK: &str = "/live/song/delete_track";
const CREATE_SCENE: &str = "/live/song/create_scene";
const DELETE_SCENE: &str = "/live/song/delete_scene";
pub(crate) const CLIP_INFO: &str = "/live/clip/info";

/// How long a tempo probe may take before we decide Live isn't up yet.
const STARTUP_PROBE: Duration = Duration::from_millis(100);

/// Mirror of one Live set.
pub struct Session {
    gateway: Gateway,
    graph: Arc<RwLock<SessionGraph>>,
    scanned: Arc<AtomicBool>,
    properties: Arc<PropertyCache>,
    beat: Arc<Signal>,
    startup: Arc<Signal>,
    tempo_seen: Arc<Signal>,
    interrupt: Interrupt,
    snapshots: SnapshotStore,
    locator: ProjectLocator,
    launcher: Box<dyn Launcher>,
    max_tracks_per_query: usize,
    scan_defaults: ScanOptions,
}

impl Session {
    /// Bind the OSC gateway described by `config` and wire up notifications.
    pub fn connect(config: &LiveConfig) -> Result<Self> {
        let gateway = Gateway::connect(GatewayConfig::from_config(config)?)?;
        Ok(Self::with_gateway(gateway, config))
    }

    /// Build a session around an existing gateway.
    pub fn with_gateway(gateway: Gateway, config: &LiveConfig) -> Self {
        let session = Self {
            gateway,
            graph: Arc::new(RwLock::new(SessionGraph::default())),
            scanned: Arc::new(AtomicBool::new(false)),
            properties: Arc::new(PropertyCache::new(config.scan.caching)),
            beat: Arc::new(Signal::new()),
            startup: Arc::new(Signal::new()),
            tempo_seen: Arc::new(Signal::new()),
            interrupt: Interrupt::new(),
            snapshots: SnapshotStore::new(config.paths.cache_dir.clone()),
            locator: ProjectLocator::new(config.paths.live_root.clone()),
            launcher: Box::new(SystemLauncher::default()),
            max_tracks_per_query: config.scan.max_tracks_per_query,
            scan_defaults: ScanOptions::from_config(&config.scan),
        };
        session.register_handlers();
        session
    }

    /// Replace the OS launcher (tests, other platforms).
    pub fn with_launcher(mut self, launcher: impl Launcher + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    pub fn with_locator(mut self, locator: ProjectLocator) -> Self {
        self.locator = locator;
        self
    }

    fn register_handlers(&self) {
        let graph = Arc::clone(&self.graph);
        let scanned = Arc::clone(&self.scanned);
        self.gateway.add_handler(CLIP_INFO, move |args| {
            if !scanned.load(Ordering::SeqCst) {
                return;
            }
            let field = |i: usize| args.get(i).and_then(OscValue::as_i32);
            let (Some(track), Some(clip), Some(state)) = (field(0), field(1), field(2)) else {
                trace!("clip info without (track, clip, state): {:?}", args);
                return;
            };
            if track < 0 || clip < 0 {
                return;
            }
            let applied = graph
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .apply_clip_state(track as usize, clip as usize, state);
            if applied {
                trace!("clip ({}, {}) -> state {}", track, clip, state);
            } else {
                trace!("ignoring state {} for unknown clip ({}, {})", state, track, clip);
            }
        });

        let properties = Arc::clone(&self.properties);
        let tempo_seen = Arc::clone(&self.tempo_seen);
        if let Some(address) = property::TEMPO.get {
            self.gateway.add_handler(address, move |args| {
                properties.observe(&property::TEMPO, &[], args.to_vec());
                tempo_seen.set();
            });
        }

        let beat = Arc::clone(&self.beat);
        self.gateway.add_handler(BEAT_ADDRESS, move |_| beat.set());

        let startup = Arc::clone(&self.startup);
        self.gateway.add_handler(STARTUP_ADDRESS, move |_| startup.set());
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Raise this (from a signal handler, say) to abort beat and startup waits.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn is_scanned(&self) -> bool {
        self.scanned.load(Ordering::SeqCst)
    }

    pub fn caching(&self) -> bool {
        self.properties.is_enabled()
    }

    /// Remember property values until the next uncached read refreshes them.
    pub fn set_caching(&self, enabled: bool) {
        self.properties.set_enabled(enabled);
    }

    /// Read access to the graph. Don't hold it across calls that talk to Live.
    pub fn graph(&self) -> RwLockReadGuard<'_, SessionGraph> {
        self.graph.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn graph_mut(&self) -> RwLockWriteGuard<'_, SessionGraph> {
        self.graph.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the graph and forget it was scanned.
    pub fn reset(&self) {
        self.scanned.store(false, Ordering::SeqCst);
        self.graph_mut().clear();
        self.properties.clear();
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Stop playback and rebuild the graph from Live.
    pub fn scan(&self, options: ScanOptions) -> Result<()> {
        self.stop()?;
        self.scanned.store(false, Ordering::SeqCst);
        Scanner::new(&self.gateway, &self.graph, self.max_tracks_per_query).run(options)?;
        self.scanned.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Scan with the options from configuration.
    pub fn scan_default(&self) -> Result<()> {
        self.scan(self.scan_defaults)
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Generic property read; see [`crate::property`].
    pub fn get_property(&self, prop: &Property, coords: &[usize]) -> Result<Vec<OscValue>> {
        self.properties.get(&self.gateway, prop, coords)
    }

    /// Generic property write.
    pub fn set_property(&self, prop: &Property, coords: &[usize], values: Vec<OscValue>) -> Result<()> {
        self.properties.set(&self.gateway, prop, coords, values)
    }

    pub(crate) fn get_f32(&self, prop: &Property, coords: &[usize]) -> Result<f32> {
        first_f32(prop.name, &self.get_property(prop, coords)?)
    }

    pub(crate) fn get_i32(&self, prop: &Property, coords: &[usize]) -> Result<i32> {
        first_i32(prop.name, &self.get_property(prop, coords)?)
    }

    pub(crate) fn get_bool(&self, prop: &Property, coords: &[usize]) -> Result<bool> {
        first_bool(prop.name, &self.get_property(prop, coords)?)
    }

    pub fn tempo(&self) -> Result<f32> {
        self.get_f32(&property::TEMPO, &[])
    }

    pub fn set_tempo(&self, bpm: f32) -> Result<()> {
        self.set_property(&property::TEMPO, &[], osc_args![bpm])
    }

    pub fn quantization(&self) -> Result<i32> {
        self.get_i32(&property::QUANTIZATION, &[])
    }

    pub fn set_quantization(&self, value: i32) -> Result<()> {
        self.set_property(&property::QUANTIZATION, &[], osc_args![value])
    }

    /// Song position in beats.
    pub fn time(&self) -> Result<f32> {
        self.get_f32(&property::TIME, &[])
    }

    pub fn set_time(&self, beats: f32) -> Result<()> {
        self.set_property(&property::TIME, &[], osc_args![beats])
    }

    pub fn overdub(&self) -> Result<bool> {
        self.get_bool(&property::OVERDUB, &[])
    }

    pub fn set_overdub(&self, on: bool) -> Result<()> {
        self.set_property(&property::OVERDUB, &[], osc_args![i32::from(on)])
    }

    /// (tempo, overdub) in one round-trip.
    pub fn state(&self) -> Result<(f32, bool)> {
        let values = self.get_property(&property::STATE, &[])?;
        let tempo = first_f32("/live/state", &values)?;
        let overdub = first_bool("/live/state", values.get(1..).unwrap_or_default())?;
        Ok((tempo, overdub))
    }

    pub fn current_scene(&self) -> Result<usize> {
        Ok(self.get_i32(&property::CURRENT_SCENE, &[])?.max(0) as usize)
    }

    pub fn set_current_scene(&self, scene: usize) -> Result<()> {
        self.set_property(&property::CURRENT_SCENE, &[], osc_args![scene])
    }

    pub fn master_volume(&self) -> Result<f32> {
        self.get_f32(&property::MASTER_VOLUME, &[])
    }

    pub fn set_master_volume(&self, value: f32) -> Result<()> {
        self.set_property(&property::MASTER_VOLUME, &[], osc_args![value])
    }

    pub fn master_pan(&self) -> Result<f32> {
        self.get_f32(&property::MASTER_PAN, &[])
    }

    pub fn set_master_pan(&self, value: f32) -> Result<()> {
        self.set_property(&property::MASTER_PAN, &[], osc_args![value])
    }

    pub fn return_volume(&self, return_index: usize) -> Result<f32> {
        self.get_f32(&property::RETURN_VOLUME, &[return_index])
    }

    pub fn set_return_volume(&self, return_index: usize, value: f32) -> Result<()> {
        self.set_property(&property::RETURN_VOLUME, &[return_index], osc_args![value])
    }

    pub fn num_tracks(&self) -> Result<usize> {
        scanner::query_count(&self.gateway, scanner::NUM_TRACKS)
    }

    pub fn num_scenes(&self) -> Result<usize> {
        scanner::query_count(&self.gateway, scanner::NUM_SCENES)
    }

    pub fn track_names(&self, offset: usize, count: usize) -> Result<Vec<String>> {
        scanner::query_track_names(&self.gateway, offset, count)
    }

    pub fn scene_names(&self) -> Result<Vec<Option<String>>> {
        let count = self.num_scenes()?;
        scanner::query_scene_names(&self.gateway, count)
    }

    /// True when Live answers a tempo query.
    pub fn is_connected(&self) -> bool {
        match self.tempo() {
            Ok(bpm) => bpm > 0.0,
            Err(e) => {
                debug!("not connected: {}", e);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Start playback; from the start marker when `reset`, else where it stopped.
    pub fn play(&self, reset: bool) -> Result<()> {
        let address = if reset { PLAY } else { PLAY_CONTINUE };
        Ok(self.gateway.send(address, osc_args![])?)
    }

    pub fn stop(&self) -> Result<()> {
        Ok(self.gateway.send(STOP, osc_args![])?)
    }

    pub fn play_clip(&self, track: usize, clip: usize) -> Result<()> {
        Ok(self.gateway.send(PLAY_CLIPSLOT, osc_args![track, clip])?)
    }

    pub fn stop_clip(&self, track: usize, clip: usize) -> Result<()> {
        Ok(self.gateway.send(STOP_CLIP, osc_args![track, clip])?)
    }

    pub fn play_scene(&self, scene: usize) -> Result<()> {
        Ok(self.gateway.send(PLAY_SCENE, osc_args![scene])?)
    }

    pub fn stop_track(&self, track: usize) -> Result<()> {
        Ok(self.gateway.send(STOP_TRACK, osc_args![track])?)
    }

    pub fn undo(&self) -> Result<()> {
        Ok(self.gateway.send(UNDO, osc_args![])?)
    }

    pub fn redo(&self) -> Result<()> {
        Ok(self.gateway.send(REDO, osc_args![])?)
    }

    pub fn prev_cue(&self) -> Result<()> {
        Ok(self.gateway.send(PREV_CUE, osc_args![])?)
    }

    pub fn next_cue(&self) -> Result<()> {
        Ok(self.gateway.send(NEXT_CUE, osc_args![])?)
    }

    /// Stop every clip in the set; the transport keeps running.
    pub fn stop_all_clips(&self) -> Result<()> {
        Ok(self.gateway.send(STOP_ALL_CLIPS, osc_args![])?)
    }

    // ------------------------------------------------------------------
    // Set structure
    // ------------------------------------------------------------------

    /// Copy a track; the copy lands right after it.
    pub fn duplicate_track(&self, track: usize) -> Result<()> {
        self.edit_structure(DUPLICATE_TRACK, osc_args![track])
    }

    pub fn delete_track(&self, track: usize) -> Result<()> {
        self.edit_structure(DELETE_TRACK, osc_args![track])
    }

    /// Insert an empty scene at `index`, or after the last one for `None`.
    pub fn create_scene(&self, index: Option<usize>) -> Result<()> {
        let index = index.map_or(-1, |i| i as i32);
        self.edit_structure(CREATE_SCENE, osc_args![index])
    }

    pub fn delete_scene(&self, scene: usize) -> Result<()> {
        self.edit_structure(DELETE_SCENE, osc_args![scene])
    }

    /// Indexes shift under these edits, so the mirror counts as unscanned
    /// (and drops clip notifications) until the next scan.
    fn edit_structure(&self, address: &str, args: Vec<OscValue>) -> Result<()> {
        self.gateway.send(address, args)?;
        if self.scanned.swap(false, Ordering::SeqCst) {
            info!("{} changed the set, rescan to refresh the mirror", address);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Beats and startup
    // ------------------------------------------------------------------

    /// Block until Live's next beat notification.
    pub fn wait_for_next_beat(&self) -> Result<()> {
        self.beat.reset();
        self.beat
            .wait(self.gateway.poll_interval(), None, &self.interrupt)?;
        Ok(())
    }

    /// Run `callback` on every beat (on the listener thread).
    pub fn set_beat_callback(&self, callback: BeatCallback) {
        self.gateway.set_beat_callback(callback);
    }

    pub fn set_startup_callback<F: Fn() + Send + Sync + 'static>(&self, callback: F) {
        self.gateway.set_startup_callback(callback);
    }

    /// Return once LiveOSC is answering.
    ///
    /// If any tempo message arrives shortly after a tempo probe, Live is
    /// already up; otherwise wait for the startup notification. The probe
    /// doesn't take the request slot, so a tempo request already in flight
    /// elsewhere answers it just as well.
    pub fn wait_for_startup(&self) -> Result<()> {
        self.startup.reset();
        self.tempo_seen.reset();
        let probe = property::TEMPO.get.unwrap_or("/live/tempo");
        if let Err(e) = self.gateway.send(probe, osc_args![]) {
            debug!("startup probe: {}", e);
        }
        let deadline = Instant::now() + STARTUP_PROBE;
        if self
            .tempo_seen
            .wait(self.gateway.poll_interval(), Some(deadline), &self.interrupt)?
        {
            return Ok(());
        }

        info!("waiting for Live to start");
        self.startup
            .wait(self.gateway.poll_interval(), None, &self.interrupt)?;
        info!("Live is up");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub fn save(&self, name: &str) -> Result<PathBuf> {
        self.snapshots.save(&self.graph(), name)
    }

    /// Replace the graph with a snapshot. Clip states come back Stopped.
    pub fn load(&self, name: &str) -> Result<()> {
        let graph = self.snapshots.load(name)?;
        *self.graph_mut() = graph;
        self.properties.clear();
        self.beat.reset();
        self.startup.reset();
        self.scanned.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Load a snapshot if it still describes the open set, else scan and save.
    pub fn load_or_scan(&self, name: &str, options: ScanOptions) -> Result<()> {
        if self.snapshot_is_current(name) {
            match self.load(name) {
                Ok(()) => {
                    let loaded = self.graph().tracks.len();
                    let live = self.num_tracks()?;
                    if loaded == live {
                        return Ok(());
                    }
                    info!(
                        "loaded {} tracks but Live has {}, looks like the set changed",
                        loaded, live
                    );
                    self.reset();
                }
                Err(e) => info!("snapshot {} unusable: {}", name, e),
            }
        }

        self.scan(options)?;
        self.save(name)?;
        Ok(())
    }

    fn snapshot_is_current(&self, name: &str) -> bool {
        let Some(saved) = self.snapshots.modified(name) else {
            return false;
        };
        match self.launcher.currently_open() {
            Some(set_file) => match fs::metadata(&set_file).and_then(|m| m.modified()) {
                Ok(edited) if edited > saved => {
                    info!("{} modified since snapshot, rescanning", set_file.display());
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    warn!("can't stat {}: {}", set_file.display(), e);
                    true
                }
            },
            None => {
                debug!("couldn't establish currently open set");
                true
            }
        }
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    /// Path of the set Live has open, if it can be determined.
    pub fn currently_open(&self) -> Option<PathBuf> {
        self.launcher.currently_open()
    }

    /// Open a project by name or path. Returns false if it was already open.
    pub fn open(&self, project: &str, wait: bool) -> Result<bool> {
        let path = self.locator.locate(project)?;
        if self.launcher.currently_open().as_deref() == Some(path.as_path()) {
            info!("project {} is already open", path.display());
            return Ok(false);
        }

        self.launcher.launch(&path)?;
        if wait {
            self.wait_for_startup()?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Handles
    // ------------------------------------------------------------------

    pub fn track(&self, index: usize) -> Option<TrackRef<'_>> {
        self.graph()
            .track(index)
            .map(|_| TrackRef::new(self, index))
    }

    /// Every track, groups included, in track order.
    pub fn tracks(&self) -> Vec<TrackRef<'_>> {
        (0..self.graph().tracks.len())
            .map(|i| TrackRef::new(self, i))
            .collect()
    }

    /// Group by group-local index.
    pub fn group(&self, group_index: usize) -> Option<GroupRef<'_>> {
        self.graph()
            .groups
            .get(group_index)
            .map(|&track| GroupRef::new(self, track))
    }

    pub fn groups(&self) -> Vec<GroupRef<'_>> {
        self.graph()
            .groups
            .iter()
            .map(|&track| GroupRef::new(self, track))
            .collect()
    }

    pub fn scene(&self, index: usize) -> Option<SceneRef<'_>> {
        (index < self.graph().scenes.len()).then(|| SceneRef::new(self, index))
    }

    pub fn scenes(&self) -> Vec<SceneRef<'_>> {
        (0..self.graph().scenes.len())
            .map(|i| SceneRef::new(self, i))
            .collect()
    }

    pub fn track_named(&self, name: &str) -> Option<TrackRef<'_>> {
        let index = self.graph().track_named(name)?.index;
        Some(TrackRef::new(self, index))
    }

    pub fn group_named(&self, name: &str) -> Option<GroupRef<'_>> {
        let index = self.graph().group_named(name)?.index;
        Some(GroupRef::new(self, index))
    }

    /// Text tree of the session, scanning first if nothing is loaded.
    pub fn dump(&self) -> Result<String> {
        if self.graph().is_empty() {
            self.scan_default()?;
        }
        Ok(self.graph().to_string())
    }
}
