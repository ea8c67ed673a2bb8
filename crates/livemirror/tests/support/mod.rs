//! A fake LiveOSC peer backed by a small in-memory set.
//!
//! The set is a "Drums" group holding "Kick" and "Snare", eight scenes, and
//! four populated clip slots. Snare carries one device with two parameters.
//! The peer answers the requests a scan makes, applies writes to its own
//! state, and pushes `/live/clip/info` when a clip slot is launched or
//! stopped, the way LiveOSC does.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use liveconf::LiveConfig;
use liveosc::{codec, osc_args, Gateway, GatewayConfig, Message, OscValue};
use livemirror::{Launcher, Session};

pub const SCENES: usize = 8;

#[derive(Debug, Clone)]
pub struct FakeClip {
    pub state: i32,
    pub length: f32,
    pub name: String,
    pub muted: bool,
    pub loop_end: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct FakeTrack {
    pub name: String,
    pub foldable: bool,
    pub volume: f32,
    pub clips: HashMap<usize, FakeClip>,
    /// (name, [(param name, value, min, max)])
    pub devices: Vec<(String, Vec<(String, f32, f32, f32)>)>,
}

impl FakeTrack {
    pub fn new(name: &str, foldable: bool) -> Self {
        Self {
            name: name.to_string(),
            foldable,
            volume: 0.85,
            clips: HashMap::new(),
            devices: Vec::new(),
        }
    }

    pub fn with_clip(mut self, slot: usize, state: i32, length: f32, name: &str) -> Self {
        self.clips.insert(
            slot,
            FakeClip {
                state,
                length,
                name: name.to_string(),
                muted: false,
                loop_end: None,
            },
        );
        self
    }
}

#[derive(Debug, Clone)]
pub struct FakeSet {
    pub tempo: f32,
    pub tracks: Vec<FakeTrack>,
    pub scenes: Vec<String>,
    /// Drop the last name from track blocks, to upset the scanner.
    pub short_track_blocks: bool,
    /// (track, clip) -> [(pitch, pos, dur, vel, mute)]
    pub notes: HashMap<(usize, usize), Vec<(i32, f32, f32, i32, i32)>>,
    /// Sit on tempo queries this long before answering.
    pub tempo_delay: Duration,
}

impl FakeSet {
    /// Bare set with the given tracks and `SCENES` unnamed scenes.
    pub fn with_tracks(tracks: Vec<FakeTrack>) -> Self {
        Self {
            tempo: 120.0,
            tracks,
            scenes: vec![String::new(); SCENES],
            short_track_blocks: false,
            notes: HashMap::new(),
            tempo_delay: Duration::ZERO,
        }
    }

    pub fn fixture() -> Self {
        let mut snare = FakeTrack::new("Snare", false)
            .with_clip(1, 2, 8.0, "Fill")
            .with_clip(3, 1, 2.0, "Roll");
        snare.devices.push((
            "Overdrive".to_string(),
            vec![
                ("Device On".to_string(), 1.0, 0.0, 1.0),
                ("Drive".to_string(), 0.25, 0.0, 1.0),
            ],
        ));

        let mut set = Self::with_tracks(vec![
            FakeTrack::new("Drums", true),
            FakeTrack::new("Kick", false)
                .with_clip(0, 1, 4.0, "Four")
                .with_clip(1, 1, 4.0, "Half"),
            snare,
        ]);
        set.scenes[0] = "Intro".to_string();
        set.scenes[1] = "Verse".to_string();
        set
    }

    fn track_info(&self, t: usize) -> Vec<OscValue> {
        let track = &self.tracks[t];
        let mut reply = osc_args![t, i32::from(track.foldable), 0];
        for slot in 0..SCENES {
            let (state, length) = track
                .clips
                .get(&slot)
                .map(|c| (c.state, c.length))
                .unwrap_or((0, 0.0));
            reply.extend(osc_args![slot, state, length]);
        }
        reply
    }
}

pub struct FakeLive {
    pub addr: SocketAddr,
    socket: Arc<UdpSocket>,
    pub set: Arc<Mutex<FakeSet>>,
    received: Arc<Mutex<Vec<Message>>>,
    stop: Arc<AtomicBool>,
}

impl FakeLive {
    pub fn spawn(set: FakeSet) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        socket
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let set = Arc::new(Mutex::new(set));
        let received = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let (sock, state, log, halt) = (
            Arc::clone(&socket),
            Arc::clone(&set),
            Arc::clone(&received),
            Arc::clone(&stop),
        );
        thread::spawn(move || {
            let mut buf = vec![0u8; 65_536];
            while !halt.load(Ordering::SeqCst) {
                let Ok((len, from)) = sock.recv_from(&mut buf) else {
                    continue;
                };
                let Ok(messages) = codec::decode(&buf[..len]) else {
                    continue;
                };
                for msg in messages {
                    let replies = answer(&mut state.lock().unwrap(), &msg);
                    log.lock().unwrap().push(msg);
                    for (address, args) in replies {
                        let bytes = codec::encode(&address, &args).unwrap();
                        sock.send_to(&bytes, from).unwrap();
                    }
                }
            }
        });

        Self {
            addr,
            socket,
            set,
            received,
            stop,
        }
    }

    /// Send an unsolicited notification.
    pub fn push(&self, to: SocketAddr, address: &str, args: Vec<OscValue>) {
        let bytes = codec::encode(address, &args).unwrap();
        self.socket.send_to(&bytes, to).unwrap();
    }

    pub fn received(&self, address: &str) -> Vec<Vec<OscValue>> {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.address == address)
            .map(|m| m.args.clone())
            .collect()
    }

    pub fn clear_received(&self) {
        self.received.lock().unwrap().clear();
    }

    pub fn edit<F: FnOnce(&mut FakeSet)>(&self, f: F) {
        f(&mut self.set.lock().unwrap());
    }
}

impl Drop for FakeLive {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

fn arg(msg: &Message, i: usize) -> Option<usize> {
    msg.args.get(i).and_then(OscValue::as_i32).map(|v| v as usize)
}

fn answer(set: &mut FakeSet, msg: &Message) -> Vec<(String, Vec<OscValue>)> {
    let reply = |address: &str, args: Vec<OscValue>| vec![(address.to_string(), args)];
    let a = &msg.args;

    match msg.address.as_str() {
        "/live/tracks" => reply("/live/tracks", osc_args![set.tracks.len()]),
        "/live/scenes" => reply("/live/scenes", osc_args![set.scenes.len()]),
        "/live/name/trackblock" => {
            let (offset, count) = (arg(msg, 0).unwrap_or(0), arg(msg, 1).unwrap_or(0));
            let mut names: Vec<OscValue> = set
                .tracks
                .iter()
                .skip(offset)
                .take(count)
                .map(|t| OscValue::from(t.name.as_str()))
                .collect();
            if set.short_track_blocks {
                names.pop();
            }
            reply("/live/name/trackblock", names)
        }
        "/live/name/sceneblock" => {
            let names = set
                .scenes
                .iter()
                .map(|n| OscValue::from(n.as_str()))
                .collect();
            reply("/live/name/sceneblock", names)
        }
        "/live/track/info" => match arg(msg, 0) {
            Some(t) if t < set.tracks.len() => reply("/live/track/info", set.track_info(t)),
            _ => vec![],
        },
        "/live/name/clip" => {
            let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            let clip = set.tracks.get_mut(t).and_then(|tr| tr.clips.get_mut(&c));
            match (clip, a.get(2).and_then(OscValue::as_str)) {
                (Some(clip), Some(name)) => {
                    clip.name = name.to_string();
                    vec![]
                }
                (Some(clip), None) => reply("/live/name/clip", osc_args![t, c, clip.name.as_str()]),
                _ => vec![],
            }
        }
        "/live/tempo" => {
            if let Some(bpm) = a.first().and_then(OscValue::as_f32) {
                set.tempo = bpm;
            }
            thread::sleep(set.tempo_delay);
            reply("/live/tempo", osc_args![set.tempo])
        }
        "/live/volume" => {
            let Some(t) = arg(msg, 0) else { return vec![] };
            let Some(track) = set.tracks.get_mut(t) else { return vec![] };
            match a.get(1).and_then(OscValue::as_f32) {
                Some(v) => {
                    track.volume = v;
                    vec![]
                }
                None => reply("/live/volume", osc_args![t, track.volume]),
            }
        }
        "/live/devicelist" => {
            let Some(t) = arg(msg, 0) else { return vec![] };
            let mut out = osc_args![t];
            for (i, (name, _)) in set.tracks[t].devices.iter().enumerate() {
                out.extend(osc_args![i, name.as_str()]);
            }
            reply("/live/devicelist", out)
        }
        "/live/device" => {
            let (Some(t), Some(d)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            let Some((_, params)) = set.tracks.get_mut(t).and_then(|tr| tr.devices.get_mut(d)) else {
                return vec![];
            };
            match (arg(msg, 2), a.get(3).and_then(OscValue::as_f32)) {
                (Some(p), Some(value)) => {
                    if let Some(param) = params.get_mut(p) {
                        param.1 = value;
                    }
                    vec![]
                }
                (Some(p), None) => match params.get(p) {
                    Some((name, value, _, _)) => {
                        reply("/live/device/param", osc_args![t, d, p, *value, name.as_str()])
                    }
                    None => vec![],
                },
                _ => {
                    let mut out = osc_args![t, d];
                    for (i, (name, value, _, _)) in params.iter().enumerate() {
                        out.extend(osc_args![i, *value, name.as_str()]);
                    }
                    reply("/live/device/allparam", out)
                }
            }
        }
        "/live/device/range" => {
            let (Some(t), Some(d)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            let mut out = osc_args![t, d];
            for (i, (_, _, min, max)) in set.tracks[t].devices[d].1.iter().enumerate() {
                out.extend(osc_args![i, *min, *max]);
            }
            reply("/live/device/range", out)
        }
        "/live/play/clipslot" => {
            let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            let Some(track) = set.tracks.get_mut(t) else { return vec![] };
            let mut out = Vec::new();
            for (slot, clip) in track.clips.iter_mut() {
                if *slot != c && clip.state == 2 {
                    clip.state = 1;
                    out.push(("/live/clip/info".to_string(), osc_args![t, *slot, 1]));
                }
            }
            if let Some(clip) = track.clips.get_mut(&c) {
                clip.state = 2;
                out.push(("/live/clip/info".to_string(), osc_args![t, c, 2]));
            }
            out
        }
        "/live/stop/clip" => {
            let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            match set.tracks.get_mut(t).and_then(|tr| tr.clips.get_mut(&c)) {
                Some(clip) => {
                    clip.state = 1;
                    reply("/live/clip/info", osc_args![t, c, 1])
                }
                None => vec![],
            }
        }
        "/live/clip/create" => {
            if let (Some(t), Some(c), Some(len)) = (arg(msg, 0), arg(msg, 1), a.get(2).and_then(OscValue::as_f32)) {
                if let Some(track) = set.tracks.get_mut(t) {
                    track.clips.insert(
                        c,
                        FakeClip {
                            state: 1,
                            length: len,
                            name: String::new(),
                            muted: false,
                            loop_end: None,
                        },
                    );
                }
            }
            vec![]
        }
        "/live/clip/delete" => {
            if let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) {
                if let Some(track) = set.tracks.get_mut(t) {
                    track.clips.remove(&c);
                }
            }
            vec![]
        }
        "/live/clip/loopend" => {
            if let (Some(t), Some(c), Some(end)) = (arg(msg, 0), arg(msg, 1), a.get(2).and_then(OscValue::as_f32)) {
                if let Some(clip) = set.tracks.get_mut(t).and_then(|tr| tr.clips.get_mut(&c)) {
                    clip.loop_end = Some(end);
                }
            }
            vec![]
        }
        "/live/song/stop_all_clips" => {
            let mut out = Vec::new();
            for (t, track) in set.tracks.iter_mut().enumerate() {
                for (slot, clip) in track.clips.iter_mut() {
                    if clip.state == 2 {
                        clip.state = 1;
                        out.push(("/live/clip/info".to_string(), osc_args![t, *slot, 1]));
                    }
                }
            }
            out
        }
        "/live/song/duplicate_track" => {
            if let Some(t) = arg(msg, 0).filter(|&t| t < set.tracks.len()) {
                let copy = set.tracks[t].clone();
                set.tracks.insert(t + 1, copy);
            }
            vec![]
        }
        "/live/song/delete_track" => {
            if let Some(t) = arg(msg, 0).filter(|&t| t < set.tracks.len()) {
                set.tracks.remove(t);
            }
            vec![]
        }
        "/live/song/create_scene" => {
            match a.first().and_then(OscValue::as_i32) {
                Some(i) if i >= 0 && (i as usize) <= set.scenes.len() => {
                    set.scenes.insert(i as usize, String::new())
                }
                _ => set.scenes.push(String::new()),
            }
            vec![]
        }
        "/live/song/delete_scene" => {
            if let Some(s) = arg(msg, 0).filter(|&s| s < set.scenes.len()) {
                set.scenes.remove(s);
            }
            vec![]
        }
        "/live/clip/add_note" => {
            if let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) {
                let field_i = |i: usize| a.get(i).and_then(OscValue::as_i32).unwrap_or(0);
                let field_f = |i: usize| a.get(i).and_then(OscValue::as_f32).unwrap_or(0.0);
                set.notes.entry((t, c)).or_default().push((
                    field_i(2),
                    field_f(3),
                    field_f(4),
                    field_i(5),
                    field_i(6),
                ));
            }
            vec![]
        }
        "/live/clip/notes" => {
            let (Some(t), Some(c)) = (arg(msg, 0), arg(msg, 1)) else {
                return vec![];
            };
            let mut out = osc_args![t, c];
            for &(pitch, pos, dur, vel, mute) in set.notes.get(&(t, c)).into_iter().flatten() {
                out.extend(osc_args![pitch, pos, dur, vel, mute]);
            }
            reply("/live/clip/note", out)
        }
        _ => vec![],
    }
}

pub fn test_config(cache_dir: &Path) -> LiveConfig {
    let mut config = LiveConfig::default();
    config.osc.timeout_ms = 500;
    config.osc.poll_interval_ms = 2;
    config.paths.cache_dir = cache_dir.to_path_buf();
    config.paths.live_root = None;
    config
}

pub fn session_for(live: &FakeLive, config: &LiveConfig) -> Session {
    let gateway_config = GatewayConfig::new("test", live.addr, "127.0.0.1:0".parse().unwrap())
        .with_timeout(Duration::from_millis(config.osc.timeout_ms))
        .with_poll_interval(Duration::from_millis(config.osc.poll_interval_ms));
    Session::with_gateway(Gateway::connect(gateway_config).unwrap(), config)
}

/// Poll `check` until it holds or a second passes.
pub fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

pub fn unused_port() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// Launcher that records launches and reports whatever it was told is open.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub open: Arc<Mutex<Option<PathBuf>>>,
    pub launched: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeLauncher {
    pub fn with_open(path: &Path) -> Self {
        let launcher = Self::default();
        *launcher.open.lock().unwrap() = Some(path.to_path_buf());
        launcher
    }
}

impl Launcher for FakeLauncher {
    fn currently_open(&self) -> Option<PathBuf> {
        self.open.lock().unwrap().clone()
    }

    fn launch(&self, project: &Path) -> livemirror::Result<()> {
        self.launched.lock().unwrap().push(project.to_path_buf());
        *self.open.lock().unwrap() = Some(project.to_path_buf());
        Ok(())
    }
}
