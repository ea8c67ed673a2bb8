//! Rebuilds the session graph from what Live reports.
//!
//! LiveOSC has no "describe everything" call, so a scan is a long series of
//! small requests: counts, track names in blocks, one info request per track,
//! then optional clip names and device/parameter lists, then scenes.
//!
//! Tracks are published into the shared graph one at a time, so a scan that
//! fails half way leaves the tracks it got through.

use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

use liveconf::ScanConfig;
use liveosc::{osc_args, Gateway, OscValue};
use tracing::{debug, info};

use crate::error::{LiveError, Result};
use crate::model::{Clip, ClipState, Device, Parameter, Scene, SessionGraph, Track};
use crate::property::{first_i32, first_name};

pub(crate) const NUM_TRACKS: &str = "/live/tracks";
pub(crate) const NUM_SCENES: &str = "/live/scenes";
const TRACK_BLOCK: &str = "/live/name/trackblock";
const SCENE_BLOCK: &str = "/live/name/sceneblock";
const TRACK_INFO: &str = "/live/track/info";
const CLIP_NAME: &str = "/live/name/clip";
const DEVICE_LIST: &str = "/live/devicelist";
const DEVICE_PARAMS: &str = "/live/device";
const DEVICE_ALL_PARAMS: &str = "/live/device/allparam";
const DEVICE_RANGES: &str = "/live/device/range";

/// What to fetch beyond track layout and clip slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// One extra request per clip.
    pub clip_names: bool,
    /// Device list, parameters and ranges for every track.
    pub devices: bool,
}

impl ScanOptions {
    pub fn all() -> Self {
        Self {
            clip_names: true,
            devices: true,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            clip_names: config.clip_names,
            devices: config.devices,
        }
    }
}

/// A track's layout as `/live/track/info` reports it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TrackInfo {
    pub foldable: bool,
    pub armed: bool,
    /// (slot, state code, length) for every slot position reported.
    pub slots: Vec<(usize, i32, f32)>,
}

impl TrackInfo {
    /// `[track, foldable, armed, (clip, state, length)*]`; slot position wins
    /// over the echoed clip index.
    pub fn parse(reply: &[OscValue]) -> Result<Self> {
        if reply.len() < 3 {
            return Err(LiveError::unexpected(
                TRACK_INFO,
                format!("expected at least 3 values, got {:?}", reply),
            ));
        }
        let flag = |v: &OscValue| v.as_bool().unwrap_or(false);
        let slots = reply[3..]
            .chunks_exact(3)
            .enumerate()
            .map(|(slot, triple)| {
                let state = triple[1].as_i32().unwrap_or(0);
                let length = triple[2].as_f32().unwrap_or(0.0);
                (slot, state, length)
            })
            .collect();

        Ok(Self {
            foldable: flag(&reply[1]),
            armed: flag(&reply[2]),
            slots,
        })
    }
}

/// Ask for a count; zero counts as Live not being there.
pub(crate) fn query_count(gateway: &Gateway, address: &str) -> Result<usize> {
    let reply = gateway.request(address, osc_args![])?;
    let count = first_i32(address, &reply)?;
    if count <= 0 {
        return Err(LiveError::NotConnected);
    }
    Ok(count as usize)
}

/// Track names from `offset`, `count` at a time. Names only, no indices.
pub(crate) fn query_track_names(gateway: &Gateway, offset: usize, count: usize) -> Result<Vec<String>> {
    let reply = gateway.request(TRACK_BLOCK, osc_args![offset, count])?;
    Ok(reply.iter().map(name_or_empty).collect())
}

pub(crate) fn query_scene_names(gateway: &Gateway, count: usize) -> Result<Vec<Option<String>>> {
    let reply = gateway.request(SCENE_BLOCK, osc_args![0usize, count])?;
    Ok(reply.iter().map(|v| first_name(std::slice::from_ref(v))).collect())
}

fn name_or_empty(value: &OscValue) -> String {
    value.as_str().map(str::to_string).unwrap_or_default()
}

fn write_graph(graph: &RwLock<SessionGraph>) -> RwLockWriteGuard<'_, SessionGraph> {
    graph.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Scanner<'a> {
    gateway: &'a Gateway,
    graph: &'a RwLock<SessionGraph>,
    max_tracks_per_query: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(gateway: &'a Gateway, graph: &'a RwLock<SessionGraph>, max_tracks_per_query: usize) -> Self {
        Self {
            gateway,
            graph,
            max_tracks_per_query: max_tracks_per_query.max(1),
        }
    }

    pub fn run(&self, options: ScanOptions) -> Result<()> {
        write_graph(self.graph).clear();

        let track_count = query_count(self.gateway, NUM_TRACKS)?;
        let scene_count = query_count(self.gateway, NUM_SCENES)?;
        info!("scan: {} tracks, {} scenes", track_count, scene_count);

        let names = self.track_names(track_count)?;

        let mut current_group: Option<usize> = None;
        for (index, name) in names.into_iter().enumerate() {
            let reply = self.gateway.request(TRACK_INFO, osc_args![index])?;
            let info = TrackInfo::parse(&reply)?;
            debug!("scan: track {} ({}) foldable={} armed={}", index, name, info.foldable, info.armed);

            let mut track = if info.foldable {
                let group_index = self.group_count();
                current_group = Some(index);
                Track::new_group(index, group_index, name)
            } else {
                let mut track = Track::new(index, name);
                track.group = current_group;
                self.populate_clips(&mut track, &info, options)?;
                track
            };

            if options.devices {
                track.devices = self.scan_devices(index)?;
            }

            self.publish(track);
        }

        let names = query_scene_names(self.gateway, scene_count)?;
        let mut graph = write_graph(self.graph);
        graph.scenes = (0..scene_count)
            .map(|index| Scene {
                index,
                name: names.get(index).cloned().flatten(),
            })
            .collect();
        info!(
            "scan: done, {} tracks in {} groups, {} scenes",
            graph.tracks.len(),
            graph.groups.len(),
            graph.scenes.len()
        );
        Ok(())
    }

    fn group_count(&self) -> usize {
        self.graph.read().unwrap_or_else(PoisonError::into_inner).groups.len()
    }

    fn track_names(&self, track_count: usize) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(track_count);
        let mut offset = 0;
        while offset < track_count {
            let count = self.max_tracks_per_query.min(track_count - offset);
            debug!("scan: track names from {}, count {}", offset, count);
            names.extend(query_track_names(self.gateway, offset, count)?);
            offset += count;
        }

        if names.len() != track_count {
            return Err(LiveError::ScanIntegrity(format!(
                "Live reported {} tracks but returned {} names",
                track_count,
                names.len()
            )));
        }
        Ok(names)
    }

    fn populate_clips(&self, track: &mut Track, info: &TrackInfo, options: ScanOptions) -> Result<()> {
        for &(slot, code, length) in &info.slots {
            if code <= 0 {
                continue;
            }
            let mut clip = Clip::new(track.index, slot, length);
            clip.state = ClipState::from_code(code).unwrap_or(ClipState::Stopped);
            if options.clip_names {
                let reply = self.gateway.request(CLIP_NAME, osc_args![track.index, slot])?;
                clip.name = first_name(reply.get(2..).unwrap_or_default());
                debug!("scan:  - clip {}: {:?}", slot, clip.name);
            }
            if track.clip_init.is_none() {
                track.clip_init = Some(slot);
            }
            track.insert_clip(clip);
        }
        Ok(())
    }

    fn scan_devices(&self, track: usize) -> Result<Vec<Device>> {
        let list = self.gateway.request(DEVICE_LIST, osc_args![track])?;
        let mut devices = Vec::new();

        for pair in list.get(1..).unwrap_or_default().chunks_exact(2) {
            let index = pair[0]
                .as_i32()
                .ok_or_else(|| LiveError::unexpected(DEVICE_LIST, format!("bad device index {:?}", pair[0])))?
                as usize;
            let name = name_or_empty(&pair[1]);

            let params = self.gateway.request_with(
                DEVICE_PARAMS,
                osc_args![track, index],
                DEVICE_ALL_PARAMS,
                self.gateway.default_timeout(),
            )?;
            let ranges = self.gateway.request(DEVICE_RANGES, osc_args![track, index])?;

            let parameters = params
                .get(2..)
                .unwrap_or_default()
                .chunks_exact(3)
                .zip(ranges.get(2..).unwrap_or_default().chunks_exact(3))
                .map(|(p, r)| {
                    let name = name_or_empty(&p[2]);
                    Parameter {
                        track,
                        device: index,
                        index: p[0].as_i32().unwrap_or(0).max(0) as usize,
                        is_quantized: Parameter::guess_quantized(&name),
                        name,
                        value: p[1].as_f32().unwrap_or(0.0),
                        min: r[1].as_f32().unwrap_or(0.0),
                        max: r[2].as_f32().unwrap_or(1.0),
                    }
                })
                .collect::<Vec<_>>();

            debug!("scan: track {} device {} ({}): {} parameters", track, index, name, parameters.len());
            devices.push(Device {
                track,
                index,
                name,
                parameters,
            });
        }
        Ok(devices)
    }

    /// Add a finished track, wiring group membership and group clip slots.
    fn publish(&self, track: Track) {
        let mut graph = write_graph(self.graph);
        if track.is_group() {
            graph.groups.push(track.index);
        } else if let Some(group) = track.group.and_then(|g| graph.tracks.get_mut(g)) {
            group.add_member(track.index);
            for clip in track.active_clips() {
                let mut mirror = Clip::new(group.index, clip.index, clip.length);
                mirror.state = clip.state;
                group.insert_clip(mirror);
            }
        }
        graph.tracks.push(track);
    }
}
