//! Passive data for the mirrored session graph.
//!
//! The graph is an arena: the session owns every track (groups included) and
//! scene, tracks own their clip slots and devices, devices own their
//! parameters. Back-references are plain indices resolved through
//! [`SessionGraph`], so the whole thing serializes without cycles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Clip slots allocated per track.
pub const CLIP_SLOTS: usize = 1024;

/// Clip playback state, numbered as LiveOSC reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClipState {
    #[default]
    Empty,
    Stopped,
    Playing,
    Starting,
}

impl ClipState {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ClipState::Empty),
            1 => Some(ClipState::Stopped),
            2 => Some(ClipState::Playing),
            3 => Some(ClipState::Starting),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ClipState::Empty => 0,
            ClipState::Stopped => 1,
            ClipState::Playing => 2,
            ClipState::Starting => 3,
        }
    }

    fn symbol(self) -> char {
        match self {
            ClipState::Empty => ' ',
            ClipState::Stopped => '-',
            ClipState::Playing => '>',
            ClipState::Starting => '*',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub track: usize,
    pub index: usize,
    /// Length in beats.
    pub length: f32,
    /// Loop end in beats; starts out at `length`.
    pub loop_end: f32,
    pub name: Option<String>,
    pub state: ClipState,
}

impl Clip {
    pub fn new(track: usize, index: usize, length: f32) -> Self {
        Self {
            track,
            index,
            length,
            loop_end: length,
            name: None,
            state: ClipState::Stopped,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, ClipState::Playing | ClipState::Starting)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub track: usize,
    pub device: usize,
    pub index: usize,
    pub name: String,
    /// Last value seen or written.
    pub value: f32,
    pub min: f32,
    pub max: f32,
    /// Randomise draws whole numbers when set (switches, choosers).
    pub is_quantized: bool,
}

impl Parameter {
    /// LiveOSC doesn't report quantization; on/off switches end in "On".
    pub fn guess_quantized(name: &str) -> bool {
        name.ends_with("On")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub track: usize,
    pub index: usize,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl Device {
    pub fn parameter_named(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackKind {
    Track,
    Group {
        /// Position among groups, counted from 0.
        group_index: usize,
        /// Track indices of the members, in order.
        members: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub index: usize,
    pub name: String,
    /// Track index of the containing group.
    pub group: Option<usize>,
    pub kind: TrackKind,
    /// `clips[i]` is empty or a clip with `index == i`.
    pub clips: Vec<Option<Clip>>,
    pub devices: Vec<Device>,
    /// First populated slot found by the scan.
    pub clip_init: Option<usize>,
}

impl Track {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            group: None,
            kind: TrackKind::Track,
            clips: vec![None; CLIP_SLOTS],
            devices: Vec::new(),
            clip_init: None,
        }
    }

    pub fn new_group(index: usize, group_index: usize, name: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Group {
                group_index,
                members: Vec::new(),
            },
            ..Self::new(index, name)
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, TrackKind::Group { .. })
    }

    pub fn group_index(&self) -> Option<usize> {
        match &self.kind {
            TrackKind::Group { group_index, .. } => Some(*group_index),
            TrackKind::Track => None,
        }
    }

    pub fn members(&self) -> &[usize] {
        match &self.kind {
            TrackKind::Group { members, .. } => members,
            TrackKind::Track => &[],
        }
    }

    pub(crate) fn add_member(&mut self, track: usize) {
        if let TrackKind::Group { members, .. } = &mut self.kind {
            members.push(track);
        }
    }

    pub fn clip(&self, index: usize) -> Option<&Clip> {
        self.clips.get(index).and_then(Option::as_ref)
    }

    pub fn clip_mut(&mut self, index: usize) -> Option<&mut Clip> {
        self.clips.get_mut(index).and_then(Option::as_mut)
    }

    pub fn has_clip(&self, index: usize) -> bool {
        self.clip(index).is_some()
    }

    /// Put `clip` in its slot, growing the slot array if needed.
    pub fn insert_clip(&mut self, clip: Clip) {
        let index = clip.index;
        if index >= self.clips.len() {
            self.clips.resize(index + 1, None);
        }
        self.clips[index] = Some(clip);
    }

    pub fn remove_clip(&mut self, index: usize) -> Option<Clip> {
        self.clips.get_mut(index).and_then(Option::take)
    }

    pub fn active_clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter().flatten()
    }

    pub fn scene_indexes(&self) -> Vec<usize> {
        self.active_clips().map(|c| c.index).collect()
    }

    /// Populated clips in slots `start..finish`.
    pub fn clips_between(&self, start: usize, finish: usize) -> Vec<&Clip> {
        self.active_clips()
            .filter(|c| c.index >= start && c.index < finish)
            .collect()
    }

    pub fn playing_clip(&self) -> Option<&Clip> {
        self.active_clips().find(|c| c.state == ClipState::Playing)
    }

    /// No clip playing or about to.
    pub fn is_stopped(&self) -> bool {
        !self.active_clips().any(Clip::is_playing)
    }

    pub fn device_named(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Neighbouring populated clip, the way a clip launcher steps.
    ///
    /// Without `allow_gaps` only the contiguous run of clips around `from`
    /// is considered. With `wrap` the run is treated as a ring.
    pub fn neighbour_clip(&self, from: usize, step: isize, wrap: bool, allow_gaps: bool) -> Option<&Clip> {
        if !self.has_clip(from) {
            return None;
        }

        let run: Vec<usize> = if allow_gaps {
            self.scene_indexes()
        } else {
            let mut lo = from;
            while lo > 0 && self.has_clip(lo - 1) {
                lo -= 1;
            }
            let mut hi = from;
            while self.has_clip(hi + 1) {
                hi += 1;
            }
            (lo..=hi).collect()
        };

        let pos = run.iter().position(|&i| i == from)? as isize;
        let len = run.len() as isize;
        let mut target = pos + step;
        if wrap {
            target = target.rem_euclid(len);
        }
        if target < 0 || target >= len {
            return None;
        }
        self.clip(run[target as usize])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub name: Option<String>,
}

/// Everything a scan discovers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionGraph {
    /// Every track, groups included, at its track index.
    pub tracks: Vec<Track>,
    /// Track indices of the groups, in group order.
    pub groups: Vec<usize>,
    pub scenes: Vec<Scene>,
}

impl SessionGraph {
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.groups.clear();
        self.scenes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn track_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Group by group-local index.
    pub fn group(&self, group_index: usize) -> Option<&Track> {
        self.groups
            .get(group_index)
            .and_then(|&track| self.tracks.get(track))
    }

    pub fn groups(&self) -> impl Iterator<Item = &Track> {
        self.groups.iter().filter_map(|&t| self.tracks.get(t))
    }

    pub fn track_named(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| !t.is_group() && t.name == name)
    }

    pub fn group_named(&self, name: &str) -> Option<&Track> {
        self.groups().find(|g| g.name == name)
    }

    pub fn clip(&self, track: usize, clip: usize) -> Option<&Clip> {
        self.track(track).and_then(|t| t.clip(clip))
    }

    /// Apply a clip status push. Returns false when it named nothing we know.
    pub fn apply_clip_state(&mut self, track: usize, clip: usize, code: i32) -> bool {
        let Some(state) = ClipState::from_code(code) else {
            return false;
        };
        match self.track_mut(track).and_then(|t| t.clip_mut(clip)) {
            Some(c) => {
                c.state = state;
                true
            }
            None => false,
        }
    }

    /// Playback state can't be trusted after a reload.
    pub fn reset_clip_states(&mut self) {
        for track in &mut self.tracks {
            for clip in track.clips.iter_mut().flatten() {
                clip.state = ClipState::Stopped;
            }
        }
    }

    /// Union of the members' populated scene indexes.
    pub fn group_scene_indexes(&self, group_track: usize) -> Vec<usize> {
        let mut indexes: Vec<usize> = self
            .track(group_track)
            .map(|g| g.members().to_vec())
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| self.track(m))
            .flat_map(|t| t.scene_indexes())
            .collect();
        indexes.sort_unstable();
        indexes.dedup();
        indexes
    }

    fn fmt_track(&self, f: &mut fmt::Formatter<'_>, track: &Track, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent);
        match (&track.kind, track.group.and_then(|g| self.track(g))) {
            (TrackKind::Group { group_index, members }, _) => {
                write!(f, "{}group({}) {}: {}", pad, group_index, track.index, track.name)?;
                if let (Some(first), Some(last)) = (members.first(), members.last()) {
                    write!(f, " [tracks {}-{}]", first, last)?;
                }
                writeln!(f)?;
            }
            (TrackKind::Track, Some(parent)) => writeln!(
                f,
                "{}track({},{}): {}",
                pad,
                parent.group_index().unwrap_or(0),
                track.index,
                track.name
            )?,
            (TrackKind::Track, None) => writeln!(f, "{}track({}): {}", pad, track.index, track.name)?,
        }

        for device in &track.devices {
            writeln!(f, "{}  device({}): {}", pad, device.index, device.name)?;
            for p in &device.parameters {
                writeln!(
                    f,
                    "{}    param({}): {} = {} [{}, {}]",
                    pad, p.index, p.name, p.value, p.min, p.max
                )?;
            }
        }
        if !track.is_group() {
            for clip in track.active_clips() {
                let name = clip.name.as_deref().map(|n| format!(": {}", n)).unwrap_or_default();
                writeln!(
                    f,
                    "{}  clip({},{}){} [{}] (len = {})",
                    pad,
                    clip.track,
                    clip.index,
                    name,
                    clip.state.symbol(),
                    clip.length
                )?;
            }
        }
        Ok(())
    }
}

/// Indented tree of groups, tracks, devices, clips and scenes.
impl fmt::Display for SessionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "live.set: {} tracks, {} groups, {} scenes",
            self.tracks.len(),
            self.groups.len(),
            self.scenes.len()
        )?;
        for track in &self.tracks {
            let indent = if track.group.is_some() { 3 } else { 1 };
            self.fmt_track(f, track, indent)?;
        }
        for scene in &self.scenes {
            writeln!(
                f,
                " scene({}): {}",
                scene.index,
                scene.name.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}
