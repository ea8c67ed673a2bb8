//! Borrowed views onto graph entities.
//!
//! A handle is a session reference plus coordinates. It reads the graph on
//! every call, so a handle outlives rescans: if its entity disappears the
//! local accessors return `None` and operations return [`LiveError::NotFound`].

use liveosc::{osc_args, OscValue};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{LiveError, Result};
use crate::model::{Clip, Device, Parameter, Track};
use crate::property::{self, first_name};
use crate::session::Session;

const CLIP_CREATE: &str = "/live/clip/create";
const CLIP_DELETE: &str = "/live/clip/delete";
const CLIP_ADD_NOTE: &str = "/live/clip/add_note";
const CLIP_NOTES: &str = "/live/clip/notes";
const CLIP_NOTE: &str = "/live/clip/note";

/// One MIDI note as LiveOSC describes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub pitch: i32,
    /// Start, in beats from the clip start.
    pub position: f32,
    pub duration: f32,
    pub velocity: i32,
    pub muted: bool,
}

impl Note {
    pub fn new(pitch: i32, position: f32, duration: f32, velocity: i32) -> Self {
        Self {
            pitch,
            position,
            duration,
            velocity,
            muted: false,
        }
    }

    fn from_fields(fields: &[OscValue]) -> Option<Self> {
        Some(Self {
            pitch: fields.first()?.as_i32()?,
            position: fields.get(1)?.as_f32()?,
            duration: fields.get(2)?.as_f32()?,
            velocity: fields.get(3)?.as_i32()?,
            muted: fields.get(4)?.as_bool()?,
        })
    }
}

fn missing(what: impl Into<String>) -> LiveError {
    LiveError::NotFound(what.into())
}

// ----------------------------------------------------------------------
// Tracks
// ----------------------------------------------------------------------

/// A track by index. Groups are tracks too; see [`GroupRef`] for the extras.
#[derive(Clone, Copy)]
pub struct TrackRef<'a> {
    session: &'a Session,
    index: usize,
}

impl<'a> TrackRef<'a> {
    pub(crate) fn new(session: &'a Session, index: usize) -> Self {
        Self { session, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Copy of the mirrored track.
    pub fn snapshot(&self) -> Option<Track> {
        self.session.graph().track(self.index).cloned()
    }

    fn with<T>(&self, f: impl FnOnce(&Track) -> T) -> Result<T> {
        let graph = self.session.graph();
        let track = graph
            .track(self.index)
            .ok_or_else(|| missing(format!("track {}", self.index)))?;
        Ok(f(track))
    }

    pub fn name(&self) -> Option<String> {
        self.with(|t| t.name.clone()).ok()
    }

    pub fn is_group(&self) -> bool {
        self.with(Track::is_group).unwrap_or(false)
    }

    /// The group this track sits in.
    pub fn group(&self) -> Option<GroupRef<'a>> {
        let group = self.with(|t| t.group).ok().flatten()?;
        Some(GroupRef::new(self.session, group))
    }

    pub fn as_group(&self) -> Option<GroupRef<'a>> {
        self.is_group().then(|| GroupRef::new(self.session, self.index))
    }

    pub fn clip(&self, index: usize) -> Option<ClipRef<'a>> {
        self.with(|t| t.has_clip(index))
            .ok()
            .filter(|&has| has)
            .map(|_| ClipRef::new(self.session, self.index, index))
    }

    pub fn active_clips(&self) -> Vec<ClipRef<'a>> {
        self.scene_indexes()
            .into_iter()
            .map(|c| ClipRef::new(self.session, self.index, c))
            .collect()
    }

    pub fn scene_indexes(&self) -> Vec<usize> {
        self.with(Track::scene_indexes).unwrap_or_default()
    }

    /// Populated clips in slots `start..finish`.
    pub fn clips_between(&self, start: usize, finish: usize) -> Vec<ClipRef<'a>> {
        self.with(|t| {
            t.clips_between(start, finish)
                .into_iter()
                .map(|c| c.index)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter()
        .map(|c| ClipRef::new(self.session, self.index, c))
        .collect()
    }

    pub fn playing_clip(&self) -> Option<ClipRef<'a>> {
        let index = self.with(|t| t.playing_clip().map(|c| c.index)).ok()??;
        Some(ClipRef::new(self.session, self.index, index))
    }

    pub fn is_playing(&self) -> bool {
        !self.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.with(Track::is_stopped).unwrap_or(true)
    }

    pub fn devices(&self) -> Vec<DeviceRef<'a>> {
        let count = self.with(|t| t.devices.len()).unwrap_or(0);
        (0..count)
            .map(|d| DeviceRef::new(self.session, self.index, d))
            .collect()
    }

    pub fn device(&self, index: usize) -> Option<DeviceRef<'a>> {
        (index < self.with(|t| t.devices.len()).unwrap_or(0))
            .then(|| DeviceRef::new(self.session, self.index, index))
    }

    pub fn device_named(&self, name: &str) -> Option<DeviceRef<'a>> {
        let position = self
            .with(|t| t.devices.iter().position(|d| d.name == name))
            .ok()??;
        Some(DeviceRef::new(self.session, self.index, position))
    }

    pub fn play_clip(&self, clip: usize) -> Result<()> {
        self.session.play_clip(self.index, clip)
    }

    /// Launch one of this track's clips at random. Returns its slot.
    pub fn play_random_clip(&self) -> Result<usize> {
        let slots = self.scene_indexes();
        if slots.is_empty() {
            return Err(LiveError::InvalidOperation(format!(
                "track {} has no clips to play",
                self.index
            )));
        }
        let slot = slots[rand::thread_rng().gen_range(0..slots.len())];
        debug!("track {}: random clip {}", self.index, slot);
        self.play_clip(slot)?;
        Ok(slot)
    }

    pub fn stop(&self) -> Result<()> {
        self.session.stop_track(self.index)
    }

    /// Step from the playing clip to a populated neighbouring slot, chosen at
    /// random. A stopped track starts on its initial clip; a playing clip
    /// with no populated neighbour gives way to a random clip.
    ///
    /// Returns the launched slot, or `None` for a track with no clips.
    pub fn walk(&self) -> Result<Option<usize>> {
        let (from, init, options) = self.with(|t| {
            let from = t.playing_clip().map(|c| c.index);
            let options: Vec<usize> = from
                .map(|f| {
                    [f.checked_sub(1), Some(f + 1)]
                        .into_iter()
                        .flatten()
                        .filter(|&c| t.has_clip(c))
                        .collect()
                })
                .unwrap_or_default();
            (from, t.clip_init, options)
        })?;

        let Some(from) = from else {
            let Some(init) = init else {
                warn!("track {} has no clips to walk", self.index);
                return Ok(None);
            };
            debug!("track {}: walking to initial clip {}", self.index, init);
            self.play_clip(init)?;
            return Ok(Some(init));
        };

        if options.is_empty() {
            debug!("track {}: nowhere to walk from {}, picking at random", self.index, from);
            return self.play_random_clip().map(Some);
        }
        let to = options[rand::thread_rng().gen_range(0..options.len())];
        debug!("track {}: walking from clip {} to {}", self.index, from, to);
        self.play_clip(to)?;
        Ok(Some(to))
    }

    /// Nudge the loop of the playing clip; see [`ClipRef::syncopate`].
    /// `None` when nothing is playing.
    pub fn syncopate(&self) -> Result<Option<f32>> {
        match self.playing_clip() {
            Some(clip) => clip.syncopate().map(Some),
            None => {
                warn!("track {}: asked to syncopate but nothing is playing", self.index);
                Ok(None)
            }
        }
    }

    /// Create an empty MIDI clip of `length` beats in an empty slot.
    pub fn create_clip(&self, slot: usize, length: f32) -> Result<ClipRef<'a>> {
        let (is_group, occupied) = self.with(|t| (t.is_group(), t.has_clip(slot)))?;
        if is_group {
            return Err(LiveError::InvalidOperation(format!(
                "track {} is a group; create clips on its members",
                self.index
            )));
        }
        if occupied {
            return Err(LiveError::InvalidOperation(format!(
                "track {} already has a clip in slot {}",
                self.index, slot
            )));
        }

        self.session
            .gateway()
            .send(CLIP_CREATE, osc_args![self.index, slot, length])?;
        let mut graph = self.session.graph_mut();
        if let Some(track) = graph.track_mut(self.index) {
            track.insert_clip(Clip::new(self.index, slot, length));
        }
        info!("created clip ({}, {}) of {} beats", self.index, slot, length);
        Ok(ClipRef::new(self.session, self.index, slot))
    }

    pub fn delete_clip(&self, slot: usize) -> Result<()> {
        if !self.with(|t| t.has_clip(slot))? {
            return Err(LiveError::InvalidOperation(format!(
                "track {} has no clip in slot {}",
                self.index, slot
            )));
        }

        self.session
            .gateway()
            .send(CLIP_DELETE, osc_args![self.index, slot])?;
        if let Some(track) = self.session.graph_mut().track_mut(self.index) {
            track.remove_clip(slot);
        }
        info!("deleted clip ({}, {})", self.index, slot);
        Ok(())
    }

    pub fn volume(&self) -> Result<f32> {
        self.session.get_f32(&property::TRACK_VOLUME, &[self.index])
    }

    pub fn set_volume(&self, value: f32) -> Result<()> {
        self.session
            .set_property(&property::TRACK_VOLUME, &[self.index], osc_args![value])
    }

    pub fn pan(&self) -> Result<f32> {
        self.session.get_f32(&property::TRACK_PAN, &[self.index])
    }

    pub fn set_pan(&self, value: f32) -> Result<()> {
        self.session
            .set_property(&property::TRACK_PAN, &[self.index], osc_args![value])
    }

    pub fn muted(&self) -> Result<bool> {
        self.session.get_bool(&property::TRACK_MUTE, &[self.index])
    }

    pub fn set_muted(&self, on: bool) -> Result<()> {
        self.session
            .set_property(&property::TRACK_MUTE, &[self.index], osc_args![i32::from(on)])
    }

    pub fn armed(&self) -> Result<bool> {
        self.session.get_bool(&property::TRACK_ARM, &[self.index])
    }

    pub fn set_armed(&self, on: bool) -> Result<()> {
        self.session
            .set_property(&property::TRACK_ARM, &[self.index], osc_args![i32::from(on)])
    }

    pub fn solo(&self) -> Result<bool> {
        self.session.get_bool(&property::TRACK_SOLO, &[self.index])
    }

    pub fn set_solo(&self, on: bool) -> Result<()> {
        self.session
            .set_property(&property::TRACK_SOLO, &[self.index], osc_args![i32::from(on)])
    }

    /// Name as Live has it now, which may differ from the scanned one.
    pub fn remote_name(&self) -> Result<Option<String>> {
        let values = self
            .session
            .get_property(&property::TRACK_NAME, &[self.index])?;
        Ok(first_name(&values))
    }

    /// Rename in Live and in the mirror.
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.session
            .set_property(&property::TRACK_NAME, &[self.index], osc_args![name])?;
        if let Some(track) = self.session.graph_mut().track_mut(self.index) {
            track.name = name.to_string();
        }
        Ok(())
    }

    pub fn send(&self, send: usize) -> Result<f32> {
        self.session
            .get_f32(&property::TRACK_SEND, &[self.index, send])
    }

    pub fn set_send(&self, send: usize, value: f32) -> Result<()> {
        self.session
            .set_property(&property::TRACK_SEND, &[self.index, send], osc_args![value])
    }
}

impl std::fmt::Debug for TrackRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackRef").field("index", &self.index).finish()
    }
}

// ----------------------------------------------------------------------
// Groups
// ----------------------------------------------------------------------

/// A group track. Dereferences to its [`TrackRef`].
#[derive(Clone, Copy)]
pub struct GroupRef<'a> {
    track: TrackRef<'a>,
}

impl<'a> GroupRef<'a> {
    pub(crate) fn new(session: &'a Session, track: usize) -> Self {
        Self {
            track: TrackRef::new(session, track),
        }
    }

    pub fn track(&self) -> TrackRef<'a> {
        self.track
    }

    /// Position among groups.
    pub fn group_index(&self) -> Option<usize> {
        self.track.with(Track::group_index).ok().flatten()
    }

    pub fn members(&self) -> Vec<TrackRef<'a>> {
        self.track
            .with(|t| t.members().to_vec())
            .unwrap_or_default()
            .into_iter()
            .map(|m| TrackRef::new(self.track.session, m))
            .collect()
    }

    /// Slots holding a clip on any member.
    pub fn scene_indexes(&self) -> Vec<usize> {
        self.track
            .session
            .graph()
            .group_scene_indexes(self.track.index)
    }

    /// Launch a slot across the whole group.
    pub fn play_clip(&self, clip: usize) -> Result<()> {
        self.track.play_clip(clip)
    }

    pub fn stop(&self) -> Result<()> {
        self.track.stop()
    }

    /// Any member playing.
    pub fn is_playing(&self) -> bool {
        self.members().iter().any(TrackRef::is_playing)
    }
}

impl<'a> std::ops::Deref for GroupRef<'a> {
    type Target = TrackRef<'a>;

    fn deref(&self) -> &Self::Target {
        &self.track
    }
}

impl std::fmt::Debug for GroupRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRef")
            .field("track", &self.track.index)
            .finish()
    }
}

// ----------------------------------------------------------------------
// Clips
// ----------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct ClipRef<'a> {
    session: &'a Session,
    track: usize,
    index: usize,
}

impl<'a> ClipRef<'a> {
    pub(crate) fn new(session: &'a Session, track: usize, index: usize) -> Self {
        Self {
            session,
            track,
            index,
        }
    }

    pub fn track(&self) -> TrackRef<'a> {
        TrackRef::new(self.session, self.track)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn snapshot(&self) -> Option<Clip> {
        self.session.graph().clip(self.track, self.index).cloned()
    }

    fn coords(&self) -> [usize; 2] {
        [self.track, self.index]
    }

    pub fn name(&self) -> Option<String> {
        self.snapshot()?.name
    }

    pub fn length(&self) -> Option<f32> {
        Some(self.snapshot()?.length)
    }

    pub fn is_playing(&self) -> bool {
        self.snapshot().map(|c| c.is_playing()).unwrap_or(false)
    }

    pub fn play(&self) -> Result<()> {
        self.session.play_clip(self.track, self.index)
    }

    pub fn stop(&self) -> Result<()> {
        self.session.stop_clip(self.track, self.index)
    }

    /// (coarse semitones, fine cents).
    pub fn pitch(&self) -> Result<(i32, i32)> {
        let values = self
            .session
            .get_property(&property::CLIP_PITCH, &self.coords())?;
        let field = |i: usize| values.get(i).and_then(OscValue::as_i32);
        match (field(0), field(1)) {
            (Some(coarse), Some(fine)) => Ok((coarse, fine)),
            _ => Err(LiveError::UnexpectedResponse {
                address: "/live/pitch".into(),
                reason: format!("expected (coarse, fine), got {:?}", values),
            }),
        }
    }

    pub fn set_pitch(&self, coarse: i32, fine: i32) -> Result<()> {
        self.session
            .set_property(&property::CLIP_PITCH, &self.coords(), osc_args![coarse, fine])
    }

    pub fn muted(&self) -> Result<bool> {
        self.session.get_bool(&property::CLIP_MUTE, &self.coords())
    }

    pub fn set_muted(&self, on: bool) -> Result<()> {
        self.session
            .set_property(&property::CLIP_MUTE, &self.coords(), osc_args![i32::from(on)])
    }

    /// Loop end as last set through this session.
    pub fn loop_end(&self) -> Option<f32> {
        Some(self.snapshot()?.loop_end)
    }

    pub fn set_loop_end(&self, beats: f32) -> Result<()> {
        self.session
            .set_property(&property::CLIP_LOOP_END, &self.coords(), osc_args![beats])?;
        if let Some(clip) = self
            .session
            .graph_mut()
            .track_mut(self.track)
            .and_then(|t| t.clip_mut(self.index))
        {
            clip.loop_end = beats;
        }
        Ok(())
    }

    fn require(&self) -> Result<Clip> {
        self.snapshot()
            .ok_or_else(|| missing(format!("clip ({}, {})", self.track, self.index)))
    }

    /// Lengthen or shorten the loop by one beat, staying within `1..=length`.
    /// Returns the new loop end.
    pub fn syncopate(&self) -> Result<f32> {
        let clip = self.require()?;
        let Some(end) = nudge_loop_end(&clip, &mut rand::thread_rng()) else {
            return Err(LiveError::InvalidOperation(format!(
                "clip ({}, {}) is too short to syncopate",
                self.track, self.index
            )));
        };
        debug!(
            "clip ({}, {}): loop end {} -> {} (length {})",
            self.track, self.index, clip.loop_end, end, clip.length
        );
        self.set_loop_end(end)?;
        Ok(end)
    }

    /// Loop the whole clip again. Returns false if it already did.
    pub fn reset_loop(&self) -> Result<bool> {
        let clip = self.require()?;
        if clip.loop_end == clip.length {
            return Ok(false);
        }
        debug!("clip ({}, {}): loop end back to {}", self.track, self.index, clip.length);
        self.set_loop_end(clip.length)?;
        Ok(true)
    }

    pub fn remote_name(&self) -> Result<Option<String>> {
        let values = self
            .session
            .get_property(&property::CLIP_NAME, &self.coords())?;
        Ok(first_name(&values))
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.session
            .set_property(&property::CLIP_NAME, &self.coords(), osc_args![name])?;
        if let Some(clip) = self
            .session
            .graph_mut()
            .track_mut(self.track)
            .and_then(|t| t.clip_mut(self.index))
        {
            clip.name = Some(name.to_string());
        }
        Ok(())
    }

    pub fn add_note(&self, note: Note) -> Result<()> {
        self.session.gateway().send(
            CLIP_ADD_NOTE,
            osc_args![
                self.track,
                self.index,
                note.pitch,
                note.position,
                note.duration,
                note.velocity,
                i32::from(note.muted)
            ],
        )?;
        Ok(())
    }

    /// Notes in the clip. Replies are `[track, clip, (pitch, pos, dur, vel, mute)*]`.
    pub fn notes(&self) -> Result<Vec<Note>> {
        let reply = self.session.gateway().request_with(
            CLIP_NOTES,
            osc_args![self.track, self.index],
            CLIP_NOTE,
            self.session.gateway().default_timeout(),
        )?;
        Ok(reply
            .get(2..)
            .unwrap_or_default()
            .chunks_exact(5)
            .filter_map(Note::from_fields)
            .collect())
    }

    /// Next clip in launcher order; see [`Track::neighbour_clip`].
    pub fn next_clip(&self, wrap: bool, allow_gaps: bool) -> Option<ClipRef<'a>> {
        self.neighbour(1, wrap, allow_gaps)
    }

    pub fn prev_clip(&self, wrap: bool, allow_gaps: bool) -> Option<ClipRef<'a>> {
        self.neighbour(-1, wrap, allow_gaps)
    }

    fn neighbour(&self, step: isize, wrap: bool, allow_gaps: bool) -> Option<ClipRef<'a>> {
        let graph = self.session.graph();
        let clip = graph
            .track(self.track)?
            .neighbour_clip(self.index, step, wrap, allow_gaps)?;
        Some(ClipRef::new(self.session, self.track, clip.index))
    }
}

impl std::fmt::Debug for ClipRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipRef")
            .field("track", &self.track)
            .field("index", &self.index)
            .finish()
    }
}

// ----------------------------------------------------------------------
// Devices and parameters
// ----------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct DeviceRef<'a> {
    session: &'a Session,
    track: usize,
    index: usize,
}

impl<'a> DeviceRef<'a> {
    pub(crate) fn new(session: &'a Session, track: usize, index: usize) -> Self {
        Self {
            session,
            track,
            index,
        }
    }

    pub fn snapshot(&self) -> Option<Device> {
        self.session
            .graph()
            .track(self.track)?
            .devices
            .get(self.index)
            .cloned()
    }

    pub fn name(&self) -> Option<String> {
        Some(self.snapshot()?.name)
    }

    pub fn parameters(&self) -> Vec<ParameterRef<'a>> {
        let count = self.snapshot().map(|d| d.parameters.len()).unwrap_or(0);
        (0..count).map(|p| self.parameter_at(p)).collect()
    }

    pub fn parameter(&self, index: usize) -> Option<ParameterRef<'a>> {
        let count = self.snapshot()?.parameters.len();
        (index < count).then(|| self.parameter_at(index))
    }

    pub fn parameter_named(&self, name: &str) -> Option<ParameterRef<'a>> {
        let position = self
            .snapshot()?
            .parameters
            .iter()
            .position(|p| p.name == name)?;
        Some(self.parameter_at(position))
    }

    pub fn get_parameter(&self, index: usize) -> Result<f32> {
        self.require_parameter(index)?.value()
    }

    pub fn set_parameter(&self, index: usize, value: f32) -> Result<()> {
        self.require_parameter(index)?.set_value(value)
    }

    fn require_parameter(&self, index: usize) -> Result<ParameterRef<'a>> {
        self.parameter(index).ok_or_else(|| {
            missing(format!(
                "parameter {} of device {} on track {}",
                index, self.index, self.track
            ))
        })
    }

    fn parameter_at(&self, position: usize) -> ParameterRef<'a> {
        ParameterRef {
            session: self.session,
            track: self.track,
            device: self.index,
            position,
        }
    }
}

impl std::fmt::Debug for DeviceRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRef")
            .field("track", &self.track)
            .field("index", &self.index)
            .finish()
    }
}

/// A device parameter, by position in its device's parameter list.
#[derive(Clone, Copy)]
pub struct ParameterRef<'a> {
    session: &'a Session,
    track: usize,
    device: usize,
    position: usize,
}

impl<'a> ParameterRef<'a> {
    pub fn snapshot(&self) -> Option<Parameter> {
        self.session
            .graph()
            .track(self.track)?
            .devices
            .get(self.device)?
            .parameters
            .get(self.position)
            .cloned()
    }

    fn require(&self) -> Result<Parameter> {
        self.snapshot().ok_or_else(|| {
            missing(format!(
                "parameter {} of device {} on track {}",
                self.position, self.device, self.track
            ))
        })
    }

    fn coords(&self, parameter: &Parameter) -> [usize; 3] {
        [self.track, self.device, parameter.index]
    }

    fn remember(&self, value: f32) {
        let mut graph = self.session.graph_mut();
        let parameter = graph
            .track_mut(self.track)
            .and_then(|t| t.devices.get_mut(self.device))
            .and_then(|d| d.parameters.get_mut(self.position));
        if let Some(parameter) = parameter {
            parameter.value = value;
        }
    }

    pub fn name(&self) -> Option<String> {
        Some(self.snapshot()?.name)
    }

    /// Value from the last scan or write, without asking Live.
    pub fn cached_value(&self) -> Option<f32> {
        Some(self.snapshot()?.value)
    }

    /// Value as Live reports it now.
    pub fn value(&self) -> Result<f32> {
        let parameter = self.require()?;
        let value = self
            .session
            .get_f32(&property::PARAMETER_VALUE, &self.coords(&parameter))?;
        self.remember(value);
        Ok(value)
    }

    pub fn set_value(&self, value: f32) -> Result<()> {
        let parameter = self.require()?;
        self.session.set_property(
            &property::PARAMETER_VALUE,
            &self.coords(&parameter),
            osc_args![value],
        )?;
        self.remember(value);
        Ok(())
    }

    /// Set a random value within range; whole numbers for quantized ones.
    pub fn randomise(&self) -> Result<f32> {
        let parameter = self.require()?;
        let value = random_within(&parameter, &mut rand::thread_rng());
        debug!("randomise {} -> {}", parameter.name, value);
        self.set_value(value)?;
        Ok(value)
    }
}

/// One beat shorter at full length, one longer at a single beat, otherwise
/// either way. `None` for clips under two beats.
fn nudge_loop_end(clip: &Clip, rng: &mut impl Rng) -> Option<f32> {
    if clip.length < 2.0 {
        return None;
    }
    let end = if clip.loop_end >= clip.length {
        clip.length - 1.0
    } else if clip.loop_end <= 1.0 {
        clip.loop_end + 1.0
    } else if rng.gen_bool(0.5) {
        clip.loop_end - 1.0
    } else {
        clip.loop_end + 1.0
    };
    Some(end)
}

fn random_within(parameter: &Parameter, rng: &mut impl Rng) -> f32 {
    let (lo, hi) = (parameter.min, parameter.max);
    if parameter.is_quantized {
        let (lo, hi) = (lo.round() as i32, hi.round() as i32);
        if lo >= hi {
            return lo as f32;
        }
        rng.gen_range(lo..=hi) as f32
    } else if lo >= hi {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

impl std::fmt::Debug for ParameterRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterRef")
            .field("track", &self.track)
            .field("device", &self.device)
            .field("position", &self.position)
            .finish()
    }
}

// ----------------------------------------------------------------------
// Scenes
// ----------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct SceneRef<'a> {
    session: &'a Session,
    index: usize,
}

impl<'a> SceneRef<'a> {
    pub(crate) fn new(session: &'a Session, index: usize) -> Self {
        Self { session, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Name from the last scan.
    pub fn name(&self) -> Option<String> {
        self.session.graph().scenes.get(self.index)?.name.clone()
    }

    pub fn play(&self) -> Result<()> {
        self.session.play_scene(self.index)
    }

    pub fn remote_name(&self) -> Result<Option<String>> {
        let values = self
            .session
            .get_property(&property::SCENE_NAME, &[self.index])?;
        Ok(first_name(&values))
    }

    pub fn set_name(&self, name: &str) -> Result<()> {
        self.session
            .set_property(&property::SCENE_NAME, &[self.index], osc_args![name])?;
        if let Some(scene) = self.session.graph_mut().scenes.get_mut(self.index) {
            scene.name = Some(name.to_string());
        }
        Ok(())
    }
}

impl std::fmt::Debug for SceneRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneRef").field("index", &self.index).finish()
    }
}
