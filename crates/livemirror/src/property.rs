//! Remote-backed properties as data.
//!
//! Each row says where a value is read and written and how many echoed
//! coordinates lead the reply. [`PropertyCache::get`] and
//! [`PropertyCache::set`] are the only code that talks to Live for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use liveosc::{Gateway, OscValue};
use tracing::trace;

use crate::error::{LiveError, Result};

/// Which kind of entity a property hangs off, which fixes its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// No coordinates.
    Song,
    /// (track)
    Track,
    /// (track, send)
    Send,
    /// (return track)
    Return,
    /// (track, clip)
    Clip,
    /// (track, device, parameter)
    Parameter,
    /// (scene)
    Scene,
}

impl Scope {
    pub fn arity(self) -> usize {
        match self {
            Scope::Song => 0,
            Scope::Track | Scope::Return | Scope::Scene => 1,
            Scope::Send | Scope::Clip => 2,
            Scope::Parameter => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub scope: Scope,
    pub name: &'static str,
    /// Read address; `None` for write-only properties.
    pub get: Option<&'static str>,
    /// Where the reply arrives, when it isn't `get`.
    pub response: Option<&'static str>,
    /// Leading reply values to skip (echoed coordinates).
    pub offset: usize,
    /// Write address; `None` for read-only properties.
    pub set: Option<&'static str>,
}

const fn rw(scope: Scope, name: &'static str, address: &'static str, offset: usize) -> Property {
    Property {
        scope,
        name,
        get: Some(address),
        response: None,
        offset,
        set: Some(address),
    }
}

pub const TEMPO: Property = rw(Scope::Song, "tempo", "/live/tempo", 0);
pub const QUANTIZATION: Property = rw(Scope::Song, "quantization", "/live/quantization", 0);
pub const TIME: Property = rw(Scope::Song, "time", "/live/time", 0);
pub const OVERDUB: Property = Property {
    scope: Scope::Song,
    name: "overdub",
    get: Some("/live/state"),
    response: None,
    offset: 1,
    set: Some("/live/overdub"),
};
/// (tempo, overdub) in one reply.
pub const STATE: Property = Property {
    scope: Scope::Song,
    name: "state",
    get: Some("/live/state"),
    response: None,
    offset: 0,
    set: None,
};
pub const CURRENT_SCENE: Property = rw(Scope::Song, "current_scene", "/live/scene", 0);
pub const MASTER_VOLUME: Property = rw(Scope::Song, "master_volume", "/live/master/volume", 0);
pub const MASTER_PAN: Property = rw(Scope::Song, "master_pan", "/live/master/pan", 0);

pub const TRACK_VOLUME: Property = rw(Scope::Track, "volume", "/live/volume", 1);
pub const TRACK_PAN: Property = rw(Scope::Track, "pan", "/live/pan", 1);
pub const TRACK_MUTE: Property = rw(Scope::Track, "mute", "/live/mute", 1);
pub const TRACK_ARM: Property = rw(Scope::Track, "arm", "/live/arm", 1);
pub const TRACK_SOLO: Property = rw(Scope::Track, "solo", "/live/solo", 1);
pub const TRACK_NAME: Property = rw(Scope::Track, "name", "/live/name/track", 1);
pub const TRACK_SEND: Property = rw(Scope::Send, "send", "/live/send", 2);

pub const RETURN_VOLUME: Property = rw(Scope::Return, "volume", "/live/return/volume", 1);

pub const CLIP_NAME: Property = rw(Scope::Clip, "name", "/live/name/clip", 2);
pub const CLIP_MUTE: Property = rw(Scope::Clip, "mute", "/live/clip/mute", 2);
/// The pitch reply carries no coordinates, just (coarse, fine).
pub const CLIP_PITCH: Property = rw(Scope::Clip, "pitch", "/live/pitch", 0);
pub const CLIP_LOOP_END: Property = Property {
    scope: Scope::Clip,
    name: "loop_end",
    get: None,
    response: None,
    offset: 0,
    set: Some("/live/clip/loopend"),
};

pub const PARAMETER_VALUE: Property = Property {
    scope: Scope::Parameter,
    name: "value",
    get: Some("/live/device"),
    response: Some("/live/device/param"),
    offset: 3,
    set: Some("/live/device"),
};

pub const SCENE_NAME: Property = rw(Scope::Scene, "name", "/live/name/scene", 1);

/// Every known property.
pub const PROPERTIES: &[Property] = &[
    TEMPO,
    QUANTIZATION,
    TIME,
    OVERDUB,
    STATE,
    CURRENT_SCENE,
    MASTER_VOLUME,
    MASTER_PAN,
    TRACK_VOLUME,
    TRACK_PAN,
    TRACK_MUTE,
    TRACK_ARM,
    TRACK_SOLO,
    TRACK_NAME,
    TRACK_SEND,
    RETURN_VOLUME,
    CLIP_NAME,
    CLIP_MUTE,
    CLIP_PITCH,
    CLIP_LOOP_END,
    PARAMETER_VALUE,
    SCENE_NAME,
];

pub fn lookup(scope: Scope, name: &str) -> Option<&'static Property> {
    PROPERTIES.iter().find(|p| p.scope == scope && p.name == name)
}

type CacheKey = (Scope, &'static str, Vec<usize>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn coordinate_args(prop: &Property, coords: &[usize]) -> Result<Vec<OscValue>> {
    if coords.len() != prop.scope.arity() {
        return Err(LiveError::InvalidOperation(format!(
            "{:?} property {} takes {} coordinates, got {}",
            prop.scope,
            prop.name,
            prop.scope.arity(),
            coords.len()
        )));
    }
    Ok(coords.iter().map(|&c| OscValue::from(c)).collect())
}

/// Generic get/set over the property table, with optional memoization.
#[derive(Debug, Default)]
pub struct PropertyCache {
    enabled: AtomicBool,
    values: Mutex<HashMap<CacheKey, Vec<OscValue>>>,
}

impl PropertyCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            values: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        lock(&self.values).clear();
    }

    /// Read a property, skipping echoed coordinates.
    ///
    /// With caching on, a remembered value answers without a round-trip.
    /// A round-trip always refreshes the remembered value.
    pub fn get(&self, gateway: &Gateway, prop: &Property, coords: &[usize]) -> Result<Vec<OscValue>> {
        let address = prop
            .get
            .ok_or_else(|| LiveError::InvalidOperation(format!("{} is write-only", prop.name)))?;
        let args = coordinate_args(prop, coords)?;
        let key = (prop.scope, prop.name, coords.to_vec());

        if self.is_enabled() {
            if let Some(values) = lock(&self.values).get(&key) {
                trace!("cached {} {:?} = {:?}", prop.name, coords, values);
                return Ok(values.clone());
            }
        }

        let response = prop.response.unwrap_or(address);
        let reply = gateway.request_with(address, args, response, gateway.default_timeout())?;
        if reply.len() <= prop.offset {
            return Err(LiveError::unexpected(
                response,
                format!("expected more than {} values, got {:?}", prop.offset, reply),
            ));
        }

        let values = reply[prop.offset..].to_vec();
        lock(&self.values).insert(key, values.clone());
        Ok(values)
    }

    /// Write a property. Fire-and-forget.
    pub fn set(
        &self,
        gateway: &Gateway,
        prop: &Property,
        coords: &[usize],
        values: Vec<OscValue>,
    ) -> Result<()> {
        let address = prop
            .set
            .ok_or_else(|| LiveError::InvalidOperation(format!("{} is read-only", prop.name)))?;
        let mut args = coordinate_args(prop, coords)?;
        args.extend(values.iter().cloned());
        gateway.send(address, args)?;

        let key = (prop.scope, prop.name, coords.to_vec());
        if self.is_enabled() {
            lock(&self.values).insert(key, values);
        } else {
            lock(&self.values).remove(&key);
        }
        Ok(())
    }

    /// Remember a value pushed by Live without asking for it.
    pub fn observe(&self, prop: &Property, coords: &[usize], values: Vec<OscValue>) {
        lock(&self.values).insert((prop.scope, prop.name, coords.to_vec()), values);
    }
}

pub(crate) fn first_f32(address: &str, values: &[OscValue]) -> Result<f32> {
    values
        .first()
        .and_then(OscValue::as_f32)
        .ok_or_else(|| LiveError::unexpected(address, format!("expected a number, got {:?}", values)))
}

pub(crate) fn first_i32(address: &str, values: &[OscValue]) -> Result<i32> {
    values
        .first()
        .and_then(OscValue::as_i32)
        .ok_or_else(|| LiveError::unexpected(address, format!("expected an integer, got {:?}", values)))
}

pub(crate) fn first_bool(address: &str, values: &[OscValue]) -> Result<bool> {
    values
        .first()
        .and_then(OscValue::as_bool)
        .ok_or_else(|| LiveError::unexpected(address, format!("expected a flag, got {:?}", values)))
}

/// Names come back as strings, or nil for unnamed things.
pub(crate) fn first_name(values: &[OscValue]) -> Option<String> {
    values
        .first()
        .and_then(OscValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
