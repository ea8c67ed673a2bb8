//! Local mirror of an Ableton Live session, kept in sync over LiveOSC.
//!
//! [`Session`] scans a running Live set into a [`SessionGraph`] of tracks,
//! groups, clips, devices, parameters and scenes, then keeps clip playing
//! state current from Live's notifications. Handles such as [`TrackRef`] and
//! [`ClipRef`] read the mirror locally and talk to Live for anything that
//! changes or plays.
//!
//! ```no_run
//! use livemirror::{ScanOptions, Session};
//!
//! let config = liveconf::LiveConfig::load()?;
//! let session = Session::connect(&config)?;
//! session.load_or_scan("gig", ScanOptions::default())?;
//! if let Some(group) = session.group_named("Drums") {
//!     group.play_clip(0)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod handles;
pub mod model;
pub mod project;
pub mod property;
pub mod scanner;
pub mod session;
pub mod snapshot;

pub use error::{LiveError, Result};
pub use handles::{ClipRef, DeviceRef, GroupRef, Note, ParameterRef, SceneRef, TrackRef};
pub use model::{Clip, ClipState, Device, Parameter, Scene, SessionGraph, Track, TrackKind};
pub use project::{Launcher, ProjectLocator, SystemLauncher};
pub use property::{Property, PropertyCache, Scope};
pub use scanner::ScanOptions;
pub use session::Session;
pub use snapshot::{Snapshot, SnapshotStore};

pub use liveosc::{BeatCallback, Interrupt, OscValue};
