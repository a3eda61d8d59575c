//! Bandstand Core - Music playback engine
//!
//! This crate provides the playback engine behind the band-site player:
//! the track catalog, playlist and up-next queue, the transport state
//! machine, persisted preferences, and a symphonia/cpal audio backend.

pub mod backend;
pub mod command;
pub mod decoder;
pub mod device;
pub mod engine;
pub mod output;
pub mod playlist;
pub mod preferences;
mod sampler;
pub mod state;
pub mod track;

#[cfg( test )]
mod testing;

pub use backend::{ AudioBackend, BackendError, BackendEvent, EventSink };
pub use command::{ Command, CommandError };
pub use device::DeviceBackend;
pub use engine::{ EngineConfig, PlaybackEngine };
pub use playlist::{ Playlist, UpNext };
pub use preferences::{ FilePreferences, MemoryPreferences, PlaybackPreferences, PreferenceError, PreferenceStore };
pub use state::{ PlaybackError, PlaybackSnapshot, PlaybackStatus, RepeatMode };
pub use track::{ Catalog, CatalogError, Track };
