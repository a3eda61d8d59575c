//! Observable playback state
//!
//! Status, repeat mode, failure kinds and the snapshot handed to subscribers.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::track::Track;


/// Repeat mode for the active playlist.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum RepeatMode {
    #[default]
    None,
    One,
    All,
}


impl RepeatMode {
    /// Next mode in the toggle cycle: none → all → one → none.
    pub fn cycle( self ) -> Self {
        match self {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        }
    }


    /// The stored/displayed name of the mode.
    pub fn as_str( &self ) -> &'static str {
        match self {
            RepeatMode::None => "none",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }
}


impl fmt::Display for RepeatMode {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.as_str() )
    }
}


/// Error for an unrecognised repeat mode name.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
#[error( "Invalid repeat mode: '{0}'. Use 'none', 'one', or 'all'" )]
pub struct ParseRepeatModeError( pub String );


impl FromStr for RepeatMode {
    type Err = ParseRepeatModeError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" | "0" => Ok( RepeatMode::None ),
            "one" | "1" => Ok( RepeatMode::One ),
            "all" | "2" => Ok( RepeatMode::All ),
            _ => Err( ParseRepeatModeError( s.to_string() ) ),
        }
    }
}


/// Transport status of the engine.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum PlaybackStatus {
    /// Nothing loaded.
    #[default]
    Idle,
    /// Resource requested, not yet ready.
    Loading,
    Playing,
    Paused,
    /// The loaded track ran to completion and nothing followed it.
    Ended,
    /// The loaded track could not be played; see `PlaybackSnapshot::error`.
    Failed,
}


impl PlaybackStatus {
    pub fn name( &self ) -> &'static str {
        match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Ended => "ended",
            PlaybackStatus::Failed => "failed",
        }
    }
}


/// Why the current track is not playing.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
pub enum PlaybackError {
    #[error( "Failed to load '{track_id}': {message}" )]
    LoadFailed { track_id: String, message: String },

    #[error( "Track '{track_id}' has no audio source" )]
    NoSource { track_id: String },
}


/// Point-in-time copy of everything a presentation layer shows.
#[derive( Debug, Clone, PartialEq )]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub status: PlaybackStatus,
    pub volume: f32,
    /// Seconds into the loaded resource.
    pub current_time: f64,
    /// Length of the loaded resource in seconds, 0 until ready.
    pub duration: f64,
    pub playlist: Vec<Track>,
    pub current_index: usize,
    pub shuffle_mode: bool,
    pub repeat_mode: RepeatMode,
    pub queue: Vec<Track>,
    pub error: Option<PlaybackError>,
}


impl PlaybackSnapshot {
    pub fn is_playing( &self ) -> bool {
        self.status == PlaybackStatus::Playing
    }


    pub fn is_loading( &self ) -> bool {
        self.status == PlaybackStatus::Loading
    }


    /// Position as a percentage of the duration; 0 while the duration is unknown.
    pub fn progress( &self ) -> f64 {
        crate::command::progress( self.current_time, self.duration )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_repeat_cycle_returns_to_none() {
        let mut mode = RepeatMode::None;
        let mut seen = Vec::new();
        for _ in 0..3 {
            mode = mode.cycle();
            seen.push( mode );
        }
        assert_eq!( seen, vec![ RepeatMode::All, RepeatMode::One, RepeatMode::None ] );
    }


    #[test]
    fn test_repeat_round_trips_stored_names() {
        for mode in [ RepeatMode::None, RepeatMode::One, RepeatMode::All ] {
            assert_eq!( mode.as_str().parse::<RepeatMode>().unwrap(), mode );
        }
        assert_eq!( "OFF".parse::<RepeatMode>().unwrap(), RepeatMode::None );
        assert!( "sometimes".parse::<RepeatMode>().is_err() );
    }


    #[test]
    fn test_progress_is_zero_without_duration() {
        let mut snapshot = PlaybackSnapshot {
            current_track: None,
            status: PlaybackStatus::Idle,
            volume: 0.8,
            current_time: 12.0,
            duration: 0.0,
            playlist: Vec::new(),
            current_index: 0,
            shuffle_mode: false,
            repeat_mode: RepeatMode::None,
            queue: Vec::new(),
            error: None,
        };
        assert_eq!( snapshot.progress(), 0.0 );

        snapshot.duration = 48.0;
        assert_eq!( snapshot.progress(), 25.0 );
    }
}
