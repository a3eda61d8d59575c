//! Durable playback preferences
//!
//! Volume, shuffle and repeat outlive the session. They are stored as
//! `key=value` lines, read once when the engine starts and written back on
//! every change.

use std::collections::BTreeMap;
use std::fs::{ self, File };
use std::io::{ BufRead, BufReader, Write };
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::state::RepeatMode;


pub const VOLUME_KEY: &str = "audio-volume";
pub const SHUFFLE_KEY: &str = "audio-shuffle";
pub const REPEAT_KEY: &str = "audio-repeat";

/// Volume used when nothing (valid) was stored.
pub const DEFAULT_VOLUME: f32 = 0.8;


/// Errors that can occur while persisting preferences.
#[derive( Debug, Error )]
pub enum PreferenceError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "No preferences directory available" )]
    NoDirectory,
}


/// Client-local key/value storage.
pub trait PreferenceStore {
    fn get( &self, key: &str ) -> Option<String>;
    fn set( &mut self, key: &str, value: &str ) -> Result<(), PreferenceError>;
}


/// Store that lives only as long as the process.
#[derive( Debug, Clone, Default )]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}


impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }


    /// Creates a store pre-filled with `entries`.
    pub fn with_entries<'a>( entries: impl IntoIterator<Item = ( &'a str, &'a str )> ) -> Self {
        Self {
            values: entries.into_iter().map( |( k, v )| ( k.to_string(), v.to_string() ) ).collect(),
        }
    }
}


impl PreferenceStore for MemoryPreferences {
    fn get( &self, key: &str ) -> Option<String> {
        self.values.get( key ).cloned()
    }


    fn set( &mut self, key: &str, value: &str ) -> Result<(), PreferenceError> {
        self.values.insert( key.to_string(), value.to_string() );
        Ok(())
    }
}


/// Store backed by a `key=value` file, rewritten on each change.
#[derive( Debug )]
pub struct FilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}


impl FilePreferences {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open( path: impl Into<PathBuf> ) -> Result<Self, PreferenceError> {
        let path = path.into();
        let mut values = BTreeMap::new();

        match File::open( &path ) {
            Ok( file ) => {
                for line in BufReader::new( file ).lines() {
                    let line = line?;
                    if let Some(( key, value )) = line.split_once( '=' ) {
                        values.insert( key.trim().to_string(), value.trim().to_string() );
                    }
                }
            }
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err( e ) => return Err( e.into() ),
        }

        Ok( Self { path, values } )
    }


    /// Opens the store in the platform config directory.
    pub fn open_default() -> Result<Self, PreferenceError> {
        let path = Self::default_path().ok_or( PreferenceError::NoDirectory )?;
        Self::open( path )
    }


    /// `<config dir>/bandstand/preferences`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map( |d| d.join( "bandstand" ).join( "preferences" ) )
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    fn flush( &self ) -> Result<(), PreferenceError> {
        if let Some( parent ) = self.path.parent() {
            fs::create_dir_all( parent )?;
        }
        let mut file = File::create( &self.path )?;
        for ( key, value ) in &self.values {
            writeln!( file, "{}={}", key, value )?;
        }
        Ok(())
    }
}


impl PreferenceStore for FilePreferences {
    fn get( &self, key: &str ) -> Option<String> {
        self.values.get( key ).cloned()
    }


    fn set( &mut self, key: &str, value: &str ) -> Result<(), PreferenceError> {
        self.values.insert( key.to_string(), value.to_string() );
        self.flush()
    }
}


/// The persisted subset of playback state.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct PlaybackPreferences {
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}


impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            shuffle: false,
            repeat: RepeatMode::None,
        }
    }
}


impl PlaybackPreferences {
    /// Reads preferences, falling back to defaults for missing or bad values.
    pub fn load( store: &dyn PreferenceStore ) -> Self {
        let defaults = Self::default();

        let volume = store.get( VOLUME_KEY )
            .and_then( |v| v.parse::<f32>().ok() )
            .filter( |v| v.is_finite() )
            .map( |v| v.clamp( 0.0, 1.0 ) )
            .unwrap_or( defaults.volume );

        let shuffle = match store.get( SHUFFLE_KEY ).as_deref() {
            Some( "true" ) => true,
            Some( "false" ) => false,
            _ => defaults.shuffle,
        };

        let repeat = store.get( REPEAT_KEY )
            .and_then( |v| v.parse().ok() )
            .unwrap_or( defaults.repeat );

        Self { volume, shuffle, repeat }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_defaults_when_empty() {
        let store = MemoryPreferences::new();
        assert_eq!( PlaybackPreferences::load( &store ), PlaybackPreferences::default() );
    }


    #[test]
    fn test_load_stored_values() {
        let store = MemoryPreferences::with_entries([
            ( VOLUME_KEY, "0.35" ),
            ( SHUFFLE_KEY, "true" ),
            ( REPEAT_KEY, "one" ),
        ]);
        let prefs = PlaybackPreferences::load( &store );
        assert_eq!( prefs.volume, 0.35 );
        assert!( prefs.shuffle );
        assert_eq!( prefs.repeat, RepeatMode::One );
    }


    #[test]
    fn test_bad_values_fall_back() {
        let store = MemoryPreferences::with_entries([
            ( VOLUME_KEY, "loud" ),
            ( SHUFFLE_KEY, "yes" ),
            ( REPEAT_KEY, "forever" ),
        ]);
        assert_eq!( PlaybackPreferences::load( &store ), PlaybackPreferences::default() );

        let store = MemoryPreferences::with_entries([ ( VOLUME_KEY, "3.5" ) ]);
        assert_eq!( PlaybackPreferences::load( &store ).volume, 1.0 );
    }


    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "preferences" );

        let mut store = FilePreferences::open( &path ).unwrap();
        assert!( store.get( VOLUME_KEY ).is_none() );
        store.set( VOLUME_KEY, "0.5" ).unwrap();
        store.set( REPEAT_KEY, "all" ).unwrap();

        let contents = fs::read_to_string( &path ).unwrap();
        assert!( contents.contains( "audio-volume=0.5" ) );

        let reopened = FilePreferences::open( &path ).unwrap();
        let prefs = PlaybackPreferences::load( &reopened );
        assert_eq!( prefs.volume, 0.5 );
        assert_eq!( prefs.repeat, RepeatMode::All );
    }
}
