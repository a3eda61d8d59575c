//! Host settings management
//!
//! Handles persistent settings for the terminal host: how often the
//! position refreshes, how far `+`/`-` move the volume, and the log level.

use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Duration;

use serde::{ Deserialize, Serialize };


/// Host settings.
#[derive( Debug, Clone, PartialEq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Position refresh interval while playing, in milliseconds
    pub sample_interval_ms: u64,

    /// Volume change per `+`/`-` step, in percent
    pub volume_step: u32,

    /// Log level for stderr output (error, warn, info, debug, trace)
    pub log_level: String,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 1000,
            volume_step: 5,
            log_level: "warn".to_string(),
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "bandstand" ).join( "settings.json" ) )
    }


    /// Loads settings from disk. A first run writes the defaults out so
    /// there is a file to edit.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some( path ) => Self::load_or_init( &path ),
            None => Self::default(),
        }
    }


    pub fn load_or_init( path: &Path ) -> Self {
        if path.exists() {
            return Self::load_from( path );
        }

        let settings = Self::default();
        settings.save_to( path );
        settings
    }


    pub fn load_from( path: &Path ) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => {
                serde_json::from_str( &contents ).unwrap_or_else( |e| {
                    tracing::warn!( "Invalid settings in {:?}: {}", path, e );
                    Self::default()
                })
            }
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    /// Saves settings to `path`, creating its directory if needed.
    pub fn save_to( &self, path: &Path ) {
        if let Some( parent ) = path.parent() {
            if !parent.exists() {
                if let Err( e ) = fs::create_dir_all( parent ) {
                    tracing::warn!( "Failed to create settings directory: {}", e );
                    return;
                }
            }
        }

        match serde_json::to_string_pretty( self ) {
            Ok( json ) => {
                if let Err( e ) = fs::write( path, json ) {
                    tracing::warn!( "Failed to save settings: {}", e );
                }
            }
            Err( e ) => {
                tracing::warn!( "Failed to serialize settings: {}", e );
            }
        }
    }


    /// Position refresh interval, never shorter than 50ms.
    pub fn sample_interval( &self ) -> Duration {
        Duration::from_millis( self.sample_interval_ms.max( 50 ) )
    }


    /// Volume step as a fraction of full scale.
    pub fn volume_step( &self ) -> f32 {
        self.volume_step.clamp( 1, 100 ) as f32 / 100.0
    }


    /// Parsed log level; falls back to WARN.
    pub fn log_level( &self ) -> tracing::Level {
        self.log_level.parse().unwrap_or( tracing::Level::WARN )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from( &dir.path().join( "settings.json" ) );
        assert_eq!( settings, Settings::default() );
    }


    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "volume_step": 10 }"# ).unwrap();

        let settings = Settings::load_from( &path );
        assert_eq!( settings.volume_step, 10 );
        assert_eq!( settings.sample_interval_ms, 1000 );
        assert_eq!( settings.log_level(), tracing::Level::WARN );
    }


    #[test]
    fn test_invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();
        assert_eq!( Settings::load_from( &path ), Settings::default() );
    }


    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "nested" ).join( "settings.json" );
        let settings = Settings {
            sample_interval_ms: 250,
            volume_step: 20,
            log_level: "debug".into(),
        };

        settings.save_to( &path );
        let loaded = Settings::load_from( &path );
        assert_eq!( loaded, settings );
        assert_eq!( loaded.log_level(), tracing::Level::DEBUG );
        assert_eq!( loaded.sample_interval(), Duration::from_millis( 250 ) );
    }


    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "bandstand" ).join( "settings.json" );

        assert_eq!( Settings::load_or_init( &path ), Settings::default() );
        assert!( path.exists() );

        fs::write( &path, r#"{ "volume_step": 15 }"# ).unwrap();
        assert_eq!( Settings::load_or_init( &path ).volume_step, 15 );
    }


    #[test]
    fn test_accessors_clamp() {
        let settings = Settings {
            sample_interval_ms: 1,
            volume_step: 0,
            log_level: "chatty".into(),
        };
        assert_eq!( settings.sample_interval(), Duration::from_millis( 50 ) );
        assert_eq!( settings.volume_step(), 0.01 );
        assert_eq!( settings.log_level(), tracing::Level::WARN );
    }
}
