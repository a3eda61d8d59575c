//! Bandstand CLI - Terminal host for the playback engine

mod cli;
mod settings;
mod view;

use std::io::{ self, BufRead, Write };
use std::sync::mpsc::{ self, RecvTimeoutError };
use std::thread;
use std::time::Duration;

use anyhow::{ Context, Result };
use clap::Parser;

use cli::Args;
use settings::Settings;

use bandstand_core::{
    command::help_text,
    preferences::DEFAULT_VOLUME,
    AudioBackend, Catalog, Command, DeviceBackend, EngineConfig, FilePreferences,
    MemoryPreferences, PlaybackEngine, PlaybackStatus, PreferenceStore, Track,
};


/// How long the main loop waits for input before servicing the engine.
const INPUT_POLL: Duration = Duration::from_millis( 100 );


/// Application state.
struct App<B: AudioBackend> {
    engine: PlaybackEngine<B>,
    catalog: Catalog,
    settings: Settings,
    should_quit: bool,

    /// Volume to restore on unmute
    muted_from: Option<f32>,

    /// Track and status last announced
    last_announced: Option<( Option<String>, PlaybackStatus )>,
}


impl<B: AudioBackend> App<B> {
    fn new( engine: PlaybackEngine<B>, catalog: Catalog, settings: Settings ) -> Self {
        Self {
            engine,
            catalog,
            settings,
            should_quit: false,
            muted_from: None,
            last_announced: None,
        }
    }


    /// Starts a playlist from the command line options, if any.
    fn start( &mut self, album: Option<&str>, start: Option<&str> ) -> Option<String> {
        if let Some( name ) = album {
            return Some( self.play_album( Some( name ) ) );
        }

        let id = start?;
        let tracks = self.catalog.tracks().to_vec();
        match tracks.iter().position( |t| t.id == id ) {
            Some( index ) => {
                self.engine.set_playlist( tracks, index );
                None
            }
            None => Some( format!( "Unknown track: {}", id ) ),
        }
    }


    fn lookup( &self, id: &str ) -> Result<Track, String> {
        self.catalog
            .get( id )
            .cloned()
            .ok_or_else( || format!( "Unknown track: {}", id ) )
    }


    fn play_album( &mut self, name: Option<&str> ) -> String {
        let ( tracks, label ) = match name {
            Some( name ) => ( self.catalog.album( name ), name.to_string() ),
            None => ( self.catalog.tracks().to_vec(), "catalog".to_string() ),
        };

        if tracks.is_empty() {
            let known = self.catalog.albums().join( ", " );
            return format!( "No album named '{}'. Albums: {}", label, known );
        }

        let count = tracks.len();
        self.engine.set_playlist( tracks, 0 );
        format!( "Playing {} ({} tracks)", label, count )
    }


    fn step_volume( &mut self, up: bool ) -> String {
        let step = self.settings.volume_step();
        let volume = self.engine.volume();
        self.muted_from = None;
        self.engine.set_volume( if up { volume + step } else { volume - step } );
        self.volume_line()
    }


    fn toggle_mute( &mut self ) -> String {
        let volume = self.engine.volume();
        if volume > 0.0 {
            self.muted_from = Some( volume );
            self.engine.set_volume( 0.0 );
        } else {
            let restore = self.muted_from.take().unwrap_or( DEFAULT_VOLUME );
            self.engine.set_volume( restore );
        }
        self.volume_line()
    }


    fn volume_line( &self ) -> String {
        format!( "Volume: {}%", ( self.engine.volume() * 100.0 ).round() as u32 )
    }


    /// Parses and applies one input line. Returns text to show the user.
    fn execute_line( &mut self, line: &str ) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        // Slash-prefixed commands work as well.
        let line = line.strip_prefix( '/' ).unwrap_or( line );

        match Command::parse( line ) {
            Ok( cmd ) => self.execute( cmd ),
            Err( e ) => Some( format!( "{}. Type 'help' for commands.", e ) ),
        }
    }


    fn execute( &mut self, cmd: Command ) -> Option<String> {
        tracing::debug!( "Executing {:?}", cmd );

        match cmd {
            Command::Play { track_id: Some( id ) } => match self.lookup( &id ) {
                Ok( track ) => self.engine.play_track( track ),
                Err( msg ) => return Some( msg ),
            },
            Command::Play { track_id: None } => {
                if self.engine.current_track().is_none() {
                    let cursor = self.engine.playlist().get( self.engine.current_index() ).cloned();
                    match cursor {
                        Some( track ) => self.engine.play_track( track ),
                        None => return Some( "Nothing to play. Try 'album'.".to_string() ),
                    }
                } else {
                    self.engine.play( None );
                }
            }
            Command::Pause => self.engine.pause(),
            Command::Toggle => self.engine.toggle(),
            Command::Stop => self.engine.stop(),
            Command::Next => self.engine.next(),
            Command::Prev => self.engine.previous(),
            Command::Seek { position } => self.engine.seek( position.as_secs_f64() ),
            Command::Retry => self.engine.retry(),

            Command::Volume { level: None } => return Some( self.volume_line() ),
            Command::Volume { level: Some( level ) } => {
                self.muted_from = None;
                self.engine.set_volume( level as f32 / 100.0 );
                return Some( self.volume_line() );
            }
            Command::VolumeUp => return Some( self.step_volume( true ) ),
            Command::VolumeDown => return Some( self.step_volume( false ) ),
            Command::Mute => return Some( self.toggle_mute() ),
            Command::Shuffle => {
                self.engine.toggle_shuffle();
                let state = if self.engine.shuffle_mode() { "on" } else { "off" };
                return Some( format!( "Shuffle {}", state ) );
            }
            Command::Repeat { mode } => {
                match mode {
                    Some( mode ) => self.engine.set_repeat( mode ),
                    None => self.engine.toggle_repeat(),
                }
                return Some( format!( "Repeat {}", self.engine.repeat_mode() ) );
            }

            Command::Queue { track_id } => {
                let track = match self.lookup( &track_id ) {
                    Ok( track ) => track,
                    Err( msg ) => return Some( msg ),
                };
                let title = track.title.clone();
                self.engine.add_to_queue( track );
                return Some( format!( "Queued {} ({} up next)", title, self.engine.queue().len() ) );
            }
            Command::ClearQueue => {
                self.engine.clear_queue();
                return Some( "Queue cleared".to_string() );
            }
            Command::Add { track_id } => {
                let track = match self.lookup( &track_id ) {
                    Ok( track ) => track,
                    Err( msg ) => return Some( msg ),
                };
                let title = track.title.clone();
                self.engine.add_to_playlist( track );
                return Some( format!( "Added {}", title ) );
            }
            Command::Remove { track_id } => {
                let before = self.engine.playlist().len();
                self.engine.remove_from_playlist( &track_id );
                let removed = before - self.engine.playlist().len();
                return Some( format!( "Removed {} entr{}", removed, if removed == 1 { "y" } else { "ies" } ) );
            }
            Command::Album { name } => return Some( self.play_album( name.as_deref() ) ),

            Command::List => return Some( view::playlist( &self.engine.snapshot() ) ),
            Command::Status => return Some( view::status( &self.engine.snapshot() ) ),
            Command::Help => return Some( help_text().to_string() ),
            Command::Quit => self.should_quit = true,
        }

        None
    }


    /// Applies engine events. Returns a now-playing line when the track or
    /// status changed since the last one.
    fn tick( &mut self ) -> Option<String> {
        self.engine.pump();

        let snapshot = self.engine.snapshot();
        let key = ( snapshot.current_track.as_ref().map( |t| t.id.clone() ), snapshot.status );
        if self.last_announced.as_ref() == Some( &key ) {
            return None;
        }

        self.last_announced = Some( key );
        Some( view::now_playing( &snapshot ) )
    }
}


/// Forwards stdin lines to a channel until EOF.
fn spawn_input_reader() -> mpsc::Receiver<String> {
    let ( tx, rx ) = mpsc::channel();
    thread::spawn( move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok( line ) => {
                    if tx.send( line ).is_err() {
                        break;
                    }
                }
                Err( e ) => {
                    tracing::warn!( "Failed to read input: {}", e );
                    break;
                }
            }
        }
    });
    rx
}


fn init_tracing( args: &Args, settings: &Settings ) {
    let level = args.log_level().unwrap_or_else( || settings.log_level() );
    let _ = tracing_subscriber::fmt()
        .with_max_level( level )
        .with_writer( io::stderr )
        .try_init();
}


fn open_preferences() -> Box<dyn PreferenceStore> {
    match FilePreferences::open_default() {
        Ok( prefs ) => {
            tracing::debug!( "Preferences at {:?}", prefs.path() );
            Box::new( prefs )
        }
        Err( e ) => {
            tracing::warn!( "Preferences will not be saved: {}", e );
            Box::new( MemoryPreferences::new() )
        }
    }
}


fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!( stdout, "> " )?;
    stdout.flush()
}


fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load();
    init_tracing( &args, &settings );

    let catalog = Catalog::load( &args.catalog )
        .with_context( || format!( "Failed to load catalog {:?}", args.catalog ) )?;

    let config = EngineConfig { sample_interval: settings.sample_interval() };
    let backend = DeviceBackend::new( args.media_root.clone() );
    let engine = PlaybackEngine::with_config( backend, open_preferences(), config );

    let mut app = App::new( engine, catalog, settings );

    println!(
        "bandstand: {} tracks, {} albums. Type 'help' for commands.",
        app.catalog.len(),
        app.catalog.albums().len()
    );
    if let Some( msg ) = app.start( args.album.as_deref(), args.start.as_deref() ) {
        println!( "{}", msg );
    }

    let input = spawn_input_reader();
    prompt()?;

    // Main loop
    loop {
        match input.recv_timeout( INPUT_POLL ) {
            Ok( line ) => {
                if let Some( reply ) = app.execute_line( &line ) {
                    println!( "{}", reply );
                }
                if app.should_quit {
                    break;
                }
                prompt()?;
            }
            Err( RecvTimeoutError::Timeout ) => {}
            Err( RecvTimeoutError::Disconnected ) => break,
        }

        if let Some( line ) = app.tick() {
            println!( "\r{}", line );
            prompt()?;
        }
    }

    app.engine.stop();
    Ok(())
}


#[cfg( test )]
mod tests {
    use super::*;
    use bandstand_core::{ BackendError, EventSink, RepeatMode };


    /// Backend that accepts every command and never produces sound.
    #[derive( Default )]
    struct SilentBackend {
        loaded: Option<EventSink>,
        playing: bool,
    }


    impl AudioBackend for SilentBackend {
        fn load( &mut self, _source: &str, events: EventSink ) -> Result<(), BackendError> {
            events.ready( Duration::from_secs( 90 ) );
            self.loaded = Some( events );
            Ok(())
        }

        fn unload( &mut self ) {
            self.loaded = None;
            self.playing = false;
        }

        fn play( &mut self ) -> Result<(), BackendError> {
            self.playing = self.loaded.is_some();
            Ok(())
        }

        fn pause( &mut self ) -> Result<(), BackendError> {
            self.playing = false;
            Ok(())
        }

        fn seek( &mut self, _position: Duration, events: EventSink ) -> Result<(), BackendError> {
            if self.loaded.is_none() {
                return Err( BackendError::NotLoaded );
            }
            self.loaded = Some( events );
            Ok(())
        }

        fn set_volume( &mut self, _volume: f32 ) {}

        fn set_master_volume( &mut self, _volume: f32 ) {}

        fn duration( &self ) -> Option<Duration> {
            self.loaded.as_ref().map( |_| Duration::from_secs( 90 ) )
        }

        fn position( &self ) -> Duration {
            Duration::ZERO
        }

        fn is_playing( &self ) -> bool {
            self.playing
        }
    }


    const CATALOG: &str = r#"[
        { "id": "t1", "title": "Harbor Lights", "duration": "3:10", "audioUrl": "/audio/t1.mp3", "album": "Night Drive" },
        { "id": "t2", "title": "Overpass", "duration": "4:02", "audioUrl": "/audio/t2.mp3", "album": "Night Drive" },
        { "id": "s1", "title": "Paper Moon", "duration": "2:48", "audioUrl": "/audio/s1.mp3", "isSingle": true }
    ]"#;


    fn app() -> App<SilentBackend> {
        let engine = PlaybackEngine::new( SilentBackend::default(), Box::new( MemoryPreferences::new() ) );
        let catalog = Catalog::from_json( CATALOG ).unwrap();
        App::new( engine, catalog, Settings::default() )
    }


    #[test]
    fn test_album_starts_playlist() {
        let mut app = app();
        let reply = app.execute_line( "album night drive" ).unwrap();
        assert!( reply.contains( "2 tracks" ) );

        app.tick();
        assert!( app.engine.is_playing() );
        assert_eq!( app.engine.current_track().map( |t| t.id.as_str() ), Some( "t1" ) );
    }


    #[test]
    fn test_unknown_album_lists_albums() {
        let mut app = app();
        let reply = app.execute_line( "album B-Sides" ).unwrap();
        assert!( reply.contains( "Night Drive" ) );
        assert!( app.engine.playlist().is_empty() );
    }


    #[test]
    fn test_start_from_track_id() {
        let mut app = app();
        assert!( app.start( None, Some( "t2" ) ).is_none() );
        assert_eq!( app.engine.current_index(), 1 );
        assert!( app.start( None, Some( "nope" ) ).is_some() );
    }


    #[test]
    fn test_tick_announces_changes_once() {
        let mut app = app();
        app.execute_line( "play s1" );

        let first = app.tick().unwrap();
        assert!( first.contains( "Paper Moon" ) );
        assert!( app.tick().is_none() );

        app.execute_line( "pause" );
        assert!( app.tick().unwrap().contains( "paused" ) );
    }


    #[test]
    fn test_play_without_id_uses_cursor() {
        let mut app = app();
        assert!( app.execute_line( "play" ).unwrap().contains( "Nothing to play" ) );

        app.execute_line( "add t2" );
        app.execute_line( "play" );
        assert_eq!( app.engine.current_track().map( |t| t.id.as_str() ), Some( "t2" ) );
    }


    #[test]
    fn test_mute_restores_previous_volume() {
        let mut app = app();
        app.execute_line( "vol 60" );
        assert_eq!( app.execute_line( "mute" ).unwrap(), "Volume: 0%" );
        assert_eq!( app.execute_line( "mute" ).unwrap(), "Volume: 60%" );
    }


    #[test]
    fn test_volume_steps() {
        let mut app = app();
        app.execute_line( "vol 50" );
        assert_eq!( app.execute_line( "+" ).unwrap(), "Volume: 55%" );
        assert_eq!( app.execute_line( "vol -" ).unwrap(), "Volume: 50%" );
    }


    #[test]
    fn test_queue_and_modes() {
        let mut app = app();
        assert!( app.execute_line( "queue s1" ).unwrap().contains( "1 up next" ) );
        assert!( app.execute_line( "queue zzz" ).unwrap().starts_with( "Unknown track" ) );
        assert_eq!( app.execute_line( "repeat one" ).unwrap(), "Repeat one" );
        assert_eq!( app.engine.repeat_mode(), RepeatMode::One );
        assert_eq!( app.execute_line( "/shuffle" ).unwrap(), "Shuffle on" );
    }


    #[test]
    fn test_remove_reports_count() {
        let mut app = app();
        app.execute_line( "add t1" );
        app.execute_line( "add t1" );
        assert_eq!( app.execute_line( "remove t1" ).unwrap(), "Removed 2 entries" );
    }


    #[test]
    fn test_bad_input_and_quit() {
        let mut app = app();
        assert!( app.execute_line( "dance" ).unwrap().contains( "Unknown command" ) );
        assert!( app.execute_line( "   " ).is_none() );

        app.execute_line( "quit" );
        assert!( app.should_quit );
    }
}
