//! Playback engine
//!
//! The single owner of session playback state. Commands mutate state and
//! drive the backend directly; everything the backend or the sampler reports
//! arrives over one channel and is applied by [`PlaybackEngine::pump`], so
//! all state changes happen on the caller's thread.

use std::sync::mpsc::{ self, Receiver, Sender };
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backend::{ AudioBackend, BackendError, BackendEvent, EventSink, Signal };
use crate::playlist::{ Playlist, UpNext };
use crate::preferences::{ PlaybackPreferences, PreferenceStore, REPEAT_KEY, SHUFFLE_KEY, VOLUME_KEY };
use crate::sampler::Sampler;
use crate::state::{ PlaybackError, PlaybackSnapshot, PlaybackStatus, RepeatMode };
use crate::track::Track;


/// Tunables for an engine instance.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct EngineConfig {
    /// How often the reported position is refreshed while playing.
    pub sample_interval: Duration,
}


impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs( 1 ),
        }
    }
}


/// Session-wide music playback controller.
pub struct PlaybackEngine<B: AudioBackend> {
    backend: B,
    preferences: Box<dyn PreferenceStore>,
    config: EngineConfig,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    /// Identifies the live resource; events tagged with anything else are stale.
    load_id: u64,
    status: PlaybackStatus,
    /// Whether a resource still loading should start once ready.
    play_on_ready: bool,
    current_track: Option<Track>,
    volume: f32,
    current_time: f64,
    duration: f64,
    playlist: Playlist,
    queue: UpNext,
    shuffle: bool,
    repeat: RepeatMode,
    error: Option<PlaybackError>,
    sampler: Option<Sampler>,
    subscribers: Vec<Sender<PlaybackSnapshot>>,
    rng: StdRng,
}


impl<B: AudioBackend> PlaybackEngine<B> {
    /// Creates an engine, restoring volume, shuffle and repeat from `preferences`.
    pub fn new( backend: B, preferences: Box<dyn PreferenceStore> ) -> Self {
        Self::with_config( backend, preferences, EngineConfig::default() )
    }


    pub fn with_config( mut backend: B, preferences: Box<dyn PreferenceStore>, config: EngineConfig ) -> Self {
        let restored = PlaybackPreferences::load( preferences.as_ref() );
        tracing::debug!(
            "Restored preferences: volume {}, shuffle {}, repeat {}",
            restored.volume,
            restored.shuffle,
            restored.repeat
        );

        backend.set_volume( restored.volume );
        backend.set_master_volume( restored.volume );

        let ( tx, rx ) = mpsc::channel();

        Self {
            backend,
            preferences,
            config,
            tx,
            rx,
            load_id: 0,
            status: PlaybackStatus::Idle,
            play_on_ready: false,
            current_track: None,
            volume: restored.volume,
            current_time: 0.0,
            duration: 0.0,
            playlist: Playlist::new(),
            queue: UpNext::new(),
            shuffle: restored.shuffle,
            repeat: restored.repeat,
            error: None,
            sampler: None,
            subscribers: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }


    /// Replaces the random source used for shuffle picks.
    pub fn with_rng( mut self, rng: StdRng ) -> Self {
        self.rng = rng;
        self
    }


    // Observation


    pub fn snapshot( &self ) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_track: self.current_track.clone(),
            status: self.status,
            volume: self.volume,
            current_time: self.current_time,
            duration: self.duration,
            playlist: self.playlist.tracks().to_vec(),
            current_index: self.playlist.current_index(),
            shuffle_mode: self.shuffle,
            repeat_mode: self.repeat,
            queue: self.queue.to_vec(),
            error: self.error.clone(),
        }
    }


    /// Registers a listener. It immediately receives the current snapshot,
    /// then one after every state change. Dropped receivers are pruned.
    pub fn subscribe( &mut self ) -> Receiver<PlaybackSnapshot> {
        let ( tx, rx ) = mpsc::channel();
        if tx.send( self.snapshot() ).is_ok() {
            self.subscribers.push( tx );
        }
        rx
    }


    pub fn status( &self ) -> PlaybackStatus {
        self.status
    }


    pub fn current_track( &self ) -> Option<&Track> {
        self.current_track.as_ref()
    }


    pub fn is_playing( &self ) -> bool {
        self.status == PlaybackStatus::Playing
    }


    pub fn is_loading( &self ) -> bool {
        self.status == PlaybackStatus::Loading
    }


    pub fn volume( &self ) -> f32 {
        self.volume
    }


    pub fn current_time( &self ) -> f64 {
        self.current_time
    }


    pub fn duration( &self ) -> f64 {
        self.duration
    }


    pub fn playlist( &self ) -> &[Track] {
        self.playlist.tracks()
    }


    pub fn current_index( &self ) -> usize {
        self.playlist.current_index()
    }


    pub fn queue( &self ) -> &UpNext {
        &self.queue
    }


    pub fn shuffle_mode( &self ) -> bool {
        self.shuffle
    }


    pub fn repeat_mode( &self ) -> RepeatMode {
        self.repeat
    }


    pub fn error( &self ) -> Option<&PlaybackError> {
        self.error.as_ref()
    }


    pub fn backend( &self ) -> &B {
        &self.backend
    }


    pub fn preferences( &self ) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }


    // Transport


    /// Plays `track`, or resumes the current one when `None`.
    pub fn play( &mut self, track: Option<Track> ) {
        match track {
            Some( track ) => self.play_track( track ),
            None => self.resume(),
        }
    }


    /// Switches to `track`. Moves the playlist cursor when the track is in
    /// the playlist.
    pub fn play_track( &mut self, track: Track ) {
        let index = self.playlist.position( &track.id );
        self.load( track, index );
    }


    pub fn resume( &mut self ) {
        if self.current_track.is_none() {
            return;
        }

        match self.status {
            PlaybackStatus::Paused => {
                if let Err( e ) = self.backend.play() {
                    tracing::warn!( "Resume failed: {}", e );
                    return;
                }
                self.status = PlaybackStatus::Playing;
                self.start_sampling();
            }
            PlaybackStatus::Loading => {
                if self.play_on_ready {
                    return;
                }
                self.play_on_ready = true;
                if let Err( e ) = self.backend.play() {
                    tracing::warn!( "Resume failed: {}", e );
                }
            }
            PlaybackStatus::Ended => {
                self.restart();
                return;
            }
            PlaybackStatus::Failed => {
                self.retry();
                return;
            }
            PlaybackStatus::Playing | PlaybackStatus::Idle => return,
        }

        self.notify();
    }


    pub fn pause( &mut self ) {
        match self.status {
            PlaybackStatus::Playing => {
                if let Err( e ) = self.backend.pause() {
                    tracing::warn!( "Pause failed: {}", e );
                }
                self.sample_position();
                self.stop_sampling();
                self.status = PlaybackStatus::Paused;
            }
            // Honored once the resource is ready.
            PlaybackStatus::Loading if self.play_on_ready => {
                self.play_on_ready = false;
                if let Err( e ) = self.backend.pause() {
                    tracing::warn!( "Pause failed: {}", e );
                }
            }
            _ => return,
        }

        self.notify();
    }


    /// Pauses when playing (or about to), otherwise resumes.
    pub fn toggle( &mut self ) {
        let playing = match self.status {
            PlaybackStatus::Playing => true,
            PlaybackStatus::Loading => self.play_on_ready,
            _ => false,
        };

        if playing {
            self.pause();
        } else {
            self.resume();
        }
    }


    /// Jumps to `time` seconds within the current resource.
    pub fn seek( &mut self, time: f64 ) {
        if !self.has_resource() {
            return;
        }

        let Ok( position ) = Duration::try_from_secs_f64( time ) else {
            tracing::warn!( "Ignoring seek to {}", time );
            return;
        };

        // A finished resource would otherwise start sounding behind our back.
        if self.status == PlaybackStatus::Ended {
            if let Err( e ) = self.backend.pause() {
                tracing::warn!( "Pause failed: {}", e );
            }
            self.status = PlaybackStatus::Paused;
        }

        if let Err( e ) = self.seek_resource( position ) {
            let track_id = self.current_track_id();
            self.fail( PlaybackError::LoadFailed { track_id, message: format!( "seek to {:.1}s: {}", time, e ) } );
            self.notify();
            return;
        }

        self.current_time = time;
        self.notify();
    }


    /// Sets the volume, clamped to 0.0..=1.0, and persists it.
    pub fn set_volume( &mut self, volume: f32 ) {
        if volume.is_nan() {
            tracing::warn!( "Ignoring NaN volume" );
            return;
        }

        let volume = volume.clamp( 0.0, 1.0 );
        self.volume = volume;
        self.backend.set_volume( volume );
        self.backend.set_master_volume( volume );
        self.persist( VOLUME_KEY, &volume.to_string() );
        self.notify();
    }


    /// Releases the current resource and forgets the current track.
    pub fn stop( &mut self ) {
        if self.status == PlaybackStatus::Idle && self.current_track.is_none() {
            return;
        }

        self.release();
        self.status = PlaybackStatus::Idle;
        self.play_on_ready = false;
        self.current_track = None;
        self.current_time = 0.0;
        self.duration = 0.0;
        self.error = None;
        self.notify();
    }


    /// Reloads the current track after a failure.
    pub fn retry( &mut self ) {
        if self.status != PlaybackStatus::Failed {
            return;
        }
        if let Some( track ) = self.current_track.clone() {
            self.load( track, None );
        }
    }


    // Navigation


    /// Plays the next queued track, else advances the playlist cursor.
    pub fn next( &mut self ) {
        if let Some( track ) = self.queue.pop() {
            tracing::debug!( "Playing queued track {}", track.id );
            self.load( track, None );
            return;
        }

        let Some( index ) = self.playlist.next_index( self.shuffle, &mut self.rng ) else {
            return;
        };
        if let Some( track ) = self.playlist.get( index ).cloned() {
            self.load( track, Some( index ) );
        }
    }


    /// Moves the playlist cursor back. The queue is not consulted.
    pub fn previous( &mut self ) {
        let Some( index ) = self.playlist.previous_index( self.shuffle, &mut self.rng ) else {
            return;
        };
        if let Some( track ) = self.playlist.get( index ).cloned() {
            self.load( track, Some( index ) );
        }
    }


    // Collections


    /// Replaces the playlist and plays the track at `start_index`.
    ///
    /// An empty list, or an index past the end, changes the playlist
    /// without starting playback.
    pub fn set_playlist( &mut self, tracks: Vec<Track>, start_index: usize ) {
        let start = self.playlist.replace( tracks, start_index ).cloned();
        match start {
            Some( track ) if start_index < self.playlist.len() => self.load( track, Some( start_index ) ),
            _ => self.notify(),
        }
    }


    pub fn add_to_playlist( &mut self, track: Track ) {
        self.playlist.add( track );
        self.notify();
    }


    /// Removes every entry with `track_id`. The current track keeps playing.
    pub fn remove_from_playlist( &mut self, track_id: &str ) {
        if self.playlist.remove( track_id ) > 0 {
            self.notify();
        }
    }


    pub fn add_to_queue( &mut self, track: Track ) {
        self.queue.push( track );
        self.notify();
    }


    pub fn clear_queue( &mut self ) {
        if self.queue.is_empty() {
            return;
        }
        self.queue.clear();
        self.notify();
    }


    // Modes


    pub fn toggle_shuffle( &mut self ) {
        self.set_shuffle( !self.shuffle );
    }


    pub fn set_shuffle( &mut self, shuffle: bool ) {
        self.shuffle = shuffle;
        self.persist( SHUFFLE_KEY, if shuffle { "true" } else { "false" } );
        self.notify();
    }


    /// Cycles none, all, one, none.
    pub fn toggle_repeat( &mut self ) {
        self.set_repeat( self.repeat.cycle() );
    }


    pub fn set_repeat( &mut self, repeat: RepeatMode ) {
        self.repeat = repeat;
        self.persist( REPEAT_KEY, repeat.as_str() );
        self.notify();
    }


    // Event handling


    /// Applies everything the backend and sampler reported since the last
    /// call. Returns how many signals were handled.
    pub fn pump( &mut self ) -> usize {
        let mut handled = 0;
        while let Ok( signal ) = self.rx.try_recv() {
            self.handle( signal );
            handled += 1;
        }
        handled
    }


    fn handle( &mut self, signal: Signal ) {
        match signal {
            Signal::Sample => self.on_sample(),
            Signal::Backend { load_id, event } if load_id != self.load_id => {
                tracing::debug!( "Dropping {:?} from superseded load {}", event, load_id );
            }
            Signal::Backend { event, .. } => match event {
                BackendEvent::Ready { duration } => self.on_ready( duration ),
                BackendEvent::Ended => self.on_ended(),
                BackendEvent::Failed { message } => self.on_failed( message ),
            },
        }
    }


    fn on_ready( &mut self, duration: Duration ) {
        self.duration = duration.as_secs_f64();

        if self.status == PlaybackStatus::Loading {
            if self.play_on_ready {
                self.status = PlaybackStatus::Playing;
                self.start_sampling();
            } else {
                self.status = PlaybackStatus::Paused;
            }
            tracing::debug!( "Track ready ({:.1}s), now {}", self.duration, self.status.name() );
        }

        self.notify();
    }


    fn on_ended( &mut self ) {
        if !matches!( self.status, PlaybackStatus::Playing | PlaybackStatus::Loading ) {
            return;
        }

        self.stop_sampling();
        self.status = PlaybackStatus::Ended;
        self.current_time = self.duration;
        self.notify();

        if self.repeat == RepeatMode::One {
            self.restart();
        } else {
            self.next();
        }
    }


    fn on_failed( &mut self, message: String ) {
        if !self.has_resource() {
            return;
        }
        let track_id = self.current_track_id();
        self.fail( PlaybackError::LoadFailed { track_id, message } );
        self.notify();
    }


    fn on_sample( &mut self ) {
        if self.status != PlaybackStatus::Playing || !self.backend.is_playing() {
            return;
        }
        self.sample_position();
        self.notify();
    }


    // Internals


    /// Releases the previous resource and starts loading `track`.
    ///
    /// `index` is the playlist position to move the cursor to, if any.
    fn load( &mut self, track: Track, index: Option<usize> ) {
        self.release();

        if let Some( index ) = index {
            self.playlist.set_current( index );
        }

        tracing::info!( "Loading '{}' ({})", track.title, track.id );

        self.status = PlaybackStatus::Loading;
        self.play_on_ready = true;
        self.current_time = 0.0;
        self.duration = 0.0;
        self.error = None;
        let source = track.audio_url.clone();
        let track_id = track.id.clone();
        self.current_track = Some( track );

        if source.trim().is_empty() {
            self.fail( PlaybackError::NoSource { track_id } );
            self.notify();
            return;
        }

        self.backend.set_volume( self.volume );
        let events = EventSink::new( self.load_id, self.tx.clone() );
        let result = self.backend
            .load( &source, events )
            .and_then( |()| self.backend.play() );

        if let Err( e ) = result {
            let error = match e {
                BackendError::NoSource => PlaybackError::NoSource { track_id },
                other => PlaybackError::LoadFailed { track_id, message: other.to_string() },
            };
            self.fail( error );
        }

        self.notify();
    }


    /// Plays the loaded resource again from the start.
    fn restart( &mut self ) {
        let result = self
            .seek_resource( Duration::ZERO )
            .and_then( |()| self.backend.play() );

        if let Err( e ) = result {
            let track_id = self.current_track_id();
            self.fail( PlaybackError::LoadFailed { track_id, message: e.to_string() } );
            self.notify();
            return;
        }

        self.current_time = 0.0;
        self.status = PlaybackStatus::Playing;
        self.start_sampling();
        self.notify();
    }


    /// Seeks the live resource under a fresh load id, so an end or failure
    /// it reported for the old position is dropped.
    fn seek_resource( &mut self, position: Duration ) -> Result<(), BackendError> {
        self.load_id += 1;
        let events = EventSink::new( self.load_id, self.tx.clone() );
        self.backend.seek( position, events )
    }


    fn fail( &mut self, error: PlaybackError ) {
        tracing::warn!( "{}", error );
        self.release();
        self.status = PlaybackStatus::Failed;
        self.play_on_ready = false;
        self.error = Some( error );
    }


    /// Tears down the live resource and invalidates its event sink.
    fn release( &mut self ) {
        self.stop_sampling();
        self.backend.unload();
        self.load_id += 1;
    }


    fn has_resource( &self ) -> bool {
        matches!(
            self.status,
            PlaybackStatus::Loading | PlaybackStatus::Playing | PlaybackStatus::Paused | PlaybackStatus::Ended
        )
    }


    fn current_track_id( &self ) -> String {
        self.current_track
            .as_ref()
            .map( |t| t.id.clone() )
            .unwrap_or_default()
    }


    fn sample_position( &mut self ) {
        self.current_time = self.backend.position().as_secs_f64();
    }


    fn start_sampling( &mut self ) {
        if self.sampler.is_none() {
            self.sampler = Some( Sampler::start( self.config.sample_interval, self.tx.clone() ) );
        }
    }


    fn stop_sampling( &mut self ) {
        self.sampler = None;
    }


    fn persist( &mut self, key: &str, value: &str ) {
        if let Err( e ) = self.preferences.set( key, value ) {
            tracing::warn!( "Failed to save preference {}: {}", key, e );
        }
    }


    fn notify( &mut self ) {
        if self.subscribers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        self.subscribers.retain( |tx| tx.send( snapshot.clone() ).is_ok() );
    }
}


impl<B: AudioBackend> Drop for PlaybackEngine<B> {
    fn drop( &mut self ) {
        self.stop_sampling();
        self.backend.unload();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::preferences::MemoryPreferences;
    use crate::testing::{ Call, MockBackend };
    use std::time::Instant;


    fn track( id: &str ) -> Track {
        Track::new( id, format!( "Track {}", id ), format!( "/music/{}.mp3", id ) )
    }


    fn tracks( ids: &[ &str ] ) -> Vec<Track> {
        ids.iter().map( |id| track( id ) ).collect()
    }


    fn engine() -> ( PlaybackEngine<MockBackend>, MockBackend ) {
        engine_with( MemoryPreferences::new() )
    }


    fn engine_with( prefs: MemoryPreferences ) -> ( PlaybackEngine<MockBackend>, MockBackend ) {
        let backend = MockBackend::new();
        let engine = PlaybackEngine::new( backend.clone(), Box::new( prefs ) )
            .with_rng( StdRng::seed_from_u64( 11 ) );
        ( engine, backend )
    }


    fn current_id<B: AudioBackend>( engine: &PlaybackEngine<B> ) -> Option<&str> {
        engine.current_track().map( |t| t.id.as_str() )
    }


    /// Reports the live resource as ready and applies it.
    fn make_ready( engine: &mut PlaybackEngine<MockBackend>, backend: &MockBackend, secs: u64 ) {
        backend.ready( Duration::from_secs( secs ) );
        engine.pump();
    }


    #[test]
    fn test_defaults_without_preferences() {
        let ( engine, backend ) = engine();
        assert_eq!( engine.status(), PlaybackStatus::Idle );
        assert_eq!( engine.volume(), 0.8 );
        assert!( !engine.shuffle_mode() );
        assert_eq!( engine.repeat_mode(), RepeatMode::None );
        assert!( backend.calls().contains( &Call::Volume( 0.8 ) ) );
    }


    #[test]
    fn test_preferences_restored_at_start() {
        let prefs = MemoryPreferences::with_entries([
            ( VOLUME_KEY, "0.3" ),
            ( SHUFFLE_KEY, "true" ),
            ( REPEAT_KEY, "all" ),
        ]);
        let ( engine, backend ) = engine_with( prefs );

        assert_eq!( engine.volume(), 0.3 );
        assert!( engine.shuffle_mode() );
        assert_eq!( engine.repeat_mode(), RepeatMode::All );
        assert!( backend.calls().contains( &Call::MasterVolume( 0.3 ) ) );
    }


    #[test]
    fn test_set_playlist_plays_start_and_wraps() {
        let ( mut engine, backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 0 );

        assert_eq!( current_id( &engine ), Some( "1" ) );
        assert!( engine.is_loading() );

        make_ready( &mut engine, &backend, 180 );
        assert!( engine.is_playing() );
        assert_eq!( engine.duration(), 180.0 );

        engine.next();
        assert_eq!( current_id( &engine ), Some( "2" ) );
        engine.next();
        assert_eq!( current_id( &engine ), Some( "3" ) );
        engine.next();
        assert_eq!( current_id( &engine ), Some( "1" ) );
        assert_eq!( engine.current_index(), 0 );
    }


    #[test]
    fn test_previous_wraps_to_last() {
        let ( mut engine, _backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 0 );
        engine.previous();
        assert_eq!( current_id( &engine ), Some( "3" ) );
        assert_eq!( engine.current_index(), 2 );
    }


    #[test]
    fn test_next_cycles_back_and_previous_undoes_next() {
        let ( mut engine, _backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3", "4", "5" ] ), 2 );

        for _ in 0..5 {
            engine.next();
        }
        assert_eq!( engine.current_index(), 2 );

        engine.previous();
        engine.next();
        assert_eq!( engine.current_index(), 2 );
        assert_eq!( current_id( &engine ), Some( "3" ) );
    }


    #[test]
    fn test_empty_playlist_does_not_touch_current_track() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "x" ) );
        make_ready( &mut engine, &backend, 60 );

        engine.set_playlist( Vec::new(), 0 );
        assert!( engine.playlist().is_empty() );
        assert_eq!( current_id( &engine ), Some( "x" ) );
        assert!( engine.is_playing() );
    }


    #[test]
    fn test_out_of_range_start_does_not_play() {
        let ( mut engine, backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2" ] ), 5 );

        assert_eq!( engine.current_index(), 0 );
        assert!( engine.current_track().is_none() );
        assert!( !backend.calls().iter().any( |c| matches!( c, Call::Load( _ ) ) ) );
    }


    #[test]
    fn test_play_moves_cursor_only_for_playlist_tracks() {
        let ( mut engine, _backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 0 );

        engine.play( Some( track( "3" ) ) );
        assert_eq!( engine.current_index(), 2 );

        engine.play( Some( track( "elsewhere" ) ) );
        assert_eq!( engine.current_index(), 2 );
        assert_eq!( current_id( &engine ), Some( "elsewhere" ) );
    }


    #[test]
    fn test_previous_resource_released_before_next_load() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        engine.play_track( track( "b" ) );
        engine.play_track( track( "c" ) );

        assert_eq!( backend.max_live(), 1 );
        let calls = backend.calls();
        let second_load = calls.iter().position( |c| *c == Call::Load( "/music/b.mp3".into() ) ).unwrap();
        assert_eq!( calls[ ..second_load ].iter().filter( |c| **c == Call::Unload ).count(), 2 );
    }


    #[test]
    fn test_queue_takes_priority_and_keeps_cursor() {
        let ( mut engine, _backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 1 );
        engine.add_to_queue( track( "a" ) );
        engine.add_to_queue( track( "b" ) );

        engine.next();
        assert_eq!( current_id( &engine ), Some( "a" ) );
        assert_eq!( engine.queue().to_vec(), vec![ track( "b" ) ] );
        assert_eq!( engine.current_index(), 1 );

        engine.next();
        assert_eq!( current_id( &engine ), Some( "b" ) );
        engine.next();
        assert_eq!( current_id( &engine ), Some( "3" ) );
    }


    #[test]
    fn test_previous_ignores_queue() {
        let ( mut engine, _backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2" ] ), 1 );
        engine.add_to_queue( track( "a" ) );

        engine.previous();
        assert_eq!( current_id( &engine ), Some( "1" ) );
        assert_eq!( engine.queue().len(), 1 );
    }


    #[test]
    fn test_clear_queue() {
        let ( mut engine, _backend ) = engine();
        engine.add_to_queue( track( "a" ) );
        engine.clear_queue();
        assert!( engine.queue().is_empty() );
    }


    #[test]
    fn test_navigation_on_empty_playlist_is_noop() {
        let ( mut engine, backend ) = engine();
        engine.next();
        engine.previous();
        assert!( engine.current_track().is_none() );
        assert_eq!( engine.status(), PlaybackStatus::Idle );
        assert!( !backend.calls().iter().any( |c| matches!( c, Call::Load( _ ) ) ) );
    }


    #[test]
    fn test_shuffle_next_never_repeats_current() {
        let ( mut engine, _backend ) = engine();
        engine.set_shuffle( true );
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 0 );

        for _ in 0..100 {
            let before = engine.current_index();
            engine.next();
            assert_ne!( engine.current_index(), before );
        }
    }


    #[test]
    fn test_shuffle_single_track_replays_it() {
        let ( mut engine, _backend ) = engine();
        engine.set_shuffle( true );
        engine.set_playlist( tracks( &[ "only" ] ), 0 );
        engine.next();
        assert_eq!( current_id( &engine ), Some( "only" ) );
    }


    #[test]
    fn test_repeat_one_restarts_same_track() {
        let ( mut engine, backend ) = engine();
        engine.set_repeat( RepeatMode::One );
        engine.set_playlist( tracks( &[ "1", "2" ] ), 0 );
        make_ready( &mut engine, &backend, 30 );
        backend.clear_calls();

        backend.end();
        engine.pump();

        assert_eq!( current_id( &engine ), Some( "1" ) );
        assert_eq!( engine.current_time(), 0.0 );
        assert!( engine.is_playing() );
        assert_eq!( backend.calls(), vec![ Call::Seek( Duration::ZERO ), Call::Play ] );
    }


    #[test]
    fn test_end_advances_without_repeat_one() {
        for mode in [ RepeatMode::None, RepeatMode::All ] {
            let ( mut engine, backend ) = engine();
            engine.set_repeat( mode );
            engine.set_playlist( tracks( &[ "1", "2" ] ), 1 );
            make_ready( &mut engine, &backend, 30 );

            backend.end();
            engine.pump();
            assert_eq!( current_id( &engine ), Some( "1" ) );
            assert!( engine.is_loading() );
        }
    }


    #[test]
    fn test_end_with_nothing_to_play_stays_ended() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "solo" ) );
        make_ready( &mut engine, &backend, 30 );

        backend.end();
        engine.pump();
        assert_eq!( engine.status(), PlaybackStatus::Ended );
        assert_eq!( engine.current_time(), 30.0 );
    }


    #[test]
    fn test_resume_after_end_restarts_from_zero() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "solo" ) );
        make_ready( &mut engine, &backend, 30 );
        backend.end();
        engine.pump();

        engine.play( None );
        assert!( engine.is_playing() );
        assert_eq!( engine.current_time(), 0.0 );
    }


    #[test]
    fn test_toggle_repeat_cycles_and_persists() {
        let ( mut engine, _backend ) = engine();
        engine.toggle_repeat();
        assert_eq!( engine.repeat_mode(), RepeatMode::All );
        engine.toggle_repeat();
        assert_eq!( engine.repeat_mode(), RepeatMode::One );
        engine.toggle_repeat();
        assert_eq!( engine.repeat_mode(), RepeatMode::None );
        assert_eq!( engine.preferences().get( REPEAT_KEY ).as_deref(), Some( "none" ) );
    }


    #[test]
    fn test_toggle_shuffle_persists() {
        let ( mut engine, _backend ) = engine();
        engine.toggle_shuffle();
        assert!( engine.shuffle_mode() );
        assert_eq!( engine.preferences().get( SHUFFLE_KEY ).as_deref(), Some( "true" ) );
    }


    #[test]
    fn test_volume_clamped_and_persisted() {
        let ( mut engine, backend ) = engine();
        engine.set_volume( 1.5 );
        assert_eq!( engine.volume(), 1.0 );

        engine.set_volume( -0.2 );
        assert_eq!( engine.volume(), 0.0 );
        assert_eq!( engine.preferences().get( VOLUME_KEY ).as_deref(), Some( "0" ) );
        assert_eq!( backend.calls().last(), Some( &Call::MasterVolume( 0.0 ) ) );

        engine.set_volume( f32::NAN );
        assert_eq!( engine.volume(), 0.0 );
    }


    #[test]
    fn test_new_resource_gets_current_volume() {
        let ( mut engine, backend ) = engine();
        engine.set_volume( 0.4 );
        backend.clear_calls();

        engine.play_track( track( "a" ) );
        let calls = backend.calls();
        let volume = calls.iter().position( |c| *c == Call::Volume( 0.4 ) ).unwrap();
        let load = calls.iter().position( |c| matches!( c, Call::Load( _ ) ) ).unwrap();
        assert!( volume < load );
    }


    #[test]
    fn test_stale_ready_is_ignored() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        let stale = backend.sink().unwrap();

        engine.play_track( track( "b" ) );
        stale.ready( Duration::from_secs( 99 ) );
        engine.pump();

        assert!( engine.is_loading() );
        assert_eq!( engine.duration(), 0.0 );

        make_ready( &mut engine, &backend, 20 );
        assert!( engine.is_playing() );
        assert_eq!( current_id( &engine ), Some( "b" ) );
    }


    #[test]
    fn test_pause_before_ready_is_honored() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        engine.pause();
        make_ready( &mut engine, &backend, 20 );

        assert_eq!( engine.status(), PlaybackStatus::Paused );
        engine.toggle();
        assert!( engine.is_playing() );
    }


    #[test]
    fn test_pause_and_resume() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 20 );
        backend.set_position( Duration::from_secs( 7 ) );

        engine.toggle();
        assert_eq!( engine.status(), PlaybackStatus::Paused );
        assert_eq!( engine.current_time(), 7.0 );
        assert!( !backend.is_playing() );

        engine.toggle();
        assert!( engine.is_playing() );
        assert!( backend.is_playing() );
    }


    #[test]
    fn test_controls_without_track_are_noops() {
        let ( mut engine, backend ) = engine();
        backend.clear_calls();

        engine.toggle();
        engine.pause();
        engine.seek( 10.0 );
        engine.retry();

        assert_eq!( engine.status(), PlaybackStatus::Idle );
        assert!( backend.calls().is_empty() );
    }


    #[test]
    fn test_seek_updates_time_and_rejects_negative() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 200 );

        engine.seek( 42.5 );
        assert_eq!( engine.current_time(), 42.5 );
        assert_eq!( backend.calls().last(), Some( &Call::Seek( Duration::from_secs_f64( 42.5 ) ) ) );

        engine.seek( -3.0 );
        assert_eq!( engine.current_time(), 42.5 );
    }


    #[test]
    fn test_failed_seek_enters_failed_and_retries() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 200 );

        backend.fail_next_seek( "seek past end" );
        engine.seek( 9999.0 );

        assert_eq!( engine.status(), PlaybackStatus::Failed );
        assert!( matches!( engine.error(), Some( PlaybackError::LoadFailed { track_id, .. } ) if track_id == "a" ) );
        assert_eq!( backend.live(), 0 );

        backend.clear_calls();
        engine.retry();
        assert!( engine.is_loading() );
        assert_eq!( backend.calls().iter().filter( |c| matches!( c, Call::Load( _ ) ) ).count(), 1 );

        make_ready( &mut engine, &backend, 200 );
        assert!( engine.is_playing() );
        assert_eq!( engine.error(), None );
    }


    #[test]
    fn test_end_reported_before_seek_is_ignored() {
        let ( mut engine, backend ) = engine();
        engine.set_playlist( tracks( &[ "a", "b" ] ), 0 );
        make_ready( &mut engine, &backend, 200 );

        let before = backend.sink().unwrap();
        before.ended();
        engine.seek( 30.0 );
        engine.pump();

        assert!( engine.is_playing() );
        assert_eq!( current_id( &engine ), Some( "a" ) );
        assert_eq!( engine.current_time(), 30.0 );

        backend.end();
        engine.pump();
        assert_eq!( current_id( &engine ), Some( "b" ) );
    }


    #[test]
    fn test_synchronous_load_failure() {
        let ( mut engine, backend ) = engine();
        backend.fail_next_load( "unsupported" );
        engine.play_track( track( "a" ) );

        assert_eq!( engine.status(), PlaybackStatus::Failed );
        assert!( !engine.is_loading() );
        assert!( matches!( engine.error(), Some( PlaybackError::LoadFailed { track_id, .. } ) if track_id == "a" ) );

        engine.retry();
        assert!( engine.is_loading() );
        assert!( engine.error().is_none() );
    }


    #[test]
    fn test_asynchronous_failure_and_resume_retries() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        backend.fail( "404" );
        engine.pump();

        assert_eq!(
            engine.error(),
            Some( &PlaybackError::LoadFailed { track_id: "a".into(), message: "404".into() } )
        );
        assert_eq!( backend.live(), 0 );

        engine.play( None );
        assert!( engine.is_loading() );
    }


    #[test]
    fn test_missing_source_fails_without_loading() {
        let ( mut engine, backend ) = engine();
        engine.play_track( Track::new( "silent", "Silent", "" ) );

        assert_eq!( engine.error(), Some( &PlaybackError::NoSource { track_id: "silent".into() } ) );
        assert!( !backend.calls().iter().any( |c| matches!( c, Call::Load( _ ) ) ) );
    }


    #[test]
    fn test_failed_track_does_not_block_next() {
        let ( mut engine, backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2" ] ), 0 );
        backend.fail( "broken" );
        engine.pump();

        engine.next();
        assert_eq!( current_id( &engine ), Some( "2" ) );
        assert!( engine.is_loading() );
    }


    #[test]
    fn test_remove_current_keeps_playing() {
        let ( mut engine, backend ) = engine();
        engine.set_playlist( tracks( &[ "1", "2", "3" ] ), 1 );
        make_ready( &mut engine, &backend, 20 );

        engine.remove_from_playlist( "2" );
        assert_eq!( engine.playlist().len(), 2 );
        assert_eq!( current_id( &engine ), Some( "2" ) );
        assert!( engine.is_playing() );
    }


    #[test]
    fn test_stop_releases_and_clears() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 20 );

        engine.stop();
        assert_eq!( engine.status(), PlaybackStatus::Idle );
        assert!( engine.current_track().is_none() );
        assert_eq!( backend.live(), 0 );
    }


    #[test]
    fn test_subscribers_receive_snapshots() {
        let ( mut engine, backend ) = engine();
        let rx = engine.subscribe();
        assert_eq!( rx.try_recv().unwrap().status, PlaybackStatus::Idle );

        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 20 );

        let latest = rx.try_iter().last().unwrap();
        assert!( latest.is_playing() );
        assert_eq!( latest.current_track, Some( track( "a" ) ) );

        drop( rx );
        engine.set_volume( 0.5 );
        assert!( engine.subscribers.is_empty() );
    }


    #[test]
    fn test_sampler_refreshes_position() {
        let backend = MockBackend::new();
        let config = EngineConfig { sample_interval: Duration::from_millis( 5 ) };
        let mut engine = PlaybackEngine::with_config( backend.clone(), Box::new( MemoryPreferences::new() ), config );

        engine.play_track( track( "a" ) );
        make_ready( &mut engine, &backend, 20 );
        backend.set_position( Duration::from_secs( 3 ) );

        let deadline = Instant::now() + Duration::from_secs( 2 );
        while engine.current_time() != 3.0 && Instant::now() < deadline {
            engine.pump();
            std::thread::sleep( Duration::from_millis( 5 ) );
        }
        assert_eq!( engine.current_time(), 3.0 );
    }


    #[test]
    fn test_drop_releases_resource() {
        let ( mut engine, backend ) = engine();
        engine.play_track( track( "a" ) );
        assert_eq!( backend.live(), 1 );

        drop( engine );
        assert_eq!( backend.live(), 0 );
    }
}
