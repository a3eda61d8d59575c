//! Scriptable backend for engine tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::backend::{ AudioBackend, BackendError, EventSink };


/// A backend command as the engine issued it.
#[derive( Debug, Clone, PartialEq )]
pub(crate) enum Call {
    Load( String ),
    Unload,
    Play,
    Pause,
    Seek( Duration ),
    Volume( f32 ),
    MasterVolume( f32 ),
}


#[derive( Default )]
struct MockState {
    calls: Vec<Call>,
    sink: Option<EventSink>,
    live: usize,
    max_live: usize,
    playing: bool,
    position: Duration,
    fail_next_load: Option<String>,
    fail_next_seek: Option<String>,
}


/// Records every command and lets the test play the part of the audio
/// library. Clones share state, so a test keeps one handle while the
/// engine owns another.
#[derive( Clone, Default )]
pub(crate) struct MockBackend {
    state: Rc<RefCell<MockState>>,
}


impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }


    pub(crate) fn calls( &self ) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }


    pub(crate) fn clear_calls( &self ) {
        self.state.borrow_mut().calls.clear();
    }


    /// Resources currently loaded.
    pub(crate) fn live( &self ) -> usize {
        self.state.borrow().live
    }


    /// Most resources ever loaded at the same time.
    pub(crate) fn max_live( &self ) -> usize {
        self.state.borrow().max_live
    }


    /// Sink handed over by the most recent load.
    pub(crate) fn sink( &self ) -> Option<EventSink> {
        self.state.borrow().sink.clone()
    }


    pub(crate) fn set_position( &self, position: Duration ) {
        self.state.borrow_mut().position = position;
    }


    pub(crate) fn fail_next_load( &self, message: &str ) {
        self.state.borrow_mut().fail_next_load = Some( message.to_string() );
    }


    /// The next seek loses the resource and errors, as a reopen that
    /// could not find the file again would.
    pub(crate) fn fail_next_seek( &self, message: &str ) {
        self.state.borrow_mut().fail_next_seek = Some( message.to_string() );
    }


    pub(crate) fn ready( &self, duration: Duration ) {
        if let Some( sink ) = self.sink() {
            sink.ready( duration );
        }
    }


    pub(crate) fn end( &self ) {
        if let Some( sink ) = self.sink() {
            sink.ended();
        }
    }


    pub(crate) fn fail( &self, message: &str ) {
        if let Some( sink ) = self.sink() {
            sink.failed( message );
        }
    }
}


impl AudioBackend for MockBackend {
    fn load( &mut self, source: &str, events: EventSink ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.calls.push( Call::Load( source.to_string() ) );

        if let Some( message ) = state.fail_next_load.take() {
            return Err( BackendError::Unsupported( message ) );
        }

        state.live += 1;
        state.max_live = state.max_live.max( state.live );
        state.position = Duration::ZERO;
        state.sink = Some( events );
        Ok(())
    }


    fn unload( &mut self ) {
        let mut state = self.state.borrow_mut();
        state.calls.push( Call::Unload );
        state.live = 0;
        state.playing = false;
        state.sink = None;
    }


    fn play( &mut self ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.calls.push( Call::Play );
        if state.live == 0 {
            return Err( BackendError::NotLoaded );
        }
        state.playing = true;
        Ok(())
    }


    fn pause( &mut self ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.calls.push( Call::Pause );
        state.playing = false;
        Ok(())
    }


    fn seek( &mut self, position: Duration, events: EventSink ) -> Result<(), BackendError> {
        let mut state = self.state.borrow_mut();
        state.calls.push( Call::Seek( position ) );

        if let Some( message ) = state.fail_next_seek.take() {
            state.live = 0;
            state.playing = false;
            state.sink = None;
            return Err( BackendError::Unsupported( message ) );
        }

        state.position = position;
        state.sink = Some( events );
        Ok(())
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.state.borrow_mut().calls.push( Call::Volume( volume ) );
    }


    fn set_master_volume( &mut self, volume: f32 ) {
        self.state.borrow_mut().calls.push( Call::MasterVolume( volume ) );
    }


    fn duration( &self ) -> Option<Duration> {
        None
    }


    fn position( &self ) -> Duration {
        self.state.borrow().position
    }


    fn is_playing( &self ) -> bool {
        self.state.borrow().playing
    }
}
