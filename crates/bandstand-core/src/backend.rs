//! Audio backend capability interface
//!
//! The engine drives exactly one playable resource through this trait and
//! hears back from it over a channel, so the transport logic never depends
//! on a concrete audio library.

use std::sync::mpsc::Sender;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::DecoderError;
use crate::output::OutputError;


/// Errors reported by a backend command.
#[derive( Debug, Error )]
pub enum BackendError {
    #[error( "No audio source" )]
    NoSource,

    #[error( "Unsupported audio source: {0}" )]
    Unsupported( String ),

    #[error( "Decode error: {0}" )]
    Decode( #[from] DecoderError ),

    #[error( "Audio output error: {0}" )]
    Output( #[from] OutputError ),

    #[error( "No resource loaded" )]
    NotLoaded,
}


/// Something a loaded resource reports asynchronously.
#[derive( Debug, Clone, PartialEq )]
pub enum BackendEvent {
    /// The resource can play; its length is now known.
    Ready { duration: Duration },
    /// Playback reached the natural end of the resource.
    Ended,
    /// The resource could not be fetched or decoded.
    Failed { message: String },
}


/// Message on the engine's inbound channel.
#[derive( Debug )]
pub(crate) enum Signal {
    Backend { load_id: u64, event: BackendEvent },
    Sample,
}


/// Reporting handle for one loaded resource.
///
/// Each load and each seek gets a fresh sink; the engine drops events from
/// superseded sinks.
#[derive( Debug, Clone )]
pub struct EventSink {
    load_id: u64,
    tx: Sender<Signal>,
}


impl EventSink {
    pub(crate) fn new( load_id: u64, tx: Sender<Signal> ) -> Self {
        Self { load_id, tx }
    }


    pub fn load_id( &self ) -> u64 {
        self.load_id
    }


    pub fn ready( &self, duration: Duration ) {
        self.send( BackendEvent::Ready { duration } );
    }


    pub fn ended( &self ) {
        self.send( BackendEvent::Ended );
    }


    pub fn failed( &self, message: impl Into<String> ) {
        self.send( BackendEvent::Failed { message: message.into() } );
    }


    fn send( &self, event: BackendEvent ) {
        // The engine may already be gone; nothing is listening then.
        let _ = self.tx.send( Signal::Backend { load_id: self.load_id, event } );
    }
}


/// Minimal set of capabilities a playback backend provides.
pub trait AudioBackend {
    /// Starts loading `source`. Ready, end and failure are reported via `events`.
    fn load( &mut self, source: &str, events: EventSink ) -> Result<(), BackendError>;

    /// Releases the loaded resource, if any. Must not report further events.
    fn unload( &mut self );

    fn play( &mut self ) -> Result<(), BackendError>;

    fn pause( &mut self ) -> Result<(), BackendError>;

    /// Repositions the loaded resource. Later events go to `events`, so
    /// anything the resource reported before the seek is superseded. On
    /// error the resource is left as it was.
    fn seek( &mut self, position: Duration, events: EventSink ) -> Result<(), BackendError>;

    /// Volume of the loaded resource, 0.0 to 1.0.
    fn set_volume( &mut self, volume: f32 );

    /// Process-wide output gain, 0.0 to 1.0.
    fn set_master_volume( &mut self, volume: f32 );

    fn duration( &self ) -> Option<Duration>;

    fn position( &self ) -> Duration;

    fn is_playing( &self ) -> bool;
}
