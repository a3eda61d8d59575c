//! Native playback backend
//!
//! Plays local audio files on the default output device: Symphonia decodes
//! on a worker thread, rubato adapts the sample rate when the device will
//! not run at the source rate, and cpal pulls from the shared buffer.

use std::path::{ Path, PathBuf };
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rubato::{ FastFixedOut, PolynomialDegree, Resampler };

use crate::backend::{ AudioBackend, BackendError, EventSink };
use crate::decoder::Decoder;
use crate::output::{ self, AudioOutput, SampleBuffer };


/// Where a track's audio reference points.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum AudioSource {
    File( PathBuf ),
    Remote( String ),
}


impl AudioSource {
    /// Interprets an audio reference.
    ///
    /// Root-relative and relative references are resolved under
    /// `media_root` when one is given.
    pub fn resolve( reference: &str, media_root: Option<&Path> ) -> Result<Self, BackendError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err( BackendError::NoSource );
        }

        let lower = reference.to_ascii_lowercase();
        if lower.starts_with( "http://" ) || lower.starts_with( "https://" ) {
            return Ok( AudioSource::Remote( reference.to_string() ) );
        }

        if let Some( path ) = reference.strip_prefix( "file://" ) {
            return Ok( AudioSource::File( PathBuf::from( path ) ) );
        }

        let path = match media_root {
            Some( root ) => root.join( reference.trim_start_matches( '/' ) ),
            None => PathBuf::from( reference ),
        };
        Ok( AudioSource::File( path ) )
    }
}


/// State shared with one decode worker.
struct Worker {
    stop_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}


impl Worker {
    fn stop( &mut self ) {
        self.stop_flag.store( true, Ordering::Relaxed );
        if let Some( thread ) = self.thread.take() {
            let _ = thread.join();
        }
    }
}


impl Drop for Worker {
    fn drop( &mut self ) {
        self.stop();
    }
}


/// The one loaded resource.
struct Loaded {
    path: PathBuf,
    // Field order matters: the worker is joined before the stream closes.
    worker: Worker,
    buffer: Arc<SampleBuffer>,
    #[allow( dead_code )] // Kept alive for its Drop impl which stops the audio stream
    output: AudioOutput,
    frames_played: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    sample_rate: u32,
    duration: Option<Duration>,
}


/// Backend that plays through the system's default output device.
pub struct DeviceBackend {
    media_root: Option<PathBuf>,
    loaded: Option<Loaded>,
    volume: f32,
}


impl DeviceBackend {
    pub fn new( media_root: Option<PathBuf> ) -> Self {
        Self {
            media_root,
            loaded: None,
            volume: 1.0,
        }
    }


    /// Opens a decoder on `path` positioned at `start`.
    fn open_decoder( path: &Path, start: Duration ) -> Result<Decoder, BackendError> {
        let mut decoder = Decoder::open( path )?;
        if !start.is_zero() {
            decoder.seek( start )?;
        }
        Ok( decoder )
    }


    /// Opens the output for `decoder` and spawns its decode worker.
    fn open(
        &self,
        path: PathBuf,
        decoder: Decoder,
        start: Duration,
        events: EventSink,
    ) -> Result<Loaded, BackendError> {
        let source_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;
        let duration = decoder.duration();

        let ( output, buffer ) = AudioOutput::open( source_rate, channels )?;
        buffer.set_volume( self.volume );
        output.start()?;

        let resampler = if output.sample_rate() != source_rate {
            tracing::info!( "Resampling: {} Hz → {} Hz", source_rate, output.sample_rate() );
            let resampler = FastFixedOut::<f32>::new(
                output.sample_rate() as f64 / source_rate as f64,
                2.0,
                PolynomialDegree::Cubic,
                1024,
                channels as usize,
            ).map_err( |e| BackendError::Unsupported( format!( "resampler: {}", e ) ) )?;
            Some( resampler )
        } else {
            None
        };

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let start_frames = ( start.as_secs_f64() * source_rate as f64 ) as u64;
        let frames_played = Arc::new( AtomicU64::new( start_frames ) );
        let finished = Arc::new( AtomicBool::new( false ) );

        let job = DecodeJob {
            decoder,
            resampler,
            buffer: Arc::clone( &buffer ),
            stop_flag: Arc::clone( &stop_flag ),
            frames_played: Arc::clone( &frames_played ),
            finished: Arc::clone( &finished ),
            events,
            announce_ready: true,
        };
        let thread = thread::spawn( move || job.run() );

        Ok( Loaded {
            path,
            worker: Worker { stop_flag, thread: Some( thread ) },
            buffer,
            output,
            frames_played,
            finished,
            sample_rate: source_rate,
            duration,
        })
    }
}


impl AudioBackend for DeviceBackend {
    fn load( &mut self, source: &str, events: EventSink ) -> Result<(), BackendError> {
        self.unload();

        let path = match AudioSource::resolve( source, self.media_root.as_deref() )? {
            AudioSource::File( path ) => path,
            AudioSource::Remote( url ) => return Err( BackendError::Unsupported( url ) ),
        };

        tracing::info!( "Loading: {:?}", path );
        let decoder = Self::open_decoder( &path, Duration::ZERO )?;
        self.loaded = Some( self.open( path, decoder, Duration::ZERO, events )? );
        Ok(())
    }


    fn unload( &mut self ) {
        if let Some( mut loaded ) = self.loaded.take() {
            loaded.worker.stop();
            loaded.buffer.clear();
            tracing::debug!( "Unloaded {:?}", loaded.path );
        }
    }


    fn play( &mut self ) -> Result<(), BackendError> {
        let loaded = self.loaded.as_ref().ok_or( BackendError::NotLoaded )?;
        loaded.buffer.set_paused( false );
        Ok(())
    }


    fn pause( &mut self ) -> Result<(), BackendError> {
        let loaded = self.loaded.as_ref().ok_or( BackendError::NotLoaded )?;
        loaded.buffer.set_paused( true );
        Ok(())
    }


    /// Reopens the file at `position`, keeping the paused state. The new
    /// stream reports through `events` and announces itself ready again
    /// once it has buffered. A position the decoder rejects leaves the
    /// current stream playing.
    fn seek( &mut self, position: Duration, events: EventSink ) -> Result<(), BackendError> {
        let path = self.loaded.as_ref().ok_or( BackendError::NotLoaded )?.path.clone();

        tracing::info!( "Seeking to {:?} in {:?}", position, path );
        let decoder = Self::open_decoder( &path, position )?;

        let Some( mut current ) = self.loaded.take() else {
            return Err( BackendError::NotLoaded );
        };
        let was_paused = current.buffer.is_paused();
        current.worker.stop();
        current.buffer.clear();
        drop( current );

        let reopened = self.open( path, decoder, position, events )?;
        reopened.buffer.set_paused( was_paused );
        self.loaded = Some( reopened );
        Ok(())
    }


    fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume;
        if let Some( ref loaded ) = self.loaded {
            loaded.buffer.set_volume( volume );
        }
    }


    fn set_master_volume( &mut self, volume: f32 ) {
        output::set_master_volume( volume );
    }


    fn duration( &self ) -> Option<Duration> {
        self.loaded.as_ref().and_then( |l| l.duration )
    }


    fn position( &self ) -> Duration {
        match self.loaded {
            Some( ref loaded ) if loaded.sample_rate > 0 => {
                let frames = loaded.frames_played.load( Ordering::Relaxed );
                Duration::from_secs_f64( frames as f64 / loaded.sample_rate as f64 )
            }
            _ => Duration::ZERO,
        }
    }


    fn is_playing( &self ) -> bool {
        self.loaded.as_ref().is_some_and( |l| {
            !l.buffer.is_paused() && !l.finished.load( Ordering::Relaxed )
        })
    }
}


impl Drop for DeviceBackend {
    fn drop( &mut self ) {
        self.unload();
    }
}


/// Everything the decode worker owns.
struct DecodeJob {
    decoder: Decoder,
    resampler: Option<FastFixedOut<f32>>,
    buffer: Arc<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    events: EventSink,
    announce_ready: bool,
}


impl DecodeJob {
    fn stopped( &self ) -> bool {
        self.stop_flag.load( Ordering::Relaxed )
    }


    fn run( mut self ) {
        let channels = self.decoder.channels();
        // Keep about 50ms decoded ahead of the device.
        let ahead = ( self.decoder.sample_rate() as usize * channels ) / 20;
        let mut pending: Vec<Vec<f32>> = ( 0..channels ).map( |_| Vec::new() ).collect();

        while !self.stopped() {
            let idle = self.buffer.is_paused() && !self.announce_ready;
            if idle || self.buffer.len() > ahead {
                thread::sleep( Duration::from_millis( 5 ) );
                continue;
            }

            match self.decoder.decode_next() {
                Ok( Some( samples ) ) => {
                    self.frames_played.fetch_add( ( samples.len() / channels ) as u64, Ordering::Relaxed );
                    let out = match self.resampler.as_mut() {
                        Some( resampler ) => resample_chunk( resampler, &mut pending, &samples, false ),
                        None => samples,
                    };
                    self.feed( &out );

                    if self.announce_ready {
                        self.announce_ready = false;
                        self.events.ready( self.decoder.duration().unwrap_or_default() );
                    }
                }
                Ok( None ) => {
                    if let Some( resampler ) = self.resampler.as_mut() {
                        let tail = resample_chunk( resampler, &mut pending, &[], true );
                        self.feed( &tail );
                    }
                    if self.announce_ready {
                        self.events.ready( self.decoder.duration().unwrap_or_default() );
                    }

                    while !self.buffer.is_empty() && !self.stopped() {
                        thread::sleep( Duration::from_millis( 10 ) );
                    }
                    if !self.stopped() {
                        tracing::debug!( "Decode worker: end of stream" );
                        self.finished.store( true, Ordering::Relaxed );
                        self.events.ended();
                    }
                    return;
                }
                Err( e ) => {
                    tracing::error!( "Decode error: {}", e );
                    if !self.stopped() {
                        self.events.failed( e.to_string() );
                    }
                    return;
                }
            }
        }
    }


    /// Pushes all of `samples`, waiting for room while not stopped.
    fn feed( &self, samples: &[f32] ) {
        let mut offset = 0;
        while offset < samples.len() && !self.stopped() {
            let pushed = self.buffer.push( &samples[ offset.. ] );
            offset += pushed;
            if pushed == 0 {
                thread::sleep( Duration::from_millis( 5 ) );
            }
        }
    }
}


/// Runs interleaved `input` through the resampler, returning whatever
/// complete output chunks are available. `flush` drains the remainder.
fn resample_chunk(
    resampler: &mut FastFixedOut<f32>,
    pending: &mut [Vec<f32>],
    input: &[f32],
    flush: bool,
) -> Vec<f32> {
    let channels = pending.len();
    for frame in input.chunks( channels ) {
        for ( ch, sample ) in frame.iter().enumerate() {
            pending[ ch ].push( *sample );
        }
    }

    let mut out = Vec::new();
    while pending[ 0 ].len() >= resampler.input_frames_next() {
        let needed = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = pending.iter_mut().map( |ch| ch.drain( ..needed ).collect() ).collect();
        match resampler.process( &chunk, None ) {
            Ok( planar ) => interleave_into( &planar, &mut out ),
            Err( e ) => {
                tracing::error!( "Resample error: {}", e );
                return out;
            }
        }
    }

    if flush && !pending[ 0 ].is_empty() {
        match resampler.process_partial( Some( &*pending ), None ) {
            Ok( planar ) => interleave_into( &planar, &mut out ),
            Err( e ) => tracing::error!( "Final resample error: {}", e ),
        }
        for ch in pending.iter_mut() {
            ch.clear();
        }
    }

    out
}


/// [[L0, L1, ...], [R0, R1, ...]] → [L0, R0, L1, R1, ...]
fn interleave_into( planar: &[Vec<f32>], out: &mut Vec<f32> ) {
    let frames = planar.first().map_or( 0, |ch| ch.len() );
    out.reserve( frames * planar.len() );
    for f in 0..frames {
        for ch in planar {
            out.push( ch[ f ] );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_resolve_root_relative_under_media_root() {
        let source = AudioSource::resolve( "/audio/thunder-road.mp3", Some( Path::new( "/srv/site/public" ) ) ).unwrap();
        assert_eq!( source, AudioSource::File( PathBuf::from( "/srv/site/public/audio/thunder-road.mp3" ) ) );
    }


    #[test]
    fn test_resolve_without_media_root_keeps_path() {
        let source = AudioSource::resolve( "/audio/a.mp3", None ).unwrap();
        assert_eq!( source, AudioSource::File( PathBuf::from( "/audio/a.mp3" ) ) );
    }


    #[test]
    fn test_resolve_file_url_and_remote() {
        assert_eq!(
            AudioSource::resolve( "file:///music/a.flac", Some( Path::new( "/ignored" ) ) ).unwrap(),
            AudioSource::File( PathBuf::from( "/music/a.flac" ) )
        );
        assert!( matches!(
            AudioSource::resolve( "https://cdn.example.com/a.mp3", None ).unwrap(),
            AudioSource::Remote( _ )
        ));
    }


    #[test]
    fn test_resolve_empty_is_no_source() {
        assert!( matches!( AudioSource::resolve( "  ", None ), Err( BackendError::NoSource ) ) );
    }


    #[test]
    fn test_interleave_into() {
        let mut out = Vec::new();
        interleave_into( &[ vec![ 1.0, 2.0 ], vec![ 3.0, 4.0 ] ], &mut out );
        assert_eq!( out, vec![ 1.0, 3.0, 2.0, 4.0 ] );
    }


    #[test]
    fn test_unloaded_backend_rejects_transport() {
        let ( tx, _rx ) = std::sync::mpsc::channel();
        let mut backend = DeviceBackend::new( None );
        assert!( matches!( backend.play(), Err( BackendError::NotLoaded ) ) );
        assert!( matches!(
            backend.seek( Duration::from_secs( 1 ), EventSink::new( 0, tx ) ),
            Err( BackendError::NotLoaded )
        ));
        assert!( !backend.is_playing() );
        assert_eq!( backend.position(), Duration::ZERO );
    }
}
