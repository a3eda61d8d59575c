//! Audio output via cpal
//!
//! A bounded sample buffer sits between the decode worker and the device
//! callback. Per-resource volume and the process-wide master gain are both
//! applied at the callback.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Source channels carried into a device frame; any beyond are dropped.
const MAX_CHANNELS: usize = 8;


/// Process-wide output gain (f32 bits). Starts at unity.
static MASTER_VOLUME: AtomicU32 = AtomicU32::new( 0x3F80_0000 );


/// Sets the process-wide output gain applied to every stream.
pub fn set_master_volume( volume: f32 ) {
    MASTER_VOLUME.store( volume.clamp( 0.0, 1.0 ).to_bits(), Ordering::Relaxed );
}


/// Gets the process-wide output gain.
pub fn master_volume() -> f32 {
    f32::from_bits( MASTER_VOLUME.load( Ordering::Relaxed ) )
}


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "No output device available" )]
    NoDevice,

    #[error( "Failed to get default stream config: {0}" )]
    StreamConfig( String ),

    #[error( "Failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "Failed to play stream: {0}" )]
    PlayStream( String ),
}


/// Bounded FIFO of interleaved samples shared by producer and device callback.
///
/// Remixes from the source channel count to the device channel count on
/// the way out.
pub struct SampleBuffer {
    samples: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    volume: AtomicU32,
    source_channels: usize,
    output_channels: usize,
}


impl SampleBuffer {
    /// Creates a paused buffer holding at most `capacity` samples.
    pub fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            samples: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( true ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels: source_channels.max( 1 ) as usize,
            output_channels: output_channels.max( 1 ) as usize,
        }
    }


    /// Appends as many samples as fit. Returns how many were taken.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let Ok( mut buf ) = self.samples.lock() else {
            return 0;
        };
        let room = self.capacity.saturating_sub( buf.len() );
        let taken = samples.len().min( room );
        buf.extend( &samples[ ..taken ] );
        taken
    }


    /// Fills `output` with device frames, padding with silence.
    ///
    /// Returns the number of output samples that carry audio.
    pub fn pop( &self, output: &mut [f32] ) -> usize {
        output.fill( 0.0 );
        if self.paused.load( Ordering::Relaxed ) {
            return 0;
        }

        let Ok( mut buf ) = self.samples.lock() else {
            return 0;
        };

        let src_ch = self.source_channels;
        let out_ch = self.output_channels;
        let frames = ( output.len() / out_ch ).min( buf.len() / src_ch );
        let gain = self.volume() * master_volume();
        let kept = src_ch.min( MAX_CHANNELS );
        let mut frame = [ 0.0_f32; MAX_CHANNELS ];

        for out_frame in output.chunks_exact_mut( out_ch ).take( frames ) {
            for ch in 0..src_ch {
                let sample = buf.pop_front().unwrap_or( 0.0 );
                if ch < kept {
                    frame[ ch ] = sample;
                }
            }

            if src_ch == 2 && out_ch == 1 {
                out_frame[ 0 ] = ( frame[ 0 ] + frame[ 1 ] ) * 0.5 * gain;
            } else {
                // Extra device channels repeat the last source channel.
                for ( ch, sample ) in out_frame.iter_mut().enumerate() {
                    *sample = frame[ ch.min( kept - 1 ) ] * gain;
                }
            }
        }

        frames * out_ch
    }


    pub fn len( &self ) -> usize {
        self.samples.lock().map( |b| b.len() ).unwrap_or( 0 )
    }


    pub fn is_empty( &self ) -> bool {
        self.len() == 0
    }


    pub fn clear( &self ) {
        if let Ok( mut buf ) = self.samples.lock() {
            buf.clear();
        }
    }


    pub fn set_paused( &self, paused: bool ) {
        self.paused.store( paused, Ordering::Relaxed );
    }


    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the resource volume (0.0 = mute, 1.0 = full).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }


    pub fn volume( &self ) -> f32 {
        f32::from_bits( self.volume.load( Ordering::Relaxed ) )
    }
}


/// An open device stream.
/// Note: This struct is NOT Send/Sync due to cpal::Stream.
/// Keep it on the thread where it was created.
pub struct AudioOutput {
    stream: cpal::Stream,
    sample_rate: u32,
}


impl AudioOutput {
    /// Opens the default device for a source of the given format.
    ///
    /// Returns the output and the buffer the decoder should feed. The
    /// buffer starts paused.
    pub fn open(
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( Self, Arc<SampleBuffer> ), OutputError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::debug!( "Using output device: {:?}", device.name() );

        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .collect();

        let rate_ok = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate().0 <= source_sample_rate && c.max_sample_rate().0 >= source_sample_rate
        };

        // Prefer an exact channel match at the source rate, then any config
        // at the source rate, then the device default (resampled upstream).
        let config = match supported.iter()
            .find( |c| c.channels() == source_channels && rate_ok( c ) )
            .or_else( || supported.iter().find( |c| rate_ok( c ) ) )
        {
            Some( range ) => range.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config(),
            None => device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
                .config(),
        };

        tracing::debug!(
            "Output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // Roughly half a second of source audio.
        let capacity = ( source_sample_rate as usize * source_channels.max( 1 ) as usize ) / 2;
        let buffer = Arc::new( SampleBuffer::new( capacity, source_channels, config.channels ) );
        let callback_buffer = Arc::clone( &buffer );

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_buffer.pop( data );
                },
                |err| tracing::error!( "Audio output error: {}", err ),
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok((
            Self {
                stream,
                sample_rate: config.sample_rate.0,
            },
            buffer,
        ))
    }


    /// Starts pulling samples from the buffer.
    pub fn start( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }


    /// Device sample rate actually in use.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SampleBuffer::new( 4, 2, 2 );
        assert_eq!( buffer.push( &[ 0.1; 6 ] ), 4 );
        assert_eq!( buffer.push( &[ 0.1 ] ), 0 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_paused_buffer_outputs_silence() {
        let buffer = SampleBuffer::new( 8, 2, 2 );
        buffer.push( &[ 0.5; 4 ] );

        let mut out = [ 1.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 0 );
        assert_eq!( out, [ 0.0; 4 ] );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_mono_source_fills_stereo_device() {
        let buffer = SampleBuffer::new( 8, 1, 2 );
        buffer.set_paused( false );
        buffer.push( &[ 0.25, 0.5 ] );

        let mut out = [ 0.0; 6 ];
        assert_eq!( buffer.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.25, 0.25, 0.5, 0.5, 0.0, 0.0 ] );
    }


    #[test]
    fn test_stereo_source_mixes_down_with_volume() {
        let buffer = SampleBuffer::new( 8, 2, 1 );
        buffer.set_paused( false );
        buffer.set_volume( 0.5 );
        buffer.push( &[ 0.2, 0.6 ] );

        let mut out = [ 0.0; 1 ];
        buffer.pop( &mut out );
        assert!( ( out[ 0 ] - 0.2 ).abs() < 1e-6 );
    }


    #[test]
    fn test_wide_source_keeps_frame_alignment() {
        let channels = MAX_CHANNELS + 2;
        let buffer = SampleBuffer::new( 64, channels as u16, 2 );
        buffer.set_paused( false );
        let first: Vec<f32> = ( 0..channels ).map( |ch| ch as f32 / 100.0 ).collect();
        buffer.push( &first );
        buffer.push( &vec![ 0.5; channels ] );

        let mut out = [ 0.0; 4 ];
        assert_eq!( buffer.pop( &mut out ), 4 );
        assert_eq!( out, [ 0.0, 0.01, 0.5, 0.5 ] );
        assert!( buffer.is_empty() );
    }
}
