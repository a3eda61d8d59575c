//! Audio decoding via Symphonia
//!
//! Turns a local audio file into interleaved f32 PCM.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{ FormatOptions, FormatReader, SeekMode, SeekTo };
use symphonia::core::io::{ MediaSourceStream, MediaSourceStreamOptions };
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;


const READ_BUFFER_LEN: usize = 64 * 1024;


/// Errors that can occur during decoding.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "Failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "Unsupported format" )]
    UnsupportedFormat,

    #[error( "No audio tracks found" )]
    NoAudioTrack,

    #[error( "Decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "Decode error: {0}" )]
    Decode( String ),

    #[error( "Seek error: {0}" )]
    Seek( String ),
}


/// Streaming decoder for the first audio track of a file.
pub struct Decoder {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration: Option<Duration>,
    scratch: Option<SampleBuffer<f32>>,
}


impl Decoder {
    /// Probes `path` and prepares a decoder for its first audio track.
    pub fn open( path: &Path ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let stream = MediaSourceStream::new(
            Box::new( file ),
            MediaSourceStreamOptions { buffer_len: READ_BUFFER_LEN },
        );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let probed = symphonia::default::get_probe()
            .format( &hint, stream, &FormatOptions::default(), &MetadataOptions::default() )
            .map_err( |_| DecoderError::UnsupportedFormat )?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let params = &track.codec_params;
        let track_id = track.id;
        let sample_rate = params.sample_rate.unwrap_or( 44100 );
        let channels = params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let duration = params.n_frames
            .map( |frames| Duration::from_secs_f64( frames as f64 / sample_rate as f64 ) );

        let codec = symphonia::default::get_codecs()
            .make( params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        tracing::debug!(
            "Opened {:?}: {} Hz, {} channels, duration {:?}",
            path,
            sample_rate,
            channels,
            duration
        );

        Ok( Self {
            reader,
            codec,
            track_id,
            sample_rate,
            channels,
            duration,
            scratch: None,
        })
    }


    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Total length, when the container declares it.
    pub fn duration( &self ) -> Option<Duration> {
        self.duration
    }


    /// Decodes the next packet into interleaved samples; None at end of stream.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok( packet ) => packet,
                Err( SymphoniaError::IoError( ref e ) ) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok( None );
                }
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.codec.decode( &packet ) {
                Ok( decoded ) => decoded,
                // Corrupt packet: skip it and keep going.
                Err( SymphoniaError::DecodeError( _ ) ) => continue,
                Err( e ) => return Err( DecoderError::Decode( e.to_string() ) ),
            };

            let frames = decoded.frames();
            let spec = *decoded.spec();
            if self.scratch.as_ref().is_some_and( |buf| buf.capacity() < frames ) {
                self.scratch = None;
            }
            let scratch = self.scratch.get_or_insert_with( || SampleBuffer::new( frames as u64, spec ) );
            scratch.copy_interleaved_ref( decoded );

            return Ok( Some( scratch.samples().to_vec() ) );
        }
    }


    /// Repositions the stream at `position`.
    pub fn seek( &mut self, position: Duration ) -> Result<(), DecoderError> {
        let target = SeekTo::Time {
            time: Time::from( position.as_secs_f64() ),
            track_id: Some( self.track_id ),
        };

        self.reader
            .seek( SeekMode::Accurate, target )
            .map_err( |e| DecoderError::Seek( e.to_string() ) )?;
        self.codec.reset();

        Ok(())
    }
}
