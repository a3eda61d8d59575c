//! Host command parsing.
//!
//! Commands are typed one per line by the user and parsed here before the
//! host applies them to the playback engine.

use std::time::Duration;

use thiserror::Error;

use crate::state::RepeatMode;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed host command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play { track_id: Option<String> },
    Pause,
    Toggle,
    Stop,
    Next,
    Prev,
    Seek { position: Duration },
    Retry,

    // Mode commands
    Volume { level: Option<u32> },
    VolumeUp,
    VolumeDown,
    Mute,
    Shuffle,
    Repeat { mode: Option<RepeatMode> },

    // Collection commands
    Queue { track_id: String },
    ClearQueue,
    Add { track_id: String },
    Remove { track_id: String },
    Album { name: Option<String> },

    // Other commands
    List,
    Status,
    Help,
    Quit,
}


impl Command {
    /// Parses a command line.
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        let required = |what: &str| {
            args.map( str::to_string )
                .ok_or_else( || CommandError::MissingArgument( what.into() ) )
        };

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => Ok( Command::Play { track_id: args.map( str::to_string ) } ),
            "pause" | "pa" => Ok( Command::Pause ),
            "toggle" | "t" => Ok( Command::Toggle ),
            "stop" | "st" => Ok( Command::Stop ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let position = parse_time( &required( "time position" )? )?;
                Ok( Command::Seek { position } )
            }
            "retry" => Ok( Command::Retry ),

            // Mode commands
            "vol" | "volume" if args == Some( "+" ) => Ok( Command::VolumeUp ),
            "vol" | "volume" if args == Some( "-" ) => Ok( Command::VolumeDown ),
            "+" => Ok( Command::VolumeUp ),
            "-" => Ok( Command::VolumeDown ),
            "vol" | "volume" => {
                let level = args
                    .map( |s| s.parse::<u32>()
                        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid volume: '{}'", s ) ) ) )
                    .transpose()?;
                Ok( Command::Volume { level: level.map( |l| l.min( 100 ) ) } )
            }
            "mute" | "m" => Ok( Command::Mute ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => {
                let mode = args
                    .map( |s| s.parse::<RepeatMode>().map_err( |e| CommandError::InvalidArgument( e.to_string() ) ) )
                    .transpose()?;
                Ok( Command::Repeat { mode } )
            }

            // Collection commands
            "queue" | "qu" => Ok( Command::Queue { track_id: required( "track id" )? } ),
            "clearqueue" | "cq" => Ok( Command::ClearQueue ),
            "add" | "a" => Ok( Command::Add { track_id: required( "track id" )? } ),
            "remove" | "rm" | "del" => Ok( Command::Remove { track_id: required( "track id" )? } ),
            "album" | "al" => Ok( Command::Album { name: args.map( str::to_string ) } ),

            // Other commands
            "list" | "ls" => Ok( Command::List ),
            "status" | "s" => Ok( Command::Status ),
            "help" | "h" | "?" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
pub fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        if seconds >= 60 {
            return Err( CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) );
        }
        let total = minutes.checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( Duration::from_secs( total ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Formats seconds as `m:ss`. Negative or non-finite input shows as 0:00.
pub fn format_time( seconds: f64 ) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 { seconds as u64 } else { 0 };
    format!( "{}:{:02}", total / 60, total % 60 )
}


/// Position as a percentage of `duration`; 0 when the duration is unknown.
pub fn progress( current_time: f64, duration: f64 ) -> f64 {
    if duration > 0.0 {
        ( current_time / duration * 100.0 ).clamp( 0.0, 100.0 )
    } else {
        0.0
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  play [id]        Play a track, or resume
  pause            Pause playback
  toggle           Play/pause
  stop             Stop and unload
  next             Next track (queue first)
  prev             Previous track
  seek <time>      Seek to position (e.g., 1:30)
  retry            Reload a track that failed

Mode Commands:
  vol [0-100]      Show or set volume
  vol +, vol -     Step volume up/down        [+/-]
  mute             Mute/unmute
  shuffle          Toggle shuffle
  repeat [mode]    Cycle or set repeat (none/one/all)

Collection Commands:
  queue <id>       Play a track next
  clearqueue       Empty the up-next queue
  add <id>         Append a track to the playlist
  remove <id>      Remove a track from the playlist
  album [name]     Play an album, or the whole catalog

Other Commands:
  list             Show the playlist
  status           Show what is playing
  help             Show this help
  quit             Exit bandstand"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play_with_and_without_id() {
        assert_eq!( Command::parse( "play" ).unwrap(), Command::Play { track_id: None } );
        assert_eq!(
            Command::parse( "p  track-7 " ).unwrap(),
            Command::Play { track_id: Some( "track-7".into() ) }
        );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "sk 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_time_rejects_bad_seconds() {
        assert!( parse_time( "1:75" ).is_err() );
        assert!( parse_time( "-4" ).is_err() );
        assert!( parse_time( "abc" ).is_err() );
    }


    #[test]
    fn test_parse_time_rejects_overflow() {
        assert!( matches!( parse_time( "307445734561825861:00" ), Err( CommandError::InvalidArgument( _ ) ) ) );
        assert!( matches!(
            Command::parse( "seek 307445734561825861:00" ),
            Err( CommandError::InvalidArgument( _ ) )
        ));
        assert_eq!( parse_time( "2:05" ).unwrap(), Duration::from_secs( 125 ) );
    }


    #[test]
    fn test_parse_repeat_with_mode() {
        let cmd = Command::parse( "repeat all" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: Some( RepeatMode::All ) } );
        assert!( matches!( Command::parse( "repeat twice" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_repeat_toggle() {
        let cmd = Command::parse( "repeat" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: None } );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 40" ).unwrap(), Command::Volume { level: Some( 40 ) } );
        assert_eq!( Command::parse( "vol 400" ).unwrap(), Command::Volume { level: Some( 100 ) } );
        assert_eq!( Command::parse( "volume" ).unwrap(), Command::Volume { level: None } );
        assert!( Command::parse( "vol loud" ).is_err() );
        assert_eq!( Command::parse( "vol +" ).unwrap(), Command::VolumeUp );
        assert_eq!( Command::parse( "-" ).unwrap(), Command::VolumeDown );
    }


    #[test]
    fn test_parse_collection_commands() {
        assert_eq!( Command::parse( "queue x1" ).unwrap(), Command::Queue { track_id: "x1".into() } );
        assert_eq!( Command::parse( "rm x1" ).unwrap(), Command::Remove { track_id: "x1".into() } );
        assert_eq!(
            Command::parse( "album Night Drive" ).unwrap(),
            Command::Album { name: Some( "Night Drive".into() ) }
        );
        assert_eq!( Command::parse( "album" ).unwrap(), Command::Album { name: None } );
        assert_eq!( Command::parse( "CLEARQUEUE" ).unwrap(), Command::ClearQueue );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
        assert!( matches!( Command::parse( "   " ), Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert_eq!(
            Command::parse( "add" ),
            Err( CommandError::MissingArgument( "track id".into() ) )
        );
        assert!( matches!( Command::parse( "queue   " ), Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0.0 ), "0:00" );
        assert_eq!( format_time( 65.9 ), "1:05" );
        assert_eq!( format_time( 3600.0 ), "60:00" );
        assert_eq!( format_time( -2.0 ), "0:00" );
        assert_eq!( format_time( f64::NAN ), "0:00" );
    }


    #[test]
    fn test_progress() {
        assert_eq!( progress( 30.0, 0.0 ), 0.0 );
        assert_eq!( progress( 30.0, 120.0 ), 25.0 );
        assert_eq!( progress( 500.0, 120.0 ), 100.0 );
    }
}
