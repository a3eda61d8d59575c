//! Command-line argument parsing for Bandstand.

use std::path::PathBuf;

use clap::Parser;


/// Bandstand - play a band's catalog from the terminal.
#[derive( Parser, Debug )]
#[command( name = "bandstand" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Track catalog: a JSON track list or a tracks API response.
    pub catalog: PathBuf,

    /// Directory that root-relative audio URLs resolve under.
    #[arg( short, long )]
    pub media_root: Option<PathBuf>,

    /// Start playing this album.
    #[arg( short, long, conflicts_with = "start" )]
    pub album: Option<String>,

    /// Start playing the whole catalog from this track id.
    #[arg( short, long )]
    pub start: Option<String>,

    /// Log more to stderr (-v info, -vv debug, -vvv trace).
    #[arg( short, long, action = clap::ArgAction::Count )]
    pub verbose: u8,
}


impl Args {
    /// Log level from `-v` flags, if any were given.
    pub fn log_level( &self ) -> Option<tracing::Level> {
        match self.verbose {
            0 => None,
            1 => Some( tracing::Level::INFO ),
            2 => Some( tracing::Level::DEBUG ),
            _ => Some( tracing::Level::TRACE ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from([ "bandstand", "tracks.json" ]).unwrap();
        assert_eq!( args.catalog, PathBuf::from( "tracks.json" ) );
        assert!( args.media_root.is_none() );
        assert_eq!( args.log_level(), None );
    }


    #[test]
    fn test_parse_full() {
        let args = Args::try_parse_from([
            "bandstand", "tracks.json", "--media-root", "public", "--album", "Night Drive", "-vv",
        ]).unwrap();
        assert_eq!( args.media_root, Some( PathBuf::from( "public" ) ) );
        assert_eq!( args.album.as_deref(), Some( "Night Drive" ) );
        assert_eq!( args.log_level(), Some( tracing::Level::DEBUG ) );
    }


    #[test]
    fn test_album_conflicts_with_start() {
        assert!( Args::try_parse_from([ "bandstand", "t.json", "-a", "x", "-s", "y" ]).is_err() );
    }
}
