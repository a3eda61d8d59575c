//! Text rendering for the terminal host.
//!
//! Everything printed about playback goes through here, built from an
//! engine snapshot.

use bandstand_core::command::format_time;
use bandstand_core::{ PlaybackSnapshot, PlaybackStatus, Track };


const PROGRESS_WIDTH: usize = 20;


fn status_icon( status: PlaybackStatus ) -> &'static str {
    match status {
        PlaybackStatus::Idle => "■",
        PlaybackStatus::Loading => "…",
        PlaybackStatus::Playing => "▶",
        PlaybackStatus::Paused => "⏸",
        PlaybackStatus::Ended => "■",
        PlaybackStatus::Failed => "✗",
    }
}


/// "Title (Album, 2023)" or just the title.
pub fn track_label( track: &Track ) -> String {
    match ( &track.album, track.year ) {
        ( Some( album ), Some( year ) ) => format!( "{} ({}, {})", track.title, album, year ),
        ( Some( album ), None ) => format!( "{} ({})", track.title, album ),
        ( None, Some( year ) ) => format!( "{} ({})", track.title, year ),
        ( None, None ) => track.title.clone(),
    }
}


/// One-line announcement printed when the track or status changes.
pub fn now_playing( snapshot: &PlaybackSnapshot ) -> String {
    let Some( ref track ) = snapshot.current_track else {
        return format!( "{} Stopped", status_icon( snapshot.status ) );
    };

    match snapshot.error {
        Some( ref error ) => format!( "{} {} - {} (type 'retry')", status_icon( snapshot.status ), track.title, error ),
        None => format!(
            "{} {} [{}]",
            status_icon( snapshot.status ),
            track_label( track ),
            snapshot.status.name()
        ),
    }
}


/// Full status: track, progress bar, time, volume and modes.
pub fn status( snapshot: &PlaybackSnapshot ) -> String {
    let filled = ( snapshot.progress() / 100.0 * PROGRESS_WIDTH as f64 ).round() as usize;
    let filled = filled.min( PROGRESS_WIDTH );
    let bar = format!( "[{}{}]", "█".repeat( filled ), "░".repeat( PROGRESS_WIDTH - filled ) );

    let vol_pct = ( snapshot.volume * 100.0 ).round() as u32;
    let vol_str = if vol_pct == 0 { "muted".to_string() } else { format!( "{}%", vol_pct ) };

    let mut lines = vec![
        now_playing( snapshot ),
        format!(
            "  {} {} / {}  vol {}",
            bar,
            format_time( snapshot.current_time ),
            format_time( snapshot.duration ),
            vol_str
        ),
        format!(
            "  shuffle {}  repeat {}  queued {}",
            if snapshot.shuffle_mode { "on" } else { "off" },
            snapshot.repeat_mode,
            snapshot.queue.len()
        ),
    ];

    if let Some( next ) = snapshot.queue.first() {
        lines.push( format!( "  up next: {}", next.title ) );
    }

    lines.join( "\n" )
}


/// Numbered playlist with the cursor marked.
pub fn playlist( snapshot: &PlaybackSnapshot ) -> String {
    if snapshot.playlist.is_empty() {
        return "Playlist is empty. Try 'album' or 'add <id>'.".to_string();
    }

    snapshot.playlist
        .iter()
        .enumerate()
        .map( |( i, track )| {
            let marker = if i == snapshot.current_index { ">" } else { " " };
            format!(
                "{} {:>3}. {:<12} {} {}",
                marker,
                i + 1,
                track.id,
                track_label( track ),
                track.duration
            )
        })
        .collect::<Vec<_>>()
        .join( "\n" )
}


#[cfg( test )]
mod tests {
    use super::*;
    use bandstand_core::{ PlaybackError, RepeatMode };


    fn snapshot() -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_track: None,
            status: PlaybackStatus::Idle,
            volume: 0.8,
            current_time: 0.0,
            duration: 0.0,
            playlist: Vec::new(),
            current_index: 0,
            shuffle_mode: false,
            repeat_mode: RepeatMode::None,
            queue: Vec::new(),
            error: None,
        }
    }


    fn track( id: &str, title: &str ) -> Track {
        Track::new( id, title, format!( "/audio/{}.mp3", id ) )
    }


    #[test]
    fn test_track_label() {
        let mut t = track( "a", "Harbor Lights" );
        assert_eq!( track_label( &t ), "Harbor Lights" );
        t.album = Some( "Night Drive".into() );
        t.year = Some( 2023 );
        assert_eq!( track_label( &t ), "Harbor Lights (Night Drive, 2023)" );
    }


    #[test]
    fn test_now_playing_states() {
        let mut snap = snapshot();
        assert_eq!( now_playing( &snap ), "■ Stopped" );

        snap.current_track = Some( track( "a", "Harbor Lights" ) );
        snap.status = PlaybackStatus::Playing;
        assert_eq!( now_playing( &snap ), "▶ Harbor Lights [playing]" );

        snap.status = PlaybackStatus::Failed;
        snap.error = Some( PlaybackError::NoSource { track_id: "a".into() } );
        assert!( now_playing( &snap ).contains( "retry" ) );
    }


    #[test]
    fn test_status_shows_progress_and_volume() {
        let mut snap = snapshot();
        snap.current_track = Some( track( "a", "Harbor Lights" ) );
        snap.status = PlaybackStatus::Playing;
        snap.current_time = 60.0;
        snap.duration = 120.0;
        snap.volume = 0.0;

        let text = status( &snap );
        assert!( text.contains( "1:00 / 2:00" ) );
        assert!( text.contains( "vol muted" ) );
        assert!( text.contains( &format!( "{}{}", "█".repeat( 10 ), "░".repeat( 10 ) ) ) );
    }


    #[test]
    fn test_playlist_marks_cursor() {
        let mut snap = snapshot();
        assert!( playlist( &snap ).starts_with( "Playlist is empty" ) );

        snap.playlist = vec![ track( "a", "One" ), track( "b", "Two" ) ];
        snap.current_index = 1;
        let lines: Vec<_> = playlist( &snap ).lines().map( str::to_string ).collect();
        assert!( lines[ 0 ].starts_with( "    1." ) );
        assert!( lines[ 1 ].starts_with( ">   2." ) );
    }
}
