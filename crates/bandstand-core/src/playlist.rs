//! Playlist and queue management
//!
//! The playlist is the active listing with a position cursor; the up-next
//! queue is a FIFO of tracks that `next` consumes before advancing the
//! playlist.

use std::collections::VecDeque;

use rand::Rng;

use crate::track::Track;


/// Ordered listing of tracks with a current-position cursor.
///
/// Whenever the playlist is non-empty the cursor is a valid index.
#[derive( Debug, Clone, Default )]
pub struct Playlist {
    tracks: Vec<Track>,
    current_index: usize,
}


impl Playlist {
    /// Creates a new empty playlist.
    pub fn new() -> Self {
        Self::default()
    }


    /// Replaces the whole listing and places the cursor at `start`.
    ///
    /// Returns the track at `start`, or None when `start` is out of range
    /// (the cursor then falls back to the first entry).
    pub fn replace( &mut self, tracks: Vec<Track>, start: usize ) -> Option<&Track> {
        self.tracks = tracks;
        self.current_index = if start < self.tracks.len() { start } else { 0 };
        self.tracks.get( start )
    }


    /// Adds a track to the end of the playlist.
    pub fn add( &mut self, track: Track ) {
        self.tracks.push( track );
    }


    /// Removes every entry with the given id.
    ///
    /// The cursor keeps pointing at the same entry when an earlier one is
    /// removed. When the entry under the cursor goes, the cursor stays at
    /// its position, clamped to the new end.
    ///
    /// @returns The number of entries removed
    pub fn remove( &mut self, id: &str ) -> usize {
        let mut removed = 0;
        let mut index = 0;
        let current = self.current_index;
        let mut cursor = current;

        self.tracks.retain( |track| {
            let keep = track.id != id;
            if !keep {
                removed += 1;
                if index < current {
                    cursor -= 1;
                }
            }
            index += 1;
            keep
        });

        self.current_index = cursor.min( self.tracks.len().saturating_sub( 1 ) );
        removed
    }


    /// Gets the track under the cursor.
    pub fn current( &self ) -> Option<&Track> {
        self.tracks.get( self.current_index )
    }


    /// Gets the current track index.
    pub fn current_index( &self ) -> usize {
        self.current_index
    }


    /// Moves the cursor. Out-of-range indices are ignored.
    pub fn set_current( &mut self, index: usize ) -> Option<&Track> {
        if index < self.tracks.len() {
            self.current_index = index;
            self.current()
        } else {
            None
        }
    }


    /// Index of the first entry with the given id.
    pub fn position( &self, id: &str ) -> Option<usize> {
        self.tracks.iter().position( |t| t.id == id )
    }


    /// Gets a track by index.
    pub fn get( &self, index: usize ) -> Option<&Track> {
        self.tracks.get( index )
    }


    /// Index `next` would move to, or None when the playlist is empty.
    ///
    /// Sequential order wraps at the end. Shuffle draws uniformly and never
    /// lands on the current entry while there is another to choose.
    pub fn next_index<R: Rng + ?Sized>( &self, shuffle: bool, rng: &mut R ) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if shuffle {
            Some( self.random_other( rng ) )
        } else {
            Some( ( self.current_index + 1 ) % len )
        }
    }


    /// Index `previous` would move to, or None when the playlist is empty.
    pub fn previous_index<R: Rng + ?Sized>( &self, shuffle: bool, rng: &mut R ) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        if shuffle {
            Some( self.random_other( rng ) )
        } else {
            Some( ( self.current_index + len - 1 ) % len )
        }
    }


    fn random_other<R: Rng + ?Sized>( &self, rng: &mut R ) -> usize {
        let len = self.tracks.len();
        loop {
            let candidate = rng.gen_range( 0..len );
            if candidate != self.current_index || len == 1 {
                return candidate;
            }
        }
    }


    /// Gets all tracks in the playlist.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Gets the number of tracks.
    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    /// Returns true if the playlist is empty.
    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


/// FIFO of tracks to play next, ahead of playlist advancement.
#[derive( Debug, Clone, Default )]
pub struct UpNext {
    tracks: VecDeque<Track>,
}


impl UpNext {
    pub fn new() -> Self {
        Self::default()
    }


    /// Appends a track to the back of the queue.
    pub fn push( &mut self, track: Track ) {
        self.tracks.push_back( track );
    }


    /// Takes the head of the queue.
    pub fn pop( &mut self ) -> Option<Track> {
        self.tracks.pop_front()
    }


    pub fn peek( &self ) -> Option<&Track> {
        self.tracks.front()
    }


    pub fn clear( &mut self ) {
        self.tracks.clear();
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }


    /// Queued tracks in play order.
    pub fn to_vec( &self ) -> Vec<Track> {
        self.tracks.iter().cloned().collect()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;


    fn tracks( ids: &[&str] ) -> Vec<Track> {
        ids.iter()
            .map( |id| Track::new( *id, format!( "Track {}", id ), format!( "/audio/{}.mp3", id ) ) )
            .collect()
    }


    fn rng() -> StdRng {
        StdRng::seed_from_u64( 7 )
    }


    #[test]
    fn test_next_cycles_back_to_start() {
        let mut rng = rng();
        for start in 0..4 {
            let mut playlist = Playlist::new();
            playlist.replace( tracks( &[ "1", "2", "3", "4" ] ), start );

            for _ in 0..4 {
                let next = playlist.next_index( false, &mut rng ).unwrap();
                playlist.set_current( next );
            }
            assert_eq!( playlist.current_index(), start );
        }
    }


    #[test]
    fn test_previous_then_next_is_identity() {
        let mut rng = rng();
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "1", "2", "3" ] ), 0 );

        let prev = playlist.previous_index( false, &mut rng ).unwrap();
        assert_eq!( prev, 2 );
        playlist.set_current( prev );
        let next = playlist.next_index( false, &mut rng ).unwrap();
        assert_eq!( next, 0 );
    }


    #[test]
    fn test_shuffle_never_repeats_current() {
        let mut rng = rng();
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "1", "2", "3" ] ), 1 );

        for _ in 0..500 {
            assert_ne!( playlist.next_index( true, &mut rng ), Some( 1 ) );
            assert_ne!( playlist.previous_index( true, &mut rng ), Some( 1 ) );
        }
    }


    #[test]
    fn test_shuffle_single_track_repeats_it() {
        let mut rng = rng();
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "solo" ] ), 0 );
        assert_eq!( playlist.next_index( true, &mut rng ), Some( 0 ) );
    }


    #[test]
    fn test_empty_playlist_has_no_next() {
        let mut rng = rng();
        let playlist = Playlist::new();
        assert_eq!( playlist.next_index( false, &mut rng ), None );
        assert_eq!( playlist.previous_index( true, &mut rng ), None );
        assert!( playlist.current().is_none() );
    }


    #[test]
    fn test_replace_out_of_range_start() {
        let mut playlist = Playlist::new();
        assert!( playlist.replace( tracks( &[ "1", "2" ] ), 5 ).is_none() );
        assert_eq!( playlist.current_index(), 0 );
    }


    #[test]
    fn test_remove_before_cursor_keeps_current_track() {
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "1", "2", "3" ] ), 2 );

        assert_eq!( playlist.remove( "1" ), 1 );
        assert_eq!( playlist.current_index(), 1 );
        assert_eq!( playlist.current().unwrap().id, "3" );
    }


    #[test]
    fn test_remove_current_clamps_cursor() {
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "1", "2", "3" ] ), 2 );

        playlist.remove( "3" );
        assert_eq!( playlist.current_index(), 1 );

        playlist.remove( "1" );
        playlist.remove( "2" );
        assert!( playlist.is_empty() );
        assert_eq!( playlist.current_index(), 0 );
    }


    #[test]
    fn test_remove_unknown_is_noop() {
        let mut playlist = Playlist::new();
        playlist.replace( tracks( &[ "1", "2" ] ), 1 );
        assert_eq!( playlist.remove( "nope" ), 0 );
        assert_eq!( playlist.len(), 2 );
        assert_eq!( playlist.current_index(), 1 );
    }


    #[test]
    fn test_up_next_is_fifo() {
        let mut queue = UpNext::new();
        for track in tracks( &[ "a", "b" ] ) {
            queue.push( track );
        }
        assert_eq!( queue.peek().unwrap().id, "a" );
        assert_eq!( queue.pop().unwrap().id, "a" );
        assert_eq!( queue.to_vec(), tracks( &[ "b" ] ) );
        queue.clear();
        assert!( queue.pop().is_none() );
    }
}
