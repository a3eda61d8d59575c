//! Track records and the catalog they are read from
//!
//! Tracks arrive from the content layer as JSON, either wrapped in the
//! read API envelope or as a bare array. The engine never mutates them.

use std::fs;
use std::hash::{ Hash, Hasher };
use std::path::Path;

use serde::{ Deserialize, Serialize };
use thiserror::Error;


/// Errors that can occur while reading a catalog.
#[derive( Debug, Error )]
pub enum CatalogError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid catalog JSON: {0}" )]
    Parse( #[from] serde_json::Error ),

    #[error( "Content API error: {0}" )]
    Api( String ),
}


/// An immutable content record for one playable track.
#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( rename_all = "camelCase" )]
pub struct Track {
    pub id: String,
    pub title: String,
    /// Display duration, "M:SS".
    pub duration: String,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub cover: Option<String>,
    pub audio_url: String,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub album: Option<String>,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub year: Option<u32>,
    #[serde( default )]
    pub is_single: bool,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub genre: Option<String>,
    #[serde( default, skip_serializing_if = "Option::is_none" )]
    pub description: Option<String>,
}


impl Track {
    /// Creates a bare track with only the fields the engine needs.
    pub fn new( id: impl Into<String>, title: impl Into<String>, audio_url: impl Into<String> ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            duration: String::from( "0:00" ),
            cover: None,
            audio_url: audio_url.into(),
            album: None,
            year: None,
            is_single: false,
            genre: None,
            description: None,
        }
    }
}


// Tracks are the same track when their ids match, whatever else differs.
impl PartialEq for Track {
    fn eq( &self, other: &Self ) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>( &self, state: &mut H ) {
        self.id.hash( state );
    }
}


/// Read API response envelope.
#[derive( Debug, Deserialize )]
struct ApiResponse {
    success: bool,
    #[serde( default )]
    data: Option<Vec<Track>>,
    #[serde( default )]
    error: Option<String>,
}


#[derive( Debug, Deserialize )]
#[serde( untagged )]
enum CatalogDocument {
    Envelope( ApiResponse ),
    Bare( Vec<Track> ),
}


/// The set of tracks published by the content layer.
#[derive( Debug, Clone, Default )]
pub struct Catalog {
    tracks: Vec<Track>,
}


impl Catalog {
    /// Creates a catalog from already-fetched tracks.
    pub fn new( tracks: Vec<Track> ) -> Self {
        Self { tracks }
    }


    /// Parses a catalog from the read API response or a bare track array.
    pub fn from_json( json: &str ) -> Result<Self, CatalogError> {
        let tracks = match serde_json::from_str::<CatalogDocument>( json )? {
            CatalogDocument::Bare( tracks ) => tracks,
            CatalogDocument::Envelope( response ) if response.success => {
                response.data.unwrap_or_default()
            }
            CatalogDocument::Envelope( response ) => {
                return Err( CatalogError::Api(
                    response.error.unwrap_or_else( || "Unknown API error".into() )
                ));
            }
        };

        tracing::debug!( "Catalog parsed with {} tracks", tracks.len() );
        Ok( Self { tracks } )
    }


    /// Loads a catalog from a JSON file.
    pub fn load( path: &Path ) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string( path )?;
        let catalog = Self::from_json( &contents )?;
        tracing::info!( "Loaded {} tracks from {:?}", catalog.len(), path );
        Ok( catalog )
    }


    /// All tracks in publication order.
    pub fn tracks( &self ) -> &[Track] {
        &self.tracks
    }


    /// Looks up a track by id.
    pub fn get( &self, id: &str ) -> Option<&Track> {
        self.tracks.iter().find( |t| t.id == id )
    }


    /// Tracks belonging to `album`, in catalog order. Matching ignores case.
    pub fn album( &self, name: &str ) -> Vec<Track> {
        self.tracks
            .iter()
            .filter( |t| t.album.as_deref().is_some_and( |a| a.eq_ignore_ascii_case( name ) ) )
            .cloned()
            .collect()
    }


    /// Distinct album names in order of first appearance.
    pub fn albums( &self ) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for album in self.tracks.iter().filter_map( |t| t.album.as_deref() ) {
            if !names.contains( &album ) {
                names.push( album );
            }
        }
        names
    }


    /// Tracks released as singles.
    pub fn singles( &self ) -> Vec<Track> {
        self.tracks.iter().filter( |t| t.is_single ).cloned().collect()
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"{
        "success": true,
        "data": [
            {
                "id": "thunder-road",
                "title": "Thunder Road",
                "duration": "4:32",
                "cover": "/images/covers/thunder-road.jpg",
                "audioUrl": "/audio/thunder-road.mp3",
                "album": "Electric Nights",
                "year": 2024,
                "isSingle": true,
                "genre": "Rock"
            },
            {
                "id": "neon-dreams",
                "title": "Neon Dreams",
                "duration": "4:18",
                "audioUrl": "/audio/neon-dreams.mp3",
                "album": "City Lights"
            },
            {
                "id": "midnight-fire",
                "title": "Midnight Fire",
                "duration": "3:45",
                "audioUrl": "/audio/midnight-fire.mp3",
                "album": "Electric Nights"
            }
        ]
    }"#;


    #[test]
    fn test_parse_envelope() {
        let catalog = Catalog::from_json( ENVELOPE ).unwrap();
        assert_eq!( catalog.len(), 3 );

        let track = catalog.get( "thunder-road" ).unwrap();
        assert_eq!( track.audio_url, "/audio/thunder-road.mp3" );
        assert_eq!( track.year, Some( 2024 ) );
        assert!( track.is_single );
        assert!( !catalog.get( "neon-dreams" ).unwrap().is_single );
        assert!( catalog.get( "missing" ).is_none() );
    }


    #[test]
    fn test_parse_bare_array() {
        let json = r#"[{ "id": "a", "title": "A", "duration": "1:00", "audioUrl": "a.mp3" }]"#;
        let catalog = Catalog::from_json( json ).unwrap();
        assert_eq!( catalog.tracks()[ 0 ].id, "a" );
        assert_eq!( catalog.tracks()[ 0 ].album, None );
    }


    #[test]
    fn test_failed_envelope_is_api_error() {
        let json = r#"{ "success": false, "error": "Failed to fetch tracks" }"#;
        let result = Catalog::from_json( json );
        assert!( matches!( result, Err( CatalogError::Api( ref msg ) ) if msg == "Failed to fetch tracks" ) );
    }


    #[test]
    fn test_albums_keep_first_appearance_order() {
        let catalog = Catalog::from_json( ENVELOPE ).unwrap();
        assert_eq!( catalog.albums(), vec![ "Electric Nights", "City Lights" ] );

        let ids: Vec<_> = catalog.album( "electric nights" ).into_iter().map( |t| t.id ).collect();
        assert_eq!( ids, vec![ "thunder-road", "midnight-fire" ] );
        assert_eq!( catalog.singles().len(), 1 );
    }


    #[test]
    fn test_tracks_compare_by_id() {
        let a = Track::new( "1", "First", "a.mp3" );
        let mut b = Track::new( "1", "Renamed", "b.mp3" );
        b.genre = Some( "Rock".into() );
        assert_eq!( a, b );
        assert_ne!( a, Track::new( "2", "First", "a.mp3" ) );
    }


    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "tracks.json" );
        fs::write( &path, ENVELOPE ).unwrap();

        let catalog = Catalog::load( &path ).unwrap();
        assert_eq!( catalog.len(), 3 );
        assert!( matches!( Catalog::load( &dir.path().join( "nope.json" ) ), Err( CatalogError::Io( _ ) ) ) );
    }
}
