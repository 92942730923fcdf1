//! Hand-built registry shared by the unit tests.

use crate::{
    message::{InputMessage, OutputMessage, Part, Style},
    soap::Method,
    types::{ComplexType, FieldDescriptor, Kind, MaxOccurs, QName, Registry, TypeDescriptor},
};

pub const NS: &str = "urn:LyricWiki";

fn named(registry: &Registry, name: &str, ty: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, registry.lookup(ty))
}

fn complex(name: &str, complex: ComplexType) -> TypeDescriptor {
    TypeDescriptor {
        name: QName::new(Some(NS), name),
        tag: None,
        namespace: Some(NS.to_owned()),
        base: None,
        kind: Kind::Complex(complex),
    }
}

pub fn registry() -> Registry {
    let mut registry = Registry::new();

    registry.define(TypeDescriptor {
        name: QName::new(Some(NS), "AccessMask"),
        tag: None,
        namespace: None,
        base: None,
        kind: Kind::Enum(vec!["Read".to_owned(), "Write".to_owned(), "Admin".to_owned()]),
    });

    registry.define(TypeDescriptor {
        name: QName::new(Some(NS), "ArrayOfstring"),
        tag: None,
        namespace: None,
        base: None,
        kind: Kind::Array(registry.lookup("string")),
    });

    let song = ComplexType {
        children: vec![
            named(&registry, "artist", "string"),
            named(&registry, "song", "string"),
            named(&registry, "lyrics", "string"),
            named(&registry, "url", "string"),
        ],
        ..ComplexType::default()
    };
    registry.define(complex("SongResult", song));

    let album = ComplexType {
        children: vec![
            named(&registry, "artist", "string"),
            named(&registry, "album", "string"),
            named(&registry, "year", "int"),
            named(&registry, "review", "string").with_max(MaxOccurs::Unbounded),
            named(&registry, "songs", "ArrayOfstring"),
        ],
        ..ComplexType::default()
    };
    registry.define(complex("AlbumResult", album));

    let artist = ComplexType {
        attributes: vec![named(&registry, "rank", "int")],
        children: vec![
            named(&registry, "name", "string"),
            named(&registry, "best", "SongResult"),
        ],
        ..ComplexType::default()
    };
    registry.define(complex("ArtistResult", artist));

    let label = ComplexType {
        attributes: vec![named(&registry, "lang", "string")],
        content_type: Some(registry.lookup("string")),
        ..ComplexType::default()
    };
    registry.define(complex("Label", label));

    let session = ComplexType {
        children: vec![named(&registry, "sessionId", "string")],
        ..ComplexType::default()
    };
    let mut session = complex("SessionHeader", session);
    session.tag = Some("SessionHeader".to_owned());
    registry.define(session);

    let authenticate = ComplexType {
        children: vec![
            named(&registry, "username", "string"),
            named(&registry, "password", "string"),
        ],
        ..ComplexType::default()
    };
    let mut authenticate = complex("Authenticate", authenticate);
    authenticate.tag = Some("Authenticate".to_owned());
    registry.define(authenticate);

    registry.resolve_refs().expect("test registry resolves");
    registry
}

pub fn part(registry: &Registry, name: &str, ty: &str) -> Part {
    Part::new(name, registry.lookup(ty))
}

/// `checkSongExists(artist, song) -> boolean` over rpc with the given encoding.
pub fn check_song_exists(registry: &Registry, literal: bool) -> Method {
    let parts = vec![part(registry, "artist", "string"), part(registry, "song", "string")];
    Method {
        location: "http://lyrics.example/server.php".to_owned(),
        name: "checkSongExists".to_owned(),
        action: "urn:LyricWiki#checkSongExists".to_owned(),
        input: InputMessage::new(
            registry,
            "checkSongExists",
            Some(NS.to_owned()),
            parts,
            Style::Rpc,
            literal,
            Vec::new(),
        )
        .expect("input message"),
        output: OutputMessage::new(
            "checkSongExists",
            Some(NS.to_owned()),
            vec![part(registry, "return", "boolean")],
            Vec::new(),
        ),
    }
}

/// Document/literal wrapped `Authenticate` carrying a `SessionHeader`.
pub fn authenticate(registry: &Registry) -> Method {
    Method {
        location: "http://accounts.example/api".to_owned(),
        name: "Authenticate".to_owned(),
        action: "http://accounts.example/Authenticate".to_owned(),
        input: InputMessage::new(
            registry,
            "Authenticate",
            Some(NS.to_owned()),
            vec![part(registry, "parameters", "Authenticate")],
            Style::Document,
            true,
            vec![part(registry, "SessionHeader", "SessionHeader")],
        )
        .expect("input message"),
        output: OutputMessage::new(
            "Authenticate",
            Some(NS.to_owned()),
            vec![part(registry, "AuthenticateResult", "string")],
            Vec::new(),
        ),
    }
}
