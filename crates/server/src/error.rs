//! Error taxonomy for the session server.
//!
//! Every rejected inbound message produces exactly one of these, rendered
//! as an `ErrorNotice` to the sender. None of them alter session state.

use std::path::PathBuf;

use fourline_wire::GameId;

/// The message itself is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message kind missing")]
    MissingKind,

    #[error("username required")]
    MissingIdentity,

    #[error("username longer than {max} characters")]
    IdentityTooLong { max: usize },
}

/// The message is well-formed but not legal right now.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalStateError {
    #[error("game is not in progress")]
    NotPlaying,

    #[error("not your turn")]
    NotYourTurn,

    #[error("column full or invalid")]
    InvalidColumn,

    #[error("no active game found for reconnection")]
    NoActiveSession,

    #[error("game {0} not found")]
    UnknownSession(GameId),

    #[error("not a participant in this game")]
    NotAParticipant,

    #[error("already waiting or playing")]
    AlreadyJoined,
}

/// Any rejection of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    IllegalState(#[from] IllegalStateError),
}

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation failed: {0}")]
    Validation(String),
}
