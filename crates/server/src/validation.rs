//! Inbound message validation.
//!
//! Rules:
//! - Undecodable frame: reject as malformed
//! - Envelope with no kind: reject
//! - Join/rejoin identity: trimmed, non-empty, at most `max_identity_len`
//!   characters
//!
//! Column range and game legality are checked by the session, not here.

use fourline_wire::{ClientKind, ClientMessage, GameId, Message};

use crate::error::ValidationError;

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Join { username: String },
    Rejoin { username: String },
    Move { game_id: GameId, column: i32 },
    Forfeit { game_id: GameId },
}

impl Request {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Rejoin { .. } => "rejoin",
            Self::Move { .. } => "move",
            Self::Forfeit { .. } => "forfeit",
        }
    }
}

/// Decode one binary frame.
pub fn decode_frame(bytes: &[u8]) -> Result<ClientMessage, ValidationError> {
    ClientMessage::decode(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))
}

/// Validate a decoded message.
pub fn validate_message(
    message: ClientMessage,
    max_identity_len: usize,
) -> Result<Request, ValidationError> {
    match message.kind.ok_or(ValidationError::MissingKind)? {
        ClientKind::Join(join) => Ok(Request::Join {
            username: validate_identity(&join.username, max_identity_len)?,
        }),
        ClientKind::Rejoin(rejoin) => Ok(Request::Rejoin {
            username: validate_identity(&rejoin.username, max_identity_len)?,
        }),
        ClientKind::Move(play) => Ok(Request::Move {
            game_id: play.game_id,
            column: play.column,
        }),
        ClientKind::Forfeit(forfeit) => Ok(Request::Forfeit {
            game_id: forfeit.game_id,
        }),
    }
}

/// Decode and validate in one step.
pub fn parse_frame(bytes: &[u8], max_identity_len: usize) -> Result<Request, ValidationError> {
    validate_message(decode_frame(bytes)?, max_identity_len)
}

fn validate_identity(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    if username.chars().count() > max_len {
        return Err(ValidationError::IdentityTooLong { max: max_len });
    }
    Ok(username.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 32;

    #[test]
    fn test_join_accepted_and_trimmed() {
        let bytes = ClientMessage::join("  alice ").encode_to_vec();
        assert_eq!(
            parse_frame(&bytes, MAX),
            Ok(Request::Join {
                username: "alice".to_string()
            })
        );
    }

    #[test]
    fn test_blank_identity_rejected() {
        for name in ["", "   ", "\t"] {
            assert_eq!(
                validate_message(ClientMessage::join(name), MAX),
                Err(ValidationError::MissingIdentity)
            );
            assert_eq!(
                validate_message(ClientMessage::rejoin(name), MAX),
                Err(ValidationError::MissingIdentity)
            );
        }
    }

    #[test]
    fn test_identity_length_counts_characters() {
        let exact = "é".repeat(MAX);
        assert!(validate_message(ClientMessage::join(exact.clone()), MAX).is_ok());
        assert_eq!(
            validate_message(ClientMessage::join(format!("{exact}x")), MAX),
            Err(ValidationError::IdentityTooLong { max: MAX })
        );
    }

    #[test]
    fn test_move_passes_column_through() {
        assert_eq!(
            validate_message(ClientMessage::play(4, -1), MAX),
            Ok(Request::Move {
                game_id: 4,
                column: -1
            })
        );
    }

    #[test]
    fn test_missing_kind_rejected() {
        assert_eq!(
            validate_message(ClientMessage { kind: None }, MAX),
            Err(ValidationError::MissingKind)
        );
        // An empty frame decodes to an envelope with no kind.
        assert_eq!(parse_frame(&[], MAX), Err(ValidationError::MissingKind));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let result = parse_frame(&[0xff, 0xff, 0xff, 0xff], MAX);
        assert!(matches!(result, Err(ValidationError::Malformed(_))));
    }

    #[test]
    fn test_request_names() {
        assert_eq!(Request::Forfeit { game_id: 1 }.name(), "forfeit");
        assert_eq!(
            Request::Rejoin {
                username: "a".into()
            }
            .name(),
            "rejoin"
        );
    }
}
