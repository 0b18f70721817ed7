use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::{ChallengeId, CommentId, RootRef, UserId};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Comment text is empty")]
    EmptyText,

    #[error("Invalid comment")]
    InvalidComment,

    #[error("Comment not found {0:?}")]
    CommentNotFound(CommentId),

    #[error("Comment root not found {0:?}")]
    RootNotFound(RootRef),

    #[error("Challenge not found {0:?}")]
    ChallengeNotFound(ChallengeId),

    #[error("User not found {0:?}")]
    UserNotFound(UserId),

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Name already used {0}")]
    NameAlreadyUsed(String),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Invalid url {0:?}")]
    InvalidUrl(String),
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::EmptyText => StatusCode::BAD_REQUEST,
            Error::InvalidComment => StatusCode::BAD_REQUEST,
            Error::CommentNotFound(_) => StatusCode::NOT_FOUND,
            Error::RootNotFound(_) => StatusCode::NOT_FOUND,
            Error::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
            Error::UserNotFound(_) => StatusCode::NOT_FOUND,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NameAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::InvalidUrl(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Unauthorized => json!({
                "message": "unauthorized",
                "type": "unauthorized",
            }),
            Error::EmptyText => json!({
                "message": "comment text is empty",
                "type": "text_is_empty",
            }),
            Error::InvalidComment => json!({
                "message": "invalid comment",
                "type": "invalid_comment",
            }),
            Error::CommentNotFound(id) => json!({
                "message": "comment not found",
                "type": "comment-not-found",
                "id": id,
            }),
            Error::RootNotFound(root) => json!({
                "message": "the challenge or solution being commented on does not exist",
                "type": "root-not-found",
                "root": root,
            }),
            Error::ChallengeNotFound(id) => json!({
                "message": "challenge not found",
                "type": "challenge-not-found",
                "id": id,
            }),
            Error::UserNotFound(id) => json!({
                "message": "user not found",
                "type": "user-not-found",
                "id": id,
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::NameAlreadyUsed(n) => json!({
                "message": "name already used",
                "type": "conflict-name",
                "name": n,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::InvalidUrl(u) => json!({
                "message": "url contains whitespace, control characters or a disallowed scheme",
                "type": "invalid-url",
                "url": u,
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        macro_rules! field {
            ($name:expr, $what:expr) => {
                serde_json::from_value(
                    data.get($name)
                        .cloned()
                        .ok_or_else(|| anyhow!("error is {} without a {}", $what, $name))?,
                )
                .with_context(|| format!("parsing {} of {}", $name, $what))?
            };
        }
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(String::from(
                    data.get("message")
                        .and_then(|msg| msg.as_str())
                        .unwrap_or(""),
                )),
                "unauthorized" => Error::Unauthorized,
                "text_is_empty" => Error::EmptyText,
                "invalid_comment" => Error::InvalidComment,
                "comment-not-found" => Error::CommentNotFound(field!("id", "a missing comment")),
                "root-not-found" => Error::RootNotFound(field!("root", "a missing root")),
                "challenge-not-found" => {
                    Error::ChallengeNotFound(field!("id", "a missing challenge"))
                }
                "user-not-found" => Error::UserNotFound(field!("id", "a missing user")),
                "conflict-uuid" => Error::UuidAlreadyUsed(
                    data.get("uuid")
                        .and_then(|uuid| uuid.as_str())
                        .and_then(|uuid| Uuid::from_str(uuid).ok())
                        .ok_or_else(|| anyhow!("error is a uuid conflict without a proper uuid"))?,
                ),
                "conflict-name" => Error::NameAlreadyUsed(field!("name", "a name conflict")),
                "null-byte" => {
                    Error::NullByteInString(field!("string", "a null-byte-in-string"))
                }
                "invalid-name" => Error::InvalidName(field!("name", "an invalid name")),
                "invalid-url" => Error::InvalidUrl(field!("url", "an invalid url")),
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}
