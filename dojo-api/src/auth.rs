use std::{fmt, str::FromStr};

use anyhow::anyhow;
use uuid::Uuid;

use crate::{Error, UserId, STUB_UUID};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Moderator => "MODERATOR",
        }
    }

    /// Admins and moderators may moderate other users' comments
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

impl Default for Role {
    fn default() -> Role {
        Role::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Role> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            "MODERATOR" => Ok(Role::Moderator),
            _ => Err(anyhow!("unknown role {s:?}")),
        }
    }
}

/// An authenticated caller, as resolved from its auth token
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Session {
    pub user: UserId,
    pub role: Role,
}

pub fn is_admin_or_moderator(session: &Session) -> bool {
    session.role.is_elevated()
}

pub fn is_author(session: &Session, owner: UserId) -> bool {
    session.user == owner
}

/// Request to open a session on behalf of a user, issued by the identity provider
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSession {
    pub user: UserId,
    pub device: String,
}

impl NewSession {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.device)
    }
}
