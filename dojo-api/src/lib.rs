pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<chrono::Utc>;

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

mod auth;
pub use auth::{is_admin_or_moderator, is_author, AuthToken, NewSession, Role, Session};

mod challenge;
pub use challenge::{
    Challenge, ChallengeId, Difficulty, NewChallenge, NewSolution, NewSubmission, Solution,
    SolutionId, Submission, SubmissionId,
};

pub mod comment;
pub use comment::{Comment, CommentEdit, CommentId, CommentNode, NewComment, RootRef};

pub mod dashboard;
pub use dashboard::{Dashboard, DashboardLink, LinkIcon, Tab, TabKind};

mod db;
pub use db::Db;

mod error;
pub use error::Error;

mod user;
pub use user::{LinkId, NewUser, ProfileUpdate, UserId, UserLink, UserProfile};

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Schemes a user-provided url may use, relative urls have none
pub const SAFE_URL_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

/// Whether `url` is relative or uses one of `SAFE_URL_SCHEMES`
pub fn has_safe_scheme(url: &str) -> bool {
    match url
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .and_then(|s| s.split_once(':'))
    {
        None => true,
        Some((scheme, _)) => SAFE_URL_SCHEMES
            .iter()
            .any(|s| scheme.eq_ignore_ascii_case(s)),
    }
}

pub fn validate_url(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.chars().any(|c| c.is_whitespace() || c.is_control()) || !has_safe_scheme(s) {
        return Err(Error::InvalidUrl(String::from(s)));
    }
    Ok(())
}
