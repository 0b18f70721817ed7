use std::str::FromStr;

use anyhow::anyhow;

use crate::{Error, Time, UserId};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct ChallengeId(pub i64);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct SolutionId(pub i64);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct SubmissionId(pub i64);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Beginner,
    Easy,
    Medium,
    Hard,
    Extreme,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "BEGINNER",
            Difficulty::Easy => "EASY",
            Difficulty::Medium => "MEDIUM",
            Difficulty::Hard => "HARD",
            Difficulty::Extreme => "EXTREME",
        }
    }
}

impl FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Difficulty> {
        match s {
            "BEGINNER" => Ok(Difficulty::Beginner),
            "EASY" => Ok(Difficulty::Easy),
            "MEDIUM" => Ok(Difficulty::Medium),
            "HARD" => Ok(Difficulty::Hard),
            "EXTREME" => Ok(Difficulty::Extreme),
            _ => Err(anyhow!("unknown difficulty {s:?}")),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub slug: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub created_at: Time,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewChallenge {
    pub slug: String,
    pub name: String,
    pub difficulty: Difficulty,
}

impl NewChallenge {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.slug)?;
        crate::validate_string(&self.name)?;
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::InvalidName(self.slug.clone()));
        }
        Ok(())
    }
}

/// A solution shared by its author, which can be discussed in comments
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Solution {
    pub id: SolutionId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub created_at: Time,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSolution {
    pub challenge_id: ChallengeId,
    pub title: String,
    pub description: String,
}

impl NewSolution {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.title)?;
        crate::validate_string(&self.description)?;
        Ok(())
    }
}

/// A submission, joined with the challenge it was made for
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub user_id: UserId,
    pub challenge: Challenge,
    pub code: String,
    pub is_successful: bool,
    pub created_at: Time,
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct NewSubmission {
    pub challenge_id: ChallengeId,
    pub code: String,
    pub is_successful: bool,
}

impl NewSubmission {
    pub fn validate(&self) -> Result<(), Error> {
        crate::validate_string(&self.code)
    }
}
