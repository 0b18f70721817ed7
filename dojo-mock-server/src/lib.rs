use std::collections::{BTreeMap, HashMap};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use dojo_api::{
    AuthToken, Challenge, ChallengeId, Comment, CommentId, Db, Error, LinkId, NewChallenge,
    NewComment, NewSession, NewSolution, NewSubmission, NewUser, ProfileUpdate, RootRef, Session,
    Solution, SolutionId, Submission, SubmissionId, Time, UserId, UserLink, UserProfile, Uuid,
};

/// In-memory counterpart of the server, behaving like it for every operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MockServer {
    users: BTreeMap<UserId, UserProfile>,
    sessions: HashMap<AuthToken, Device>,
    challenges: BTreeMap<ChallengeId, Challenge>,
    solutions: BTreeMap<SolutionId, Solution>,
    submissions: BTreeMap<SubmissionId, StoredSubmission>,
    comments: BTreeMap<CommentId, Comment>,
    // mirror the per-table id sequences of the database
    last_link_id: i64,
    last_challenge_id: i64,
    last_solution_id: i64,
    last_submission_id: i64,
    last_comment_id: i64,
}

#[derive(Clone, Debug, PartialEq)]
struct Device {
    user: UserId,
    name: String,
}

#[derive(Clone, Debug, PartialEq)]
struct StoredSubmission {
    user_id: UserId,
    challenge_id: ChallengeId,
    code: String,
    is_successful: bool,
    created_at: Time,
}

fn next(last: &mut i64) -> i64 {
    *last += 1;
    *last
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer::default()
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    /// Return the id of user number `idx`
    pub fn test_get_user(&self, idx: usize) -> UserId {
        *self
            .users
            .keys()
            .nth(idx)
            .unwrap_or_else(|| panic!("getting user {idx} among {}", self.users.len()))
    }

    /// Return the device name session `tok` was opened for, if it is still open
    pub fn test_session_device(&self, tok: AuthToken) -> Option<&str> {
        self.sessions.get(&tok).map(|d| &d.name as &str)
    }

    pub fn test_comment(&self, id: CommentId) -> Option<&Comment> {
        self.comments.get(&id)
    }

    pub fn test_num_comments(&self) -> usize {
        self.comments.len()
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<(), Error> {
        u.validate()?;
        if self.users.values().any(|p| p.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }
        if self.users.contains_key(&u.id) {
            return Err(Error::UuidAlreadyUsed(u.id.0));
        }
        let links = self.make_links(&u.links);
        self.users.insert(
            u.id,
            UserProfile {
                id: u.id,
                name: u.name,
                role: u.role,
                bio: u.bio,
                image: u.image,
                created_at: Utc::now(),
                links,
            },
        );
        Ok(())
    }

    pub fn admin_create_session(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        if !self.users.contains_key(&s.user) {
            return Err(Error::UserNotFound(s.user));
        }
        let tok = AuthToken(Uuid::new_v4());
        self.sessions.insert(
            tok,
            Device {
                user: s.user,
                name: s.device,
            },
        );
        Ok(tok)
    }

    pub fn admin_create_challenge(&mut self, c: NewChallenge) -> Result<Challenge, Error> {
        c.validate()?;
        if self.challenges.values().any(|e| e.slug == c.slug) {
            return Err(Error::NameAlreadyUsed(c.slug));
        }
        let id = ChallengeId(next(&mut self.last_challenge_id));
        let challenge = Challenge {
            id,
            slug: c.slug,
            name: c.name,
            difficulty: c.difficulty,
            created_at: Utc::now(),
        };
        self.challenges.insert(id, challenge.clone());
        Ok(challenge)
    }

    /// Session behind `tok`, if it is still open
    pub fn resolve(&self, tok: AuthToken) -> Option<Session> {
        let device = self.sessions.get(&tok)?;
        let user = self.users.get(&device.user)?;
        Some(Session {
            user: user.id,
            role: user.role,
        })
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<Session, Error> {
        self.resolve(tok).ok_or(Error::Unauthorized)
    }

    pub fn unauth(&mut self, tok: AuthToken) -> Result<(), Error> {
        self.sessions
            .remove(&tok)
            .map(|_| ())
            .ok_or(Error::Unauthorized)
    }

    pub fn update_profile(&mut self, session: &Session, p: ProfileUpdate) -> Result<(), Error> {
        p.validate()?;
        let links = self.make_links(&p.links);
        let user = self
            .users
            .get_mut(&session.user)
            .ok_or(Error::UserNotFound(session.user))?;
        user.bio = p.bio;
        user.image = p.image;
        user.links = links;
        Ok(())
    }

    pub fn create_solution(&mut self, session: &Session, s: NewSolution) -> Result<Solution, Error> {
        s.validate()?;
        if !self.challenges.contains_key(&s.challenge_id) {
            return Err(Error::ChallengeNotFound(s.challenge_id));
        }
        let id = SolutionId(next(&mut self.last_solution_id));
        let solution = Solution {
            id,
            challenge_id: s.challenge_id,
            user_id: session.user,
            title: s.title,
            description: s.description,
            created_at: Utc::now(),
        };
        self.solutions.insert(id, solution.clone());
        Ok(solution)
    }

    pub fn create_submission(
        &mut self,
        session: &Session,
        s: NewSubmission,
    ) -> Result<Submission, Error> {
        s.validate()?;
        let challenge = self
            .challenges
            .get(&s.challenge_id)
            .cloned()
            .ok_or(Error::ChallengeNotFound(s.challenge_id))?;
        let id = SubmissionId(next(&mut self.last_submission_id));
        let stored = StoredSubmission {
            user_id: session.user,
            challenge_id: s.challenge_id,
            code: s.code,
            is_successful: s.is_successful,
            created_at: Utc::now(),
        };
        let submission = Submission {
            id,
            user_id: stored.user_id,
            challenge,
            code: stored.code.clone(),
            is_successful: stored.is_successful,
            created_at: stored.created_at,
        };
        self.submissions.insert(id, stored);
        Ok(submission)
    }

    fn make_links(&mut self, urls: &[String]) -> Vec<UserLink> {
        urls.iter()
            .map(|url| UserLink {
                id: LinkId(next(&mut self.last_link_id)),
                url: url.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl Db for MockServer {
    async fn root_exists(&mut self, root: RootRef) -> anyhow::Result<bool> {
        Ok(match root {
            RootRef::Challenge(c) => self.challenges.contains_key(&c),
            RootRef::Solution(s) => self.solutions.contains_key(&s),
        })
    }

    async fn insert_comment(
        &mut self,
        author: UserId,
        parent: Option<CommentId>,
        c: NewComment,
    ) -> anyhow::Result<Comment> {
        if !self.users.contains_key(&author) {
            return Err(anyhow!("comment author {author:?} is not in db"));
        }
        if let Some(p) = parent {
            if !self.comments.contains_key(&p) {
                return Err(anyhow!("parent comment {p:?} is not in db"));
            }
        }
        let now = Utc::now();
        let comment = Comment {
            id: CommentId(next(&mut self.last_comment_id)),
            text: c.text,
            user_id: author,
            parent_id: parent,
            root: c.root,
            created_at: now,
            updated_at: now,
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn fetch_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        Ok(self.comments.get(&id).cloned())
    }

    async fn set_comment_text(&mut self, id: CommentId, text: String) -> anyhow::Result<Comment> {
        let comment = self
            .comments
            .get_mut(&id)
            .ok_or_else(|| anyhow!("updating comment {id:?} that is not in db"))?;
        comment.text = text;
        comment.updated_at = Utc::now();
        Ok(comment.clone())
    }

    async fn list_replies(&mut self, parent: CommentId) -> anyhow::Result<Vec<CommentId>> {
        Ok(self
            .comments
            .values()
            .filter(|c| c.parent_id == Some(parent))
            .map(|c| c.id)
            .collect())
    }

    async fn remove_comment(&mut self, id: CommentId) -> anyhow::Result<()> {
        if self.comments.values().any(|c| c.parent_id == Some(id)) {
            return Err(anyhow!("removing comment {id:?} that still has replies"));
        }
        self.comments
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| anyhow!("removing comment {id:?} that is not in db"))
    }

    async fn list_comments_on(&mut self, root: RootRef) -> anyhow::Result<Vec<Comment>> {
        Ok(self
            .comments
            .values()
            .filter(|c| c.root == root)
            .cloned()
            .collect())
    }

    async fn fetch_user_profile(&mut self, user: UserId) -> anyhow::Result<Option<UserProfile>> {
        Ok(self.users.get(&user).cloned())
    }

    async fn fetch_recent_submissions(
        &mut self,
        user: UserId,
        limit: usize,
    ) -> anyhow::Result<Vec<Submission>> {
        let mut res = Vec::new();
        // ids grow with time, so walking them backwards gives the most recent first
        for (id, s) in self.submissions.iter().rev() {
            if s.user_id != user {
                continue;
            }
            if res.len() >= limit {
                break;
            }
            let challenge = self.challenges.get(&s.challenge_id).ok_or_else(|| {
                anyhow!("submission {id:?} is for challenge {:?} that is not in db", s.challenge_id)
            })?;
            res.push(Submission {
                id: *id,
                user_id: s.user_id,
                challenge: challenge.clone(),
                code: s.code.clone(),
                is_successful: s.is_successful,
                created_at: s.created_at,
            });
        }
        Ok(res)
    }
}
