use std::str::FromStr;

use anyhow::Context;
use axum::async_trait;
use dojo_api::{
    AuthToken, Challenge, ChallengeId, Comment, CommentId, Db, Difficulty, Error as ApiError,
    LinkId, NewChallenge, NewComment, NewSession, NewSolution, NewSubmission, NewUser,
    ProfileUpdate, Role, RootRef, Session, Solution, SolutionId, Submission, SubmissionId, Time,
    UserId, UserLink, UserProfile, Uuid,
};
use sqlx::Connection;

use crate::Error;

pub struct PostgresDb<'a> {
    pub conn: &'a mut sqlx::PgConnection,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    text: String,
    user_id: Uuid,
    parent_id: Option<i64>,
    root_challenge_id: Option<i64>,
    root_solution_id: Option<i64>,
    created_at: Time,
    updated_at: Time,
}

impl CommentRow {
    fn into_comment(self) -> anyhow::Result<Comment> {
        Ok(Comment {
            id: CommentId(self.id),
            root: RootRef::from_columns(self.root_challenge_id, self.root_solution_id)
                .with_context(|| format!("reading root of comment {}", self.id))?,
            text: self.text,
            user_id: UserId(self.user_id),
            parent_id: self.parent_id.map(CommentId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const COMMENT_COLUMNS: &str =
    "id, text, user_id, parent_id, root_challenge_id, root_solution_id, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChallengeRow {
    id: i64,
    slug: String,
    name: String,
    difficulty: String,
    created_at: Time,
}

impl ChallengeRow {
    fn into_challenge(self) -> anyhow::Result<Challenge> {
        Ok(Challenge {
            id: ChallengeId(self.id),
            difficulty: Difficulty::from_str(&self.difficulty)
                .with_context(|| format!("parsing difficulty of challenge {}", self.id))?,
            slug: self.slug,
            name: self.name,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    user_id: Uuid,
    code: String,
    is_successful: bool,
    created_at: Time,
    challenge_id: i64,
    challenge_slug: String,
    challenge_name: String,
    challenge_difficulty: String,
    challenge_created_at: Time,
}

impl SubmissionRow {
    fn into_submission(self) -> anyhow::Result<Submission> {
        let challenge = ChallengeRow {
            id: self.challenge_id,
            slug: self.challenge_slug,
            name: self.challenge_name,
            difficulty: self.challenge_difficulty,
            created_at: self.challenge_created_at,
        }
        .into_challenge()?;
        Ok(Submission {
            id: SubmissionId(self.id),
            user_id: UserId(self.user_id),
            challenge,
            code: self.code,
            is_successful: self.is_successful,
            created_at: self.created_at,
        })
    }
}

const SUBMISSION_QUERY: &str = "
    SELECT
        s.id, s.user_id, s.code, s.is_successful, s.created_at,
        c.id AS challenge_id,
        c.slug AS challenge_slug,
        c.name AS challenge_name,
        c.difficulty AS challenge_difficulty,
        c.created_at AS challenge_created_at
    FROM submissions s
    INNER JOIN challenges c
        ON c.id = s.challenge_id
";

#[async_trait]
impl<'a> Db for PostgresDb<'a> {
    async fn root_exists(&mut self, root: RootRef) -> anyhow::Result<bool> {
        let (table, id) = match root {
            RootRef::Challenge(c) => ("challenges", c.0),
            RootRef::Solution(s) => ("solutions", s.0),
        };
        sqlx::query_scalar::<_, bool>(&format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)"
        ))
        .bind(id)
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("checking existence of {root:?}"))
    }

    async fn insert_comment(
        &mut self,
        author: UserId,
        parent: Option<CommentId>,
        c: NewComment,
    ) -> anyhow::Result<Comment> {
        sqlx::query_as::<_, CommentRow>(&format!(
            "
                INSERT INTO comments (text, user_id, parent_id, root_challenge_id, root_solution_id)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {COMMENT_COLUMNS}
            "
        ))
        .bind(&c.text)
        .bind(author.0)
        .bind(parent.map(|p| p.0))
        .bind(c.root.challenge_id().map(|c| c.0))
        .bind(c.root.solution_id().map(|s| s.0))
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("inserting comment by {author:?} on {:?}", c.root))?
        .into_comment()
    }

    async fn fetch_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>> {
        sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?
        .map(CommentRow::into_comment)
        .transpose()
    }

    async fn set_comment_text(&mut self, id: CommentId, text: String) -> anyhow::Result<Comment> {
        sqlx::query_as::<_, CommentRow>(&format!(
            "
                UPDATE comments
                SET text = $1, updated_at = now()
                WHERE id = $2
                RETURNING {COMMENT_COLUMNS}
            "
        ))
        .bind(text)
        .bind(id.0)
        .fetch_one(&mut *self.conn)
        .await
        .with_context(|| format!("updating text of comment {id:?}"))?
        .into_comment()
    }

    async fn list_replies(&mut self, parent: CommentId) -> anyhow::Result<Vec<CommentId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM comments WHERE parent_id = $1 ORDER BY id",
        )
        .bind(parent.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing replies to comment {parent:?}"))?;
        Ok(ids.into_iter().map(CommentId).collect())
    }

    async fn remove_comment(&mut self, id: CommentId) -> anyhow::Result<()> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id.0)
            .execute(&mut *self.conn)
            .await
            .with_context(|| format!("deleting comment {id:?}"))?;
        anyhow::ensure!(
            res.rows_affected() == 1,
            "deletion of comment {:?} affected {} rows",
            id,
            res.rows_affected()
        );
        Ok(())
    }

    async fn list_comments_on(&mut self, root: RootRef) -> anyhow::Result<Vec<Comment>> {
        let (column, id) = match root {
            RootRef::Challenge(c) => ("root_challenge_id", c.0),
            RootRef::Solution(s) => ("root_solution_id", s.0),
        };
        sqlx::query_as::<_, CommentRow>(&format!(
            "
                SELECT {COMMENT_COLUMNS}
                FROM comments
                WHERE {column} = $1
                ORDER BY created_at, id
            "
        ))
        .bind(id)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("listing comments on {root:?}"))?
        .into_iter()
        .map(CommentRow::into_comment)
        .collect()
    }

    async fn fetch_user_profile(&mut self, user: UserId) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, Option<String>, Time)>(
            "SELECT id, name, role, bio, image, created_at FROM users WHERE id = $1",
        )
        .bind(user.0)
        .fetch_optional(&mut *self.conn)
        .await
        .with_context(|| format!("fetching user {user:?}"))?;
        let (id, name, role, bio, image, created_at) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let links = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, url FROM user_links WHERE user_id = $1 ORDER BY id",
        )
        .bind(user.0)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("fetching links of user {user:?}"))?
        .into_iter()
        .map(|(id, url)| UserLink { id: LinkId(id), url })
        .collect();
        Ok(Some(UserProfile {
            id: UserId(id),
            name,
            role: Role::from_str(&role).with_context(|| format!("parsing role of {user:?}"))?,
            bio,
            image,
            created_at,
            links,
        }))
    }

    async fn fetch_recent_submissions(
        &mut self,
        user: UserId,
        limit: usize,
    ) -> anyhow::Result<Vec<Submission>> {
        sqlx::query_as::<_, SubmissionRow>(&format!(
            "
                {SUBMISSION_QUERY}
                WHERE s.user_id = $1
                ORDER BY s.created_at DESC, s.id DESC
                LIMIT $2
            "
        ))
        .bind(user.0)
        .bind(i64::try_from(limit).context("submission limit does not fit in a bigint")?)
        .fetch_all(&mut *self.conn)
        .await
        .with_context(|| format!("fetching recent submissions of {user:?}"))?
        .into_iter()
        .map(SubmissionRow::into_submission)
        .collect()
    }
}

async fn insert_links(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    links: &[String],
) -> anyhow::Result<()> {
    for url in links {
        sqlx::query("INSERT INTO user_links (user_id, url) VALUES ($1, $2)")
            .bind(user.0)
            .bind(url)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting link {url:?} for {user:?}"))?;
    }
    Ok(())
}

pub async fn create_user(conn: &mut sqlx::PgConnection, u: NewUser) -> Result<(), Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let name_used =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE name = $1)")
            .bind(&u.name)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("checking whether name {:?} is used", u.name))?;
    if name_used {
        return Err(Error::Api(ApiError::NameAlreadyUsed(u.name)));
    }
    let id_used =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(u.id.0)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("checking whether {:?} is used", u.id))?;
    if id_used {
        return Err(Error::Api(ApiError::UuidAlreadyUsed(u.id.0)));
    }
    sqlx::query("INSERT INTO users (id, name, role, bio, image) VALUES ($1, $2, $3, $4, $5)")
        .bind(u.id.0)
        .bind(&u.name)
        .bind(u.role.as_str())
        .bind(&u.bio)
        .bind(&u.image)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("inserting user {:?}", u.id))?;
    insert_links(&mut *tx, u.id, &u.links).await?;
    tx.commit().await.context("committing new user")?;
    Ok(())
}

pub async fn create_session(
    conn: &mut sqlx::PgConnection,
    s: &NewSession,
) -> Result<AuthToken, Error> {
    let user_exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(s.user.0)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("checking existence of {:?}", s.user))?;
    if !user_exists {
        return Err(Error::Api(ApiError::UserNotFound(s.user)));
    }
    let token = AuthToken(Uuid::new_v4());
    sqlx::query("INSERT INTO sessions (id, user_id, device) VALUES ($1, $2, $3)")
        .bind(token.0)
        .bind(s.user.0)
        .bind(&s.device)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting session for {:?}", s.user))?;
    Ok(token)
}

pub async fn recover_session(
    conn: &mut sqlx::PgConnection,
    token: AuthToken,
) -> anyhow::Result<Option<Session>> {
    let row = sqlx::query_as::<_, (Uuid, String)>(
        "
            UPDATE sessions
            SET last_active = now()
            FROM users
            WHERE sessions.id = $1
            AND users.id = sessions.user_id
            RETURNING users.id, users.role
        ",
    )
    .bind(token.0)
    .fetch_optional(&mut *conn)
    .await
    .context("looking up session")?;
    match row {
        None => Ok(None),
        Some((user, role)) => Ok(Some(Session {
            user: UserId(user),
            role: Role::from_str(&role).with_context(|| format!("parsing role of {user}"))?,
        })),
    }
}

pub async fn logout(conn: &mut sqlx::PgConnection, token: AuthToken) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
        .bind(token.0)
        .execute(&mut *conn)
        .await
        .context("deleting session")?;
    Ok(res.rows_affected() == 1)
}

pub async fn create_challenge(
    conn: &mut sqlx::PgConnection,
    c: NewChallenge,
) -> Result<Challenge, Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let slug_used =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM challenges WHERE slug = $1)")
            .bind(&c.slug)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("checking whether slug {:?} is used", c.slug))?;
    if slug_used {
        return Err(Error::Api(ApiError::NameAlreadyUsed(c.slug)));
    }
    let challenge = sqlx::query_as::<_, ChallengeRow>(
        "
            INSERT INTO challenges (slug, name, difficulty)
            VALUES ($1, $2, $3)
            RETURNING id, slug, name, difficulty, created_at
        ",
    )
    .bind(&c.slug)
    .bind(&c.name)
    .bind(c.difficulty.as_str())
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("inserting challenge {:?}", c.slug))?
    .into_challenge()?;
    tx.commit().await.context("committing new challenge")?;
    Ok(challenge)
}

async fn fetch_challenge(
    conn: &mut sqlx::PgConnection,
    id: ChallengeId,
) -> anyhow::Result<Option<Challenge>> {
    sqlx::query_as::<_, ChallengeRow>(
        "SELECT id, slug, name, difficulty, created_at FROM challenges WHERE id = $1",
    )
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await
    .with_context(|| format!("fetching challenge {id:?}"))?
    .map(ChallengeRow::into_challenge)
    .transpose()
}

pub async fn create_solution(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    s: NewSolution,
) -> Result<Solution, Error> {
    if fetch_challenge(&mut *conn, s.challenge_id).await?.is_none() {
        return Err(Error::Api(ApiError::ChallengeNotFound(s.challenge_id)));
    }
    let (id, created_at) = sqlx::query_as::<_, (i64, Time)>(
        "
            INSERT INTO solutions (challenge_id, user_id, title, description)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
        ",
    )
    .bind(s.challenge_id.0)
    .bind(user.0)
    .bind(&s.title)
    .bind(&s.description)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("inserting solution by {user:?} to {:?}", s.challenge_id))?;
    Ok(Solution {
        id: SolutionId(id),
        challenge_id: s.challenge_id,
        user_id: user,
        title: s.title,
        description: s.description,
        created_at,
    })
}

pub async fn create_submission(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    s: NewSubmission,
) -> Result<Submission, Error> {
    let challenge = match fetch_challenge(&mut *conn, s.challenge_id).await? {
        Some(c) => c,
        None => return Err(Error::Api(ApiError::ChallengeNotFound(s.challenge_id))),
    };
    let (id, created_at) = sqlx::query_as::<_, (i64, Time)>(
        "
            INSERT INTO submissions (user_id, challenge_id, code, is_successful)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
        ",
    )
    .bind(user.0)
    .bind(s.challenge_id.0)
    .bind(&s.code)
    .bind(s.is_successful)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("inserting submission by {user:?} to {:?}", s.challenge_id))?;
    Ok(Submission {
        id: SubmissionId(id),
        user_id: user,
        challenge,
        code: s.code,
        is_successful: s.is_successful,
        created_at,
    })
}

pub async fn update_profile(
    conn: &mut sqlx::PgConnection,
    user: UserId,
    p: ProfileUpdate,
) -> Result<(), Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let res = sqlx::query("UPDATE users SET bio = $1, image = $2 WHERE id = $3")
        .bind(&p.bio)
        .bind(&p.image)
        .bind(user.0)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("updating profile of {user:?}"))?;
    if res.rows_affected() != 1 {
        return Err(Error::Api(ApiError::UserNotFound(user)));
    }
    sqlx::query("DELETE FROM user_links WHERE user_id = $1")
        .bind(user.0)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("clearing links of {user:?}"))?;
    insert_links(&mut *tx, user, &p.links).await?;
    tx.commit().await.context("committing profile update")?;
    Ok(())
}
