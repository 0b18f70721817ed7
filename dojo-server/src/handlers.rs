use std::collections::HashMap;

use anyhow::Context;
use axum::{
    extract::{Path, Query},
    response::Html,
    Json,
};
use chrono::Utc;
use dojo_api::{
    comment, dashboard, AuthToken, Challenge, ChallengeId, Comment, CommentEdit, CommentId,
    CommentNode, Dashboard, Error as ApiError, NewChallenge, NewComment, NewSession, NewSolution,
    NewSubmission, NewUser, ProfileUpdate, RootRef, Session, Solution, SolutionId, Submission,
    TabKind, UserId, Uuid,
};
use sqlx::Connection;

use crate::{db, extractors::*, Error};

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    data.validate()?;
    db::create_user(&mut *conn, data).await
}

pub async fn admin_create_session(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    data.validate()?;
    Ok(Json(db::create_session(&mut *conn, &data).await?))
}

pub async fn admin_create_challenge(
    AdminAuth: AdminAuth,
    mut conn: PgConn,
    Json(data): Json<NewChallenge>,
) -> Result<Json<Challenge>, Error> {
    data.validate()?;
    Ok(Json(db::create_challenge(&mut *conn, data).await?))
}

pub async fn whoami(Auth(session): Auth) -> Json<Session> {
    Json(session)
}

pub async fn unauth(token: PreAuth, mut conn: PgConn) -> Result<(), Error> {
    match db::logout(&mut *conn, token.0).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::unauthorized()),
        Err(e) => Err(Error::Anyhow(e)),
    }
}

pub async fn update_profile(
    Auth(session): Auth,
    mut conn: PgConn,
    Json(data): Json<ProfileUpdate>,
) -> Result<(), Error> {
    data.validate()?;
    db::update_profile(&mut *conn, session.user, data).await
}

pub async fn create_solution(
    Auth(session): Auth,
    mut conn: PgConn,
    Json(data): Json<NewSolution>,
) -> Result<Json<Solution>, Error> {
    data.validate()?;
    Ok(Json(db::create_solution(&mut *conn, session.user, data).await?))
}

pub async fn create_submission(
    Auth(session): Auth,
    mut conn: PgConn,
    Json(data): Json<NewSubmission>,
) -> Result<Json<Submission>, Error> {
    data.validate()?;
    Ok(Json(
        db::create_submission(&mut *conn, session.user, data).await?,
    ))
}

/// Commits `tx` if the operation went through, and rolls it back otherwise
async fn finish<T>(
    tx: sqlx::Transaction<'_, sqlx::Postgres>,
    res: Result<T, ApiError>,
) -> Result<T, Error> {
    match res {
        Ok(res) => {
            tx.commit().await.context("committing transaction")?;
            Ok(res)
        }
        Err(e) => {
            tx.rollback().await.context("rolling back transaction")?;
            Err(Error::Api(e))
        }
    }
}

pub async fn add_comment(
    MaybeAuth(session): MaybeAuth,
    mut conn: PgConn,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let res = comment::add_comment(
        &mut db::PostgresDb { conn: &mut *tx },
        session.as_ref(),
        data,
    )
    .await
    .context("adding comment")?;
    Ok(Json(finish(tx, res).await?))
}

pub async fn reply_comment(
    MaybeAuth(session): MaybeAuth,
    mut conn: PgConn,
    Path(parent): Path<i64>,
    Json(data): Json<NewComment>,
) -> Result<Json<Comment>, Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let res = comment::reply_comment(
        &mut db::PostgresDb { conn: &mut *tx },
        session.as_ref(),
        data,
        CommentId(parent),
    )
    .await
    .with_context(|| format!("replying to comment {parent}"))?;
    Ok(Json(finish(tx, res).await?))
}

pub async fn update_comment(
    MaybeAuth(session): MaybeAuth,
    mut conn: PgConn,
    Path(id): Path<i64>,
    Json(data): Json<CommentEdit>,
) -> Result<Json<Comment>, Error> {
    let mut tx = conn.begin().await.context("opening transaction")?;
    let res = comment::update_comment(
        &mut db::PostgresDb { conn: &mut *tx },
        session.as_ref(),
        data.text,
        CommentId(id),
    )
    .await
    .with_context(|| format!("updating comment {id}"))?;
    Ok(Json(finish(tx, res).await?))
}

pub async fn delete_comment(
    MaybeAuth(session): MaybeAuth,
    mut conn: PgConn,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CommentId>>, Error> {
    // ids are allocated from 1 up, anything else is not a comment id at all
    let target = Some(id).filter(|id| *id > 0).map(CommentId);
    let mut tx = conn.begin().await.context("opening transaction")?;
    let res = comment::delete_comment(
        &mut db::PostgresDb { conn: &mut *tx },
        session.as_ref(),
        target,
    )
    .await
    .with_context(|| format!("deleting comment {id}"))?;
    Ok(Json(finish(tx, res).await?))
}

async fn comment_threads(
    conn: &mut PgConn,
    root: RootRef,
) -> Result<Json<Vec<CommentNode>>, Error> {
    let comments = comment::list_comments(&mut db::PostgresDb { conn: &mut **conn }, root)
        .await
        .with_context(|| format!("listing comments on {root:?}"))?;
    Ok(Json(comment::build_tree(comments)))
}

pub async fn challenge_comments(
    mut conn: PgConn,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CommentNode>>, Error> {
    comment_threads(&mut conn, RootRef::Challenge(ChallengeId(id))).await
}

pub async fn solution_comments(
    mut conn: PgConn,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CommentNode>>, Error> {
    comment_threads(&mut conn, RootRef::Solution(SolutionId(id))).await
}

async fn load_dashboard(
    conn: &mut PgConn,
    viewer: Option<Session>,
    user: Uuid,
) -> Result<Option<Dashboard>, Error> {
    Ok(dashboard::load_dashboard(
        &mut db::PostgresDb { conn: &mut **conn },
        viewer.as_ref(),
        UserId(user),
        Utc::now(),
    )
    .await?)
}

pub async fn user_dashboard(
    MaybeAuth(viewer): MaybeAuth,
    mut conn: PgConn,
    Path(user): Path<Uuid>,
) -> Result<Json<Option<Dashboard>>, Error> {
    Ok(Json(load_dashboard(&mut conn, viewer, user).await?))
}

/// `?tab=<value>` picks the tab shown, unknown or disabled tabs are ignored
pub async fn user_dashboard_page(
    MaybeAuth(viewer): MaybeAuth,
    mut conn: PgConn,
    Path(user): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, Error> {
    let mut d = load_dashboard(&mut conn, viewer, user).await?;
    if let (Some(d), Some(tab)) = (
        d.as_mut(),
        params.get("tab").and_then(|t| TabKind::from_value(t)),
    ) {
        d.select_tab(tab);
    }
    Ok(Html(crate::dashboard::render(d.as_ref(), Utc::now())))
}
