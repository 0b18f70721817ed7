use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use dojo_api::{AuthToken, Session, Uuid};

use crate::{db, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: PgPool,
    pub admin_token: Option<AuthToken>,
}

#[derive(Clone)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    pub fn new(pool: sqlx::PgPool) -> PgPool {
        PgPool(pool)
    }

    pub async fn acquire(&self) -> Result<PgConn, Error> {
        Ok(PgConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }

    pub fn num_idle(&self) -> usize {
        self.0.num_idle()
    }
}

pub struct PgConn(sqlx::pool::PoolConnection<sqlx::Postgres>);

#[async_trait]
impl FromRequestParts<AppState> for PgConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<PgConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for PgConn {
    type Target = sqlx::PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PgConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Bearer token of the request, not yet checked against the sessions table
pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::unauthorized()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::unauthorized())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::unauthorized())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::unauthorized());
                }
                let token = auth.next().ok_or(Error::unauthorized())?;
                if auth.next().is_some() {
                    return Err(Error::unauthorized());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::unauthorized())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

pub struct Auth(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = PgConn::from_request_parts(req, state).await?;
        db::recover_session(&mut *conn, token)
            .await
            .with_context(|| format!("recovering session for {token:?}"))?
            .map(Auth)
            .ok_or(Error::unauthorized())
    }
}

/// Session of the caller, if any
///
/// Requests without a valid session are let through with `None`, leaving it to the
/// operation to decide what an anonymous caller may do.
pub struct MaybeAuth(pub Option<Session>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<MaybeAuth, Error> {
        match Auth::from_request_parts(req, state).await {
            Ok(Auth(session)) => Ok(MaybeAuth(Some(session))),
            Err(Error::Api(_)) => Ok(MaybeAuth(None)),
            Err(e) => Err(e),
        }
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::unauthorized())
        }
    }
}
