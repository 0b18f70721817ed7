use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use dojo_api::{AuthToken, Uuid};
use tower_http::trace::TraceLayer;

mod dashboard;
mod db;
mod error;
mod extractors;
mod fuzz;
mod handlers;

use error::Error;
use extractors::*;

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,
}

pub async fn create_sqlx_pool(db_url: &str) -> anyhow::Result<PgPool> {
    Ok(PgPool::new(
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(db_url)
            .await
            .with_context(|| format!("Error opening database {db_url:?}"))?,
    ))
}

fn admin_token() -> anyhow::Result<Option<AuthToken>> {
    match std::env::var("ADMIN_TOKEN") {
        Ok(tok) => {
            let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
            Ok(Some(AuthToken(tok)))
        }
        Err(std::env::VarError::NotPresent) => {
            tracing::warn!("ADMIN_TOKEN is not set, admin endpoints will reject all requests");
            Ok(None)
        }
        Err(e) => Err(e).context("retrieving ADMIN_TOKEN environment variable"),
    }
}

pub async fn app(db: PgPool, admin_token: Option<AuthToken>) -> Router {
    Router::new()
        .route(
            "/api/admin/create-user",
            post(handlers::admin_create_user),
        )
        .route(
            "/api/admin/create-session",
            post(handlers::admin_create_session),
        )
        .route(
            "/api/admin/create-challenge",
            post(handlers::admin_create_challenge),
        )
        .route("/api/whoami", get(handlers::whoami))
        .route("/api/unauth", post(handlers::unauth))
        .route("/api/profile", put(handlers::update_profile))
        .route("/api/solutions", post(handlers::create_solution))
        .route("/api/submissions", post(handlers::create_submission))
        .route("/api/comments", post(handlers::add_comment))
        .route(
            "/api/comments/:id",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route(
            "/api/comments/:id/replies",
            post(handlers::reply_comment),
        )
        .route(
            "/api/challenges/:id/comments",
            get(handlers::challenge_comments),
        )
        .route(
            "/api/solutions/:id/comments",
            get(handlers::solution_comments),
        )
        .route("/api/users/:id/dashboard", get(handlers::user_dashboard))
        .route("/u/:id", get(handlers::user_dashboard_page))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { db, admin_token })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let opt = <Opt as structopt::StructOpt>::from_args();
    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admin_token = admin_token()?;

    let pool = create_sqlx_pool(&db_url).await?;
    {
        let mut conn = pool
            .acquire()
            .await
            .context("getting migrator connection")?;
        MIGRATOR
            .run(&mut *conn)
            .await
            .context("applying migrations")?;
    }

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app(pool, admin_token).await.into_make_service())
        .await
        .context("serving axum webserver")
}
