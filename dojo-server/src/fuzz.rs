#![cfg(test)]

use async_recursion::async_recursion;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
};
use bolero::generator::{gen_with, TypeGenerator};
use dojo_api::{
    comment, AuthToken, Challenge, ChallengeId, Comment, CommentEdit, CommentId, CommentNode,
    Dashboard, Difficulty, Error as ApiError, NewChallenge, NewComment, NewSession, NewSolution,
    NewSubmission, NewUser, ProfileUpdate, Role, RootRef, Session, Solution, SolutionId,
    Submission, UserId, Uuid,
};
use dojo_mock_server::MockServer;
use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};
use tower::{Service, ServiceExt};

use crate::{extractors::*, *};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

/// Cluster on the most recent postgresql found in path, if any
fn build_pg_cluster(data: &Path) -> Option<postgresfixture::cluster::Cluster> {
    let mut runtime = None;
    let mut best_version = None;
    for r in postgresfixture::runtime::Runtime::find_on_path() {
        if let Ok(v) = r.version() {
            match (&mut runtime, &mut best_version) {
                (None, None) => {
                    runtime = Some(r);
                    best_version = Some(v);
                }
                (Some(runtime), Some(best_version)) => {
                    if *best_version < v {
                        *runtime = r;
                        *best_version = v;
                    }
                }
                _ => unreachable!(),
            }
        }
    }
    runtime.map(|r| postgresfixture::cluster::Cluster::new(data, r))
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                tracing_subscriber::fmt::init();
            }
            let lockfile = tempfile::tempfile().expect("creating tempfile");
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let datadir_path: &Path = datadir.as_ref();
            let cluster = match build_pg_cluster(datadir_path) {
                Some(cluster) => cluster,
                None => {
                    eprintln!(
                        "skipping {}: postgresql seems to not be installed in path",
                        stringify!($name)
                    );
                    return;
                }
            };
            let datadir_path: &str = datadir_path.to_str().expect("tempdir is not valid utf8");
            postgresfixture::coordinate::run_and_destroy(&cluster, lockfile.into(), || {
                cluster.createdb("test_db").expect("creating test_db database");
                let runtime = AssertUnwindSafe(
                    tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .expect("failed initializing tokio runtime"),
                );
                // create test db
                let pool = AssertUnwindSafe(runtime.block_on(async move {
                    let pool = create_sqlx_pool(&format!("postgresql://?host={}&dbname=test_db", datadir_path)).await.expect("creating sqlx pool");
                    MIGRATOR
                        .run(&mut *pool.acquire().await.expect("getting migrator connection"))
                        .await
                        .expect("failed applying migrations");
                    pool
                }));
                bolero::check!()
                    .with_generator($gen)
                    .cloned()
                    .for_each(move |v| {
                        let pool = pool.clone();
                        // run the test
                        let idle_before = pool.num_idle();
                        let v_str = format!("{v:?}");
                        let idle_after_res: Result<usize, _> = {
                            let pool = pool.clone();
                            std::panic::catch_unwind(AssertUnwindSafe(|| {
                                runtime.block_on(async move {
                                    let () = $fn(pool.clone(), v).await;
                                    let mut idle_after = pool.num_idle();
                                    let wait_release_since = std::time::Instant::now();
                                    while idle_after < idle_before
                                        && wait_release_since.elapsed()
                                            <= std::time::Duration::from_secs(1)
                                    {
                                        tokio::task::yield_now().await;
                                        idle_after = pool.num_idle();
                                    }
                                    idle_after
                                })
                            }))
                        };
                        runtime.block_on(async move {
                            // cleanup
                            let mut conn =
                                pool.acquire().await.expect("getting db cleanup connection");
                            sqlx::query(include_str!("../reset-test-db.sql"))
                                .execute(&mut *conn)
                                .await
                                .expect("failed cleaning up database");
                        });
                        // resume the panics
                        match idle_after_res {
                            Err(e) => std::panic::resume_unwind(e),
                            Ok(idle_after) => assert!(
                                idle_after >= idle_before,
                                "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                                stringify!($name)
                            ),
                        }
                    });
            })
            .expect("coordinating spinup and shutdown of the pg cluster");
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::Unauthorized)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[test]
fn preauth_accepts_bearer_tokens() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("failed initializing tokio runtime");
    let token = Uuid::new_v4();
    for (header, expected) in [
        (format!("Bearer {token}"), Some(token)),
        (format!("bearer {token}"), Some(token)),
        (format!("Basic {token}"), None),
        (format!("Bearer {token} extra"), None),
        (String::from("Bearer not-a-uuid"), None),
    ] {
        let mut req = http::Request::builder()
            .header(http::header::AUTHORIZATION, header)
            .body(())
            .unwrap()
            .into_parts()
            .0;
        let res = runtime.block_on(PreAuth::from_request_parts(&mut req, &()));
        assert_eq!(res.ok().map(|t| t.0 .0), expected);
    }
}

#[derive(Clone, Copy, Debug, TypeGenerator)]
enum FuzzRoot {
    Challenge(u8),
    Solution(u8),
}

impl FuzzRoot {
    fn root(self) -> RootRef {
        match self {
            FuzzRoot::Challenge(c) => RootRef::Challenge(ChallengeId(i64::from(c))),
            FuzzRoot::Solution(s) => RootRef::Solution(SolutionId(i64::from(s))),
        }
    }
}

// TODO: also generate requests that fail to deserialize on the server side
#[derive(Clone, Debug, TypeGenerator)]
enum FuzzOp {
    CreateUser {
        #[generator(gen_with::<String>().len(1..20usize))]
        name: String,
        role: u8,
        reuse_id: Option<usize>,
        links: Vec<String>,
    },
    CreateSession {
        uid: usize,
        #[generator(gen_with::<String>().len(1..100usize))]
        device: String,
    },
    Unauth {
        sid: usize,
    },
    Whoami {
        sid: usize,
    },
    CreateChallenge {
        #[generator(gen_with::<String>().len(1..20usize))]
        slug: String,
        difficulty: u8,
    },
    CreateSolution {
        sid: usize,
        challenge: u8,
        title: String,
    },
    CreateSubmission {
        sid: usize,
        challenge: u8,
        code: String,
        is_successful: bool,
    },
    UpdateProfile {
        sid: usize,
        bio: String,
        image: Option<String>,
        links: Vec<String>,
    },
    AddComment {
        sid: Option<usize>,
        root: FuzzRoot,
        text: String,
    },
    ReplyComment {
        sid: Option<usize>,
        root: FuzzRoot,
        parent: u8,
        text: String,
    },
    UpdateComment {
        sid: Option<usize>,
        id: u8,
        text: String,
    },
    DeleteComment {
        sid: Option<usize>,
        id: u8,
    },
    ListComments {
        root: FuzzRoot,
    },
    FetchDashboard {
        sid: Option<usize>,
        uid: Option<usize>,
    },
}

async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status == http::StatusCode::OK {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        } else {
            return Ok(serde_json::from_slice(&body).unwrap_or_else(|err| {
                panic!(
                    r#"
                        Failed parsing resp body!

                        The error is the following:
                        ---
                        {err}
                        ---

                        Response body is:
                        ---
                        {body:?}
                        ---

                        Request was:
                        ---
                        {req_body:?}
                        ---
                    "#
                )
            }));
        }
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<AuthToken>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {}", token.0)),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

// Timestamps are set independently by the app and the mock, so they are left out of comparisons

type CommentKey = (CommentId, String, UserId, Option<CommentId>, RootRef);

fn comment_key(c: Comment) -> CommentKey {
    (c.id, c.text, c.user_id, c.parent_id, c.root)
}

fn challenge_key(c: Challenge) -> (ChallengeId, String, String, Difficulty) {
    (c.id, c.slug, c.name, c.difficulty)
}

fn solution_key(s: Solution) -> (SolutionId, ChallengeId, UserId, String, String) {
    (s.id, s.challenge_id, s.user_id, s.title, s.description)
}

fn submission_key(s: Submission) -> (i64, UserId, ChallengeId, String, bool) {
    (s.id.0, s.user_id, s.challenge.id, s.code, s.is_successful)
}

/// Threads flattened depth-first, with the depth of each comment
fn threads_key(threads: Vec<CommentNode>) -> Vec<(usize, CommentKey)> {
    let mut res = Vec::new();
    let mut stack = threads.into_iter().rev().map(|n| (0, n)).collect::<Vec<_>>();
    while let Some((depth, node)) = stack.pop() {
        stack.extend(node.replies.into_iter().rev().map(|n| (depth + 1, n)));
        res.push((depth, comment_key(node.comment)));
    }
    res
}

fn dashboard_key(d: Option<Dashboard>) -> Option<impl Debug + PartialEq> {
    d.map(|d| {
        (
            (d.user.id, d.user.name, d.user.role, d.user.bio, d.user.image),
            d.avatar,
            d.can_edit_profile,
            d.links,
            d.tabs,
            d.default_tab,
            d.in_progress
                .into_iter()
                .map(submission_key)
                .collect::<Vec<_>>(),
            d.solutions.into_iter().map(submission_key).collect::<Vec<_>>(),
        )
    })
}

#[derive(Clone, Copy)]
struct FuzzSession {
    app: AuthToken,
    mock: AuthToken,
}

struct ComparativeFuzzer {
    admin_token: AuthToken,
    app: Router,
    mock: MockServer,
    sessions: Vec<FuzzSession>,
}

impl ComparativeFuzzer {
    async fn new(pool: PgPool) -> ComparativeFuzzer {
        let admin_token = AuthToken(Uuid::new_v4());
        let app = app(pool, Some(admin_token)).await;
        let mock = MockServer::new();
        let sessions = Vec::new();
        ComparativeFuzzer {
            admin_token,
            app,
            mock,
            sessions,
        }
    }

    fn session(&self, sid: usize) -> Option<FuzzSession> {
        resize_int(sid, ..self.sessions.len()).map(|sid| self.sessions[sid])
    }

    /// Picks a session, or `None` for an anonymous caller
    fn maybe_session(&self, sid: Option<usize>) -> (Option<AuthToken>, Option<Session>) {
        match sid.and_then(|sid| self.session(sid)) {
            None => (None, None),
            Some(s) => (Some(s.app), self.mock.resolve(s.mock)),
        }
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser {
                name,
                role,
                reuse_id,
                links,
            } => {
                let id = match reuse_id.and_then(|i| resize_int(i, ..self.mock.test_num_users())) {
                    Some(i) => self.mock.test_get_user(i),
                    None => UserId(Uuid::new_v4()),
                };
                let mut new_user = NewUser::new(id, name);
                new_user.role = match role % 3 {
                    0 => Role::User,
                    1 => Role::Moderator,
                    _ => Role::Admin,
                };
                new_user.links = links;
                compare(
                    "CreateUser",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-user",
                        Some(self.admin_token),
                        &new_user,
                    )
                    .await,
                    self.mock.admin_create_user(new_user),
                )
            }
            FuzzOp::CreateSession { uid, device } => {
                if let Some(uid) = resize_int(uid, ..self.mock.test_num_users()) {
                    let session = NewSession {
                        user: self.mock.test_get_user(uid),
                        device,
                    };
                    let app_tok: Result<AuthToken, _> = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-session",
                        Some(self.admin_token),
                        &session,
                    )
                    .await;
                    let mock_tok = self.mock.admin_create_session(session);
                    if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                        self.sessions.push(FuzzSession { app, mock });
                    }
                    compare(
                        "CreateSession",
                        app_tok.map(|_| ()),
                        mock_tok.map(|_| ()),
                    );
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser {
                        name: format!("user{}", self.sessions.len()),
                        role: 0,
                        reuse_id: None,
                        links: Vec::new(),
                    })
                    .await;
                    self.execute_fuzz_op(FuzzOp::CreateSession { uid, device })
                        .await;
                }
            }
            FuzzOp::Unauth { sid } => {
                if let Some(s) = self.session(sid) {
                    compare(
                        "Unauth",
                        run_on_app(&mut self.app, "POST", "/api/unauth", Some(s.app), &()).await,
                        self.mock.unauth(s.mock),
                    );
                }
            }
            FuzzOp::Whoami { sid } => {
                if let Some(s) = self.session(sid) {
                    compare(
                        "Whoami",
                        run_on_app(&mut self.app, "GET", "/api/whoami", Some(s.app), &()).await,
                        self.mock.whoami(s.mock),
                    );
                }
            }
            FuzzOp::CreateChallenge { slug, difficulty } => {
                let data = NewChallenge {
                    name: slug.clone(),
                    slug,
                    difficulty: match difficulty % 5 {
                        0 => Difficulty::Beginner,
                        1 => Difficulty::Easy,
                        2 => Difficulty::Medium,
                        3 => Difficulty::Hard,
                        _ => Difficulty::Extreme,
                    },
                };
                compare(
                    "CreateChallenge",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-challenge",
                        Some(self.admin_token),
                        &data,
                    )
                    .await
                    .map(challenge_key),
                    self.mock.admin_create_challenge(data).map(challenge_key),
                );
            }
            FuzzOp::CreateSolution {
                sid,
                challenge,
                title,
            } => {
                if let Some(s) = self.session(sid) {
                    let data = NewSolution {
                        challenge_id: ChallengeId(i64::from(challenge)),
                        title,
                        description: String::new(),
                    };
                    let app_res =
                        run_on_app(&mut self.app, "POST", "/api/solutions", Some(s.app), &data)
                            .await;
                    let mock_res = match self.mock.resolve(s.mock) {
                        Some(session) => self.mock.create_solution(&session, data),
                        None => Err(ApiError::Unauthorized),
                    };
                    compare(
                        "CreateSolution",
                        app_res.map(solution_key),
                        mock_res.map(solution_key),
                    );
                }
            }
            FuzzOp::CreateSubmission {
                sid,
                challenge,
                code,
                is_successful,
            } => {
                if let Some(s) = self.session(sid) {
                    let data = NewSubmission {
                        challenge_id: ChallengeId(i64::from(challenge)),
                        code,
                        is_successful,
                    };
                    let app_res =
                        run_on_app(&mut self.app, "POST", "/api/submissions", Some(s.app), &data)
                            .await;
                    let mock_res = match self.mock.resolve(s.mock) {
                        Some(session) => self.mock.create_submission(&session, data),
                        None => Err(ApiError::Unauthorized),
                    };
                    compare(
                        "CreateSubmission",
                        app_res.map(submission_key),
                        mock_res.map(submission_key),
                    );
                }
            }
            FuzzOp::UpdateProfile {
                sid,
                bio,
                image,
                links,
            } => {
                if let Some(s) = self.session(sid) {
                    let data = ProfileUpdate { bio, image, links };
                    let app_res =
                        run_on_app(&mut self.app, "PUT", "/api/profile", Some(s.app), &data).await;
                    let mock_res = match self.mock.resolve(s.mock) {
                        Some(session) => self.mock.update_profile(&session, data),
                        None => Err(ApiError::Unauthorized),
                    };
                    compare("UpdateProfile", app_res, mock_res);
                }
            }
            FuzzOp::AddComment { sid, root, text } => {
                let (tok, session) = self.maybe_session(sid);
                let data = NewComment {
                    text,
                    root: root.root(),
                };
                let app_res = run_on_app(&mut self.app, "POST", "/api/comments", tok, &data).await;
                let mock_res = comment::add_comment(&mut self.mock, session.as_ref(), data)
                    .await
                    .expect("mock add_comment failed");
                compare(
                    "AddComment",
                    app_res.map(comment_key),
                    mock_res.map(comment_key),
                );
            }
            FuzzOp::ReplyComment {
                sid,
                root,
                parent,
                text,
            } => {
                let (tok, session) = self.maybe_session(sid);
                let data = NewComment {
                    text,
                    root: root.root(),
                };
                let parent = CommentId(i64::from(parent));
                let app_res = run_on_app(
                    &mut self.app,
                    "POST",
                    &format!("/api/comments/{}/replies", parent.0),
                    tok,
                    &data,
                )
                .await;
                let mock_res =
                    comment::reply_comment(&mut self.mock, session.as_ref(), data, parent)
                        .await
                        .expect("mock reply_comment failed");
                compare(
                    "ReplyComment",
                    app_res.map(comment_key),
                    mock_res.map(comment_key),
                );
            }
            FuzzOp::UpdateComment { sid, id, text } => {
                let (tok, session) = self.maybe_session(sid);
                let data = CommentEdit { text };
                let app_res = run_on_app(
                    &mut self.app,
                    "PUT",
                    &format!("/api/comments/{id}"),
                    tok,
                    &data,
                )
                .await;
                let mock_res = comment::update_comment(
                    &mut self.mock,
                    session.as_ref(),
                    data.text,
                    CommentId(i64::from(id)),
                )
                .await
                .expect("mock update_comment failed");
                compare(
                    "UpdateComment",
                    app_res.map(comment_key),
                    mock_res.map(comment_key),
                );
            }
            FuzzOp::DeleteComment { sid, id } => {
                let (tok, session) = self.maybe_session(sid);
                let app_res = run_on_app(
                    &mut self.app,
                    "DELETE",
                    &format!("/api/comments/{id}"),
                    tok,
                    &(),
                )
                .await;
                let target = Some(i64::from(id)).filter(|id| *id > 0).map(CommentId);
                let mock_res = comment::delete_comment(&mut self.mock, session.as_ref(), target)
                    .await
                    .expect("mock delete_comment failed");
                compare("DeleteComment", app_res, mock_res);
            }
            FuzzOp::ListComments { root } => {
                let root = root.root();
                let uri = match root {
                    RootRef::Challenge(c) => format!("/api/challenges/{}/comments", c.0),
                    RootRef::Solution(s) => format!("/api/solutions/{}/comments", s.0),
                };
                let app_res: Result<Vec<CommentNode>, _> =
                    run_on_app(&mut self.app, "GET", &uri, None, &()).await;
                let mock_res = comment::list_comments(&mut self.mock, root)
                    .await
                    .expect("mock list_comments failed");
                compare(
                    "ListComments",
                    app_res.map(threads_key),
                    Ok(threads_key(comment::build_tree(mock_res))),
                );
            }
            FuzzOp::FetchDashboard { sid, uid } => {
                let (tok, session) = self.maybe_session(sid);
                let user = match uid.and_then(|i| resize_int(i, ..self.mock.test_num_users())) {
                    Some(i) => self.mock.test_get_user(i),
                    None => UserId(Uuid::new_v4()),
                };
                let app_res: Result<Option<Dashboard>, _> = run_on_app(
                    &mut self.app,
                    "GET",
                    &format!("/api/users/{}/dashboard", user.0),
                    tok,
                    &(),
                )
                .await;
                let mock_res = dojo_api::dashboard::load_dashboard(
                    &mut self.mock,
                    session.as_ref(),
                    user,
                    chrono::Utc::now(),
                )
                .await
                .expect("mock load_dashboard failed");
                compare(
                    "FetchDashboard",
                    app_res.map(dashboard_key),
                    Ok(dashboard_key(mock_res)),
                );
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    gen_with::<Vec<FuzzOp>>().len(1..100usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool).await;
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
    }
);
