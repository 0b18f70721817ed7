use dojo_api::{
    comment::{self, add_comment, delete_comment, reply_comment, update_comment},
    ChallengeId, CommentId, Difficulty, Error, NewChallenge, NewComment, NewSession, NewSolution,
    NewUser, Role, RootRef, Session, SolutionId, UserId, Uuid,
};
use dojo_mock_server::MockServer;

struct Fixture {
    mock: MockServer,
    alice: Session,
    bob: Session,
    moderator: Session,
    admin: Session,
}

fn user(mock: &mut MockServer, name: &str, role: Role) -> Session {
    let id = UserId(Uuid::new_v4());
    let mut u = NewUser::new(id, String::from(name));
    u.role = role;
    mock.admin_create_user(u).expect("creating user");
    let tok = mock
        .admin_create_session(NewSession {
            user: id,
            device: String::from("test"),
        })
        .expect("creating session");
    mock.resolve(tok).expect("resolving fresh session")
}

/// Five challenges and seven solutions, so that the ids used below exist
fn fixture() -> Fixture {
    let mut mock = MockServer::new();
    let alice = user(&mut mock, "alice", Role::User);
    let bob = user(&mut mock, "bob", Role::User);
    let moderator = user(&mut mock, "mod", Role::Moderator);
    let admin = user(&mut mock, "admin", Role::Admin);
    for i in 1..=5 {
        mock.admin_create_challenge(NewChallenge {
            slug: format!("challenge-{i}"),
            name: format!("Challenge {i}"),
            difficulty: Difficulty::Easy,
        })
        .expect("creating challenge");
    }
    for i in 1..=7 {
        mock.create_solution(
            &alice,
            NewSolution {
                challenge_id: ChallengeId(1),
                title: format!("Solution {i}"),
                description: String::new(),
            },
        )
        .expect("creating solution");
    }
    Fixture {
        mock,
        alice,
        bob,
        moderator,
        admin,
    }
}

fn on(root: RootRef, text: &str) -> NewComment {
    NewComment {
        text: String::from(text),
        root,
    }
}

const CHALLENGE_5: RootRef = RootRef::Challenge(ChallengeId(5));
const SOLUTION_7: RootRef = RootRef::Solution(SolutionId(7));

async fn add(
    mock: &mut MockServer,
    s: Session,
    root: RootRef,
    parent: Option<CommentId>,
) -> CommentId {
    let res = match parent {
        None => add_comment(mock, Some(&s), on(root, "text")).await,
        Some(p) => reply_comment(mock, Some(&s), on(root, "text"), p).await,
    };
    res.expect("db failure").expect("adding comment").id
}

#[tokio::test]
async fn unauthenticated_callers_cannot_write() {
    let mut f = fixture();
    let existing = add(&mut f.mock, f.alice, CHALLENGE_5, None).await;
    let before = f.mock.clone();

    let res = add_comment(&mut f.mock, None, on(CHALLENGE_5, "hi")).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    let res = reply_comment(&mut f.mock, None, on(CHALLENGE_5, "hi"), existing).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    let res = update_comment(&mut f.mock, None, String::from("hi"), existing).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    let res = delete_comment(&mut f.mock, None, Some(existing)).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    // the session check comes before any other
    let res = add_comment(&mut f.mock, None, on(CHALLENGE_5, "")).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    let res = delete_comment(&mut f.mock, None, None).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));

    assert_eq!(f.mock, before);
}

#[tokio::test]
async fn empty_text_is_rejected() {
    let mut f = fixture();
    let existing = add(&mut f.mock, f.alice, CHALLENGE_5, None).await;
    let before = f.mock.clone();

    let res = add_comment(&mut f.mock, Some(&f.alice), on(CHALLENGE_5, "")).await;
    assert_eq!(res.unwrap(), Err(Error::EmptyText));
    let res = reply_comment(&mut f.mock, Some(&f.alice), on(CHALLENGE_5, ""), existing).await;
    assert_eq!(res.unwrap(), Err(Error::EmptyText));
    let res = update_comment(&mut f.mock, Some(&f.alice), String::new(), existing).await;
    assert_eq!(res.unwrap(), Err(Error::EmptyText));

    assert_eq!(f.mock, before);
    assert_eq!(f.mock.test_comment(existing).unwrap().text, "text");
}

#[tokio::test]
async fn whitespace_is_not_empty() {
    let mut f = fixture();
    let res = add_comment(&mut f.mock, Some(&f.alice), on(CHALLENGE_5, " ")).await;
    assert_eq!(res.unwrap().unwrap().text, " ");
}

#[tokio::test]
async fn add_comment_on_challenge() {
    let mut f = fixture();
    let c = add_comment(&mut f.mock, Some(&f.alice), on(CHALLENGE_5, "hi"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.text, "hi");
    assert_eq!(c.root.challenge_id(), Some(ChallengeId(5)));
    assert_eq!(c.root.solution_id(), None);
    assert_eq!(c.user_id, f.alice.user);
    assert_eq!(c.parent_id, None);
    assert_eq!(f.mock.test_comment(c.id), Some(&c));
}

#[tokio::test]
async fn add_comment_on_missing_root() {
    let mut f = fixture();
    let before = f.mock.clone();
    let root = RootRef::Solution(SolutionId(8));
    let res = add_comment(&mut f.mock, Some(&f.alice), on(root, "hi")).await;
    assert_eq!(res.unwrap(), Err(Error::RootNotFound(root)));
    assert_eq!(f.mock, before);
}

#[tokio::test]
async fn reply_on_solution() {
    let mut f = fixture();
    for _ in 0..3 {
        add(&mut f.mock, f.bob, SOLUTION_7, None).await;
    }
    let c = reply_comment(&mut f.mock, Some(&f.alice), on(SOLUTION_7, "hi"), CommentId(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.root.solution_id(), Some(SolutionId(7)));
    assert_eq!(c.root.challenge_id(), None);
    assert_eq!(c.parent_id, Some(CommentId(3)));
    assert_eq!(c.user_id, f.alice.user);
}

#[tokio::test]
async fn reply_needs_matching_parent() {
    let mut f = fixture();
    let parent = add(&mut f.mock, f.bob, SOLUTION_7, None).await;
    let before = f.mock.clone();

    let res = reply_comment(&mut f.mock, Some(&f.alice), on(CHALLENGE_5, "hi"), parent).await;
    assert_eq!(res.unwrap(), Err(Error::InvalidComment));
    let res = reply_comment(&mut f.mock, Some(&f.alice), on(SOLUTION_7, "hi"), CommentId(42)).await;
    assert_eq!(res.unwrap(), Err(Error::CommentNotFound(CommentId(42))));

    assert_eq!(f.mock, before);
}

#[tokio::test]
async fn update_by_author_or_moderator_only() {
    let mut f = fixture();
    let id = add(&mut f.mock, f.alice, CHALLENGE_5, None).await;

    let res = update_comment(&mut f.mock, Some(&f.bob), String::from("bob was here"), id).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    assert_eq!(f.mock.test_comment(id).unwrap().text, "text");

    let c = update_comment(&mut f.mock, Some(&f.alice), String::from("edited"), id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.text, "edited");
    assert_eq!(c.user_id, f.alice.user);

    let c = update_comment(&mut f.mock, Some(&f.moderator), String::from("moderated"), id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(c.text, "moderated");
    // moderating does not take over authorship
    assert_eq!(c.user_id, f.alice.user);
    assert_eq!(f.mock.test_comment(id), Some(&c));
}

#[tokio::test]
async fn update_missing_comment() {
    let mut f = fixture();
    let res = update_comment(&mut f.mock, Some(&f.admin), String::from("hi"), CommentId(9)).await;
    assert_eq!(res.unwrap(), Err(Error::CommentNotFound(CommentId(9))));
}

#[tokio::test]
async fn delete_removes_whole_subtree_leaves_first() {
    let mut f = fixture();
    let unrelated = add(&mut f.mock, f.bob, CHALLENGE_5, None).await;
    let root = add(&mut f.mock, f.alice, CHALLENGE_5, None).await;
    let a = add(&mut f.mock, f.bob, CHALLENGE_5, Some(root)).await;
    let b = add(&mut f.mock, f.alice, CHALLENGE_5, Some(root)).await;
    let a1 = add(&mut f.mock, f.alice, CHALLENGE_5, Some(a)).await;
    let b1 = add(&mut f.mock, f.bob, CHALLENGE_5, Some(b)).await;
    let sibling_reply = add(&mut f.mock, f.alice, CHALLENGE_5, Some(unrelated)).await;

    let removed = delete_comment(&mut f.mock, Some(&f.alice), Some(root))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(removed.len(), 5);
    let pos = |id| removed.iter().position(|r| *r == id).expect("comment removed");
    assert!(pos(a1) < pos(a));
    assert!(pos(b1) < pos(b));
    assert!(pos(a) < pos(root) && pos(b) < pos(root));
    assert_eq!(*removed.last().unwrap(), root);
    for id in [root, a, b, a1, b1] {
        assert_eq!(f.mock.test_comment(id), None);
    }
    assert!(f.mock.test_comment(unrelated).is_some());
    assert!(f.mock.test_comment(sibling_reply).is_some());
    assert_eq!(f.mock.test_num_comments(), 2);
}

#[tokio::test]
async fn delete_authorization() {
    let mut f = fixture();
    let id = add(&mut f.mock, f.alice, CHALLENGE_5, None).await;
    let reply = add(&mut f.mock, f.bob, CHALLENGE_5, Some(id)).await;
    let before = f.mock.clone();

    // authorship is checked against the deleted comment only
    let res = delete_comment(&mut f.mock, Some(&f.bob), Some(id)).await;
    assert_eq!(res.unwrap(), Err(Error::Unauthorized));
    assert_eq!(f.mock, before);

    let res = delete_comment(&mut f.mock, Some(&f.admin), Some(id)).await;
    assert_eq!(res.unwrap(), Ok(vec![reply, id]));
    assert_eq!(f.mock.test_num_comments(), 0);
}

#[tokio::test]
async fn delete_needs_an_existing_comment() {
    let mut f = fixture();
    let res = delete_comment(&mut f.mock, Some(&f.alice), None).await;
    assert_eq!(res.unwrap(), Err(Error::InvalidComment));
    let res = delete_comment(&mut f.mock, Some(&f.alice), Some(CommentId(12))).await;
    assert_eq!(res.unwrap(), Err(Error::CommentNotFound(CommentId(12))));
}

#[tokio::test]
async fn listing_builds_threads_per_root() {
    let mut f = fixture();
    let first = add(&mut f.mock, f.alice, SOLUTION_7, None).await;
    add(&mut f.mock, f.bob, CHALLENGE_5, None).await;
    let reply = add(&mut f.mock, f.bob, SOLUTION_7, Some(first)).await;
    let second = add(&mut f.mock, f.bob, SOLUTION_7, None).await;

    let comments = comment::list_comments(&mut f.mock, SOLUTION_7).await.unwrap();
    assert_eq!(comments.len(), 3);
    let tree = comment::build_tree(comments);
    assert_eq!(
        tree.iter().map(|n| n.comment.id).collect::<Vec<_>>(),
        vec![first, second]
    );
    assert_eq!(tree[0].replies.len(), 1);
    assert_eq!(tree[0].replies[0].comment.id, reply);
    assert!(tree[1].replies.is_empty());
}
