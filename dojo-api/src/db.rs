use async_trait::async_trait;

use crate::{Comment, CommentId, NewComment, RootRef, Submission, UserId, UserProfile};

/// Storage needed by the comment and dashboard operations
///
/// Implementations are expected to run every call of a single operation inside one
/// transaction, so that a failure halfway through (eg. during a cascade delete) leaves
/// no partial state behind.
#[async_trait]
pub trait Db {
    async fn root_exists(&mut self, root: RootRef) -> anyhow::Result<bool>;
    async fn insert_comment(
        &mut self,
        author: UserId,
        parent: Option<CommentId>,
        c: NewComment,
    ) -> anyhow::Result<Comment>;
    async fn fetch_comment(&mut self, id: CommentId) -> anyhow::Result<Option<Comment>>;
    async fn set_comment_text(&mut self, id: CommentId, text: String) -> anyhow::Result<Comment>;
    async fn list_replies(&mut self, parent: CommentId) -> anyhow::Result<Vec<CommentId>>;
    async fn remove_comment(&mut self, id: CommentId) -> anyhow::Result<()>;
    async fn list_comments_on(&mut self, root: RootRef) -> anyhow::Result<Vec<Comment>>;

    async fn fetch_user_profile(&mut self, user: UserId) -> anyhow::Result<Option<UserProfile>>;
    async fn fetch_recent_submissions(
        &mut self,
        user: UserId,
        limit: usize,
    ) -> anyhow::Result<Vec<Submission>>;
}
