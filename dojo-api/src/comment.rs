use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Context};

use crate::{
    is_admin_or_moderator, is_author, ChallengeId, Db, Error, Session, SolutionId, Time, UserId,
};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub i64);

/// The challenge or solution a comment thread hangs from
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RootRef {
    Challenge(ChallengeId),
    Solution(SolutionId),
}

impl RootRef {
    pub fn challenge_id(&self) -> Option<ChallengeId> {
        match self {
            RootRef::Challenge(c) => Some(*c),
            RootRef::Solution(_) => None,
        }
    }

    pub fn solution_id(&self) -> Option<SolutionId> {
        match self {
            RootRef::Challenge(_) => None,
            RootRef::Solution(s) => Some(*s),
        }
    }

    /// Rebuilds a root from its two nullable database columns, exactly one of which is set
    pub fn from_columns(challenge: Option<i64>, solution: Option<i64>) -> anyhow::Result<RootRef> {
        match (challenge, solution) {
            (Some(c), None) => Ok(RootRef::Challenge(ChallengeId(c))),
            (None, Some(s)) => Ok(RootRef::Solution(SolutionId(s))),
            (c, s) => Err(anyhow!(
                "comment root must be exactly one of a challenge or a solution, got {c:?} and {s:?}"
            )),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub text: String,
    pub user_id: UserId,
    pub parent_id: Option<CommentId>,
    pub root: RootRef,
    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub text: String,
    pub root: RootRef,
}

impl NewComment {
    /// Checks shared by top-level comments and replies, returns the author to record
    fn validate(&self, session: Option<&Session>) -> Result<UserId, Error> {
        let session = session.ok_or(Error::Unauthorized)?;
        if self.text.is_empty() {
            return Err(Error::EmptyText);
        }
        crate::validate_string(&self.text)?;
        Ok(session.user)
    }
}

/// New text for an existing comment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentEdit {
    pub text: String,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentNode {
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

fn may_moderate(session: &Session, comment: &Comment) -> bool {
    is_admin_or_moderator(session) || is_author(session, comment.user_id)
}

pub async fn add_comment<D: Db>(
    db: &mut D,
    session: Option<&Session>,
    c: NewComment,
) -> anyhow::Result<Result<Comment, Error>> {
    let author = match c.validate(session) {
        Ok(author) => author,
        Err(e) => return Ok(Err(e)),
    };
    if !db
        .root_exists(c.root)
        .await
        .with_context(|| format!("checking that {:?} exists", c.root))?
    {
        return Ok(Err(Error::RootNotFound(c.root)));
    }
    let root = c.root;
    let comment = db
        .insert_comment(author, None, c)
        .await
        .with_context(|| format!("inserting comment by {author:?} on {root:?}"))?;
    tracing::debug!(id = ?comment.id, ?root, "added comment");
    Ok(Ok(comment))
}

pub async fn reply_comment<D: Db>(
    db: &mut D,
    session: Option<&Session>,
    c: NewComment,
    parent: CommentId,
) -> anyhow::Result<Result<Comment, Error>> {
    let author = match c.validate(session) {
        Ok(author) => author,
        Err(e) => return Ok(Err(e)),
    };
    let parent_comment = match db
        .fetch_comment(parent)
        .await
        .with_context(|| format!("fetching parent comment {parent:?}"))?
    {
        Some(p) => p,
        None => return Ok(Err(Error::CommentNotFound(parent))),
    };
    if parent_comment.root != c.root {
        return Ok(Err(Error::InvalidComment));
    }
    let comment = db
        .insert_comment(author, Some(parent), c)
        .await
        .with_context(|| format!("inserting reply by {author:?} to {parent:?}"))?;
    tracing::debug!(id = ?comment.id, ?parent, "added reply");
    Ok(Ok(comment))
}

pub async fn update_comment<D: Db>(
    db: &mut D,
    session: Option<&Session>,
    text: String,
    id: CommentId,
) -> anyhow::Result<Result<Comment, Error>> {
    let session = match session {
        Some(s) => s,
        None => return Ok(Err(Error::Unauthorized)),
    };
    if text.is_empty() {
        return Ok(Err(Error::EmptyText));
    }
    if let Err(e) = crate::validate_string(&text) {
        return Ok(Err(e));
    }
    let comment = match db
        .fetch_comment(id)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?
    {
        Some(c) => c,
        None => return Ok(Err(Error::CommentNotFound(id))),
    };
    if !may_moderate(session, &comment) {
        return Ok(Err(Error::Unauthorized));
    }
    Ok(Ok(db
        .set_comment_text(id, text)
        .await
        .with_context(|| format!("updating text of comment {id:?}"))?))
}

/// Deletes a comment along with all its replies, returning the removed ids in removal order
///
/// Replies are always removed before the comment they answer.
pub async fn delete_comment<D: Db>(
    db: &mut D,
    session: Option<&Session>,
    id: Option<CommentId>,
) -> anyhow::Result<Result<Vec<CommentId>, Error>> {
    let session = match session {
        Some(s) => s,
        None => return Ok(Err(Error::Unauthorized)),
    };
    let id = match id {
        Some(id) => id,
        None => return Ok(Err(Error::InvalidComment)),
    };
    let comment = match db
        .fetch_comment(id)
        .await
        .with_context(|| format!("fetching comment {id:?}"))?
    {
        Some(c) => c,
        None => return Ok(Err(Error::CommentNotFound(id))),
    };
    if !may_moderate(session, &comment) {
        return Ok(Err(Error::Unauthorized));
    }

    // Post-order walk: a comment is pushed back as `expanded` above its replies, so it
    // only gets popped again once all of them are gone.
    let mut removed = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![(id, false)];
    while let Some((c, expanded)) = stack.pop() {
        if expanded {
            db.remove_comment(c)
                .await
                .with_context(|| format!("removing comment {c:?}"))?;
            removed.push(c);
            continue;
        }
        if !seen.insert(c) {
            anyhow::bail!("comment {c:?} is its own ancestor");
        }
        stack.push((c, true));
        let replies = db
            .list_replies(c)
            .await
            .with_context(|| format!("listing replies to {c:?}"))?;
        stack.extend(replies.into_iter().map(|r| (r, false)));
    }
    tracing::debug!(?id, num_removed = removed.len(), "deleted comment thread");
    Ok(Ok(removed))
}

pub async fn list_comments<D: Db>(db: &mut D, root: RootRef) -> anyhow::Result<Vec<Comment>> {
    let mut comments = db
        .list_comments_on(root)
        .await
        .with_context(|| format!("listing comments on {root:?}"))?;
    comments.sort_by_key(|c| (c.created_at, c.id));
    Ok(comments)
}

/// Nests a flat list of comments into threads
///
/// Comments whose parent is not part of `comments` are returned as top-level threads.
/// Siblings keep the relative order they had in `comments`.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let known = comments.iter().map(|c| c.id).collect::<HashSet<_>>();
    let mut top = Vec::new();
    let mut children: HashMap<CommentId, Vec<Comment>> = HashMap::new();
    for c in comments {
        match c.parent_id {
            Some(p) if known.contains(&p) => children.entry(p).or_default().push(c),
            _ => top.push(c),
        }
    }
    fn attach(c: Comment, children: &mut HashMap<CommentId, Vec<Comment>>) -> CommentNode {
        let replies = children
            .remove(&c.id)
            .unwrap_or_default()
            .into_iter()
            .map(|r| attach(r, children))
            .collect();
        CommentNode { comment: c, replies }
    }
    top.into_iter().map(|c| attach(c, &mut children)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn comment(id: i64, parent: Option<i64>) -> Comment {
        let date = Utc.timestamp_opt(1_600_000_000 + id, 0).unwrap();
        Comment {
            id: CommentId(id),
            text: format!("comment {id}"),
            user_id: UserId::stub(),
            parent_id: parent.map(CommentId),
            root: RootRef::Challenge(ChallengeId(1)),
            created_at: date,
            updated_at: date,
        }
    }

    fn shape(nodes: &[CommentNode]) -> Vec<(i64, Vec<i64>)> {
        nodes
            .iter()
            .map(|n| {
                (
                    n.comment.id.0,
                    n.replies.iter().map(|r| r.comment.id.0).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn root_ref_columns() {
        assert_eq!(
            RootRef::from_columns(Some(5), None).unwrap(),
            RootRef::Challenge(ChallengeId(5))
        );
        assert_eq!(
            RootRef::from_columns(None, Some(7)).unwrap(),
            RootRef::Solution(SolutionId(7))
        );
        assert!(RootRef::from_columns(None, None).is_err());
        assert!(RootRef::from_columns(Some(1), Some(2)).is_err());
        let root = RootRef::Solution(SolutionId(7));
        assert_eq!(root.solution_id(), Some(SolutionId(7)));
        assert_eq!(root.challenge_id(), None);
    }

    #[test]
    fn root_ref_wire_format() {
        assert_eq!(
            serde_json::to_value(RootRef::Challenge(ChallengeId(5))).unwrap(),
            serde_json::json!({"type": "CHALLENGE", "id": 5})
        );
        let c: NewComment = serde_json::from_value(serde_json::json!({
            "text": "hi",
            "root": {"type": "SOLUTION", "id": 7},
        }))
        .unwrap();
        assert_eq!(c.root, RootRef::Solution(SolutionId(7)));
    }

    #[test]
    fn tree_nests_replies() {
        let tree = build_tree(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(2)),
            comment(5, Some(1)),
        ]);
        assert_eq!(shape(&tree), vec![(1, vec![2, 5]), (3, vec![])]);
        assert_eq!(shape(&tree[0].replies), vec![(2, vec![4]), (5, vec![])]);
    }

    #[test]
    fn tree_promotes_orphans() {
        let tree = build_tree(vec![comment(2, Some(1)), comment(3, Some(2))]);
        assert_eq!(shape(&tree), vec![(2, vec![3])]);
    }
}
