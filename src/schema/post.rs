use super::{authed_user_id, user::User};
use crate::get_db_pool;
use crate::orm::{posts, users, votes};
use async_graphql::{ComplexObject, Context, Error, InputObject, Object, Result, SimpleObject};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr};
use std::collections::HashMap;

/// Hard cap on feed page size regardless of what the client asks for.
const MAX_PAGE_SIZE: i32 = 50;

#[derive(InputObject)]
pub struct PostInput {
    pub title: String,
    pub text: String,
}

#[derive(SimpleObject, Clone, Debug)]
#[graphql(complex)]
pub struct Post {
    pub id: i32,
    pub title: String,
    pub text: String,
    pub points: i32,
    pub creator_id: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub creator: User,
    /// The session user's current vote on this post, if any.
    pub vote_status: Option<i32>,
}

#[ComplexObject]
impl Post {
    /// Feed preview text, cut at the first word break past 50 characters.
    async fn text_snippet(&self) -> &str {
        snippet(&self.text)
    }
}

#[derive(SimpleObject, Debug)]
pub struct PaginatedPosts {
    pub posts: Vec<Post>,
    pub has_more: bool,
}

fn snippet(text: &str) -> &str {
    match text.char_indices().find(|(i, c)| *i >= 50 && *c == ' ') {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

fn cap_limit(limit: i32) -> u64 {
    limit.clamp(1, MAX_PAGE_SIZE) as u64
}

/// Cursors are the ISO timestamp of the last post the client has seen.
fn parse_cursor(cursor: &str) -> Option<NaiveDateTime> {
    cursor.parse::<NaiveDateTime>().ok().or_else(|| {
        chrono::DateTime::parse_from_rfc3339(cursor)
            .map(|dt| dt.naive_utc())
            .ok()
    })
}

/// Trims the extra row fetched past the page boundary.
/// Asking for limit + 1 rows and getting them all back means more pages exist.
fn trim_page<T>(mut rows: Vec<T>, limit: u64) -> (Vec<T>, bool) {
    let has_more = rows.len() as u64 == limit + 1;
    rows.truncate(limit as usize);
    (rows, has_more)
}

/// Any value other than a downvote counts as an upvote.
fn normalize_vote(value: i32) -> i32 {
    if value == -1 {
        -1
    } else {
        1
    }
}

/// Point delta a new vote applies to the post, or None when nothing changes.
/// Switching sides both removes the old vote and applies the new one,
/// so the swing is twice the new value.
fn vote_swing(prev: Option<i32>, next: i32) -> Option<i32> {
    match prev {
        None => Some(next),
        Some(prev) if prev != next => Some(2 * next),
        Some(_) => None,
    }
}

/// Feed selector: newest first with the post id as tie-break, fetching one
/// row past the requested page, resuming strictly after the cursor timestamp.
fn feed_query(real_limit: u64, after: Option<NaiveDateTime>) -> Select<posts::Entity> {
    let mut select = posts::Entity::find()
        .order_by_desc(posts::Column::CreatedAt)
        // Secondary key keeps the order stable across identical timestamps.
        .order_by_desc(posts::Column::Id)
        .limit(real_limit + 1);

    if let Some(after) = after {
        select = select.filter(posts::Column::CreatedAt.lt(after));
    }

    select
}

/// Selects one user's vote on one post, locked for the rest of the
/// transaction so concurrent flips of the same vote serialize.
fn current_vote(user_id: i32, post_id: i32) -> Select<votes::Entity> {
    votes::Entity::find()
        .filter(votes::Column::UserId.eq(user_id))
        .filter(votes::Column::PostId.eq(post_id))
        .lock_exclusive()
}

/// Maps post id to the session user's vote value for the given posts.
async fn vote_status_map(
    db: &DatabaseConnection,
    user_id: Option<i32>,
    post_ids: &[i32],
) -> Result<HashMap<i32, i32>, DbErr> {
    let user_id = match user_id {
        Some(id) if !post_ids.is_empty() => id,
        _ => return Ok(HashMap::new()),
    };

    let rows = votes::Entity::find()
        .filter(votes::Column::UserId.eq(user_id))
        .filter(votes::Column::PostId.is_in(post_ids.to_vec()))
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|v| (v.post_id, v.value)).collect())
}

fn into_gql_post(
    post: posts::Model,
    creator: Option<users::Model>,
    vote_status: Option<i32>,
) -> Option<Post> {
    let creator = match creator {
        Some(user) => User::from(user),
        None => {
            // Creator rows are FK-protected; a miss means the join broke.
            log::error!("post {} has no creator row", post.id);
            return None;
        }
    };

    Some(Post {
        id: post.id,
        title: post.title,
        text: post.text,
        points: post.points,
        creator_id: post.creator_id,
        created_at: post.created_at,
        updated_at: post.updated_at,
        creator,
        vote_status,
    })
}

#[derive(Default)]
pub struct PostQuery;

#[Object]
impl PostQuery {
    /// Feed of posts, newest first.
    async fn posts(
        &self,
        ctx: &Context<'_>,
        limit: i32,
        cursor: Option<String>,
    ) -> Result<PaginatedPosts> {
        let db = get_db_pool();
        let real_limit = cap_limit(limit);

        let after = match cursor {
            Some(cursor) => Some(
                parse_cursor(&cursor).ok_or_else(|| Error::new("cursor is not a timestamp"))?,
            ),
            None => None,
        };

        let rows = feed_query(real_limit, after)
            .find_also_related(users::Entity)
            .all(db)
            .await?;
        let (rows, has_more) = trim_page(rows, real_limit);

        let client_id = ctx.data::<crate::user::Client>()?.get_id();
        let post_ids: Vec<i32> = rows.iter().map(|(p, _)| p.id).collect();
        let vote_map = vote_status_map(db, client_id, &post_ids).await?;

        let posts = rows
            .into_iter()
            .filter_map(|(post, creator)| {
                let vote_status = vote_map.get(&post.id).copied();
                into_gql_post(post, creator, vote_status)
            })
            .collect();

        Ok(PaginatedPosts { posts, has_more })
    }

    /// A single post, or null if it does not exist.
    async fn post(&self, ctx: &Context<'_>, id: i32) -> Result<Option<Post>> {
        let db = get_db_pool();

        let row = posts::Entity::find_by_id(id)
            .find_also_related(users::Entity)
            .one(db)
            .await?;

        let (post, creator) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let client_id = ctx.data::<crate::user::Client>()?.get_id();
        let vote_map = vote_status_map(db, client_id, &[post.id]).await?;
        let vote_status = vote_map.get(&post.id).copied();

        Ok(into_gql_post(post, creator, vote_status))
    }
}

#[derive(Default)]
pub struct PostMutation;

#[Object]
impl PostMutation {
    async fn create_post(&self, ctx: &Context<'_>, input: PostInput) -> Result<Post> {
        let user_id = authed_user_id(ctx)?;
        let db = get_db_pool();
        let now = Utc::now().naive_utc();

        let post = posts::ActiveModel {
            title: Set(input.title.to_owned()),
            text: Set(input.text.to_owned()),
            points: Set(0),
            creator_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let result = posts::Entity::insert(post).exec(db).await?;

        let creator = users::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| Error::new("session user no longer exists"))?;

        Ok(Post {
            id: result.last_insert_id,
            title: input.title,
            text: input.text,
            points: 0,
            creator_id: user_id,
            created_at: now,
            updated_at: now,
            creator: User::from(creator),
            vote_status: None,
        })
    }

    /// Updates an owned post's title and text. Null when the post is missing
    /// or belongs to someone else.
    async fn update_post(
        &self,
        ctx: &Context<'_>,
        id: i32,
        input: PostInput,
    ) -> Result<Option<Post>> {
        let user_id = authed_user_id(ctx)?;
        let db = get_db_pool();

        let row = posts::Entity::find_by_id(id)
            .find_also_related(users::Entity)
            .one(db)
            .await?;
        let (post, creator) = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        if post.creator_id != user_id {
            return Ok(None);
        }

        let now = Utc::now().naive_utc();
        posts::Entity::update_many()
            .col_expr(posts::Column::Title, Expr::value(input.title.to_owned()))
            .col_expr(posts::Column::Text, Expr::value(input.text.to_owned()))
            .col_expr(posts::Column::UpdatedAt, Expr::value(now))
            .filter(posts::Column::Id.eq(id))
            .filter(posts::Column::CreatorId.eq(user_id))
            .exec(db)
            .await?;

        let vote_map = vote_status_map(db, Some(user_id), &[post.id]).await?;
        let vote_status = vote_map.get(&post.id).copied();

        let updated = posts::Model {
            title: input.title,
            text: input.text,
            updated_at: now,
            ..post
        };
        Ok(into_gql_post(updated, creator, vote_status))
    }

    /// Deletes an owned post. False when nothing was removed.
    async fn delete_post(&self, ctx: &Context<'_>, id: i32) -> Result<bool> {
        let user_id = authed_user_id(ctx)?;

        let result = posts::Entity::delete_many()
            .filter(posts::Column::Id.eq(id))
            .filter(posts::Column::CreatorId.eq(user_id))
            .exec(get_db_pool())
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Records or flips the session user's vote on a post, keeping the
    /// post's denormalized point total in step within one transaction.
    async fn vote(&self, ctx: &Context<'_>, post_id: i32, value: i32) -> Result<bool> {
        let user_id = authed_user_id(ctx)?;
        let value = normalize_vote(value);
        let db = get_db_pool();

        // The check and both writes share one transaction. Reading outside
        // it would let two concurrent flips observe the same old vote and
        // double-apply the swing.
        let txn = db.begin().await?;

        let existing = current_vote(user_id, post_id).one(&txn).await?;

        let swing = match vote_swing(existing.as_ref().map(|v| v.value), value) {
            Some(swing) => swing,
            // Voting the same way twice is a no-op.
            None => {
                txn.commit().await?;
                return Ok(true);
            }
        };

        if existing.is_some() {
            votes::Entity::update_many()
                .col_expr(votes::Column::Value, Expr::value(value))
                .filter(votes::Column::UserId.eq(user_id))
                .filter(votes::Column::PostId.eq(post_id))
                .exec(&txn)
                .await?;
        } else {
            votes::Entity::insert(votes::ActiveModel {
                user_id: Set(user_id),
                post_id: Set(post_id),
                value: Set(value),
            })
            .exec(&txn)
            .await?;
        }

        posts::Entity::update_many()
            .col_expr(
                posts::Column::Points,
                // swing is a bare integer; no values to bind.
                Expr::cust(&format!("points + {}", swing)),
            )
            .filter(posts::Column::Id.eq(post_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }
}
