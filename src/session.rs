use once_cell::sync::OnceCell;
use redis::AsyncCommands;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Session cookie set on login and cleared on logout.
pub const COOKIE_NAME: &str = "qid";

/// Sessions effectively never expire on their own; logout removes them.
const SESSION_TTL_SECS: usize = 60 * 60 * 24 * 365 * 10;
/// Password reset links are good for three days.
const RESET_TOKEN_TTL_SECS: usize = 60 * 60 * 24 * 3;

static REDIS: OnceCell<redis::Client> = OnceCell::new();

/// Opens the Redis client used for sessions and password reset tokens.
pub fn init(redis_url: &str) {
    let client = redis::Client::open(redis_url).expect("REDIS_URL is not a valid redis URL");
    REDIS.set(client).expect("session::init() called twice");
}

fn get_redis() -> &'static redis::Client {
    REDIS
        .get()
        .expect("redis accessed before session::init() was called")
}

fn session_key(token: &str) -> String {
    format!("session/{}", token)
}

fn reset_key(token: &str) -> String {
    format!("forget-password/{}", token)
}

/// Creates a session row in Redis and returns the opaque token for the cookie.
pub async fn create_session(user_id: i32) -> Result<String, redis::RedisError> {
    let token = Uuid::new_v4().to_string();
    let mut conn = get_redis().get_async_connection().await?;
    conn.set_ex::<_, _, ()>(session_key(&token), user_id, SESSION_TTL_SECS)
        .await?;
    Ok(token)
}

/// Looks up the user id a session token was issued to, if any.
pub async fn get_session_user_id(token: &str) -> Result<Option<i32>, redis::RedisError> {
    let mut conn = get_redis().get_async_connection().await?;
    conn.get(session_key(token)).await
}

pub async fn destroy_session(token: &str) -> Result<(), redis::RedisError> {
    let mut conn = get_redis().get_async_connection().await?;
    conn.del::<_, ()>(session_key(token)).await?;
    Ok(())
}

/// Stores a single-use password reset token against the user's id.
pub async fn create_reset_token(user_id: i32) -> Result<String, redis::RedisError> {
    let token = Uuid::new_v4().to_string();
    let mut conn = get_redis().get_async_connection().await?;
    conn.set_ex::<_, _, ()>(reset_key(&token), user_id, RESET_TOKEN_TTL_SECS)
        .await?;
    Ok(token)
}

/// Looks up the user id a password reset token was issued to, if still valid.
/// The token stays in Redis; delete it only once the password update landed.
pub async fn get_reset_token(token: &str) -> Result<Option<i32>, redis::RedisError> {
    let mut conn = get_redis().get_async_connection().await?;
    conn.get(reset_key(token)).await
}

pub async fn delete_reset_token(token: &str) -> Result<(), redis::RedisError> {
    let mut conn = get_redis().get_async_connection().await?;
    conn.del::<_, ()>(reset_key(token)).await?;
    Ok(())
}

/// A session change requested by a resolver during execution.
///
/// GraphQL resolvers cannot reach the HTTP response, so login and logout
/// record their intent here and the /graphql handler applies it afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionChange {
    Login(i32),
    Logout,
}

/// Shared cell placed in GraphQL request data for [`SessionChange`] handoff.
/// Clones share the same cell so the handler keeps a handle across execution.
#[derive(Clone, Debug, Default)]
pub struct SessionUpdate(Arc<Mutex<Option<SessionChange>>>);

impl SessionUpdate {
    pub fn login(&self, user_id: i32) {
        *self.0.lock().unwrap() = Some(SessionChange::Login(user_id));
    }

    pub fn logout(&self) {
        *self.0.lock().unwrap() = Some(SessionChange::Logout);
    }

    pub fn take(&self) -> Option<SessionChange> {
        self.0.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_keys_are_namespaced() {
        assert_eq!(session_key("abc"), "session/abc");
        assert_eq!(reset_key("abc"), "forget-password/abc");
    }

    #[test]
    fn session_update_is_take_once() {
        let update = SessionUpdate::default();
        assert_eq!(update.take(), None);

        update.login(15);
        assert_eq!(update.take(), Some(SessionChange::Login(15)));
        assert_eq!(update.take(), None);

        update.logout();
        assert_eq!(update.take(), Some(SessionChange::Logout));
    }

    #[test]
    fn last_session_change_wins() {
        let update = SessionUpdate::default();
        update.login(1);
        update.logout();
        assert_eq!(update.take(), Some(SessionChange::Logout));
    }
}
