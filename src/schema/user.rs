use super::FieldError;
use crate::orm::users;
use crate::session::SessionUpdate;
use crate::user::Client;
use crate::{get_db_pool, mail, session, validate};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};
use async_graphql::{Context, Error, InputObject, Object, Result, SimpleObject};
use chrono::{NaiveDateTime, Utc};
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, DbErr};

#[derive(InputObject)]
pub struct UsernamePasswordInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(SimpleObject, Clone, Debug)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<users::Model> for User {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Auth mutation payload: either the user or per-field form errors.
#[derive(SimpleObject, Debug, Default)]
pub struct UserResponse {
    pub errors: Option<Vec<FieldError>>,
    pub user: Option<User>,
}

impl UserResponse {
    fn from_errors(errors: Vec<FieldError>) -> Self {
        Self {
            errors: Some(errors),
            user: None,
        }
    }

    fn from_user(user: User) -> Self {
        Self {
            errors: None,
            user: Some(user),
        }
    }
}

fn hash_password(password: &str) -> Result<String> {
    Argon2::default()
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))
        .map(|hash| hash.to_string())
        .map_err(|e| Error::new(format!("password hash failure: {}", e)))
}

/// Whether a write bounced off a unique index. sea-orm surfaces database
/// errors as strings, so this matches the Postgres message and SQLSTATE.
fn is_unique_violation(err: &DbErr) -> bool {
    let text = err.to_string();
    text.contains("duplicate key")
        || text.contains("23505")
        || text.contains("violates unique constraint")
}

/// Rehashes one user's password, or returns `None` untouched when the account
/// is gone. The caller keeps the reset token alive until this succeeds.
async fn reset_user_password(
    db: &DatabaseConnection,
    user_id: i32,
    password_hash: String,
    now: NaiveDateTime,
) -> Result<Option<users::Model>, DbErr> {
    let user = match users::Entity::find_by_id(user_id).one(db).await? {
        Some(user) => user,
        None => return Ok(None),
    };

    users::Entity::update_many()
        .col_expr(users::Column::Password, Expr::value(password_hash))
        .col_expr(users::Column::UpdatedAt, Expr::value(now))
        .filter(users::Column::Id.eq(user.id))
        .exec(db)
        .await?;

    Ok(Some(user))
}

fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            log::error!("stored password hash did not parse: {}", e);
            false
        }
    }
}

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    /// The session user, or null for guests.
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<User>> {
        let user_id = match ctx.data::<Client>()?.get_id() {
            Some(id) => id,
            None => return Ok(None),
        };

        let user = users::Entity::find_by_id(user_id).one(get_db_pool()).await?;
        Ok(user.map(User::from))
    }
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    async fn register(
        &self,
        ctx: &Context<'_>,
        options: UsernamePasswordInput,
    ) -> Result<UserResponse> {
        let errors =
            validate::validate_register(&options.username, &options.email, &options.password);
        if !errors.is_empty() {
            return Ok(UserResponse::from_errors(errors));
        }

        let now = Utc::now().naive_utc();
        let user = users::ActiveModel {
            username: Set(options.username.to_owned()),
            email: Set(options.email.to_owned()),
            password: Set(hash_password(&options.password)?),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let result = match users::Entity::insert(user).exec(get_db_pool()).await {
            Ok(result) => result,
            // The unique index is the source of truth for taken names.
            Err(e) if is_unique_violation(&e) => {
                return Ok(UserResponse::from_errors(vec![FieldError::new(
                    "username",
                    "that username is already in use",
                )]));
            }
            Err(e) => return Err(e.into()),
        };

        ctx.data::<SessionUpdate>()?.login(result.last_insert_id);

        Ok(UserResponse::from_user(User {
            id: result.last_insert_id,
            username: options.username,
            email: options.email,
            created_at: now,
            updated_at: now,
        }))
    }

    async fn login(
        &self,
        ctx: &Context<'_>,
        username_or_email: String,
        password: String,
    ) -> Result<UserResponse> {
        let filter = if validate::is_email(&username_or_email) {
            users::Column::Email.eq(username_or_email.to_owned())
        } else {
            users::Column::Username.eq(username_or_email.to_owned())
        };

        let user = users::Entity::find()
            .filter(filter)
            .one(get_db_pool())
            .await?;
        let user = match user {
            Some(user) => user,
            None => {
                return Ok(UserResponse::from_errors(vec![FieldError::new(
                    "usernameOrEmail",
                    "that user doesn't exist",
                )]));
            }
        };

        if !verify_password(&user.password, &password) {
            return Ok(UserResponse::from_errors(vec![FieldError::new(
                "password",
                "password doesn't match",
            )]));
        }

        ctx.data::<SessionUpdate>()?.login(user.id);
        Ok(UserResponse::from_user(User::from(user)))
    }

    async fn logout(&self, ctx: &Context<'_>) -> Result<bool> {
        ctx.data::<SessionUpdate>()?.logout();
        Ok(true)
    }

    /// Always true so callers cannot tell which emails have accounts.
    async fn forgot_password(&self, ctx: &Context<'_>, email: String) -> Result<bool> {
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.to_owned()))
            .one(get_db_pool())
            .await?;
        let user = match user {
            Some(user) => user,
            None => return Ok(true),
        };

        let token = session::create_reset_token(user.id).await?;
        let origin = ctx.data::<crate::web::ClientOrigin>()?;
        mail::send_reset_email(&user.email, &mail::reset_url(&origin.0, &token)).await?;

        Ok(true)
    }

    async fn change_password(
        &self,
        ctx: &Context<'_>,
        token: String,
        new_password: String,
    ) -> Result<UserResponse> {
        let errors = validate::validate_password("newPassword", &new_password);
        if !errors.is_empty() {
            return Ok(UserResponse::from_errors(errors));
        }

        let user_id = match session::get_reset_token(&token).await? {
            Some(id) => id,
            None => {
                return Ok(UserResponse::from_errors(vec![FieldError::new(
                    "token",
                    "token expired",
                )]));
            }
        };

        let now = Utc::now().naive_utc();
        let hash = hash_password(&new_password)?;
        let user = match reset_user_password(get_db_pool(), user_id, hash, now).await? {
            Some(user) => user,
            None => {
                return Ok(UserResponse::from_errors(vec![FieldError::new(
                    "token",
                    "user no longer exists",
                )]));
            }
        };

        // Single use, but only now that the new password is stored.
        session::delete_reset_token(&token).await?;

        // Log the user in with their fresh credentials.
        ctx.data::<SessionUpdate>()?.login(user.id);

        Ok(UserResponse::from_user(User {
            updated_at: now,
            ..User::from(user)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn sample_user() -> users::Model {
        let now = Utc::now().naive_utc();
        users::Model {
            id: 7,
            username: "alice".to_owned(),
            email: "alice@example.com".to_owned(),
            password: "old-hash".to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unique_violations_are_recognized() {
        let full = DbErr::Exec(
            "duplicate key value violates unique constraint \"users_username_key\"".to_owned(),
        );
        assert!(is_unique_violation(&full));

        let by_code = DbErr::Exec("error returned from database: 23505".to_owned());
        assert!(is_unique_violation(&by_code));

        let unrelated = DbErr::Exec("connection reset by peer".to_owned());
        assert!(!is_unique_violation(&unrelated));
    }

    #[actix_rt::test]
    async fn password_reset_skips_missing_users() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![Vec::<users::Model>::new()])
            .into_connection();

        let now = Utc::now().naive_utc();
        let result = reset_user_password(&db, 7, "new-hash".to_owned(), now)
            .await
            .unwrap();
        assert!(result.is_none());

        // Only the lookup ran; nothing was written for a vanished account.
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[actix_rt::test]
    async fn password_reset_updates_existing_users() {
        let user = sample_user();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results(vec![vec![user.clone()]])
            .append_exec_results(vec![MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let now = Utc::now().naive_utc();
        let result = reset_user_password(&db, user.id, "new-hash".to_owned(), now)
            .await
            .unwrap();
        assert_eq!(result.map(|u| u.id), Some(7));

        // The lookup and the password update both hit the database.
        assert_eq!(db.into_transaction_log().len(), 2);
    }
}
