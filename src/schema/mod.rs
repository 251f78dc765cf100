pub mod post;
pub mod user;

use crate::user::Client;
use crate::web::ClientOrigin;
use async_graphql::{Context, EmptySubscription, Error, MergedObject, Result, Schema, SimpleObject};

/// Fixed message the client watches for to force a redirect to login.
pub const AUTHENTICATION_ERROR: &str = "not authenticated";

/// Root query object.
#[derive(MergedObject, Default)]
pub struct QueryRoot(post::PostQuery, user::UserQuery);

/// Root mutation object.
#[derive(MergedObject, Default)]
pub struct MutationRoot(post::PostMutation, user::UserMutation);

pub type AppSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(client_origin: ClientOrigin) -> AppSchema {
    Schema::build(
        QueryRoot::default(),
        MutationRoot::default(),
        EmptySubscription,
    )
    .data(client_origin)
    .finish()
}

/// A validation problem attributable to a single form field.
/// Returned as data, not thrown, so the client can mark the input it names.
#[derive(SimpleObject, Clone, Debug, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_owned(),
            message: message.to_owned(),
        }
    }
}

/// Extracts the session user's id or raises the fixed authentication error.
pub fn authed_user_id(ctx: &Context<'_>) -> Result<i32> {
    ctx.data::<Client>()?
        .get_id()
        .ok_or_else(|| Error::new(AUTHENTICATION_ERROR))
}
