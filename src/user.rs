use crate::orm::{posts, users};
use crate::session;
use sea_orm::{entity::*, query::*, DatabaseConnection, DbErr, FromQueryResult};

/// Represents information about this request's client.
///
/// Built once per /graphql request from the `qid` cookie and placed in
/// GraphQL request data for resolvers.
#[derive(Clone, Debug, Default)]
pub struct Client {
    pub user: Option<ClientUser>,
}

impl Client {
    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.user.as_ref().map(|u| u.id)
    }

    pub fn is_user(&self) -> bool {
        self.user.is_some()
    }

    pub fn can_update_post(&self, post: &posts::Model) -> bool {
        self.is_user() && self.get_id() == Some(post.creator_id)
    }

    pub fn can_delete_post(&self, post: &posts::Model) -> bool {
        self.can_update_post(post)
    }
}

/// A mini struct for holding only what identity data we need about a client.
#[derive(Clone, Debug, FromQueryResult)]
pub struct ClientUser {
    pub id: i32,
    pub username: String,
}

/// Resolves the session cookie value to a Client.
/// Unknown or stale tokens resolve to a guest rather than an error.
pub async fn client_from_token(db: &DatabaseConnection, token: &str) -> Result<Client, DbErr> {
    let user_id = match session::get_session_user_id(token).await {
        Ok(Some(id)) => id,
        Ok(None) => return Ok(Client::default()),
        Err(err) => {
            log::warn!("session lookup failed: {}", err);
            return Ok(Client::default());
        }
    };

    let user = users::Entity::find_by_id(user_id)
        .select_only()
        .column(users::Column::Id)
        .column(users::Column::Username)
        .into_model::<ClientUser>()
        .one(db)
        .await?;

    Ok(Client { user })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post_by(creator_id: i32) -> posts::Model {
        let now = Utc::now().naive_utc();
        posts::Model {
            id: 1,
            title: "title".to_owned(),
            text: "text".to_owned(),
            points: 0,
            creator_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn guests_own_nothing() {
        let client = Client::default();
        assert!(!client.is_user());
        assert!(!client.can_update_post(&post_by(1)));
        assert!(!client.can_delete_post(&post_by(1)));
    }

    #[test]
    fn only_the_creator_may_modify() {
        let client = Client {
            user: Some(ClientUser {
                id: 7,
                username: "alice".to_owned(),
            }),
        };
        assert!(client.can_update_post(&post_by(7)));
        assert!(!client.can_update_post(&post_by(8)));
    }
}
