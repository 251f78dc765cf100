use crate::get_db_pool;
use crate::schema::AppSchema;
use crate::session::{self, SessionChange, SessionUpdate, COOKIE_NAME};
use crate::user::{client_from_token, Client};
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{error, get, post, web, Error, HttpRequest, HttpResponse, Responder};
use async_graphql::http::{playground_source, GraphQLPlaygroundConfig};
use async_graphql_actix_web::GraphQLRequest;

/// Origin of the web client, used for CORS and password reset links.
pub struct ClientOrigin(pub String);

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(COOKIE_NAME, token)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::days(365 * 10))
        .finish()
}

/// Single GraphQL endpoint. Identity comes in on the `qid` cookie; session
/// changes requested by resolvers are applied to the response on the way out.
#[post("/graphql")]
pub async fn graphql(
    schema: web::Data<AppSchema>,
    req: HttpRequest,
    gql: GraphQLRequest,
) -> Result<HttpResponse, Error> {
    let token = req.cookie(COOKIE_NAME).map(|c| c.value().to_owned());
    let client = match &token {
        Some(token) => client_from_token(get_db_pool(), token)
            .await
            .map_err(error::ErrorInternalServerError)?,
        None => Client::default(),
    };

    let update = SessionUpdate::default();
    let request = gql
        .into_inner()
        .data(client)
        .data(update.to_owned());
    let response = schema.execute(request).await;

    let mut http = HttpResponse::Ok().json(&response);
    match update.take() {
        Some(SessionChange::Login(user_id)) => {
            let token = session::create_session(user_id)
                .await
                .map_err(error::ErrorInternalServerError)?;
            http.add_cookie(&session_cookie(token))
                .map_err(error::ErrorInternalServerError)?;
        }
        Some(SessionChange::Logout) => {
            if let Some(token) = token {
                if let Err(e) = session::destroy_session(&token).await {
                    // The cookie is cleared regardless; the orphan key expires.
                    log::error!("failed to destroy session: {}", e);
                }
            }
            let mut expired = Cookie::new(COOKIE_NAME, "");
            expired.set_path("/");
            http.add_removal_cookie(&expired)
                .map_err(error::ErrorInternalServerError)?;
        }
        None => {}
    }

    Ok(http)
}

#[get("/graphql")]
pub async fn playground() -> impl Responder {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(playground_source(GraphQLPlaygroundConfig::new("/graphql")))
}
