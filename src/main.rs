use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use ruddit::schema::build_schema;
use ruddit::web::{graphql, playground, ClientOrigin};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_owned());
    let client_origin =
        std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_owned());

    ruddit::db::init_db(database_url).await;
    ruddit::session::init(&redis_url);

    let schema = web::Data::new(build_schema(ClientOrigin(client_origin.to_owned())));

    log::info!("serving GraphQL on http://127.0.0.1:4000/graphql");
    HttpServer::new(move || {
        App::new()
            .app_data(schema.clone())
            .wrap(Logger::new("%a %{User-Agent}i"))
            .wrap(
                Cors::default()
                    .allowed_origin(&client_origin)
                    .allow_any_header()
                    .allow_any_method()
                    .supports_credentials(),
            )
            .service(graphql)
            .service(playground)
    })
    .bind("127.0.0.1:4000")?
    .run()
    .await
}
