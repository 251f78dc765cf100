#[cfg(test)]
mod tests {
    use actix_web::{test, web::Data, App};
    use ruddit::schema::build_schema;
    use ruddit::web::{graphql, playground, ClientOrigin};
    use serde_json::{json, Value};

    fn schema_data() -> Data<ruddit::schema::AppSchema> {
        Data::new(build_schema(ClientOrigin(
            "http://localhost:3000".to_owned(),
        )))
    }

    async fn execute(query: &str) -> Value {
        let app = test::init_service(
            App::new()
                .app_data(schema_data())
                .service(graphql)
                .service(playground),
        )
        .await;
        let req = test::TestRequest::post()
            .uri("/graphql")
            .set_json(json!({ "query": query }))
            .to_request();
        test::call_and_read_body_json(&app, req).await
    }

    #[actix_rt::test]
    async fn test_playground_get() {
        let app = test::init_service(
            App::new()
                .app_data(schema_data())
                .service(graphql)
                .service(playground),
        )
        .await;
        let req = test::TestRequest::get().uri("/graphql").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_rt::test]
    async fn test_typename_executes() {
        let body = execute("{ __typename }").await;
        assert_eq!(body["data"]["__typename"], "QueryRoot");
    }

    #[actix_rt::test]
    async fn test_guest_vote_is_rejected() {
        let body = execute("mutation { vote(postId: 1, value: 1) }").await;
        assert_eq!(body["errors"][0]["message"], "not authenticated");
        assert_eq!(body["data"], Value::Null);
    }

    #[actix_rt::test]
    async fn test_guest_create_post_is_rejected() {
        let body =
            execute(r#"mutation { createPost(input: { title: "t", text: "x" }) { id } }"#).await;
        assert_eq!(body["errors"][0]["message"], "not authenticated");
    }

    #[actix_rt::test]
    async fn test_register_maps_errors_to_fields() {
        let body = execute(
            r#"mutation {
                register(options: { username: "a", email: "nope", password: "x" }) {
                    errors { field message }
                    user { id }
                }
            }"#,
        )
        .await;

        let errors = body["data"]["register"]["errors"]
            .as_array()
            .expect("field errors expected");
        let fields: Vec<&str> = errors.iter().map(|e| e["field"].as_str().unwrap()).collect();
        assert_eq!(fields, vec!["email", "username", "password"]);
        assert_eq!(body["data"]["register"]["user"], Value::Null);
    }

    #[actix_rt::test]
    async fn test_change_password_rejects_short_password() {
        let body = execute(
            r#"mutation {
                changePassword(token: "whatever", newPassword: "x") {
                    errors { field message }
                }
            }"#,
        )
        .await;

        let errors = body["data"]["changePassword"]["errors"]
            .as_array()
            .expect("field errors expected");
        assert_eq!(errors[0]["field"], "newPassword");
        assert_eq!(errors[0]["message"], "length must be at least 2 characters");
    }
}
