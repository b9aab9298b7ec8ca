pub mod auth;
pub mod error;
pub mod live;
pub mod rooms;
pub mod state;
pub mod usernetwork;
pub mod users;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};

use wetalk_types::api::ApiResponse;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All REST routes and the live channel, mounted under `/api/v1`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/usernetwork/connect", post(usernetwork::connect))
        .route("/usernetwork/accept", post(usernetwork::accept))
        .route("/usernetwork/reject", post(usernetwork::reject))
        .route("/usernetwork/{id}", get(usernetwork::overview))
        .route("/usernetwork/{id}/friends", get(usernetwork::friends))
        .route(
            "/usernetwork/{id}/pending-requests",
            get(usernetwork::pending_requests),
        )
        .route("/room/savemessage", post(rooms::save_message))
        .route("/room/{room_id}/conversations", get(rooms::conversations))
        .route("/user/{user_id}", get(users::profile))
        .route("/user/{user_id}/rooms", get(users::rooms))
        .route("/live", get(live::upgrade));

    Router::new()
        .nest("/api/v1", api)
        .fallback(not_found)
        .with_state(state)
}

async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::done("ok"))
}

async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::failure("No such route")),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use wetalk_db::{Database, NewUser};
    use wetalk_types::api::Claims;

    use super::*;
    use crate::auth::ACCESS_TOKEN_HEADER;

    const SECRET: &str = "test-secret";

    struct Harness {
        app: Router,
        db: Arc<Database>,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory().unwrap());
            let state = Arc::new(AppStateInner::new(
                db.clone(),
                SECRET.into(),
                vec!["http://localhost:5173".into()],
            ));
            Self {
                app: router(state),
                db,
            }
        }

        fn user(&self, first_name: &str, last_name: &str) -> Uuid {
            let id = Uuid::new_v4();
            self.db
                .create_user(&NewUser {
                    id,
                    first_name,
                    last_name,
                    email: &format!("{}@example.test", id),
                    is_verified: true,
                })
                .unwrap();
            id
        }

        async fn call(&self, req: Request<Body>) -> (StatusCode, Value) {
            let res = self.app.clone().oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
                .await
                .unwrap();
            (status, serde_json::from_slice(&bytes).unwrap())
        }

        async fn get(&self, uri: &str, as_user: Uuid) -> (StatusCode, Value) {
            let req = Request::get(uri)
                .header(ACCESS_TOKEN_HEADER, token_for(as_user))
                .body(Body::empty())
                .unwrap();
            self.call(req).await
        }

        async fn post(&self, uri: &str, as_user: Uuid, body: Value) -> (StatusCode, Value) {
            let req = Request::post(uri)
                .header(ACCESS_TOKEN_HEADER, token_for(as_user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.call(req).await
        }
    }

    fn token_for(user_id: Uuid) -> String {
        let claims = Claims {
            sub: user_id,
            email: None,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn requests_without_token_are_unauthorized() {
        let h = Harness::new();
        let user = h.user("Ada", "Lovelace");

        let req = Request::get(format!("/api/v1/usernetwork/{}", user))
            .body(Body::empty())
            .unwrap();
        let (status, body) = h.call(req).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["isSuccess"], false);

        let req = Request::get(format!("/api/v1/usernetwork/{}", user))
            .header(ACCESS_TOKEN_HEADER, "not-a-jwt")
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn connect_and_accept_flow() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");

        let (status, body) = h
            .post(
                "/api/v1/usernetwork/connect",
                jane,
                json!({ "fromId": jane, "toId": john }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isSuccess"], true);

        let (_, body) = h
            .get(&format!("/api/v1/usernetwork/{}/pending-requests", john), john)
            .await;
        assert_eq!(body["data"][0]["id"], json!(jane));

        let (_, body) = h.get(&format!("/api/v1/usernetwork/{}", jane), jane).await;
        assert_eq!(body["data"]["requests"]["to"], json!([john]));

        let (status, body) = h
            .post(
                "/api/v1/usernetwork/accept",
                john,
                json!({
                    "fromId": jane,
                    "userId": john,
                    "fromFirstName": "Jane",
                    "fromLastName": "Doe"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["roomCreated"], true);
        let room_id = body["data"]["roomId"].clone();

        let (_, body) = h
            .get(&format!("/api/v1/usernetwork/{}/friends", jane), jane)
            .await;
        assert_eq!(body["data"][0]["id"], json!(john));

        let (_, body) = h.get(&format!("/api/v1/user/{}/rooms", john), john).await;
        assert_eq!(body["data"][0]["id"], room_id);
        assert_eq!(body["data"][0]["members"].as_array().unwrap().len(), 2);

        let (_, body) = h
            .get(&format!("/api/v1/usernetwork/{}/pending-requests", john), john)
            .await;
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn acting_for_another_user_is_forbidden() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");

        let (status, body) = h
            .post(
                "/api/v1/usernetwork/connect",
                john,
                json!({ "fromId": jane, "toId": john }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["isSuccess"], false);
        assert!(h.db.list_incoming(john).unwrap().is_empty());
    }

    #[tokio::test]
    async fn accept_without_request_is_not_found() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");

        let (status, body) = h
            .post(
                "/api/v1/usernetwork/accept",
                john,
                json!({
                    "fromId": jane,
                    "userId": john,
                    "fromFirstName": "Jane",
                    "fromLastName": "Doe"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["isSuccess"], false);
        assert!(!h.db.are_friends(jane, john).unwrap());
    }

    #[tokio::test]
    async fn reject_drops_the_request() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");
        h.db.send_request(jane, john).unwrap();

        let (status, _) = h
            .post(
                "/api/v1/usernetwork/reject",
                john,
                json!({ "fromId": jane, "userId": john }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.db.list_incoming(john).unwrap().is_empty());

        let (status, _) = h
            .post(
                "/api/v1/usernetwork/reject",
                john,
                json!({ "fromId": jane, "userId": john }),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn saved_messages_are_readable_by_members_only() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");
        let stranger = h.user("Eve", "Moe");
        h.db.send_request(jane, john).unwrap();
        let room = h.db.accept_request(john, jane, "Jane", "Doe").unwrap().room_id;

        for (text, ts) in [("hi", 1000), ("hey", 1001)] {
            let (status, _) = h
                .post(
                    "/api/v1/room/savemessage",
                    jane,
                    json!({ "roomId": room, "sender": jane, "timestamp": ts, "message": text }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = h
            .get(&format!("/api/v1/room/{}/conversations", room), john)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["message"], "hi");
        assert_eq!(body["data"][1]["message"], "hey");
        assert_eq!(body["data"][1]["timestamp"], 1001);

        let (status, _) = h
            .get(&format!("/api/v1/room/{}/conversations", room), stranger)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = h
            .post(
                "/api/v1/room/savemessage",
                stranger,
                json!({ "roomId": room, "sender": stranger, "timestamp": 5, "message": "spam" }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(h.db.get_conversation(room).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn private_listings_are_owner_only() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");
        let john = h.user("John", "Roe");
        let stranger = h.user("Eve", "Moe");
        h.db.send_request(jane, john).unwrap();
        let room = h.db.accept_request(john, jane, "Jane", "Doe").unwrap().room_id;
        h.post(
            "/api/v1/room/savemessage",
            jane,
            json!({ "roomId": room, "sender": jane, "timestamp": 10, "message": "secret pin 4242" }),
        )
        .await;

        for uri in [
            format!("/api/v1/user/{}/rooms", jane),
            format!("/api/v1/usernetwork/{}/pending-requests", jane),
            format!("/api/v1/usernetwork/{}", jane),
        ] {
            let (status, body) = h.get(&uri, stranger).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
            assert_eq!(body["isSuccess"], false);
            assert!(body["data"].is_null());
        }

        let (status, body) = h.get(&format!("/api/v1/user/{}/rooms", jane), jane).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["metadata"]["lastMessage"], "secret pin 4242");
    }

    #[tokio::test]
    async fn malformed_bodies_are_invalid_requests() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");

        let (status, body) = h
            .post(
                "/api/v1/usernetwork/connect",
                jane,
                json!({ "fromId": jane, "toId": "nope" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["isSuccess"], false);

        let (status, _) = h.get("/api/v1/usernetwork/not-a-uuid", jane).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn public_profile_needs_no_token() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");

        let req = Request::get(format!("/api/v1/user/{}", jane))
            .body(Body::empty())
            .unwrap();
        let (status, body) = h.call(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["firstName"], "Jane");
        assert_eq!(body["data"]["isOnline"], false);

        let req = Request::get(format!("/api/v1/user/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.call(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn live_channel_checks_token_and_origin() {
        let h = Harness::new();
        let jane = h.user("Jane", "Doe");

        let req = Request::get("/api/v1/live").body(Body::empty()).unwrap();
        let (status, _) = h.call(req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::get(format!("/api/v1/live?token={}", token_for(jane)))
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let (status, _) = h.call(req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_routes_use_the_envelope() {
        let h = Harness::new();
        let req = Request::get("/api/v1/nope").body(Body::empty()).unwrap();
        let (status, body) = h.call(req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["isSuccess"], false);

        let req = Request::get("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = h.call(req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isSuccess"], true);
    }
}
