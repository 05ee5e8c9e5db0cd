use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    routing::get as get_route,
    Router,
};
use cooking_companion::config::Settings;
use cooking_companion::error::{CONFIGURATION_MESSAGE, QUOTA_MESSAGE};
use cooking_companion::routes::{recover_panics, router};
use cooking_companion::state::AppState;
use cooking_companion::views::INTERNAL_ERROR_MESSAGE;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state(server: &MockServer, ai_keys: bool) -> Arc<AppState> {
    let mut vars = HashMap::from([
        ("SESSION_SECRET".to_string(), "test-secret".to_string()),
        ("SPOONACULAR_API_KEY".to_string(), "spoon-key".to_string()),
        ("SPOONACULAR_BASE_URL".to_string(), server.uri()),
        (
            "OPENROUTER_API_URL".to_string(),
            format!("{}/api/v1/chat/completions", server.uri()),
        ),
        ("OPENAI_BASE_URL".to_string(), format!("{}/v1", server.uri())),
    ]);
    if ai_keys {
        vars.insert("OPENROUTER_API_KEY".to_string(), "or-key".to_string());
    }

    let settings = Settings::from_lookup(|key| vars.get(key).cloned());
    AppState::new(settings).unwrap()
}

fn app(server: &MockServer, ai_keys: bool) -> Router {
    router(state(server, ai_keys))
}

fn completion(content: &str) -> Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

fn post_json(uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("response sets the session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn adding_the_same_recipe_twice_keeps_one_entry() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    let first = app
        .clone()
        .oneshot(post_json("/api/add-to-shopping-list", json!({ "recipe_id": 42 }), None))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let cookie = session_cookie(&first);
    assert_eq!(body_json(first).await["count"], 1);

    let second = app
        .clone()
        .oneshot(post_json(
            "/api/add-to-shopping-list",
            json!({ "recipe_id": "42" }),
            Some(&cookie),
        ))
        .await
        .unwrap();
    let cookie = session_cookie(&second);
    let body = body_json(second).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 1);

    let removed = app
        .clone()
        .oneshot(post_json(
            "/api/remove-from-shopping-list",
            json!({ "recipe_id": 42 }),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(removed).await["count"], 0);
}

#[tokio::test]
async fn missing_recipe_id_is_a_bad_request() {
    let server = MockServer::start().await;
    let response = app(&server, false)
        .oneshot(post_json("/api/add-to-shopping-list", json!({}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No recipe ID provided");
}

#[tokio::test]
async fn shopping_list_is_computed_from_the_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mealplanner/shopping-list/compute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "aisles": [{ "aisle": "Pasta and Rice" }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = app(&server, false);

    let empty = app
        .clone()
        .oneshot(get("/api/get-shopping-list", None))
        .await
        .unwrap();
    assert_eq!(body_json(empty).await, json!({ "aisles": [] }));

    let added = app
        .clone()
        .oneshot(post_json("/api/add-to-shopping-list", json!({ "recipe_id": 7 }), None))
        .await
        .unwrap();
    let cookie = session_cookie(&added);

    let list = app
        .clone()
        .oneshot(get("/api/get-shopping-list", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(list).await["aisles"][0]["aisle"], "Pasta and Rice");

    let cleared = app
        .clone()
        .oneshot(post_json("/api/clear-shopping-list", json!({}), Some(&cookie)))
        .await
        .unwrap();
    let cookie = session_cookie(&cleared);
    let list = app
        .oneshot(get("/api/get-shopping-list", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(list).await, json!({ "aisles": [] }));
}

#[tokio::test]
async fn search_quota_error_shows_friendly_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recipes/complexSearch"))
        .respond_with(ResponseTemplate::new(402).set_body_string("Payment Required"))
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(get("/search?query=pasta", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let html = body_text(response).await;
    assert!(html.contains(QUOTA_MESSAGE));
    assert!(html.contains("value=\"pasta\""));
}

#[tokio::test]
async fn viewing_recipes_records_each_once() {
    let server = MockServer::start().await;
    for (id, title) in [(1u64, "Soup"), (2, "Salad")] {
        Mock::given(method("GET"))
            .and(path(format!("/recipes/{id}/information")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "title": title,
                "image": ""
            })))
            .mount(&server)
            .await;
    }
    let app = app(&server, false);

    let first = app.clone().oneshot(get("/recipe/1", None)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let cookie = session_cookie(&first);

    let again = app
        .clone()
        .oneshot(get("/recipe/1", Some(&cookie)))
        .await
        .unwrap();
    assert!(again.headers().get(header::SET_COOKIE).is_none());

    let second = app
        .clone()
        .oneshot(get("/recipe/2", Some(&cookie)))
        .await
        .unwrap();
    let cookie = session_cookie(&second);

    let viewed = app
        .oneshot(get("/api/viewed-recipes", Some(&cookie)))
        .await
        .unwrap();
    let ids: Vec<u64> = body_json(viewed).await["recipes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn chat_answers_with_provider_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Boil for 9 minutes." } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, true)
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "How do I boil an egg?", "history": [], "provider": "openrouter" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"], "Boil for 9 minutes.");
    assert_eq!(body["provider"], "openrouter");
    assert_eq!(body["history"], json!([{ "role": "assistant", "content": "Boil for 9 minutes." }]));
}

#[tokio::test]
async fn chat_echoes_history_with_one_assistant_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Boil it.")))
        .mount(&server)
        .await;

    let history = json!([
        { "role": "user", "content": "hi" },
        { "role": "assistant", "content": "hello" }
    ]);
    let response = app(&server, true)
        .oneshot(post_json(
            "/api/chat",
            json!({ "message": "egg?", "history": history }),
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(
        body["history"],
        json!([
            { "role": "user", "content": "hi" },
            { "role": "assistant", "content": "hello" },
            { "role": "assistant", "content": "Boil it." }
        ])
    );
}

#[tokio::test]
async fn chat_without_message_is_a_bad_request() {
    let server = MockServer::start().await;
    let response = app(&server, true)
        .oneshot(post_json("/api/chat", json!({ "history": [] }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No message provided");
    assert_eq!(body["provider"], "openrouter");
}

#[tokio::test]
async fn chat_without_configured_provider_is_unavailable() {
    let server = MockServer::start().await;
    let response = app(&server, false)
        .oneshot(post_json("/api/chat", json!({ "message": "hi", "provider": "openai" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], CONFIGURATION_MESSAGE);
}

#[tokio::test]
async fn chat_rate_limit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let response = app(&server, true)
        .oneshot(post_json("/api/chat", json!({ "message": "hi" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn meal_plan_keeps_meals_with_failed_details() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mealplanner/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meals": [{ "id": 10, "title": "Toast" }, { "id": 11, "title": "Stew" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recipes/10/information"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 10, "title": "Toast" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recipes/11/information"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(post_json(
            "/api/meal-plan",
            json!({ "timeFrame": "day", "targetCalories": 2000 }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["meals"].as_array().unwrap().len(), 2);
    assert_eq!(body["meals"][0]["details"]["title"], "Toast");
    assert_eq!(body["meals"][1]["details"], Value::Null);
}

#[tokio::test]
async fn meal_plan_accepts_calories_as_form_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mealplanner/generate"))
        .and(query_param("targetCalories", "1800"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "meals": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(post_json(
            "/api/meal-plan",
            json!({ "timeFrame": "day", "targetCalories": "1800" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["meals"], json!([]));
}

#[tokio::test]
async fn meal_plan_rejects_non_numeric_calories() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    for calories in [json!("lots"), json!("0"), json!(0)] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/meal-plan",
                json!({ "timeFrame": "day", "targetCalories": calories }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn meal_plan_rejects_unknown_time_frame() {
    let server = MockServer::start().await;
    let response = app(&server, false)
        .oneshot(post_json("/api/meal-plan", json!({ "timeFrame": "month" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn meal_plan_quota_maps_to_402() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mealplanner/generate"))
        .respond_with(ResponseTemplate::new(402))
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(post_json("/api/meal-plan", json!({}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body_json(response).await["error"], QUOTA_MESSAGE);
}

#[tokio::test]
async fn unknown_route_renders_not_found_page() {
    let server = MockServer::start().await;
    let response = app(&server, false)
        .oneshot(get("/does-not-exist", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Page not found"));
}

#[tokio::test]
async fn recipe_videos_route_wraps_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/food/videos/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "videos": [{ "title": "Tacos" }]
        })))
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(get("/api/recipe-videos/fish%20tacos", None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["videos"][0]["title"], "Tacos");
}

#[tokio::test]
async fn recipe_videos_with_undecodable_query_is_a_json_bad_request() {
    let server = MockServer::start().await;
    let response = app(&server, false)
        .oneshot(get("/api/recipe-videos/%FF", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await["error"].as_str().unwrap().to_string();
    assert!(error.starts_with("Invalid path parameter"));
}

#[tokio::test]
async fn nutrition_failure_answers_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/recipes/3/nutritionWidget.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let response = app(&server, false)
        .oneshot(get("/api/nutrition/3", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, Value::Null);
}

#[tokio::test]
async fn analyze_recipe_returns_structured_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({ "response_format": { "type": "json_object" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "{\"title\": \"Pancakes\", \"servings\": 4}",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let response = app(&server, true)
        .oneshot(post_json(
            "/api/analyze-recipe",
            json!({ "text": "Pancakes: 2 eggs, 1 cup flour" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], "Pancakes");
    assert_eq!(body["servings"], 4);
}

#[tokio::test]
async fn analyze_recipe_requires_text() {
    let server = MockServer::start().await;
    let response = app(&server, true)
        .oneshot(post_json("/api/analyze-recipe", json!({ "text": "  " }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No recipe text provided");
}

#[tokio::test]
async fn structured_ai_routes_without_provider_are_unavailable() {
    let server = MockServer::start().await;
    let app = app(&server, false);

    let analyze = app
        .clone()
        .oneshot(post_json("/api/analyze-recipe", json!({ "text": "Soup" }), None))
        .await
        .unwrap();
    assert_eq!(analyze.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(analyze).await["error"], CONFIGURATION_MESSAGE);

    let suggestions = app
        .oneshot(post_json(
            "/api/meal-suggestions",
            json!({ "preferences": "quick dinners" }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(suggestions.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(suggestions).await["error"], CONFIGURATION_MESSAGE);
}

#[tokio::test]
async fn meal_suggestions_require_preferences() {
    let server = MockServer::start().await;
    let response = app(&server, true)
        .oneshot(post_json(
            "/api/meal-suggestions",
            json!({ "ingredients": ["tofu"] }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No preferences provided");
}

#[tokio::test]
async fn meal_suggestions_return_parsed_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            "{\"suggestions\": [{\"name\": \"Tofu stir fry\"}]}",
        )))
        .mount(&server)
        .await;

    let response = app(&server, true)
        .oneshot(post_json(
            "/api/meal-suggestions",
            json!({ "preferences": "quick dinners", "ingredients": ["tofu"] }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["suggestions"][0]["name"], "Tofu stir fry");
}

async fn kitchen_fire() -> &'static str {
    panic!("kitchen fire")
}

#[tokio::test]
async fn panicking_handler_renders_internal_error_page() {
    let server = MockServer::start().await;
    let routes = Router::new().route("/boom", get_route(kitchen_fire));
    let app = recover_panics(routes, state(&server, false));

    let response = app.oneshot(get("/boom", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains(INTERNAL_ERROR_MESSAGE));
}
