//! HTTP routes.
//!
//! Pages render HTML through [`Views`](crate::views::Views); `/api/*` routes
//! answer JSON. Session state is loaded at the start of a handler and written
//! back with the response.

use std::{any::Any, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::assistant::{normalize_history, ChatTurn, HistoryEntry};
use crate::error::AppError;
use crate::recipe_provider::{MealPlanRequest, RecipeSummary, TimeFrame};
use crate::state::AppState;
use crate::views::{INTERNAL_ERROR_MESSAGE, NOT_FOUND_MESSAGE};

pub type SharedState = Arc<AppState>;

pub const DEFAULT_TARGET_CALORIES: u32 = 2000;
pub const VIDEO_RESULTS: u32 = 3;

pub fn router(state: SharedState) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/recipe/:id", get(recipe))
        .route("/chat", get(chat_page))
        .route("/meal-plan", get(meal_plan_page))
        .route("/shopping-list", get(shopping_list_page))
        .route("/api/chat", post(api_chat))
        .route("/api/meal-plan", post(api_meal_plan))
        .route("/api/add-to-shopping-list", post(add_to_shopping_list))
        .route("/api/remove-from-shopping-list", post(remove_from_shopping_list))
        .route("/api/get-shopping-list", get(get_shopping_list))
        .route("/api/clear-shopping-list", post(clear_shopping_list))
        .route("/api/viewed-recipes", get(viewed_recipes))
        .route("/api/nutrition/:id", get(nutrition))
        .route("/api/recipe-videos/*query", get(recipe_videos))
        .route("/api/analyze-recipe", post(analyze_recipe))
        .route("/api/meal-suggestions", post(meal_suggestions))
        .fallback(not_found)
        .with_state(state.clone());

    recover_panics(routes, state).layer(TraceLayer::new_for_http())
}

/// Turns a panicking handler into the internal error page.
pub fn recover_panics(routes: Router, state: SharedState) -> Router {
    routes.layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
        let detail = panic
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| panic.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic");
        error!("handler panicked: {detail}");
        state
            .views
            .error_page(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE, None)
    }))
}

// ============================================================================
// Pages
// ============================================================================

async fn index(State(state): State<SharedState>) -> Response {
    state.views.page(StatusCode::OK, "index.html", context! {})
}

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
    #[serde(default)]
    query: String,
    diet: Option<String>,
    intolerances: Option<String>,
}

async fn search(State(state): State<SharedState>, Query(params): Query<SearchParams>) -> Response {
    let query = params.query.trim();
    if query.is_empty() {
        return state.views.page(StatusCode::OK, "index.html", context! {});
    }

    info!(query, "searching recipes");
    match state
        .recipes
        .search_recipes(query, params.diet.as_deref(), params.intolerances.as_deref())
        .await
    {
        Ok(recipes) => state.views.page(
            StatusCode::OK,
            "index.html",
            context! {
                recipes => recipes,
                search_query => query,
                diet => params.diet,
                intolerances => params.intolerances,
            },
        ),
        Err(e) => {
            let err = AppError::from_provider(&e, "An error occurred while searching for recipes.");
            state
                .views
                .error_page(err.status(), &err.to_string(), Some(query))
        }
    }
}

async fn recipe(
    State(state): State<SharedState>,
    headers: HeaderMap,
    id: Result<Path<u64>, PathRejection>,
) -> Response {
    let Ok(Path(id)) = id else {
        return not_found(State(state)).await;
    };

    let recipe = match state.recipes.recipe_info(id).await {
        Ok(recipe) => recipe,
        Err(e) => {
            let err = AppError::from_provider(&e, "Could not retrieve recipe information. Please try again.");
            return state.views.error_page(err.status(), &err.to_string(), None);
        }
    };

    let page = state
        .views
        .page(StatusCode::OK, "recipe.html", context! { recipe => &recipe });

    let mut session = state.sessions.load(&headers);
    match RecipeSummary::from_recipe(&recipe) {
        Some(summary) => {
            if session.record_view(summary) {
                state.sessions.respond(&session, page)
            } else {
                page
            }
        }
        None => {
            warn!(recipe_id = id, "recipe without id or title, not recorded as viewed");
            page
        }
    }
}

async fn chat_page(State(state): State<SharedState>) -> Response {
    state.views.page(
        StatusCode::OK,
        "chat.html",
        context! {
            openrouter_available => state.assistants.openrouter_available(),
            openai_available => state.assistants.openai_available(),
        },
    )
}

async fn meal_plan_page(State(state): State<SharedState>) -> Response {
    state.views.page(StatusCode::OK, "meal_plan.html", context! {})
}

async fn shopping_list_page(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let session = state.sessions.load(&headers);
    state.views.page(
        StatusCode::OK,
        "shopping_list.html",
        context! {
            viewed_recipes => session.viewed_recipes(),
            shopping_list => session.shopping_list_ids(),
        },
    )
}

async fn not_found(State(state): State<SharedState>) -> Response {
    state
        .views
        .error_page(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE, None)
}

// ============================================================================
// Chat
// ============================================================================

fn default_provider() -> String {
    "openrouter".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    message: String,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default = "default_provider")]
    provider: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    response: String,
    provider: &'static str,
    history: Vec<ChatTurn>,
}

fn chat_error(err: AppError, provider: &str) -> Response {
    (
        err.status(),
        Json(json!({ "error": err.to_string(), "provider": provider })),
    )
        .into_response()
}

async fn api_chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => return chat_error(rejection.into(), &default_provider()),
    };

    let message = request.message.trim();
    if message.is_empty() {
        return chat_error(AppError::validation("No message provided"), &request.provider);
    }

    let Some(assistant) = state.assistants.select(&request.provider) else {
        error!(requested = %request.provider, "no AI provider configured");
        return chat_error(AppError::Configuration, &request.provider);
    };

    let mut history = normalize_history(request.history);
    match assistant.reply(message, &history).await {
        Ok(response) => {
            history.push(ChatTurn::assistant(response.clone()));
            Json(ChatResponse {
                response,
                provider: assistant.provider_name(),
                history,
            })
            .into_response()
        }
        Err(e) => {
            let err = AppError::from_assistant(
                assistant.provider_name(),
                &e,
                "Could not get a response from the AI. Please try again.",
            );
            chat_error(err, assistant.provider_name())
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRecipeRequest {
    #[serde(default)]
    text: String,
}

async fn analyze_recipe(
    State(state): State<SharedState>,
    payload: Result<Json<AnalyzeRecipeRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::validation("No recipe text provided"));
    }

    let assistant = state.assistants.structured().ok_or(AppError::Configuration)?;
    assistant.analyze_recipe(text).await.map(Json).map_err(|e| {
        AppError::from_assistant(
            assistant.provider_name(),
            &e,
            "Could not analyze recipe. Please try again.",
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct MealSuggestionRequest {
    #[serde(default)]
    preferences: String,
    restrictions: Option<String>,
    #[serde(default)]
    ingredients: Vec<String>,
}

async fn meal_suggestions(
    State(state): State<SharedState>,
    payload: Result<Json<MealSuggestionRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let preferences = request.preferences.trim();
    if preferences.is_empty() {
        return Err(AppError::validation("No preferences provided"));
    }

    let assistant = state.assistants.structured().ok_or(AppError::Configuration)?;
    assistant
        .suggest_meals(preferences, request.restrictions.as_deref(), &request.ingredients)
        .await
        .map(Json)
        .map_err(|e| {
            AppError::from_assistant(
                assistant.provider_name(),
                &e,
                "Could not generate meal suggestions. Please try again.",
            )
        })
}

// ============================================================================
// Meal plan
// ============================================================================

/// Form fields arrive either as JSON numbers or as the input's string value.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum NumericInput {
    Number(u64),
    Text(String),
}

impl NumericInput {
    /// `None` for a blank string.
    fn value(self, field: &str) -> Result<Option<u64>, AppError> {
        match self {
            NumericInput::Number(number) => Ok(Some(number)),
            NumericInput::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                text.parse()
                    .map(Some)
                    .map_err(|_| AppError::validation(format!("Invalid {field}: {text}")))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealPlanBody {
    #[serde(default)]
    time_frame: TimeFrame,
    target_calories: Option<NumericInput>,
    diet: Option<String>,
    exclude: Option<String>,
}

async fn api_meal_plan(
    State(state): State<SharedState>,
    payload: Result<Json<MealPlanBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;

    let target_calories = match body.target_calories {
        Some(input) => input.value("targetCalories")?,
        None => None,
    }
    .map_or(Ok(DEFAULT_TARGET_CALORIES), u32::try_from)
    .ok()
    .filter(|calories| *calories > 0)
    .ok_or_else(|| AppError::validation("targetCalories must be a positive number"))?;

    let request = MealPlanRequest {
        time_frame: body.time_frame,
        target_calories,
        diet: body.diet,
        exclude: body.exclude,
    };

    state
        .recipes
        .generate_meal_plan(&request)
        .await
        .map(Json)
        .map_err(|e| AppError::from_provider(&e, "Could not generate meal plan. Please try again."))
}

// ============================================================================
// Shopping list
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ShoppingListItem {
    recipe_id: Option<NumericInput>,
}

impl ShoppingListItem {
    fn recipe_id(self) -> Result<u64, AppError> {
        let id = match self.recipe_id {
            Some(input) => input.value("recipe ID")?,
            None => None,
        };
        id.filter(|id| *id != 0)
            .ok_or_else(|| AppError::validation("No recipe ID provided"))
    }
}

async fn add_to_shopping_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<ShoppingListItem>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(item) = payload?;
    let recipe_id = item.recipe_id()?;

    let mut session = state.sessions.load(&headers);
    let count = session.add_to_shopping_list(recipe_id);
    info!(recipe_id, count, "added recipe to shopping list");

    Ok(state.sessions.respond(
        &session,
        Json(json!({
            "success": true,
            "message": "Recipe added to shopping list",
            "count": count,
        })),
    ))
}

async fn remove_from_shopping_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<ShoppingListItem>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(item) = payload?;
    let recipe_id = item.recipe_id()?;

    let mut session = state.sessions.load(&headers);
    let count = session.remove_from_shopping_list(recipe_id);
    info!(recipe_id, count, "removed recipe from shopping list");

    Ok(state.sessions.respond(
        &session,
        Json(json!({
            "success": true,
            "message": "Recipe removed from shopping list",
            "count": count,
        })),
    ))
}

async fn get_shopping_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let session = state.sessions.load(&headers);

    state
        .recipes
        .generate_shopping_list(session.shopping_list_ids())
        .await
        .map(Json)
        .map_err(|e| AppError::from_provider(&e, "Could not generate shopping list. Please try again."))
}

async fn clear_shopping_list(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let mut session = state.sessions.load(&headers);
    session.clear_shopping_list();

    state.sessions.respond(
        &session,
        Json(json!({ "success": true, "message": "Shopping list cleared" })),
    )
}

async fn viewed_recipes(State(state): State<SharedState>, headers: HeaderMap) -> Json<Value> {
    let session = state.sessions.load(&headers);
    Json(json!({ "recipes": session.viewed_recipes() }))
}

// ============================================================================
// Recipe extras
// ============================================================================

async fn nutrition(
    State(state): State<SharedState>,
    id: Result<Path<u64>, PathRejection>,
) -> Result<Json<Option<Value>>, AppError> {
    let Path(id) = id?;
    Ok(Json(state.recipes.recipe_nutrition(id).await))
}

async fn recipe_videos(
    State(state): State<SharedState>,
    query: Result<Path<String>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(query) = query?;
    let videos = state.recipes.recipe_videos(&query, VIDEO_RESULTS).await;
    Ok(Json(json!({ "videos": videos })))
}
