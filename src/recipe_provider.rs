//! Spoonacular client.
//!
//! Primary calls (search, recipe detail, meal plan, shopping list) return a
//! [`ProviderError`]. Enrichment calls (similar recipes, videos, nutrition)
//! log and degrade to empty data so they never fail the request they enrich.

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::config::Settings;

pub const SEARCH_RESULTS: u32 = 12;
pub const SIMILAR_RECIPES: u32 = 3;
pub const RECIPE_VIDEOS: u32 = 1;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{operation}: {reason}")]
    InvalidRequest {
        operation: &'static str,
        reason: &'static str,
    },
    #[error("{operation} request failed: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl ProviderError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ProviderError::Status { status, .. } => Some(*status),
            ProviderError::Network { source, .. } => source.status(),
            ProviderError::InvalidRequest { .. } => None,
        }
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ProviderError::InvalidRequest { operation, .. }
            | ProviderError::Network { operation, .. }
            | ProviderError::Status { operation, .. } => operation,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        self.status() == Some(StatusCode::PAYMENT_REQUIRED)
    }

    pub fn is_rate_limited(&self) -> bool {
        if self.status() == Some(StatusCode::TOO_MANY_REQUESTS) {
            return true;
        }
        match self {
            ProviderError::Status { body, .. } => body.to_lowercase().contains("rate limit"),
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    #[default]
    Day,
    Week,
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeFrame::Day => f.write_str("day"),
            TimeFrame::Week => f.write_str("week"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MealPlanRequest {
    pub time_frame: TimeFrame,
    pub target_calories: u32,
    pub diet: Option<String>,
    pub exclude: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecipeProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RecipeProvider {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_settings(settings: &Settings, http: &Client) -> Self {
        Self::new(
            http.clone(),
            settings.spoonacular_base_url.clone(),
            settings.spoonacular_api_key.clone(),
        )
    }

    async fn get_json(
        &self,
        operation: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(operation, %url, "recipe provider request");

        let response = self
            .http
            .get(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|source| ProviderError::Network { operation, source })?;

        read_json(operation, response).await
    }

    /// Up to twelve recipe summaries; an empty list is a valid answer.
    pub async fn search_recipes(
        &self,
        query: &str,
        diet: Option<&str>,
        intolerances: Option<&str>,
    ) -> Result<Vec<Value>, ProviderError> {
        const OPERATION: &str = "search recipes";

        let query = query.trim();
        if query.is_empty() {
            return Err(ProviderError::InvalidRequest {
                operation: OPERATION,
                reason: "query must not be empty",
            });
        }

        let mut params = vec![
            ("query", query.to_string()),
            ("addRecipeInformation", "true".to_string()),
            ("fillIngredients", "true".to_string()),
            ("number", SEARCH_RESULTS.to_string()),
        ];
        push_optional(&mut params, "diet", diet);
        push_optional(&mut params, "intolerances", intolerances);

        let body = self.get_json(OPERATION, "/recipes/complexSearch", &params).await?;
        Ok(take_array(body, "results"))
    }

    /// Full recipe detail plus best-effort `similar_recipes` and `videos`.
    pub async fn recipe_info(&self, id: u64) -> Result<Value, ProviderError> {
        let mut recipe = self
            .get_json(
                "get recipe info",
                &format!("/recipes/{id}/information"),
                &[("includeNutrition", "true".to_string())],
            )
            .await?;

        let similar = self.similar_recipes(id, SIMILAR_RECIPES).await;

        let title = recipe
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let videos = if title.is_empty() {
            Vec::new()
        } else {
            self.recipe_videos(&title, RECIPE_VIDEOS).await
        };

        if let Some(fields) = recipe.as_object_mut() {
            fields.insert("similar_recipes".to_string(), Value::Array(similar));
            if !videos.is_empty() {
                fields.insert("videos".to_string(), Value::Array(videos));
            }
        }

        Ok(recipe)
    }

    pub async fn similar_recipes(&self, id: u64, number: u32) -> Vec<Value> {
        match self
            .get_json(
                "get similar recipes",
                &format!("/recipes/{id}/similar"),
                &[("number", number.to_string())],
            )
            .await
        {
            Ok(Value::Array(recipes)) => recipes,
            Ok(other) => {
                warn!(recipe_id = id, "unexpected similar recipes payload: {other}");
                Vec::new()
            }
            Err(e) => {
                warn!(recipe_id = id, status = ?e.status(), "similar recipes unavailable: {e}");
                Vec::new()
            }
        }
    }

    pub async fn recipe_videos(&self, query: &str, number: u32) -> Vec<Value> {
        match self
            .get_json(
                "get recipe videos",
                "/food/videos/search",
                &[("query", query.to_string()), ("number", number.to_string())],
            )
            .await
        {
            Ok(body) => take_array(body, "videos"),
            Err(e) => {
                warn!(query, status = ?e.status(), "recipe videos unavailable: {e}");
                Vec::new()
            }
        }
    }

    /// Generates a plan; single-day plans get each meal's full recipe under
    /// `details`, or `null` when that lookup fails.
    pub async fn generate_meal_plan(&self, request: &MealPlanRequest) -> Result<Value, ProviderError> {
        let mut params = vec![
            ("timeFrame", request.time_frame.to_string()),
            ("targetCalories", request.target_calories.to_string()),
        ];
        push_optional(&mut params, "diet", request.diet.as_deref());
        push_optional(&mut params, "exclude", request.exclude.as_deref());

        let mut plan = self
            .get_json("generate meal plan", "/mealplanner/generate", &params)
            .await?;

        if request.time_frame == TimeFrame::Day {
            if let Some(Value::Array(meals)) = plan.get_mut("meals") {
                for meal in meals.iter_mut() {
                    let details = match meal.get("id").and_then(Value::as_u64) {
                        Some(id) => match self.recipe_info(id).await {
                            Ok(details) => details,
                            Err(e) => {
                                warn!(recipe_id = id, status = ?e.status(), "meal plan recipe details unavailable: {e}");
                                Value::Null
                            }
                        },
                        None => {
                            warn!("meal plan entry without a numeric id");
                            Value::Null
                        }
                    };
                    if let Some(fields) = meal.as_object_mut() {
                        fields.insert("details".to_string(), details);
                    }
                }
            }
        }

        Ok(plan)
    }

    /// Aisle-grouped ingredients for one serving of each recipe. No upstream
    /// call is made for an empty list.
    pub async fn generate_shopping_list(&self, ids: &[u64]) -> Result<Value, ProviderError> {
        const OPERATION: &str = "generate shopping list";

        if ids.is_empty() {
            return Ok(json!({ "aisles": [] }));
        }

        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "id": id, "servings": 1 }))
            .collect();

        let url = format!("{}/mealplanner/shopping-list/compute", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("apiKey", self.api_key.as_str())])
            .json(&json!({ "items": items }))
            .send()
            .await
            .map_err(|source| ProviderError::Network {
                operation: OPERATION,
                source,
            })?;

        read_json(OPERATION, response).await
    }

    /// Nutrition widget data, or `None` when it cannot be fetched.
    pub async fn recipe_nutrition(&self, id: u64) -> Option<Value> {
        match self
            .get_json(
                "get recipe nutrition",
                &format!("/recipes/{id}/nutritionWidget.json"),
                &[],
            )
            .await
        {
            Ok(nutrition) => Some(nutrition),
            Err(e) => {
                warn!(recipe_id = id, status = ?e.status(), "nutrition unavailable: {e}");
                None
            }
        }
    }
}

async fn read_json(operation: &'static str, response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        error!(operation, %status, "recipe provider rejected request");
        return Err(ProviderError::Status {
            operation,
            status,
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|source| ProviderError::Network { operation, source })
}

fn push_optional(params: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        params.push((key, value.to_string()));
    }
}

fn take_array(body: Value, key: &str) -> Vec<Value> {
    match body {
        Value::Object(mut fields) => match fields.remove(key) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// The `{id, title, image}` triple kept in the session for viewed recipes.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub image: String,
}

impl RecipeSummary {
    pub fn from_recipe(recipe: &Value) -> Option<Self> {
        let fields: &Map<String, Value> = recipe.as_object()?;
        Some(Self {
            id: fields.get("id")?.as_u64()?,
            title: fields.get("title")?.as_str()?.to_string(),
            image: fields
                .get("image")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}
