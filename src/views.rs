use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use minijinja::{context, Environment};
use serde::Serialize;
use tracing::error;

pub const NOT_FOUND_MESSAGE: &str = "Page not found";
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred. Please try again later.";

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../templates/base.html")),
    ("index.html", include_str!("../templates/index.html")),
    ("recipe.html", include_str!("../templates/recipe.html")),
    ("chat.html", include_str!("../templates/chat.html")),
    ("meal_plan.html", include_str!("../templates/meal_plan.html")),
    ("shopping_list.html", include_str!("../templates/shopping_list.html")),
];

/// Embedded HTML templates.
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<String, minijinja::Error> {
        self.env.get_template(name)?.render(ctx)
    }

    /// Renders a page; a broken template degrades to a plain-text 500.
    pub fn page<S: Serialize>(&self, status: StatusCode, name: &str, ctx: S) -> Response {
        match self.render(name, ctx) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                error!(template = name, "failed to render page: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE).into_response()
            }
        }
    }

    /// The landing page carrying an error, keeping any search context.
    pub fn error_page(&self, status: StatusCode, message: &str, search_query: Option<&str>) -> Response {
        self.page(
            status,
            "index.html",
            context! {
                error => message,
                search_query => search_query,
            },
        )
    }
}
