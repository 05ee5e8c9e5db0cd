use std::sync::Arc;

use reqwest::Client;

use crate::assistant::Assistants;
use crate::config::Settings;
use crate::recipe_provider::RecipeProvider;
use crate::session::SessionStore;
use crate::views::Views;

/// Everything a handler needs, built once from [`Settings`].
pub struct AppState {
    pub settings: Settings,
    pub recipes: RecipeProvider,
    pub assistants: Assistants,
    pub sessions: SessionStore,
    pub views: Views,
}

impl AppState {
    pub fn new(settings: Settings) -> Result<Arc<Self>, minijinja::Error> {
        let http = Client::new();

        let recipes = RecipeProvider::from_settings(&settings, &http);
        let assistants = Assistants::from_settings(&settings, &http);
        let sessions = SessionStore::new(&settings.session_secret);
        let views = Views::new()?;

        Ok(Arc::new(Self {
            settings,
            recipes,
            assistants,
            sessions,
            views,
        }))
    }
}
