//! Cookie-backed session.
//!
//! The whole session is serialized into one cookie as
//! `base64url(json).base64url(hmac_sha256(json))`. Nothing is kept server
//! side; concurrent requests from one browser race and the last write wins.

use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderValue,
};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, warn};

use crate::recipe_provider::RecipeSummary;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

/// Browsers silently drop cookies larger than this.
pub const MAX_COOKIE_BYTES: usize = 4096;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Session {
    #[serde(default)]
    viewed_recipes: Vec<RecipeSummary>,
    #[serde(default)]
    shopping_list: Vec<u64>,
}

impl Session {
    pub fn viewed_recipes(&self) -> &[RecipeSummary] {
        &self.viewed_recipes
    }

    /// Appends the summary unless a recipe with the same id was already seen.
    pub fn record_view(&mut self, summary: RecipeSummary) -> bool {
        if self.viewed_recipes.iter().any(|seen| seen.id == summary.id) {
            return false;
        }
        self.viewed_recipes.push(summary);
        true
    }

    pub fn shopping_list_ids(&self) -> &[u64] {
        &self.shopping_list
    }

    pub fn add_to_shopping_list(&mut self, recipe_id: u64) -> usize {
        if !self.shopping_list.contains(&recipe_id) {
            self.shopping_list.push(recipe_id);
        }
        self.shopping_list.len()
    }

    pub fn remove_from_shopping_list(&mut self, recipe_id: u64) -> usize {
        self.shopping_list.retain(|id| *id != recipe_id);
        self.shopping_list.len()
    }

    pub fn clear_shopping_list(&mut self) {
        self.shopping_list.clear();
    }
}

/// Signs and verifies session cookies.
#[derive(Clone)]
pub struct SessionStore {
    mac: HmacSha256,
}

impl SessionStore {
    pub fn new(secret: &str) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        Self { mac }
    }

    fn signature(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn encode(&self, session: &Session) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_vec(session)?;
        let signature = self.signature(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// `None` when the value is malformed or the signature does not match.
    pub fn decode(&self, value: &str) -> Option<Session> {
        let (payload, signature) = value.split_once('.')?;
        let payload = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(&payload);
        mac.verify_slice(&signature).ok()?;

        serde_json::from_slice(&payload).ok()
    }

    /// Reads the session from the request cookies, starting fresh when it is
    /// missing or invalid.
    pub fn load(&self, headers: &HeaderMap) -> Session {
        let Some(value) = find_cookie(headers, SESSION_COOKIE) else {
            return Session::default();
        };

        self.decode(value).unwrap_or_else(|| {
            debug!("discarding invalid session cookie");
            Session::default()
        })
    }

    pub fn cookie(&self, session: &Session) -> Option<HeaderValue> {
        let encoded = self
            .encode(session)
            .map_err(|e| error!("failed to serialize session: {e}"))
            .ok()?;

        let cookie = format!("{SESSION_COOKIE}={encoded}; Path=/; HttpOnly; SameSite=Lax");
        if cookie.len() > MAX_COOKIE_BYTES {
            warn!(
                bytes = cookie.len(),
                viewed = session.viewed_recipes.len(),
                shopping_list = session.shopping_list.len(),
                "session cookie exceeds the browser size limit and may be dropped"
            );
        }

        HeaderValue::from_str(&cookie)
            .map_err(|e| error!("invalid session cookie value: {e}"))
            .ok()
    }

    /// Attaches the updated session cookie to a response.
    pub fn respond(&self, session: &Session, body: impl IntoResponse) -> Response {
        let mut response = body.into_response();
        if let Some(cookie) = self.cookie(session) {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        response
    }
}

fn find_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
