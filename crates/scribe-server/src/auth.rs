//! OAuth login, sessions and logout.
//!
//! `/login/{provider}` sends the browser to the provider with a random `state`
//! remembered in a short-lived cookie. The callback checks that state, exchanges
//! the code for a token, reads the provider's userinfo endpoint and starts a
//! session. Admins are recognized from config by `provider:id` or email.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use scribe_store::{OAuthProfile, User, SESSION_TTL_SECS};

use crate::error::{ApiError, ServerError};
use crate::extract::MaybeUser;
use crate::server::{now, AppState};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "scribe_session";

/// Cookie holding `provider:state` between the redirect and the callback.
const STATE_COOKIE: &str = "scribe_oauth_state";
const STATE_TTL_MINUTES: i64 = 10;

/// One `[[oauth]]` entry. Endpoints and scopes default to the provider's preset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

struct Preset {
    auth_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
    scopes: &'static [&'static str],
}

fn preset(name: &str) -> Option<Preset> {
    match name {
        "github" => Some(Preset {
            auth_url: "https://github.com/login/oauth/authorize",
            token_url: "https://github.com/login/oauth/access_token",
            userinfo_url: "https://api.github.com/user",
            scopes: &["read:user", "user:email"],
        }),
        "google" => Some(Preset {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo",
            scopes: &["openid", "email", "profile"],
        }),
        _ => None,
    }
}

/// Errors that can occur while completing a login.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Userinfo request failed: {0}")]
    Userinfo(#[from] reqwest::Error),

    #[error("Provider response has no user id")]
    MissingId,
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// A configured provider ready to start logins.
pub struct OAuthProvider {
    pub name: String,
    client: BasicClient,
    userinfo_url: String,
    scopes: Vec<String>,
}

impl OAuthProvider {
    /// Build a provider whose callback lives under `site_url`.
    pub fn new(config: &ProviderConfig, site_url: &str) -> Result<Self, ServerError> {
        let preset = preset(&config.name);
        let oauth_error = |message: String| ServerError::OAuth {
            provider: config.name.clone(),
            message,
        };

        let endpoint = |configured: &Option<String>, preset_value: Option<&'static str>, what: &str| {
            configured
                .clone()
                .or_else(|| preset_value.map(str::to_string))
                .ok_or_else(|| oauth_error(format!("{what} is required for custom providers")))
        };

        let auth_url = endpoint(&config.auth_url, preset.as_ref().map(|p| p.auth_url), "auth_url")?;
        let token_url = endpoint(&config.token_url, preset.as_ref().map(|p| p.token_url), "token_url")?;
        let userinfo_url = endpoint(
            &config.userinfo_url,
            preset.as_ref().map(|p| p.userinfo_url),
            "userinfo_url",
        )?;

        let scopes = if config.scopes.is_empty() {
            preset
                .as_ref()
                .map(|p| p.scopes.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default()
        } else {
            config.scopes.clone()
        };

        let redirect = format!(
            "{}/auth/callback/{}",
            site_url.trim_end_matches('/'),
            config.name
        );

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(auth_url).map_err(|e| oauth_error(e.to_string()))?,
            Some(TokenUrl::new(token_url).map_err(|e| oauth_error(e.to_string()))?),
        )
        .set_redirect_uri(RedirectUrl::new(redirect).map_err(|e| oauth_error(e.to_string()))?);

        Ok(Self {
            name: config.name.clone(),
            client,
            userinfo_url,
            scopes,
        })
    }

    /// Authorization URL and the state value it carries.
    pub fn authorize_url(&self) -> (String, String) {
        let (url, csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .url();
        (url.to_string(), csrf.secret().clone())
    }

    /// Exchange an authorization code and read the user's profile.
    pub async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        code: String,
    ) -> Result<OAuthProfile, LoginError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .request_async(async_http_client)
            .await
            .map_err(|e| LoginError::Exchange(e.to_string()))?;

        let info: Value = http
            .get(&self.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        profile_from_userinfo(&self.name, &info).ok_or(LoginError::MissingId)
    }
}

/// Configured providers by name.
#[derive(Default)]
pub struct OAuthProviders {
    providers: BTreeMap<String, OAuthProvider>,
}

impl OAuthProviders {
    pub fn new(configs: &[ProviderConfig], site_url: &str) -> Result<Self, ServerError> {
        let mut providers = BTreeMap::new();
        for config in configs {
            if config.client_id.is_empty() {
                tracing::warn!("Skipping OAuth provider {} without a client id", config.name);
                continue;
            }
            providers.insert(config.name.clone(), OAuthProvider::new(config, site_url)?);
        }
        Ok(Self { providers })
    }

    pub fn get(&self, name: &str) -> Option<&OAuthProvider> {
        self.providers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

/// Map a userinfo document to a profile. GitHub and OIDC field names are both understood.
pub fn profile_from_userinfo(provider: &str, info: &Value) -> Option<OAuthProfile> {
    let text = |key: &str| {
        info.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let provider_id = match info.get("id").or_else(|| info.get("sub"))? {
        Value::String(id) if !id.is_empty() => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return None,
    };

    let email = text("email");
    let name = text("name")
        .or_else(|| text("login"))
        .or_else(|| email.clone())
        .unwrap_or_else(|| format!("{provider} user"));

    Some(OAuthProfile {
        provider: provider.to_string(),
        provider_id,
        name,
        email,
        avatar_url: text("avatar_url").or_else(|| text("picture")),
    })
}

/// Whether `profile` is listed in `admins` by `provider:id` or by email.
pub fn is_admin(admins: &[String], profile: &OAuthProfile) -> bool {
    let key = format!("{}:{}", profile.provider, profile.provider_id);
    admins.iter().any(|admin| {
        admin == &key
            || profile
                .email
                .as_deref()
                .is_some_and(|email| admin.eq_ignore_ascii_case(email))
    })
}

fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(SESSION_TTL_SECS))
        .build()
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", get(login))
        .route("/login/{provider}", get(login_with))
        .route("/auth/callback/{provider}", get(callback))
        .route("/logout", get(logout))
        .route("/api/auth/status", get(status))
}

async fn login(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let names = state.oauth.names();
    if let [only] = names.as_slice() {
        return Ok(Redirect::to(&format!("/login/{only}")).into_response());
    }

    let html = state.templates.login(state.layout(), &names)?;
    Ok(Html(html).into_response())
}

async fn login_with(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| ApiError::NotFound("Login provider".to_string()))?;

    let (url, csrf) = provider.authorize_url();
    let cookie = Cookie::build((STATE_COOKIE, format!("{}:{}", provider.name, csrf)))
        .path("/")
        .http_only(true)
        .secure(state.config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(STATE_TTL_MINUTES));

    Ok((jar.add(cookie), Redirect::to(&url)))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!("Login was not completed: {error}")));
    }

    let provider = state
        .oauth
        .get(&provider)
        .ok_or_else(|| ApiError::NotFound("Login provider".to_string()))?;

    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let received = query
        .state
        .map(|s| format!("{}:{}", provider.name, s));
    if expected.is_none() || expected != received {
        return Err(ApiError::BadRequest("Invalid login state".to_string()));
    }

    let code = query
        .code
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let profile = provider.fetch_profile(&state.http, code).await?;
    let admin = is_admin(&state.config.admins, &profile);
    let user = state.store.upsert_user(&profile, admin, now())?;
    let token = state.store.create_session(user.id, now())?;

    tracing::info!(user = user.id, provider = %provider.name, "User signed in");

    let jar = jar
        .remove(Cookie::build(STATE_COOKIE).path("/"))
        .add(session_cookie(token, state.config.secure_cookies));
    Ok((jar, Redirect::to("/")))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.store.delete_session(cookie.value())?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Redirect::to("/")))
}

#[derive(Debug, Serialize)]
struct AuthStatus {
    authenticated: bool,
    user: Option<User>,
    providers: Vec<String>,
}

async fn status(State(state): State<Arc<AppState>>, MaybeUser(user): MaybeUser) -> Json<AuthStatus> {
    Json(AuthStatus {
        authenticated: user.is_some(),
        user,
        providers: state.oauth.names().into_iter().map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn github() -> ProviderConfig {
        ProviderConfig {
            name: "github".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn reads_github_and_oidc_profiles() {
        let github = profile_from_userinfo(
            "github",
            &json!({ "id": 42, "login": "octo", "name": null, "avatar_url": "https://a/1.png" }),
        )
        .unwrap();
        assert_eq!(github.provider_id, "42");
        assert_eq!(github.name, "octo");
        assert_eq!(github.avatar_url.as_deref(), Some("https://a/1.png"));

        let google = profile_from_userinfo(
            "google",
            &json!({ "sub": "1098", "name": "Ada", "email": "ada@example.com", "picture": "https://p" }),
        )
        .unwrap();
        assert_eq!(google.provider_id, "1098");
        assert_eq!(google.email.as_deref(), Some("ada@example.com"));
        assert_eq!(google.avatar_url.as_deref(), Some("https://p"));

        assert!(profile_from_userinfo("x", &json!({ "name": "no id" })).is_none());
    }

    #[test]
    fn matches_admins_by_key_or_email() {
        let profile = OAuthProfile {
            provider: "github".to_string(),
            provider_id: "42".to_string(),
            name: "octo".to_string(),
            email: Some("Octo@Example.com".to_string()),
            avatar_url: None,
        };

        assert!(is_admin(&["github:42".to_string()], &profile));
        assert!(is_admin(&["octo@example.com".to_string()], &profile));
        assert!(!is_admin(&["google:42".to_string()], &profile));
        assert!(!is_admin(&[], &profile));
    }

    #[test]
    fn presets_fill_in_endpoints() {
        let provider = OAuthProvider::new(&github(), "https://blog.example.com/").unwrap();
        let (url, state) = provider.authorize_url();

        assert!(url.starts_with("https://github.com/login/oauth/authorize?"));
        assert!(url.contains(&format!("state={state}")));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fblog.example.com%2Fauth%2Fcallback%2Fgithub"));
    }

    #[test]
    fn custom_providers_need_endpoints() {
        let config = ProviderConfig {
            name: "forge".to_string(),
            client_id: "id".to_string(),
            ..Default::default()
        };
        assert!(OAuthProvider::new(&config, "http://localhost").is_err());

        let providers = OAuthProviders::new(
            &[github(), ProviderConfig { name: "google".to_string(), ..Default::default() }],
            "http://localhost",
        )
        .unwrap();
        assert_eq!(providers.names(), vec!["github"]);
    }
}
