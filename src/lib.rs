//! Portal auth is an identity and session service: password and OAuth login,
//! bearer tokens and account onboarding.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod mail;
mod middleware;
pub mod oauth;
mod router;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post, put};
use axum::{Router, middleware as AxumMiddleware};
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::store::{
    CredentialStore, DEFAULT_CREDENTIALS, DEFAULT_DATABASE_NAME,
    DEFAULT_POOL_SIZE, MemoryStore, PostgresStore,
};
use crate::user::{AccountManager, social::SocialResolver};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State with in-memory collaborators and a seeded `admin` account.
#[cfg(test)]
pub struct TestState {
    pub app: AppState,
    pub mailer: Arc<mail::MemoryMailer>,
}

#[cfg(test)]
impl TestState {
    /// Login token of `username`.
    pub async fn login(&self, username: &str) -> String {
        let account = self.app.accounts.login(username).await.unwrap();
        self.app
            .token
            .create(&account, token::TokenKind::Login)
            .unwrap()
    }

    /// Sign up a local account then log it in.
    pub async fn signup(&self, username: &str, password: &str) -> String {
        let candidate = user::Candidate {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        };
        self.app
            .accounts
            .create_local(candidate, user::CreateMode::Signup)
            .await
            .unwrap();
        self.login(username).await
    }
}

#[cfg(test)]
pub async fn test_state() -> TestState {
    let mut config = config::Configuration::default();
    config.name = "portal".into();
    config.url = "https://auth.example.com".into();
    config.portal_url = "https://portal.example.com".into();
    config.auth.github = true;

    let accounts = Arc::new(AccountManager::new(
        Arc::new(MemoryStore::new()),
        crypto::test_password_manager(),
    ));
    accounts
        .seed_admin("admin", "admin-password", None)
        .await
        .unwrap();

    let github: Arc<dyn oauth::IdentityProvider> = Arc::new(oauth::FakeProvider {
        profile: user::social::ProviderProfile {
            provider: user::Kind::Github,
            id: "583231".into(),
            name: Some("octocat".into()),
            email: Some("octocat@github.com".into()),
            email_verified: true,
            avatar_url: None,
        },
    });
    let providers = oauth::Providers::from([(user::Kind::Github, github)]);

    let mailer = Arc::new(mail::MemoryMailer::default());

    TestState {
        app: AppState {
            config: Arc::new(config),
            social: Arc::new(SocialResolver::new(Arc::clone(&accounts))),
            accounts,
            token: Arc::new(token::test_token_manager(
                Arc::new(clock::SystemClock),
                "test-secret",
            )),
            mailer: Arc::clone(&mailer) as Arc<dyn mail::Mailer>,
            providers: Arc::new(providers),
        },
        mailer,
    }
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub accounts: Arc<AccountManager>,
    pub social: Arc<SocialResolver>,
    pub token: Arc<token::TokenManager>,
    pub mailer: Arc<dyn mail::Mailer>,
    pub providers: Arc<oauth::Providers>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove senstive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/signup", post(router::signup::handler))
        .route(
            "/login",
            post(router::login::handler).get(router::login::redirect),
        )
        .route("/oauth/callback", get(router::oauth::callback))
        .route(
            "/logout",
            post(router::logout::handler).route_layer(
                AxumMiddleware::from_fn_with_state(state.clone(), middleware::auth),
            ),
        )
        .route(
            "/password",
            put(router::password::change).route_layer(
                AxumMiddleware::from_fn_with_state(state.clone(), middleware::auth),
            ),
        )
        .route("/password/forgot", post(router::password::forgot))
        .route("/password/reset", post(router::password::reset))
        .route(
            "/email",
            get(router::email::verify).merge(
                post(router::email::request)
                    .delete(router::email::restore)
                    .route_layer(AxumMiddleware::from_fn_with_state(
                        state.clone(),
                        middleware::auth,
                    )),
            ),
        )
        // `/users` requires a login token.
        .nest("/users", router::users::router(state.clone()))
        .fallback(router::not_found)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var("CONFIG_PATH") {
        config = config.path(PathBuf::from(path));
    }
    let config = config.read()?;

    let store: Arc<dyn CredentialStore> = match config.postgres {
        Some(ref config) => {
            let store = PostgresStore::new(
                &config.address,
                config.username.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.password.as_deref().unwrap_or(DEFAULT_CREDENTIALS),
                config.database.as_deref().unwrap_or(DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            )
            .await?;

            // execute migrations scripts on start.
            store.migrate().await?;
            Arc::new(store)
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, accounts are kept in memory"
            );
            Arc::new(MemoryStore::new())
        },
    };

    let pwd = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);
    let accounts = Arc::new(AccountManager::new(store, pwd));

    if let Some(admin) = &config.admin {
        accounts
            .seed_admin(&admin.username, &admin.password, admin.name.clone())
            .await?;
    }

    // handle jwt.
    let token = Arc::new(token::TokenManager::new(
        &config,
        Arc::new(clock::SystemClock),
    )?);

    let providers = Arc::new(oauth::providers(&config));
    tracing::info!(
        local = config.auth.local,
        providers = providers.len(),
        "authentication methods ready"
    );

    Ok(AppState {
        social: Arc::new(SocialResolver::new(Arc::clone(&accounts))),
        config,
        accounts,
        token,
        mailer: Arc::new(mail::LogMailer),
        providers,
    })
}
