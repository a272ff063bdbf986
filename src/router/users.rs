//! Account administration and profile routes, all behind a login token.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router, middleware};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Result;
use crate::router::Valid;
use crate::router::signup::send_verification;
use crate::user::{
    Account, AccountPatch, Candidate, CreateMode, PasswordChange, PublicInfo, Role,
};
use crate::{AppState, middleware as guard};

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct CreateBody {
    #[validate(length(min = 1, max = 254, message = "Username must be 1 to 254 characters long."))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "Password is required."))]
    pub password: String,
    #[validate(email(message = "Email must be formated."))]
    pub email: Option<String>,
    pub name: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Default, Validate, Serialize, Deserialize)]
pub struct UpdateBody {
    #[validate(length(max = 100, message = "Name must be at most 100 characters long."))]
    pub name: Option<String>,
    #[validate(email(message = "Email must be formated."))]
    pub email: Option<String>,
    pub company: Option<String>,
    pub company_role: Option<String>,
    #[validate(url(message = "Photo must be an URL."))]
    pub photo: Option<String>,
}

impl From<UpdateBody> for AccountPatch {
    fn from(body: UpdateBody) -> Self {
        AccountPatch {
            name: body.name,
            company: body.company,
            company_role: body.company_role,
            photo: body.photo,
        }
    }
}

#[derive(Debug, Validate, Serialize, Deserialize)]
pub struct ResetBody {
    #[validate(length(min = 1, message = "Username is required."))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "Password is required."))]
    pub password: String,
}

/// Routes mounted under `/users`.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list)
                .put(update)
                .merge(
                    post(create)
                        .patch(reset_password)
                        .route_layer(middleware::from_fn(guard::admin)),
                ),
        )
        .route(
            "/uid/{uid}",
            get(by_uid).merge(
                delete(remove).route_layer(middleware::from_fn(guard::admin)),
            ),
        )
        .route("/username/{username}", get(by_username))
        .route_layer(middleware::from_fn_with_state(state, guard::auth))
}

/// Hide private fields of others unless `caller` is an admin.
fn visible(caller: &Account, info: PublicInfo) -> PublicInfo {
    if caller.role == Role::Admin || caller.id == info.id {
        info
    } else {
        info.redacted()
    }
}

pub async fn list(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
) -> Result<Json<Vec<PublicInfo>>> {
    let users = state.accounts.get_all().await?;

    Ok(Json(
        users
            .into_iter()
            .map(|info| visible(&caller, info))
            .collect(),
    ))
}

pub async fn by_uid(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Path(uid): Path<String>,
) -> Result<Json<PublicInfo>> {
    let info = state.accounts.get_by_uid(&uid).await?;
    Ok(Json(visible(&caller, info)))
}

pub async fn by_username(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Path(username): Path<String>,
) -> Result<Json<PublicInfo>> {
    let info = state.accounts.get_by_username(&username).await?;
    Ok(Json(visible(&caller, info)))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Valid(body): Valid<CreateBody>,
) -> Result<(StatusCode, Json<PublicInfo>)> {
    let candidate = Candidate {
        username: body.username,
        password: body.password,
        email: body.email,
        name: body.name,
        company: body.company,
        company_role: body.company_role,
        role: body.role,
    };

    let info = state
        .accounts
        .create_local(candidate, CreateMode::Admin { caller: caller.role })
        .await?;

    Ok((StatusCode::CREATED, Json(info)))
}

/// Merge profile fields. A new email is staged and mailed a link, as
/// `POST /email` does.
pub async fn update(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Valid(mut body): Valid<UpdateBody>,
) -> Result<Json<PublicInfo>> {
    let staged = match body.email.take().filter(|email| !email.is_empty()) {
        Some(email) => Some(
            state
                .accounts
                .request_email_change(&caller.id, &email)
                .await?,
        ),
        None => None,
    };

    let info = state
        .accounts
        .update_details(&caller.id, &body.into())
        .await?;

    if let Some(account) = staged {
        send_verification(&state, &account).await;
    }

    Ok(Json(info))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Valid(body): Valid<ResetBody>,
) -> Result<Json<PublicInfo>> {
    let info = state
        .accounts
        .update_password(PasswordChange::AdminReset {
            caller: caller.role,
            username: body.username,
            new: body.password,
        })
        .await?;
    tracing::info!(admin = %caller.uid, uid = %info.uid, "password overridden");

    Ok(Json(info))
}

pub async fn remove(
    State(state): State<AppState>,
    Extension(caller): Extension<Account>,
    Path(uid): Path<String>,
) -> Result<Json<PublicInfo>> {
    let target = state.accounts.get_by_uid(&uid).await?;
    let info = state.accounts.remove(&target.id).await?;
    tracing::info!(admin = %caller.uid, uid = %info.uid, "account removed by admin");

    Ok(Json(info))
}
