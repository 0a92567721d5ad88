//! Request handlers. Side effects are handed to the notifier and never
//! change the response.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::Uri,
    response::Redirect,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::state::HttpState;
use crate::{
    application::{
        error::AppError,
        repos::{NewUserRecord, RepoError},
    },
    domain::entities::PlanRecord,
};

#[derive(Debug, Serialize)]
pub(super) struct HealthView {
    status: &'static str,
    outstanding: usize,
}

pub(super) async fn health(State(state): State<HttpState>) -> Json<HealthView> {
    Json(HealthView {
        status: "ok",
        outstanding: state.tracker.outstanding(),
    })
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginForm {
    email: String,
    password: String,
}

pub(super) async fn login(
    State(state): State<HttpState>,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, AppError> {
    let Some(user) = state.members.find_user_by_email(&form.email).await? else {
        info!(email = %form.email, "login for unknown account");
        return Ok(Redirect::to("/login"));
    };

    if !user.is_active() {
        info!(email = %user.email, "login for inactive account");
        return Ok(Redirect::to("/login"));
    }

    if !state.members.password_matches(&user, &form.password).await? {
        if let Err(err) = state.notifier.failed_login_alert(&user.email).await {
            warn!(recipient = %user.email, error = %err, "failed to queue login alert");
        }
        return Ok(Redirect::to("/login"));
    }

    Ok(Redirect::to("/"))
}

#[derive(Debug, Deserialize)]
pub(super) struct RegisterForm {
    email: String,
    #[serde(alias = "first-name")]
    first_name: String,
    #[serde(alias = "last-name")]
    last_name: String,
    password: String,
}

pub(super) async fn register(
    State(state): State<HttpState>,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect, AppError> {
    let new_user = NewUserRecord {
        email: form.email,
        first_name: form.first_name,
        last_name: form.last_name,
        password: form.password,
    };

    let user = match state.members.insert_user(new_user).await {
        Ok(user) => user,
        Err(RepoError::Duplicate { .. }) => {
            info!("registration for an existing email");
            return Ok(Redirect::to("/register"));
        }
        Err(RepoError::InvalidInput { message }) => {
            info!(reason = %message, "registration rejected");
            return Ok(Redirect::to("/register"));
        }
        Err(err) => return Err(err.into()),
    };

    let mut link = state
        .public_url
        .join("activate-account")
        .map_err(|err| AppError::unexpected(format!("activation link: {err}")))?;
    link.query_pairs_mut().append_pair("email", &user.email);
    let signed = state.signer.sign(link.as_str());

    if let Err(err) = state.notifier.account_confirmation(&user.email, &signed).await {
        warn!(recipient = %user.email, error = %err, "failed to queue confirmation mail");
    }

    Ok(Redirect::to("/login"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct ActivateQuery {
    email: String,
}

pub(super) async fn activate_account(
    State(state): State<HttpState>,
    Query(query): Query<ActivateQuery>,
    uri: Uri,
) -> Result<Redirect, AppError> {
    let path_and_query = uri
        .path_and_query()
        .map(|value| value.as_str())
        .unwrap_or_default();

    let verified = state
        .public_url
        .join(path_and_query.trim_start_matches('/'))
        .map(|candidate| state.signer.verify(candidate.as_str()))
        .unwrap_or(false);

    if !verified || query.email.is_empty() {
        warn!(email = %query.email, "activation link failed verification");
        return Ok(Redirect::to("/login"));
    }

    match state.members.activate_user(&query.email).await {
        Ok(user) => info!(email = %user.email, "account activated"),
        Err(RepoError::NotFound) => warn!(email = %query.email, "activation for unknown account"),
        Err(err) => return Err(err.into()),
    }

    Ok(Redirect::to("/login"))
}

pub(super) async fn list_plans(
    State(state): State<HttpState>,
) -> Result<Json<Vec<PlanRecord>>, AppError> {
    Ok(Json(state.members.list_plans().await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct SubscribeForm {
    email: String,
    plan: i64,
}

pub(super) async fn subscribe(
    State(state): State<HttpState>,
    Form(form): Form<SubscribeForm>,
) -> Result<Redirect, AppError> {
    let Some(plan) = state.members.find_plan(form.plan).await? else {
        warn!(plan = form.plan, "subscription to unknown plan");
        return Ok(Redirect::to("/members/plans"));
    };
    let Some(user) = state.members.find_user_by_email(&form.email).await? else {
        warn!(email = %form.email, "subscription for unknown account");
        return Ok(Redirect::to("/members/plans"));
    };

    // Detached; failures surface through the error sink.
    let _tasks = state.notifier.subscription_documents(&user, &plan);

    state.members.subscribe_user_to_plan(user.id, plan.id).await?;
    info!(email = %user.email, plan = %plan.name, "subscribed");

    Ok(Redirect::to("/members/plans"))
}
