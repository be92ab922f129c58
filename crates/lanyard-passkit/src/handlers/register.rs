//! POST registration handler — a device asks to be told when a pass changes.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use lanyard_builder::PassBuilder;
use lanyard_core::{
  registration::{PushToken, RegisterOutcome},
  store::PassStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState, Environment,
  auth::authorize,
  error::Error,
  handlers::{ensure_pass_type, parse_serial},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterBody {
  pub push_token: Option<String>,
}

pub async fn handler<S, B>(
  State(state): State<AppState<S, B>>,
  Path((device_id, pass_type_id, serial)): Path<(String, String, String)>,
  headers: HeaderMap,
  body: Option<Json<RegisterBody>>,
) -> Result<Response, Error>
where
  S: PassStore + 'static,
  B: PassBuilder + 'static,
{
  let serial = parse_serial(&serial)?;
  ensure_pass_type(&state.config.pass_type_id, &pass_type_id)?;
  authorize(&headers, &state.tokens, state.config.auth_mode, &serial)?;

  let presented = body.and_then(|Json(b)| b.push_token).unwrap_or_default();
  let push_token = if presented.is_empty() {
    match state.config.environment {
      Environment::Production => {
        return Err(Error::BadRequest("missing pushToken".to_string()));
      }
      // Keeps the registration flow testable before real push tokens exist.
      Environment::Development => {
        let placeholder = format!("dev-{}", Uuid::new_v4());
        tracing::debug!(%serial, "synthesised placeholder push token");
        PushToken::single(placeholder)
      }
    }
  } else {
    PushToken::single(presented)
  };

  let outcome = state
    .store
    .register_device(serial, device_id, push_token)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;

  match outcome {
    RegisterOutcome::Created        => Ok(StatusCode::CREATED.into_response()),
    RegisterOutcome::Updated        => Ok(StatusCode::OK.into_response()),
    RegisterOutcome::UnknownSubject => Err(Error::NotFound),
  }
}
