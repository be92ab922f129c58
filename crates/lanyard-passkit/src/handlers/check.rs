//! GET single-registration handler — existence probe for one (device, serial)
//! pair.

use axum::{
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::{IntoResponse, Response},
};
use lanyard_builder::PassBuilder;
use lanyard_core::store::PassStore;

use crate::{
  AppState,
  auth::authorize,
  error::Error,
  handlers::{ensure_pass_type, parse_serial},
};

pub async fn handler<S, B>(
  State(state): State<AppState<S, B>>,
  Path((device_id, pass_type_id, serial)): Path<(String, String, String)>,
  headers: HeaderMap,
) -> Result<Response, Error>
where
  S: PassStore + 'static,
  B: PassBuilder + 'static,
{
  let serial = parse_serial(&serial)?;
  ensure_pass_type(&state.config.pass_type_id, &pass_type_id)?;
  authorize(&headers, &state.tokens, state.config.auth_mode, &serial)?;

  let registered = state
    .store
    .has_registration(device_id, serial)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;

  if registered {
    Ok(StatusCode::OK.into_response())
  } else {
    Err(Error::NotFound)
  }
}
