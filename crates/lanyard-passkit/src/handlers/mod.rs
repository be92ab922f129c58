//! Route handlers for the pass update protocol.

pub mod check;
pub mod fetch;
pub mod list;
pub mod register;
pub mod unregister;

use lanyard_core::serial::StudentId;

use crate::error::Error;

/// Wire serials that fail validation behave as unknown passes.
pub(crate) fn parse_serial(raw: &str) -> Result<StudentId, Error> {
  StudentId::parse(raw).map_err(|_| Error::NotFound)
}

/// The server serves exactly one pass type; any other identifier is an
/// unknown resource.
pub(crate) fn ensure_pass_type(
  configured: &str,
  requested: &str,
) -> Result<(), Error> {
  if configured == requested {
    Ok(())
  } else {
    Err(Error::NotFound)
  }
}
