//! Caller identification.
//!
//! Authentication happens upstream; requests arrive carrying the actor's id and role in
//! headers. An optional shared API key guards the whole surface.

use crate::error::{ApiError, ApiResult};
use clinic_core::{Actor, Capability, Role};
use clinic_types::NonEmptyText;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
/// Comma separated capabilities granted on top of the role's set.
pub const ACTOR_CAPABILITIES_HEADER: &str = "x-actor-capabilities";

/// Validates the provided API key against the configured one.
///
/// No configured key means the check is disabled.
pub fn validate_api_key(expected: Option<&str>, provided: Option<&str>) -> ApiResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match provided {
        Some(key) if key == expected => Ok(()),
        Some(_) => Err(ApiError::unauthorized("Invalid API key")),
        None => Err(ApiError::unauthorized("Missing API key")),
    }
}

/// Builds the acting identity from header values.
pub fn actor_from_headers(
    id: Option<&str>,
    role: Option<&str>,
    capabilities: Option<&str>,
) -> ApiResult<Actor> {
    let id = id
        .and_then(|v| NonEmptyText::new(v).ok())
        .ok_or_else(|| ApiError::unauthorized(format!("missing {ACTOR_ID_HEADER} header")))?;
    let role: Role = role
        .ok_or_else(|| ApiError::unauthorized(format!("missing {ACTOR_ROLE_HEADER} header")))?
        .trim()
        .parse()
        .map_err(ApiError::bad_request)?;

    let mut actor = Actor::new(id, role);
    for name in capabilities
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let capability: Capability = name.parse().map_err(ApiError::bad_request)?;
        actor = actor.with_grant(capability);
    }
    Ok(actor)
}

/// Header pairs identifying `actor`, for clients of the REST surface.
pub fn actor_headers(actor: &Actor) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (ACTOR_ID_HEADER, actor.id().to_string()),
        (ACTOR_ROLE_HEADER, actor.role().to_string()),
    ];
    let extra: Vec<&str> = actor
        .capabilities()
        .iter()
        .filter(|c| !actor.role().capabilities().contains(c))
        .map(|c| c.as_str())
        .collect();
    if !extra.is_empty() {
        headers.push((ACTOR_CAPABILITIES_HEADER, extra.join(",")));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::ErrorKind;

    #[test]
    fn api_key_check_is_optional() {
        assert!(validate_api_key(None, None).is_ok());
        assert!(validate_api_key(Some("k"), Some("k")).is_ok());
        assert_eq!(validate_api_key(Some("k"), Some("x")).unwrap_err().status, 401);
        assert_eq!(validate_api_key(Some("k"), None).unwrap_err().status, 401);
    }

    #[test]
    fn actor_is_built_from_headers() {
        let actor =
            actor_from_headers(Some("ph-1"), Some("pharmacist"), Some("cancel_lab_order, "))
                .unwrap();
        assert_eq!(actor.role(), Role::Pharmacist);
        assert!(actor.can(Capability::DispensePrescription));
        assert!(actor.can(Capability::CancelLabOrder));
        assert!(!actor.can(Capability::ProgressLabOrder));
    }

    #[test]
    fn unknown_role_is_bad_request() {
        let err = actor_from_headers(Some("x"), Some("janitor"), None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
        let err = actor_from_headers(None, Some("admin"), None).unwrap_err();
        assert_eq!(err.status, 401);
    }

    #[test]
    fn only_extra_grants_are_sent() {
        let actor = actor_from_headers(Some("dr-1"), Some("doctor"), None)
            .unwrap()
            .with_grant(Capability::UpdateInvoiceStatus);
        let headers = actor_headers(&actor);
        assert_eq!(
            headers.last(),
            Some(&(ACTOR_CAPABILITIES_HEADER, "update_invoice_status".to_string()))
        );
    }

    #[test]
    fn header_grants_do_not_cross_role_boundaries() {
        let actor = actor_from_headers(
            Some("dr-1"),
            Some("doctor"),
            Some("delete_invoice, progress_lab_order"),
        )
        .unwrap();
        assert!(!actor.can(Capability::DeleteInvoice));
        assert!(!actor.can(Capability::ProgressLabOrder));
    }
}
