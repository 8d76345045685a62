/*!
 * # Actor identity
 *
 * Authentication and permission storage live outside this crate. By the time a
 * call reaches the ledger the permission gate has already said yes; what is
 * left is *who* is acting and whether they rank as a manager.
 */

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the authenticated user id, set by the upstream gateway.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the authenticated user's role name.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Role names as issued by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Staff,
    Manager,
    Admin,
    SuperAdmin,
}

/// The authenticated user on whose behalf an operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn staff(id: Uuid) -> Self {
        Self::new(id, Role::Staff)
    }

    pub fn manager(id: Uuid) -> Self {
        Self::new(id, Role::Manager)
    }

    /// The one place that decides "manager or above".
    pub fn is_manager_or_above(&self) -> bool {
        matches!(self.role, Role::Manager | Role::Admin | Role::SuperAdmin)
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ServiceError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| ServiceError::Unauthorized(format!("{} header is not valid text", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // An auth layer in front of us may already have resolved the actor
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }

        let id = header_value(parts, ACTOR_ID_HEADER)?
            .trim()
            .parse::<Uuid>()
            .map_err(|_| ServiceError::Unauthorized("actor id is not a valid UUID".to_string()))?;
        let role = header_value(parts, ACTOR_ROLE_HEADER)?
            .trim()
            .parse::<Role>()
            .map_err(|_| ServiceError::Unauthorized("unknown actor role".to_string()))?;

        Ok(Actor::new(id, role))
    }
}
