//! Identity and role resolution.
//!
//! A request resolves to an [`Identity`]: the user id (from an OIDC
//! subject claim or an opaque API-key mapping), an optional client id
//! (from the `X-API-Key` / `X-Client-ID` headers), and the resolved role
//! set. Role resolution OR's three mechanisms — OIDC role mapping,
//! explicit user-id lists, and API-key client-id lists — and `admin`
//! implies `auditor`.

mod error;
mod identity;
mod resolver;

pub use error::AuthError;
pub use identity::{Identity, Role, RoleSet};
pub use resolver::{Authenticator, RoleResolver};
