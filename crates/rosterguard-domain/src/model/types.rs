//! Core identity and request types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalizes an email address for use as a principal and cache key.
///
/// Comparison everywhere in the crate is on the normalized form, so
/// `Alice@Example.org ` and `alice@example.org` address the same entry.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The identity of the currently authenticated user.
///
/// Replaced wholesale on every session change; there are no setters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    id: String,
    email: String,
}

impl Principal {
    /// Creates a principal, normalizing the email.
    pub fn new(id: impl Into<String>, email: &str) -> Self {
        Self {
            id: id.into(),
            email: normalize_email(email),
        }
    }

    /// Returns the provider-assigned user id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the normalized email.
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.id, self.email)
    }
}

/// A session as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Provider session identifier; changes on every sign-in.
    pub id: String,
    /// Provider user identifier.
    pub user_id: String,
    /// Email address of the signed-in user.
    pub email: String,
}

impl Session {
    /// Creates a new session.
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            email: email.into(),
        }
    }

    /// Returns the principal this session authenticates.
    pub fn principal(&self) -> Principal {
        Principal::new(self.user_id.clone(), &self.email)
    }
}

/// Session-change notification delivered by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A user signed in.
    SignedIn(Option<Session>),
    /// The user signed out.
    SignedOut(Option<Session>),
    /// The provider rotated the session's access token.
    TokenRefreshed(Option<Session>),
    /// First notification after subscribing, describing the restored session.
    InitialSession(Option<Session>),
}

impl SessionEvent {
    /// Returns the session carried by the event, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session)
            | Self::SignedOut(session)
            | Self::TokenRefreshed(session)
            | Self::InitialSession(session) => session.as_ref(),
        }
    }

    /// Returns a stable name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut(_) => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
            Self::InitialSession(_) => "initial_session",
        }
    }
}

/// Authorization level of a principal, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// No elevated privileges. Also the fail-closed outcome.
    #[default]
    None,
    /// Member with elevated, non-administrative rights.
    ElevatedMember,
    /// Administrator.
    Administrator,
    /// Administrator that can manage other administrators.
    SuperAdministrator,
}

impl Role {
    /// Returns true for any role above [`Role::None`].
    pub fn is_elevated(self) -> bool {
        self > Role::None
    }

    /// Returns true for administrators and super-administrators.
    pub fn is_admin(self) -> bool {
        self >= Role::Administrator
    }

    /// Returns the role name as used in logs and storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::None => "none",
            Role::ElevatedMember => "elevated_member",
            Role::Administrator => "administrator",
            Role::SuperAdministrator => "super_administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Member record as returned by the directory's email lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Directory identifier of the member.
    pub id: String,
    /// Legacy boolean administrator flag on the member row.
    pub is_admin: bool,
}

impl MemberRecord {
    /// Creates a new member record.
    pub fn new(id: impl Into<String>, is_admin: bool) -> Self {
        Self {
            id: id.into(),
            is_admin,
        }
    }
}

/// Explicit admin-level record attached to a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminLevelRecord {
    /// The level granted to the member.
    pub level: Role,
}

impl AdminLevelRecord {
    /// Creates a new admin-level record.
    pub fn new(level: Role) -> Self {
        Self { level }
    }
}

/// A request to resolve permissions for an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Email to resolve (normalized on construction).
    pub email: String,
    /// Set by the explicit sign-in flow; always bypasses the cache.
    pub is_explicit_sign_in: bool,
    /// Caller asks for a fresh answer even if the cache has one.
    pub force_refresh: bool,
}

impl ResolutionRequest {
    /// A plain session restore that prefers the cache.
    pub fn restore(email: &str) -> Self {
        Self {
            email: normalize_email(email),
            is_explicit_sign_in: false,
            force_refresh: false,
        }
    }

    /// Resolution on behalf of an explicit sign-in.
    pub fn explicit_sign_in(email: &str) -> Self {
        Self {
            email: normalize_email(email),
            is_explicit_sign_in: true,
            force_refresh: false,
        }
    }

    /// A forced refresh that skips the cache.
    pub fn forced(email: &str) -> Self {
        Self {
            email: normalize_email(email),
            is_explicit_sign_in: false,
            force_refresh: true,
        }
    }

    /// Returns true if this request must not be answered from the cache.
    pub fn bypasses_cache(&self) -> bool {
        self.is_explicit_sign_in || self.force_refresh
    }
}
