//! Session handling: state, identity provider, sign-in and the store actor.

mod gate;
mod live;
mod provider;
mod sign_in;
mod state;
mod store;

#[cfg(test)]
mod tests;

pub use gate::LoadingGate;
pub use live::{LiveSession, SignOutDisposition};
pub use provider::IdentityProvider;
pub use sign_in::{SignInFlow, SignInGuard, SignInToken};
pub use state::{AuthState, AuthStateHandle, AuthView, SessionPhase};
pub use store::SessionStore;
