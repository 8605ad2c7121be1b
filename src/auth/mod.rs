//! Authentication: token lifecycle, identity-provider client, PKCE
//! material, and the per-session state arena.

pub mod error;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod token;

pub use error::{AuthError, AuthErrorKind};
pub use pkce::{PendingLogin, challenge_s256};
pub use provider::{IdentityProvider, IssuedTokens, OauthProvider};
pub use session::{Session, SessionStore};
pub use token::{EXPIRY_BUFFER_MS, TokenManager, TokenState};
