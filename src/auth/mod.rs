/// Authentication module
///
/// Password hashing, JWT issuing/parsing, refresh-token persistence and the
/// service that ties them into sign-in, refresh, sign-out and password change.

pub mod claims;
pub mod jwt;
pub mod member;
pub mod memory;
pub mod password;
pub mod refresh_token;
pub mod service;
pub mod sweeper;

pub use claims::{Claims, TokenType};
pub use jwt::{IssuedRefreshToken, TokenCodec};
pub use member::{Member, MemberRole, MemberStatus, MemberStore, NewMember, PgMemberStore};
pub use memory::{InMemoryMemberStore, InMemorySessionStore};
pub use password::PasswordHasher;
pub use refresh_token::{hash_token, NewRefreshToken, PgSessionStore, RefreshTokenRecord, SessionStore};
pub use service::{AuthService, AuthTokens, ClientContext, MemberProfile, MemberSummary, SignUpRequest};
pub use sweeper::{spawn_session_sweeper, sweep_once};
