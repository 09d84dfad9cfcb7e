pub mod session;
pub mod storage;

pub use session::{
    AuthEndpoint, AuthRequest, LoginRequest, RegisterRequest, SessionManager, SessionStatus,
    SignOutReason,
};
pub use storage::{CredentialStore, MemoryCredentialStore};
