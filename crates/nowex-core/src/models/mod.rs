//! Wire models shared with the admin dashboard.
//!
//! - `LoginRequest`, `Session`, `SessionUser`: the login exchange
//! - `User`, `UserRole`, `UserStatus`: admin user directory entries
//!
//! With the `ts` feature enabled these types also derive `ts_rs::TS` so the
//! front-end can import the same shapes.

pub mod session;
pub mod user;

pub use session::{LoginRequest, Session, SessionUser};
pub use user::{User, UserRole, UserStatus};
