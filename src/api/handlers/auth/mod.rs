pub mod context;
pub mod login;
pub mod otp;
pub mod roles;
pub mod types;
pub mod users;

pub use self::context::{auth_context, AuthContext};
pub use self::roles::{ManageAction, Role};
