mod auth;
mod health_check;

pub use auth::{change_password, client_context, me, refresh, sign_in, sign_out, sign_up};
pub use health_check::health_check;
