/// Middleware module
///
/// Bearer-token authentication for protected routes. Request logging lives
/// in `crate::logger`.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
