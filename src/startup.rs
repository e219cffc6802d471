use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::routes::{change_password, health_check, me, refresh, sign_in, sign_out, sign_up};

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let codec = service.tokens().clone();
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)
            // Shared state
            .app_data(service.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    // Public routes
                    .route("/sign-up", web::post().to(sign_up))
                    .route("/sign-in", web::post().to(sign_in))
                    .route("/refresh", web::post().to(refresh))
                    .route("/sign-out", web::post().to(sign_out))
                    // Protected routes (require an access token)
                    .service(
                        web::resource("/change-password")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::post().to(change_password)),
                    )
                    .service(
                        web::resource("/me")
                            .wrap(JwtMiddleware::new(codec.clone()))
                            .route(web::get().to(me)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
