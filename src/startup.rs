use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::AuthService;
use crate::logger::RequestLogger;
use crate::middleware::BearerAuth;
use crate::routes::{health_check, login, logout, me, refresh, signup};

pub fn run(listener: TcpListener, auth: Arc<AuthService>) -> Result<Server, std::io::Error> {
    let auth_data = web::Data::from(auth.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            .app_data(auth_data.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/signup", web::post().to(signup))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Routes behind a live, unrevoked access token
            .service(
                web::scope("/api")
                    .wrap(BearerAuth::new(auth.clone()))
                    .route("/logout", web::post().to(logout))
                    .route("/me", web::get().to(me)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
