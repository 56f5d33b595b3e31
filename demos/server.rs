//! Serves `/` behind a [QuotaGate] with the default limits.
//!
//! ```sh
//! RUST_LOG=actix_quota_gate=debug cargo run --example server
//! curl -H 'X-User-ID: alice' -H 'X-Request-Type: message' http://127.0.0.1:8080/
//! ```

use actix_quota_gate::{IdentityFunctionBuilder, QuotaEngine, QuotaGate};
use actix_web::{web, App, HttpResponse, HttpServer};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Built once so that every worker shares the same counters
    let engine = QuotaEngine::new();
    let address = ("127.0.0.1", 8080);
    log::info!("Server started at {}:{}", address.0, address.1);
    HttpServer::new(move || {
        let gate = QuotaGate::builder(engine.clone(), IdentityFunctionBuilder::new().build())
            .add_headers()
            .build();
        App::new()
            .wrap(gate)
            .route("/", web::get().to(|| async { HttpResponse::Ok().body("Request allowed") }))
    })
    .bind(address)?
    .run()
    .await
}
