//! Minimal tsu-apm example — instrumented JSON endpoints.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users        # noticed error
//!   curl http://localhost:3000/boom                 # recovered panic
//!
//! Every request logs one `tsu_apm::transaction` event. Set
//! `TSU_APM_NAMING=route` to name transactions by path pattern instead of
//! by handler.

use http::StatusCode;
use tracing_subscriber::EnvFilter;
use tsu_apm::apm::LogReporter;
use tsu_apm::middleware::{Instrument, InstrumentConfig};
use tsu_apm::{Context, Response, Router, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let instrument = Instrument::new(LogReporter::new()).config(InstrumentConfig {
        record_panics: true,
        ..InstrumentConfig::from_env()
    });

    let app = Router::new()
        .layer(instrument)
        .get("/users/{id}", get_user)
        .post("/users", create_user)
        .delete("/users/{id}", |_: &mut Context| StatusCode::NO_CONTENT)
        .get("/boom", boom);

    Server::bind("0.0.0.0:3000")
        .serve(app)
        .await
        .expect("server error");
}

// GET /users/{id}
fn get_user(ctx: &mut Context) -> Response {
    let id = ctx.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#))
}

// POST /users
//
// An empty body is reported on the transaction and answered with 400.
fn create_user(ctx: &mut Context) -> Response {
    if ctx.request().body().is_empty() {
        ctx.transaction().notice_error(&std::io::Error::other("empty request body"));
        return Response::status(StatusCode::BAD_REQUEST);
    }

    ctx.transaction().add_attribute("user.source", "signup");
    Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#)
}

// GET /boom → recovered as 500, noticed as a panic error
fn boom(_ctx: &mut Context) {
    panic!("boom");
}
