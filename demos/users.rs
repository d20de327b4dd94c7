//! pliny demo — a user service behind three HTTP routes.
//!
//! Run with:
//!   cargo run --example users
//!
//! Try:
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","admin":true}'
//!   curl http://localhost:3000/users/1
//!   curl http://localhost:3000/users?limit=10

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use http::{Method, StatusCode};
use parking_lot::Mutex;
use pliny::{
    ActResult, BoxFuture, Dispatcher, Error, Json, Message, Plugin, Reply, Request, Response,
    RouteOptions, Router, Server, middleware,
};
use serde_json::{Value, json};

/// Actions keyed on `role:user` plus a `cmd`.
#[derive(Default)]
struct Users {
    next_id: AtomicU64,
    rows: Mutex<BTreeMap<u64, Value>>,
}

impl Users {
    fn load(&self, msg: &Message<'_>) -> ActResult {
        let id = msg.str("id").and_then(|id| id.parse::<u64>().ok())
            .ok_or_else(|| Error::rejected(StatusCode::BAD_REQUEST, "id must be a number"))?;
        self.rows.lock().get(&id).cloned()
            .ok_or_else(|| Error::rejected(StatusCode::NOT_FOUND, format!("no user {id}")))
    }

    fn create(&self, msg: &Message<'_>) -> ActResult {
        let name = msg.str("name")
            .ok_or_else(|| Error::rejected(StatusCode::UNPROCESSABLE_ENTITY, "name is required"))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let user = json!({"id": id, "name": name});
        self.rows.lock().insert(id, user.clone());
        msg.reply().set_status(StatusCode::CREATED);
        Ok(user)
    }

    fn list(&self, msg: &Message<'_>) -> ActResult {
        let limit = msg.str("limit").and_then(|l| l.parse().ok()).unwrap_or(usize::MAX);
        Ok(self.rows.lock().values().take(limit).cloned().collect())
    }
}

impl Dispatcher for Users {
    fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult> {
        Box::pin(async move {
            match (message.str("role"), message.str("cmd")) {
                (Some("user"), Some("load")) => self.load(&message),
                (Some("user"), Some("create")) => self.create(&message),
                (Some("user"), Some("list")) => self.list(&message),
                _ => Err(Error::rejected(StatusCode::NOT_FOUND, "no matching action")),
            }
        })
    }
}

/// Renders the action's result as the response body.
fn render(_req: &Request, reply: Reply, outcome: ActResult) -> Response {
    match outcome {
        Ok(value) => reply.finish(Json(value)),
        Err(err) => {
            let status = err.status();
            reply.finish(Response::builder().status(status).json(json!({"error": err.to_string()}).to_string()))
        }
    }
}

/// Never reached: the custom responder answers every routed request.
async fn after_dispatch(_req: Request) -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let pliny = Plugin::new(Arc::new(Users::default()), RouteOptions::new().response(render));

    let app = Router::new()
        .with(middleware::trace())
        .with(pliny.middleware())
        .on_with(Method::GET, "/users/{id}", pliny.route(RouteOptions::new().pin("role:user,cmd:load"))?, after_dispatch)
        .on_with(
            Method::POST,
            "/users",
            pliny.route(RouteOptions::new().pin("role:user,cmd:create").body(["name"]))?,
            after_dispatch,
        )
        .on_with(
            Method::GET,
            "/users",
            pliny.route(RouteOptions::new().pin("role:user,cmd:list").query(["limit"]))?,
            after_dispatch,
        );

    Server::bind("0.0.0.0:3000").serve(app).await
}
