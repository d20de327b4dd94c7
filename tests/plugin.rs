use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::header::{HeaderName, HeaderValue};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use pliny::{
    ActHandler, ActResult, BoxFuture, Dispatcher, Error, Json, Message, Plugin, Reply, Request,
    Response, RouteMiddleware, RouteOptions, Router,
};
use serde_json::{Map, Value, json};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Records every message it sees and answers with a canned outcome.
struct Recorder {
    seen: Mutex<Vec<Value>>,
    paths: Mutex<Vec<String>>,
    outcome: fn() -> ActResult,
}

impl Recorder {
    fn ok() -> Arc<Self> {
        Self::with(|| Ok(json!({"ok": true})))
    }

    fn with(outcome: fn() -> ActResult) -> Arc<Self> {
        Arc::new(Self { seen: Mutex::new(Vec::new()), paths: Mutex::new(Vec::new()), outcome })
    }

    fn seen(&self) -> Vec<Value> {
        self.seen.lock().clone()
    }

    fn last(&self) -> Value {
        self.seen.lock().last().cloned().expect("no message dispatched")
    }
}

impl Dispatcher for Recorder {
    fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult> {
        Box::pin(async move {
            self.seen.lock().push(Value::Object(message.fields().clone()));
            self.paths.lock().push(message.request().uri().to_string());
            (self.outcome)()
        })
    }
}

fn app(route: RouteMiddleware) -> Router {
    Router::new()
        .on_with(Method::GET, "/users/{id}", route.clone(), reached)
        .on_with(Method::POST, "/users/{id}", route, reached)
}

async fn reached(_req: Request) -> &'static str {
    "next"
}

fn get(uri: &str) -> Request {
    Request::builder().uri(uri).build().unwrap()
}

fn post(uri: &str, body: Value) -> Request {
    Request::builder().method(Method::POST).uri(uri).json(&body).build().unwrap()
}

// ── Field projection ──────────────────────────────────────────────────────────

#[tokio::test]
async fn query_list_copies_only_listed_present_keys() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().params(false));
    let app = app(pliny.route(RouteOptions::new().query(["limit", "offset"])).unwrap());

    app.handle(get("/users/1?limit=10&secret=x")).await;

    assert_eq!(actions.last(), json!({"limit": "10"}));
}

#[tokio::test]
async fn query_true_copies_every_key() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().params(false));
    let app = app(pliny.route(RouteOptions::new().query(true)).unwrap());

    app.handle(get("/users/1?a=1&b=two&b=three")).await;

    assert_eq!(actions.last(), json!({"a": "1", "b": ["two", "three"]}));
}

#[tokio::test]
async fn params_are_projected_by_default() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new()).unwrap());

    app.handle(get("/users/42?ignored=1")).await;

    assert_eq!(actions.last(), json!({"id": "42"}));
}

#[tokio::test]
async fn body_selection_filters_untrusted_fields() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new().body(["name", "email"])).unwrap());

    app.handle(post("/users/7", json!({"name": "alice", "admin": true}))).await;

    assert_eq!(actions.last(), json!({"name": "alice", "id": "7"}));
}

#[tokio::test]
async fn later_sources_overwrite_earlier_ones() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new().query(true).body(true)).unwrap());

    app.handle(post("/users/7?id=from-query&name=q", json!({"name": "from-body"}))).await;

    assert_eq!(actions.last(), json!({"id": "7", "name": "from-body"}));
}

// ── Pin ───────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pin_always_wins_over_request_data() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().query(true).body(true));
    let app = app(pliny.route(RouteOptions::new().pin("{role: user, cmd: load}")).unwrap());

    app.handle(post("/users/3?role=admin", json!({"cmd": "delete"}))).await;
    app.handle(get("/users/4?cmd=drop")).await;

    for message in actions.seen() {
        assert_eq!(message["role"], "user");
        assert_eq!(message["cmd"], "load");
    }
    assert_eq!(actions.seen()[1]["id"], "4");
}

#[tokio::test]
async fn pin_layers_merge_across_plugin_and_route() {
    let actions = Recorder::ok();
    let mut base = Map::new();
    base.insert("role".to_owned(), json!("user"));
    base.insert("meta".to_owned(), json!({"source": "http"}));
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().pin(base).params(false));

    let mut route = Map::new();
    route.insert("cmd".to_owned(), json!("load"));
    route.insert("meta".to_owned(), json!({"version": 2}));
    let app = app(pliny.route(RouteOptions::new().pin(route)).unwrap());

    app.handle(get("/users/1")).await;

    assert_eq!(
        actions.last(),
        json!({"role": "user", "cmd": "load", "meta": {"source": "http", "version": 2}}),
    );
}

#[tokio::test]
async fn pin_is_stable_across_requests() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().params(false));
    let app = app(pliny.route(RouteOptions::new().pin("role:user,cmd:load")).unwrap());

    app.handle(get("/users/1")).await;
    app.handle(get("/users/2")).await;

    let seen = actions.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0], json!({"role": "user", "cmd": "load"}));
}

#[test]
fn malformed_pin_fails_route_construction() {
    let pliny = Plugin::new(Recorder::ok(), RouteOptions::new());
    let err = pliny.route(RouteOptions::new().pin("{role: 'user")).err().unwrap();
    assert!(matches!(err, Error::Pin(_)));
}

// ── Message lifetime ──────────────────────────────────────────────────────────

#[tokio::test]
async fn nothing_leaks_between_requests() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().params(false));
    let app = app(pliny.route(RouteOptions::new().query(true)).unwrap());

    app.handle(get("/users/1?first=1")).await;
    app.handle(get("/users/1?second=2")).await;

    assert_eq!(actions.seen(), [json!({"first": "1"}), json!({"second": "2"})]);
    assert_eq!(*actions.paths.lock(), ["/users/1?first=1", "/users/1?second=2"]);
}

#[tokio::test]
async fn reserved_keys_cannot_be_shadowed() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().query(true));
    let app = app(pliny.route(RouteOptions::new()).unwrap());

    app.handle(get("/users/1?req%24=spoof&res%24=spoof&ok=1")).await;

    assert_eq!(actions.last(), json!({"ok": "1", "id": "1"}));
    assert_eq!(actions.paths.lock()[0], "/users/1?req%24=spoof&res%24=spoof&ok=1");
}

// ── Outcome resolution ────────────────────────────────────────────────────────

#[tokio::test]
async fn success_continues_to_next() {
    let pliny = Plugin::new(Recorder::ok(), RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new()).unwrap());

    let res = app.handle(get("/users/1")).await;

    assert_eq!(res.status_code(), StatusCode::OK);
    assert_eq!(res.body(), b"next");
}

#[tokio::test]
async fn failure_goes_to_error_handler() {
    let actions = Recorder::with(|| Err(Error::rejected(StatusCode::NOT_FOUND, "no such user")));
    let pliny = Plugin::new(actions, RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new()).unwrap());

    let res = app.handle(get("/users/1")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), b"no such user");
}

#[tokio::test]
async fn failure_reaches_custom_error_handler_unchanged() {
    let actions = Recorder::with(|| Err(Error::action("backend down")));
    let pliny = Plugin::new(actions, RouteOptions::new());
    let app = app(pliny.route(RouteOptions::new()).unwrap())
        .on_error(|err| Response::builder().status(StatusCode::BAD_GATEWAY).text(err.to_string()));

    let res = app.handle(get("/users/1")).await;

    assert_eq!(res.status_code(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.body(), b"action failed: backend down");
}

#[tokio::test]
async fn custom_responder_owns_the_response() {
    let errors_seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors_seen);

    let actions = Recorder::with(|| Err(Error::rejected(StatusCode::CONFLICT, "taken")));
    let pliny = Plugin::new(actions, RouteOptions::new());
    let route = pliny.route(RouteOptions::new().response(|req: &Request, reply: Reply, outcome: ActResult| {
        match outcome {
            Ok(value) => reply.finish(Json(value)),
            Err(err) => {
                reply.set_status(err.status());
                reply.finish(format!("custom {} {}", req.param("id").unwrap_or("?"), err))
            }
        }
    }));
    let app = app(route.unwrap()).on_error(move |err| {
        counter.fetch_add(1, Ordering::SeqCst);
        Response::status(err.status())
    });

    let res = app.handle(get("/users/9")).await;

    assert_eq!(res.status_code(), StatusCode::CONFLICT);
    assert_eq!(res.body(), b"custom 9 taken");
    assert_eq!(errors_seen.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn custom_responder_sees_the_result() {
    let pliny = Plugin::new(Recorder::ok(), RouteOptions::new());
    let route = pliny
        .route(RouteOptions::new().response(|_req: &Request, reply: Reply, outcome: ActResult| match outcome {
            Ok(value) => reply.finish(Json(value)),
            Err(err) => reply.finish(err.status()),
        }))
        .unwrap();

    let res = app(route).handle(get("/users/9")).await;

    assert_eq!(res.body(), br#"{"ok":true}"#);
}

#[tokio::test]
async fn reply_parts_set_by_the_action_reach_the_response() {
    struct SetsHeader;

    impl Dispatcher for SetsHeader {
        fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult> {
            Box::pin(async move {
                message.reply().insert_header(HeaderName::from_static("x-action"), HeaderValue::from_static("load"));
                message.reply().set_status(StatusCode::ACCEPTED);
                Ok::<_, Error>(Value::Null)
            })
        }
    }

    let pliny = Plugin::new(Arc::new(SetsHeader), RouteOptions::new());
    let res = app(pliny.route(RouteOptions::new()).unwrap()).handle(get("/users/1")).await;

    assert_eq!(res.status_code(), StatusCode::ACCEPTED);
    assert_eq!(res.headers()["x-action"], "load");
    assert_eq!(res.body(), b"next");
}

#[tokio::test]
async fn failed_action_status_comes_from_error_handler() {
    struct CreatesThenFails;

    impl Dispatcher for CreatesThenFails {
        fn act<'a>(&'a self, message: Message<'a>) -> BoxFuture<'a, ActResult> {
            Box::pin(async move {
                message.reply().set_status(StatusCode::CREATED);
                message.reply().insert_header(HeaderName::from_static("x-action"), HeaderValue::from_static("create"));
                Err(Error::rejected(StatusCode::NOT_FOUND, "no such user"))
            })
        }
    }

    let pliny = Plugin::new(Arc::new(CreatesThenFails), RouteOptions::new());
    let res = app(pliny.route(RouteOptions::new()).unwrap()).handle(get("/users/1")).await;

    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(res.body(), b"no such user");
    assert!(res.headers().get("x-action").is_none());
}

// ── Custom dispatch ───────────────────────────────────────────────────────────

/// Checks the back-references, tags the message and forwards it.
struct Forwarding {
    calls: AtomicUsize,
    seen: Mutex<Option<Value>>,
}

impl ActHandler for Forwarding {
    fn handle<'a>(
        &'a self,
        request: &'a Request,
        reply: &'a Reply,
        mut message: Message<'a>,
        dispatcher: &'a dyn Dispatcher,
    ) -> BoxFuture<'a, ActResult> {
        Box::pin(async move {
            assert!(std::ptr::eq(message.request(), request));
            assert!(std::ptr::eq(message.reply(), reply));
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen.lock() = Some(Value::Object(message.fields().clone()));

            message.fields_mut().insert("via".to_owned(), json!("handler"));
            dispatcher.act(message).await
        })
    }
}

#[tokio::test]
async fn custom_handler_replaces_default_dispatch() {
    let actions = Recorder::ok();
    let handler = Arc::new(Forwarding { calls: AtomicUsize::new(0), seen: Mutex::new(None) });
    let pliny = Plugin::new(actions.clone(), RouteOptions::new().query(true));

    struct Shared(Arc<Forwarding>);
    impl ActHandler for Shared {
        fn handle<'a>(
            &'a self,
            request: &'a Request,
            reply: &'a Reply,
            message: Message<'a>,
            dispatcher: &'a dyn Dispatcher,
        ) -> BoxFuture<'a, ActResult> {
            self.0.handle(request, reply, message, dispatcher)
        }
    }

    let route = pliny.route(RouteOptions::new().pin("cmd:load").handler(Shared(Arc::clone(&handler))));
    let res = app(route.unwrap()).handle(get("/users/5?cmd=nope&x=1")).await;

    assert_eq!(res.body(), b"next");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*handler.seen.lock(), Some(json!({"cmd": "load", "x": "1", "id": "5"})));
    assert_eq!(actions.seen(), [json!({"cmd": "load", "x": "1", "id": "5", "via": "handler"})]);
}

#[tokio::test]
async fn custom_handler_can_answer_without_dispatching() {
    struct Refuse;

    impl ActHandler for Refuse {
        fn handle<'a>(
            &'a self,
            _request: &'a Request,
            _reply: &'a Reply,
            _message: Message<'a>,
            _dispatcher: &'a dyn Dispatcher,
        ) -> BoxFuture<'a, ActResult> {
            Box::pin(async { Err::<Value, _>(Error::rejected(StatusCode::FORBIDDEN, "read only")) })
        }
    }

    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new());
    let res = app(pliny.route(RouteOptions::new().handler(Refuse)).unwrap()).handle(get("/users/5")).await;

    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(actions.seen().is_empty());
}

// ── Context middleware ────────────────────────────────────────────────────────

#[tokio::test]
async fn context_middleware_attaches_the_dispatcher() {
    let pliny = Plugin::new(Recorder::ok(), RouteOptions::new());
    let app = Router::new()
        .with(pliny.middleware())
        .on(Method::GET, "/ctx", |req: Request| async move {
            if req.dispatcher().is_some() { "attached" } else { "missing" }
        });

    let res = app.handle(get("/ctx")).await;

    assert_eq!(res.body(), b"attached");
}

#[tokio::test]
async fn attached_dispatcher_is_the_plugins() {
    let actions = Recorder::ok();
    let pliny = Plugin::new(actions.clone(), RouteOptions::new());
    let app = Router::new()
        .with(pliny.middleware())
        .on(Method::GET, "/ctx", |req: Request| async move {
            let Some(dispatcher) = req.dispatcher().cloned() else {
                return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
            };
            let reply = Reply::new();
            let mut fields = Map::new();
            fields.insert("cmd".to_owned(), json!("direct"));
            // Dispatch straight from a handler, outside any route.
            match dispatcher.act(Message::new(fields, &req, &reply)).await {
                Ok(_) => Response::text("dispatched"),
                Err(err) => Response::status(err.status()),
            }
        });

    let res = app.handle(get("/ctx?cmd=direct")).await;

    assert_eq!(res.body(), b"dispatched");
    assert_eq!(actions.seen(), [json!({"cmd": "direct"})]);
}
