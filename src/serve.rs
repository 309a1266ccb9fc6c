//! HTTP API server
//!
//! `breeders-room serve` → JSON API over tiny_http. Every response uses the
//! `{ok, data, error}` envelope. The caller's identity comes from the
//! `X-User-Id` header set by the authenticating proxy in front of us.

use crate::adoption::{AdoptionInput, AdoptionPatch};
use crate::breeding::{LayingInput, MatingInput, PairInput};
use crate::config::ServerConfig;
use crate::error::{AppError, Result};
use crate::parent_request::{ProposeInput, StatusUpdate};
use crate::pets::{PetInput, PetPatch};
use crate::service::{require_user, Service};
use crate::types::{AdoptionStatus, RequestStatus, Role};
use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;
use tiny_http::{Header, Method, Request, Response, Server};

/// Header carrying the verified user id
pub const USER_HEADER: &str = "X-User-Id";

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(message: String) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Status code and JSON body produced by the router
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

#[derive(Deserialize)]
struct RequestQuery {
    status: Option<RequestStatus>,
}

#[derive(Deserialize)]
struct AdoptionQuery {
    status: Option<AdoptionStatus>,
    seller: Option<String>,
}

#[derive(Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

/// Start the API server and block serving requests
pub fn start_api_server(service: Service, config: &ServerConfig) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let server = Arc::new(server);
    let workers = config.workers.max(1);

    eprintln!("\n{}", "🦎 Breeder's Room".green().bold());
    eprintln!("   API: http://{}", addr);
    eprintln!("   Workers: {}", workers);
    eprintln!("   Press Ctrl+C to stop\n");
    tracing::info!(%addr, workers, "api server listening");

    let handles: Vec<_> = (0..workers)
        .map(|worker| {
            let server = Arc::clone(&server);
            let service = service.clone();
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    if let Err(e) = handle_request(&service, request) {
                        tracing::error!(worker, error = %e, "failed to write response");
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        if handle.join().is_err() {
            tracing::error!("api worker panicked");
        }
    }
    Ok(())
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn handle_request(service: &Service, mut request: Request) -> std::io::Result<()> {
    let started = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let method = request.method().clone();
    let url = request.url().to_string();
    let (path, query) = url.split_once('?').unwrap_or((url.as_str(), ""));

    let span = tracing::info_span!("request", %request_id, %method, path);
    let _enter = span.enter();

    let viewer = request
        .headers()
        .iter()
        .find(|h| h.field.equiv(USER_HEADER))
        .map(|h| h.value.as_str().trim().to_string())
        .filter(|v| !v.is_empty());

    let mut body = String::new();
    let reply = match request.as_reader().read_to_string(&mut body) {
        Ok(_) => route(service, &method, path, query, viewer.as_deref(), &body),
        Err(e) => envelope(Err(AppError::BadRequest(format!("Failed to read body: {}", e)))),
    };

    tracing::info!(
        status = reply.status,
        viewer = viewer.as_deref().unwrap_or("-"),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request handled"
    );

    let mut response = Response::from_string(reply.body).with_status_code(reply.status);
    for h in [header("Content-Type", "application/json"), header("X-Request-Id", &request_id)]
        .into_iter()
        .flatten()
    {
        response.add_header(h);
    }
    request.respond(response)
}

fn envelope(result: Result<(u16, Value)>) -> Reply {
    let (status, body) = match result {
        Ok((status, data)) => (status, serde_json::to_string(&ApiResponse::success(data))),
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(error = %e, "internal error");
            } else {
                tracing::debug!(code = e.code(), error = %e, "request rejected");
            }
            (e.status_code(), serde_json::to_string(&ApiResponse::failure(e.public_message())))
        }
    };
    Reply {
        status,
        body: body.unwrap_or_else(|_| r#"{"ok":false,"data":null,"error":"Internal server error"}"#.to_string()),
    }
}

fn data<T: Serialize>(status: u16, value: T) -> Result<(u16, Value)> {
    serde_json::to_value(value)
        .map(|v| (status, v))
        .map_err(|e| AppError::Internal(format!("serialize response: {}", e)))
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| AppError::BadRequest(format!("Invalid JSON: {}", e)))
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<T> {
    serde_urlencoded::from_str(query).map_err(|e| AppError::BadRequest(format!("Invalid query: {}", e)))
}

fn parse_id(segment: &str) -> Result<i32> {
    segment
        .parse()
        .map_err(|_| AppError::BadRequest(format!("'{}' is not a valid id", segment)))
}

/// Route one request. Pure apart from the service calls, so tests drive it
/// directly without a socket.
pub fn route(service: &Service, method: &Method, path: &str, query: &str, viewer: Option<&str>, body: &str) -> Reply {
    envelope(dispatch(service, method, path, query, viewer, body))
}

fn dispatch(
    service: &Service,
    method: &Method,
    path: &str,
    query: &str,
    viewer: Option<&str>,
    body: &str,
) -> Result<(u16, Value)> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        (Method::Get, ["health"]) => data(200, json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")})),

        // Pets
        (Method::Post, ["pets"]) => {
            let owner = require_user(viewer)?;
            let input: PetInput = parse_body(body)?;
            data(201, service.create_pet(owner, &input)?)
        }
        (Method::Get, ["pets"]) => {
            let q: OwnerQuery = parse_query(query)?;
            let owner = match q.owner.as_deref() {
                Some(owner) => owner,
                None => require_user(viewer)?,
            };
            data(200, service.list_pets(owner, viewer)?)
        }
        (Method::Get, ["pets", id]) => {
            let pet_id = parse_id(id)?;
            let detail = service.get_pet_detail(pet_id, viewer)?;
            // Private pets look exactly like missing ones
            if detail.pet.is_absent() {
                return Err(AppError::not_found("Pet", pet_id));
            }
            data(200, detail)
        }
        (Method::Patch, ["pets", id]) => {
            let actor = require_user(viewer)?;
            let patch: PetPatch = parse_body(body)?;
            data(200, service.update_pet(parse_id(id)?, actor, &patch)?)
        }
        (Method::Delete, ["pets", id]) => {
            let actor = require_user(viewer)?;
            data(200, service.delete_pet(parse_id(id)?, actor)?)
        }
        (Method::Get, ["pets", id, "parents"]) => {
            data(200, service.get_parents_with_request_status(parse_id(id)?, viewer)?)
        }
        (Method::Delete, ["pets", id, "parents", role]) => {
            let actor = require_user(viewer)?;
            let role: Role = role.parse().map_err(AppError::BadRequest)?;
            let withdrawn = service.withdraw_parent(parse_id(id)?, role, actor)?;
            data(200, json!({ "withdrawn": withdrawn }))
        }
        (Method::Get, ["pets", id, "siblings"]) => data(200, service.get_siblings(parse_id(id)?, viewer)?),

        // Parent requests
        (Method::Post, ["parent-requests"]) => {
            let requester = require_user(viewer)?;
            let input: ProposeInput = parse_body(body)?;
            data(201, service.propose(requester, &input)?)
        }
        (Method::Get, ["parent-requests"]) => {
            let user = require_user(viewer)?;
            let q: RequestQuery = parse_query(query)?;
            data(200, service.list_requests_for_user(user, q.status)?)
        }
        (Method::Get, ["parent-requests", id]) => {
            let user = require_user(viewer)?;
            data(200, service.get_request(parse_id(id)?, user)?)
        }
        (Method::Put, ["parent-requests", id, "status"]) => {
            let actor = require_user(viewer)?;
            let update: StatusUpdate = parse_body(body)?;
            data(200, service.update_request_status(parse_id(id)?, actor, &update)?)
        }

        // Breeding records
        (Method::Get, ["family-tree"]) => {
            let q: OwnerQuery = parse_query(query)?;
            let owner = match q.owner.as_deref() {
                Some(owner) => owner,
                None => require_user(viewer)?,
            };
            data(200, service.get_family_tree(owner, viewer)?)
        }
        (Method::Post, ["pairs"]) => {
            let owner = require_user(viewer)?;
            let input: PairInput = parse_body(body)?;
            data(201, service.create_pair(owner, input.father_id, input.mother_id)?)
        }
        (Method::Get, ["pairs"]) => {
            let q: OwnerQuery = parse_query(query)?;
            let owner = match q.owner.as_deref() {
                Some(owner) => owner,
                None => require_user(viewer)?,
            };
            data(200, service.list_pairs(owner)?)
        }
        (Method::Post, ["pairs", id, "matings"]) => {
            let owner = require_user(viewer)?;
            let input: MatingInput = parse_body(body)?;
            data(201, service.create_mating(owner, parse_id(id)?, &input.mating_date)?)
        }
        (Method::Get, ["pairs", id, "matings"]) => data(200, service.list_matings(parse_id(id)?)?),
        (Method::Post, ["matings", id, "layings"]) => {
            let owner = require_user(viewer)?;
            let input: LayingInput = parse_body(body)?;
            data(
                201,
                service.create_laying(owner, parse_id(id)?, &input.laying_date, input.clutch, input.egg_count)?,
            )
        }
        (Method::Get, ["matings", id, "layings"]) => data(200, service.list_layings(parse_id(id)?)?),

        // Adoptions
        (Method::Post, ["adoptions"]) => {
            let seller = require_user(viewer)?;
            let input: AdoptionInput = parse_body(body)?;
            data(201, service.create_adoption(seller, &input)?)
        }
        (Method::Get, ["adoptions"]) => {
            let q: AdoptionQuery = parse_query(query)?;
            data(200, service.list_adoptions(q.status, q.seller.as_deref())?)
        }
        (Method::Get, ["adoptions", id]) => data(200, service.get_adoption(parse_id(id)?, viewer)?),
        (Method::Patch, ["adoptions", id]) => {
            let actor = require_user(viewer)?;
            let patch: AdoptionPatch = parse_body(body)?;
            data(200, service.update_adoption(parse_id(id)?, actor, &patch)?)
        }
        (Method::Delete, ["adoptions", id]) => {
            let actor = require_user(viewer)?;
            service.delete_adoption(parse_id(id)?, actor)?;
            data(200, json!({ "deleted": true }))
        }

        // Notifications
        (Method::Get, ["notifications"]) => {
            let user = require_user(viewer)?;
            let q: NotificationQuery = parse_query(query)?;
            data(200, service.list_notifications(user, q.unread)?)
        }
        (Method::Put, ["notifications", id, "read"]) => {
            let user = require_user(viewer)?;
            data(200, service.mark_notification_read(parse_id(id)?, user)?)
        }

        _ => Err(AppError::NotFound(format!("No route for {} {}", method, path))),
    }
}
