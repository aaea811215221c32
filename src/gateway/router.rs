//! Request Router
//!
//! Maps HTTP verbs and paths onto the cause service and the dispatcher, and
//! translates outcomes into status codes.
//!
//! | Verb + Path                          | Success        | Failure                  |
//! |--------------------------------------|----------------|--------------------------|
//! | GET    /api/causes                   | 200 + list     | 500                      |
//! | GET    /api/causes/{id}              | 200 + entity   | 404 (empty body)         |
//! | POST   /api/causes                   | 201 + entity   | 500 if id preset         |
//! | PUT    /api/causes/{id}              | 200 + entity   | 500 if not found         |
//! | DELETE /api/causes/{id}              | 204            | 500                      |
//! | POST   /api/causes/{id}/send?wait=b  | 200 + entity   | 404 absent, 500 dispatch |
//! | POST   /api/cache/evict              | 204            |                          |
//! | GET    /api/cache/stats              | 200 + counters |                          |
//! | GET    /api/jobs                     | 200 + runs     |                          |

use std::fmt::Display;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use super::Gateway;
use crate::batch::JobRunRecord;
use crate::domain::{Cause, CauseId};
use crate::error::Error;

type HttpResponse = Response<Full<Bytes>>;

impl Gateway {
    /// Route one request. Never fails: every error becomes a status code.
    #[instrument(skip_all, fields(method = %req.method(), path = %req.uri().path()))]
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body,
        B::Error: Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let query = req.uri().query().map(str::to_string);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (&method, segments.as_slice()) {
            (&Method::GET, ["api", "causes"]) => self.get_causes().await,
            (&Method::POST, ["api", "causes"]) => match read_json::<Cause, _>(req).await {
                Ok(cause) => self.create_cause(cause).await,
                Err(resp) => resp,
            },
            (&Method::GET, ["api", "causes", id]) => match parse_id(id) {
                Ok(id) => self.get_cause(id).await,
                Err(resp) => resp,
            },
            (&Method::PUT, ["api", "causes", id]) => {
                let id = match parse_id(id) {
                    Ok(id) => id,
                    Err(resp) => return resp,
                };
                match read_json::<Cause, _>(req).await {
                    Ok(cause) => self.update_cause(id, cause).await,
                    Err(resp) => resp,
                }
            }
            (&Method::DELETE, ["api", "causes", id]) => match parse_id(id) {
                Ok(id) => self.delete_cause(id).await,
                Err(resp) => resp,
            },
            (&Method::POST, ["api", "causes", id, "send"]) => {
                let id = match parse_id(id) {
                    Ok(id) => id,
                    Err(resp) => return resp,
                };
                match parse_wait(query.as_deref()) {
                    Ok(wait) => self.send_cause(id, wait).await,
                    Err(resp) => resp,
                }
            }
            (&Method::POST, ["api", "cache", "evict"]) => {
                self.service.evict_cache();
                empty(StatusCode::NO_CONTENT)
            }
            (&Method::GET, ["api", "cache", "stats"]) => {
                json(StatusCode::OK, &self.service.cache_stats())
            }
            (&Method::GET, ["api", "jobs"]) => match &self.batch {
                Some(batch) => json(StatusCode::OK, &batch.history()),
                None => json(StatusCode::OK, &Vec::<JobRunRecord>::new()),
            },
            (_, ["api", "causes"]) => method_not_allowed("GET, POST"),
            (_, ["api", "causes", _]) => method_not_allowed("GET, PUT, DELETE"),
            (_, ["api", "causes", _, "send"]) | (_, ["api", "cache", "evict"]) => {
                method_not_allowed("POST")
            }
            (_, ["api", "cache", "stats"]) | (_, ["api", "jobs"]) => method_not_allowed("GET"),
            _ => error_body(StatusCode::NOT_FOUND, "no such route"),
        }
    }

    async fn get_causes(&self) -> HttpResponse {
        match self.service.find_all().await {
            Ok(causes) => json(StatusCode::OK, &causes),
            Err(e) => server_error(e),
        }
    }

    async fn get_cause(&self, id: CauseId) -> HttpResponse {
        match self.service.find_by_id(id).await {
            Ok(Some(cause)) => json(StatusCode::OK, &cause),
            Ok(None) => empty(StatusCode::NOT_FOUND),
            Err(e) => server_error(e),
        }
    }

    async fn create_cause(&self, cause: Cause) -> HttpResponse {
        match self.service.create(cause).await {
            Ok(created) => json(StatusCode::CREATED, &created),
            Err(e) => server_error(e),
        }
    }

    async fn update_cause(&self, id: CauseId, mut cause: Cause) -> HttpResponse {
        // The path decides which entity is updated
        cause.id = Some(id);
        match self.service.update(cause).await {
            Ok(updated) => json(StatusCode::OK, &updated),
            Err(e) => server_error(e),
        }
    }

    async fn delete_cause(&self, id: CauseId) -> HttpResponse {
        match self.service.delete(id).await {
            Ok(()) => empty(StatusCode::NO_CONTENT),
            Err(e) => server_error(e),
        }
    }

    async fn send_cause(&self, id: CauseId, wait: bool) -> HttpResponse {
        let cause = match self.service.find_by_id(id).await {
            Ok(Some(cause)) => cause,
            Ok(None) => return empty(StatusCode::NOT_FOUND),
            Err(e) => return server_error(e),
        };

        if wait {
            let cell = self.dispatcher.send_with_completion(cause.clone());
            match cell.wait_async_timeout(self.config.send_wait_timeout).await {
                Ok(sent) => info!(id = %id, sent, "Cause email sent"),
                Err(e) => {
                    cell.cancel();
                    error!(id = %id, cause = %e.root_cause(), "A problem occurred sending the cause");
                    return server_error(e);
                }
            }
        } else {
            // Outcome is only logged by the dispatcher
            drop(self.dispatcher.send_detached(cause.clone()));
        }

        json(StatusCode::OK, &cause)
    }
}

// =============================================================================
// Request Parsing
// =============================================================================

fn parse_id(raw: &str) -> std::result::Result<CauseId, HttpResponse> {
    raw.parse::<CauseId>()
        .map_err(|_| error_body(StatusCode::BAD_REQUEST, &format!("invalid id: {raw}")))
}

fn parse_wait(query: Option<&str>) -> std::result::Result<bool, HttpResponse> {
    let Some(query) = query else {
        return Ok(false);
    };

    let mut wait = false;
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key != "wait" {
            continue;
        }
        let value = urlencoding::decode(value)
            .map_err(|_| error_body(StatusCode::BAD_REQUEST, "invalid wait parameter"))?;
        wait = match value.to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            other => {
                return Err(error_body(
                    StatusCode::BAD_REQUEST,
                    &format!("invalid wait parameter: {other}"),
                ))
            }
        };
    }
    Ok(wait)
}

async fn read_json<T, B>(req: Request<B>) -> std::result::Result<T, HttpResponse>
where
    T: serde::de::DeserializeOwned,
    B: Body,
    B::Error: Display,
{
    let bytes = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Err(error_body(StatusCode::BAD_REQUEST, "unreadable request body"));
        }
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| error_body(StatusCode::BAD_REQUEST, &format!("malformed JSON: {e}")))
}

// =============================================================================
// Response Helpers
// =============================================================================

fn empty(status: StatusCode) -> HttpResponse {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut resp = Response::new(Full::new(Bytes::from(body)));
            *resp.status_mut() = status;
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(e) => server_error(Error::Json(e)),
    }
}

fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    let body = serde_json::json!({ "error": message }).to_string();
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}

fn server_error(err: Error) -> HttpResponse {
    error!(error = %err, "Request failed");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
}

fn method_not_allowed(allow: &'static str) -> HttpResponse {
    let mut resp = error_body(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
    resp.headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    resp
}

// =============================================================================
// Tests
// =============================================================================
