use std::convert::Infallible;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Map;
use tracing::{debug, error};
use warp::http::{Method, StatusCode};
use warp::{Filter, Reply};

use crate::error::{ResourceKey, TaskError};
use crate::query::TaskQueryEngine;
use crate::query::predicate::Constraint;
use crate::query::syntax::parse_query;

#[derive(Debug)]
struct ApiError(TaskError);
impl warp::reject::Reject for ApiError {}

#[derive(Serialize)]
struct ErrorBody {
  status: u16,
  message: String,
}

fn with_engine(
  engine: Arc<TaskQueryEngine>,
) -> impl Filter<Extract = (Arc<TaskQueryEngine>,), Error = Infallible> + Clone {
  warp::any().map(move || engine.clone())
}

/// `GET /tasks?<constraints>&fields=..&from=..&page_size=..`
pub fn list_route(
  engine: Arc<TaskQueryEngine>,
  default_page_size: usize,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("tasks")
    .and(warp::path::end())
    .and(warp::get())
    .and(warp::query::<Vec<(String, String)>>())
    .and(with_engine(engine))
    .and_then(move |pairs: Vec<(String, String)>, engine: Arc<TaskQueryEngine>| {
      handle_list(pairs, engine, default_page_size)
    })
}

/// `GET /tasks/{id}?fields=..`
pub fn get_route(
  engine: Arc<TaskQueryEngine>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path!("tasks" / i64)
    .and(warp::get())
    .and(warp::query::<Vec<(String, String)>>())
    .and(with_engine(engine))
    .and_then(handle_get)
}

/// Tasks are written by the dispatch side only; create, update and delete
/// always answer with `OperationNotSupported`.
pub fn unsupported_route(
  engine: Arc<TaskQueryEngine>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
  warp::path("tasks")
    .and(warp::method())
    .and(with_engine(engine))
    .and_then(handle_unsupported)
}

async fn handle_list(
  pairs: Vec<(String, String)>,
  engine: Arc<TaskQueryEngine>,
  default_page_size: usize,
) -> Result<warp::reply::Json, warp::Rejection> {
  let query = parse_query(&pairs, default_page_size).map_err(reject)?;
  let views = engine.query(&query).await.map_err(reject)?;
  debug!("Returning {} task views", views.len());
  Ok(warp::reply::json(&views))
}

async fn handle_get(
  task_id: i64,
  pairs: Vec<(String, String)>,
  engine: Arc<TaskQueryEngine>,
) -> Result<warp::reply::Json, warp::Rejection> {
  let mut query = parse_query(&pairs, 1).map_err(reject)?;
  query.page = None;
  query.constraints.push(Constraint::equals("Tasks/id", task_id.to_string()));

  let views = engine.query(&query).await.map_err(reject)?;
  match views.into_iter().next() {
    Some(view) => Ok(warp::reply::json(&view)),
    None => Err(reject(TaskError::NoSuchResource(ResourceKey::Task(task_id)))),
  }
}

async fn handle_unsupported(
  method: Method,
  engine: Arc<TaskQueryEngine>,
) -> Result<warp::reply::Response, warp::Rejection> {
  let outcome = match method {
    Method::POST => engine.create(&Map::new()),
    Method::PUT => engine.update(&Map::new(), &[]),
    Method::DELETE => engine.delete(&[]),
    _ => return Err(warp::reject::not_found()),
  };
  outcome.map_err(reject)?;
  Ok(StatusCode::NO_CONTENT.into_response())
}

fn reject(err: TaskError) -> warp::Rejection {
  warp::reject::custom(ApiError(err))
}

fn status_for(err: &TaskError) -> StatusCode {
  match err {
    TaskError::NoSuchResource(_) => StatusCode::NOT_FOUND,
    TaskError::UnsupportedPredicate(_) | TaskError::AmbiguousScope(_) => StatusCode::BAD_REQUEST,
    TaskError::OperationNotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
    TaskError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
    TaskError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    TaskError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

pub async fn handle_rejection(err: warp::Rejection) -> Result<impl warp::Reply, Infallible> {
  let (code, message) = if let Some(ApiError(e)) = err.find::<ApiError>() {
    let code = status_for(e);
    if code.is_server_error() {
      error!("Task query failed: {}", e);
    }
    (code, e.to_string())
  } else if err.is_not_found() {
    (StatusCode::NOT_FOUND, "not found".to_string())
  } else if err.find::<warp::reject::InvalidQuery>().is_some() {
    (StatusCode::BAD_REQUEST, "invalid query string".to_string())
  } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
    (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
  } else {
    error!("Unhandled rejection: {:?}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
  };

  let body = warp::reply::json(&ErrorBody { status: code.as_u16(), message });
  Ok(warp::reply::with_status(body, code))
}
