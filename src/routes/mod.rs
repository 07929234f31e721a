use std::sync::Arc;

use warp::Filter;

use crate::query::TaskQueryEngine;

pub mod tasks;

pub fn routes(
  engine: Arc<TaskQueryEngine>,
  default_page_size: usize,
) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
  tasks::list_route(engine.clone(), default_page_size)
    .or(tasks::get_route(engine.clone()))
    .or(tasks::unsupported_route(engine))
    .recover(tasks::handle_rejection)
}
