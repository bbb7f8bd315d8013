use actix_web::{post, web::Data, HttpResponse, Responder};
use kube::Client;
use tracing::error;
use vice_api::config::Config;
use vice_session::reconcile;

use super::Clients;

/// Triggers one label sweep. Per-object failures are aggregated into a
/// newline-separated body so a partial sweep is still visible to the
/// caller.
#[post("/vice/apply-labels")]
pub async fn apply_labels(
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    let errors = reconcile::apply_async_labels(&kube, &config, &clients.apps).await;
    if errors.is_empty() {
        return HttpResponse::Ok().finish();
    }

    let mut body = String::new();
    for err in &errors {
        error!("{err}");
        body.push_str(&err.to_string());
        body.push('\n');
    }
    HttpResponse::InternalServerError()
        .content_type("text/plain; charset=utf-8")
        .body(body)
}
