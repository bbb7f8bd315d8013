use actix_web::{
    get, post,
    web::{Data, Path},
    HttpRequest, HttpResponse, Responder,
};
use kube::Client;
use serde_json::json;
use vice_api::{config::Config, labels::LABEL_SUBDOMAIN};
use vice_session::{inspect, SessionManager};

use super::error_response;

// Admin variants answer from cluster state alone: no Apps lookups, no
// permission gate.

#[get("/vice/admin/deployments")]
pub async fn deployments(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::filtered_deployments(&kube, &config, &filter).await {
        Ok(deployments) => HttpResponse::Ok().json(json!({ "deployments": deployments })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/pods")]
pub async fn pods(req: HttpRequest, kube: Data<Client>, config: Data<Config>) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::filtered_pods(&kube, &config, &filter).await {
        Ok(pods) => HttpResponse::Ok().json(json!({ "pods": pods })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/configmaps")]
pub async fn config_maps(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::filtered_config_maps(&kube, &config, &filter).await {
        Ok(config_maps) => HttpResponse::Ok().json(json!({ "configmaps": config_maps })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/services")]
pub async fn services(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::filtered_services(&kube, &config, &filter).await {
        Ok(services) => HttpResponse::Ok().json(json!({ "services": services })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/ingresses")]
pub async fn ingresses(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::filtered_ingresses(&kube, &config, &filter).await {
        Ok(ingresses) => HttpResponse::Ok().json(json!({ "ingresses": ingresses })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/resources")]
pub async fn resources(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
) -> impl Responder {
    let filter = inspect::filter_map(req.query_string());
    match inspect::resource_listing(&kube, &config, &filter).await {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/admin/description/{host}")]
pub async fn description(
    kube: Data<Client>,
    config: Data<Config>,
    host: Path<String>,
) -> impl Responder {
    let filter =
        std::collections::BTreeMap::from([(LABEL_SUBDOMAIN.to_string(), host.to_string())]);
    match inspect::resource_listing(&kube, &config, &filter).await {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(error) => error_response(&error),
    }
}

#[post("/vice/admin/{external_id}/terminate")]
pub async fn terminate(manager: Data<SessionManager>, external_id: Path<String>) -> impl Responder {
    match manager.terminate(&external_id).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(error) => error_response(&error),
    }
}
