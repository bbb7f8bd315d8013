use actix_web::{
    get,
    web::{Data, Path},
    HttpRequest, HttpResponse, Responder,
};
use kube::Client;
use serde_json::json;
use vice_api::{
    config::Config,
    error::{Error, Result},
    labels::{fix_username, LABEL_SUBDOMAIN},
};
use vice_session::inspect::{
    self, ConfigMapInfo, DeploymentInfo, IngressInfo, PodInfo, ResourceInfo, ServiceInfo,
};

use super::{assert_allowed, error_response, resolve_user_filter, Clients};

/// Resolves the caller, lists the deployments their filter matches, and
/// runs the permission gate. The surviving filter drives the kind-specific
/// listing; the deployments double as the gate's subject.
async fn gated(
    req: &HttpRequest,
    kube: &Client,
    config: &Config,
    clients: &Clients,
) -> Result<(std::collections::BTreeMap<String, String>, Vec<DeploymentInfo>)> {
    let (user, filter) = resolve_user_filter(&clients.apps, config, req.query_string()).await?;
    let deployment_list = inspect::filtered_deployments(kube, config, &filter).await?;
    assert_allowed(clients, &user, &deployment_list).await?;
    Ok((filter, deployment_list))
}

#[get("/vice/deployments")]
pub async fn deployments(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    match gated(&req, &kube, &config, &clients).await {
        Ok((_, deployment_list)) => {
            HttpResponse::Ok().json(json!({ "deployments": deployment_list }))
        }
        Err(error) => error_response(&error),
    }
}

#[get("/vice/pods")]
pub async fn pods(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    async fn try_pods(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
    ) -> Result<Vec<PodInfo>> {
        let (filter, _) = gated(req, kube, config, clients).await?;
        inspect::filtered_pods(kube, config, &filter).await
    }

    match try_pods(&req, &kube, &config, &clients).await {
        Ok(pods) => HttpResponse::Ok().json(json!({ "pods": pods })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/configmaps")]
pub async fn config_maps(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    async fn try_config_maps(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
    ) -> Result<Vec<ConfigMapInfo>> {
        let (filter, _) = gated(req, kube, config, clients).await?;
        inspect::filtered_config_maps(kube, config, &filter).await
    }

    match try_config_maps(&req, &kube, &config, &clients).await {
        Ok(config_maps) => HttpResponse::Ok().json(json!({ "configmaps": config_maps })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/services")]
pub async fn services(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    async fn try_services(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
    ) -> Result<Vec<ServiceInfo>> {
        let (filter, _) = gated(req, kube, config, clients).await?;
        inspect::filtered_services(kube, config, &filter).await
    }

    match try_services(&req, &kube, &config, &clients).await {
        Ok(services) => HttpResponse::Ok().json(json!({ "services": services })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/ingresses")]
pub async fn ingresses(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    async fn try_ingresses(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
    ) -> Result<Vec<IngressInfo>> {
        let (filter, _) = gated(req, kube, config, clients).await?;
        inspect::filtered_ingresses(kube, config, &filter).await
    }

    match try_ingresses(&req, &kube, &config, &clients).await {
        Ok(ingresses) => HttpResponse::Ok().json(json!({ "ingresses": ingresses })),
        Err(error) => error_response(&error),
    }
}

#[get("/vice/resources")]
pub async fn resources(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
) -> impl Responder {
    async fn try_resources(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
    ) -> Result<ResourceInfo> {
        let (filter, _) = gated(req, kube, config, clients).await?;
        inspect::resource_listing(kube, config, &filter).await
    }

    match try_resources(&req, &kube, &config, &clients).await {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(error) => error_response(&error),
    }
}

/// Everything behind one subdomain, gated the same way user traffic to the
/// analysis is admitted: one Apps call, at most one Permissions call.
#[get("/vice/description/{host}")]
pub async fn description(
    req: HttpRequest,
    kube: Data<Client>,
    config: Data<Config>,
    clients: Data<Clients>,
    host: Path<String>,
) -> impl Responder {
    async fn try_description(
        req: &HttpRequest,
        kube: &Client,
        config: &Config,
        clients: &Clients,
        host: &str,
    ) -> Result<ResourceInfo> {
        let mut query = inspect::filter_map(req.query_string());
        let user = query
            .remove("user")
            .ok_or_else(|| Error::InvalidInput("user query parameter must be set".into()))?;

        // the user id is only resolved to confirm the user exists; the
        // subdomain alone narrows the listing to one analysis
        let fixed_user = fix_username(&user, &config.user_suffix);
        clients.apps.get_user_id(&fixed_user).await?;

        let filter =
            std::collections::BTreeMap::from([(LABEL_SUBDOMAIN.to_string(), host.to_string())]);
        let listing = inspect::resource_listing(kube, config, &filter).await?;

        // the gate runs after the listing: an analysis whose subdomain
        // label has not landed yet lists empty instead of erroring
        assert_allowed(clients, &user, &listing.deployments).await?;
        Ok(listing)
    }

    match try_description(&req, &kube, &config, &clients, &host).await {
        Ok(listing) => HttpResponse::Ok().json(listing),
        Err(error) => error_response(&error),
    }
}
