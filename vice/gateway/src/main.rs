mod routes;

use std::{net::SocketAddr, process::exit, sync::Arc};

use actix_web::{get, web::Data, App, HttpResponse, HttpServer, Responder};
use anyhow::Result;
use kube::Client;
use tracing::{error, info};
use vice_api::config::Config;
use vice_client::{AppsClient, JobStatusPublisher, PermissionsClient};
use vice_core::tracer;
use vice_session::SessionManager;

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[actix_web::main]
async fn main() {
    let config = match Config::try_infer() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            exit(1);
        }
    };
    tracer::init_once_with(&config.log_level);

    let kube = match Client::try_default().await {
        Ok(client) => client,
        Err(error) => {
            error!("failed to initialize the cluster client: {error}");
            exit(2);
        }
    };

    if let Err(error) = try_main(config, kube).await {
        error!("{error}");
        exit(1);
    }
}

async fn try_main(config: Config, kube: Client) -> Result<()> {
    let http = ::reqwest::Client::default();
    let apps = AppsClient::new(http.clone(), config.apps_url.clone());
    let permissions = PermissionsClient::new(http.clone(), config.permissions_url.clone());
    let publisher = JobStatusPublisher::new(http, config.status_url.clone(), Config::hostname());

    let manager = Data::new(SessionManager::new(
        kube.clone(),
        config.clone(),
        apps.clone(),
        Arc::new(publisher),
    ));
    let clients = Data::new(routes::Clients { apps, permissions });
    let kube = Data::new(kube);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let config = Data::new(config);

    info!("listening on {addr}");
    HttpServer::new(move || {
        App::new()
            .app_data(Data::clone(&kube))
            .app_data(Data::clone(&config))
            .app_data(Data::clone(&clients))
            .app_data(Data::clone(&manager))
            .service(health)
            .service(routes::lifecycle::launch)
            .service(routes::lifecycle::terminate)
            .service(routes::lifecycle::pause)
            .service(routes::lifecycle::resume)
            .service(routes::listing::deployments)
            .service(routes::listing::pods)
            .service(routes::listing::config_maps)
            .service(routes::listing::services)
            .service(routes::listing::ingresses)
            .service(routes::listing::resources)
            .service(routes::listing::description)
            .service(routes::admin::deployments)
            .service(routes::admin::pods)
            .service(routes::admin::config_maps)
            .service(routes::admin::services)
            .service(routes::admin::ingresses)
            .service(routes::admin::resources)
            .service(routes::admin::description)
            .service(routes::admin::terminate)
            .service(routes::labels::apply_labels)
    })
    .bind(addr)?
    .run()
    .await
    .map_err(Into::into)
}
