use actix_web::{
    post,
    web::{Data, Json, Path},
    HttpResponse, Responder,
};
use vice_api::job::Job;
use vice_session::SessionManager;

use super::error_response;

#[post("/vice/launch")]
pub async fn launch(manager: Data<SessionManager>, job: Json<Job>) -> impl Responder {
    match manager.launch(&job).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(error) => error_response(&error),
    }
}

#[post("/vice/{external_id}/terminate")]
pub async fn terminate(manager: Data<SessionManager>, external_id: Path<String>) -> impl Responder {
    match manager.terminate(&external_id).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(error) => error_response(&error),
    }
}

#[post("/vice/{external_id}/pause")]
pub async fn pause(manager: Data<SessionManager>, external_id: Path<String>) -> impl Responder {
    match manager.pause(&external_id).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(error) => error_response(&error),
    }
}

#[post("/vice/{external_id}/resume")]
pub async fn resume(manager: Data<SessionManager>, external_id: Path<String>) -> impl Responder {
    match manager.resume(&external_id).await {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(error) => error_response(&error),
    }
}
