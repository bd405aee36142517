use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Request logging middleware
///
/// Opens an `http_request` span per request so events emitted by handlers
/// and the auth service carry the same `request_id`, then logs the outcome.
pub struct RequestLogger;

impl<S, B> Transform<S, ServiceRequest> for RequestLogger
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestLoggerService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(RequestLoggerService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestLoggerService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestLoggerService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();
        let remote_ip = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or("unknown")
            .to_string();

        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %req.method(),
            uri = %req.uri(),
            remote_ip = %remote_ip,
        );

        let service = self.service.clone();

        Box::pin(
            async move {
                let result = service.call(req).await;
                let latency_ms = start_time.elapsed().as_millis() as u64;

                match &result {
                    Ok(res) => {
                        let status = res.status().as_u16();
                        if res.status().is_server_error() {
                            tracing::error!(status, latency_ms, "Request completed");
                        } else {
                            tracing::info!(status, latency_ms, "Request completed");
                        }
                    }
                    Err(e) => {
                        let status = e.as_response_error().status_code().as_u16();
                        tracing::warn!(status, latency_ms, "Request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
