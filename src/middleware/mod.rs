pub mod builder;

use crate::engine::{QuotaEngine, Verdict};
use crate::identity::RequestIdentity;
use crate::store::CounterStore;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::ErrorInternalServerError;
use actix_web::HttpResponse;
use builder::QuotaGateBuilder;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::cell::RefCell;
use std::fmt::{Debug, Display};
use std::{future::Future, rc::Rc};

type DeniedResponse = dyn Fn(&Verdict) -> HttpResponse;

/// Admission control middleware.
///
/// Every request is identified by the identity function and then put to the [QuotaEngine]; a
/// denied request is answered immediately (429 by default) and never reaches the wrapped service.
pub struct QuotaGate<ST, F> {
    engine: QuotaEngine<ST>,
    identity_fn: Rc<F>,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<ST, F, O> Clone for QuotaGate<ST, F>
where
    ST: CounterStore + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<RequestIdentity, actix_web::Error>>,
{
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            identity_fn: self.identity_fn.clone(),
            fail_open: self.fail_open,
            denied_response: self.denied_response.clone(),
        }
    }
}

impl<ST, F, O> QuotaGate<ST, F>
where
    ST: CounterStore + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<RequestIdentity, actix_web::Error>>,
{
    /// # Arguments
    ///
    /// * `engine`: The quota engine; its store is shared by every clone of the gate.
    /// * `identity_fn`: A future that produces the source address, principal and category of the
    ///   incoming request, see [IdentityFunctionBuilder](crate::IdentityFunctionBuilder).
    pub fn builder(engine: QuotaEngine<ST>, identity_fn: F) -> QuotaGateBuilder<ST, F> {
        QuotaGateBuilder::new(engine, identity_fn)
    }
}

impl<S, B, ST, F, O> Transform<S, ServiceRequest> for QuotaGate<ST, F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
    ST: CounterStore + 'static,
    ST::Error: Debug + Display + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<RequestIdentity, actix_web::Error>>,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Transform = QuotaGateMiddleware<S, ST, F>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(QuotaGateMiddleware {
            service: Rc::new(RefCell::new(service)),
            engine: self.engine.clone(),
            identity_fn: Rc::clone(&self.identity_fn),
            fail_open: self.fail_open,
            denied_response: self.denied_response.clone(),
        })
    }
}

pub struct QuotaGateMiddleware<S, ST, F> {
    service: Rc<RefCell<S>>,
    engine: QuotaEngine<ST>,
    identity_fn: Rc<F>,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<S, B, ST, F, O> Service<ServiceRequest> for QuotaGateMiddleware<S, ST, F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
    ST: CounterStore + 'static,
    ST::Error: Debug + Display + 'static,
    F: Fn(&ServiceRequest) -> O + 'static,
    O: Future<Output = Result<RequestIdentity, actix_web::Error>>,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let engine = self.engine.clone();
        let identity_fn = self.identity_fn.clone();
        let fail_open = self.fail_open;
        let denied_response = self.denied_response.clone();

        Box::pin(async move {
            let identity = match (identity_fn)(&req).await {
                Ok(identity) => identity,
                Err(e) => {
                    log::error!("Quota gate identity function failed: {e}");
                    return Ok(req.into_response(e.error_response()).map_into_right_body());
                }
            };

            match engine.decide(
                &identity.source_address,
                &identity.principal_id,
                &identity.category,
            ) {
                Ok(verdict) => {
                    if verdict.is_denied() {
                        let response: HttpResponse = (denied_response)(&verdict);
                        return Ok(req.into_response(response).map_into_right_body());
                    }
                }
                // Unable to reach the counter store
                Err(e) => {
                    if fail_open {
                        log::warn!("Quota store failed: {}, allowing the request anyway", e);
                    } else {
                        log::error!("Quota store failed: {}", e);
                        let error = ErrorInternalServerError(e);
                        return Ok(req
                            .into_response(error.error_response())
                            .map_into_right_body());
                    }
                }
            }

            let service_response = service.call(req).await?;
            Ok(service_response.map_into_left_body())
        })
    }
}
