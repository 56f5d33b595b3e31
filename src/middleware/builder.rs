use crate::engine::{QuotaEngine, Verdict};
use crate::identity::RequestIdentity;
use crate::middleware::{DeniedResponse, QuotaGate};
use crate::store::CounterStore;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use std::future::Future;
use std::rc::Rc;

pub static X_RATELIMIT_DIMENSION: Lazy<HeaderName> =
    Lazy::new(|| HeaderName::from_static("x-ratelimit-dimension"));

pub struct QuotaGateBuilder<ST, F> {
    engine: QuotaEngine<ST>,
    identity_fn: F,
    fail_open: bool,
    denied_response: Rc<DeniedResponse>,
}

impl<ST, F, O> QuotaGateBuilder<ST, F>
where
    ST: CounterStore + 'static,
    F: Fn(&ServiceRequest) -> O,
    O: Future<Output = Result<RequestIdentity, actix_web::Error>>,
{
    pub(super) fn new(engine: QuotaEngine<ST>, identity_fn: F) -> Self {
        Self {
            engine,
            identity_fn,
            fail_open: false,
            denied_response: Rc::new(|_: &Verdict| HttpResponse::TooManyRequests().finish()),
        }
    }

    /// Choose whether to allow a request if the counter store returns a failure.
    ///
    /// Default is false, in which case the request is answered with a 500.
    pub fn fail_open(mut self, fail_open: bool) -> Self {
        self.fail_open = fail_open;
        self
    }

    /// Sets the [QuotaGateBuilder::request_denied_response] function such that denied responses
    /// carry the following headers:
    ///
    /// - `x-ratelimit-dimension` (`request`, `message` or `transaction`)
    /// - `retry-after` (the length of the exhausted window in seconds, an upper bound on the wait)
    pub fn add_headers(mut self) -> Self {
        self.denied_response = Rc::new(|verdict: &Verdict| {
            let mut response = HttpResponse::TooManyRequests().finish();
            if let Some(dimension) = verdict.limited_by() {
                let map = response.headers_mut();
                map.insert(
                    X_RATELIMIT_DIMENSION.clone(),
                    HeaderValue::from_static(dimension.as_str()),
                );
                map.insert(
                    RETRY_AFTER,
                    HeaderValue::from(dimension.interval().as_secs()),
                );
            }
            response
        });
        self
    }

    /// In the event that the request is denied, configure the [HttpResponse] returned.
    ///
    /// Defaults to an empty body with status 429.
    pub fn request_denied_response<R>(mut self, denied_response: R) -> Self
    where
        R: Fn(&Verdict) -> HttpResponse + 'static,
    {
        self.denied_response = Rc::new(denied_response);
        self
    }

    pub fn build(self) -> QuotaGate<ST, F> {
        QuotaGate {
            engine: self.engine,
            identity_fn: Rc::new(self.identity_fn),
            fail_open: self.fail_open,
            denied_response: self.denied_response,
        }
    }
}
