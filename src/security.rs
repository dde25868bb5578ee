use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

/// Everything this server returns is JSON, so the baseline policy denies
/// scripts, framing and embedding outright. A handler that sets one of
/// these headers itself wins over the baseline.
const BASELINE: [(header::HeaderName, &str); 4] = [
    (
        header::CONTENT_SECURITY_POLICY,
        "default-src 'none'; frame-ancestors 'none'; base-uri 'none'",
    ),
    (header::REFERRER_POLICY, "no-referrer"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
];

#[derive(Clone, Default)]
pub struct SecurityHeaders {
    enable_hsts: bool,
}

impl SecurityHeaders {
    /// HSTS is opt-in via ENABLE_HSTS; behind a TLS-terminating proxy it is
    /// the proxy's call whether to pin the scheme.
    pub fn from_env() -> Self {
        let enable_hsts = std::env::var("ENABLE_HSTS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { enable_hsts }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SecurityHeaders
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SecurityHeadersMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersMiddleware {
            service: Rc::new(service),
            enable_hsts: self.enable_hsts,
        }))
    }
}

pub struct SecurityHeadersMiddleware<S> {
    service: Rc<S>,
    enable_hsts: bool,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = Rc::clone(&self.service);
        let enable_hsts = self.enable_hsts;
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            let headers = res.response_mut().headers_mut();
            for (name, value) in BASELINE {
                if !headers.contains_key(&name) {
                    headers.insert(name, header::HeaderValue::from_static(value));
                }
            }
            if enable_hsts && !headers.contains_key(header::STRICT_TRANSPORT_SECURITY) {
                headers.insert(
                    header::STRICT_TRANSPORT_SECURITY,
                    header::HeaderValue::from_static("max-age=63072000; includeSubDomains"),
                );
            }
            Ok(res)
        })
    }
}
