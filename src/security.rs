use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

// Swagger UI under /docs injects inline styles, hence the style-src carve-out.
const CSP: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; \
                   img-src 'self' data:; object-src 'none'; base-uri 'none'; \
                   frame-ancestors 'none'; form-action 'self'";
const HSTS: &str = "max-age=63072000; includeSubDomains";

/// Hardening headers for every response. Handlers that set a header
/// themselves win; the middleware only fills gaps.
///
/// HSTS is opt-in (`ENABLE_HSTS`): the service normally sits behind a
/// TLS-terminating proxy and must not pin browsers to HTTPS when someone
/// runs it over plain HTTP locally.
#[derive(Clone, Default)]
pub struct SecurityHeaders {
    enable_hsts: bool,
}

impl SecurityHeaders {
    pub fn from_env() -> Self {
        let flag = std::env::var("ENABLE_HSTS").unwrap_or_default();
        Self {
            enable_hsts: flag == "1" || flag.eq_ignore_ascii_case("true"),
        }
    }

    pub fn with_hsts(mut self, enable: bool) -> Self {
        self.enable_hsts = enable;
        self
    }
}

fn set_if_absent(map: &mut HeaderMap, name: HeaderName, value: &'static str) {
    if !map.contains_key(&name) {
        map.insert(name, HeaderValue::from_static(value));
    }
}

fn harden(map: &mut HeaderMap, private_api: bool, hsts: bool) {
    set_if_absent(map, header::CONTENT_SECURITY_POLICY, CSP);
    set_if_absent(map, header::REFERRER_POLICY, "no-referrer");
    set_if_absent(map, header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set_if_absent(map, header::X_FRAME_OPTIONS, "DENY");
    set_if_absent(map, header::X_XSS_PROTECTION, "0");
    if private_api {
        // every /api payload is per-family data; shared caches must not hold it
        set_if_absent(map, header::CACHE_CONTROL, "no-store");
    }
    if hsts {
        set_if_absent(map, header::STRICT_TRANSPORT_SECURITY, HSTS);
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
    type Transform = SecurityHeadersService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SecurityHeadersService {
            service: Rc::new(service),
            hsts: self.enable_hsts,
        }))
    }
}

pub struct SecurityHeadersService<S> {
    service: Rc<S>,
    hsts: bool,
}

impl<S, B> Service<ServiceRequest> for SecurityHeadersService<S>
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
        let svc = self.service.clone();
        let hsts = self.hsts;
        let private_api = req.path().starts_with("/api/");
        Box::pin(async move {
            let mut res = svc.call(req).await?;
            harden(res.response_mut().headers_mut(), private_api, hsts);
            Ok(res)
        })
    }
}
