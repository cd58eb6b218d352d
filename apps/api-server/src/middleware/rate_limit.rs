//! Request admission middleware.
//!
//! Every request to a wrapped route consumes one token from the limiter of
//! its endpoint class, keyed by caller. Rejected requests never reach the
//! handler.

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{self, HeaderName, HeaderValue},
};
use stratus_core::ports::{Clock, RateLimitResult, RateLimiter, TokenService};
use stratus_infra::rate_limit::SweeperHandle;
use stratus_shared::ErrorResponse;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Budget class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Read,
    Write,
    /// Calls that create or change charges at the payment provider.
    Payment,
}

impl EndpointClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Read => "read",
            EndpointClass::Write => "write",
            EndpointClass::Payment => "payment",
        }
    }
}

/// One limiter per endpoint class, plus the sweepers keeping them small.
#[derive(Clone)]
pub struct AdmissionLimiters {
    read: Arc<dyn RateLimiter>,
    write: Arc<dyn RateLimiter>,
    payment: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    _sweepers: Arc<Vec<SweeperHandle>>,
}

impl AdmissionLimiters {
    pub fn new(
        read: Arc<dyn RateLimiter>,
        write: Arc<dyn RateLimiter>,
        payment: Arc<dyn RateLimiter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            read,
            write,
            payment,
            clock,
            _sweepers: Arc::new(Vec::new()),
        }
    }

    /// Keep `sweepers` alive for as long as any clone of these limiters.
    pub fn with_sweepers(mut self, sweepers: Vec<SweeperHandle>) -> Self {
        self._sweepers = Arc::new(sweepers);
        self
    }

    pub fn get(&self, class: EndpointClass) -> &Arc<dyn RateLimiter> {
        match class {
            EndpointClass::Read => &self.read,
            EndpointClass::Write => &self.write,
            EndpointClass::Payment => &self.payment,
        }
    }
}

/// Admission middleware factory for one endpoint class.
pub struct AdmissionMiddleware {
    class: EndpointClass,
    limiters: AdmissionLimiters,
    tokens: Option<Arc<dyn TokenService>>,
}

impl AdmissionMiddleware {
    pub fn new(
        class: EndpointClass,
        limiters: AdmissionLimiters,
        tokens: Option<Arc<dyn TokenService>>,
    ) -> Self {
        Self {
            class,
            limiters,
            tokens,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdmissionMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = AdmissionMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdmissionMiddlewareService {
            service: Rc::new(service),
            class: self.class,
            limiter: self.limiters.get(self.class).clone(),
            clock: self.limiters.clock.clone(),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct AdmissionMiddlewareService<S> {
    service: Rc<S>,
    class: EndpointClass,
    limiter: Arc<dyn RateLimiter>,
    clock: Arc<dyn Clock>,
    tokens: Option<Arc<dyn TokenService>>,
}

impl<S, B> Service<ServiceRequest> for AdmissionMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let clock = self.clock.clone();
        let class = self.class;
        let key = admission_key(&req, self.tokens.as_deref());

        Box::pin(async move {
            match limiter.check(&key).await {
                Ok(result) if !result.success => {
                    tracing::warn!(key = %key, class = class.as_str(), "Admission rejected");
                    let response = rejection(&result, clock.as_ref());
                    Ok(req.into_response(response).map_into_right_body())
                }
                Ok(result) => {
                    let mut res = service.call(req).await?;
                    let headers = res.headers_mut();
                    headers.insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from(result.remaining),
                    );
                    headers.insert(
                        HeaderName::from_static(RESET_HEADER),
                        HeaderValue::from(result.reset_at_ms()),
                    );
                    Ok(res.map_into_left_body())
                }
                Err(err) => {
                    tracing::error!(key = %key, class = class.as_str(), error = %err, "Rate limiter unavailable, failing open");
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}

fn rejection(result: &RateLimitResult, clock: &dyn Clock) -> HttpResponse {
    let reset_at_ms = result.reset_at_ms();
    // Round up so clients never retry before the window resets.
    let wait_ms = (result.reset_at - clock.now()).num_milliseconds().max(0);
    let retry_after_secs = ((wait_ms + 999) / 1000).max(1);

    let error = ErrorResponse::too_many_requests(reset_at_ms).with_detail(format!(
        "Rate limit exceeded. Try again in {retry_after_secs} seconds."
    ));

    HttpResponse::TooManyRequests()
        .insert_header((header::RETRY_AFTER, retry_after_secs.to_string()))
        .insert_header((REMAINING_HEADER, "0"))
        .insert_header((RESET_HEADER, reset_at_ms.to_string()))
        .json(error)
}

/// Identify the caller: authenticated user, then forwarded client IP, then
/// the socket peer.
pub fn admission_key(req: &ServiceRequest, tokens: Option<&dyn TokenService>) -> String {
    let user = tokens.and_then(|tokens| {
        let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
        let token = value.strip_prefix("Bearer ")?;
        tokens.verify(token).ok()
    });
    if let Some(claims) = user {
        return format!("user:{}", claims.user_id);
    }

    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = forwarded {
        return format!("ip:{ip}");
    }

    match req.peer_addr() {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "unknown".to_string(),
    }
}
