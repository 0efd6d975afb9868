//! Thin per-IP rate limit `tower` middleware, mirroring the surrounding
//! stack's manual `Layer`/`Service` convention. The interface this exposes
//! (a `tower::Layer` applied to the public router) is the one piece of the
//! rate-limiting subsystem in scope for the core (§1); the policy itself is
//! intentionally a single flat tier.

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter};
use tower::{Layer, Service};

use crate::error::Error;

pub struct RateLimitManager {
	limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl RateLimitManager {
	pub fn new(requests_per_second: u32, burst: u32) -> Self {
		let quota = Quota::per_second(NonZeroU32::new(requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN))
			.allow_burst(NonZeroU32::new(burst.max(1)).unwrap_or(NonZeroU32::MIN));
		Self { limiter: GovernorLimiter::keyed(quota) }
	}

	fn check(&self, ip: IpAddr) -> Result<(), Error> {
		self.limiter.check_key(&ip).map_err(|_| Error::RateLimited)
	}
}

#[derive(Clone)]
pub struct RateLimitLayer {
	manager: Arc<RateLimitManager>,
}

impl RateLimitLayer {
	pub fn new(manager: Arc<RateLimitManager>) -> Self {
		Self { manager }
	}
}

impl<S> Layer<S> for RateLimitLayer {
	type Service = RateLimitService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		RateLimitService { inner, manager: self.manager.clone() }
	}
}

#[derive(Clone)]
pub struct RateLimitService<S> {
	inner: S,
	manager: Arc<RateLimitManager>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
	S: Service<Request<Body>, Response = axum::response::Response> + Clone + Send + 'static,
	S::Future: Send + 'static,
{
	type Response = S::Response;
	type Error = S::Error;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx)
	}

	fn call(&mut self, req: Request<Body>) -> Self::Future {
		let manager = self.manager.clone();
		let mut inner = self.inner.clone();

		let ip = req
			.extensions()
			.get::<ConnectInfo<std::net::SocketAddr>>()
			.map(|ci| ci.0.ip());

		Box::pin(async move {
			if let Some(ip) = ip {
				if let Err(error) = manager.check(ip) {
					return Ok(error.into_response());
				}
			}
			inner.call(req).await
		})
	}
}

// vim: ts=4
