// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::{Duration, Instant};

use poem::http::{HeaderName, HeaderValue};
use poem::web::RealIp;
use poem::{Endpoint, FromRequest, IntoResponse, Middleware, Request, Response, Result};
use tracing::{error, info, warn, Instrument};

use crate::uid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request span plus one completion line per API call.
///
/// Reuses the caller's `x-request-id` when present and echoes it back.
#[derive(Default)]
pub struct Tracing;

impl<E: Endpoint> Middleware<E> for Tracing {
    type Output = TracingEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        TracingEndpoint { inner: ep }
    }
}

pub struct TracingEndpoint<E> {
    inner: E,
}

impl<E: Endpoint> Endpoint for TracingEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        let remote_addr = match RealIp::from_request_without_body(&req).await {
            Ok(RealIp(Some(ip))) => ip.to_string(),
            _ => req.remote_addr().to_string(),
        };
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(str::to_string)
            .unwrap_or_else(|| uid!());
        let span = tracing::info_span!(
            "api",
            request_id = %request_id,
            remote_addr = %remote_addr,
            method = %req.method(),
            path = %req.uri().path(),
        );

        async move {
            let started = Instant::now();
            let result = self.inner.call(req).await;
            let elapsed = started.elapsed();
            match result {
                Ok(output) => {
                    let mut response = output.into_response();
                    completed(response.status().as_u16(), elapsed);
                    if let Ok(value) = HeaderValue::from_str(&request_id) {
                        response
                            .headers_mut()
                            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    completed(err.status().as_u16(), elapsed);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn completed(status: u16, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    if status >= 500 {
        error!(status, elapsed_ms, "api call failed");
    } else if status >= 400 {
        warn!(status, elapsed_ms, "api call rejected");
    } else {
        info!(status, elapsed_ms, "api call completed");
    }
}

#[cfg(test)]
mod tests {
    use poem::test::TestClient;
    use poem::{handler, EndpointExt, Route};

    use super::*;

    #[handler]
    fn ok() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn test_request_id_is_echoed_or_generated() {
        let client = TestClient::new(Route::new().at("/", ok).with(Tracing));

        let response = client
            .get("/")
            .header(REQUEST_ID_HEADER, "abc-123")
            .send()
            .await;
        response.assert_status_is_ok();
        response.assert_header(REQUEST_ID_HEADER, "abc-123");

        let response = client.get("/").send().await;
        response.assert_status_is_ok();
        response.assert_header_exist(REQUEST_ID_HEADER);
    }
}
