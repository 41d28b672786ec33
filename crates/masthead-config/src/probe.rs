//! HTTPS availability probe used before forcing TLS on.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Probe timeout. A site that cannot answer within this window is treated as
/// unavailable over HTTPS.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The site answered with an accepted status.
    Available,
    /// The site was unreachable or answered with a disallowed status.
    Unavailable {
        /// Failure detail for the save report.
        detail: String,
    },
}

/// Port for the HTTPS availability check.
#[async_trait]
pub trait SslProbe: Send + Sync {
    /// Check whether `host` answers over HTTPS.
    async fn check(&self, host: &str) -> ProbeOutcome;
}

/// Whether `status` counts as "available" for the probe.
///
/// Accepts success, the full redirect family, and 503 so sites behind
/// maintenance pages or redirecting proxies still pass.
#[must_use]
pub const fn status_allowed(status: u16) -> bool {
    matches!(status, 200 | 301..=310 | 503)
}

/// Probe issuing one `GET https://{host}/` with a bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpsProber {
    client: reqwest::Client,
}

impl HttpsProber {
    /// Build a prober with the standard timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    async fn check_url(&self, url: &str) -> ProbeOutcome {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(url, status, "https probe answered");
                if status_allowed(status) {
                    ProbeOutcome::Available
                } else {
                    ProbeOutcome::Unavailable {
                        detail: format!("https probe returned status {status}"),
                    }
                }
            }
            Err(err) => ProbeOutcome::Unavailable {
                detail: err.to_string(),
            },
        }
    }
}

#[async_trait]
impl SslProbe for HttpsProber {
    async fn check(&self, host: &str) -> ProbeOutcome {
        self.check_url(&format!("https://{host}/")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn allowed_response_reports_available() {
        let server = MockServer::start_async().await;
        let ok = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200);
        });

        let prober = HttpsProber::new().expect("client builds");
        let outcome = prober.check_url(&format!("{}/", server.base_url())).await;
        assert_eq!(outcome, ProbeOutcome::Available);
        ok.assert();
    }

    #[tokio::test]
    async fn redirect_response_reports_available() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(301).header("location", "/next");
        });

        let prober = HttpsProber::new().expect("client builds");
        let outcome = prober.check_url(&format!("{}/", server.base_url())).await;
        // Redirects count as available and must not be followed.
        assert_eq!(outcome, ProbeOutcome::Available);
    }

    #[tokio::test]
    async fn disallowed_response_reports_unavailable_with_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(404);
        });

        let prober = HttpsProber::new().expect("client builds");
        let outcome = prober.check_url(&format!("{}/", server.base_url())).await;
        match outcome {
            ProbeOutcome::Unavailable { detail } => assert!(detail.contains("404")),
            ProbeOutcome::Available => panic!("disallowed status must not pass"),
        }
    }

    #[test]
    fn allowed_statuses_cover_redirects_and_maintenance() {
        for status in [200, 301, 305, 310, 503] {
            assert!(status_allowed(status), "status {status} should pass");
        }
        for status in [201, 204, 300, 311, 400, 404, 500] {
            assert!(!status_allowed(status), "status {status} should fail");
        }
    }

    #[tokio::test]
    async fn unreachable_host_reports_unavailable() {
        let prober = HttpsProber::new().expect("client builds");
        // Port 1 on loopback refuses immediately.
        let outcome = prober.check("127.0.0.1:1").await;
        assert!(matches!(outcome, ProbeOutcome::Unavailable { .. }));
    }
}
