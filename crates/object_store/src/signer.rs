//! Request signing, kept behind a `Signer` seam: the client calls it on
//! every outgoing request and otherwise never looks at credentials. The real
//! implementation defers the actual signature computation to the `aws-sigv4` /
//! `aws-credential-types` crates, so this module is a thin adapter rather than
//! a hand-rolled HMAC chain.

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{sign, SignableBody, SignableRequest, SigningSettings};
use aws_sigv4::sign::v4;
use std::time::SystemTime;

use crate::error::{Error, Result};

/// Signs an outgoing request in place. Implementors read the method/url/headers
/// off `req` and must set whatever headers the signature requires
/// (`Authorization`, `x-amz-date`, `x-amz-content-sha256`, ...).
pub trait Signer: Send + Sync {
    fn sign(&self, req: &mut http::Request<Vec<u8>>) -> Result<()>;
}

/// A `Signer` backed by a fixed `(access_key, secret_key, region, service)` tuple.
/// `service` is `"s3"` for every operation this client issues.
pub struct SigV4Signer {
    credentials: Credentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(access_key_id: &str, secret_access_key: &str, region: &str) -> Self {
        Self::with_session_token(access_key_id, secret_access_key, None, region)
    }

    pub fn with_session_token(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: Option<&str>,
        region: &str,
    ) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            session_token.map(str::to_string),
            None,
            "sneller-object-store",
        );
        Self {
            credentials,
            region: region.to_string(),
            service: "s3".to_string(),
        }
    }
}

impl Signer for SigV4Signer {
    fn sign(&self, req: &mut http::Request<Vec<u8>>) -> Result<()> {
        let identity = self.credentials.clone().into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(&self.service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| Error::Signing(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            req.method().as_str(),
            req.uri().to_string(),
            req.headers()
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_str().unwrap_or_default())),
            SignableBody::Bytes(req.body()),
        )
        .map_err(|e| Error::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| Error::Signing(e.to_string()))?
            .into_parts();
        instructions.apply_to_request_http1x(req);
        Ok(())
    }
}

/// A no-op signer for tests that talk to an unauthenticated stub server.
pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign(&self, _req: &mut http::Request<Vec<u8>>) -> Result<()> {
        Ok(())
    }
}
