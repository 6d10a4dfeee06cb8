use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Content, ContentPayload, ContentType, ResponsePayload, ResponseStatus};
use crate::{ContentId, KeyPackage, Result, SelfkitError};

/// Request asking whoever scans it to open a connection with the key package owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    key_package: KeyPackage,
    expires: DateTime<Utc>,
}

impl DiscoveryRequest {
    /// Start building a discovery request around a negotiated key package.
    pub fn builder(key_package: KeyPackage) -> DiscoveryRequestBuilder {
        DiscoveryRequestBuilder {
            key_package,
            expires: None,
        }
    }

    pub fn key_package(&self) -> &KeyPackage {
        &self.key_package
    }

    /// Advisory expiry communicated to the responder.
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

impl ContentPayload for DiscoveryRequest {
    const CONTENT_TYPE: ContentType = ContentType::DiscoveryRequest;
}

/// Builder for [`DiscoveryRequest`].
#[derive(Debug, Clone)]
pub struct DiscoveryRequestBuilder {
    key_package: KeyPackage,
    expires: Option<DateTime<Utc>>,
}

impl DiscoveryRequestBuilder {
    pub fn expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Encode the request. Fails if no expiry was set.
    pub fn finish(self) -> Result<Content> {
        let expires = self
            .expires
            .ok_or_else(|| SelfkitError::invalid_data("expires", "required"))?;

        DiscoveryRequest {
            key_package: self.key_package,
            expires,
        }
        .into_content()
    }
}

/// Answer to a discovery request, sent over the freshly established connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    response_to: ContentId,
    status: ResponseStatus,
}

impl DiscoveryResponse {
    pub fn new(response_to: ContentId, status: ResponseStatus) -> Self {
        Self {
            response_to,
            status,
        }
    }
}

impl ContentPayload for DiscoveryResponse {
    const CONTENT_TYPE: ContentType = ContentType::DiscoveryResponse;
}

impl ResponsePayload for DiscoveryResponse {
    fn response_to(&self) -> &ContentId {
        &self.response_to
    }

    fn status(&self) -> ResponseStatus {
        self.status
    }
}
