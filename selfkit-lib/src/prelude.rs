//! Prelude module for convenient imports.
//!
//! ```rust
//! use selfkit_lib::prelude::*;
//! ```

pub use crate::{Address, ContentId, Result};

pub use crate::errors::{SelfkitError, SelfkitErrorCode};

pub use crate::account::{Account, KeyPackage, Token, Welcome};
pub use crate::config::{AccountConfig, LogLevel, Target};

pub use crate::credential::predicate::Predicate;
pub use crate::credential::{
    CredentialBuilder, PresentationBuilder, VerifiableCredential, VerifiablePresentation,
};

pub use crate::event::{InboundEvent, KeyPackageEvent, MessageEvent, WelcomeEvent};
pub use crate::message::{
    AnonymousMessage, Chat, Content, ContentPayload, ContentType, CredentialMessage,
    CredentialPresentationRequest, CredentialPresentationResponse, CredentialVerificationRequest,
    CredentialVerificationResponse, DiscoveryRequest, DiscoveryResponse, Introduction,
    ResponsePayload, ResponseStatus,
};
pub use crate::object::Object;
