//! Multi-scheme authentication and authorization
//!
//! Bearer tokens are classified by shape, verified by exactly one scheme
//! (demo sentinel, Firebase ID token, or locally issued JWT), resolved to a
//! [`Principal`](crate::models::Principal), and checked against the route's
//! [`AccessPolicy`].

pub mod audit;
pub mod classifier;
pub mod context;
pub mod demo;
pub mod error;
pub mod firebase;
pub mod guard;
pub mod local_jwt;
pub mod password;
pub mod pipeline;
pub mod provisioner;

pub use audit::AuditSink;
pub use classifier::{classify, ClassifierSettings, TokenClass, TokenEnvelope};
pub use context::{bearer_token, request_meta, AuthScheme, RequestContext};
pub use error::{AuthError, AuthRejection};
pub use firebase::{
    DecodedIdToken, FirebaseIdentityClient, FirebaseSettings, FirebaseVerifier, IdentityProvider,
    ProviderError, RemoteFailure, RemoteIdentity,
};
pub use guard::{authorize, AccessPolicy, PermissionGuard, RoleGuard};
pub use local_jwt::{LocalFailure, LocalJwtVerifier, LocalTokenIssuer, LocalVerifier};
pub use pipeline::{AuthStage, Authenticator};
pub use provisioner::UserProvisioner;
