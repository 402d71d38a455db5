//! Token issuance and lifecycle.
//!
//! - [`jwt`] - signing keys and JWT encoding/decoding
//! - [`service`] - access/refresh issuance, refresh and revocation
//! - [`verification`] - mirror of issued token ids at the verification service

pub mod jwt;
pub mod service;
pub mod verification;

pub use jwt::{
    AccessTokenClaims, AccessTokenClaimsBuilder, JwtError, JwtService, REFRESH_TOKEN_USE,
    RefreshTokenClaims, SigningAlgorithm, SigningKeyPair, SigningKeyPem,
};
pub use service::{IssuedAccessToken, IssuedTokens, TokenConfig, TokenLifecycleTracker};
pub use verification::{HttpVerificationChannel, VerificationChannel};
