//! Finding model, aggregation and verification

pub mod aggregate;
pub mod types;
pub mod verify;

pub use aggregate::{AggregateResult, FindingAggregator, FindingSummary};
pub use types::{Evidence, Finding, FindingLocation, RawFinding, Severity, VerificationMethod};
pub use verify::{
    AttemptRecord, FindingVerifier, NullReproducer, ReproduceOutcome, Reproducer,
    VerificationStatus, VerifiedFinding, VerifyOptions,
};
