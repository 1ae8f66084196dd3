//! Tenancy core types: namespace names, quota policy, provisioning outcomes.

#![forbid(unsafe_code)]

mod error;
mod name;
mod outcome;
mod policy;
pub mod quantity;

pub use error::{GatewayError, GatewayResult, NameError, ProvisionError, TemplateError};
pub use name::NamespaceName;
pub use outcome::{FailedStep, NamespaceStatusView, ProvisioningResult, QuotaView};
pub use policy::{QuotaPolicy, QuotaSnapshot, QUOTA_OBJECT_NAME};
pub use quantity::{Cpu, Memory, QuantityError};

/// Outcome of a create call against a backend that treats "already there" as a
/// normal answer rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}
