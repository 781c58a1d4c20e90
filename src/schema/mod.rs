// ============================================================================
// Schema Module
// ============================================================================
//
// Store declarations go through two stages before a session keeps them:
// - normalize: three input shapes -> one ordered list of StoreDefinition
// - validator: semantic checks with typed configuration errors
//
// ============================================================================

pub mod declaration;
pub mod definition;
pub mod normalize;
pub mod validator;

pub use declaration::{RejectedField, StoreConfig, StoreDeclarations, StoreInput, StoreOptions};
pub use definition::{KeyPath, StoreDefinition, StoreParameters};
pub use normalize::normalize;
pub use validator::{ValidatedSchema, verify_parameters};
