//! Shared domain types for the Recap connector layer.

pub mod credential;
pub mod document;
pub mod source;

pub use credential::{Credential, CredentialJson};
pub use document::{Document, MetadataValue, Section, SlimDocument};
pub use source::{
    DocumentSource, InputType, ParseInputTypeError, ParseSourceError,
    SOURCES_REQUIRING_TENANT_CONTEXT,
};
