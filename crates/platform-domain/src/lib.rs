mod application;
mod cluster;
mod errors;
mod manifest;
pub mod validation;

pub use application::{ApplicationDeclaration, ApplicationMetadata, ClusterRef, MAX_REPLICAS};
pub use cluster::{ClusterDeclaration, ClusterMetadata, DatabaseSpec, DnsSpec, Environment, VpcSpec};
pub use errors::DomainError;
pub use manifest::{load_declaration, parse_declaration, Validate};
