pub mod aggregate;
pub mod classifier;
pub mod correlator;
pub mod error;
pub mod observation;
pub mod profile;
pub mod retry;
pub mod serializer;
pub mod store;

pub use aggregate::{AggregateChange, EndpointAggregator, EndpointEntry, EndpointKey, ProfileAggregate};
pub use classifier::{classify, Category, CategoryFilter, EndpointDescriptor};
pub use correlator::{CorrelatorStats, InFlightRequest, RequestCorrelator, StartOutcome};
pub use error::{LatencyError, Result};
pub use observation::Observation;
pub use profile::{Profile, RequestId};
pub use retry::RetryPolicy;
pub use serializer::PersistenceSerializer;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError};

// Re-export commonly used types
pub use async_trait::async_trait;
