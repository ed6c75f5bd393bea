use crate::aggregate::EndpointKey;
use crate::profile::Profile;
use serde::{Deserialize, Serialize};

/// One completed, measured request, ready for aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub profile: Profile,
    pub method: String,
    pub scheme: String,
    /// Host plus any non-default port.
    pub host: String,
    pub path: String,
    /// Query string verbatim, including the leading `?`, or empty.
    pub query: String,
    pub latency_ms: u64,
}

impl Observation {
    pub fn endpoint_key(&self) -> EndpointKey {
        EndpointKey::new(&self.method, &self.path, &self.query)
    }
}
