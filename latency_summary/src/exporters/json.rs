use crate::projector::ExportPayload;
use anyhow::Result;
use std::path::Path;

pub struct JsonExporter;

impl JsonExporter {
    pub async fn export(payload: &ExportPayload, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(payload)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    pub fn to_string(payload: &ExportPayload) -> Result<String> {
        Ok(serde_json::to_string_pretty(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projector::SummaryProjector;
    use latency_core::{CategoryFilter, EndpointAggregator, Observation, Profile, ProfileAggregate};

    #[tokio::test]
    async fn test_export_writes_flat_object() {
        let obs = Observation {
            profile: Profile::parse("https://a.com").unwrap(),
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: "a.com".to_string(),
            path: "/api/users".to_string(),
            query: "?page=2".to_string(),
            latency_ms: 120,
        };
        let aggregate = EndpointAggregator::apply(ProfileAggregate::new(), &obs);
        let payload = SummaryProjector::export_payload(&aggregate, &CategoryFilter::All);

        let path = std::env::temp_dir().join(format!("latency-export-{}.json", uuid::Uuid::new_v4()));
        JsonExporter::export(&payload, &path).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"1. GET https://a.com/api/users?page=2": 120})
        );
        let _ = tokio::fs::remove_file(&path).await;
    }
}
