use crate::projector::SummaryRow;
use anyhow::Result;
use latency_core::Profile;
use std::path::Path;

pub struct PrometheusExporter;

impl PrometheusExporter {
    pub async fn export(profile: &Profile, rows: &[SummaryRow], path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, Self::format(profile, rows)).await?;
        Ok(())
    }

    pub fn format(profile: &Profile, rows: &[SummaryRow]) -> String {
        let mut out = String::from(
            "# HELP endpoint_latency_max_ms Worst observed latency per endpoint in milliseconds\n\
             # TYPE endpoint_latency_max_ms gauge\n",
        );
        for row in rows {
            out.push_str(&format!(
                "endpoint_latency_max_ms{{profile=\"{}\",seq=\"{}\",method=\"{}\",category=\"{}\",url=\"{}\"}} {}\n",
                escape(profile.as_str()),
                row.ordinal(),
                escape(&row.entry.method),
                row.category,
                escape(&row.entry.url()),
                row.entry.latency_ms
            ));
        }
        out.push_str(&format!(
            "\n# HELP endpoint_count Number of distinct endpoints\n\
             # TYPE endpoint_count gauge\n\
             endpoint_count{{profile=\"{}\"}} {}\n",
            escape(profile.as_str()),
            rows.len()
        ));
        out
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use latency_core::{Category, EndpointEntry};

    #[test]
    fn test_format_escapes_labels() {
        let rows = vec![SummaryRow {
            seq: 0,
            category: Category::FetchXhr,
            entry: EndpointEntry {
                method: "GET".to_string(),
                scheme: "https".to_string(),
                host: "a.com".to_string(),
                path: "/api/search".to_string(),
                query: "?q=\"x\"".to_string(),
                latency_ms: 12,
            },
        }];
        let text = PrometheusExporter::format(&Profile::parse("https://a.com").unwrap(), &rows);

        assert!(text.contains(
            r#"endpoint_latency_max_ms{profile="https://a.com",seq="1",method="GET",category="Fetch/XHR",url="https://a.com/api/search?q=\"x\""} 12"#
        ));
        assert!(text.contains(r#"endpoint_count{profile="https://a.com"} 1"#));
    }
}
