use latency_core::RequestId;
use serde::{Deserialize, Serialize};

/// A request lifecycle event raised by the host's interception layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RequestEvent {
    Started {
        id: RequestId,
        /// Profile override. When absent the URL origin is used.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<String>,
        method: String,
        url: String,
        /// Milliseconds.
        time: u64,
    },
    Completed {
        id: RequestId,
        time: u64,
    },
    Failed {
        id: RequestId,
    },
}

impl RequestEvent {
    pub fn started(id: impl Into<RequestId>, method: &str, url: &str, time: u64) -> Self {
        RequestEvent::Started {
            id: id.into(),
            profile: None,
            method: method.to_string(),
            url: url.to_string(),
            time,
        }
    }

    pub fn completed(id: impl Into<RequestId>, time: u64) -> Self {
        RequestEvent::Completed { id: id.into(), time }
    }

    pub fn failed(id: impl Into<RequestId>) -> Self {
        RequestEvent::Failed { id: id.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let event: RequestEvent = serde_json::from_str(
            r#"{"event":"started","id":1,"method":"GET","url":"https://a.com/","time":5}"#,
        )
        .unwrap();
        assert_eq!(event, RequestEvent::started(1u64, "GET", "https://a.com/", 5));

        let event: RequestEvent = serde_json::from_str(r#"{"event":"failed","id":"9"}"#).unwrap();
        assert_eq!(event, RequestEvent::failed(9u64));

        assert!(serde_json::from_str::<RequestEvent>(r#"{"event":"completed","id":1,"time":-4}"#).is_err());
    }
}
