//! Stream identity

/// Unique identifier for a stream (app + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamKey {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name (e.g., "room_42")
    pub name: String,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }

    /// RTMP URL for this stream on `addr` (host or host:port)
    pub fn rtmp_url(&self, addr: &str) -> String {
        format!("rtmp://{}/{}/{}", addr, self.app, self.name)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let key = StreamKey::new("live", "room_42");
        assert_eq!(key.to_string(), "live/room_42");
    }

    #[test]
    fn test_rtmp_url() {
        let key = StreamKey::new("live", "room_42");
        assert_eq!(
            key.rtmp_url("origin.example:1935"),
            "rtmp://origin.example:1935/live/room_42"
        );
    }
}
