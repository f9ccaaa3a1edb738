/// Configuration for one client session.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket URL of the relay/signaling server.
    pub relay_url: String,
    /// ICE server URLs handed to the peer-connection layer.
    pub ice_servers: Vec<String>,
    /// How long an outgoing call may ring before it is torn down locally.
    pub ring_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: String::new(),
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            ring_timeout_secs: 45,
        }
    }
}
