const NODE_ID: &str = "NETWATCH_NODE_ID";

/// Node identity from the environment, falling back to the host name
pub fn get_node_id() -> Option<String> {
    std::env::var(NODE_ID)
        .ok()
        .filter(|id| !id.trim().is_empty())
        .or_else(sysinfo::System::host_name)
}

const COLLECTOR: &str = "NETWATCH_COLLECTOR";

/// Hub URL used when nothing else is configured
pub const DEFAULT_COLLECTOR: &str = "http://127.0.0.1:8080";

pub fn get_collector_url() -> Option<String> {
    std::env::var(COLLECTOR).ok().filter(|url| !url.trim().is_empty())
}

const AUTH_TOKEN: &str = "NETWATCH_TOKEN";

pub fn get_auth_token() -> Option<String> {
    std::env::var(AUTH_TOKEN).ok().filter(|t| !t.is_empty())
}
