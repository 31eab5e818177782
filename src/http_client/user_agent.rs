//! User agent handling for HTTP requests.

/// Default browser-like user agent.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Identifying user agent for sites that prefer honest crawlers.
pub const BOT_USER_AGENT: &str = concat!(
    "seointel/",
    env!("CARGO_PKG_VERSION"),
    " (+competitor SEO monitoring)"
);

/// Resolve user agent from config value.
/// - None => default browser user agent
/// - "bot" => identifying seointel user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config {
        None | Some("") => USER_AGENT.to_string(),
        Some("bot") => BOT_USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        assert!(resolve_user_agent(None).starts_with("Mozilla/5.0"));
        assert!(resolve_user_agent(Some("")).starts_with("Mozilla/5.0"));
    }

    #[test]
    fn test_resolve_user_agent_bot() {
        assert!(resolve_user_agent(Some("bot")).starts_with("seointel/"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyAgent/1.0")), "MyAgent/1.0");
    }
}
