//! Built-in defaults with environment overrides

/// Default loopback port for the callback server
pub const DEFAULT_CALLBACK_PORT: u16 = 8489;

/// Default redirect URI, honoring `TETHER_CALLBACK_PORT`
pub fn default_redirect_uri() -> String {
    let port = std::env::var("TETHER_CALLBACK_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_CALLBACK_PORT);
    format!("http://127.0.0.1:{}/callback", port)
}

/// Base URL of the hosted platform, honoring `TETHER_PLATFORM_URL`
pub fn platform_base_url() -> String {
    std::env::var("TETHER_PLATFORM_URL")
        .unwrap_or_else(|_| "https://platform.tether.dev".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_default_redirect_uri() {
        std::env::remove_var("TETHER_CALLBACK_PORT");
        assert_eq!(default_redirect_uri(), "http://127.0.0.1:8489/callback");
    }

    #[test]
    #[serial]
    fn test_redirect_uri_port_override() {
        std::env::set_var("TETHER_CALLBACK_PORT", "9100");
        assert_eq!(default_redirect_uri(), "http://127.0.0.1:9100/callback");
        std::env::remove_var("TETHER_CALLBACK_PORT");
    }
}
