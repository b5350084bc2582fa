/// Defaults used when a scan request leaves a field out
pub const DEFAULT_SERVICE_TYPE: &str = "http";
pub const DEFAULT_PROTOCOL: &str = "tcp";
pub const DEFAULT_DOMAIN: &str = "local.";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Builds the DNS-SD browse string, e.g. `("http", "tcp", "local.")` -> `"_http._tcp.local."`.
/// Leading underscores and stray dots on the inputs are tolerated.
pub fn service_type_string(service_type: &str, protocol: &str, domain: &str) -> String {
    let service_type = service_type.trim_start_matches('_').trim_end_matches('.');
    let protocol = protocol.trim_start_matches('_').trim_end_matches('.');
    let domain = domain.trim_matches('.');
    format!("_{}._{}.{}.", service_type, protocol, domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_string_defaults() {
        let s = service_type_string(DEFAULT_SERVICE_TYPE, DEFAULT_PROTOCOL, DEFAULT_DOMAIN);
        assert_eq!(s, "_http._tcp.local.");
    }

    #[test]
    fn test_service_type_string_tolerates_prefixed_input() {
        assert_eq!(service_type_string("_mqtt", "_tcp.", "local"), "_mqtt._tcp.local.");
    }
}
