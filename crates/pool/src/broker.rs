/// Broker name for an account server: everything before the first `-`.
///
/// `"XMTrading-Real"` maps to `"XMTrading"`; a server without a `-` is its
/// own broker name.
pub fn broker_from_server(server: &str) -> &str {
    server.split_once('-').map_or(server, |(broker, _)| broker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_at_first_separator() {
        assert_eq!(broker_from_server("XMTrading-Real"), "XMTrading");
        assert_eq!(broker_from_server("TitanFX-Demo-02"), "TitanFX");
    }

    #[test]
    fn test_server_without_separator() {
        assert_eq!(broker_from_server("Nope"), "Nope");
        assert_eq!(broker_from_server(""), "");
        assert_eq!(broker_from_server("-Live"), "");
    }
}
