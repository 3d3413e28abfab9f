// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the SCP directory types.

#[cfg(test)]
mod tests {
    use crate::scp::{parse_reported_ip, Credentials, ServerInterface};
    use std::net::IpAddr;

    #[test]
    fn test_parse_reported_ip_plain() {
        assert_eq!(
            parse_reported_ip("192.0.2.10"),
            Some("192.0.2.10".parse::<IpAddr>().unwrap())
        );
    }

    #[test]
    fn test_parse_reported_ip_strips_cidr() {
        assert_eq!(
            parse_reported_ip("2001:db8:1::/64"),
            Some("2001:db8:1::".parse::<IpAddr>().unwrap())
        );
        assert_eq!(
            parse_reported_ip(" 192.0.2.10/32 "),
            Some("192.0.2.10".parse::<IpAddr>().unwrap())
        );
    }

    #[test]
    fn test_parse_reported_ip_invalid() {
        assert_eq!(parse_reported_ip("eth0"), None);
        assert_eq!(parse_reported_ip(""), None);
    }

    #[test]
    fn test_public_interface_needs_both_families() {
        let dual = ServerInterface {
            mac: "00:00:5e:00:53:01".to_string(),
            ipv4: vec!["192.0.2.10".to_string()],
            ipv6: vec!["2001:db8::/64".to_string()],
        };
        assert!(dual.is_public());

        let private = ServerInterface {
            mac: "00:00:5e:00:53:02".to_string(),
            ipv4: vec!["10.0.0.2".to_string()],
            ipv6: vec![],
        };
        assert!(!private.is_public());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("12345", "hunter2");
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("12345"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
