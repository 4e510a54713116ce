//! Input validation for node registrations.

/// Checks a MAC address of the form `ff:ff:ff:ff:ff:ff` (case-insensitive hex).
pub fn is_valid_mac_address(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 17 {
        return false;
    }
    bytes.iter().enumerate().all(|(idx, byte)| {
        if idx % 3 == 2 {
            *byte == b':'
        } else {
            byte.is_ascii_hexdigit()
        }
    })
}

pub fn validate_node_fields(mac_address: &str, config_path: &str) -> Result<(), String> {
    if !is_valid_mac_address(mac_address.trim()) {
        return Err(format!("invalid mac address: {mac_address:?}"));
    }
    if config_path.trim().is_empty() {
        return Err("node config path is required".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{is_valid_mac_address, validate_node_fields};

    #[test]
    fn accepts_well_formed_addresses() {
        assert!(is_valid_mac_address("ff:ff:ff:ff:ff:ff"));
        assert!(is_valid_mac_address("00:1A:2b:3C:4d:5E"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_mac_address("not a mac address"));
        assert!(!is_valid_mac_address(""));
        assert!(!is_valid_mac_address("ff:ff:ff:ff:ff"));
        assert!(!is_valid_mac_address("ff-ff-ff-ff-ff-ff"));
        assert!(!is_valid_mac_address("gg:ff:ff:ff:ff:ff"));
        assert!(!is_valid_mac_address("ff:ff:ff:ff:ff:ff:"));
    }

    #[test]
    fn node_fields_require_config_path() {
        assert!(validate_node_fields("ff:ff:ff:ff:ff:ff", "myconfig").is_ok());
        let err = match validate_node_fields("ff:ff:ff:ff:ff:ff", "  ") {
            Ok(()) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.contains("config path"), "err={err}");
    }
}
