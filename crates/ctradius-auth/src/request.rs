//! Username normalization
//!
//! A raw RADIUS username may carry a requested VLAN as `<username><sep><vlan>`
//! when VLAN requests are enabled.

use crate::error::AuthError;

/// Normalized request handed to every module in the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRequest {
    username: String,
    requested_vlan: Option<u32>,
}

impl UserRequest {
    pub fn new(username: impl Into<String>, requested_vlan: Option<u32>) -> Self {
        UserRequest {
            username: username.into(),
            requested_vlan,
        }
    }

    /// Parse a raw username.
    ///
    /// `vlan_separator` is `None` when VLAN requests are disabled; the whole
    /// trimmed string is then the username, separator or not.
    pub fn parse(raw: &str, vlan_separator: Option<&str>) -> Result<Self, AuthError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AuthError::authentication("The provided username is empty"));
        }

        let sep = match vlan_separator {
            Some(sep) if !sep.is_empty() && trimmed.contains(sep) => sep,
            _ => return Ok(UserRequest::new(trimmed.to_lowercase(), None)),
        };

        let mut parts = trimmed.split(sep);
        let user_part = parts.next().unwrap_or_default().trim();
        let vlan_part = parts.next().unwrap_or_default().trim();

        if parts.next().is_some() {
            return Err(AuthError::authentication(format!(
                "Invalid username format: too many '{sep}' separators. Expected '<username>{sep}<vlanId>'."
            )));
        }

        if user_part.is_empty() {
            return Err(AuthError::authentication(format!(
                "Invalid username format: expected '<username>{sep}<vlanId>', but the username part before '{sep}' is empty."
            )));
        }

        if vlan_part.is_empty() {
            return Err(AuthError::authentication(format!(
                "Invalid username format: expected '<username>{sep}<vlanId>', but no VLAN ID was provided after '{sep}'."
            )));
        }

        let vlan = vlan_part.parse::<u32>().map_err(|_| {
            AuthError::authentication(format!(
                "Invalid VLAN ID '{vlan_part}'. VLAN IDs must be a non-negative integer (0 or higher)."
            ))
        })?;

        Ok(UserRequest::new(user_part.to_lowercase(), Some(vlan)))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn requested_vlan(&self) -> Option<u32> {
        self.requested_vlan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn parse_vlan(raw: &str) -> Result<UserRequest, AuthError> {
        UserRequest::parse(raw, Some("|"))
    }

    #[test]
    fn test_plain_username_is_trimmed_and_lowercased() {
        let req = parse_vlan("  Alice ").unwrap();
        assert_eq!(req.username(), "alice");
        assert_eq!(req.requested_vlan(), None);
    }

    #[test]
    fn test_username_with_vlan() {
        let req = parse_vlan("Alice|10").unwrap();
        assert_eq!(req, UserRequest::new("alice", Some(10)));

        let req = parse_vlan(" Bob | 0 ").unwrap();
        assert_eq!(req, UserRequest::new("bob", Some(0)));
    }

    #[test]
    fn test_malformed_vlan_requests_rejected() {
        for raw in ["alice|", "alice|-1", "alice|10|20", "|10", "alice|ten", "alice|1.5", "   ", ""] {
            let err = parse_vlan(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Authentication, "{:?}", raw);
        }
    }

    #[test]
    fn test_separator_ignored_when_vlan_requests_disabled() {
        let req = UserRequest::parse("Alice|10", None).unwrap();
        assert_eq!(req.username(), "alice|10");
        assert_eq!(req.requested_vlan(), None);

        let req = UserRequest::parse("alice|10|20", None).unwrap();
        assert_eq!(req.username(), "alice|10|20");
    }

    #[test]
    fn test_multi_char_separator() {
        let req = UserRequest::parse("carol_vlan_42", Some("_vlan_")).unwrap();
        assert_eq!(req, UserRequest::new("carol", Some(42)));
    }

    proptest! {
        #[test]
        fn prop_username_without_separator_is_normalized(s in "[^|]*") {
            prop_assume!(!s.trim().is_empty());
            let req = parse_vlan(&s).unwrap();
            prop_assert_eq!(req.username(), s.trim().to_lowercase());
            prop_assert_eq!(req.requested_vlan(), None);
        }

        #[test]
        fn prop_disabled_vlan_requests_never_split(s in ".*") {
            prop_assume!(!s.trim().is_empty());
            let req = UserRequest::parse(&s, None).unwrap();
            prop_assert_eq!(req.username(), s.trim().to_lowercase());
            prop_assert_eq!(req.requested_vlan(), None);
        }

        #[test]
        fn prop_valid_vlan_suffix_round_trips(user in "[a-zA-Z][a-zA-Z0-9.]{0,15}", vlan in 0u32..5000) {
            let req = parse_vlan(&format!("{user}|{vlan}")).unwrap();
            prop_assert_eq!(req.username(), user.to_lowercase());
            prop_assert_eq!(req.requested_vlan(), Some(vlan));
        }
    }
}
