//! RADIUS responses and their attribute-line encoding
//!
//! ```text
//! Reject:     Auth-Type := Reject
//! Accept:     Auth-Type := Accept
//!             [VLAN lines]
//! Challenge:  Cleartext-Password := "<password>"
//!             [VLAN lines]
//!
//! VLAN lines: Ct-Tunnel-Type := 13
//!             Ct-Tunnel-Medium-Type := 6
//!             Ct-Tunnel-Private-Group-Id := <vlan>
//! ```

use crate::validation::{invalid_chars, is_allowed_password};
use std::fmt;
use thiserror::Error;

/// Tunnel-Type value for VLAN (RFC 3580)
pub const TUNNEL_TYPE_VLAN: u32 = 13;

/// Tunnel-Medium-Type value for IEEE-802 (RFC 2868)
pub const TUNNEL_MEDIUM_IEEE_802: u32 = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Cleartext password contains characters unsafe for RADIUS configuration: {0:?}")]
    UnsafePassword(Vec<char>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Reject,
    Accept,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Reject => write!(f, "Reject"),
            AuthType::Accept => write!(f, "Accept"),
        }
    }
}

/// Tunnel attributes that place the session on a VLAN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VlanAttributes {
    pub tunnel_type: u32,
    pub tunnel_medium_type: u32,
    pub tunnel_private_group_id: u32,
}

impl VlanAttributes {
    /// VLAN tunnel over IEEE-802 for the given VLAN id
    pub fn new(vlan_id: u32) -> Self {
        VlanAttributes {
            tunnel_type: TUNNEL_TYPE_VLAN,
            tunnel_medium_type: TUNNEL_MEDIUM_IEEE_802,
            tunnel_private_group_id: vlan_id,
        }
    }
}

impl fmt::Display for VlanAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Ct-Tunnel-Type := {}", self.tunnel_type)?;
        writeln!(f, "Ct-Tunnel-Medium-Type := {}", self.tunnel_medium_type)?;
        write!(f, "Ct-Tunnel-Private-Group-Id := {}", self.tunnel_private_group_id)
    }
}

/// Authorization decision handed back to the RADIUS server
///
/// `Challenge` can only be built through [`RadiusResponse::challenge`], which
/// validates the password; the field is private to keep it that way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadiusResponse {
    Reject,
    Accept { vlan: Option<VlanAttributes> },
    Challenge(Challenge),
}

/// Cleartext password for the RADIUS server to check the supplicant against
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge {
    cleartext_password: String,
    vlan: Option<VlanAttributes>,
}

impl Challenge {
    pub fn cleartext_password(&self) -> &str {
        &self.cleartext_password
    }

    pub fn vlan(&self) -> Option<&VlanAttributes> {
        self.vlan.as_ref()
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("cleartext_password", &"<redacted>")
            .field("vlan", &self.vlan)
            .finish()
    }
}

impl RadiusResponse {
    pub fn accept(vlan: Option<VlanAttributes>) -> Self {
        RadiusResponse::Accept { vlan }
    }

    /// Build a Challenge, refusing passwords outside the allow-list
    pub fn challenge(
        cleartext_password: impl Into<String>,
        vlan: Option<VlanAttributes>,
    ) -> Result<Self, ResponseError> {
        let cleartext_password = cleartext_password.into();
        if !is_allowed_password(&cleartext_password) {
            return Err(ResponseError::UnsafePassword(invalid_chars(&cleartext_password)));
        }
        Ok(RadiusResponse::Challenge(Challenge {
            cleartext_password,
            vlan,
        }))
    }

    pub fn is_reject(&self) -> bool {
        matches!(self, RadiusResponse::Reject)
    }

    /// VLAN carried by an Accept or Challenge
    pub fn vlan(&self) -> Option<&VlanAttributes> {
        match self {
            RadiusResponse::Reject => None,
            RadiusResponse::Accept { vlan } => vlan.as_ref(),
            RadiusResponse::Challenge(challenge) => challenge.vlan(),
        }
    }
}

impl fmt::Display for RadiusResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vlan = match self {
            RadiusResponse::Reject => return write!(f, "Auth-Type := {}", AuthType::Reject),
            RadiusResponse::Accept { vlan } => {
                write!(f, "Auth-Type := {}", AuthType::Accept)?;
                vlan
            }
            RadiusResponse::Challenge(challenge) => {
                write!(f, "Cleartext-Password := \"{}\"", challenge.cleartext_password)?;
                &challenge.vlan
            }
        };
        if let Some(vlan) = vlan {
            write!(f, "\n{}", vlan)?;
        }
        Ok(())
    }
}
