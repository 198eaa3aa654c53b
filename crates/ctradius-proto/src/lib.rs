//! RADIUS attribute-line responses
//!
//! This crate encodes authorization decisions as the attribute assignment
//! lines a RADIUS server reads from an external decision script
//! (for example FreeRADIUS `exec` / `rlm_exec` with `output_pairs`).
//!
//! # Features
//!
//! - Reject, Accept and Challenge responses
//! - RFC 2868 VLAN tunnel attributes
//! - Character allow-list validation for cleartext passwords, so a password
//!   can never break out of the quoted attribute value
//!
//! # Example
//!
//! ```rust
//! use ctradius_proto::{RadiusResponse, VlanAttributes};
//!
//! let response = RadiusResponse::challenge("Good_Pass123!", Some(VlanAttributes::new(20))).unwrap();
//! assert_eq!(
//!     response.to_string(),
//!     "Cleartext-Password := \"Good_Pass123!\"\n\
//!      Ct-Tunnel-Type := 13\n\
//!      Ct-Tunnel-Medium-Type := 6\n\
//!      Ct-Tunnel-Private-Group-Id := 20"
//! );
//!
//! assert_eq!(RadiusResponse::Reject.to_string(), "Auth-Type := Reject");
//! ```

pub mod response;
pub mod validation;

pub use response::{
    AuthType, Challenge, RadiusResponse, ResponseError, VlanAttributes, TUNNEL_MEDIUM_IEEE_802,
    TUNNEL_TYPE_VLAN,
};
pub use validation::{invalid_chars, is_allowed_password, ALLOWED_SYMBOLS};
