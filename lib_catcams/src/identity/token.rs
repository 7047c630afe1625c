//! Decoding of the identity provider's signed token.
//!
//! Signature verification belongs to the provider; this side only reads the
//! claims out of the payload segment.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Claims the dashboard cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct IdentityClaim {
    /// Verified email address.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL.
    #[serde(default)]
    pub picture: Option<String>,
}

/// Decodes the payload segment (`header.payload.signature`) into an [`IdentityClaim`].
///
/// Accepts the payload with or without base64 padding.
pub fn verify(signed_token: &str) -> Result<IdentityClaim, AuthError> {
    let payload = signed_token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::MalformedToken("missing payload segment".to_string()))?;

    let bytes = if payload.ends_with('=') {
        URL_SAFE.decode(payload)
    } else {
        URL_SAFE_NO_PAD.decode(payload)
    }
    .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice::<IdentityClaim>(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not a claim set: {e}")))
}

#[cfg(test)]
pub(crate) fn encode_for_test(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_claims() {
        let token = encode_for_test(&json!({
            "email": "cat@feralcreative.co",
            "name": "Cat Person",
            "picture": "https://example.com/p.png",
            "iss": "accounts.google.com"
        }));
        let claim = verify(&token).unwrap();
        assert_eq!(claim.email, "cat@feralcreative.co");
        assert_eq!(claim.name.as_deref(), Some("Cat Person"));
        assert_eq!(claim.picture.as_deref(), Some("https://example.com/p.png"));
    }

    #[test]
    fn keeps_utf8_names_intact() {
        let token = encode_for_test(&json!({"email": "z@x.com", "name": "Zïad Ezzat ✓"}));
        assert_eq!(verify(&token).unwrap().name.as_deref(), Some("Zïad Ezzat ✓"));
    }

    #[test]
    fn accepts_padded_payload() {
        let body = URL_SAFE.encode(json!({"email": "a@x.com"}).to_string());
        let token = format!("h.{body}.s");
        assert_eq!(verify(&token).unwrap().email, "a@x.com");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(matches!(verify("no-dots-here"), Err(AuthError::MalformedToken(_))));
        assert!(matches!(verify("a..c"), Err(AuthError::MalformedToken(_))));
        assert!(matches!(verify("a.!!!.c"), Err(AuthError::MalformedToken(_))));

        let not_json = URL_SAFE_NO_PAD.encode("hello");
        assert!(matches!(verify(&format!("a.{not_json}.c")), Err(AuthError::MalformedToken(_))));

        let no_email = URL_SAFE_NO_PAD.encode(r#"{"name":"x"}"#);
        assert!(matches!(verify(&format!("a.{no_email}.c")), Err(AuthError::MalformedToken(_))));
    }
}
