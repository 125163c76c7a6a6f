//! OIDC parameter: either one object or a `{ "list": [...] }` wrapper.
//!
//! The wire shape is ambiguous, so decoding resolves it into
//! [`OidcConnect`] up front and rejects payloads that carry both forms.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use url::Url;

const VALID_SIGNING_ALGS: [&str; 9] = [
    "RS256", "RS384", "RS512", "ES256", "ES384", "ES512", "PS256", "PS384", "PS512",
];

const MASK: &str = "*****";

/// A single OIDC provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfig {
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(rename = "groupsClaim", default)]
    pub groups_claim: String,
    #[serde(rename = "groupsPrefix", default, skip_serializing_if = "String::is_empty")]
    pub groups_prefix: String,
    #[serde(rename = "issuerURL", default)]
    pub issuer_url: String,
    #[serde(rename = "signingAlgs", default)]
    pub signing_algs: Vec<String>,
    #[serde(rename = "usernameClaim", default)]
    pub username_claim: String,
    #[serde(rename = "usernamePrefix", default)]
    pub username_prefix: String,
    #[serde(rename = "requiredClaims", default, skip_serializing_if = "Vec::is_empty")]
    pub required_claims: Vec<String>,
    #[serde(rename = "encodedJwksArray", default, skip_serializing_if = "String::is_empty")]
    pub encoded_jwks_array: String,
}

impl OidcConfig {
    pub fn is_empty(&self) -> bool {
        self == &OidcConfig::default()
    }

    fn masked(&self) -> Self {
        let mut copy = self.clone();
        if !copy.encoded_jwks_array.is_empty() {
            copy.encoded_jwks_array = MASK.to_string();
        }
        copy
    }
}

/// Decoded OIDC parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OidcConnect {
    #[default]
    Unset,
    Single(OidcConfig),
    List(Vec<OidcConfig>),
}

impl OidcConnect {
    pub fn is_unset(&self) -> bool {
        matches!(self, OidcConnect::Unset)
    }

    pub fn is_provided(&self) -> bool {
        !self.is_unset()
    }

    pub fn is_list(&self) -> bool {
        matches!(self, OidcConnect::List(_))
    }

    /// Copy with JWKS payloads replaced, safe to log.
    pub fn masked(&self) -> Self {
        match self {
            OidcConnect::Unset => OidcConnect::Unset,
            OidcConnect::Single(c) => OidcConnect::Single(c.masked()),
            OidcConnect::List(l) => OidcConnect::List(l.iter().map(OidcConfig::masked).collect()),
        }
    }

    /// Validate against the instance's current OIDC value (if any).
    ///
    /// Errors are joined with `", "`.
    pub fn validate(&self, current: Option<&OidcConnect>) -> Result<(), String> {
        let mut errs = Vec::new();
        match self {
            OidcConnect::Unset => {}
            OidcConnect::Single(config) => {
                if current.is_some_and(OidcConnect::is_list) {
                    return Err(
                        "an object OIDC cannot be used because the instance OIDC configuration uses a list"
                            .to_string(),
                    );
                }
                if !config.is_empty() {
                    validate_single(config, &mut errs);
                }
            }
            OidcConnect::List(list) => {
                for (i, config) in list.iter().enumerate() {
                    validate_indexed(config, i, &mut errs);
                }
            }
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs.join(", "))
        }
    }
}

fn suffix(index: Option<usize>) -> String {
    match index {
        Some(i) => format!(" for OIDC at index {i}"),
        None => String::new(),
    }
}

fn validate_single(config: &OidcConfig, errs: &mut Vec<String>) {
    if config.client_id.is_empty() {
        errs.push("clientID must not be empty".to_string());
    }
    if config.issuer_url.is_empty() {
        errs.push("issuerURL must not be empty".to_string());
    } else {
        validate_issuer_url(&config.issuer_url, None, errs);
    }
    validate_signing_algs(&config.signing_algs, None, errs);
    validate_required_claims(&config.required_claims, None, errs);
    let jwks = &config.encoded_jwks_array;
    if !jwks.is_empty() && jwks != "-" && STANDARD.decode(jwks).is_err() {
        errs.push(
            "encodedJwksArray must be a valid base64-encoded value or set to '-' to disable it if it was used previously"
                .to_string(),
        );
    }
}

fn validate_indexed(config: &OidcConfig, i: usize, errs: &mut Vec<String>) {
    if config.client_id.is_empty() {
        errs.push(format!("clientID must not be empty{}", suffix(Some(i))));
    }
    if config.issuer_url.is_empty() {
        errs.push(format!("issuerURL must not be empty{}", suffix(Some(i))));
    } else {
        validate_issuer_url(&config.issuer_url, Some(i), errs);
    }
    if !config.encoded_jwks_array.is_empty() && STANDARD.decode(&config.encoded_jwks_array).is_err() {
        errs.push(format!(
            "encodedJwksArray must be a valid base64 encoded value at index {i}"
        ));
    }
    validate_signing_algs(&config.signing_algs, Some(i), errs);
    validate_required_claims(&config.required_claims, Some(i), errs);
}

fn validate_issuer_url(raw: &str, index: Option<usize>, errs: &mut Vec<String>) {
    let sfx = suffix(index);
    let issuer = match Url::parse(raw) {
        Ok(u) if u.host_str().is_some_and(|h| !h.is_empty()) => u,
        _ => {
            errs.push(format!(
                "issuerURL must be a valid URL, issuerURL must have https scheme{sfx}"
            ));
            return;
        }
    };
    if issuer.fragment().is_some() {
        errs.push(format!("issuerURL must not contain a fragment{sfx}"));
    }
    if !issuer.username().is_empty() || issuer.password().is_some() {
        errs.push(format!("issuerURL must not contain a username or password{sfx}"));
    }
    if issuer.query().is_some_and(|q| !q.is_empty()) {
        errs.push(format!("issuerURL must not contain a query{sfx}"));
    }
    if issuer.scheme() != "https" {
        errs.push(format!("issuerURL must have https scheme{sfx}"));
    }
}

fn validate_signing_algs(algs: &[String], index: Option<usize>, errs: &mut Vec<String>) {
    if algs.iter().any(|a| !VALID_SIGNING_ALGS.contains(&a.as_str())) {
        errs.push(format!(
            "signingAlgs must contain valid signing algorithm(s){}",
            suffix(index)
        ));
    }
}

fn validate_required_claims(claims: &[String], index: Option<usize>, errs: &mut Vec<String>) {
    // "-" alone clears previously set claims on a single object.
    if index.is_none() && claims.len() == 1 && claims[0] == "-" {
        return;
    }
    for claim in claims {
        let valid = match claim.split_once('=') {
            Some((k, v)) => !k.is_empty() && !v.is_empty(),
            None => false,
        };
        if !valid {
            errs.push(format!(
                "requiredClaims must be in claim=value format, invalid claim: {claim}{}",
                suffix(index)
            ));
        }
    }
}

// ── Serde ──────────────────────────────────────────────────────────

impl Serialize for OidcConnect {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            OidcConnect::Unset => s.serialize_none(),
            OidcConnect::Single(c) => c.serialize(s),
            OidcConnect::List(l) => {
                #[derive(Serialize)]
                struct Wrapper<'a> {
                    list: &'a [OidcConfig],
                }
                Wrapper { list: l }.serialize(s)
            }
        }
    }
}

impl<'de> Deserialize<'de> for OidcConnect {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let value = Value::deserialize(d)?;
        let mut obj: Map<String, Value> = match value {
            Value::Null => return Ok(OidcConnect::Unset),
            Value::Object(obj) => obj,
            other => return Err(D::Error::custom(format!("invalid OIDC value: {other}"))),
        };

        match obj.remove("list") {
            Some(_) if !obj.is_empty() => {
                Err(D::Error::custom("both list and object OIDC cannot be set"))
            }
            Some(Value::Null) => Ok(OidcConnect::List(Vec::new())),
            Some(list) => serde_json::from_value(list)
                .map(OidcConnect::List)
                .map_err(D::Error::custom),
            None => serde_json::from_value(Value::Object(obj))
                .map(OidcConnect::Single)
                .map_err(D::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> OidcConfig {
        OidcConfig {
            client_id: "client".into(),
            issuer_url: "https://issuer.example.com".into(),
            signing_algs: vec!["RS256".into()],
            username_claim: "sub".into(),
            ..Default::default()
        }
    }

    #[test]
    fn decode_single_object() {
        let v: OidcConnect =
            serde_json::from_value(json!({"clientID": "c", "issuerURL": "https://x"})).unwrap();
        assert!(matches!(v, OidcConnect::Single(ref c) if c.client_id == "c"));
    }

    #[test]
    fn decode_list() {
        let v: OidcConnect =
            serde_json::from_value(json!({"list": [{"clientID": "a"}, {"clientID": "b"}]})).unwrap();
        match v {
            OidcConnect::List(l) => assert_eq!(l.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_object_and_list() {
        let err = serde_json::from_value::<OidcConnect>(json!({"clientID": "c", "list": []}))
            .unwrap_err();
        assert!(err.to_string().contains("both list and object OIDC cannot be set"));
    }

    #[test]
    fn decode_null_is_unset() {
        let v: OidcConnect = serde_json::from_value(Value::Null).unwrap();
        assert!(v.is_unset());
    }

    #[test]
    fn list_roundtrips_through_wrapper() {
        let v = OidcConnect::List(vec![valid()]);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("list").is_some());
    }

    #[test]
    fn valid_single_passes() {
        assert!(OidcConnect::Single(valid()).validate(None).is_ok());
    }

    #[test]
    fn empty_single_is_accepted() {
        assert!(OidcConnect::Single(OidcConfig::default()).validate(None).is_ok());
    }

    #[test]
    fn single_collects_all_errors() {
        let cfg = OidcConfig {
            issuer_url: "http://issuer.example.com?x=1".into(),
            signing_algs: vec!["HS256".into()],
            required_claims: vec!["novalue".into()],
            ..Default::default()
        };
        let err = OidcConnect::Single(cfg).validate(None).unwrap_err();
        assert_eq!(
            err,
            "clientID must not be empty, issuerURL must not contain a query, \
             issuerURL must have https scheme, signingAlgs must contain valid signing algorithm(s), \
             requiredClaims must be in claim=value format, invalid claim: novalue"
        );
    }

    #[test]
    fn list_errors_carry_index() {
        let mut second = valid();
        second.client_id.clear();
        let err = OidcConnect::List(vec![valid(), second]).validate(None).unwrap_err();
        assert_eq!(err, "clientID must not be empty for OIDC at index 1");
    }

    #[test]
    fn single_against_list_instance_rejected() {
        let current = OidcConnect::List(vec![valid()]);
        let err = OidcConnect::Single(valid()).validate(Some(&current)).unwrap_err();
        assert!(err.starts_with("an object OIDC cannot be used"));
    }

    #[test]
    fn jwks_dash_allowed_on_single() {
        let mut cfg = valid();
        cfg.encoded_jwks_array = "-".into();
        assert!(OidcConnect::Single(cfg).validate(None).is_ok());
    }

    #[test]
    fn masked_hides_jwks() {
        let mut cfg = valid();
        cfg.encoded_jwks_array = "c2VjcmV0".into();
        let masked = OidcConnect::List(vec![cfg]).masked();
        match masked {
            OidcConnect::List(l) => assert_eq!(l[0].encoded_jwks_array, "*****"),
            _ => unreachable!(),
        }
    }
}
