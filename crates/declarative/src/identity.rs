//! Composite resource identifiers.
//!
//! Every managed object is addressed by a [`ResourceKey`]: the service, the
//! instance and a fixed, per-kind list of discriminators. The key is
//! persisted as one opaque string. The current generation joins the fields
//! with [`DELIMITER`], which is rejected inside any field so the encoding
//! can always be split back unambiguously.
//!
//! Records written by older releases used other shapes (slashes, spaces,
//! `host:port`). Each [`IdentityScheme`] carries the legacy formats of its
//! own kind, and [`IdentityScheme::decode`] tries the current generation
//! first and then each legacy format from newest to oldest. A legacy decode
//! is a successful decode; the caller persists the re-encoded identifier.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator of the current identifier generation.
pub const DELIMITER: &str = "::";

/// Natural identity of a remote object
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub service_name: String,
    pub instance_name: String,
    /// Ordered per-kind discriminators. Empty strings are unknown values.
    #[serde(default)]
    pub discriminators: Vec<String>,
}

impl ResourceKey {
    pub fn new(service_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            instance_name: instance_name.into(),
            discriminators: Vec::new(),
        }
    }

    /// Append a discriminator
    pub fn with(mut self, value: impl Into<String>) -> Self {
        self.discriminators.push(value.into());
        self
    }

    /// Discriminator at `index`, empty when absent
    pub fn discriminator(&self, index: usize) -> &str {
        self.discriminators.get(index).map_or("", String::as_str)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service_name, self.instance_name)?;
        let known: Vec<&str> = self
            .discriminators
            .iter()
            .map(String::as_str)
            .filter(|d| !d.is_empty())
            .collect();
        if !known.is_empty() {
            write!(f, " [{}]", known.join(", "))?;
        }
        Ok(())
    }
}

/// How a discriminator may be left empty
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Always present in a resolved key
    Required,
    /// May be empty; empty only matches an empty remote value
    Optional,
    /// May be empty; empty matches any remote value and is never backfilled
    Wildcard,
}

/// Value domain of a discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Integer,
}

/// One discriminator position of a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub name: &'static str,
    pub presence: Presence,
    pub kind: SlotKind,
}

impl Slot {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::Required,
            kind: SlotKind::Text,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::Optional,
            kind: SlotKind::Text,
        }
    }

    pub const fn wildcard(name: &'static str) -> Self {
        Self {
            name,
            presence: Presence::Wildcard,
            kind: SlotKind::Text,
        }
    }

    /// Restrict the slot to unsigned integers
    pub const fn integer(self) -> Self {
        Self {
            kind: SlotKind::Integer,
            ..self
        }
    }

    pub fn is_optional(&self) -> bool {
        !matches!(self.presence, Presence::Required)
    }

    fn accepts(&self, value: &str) -> bool {
        match self.kind {
            SlotKind::Text => true,
            SlotKind::Integer => value.parse::<u32>().is_ok(),
        }
    }
}

/// A historical identifier shape
#[derive(Debug, Clone, Copy)]
pub struct LegacyFormat {
    /// Human-readable shape, e.g. `<service>/<instance>`
    pub shape: &'static str,
    /// Returns `None` when the string does not have this shape
    pub parse: fn(&str) -> Option<ResourceKey>,
}

/// Which generation an identifier was decoded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    Current,
    Legacy(&'static str),
}

/// A decoded identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub key: ResourceKey,
    pub generation: Generation,
}

impl Decoded {
    pub fn is_legacy(&self) -> bool {
        matches!(self.generation, Generation::Legacy(_))
    }
}

/// Identifier layout of one resource kind
#[derive(Debug)]
pub struct IdentityScheme {
    pub kind: &'static str,
    pub slots: &'static [Slot],
    /// Older generations, newest first
    pub legacy: &'static [LegacyFormat],
}

impl IdentityScheme {
    /// Current-generation format, e.g. `<service>::<instance>[::<server_name>]::<name>`
    pub fn format(&self) -> String {
        let mut out = String::from("<service>::<instance>");
        for slot in self.slots {
            if slot.is_optional() {
                out.push_str(&format!("[::<{}>]", slot.name));
            } else {
                out.push_str(&format!("::<{}>", slot.name));
            }
        }
        out
    }

    /// Whether a required discriminator of `key` is still unknown
    pub fn is_partial(&self, key: &ResourceKey) -> bool {
        self.slots
            .iter()
            .enumerate()
            .any(|(i, slot)| !slot.is_optional() && key.discriminator(i).is_empty())
    }

    /// Encode `key` in the current generation.
    ///
    /// Optional discriminators are all-or-none: omitted together when every
    /// one of them is empty.
    pub fn encode(&self, key: &ResourceKey) -> Result<String> {
        self.validate(key)?;

        let with_optional = self
            .slots
            .iter()
            .zip(&key.discriminators)
            .any(|(slot, value)| slot.is_optional() && !value.is_empty());

        let mut parts = vec![key.service_name.as_str(), key.instance_name.as_str()];
        for (slot, value) in self.slots.iter().zip(&key.discriminators) {
            if slot.is_optional() && !with_optional {
                continue;
            }
            parts.push(value);
        }
        Ok(parts.join(DELIMITER))
    }

    /// Decode an identifier of any known generation.
    pub fn decode(&self, id: &str) -> Result<Decoded> {
        if let Some(key) = self.decode_current(id) {
            return Ok(Decoded {
                key,
                generation: Generation::Current,
            });
        }

        for legacy in self.legacy {
            if let Some(key) = (legacy.parse)(id).and_then(|key| self.normalize(key)) {
                log::debug!("{} identifier {id:?} has legacy shape {}", self.kind, legacy.shape);
                return Ok(Decoded {
                    key,
                    generation: Generation::Legacy(legacy.shape),
                });
            }
        }

        Err(Error::MalformedIdentifier {
            kind: self.kind,
            id: id.to_string(),
            expected: self.format(),
        })
    }

    /// Whether a remote object with `remote` discriminators is the one `key` names.
    ///
    /// With `loose`, every empty value in `key` matches anything.
    pub fn matches(&self, key: &ResourceKey, remote: &[String], loose: bool) -> bool {
        self.slots.iter().enumerate().all(|(i, slot)| {
            let want = key.discriminator(i);
            let have = remote.get(i).map_or("", String::as_str);
            if want.is_empty() && (loose || slot.presence == Presence::Wildcard) {
                return true;
            }
            want == have
        })
    }

    fn validate(&self, key: &ResourceKey) -> Result<()> {
        if key.service_name.is_empty() {
            return Err(Error::invalid_key(self.kind, "service name is empty"));
        }
        if key.instance_name.is_empty() {
            return Err(Error::invalid_key(self.kind, "instance name is empty"));
        }
        if key.discriminators.len() != self.slots.len() {
            return Err(Error::invalid_key(
                self.kind,
                format!(
                    "expected {} discriminators, got {}",
                    self.slots.len(),
                    key.discriminators.len()
                ),
            ));
        }

        let fields = [
            ("service name", key.service_name.as_str()),
            ("instance name", key.instance_name.as_str()),
        ]
        .into_iter()
        .chain(
            self.slots
                .iter()
                .zip(&key.discriminators)
                .map(|(slot, value)| (slot.name, value.as_str())),
        );
        for (name, value) in fields {
            if collides(value) {
                return Err(Error::invalid_key(
                    self.kind,
                    format!("{name} {value:?} contains the reserved separator {DELIMITER:?}"),
                ));
            }
        }

        for (slot, value) in self.slots.iter().zip(&key.discriminators) {
            if value.is_empty() {
                if !slot.is_optional() {
                    return Err(Error::invalid_key(self.kind, format!("{} is empty", slot.name)));
                }
            } else if !slot.accepts(value) {
                return Err(Error::invalid_key(
                    self.kind,
                    format!("{} {value:?} is not an integer", slot.name),
                ));
            }
        }
        Ok(())
    }

    fn decode_current(&self, id: &str) -> Option<ResourceKey> {
        let parts: Vec<&str> = id.split(DELIMITER).collect();
        let optional = self.slots.iter().filter(|s| s.is_optional()).count();
        let full = 2 + self.slots.len();

        let values: Vec<String> = if parts.len() == full {
            parts[2..].iter().map(ToString::to_string).collect()
        } else if optional > 0 && parts.len() == full - optional {
            let mut given = parts[2..].iter();
            self.slots
                .iter()
                .map(|slot| {
                    if slot.is_optional() {
                        String::new()
                    } else {
                        given.next().map(ToString::to_string).unwrap_or_default()
                    }
                })
                .collect()
        } else {
            return None;
        };

        let key = ResourceKey {
            service_name: parts[0].to_string(),
            instance_name: parts[1].to_string(),
            discriminators: values,
        };
        if self.is_partial(&key) {
            return None;
        }
        self.normalize(key)
    }

    /// Pad missing discriminators and check the values a generation carried.
    fn normalize(&self, mut key: ResourceKey) -> Option<ResourceKey> {
        if key.service_name.is_empty()
            || key.instance_name.is_empty()
            || key.discriminators.len() > self.slots.len()
        {
            return None;
        }
        key.discriminators.resize(self.slots.len(), String::new());

        let valid = self
            .slots
            .iter()
            .zip(&key.discriminators)
            .all(|(slot, value)| value.is_empty() || slot.accepts(value));
        valid.then_some(key)
    }
}

/// A field value that would make the current generation ambiguous.
fn collides(value: &str) -> bool {
    value.contains(DELIMITER) || value.starts_with(':') || value.ends_with(':')
}

/// Split `id` on every `sep`, requiring exactly `n` non-empty parts.
pub fn split_exact<'a>(id: &'a str, sep: &str, n: usize) -> Option<Vec<&'a str>> {
    let parts: Vec<&str> = id.split(sep).collect();
    (parts.len() == n && parts.iter().all(|p| !p.is_empty())).then_some(parts)
}

/// Split `id` into exactly `n` non-empty parts; the last one keeps any further `sep`.
pub fn split_bounded<'a>(id: &'a str, sep: &str, n: usize) -> Option<Vec<&'a str>> {
    let parts: Vec<&str> = id.splitn(n, sep).collect();
    (parts.len() == n && parts.iter().all(|p| !p.is_empty())).then_some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_slash_pair(id: &str) -> Option<ResourceKey> {
        let parts = split_exact(id, "/", 2)?;
        Some(ResourceKey::new(parts[0], parts[1]))
    }

    fn legacy_slash_bounded(id: &str) -> Option<ResourceKey> {
        let parts = split_bounded(id, "/", 3)?;
        Some(ResourceKey::new(parts[0], parts[1]).with(parts[2]))
    }

    fn legacy_host_port(id: &str) -> Option<ResourceKey> {
        let (head, target) = id.split_once(' ')?;
        let parts = split_exact(head, "/", 2)?;
        let (host, port) = target.rsplit_once(':')?;
        Some(ResourceKey::new(parts[0], parts[1]).with(host).with(port))
    }

    const PATH: IdentityScheme = IdentityScheme {
        kind: "route",
        slots: &[Slot::required("path")],
        legacy: &[LegacyFormat {
            shape: "<service>/<instance>",
            parse: legacy_slash_pair,
        }],
    };

    const SCOPED: IdentityScheme = IdentityScheme {
        kind: "block",
        slots: &[Slot::optional("server_name"), Slot::required("name")],
        legacy: &[LegacyFormat {
            shape: "<service>/<instance>",
            parse: legacy_slash_pair,
        }],
    };

    const NAMED_FILE: IdentityScheme = IdentityScheme {
        kind: "file",
        slots: &[Slot::required("name")],
        legacy: &[LegacyFormat {
            shape: "<service>/<instance>/<name>",
            parse: legacy_slash_bounded,
        }],
    };

    const ENDPOINT: IdentityScheme = IdentityScheme {
        kind: "acl",
        slots: &[Slot::required("host"), Slot::required("port").integer()],
        legacy: &[LegacyFormat {
            shape: "<service>/<instance> <host>:<port>",
            parse: legacy_host_port,
        }],
    };

    const ISSUER: IdentityScheme = IdentityScheme {
        kind: "cert_manager",
        slots: &[Slot::required("issuer"), Slot::wildcard("certificate_name")],
        legacy: &[],
    };

    const WHOLE_INSTANCE: IdentityScheme = IdentityScheme {
        kind: "autoscale",
        slots: &[],
        legacy: &[],
    };

    #[test]
    fn test_path_with_slashes_round_trips() {
        let key = ResourceKey::new("rpaasv2-be", "my-rpaas").with("/a/b");
        let id = PATH.encode(&key).unwrap();
        assert_eq!(id, "rpaasv2-be::my-rpaas::/a/b");

        let decoded = PATH.decode(&id).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.generation, Generation::Current);
    }

    #[test]
    fn test_legacy_pair_decodes_to_partial_key() {
        let decoded = PATH.decode("rpaasv2-be/my-rpaas").unwrap();
        assert!(decoded.is_legacy());
        assert_eq!(decoded.key.service_name, "rpaasv2-be");
        assert_eq!(decoded.key.instance_name, "my-rpaas");
        assert_eq!(decoded.key.discriminators, vec![String::new()]);
        assert!(PATH.is_partial(&decoded.key));

        // a partial key cannot be persisted until it is resolved
        assert!(matches!(PATH.encode(&decoded.key), Err(Error::InvalidKey { .. })));
    }

    #[test]
    fn test_optional_slot_is_all_or_none() {
        let bare = ResourceKey::new("svc", "inst").with("").with("http");
        assert_eq!(SCOPED.encode(&bare).unwrap(), "svc::inst::http");
        assert_eq!(SCOPED.decode("svc::inst::http").unwrap().key, bare);

        let scoped = ResourceKey::new("svc", "inst").with("example.org").with("server");
        assert_eq!(SCOPED.encode(&scoped).unwrap(), "svc::inst::example.org::server");
        assert_eq!(SCOPED.decode("svc::inst::example.org::server").unwrap().key, scoped);
    }

    #[test]
    fn test_bounded_split_keeps_slashes_in_last_field() {
        let decoded = NAMED_FILE.decode("svc/inst/conf/nginx.conf").unwrap();
        assert!(decoded.is_legacy());
        assert_eq!(decoded.key, ResourceKey::new("svc", "inst").with("conf/nginx.conf"));
    }

    #[test]
    fn test_legacy_redecodes_to_same_key_after_migration() {
        let legacy = "rpaasv2-be/my-rpaas 10.0.0.1:8080";
        let decoded = ENDPOINT.decode(legacy).unwrap();
        let migrated = ENDPOINT.encode(&decoded.key).unwrap();

        assert_ne!(migrated, legacy);
        assert_eq!(migrated, "rpaasv2-be::my-rpaas::10.0.0.1::8080");
        assert_eq!(ENDPOINT.decode(&migrated).unwrap().key, decoded.key);
    }

    #[test]
    fn test_integer_slot_rejects_text() {
        let err = ENDPOINT.decode("svc::inst::host::http").unwrap_err();
        assert!(matches!(err, Error::MalformedIdentifier { .. }));

        let legacy = ENDPOINT.decode("svc/inst host:abc");
        assert!(legacy.is_err());

        let key = ResourceKey::new("svc", "inst").with("host").with("eighty");
        assert!(matches!(ENDPOINT.encode(&key), Err(Error::InvalidKey { .. })));
    }

    #[test]
    fn test_encode_rejects_reserved_separator() {
        for path in ["/a::b", "/a:", ":x"] {
            let key = ResourceKey::new("svc", "inst").with(path);
            let err = PATH.encode(&key).unwrap_err();
            assert!(err.to_string().contains("reserved separator"), "{path}: {err}");
        }
        // a single colon in the middle is fine
        let key = ResourceKey::new("svc", "inst").with("/a:b");
        assert_eq!(PATH.decode(&PATH.encode(&key).unwrap()).unwrap().key, key);
    }

    #[test]
    fn test_encode_rejects_empty_identity() {
        let key = ResourceKey::new("", "inst").with("/");
        assert!(PATH.encode(&key).unwrap_err().to_string().contains("service name is empty"));

        let key = ResourceKey::new("svc", "inst");
        assert!(PATH.encode(&key).unwrap_err().to_string().contains("expected 1 discriminators"));
    }

    #[test]
    fn test_malformed_names_expected_format() {
        let err = SCOPED.decode("just-one-field").unwrap_err();
        match err {
            Error::MalformedIdentifier { kind, id, expected } => {
                assert_eq!(kind, "block");
                assert_eq!(id, "just-one-field");
                assert_eq!(expected, "<service>::<instance>[::<server_name>]::<name>");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_current_generation_never_misread_as_legacy() {
        // "::" splits before "/" is considered, so paths are never split
        let decoded = PATH.decode("svc::inst::/x/y").unwrap();
        assert_eq!(decoded.generation, Generation::Current);

        // an empty required slot is not the current generation
        assert!(PATH.decode("svc::inst::").is_err());
    }

    #[test]
    fn test_wildcard_slot_matching() {
        let any_name = ResourceKey::new("svc", "inst").with("letsencrypt").with("");
        assert_eq!(ISSUER.encode(&any_name).unwrap(), "svc::inst::letsencrypt");
        assert!(!ISSUER.is_partial(&any_name));

        let remote = vec!["letsencrypt".to_string(), "my-cert".to_string()];
        assert!(ISSUER.matches(&any_name, &remote, false));

        let exact = ResourceKey::new("svc", "inst").with("letsencrypt").with("other");
        assert!(!ISSUER.matches(&exact, &remote, false));
    }

    #[test]
    fn test_optional_slot_matches_only_empty() {
        let key = ResourceKey::new("svc", "inst").with("").with("server");
        let scoped = vec!["example.org".to_string(), "server".to_string()];
        assert!(!SCOPED.matches(&key, &scoped, false));
        assert!(SCOPED.matches(&key, &scoped, true));
    }

    #[test]
    fn test_no_discriminators() {
        let key = ResourceKey::new("svc", "inst");
        assert_eq!(WHOLE_INSTANCE.encode(&key).unwrap(), "svc::inst");
        assert_eq!(WHOLE_INSTANCE.decode("svc::inst").unwrap().key, key);
        assert_eq!(WHOLE_INSTANCE.format(), "<service>::<instance>");
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_exact("a/b", "/", 2), Some(vec!["a", "b"]));
        assert_eq!(split_exact("a/b/c", "/", 2), None);
        assert_eq!(split_exact("a/", "/", 2), None);
        assert_eq!(split_bounded("a/b/c/d", "/", 3), Some(vec!["a", "b", "c/d"]));
        assert_eq!(split_bounded("a/b", "/", 3), None);
    }

    #[test]
    fn test_key_display() {
        let key = ResourceKey::new("svc", "inst").with("").with("server");
        assert_eq!(key.to_string(), "svc/inst [server]");
        assert_eq!(ResourceKey::new("svc", "inst").to_string(), "svc/inst");
    }
}
