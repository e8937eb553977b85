//! Drift resolution - locate the remote object a key names

use crate::error::{Error, Result};
use crate::identity::{IdentityScheme, Presence, ResourceKey};

/// Result of resolving a key against a remote listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteMatch<R> {
    /// Exactly one object matched
    Found {
        /// Key with unknown discriminators filled from the object
        key: ResourceKey,
        remote: R,
        /// Whether any discriminator was filled in
        backfilled: bool,
    },
    /// Nothing matched; the object was deleted out of band
    Gone,
}

/// Fill unknown discriminators of `key` from a desired-state key.
///
/// Only empty slots are touched, and only for the same service/instance.
pub fn fill_from_hint(key: &mut ResourceKey, hint: &ResourceKey) {
    if key.service_name != hint.service_name || key.instance_name != hint.instance_name {
        return;
    }
    for (i, value) in key.discriminators.iter_mut().enumerate() {
        if value.is_empty() {
            let hinted = hint.discriminator(i);
            if !hinted.is_empty() {
                value.push_str(hinted);
            }
        }
    }
}

/// Match `key` against `candidates`.
///
/// A fully specified key matches by equality (wildcard slots left empty
/// match anything). A partial key matches the single candidate agreeing with
/// its known slots and takes the missing values from it; several candidates
/// make the key ambiguous, which the caller must never guess through.
pub fn resolve<R>(
    scheme: &IdentityScheme,
    key: &ResourceKey,
    candidates: Vec<R>,
    discriminators: impl Fn(&R) -> Vec<String>,
) -> Result<RemoteMatch<R>> {
    if !scheme.is_partial(key) {
        let found = candidates
            .into_iter()
            .find(|remote| scheme.matches(key, &discriminators(remote), false));
        return Ok(match found {
            Some(remote) => RemoteMatch::Found {
                key: key.clone(),
                remote,
                backfilled: false,
            },
            None => RemoteMatch::Gone,
        });
    }

    let mut matching: Vec<(R, Vec<String>)> = candidates
        .into_iter()
        .map(|remote| {
            let values = discriminators(&remote);
            (remote, values)
        })
        .filter(|(_, values)| scheme.matches(key, values, true))
        .collect();

    match matching.len() {
        0 => Ok(RemoteMatch::Gone),
        1 => {
            let (remote, values) = matching.remove(0);
            let mut resolved = key.clone();
            for (i, slot) in scheme.slots.iter().enumerate() {
                if resolved.discriminators[i].is_empty() && slot.presence != Presence::Wildcard {
                    resolved.discriminators[i] = values.get(i).cloned().unwrap_or_default();
                }
            }
            log::info!("Resolved legacy {} {key} to {resolved}", scheme.kind);
            Ok(RemoteMatch::Found {
                key: resolved,
                remote,
                backfilled: true,
            })
        }
        _ => Err(Error::AmbiguousResource {
            kind: scheme.kind,
            service: key.service_name.clone(),
            instance: key.instance_name.clone(),
            candidates: matching
                .iter()
                .map(|(_, values)| {
                    let candidate = ResourceKey {
                        discriminators: values.clone(),
                        ..key.clone()
                    };
                    scheme
                        .encode(&candidate)
                        .unwrap_or_else(|_| candidate.to_string())
                })
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Slot;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Block {
        server_name: String,
        name: String,
        content: String,
    }

    fn block(server_name: &str, name: &str) -> Block {
        Block {
            server_name: server_name.into(),
            name: name.into(),
            content: format!("# {name}"),
        }
    }

    fn values(b: &Block) -> Vec<String> {
        vec![b.server_name.clone(), b.name.clone()]
    }

    const BLOCKS: IdentityScheme = IdentityScheme {
        kind: "block",
        slots: &[Slot::optional("server_name"), Slot::required("name")],
        legacy: &[],
    };

    const CERT_MANAGER: IdentityScheme = IdentityScheme {
        kind: "cert_manager",
        slots: &[Slot::required("issuer"), Slot::wildcard("certificate_name")],
        legacy: &[],
    };

    fn partial() -> ResourceKey {
        ResourceKey::new("rpaasv2-be", "my-rpaas").with("").with("")
    }

    #[test]
    fn test_exact_match() {
        let key = ResourceKey::new("rpaasv2-be", "my-rpaas").with("").with("http");
        let listing = vec![block("", "server"), block("", "http"), block("a.org", "http")];

        match resolve(&BLOCKS, &key, listing, values).unwrap() {
            RemoteMatch::Found {
                key: found,
                remote,
                backfilled,
            } => {
                assert_eq!(found, key);
                assert_eq!(remote, block("", "http"));
                assert!(!backfilled);
            }
            RemoteMatch::Gone => panic!("expected a match"),
        }
    }

    #[test]
    fn test_exact_key_without_match_is_gone() {
        let key = ResourceKey::new("rpaasv2-be", "my-rpaas").with("").with("root");
        let listing = vec![block("", "server")];
        assert_eq!(resolve(&BLOCKS, &key, listing, values).unwrap(), RemoteMatch::Gone);
    }

    #[test]
    fn test_partial_key_backfills_single_candidate() {
        let listing = vec![block("", "server")];

        match resolve(&BLOCKS, &partial(), listing, values).unwrap() {
            RemoteMatch::Found { key, backfilled, .. } => {
                assert!(backfilled);
                assert_eq!(key.discriminators, vec![String::new(), "server".to_string()]);
                assert_eq!(BLOCKS.encode(&key).unwrap(), "rpaasv2-be::my-rpaas::server");
            }
            RemoteMatch::Gone => panic!("expected a match"),
        }
    }

    #[test]
    fn test_partial_key_with_many_candidates_is_ambiguous() {
        let listing = vec![block("", "server"), block("", "http")];

        let err = resolve(&BLOCKS, &partial(), listing, values).unwrap_err();
        match err {
            Error::AmbiguousResource { candidates, .. } => {
                assert_eq!(
                    candidates,
                    vec!["rpaasv2-be::my-rpaas::server", "rpaasv2-be::my-rpaas::http"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_partial_key_with_empty_listing_is_gone() {
        let listing: Vec<Block> = Vec::new();
        assert_eq!(resolve(&BLOCKS, &partial(), listing, values).unwrap(), RemoteMatch::Gone);
    }

    #[test]
    fn test_hint_narrows_partial_key() {
        let mut key = partial();
        let hint = ResourceKey::new("rpaasv2-be", "my-rpaas").with("").with("http");
        fill_from_hint(&mut key, &hint);
        assert_eq!(key, hint);

        let listing = vec![block("", "server"), block("", "http")];
        assert!(matches!(
            resolve(&BLOCKS, &key, listing, values).unwrap(),
            RemoteMatch::Found { .. }
        ));
    }

    #[test]
    fn test_hint_for_other_instance_is_ignored() {
        let mut key = partial();
        let hint = ResourceKey::new("rpaasv2-be", "other").with("").with("http");
        fill_from_hint(&mut key, &hint);
        assert_eq!(key, partial());
    }

    #[test]
    fn test_wildcard_is_not_backfilled() {
        #[derive(Debug)]
        struct Request {
            issuer: String,
            name: String,
        }
        let key = ResourceKey::new("svc", "inst").with("").with("");
        let listing = vec![Request {
            issuer: "letsencrypt".into(),
            name: "my-cert".into(),
        }];

        let found = resolve(&CERT_MANAGER, &key, listing, |r| {
            vec![r.issuer.clone(), r.name.clone()]
        })
        .unwrap();
        match found {
            RemoteMatch::Found { key, .. } => {
                assert_eq!(key.discriminators, vec!["letsencrypt".to_string(), String::new()]);
            }
            RemoteMatch::Gone => panic!("expected a match"),
        }
    }
}
