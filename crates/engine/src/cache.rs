//! TTL response cache.
//!
//! A response may be reused for up to its TTL as long as nothing the
//! function can see has changed. The orchestrator's side of the request is
//! fingerprinted with SHA-256 over the request minus its tag. Extra
//! resources only show up during negotiation, so an entry also keeps the
//! requirements the final call answered and what they resolved to; a hit
//! re-resolves them and is refused when any object changed.

use std::collections::BTreeMap;
use std::time::Instant;

use metrics::counter;
use rustc_hash::FxHashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use xfn_core::{Credentials, Document, Resource, RunFunctionRequest, RunFunctionResponse, State, XfnResult};

use crate::negotiate::Resolutions;
use crate::resolve::Resolver;

#[derive(Serialize)]
struct Inputs<'a> {
    observed: &'a State,
    desired: &'a State,
    input: &'a Option<Document>,
    context: &'a Option<Document>,
    credentials: &'a BTreeMap<String, Credentials>,
    extra_resources: &'a BTreeMap<String, Vec<Resource>>,
}

/// Hex SHA-256 over everything in `req` except its tag.
pub fn fingerprint(req: &RunFunctionRequest) -> XfnResult<String> {
    let bytes = serde_json::to_vec(&Inputs {
        observed: &req.observed,
        desired: &req.desired,
        input: &req.input,
        context: &req.context,
        credentials: &req.credentials,
        extra_resources: &req.extra_resources,
    })?;
    let mut h = Sha256::new();
    h.update(&bytes);
    Ok(hex::encode(h.finalize()))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    function: String,
    fingerprint: String,
}

#[derive(Debug, Clone)]
struct Entry {
    rsp: RunFunctionResponse,
    resolutions: Resolutions,
    expires: Instant,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: FxHashMap<Key, Entry>,
}

impl ResponseCache {
    pub fn new() -> Self { Self::default() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Whether a response may be cached at all: positive TTL, nothing
    /// pending, not FATAL.
    pub fn cacheable(rsp: &RunFunctionResponse) -> bool {
        !rsp.ttl().is_zero() && rsp.is_complete() && !rsp.is_fatal()
    }

    /// A live entry for `function` and `req`, re-stamped with `req`'s tag.
    /// Entries past their TTL, or whose extra resources no longer resolve to
    /// the same objects through `resolver`, are dropped and miss.
    pub fn get(
        &mut self,
        function: &str,
        req: &RunFunctionRequest,
        resolver: &dyn Resolver,
        now: Instant,
    ) -> Option<RunFunctionResponse> {
        let key = Key { function: function.to_string(), fingerprint: fingerprint(req).ok()? };
        let live = match self.entries.get(&key) {
            None => false,
            Some(e) if e.expires <= now => false,
            Some(e) if !e.resolutions.still_hold(resolver) => {
                debug!(function, tag = %req.tag(), "extra resources changed; dropping cached response");
                false
            }
            Some(_) => true,
        };
        let hit = if live {
            self.entries.get(&key).map(|e| {
                let mut rsp = e.rsp.clone();
                rsp.meta.tag = req.meta.tag.clone();
                rsp
            })
        } else {
            self.entries.remove(&key);
            None
        };
        if hit.is_some() {
            counter!("xfn_cache_hits_total", 1u64);
            debug!(function, tag = %req.tag(), "ttl cache hit");
        } else {
            counter!("xfn_cache_misses_total", 1u64);
        }
        hit
    }

    /// Remember `rsp` as the answer to `req`, negotiated with `resolutions`.
    /// Returns false when the response is not cacheable, or its TTL runs
    /// past what `Instant` can represent.
    pub fn insert(
        &mut self,
        function: &str,
        req: &RunFunctionRequest,
        rsp: &RunFunctionResponse,
        resolutions: Resolutions,
        now: Instant,
    ) -> bool {
        if !Self::cacheable(rsp) {
            return false;
        }
        let Some(expires) = now.checked_add(rsp.ttl()) else {
            warn!(function, ttl_secs = rsp.ttl().as_secs(), "ttl out of range; not caching");
            return false;
        };
        let Ok(fingerprint) = fingerprint(req) else { return false };
        let key = Key { function: function.to_string(), fingerprint };
        self.entries.insert(key, Entry { rsp: rsp.clone(), resolutions, expires });
        true
    }

    /// Drop expired entries.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires > now);
        before - self.entries.len()
    }
}
