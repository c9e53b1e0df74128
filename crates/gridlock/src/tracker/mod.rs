//! Mutation tracking for host documents.
//!
//! `TrackedContext` decorates a `HostBridge`. The snippet only ever sees wrapper handles issued
//! by the tracker; every property read, write and call on one is forwarded to the underlying
//! host handle, and the handles in the result are wrapped in turn. The wrapper's `Shape`
//! (worksheet, range, format, ...) decides which writes and calls are recorded as mutations.
//!
//! Worksheets are identified by stable ids from a `StableIdMapper`. A newly seen worksheet gets
//! an identity cell holding the unresolved sentinel and queues `load("id")` on the host; the
//! next `context.sync()` through the wrapper reads the volatile ids and resolves all queued
//! cells in one batch. Every mutation record points at its worksheet's cell, so records made
//! before the flush pick up the resolved id.

mod shape;

use ahash::AHashMap;

pub use shape::Shape;
use shape::Effect;

use crate::{
    host::{HostBridge, HostError, ProxyId},
    ledger::{DirtyRange, UNRESOLVED_SCOPE, WILDCARD, parse_region},
    object::Object,
    sheet_ids::{SettingsStore, StableIdMapper},
};

/// Index of an identity cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ScopeSlot(usize);

/// A recorded mutation. The scope is resolved only when the ledger is read.
#[derive(Debug, Clone)]
struct MutationRecord {
    scope: Option<ScopeSlot>,
    region: String,
}

/// The range a format or format part belongs to.
#[derive(Debug, Clone)]
struct Anchor {
    region: ProxyId,
    /// Address given to `getRange`, when the range was obtained that way.
    address: Option<String>,
}

#[derive(Debug, Clone)]
struct Wrapper {
    inner: ProxyId,
    shape: Shape,
    scope: Option<ScopeSlot>,
    anchor: Option<Anchor>,
}

/// A worksheet waiting for its volatile id to be read after a flush.
#[derive(Debug, Clone, Copy)]
struct PendingScope {
    slot: ScopeSlot,
    inner: ProxyId,
}

/// A `HostBridge` that records which regions a snippet mutates.
pub struct TrackedContext<'a, S: SettingsStore> {
    host: &'a mut dyn HostBridge,
    mapper: &'a mut StableIdMapper<S>,
    wrappers: Vec<Wrapper>,
    /// Underlying handle → wrapper handle; one wrapper per host handle.
    by_inner: AHashMap<ProxyId, ProxyId>,
    /// Identity arena: stable scope id, or `UNRESOLVED_SCOPE`.
    cells: Vec<i64>,
    pending: Vec<PendingScope>,
    records: Vec<MutationRecord>,
    root: ProxyId,
}

impl<'a, S: SettingsStore> TrackedContext<'a, S> {
    /// Wraps the request context `root` of `host`.
    pub fn new(host: &'a mut dyn HostBridge, mapper: &'a mut StableIdMapper<S>, root: ProxyId) -> Self {
        let mut tracked = Self {
            host,
            mapper,
            wrappers: Vec::new(),
            by_inner: AHashMap::new(),
            cells: Vec::new(),
            pending: Vec::new(),
            records: Vec::new(),
            root,
        };
        tracked.root = tracked.issue(Wrapper {
            inner: root,
            shape: Shape::Context,
            scope: None,
            anchor: None,
        });
        tracked
    }

    /// Wrapper handle of the request context, the value to inject into the snippet.
    #[must_use]
    pub fn root(&self) -> ProxyId {
        self.root
    }

    /// Mutations recorded so far, one entry per mutating operation, in order.
    ///
    /// Worksheets whose id has not been resolved by a flush report scope id `-1`.
    #[must_use]
    pub fn dirty_ranges(&self) -> Vec<DirtyRange> {
        self.records
            .iter()
            .map(|record| {
                let scope_id = record.scope.map_or(UNRESOLVED_SCOPE, |slot| self.cells[slot.0]);
                DirtyRange::new(scope_id, record.region.clone())
            })
            .collect()
    }

    /// Shape of a wrapper handle, if it was issued by this tracker.
    #[must_use]
    pub fn shape(&self, proxy: ProxyId) -> Option<Shape> {
        self.wrapper(proxy).ok().map(|w| w.shape)
    }

    fn wrapper(&self, proxy: ProxyId) -> Result<&Wrapper, HostError> {
        self.wrappers
            .get(proxy.raw() as usize)
            .ok_or(HostError::InvalidHandle(proxy.raw()))
    }

    fn issue(&mut self, wrapper: Wrapper) -> ProxyId {
        let id = ProxyId::new(self.wrappers.len() as u32);
        self.by_inner.insert(wrapper.inner, id);
        self.wrappers.push(wrapper);
        id
    }

    /// Returns the wrapper of `inner`, creating one with `shape` on first sight.
    fn wrap_handle(&mut self, inner: ProxyId, shape: Shape, parent: &Wrapper, address: Option<&str>) -> ProxyId {
        if let Some(existing) = self.by_inner.get(&inner) {
            return *existing;
        }
        let scope = if shape == Shape::Scope {
            Some(self.discover_scope(inner))
        } else {
            parent.scope
        };
        let anchor = match shape {
            Shape::Region => Some(Anchor {
                region: inner,
                address: address.map(str::to_owned),
            }),
            Shape::Format | Shape::FormatPart => parent.anchor.clone(),
            _ => None,
        };
        self.issue(Wrapper {
            inner,
            shape,
            scope,
            anchor,
        })
    }

    /// Wraps every host handle inside a result.
    fn wrap(&mut self, value: Object, shape: Shape, parent: &Wrapper, address: Option<&str>) -> Object {
        match value {
            Object::Proxy(inner) => Object::Proxy(self.wrap_handle(inner, shape, parent, address)),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.wrap(item, shape, parent, None))
                    .collect(),
            ),
            Object::Map(entries) => Object::Map(
                entries
                    .into_iter()
                    .map(|(key, item)| (key, self.wrap(item, shape, parent, None)))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Replaces wrapper handles in an argument with the host handles they stand for.
    fn unwrap_handles(&self, value: Object) -> Result<Object, HostError> {
        Ok(match value {
            Object::Proxy(proxy) => Object::Proxy(self.wrapper(proxy)?.inner),
            Object::Array(items) => Object::Array(items.into_iter().map(|v| self.unwrap_handles(v)).collect::<Result<_, _>>()?),
            Object::Map(entries) => Object::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.unwrap_handles(v)?)))
                    .collect::<Result<_, HostError>>()?,
            ),
            other => other,
        })
    }

    /// Allocates an identity cell for a newly seen worksheet and queues its id load.
    fn discover_scope(&mut self, inner: ProxyId) -> ScopeSlot {
        let slot = ScopeSlot(self.cells.len());
        self.cells.push(UNRESOLVED_SCOPE);
        self.queue_id_load(slot, inner);
        tracing::debug!(handle = inner.raw(), slot = slot.0, "tracking worksheet");
        slot
    }

    fn queue_id_load(&mut self, slot: ScopeSlot, inner: ProxyId) {
        if let Err(err) = self.host.call(inner, "load", vec![Object::from("id")]) {
            tracing::debug!(handle = inner.raw(), %err, "could not queue worksheet id load");
        }
        self.pending.push(PendingScope { slot, inner });
    }

    fn record(&mut self, wrapper: &Wrapper, effect: Effect) {
        let region = match effect {
            Effect::Wildcard => WILDCARD.to_owned(),
            Effect::Region => self.address_of(wrapper),
        };
        tracing::debug!(shape = %wrapper.shape, region, "recorded mutation");
        self.records.push(MutationRecord {
            scope: wrapper.scope,
            region,
        });
    }

    /// Address of the range behind `wrapper`, without a sheet prefix; the wildcard if unknown.
    fn address_of(&self, wrapper: &Wrapper) -> String {
        let Some(anchor) = &wrapper.anchor else {
            return WILDCARD.to_owned();
        };
        if let Some(address) = &anchor.address {
            return address.clone();
        }
        match self.host.peek(anchor.region, "address") {
            Some(Object::String(address)) => local_address(&address).unwrap_or_else(|| WILDCARD.to_owned()),
            _ => WILDCARD.to_owned(),
        }
    }

    /// Flushes the host, then resolves every queued worksheet identity in one batch.
    fn sync(&mut self, inner: ProxyId, args: Vec<Object>) -> Result<Object, HostError> {
        let result = self.host.call(inner, "sync", args)?;
        self.resolve_pending();
        Ok(result)
    }

    fn resolve_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let mut ready: Vec<(PendingScope, String)> = Vec::new();
        for scope in pending {
            if self.cells[scope.slot.0] != UNRESOLVED_SCOPE {
                continue;
            }
            match self.host.get(scope.inner, "id") {
                Ok(Object::String(guid)) => ready.push((scope, guid)),
                Ok(_) => {
                    tracing::debug!(handle = scope.inner.raw(), "worksheet has no id; retrying after next sync");
                    self.queue_id_load(scope.slot, scope.inner);
                }
                Err(err) => {
                    tracing::debug!(handle = scope.inner.raw(), %err, "worksheet id unavailable; retrying after next sync");
                    self.queue_id_load(scope.slot, scope.inner);
                }
            }
        }
        if ready.is_empty() {
            return;
        }
        match self.mapper.batch_resolve(ready.iter().map(|(_, guid)| guid.as_str())) {
            Ok(ids) => {
                for (scope, guid) in &ready {
                    if let Some(id) = ids.get(guid) {
                        self.cells[scope.slot.0] = i64::from(*id);
                    }
                }
                tracing::debug!(resolved = ready.len(), "resolved worksheet ids");
            }
            Err(err) => {
                tracing::warn!(%err, "failed to persist worksheet ids; scopes stay unresolved");
                self.pending.extend(ready.into_iter().map(|(scope, _)| scope));
            }
        }
    }
}

impl<S: SettingsStore> HostBridge for TrackedContext<'_, S> {
    fn get(&mut self, proxy: ProxyId, property: &str) -> Result<Object, HostError> {
        let wrapper = self.wrapper(proxy)?.clone();
        let value = self.host.get(wrapper.inner, property)?;
        Ok(self.wrap(value, wrapper.shape.property_child(property), &wrapper, None))
    }

    fn set(&mut self, proxy: ProxyId, property: &str, value: Object) -> Result<(), HostError> {
        let wrapper = self.wrapper(proxy)?.clone();
        let value = self.unwrap_handles(value)?;
        if let Some(effect) = wrapper.shape.set_effect(property) {
            self.record(&wrapper, effect);
        }
        self.host.set(wrapper.inner, property, value)
    }

    fn call(&mut self, proxy: ProxyId, method: &str, args: Vec<Object>) -> Result<Object, HostError> {
        let wrapper = self.wrapper(proxy)?.clone();
        let args = args.into_iter().map(|arg| self.unwrap_handles(arg)).collect::<Result<Vec<_>, _>>()?;
        if wrapper.shape == Shape::Context && method == "sync" {
            let result = self.sync(wrapper.inner, args)?;
            return Ok(self.wrap(result, Shape::Passthrough, &wrapper, None));
        }
        if let Some(effect) = wrapper.shape.call_effect(method) {
            self.record(&wrapper, effect);
        }
        // `getRange("A1")` is the one derivation whose address is known up front
        let address = match (wrapper.shape, method, args.first()) {
            (Shape::Scope, "getRange", Some(Object::String(address))) => local_address(address),
            _ => None,
        };
        let result = self.host.call(wrapper.inner, method, args)?;
        Ok(self.wrap(result, wrapper.shape.call_child(method), &wrapper, address.as_deref()))
    }

    fn has_method(&self, proxy: ProxyId, name: &str) -> bool {
        self.wrapper(proxy).is_ok_and(|w| self.host.has_method(w.inner, name))
    }

    fn peek(&self, proxy: ProxyId, property: &str) -> Option<Object> {
        let wrapper = self.wrapper(proxy).ok()?;
        match self.host.peek(wrapper.inner, property)? {
            // handles cannot be wrapped through a shared borrow
            Object::Proxy(_) => None,
            value => Some(value),
        }
    }

    fn type_name(&self, proxy: ProxyId) -> String {
        self.wrapper(proxy)
            .map_or_else(|_| "Object".to_owned(), |w| self.host.type_name(w.inner))
    }
}

/// `Sheet1!$B$2:a1` → `A1:B2`. `None` for an empty address.
///
/// Cell and cell-pair addresses are put in canonical top-left to bottom-right form; anything else
/// (whole columns, names) is kept as written.
fn local_address(address: &str) -> Option<String> {
    let local = address.rsplit('!').next().unwrap_or(address).trim();
    let local: String = local.chars().filter(|c| *c != '$').collect::<String>().to_ascii_uppercase();
    if local.is_empty() {
        return None;
    }
    Some(parse_region(&local).map_or(local, |bounds| bounds.to_a1()))
}
