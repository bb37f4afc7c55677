//! Type converter factory.
//!
//! Converters bridge a linked target's native shape to the shape a call site
//! requires. Resolution order for `convert(source, target)`:
//!
//! ```text
//! target ⊒ source ──────────────▶ identity (linkers never consulted)
//! cache[(source, target)] live ──▶ cached converter
//! conversion linkers, in order ──▶ first producer, guard-composed
//! Int → Float ───────────────────▶ widening
//! null → reference ──────────────▶ identity
//! target ⊑ source ───────────────▶ checked cast
//! otherwise ─────────────────────▶ NoViableConversion
//! ```
//!
//! # Reclamation
//!
//! The cache keys on type ids and holds weak handles to both types and to the
//! converter. It never keeps a type, a defining scope or a converter alive.
//! Every cached type is watched through a [`ReclaimQueue`]; the queue is
//! drained on every lookup and insert, under the cache's own mutex. Linkers
//! are never called with that mutex held.

use crate::error::{LinkError, LinkResult};
use crate::invocation::{Invocation, WeakInvocation};
use crate::linker::LinkerRef;
use crate::method_type::MethodType;
use crate::stats::LinkerStats;
use dynlink_runtime::{ReclaimQueue, Reclaimed, RuntimeError, RuntimeType, TypeId, TypeKind, TypeRef, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Minimum cache size before dead entries are swept on insert.
const SWEEP_THRESHOLD: usize = 64;

// =============================================================================
// Cache
// =============================================================================

struct CacheEntry {
    source: Weak<RuntimeType>,
    target: Weak<RuntimeType>,
    converter: WeakInvocation,
}

impl CacheEntry {
    fn is_live(&self) -> bool {
        self.source.strong_count() > 0 && self.target.strong_count() > 0 && self.converter.is_live()
    }
}

struct ConverterCache {
    entries: FxHashMap<(TypeId, TypeId), CacheEntry>,
    sweep_at: usize,
}

impl ConverterCache {
    /// Apply pending reclaim notifications. Returns the number of evictions.
    fn apply(&mut self, reclaimed: Vec<Reclaimed>) -> usize {
        let before = self.entries.len();
        for record in reclaimed {
            match record {
                Reclaimed::Type(id) => self.entries.retain(|(s, t), _| *s != id && *t != id),
                Reclaimed::Scope(_) => self.entries.retain(|_, e| e.is_live()),
            }
        }
        before - self.entries.len()
    }

    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live());
        self.sweep_at = (self.entries.len() * 2).max(SWEEP_THRESHOLD);
        before - self.entries.len()
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Produces and caches type converters.
pub struct TypeConverterFactory {
    linkers: Vec<LinkerRef>,
    cache: Mutex<ConverterCache>,
    reclaim: Arc<ReclaimQueue>,
    stats: Arc<LinkerStats>,
}

impl TypeConverterFactory {
    /// Create a factory over the given conversion linkers.
    pub fn new(linkers: Vec<LinkerRef>, stats: Arc<LinkerStats>) -> Self {
        Self {
            linkers,
            cache: Mutex::new(ConverterCache {
                entries: FxHashMap::default(),
                sweep_at: SWEEP_THRESHOLD,
            }),
            reclaim: ReclaimQueue::new(),
            stats,
        }
    }

    /// A `(source)target` converter.
    pub fn convert(&self, source: &TypeRef, target: &TypeRef) -> LinkResult<Invocation> {
        if target.is_assignable_from(source) {
            trace!(%source, %target, "identity conversion");
            return Ok(identity(source, target));
        }

        let key = (source.id(), target.id());
        if let Some(converter) = self.lookup(key) {
            self.stats.record_converter_lookup(true);
            trace!(%source, %target, "converter cache hit");
            return Ok(converter);
        }
        self.stats.record_converter_lookup(false);

        let converter = self.create(source, target)?;
        self.insert(key, source, target, &converter);
        debug!(%source, %target, converter = converter.label(), "created type converter");
        Ok(converter)
    }

    /// Check if values of `source` can be converted to `target`.
    pub fn can_convert(&self, source: &TypeRef, target: &TypeRef) -> bool {
        self.convert(source, target).is_ok()
    }

    /// Adapt `invocation` to `method_type` by converting each argument from
    /// the site's parameter type to the invocation's, and the result from the
    /// invocation's return type to the site's.
    pub fn as_type(&self, invocation: &Invocation, method_type: &MethodType) -> LinkResult<Invocation> {
        let native = invocation.method_type();
        if native == method_type {
            return Ok(invocation.clone());
        }
        if native.parameter_count() != method_type.parameter_count() {
            return Err(LinkError::TypeMismatch(format!(
                "{} takes {} arguments, call site passes {}",
                invocation.label(),
                native.parameter_count(),
                method_type.parameter_count()
            )));
        }

        let mut adapted = invocation.clone();
        for (index, (site, param)) in method_type
            .parameters()
            .iter()
            .zip(native.parameters())
            .enumerate()
        {
            if !param.is_assignable_from(site) {
                adapted = adapted.filter_argument(index, &self.convert(site, param)?)?;
            }
        }
        let (ret, wanted) = (native.return_type(), method_type.return_type());
        if !wanted.is_assignable_from(ret) {
            adapted = adapted.filter_return(&self.convert(ret, wanted)?)?;
        }
        adapted.with_type(method_type.clone())
    }

    /// Number of cache entries, live or not yet drained.
    pub fn cached_converter_count(&self) -> usize {
        let mut cache = self.cache.lock();
        self.drain(&mut cache);
        cache.entries.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn drain(&self, cache: &mut ConverterCache) {
        let reclaimed = self.reclaim.drain();
        if reclaimed.is_empty() {
            return;
        }
        let evicted = cache.apply(reclaimed);
        if evicted > 0 {
            self.stats.record_converter_evictions(evicted);
            trace!(evicted, "evicted reclaimed converters");
        }
    }

    fn lookup(&self, key: (TypeId, TypeId)) -> Option<Invocation> {
        let mut cache = self.cache.lock();
        self.drain(&mut cache);
        let converter = cache.entries.get(&key)?.converter.upgrade();
        if converter.is_none() {
            cache.entries.remove(&key);
            self.stats.record_converter_evictions(1);
        }
        converter
    }

    fn insert(&self, key: (TypeId, TypeId), source: &TypeRef, target: &TypeRef, converter: &Invocation) {
        for ty in [source, target] {
            ty.watch(&self.reclaim);
            if let Some(scope) = ty.scope() {
                scope.watch(&self.reclaim);
            }
        }

        let mut cache = self.cache.lock();
        self.drain(&mut cache);
        if cache.entries.len() >= cache.sweep_at {
            let swept = cache.sweep();
            self.stats.record_converter_evictions(swept);
        }
        cache.entries.insert(
            key,
            CacheEntry {
                source: Arc::downgrade(source),
                target: Arc::downgrade(target),
                converter: converter.downgrade(),
            },
        );
    }

    /// Build a converter. Runs without the cache lock.
    fn create(&self, source: &TypeRef, target: &TypeRef) -> LinkResult<Invocation> {
        let ty = MethodType::new(target.clone(), [source.clone()]);

        for linker in &self.linkers {
            if let Some(gi) = linker.convert(source, target)? {
                trace!(linker = linker.name(), %source, %target, "linker produced converter");
                let failure = Invocation::throwing(
                    ty.clone(),
                    RuntimeError::type_mismatch(target.name(), source.name()),
                );
                let converter = self.as_type(gi.invocation(), &ty)?;
                return gi.replace_invocation(converter).compose(&failure);
            }
        }

        if source.id() == TypeId::INT && target.id() == TypeId::FLOAT {
            return Ok(Invocation::from_runtime("int-to-float", ty, |args| match &args[0] {
                Value::Int(i) => Ok(Value::Float(*i as f64)),
                other => Err(RuntimeError::type_mismatch("Int", other.type_name())),
            }));
        }

        if source.kind() == TypeKind::Null && target.kind().is_reference() {
            return Ok(identity(source, target));
        }

        if source.is_assignable_from(target) {
            let (id, name) = (target.id(), target.name().to_string());
            let nullable = target.kind().is_reference();
            return Ok(Invocation::from_runtime("checked-cast", ty, move |args| {
                let value = &args[0];
                if value.conforms_to(id) || (nullable && value.is_null()) {
                    Ok(value.clone())
                } else {
                    Err(RuntimeError::type_mismatch(name.as_str(), value.type_name()))
                }
            }));
        }

        Err(LinkError::NoViableConversion {
            from: source.name().to_string(),
            to: target.name().to_string(),
        })
    }
}

fn identity(source: &TypeRef, target: &TypeRef) -> Invocation {
    Invocation::new(
        "identity",
        MethodType::new(target.clone(), [source.clone()]),
        |args| Ok(args[0].clone()),
    )
}

impl fmt::Debug for TypeConverterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverterFactory")
            .field("linkers", &self.linkers.len())
            .field("cached", &self.cache.lock().entries.len())
            .finish()
    }
}
