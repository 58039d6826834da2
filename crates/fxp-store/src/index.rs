//! The EAVN triple index.
//!
//! The committed store is a set of logical `(e, a, v)` triples, each carrying
//! a reference-counted provenance map `node -> count`. Two producers may
//! assert the same triple under distinct nodes; removing one producer leaves
//! the fact in place until the last provenance is gone.
//!
//! Both axes are kept in ordered maps so every lookup yields quads in a
//! stable order for a given index state:
//! - `eav`: entity -> attribute -> value -> provenance (authoritative),
//! - `ave`: attribute -> value -> entities (secondary, for entity-unbound
//!   lookups).

use std::collections::{BTreeMap, BTreeSet};

use fxp_value::Scalar;
use serde::{Deserialize, Serialize};

/// One fact with its provenance node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub e: Scalar,
    pub a: Scalar,
    pub v: Scalar,
    pub n: Scalar,
}

impl Quad {
    pub fn new(
        e: impl Into<Scalar>,
        a: impl Into<Scalar>,
        v: impl Into<Scalar>,
        n: impl Into<Scalar>,
    ) -> Self {
        Self {
            e: e.into(),
            a: a.into(),
            v: v.into(),
            n: n.into(),
        }
    }
}

/// Lookup pattern binding any subset of `(e, a, v)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pattern {
    pub e: Option<Scalar>,
    pub a: Option<Scalar>,
    pub v: Option<Scalar>,
}

impl Pattern {
    pub fn bind_e(e: impl Into<Scalar>) -> Self {
        Pattern {
            e: Some(e.into()),
            ..Pattern::default()
        }
    }

    pub fn bind_ea(e: impl Into<Scalar>, a: impl Into<Scalar>) -> Self {
        Pattern {
            e: Some(e.into()),
            a: Some(a.into()),
            v: None,
        }
    }

    pub fn bind_a(a: impl Into<Scalar>) -> Self {
        Pattern {
            e: None,
            a: Some(a.into()),
            v: None,
        }
    }
}

type Provenance = BTreeMap<Scalar, u32>;

#[derive(Debug, Default, Clone)]
pub struct TripleIndex {
    eav: BTreeMap<Scalar, BTreeMap<Scalar, BTreeMap<Scalar, Provenance>>>,
    ave: BTreeMap<Scalar, BTreeMap<Scalar, BTreeSet<Scalar>>>,
}

impl TripleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a quad. Returns true iff the logical `(e, a, v)` triple became
    /// present (was absent before accounting for provenance multiplicity).
    pub fn insert(&mut self, e: Scalar, a: Scalar, v: Scalar, n: Scalar) -> bool {
        let provenance = self
            .eav
            .entry(e.clone())
            .or_default()
            .entry(a.clone())
            .or_default()
            .entry(v.clone())
            .or_default();
        let added = provenance.is_empty();
        *provenance.entry(n).or_insert(0) += 1;
        if added {
            self.ave.entry(a).or_default().entry(v).or_default().insert(e);
        }
        added
    }

    /// Remove one provenance reference. Returns true iff the last provenance
    /// for `(e, a, v)` is gone. Removing a non-present quad is a no-op.
    pub fn remove(&mut self, e: &Scalar, a: &Scalar, v: &Scalar, n: &Scalar) -> bool {
        let Some(attrs) = self.eav.get_mut(e) else {
            return false;
        };
        let Some(values) = attrs.get_mut(a) else {
            return false;
        };
        let Some(provenance) = values.get_mut(v) else {
            return false;
        };
        let Some(count) = provenance.get_mut(n) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            provenance.remove(n);
        }
        if !provenance.is_empty() {
            return false;
        }
        values.remove(v);
        if values.is_empty() {
            attrs.remove(a);
        }
        if attrs.is_empty() {
            self.eav.remove(e);
        }
        if let Some(entities) = self.ave.get_mut(a) {
            if let Some(holders) = entities.get_mut(v) {
                holders.remove(e);
                if holders.is_empty() {
                    entities.remove(v);
                }
            }
            if entities.is_empty() {
                self.ave.remove(a);
            }
        }
        true
    }

    pub fn contains(&self, e: &Scalar, a: &Scalar, v: &Scalar) -> bool {
        self.eav
            .get(e)
            .and_then(|attrs| attrs.get(a))
            .is_some_and(|values| values.contains_key(v))
    }

    /// All values held by `(e, a)`, in scalar order.
    pub fn values<'a>(&'a self, e: &Scalar, a: &Scalar) -> impl Iterator<Item = &'a Scalar> + 'a {
        self.eav
            .get(e)
            .and_then(|attrs| attrs.get(a))
            .into_iter()
            .flat_map(|values| values.keys())
    }

    /// Matching quads for a partial-key pattern, one per `(e, a, v, n)`.
    ///
    /// Entity-bound patterns walk `eav`; attribute-bound patterns with a free
    /// entity walk `ave`; a value-only (or empty) pattern scans. The order is
    /// the ordered-map order in every case, so equal index states iterate
    /// identically.
    pub fn iterate(&self, pattern: &Pattern) -> Vec<Quad> {
        let mut out = Vec::new();
        match (&pattern.e, &pattern.a, &pattern.v) {
            (Some(e), _, _) => {
                if let Some(attrs) = self.eav.get(e) {
                    self.collect_entity(e, attrs, &pattern.a, &pattern.v, &mut out);
                }
            }
            (None, Some(a), _) => {
                if let Some(entities) = self.ave.get(a) {
                    for (v, holders) in entities {
                        if let Some(want) = &pattern.v
                            && want != v
                        {
                            continue;
                        }
                        for e in holders {
                            self.collect_provenance(e, a, v, &mut out);
                        }
                    }
                }
            }
            (None, None, _) => {
                for (e, attrs) in &self.eav {
                    self.collect_entity(e, attrs, &None, &pattern.v, &mut out);
                }
            }
        }
        out
    }

    fn collect_entity(
        &self,
        e: &Scalar,
        attrs: &BTreeMap<Scalar, BTreeMap<Scalar, Provenance>>,
        want_a: &Option<Scalar>,
        want_v: &Option<Scalar>,
        out: &mut Vec<Quad>,
    ) {
        for (a, values) in attrs {
            if let Some(want) = want_a
                && want != a
            {
                continue;
            }
            for (v, provenance) in values {
                if let Some(want) = want_v
                    && want != v
                {
                    continue;
                }
                for n in provenance.keys() {
                    out.push(Quad::new(e.clone(), a.clone(), v.clone(), n.clone()));
                }
            }
        }
    }

    fn collect_provenance(&self, e: &Scalar, a: &Scalar, v: &Scalar, out: &mut Vec<Quad>) {
        if let Some(provenance) = self
            .eav
            .get(e)
            .and_then(|attrs| attrs.get(a))
            .and_then(|values| values.get(v))
        {
            for n in provenance.keys() {
                out.push(Quad::new(e.clone(), a.clone(), v.clone(), n.clone()));
            }
        }
    }

    /// Full dump. With provenance, one quad per `(e, a, v, n)`; without, one
    /// quad per logical triple carrying its first provenance node.
    pub fn to_triples(&self, include_provenance: bool) -> Vec<Quad> {
        let mut out = Vec::new();
        for (e, attrs) in &self.eav {
            for (a, values) in attrs {
                for (v, provenance) in values {
                    if include_provenance {
                        for n in provenance.keys() {
                            out.push(Quad::new(e.clone(), a.clone(), v.clone(), n.clone()));
                        }
                    } else if let Some(n) = provenance.keys().next() {
                        out.push(Quad::new(e.clone(), a.clone(), v.clone(), n.clone()));
                    }
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.eav.is_empty()
    }
}
