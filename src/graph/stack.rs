//! Bucketed draw stack
//!
//! A [`Stack`] holds the drawables of one pass entry in four buckets:
//!
//! | Bucket | Order |
//! |---|---|
//! | unprojected × opaque | `render_order`, `creation_index` |
//! | unprojected × transparent | `render_order`, distance (far first), `creation_index` |
//! | projected × opaque | `render_order`, `creation_index` |
//! | projected × transparent | `render_order`, distance (far first), `creation_index` |
//!
//! Buckets are drawn in the order of the table. Every insert and removal
//! re-sorts the affected bucket; `creation_index` is always the last key so
//! the result never depends on sort stability.

use std::cmp::Ordering;

use crate::graph::bundle::BundleId;
use crate::renderable::RenderableId;

/// Anything that can occupy a stack slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawableId {
    Renderable(RenderableId),
    Bundle(BundleId),
}

impl From<RenderableId> for DrawableId {
    fn from(id: RenderableId) -> Self {
        Self::Renderable(id)
    }
}

impl From<BundleId> for DrawableId {
    fn from(id: BundleId) -> Self {
        Self::Bundle(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub projected: bool,
    pub transparent: bool,
}

impl BucketKey {
    /// Bucket draw order inside one pass.
    pub const DRAW_ORDER: [BucketKey; 4] = [
        BucketKey::new(false, false),
        BucketKey::new(false, true),
        BucketKey::new(true, false),
        BucketKey::new(true, true),
    ];

    #[must_use]
    pub const fn new(projected: bool, transparent: bool) -> Self {
        Self {
            projected,
            transparent,
        }
    }

    #[inline]
    const fn index(self) -> usize {
        ((self.projected as usize) << 1) | (self.transparent as usize)
    }
}

/// Ordering inputs of one drawable, captured at sort time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortKey {
    pub render_order: i32,
    pub creation_index: u64,
    /// View-space distance of the nearest point of the bounding sphere.
    /// Zero for drawables that do not use the camera.
    pub depth: f32,
}

impl SortKey {
    #[must_use]
    pub fn new(render_order: i32, creation_index: u64) -> Self {
        Self {
            render_order,
            creation_index,
            depth: 0.0,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }
}

#[must_use]
pub fn compare_opaque(a: &SortKey, b: &SortKey) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then(a.creation_index.cmp(&b.creation_index))
}

/// Back-to-front: among equal render orders the farthest drawable comes first.
#[must_use]
pub fn compare_transparent(a: &SortKey, b: &SortKey) -> Ordering {
    a.render_order
        .cmp(&b.render_order)
        .then(b.depth.total_cmp(&a.depth))
        .then(a.creation_index.cmp(&b.creation_index))
}

#[derive(Debug, Clone, Default)]
pub struct Stack {
    buckets: [Vec<DrawableId>; 4],
}

impl Stack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `id` into `key`'s bucket and re-sorts it.
    pub fn insert(&mut self, key: BucketKey, id: DrawableId, sort_key: impl Fn(DrawableId) -> SortKey) {
        let bucket = &mut self.buckets[key.index()];
        if !bucket.contains(&id) {
            bucket.push(id);
        }
        Self::sort(bucket, key.transparent, &sort_key);
    }

    /// Removes `id` from whichever bucket holds it.
    pub fn remove(
        &mut self,
        id: DrawableId,
        sort_key: impl Fn(DrawableId) -> SortKey,
    ) -> Option<BucketKey> {
        for key in BucketKey::DRAW_ORDER {
            let bucket = &mut self.buckets[key.index()];
            if let Some(position) = bucket.iter().position(|d| *d == id) {
                bucket.remove(position);
                Self::sort(bucket, key.transparent, &sort_key);
                return Some(key);
            }
        }
        None
    }

    pub fn sort_bucket(&mut self, key: BucketKey, sort_key: impl Fn(DrawableId) -> SortKey) {
        Self::sort(&mut self.buckets[key.index()], key.transparent, &sort_key);
    }

    fn sort(bucket: &mut Vec<DrawableId>, transparent: bool, sort_key: &impl Fn(DrawableId) -> SortKey) {
        if bucket.len() < 2 {
            return;
        }

        let mut keyed: Vec<(SortKey, DrawableId)> =
            bucket.iter().map(|&id| (sort_key(id), id)).collect();

        if transparent {
            keyed.sort_unstable_by(|a, b| compare_transparent(&a.0, &b.0));
        } else {
            keyed.sort_unstable_by(|a, b| compare_opaque(&a.0, &b.0));
        }

        bucket.clear();
        bucket.extend(keyed.into_iter().map(|(_, id)| id));
    }

    #[inline]
    #[must_use]
    pub fn bucket(&self, key: BucketKey) -> &[DrawableId] {
        &self.buckets[key.index()]
    }

    #[must_use]
    pub fn bucket_of(&self, id: DrawableId) -> Option<BucketKey> {
        BucketKey::DRAW_ORDER
            .into_iter()
            .find(|key| self.buckets[key.index()].contains(&id))
    }

    #[must_use]
    pub fn contains(&self, id: DrawableId) -> bool {
        self.bucket_of(id).is_some()
    }

    /// All drawables in draw order.
    pub fn iter(&self) -> impl Iterator<Item = (BucketKey, DrawableId)> + '_ {
        BucketKey::DRAW_ORDER
            .into_iter()
            .flat_map(move |key| self.buckets[key.index()].iter().map(move |&id| (key, id)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Empties every bucket, returning the drawables in draw order.
    pub fn drain(&mut self) -> Vec<DrawableId> {
        let drained = self.iter().map(|(_, id)| id).collect();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        drained
    }
}
