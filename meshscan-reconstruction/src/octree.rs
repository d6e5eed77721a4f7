//! Adaptive point-keyed octree
//!
//! Every leaf holds at most one distinct position key. Inserting a value at a
//! different position splits the leaf into eight octants and pushes both the
//! old bucket and the new value down. Splitting stops once a child would be
//! smaller than the tree's `minimum_cell_size`; from then on the leaf merges
//! further positions into its bucket. Every stored element keeps the position
//! it was inserted at, so range queries stay exact for merged buckets too.
//!
//! The tree is rebuilt from scratch on every smoothing pass; there is no
//! rebalancing and removal only clears buckets.

use meshscan_core::{BoundingBox, Error, Point3f, Result};
use std::fmt;

/// A stored value together with the position it was inserted at
#[derive(Debug, Clone, PartialEq)]
pub struct Element<T> {
    pub position: Point3f,
    pub value: T,
}

/// Tree node: either a leaf bucket or an internal node owning 8 children
#[derive(Debug, Clone)]
pub enum OctreeNode<T> {
    Leaf {
        bounds: BoundingBox,
        /// Position shared by the bucket, `None` while the leaf is empty
        key: Option<Point3f>,
        elements: Vec<Element<T>>,
    },
    Internal {
        bounds: BoundingBox,
        /// Children in octant order, see [`BoundingBox::octant`]
        children: Box<[OctreeNode<T>; 8]>,
    },
}

/// Read-only view of a leaf handed out by [`Octree::leaves`]
#[derive(Debug)]
pub struct LeafView<'a, T> {
    pub bounds: &'a BoundingBox,
    pub elements: &'a [Element<T>],
}

impl<T> Clone for LeafView<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LeafView<'_, T> {}

impl<'a, T> LeafView<'a, T> {
    /// First element stored at each distinct position, in insertion order.
    ///
    /// A leaf above the size floor yields at most one; a floor-sized leaf
    /// yields one per merged position.
    pub fn distinct(&self) -> Vec<&'a Element<T>> {
        let mut out: Vec<&'a Element<T>> = Vec::new();
        for element in self.elements {
            if !out.iter().any(|e| e.position == element.position) {
                out.push(element);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> OctreeNode<T> {
    fn empty_leaf(bounds: BoundingBox) -> Self {
        OctreeNode::Leaf {
            bounds,
            key: None,
            elements: Vec::new(),
        }
    }

    /// Box covered by this node
    pub fn bounds(&self) -> &BoundingBox {
        match self {
            OctreeNode::Leaf { bounds, .. } | OctreeNode::Internal { bounds, .. } => bounds,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, OctreeNode::Leaf { .. })
    }

    /// A leaf may split only if each child stays at least `minimum_cell_size` wide
    fn can_subdivide(bounds: &BoundingBox, minimum_cell_size: f32) -> bool {
        bounds.half_size().min() >= minimum_cell_size
    }

    fn insert(&mut self, element: Element<T>, minimum_cell_size: f32) {
        match self {
            OctreeNode::Internal { bounds, children } => {
                let index = bounds.octant_index(&element.position);
                children[index].insert(element, minimum_cell_size);
                return;
            }
            OctreeNode::Leaf {
                bounds,
                key,
                elements,
            } => match *key {
                None => {
                    *key = Some(element.position);
                    elements.push(element);
                    return;
                }
                Some(existing)
                    if existing == element.position
                        || !Self::can_subdivide(bounds, minimum_cell_size) =>
                {
                    elements.push(element);
                    return;
                }
                Some(_) => {}
            },
        }

        self.subdivide(minimum_cell_size);
        self.insert(element, minimum_cell_size);
    }

    /// Turn a leaf into an internal node and push its bucket into the children
    fn subdivide(&mut self, minimum_cell_size: f32) {
        let bounds = *self.bounds();
        let children = Box::new(bounds.octants().map(OctreeNode::empty_leaf));
        let previous = std::mem::replace(self, OctreeNode::Internal { bounds, children });

        if let OctreeNode::Leaf { elements, .. } = previous {
            for element in elements {
                self.insert(element, minimum_cell_size);
            }
        }
    }

    fn collect_all<'a>(&'a self, out: &mut Vec<&'a Element<T>>) {
        match self {
            OctreeNode::Leaf { elements, .. } => out.extend(elements.iter()),
            OctreeNode::Internal { children, .. } => {
                for child in children.iter() {
                    child.collect_all(out);
                }
            }
        }
    }

    fn collect_in<'a>(&'a self, range: &BoundingBox, out: &mut Vec<&'a Element<T>>) {
        match self {
            OctreeNode::Leaf { elements, .. } => {
                out.extend(elements.iter().filter(|e| range.contains_point(&e.position)));
            }
            OctreeNode::Internal { children, .. } => {
                for child in children.iter() {
                    if child.bounds().is_contained_in(range) {
                        child.collect_all(out);
                    } else if child.bounds().intersects(range) {
                        child.collect_in(range, out);
                    }
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            OctreeNode::Leaf { .. } => 0,
            OctreeNode::Internal { children, .. } => {
                1 + children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
        }
    }

    fn describe(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let tabs = "\t".repeat(indent);
        let b = self.bounds();
        match self {
            OctreeNode::Leaf { elements, .. } => writeln!(
                f,
                "{}leaf [{:?} .. {:?}] elements: {}",
                tabs,
                b.min.coords.as_slice(),
                b.max.coords.as_slice(),
                elements.len()
            ),
            OctreeNode::Internal { children, .. } => {
                writeln!(
                    f,
                    "{}internal [{:?} .. {:?}]",
                    tabs,
                    b.min.coords.as_slice(),
                    b.max.coords.as_slice()
                )?;
                for child in children.iter() {
                    child.describe(f, indent + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Adaptive octree over a fixed root volume
#[derive(Debug, Clone)]
pub struct Octree<T> {
    root: OctreeNode<T>,
    minimum_cell_size: f32,
    len: usize,
}

impl<T> Octree<T> {
    /// Create an empty tree covering `bounds`.
    ///
    /// Fails if the box has no volume or the cell size floor is not a
    /// positive finite number.
    pub fn new(bounds: BoundingBox, minimum_cell_size: f32) -> Result<Self> {
        bounds.validate()?;
        if !(minimum_cell_size.is_finite() && minimum_cell_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "minimum cell size must be positive, got {}",
                minimum_cell_size
            )));
        }

        Ok(Self {
            root: OctreeNode::empty_leaf(bounds),
            minimum_cell_size,
            len: 0,
        })
    }

    /// Root volume
    pub fn bounds(&self) -> &BoundingBox {
        self.root.bounds()
    }

    pub fn minimum_cell_size(&self) -> f32 {
        self.minimum_cell_size
    }

    pub fn root(&self) -> &OctreeNode<T> {
        &self.root
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Longest root-to-leaf path, 0 for a tree that never split
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Store `value` at `position`.
    ///
    /// Positions outside the root volume (or non-finite ones) are rejected
    /// before the tree is touched.
    pub fn insert(&mut self, value: T, position: Point3f) -> Result<()> {
        if !self.bounds().contains_point(&position) {
            return Err(Error::InvalidInput(format!(
                "position {:?} lies outside the octree volume",
                position.coords.as_slice()
            )));
        }

        self.root.insert(Element { position, value }, self.minimum_cell_size);
        self.len += 1;
        Ok(())
    }

    /// All elements whose stored position lies inside `range`
    pub fn query_entries(&self, range: &BoundingBox) -> Vec<&Element<T>> {
        let mut out = Vec::new();
        if self.bounds().is_contained_in(range) {
            self.root.collect_all(&mut out);
        } else if self.bounds().intersects(range) {
            self.root.collect_in(range, &mut out);
        }
        out
    }

    /// All values whose stored position lies inside `range`
    pub fn query(&self, range: &BoundingBox) -> Vec<&T> {
        self.query_entries(range).into_iter().map(|e| &e.value).collect()
    }

    /// Values stored at exactly `position`
    pub fn elements_at(&self, position: &Point3f) -> Vec<&T> {
        if !self.bounds().contains_point(position) {
            return Vec::new();
        }

        let mut node = &self.root;
        loop {
            match node {
                OctreeNode::Internal { bounds, children } => {
                    node = &children[bounds.octant_index(position)];
                }
                OctreeNode::Leaf { elements, .. } => {
                    return elements
                        .iter()
                        .filter(|e| e.position == *position)
                        .map(|e| &e.value)
                        .collect();
                }
            }
        }
    }

    /// Iterate over every leaf, empty ones included, in octant order
    pub fn leaves(&self) -> Leaves<'_, T> {
        Leaves {
            stack: vec![&self.root],
        }
    }

    /// Number of leaves, empty ones included
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }
}

impl<T: PartialEq> Octree<T> {
    /// Remove one value equal to `value` from the leaf owning `position`.
    ///
    /// Returns whether anything was removed. An emptied leaf keeps its place
    /// in the tree.
    pub fn remove(&mut self, value: &T, position: &Point3f) -> bool {
        if !self.bounds().contains_point(position) {
            return false;
        }

        let mut node = &mut self.root;
        loop {
            match node {
                OctreeNode::Internal { bounds, children } => {
                    let index = bounds.octant_index(position);
                    node = &mut children[index];
                }
                OctreeNode::Leaf { key, elements, .. } => {
                    let Some(index) = elements.iter().position(|e| e.value == *value) else {
                        return false;
                    };
                    elements.remove(index);
                    *key = elements.first().map(|e| e.position);
                    self.len -= 1;
                    return true;
                }
            }
        }
    }
}

impl<T> fmt::Display for Octree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Octree")?;
        self.root.describe(f, 0)
    }
}

/// Depth-first leaf iterator
pub struct Leaves<'a, T> {
    stack: Vec<&'a OctreeNode<T>>,
}

impl<'a, T> Iterator for Leaves<'a, T> {
    type Item = LeafView<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                OctreeNode::Leaf {
                    bounds, elements, ..
                } => {
                    return Some(LeafView {
                        bounds,
                        elements: elements.as_slice(),
                    })
                }
                OctreeNode::Internal { children, .. } => {
                    self.stack.extend(children.iter().rev());
                }
            }
        }
        None
    }
}
