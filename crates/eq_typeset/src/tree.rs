//! Equation tree: arena-owned stems and leaves.
//!
//! Every node lives in one `EqTree` arena slot. The owning edge is the
//! parent stem's child list; the `parent` field on each slot is a
//! non-owning back-reference used for upward queries (script cascade,
//! ancestor lookup, sibling navigation) and never extends a lifetime.
//! Detached subtrees stay in the arena until released, so an editor can
//! detach and re-attach during structural rewrites.

use crate::geometry::{Point, Rect, Size};
use crate::render_data::RenderData;
use serde::{Deserialize, Serialize};

/// Structural node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StemType {
    Root,
    Row,
    Sup,
    Sub,
    SubSup,
    Fraction,
    Binomial,
    Under,
    Over,
    UnderOver,
    SqRoot,
    NRoot,
    MatrixCell,
    MatrixRow,
    Matrix,
}

impl StemType {
    /// Children lay out left-to-right on a shared baseline.
    pub fn is_row_like(self) -> bool {
        matches!(self, StemType::Root | StemType::Row | StemType::MatrixCell)
    }

    /// Carries a script child at reduced scale.
    pub fn is_script_type(self) -> bool {
        matches!(
            self,
            StemType::Sup
                | StemType::Sub
                | StemType::SubSup
                | StemType::Under
                | StemType::Over
                | StemType::UnderOver
        )
    }

    /// Layout may extend below the row baseline.
    pub fn has_descender_layout(self) -> bool {
        matches!(
            self,
            StemType::Sub
                | StemType::SubSup
                | StemType::Under
                | StemType::UnderOver
                | StemType::Fraction
                | StemType::Binomial
        )
    }

    /// Child indices that receive the reduced script scale.
    fn script_child_indices(self) -> &'static [usize] {
        match self {
            StemType::Sup | StemType::Sub | StemType::Under | StemType::Over => &[1],
            StemType::SubSup | StemType::UnderOver => &[1, 2],
            _ => &[],
        }
    }
}

/// Horizontal alignment for a stem's content within its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ViewAlign {
    #[default]
    Auto,
    Left,
    Center,
}

/// A structural tree node owning an ordered list of children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStem {
    pub stem_type: StemType,
    pub children: Vec<NodeId>,

    pub draw_origin: Point,
    pub draw_size: Size,
    pub draw_bounds: Rect,

    pub has_large_op: bool,
    pub has_accent_char: bool,
    pub align: ViewAlign,

    pub has_overline: bool,
    pub overline_start: Point,
    pub overline_end: Point,

    pub has_supplemental_line: bool,
    pub supplemental_line_start: Point,
    pub supplemental_line_end: Point,

    /// Companion run drawn outside the child list, e.g. the radical index
    /// for NRoot. Laid out and rendered like any leaf.
    pub supplementary_data: Option<RenderData>,

    revision: u64,
    laid_out_revision: u64,
}

impl RenderStem {
    pub fn new(stem_type: StemType) -> Self {
        Self {
            stem_type,
            children: Vec::new(),
            draw_origin: Point::origin(),
            draw_size: Size::zero(),
            draw_bounds: Rect::default(),
            has_large_op: false,
            has_accent_char: false,
            align: ViewAlign::Auto,
            has_overline: false,
            overline_start: Point::origin(),
            overline_end: Point::origin(),
            has_supplemental_line: false,
            supplemental_line_start: Point::origin(),
            supplemental_line_end: Point::origin(),
            supplementary_data: None,
            revision: 1,
            laid_out_revision: 0,
        }
    }

    pub fn with_supplementary_data(mut self, data: RenderData) -> Self {
        self.supplementary_data = Some(data);
        self
    }

    pub fn is_dirty(&self) -> bool {
        self.revision != self.laid_out_revision
    }

    pub fn mark_laid_out(&mut self) {
        self.laid_out_revision = self.revision;
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}

/// A child slot: either a terminal leaf or a nested stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Stem(RenderStem),
    Leaf(RenderData),
}

impl Node {
    pub fn as_stem(&self) -> Option<&RenderStem> {
        match self {
            Node::Stem(s) => Some(s),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&RenderData> {
        match self {
            Node::Leaf(d) => Some(d),
            Node::Stem(_) => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    /// Typographic bounds of either node kind.
    pub fn bounds(&self) -> Rect {
        match self {
            Node::Stem(s) => s.draw_bounds,
            Node::Leaf(d) => d.typographic_bounds(),
        }
    }

    pub fn origin(&self) -> Point {
        match self {
            Node::Stem(s) => s.draw_origin,
            Node::Leaf(d) => d.draw_origin,
        }
    }

    pub fn size(&self) -> Size {
        match self {
            Node::Stem(s) => s.draw_size,
            Node::Leaf(d) => d.draw_size,
        }
    }
}

/// Handle to a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Slot {
    Occupied { node: Node, parent: Option<NodeId> },
    Free { next: Option<usize> },
}

/// Arena owning every stem and leaf of one equation line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EqTree {
    slots: Vec<Slot>,
    free_head: Option<usize>,
}

impl EqTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with a Root stem already inserted.
    pub fn with_root() -> (Self, NodeId) {
        let mut tree = Self::new();
        let root = tree.insert_stem(RenderStem::new(StemType::Root));
        (tree, root)
    }

    // -- slot management -----------------------------------------------------

    fn insert_node(&mut self, node: Node) -> NodeId {
        match self.free_head {
            Some(index) => {
                let next = match self.slots[index] {
                    Slot::Free { next } => next,
                    Slot::Occupied { .. } => None,
                };
                self.free_head = next;
                self.slots[index] = Slot::Occupied { node, parent: None };
                NodeId(index)
            }
            None => {
                self.slots.push(Slot::Occupied { node, parent: None });
                NodeId(self.slots.len() - 1)
            }
        }
    }

    pub fn insert_stem(&mut self, stem: RenderStem) -> NodeId {
        self.insert_node(Node::Stem(stem))
    }

    pub fn insert_leaf(&mut self, leaf: RenderData) -> NodeId {
        self.insert_node(Node::Leaf(leaf))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied { node, .. }) => Some(node),
            _ => None,
        }
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        match self.slots.get_mut(id.0) {
            Some(Slot::Occupied { node, .. }) => Some(node),
            _ => None,
        }
    }

    pub fn stem(&self, id: NodeId) -> Option<&RenderStem> {
        self.node(id).and_then(Node::as_stem)
    }

    pub fn stem_mut(&mut self, id: NodeId) -> Option<&mut RenderStem> {
        match self.node_mut(id) {
            Some(Node::Stem(s)) => Some(s),
            _ => None,
        }
    }

    pub fn leaf(&self, id: NodeId) -> Option<&RenderData> {
        self.node(id).and_then(Node::as_leaf)
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Option<&mut RenderData> {
        match self.node_mut(id) {
            Some(Node::Leaf(d)) => Some(d),
            _ => None,
        }
    }

    /// Non-owning parent back-reference; `None` at the root or while detached.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        match self.slots.get(id.0) {
            Some(Slot::Occupied { parent, .. }) => *parent,
            _ => None,
        }
    }

    fn set_parent(&mut self, id: NodeId, new_parent: Option<NodeId>) {
        if let Some(Slot::Occupied { parent, .. }) = self.slots.get_mut(id.0) {
            *parent = new_parent;
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Occupied { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Destroy a detached subtree, returning its slots to the free list.
    pub fn release_subtree(&mut self, id: NodeId) {
        let children = match self.stem(id) {
            Some(stem) => stem.children.clone(),
            None => Vec::new(),
        };
        for child in children {
            self.release_subtree(child);
        }
        if matches!(self.slots.get(id.0), Some(Slot::Occupied { .. })) {
            self.slots[id.0] = Slot::Free { next: self.free_head };
            self.free_head = Some(id.0);
        }
    }

    // -- dirty propagation ---------------------------------------------------

    /// Bump revision counters from `id` up to the root, so layout knows the
    /// path to a mutated node is stale.
    pub fn mark_dirty(&mut self, id: NodeId) {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if let Some(stem) = self.stem_mut(current) {
                stem.bump();
            }
            cursor = self.parent(current);
        }
    }

    // -- child operations ----------------------------------------------------

    /// Append a child, setting its parent back-reference.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.stem(parent).is_none() {
            tracing::warn!(?parent, "append_child on non-stem node ignored");
            return;
        }
        self.set_parent(child, Some(parent));
        if let Some(stem) = self.stem_mut(parent) {
            stem.children.push(child);
        }
        self.mark_dirty(parent);
    }

    /// Insert a child at an index. An out-of-bounds index is ignored.
    pub fn insert_child(&mut self, parent: NodeId, child: NodeId, index: usize) {
        let len = match self.stem(parent) {
            Some(stem) => stem.children.len(),
            None => return,
        };
        if index > len {
            tracing::warn!(?parent, index, len, "insert_child index out of bounds, ignored");
            return;
        }
        self.set_parent(child, Some(parent));
        if let Some(stem) = self.stem_mut(parent) {
            stem.children.insert(index, child);
        }
        self.mark_dirty(parent);
    }

    /// Replace the child at an index, releasing the old subtree. An
    /// out-of-bounds index is ignored without mutation.
    pub fn set_child(&mut self, parent: NodeId, child: NodeId, index: usize) {
        let old = match self.stem(parent) {
            Some(stem) if index < stem.children.len() => stem.children[index],
            Some(stem) => {
                tracing::warn!(
                    ?parent,
                    index,
                    len = stem.children.len(),
                    "set_child index out of bounds, ignored"
                );
                return;
            }
            None => return,
        };
        // Replacing a child with itself must not release the live subtree.
        if old == child {
            return;
        }
        self.set_parent(child, Some(parent));
        if let Some(stem) = self.stem_mut(parent) {
            stem.children[index] = child;
        }
        self.set_parent(old, None);
        self.release_subtree(old);
        self.mark_dirty(parent);
    }

    /// Detach a child by identity, clearing its parent link. The detached
    /// subtree stays in the arena for possible re-attachment; no-op if the
    /// node is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        let position = match self.stem(parent) {
            Some(stem) => stem.children.iter().position(|&c| c == child),
            None => None,
        };
        let Some(position) = position else {
            return;
        };
        if let Some(stem) = self.stem_mut(parent) {
            stem.children.remove(position);
        }
        self.set_parent(child, None);
        self.mark_dirty(parent);
    }

    // -- navigation ----------------------------------------------------------

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.stem(id)?.children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.stem(id)?.children.last().copied()
    }

    pub fn index_of_child(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.stem(parent)?.children.iter().position(|&c| c == child)
    }

    pub fn previous_sibling(&self, child: NodeId) -> Option<NodeId> {
        let parent = self.parent(child)?;
        let index = self.index_of_child(parent, child)?;
        if index == 0 {
            None
        } else {
            Some(self.stem(parent)?.children[index - 1])
        }
    }

    pub fn next_sibling(&self, child: NodeId) -> Option<NodeId> {
        let parent = self.parent(child)?;
        let index = self.index_of_child(parent, child)?;
        self.stem(parent)?.children.get(index + 1).copied()
    }

    /// Leaf-most node following first-child edges.
    pub fn first_descendant(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(child) = self.first_child(current) {
            current = child;
        }
        current
    }

    /// Leaf-most node following last-child edges.
    pub fn last_descendant(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(child) = self.last_child(current) {
            current = child;
        }
        current
    }

    /// First cursor position inside this node's content span.
    pub fn initial_cursor_loc(&self, _id: NodeId) -> usize {
        0
    }

    /// Last cursor position inside this node's content span: the child
    /// count for a stem, the character count for a leaf.
    pub fn last_cursor_loc(&self, id: NodeId) -> usize {
        match self.node(id) {
            Some(Node::Stem(stem)) => stem.children.len(),
            Some(Node::Leaf(data)) => data.char_len(),
            None => 0,
        }
    }

    // -- upward queries ------------------------------------------------------

    /// Script-nesting depth: how many ancestor script slots enclose `id`.
    fn script_depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            if let Some(stem) = self.stem(parent) {
                if stem.stem_type.is_script_type() {
                    if let Some(index) = self.index_of_child(parent, current) {
                        if stem.stem_type.script_child_indices().contains(&index) {
                            depth += 1;
                        }
                    }
                }
            }
            current = parent;
        }
        depth
    }

    /// Whether this node renders one script level down the size cascade.
    pub fn should_use_smaller(&self, id: NodeId) -> bool {
        self.script_depth(id) == 1
    }

    /// Whether this node renders at the smallest cascade size.
    pub fn should_use_smallest(&self, id: NodeId) -> bool {
        self.script_depth(id) >= 2
    }

    /// The size class this node's content takes.
    pub fn size_class(&self, id: NodeId) -> crate::metrics::SizeClass {
        match self.script_depth(id) {
            0 => crate::metrics::SizeClass::Regular,
            1 => crate::metrics::SizeClass::Smaller,
            _ => crate::metrics::SizeClass::Smallest,
        }
    }

    fn ancestor_of_type(&self, id: NodeId, wanted: StemType) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(candidate) = current {
            if self.stem(candidate).map(|s| s.stem_type) == Some(wanted) {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    /// Nearest enclosing fraction, if any.
    pub fn fraction_bar_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.ancestor_of_type(id, StemType::Fraction)
    }

    /// Nearest enclosing n-root, if any.
    pub fn nroot_ancestor(&self, id: NodeId) -> Option<NodeId> {
        self.ancestor_of_type(id, StemType::NRoot)
    }

    pub fn has_child_type(&self, id: NodeId, wanted: StemType) -> bool {
        self.stem(id)
            .map(|stem| {
                stem.children
                    .iter()
                    .any(|&c| self.stem(c).map(|s| s.stem_type) == Some(wanted))
            })
            .unwrap_or(false)
    }

    pub fn has_only_leaf_children(&self, id: NodeId) -> bool {
        self.stem(id)
            .map(|stem| {
                stem.children
                    .iter()
                    .all(|&c| self.node(c).map(Node::is_leaf).unwrap_or(false))
            })
            .unwrap_or(false)
    }

    /// Depth-first preorder walk of a subtree.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(stem) = self.stem(current) {
                for &child in stem.children.iter().rev() {
                    stack.push(child);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tree: &mut EqTree, text: &str) -> NodeId {
        tree.insert_leaf(RenderData::new(text))
    }

    #[test]
    fn test_append_sets_parent_link() {
        let (mut tree, root) = EqTree::with_root();
        let x = leaf(&mut tree, "x");
        tree.append_child(root, x);
        assert_eq!(tree.parent(x), Some(root));
        assert_eq!(tree.first_child(root), Some(x));
    }

    #[test]
    fn test_insert_child_order() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        let c = leaf(&mut tree, "c");
        let b = leaf(&mut tree, "b");
        tree.append_child(root, a);
        tree.append_child(root, c);
        tree.insert_child(root, b, 1);
        let children = &tree.stem(root).unwrap().children;
        assert_eq!(children, &vec![a, b, c]);
    }

    #[test]
    fn test_out_of_bounds_set_child_is_noop() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        let b = leaf(&mut tree, "b");
        tree.set_child(root, b, 5);
        assert_eq!(tree.stem(root).unwrap().children, vec![a]);
        // The replacement candidate is still alive and detached.
        assert!(tree.leaf(b).is_some());
        assert_eq!(tree.parent(b), None);
    }

    #[test]
    fn test_set_child_with_same_child_keeps_node_alive() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        tree.set_child(root, a, 0);
        assert_eq!(tree.stem(root).unwrap().children, vec![a]);
        assert!(tree.leaf(a).is_some());
        assert_eq!(tree.parent(a), Some(root));
    }

    #[test]
    fn test_set_child_releases_old_subtree() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        let b = leaf(&mut tree, "b");
        tree.set_child(root, b, 0);
        assert_eq!(tree.stem(root).unwrap().children, vec![b]);
        assert!(tree.leaf(a).is_none());
    }

    #[test]
    fn test_remove_child_detaches_without_destroying() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        tree.remove_child(root, a);
        assert!(tree.stem(root).unwrap().children.is_empty());
        assert!(tree.leaf(a).is_some());
        assert_eq!(tree.parent(a), None);
        // Re-attachment works.
        tree.append_child(root, a);
        assert_eq!(tree.parent(a), Some(root));
    }

    #[test]
    fn test_remove_absent_child_is_noop() {
        let (mut tree, root) = EqTree::with_root();
        let stray = leaf(&mut tree, "s");
        tree.remove_child(root, stray);
        assert!(tree.stem(root).unwrap().children.is_empty());
    }

    #[test]
    fn test_sibling_navigation() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        tree.append_child(root, a);
        tree.append_child(root, b);
        assert_eq!(tree.next_sibling(a), Some(b));
        assert_eq!(tree.previous_sibling(b), Some(a));
        assert_eq!(tree.previous_sibling(a), None);
        assert_eq!(tree.next_sibling(b), None);
    }

    #[test]
    fn test_descendant_walks() {
        let (mut tree, root) = EqTree::with_root();
        let row = tree.insert_stem(RenderStem::new(StemType::Row));
        tree.append_child(root, row);
        let a = leaf(&mut tree, "a");
        let b = leaf(&mut tree, "b");
        tree.append_child(row, a);
        tree.append_child(row, b);
        assert_eq!(tree.first_descendant(root), a);
        assert_eq!(tree.last_descendant(root), b);
    }

    #[test]
    fn test_script_cascade_depth() {
        // x^(y^z): z sits two script levels deep.
        let (mut tree, root) = EqTree::with_root();
        let outer = tree.insert_stem(RenderStem::new(StemType::Sup));
        tree.append_child(root, outer);
        let x = leaf(&mut tree, "x");
        tree.append_child(outer, x);
        let inner = tree.insert_stem(RenderStem::new(StemType::Sup));
        tree.append_child(outer, inner);
        let y = leaf(&mut tree, "y");
        let z = leaf(&mut tree, "z");
        tree.append_child(inner, y);
        tree.append_child(inner, z);

        assert!(!tree.should_use_smaller(x));
        assert!(tree.should_use_smaller(y));
        assert!(tree.should_use_smallest(z));
        assert_eq!(tree.size_class(x), crate::metrics::SizeClass::Regular);
        assert_eq!(tree.size_class(z), crate::metrics::SizeClass::Smallest);
    }

    #[test]
    fn test_fraction_ancestor_lookup() {
        let (mut tree, root) = EqTree::with_root();
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let num = tree.insert_stem(RenderStem::new(StemType::Row));
        let den = tree.insert_stem(RenderStem::new(StemType::Row));
        tree.append_child(frac, num);
        tree.append_child(frac, den);
        let a = leaf(&mut tree, "a");
        tree.append_child(num, a);
        assert_eq!(tree.fraction_bar_ancestor(a), Some(frac));
        assert_eq!(tree.nroot_ancestor(a), None);
    }

    #[test]
    fn test_slot_reuse_after_release() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "a");
        tree.append_child(root, a);
        tree.remove_child(root, a);
        tree.release_subtree(a);
        let count_before = tree.len();
        let b = leaf(&mut tree, "b");
        assert_eq!(tree.len(), count_before + 1);
        assert!(tree.leaf(b).is_some());
    }

    #[test]
    fn test_mutation_marks_ancestors_dirty() {
        let (mut tree, root) = EqTree::with_root();
        let row = tree.insert_stem(RenderStem::new(StemType::Row));
        tree.append_child(root, row);
        tree.stem_mut(root).unwrap().mark_laid_out();
        tree.stem_mut(row).unwrap().mark_laid_out();
        let a = leaf(&mut tree, "a");
        tree.append_child(row, a);
        assert!(tree.stem(row).unwrap().is_dirty());
        assert!(tree.stem(root).unwrap().is_dirty());
    }

    #[test]
    fn test_cursor_locations() {
        let (mut tree, root) = EqTree::with_root();
        let a = leaf(&mut tree, "abc");
        tree.append_child(root, a);
        assert_eq!(tree.initial_cursor_loc(root), 0);
        assert_eq!(tree.last_cursor_loc(root), 1);
        assert_eq!(tree.last_cursor_loc(a), 3);
    }

    #[test]
    fn test_serde_round_trip_preserves_structure() {
        let (mut tree, root) = EqTree::with_root();
        let frac = tree.insert_stem(RenderStem::new(StemType::Fraction));
        tree.append_child(root, frac);
        let json = serde_json::to_string(&tree).unwrap();
        let restored: EqTree = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, restored);
        assert_eq!(restored.parent(frac), Some(root));
    }
}
