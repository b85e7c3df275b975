use super::{orient, Params, Placer};
use crate::{NodeSizes, Rect, Vec2};
use std::collections::HashSet;
use stemma_data::{LayoutKind, NodeId};

impl<S> Placer<'_, S>
where
    S: NodeSizes<NodeId>,
{
    /// Place the block rooted at `idx` and return its bounds
    ///
    /// Coordinates are local to the block, possibly negative; the caller
    /// shifts the whole subtree into its final spot afterwards.
    pub(crate) fn place(&mut self, idx: usize, params: &Params) -> Rect {
        match params.layout {
            LayoutKind::Normal | LayoutKind::Mixed => self.place_strip(idx, params),
            _ => self.place_column(idx, params),
        }
    }

    /// Normal and mixed placement: children spread in a row under the
    /// parent, or stack vertically once the mixed threshold is passed
    fn place_strip(&mut self, idx: usize, params: &Params) -> Rect {
        let child_groups = self.tree.nodes[idx].child_groups.clone();
        let assistants = self.tree.nodes[idx].assistants.clone();
        let has_children = child_groups.iter().any(|g| !g.is_empty());

        let band = self.place_band(idx, params, has_children);
        let mut bounds = band;
        let base = self.rects[idx];
        let trunk_x = base.center().x;

        let (assistant_bounds, assistants_bottom) =
            self.place_assistants(&assistants, params, trunk_x, base.bottom());
        if let Some(b) = assistant_bounds {
            bounds = bounds.union(b);
        }

        // The row starts below the whole band, partner assistant rows and
        // grown host boxes included
        let children_top = assistants_bottom.max(bounds.bottom()) + params.level_separation;

        let children: Vec<usize> = child_groups.iter().flatten().copied().collect();
        let row = if self.mixed_stack_applies(&children, params) {
            self.place_mixed_stack(&children, params, trunk_x, children_top)
        } else {
            let row = self.place_child_row(&child_groups, params, children_top);
            if let Some(row_bounds) = row {
                let delta = if params.align_left {
                    band.left() - row_bounds.left()
                } else {
                    band.center().x - row_bounds.center().x
                };
                for &child in &children {
                    self.translate_subtree(child, Vec2::new(delta, 0.0));
                }
                Some(Rect::new(
                    row_bounds.x + delta,
                    row_bounds.y,
                    row_bounds.w,
                    row_bounds.h,
                ))
            } else {
                None
            }
        };
        if let Some(row) = row {
            bounds = bounds.union(row);
        }
        bounds
    }

    /// Whether this node's children form a vertical mixed stack
    pub(crate) fn mixed_stack_applies(&self, children: &[usize], params: &Params) -> bool {
        params.layout == LayoutKind::Mixed
            && children.len() > params.mixed_threshold
            && children.iter().all(|&c| self.tree.nodes[c].is_leaf())
    }

    fn place_mixed_stack(
        &mut self,
        children: &[usize],
        params: &Params,
        trunk_x: f64,
        top: f64,
    ) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        let mut y = top;
        for &child in children {
            let block = self.place(child, params);
            self.translate_subtree(
                child,
                Vec2::new(trunk_x - block.w / 2.0 - block.left(), y - block.top()),
            );
            let placed = Rect::new(trunk_x - block.w / 2.0, y, block.w, block.h);
            bounds = Some(bounds.map_or(placed, |b| b.union(placed)));
            y = placed.bottom() + params.mixed_separation;
        }
        bounds
    }

    /// Pack the child blocks of one parent left to right
    ///
    /// Adjacent single boxes keep the sibling gap, anything larger gets
    /// the sub tree gap; the child groups of different couples are kept
    /// apart by the split separation.
    fn place_child_row(
        &mut self,
        groups: &[Vec<usize>],
        params: &Params,
        top: f64,
    ) -> Option<Rect> {
        let mut bounds: Option<Rect> = None;
        let mut x = 0.0;
        let mut prev_leaf: Option<bool> = None;
        let mut row_started = false;
        for group in groups {
            if group.is_empty() {
                continue;
            }
            if row_started {
                x += params.partner_split_separation;
                prev_leaf = None;
            }
            for &child in group {
                let leaf = self.tree.nodes[child].is_leaf();
                if let Some(prev) = prev_leaf {
                    x += if prev && leaf {
                        params.sibling_separation
                    } else {
                        params.subtree_separation
                    };
                }
                let block = self.place(child, params);
                let sub_shift =
                    self.tree.nodes[child].sub_levels as f64
                        * (self.rects[child].h + params.level_separation);
                self.translate_subtree(
                    child,
                    Vec2::new(x - block.left(), top + sub_shift - block.top()),
                );
                let placed = Rect::new(x, top + sub_shift, block.w, block.h);
                bounds = Some(bounds.map_or(placed, |b| b.union(placed)));
                x = placed.right();
                prev_leaf = Some(leaf);
            }
            row_started = true;
        }
        bounds
    }

    /// Place the node box and its partners side by side on one row
    ///
    /// When the couple has children the gap between the base and its first
    /// partner widens to the partner separation minimum, making room for
    /// the drop line. Each partner keeps its own assistant rows, hanging
    /// from its own trunk.
    pub(crate) fn place_band(
        &mut self,
        idx: usize,
        params: &Params,
        has_children: bool,
    ) -> Rect {
        let mut band = self.place_box(idx, params);
        let partners = self.tree.nodes[idx].partners.clone();
        let mut x = band.right();
        for (i, &partner) in partners.iter().enumerate() {
            let gap = if i == 0 && has_children {
                params.partner_separation.max(params.min_partner_separation)
            } else {
                params.partner_separation
            };
            x += gap;
            let partner_box = self.place_box(partner, params);
            self.translate_subtree(partner, Vec2::new(x - partner_box.left(), 0.0));
            let placed = self.rects[partner];
            band = band.union(placed);
            let assistants = self.tree.nodes[partner].assistants.clone();
            let (helper_bounds, _) =
                self.place_assistants(&assistants, params, placed.center().x, placed.bottom());
            if let Some(b) = helper_bounds {
                band = band.union(b);
            }
            x = placed.right();
        }
        band
    }

    /// Place assistants in rows under the parent, first to the right of
    /// the trunk, second to the left, and so on
    pub(crate) fn place_assistants(
        &mut self,
        assistants: &[usize],
        params: &Params,
        trunk_x: f64,
        parent_bottom: f64,
    ) -> (Option<Rect>, f64) {
        if assistants.is_empty() {
            return (None, parent_bottom);
        }
        let mut bounds: Option<Rect> = None;
        let mut y = parent_bottom + params.assistant_separation;
        for pair in assistants.chunks(2) {
            let mut row_h = 0.0f64;
            for (side, &assistant) in pair.iter().enumerate() {
                let block = self.place(assistant, params);
                let target_x = if side == 0 {
                    trunk_x + params.sibling_separation
                } else {
                    trunk_x - params.sibling_separation - block.w
                };
                self.translate_subtree(
                    assistant,
                    Vec2::new(target_x - block.left(), y - block.top()),
                );
                let placed = Rect::new(target_x, y, block.w, block.h);
                bounds = Some(bounds.map_or(placed, |b| b.union(placed)));
                row_h = row_h.max(block.h);
            }
            y += row_h + params.sibling_separation;
        }
        let bottom = y - params.sibling_separation;
        (bounds, bottom)
    }

    /// Place the node's own box, growing it around any hosted sub trees
    pub(crate) fn place_box(&mut self, idx: usize, params: &Params) -> Rect {
        let mut size = self.sizes.size(&self.tree.nodes[idx].id);
        let hosted = self.tree.nodes[idx].subtree_roots.clone();
        if hosted.is_empty() {
            self.rects[idx] = Rect::from_size(size);
            return self.rects[idx];
        }

        let pad = self.tree.nodes[idx].padding.unwrap_or(params.padding);
        let blocks: Vec<(usize, Rect)> = hosted
            .iter()
            .map(|&root| (root, self.place_hosted(root, params)))
            .collect();
        let container = self.grid_pack(&blocks, params.columns, params.subtree_separation);

        let content_h = size.y;
        size.x = size.x.max(container.w + 2.0 * pad);
        size.y = content_h + container.h + 2.0 * pad;
        self.rects[idx] = Rect::from_size(size);

        let delta = Vec2::new(
            size.x / 2.0 - container.w / 2.0 - container.left(),
            content_h + pad - container.top(),
        );
        for &root in &hosted {
            self.translate_subtree(root, delta);
        }
        self.rects[idx]
    }

    /// Place one hosted sub tree as a self-contained block
    ///
    /// Its interior links are routed right away so a local orientation
    /// override can transform block and links together.
    fn place_hosted(&mut self, root: usize, params: &Params) -> Rect {
        let overrides = self.tree.nodes[root].overrides.clone();
        let sub_params = match &overrides {
            Some(o) => params.with_overrides(o),
            None => params.clone(),
        };
        let bounds = self.place(root, &sub_params);
        self.emit_links(root, &sub_params);
        match overrides.and_then(|o| o.orientation) {
            Some(orientation) => self.transform_block(root, orientation),
            None => bounds,
        }
    }

    /// Rotate or mirror a finished block in place, returning its new
    /// bounds
    fn transform_block(
        &mut self,
        root: usize,
        orientation: stemma_data::Orientation,
    ) -> Rect {
        let cardinal = orient::cardinal(orientation);
        let members: HashSet<usize> = self.tree.subtree_indices(root).into_iter().collect();
        let mut bounds: Option<Rect> = None;
        for &i in &members {
            self.rects[i] = orient::rect(cardinal, self.rects[i]);
            bounds = Some(bounds.map_or(self.rects[i], |b| b.union(self.rects[i])));
        }
        for (anchor, link) in &mut self.links {
            if members.contains(anchor) {
                for p in &mut link.points {
                    *p = orient::point(cardinal, *p);
                }
            }
        }
        bounds.unwrap_or_default()
    }

    /// Tile blocks row-major into a grid `columns` wide
    pub(crate) fn grid_pack(
        &mut self,
        blocks: &[(usize, Rect)],
        columns: usize,
        gap: f64,
    ) -> Rect {
        let mut bounds: Option<Rect> = None;
        let mut y = 0.0;
        for row in blocks.chunks(columns.max(1)) {
            let mut x = 0.0;
            let mut row_h = 0.0f64;
            for &(root, block) in row {
                self.translate_subtree(root, Vec2::new(x - block.left(), y - block.top()));
                let placed = Rect::new(x, y, block.w, block.h);
                bounds = Some(bounds.map_or(placed, |b| b.union(placed)));
                x = placed.right() + gap;
                row_h = row_h.max(block.h);
            }
            y += row_h + gap;
        }
        bounds.unwrap_or_default()
    }

    /// Shift a block and every link routed inside it
    pub(crate) fn translate_subtree(&mut self, root: usize, delta: Vec2) {
        if delta.x == 0.0 && delta.y == 0.0 {
            return;
        }
        let members = self.tree.subtree_indices(root);
        let set: HashSet<usize> = members.iter().copied().collect();
        for &i in &members {
            self.rects[i].translate(delta);
        }
        for (anchor, link) in &mut self.links {
            if set.contains(anchor) {
                for p in &mut link.points {
                    p.x += delta.x;
                    p.y += delta.y;
                }
            }
        }
    }
}
