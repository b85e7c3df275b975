use super::{Params, Placer};
use crate::{NodeSizes, Rect, Vec2};
use stemma_data::{LayoutKind, NodeId};

/// Vertical line the tree variants hang their children from
pub(crate) fn column_trunk(kind: LayoutKind, base: Rect, params: &Params) -> f64 {
    match kind {
        LayoutKind::TreeRightOffset => base.left() + params.sibling_separation,
        LayoutKind::TreeLeftOffset => base.right() - params.sibling_separation,
        _ => base.center().x,
    }
}

/// Which side of the trunk the `i`th child block goes to
pub(crate) fn column_side_right(kind: LayoutKind, i: usize) -> bool {
    match kind {
        LayoutKind::Tree => i % 2 == 0,
        LayoutKind::TreeRight | LayoutKind::TreeRightOffset => true,
        _ => false,
    }
}

impl<S> Placer<'_, S>
where
    S: NodeSizes<NodeId>,
{
    /// Tree variants: child blocks stack top to bottom beside a trunk
    /// dropping from the parent
    pub(crate) fn place_column(&mut self, idx: usize, params: &Params) -> Rect {
        let child_groups = self.tree.nodes[idx].child_groups.clone();
        let assistants = self.tree.nodes[idx].assistants.clone();
        let has_children = child_groups.iter().any(|g| !g.is_empty());

        let band = self.place_band(idx, params, has_children);
        let mut bounds = band;
        let base = self.rects[idx];
        let trunk = column_trunk(params.layout, base, params);

        let (assistant_bounds, assistants_bottom) =
            self.place_assistants(&assistants, params, base.center().x, base.bottom());
        if let Some(b) = assistant_bounds {
            bounds = bounds.union(b);
        }

        let mut y = assistants_bottom.max(bounds.bottom()) + params.level_separation;

        let children: Vec<usize> = child_groups.iter().flatten().copied().collect();
        for (i, &child) in children.iter().enumerate() {
            let block = self.place(child, params);
            let sub_shift = self.tree.nodes[child].sub_levels as f64
                * (self.rects[child].h + params.level_separation);
            let target_x = if column_side_right(params.layout, i) {
                trunk + params.sibling_separation
            } else {
                trunk - params.sibling_separation - block.w
            };
            self.translate_subtree(
                child,
                Vec2::new(target_x - block.left(), y + sub_shift - block.top()),
            );
            let placed = Rect::new(target_x, y + sub_shift, block.w, block.h);
            bounds = bounds.union(placed);
            y = placed.bottom() + params.sibling_separation;
        }
        bounds
    }
}
