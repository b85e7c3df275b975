use super::columns::{column_side_right, column_trunk};
use super::{Link, LinkKind, Params, Placer};
use crate::{NodeSizes, Point};
use stemma_data::{LayoutKind, NodeId};

impl<S> Placer<'_, S>
where
    S: NodeSizes<NodeId>,
{
    /// Route the structural links of the tree rooted at `idx`
    ///
    /// Hosted sub trees are not descended into, their interiors were
    /// routed when the block was placed; only the host stub is added
    /// here.
    pub(crate) fn emit_links(&mut self, idx: usize, params: &Params) {
        let node = self.tree.nodes[idx].clone();
        let base = self.rects[idx];

        let mut prev = idx;
        for &partner in &node.partners {
            let a = self.rects[prev];
            let b = self.rects[partner];
            self.push_link(
                idx,
                LinkKind::Partner,
                prev,
                partner,
                vec![
                    Point::new(a.right(), a.center().y),
                    Point::new(b.left(), b.center().y),
                ],
            );
            prev = partner;
        }
        for &partner in &node.partners {
            self.emit_host_stubs(partner, params);
            self.emit_assistant_ties(partner, params);
        }

        self.emit_assistant_ties(idx, params);

        let children: Vec<usize> = node.children().collect();
        if !children.is_empty() {
            if !matches!(params.layout, LayoutKind::Normal | LayoutKind::Mixed) {
                let trunk = column_trunk(params.layout, base, params);
                for (i, &child) in children.iter().enumerate() {
                    let c = self.rects[child];
                    let near = if column_side_right(params.layout, i) {
                        c.left()
                    } else {
                        c.right()
                    };
                    self.push_link(
                        idx,
                        LinkKind::Parent,
                        idx,
                        child,
                        vec![
                            Point::new(trunk, base.bottom()),
                            Point::new(trunk, c.center().y),
                            Point::new(near, c.center().y),
                        ],
                    );
                    self.emit_links(child, params);
                }
            } else if self.mixed_stack_applies(&children, params) {
                for &child in &children {
                    let c = self.rects[child];
                    self.push_link(
                        idx,
                        LinkKind::Parent,
                        idx,
                        child,
                        vec![
                            Point::new(c.center().x, base.bottom()),
                            Point::new(c.center().x, c.top()),
                        ],
                    );
                    self.emit_links(child, params);
                }
            } else {
                for (g, group) in node.child_groups.iter().enumerate() {
                    let (owner, anchor_x, anchor_bottom) = if g == 0 {
                        match node.partners.first() {
                            Some(&partner) if !group.is_empty() => {
                                let p = self.rects[partner];
                                (idx, (base.center().x + p.center().x) / 2.0, base.bottom())
                            }
                            _ => (idx, base.center().x, base.bottom()),
                        }
                    } else {
                        let partner = node.partners[g - 1];
                        let p = self.rects[partner];
                        (partner, p.center().x, p.bottom())
                    };
                    for &child in group {
                        let c = self.rects[child];
                        let mid_y = c.top() - params.level_separation / 2.0;
                        self.push_link(
                            idx,
                            LinkKind::Parent,
                            owner,
                            child,
                            vec![
                                Point::new(c.center().x, c.top()),
                                Point::new(c.center().x, mid_y),
                                Point::new(anchor_x, mid_y),
                                Point::new(anchor_x, anchor_bottom),
                            ],
                        );
                        self.emit_links(child, params);
                    }
                }
            }
        }

        self.emit_host_stubs(idx, params);
    }

    /// Ties from a node's trunk to each of its assistants
    fn emit_assistant_ties(&mut self, owner: usize, params: &Params) {
        let assistants = self.tree.nodes[owner].assistants.clone();
        let anchor = self.rects[owner];
        let trunk_x = anchor.center().x;
        for assistant in assistants {
            let r = self.rects[assistant];
            let near = if r.center().x > trunk_x {
                r.left()
            } else {
                r.right()
            };
            self.push_link(
                owner,
                LinkKind::Assistant,
                owner,
                assistant,
                vec![
                    Point::new(trunk_x, anchor.bottom()),
                    Point::new(trunk_x, r.center().y),
                    Point::new(near, r.center().y),
                ],
            );
            self.emit_links(assistant, params);
        }
    }

    fn emit_host_stubs(&mut self, idx: usize, params: &Params) {
        let node = &self.tree.nodes[idx];
        let pad = node.padding.unwrap_or(params.padding);
        let roots = node.subtree_roots.clone();
        for root in roots {
            let r = self.rects[root];
            self.push_link(
                idx,
                LinkKind::SubtreeHost,
                idx,
                root,
                vec![
                    Point::new(r.center().x, r.top() - pad),
                    Point::new(r.center().x, r.top()),
                ],
            );
        }
    }

    /// Straight ties for the configured curved, secondary and dotted
    /// links; endpoints were filtered for visibility upstream
    pub(crate) fn emit_cross_links(&mut self) {
        let cross = self.tree.cross_links.clone();
        for link in cross {
            let a = self.rects[link.from];
            let b = self.rects[link.to];
            let points = vec![a.center(), b.center()];
            let routed = Link {
                kind: link.kind,
                from: self.tree.nodes[link.from].id.clone(),
                to: self.tree.nodes[link.to].id.clone(),
                points,
                label: link.label,
            };
            self.links.push((link.from, routed));
        }
    }

    fn push_link(
        &mut self,
        anchor: usize,
        kind: LinkKind,
        from: usize,
        to: usize,
        points: Vec<Point>,
    ) {
        let link = Link {
            kind,
            from: self.tree.nodes[from].id.clone(),
            to: self.tree.nodes[to].id.clone(),
            points,
            label: None,
        };
        self.links.push((anchor, link));
    }
}
