use crate::{Point, Rect};
use stemma_data::Orientation;

/// The four rigid transforms an orientation reduces to
///
/// The offset variants reuse a cardinal transform and differ only in how
/// parents align over their children, which is handled during placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cardinal {
    Top,
    Bottom,
    Left,
    Right,
}

pub(crate) fn cardinal(orientation: Orientation) -> Cardinal {
    match orientation {
        Orientation::Top | Orientation::TopLeft => Cardinal::Top,
        Orientation::Bottom | Orientation::BottomLeft => Cardinal::Bottom,
        Orientation::Left | Orientation::LeftTop => Cardinal::Left,
        Orientation::Right | Orientation::RightTop => Cardinal::Right,
    }
}

/// Transform a rectangle out of the top-down frame
pub(crate) fn rect(cardinal: Cardinal, r: Rect) -> Rect {
    match cardinal {
        Cardinal::Top => r,
        Cardinal::Bottom => Rect::new(r.x, -(r.y + r.h), r.w, r.h),
        Cardinal::Left => Rect::new(r.y, r.x, r.h, r.w),
        Cardinal::Right => Rect::new(-(r.y + r.h), r.x, r.h, r.w),
    }
}

/// Transform a polyline point out of the top-down frame
pub(crate) fn point(cardinal: Cardinal, p: Point) -> Point {
    match cardinal {
        Cardinal::Top => p,
        Cardinal::Bottom => Point::new(p.x, -p.y),
        Cardinal::Left => Point::new(p.y, p.x),
        Cardinal::Right => Point::new(-p.y, p.x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn bottom_is_an_involution_on_points() {
        let p = Point::new(3.0, 7.0);
        assert_eq!(point(Cardinal::Bottom, point(Cardinal::Bottom, p)), p);
    }

    #[test]
    fn side_orientations_swap_box_sides() {
        let r = rect(Cardinal::Left, Rect::new(10.0, 20.0, 100.0, 40.0));
        assert_eq!((r.w, r.h), (40.0, 100.0));
        assert_eq!((r.x, r.y), (20.0, 10.0));
        let r = rect(Cardinal::Right, Rect::new(0.0, 0.0, 100.0, 40.0));
        assert_eq!((r.w, r.h), (40.0, 100.0));
        assert!(r.x < 0.0);
    }

    #[test]
    fn deeper_nodes_move_rightward_under_left() {
        let shallow = rect(Cardinal::Left, Rect::new(0.0, 0.0, 10.0, 10.0));
        let deep = rect(Cardinal::Left, Rect::new(0.0, 100.0, 10.0, 10.0));
        assert!(deep.x > shallow.x);
    }
}
